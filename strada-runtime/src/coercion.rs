//! Coercion (§4.2): total functions from any `Value` kind to Int/Num/Str/Bool.
//!
//! These are called from every comparison, `if`, and loop condition in
//! generated code, so each function must be total — there is no failure
//! return, only a defined fallback per kind (0, 0.0, empty string, or
//! `false`). Grounded on the teacher's own coercion style in its deleted
//! `float_ops.rs`/`io.rs` (locale-independent formatting, parse-failure
//! defaults rather than `Result`) adapted from a stack-threaded calling
//! convention to a direct `Value* -> T` one.

use strada_core::value::{ValueKind, ValuePtr};

/// Int from Str is decimal parse with "0 on parse failure" (§4.2). Leading
/// whitespace and a sign are honored; trailing garbage after a valid prefix
/// is ignored, matching C's `strtoll` behavior the source wraps.
fn parse_int_prefix(bytes: &[u8]) -> i64 {
    let s = String::from_utf8_lossy(bytes);
    let trimmed = s.trim_start();
    let mut end = 0;
    let chars: Vec<char> = trimmed.chars().collect();
    if end < chars.len() && (chars[end] == '+' || chars[end] == '-') {
        end += 1;
    }
    let digits_start = end;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return 0;
    }
    let prefix: String = chars[..end].iter().collect();
    prefix.parse::<i64>().unwrap_or(0)
}

/// Num from Str is float parse with "0.0 on failure" (§4.2), same
/// leading-prefix tolerance as `parse_int_prefix`.
fn parse_num_prefix(bytes: &[u8]) -> f64 {
    let s = String::from_utf8_lossy(bytes);
    let trimmed = s.trim_start();
    let mut end = 0;
    let chars: Vec<char> = trimmed.chars().collect();
    if end < chars.len() && (chars[end] == '+' || chars[end] == '-') {
        end += 1;
    }
    let mut saw_digit = false;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
        saw_digit = true;
    }
    if end < chars.len() && chars[end] == '.' {
        end += 1;
        while end < chars.len() && chars[end].is_ascii_digit() {
            end += 1;
            saw_digit = true;
        }
    }
    if saw_digit && end < chars.len() && (chars[end] == 'e' || chars[end] == 'E') {
        let mut lookahead = end + 1;
        if lookahead < chars.len() && (chars[lookahead] == '+' || chars[lookahead] == '-') {
            lookahead += 1;
        }
        let exp_digits_start = lookahead;
        while lookahead < chars.len() && chars[lookahead].is_ascii_digit() {
            lookahead += 1;
        }
        if lookahead > exp_digits_start {
            end = lookahead;
        }
    }
    if !saw_digit {
        return 0.0;
    }
    let prefix: String = chars[..end].iter().collect();
    prefix.parse::<f64>().unwrap_or(0.0)
}

/// `%g`-style locale-independent float formatting (§4.2): shortest
/// round-tripping decimal, no forced trailing `.0` for integral values.
pub fn format_num_g(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// # Safety
/// `ptr` must be a live `ValuePtr`.
pub unsafe fn to_int(ptr: ValuePtr) -> i64 {
    match unsafe { (*ptr).kind() } {
        ValueKind::Undef => 0,
        ValueKind::Int(i) => *i,
        ValueKind::Num(n) => *n as i64,
        ValueKind::Str(b) => parse_int_prefix(b),
        ValueKind::Array(a) => a.len() as i64,
        ValueKind::Hash(h) => h.len() as i64,
        ValueKind::Ref(r) => unsafe { to_int(r.target) },
        ValueKind::CPointer(p) => *p as i64,
        ValueKind::FileHandle(_) | ValueKind::Regex(_) | ValueKind::Socket(_) | ValueKind::CStruct(_) | ValueKind::Closure(_) => 1,
    }
}

/// # Safety
/// `ptr` must be a live `ValuePtr`.
pub unsafe fn to_num(ptr: ValuePtr) -> f64 {
    match unsafe { (*ptr).kind() } {
        ValueKind::Undef => 0.0,
        ValueKind::Int(i) => *i as f64,
        ValueKind::Num(n) => *n,
        ValueKind::Str(b) => parse_num_prefix(b),
        ValueKind::Array(a) => a.len() as f64,
        ValueKind::Hash(h) => h.len() as f64,
        ValueKind::Ref(r) => unsafe { to_num(r.target) },
        ValueKind::CPointer(p) => *p as usize as f64,
        ValueKind::FileHandle(_) | ValueKind::Regex(_) | ValueKind::Socket(_) | ValueKind::CStruct(_) | ValueKind::Closure(_) => 1.0,
    }
}

/// # Safety
/// `ptr` must be a live `ValuePtr`.
pub unsafe fn to_str(ptr: ValuePtr) -> Vec<u8> {
    match unsafe { (*ptr).kind() } {
        ValueKind::Undef => Vec::new(),
        ValueKind::Int(i) => i.to_string().into_bytes(),
        ValueKind::Num(n) => format_num_g(*n).into_bytes(),
        ValueKind::Str(b) => b.clone(),
        ValueKind::Array(a) => format!("ARRAY(len={})", a.len()).into_bytes(),
        ValueKind::Hash(h) => format!("HASH(entries={})", h.len()).into_bytes(),
        ValueKind::Ref(r) => unsafe { to_str(r.target) },
        ValueKind::CPointer(p) => format!("{p:p}").into_bytes(),
        ValueKind::FileHandle(_) => b"FileHandle".to_vec(),
        ValueKind::Regex(_) => b"Regex".to_vec(),
        ValueKind::Socket(_) => b"Socket".to_vec(),
        ValueKind::CStruct(c) => format!("CStruct({})", c.type_name).into_bytes(),
        ValueKind::Closure(_) => b"Closure".to_vec(),
    }
}

/// # Safety
/// `ptr` must be a live `ValuePtr`.
///
/// Bool rules (§4.2, matched exactly): Undef is false; Int/Num zero is
/// false; Str empty or the single byte `"0"` is false (`"00"` is true —
/// this is a one-byte-exact check, not a numeric-zero check); Array/Hash
/// are true iff non-empty; Ref follows its target; every other kind is
/// true.
pub unsafe fn to_bool(ptr: ValuePtr) -> bool {
    match unsafe { (*ptr).kind() } {
        ValueKind::Undef => false,
        ValueKind::Int(i) => *i != 0,
        ValueKind::Num(n) => *n != 0.0,
        ValueKind::Str(b) => !(b.is_empty() || b.as_slice() == b"0"),
        ValueKind::Array(a) => !a.is_empty(),
        ValueKind::Hash(h) => !h.is_empty(),
        ValueKind::Ref(r) => unsafe { to_bool(r.target) },
        ValueKind::FileHandle(_) | ValueKind::Regex(_) | ValueKind::Socket(_) | ValueKind::CStruct(_) | ValueKind::CPointer(_) | ValueKind::Closure(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strada_core::value::{strada_decref, strada_new_int, strada_new_num, strada_new_str_len, strada_new_undef};

    fn str_val(s: &str) -> ValuePtr {
        unsafe { strada_new_str_len(s.as_ptr(), s.len()) }
    }

    #[test]
    fn bool_rule_distinguishes_zero_and_double_zero() {
        let zero = str_val("0");
        let double_zero = str_val("00");
        unsafe {
            assert!(!to_bool(zero));
            assert!(to_bool(double_zero));
            strada_decref(zero);
            strada_decref(double_zero);
        }
    }

    #[test]
    fn int_parse_failure_defaults_to_zero() {
        let v = str_val("not a number");
        unsafe {
            assert_eq!(to_int(v), 0);
            strada_decref(v);
        }
    }

    #[test]
    fn int_parse_honors_leading_prefix() {
        let v = str_val("42abc");
        unsafe {
            assert_eq!(to_int(v), 42);
            strada_decref(v);
        }
    }

    #[test]
    fn num_formats_without_trailing_zero() {
        let v = strada_new_num(3.0);
        unsafe {
            assert_eq!(to_str(v), b"3");
            strada_decref(v);
        }
    }

    #[test]
    fn undef_coerces_to_false_zero_empty() {
        let v = strada_new_undef();
        unsafe {
            assert!(!to_bool(v));
            assert_eq!(to_int(v), 0);
            assert_eq!(to_num(v), 0.0);
            assert!(to_str(v).is_empty());
            strada_decref(v);
        }
    }

    #[test]
    fn int_to_num_round_trips() {
        let v = strada_new_int(7);
        unsafe {
            assert_eq!(to_num(v), 7.0);
            strada_decref(v);
        }
    }
}
