//! Regex engine (§4.4): compile/match/replace/split over POSIX-extended
//! syntax, with the two spec-mandated preprocessing passes run as manual
//! state machines before handing the pattern to the `regex` crate.
//!
//! Named `regexp` rather than `regex` to avoid shadowing the `regex`
//! crate import inside this module.
//!
//! Last-captures slot is thread-local rather than the process-wide slot
//! the base description calls for: the spec's own design notes flag the
//! process-wide version as "a real hazard" for concurrent regex use and
//! recommend exactly this change.

use regex::{Regex, RegexBuilder};

use strada_core::value::{ManagedResource, ValueKind, ValuePtr, new_array, new_resource_regex, new_str};
use strada_core::ArrayBody;

use crate::coercion::to_str;
use crate::error::{RuntimeFault, set_fault};

thread_local! {
    static LAST_CAPTURES: std::cell::RefCell<Vec<Vec<u8>>> = const { std::cell::RefCell::new(Vec::new()) };
}

#[derive(Debug)]
struct RegexResource {
    re: Regex,
}

impl ManagedResource for RegexResource {
    fn resource_kind(&self) -> &'static str {
        "regex"
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// `s` flag (§4.4): rewrites every unescaped `.` outside `[...]` to
/// `(.|\n)`, verbatim per the spec's own wording (a capturing group, even
/// though that shifts subsequent group numbers — that's what the source
/// behavior specifies).
fn apply_dotall(pattern: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pattern.len());
    let mut in_class = false;
    let mut i = 0;
    while i < pattern.len() {
        let c = pattern[i];
        if c == b'\\' && i + 1 < pattern.len() {
            out.push(c);
            out.push(pattern[i + 1]);
            i += 2;
            continue;
        }
        match c {
            b'[' => {
                in_class = true;
                out.push(c);
            }
            b']' => {
                in_class = false;
                out.push(c);
            }
            b'.' if !in_class => out.extend_from_slice(b"(.|\n)"),
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

/// `x` flag (§4.4): strips ASCII whitespace and `#...\n` comments outside
/// `[...]`.
fn apply_extended(pattern: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pattern.len());
    let mut in_class = false;
    let mut i = 0;
    while i < pattern.len() {
        let c = pattern[i];
        if c == b'\\' && i + 1 < pattern.len() {
            out.push(c);
            out.push(pattern[i + 1]);
            i += 2;
            continue;
        }
        if c == b'[' {
            in_class = true;
            out.push(c);
            i += 1;
            continue;
        }
        if c == b']' {
            in_class = false;
            out.push(c);
            i += 1;
            continue;
        }
        if !in_class && c == b'#' {
            while i < pattern.len() && pattern[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if !in_class && c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Compiles `pattern` with `flags` (any of `s`, `x`, `i`, `m`). Returns a
/// Regex-kind Value, or Undef with a fault set if the pattern (after
/// preprocessing) fails to compile.
pub fn compile(pattern: &[u8], flags: &[u8]) -> ValuePtr {
    let mut working = pattern.to_vec();
    if flags.contains(&b's') {
        working = apply_dotall(&working);
    }
    if flags.contains(&b'x') {
        working = apply_extended(&working);
    }
    let pattern_str = String::from_utf8_lossy(&working);
    let mut builder = RegexBuilder::new(&pattern_str);
    builder.case_insensitive(flags.contains(&b'i'));
    builder.multi_line(flags.contains(&b'm'));
    match builder.build() {
        Ok(re) => new_resource_regex(Box::new(RegexResource { re })),
        Err(e) => {
            set_fault(RuntimeFault::MalformedDescriptor(format!("regex compile failed: {e}")));
            strada_core::value::strada_new_undef()
        }
    }
}

fn with_regex<R>(ptr: ValuePtr, f: impl FnOnce(&Regex) -> R) -> Option<R> {
    match unsafe { (*ptr).kind() } {
        ValueKind::Regex(r) => r.as_any().downcast_ref::<RegexResource>().map(|res| f(&res.re)),
        _ => None,
    }
}

/// Matches `subject` against `re`. On success, records the full match plus
/// every capture group into the thread-local last-captures slot.
///
/// # Safety
/// `subject` must be a live `ValuePtr`.
pub unsafe fn regex_match(re: ValuePtr, subject: ValuePtr) -> bool {
    let haystack = unsafe { to_str(subject) };
    let text = String::from_utf8_lossy(&haystack);
    let found = with_regex(re, |r| r.captures(&text).map(|caps| {
        let groups: Vec<Vec<u8>> = caps.iter().map(|m| m.map(|m| m.as_str().as_bytes().to_vec()).unwrap_or_default()).collect();
        LAST_CAPTURES.with(|slot| *slot.borrow_mut() = groups);
    }));
    matches!(found, Some(Some(())))
}

/// Returns the last-captures slot as an Array of Str (empty Array if no
/// prior successful match on this thread).
pub fn captures() -> ValuePtr {
    let groups = LAST_CAPTURES.with(|slot| slot.borrow().clone());
    let mut body = ArrayBody::new();
    for g in groups {
        body.push(new_str(g), true);
    }
    new_array(body)
}

/// Replaces matches of `re` in `subject` with `replacement`. `global`
/// selects `replace_all` vs. first-match-only.
///
/// # Safety
/// `subject` and `replacement` must be live `ValuePtr`s.
pub unsafe fn replace(re: ValuePtr, subject: ValuePtr, replacement: ValuePtr, global: bool) -> ValuePtr {
    let haystack = unsafe { to_str(subject) };
    let text = String::from_utf8_lossy(&haystack);
    let repl_bytes = unsafe { to_str(replacement) };
    let repl = String::from_utf8_lossy(&repl_bytes);
    let result = with_regex(re, |r| {
        if global {
            r.replace_all(&text, repl.as_ref()).into_owned()
        } else {
            r.replace(&text, repl.as_ref()).into_owned()
        }
    })
    .unwrap_or_else(|| text.into_owned());
    new_str(result.into_bytes())
}

/// Splits `subject` on matches of `re`, returning an Array of Str pieces.
///
/// # Safety
/// `subject` must be a live `ValuePtr`.
pub unsafe fn split(re: ValuePtr, subject: ValuePtr) -> ValuePtr {
    let haystack = unsafe { to_str(subject) };
    let text = String::from_utf8_lossy(&haystack);
    let pieces: Vec<String> = with_regex(re, |r| r.split(&text).map(|s| s.to_string()).collect()).unwrap_or_default();
    let mut body = ArrayBody::new();
    for p in pieces {
        body.push(new_str(p.into_bytes()), true);
    }
    new_array(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strada_core::value::{strada_decref, strada_new_str_len};

    fn s(text: &str) -> ValuePtr {
        unsafe { strada_new_str_len(text.as_ptr(), text.len()) }
    }

    #[test]
    fn captures_example_matches_spec_scenario() {
        let re = compile(br"(\d+)-(\d+)-(\d+)", b"");
        let subj = s("2024-01-15");
        assert!(unsafe { regex_match(re, subj) });
        let caps = captures();
        let parts: Vec<Vec<u8>> = (0..4)
            .map(|i| unsafe { to_str(crate::pack::array_get(caps, i).unwrap()) })
            .collect();
        assert_eq!(parts, vec![b"2024-01-15".to_vec(), b"2024".to_vec(), b"01".to_vec(), b"15".to_vec()]);
        unsafe {
            strada_decref(re);
            strada_decref(subj);
            strada_decref(caps);
        }
    }

    #[test]
    fn dotall_flag_rewrites_unescaped_dot() {
        let rewritten = apply_dotall(b"a.b\\.c[.]d");
        assert_eq!(rewritten, b"a(.|\n)b\\.c[.]d");
    }

    #[test]
    fn extended_flag_strips_whitespace_and_comments() {
        let rewritten = apply_extended(b"a b # comment\nc");
        assert_eq!(rewritten, b"abc");
    }

    #[test]
    fn replace_global_replaces_every_match() {
        let re = compile(b"o", b"");
        let subj = s("foo boo");
        let repl = s("0");
        let out = unsafe { replace(re, subj, repl, true) };
        assert_eq!(unsafe { to_str(out) }, b"f00 b00");
        unsafe {
            strada_decref(re);
            strada_decref(subj);
            strada_decref(repl);
            strada_decref(out);
        }
    }

    #[test]
    fn split_on_comma() {
        let re = compile(b",", b"");
        let subj = s("a,b,c");
        let arr = unsafe { split(re, subj) };
        let pieces: Vec<Vec<u8>> = (0..3).map(|i| unsafe { to_str(crate::pack::array_get(arr, i).unwrap()) }).collect();
        assert_eq!(pieces, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        unsafe {
            strada_decref(re);
            strada_decref(subj);
            strada_decref(arr);
        }
    }
}
