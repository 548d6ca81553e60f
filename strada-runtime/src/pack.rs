//! Pack/unpack codec (§4.4, §8): a pure format-string-driven state machine,
//! independent of the rest of the string engine. Endianness and width are
//! fixed per code, never derived from host byte order except where the
//! table says "native".
//!
//! Grounded on the byte-table the spec itself tabulates; the "parse a
//! format string into (code, count) tokens, then drive a byte cursor"
//! shape mirrors the teacher's general pure-function codec style (its own
//! `encoding.rs`, deleted as out of scope — base64/hex framing, not this
//! table — but the same "one pass over the format string, one pass over
//! the data" structure).

use strada_core::ArrayBody;
use strada_core::value::{ValueKind, ValuePtr, new_array, new_str, strada_new_int};

use crate::coercion::to_int;

#[derive(Clone, Copy)]
struct Token {
    code: u8,
    count: usize,
}

fn tokenize(format: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < format.len() {
        let code = format[i];
        i += 1;
        if code.is_ascii_whitespace() {
            continue;
        }
        let digits_start = i;
        while i < format.len() && format[i].is_ascii_digit() {
            i += 1;
        }
        let count = if i > digits_start {
            std::str::from_utf8(&format[digits_start..i]).unwrap().parse().unwrap_or(1)
        } else {
            1
        };
        tokens.push(Token { code, count });
    }
    tokens
}

fn width_of(code: u8) -> usize {
    match code {
        b'c' | b'C' | b'x' | b'X' => 1,
        b's' | b'S' | b'n' | b'v' => 2,
        b'l' | b'L' | b'N' | b'V' => 4,
        b'q' | b'Q' => 8,
        _ => 0,
    }
}

/// Packs `args` according to `format`, consuming one `Value*` per numeric
/// repeat and one per string-family (`a`/`A`/`H`) token, regardless of
/// that token's count. Extra args are ignored; missing args coerce from
/// Undef (0 / empty string).
///
/// # Safety
/// Every pointer in `args` must be a live `ValuePtr`.
pub unsafe fn pack(format: &[u8], args: &[ValuePtr]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut arg_idx = 0;
    let mut next_int = |args: &[ValuePtr], arg_idx: &mut usize| -> i64 {
        let v = args.get(*arg_idx).copied();
        *arg_idx += 1;
        v.map(|p| unsafe { to_int(p) }).unwrap_or(0)
    };

    for tok in tokenize(format) {
        match tok.code {
            b'c' | b'C' => {
                for _ in 0..tok.count {
                    out.push(next_int(args, &mut arg_idx) as u8);
                }
            }
            b's' | b'S' => {
                for _ in 0..tok.count {
                    out.extend_from_slice(&(next_int(args, &mut arg_idx) as u16).to_ne_bytes());
                }
            }
            b'n' => {
                for _ in 0..tok.count {
                    out.extend_from_slice(&(next_int(args, &mut arg_idx) as u16).to_be_bytes());
                }
            }
            b'v' => {
                for _ in 0..tok.count {
                    out.extend_from_slice(&(next_int(args, &mut arg_idx) as u16).to_le_bytes());
                }
            }
            b'l' | b'L' => {
                for _ in 0..tok.count {
                    out.extend_from_slice(&(next_int(args, &mut arg_idx) as u32).to_ne_bytes());
                }
            }
            b'N' => {
                for _ in 0..tok.count {
                    out.extend_from_slice(&(next_int(args, &mut arg_idx) as u32).to_be_bytes());
                }
            }
            b'V' => {
                for _ in 0..tok.count {
                    out.extend_from_slice(&(next_int(args, &mut arg_idx) as u32).to_le_bytes());
                }
            }
            b'q' | b'Q' => {
                for _ in 0..tok.count {
                    out.extend_from_slice(&(next_int(args, &mut arg_idx) as u64).to_ne_bytes());
                }
            }
            b'a' | b'A' => {
                let bytes = args.get(arg_idx).map(|p| unsafe { crate::coercion::to_str(*p) }).unwrap_or_default();
                arg_idx += 1;
                let pad = if tok.code == b'a' { 0u8 } else { b' ' };
                let mut field = vec![pad; tok.count];
                let n = bytes.len().min(tok.count);
                field[..n].copy_from_slice(&bytes[..n]);
                out.extend_from_slice(&field);
            }
            b'H' => {
                let hex = args.get(arg_idx).map(|p| unsafe { crate::coercion::to_str(*p) }).unwrap_or_default();
                arg_idx += 1;
                let digits: Vec<u8> = hex.iter().take(tok.count).copied().collect();
                for pair in digits.chunks(2) {
                    let hi = (pair[0] as char).to_digit(16).unwrap_or(0) as u8;
                    let lo = pair.get(1).and_then(|b| (*b as char).to_digit(16)).unwrap_or(0) as u8;
                    out.push((hi << 4) | lo);
                }
            }
            b'x' => {
                out.extend(std::iter::repeat(0u8).take(tok.count));
            }
            b'X' => {
                for _ in 0..tok.count {
                    out.pop();
                }
            }
            _ => {}
        }
    }
    out
}

/// Unpacks `data` per `format`, returning an Array Value of the decoded
/// fields (numeric codes produce Int, `a`/`A`/`H` each produce one Str).
///
/// # Safety
/// Caller must ensure `data` outlives this call (it is only read).
pub unsafe fn unpack(format: &[u8], data: &[u8]) -> ValuePtr {
    let mut body = ArrayBody::new();
    let mut pos = 0usize;

    for tok in tokenize(format) {
        match tok.code {
            b'c' => {
                for _ in 0..tok.count {
                    let v = data.get(pos).copied().unwrap_or(0) as i8 as i64;
                    pos += 1;
                    body.push(strada_new_int(v), true);
                }
            }
            b'C' => {
                for _ in 0..tok.count {
                    let v = data.get(pos).copied().unwrap_or(0) as i64;
                    pos += 1;
                    body.push(strada_new_int(v), true);
                }
            }
            b's' | b'S' | b'n' | b'v' | b'l' | b'L' | b'N' | b'V' | b'q' | b'Q' => {
                let width = width_of(tok.code);
                for _ in 0..tok.count {
                    let chunk = data.get(pos..pos + width).unwrap_or(&[]);
                    pos += width;
                    let v = decode_int(tok.code, chunk);
                    body.push(strada_new_int(v), true);
                }
            }
            b'a' | b'A' => {
                let chunk = data.get(pos..pos + tok.count).unwrap_or(&[]);
                pos += tok.count;
                let trimmed: &[u8] = if tok.code == b'a' {
                    let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
                    &chunk[..end]
                } else {
                    let end = chunk.iter().rposition(|&b| b != b' ').map(|i| i + 1).unwrap_or(0);
                    &chunk[..end]
                };
                body.push(new_str(trimmed.to_vec()), true);
            }
            b'H' => {
                let byte_count = tok.count.div_ceil(2);
                let chunk = data.get(pos..pos + byte_count).unwrap_or(&[]);
                pos += byte_count;
                let mut hex = String::with_capacity(tok.count);
                for &b in chunk {
                    hex.push_str(&format!("{:02x}", b));
                }
                hex.truncate(tok.count);
                body.push(new_str(hex.into_bytes()), true);
            }
            b'x' => pos += tok.count,
            b'X' => pos = pos.saturating_sub(tok.count),
            _ => {}
        }
    }
    new_array(body)
}

fn decode_int(code: u8, chunk: &[u8]) -> i64 {
    let mut buf8 = [0u8; 8];
    let width = width_of(code);
    buf8[..width.min(chunk.len())].copy_from_slice(&chunk[..width.min(chunk.len())]);
    match code {
        b's' => i16::from_ne_bytes(buf8[..2].try_into().unwrap()) as i64,
        b'S' => u16::from_ne_bytes(buf8[..2].try_into().unwrap()) as i64,
        b'n' => u16::from_be_bytes(chunk.get(..2).unwrap_or(&[0, 0]).try_into().unwrap()) as i64,
        b'v' => u16::from_le_bytes(chunk.get(..2).unwrap_or(&[0, 0]).try_into().unwrap()) as i64,
        b'l' => i32::from_ne_bytes(buf8[..4].try_into().unwrap()) as i64,
        b'L' => u32::from_ne_bytes(buf8[..4].try_into().unwrap()) as i64,
        b'N' => u32::from_be_bytes(chunk.get(..4).unwrap_or(&[0; 4]).try_into().unwrap()) as i64,
        b'V' => u32::from_le_bytes(chunk.get(..4).unwrap_or(&[0; 4]).try_into().unwrap()) as i64,
        b'q' => i64::from_ne_bytes(buf8),
        b'Q' => u64::from_ne_bytes(buf8) as i64,
        _ => 0,
    }
}

pub fn array_get(ptr: ValuePtr, index: i64) -> Option<ValuePtr> {
    match unsafe { (*ptr).kind() } {
        ValueKind::Array(a) => a.get(index),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strada_core::value::{strada_decref, strada_new_int};

    #[test]
    fn pack_header_matches_spec_example() {
        let a = strada_new_int(0x12345678);
        let b = strada_new_int(80);
        let c = strada_new_int(255);
        let out = unsafe { pack(b"NnC", &[a, b, c]) };
        assert_eq!(out, vec![0x12, 0x34, 0x56, 0x78, 0x00, 0x50, 0xFF]);
        unsafe {
            strada_decref(a);
            strada_decref(b);
            strada_decref(c);
        }
    }

    #[test]
    fn unpack_header_matches_spec_example() {
        let bytes = [0x12, 0x34, 0x56, 0x78, 0x00, 0x50, 0xFF];
        let arr = unsafe { unpack(b"NnC", &bytes) };
        let got: Vec<i64> = (0..3)
            .map(|i| unsafe { to_int(array_get(arr, i).unwrap()) })
            .collect();
        assert_eq!(got, vec![0x12345678, 80, 255]);
        unsafe { strada_decref(arr) };
    }

    #[test]
    fn round_trips_non_lossy_numeric_codes() {
        let vals = [strada_new_int(-7), strada_new_int(1234), strada_new_int(99)];
        let packed = unsafe { pack(b"cSL", &vals) };
        let arr = unsafe { unpack(b"cSL", &packed) };
        unsafe {
            assert_eq!(to_int(array_get(arr, 0).unwrap()), -7);
            assert_eq!(to_int(array_get(arr, 1).unwrap()), 1234);
            assert_eq!(to_int(array_get(arr, 2).unwrap()), 99);
            strada_decref(arr);
            for v in vals {
                strada_decref(v);
            }
        }
    }

    #[test]
    fn a_code_null_pads_and_trims_on_unpack() {
        let s = unsafe { strada_core::value::strada_new_str_len(b"hi".as_ptr(), 2) };
        let packed = unsafe { pack(b"a5", &[s]) };
        assert_eq!(packed, b"hi\0\0\0");
        let arr = unsafe { unpack(b"a5", &packed) };
        let out = array_get(arr, 0).unwrap();
        unsafe {
            assert_eq!(crate::coercion::to_str(out), b"hi");
            strada_decref(arr);
            strada_decref(s);
        }
    }
}
