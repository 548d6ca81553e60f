//! Character-level (UTF-8-aware) string operators (§4.4).
//!
//! All indices here are codepoint indices, distinct from `bytes.rs`'s
//! byte indices. Grounded on the teacher's general "decode once into a
//! `Vec<char>`, operate, re-encode" shape from its deleted `string_ops.rs`
//! (the shape survived deletion even though the file's content — a
//! foreign stack-machine module — did not).

use strada_core::value::{ValuePtr, new_str, strada_new_str_len};

use crate::coercion::to_str;

fn chars_of(ptr: ValuePtr) -> Vec<char> {
    let bytes = unsafe { to_str(ptr) };
    String::from_utf8_lossy(&bytes).chars().collect()
}

/// Codepoint count, not byte count (`byte_length("héllo")` is 6, `length`
/// is 5).
///
/// # Safety
/// `ptr` must be a live `ValuePtr`.
pub unsafe fn length(ptr: ValuePtr) -> i64 {
    chars_of(ptr).len() as i64
}

fn resolve_offset(offset: i64, len: usize) -> usize {
    if offset < 0 {
        (len as i64 + offset).max(0) as usize
    } else {
        (offset as usize).min(len)
    }
}

/// Codepoint-indexed substring. Negative `offset` counts from the end.
/// `len` is clamped to the available codepoints; a `len` of 0 or an
/// `offset` past the end yields an empty Str.
///
/// # Safety
/// `ptr` must be a live `ValuePtr`.
pub unsafe fn substr(ptr: ValuePtr, offset: i64, len: i64) -> ValuePtr {
    let chars = chars_of(ptr);
    let start = resolve_offset(offset, chars.len());
    let count = len.max(0) as usize;
    let end = (start + count).min(chars.len());
    let slice: String = chars[start..end.max(start)].iter().collect();
    new_str(slice.into_bytes())
}

/// Reverses codepoint order (not byte order — byte-reversing a multi-byte
/// UTF-8 sequence would corrupt it).
///
/// # Safety
/// `ptr` must be a live `ValuePtr`.
pub unsafe fn reverse(ptr: ValuePtr) -> ValuePtr {
    let reversed: String = chars_of(ptr).into_iter().rev().collect();
    new_str(reversed.into_bytes())
}

/// `chr(codepoint)`: for 0-255, a single raw byte (classic single-byte
/// `chr`, not a 2-byte UTF-8 encoding of a Latin-1 codepoint); above 255,
/// a standard UTF-8-encoded Str. Invalid codepoints fall back to U+FFFD.
pub fn chr(codepoint: i64) -> ValuePtr {
    if (0..=255).contains(&codepoint) {
        let byte = codepoint as u8;
        return unsafe { strada_new_str_len(&byte as *const u8, 1) };
    }
    let ch = char::from_u32(codepoint as u32).unwrap_or('\u{FFFD}');
    let mut buf = [0u8; 4];
    let s = ch.encode_utf8(&mut buf);
    unsafe { strada_new_str_len(s.as_ptr(), s.len()) }
}

/// Decodes the first codepoint. Empty input decodes to 0.
///
/// # Safety
/// `ptr` must be a live `ValuePtr`.
pub unsafe fn ord(ptr: ValuePtr) -> i64 {
    chars_of(ptr).first().map(|c| *c as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strada_core::value::strada_decref;

    fn s(text: &str) -> ValuePtr {
        unsafe { strada_new_str_len(text.as_ptr(), text.len()) }
    }

    #[test]
    fn length_counts_codepoints_not_bytes() {
        let v = s("héllo");
        unsafe {
            assert_eq!(length(v), 5);
            strada_decref(v);
        }
    }

    #[test]
    fn substr_handles_negative_offset() {
        let v = s("hello world");
        unsafe {
            let tail = substr(v, -5, 5);
            assert_eq!(to_str(tail), b"world");
            strada_decref(tail);
            strada_decref(v);
        }
    }

    #[test]
    fn reverse_preserves_multibyte_codepoints() {
        let v = s("héllo");
        unsafe {
            let r = reverse(v);
            assert_eq!(String::from_utf8(to_str(r)).unwrap(), "olléh");
            strada_decref(r);
            strada_decref(v);
        }
    }

    #[test]
    fn chr_below_256_is_single_raw_byte() {
        let v = chr(0xE9);
        unsafe {
            let bytes = to_str(v);
            assert_eq!(bytes, vec![0xE9]);
            strada_decref(v);
        }
    }

    #[test]
    fn chr_and_ord_round_trip_above_256() {
        let v = chr(0x1F600);
        unsafe {
            assert_eq!(ord(v), 0x1F600);
            strada_decref(v);
        }
    }
}
