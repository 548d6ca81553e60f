//! StringBuilder (§4.4): amortized O(1) append, opaque to scripts, freed
//! on final decref like every other `ManagedResource` (§7, "Scoped
//! resources"). Reuses the `FileHandle` `ValueKind` slot the way
//! `concurrency.rs` reuses `Socket` for thread/mutex/condvar — neither is
//! a dedicated `kind` the spec calls for, so both ride the existing
//! generic opaque-resource extension points.

use strada_core::value::{ManagedResource, ValueKind, ValuePtr, new_resource_file, new_str};

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug)]
struct StringBuilderResource {
    buf: Vec<u8>,
}

impl ManagedResource for StringBuilderResource {
    fn resource_kind(&self) -> &'static str {
        "stringbuilder"
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

pub fn new(initial_capacity: Option<usize>) -> ValuePtr {
    new_resource_file(Box::new(StringBuilderResource {
        buf: Vec::with_capacity(initial_capacity.unwrap_or(DEFAULT_CAPACITY)),
    }))
}

fn with_builder<R>(ptr: ValuePtr, f: impl FnOnce(&mut StringBuilderResource) -> R) -> Option<R> {
    match unsafe { (*ptr).kind_mut() } {
        ValueKind::FileHandle(r) => r.as_any_mut().downcast_mut::<StringBuilderResource>().map(f),
        _ => None,
    }
}

/// Appends `bytes`; the backing buffer doubles on growth like a `Vec`.
pub fn append(ptr: ValuePtr, bytes: &[u8]) {
    with_builder(ptr, |b| b.buf.extend_from_slice(bytes));
}

pub fn length(ptr: ValuePtr) -> i64 {
    with_builder(ptr, |b| b.buf.len() as i64).unwrap_or(0)
}

pub fn clear(ptr: ValuePtr) {
    with_builder(ptr, |b| b.buf.clear());
}

/// Snapshots the current buffer contents into a new Str Value. Does not
/// consume or clear the builder.
pub fn to_string_value(ptr: ValuePtr) -> ValuePtr {
    with_builder(ptr, |b| new_str(b.buf.clone())).unwrap_or_else(|| new_str(Vec::new()))
}

/// `free` is a no-op beyond decref: the `ManagedResource`'s `Drop` glue
/// (via the ordinary release cascade) already reclaims the buffer. Exposed
/// as a named entry point because the spec calls it out explicitly
/// alongside `append`/`length`/`clear`/`to_string`.
pub fn free(ptr: ValuePtr) {
    unsafe { strada_core::value::strada_decref(ptr) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_to_string_round_trip() {
        let b = new(None);
        append(b, b"hello, ");
        append(b, b"world");
        let s = to_string_value(b);
        unsafe {
            assert_eq!(crate::coercion::to_str(s), b"hello, world");
            strada_core::value::strada_decref(s);
        }
        free(b);
    }

    #[test]
    fn clear_empties_buffer() {
        let b = new(Some(4));
        append(b, b"abcdef");
        assert_eq!(length(b), 6);
        clear(b);
        assert_eq!(length(b), 0);
        free(b);
    }
}
