//! Anonymous constructors and deref operators (§4.6).
//!
//! `anon_hash`/`anon_array` build a container then wrap it in a `Ref` via
//! `strada-core`'s existing `make_ref_take`; `deref_scalar`/`deref_set`
//! are the read/write halves of following a `Ref` to its target, the
//! mechanism closure-capture mutation and general aliasing are built on.

use strada_core::value::{ValueKind, ValuePtr, decref, make_ref_take, new_array, new_hash, strada_incref};
use strada_core::{ArrayBody, DictBody};

use crate::coercion::to_str;

/// Builds a new Array Value from `elems` (ownership of each element's
/// refcount adopted), then wraps it in a Ref.
///
/// # Safety
/// Every pointer in `elems` must be a live `ValuePtr` whose refcount this
/// call adopts.
pub unsafe fn anon_array(elems: &[ValuePtr]) -> ValuePtr {
    let mut body = ArrayBody::new();
    for &e in elems {
        body.push(e, true);
    }
    let arr = new_array(body);
    make_ref_take(arr)
}

/// Builds a new Hash Value from `pairs` (key, value) — keys are coerced to
/// their string form and then released (the Hash only needs the bytes,
/// not the key Value itself), values' refcounts are adopted — then wraps
/// it in a Ref.
///
/// # Safety
/// Every `ValuePtr` in `pairs` must be live; both the key's and the
/// value's refcounts are adopted (consumed) by this call.
pub unsafe fn anon_hash(pairs: &[(ValuePtr, ValuePtr)]) -> ValuePtr {
    let mut body = DictBody::new();
    for &(k, v) in pairs {
        let key_bytes = unsafe { to_str(k) };
        body.set(&key_bytes, v, true);
        unsafe { decref(k) };
    }
    let hash = new_hash(body);
    make_ref_take(hash)
}

/// Returns an owned (increfed) handle to `r`'s target. `r` must be a Ref;
/// any other kind returns `r` itself increfed (dereferencing a non-Ref is
/// a no-op identity, matching how `coercion::to_*` already follows Ref
/// transparently rather than faulting).
///
/// # Safety
/// `r` must be a live `ValuePtr`.
pub unsafe fn deref_scalar(r: ValuePtr) -> ValuePtr {
    let target = match unsafe { (*r).kind() } {
        ValueKind::Ref(body) => body.target,
        _ => r,
    };
    unsafe { strada_incref(target) };
    target
}

/// Mutates `r`'s target in place: the old payload is released, the new
/// one (ownership adopted) takes its spot, and `target`'s address is
/// unchanged — every other holder of a pointer to that same target, Ref
/// or otherwise, observes the change (§4.8's closure-capture mutation
/// relies on exactly this).
///
/// Implemented as a payload swap rather than a true move: `target` and
/// `new_value` trade `ValueKind` contents, then `new_value` (now holding
/// `target`'s old payload) is decref'd, running the ordinary release
/// cascade over whatever `target` used to contain. Does nothing but
/// release `new_value` if `r` is not a Ref, or if `target == new_value`.
///
/// # Safety
/// `r` and `new_value` must be live `ValuePtr`s; `new_value`'s refcount is
/// adopted.
pub unsafe fn deref_set(r: ValuePtr, new_value: ValuePtr) {
    let target = match unsafe { (*r).kind() } {
        ValueKind::Ref(body) => body.target,
        _ => {
            unsafe { decref(new_value) };
            return;
        }
    };
    if target == new_value {
        unsafe { decref(new_value) };
        return;
    }
    unsafe { std::mem::swap((*target).kind_mut(), (*new_value).kind_mut()) };
    unsafe { decref(new_value) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use strada_core::value::{strada_decref, strada_new_int, strada_new_str_len};

    #[test]
    fn anon_array_round_trips() {
        let a = strada_new_int(1);
        let b = strada_new_int(2);
        let r = unsafe { anon_array(&[a, b]) };
        let target = unsafe { deref_scalar(r) };
        match unsafe { (*target).kind() } {
            ValueKind::Array(arr) => assert_eq!(arr.len(), 2),
            other => panic!("expected Array, got {other:?}"),
        }
        unsafe {
            strada_decref(target);
            strada_decref(r);
        }
    }

    #[test]
    fn anon_hash_sets_keys_from_coerced_strings() {
        let k = unsafe { strada_new_str_len(b"x".as_ptr(), 1) };
        let v = strada_new_int(42);
        let r = unsafe { anon_hash(&[(k, v)]) };
        let target = unsafe { deref_scalar(r) };
        match unsafe { (*target).kind() } {
            ValueKind::Hash(h) => assert_eq!(h.len(), 1),
            other => panic!("expected Hash, got {other:?}"),
        }
        unsafe {
            strada_decref(target);
            strada_decref(r);
        }
    }

    #[test]
    fn deref_set_mutates_visible_to_other_holders() {
        let inner = strada_new_int(1);
        let r = unsafe { strada_core::value::make_ref(inner) };
        let alias = unsafe { deref_scalar(r) };
        let new_val = strada_new_int(99);
        unsafe { deref_set(r, new_val) };
        match unsafe { (*alias).kind() } {
            ValueKind::Int(99) => {}
            other => panic!("expected Int(99), got {other:?}"),
        }
        unsafe {
            strada_decref(alias);
            strada_decref(r);
            strada_decref(inner);
        }
    }
}
