//! Closure fabric (§4.8): capture-by-snapshot-of-pointer-to-slot
//! semantics, plus the call convention `concurrency.rs`'s `thread_create`
//! already assumes.
//!
//! A closure does not copy captured *values* at call time; it copies the
//! captured *pointer* once, at construction, and increfs whatever it
//! points to. Mutating a capture afterward (`deref_set` through a `Ref`
//! capture) is how a closure and its enclosing scope observe each other's
//! writes — see `ClosureBody`'s doc comment in `strada-core`.
//!
//! Calling convention: rather than generating eleven distinct function
//! pointer types for the "0 to 10 explicit args" family the source
//! describes, every closure body here is called through a single
//! args-array ABI (`*const ValuePtr, u32`), which is the idiomatic Rust
//! equivalent of a variadic C call boundary and is what `dl_call_*`
//! (`ffi.rs`) and `thread_create` (`concurrency.rs`) both already expect.

use strada_core::value::{ValueKind, ValuePtr, strada_incref};

/// Maximum explicit arguments `closure_call` passes through (§4.8).
pub const MAX_CLOSURE_ARGS: usize = 10;

/// `Closure`-kind entry point: receives the snapshot captures array
/// (pointer + length) as a hidden first parameter, then the explicit call
/// arguments (pointer + length).
pub type ClosureEntry = extern "C" fn(*const ValuePtr, u32, *const ValuePtr, u32) -> ValuePtr;

/// `CPointer`-kind entry point: called directly, no captures parameter.
pub type PlainEntry = extern "C" fn(*const ValuePtr, u32) -> ValuePtr;

/// Builds a `Closure` Value. `capture_slots` holds the *current* pointer
/// value of each variable being captured; each is increfed here, snapshot
/// at this instant — not re-read later, which is what keeps the closure
/// safe to hand to another thread whose stack may see the original scope
/// gone.
///
/// # Safety
/// Every pointer in `capture_slots` must be a live `ValuePtr`.
pub unsafe fn closure_new(func_ptr: usize, param_count: u32, capture_slots: &[ValuePtr]) -> ValuePtr {
    let captures: Box<[ValuePtr]> = capture_slots
        .iter()
        .map(|&slot| {
            unsafe { strada_incref(slot) };
            slot
        })
        .collect();
    strada_core::value::new_closure(func_ptr, param_count, captures)
}

/// Invokes `closure` with `args` (at most `MAX_CLOSURE_ARGS`). Dispatches
/// on whether `closure` is a `Closure` (captures passed through) or a bare
/// `CPointer` (captures omitted). Any other kind is a malformed-descriptor
/// fault; returns Undef.
///
/// # Safety
/// `closure` must be a live `ValuePtr`; every pointer in `args` must be a
/// live `ValuePtr`.
pub unsafe fn closure_call(closure: ValuePtr, args: &[ValuePtr]) -> ValuePtr {
    if args.len() > MAX_CLOSURE_ARGS {
        crate::error::set_fault(crate::error::RuntimeFault::MalformedDescriptor(format!(
            "closure_call: {} args exceeds the {} arg limit",
            args.len(),
            MAX_CLOSURE_ARGS
        )));
        return strada_core::value::strada_new_undef();
    }
    match unsafe { (*closure).kind() } {
        ValueKind::Closure(body) => {
            let entry: ClosureEntry = unsafe { std::mem::transmute(body.func_ptr) };
            entry(body.captures.as_ptr(), body.captures.len() as u32, args.as_ptr(), args.len() as u32)
        }
        ValueKind::CPointer(p) => {
            let entry: PlainEntry = unsafe { std::mem::transmute(*p as usize) };
            entry(args.as_ptr(), args.len() as u32)
        }
        _ => {
            crate::error::set_fault(crate::error::RuntimeFault::MalformedDescriptor(
                "closure_call requires a Closure or CPointer value".into(),
            ));
            strada_core::value::strada_new_undef()
        }
    }
}

/// Invokes a thread-body closure with zero explicit arguments — the shape
/// `concurrency.rs::thread_create` needs, factored out here so both
/// callers share one definition of "how a `Closure` Value gets called".
///
/// # Safety
/// `closure` must be a live `ValuePtr` of kind `Closure`.
pub unsafe fn call_with_no_args(closure: ValuePtr) -> ValuePtr {
    unsafe { closure_call(closure, &[]) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strada_core::value::{strada_decref, strada_new_int};

    extern "C" fn adds_one(_captures: *const ValuePtr, _n_captures: u32, args: *const ValuePtr, n_args: u32) -> ValuePtr {
        assert_eq!(n_args, 1);
        let arg = unsafe { *args };
        let v = unsafe { crate::coercion::to_int(arg) };
        strada_new_int(v + 1)
    }

    #[test]
    fn closure_call_passes_explicit_args() {
        let closure = unsafe { closure_new(adds_one as usize, 1, &[]) };
        let arg = strada_new_int(41);
        let result = unsafe { closure_call(closure, &[arg]) };
        assert!(matches!(unsafe { (*result).kind() }, ValueKind::Int(42)));
        unsafe {
            strada_decref(closure);
            strada_decref(arg);
            strada_decref(result);
        }
    }

    extern "C" fn reads_capture(captures: *const ValuePtr, n_captures: u32, _args: *const ValuePtr, _n_args: u32) -> ValuePtr {
        assert_eq!(n_captures, 1);
        let cap = unsafe { *captures };
        strada_new_int(unsafe { crate::coercion::to_int(cap) })
    }

    #[test]
    fn capture_snapshots_pointer_at_construction() {
        let captured = strada_new_int(99);
        let closure = unsafe { closure_new(reads_capture as usize, 0, &[captured]) };
        let result = unsafe { closure_call(closure, &[]) };
        assert!(matches!(unsafe { (*result).kind() }, ValueKind::Int(99)));
        unsafe {
            strada_decref(captured);
            strada_decref(closure);
            strada_decref(result);
        }
    }

    #[test]
    fn call_with_no_args_matches_thread_entry_shape() {
        extern "C" fn entry(_captures: *const ValuePtr, _n_captures: u32, _args: *const ValuePtr, _n_args: u32) -> ValuePtr {
            strada_new_int(7)
        }
        let closure = unsafe { closure_new(entry as usize, 0, &[]) };
        let result = unsafe { call_with_no_args(closure) };
        assert!(matches!(unsafe { (*result).kind() }, ValueKind::Int(7)));
        unsafe {
            strada_decref(closure);
            strada_decref(result);
        }
    }
}
