//! FFI bridge (§4.11): raw and passthrough families over `dlopen`/
//! `dlsym`, each supporting 0–10 arguments, plus the pointer-accessor set
//! that lets scripts take the address of an Int/Num slot for C code to
//! write through.
//!
//! Grounded on `libc`'s raw `dlopen`/`dlsym`/`dlclose`/`dlerror` bindings
//! (already a dependency for exactly this) and `nix`'s safer wrappers
//! elsewhere in this crate's POSIX surface; the arity-indexed dispatch
//! macro below is the Rust equivalent of the source's C `switch` over
//! argument count, since Rust has no variadic `extern "C"` call syntax.

use std::ffi::{CStr, CString, c_char, c_void};

use strada_core::value::{ValueKind, ValuePtr, strada_new_int, strada_new_num, strada_new_str_len, strada_new_undef};

use crate::coercion::{to_int, to_num, to_str};
use crate::error::{RuntimeFault, set_fault};

/// Generates an arity-indexed dispatch over `$args` (a `&[T]]` already
/// coerced to the native parameter type `$t`), transmuting `$func` to an
/// `extern "C" fn($t, $t, ...) -> $r` of matching arity and invoking it.
macro_rules! dispatch_arity {
    ($func:expr, $r:ty, $t:ty, $args:expr) => {{
        type F0 = extern "C" fn() -> $r;
        type F1 = extern "C" fn($t) -> $r;
        type F2 = extern "C" fn($t, $t) -> $r;
        type F3 = extern "C" fn($t, $t, $t) -> $r;
        type F4 = extern "C" fn($t, $t, $t, $t) -> $r;
        type F5 = extern "C" fn($t, $t, $t, $t, $t) -> $r;
        type F6 = extern "C" fn($t, $t, $t, $t, $t, $t) -> $r;
        type F7 = extern "C" fn($t, $t, $t, $t, $t, $t, $t) -> $r;
        type F8 = extern "C" fn($t, $t, $t, $t, $t, $t, $t, $t) -> $r;
        type F9 = extern "C" fn($t, $t, $t, $t, $t, $t, $t, $t, $t) -> $r;
        type F10 = extern "C" fn($t, $t, $t, $t, $t, $t, $t, $t, $t, $t) -> $r;
        let a: &[$t] = $args;
        match a.len() {
            0 => unsafe { std::mem::transmute::<usize, F0>($func)() },
            1 => unsafe { std::mem::transmute::<usize, F1>($func)(a[0]) },
            2 => unsafe { std::mem::transmute::<usize, F2>($func)(a[0], a[1]) },
            3 => unsafe { std::mem::transmute::<usize, F3>($func)(a[0], a[1], a[2]) },
            4 => unsafe { std::mem::transmute::<usize, F4>($func)(a[0], a[1], a[2], a[3]) },
            5 => unsafe { std::mem::transmute::<usize, F5>($func)(a[0], a[1], a[2], a[3], a[4]) },
            6 => unsafe { std::mem::transmute::<usize, F6>($func)(a[0], a[1], a[2], a[3], a[4], a[5]) },
            7 => unsafe { std::mem::transmute::<usize, F7>($func)(a[0], a[1], a[2], a[3], a[4], a[5], a[6]) },
            8 => unsafe { std::mem::transmute::<usize, F8>($func)(a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7]) },
            9 => unsafe { std::mem::transmute::<usize, F9>($func)(a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7], a[8]) },
            10 => unsafe { std::mem::transmute::<usize, F10>($func)(a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7], a[8], a[9]) },
            n => {
                set_fault(RuntimeFault::MalformedDescriptor(format!("FFI call with {n} args exceeds the 10 arg limit")));
                return Default::default();
            }
        }
    }};
}

/// Raw family: coerces every argument to `int64_t`.
///
/// # Safety
/// `func_ptr` must be a valid, ABI-compatible native function pointer for
/// the arity of `args`; every pointer in `args` must be a live `ValuePtr`.
pub unsafe fn dl_call_int(func_ptr: usize, args: &[ValuePtr]) -> ValuePtr {
    let native: Vec<i64> = args.iter().map(|&a| unsafe { to_int(a) }).collect();
    let result: i64 = dispatch_arity!(func_ptr, i64, i64, &native);
    strada_new_int(result)
}

/// Raw family: coerces every argument to `double`.
///
/// # Safety
/// Same contract as `dl_call_int`.
pub unsafe fn dl_call_num(func_ptr: usize, args: &[ValuePtr]) -> ValuePtr {
    let native: Vec<f64> = args.iter().map(|&a| unsafe { to_num(a) }).collect();
    let result: f64 = dispatch_arity!(func_ptr, f64, f64, &native);
    strada_new_num(result)
}

/// Raw family: coerces every argument to `const char*`; the callee's
/// return value is copied back into a fresh Str up to its NUL terminator.
///
/// # Safety
/// Same contract as `dl_call_int`, plus: the returned pointer, if
/// non-null, must point to a valid NUL-terminated C string.
pub unsafe fn dl_call_str(func_ptr: usize, args: &[ValuePtr]) -> ValuePtr {
    let cstrings: Vec<CString> = args
        .iter()
        .map(|&a| CString::new(unsafe { to_str(a) }).unwrap_or_default())
        .collect();
    let native: Vec<*const c_char> = cstrings.iter().map(|c| c.as_ptr()).collect();
    let result: *const c_char = dispatch_arity!(func_ptr, *const c_char, *const c_char, &native);
    if result.is_null() {
        return strada_new_undef();
    }
    let bytes = unsafe { CStr::from_ptr(result) }.to_bytes().to_vec();
    unsafe { strada_new_str_len(bytes.as_ptr(), bytes.len()) }
}

/// Raw family: coerces every argument to `int64_t`, discards the return
/// value, and always yields Undef.
///
/// # Safety
/// Same contract as `dl_call_int`.
pub unsafe fn dl_call_void(func_ptr: usize, args: &[ValuePtr]) -> ValuePtr {
    let native: Vec<i64> = args.iter().map(|&a| unsafe { to_int(a) }).collect();
    let _: i64 = dispatch_arity!(func_ptr, i64, i64, &native);
    strada_new_undef()
}

/// Passthrough family: the `Value*` pointers themselves are passed to the
/// symbol, which is expected to call back into this crate's own coercion
/// helpers. All four passthrough variants share this implementation; they
/// differ only in how the source's C side chooses to use its return value.
///
/// # Safety
/// Same contract as `dl_call_int`, specialized to `ValuePtr`-typed
/// parameters.
pub unsafe fn dl_call_sv(func_ptr: usize, args: &[ValuePtr]) -> ValuePtr {
    let result: ValuePtr = dispatch_arity!(func_ptr, ValuePtr, ValuePtr, args);
    if result.is_null() { strada_new_undef() } else { result }
}

pub use dl_call_sv as dl_call_int_sv;
pub use dl_call_sv as dl_call_str_sv;
pub use dl_call_sv as dl_call_void_sv;

// --- dlopen/dlsym/dlclose/dlerror -----------------------------------------

/// Mirrors POSIX `dlopen`; the handle is carried as an Int holding the
/// raw pointer's bits (0 on failure, matching a null handle). An empty
/// `path` is passed through as `NULL`, POSIX's "handle on the running
/// program itself" convention, rather than as the literal empty-string
/// filename (which would just fail to open).
pub fn dlopen(path: &[u8], flags: i32) -> i64 {
    let handle = if path.is_empty() {
        unsafe { libc::dlopen(std::ptr::null(), flags) }
    } else {
        let cpath = CString::new(path).unwrap_or_default();
        unsafe { libc::dlopen(cpath.as_ptr(), flags) }
    };
    handle as usize as i64
}

/// Resolves `symbol` in `handle` (an Int from `dlopen`). Returns 0 if the
/// symbol is not found.
pub fn dlsym(handle: i64, symbol: &[u8]) -> usize {
    let csym = CString::new(symbol).unwrap_or_default();
    let ptr = unsafe { libc::dlsym(handle as usize as *mut c_void, csym.as_ptr()) };
    ptr as usize
}

pub fn dlclose(handle: i64) -> i32 {
    unsafe { libc::dlclose(handle as usize as *mut c_void) }
}

/// Returns the last `dlerror()` message, or an empty Str if none is
/// pending (dlerror's own "clear on read" semantics apply).
pub fn dlerror() -> ValuePtr {
    let msg = unsafe { libc::dlerror() };
    if msg.is_null() {
        return strada_core::value::new_str(Vec::new());
    }
    let bytes = unsafe { CStr::from_ptr(msg) }.to_bytes().to_vec();
    strada_core::value::new_str(bytes)
}

/// Calls a loaded library's `__strada_export_info()` convention entry
/// point (an `int64_t -> const char*`-shaped export-metadata accessor).
///
/// # Safety
/// `func_ptr` must be `__strada_export_info`'s real address.
pub unsafe fn dl_call_export_info(func_ptr: usize) -> ValuePtr {
    unsafe { dl_call_str(func_ptr, &[]) }
}

/// Calls a loaded library's `__strada_version()` convention entry point.
///
/// # Safety
/// `func_ptr` must be `__strada_version`'s real address.
pub unsafe fn dl_call_version(func_ptr: usize) -> ValuePtr {
    unsafe { dl_call_str(func_ptr, &[]) }
}

// --- pointer accessors -----------------------------------------------------

/// Takes the address of an Int Value's payload, exposing it as a raw
/// `CPointer` for C code to write through.
///
/// # Safety
/// `ptr` must be a live `ValuePtr` of kind Int, and must outlive every use
/// of the returned pointer.
pub unsafe fn int_ptr(ptr: ValuePtr) -> *mut i64 {
    match unsafe { (*ptr).kind_mut() } {
        ValueKind::Int(i) => i as *mut i64,
        _ => std::ptr::null_mut(),
    }
}

/// # Safety
/// Same contract as `int_ptr`, for Num Values.
pub unsafe fn num_ptr(ptr: ValuePtr) -> *mut f64 {
    match unsafe { (*ptr).kind_mut() } {
        ValueKind::Num(n) => n as *mut f64,
        _ => std::ptr::null_mut(),
    }
}

/// # Safety
/// `p` must be null or a valid, live `*mut i64`.
pub unsafe fn ptr_deref_int(p: *mut i64) -> i64 {
    if p.is_null() { 0 } else { unsafe { *p } }
}

/// # Safety
/// `p` must be null or a valid, live `*mut i64`.
pub unsafe fn ptr_set_int(p: *mut i64, value: i64) {
    if !p.is_null() {
        unsafe { *p = value };
    }
}

/// # Safety
/// `p` must be null or a valid, live `*mut f64`.
pub unsafe fn ptr_deref_num(p: *mut f64) -> f64 {
    if p.is_null() { 0.0 } else { unsafe { *p } }
}

/// # Safety
/// `p` must be null or a valid, live `*mut f64`.
pub unsafe fn ptr_set_num(p: *mut f64, value: f64) {
    if !p.is_null() {
        unsafe { *p = value };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strada_core::value::{strada_decref, strada_new_int, strada_new_num};

    extern "C" fn native_add(a: i64, b: i64) -> i64 {
        a + b
    }

    #[test]
    fn raw_int_family_dispatches_by_arity() {
        let a = strada_new_int(3);
        let b = strada_new_int(4);
        let result = unsafe { dl_call_int(native_add as usize, &[a, b]) };
        assert!(matches!(unsafe { (*result).kind() }, ValueKind::Int(7)));
        unsafe {
            strada_decref(a);
            strada_decref(b);
            strada_decref(result);
        }
    }

    extern "C" fn native_double(x: f64) -> f64 {
        x * 2.0
    }

    #[test]
    fn raw_num_family_dispatches_single_arg() {
        let x = strada_new_num(21.0);
        let result = unsafe { dl_call_num(native_double as usize, &[x]) };
        match unsafe { (*result).kind() } {
            ValueKind::Num(n) => assert_eq!(*n, 42.0),
            other => panic!("expected Num, got {other:?}"),
        }
        unsafe {
            strada_decref(x);
            strada_decref(result);
        }
    }

    #[test]
    fn int_ptr_round_trips_through_raw_pointer() {
        let v = strada_new_int(10);
        let p = unsafe { int_ptr(v) };
        unsafe { ptr_set_int(p, 99) };
        assert_eq!(unsafe { ptr_deref_int(p) }, 99);
        match unsafe { (*v).kind() } {
            ValueKind::Int(99) => {}
            other => panic!("expected Int(99), got {other:?}"),
        }
        unsafe { strada_decref(v) };
    }

    #[test]
    fn dlopen_self_and_dlsym_known_symbol() {
        let handle = dlopen(b"", libc::RTLD_NOW);
        assert_ne!(handle, 0);
        let sym = dlsym(handle, b"malloc\0");
        assert_ne!(sym, 0);
        assert_eq!(dlclose(handle), 0);
    }
}
