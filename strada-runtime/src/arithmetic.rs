//! Arithmetic, comparison, and concatenation (§4.3).
//!
//! Numeric operators coerce both operands to `Num` unless both are already
//! `Int`, in which case the result stays `Int`. Grounded on the overall
//! shape of the teacher's (deleted) stack-threaded `arithmetic.rs` — kept
//! its use of `wrapping_*` integer ops and its div-by-zero-as-fault
//! handling — reworked from popping a shared stack to taking two `Value*`
//! arguments directly and returning a fresh `Value*`.

use strada_core::value::{ValueKind, ValuePtr, decref, strada_incref, strada_new_int, strada_new_num, strada_new_str_len};

use crate::coercion::{to_bool, to_int, to_num, to_str};
use crate::error::{RuntimeFault, set_fault};

#[derive(Clone, Copy)]
enum Numeric {
    Int(i64),
    Num(f64),
}

/// # Safety
/// `a` and `b` must be live `ValuePtr`s.
unsafe fn numeric_pair(a: ValuePtr, b: ValuePtr) -> (Numeric, Numeric) {
    let both_int = matches!(unsafe { (*a).kind() }, ValueKind::Int(_)) && matches!(unsafe { (*b).kind() }, ValueKind::Int(_));
    if both_int {
        (Numeric::Int(unsafe { to_int(a) }), Numeric::Int(unsafe { to_int(b) }))
    } else {
        (Numeric::Num(unsafe { to_num(a) }), Numeric::Num(unsafe { to_num(b) }))
    }
}

macro_rules! numeric_binop {
    ($name:ident, $int_op:expr, $float_op:expr) => {
        /// # Safety
        /// `a` and `b` must be live `ValuePtr`s.
        pub unsafe fn $name(a: ValuePtr, b: ValuePtr) -> ValuePtr {
            match unsafe { numeric_pair(a, b) } {
                (Numeric::Int(x), Numeric::Int(y)) => strada_new_int($int_op(x, y)),
                (Numeric::Num(x), Numeric::Num(y)) => strada_new_num($float_op(x, y)),
                _ => unreachable!("numeric_pair always returns matching variants"),
            }
        }
    };
}

numeric_binop!(add, i64::wrapping_add, |x: f64, y: f64| x + y);
numeric_binop!(subtract, i64::wrapping_sub, |x: f64, y: f64| x - y);
numeric_binop!(multiply, i64::wrapping_mul, |x: f64, y: f64| x * y);

/// # Safety
/// `a` and `b` must be live `ValuePtr`s.
pub unsafe fn divide(a: ValuePtr, b: ValuePtr) -> ValuePtr {
    match unsafe { numeric_pair(a, b) } {
        (Numeric::Int(x), Numeric::Int(y)) => {
            if y == 0 {
                set_fault(RuntimeFault::Fatal("division by zero".into()));
                strada_new_int(0)
            } else if x == i64::MIN && y == -1 {
                strada_new_int(i64::MIN.wrapping_div(-1))
            } else {
                strada_new_int(x.wrapping_div(y))
            }
        }
        (Numeric::Num(x), Numeric::Num(y)) => strada_new_num(x / y),
        _ => unreachable!(),
    }
}

/// # Safety
/// `a` and `b` must be live `ValuePtr`s.
pub unsafe fn modulo(a: ValuePtr, b: ValuePtr) -> ValuePtr {
    match unsafe { numeric_pair(a, b) } {
        (Numeric::Int(x), Numeric::Int(y)) => {
            if y == 0 {
                set_fault(RuntimeFault::Fatal("modulo by zero".into()));
                strada_new_int(0)
            } else if x == i64::MIN && y == -1 {
                strada_new_int(0)
            } else {
                strada_new_int(x.wrapping_rem(y))
            }
        }
        (Numeric::Num(x), Numeric::Num(y)) => strada_new_num(x % y),
        _ => unreachable!(),
    }
}

fn numeric_f64(n: Numeric) -> f64 {
    match n {
        Numeric::Int(i) => i as f64,
        Numeric::Num(f) => f,
    }
}

macro_rules! numeric_compare {
    ($name:ident, $op:tt) => {
        /// # Safety
        /// `a` and `b` must be live `ValuePtr`s.
        pub unsafe fn $name(a: ValuePtr, b: ValuePtr) -> ValuePtr {
            let (x, y) = unsafe { numeric_pair(a, b) };
            strada_new_int((numeric_f64(x) $op numeric_f64(y)) as i64)
        }
    };
}

numeric_compare!(lt, <);
numeric_compare!(gt, >);
numeric_compare!(lte, <=);
numeric_compare!(gte, >=);
numeric_compare!(eq, ==);
numeric_compare!(neq, !=);

/// Spaceship `<=>` (§4.3): numeric compare, result in `{-1,0,1}`.
///
/// # Safety
/// `a` and `b` must be live `ValuePtr`s.
pub unsafe fn spaceship(a: ValuePtr, b: ValuePtr) -> ValuePtr {
    let (x, y) = unsafe { numeric_pair(a, b) };
    let (x, y) = (numeric_f64(x), numeric_f64(y));
    let result = if x < y {
        -1
    } else if x > y {
        1
    } else {
        0
    };
    strada_new_int(result)
}

/// `cmp` (§4.3): byte-wise string compare, result in `{-1,0,1}`.
///
/// # Safety
/// `a` and `b` must be live `ValuePtr`s.
pub unsafe fn cmp(a: ValuePtr, b: ValuePtr) -> ValuePtr {
    let (sa, sb) = unsafe { (to_str(a), to_str(b)) };
    let result = match sa.cmp(&sb) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    };
    strada_new_int(result)
}

/// Logical not, Forth-style nonzero-is-true per `to_bool`.
///
/// # Safety
/// `a` must be a live `ValuePtr`.
pub unsafe fn not(a: ValuePtr) -> ValuePtr {
    strada_new_int(!unsafe { to_bool(a) } as i64)
}

/// Concatenation (§4.3): coerces both operands to their string form and
/// allocates a brand-new `Str`. In-place append is never performed here,
/// even when the caller happens to hold the sole reference to `a` — the
/// runtime cannot distinguish a sole-owned temporary from an aliased
/// global (§4.3, §9).
///
/// # Safety
/// `a` and `b` must be live `ValuePtr`s.
pub unsafe fn concat_sv(a: ValuePtr, b: ValuePtr) -> ValuePtr {
    let mut bytes = unsafe { to_str(a) };
    bytes.extend_from_slice(&unsafe { to_str(b) });
    unsafe { strada_new_str_len(bytes.as_ptr(), bytes.len()) }
}

/// Explicit in-place append, distinct from `concat_sv`: the code generator
/// may call this only when it can prove `*slot` is not aliased elsewhere.
/// Mutates `*slot`'s `Str` buffer directly when `*slot` is a sole-owned
/// (`refcount == 1`) `Str`; otherwise falls back to `concat_sv` and
/// replaces `*slot`.
///
/// # Safety
/// `slot` must point to a live `ValuePtr` this call may freely replace.
pub unsafe fn append(slot: *mut ValuePtr, b: ValuePtr) {
    let target = unsafe { *slot };
    let sole_owned_str = matches!(unsafe { (*target).kind() }, ValueKind::Str(_)) && unsafe { strada_core::value::refcount(target) } == 1;
    if sole_owned_str {
        if let ValueKind::Str(buf) = unsafe { (*target).kind_mut() } {
            buf.extend_from_slice(&unsafe { to_str(b) });
        }
    } else {
        let new_val = unsafe { concat_sv(target, b) };
        unsafe {
            decref(target);
            *slot = new_val;
        }
    }
}

fn add_one(old: ValuePtr, delta: i64) -> ValuePtr {
    match unsafe { (*old).kind() } {
        ValueKind::Int(i) => strada_new_int(i.wrapping_add(delta)),
        _ => strada_new_num(unsafe { to_num(old) } + delta as f64),
    }
}

/// Prefix `++`/`--`: replaces `*slot` with a new numeric Value and returns
/// an owned handle to it.
///
/// # Safety
/// `slot` must point to a live `ValuePtr`.
pub unsafe fn incr_prefix(slot: *mut ValuePtr) -> ValuePtr {
    step_prefix(slot, 1)
}

/// # Safety
/// `slot` must point to a live `ValuePtr`.
pub unsafe fn decr_prefix(slot: *mut ValuePtr) -> ValuePtr {
    step_prefix(slot, -1)
}

unsafe fn step_prefix(slot: *mut ValuePtr, delta: i64) -> ValuePtr {
    let old = unsafe { *slot };
    let new_val = add_one(old, delta);
    unsafe {
        decref(old);
        *slot = new_val;
        strada_incref(new_val);
    }
    new_val
}

/// Postfix `++`/`--`: replaces `*slot` with a new numeric Value but returns
/// a held reference to the *old* value (§4.3).
///
/// # Safety
/// `slot` must point to a live `ValuePtr`.
pub unsafe fn incr_postfix(slot: *mut ValuePtr) -> ValuePtr {
    step_postfix(slot, 1)
}

/// # Safety
/// `slot` must point to a live `ValuePtr`.
pub unsafe fn decr_postfix(slot: *mut ValuePtr) -> ValuePtr {
    step_postfix(slot, -1)
}

unsafe fn step_postfix(slot: *mut ValuePtr, delta: i64) -> ValuePtr {
    let old = unsafe { *slot };
    let new_val = add_one(old, delta);
    unsafe {
        strada_incref(old);
        *slot = new_val;
        decref(old);
    }
    old
}

#[cfg(test)]
mod tests {
    use super::*;
    use strada_core::value::{strada_decref, strada_new_int, strada_new_num};

    #[test]
    fn int_plus_int_stays_int() {
        let a = strada_new_int(2);
        let b = strada_new_int(3);
        let r = unsafe { add(a, b) };
        assert!(matches!(unsafe { (*r).kind() }, ValueKind::Int(5)));
        unsafe {
            strada_decref(a);
            strada_decref(b);
            strada_decref(r);
        }
    }

    #[test]
    fn mixed_int_num_promotes_to_num() {
        let a = strada_new_int(2);
        let b = strada_new_num(0.5);
        let r = unsafe { add(a, b) };
        match unsafe { (*r).kind() } {
            ValueKind::Num(n) => assert_eq!(*n, 2.5),
            other => panic!("expected Num, got {other:?}"),
        }
        unsafe {
            strada_decref(a);
            strada_decref(b);
            strada_decref(r);
        }
    }

    #[test]
    fn divide_by_zero_sets_fault_and_returns_sentinel() {
        crate::error::clear_fault();
        let a = strada_new_int(10);
        let b = strada_new_int(0);
        let r = unsafe { divide(a, b) };
        assert!(matches!(unsafe { (*r).kind() }, ValueKind::Int(0)));
        assert!(crate::error::has_fault());
        crate::error::clear_fault();
        unsafe {
            strada_decref(a);
            strada_decref(b);
            strada_decref(r);
        }
    }

    #[test]
    fn concat_never_mutates_in_place() {
        let a = unsafe { strada_core::value::strada_new_str_len(b"foo".as_ptr(), 3) };
        let b = unsafe { strada_core::value::strada_new_str_len(b"bar".as_ptr(), 3) };
        unsafe { strada_incref(a) };
        let r = unsafe { concat_sv(a, b) };
        assert_ne!(r, a);
        match unsafe { (*a).kind() } {
            ValueKind::Str(bytes) => assert_eq!(bytes, b"foo"),
            _ => panic!(),
        }
        match unsafe { (*r).kind() } {
            ValueKind::Str(bytes) => assert_eq!(bytes, b"foobar"),
            _ => panic!(),
        }
        unsafe {
            strada_decref(a);
            strada_decref(a);
            strada_decref(b);
            strada_decref(r);
        }
    }

    #[test]
    fn postfix_increment_returns_old_value() {
        let mut slot = strada_new_int(5);
        let old = unsafe { incr_postfix(&mut slot as *mut _) };
        assert!(matches!(unsafe { (*old).kind() }, ValueKind::Int(5)));
        assert!(matches!(unsafe { (*slot).kind() }, ValueKind::Int(6)));
        unsafe {
            strada_decref(old);
            strada_decref(slot);
        }
    }

    #[test]
    fn prefix_increment_returns_new_value() {
        let mut slot = strada_new_int(5);
        let new_val = unsafe { incr_prefix(&mut slot as *mut _) };
        assert_eq!(new_val, slot);
        assert!(matches!(unsafe { (*slot).kind() }, ValueKind::Int(6)));
        unsafe {
            strada_decref(new_val);
            strada_decref(slot);
        }
    }
}
