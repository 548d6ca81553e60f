//! Runtime-internal fault channel.
//!
//! Distinct from script-level exceptions (`exceptions.rs`), which use a
//! thread-local checkpoint stack and unwind via `catch_unwind`/
//! `resume_unwind`. `RuntimeFault` covers faults the *runtime itself*
//! raises against its own invariants — failed allocation, a malformed FFI
//! descriptor, a corrupt blessed-class tag — none of which a Strada script
//! can catch. Per §7's taxonomy these resolve to Undef, an integer status,
//! or a fatal exit; they never unwind across the `extern "C"` boundary.
//!
//! Modeled on the teacher's thread-local `LAST_ERROR` slot in its own
//! `error.rs`, extended with a `catch_unwind` helper every public entry
//! point in this crate funnels through, since unwinding into
//! compiler-emitted C is undefined behavior.

use std::cell::RefCell;
use std::ffi::CString;
use std::fmt;

#[derive(Debug, Clone)]
pub enum RuntimeFault {
    Allocation(String),
    MalformedDescriptor(String),
    Corruption(String),
    Fatal(String),
}

impl fmt::Display for RuntimeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeFault::Allocation(m) => write!(f, "allocation failure: {m}"),
            RuntimeFault::MalformedDescriptor(m) => write!(f, "malformed FFI descriptor: {m}"),
            RuntimeFault::Corruption(m) => write!(f, "corruption detected: {m}"),
            RuntimeFault::Fatal(m) => write!(f, "fatal: {m}"),
        }
    }
}

impl std::error::Error for RuntimeFault {}

thread_local! {
    static LAST_FAULT: RefCell<Option<RuntimeFault>> = const { RefCell::new(None) };
    static FAULT_CSTRING: RefCell<Option<CString>> = const { RefCell::new(None) };
}

pub fn set_fault(fault: RuntimeFault) {
    tracing::error!(target: "strada_runtime::error", %fault, "runtime fault raised");
    FAULT_CSTRING.with(|cs| *cs.borrow_mut() = None);
    LAST_FAULT.with(|f| *f.borrow_mut() = Some(fault));
}

pub fn take_fault() -> Option<RuntimeFault> {
    LAST_FAULT.with(|f| f.borrow_mut().take())
}

pub fn has_fault() -> bool {
    LAST_FAULT.with(|f| f.borrow().is_some())
}

pub fn clear_fault() {
    LAST_FAULT.with(|f| *f.borrow_mut() = None);
    FAULT_CSTRING.with(|f| *f.borrow_mut() = None);
}

/// FFI-safe accessor: returns a `const char*` to the last fault's message,
/// valid until the next call to any `strada_fault_*` function on this
/// thread, or null if there is none pending.
#[unsafe(no_mangle)]
pub extern "C" fn strada_fault_message() -> *const std::os::raw::c_char {
    let msg = LAST_FAULT.with(|f| f.borrow().as_ref().map(|e| e.to_string()));
    match msg {
        Some(m) => {
            let sanitized = m.replace('\0', "");
            let cstring = CString::new(sanitized).unwrap_or_default();
            let ptr = cstring.as_ptr();
            FAULT_CSTRING.with(|cs| *cs.borrow_mut() = Some(cstring));
            ptr
        }
        None => std::ptr::null(),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn strada_has_fault() -> bool {
    has_fault()
}

#[unsafe(no_mangle)]
pub extern "C" fn strada_clear_fault() {
    clear_fault();
}

/// Exposed for `exceptions.rs`, which needs to format whatever panic payload
/// `catch_unwind` handed it when that payload turns out not to be a Strada
/// exception (an internal Rust panic escaping through a `try` block).
pub fn format_panic_payload_public(payload: &(dyn std::any::Any + Send)) -> String {
    format_panic_payload(payload)
}

fn format_panic_payload(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs `f`, catching any internal panic and converting it to a
/// `RuntimeFault::Fatal` rather than letting it unwind into the caller's C
/// frames. Every public `extern "C"` entry point that is not itself part
/// of the exception mechanism (`exceptions.rs`) should be wrapped in this.
///
/// On a caught panic, returns `None`; callers map that to whatever
/// "absent" value the ABI for that function uses (null pointer, Undef,
/// -1, etc, per §7).
/// Fatal exits (§7): out-of-memory, an uncaught exception, or exceeding a
/// hard limit (try-stack depth, package count, parent count, method table
/// size) all print to stderr and exit with status 1 rather than risk
/// silent corruption. Callers that detect one of these conditions should
/// route through here instead of returning an error value.
pub fn fatal_exit(message: &str) -> ! {
    tracing::error!(target: "strada_runtime::error", message, "fatal exit");
    eprintln!("strada: fatal: {message}");
    std::process::exit(1);
}

pub fn guard<F, T>(f: F) -> Option<T>
where
    F: FnOnce() -> T + std::panic::UnwindSafe,
{
    match std::panic::catch_unwind(f) {
        Ok(v) => Some(v),
        Err(payload) => {
            let msg = format_panic_payload(&*payload);
            set_fault(RuntimeFault::Fatal(msg));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_take_roundtrip() {
        clear_fault();
        set_fault(RuntimeFault::Allocation("oom".into()));
        assert!(has_fault());
        let f = take_fault().unwrap();
        assert!(matches!(f, RuntimeFault::Allocation(_)));
        assert!(!has_fault());
    }

    #[test]
    fn guard_converts_panic_to_fault() {
        clear_fault();
        let result: Option<i32> = guard(|| panic!("boom"));
        assert!(result.is_none());
        assert!(has_fault());
        clear_fault();
    }

    #[test]
    fn guard_passes_through_normal_return() {
        clear_fault();
        let result = guard(|| 42);
        assert_eq!(result, Some(42));
    }
}
