//! Value: the heterogeneous, reference-counted tagged record every Strada
//! script-level variable holds.
//!
//! # Layout
//!
//! `ValueInner` carries the atomic refcount, the optional blessed-class tag
//! (meaningful only when `kind == Ref`), and the per-kind payload. Compiled
//! code only ever sees `ValuePtr` (`*mut ValueInner`) — this mirrors the
//! teacher's boundary between a safe Rust-side representation
//! (`stack::stack_value_to_value`/`value_to_stack_value`) and the raw
//! pointer layout handed across the FFI line. Here the "FFI line" is every
//! public function in this crate and in `strada-runtime`: per the spec,
//! "every exchange between generated code and the runtime is through
//! `Value*`".
//!
//! `Value` is a safe owning handle around `ValuePtr` for writing operator
//! bodies without hand-rolling refcount arithmetic at every call site:
//! `Clone` increments, `Drop` decrements (running the release cascade at
//! zero). The `extern "C"` functions at the bottom of this module are thin
//! conversions between the two, exactly like `Box::into_raw`/`Box::from_raw`
//! pairs used throughout the teacher's `stack.rs`.

use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::array::ArrayBody;
use crate::dict::DictBody;

/// Raw ABI pointer type: this is "`Value*`" in the spec's prose.
pub type ValuePtr = *mut ValueInner;

/// Anything that owns an OS or library resource released on final decref
/// (FileHandle, Regex, Socket). Concrete implementations live in
/// `strada-runtime`, which has the crates (std::fs, regex, libc sockets)
/// those resources need; `strada-core` only needs to know how to drop one.
pub trait ManagedResource: std::fmt::Debug + Send + Sync + std::any::Any {
    /// Human-readable resource kind, used in corruption/diagnostic logging.
    fn resource_kind(&self) -> &'static str;
    fn as_any(&self) -> &dyn std::any::Any;
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// A Ref value: shared ownership of a target, plus the blessed-class tag
/// lives on the *referring* Value (see `ValueInner::blessed_class`), not here.
#[derive(Debug)]
pub struct RefBody {
    pub target: ValuePtr,
}

/// `CStruct`: an owned byte buffer tagged with a C type name and its size.
#[derive(Debug)]
pub struct CStructBody {
    pub type_name: Box<str>,
    pub bytes: Vec<u8>,
}

/// A closure: a function pointer, its declared parameter count, and the
/// array of captured value-slot pointers snapshotted at construction time.
///
/// Each `captures[i]` is an owned (incref'd) `ValuePtr`. For a captured
/// variable the code generator wants to mutate from inside the closure and
/// observe from the outer scope, that pointer targets a `Ref` value: the
/// array slot itself is a fixed snapshot (per spec, "captures... deeply
/// copied... at construction"), but `deref_set` on a shared `Ref` mutates
/// the *referent's* payload in place, so every other holder of a pointer to
/// that same referent (the outer scope's own copy of the Ref, or a pointer
/// to the target directly) observes the change. No extra indirection layer
/// is needed beyond the Ref mechanism already in §4.6.
#[derive(Debug)]
pub struct ClosureBody {
    pub func_ptr: usize,
    pub param_count: u32,
    pub captures: Box<[ValuePtr]>,
}

/// Per-kind payload. `Undef` carries nothing; everything else matches §3.
pub enum ValueKind {
    Undef,
    Int(i64),
    Num(f64),
    /// Binary-safe bytes. Length is `Vec::len()`, never re-derived from a
    /// NUL terminator (strings may contain embedded NULs).
    Str(Vec<u8>),
    Array(ArrayBody),
    Hash(DictBody),
    Ref(RefBody),
    FileHandle(Box<dyn ManagedResource>),
    Regex(Box<dyn ManagedResource>),
    Socket(Box<dyn ManagedResource>),
    CStruct(CStructBody),
    /// Borrowed raw pointer. The runtime never frees it.
    CPointer(*mut c_void),
    Closure(ClosureBody),
}

impl std::fmt::Debug for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::Undef => write!(f, "Undef"),
            ValueKind::Int(i) => write!(f, "Int({i})"),
            ValueKind::Num(n) => write!(f, "Num({n})"),
            ValueKind::Str(b) => write!(f, "Str({} bytes)", b.len()),
            ValueKind::Array(a) => write!(f, "Array(len={})", a.len()),
            ValueKind::Hash(h) => write!(f, "Hash(entries={})", h.len()),
            ValueKind::Ref(r) => write!(f, "Ref(target={:p})", r.target),
            ValueKind::FileHandle(r) => write!(f, "FileHandle({})", r.resource_kind()),
            ValueKind::Regex(r) => write!(f, "Regex({})", r.resource_kind()),
            ValueKind::Socket(r) => write!(f, "Socket({})", r.resource_kind()),
            ValueKind::CStruct(c) => write!(f, "CStruct({}, {} bytes)", c.type_name, c.bytes.len()),
            ValueKind::CPointer(p) => write!(f, "CPointer({p:p})"),
            ValueKind::Closure(c) => write!(f, "Closure(params={})", c.param_count),
        }
    }
}

/// Discriminant matching the `kind` enumeration in §3, used by coercion and
/// diagnostics code that wants the tag without borrowing the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Undef,
    Int,
    Num,
    Str,
    Array,
    Hash,
    Ref,
    FileHandle,
    Regex,
    Socket,
    CStruct,
    CPointer,
    Closure,
}

impl ValueKind {
    pub fn tag(&self) -> Tag {
        match self {
            ValueKind::Undef => Tag::Undef,
            ValueKind::Int(_) => Tag::Int,
            ValueKind::Num(_) => Tag::Num,
            ValueKind::Str(_) => Tag::Str,
            ValueKind::Array(_) => Tag::Array,
            ValueKind::Hash(_) => Tag::Hash,
            ValueKind::Ref(_) => Tag::Ref,
            ValueKind::FileHandle(_) => Tag::FileHandle,
            ValueKind::Regex(_) => Tag::Regex,
            ValueKind::Socket(_) => Tag::Socket,
            ValueKind::CStruct(_) => Tag::CStruct,
            ValueKind::CPointer(_) => Tag::CPointer,
            ValueKind::Closure(_) => Tag::Closure,
        }
    }
}

/// The heap object every `ValuePtr` points at.
///
/// `blessed_class` and `kind` are `UnsafeCell`-wrapped because several
/// spec-mandated operations mutate a shared `Value` in place (`bless`,
/// `deref_set`, array/hash mutators): the whole point of the ABI is that
/// compiled code holds raw pointers and calls functions that mutate through
/// them. Per §5, these mutations are *not* internally synchronized; callers
/// sharing a container across threads must take an explicit mutex, exactly
/// as the spec requires.
pub struct ValueInner {
    pub refcount: AtomicI64,
    blessed_class: UnsafeCell<Option<Box<str>>>,
    // `ManuallyDrop` lets `release` move the payload out with `ManuallyDrop::take`
    // before the outer `Box` is freed, without the compiler also running the
    // payload's destructor a second time when that `Box` drops.
    kind: UnsafeCell<std::mem::ManuallyDrop<ValueKind>>,
}

// Safety: refcount mutations are atomic. Payload mutations are guarded by
// caller discipline (explicit mutexes around shared mutable containers),
// exactly as specified in §5 "Concurrency & Resource Model". This is the
// same contract the teacher documents for its own `Value` (no internal
// locking, atomics only for the refcount-equivalent bookkeeping), extended
// here to cover our explicit interior mutability.
unsafe impl Send for ValueInner {}
unsafe impl Sync for ValueInner {}

impl ValueInner {
    fn new(kind: ValueKind) -> ValuePtr {
        notify_alloc(kind.tag());
        let boxed = Box::new(ValueInner {
            refcount: AtomicI64::new(1),
            blessed_class: UnsafeCell::new(None),
            kind: UnsafeCell::new(std::mem::ManuallyDrop::new(kind)),
        });
        Box::into_raw(boxed)
    }

    /// # Safety
    /// `self` must be a live, exclusively-accessed-for-this-call `ValueInner`.
    #[inline]
    pub unsafe fn kind(&self) -> &ValueKind {
        unsafe { &*self.kind.get() }
    }

    /// # Safety
    /// Caller must not alias this mutable reference with another live
    /// reference to the same payload (the usual container-mutation
    /// discipline documented on the type).
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn kind_mut(&self) -> &mut ValueKind {
        unsafe { &mut *self.kind.get() }
    }

    /// Takes the payload out, leaving the cell in a logically-moved-from
    /// state. Must be called at most once, immediately before the
    /// `ValueInner` itself is freed.
    ///
    /// # Safety
    /// Must not be followed by any further access to `kind`/`kind_mut`.
    unsafe fn take_kind(&self) -> ValueKind {
        unsafe { std::mem::ManuallyDrop::take(&mut *self.kind.get()) }
    }

    /// # Safety
    /// Same discipline as `kind`.
    #[inline]
    pub unsafe fn blessed_class(&self) -> Option<&str> {
        unsafe { (*self.blessed_class.get()).as_deref() }
    }

    /// # Safety
    /// Same discipline as `kind_mut`. Only meaningful when `kind` is `Ref`;
    /// setting it on any other kind is corruption per §4.1 and the release
    /// cascade treats it as such.
    pub unsafe fn set_blessed_class(&self, class_name: Option<Box<str>>) {
        unsafe { *self.blessed_class.get() = class_name };
    }
}

/// Hook the OOP layer (`strada-runtime::oop`) installs so the release
/// cascade here can invoke `DESTROY` without `strada-core` depending on the
/// method-dispatch machinery. Mirrors the "core stays leaf, runtime extends
/// it" split the teacher's own two-crate workspace models.
type DestroyHook = fn(ValuePtr, &str);
static DESTROY_HOOK: OnceLock<DestroyHook> = OnceLock::new();

/// Install the DESTROY dispatcher. Idempotent: later calls are ignored,
/// matching `OnceLock`'s semantics (the runtime calls this exactly once
/// during its own initialization).
pub fn set_destroy_hook(hook: DestroyHook) {
    let _ = DESTROY_HOOK.set(hook);
}

/// Hook `strada-runtime::instrumentation` installs to feed its per-kind
/// memory profiler counters (§4.13) without this crate depending on the
/// profiler's own bookkeeping. Called once per allocation and once per
/// release, each time with the `Tag` of the value involved. Like
/// `DESTROY_HOOK`, this keeps the extension point a plain function pointer
/// rather than pulling a trait object or a back-reference into core.
pub type LifecycleHook = fn(Tag, bool);
static LIFECYCLE_HOOK: OnceLock<LifecycleHook> = OnceLock::new();

pub fn set_lifecycle_hook(hook: LifecycleHook) {
    let _ = LIFECYCLE_HOOK.set(hook);
}

#[inline]
fn notify_alloc(tag: Tag) {
    if let Some(hook) = LIFECYCLE_HOOK.get() {
        hook(tag, true);
    }
}

#[inline]
fn notify_free(tag: Tag) {
    if let Some(hook) = LIFECYCLE_HOOK.get() {
        hook(tag, false);
    }
}

thread_local! {
    /// Recursion guard for the release cascade: prevents a DESTROY method
    /// that (erroneously) re-triggers the final decref of its own object
    /// from recursing into `release` a second time. The spec describes a
    /// single process-wide flag; a thread-local set of in-flight addresses
    /// is the equivalent for a multi-threaded reimplementation without
    /// having one object's destruction block an unrelated object's
    /// destruction on another thread.
    static DESTROYING: std::cell::RefCell<std::collections::HashSet<usize>> =
        std::cell::RefCell::new(std::collections::HashSet::new());
}

/// A printable, short, plausible class name: the corruption guard from
/// §4.1 ("validate that `blessed_class` points into plausible user space
/// and is a short printable string").
fn looks_like_a_class_name(s: &str) -> bool {
    !s.is_empty() && s.len() <= 256 && s.chars().all(|c| !c.is_control())
}

/// Release cascade: called exactly once, when a refcount transitions to
/// zero. Mirrors §4.1 "Release cascade per kind" precisely.
///
/// # Safety
/// `ptr` must be the last live reference to this object (refcount just hit
/// zero) and must not be used again after this call returns.
unsafe fn release(ptr: ValuePtr) {
    let addr = ptr as usize;
    let already_destroying = DESTROYING.with(|set| !set.borrow_mut().insert(addr));
    if already_destroying {
        // Re-entrant release of the same object mid-DESTROY: the spec
        // treats this as a defense-in-depth trip, not a crash.
        tracing::warn!(
            target: "strada_core::value",
            ptr = addr,
            "re-entrant release of the same Value during DESTROY; skipping"
        );
        return;
    }

    // Blessed Ref: run DESTROY before tearing down the payload, per §4.1.
    let inner = unsafe { &*ptr };
    if matches!(unsafe { inner.kind() }, ValueKind::Ref(_)) {
        let class = unsafe { inner.blessed_class() };
        if let Some(class_name) = class {
            if looks_like_a_class_name(class_name) {
                if let Some(hook) = DESTROY_HOOK.get() {
                    let class_owned = class_name.to_string();
                    hook(ptr, &class_owned);
                }
            } else {
                tracing::error!(
                    target: "strada_core::value",
                    "blessed_class failed corruption guard on release; skipping DESTROY"
                );
            }
            unsafe { inner.set_blessed_class(None) };
        }
    } else if unsafe { inner.blessed_class() }.is_some() {
        // blessed_class set on a non-Ref kind: corruption per §4.1. Log and
        // decline to invoke DESTROY (there is no class to invoke it on).
        tracing::error!(
            target: "strada_core::value",
            "blessed_class set on a non-Ref Value; treating as corruption"
        );
    }

    // Per-kind teardown.
    let tag = unsafe { inner.kind() }.tag();
    notify_free(tag);
    let kind = unsafe { inner.take_kind() };
    match kind {
        ValueKind::Undef | ValueKind::Int(_) | ValueKind::Num(_) | ValueKind::CPointer(_) => {}
        ValueKind::Str(_) => {}
        ValueKind::Array(body) => {
            for elem in body.into_elements() {
                unsafe { decref(elem) };
            }
        }
        ValueKind::Hash(body) => {
            for (_k, v) in body.into_entries() {
                unsafe { decref(v) };
            }
        }
        ValueKind::Ref(r) => unsafe { decref(r.target) },
        ValueKind::FileHandle(r) | ValueKind::Regex(r) | ValueKind::Socket(r) => {
            // Box<dyn ManagedResource>'s own Drop impl (provided by
            // strada-runtime) performs the actual fclose/free/close.
            drop(r);
        }
        ValueKind::CStruct(_) => {}
        ValueKind::Closure(body) => {
            for slot in body.captures.into_vec() {
                unsafe { decref(slot) };
            }
        }
    }

    DESTROYING.with(|set| {
        set.borrow_mut().remove(&addr);
    });

    // The `kind` cell already had its payload taken via `take_kind` above
    // (it holds a `ManuallyDrop`, so this drop glue is a no-op for it);
    // this just frees the outer allocation and drops `blessed_class`.
    unsafe {
        drop(Box::from_raw(ptr));
    }
}

/// Increment a Value's refcount.
///
/// # Safety
/// `ptr` must be a live `ValuePtr`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strada_incref(ptr: ValuePtr) {
    if ptr.is_null() {
        return;
    }
    unsafe { (*ptr).refcount.fetch_add(1, Ordering::AcqRel) };
}

/// Decrement a Value's refcount, running the release cascade at zero.
///
/// # Safety
/// `ptr` must be a live `ValuePtr` (or null, which is a no-op).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strada_decref(ptr: ValuePtr) {
    unsafe { decref(ptr) }
}

/// # Safety
/// `ptr` must be a live `ValuePtr` or null.
#[inline]
pub unsafe fn decref(ptr: ValuePtr) {
    if ptr.is_null() {
        return;
    }
    let prev = unsafe { (*ptr).refcount.fetch_sub(1, Ordering::AcqRel) };
    debug_assert!(prev >= 1, "decref: refcount underflow at {ptr:p}");
    if prev == 1 {
        unsafe { release(ptr) };
    }
}

/// Current refcount, for tests and diagnostics.
///
/// # Safety
/// `ptr` must be a live `ValuePtr`.
pub unsafe fn refcount(ptr: ValuePtr) -> i64 {
    unsafe { (*ptr).refcount.load(Ordering::Acquire) }
}

// ---------------------------------------------------------------------
// Constructors (§4.1: `new_{undef,int,num,str,...}`, refcount starts at 1)
// ---------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn strada_new_undef() -> ValuePtr {
    ValueInner::new(ValueKind::Undef)
}

#[unsafe(no_mangle)]
pub extern "C" fn strada_new_int(v: i64) -> ValuePtr {
    ValueInner::new(ValueKind::Int(v))
}

#[unsafe(no_mangle)]
pub extern "C" fn strada_new_num(v: f64) -> ValuePtr {
    ValueInner::new(ValueKind::Num(v))
}

/// Build a Str from an explicit byte length (never from a NUL-terminated
/// C string): embedded NULs must survive.
///
/// # Safety
/// `bytes` must point to at least `len` readable bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strada_new_str_len(bytes: *const u8, len: usize) -> ValuePtr {
    let slice = if len == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(bytes, len) }
    };
    ValueInner::new(ValueKind::Str(slice.to_vec()))
}

pub fn new_str(bytes: Vec<u8>) -> ValuePtr {
    ValueInner::new(ValueKind::Str(bytes))
}

pub fn new_array(body: ArrayBody) -> ValuePtr {
    ValueInner::new(ValueKind::Array(body))
}

pub fn new_hash(body: DictBody) -> ValuePtr {
    ValueInner::new(ValueKind::Hash(body))
}

#[unsafe(no_mangle)]
pub extern "C" fn strada_new_array() -> ValuePtr {
    new_array(ArrayBody::new())
}

#[unsafe(no_mangle)]
pub extern "C" fn strada_new_hash() -> ValuePtr {
    new_hash(DictBody::new())
}

/// # Safety
/// `ptr` is a borrowed raw pointer the runtime will never free.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn strada_new_cpointer(ptr: *mut c_void) -> ValuePtr {
    ValueInner::new(ValueKind::CPointer(ptr))
}

pub fn new_cstruct(type_name: impl Into<Box<str>>, bytes: Vec<u8>) -> ValuePtr {
    ValueInner::new(ValueKind::CStruct(CStructBody {
        type_name: type_name.into(),
        bytes,
    }))
}

pub fn new_closure(func_ptr: usize, param_count: u32, captures: Box<[ValuePtr]>) -> ValuePtr {
    ValueInner::new(ValueKind::Closure(ClosureBody {
        func_ptr,
        param_count,
        captures,
    }))
}

pub fn new_resource_file(resource: Box<dyn ManagedResource>) -> ValuePtr {
    ValueInner::new(ValueKind::FileHandle(resource))
}

pub fn new_resource_regex(resource: Box<dyn ManagedResource>) -> ValuePtr {
    ValueInner::new(ValueKind::Regex(resource))
}

pub fn new_resource_socket(resource: Box<dyn ManagedResource>) -> ValuePtr {
    ValueInner::new(ValueKind::Socket(resource))
}

// ---------------------------------------------------------------------
// Ref construction & blessing (§4.6, §4.9 primitives that belong at the
// value-core level because they touch `blessed_class` directly)
// ---------------------------------------------------------------------

/// `make_ref(target)`: increments target's refcount, returns a fresh Ref
/// with its own refcount of 1.
///
/// # Safety
/// `target` must be a live `ValuePtr`.
pub unsafe fn make_ref(target: ValuePtr) -> ValuePtr {
    unsafe { strada_incref(target) };
    ValueInner::new(ValueKind::Ref(RefBody { target }))
}

/// `make_ref_take(target)`: wraps target without an extra incref (adopts
/// the caller's existing refcount, used when wrapping a just-constructed
/// container straight out of `anon_array`/`anon_hash`).
pub fn make_ref_take(target: ValuePtr) -> ValuePtr {
    ValueInner::new(ValueKind::Ref(RefBody { target }))
}

/// `bless(ref, class_name)`: only Refs may be blessed.
///
/// # Safety
/// `r` must be a live `ValuePtr` of kind Ref.
pub unsafe fn bless(r: ValuePtr, class_name: &str) -> ValuePtr {
    let inner = unsafe { &*r };
    match unsafe { inner.kind() } {
        ValueKind::Ref(_) => {
            unsafe { inner.set_blessed_class(Some(class_name.into())) };
            r
        }
        other => panic!("bless: expected Ref, got {:?}", other.tag()),
    }
}

/// # Safety
/// `r` must be a live `ValuePtr`.
pub unsafe fn blessed_class_of(r: ValuePtr) -> Option<String> {
    let inner = unsafe { &*r };
    unsafe { inner.blessed_class() }.map(|s| s.to_string())
}

// ---------------------------------------------------------------------
// Safe owning handle (internal convenience, not part of the C ABI)
// ---------------------------------------------------------------------

/// A safe, owning handle to a `ValuePtr`: `Clone` increfs, `Drop` decrefs.
/// Operator bodies written in Rust use this instead of manual incref/decref
/// pairs; the `extern "C"` entry points convert to/from raw `ValuePtr` at
/// the boundary, the same role the teacher's `value_to_stack_value` /
/// `stack_value_to_value` play for its tagged stack.
pub struct Value(NonNull<ValueInner>);

// Safety: see `ValueInner`'s Send/Sync rationale above.
unsafe impl Send for Value {}
unsafe impl Sync for Value {}

impl Value {
    /// # Safety
    /// `ptr` must be a live `ValuePtr` owning exactly one refcount that this
    /// `Value` now takes responsibility for decrementing.
    pub unsafe fn from_raw(ptr: ValuePtr) -> Value {
        Value(NonNull::new(ptr).expect("Value::from_raw: null pointer"))
    }

    /// Consumes the handle, returning the raw pointer without decrementing.
    pub fn into_raw(self) -> ValuePtr {
        let ptr = self.0.as_ptr();
        std::mem::forget(self);
        ptr
    }

    pub fn as_ptr(&self) -> ValuePtr {
        self.0.as_ptr()
    }

    pub fn kind(&self) -> &ValueKind {
        unsafe { self.0.as_ref().kind() }
    }

    #[allow(clippy::mut_from_ref)]
    pub fn kind_mut(&self) -> &mut ValueKind {
        unsafe { self.0.as_ref().kind_mut() }
    }

    pub fn refcount(&self) -> i64 {
        unsafe { self.0.as_ref() }.refcount.load(Ordering::Acquire)
    }
}

impl Clone for Value {
    fn clone(&self) -> Self {
        unsafe { strada_incref(self.0.as_ptr()) };
        Value(self.0)
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        unsafe { decref(self.0.as_ptr()) };
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Value({:?}, rc={})", self.kind(), self.refcount())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_values_start_at_refcount_one() {
        let p = strada_new_int(42);
        assert_eq!(unsafe { refcount(p) }, 1);
        unsafe { strada_decref(p) };
    }

    #[test]
    fn incref_decref_roundtrip() {
        let p = strada_new_int(7);
        unsafe { strada_incref(p) };
        assert_eq!(unsafe { refcount(p) }, 2);
        unsafe { strada_decref(p) };
        assert_eq!(unsafe { refcount(p) }, 1);
        unsafe { strada_decref(p) };
    }

    #[test]
    fn str_preserves_embedded_nul() {
        let bytes = [0x41u8, 0x00, 0x42];
        let p = unsafe { strada_new_str_len(bytes.as_ptr(), bytes.len()) };
        match unsafe { (*p).kind() } {
            ValueKind::Str(b) => assert_eq!(b.as_slice(), &bytes),
            other => panic!("expected Str, got {other:?}"),
        }
        unsafe { strada_decref(p) };
    }

    #[test]
    fn ref_to_undef_is_legal() {
        let undef = strada_new_undef();
        let r = unsafe { make_ref(undef) };
        match unsafe { (*r).kind() } {
            ValueKind::Ref(body) => assert!(matches!(unsafe { (*body.target).kind() }, ValueKind::Undef)),
            other => panic!("expected Ref, got {other:?}"),
        }
        unsafe { strada_decref(r) };
    }

    #[test]
    fn array_release_decrefs_elements() {
        let mut body = ArrayBody::new();
        let elem = strada_new_int(1);
        body.push(elem, true);
        let arr = new_array(body);
        assert_eq!(unsafe { refcount(elem) }, 1);
        unsafe { strada_decref(arr) };
        // elem was freed along with the array; we can't safely dereference
        // it again, but we can confirm the array itself is gone by relying
        // on miri/asan in CI rather than re-reading freed memory here.
    }

    #[test]
    fn corruption_guard_skips_destroy_for_non_ref_blessed_class() {
        // Directly exercise the release path for a non-Ref kind; nothing
        // should panic even though this is a contract violation in
        // generated code.
        let p = strada_new_int(5);
        unsafe { (*p).set_blessed_class(Some("Oops".into())) };
        unsafe { strada_decref(p) };
    }
}
