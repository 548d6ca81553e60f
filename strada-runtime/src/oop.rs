//! OOP dispatch (§4.9): package registry, `isa`, `method_call`, SUPER
//! dispatch, `can`, and DESTROY invocation. One of the repo's three
//! ~10%-budget core components alongside containers and the string
//! engine.
//!
//! Registration happens once at program start (the code generator emits
//! static initializers that call `register_package`); per §9's own design
//! note, the table is read-only after that point, so the `Mutex` here is
//! only ever contended during that brief startup window.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use strada_core::value::{ValueKind, ValuePtr, blessed_class_of};

use crate::error::fatal_exit;

/// Hard upper bounds from §9's "implementation pragmatics, not contracts"
/// — large enough for any real program, small enough to bound the DFS.
pub const MAX_PACKAGES: usize = 256;
pub const MAX_METHODS_PER_PACKAGE: usize = 256;
pub const MAX_PARENTS: usize = 16;
pub const MAX_VISITED: usize = 64;

/// `(obj, args_ptr, args_len) -> result`, the same args-array calling
/// convention `closures.rs` and `ffi.rs` use at their Strada-facing
/// boundaries.
pub type MethodFn = extern "C" fn(ValuePtr, *const ValuePtr, u32) -> ValuePtr;

struct PackageEntry {
    parents: Vec<String>,
    methods: HashMap<String, MethodFn>,
}

fn registry() -> &'static Mutex<HashMap<String, PackageEntry>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, PackageEntry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Registers (or replaces) a package. Called by the code generator's
/// static initializers at program start. Exceeding any of §9's hard
/// bounds is a fatal exit (§7), not a recoverable error — a codegen bug
/// that got this far has already produced a corrupt binary.
pub fn register_package(name: &str, parents: &[&str], methods: &[(&str, MethodFn)]) {
    if parents.len() > MAX_PARENTS {
        fatal_exit(&format!("package '{name}' declares {} parents, exceeding the {MAX_PARENTS} limit", parents.len()));
    }
    if methods.len() > MAX_METHODS_PER_PACKAGE {
        fatal_exit(&format!(
            "package '{name}' declares {} methods, exceeding the {MAX_METHODS_PER_PACKAGE} limit",
            methods.len()
        ));
    }
    let mut reg = registry().lock().unwrap();
    if !reg.contains_key(name) && reg.len() >= MAX_PACKAGES {
        fatal_exit(&format!("package count exceeds the {MAX_PACKAGES} limit registering '{name}'"));
    }
    reg.insert(
        name.to_string(),
        PackageEntry {
            parents: parents.iter().map(|s| s.to_string()).collect(),
            methods: methods.iter().map(|&(n, f)| (n.to_string(), f)).collect(),
        },
    );
}

/// Depth-first, left-to-right search starting at `start` (not its
/// parents — `start` itself is checked first) for `name`, bounded by a
/// cap-64 visited set to reject cyclic inheritance without overflowing
/// the stack.
fn dfs_find(start: &str, name: &str) -> Option<MethodFn> {
    let reg = registry().lock().unwrap();
    let mut visited = std::collections::HashSet::new();
    let mut stack = vec![start.to_string()];
    while let Some(pkg_name) = stack.pop() {
        if visited.len() >= MAX_VISITED {
            break;
        }
        if !visited.insert(pkg_name.clone()) {
            continue;
        }
        let Some(pkg) = reg.get(&pkg_name) else { continue };
        if let Some(&f) = pkg.methods.get(name) {
            return Some(f);
        }
        // Push parents in reverse so the leftmost parent is popped (and
        // thus searched) first — DFS left-to-right per §4.9.
        for parent in pkg.parents.iter().rev() {
            stack.push(parent.clone());
        }
    }
    None
}

/// Depth-first walk of `obj`'s inheritance graph (starting at `obj`'s own
/// blessed class) looking for `class`, with the same cap-64 visited set.
///
/// # Safety
/// `obj` must be a live `ValuePtr`.
pub unsafe fn isa(obj: ValuePtr, class: &str) -> bool {
    let Some(start) = (unsafe { blessed_class_of(obj) }) else {
        return false;
    };
    if start == class {
        return true;
    }
    let reg = registry().lock().unwrap();
    let mut visited = std::collections::HashSet::new();
    let mut stack = vec![start];
    while let Some(pkg_name) = stack.pop() {
        if visited.len() >= MAX_VISITED {
            break;
        }
        if !visited.insert(pkg_name.clone()) {
            continue;
        }
        if pkg_name == class {
            return true;
        }
        if let Some(pkg) = reg.get(&pkg_name) {
            for parent in pkg.parents.iter().rev() {
                stack.push(parent.clone());
            }
        }
    }
    false
}

/// `method_call(obj, name, args)`: requires `obj.blessed_class` set; DFS
/// left-to-right through inheritance, first match wins. FATAL (§7) if no
/// method is found anywhere in the graph.
///
/// # Safety
/// `obj` must be a live `ValuePtr`; every pointer in `args` must be live.
pub unsafe fn method_call(obj: ValuePtr, name: &str, args: &[ValuePtr]) -> ValuePtr {
    let Some(class) = (unsafe { blessed_class_of(obj) }) else {
        fatal_exit(&format!("method_call('{name}') on an unblessed object"));
    };
    match dfs_find(&class, name) {
        Some(f) => f(obj, args.as_ptr(), args.len() as u32),
        None => fatal_exit(&format!("no method '{name}' found in '{class}' or its ancestors")),
    }
}

/// `super_call(obj, defining_package, method, args)`: searches
/// `defining_package`'s *parents* (not `defining_package` itself, and not
/// `obj`'s runtime class) in order, first match wins. FATAL if not found.
///
/// # Safety
/// `obj` must be a live `ValuePtr`; every pointer in `args` must be live.
pub unsafe fn super_call(obj: ValuePtr, defining_package: &str, method: &str, args: &[ValuePtr]) -> ValuePtr {
    let reg = registry().lock().unwrap();
    let parents = reg.get(defining_package).map(|p| p.parents.clone()).unwrap_or_default();
    drop(reg);
    for parent in &parents {
        if let Some(f) = dfs_find(parent, method) {
            return f(obj, args.as_ptr(), args.len() as u32);
        }
    }
    fatal_exit(&format!("SUPER::{method} not found above '{defining_package}'"))
}

/// Same lookup as `method_call`, but a boolean presence check rather than
/// an invocation — and never FATAL, since "does this respond to X" is by
/// definition meant to handle "no" gracefully.
///
/// # Safety
/// `obj` must be a live `ValuePtr`.
pub unsafe fn can(obj: ValuePtr, name: &str) -> bool {
    match unsafe { blessed_class_of(obj) } {
        Some(class) => dfs_find(&class, name).is_some(),
        None => false,
    }
}

/// Installed as `strada-core`'s `DestroyHook`: looked up and invoked as an
/// ordinary method named `DESTROY` on `class`. `strada-core`'s release
/// cascade already guards re-entrancy and validates `class` looks
/// plausible before calling this, so a missing `DESTROY` method is simply
/// not an error — most classes don't define one.
fn destroy_dispatch(ptr: ValuePtr, class: &str) {
    if let Some(f) = dfs_find(class, "DESTROY") {
        let _ = f(ptr, std::ptr::null(), 0);
    }
}

/// Installs the DESTROY hook into `strada-core`. Call once during runtime
/// `init()`.
pub fn init() {
    strada_core::value::set_destroy_hook(destroy_dispatch);
}

#[cfg(test)]
mod tests {
    use super::*;
    use strada_core::value::{bless, make_ref_take, strada_decref, strada_new_int, strada_new_undef};
    use serial_test::serial;

    extern "C" fn speak(_obj: ValuePtr, _args: *const ValuePtr, _n: u32) -> ValuePtr {
        strada_new_int(1)
    }

    extern "C" fn fly(_obj: ValuePtr, _args: *const ValuePtr, _n: u32) -> ValuePtr {
        strada_new_int(2)
    }

    extern "C" fn swim(_obj: ValuePtr, _args: *const ValuePtr, _n: u32) -> ValuePtr {
        strada_new_int(3)
    }

    extern "C" fn shared_name(_obj: ValuePtr, _args: *const ValuePtr, _n: u32) -> ValuePtr {
        strada_new_int(42)
    }

    fn bless_new(class: &str) -> ValuePtr {
        let target = strada_new_undef();
        let r = make_ref_take(target);
        unsafe { bless(r, class) }
    }

    #[test]
    #[serial]
    fn multiple_inheritance_duck_example() {
        register_package("Animal", &[], &[("speak", speak)]);
        register_package("Flyer", &[], &[("fly", fly)]);
        register_package("Swimmer", &[], &[("swim", swim)]);
        register_package("Duck", &["Animal", "Flyer", "Swimmer"], &[]);

        let duck = bless_new("Duck");
        unsafe {
            assert!(isa(duck, "Flyer"));
            assert!(can(duck, "fly"));
            let result = method_call(duck, "fly", &[]);
            assert!(matches!((*result).kind(), ValueKind::Int(2)));
            strada_decref(result);
            strada_decref(duck);
        }
    }

    #[test]
    #[serial]
    fn multiple_inheritance_left_to_right_first_match_wins() {
        register_package("A", &[], &[]);
        register_package("B2", &[], &[("m", shared_name)]);
        register_package("C2", &[], &[("m", speak)]);
        register_package("D2", &["A", "B2", "C2"], &[]);

        let d = bless_new("D2");
        unsafe {
            let result = method_call(d, "m", &[]);
            assert!(matches!((*result).kind(), ValueKind::Int(42)));
            strada_decref(result);
            strada_decref(d);
        }
    }

    #[test]
    #[serial]
    fn super_call_searches_defining_packages_parents() {
        register_package("Base", &[], &[("greet", speak)]);
        register_package("Mid", &["Base"], &[]);
        register_package("Leaf", &["Mid"], &[]);

        let obj = bless_new("Leaf");
        unsafe {
            let result = super_call(obj, "Mid", "greet", &[]);
            assert!(matches!((*result).kind(), ValueKind::Int(1)));
            strada_decref(result);
            strada_decref(obj);
        }
    }

    #[test]
    #[serial]
    fn destroy_is_invoked_on_final_decref() {
        use std::sync::atomic::{AtomicBool, Ordering};
        static CALLED: AtomicBool = AtomicBool::new(false);
        extern "C" fn destroy(_obj: ValuePtr, _args: *const ValuePtr, _n: u32) -> ValuePtr {
            CALLED.store(true, Ordering::SeqCst);
            strada_new_undef()
        }
        register_package("HasDestructor", &[], &[("DESTROY", destroy)]);
        init();
        let obj = bless_new("HasDestructor");
        unsafe { strada_decref(obj) };
        assert!(CALLED.load(Ordering::SeqCst));
    }
}
