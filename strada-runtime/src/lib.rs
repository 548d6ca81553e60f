//! Strada runtime: everything compiled Strada code links against besides
//! the bare Value model in `strada-core`.
//!
//! `strada-core` owns the tagged, reference-counted Value and its two
//! built-in container bodies. Everything that needs threads, OS calls, or a
//! third-party crate (regex, signals, FFI) lives here instead, mirroring
//! the teacher's own core/runtime split.

pub mod arithmetic;
pub mod bytes;
pub mod closures;
pub mod coercion;
pub mod concurrency;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod exceptions;
pub mod ffi;
pub mod instrumentation;
pub mod oop;
pub mod pack;
pub mod posix;
pub mod refs;
pub mod regexp;
pub mod stringbuilder;
pub mod strings;

pub use config::RuntimeConfig;
pub use error::{RuntimeFault, guard};

/// One-time runtime initialization: wires the memory profiler's lifecycle
/// hook into `strada-core`, installs the package registry's DESTROY hook,
/// and, if configured, installs the SIGQUIT diagnostics handler. Compiled
/// Strada programs call this before anything else, the same role the
/// teacher's `scheduler_init` plays for its own runtime.
pub fn init(config: &RuntimeConfig) {
    instrumentation::init();
    instrumentation::configure(config);
    oop::init();
    if config.diagnostics {
        diagnostics::install_signal_handler();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let cfg = RuntimeConfig::default();
        init(&cfg);
        init(&cfg);
    }
}
