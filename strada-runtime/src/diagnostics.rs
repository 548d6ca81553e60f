//! Runtime diagnostics for production debugging.
//!
//! Installs a SIGQUIT (`kill -3`) handler that dumps runtime statistics to
//! stderr, similar to a JVM thread dump: useful for inspecting a running
//! Strada process without stopping it. Keeps the teacher's `Once`-guarded
//! `signal_hook::low_level::register` installer; the body of the dump is
//! rewritten against this runtime's own counters (active threads via
//! `concurrency`, exception checkpoint depth via `exceptions`, and the
//! per-kind memory profiler via `instrumentation`) rather than the
//! teacher's strand/channel scheduler, which has no equivalent here.

use std::sync::Once;
use std::sync::atomic::{AtomicUsize, Ordering};

static SIGNAL_HANDLER_INIT: Once = Once::new();

/// Count of live OS threads spawned via `concurrency::thread_create`.
/// Lives here rather than in `concurrency.rs` so the diagnostics dump has
/// no load-bearing dependency on that module's internals, mirroring the
/// teacher's own `scheduler::ACTIVE_STRANDS` — a single atomic the rest of
/// the runtime bumps directly.
pub static ACTIVE_THREADS: AtomicUsize = AtomicUsize::new(0);

/// Install the SIGQUIT signal handler for diagnostics. Controlled by
/// `RuntimeConfig::diagnostics` (on by default in debug builds, per §11).
/// Safe to call multiple times; idempotent.
pub fn install_signal_handler() {
    SIGNAL_HANDLER_INIT.call_once(|| {
        #[cfg(unix)]
        {
            unsafe {
                // SIGQUIT = 3, the same signal `kill -3` sends a JVM for a
                // thread dump.
                let _ = signal_hook::low_level::register(signal_hook::consts::SIGQUIT, || {
                    dump_diagnostics();
                });
            }
        }

        #[cfg(not(unix))]
        {
            // No signal handling on non-Unix platforms; dump_diagnostics()
            // remains callable directly.
        }
    });
}

/// Dump runtime diagnostics to stderr. Callable directly or via SIGQUIT.
pub fn dump_diagnostics() {
    use std::io::Write;

    let mut out = std::io::stderr().lock();

    let _ = writeln!(out, "\n=== Strada Runtime Diagnostics ===");
    let _ = writeln!(out, "Timestamp: {:?}", std::time::SystemTime::now());

    let _ = writeln!(out, "\n[Threads]");
    let _ = writeln!(out, "  Active: {}", ACTIVE_THREADS.load(Ordering::Relaxed));

    let _ = writeln!(out, "\n[Exceptions]");
    let _ = writeln!(out, "  Checkpoint depth (this thread): {}", crate::exceptions::checkpoint_depth());

    let _ = writeln!(out, "\n[Memory profiler]");
    if crate::instrumentation::memory_profiling_enabled() {
        let _ = writeln!(out, "  Live values: {}", crate::instrumentation::live_value_count());
        for (kind, snap) in crate::instrumentation::memory_snapshot() {
            if snap.alloc_count == 0 {
                continue;
            }
            let _ = writeln!(
                out,
                "  {kind:<10} alloc={:<8} free={:<8} current={:<8} peak={:<8} bytes(cur/peak)={}/{}",
                snap.alloc_count, snap.free_count, snap.current_count, snap.peak_count, snap.current_bytes, snap.peak_bytes
            );
        }
    } else {
        let _ = writeln!(out, "  (disabled; enable with instrumentation::set_memory_profiling_enabled(true))");
    }

    let _ = writeln!(out, "\n=== End Diagnostics ===\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_diagnostics_runs_without_panicking() {
        dump_diagnostics();
    }

    #[test]
    fn install_signal_handler_is_idempotent() {
        install_signal_handler();
        install_signal_handler();
        install_signal_handler();
    }
}
