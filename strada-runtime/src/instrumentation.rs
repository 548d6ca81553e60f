//! Function-call profiler and per-kind memory profiler (§4.13).
//!
//! Both are opt-in diagnostics, not part of the language's observable
//! semantics. The memory profiler's per-kind counters are fed by a
//! `strada_core::value::LifecycleHook` installed at `init()` time, the same
//! "core stays leaf, runtime extends it" pattern `oop.rs` uses for DESTROY.
//! The call-stack bookkeeping is adapted from the teacher's cross-thread
//! `MemoryStatsRegistry` in `memory_stats.rs` (CAS-claimed fixed-size slot
//! table, thread-local cached slot index, monotonic thread ids) — that file
//! is superseded by this one and has been removed.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use strada_core::value::Tag;

use crate::config::RuntimeConfig;

const KIND_COUNT: usize = 13;

fn tag_index(tag: Tag) -> usize {
    match tag {
        Tag::Undef => 0,
        Tag::Int => 1,
        Tag::Num => 2,
        Tag::Str => 3,
        Tag::Array => 4,
        Tag::Hash => 5,
        Tag::Ref => 6,
        Tag::FileHandle => 7,
        Tag::Regex => 8,
        Tag::Socket => 9,
        Tag::CStruct => 10,
        Tag::CPointer => 11,
        Tag::Closure => 12,
    }
}

fn tag_name(tag: Tag) -> &'static str {
    match tag {
        Tag::Undef => "Undef",
        Tag::Int => "Int",
        Tag::Num => "Num",
        Tag::Str => "Str",
        Tag::Array => "Array",
        Tag::Hash => "Hash",
        Tag::Ref => "Ref",
        Tag::FileHandle => "FileHandle",
        Tag::Regex => "Regex",
        Tag::Socket => "Socket",
        Tag::CStruct => "CStruct",
        Tag::CPointer => "CPointer",
        Tag::Closure => "Closure",
    }
}

/// Approximate per-value byte cost used for the `total_bytes`/`current_bytes`
/// counters. Not a precise `size_of`, since container bodies grow; a fixed
/// per-kind estimate is what the spec's "approximate" wording (§4.13) calls
/// for.
fn approx_bytes(tag: Tag) -> u64 {
    match tag {
        Tag::Undef | Tag::Int | Tag::Num | Tag::CPointer => 16,
        Tag::Str => 32,
        Tag::Array | Tag::Hash => 64,
        Tag::Ref => 24,
        Tag::FileHandle | Tag::Regex | Tag::Socket => 48,
        Tag::CStruct => 40,
        Tag::Closure => 56,
    }
}

#[derive(Default)]
struct KindCounters {
    alloc_count: AtomicU64,
    free_count: AtomicU64,
    current_count: AtomicU64,
    peak_count: AtomicU64,
    total_bytes: AtomicU64,
    current_bytes: AtomicU64,
    peak_bytes: AtomicU64,
}

impl KindCounters {
    fn record_alloc(&self, bytes: u64) {
        self.alloc_count.fetch_add(1, Ordering::Relaxed);
        let now = self.current_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
        let now_bytes = self.current_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.peak_count.fetch_max(now, Ordering::Relaxed);
        self.peak_bytes.fetch_max(now_bytes, Ordering::Relaxed);
    }

    fn record_free(&self, bytes: u64) {
        self.free_count.fetch_add(1, Ordering::Relaxed);
        self.current_count.fetch_sub(1, Ordering::Relaxed);
        self.current_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MemoryKindSnapshot {
        MemoryKindSnapshot {
            alloc_count: self.alloc_count.load(Ordering::Relaxed),
            free_count: self.free_count.load(Ordering::Relaxed),
            current_count: self.current_count.load(Ordering::Relaxed),
            peak_count: self.peak_count.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            current_bytes: self.current_bytes.load(Ordering::Relaxed),
            peak_bytes: self.peak_bytes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryKindSnapshot {
    pub alloc_count: u64,
    pub free_count: u64,
    pub current_count: u64,
    pub peak_count: u64,
    pub total_bytes: u64,
    pub current_bytes: u64,
    pub peak_bytes: u64,
}

struct MemoryProfiler {
    kinds: [KindCounters; KIND_COUNT],
    enabled: std::sync::atomic::AtomicBool,
}

fn memory_profiler() -> &'static MemoryProfiler {
    static PROFILER: OnceLock<MemoryProfiler> = OnceLock::new();
    PROFILER.get_or_init(|| MemoryProfiler {
        kinds: Default::default(),
        enabled: std::sync::atomic::AtomicBool::new(false),
    })
}

fn on_lifecycle_event(tag: Tag, is_alloc: bool) {
    let profiler = memory_profiler();
    if !profiler.enabled.load(Ordering::Relaxed) {
        return;
    }
    let counters = &profiler.kinds[tag_index(tag)];
    let bytes = approx_bytes(tag);
    if is_alloc {
        counters.record_alloc(bytes);
    } else {
        counters.record_free(bytes);
    }
}

/// Wires the memory profiler into `strada-core`'s release cascade and
/// allocation path. Idempotent; safe to call more than once (the
/// underlying `OnceLock` in `strada_core::value` ignores later writers).
pub fn init() {
    strada_core::value::set_lifecycle_hook(on_lifecycle_event);
}

pub fn set_memory_profiling_enabled(enabled: bool) {
    memory_profiler().enabled.store(enabled, Ordering::Relaxed);
}

pub fn memory_profiling_enabled() -> bool {
    memory_profiler().enabled.load(Ordering::Relaxed)
}

/// All thirteen per-kind snapshots, in `Tag` declaration order.
pub fn memory_snapshot() -> Vec<(&'static str, MemoryKindSnapshot)> {
    let profiler = memory_profiler();
    [
        Tag::Undef,
        Tag::Int,
        Tag::Num,
        Tag::Str,
        Tag::Array,
        Tag::Hash,
        Tag::Ref,
        Tag::FileHandle,
        Tag::Regex,
        Tag::Socket,
        Tag::CStruct,
        Tag::CPointer,
        Tag::Closure,
    ]
    .into_iter()
    .map(|tag| (tag_name(tag), profiler.kinds[tag_index(tag)].snapshot()))
    .collect()
}

/// Total live Values across all kinds, the figure the SIGQUIT dump reports.
pub fn live_value_count() -> u64 {
    memory_profiler().kinds.iter().map(|k| k.current_count.load(Ordering::Relaxed)).sum()
}

// --- call profiler -----------------------------------------------------

/// One row of the profiler table: per-function self/total timing.
#[derive(Debug, Clone, Copy, Default)]
struct FunctionStats {
    calls: u64,
    self_nanos: u64,
    total_nanos: u64,
}

struct CallFrame {
    func_id: u32,
    entered_at: Instant,
    child_nanos: u64,
}

thread_local! {
    static CALL_STACK: std::cell::RefCell<Vec<CallFrame>> = const { std::cell::RefCell::new(Vec::new()) };
}

struct ProfilerTable {
    /// Indexed by a small integer id the compiler assigns each function at
    /// codegen time; `None` until first entered. Fixed capacity per §9/§4.13
    /// (default 4096, configurable via `RuntimeConfig`).
    rows: Vec<std::sync::Mutex<Option<FunctionStats>>>,
    names: Vec<std::sync::Mutex<Option<String>>>,
    stack_depth_limit: AtomicUsize,
}

fn profiler_table() -> &'static ProfilerTable {
    static TABLE: OnceLock<ProfilerTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let cfg = RuntimeConfig::default();
        ProfilerTable {
            rows: (0..cfg.profiler_table_size).map(|_| std::sync::Mutex::new(None)).collect(),
            names: (0..cfg.profiler_table_size).map(|_| std::sync::Mutex::new(None)).collect(),
            stack_depth_limit: AtomicUsize::new(cfg.profiler_stack_depth),
        }
    })
}

pub fn configure(cfg: &RuntimeConfig) {
    profiler_table().stack_depth_limit.store(cfg.profiler_stack_depth, Ordering::Relaxed);
}

/// Call on entry to an instrumented function. `func_id` must be `<
/// profiler_table_size`; out-of-range or over-depth calls are silently
/// dropped rather than faulted, since profiling must never perturb control
/// flow.
pub fn enter(func_id: u32, name: &str) {
    let table = profiler_table();
    if func_id as usize >= table.rows.len() {
        return;
    }
    if let Ok(mut slot) = table.names[func_id as usize].lock() {
        if slot.is_none() {
            *slot = Some(name.to_string());
        }
    }
    CALL_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.len() >= table.stack_depth_limit.load(Ordering::Relaxed) {
            return;
        }
        stack.push(CallFrame {
            func_id,
            entered_at: Instant::now(),
            child_nanos: 0,
        });
    });
}

/// Call on exit from the function most recently entered on this thread.
/// Mismatched enter/exit pairs (an `exit` with no matching `enter`, e.g.
/// because the stack depth cap dropped the `enter`) are no-ops.
pub fn exit() {
    let (func_id, elapsed, child_nanos) = match CALL_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.pop().map(|frame| {
            let elapsed = frame.entered_at.elapsed().as_nanos() as u64;
            (frame.func_id, elapsed, frame.child_nanos)
        })
    }) {
        Some(v) => v,
        None => return,
    };

    CALL_STACK.with(|stack| {
        if let Some(parent) = stack.borrow_mut().last_mut() {
            parent.child_nanos += elapsed;
        }
    });

    let table = profiler_table();
    if let Ok(mut slot) = table.rows[func_id as usize].lock() {
        let stats = slot.get_or_insert_with(FunctionStats::default);
        stats.calls += 1;
        stats.total_nanos += elapsed;
        stats.self_nanos += elapsed.saturating_sub(child_nanos);
    }
}

#[derive(Debug, Clone)]
pub struct ProfilerRow {
    pub name: String,
    pub calls: u64,
    pub self_nanos: u64,
    pub total_nanos: u64,
}

pub fn profiler_snapshot() -> Vec<ProfilerRow> {
    let table = profiler_table();
    let mut rows = Vec::new();
    for (i, row) in table.rows.iter().enumerate() {
        if let Ok(stats) = row.lock() {
            if let Some(stats) = *stats {
                let name = table.names[i]
                    .lock()
                    .ok()
                    .and_then(|n| n.clone())
                    .unwrap_or_else(|| format!("fn#{i}"));
                rows.push(ProfilerRow {
                    name,
                    calls: stats.calls,
                    self_nanos: stats.self_nanos,
                    total_nanos: stats.total_nanos,
                });
            }
        }
    }
    rows
}

pub fn call_stack_depth() -> usize {
    CALL_STACK.with(|stack| stack.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_profiler_tracks_alloc_and_free() {
        set_memory_profiling_enabled(true);
        on_lifecycle_event(Tag::Str, true);
        on_lifecycle_event(Tag::Str, true);
        on_lifecycle_event(Tag::Str, false);
        let snap = memory_snapshot();
        let (_, str_stats) = snap.iter().find(|(name, _)| *name == "Str").unwrap();
        assert!(str_stats.alloc_count >= 2);
        assert!(str_stats.free_count >= 1);
        set_memory_profiling_enabled(false);
    }

    #[test]
    fn disabled_profiler_does_not_count() {
        set_memory_profiling_enabled(false);
        let before = memory_snapshot();
        on_lifecycle_event(Tag::Int, true);
        let after = memory_snapshot();
        assert_eq!(
            before.iter().find(|(n, _)| *n == "Int").unwrap().1.alloc_count,
            after.iter().find(|(n, _)| *n == "Int").unwrap().1.alloc_count
        );
    }

    #[test]
    fn enter_exit_tracks_self_and_total_time() {
        enter(7, "frame_fn");
        assert_eq!(call_stack_depth(), 1);
        exit();
        assert_eq!(call_stack_depth(), 0);
        let snap = profiler_snapshot();
        let row = snap.iter().find(|r| r.name == "frame_fn").unwrap();
        assert_eq!(row.calls, 1);
    }

    #[test]
    fn exit_without_enter_is_a_no_op() {
        let depth_before = call_stack_depth();
        exit();
        assert_eq!(call_stack_depth(), depth_before);
    }
}
