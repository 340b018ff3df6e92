//! # Process-Wide Warning Log
//!
//! Convergence problems inside a path fit are not errors: the best iterate is
//! kept and the path continues. They are recorded here instead, one buffer per
//! worker thread, so parallel kernels can report without contending on a lock.
//! Buffers are consolidated on read.

use ahash::AHashMap;
use dashmap::DashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard};
use thread_local::ThreadLocal;

/// Categories of recoverable problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WarningCode {
    Generic,
    DeprecatedFeature,
    /// The iteration cap was hit before the duality gap closed.
    MaxitReached,
    /// Backtracking shrank the step below machine precision without satisfying the
    /// sufficient-decrease condition.
    LineSearchFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
    pub worker: usize,
}

struct WorkerLog {
    worker: usize,
    entries: AHashMap<WarningCode, Vec<String>>,
}

static LOG: LazyLock<ThreadLocal<Mutex<WorkerLog>>> = LazyLock::new(ThreadLocal::new);
static REPORTED_ONCE: LazyLock<DashSet<String>> = LazyLock::new(DashSet::new);
static NEXT_FOREIGN_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static FOREIGN_ID: usize = NEXT_FOREIGN_ID.fetch_add(1, Ordering::Relaxed);
}

/// Worker id of the calling thread: the rayon index inside a pool, otherwise a
/// process-unique id offset past any plausible pool size.
fn current_worker_id() -> usize {
    match rayon::current_thread_index() {
        Some(idx) => idx,
        None => FOREIGN_ID.with(|id| 1 << 16 | *id),
    }
}

fn lock(log: &Mutex<WorkerLog>) -> MutexGuard<'_, WorkerLog> {
    match log.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn local_log() -> &'static Mutex<WorkerLog> {
    LOG.get_or(|| {
        Mutex::new(WorkerLog {
            worker: current_worker_id(),
            entries: AHashMap::new(),
        })
    })
}

/// Records a warning for the calling worker and forwards it to the `log` facade.
pub fn add_warning(code: WarningCode, message: impl Into<String>) {
    let message = message.into();
    log::warn!("[{code:?}] {message}");
    lock(local_log())
        .entries
        .entry(code)
        .or_default()
        .push(message);
}

/// Records `message` only the first time `key` is seen in this process.
pub fn add_warning_once(key: &str, code: WarningCode, message: impl Into<String>) {
    if REPORTED_ONCE.insert(key.to_string()) {
        add_warning(code, message);
    }
}

fn collect(drain: bool) -> Vec<Warning> {
    let mut out = Vec::new();
    for slot in LOG.iter() {
        let mut guard = lock(slot);
        let worker = guard.worker;
        let mut codes: Vec<WarningCode> = guard.entries.keys().copied().collect();
        codes.sort();
        for code in codes {
            let messages = if drain {
                guard.entries.remove(&code).unwrap_or_default()
            } else {
                guard.entries.get(&code).cloned().unwrap_or_default()
            };
            out.extend(messages.into_iter().map(|message| Warning {
                code,
                message,
                worker,
            }));
        }
    }
    out.sort_by_key(|w| (w.worker, w.code));
    out
}

/// All recorded warnings, grouped by worker and then by code. Order within a
/// (worker, code) pair is insertion order.
pub fn warnings() -> Vec<Warning> {
    collect(false)
}

/// Like [`warnings`], but empties every worker buffer.
pub fn take_warnings() -> Vec<Warning> {
    collect(true)
}

pub fn has_warnings() -> bool {
    LOG.iter().any(|slot| lock(slot).entries.values().any(|v| !v.is_empty()))
}

pub fn clear_warnings() {
    for slot in LOG.iter() {
        lock(slot).entries.clear();
    }
}
