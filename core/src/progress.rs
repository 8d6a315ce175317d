/// Records read between two progress callbacks.
pub const PROGRESS_INTERVAL: u64 = 100;

/// Snapshot handed to progress callbacks of long-running passes.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub records_read: u64,
    /// Units of work done so far (matches, writes, admitted ids; depends on the phase).
    pub completed: u64,
    /// 0 to 100.
    pub percent: f64,
    pub phase: &'static str,
}

pub type ProgressFn<'a> = &'a mut dyn FnMut(&Progress);

pub fn percent_of(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (done as f64 * 100.0 / total as f64).min(100.0)
}

/// A callback that drops every update.
pub fn silent(_: &Progress) {}

/// Logs progress through `tracing`.
pub fn log_progress(p: &Progress) {
    tracing::info!(
        phase = p.phase,
        records_read = p.records_read,
        completed = p.completed,
        percent = p.percent,
        "progress"
    );
}
