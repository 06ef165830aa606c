//! Passive performance instrumentation.
//!
//! Counters reset at job start, advance monotonically while the job runs,
//! and freeze at completion so the host can read a stable snapshot.

/// The five architectural counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerfCounters {
    /// Clock ticks elapsed during the job.
    pub cycle_count: u64,
    /// DRAM read beats consumed.
    pub dram_read_beats: u64,
    /// DRAM write beats issued.
    pub dram_write_beats: u64,
    /// Tiles retired (writeback acknowledged).
    pub tile_count: u64,
    /// Cycles the prefetch engine was idle with an empty queue while the
    /// job was busy.
    pub idle_cycles: u64,
}

impl PerfCounters {
    /// Zero every counter (job start).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
