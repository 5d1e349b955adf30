/// Timing and threshold knobs for the orchestrator. All durations are milliseconds of the
/// clock that drives [`crate::Msg::Tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Stagger between two consecutive tab openings.
    pub dispatch_interval_ms: u64,
    /// Period of the tab check loop.
    pub tick_interval_ms: u64,
    /// How long a closed tab may stay without a result before the item fails.
    pub result_timeout_ms: u64,
    pub test_phase_enabled: bool,
    /// Batches larger than this sample only the first `test_sample_size` items first.
    pub test_sample_size: usize,
    /// Delay before a continuation page starts its own batch.
    pub auto_start_delay_ms: u64,
    /// Entries per listing page, used to compute the `start=` offset of later pages.
    pub movies_per_page: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: 3_000,
            tick_interval_ms: 1_000,
            result_timeout_ms: 30_000,
            test_phase_enabled: true,
            test_sample_size: 3,
            auto_start_delay_ms: 3_000,
            movies_per_page: 15,
        }
    }
}

impl SyncSettings {
    /// Whether a page batch of `total` items starts with a test phase.
    pub fn wants_test_phase(&self, total: usize) -> bool {
        self.test_phase_enabled && self.test_sample_size > 0 && total > self.test_sample_size
    }
}
