//! Wall-clock accounting for the tick loop.
//!
//! Timings never feed back into simulation state; they exist so slow
//! ticks can be attributed to conquest or enclave sweeps when profiling.

use std::time::Duration;

/// Aggregate timings since simulation start.
#[derive(Debug, Default, Clone)]
pub struct SimMetrics {
    pub total_ticks: u64,
    pub total_time: Duration,
    pub attack_time: Duration,
    pub cluster_time: Duration,
}

impl SimMetrics {
    pub fn tick_avg_ms(&self) -> f64 {
        if self.total_ticks == 0 {
            return 0.0;
        }
        self.total_time.as_secs_f64() * 1000.0 / self.total_ticks as f64
    }

    pub fn ticks_per_second(&self) -> f64 {
        let secs = self.total_time.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.total_ticks as f64 / secs
    }
}
