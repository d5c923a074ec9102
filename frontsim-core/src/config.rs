//! Static engine configuration.

use serde::{Deserialize, Serialize};

/// Per-game tuning knobs, fixed for the lifetime of a game.
///
/// Every field is lockstep-relevant: replicas must agree on the whole
/// struct, along with the seed, to stay in sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Ticks after spawn during which a player cannot be attacked.
    pub spawn_immunity_ticks: u64,
    /// Cadence of the per-player enclave sweep. Sweeps are phase-offset
    /// by player id so they spread across ticks instead of bunching.
    pub cluster_check_interval: u64,
    /// Downsampling stride of the coarse distance lattice built for
    /// directed attacks.
    pub coarse_stride: u32,
    /// Log a state checksum every N ticks; 0 disables.
    pub checksum_frequency: u64,
    /// Defenders holding fewer tiles than this after losing one are
    /// conquered outright.
    pub full_conquest_threshold: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            spawn_immunity_ticks: 100,
            cluster_check_interval: 10,
            coarse_stride: 4,
            checksum_frequency: 30,
            full_conquest_threshold: 100,
        }
    }
}
