pub const TICK_SECS: u32 = 1;

pub const ESCAPE_SWEEP_MS: u64 = 1_000;
pub const TRACKER_SWEEP_MS: u64 = 1_000;
pub const EVENT_SWEEP_MS: u64 = 15_000;

/// Substitute distance for candidates in a different world. Large enough
/// that any finite same-world distance wins the comparison.
pub const CROSS_WORLD_DISTANCE: f64 = 1.0e9;

/// Tracker sweeps over more hunters than this split the selection phase
/// across scoped threads.
pub const PARALLEL_SWEEP_THRESHOLD: usize = 32;
pub const PARALLEL_SWEEP_LANES: usize = 4;

pub const DEFAULT_TRACKER_COOLDOWN_SECS: u64 = 10;
pub const DEFAULT_EXTRACTION_RADIUS: f64 = 4.0;
pub const DEFAULT_REQUIRED_SECS: u32 = 10;
pub const DEFAULT_EVENT_CHANCE: f64 = 0.15;
