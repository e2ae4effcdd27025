//! Configuration for the supervisor.
//!
//! All configuration is in-process; there is no environment or file layer.

use std::time::Duration;

/// Shard-map database name used when none is configured.
pub const DEFAULT_SHARDS_DB: &str = "_dbs";

/// Average per-scheduled-scan delay the startup jitter widens from.
pub const DEFAULT_SCAN_AVG_DELAY: Duration = Duration::from_millis(10);

/// Upper bound on any single startup jitter delay.
pub const DEFAULT_SCAN_MAX_DELAY: Duration = Duration::from_millis(120_000);

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Shard suffix this supervisor follows. Only databases whose name
    /// suffix equals this value are processed.
    pub suffix: String,

    /// Drop change rows for design documents before they reach the handler.
    pub skip_design_docs: bool,

    /// Name of the cluster shard-map database the scanner walks at startup.
    pub shards_db: String,

    /// Average delay used by the startup scanner's jitter window.
    pub scan_avg_delay: Duration,

    /// Cap on the startup scanner's jitter window.
    pub scan_max_delay: Duration,
}

impl SupervisorConfig {
    /// Creates a configuration for the given suffix with default settings.
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            skip_design_docs: false,
            shards_db: DEFAULT_SHARDS_DB.to_string(),
            scan_avg_delay: DEFAULT_SCAN_AVG_DELAY,
            scan_max_delay: DEFAULT_SCAN_MAX_DELAY,
        }
    }
}
