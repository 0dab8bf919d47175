//! Engine constants: settle delays, retry counts, tick periods

use std::time::Duration;

/// Settle after a successful device connect
pub const AFTER_CONNECT_SETTLE: Duration = Duration::from_millis(500);

/// Settle after a technique run completes
pub const AFTER_TECHNIQUE_SETTLE: Duration = Duration::from_millis(200);

/// Settle after channel configuration commands
pub const AFTER_CONFIG_SETTLE: Duration = Duration::from_millis(100);

/// General recovery settle between quick operations
pub const RECOVERY_SETTLE: Duration = Duration::from_millis(50);

/// Wait between stopping a channel and loading the next technique
pub const CHANNEL_STOP_SETTLE: Duration = Duration::from_millis(200);

/// Data retrieval attempts after the channel reports STOP
pub const DATA_RETRIEVAL_ATTEMPTS: u32 = 3;

/// Default technique polling tick; also bounds cancel-flag latency
pub const DEFAULT_UPDATE_TICK: Duration = Duration::from_millis(100);
