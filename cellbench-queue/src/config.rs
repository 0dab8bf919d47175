//! Scheduler configuration
//!
//! Every tunable the scheduler honors lives here. Defaults match the
//! controller's shipped configuration; experiment hosts override them from
//! their own config layer before calling [`DeviceScheduler::start`].
//!
//! [`DeviceScheduler::start`]: crate::scheduler::DeviceScheduler::start

use crate::error::{QueueError, QueueResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default high-priority queue capacity
pub const DEFAULT_HIGH_CAPACITY: usize = 50;

/// Default normal-priority queue capacity
pub const DEFAULT_NORMAL_CAPACITY: usize = 20;

/// Default low-priority queue capacity
pub const DEFAULT_LOW_CAPACITY: usize = 10;

/// Default blocking-submit completion timeout
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default reconnect backoff base delay
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_millis(1000);

/// Default reconnect backoff ceiling
pub const DEFAULT_RECONNECT_CAP: Duration = Duration::from_millis(30_000);

/// Backoff doubles at most this many times
pub const BACKOFF_EXPONENT_CAP: u32 = 5;

/// Default maximum commands per transaction
pub const DEFAULT_TRANSACTION_MAX_COMMANDS: usize = 20;

/// Default transaction wall-clock timeout
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Worker sleep when all queues are empty
pub const DEFAULT_IDLE_TICK: Duration = Duration::from_millis(10);

/// Worker sleep while disconnected and the reconnect deadline is ahead
pub const DEFAULT_DISCONNECTED_TICK: Duration = Duration::from_millis(100);

/// Per-device scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Device label carried on every tracing event from this scheduler
    pub label: String,
    /// High-priority queue capacity
    pub high_capacity: usize,
    /// Normal-priority queue capacity
    pub normal_capacity: usize,
    /// Low-priority queue capacity
    pub low_capacity: usize,
    /// Default completion timeout for blocking submits
    pub command_timeout: Duration,
    /// Reconnect backoff base delay
    pub reconnect_base: Duration,
    /// Reconnect backoff ceiling
    pub reconnect_cap: Duration,
    /// Maximum number of commands a transaction may hold
    pub transaction_max_commands: usize,
    /// Default transaction wall-clock timeout
    pub transaction_timeout: Duration,
    /// Worker polling tick when idle
    pub idle_tick: Duration,
    /// Worker polling tick while disconnected
    pub disconnected_tick: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            label: String::from("device"),
            high_capacity: DEFAULT_HIGH_CAPACITY,
            normal_capacity: DEFAULT_NORMAL_CAPACITY,
            low_capacity: DEFAULT_LOW_CAPACITY,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            reconnect_base: DEFAULT_RECONNECT_BASE,
            reconnect_cap: DEFAULT_RECONNECT_CAP,
            transaction_max_commands: DEFAULT_TRANSACTION_MAX_COMMANDS,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            idle_tick: DEFAULT_IDLE_TICK,
            disconnected_tick: DEFAULT_DISCONNECTED_TICK,
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with the given device label and defaults
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Reject configurations the worker cannot run with
    pub fn validate(&self) -> QueueResult<()> {
        if self.high_capacity == 0 || self.normal_capacity == 0 || self.low_capacity == 0 {
            return Err(QueueError::InvalidParameter(
                "queue capacities must be non-zero".into(),
            ));
        }
        if self.reconnect_base.is_zero() {
            return Err(QueueError::InvalidParameter(
                "reconnect base delay must be non-zero".into(),
            ));
        }
        if self.transaction_max_commands == 0 {
            return Err(QueueError::InvalidParameter(
                "transaction capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
