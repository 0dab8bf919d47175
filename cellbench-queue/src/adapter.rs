//! Device adapter capability contract
//!
//! One [`DeviceAdapter`] implementation exists per device family (power
//! supply, electrochemical workstation, DAQ, temperature controller). The
//! worker task owns the adapter exclusively for the scheduler's lifetime, so
//! an implementation never has to defend its wire against concurrent calls.

use crate::error::QueueResult;
use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

/// Capability set the scheduler drives a device family through
///
/// Commands are a closed sum: each variant carries its parameters by value,
/// and responses carry their payloads by value. Submitting moves the command
/// into the scheduler and completion moves the response out, so the caller's
/// inputs are never aliased or mutated.
#[async_trait]
pub trait DeviceAdapter: Send + 'static {
    /// Discriminant used for queue scans, diagnostics and settle delays
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;
    /// Closed sum of commands with their parameters
    type Command: Send + 'static;
    /// Kind-discriminated response payload
    type Response: Send + 'static;

    /// Establish the physical link
    ///
    /// Must return `Ok` without side effects when already connected.
    async fn connect(&mut self) -> QueueResult<()>;

    /// Tear the link down; safe to call when already disconnected
    async fn disconnect(&mut self);

    /// Cheap round-trip sanity check of an established link
    async fn test_connection(&mut self) -> QueueResult<()>;

    /// Local connected-flag inspection, no I/O
    fn is_connected(&self) -> bool;

    /// Run one command on the wire, blocking until the device answers
    ///
    /// This is the only entry point the worker calls inside the per-device
    /// critical section.
    async fn execute(&mut self, kind: Self::Kind, command: Self::Command)
        -> QueueResult<Self::Response>;

    /// The discriminant of a command value
    fn kind_of(command: &Self::Command) -> Self::Kind;

    /// Human-readable command name for logs
    fn command_name(kind: Self::Kind) -> &'static str;

    /// Post-execution settle sleep applied by the worker after this kind
    fn post_delay(&self, _kind: Self::Kind) -> Duration {
        Duration::ZERO
    }
}
