//! Command envelope and completion paths

use crate::adapter::DeviceAdapter;
use crate::error::QueueError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::oneshot;

/// Process-wide command id source; ids start at 1 and are never reused
static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a submitted command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Allocate the next id from the process-wide monotonic counter
    pub(crate) fn next() -> Self {
        Self(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric id
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scheduling class of a command
///
/// The worker never consumes a lower class while a higher one has work
/// queued; within a class submission order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Drained first
    High,
    /// Default class
    Normal,
    /// Drained last
    Low,
}

impl Priority {
    /// All classes in drain order
    pub const DRAIN_ORDER: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];
}

/// What a command resolved to: the adapter's response or an error
pub type CommandOutcome<A> = Result<<A as DeviceAdapter>::Response, QueueError>;

/// Continuation invoked by the worker for async submits
pub type CommandCallback<A> = Box<dyn FnOnce(CommandId, CommandOutcome<A>) + Send + 'static>;

/// Exactly one completion path per envelope
///
/// Both arms are consumed by value, so double delivery is unrepresentable.
/// A dropped oneshot receiver (the caller timed out) makes delivery a silent
/// no-op; the worker never touches caller state after the send.
pub(crate) enum Completion<A: DeviceAdapter> {
    /// Blocking submit: the caller owns the receiver
    Oneshot(oneshot::Sender<CommandOutcome<A>>),
    /// Async submit: continuation runs on the worker
    Callback(CommandCallback<A>),
}

impl<A: DeviceAdapter> Completion<A> {
    /// Deliver the outcome, consuming the path
    pub(crate) fn deliver(self, id: CommandId, outcome: CommandOutcome<A>) {
        match self {
            Completion::Oneshot(tx) => {
                let _ = tx.send(outcome);
            }
            Completion::Callback(callback) => callback(id, outcome),
        }
    }
}

/// Envelope the scheduler owns from enqueue until completion
///
/// Transactional commands never take this shape: committing moves them to
/// the worker as a unit, so membership needs no per-envelope tag.
pub(crate) struct Command<A: DeviceAdapter> {
    pub id: CommandId,
    /// Discriminant captured at enqueue so scans never touch the payload
    pub kind: A::Kind,
    pub request: A::Command,
    pub priority: Priority,
    pub submitted_at: Instant,
    pub completion: Completion<A>,
}

impl<A: DeviceAdapter> Command<A> {
    pub(crate) fn new(
        request: A::Command,
        priority: Priority,
        completion: Completion<A>,
    ) -> Self {
        Self {
            id: CommandId::next(),
            kind: A::kind_of(&request),
            request,
            priority,
            submitted_at: Instant::now(),
            completion,
        }
    }

    /// Complete the envelope without executing it
    pub(crate) fn reject(self, error: QueueError) {
        let Command { id, completion, .. } = self;
        completion.deliver(id, Err(error));
    }
}
