//! Sequential transactions
//!
//! A transaction is an ordered command list that executes on the device with
//! no interleaving from other traffic. Open transactions live in a
//! producer-side map; committing *moves* the transaction into a ready
//! channel only the worker drains, so an executing transaction can no
//! longer be observed (or mutated) through the open set.

use crate::adapter::DeviceAdapter;
use crate::command::{CommandId, CommandOutcome, Priority};
use crate::error::{QueueError, QueueResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Process-wide transaction id source; ids start at 1 and are never reused
static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(u64);

impl TransactionId {
    fn next() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric id
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw id (stats reporting)
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// What happens to the rest of a transaction when one command fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransactionMode {
    /// Keep executing; the failure is recorded in its result slot
    #[default]
    ContinueOnError,
    /// Mark every remaining command `Cancelled` and stop
    AbortOnError,
}

/// One command inside a transaction
pub(crate) struct TxnCommand<A: DeviceAdapter> {
    pub id: CommandId,
    pub kind: A::Kind,
    pub request: A::Command,
}

/// Delivered once to the commit callback when the transaction finishes
pub struct TransactionReport<A: DeviceAdapter> {
    /// Which transaction this report closes
    pub transaction: TransactionId,
    /// Commands that returned `Ok`
    pub succeeded: usize,
    /// Commands that returned an error, timed out or were cancelled
    pub failed: usize,
    /// Per-command outcomes in insertion order
    pub results: Vec<(CommandId, CommandOutcome<A>)>,
}

/// Continuation invoked by the worker when a transaction completes
pub type TransactionCallback<A> = Box<dyn FnOnce(TransactionReport<A>) + Send + 'static>;

/// A transaction while it is open or waiting for the worker
pub(crate) struct Transaction<A: DeviceAdapter> {
    pub id: TransactionId,
    pub commands: Vec<TxnCommand<A>>,
    pub mode: TransactionMode,
    #[allow(dead_code)]
    pub priority: Priority,
    pub timeout: Duration,
    pub callback: Option<TransactionCallback<A>>,
}

impl<A: DeviceAdapter> Transaction<A> {
    /// Build the all-cancelled report used when draining at shutdown
    pub(crate) fn into_cancelled_report(self) -> (Option<TransactionCallback<A>>, TransactionReport<A>) {
        let results: Vec<(CommandId, CommandOutcome<A>)> = self
            .commands
            .into_iter()
            .map(|cmd| (cmd.id, Err(QueueError::Cancelled)))
            .collect();
        let failed = results.len();
        (
            self.callback,
            TransactionReport {
                transaction: self.id,
                succeeded: 0,
                failed,
                results,
            },
        )
    }
}

/// Producer-side open set plus the worker-side ready channel
///
/// Entries are mutex-wrapped: transactions hold send-only payloads and
/// callbacks, and the map needs `Sync` to be shared with the worker.
pub(crate) struct TransactionRegistry<A: DeviceAdapter> {
    open: DashMap<u64, Mutex<Transaction<A>>>,
    ready_tx: flume::Sender<Transaction<A>>,
    ready_rx: flume::Receiver<Transaction<A>>,
    max_commands: usize,
    default_timeout: Duration,
}

impl<A: DeviceAdapter> TransactionRegistry<A> {
    pub(crate) fn new(max_commands: usize, default_timeout: Duration) -> Self {
        let (ready_tx, ready_rx) = flume::unbounded();
        Self {
            open: DashMap::new(),
            ready_tx,
            ready_rx,
            max_commands,
            default_timeout,
        }
    }

    /// Open a new transaction with default flags (continue-on-error, high
    /// priority, default timeout)
    pub(crate) fn begin(&self) -> TransactionId {
        let id = TransactionId::next();
        self.open.insert(
            id.raw(),
            Mutex::new(Transaction {
                id,
                commands: Vec::new(),
                mode: TransactionMode::default(),
                priority: Priority::High,
                timeout: self.default_timeout,
                callback: None,
            }),
        );
        id
    }

    fn with_open<R>(
        &self,
        id: TransactionId,
        f: impl FnOnce(&mut Transaction<A>) -> R,
    ) -> QueueResult<R> {
        match self.open.get(&id.raw()) {
            Some(entry) => Ok(f(&mut entry.lock())),
            None => Err(QueueError::InvalidState(format!("{id} is not open"))),
        }
    }

    /// Append a command; only legal while the transaction is open
    pub(crate) fn add(&self, id: TransactionId, request: A::Command) -> QueueResult<CommandId> {
        let max = self.max_commands;
        self.with_open(id, |txn| {
            if txn.commands.len() >= max {
                return Err(QueueError::QueueFull);
            }
            let cmd_id = CommandId::next();
            txn.commands.push(TxnCommand {
                id: cmd_id,
                kind: A::kind_of(&request),
                request,
            });
            Ok(cmd_id)
        })?
    }

    pub(crate) fn set_mode(&self, id: TransactionId, mode: TransactionMode) -> QueueResult<()> {
        self.with_open(id, |txn| txn.mode = mode)
    }

    pub(crate) fn set_priority(&self, id: TransactionId, priority: Priority) -> QueueResult<()> {
        self.with_open(id, |txn| txn.priority = priority)
    }

    pub(crate) fn set_timeout(&self, id: TransactionId, timeout: Duration) -> QueueResult<()> {
        self.with_open(id, |txn| txn.timeout = timeout)
    }

    /// Move the transaction out of the open set into the worker's lap
    ///
    /// After this returns the transaction can no longer be mutated or
    /// cancelled; it runs to completion, timeout or abort.
    pub(crate) fn commit(
        &self,
        id: TransactionId,
        callback: TransactionCallback<A>,
    ) -> QueueResult<()> {
        let (_, entry) = self
            .open
            .remove(&id.raw())
            .ok_or_else(|| QueueError::InvalidState(format!("{id} is not open")))?;
        let mut txn = entry.into_inner();
        txn.callback = Some(callback);
        self.ready_tx
            .send(txn)
            .map_err(|_| QueueError::Shutdown)
    }

    /// Drop an open transaction; rejected once committed
    pub(crate) fn cancel(&self, id: TransactionId) -> QueueResult<()> {
        match self.open.remove(&id.raw()) {
            Some(_) => Ok(()),
            None => Err(QueueError::InvalidState(format!(
                "{id} is not open (already committed, finished or unknown)"
            ))),
        }
    }

    /// Worker-side: next committed transaction, if any
    pub(crate) fn try_next_ready(&self) -> Option<Transaction<A>> {
        self.ready_rx.try_recv().ok()
    }

    /// Worker/shutdown-side: every committed-but-unstarted transaction
    pub(crate) fn drain_ready(&self) -> Vec<Transaction<A>> {
        let mut drained = Vec::new();
        while let Ok(txn) = self.ready_rx.try_recv() {
            drained.push(txn);
        }
        drained
    }

    /// Drop every open transaction (shutdown path; none has a callback yet)
    pub(crate) fn drain_open(&self) {
        self.open.clear();
    }
}
