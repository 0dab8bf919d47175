//! Per-device scheduler facade
//!
//! A [`DeviceScheduler`] serializes all access to one physical device. Any
//! number of tasks submit commands concurrently; a single worker task owns
//! the wire and drains work in priority order. Blocking callers await a
//! one-shot completion with a deadline; async callers hand over a
//! continuation and get a command id back.

use crate::adapter::DeviceAdapter;
use crate::command::{Command, CommandCallback, CommandId, CommandOutcome, Completion, Priority};
use crate::config::SchedulerConfig;
use crate::connection::ConnectionSupervisor;
use crate::error::{QueueError, QueueResult};
use crate::queues::EnqueueBudget;
use crate::transaction::{
    TransactionCallback, TransactionId, TransactionMode, TransactionReport,
};
use crate::worker::{Shared, Worker};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Point-in-time view of a scheduler's counters and flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Commands waiting in the high lane
    pub high_queued: usize,
    /// Commands waiting in the normal lane
    pub normal_queued: usize,
    /// Commands waiting in the low lane
    pub low_queued: usize,
    /// Commands completed successfully since start
    pub processed: u64,
    /// Commands completed with an error since start
    pub errors: u64,
    /// Consecutive failed reconnect attempts; 0 while connected
    pub reconnect_attempts: u32,
    pub connected: bool,
    /// A command is on the wire right now
    pub processing: bool,
    /// The transaction currently executing, if any
    pub active_transaction: Option<TransactionId>,
    pub in_transaction_mode: bool,
}

/// Serializing command scheduler for one physical device
pub struct DeviceScheduler<A: DeviceAdapter> {
    shared: Arc<Shared<A>>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<A: DeviceAdapter> DeviceScheduler<A> {
    /// Validate the configuration, attempt the initial connect and spawn
    /// the worker
    ///
    /// A failed initial connect is non-fatal: the scheduler starts
    /// disconnected, commands queue up, and the worker retries with
    /// exponential backoff.
    pub async fn start(mut adapter: A, config: SchedulerConfig) -> QueueResult<Self> {
        config.validate()?;
        let shared = Arc::new(Shared::new(config));
        let mut supervisor = ConnectionSupervisor::new(
            shared.config.reconnect_base,
            shared.config.reconnect_cap,
        );

        match adapter.connect().await {
            Ok(()) => match adapter.test_connection().await {
                Ok(()) => {
                    supervisor.connected();
                    shared.stats.connected.store(true, Ordering::Release);
                    info!(device = %shared.config.label, "device connected");
                }
                Err(error) => {
                    let (attempts, _) = supervisor.connect_failed(Instant::now());
                    shared
                        .stats
                        .reconnect_attempts
                        .store(attempts, Ordering::Release);
                    warn!(device = %shared.config.label, %error, "connection test failed at startup");
                }
            },
            Err(error) => {
                let (attempts, _) = supervisor.connect_failed(Instant::now());
                shared
                    .stats
                    .reconnect_attempts
                    .store(attempts, Ordering::Release);
                warn!(
                    device = %shared.config.label,
                    %error,
                    "initial connect failed; commands will queue until the device comes up"
                );
            }
        }

        let worker = Worker {
            adapter,
            supervisor,
            shared: Arc::clone(&shared),
        };
        let handle = tokio::spawn(worker.run());

        Ok(Self {
            shared,
            worker: parking_lot::Mutex::new(Some(handle)),
        })
    }

    /// Submit and await completion
    ///
    /// The timeout covers both the wait for a queue slot and the wait for
    /// completion. `None` waits forever; `Some(ZERO)` fails immediately
    /// with `QueueFull` when the lane has no room. On a completion timeout
    /// the command may still execute later, but its outcome is dropped —
    /// the caller's receiver is gone and the worker's send is a no-op.
    pub async fn submit(
        &self,
        command: A::Command,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> QueueResult<A::Response> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(QueueError::Shutdown);
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let budget = match (timeout, deadline) {
            (Some(t), _) if t.is_zero() => EnqueueBudget::NoWait,
            (Some(_), Some(at)) => EnqueueBudget::Until(at),
            _ => EnqueueBudget::Forever,
        };

        let (tx, rx) = oneshot::channel();
        let cmd = Command::new(command, priority, Completion::Oneshot(tx));
        self.shared
            .queues
            .enqueue(cmd, budget, &self.shared.shutdown)
            .await?;

        let received = match deadline {
            Some(at) => tokio::time::timeout_at(tokio::time::Instant::from_std(at), rx)
                .await
                .map_err(|_| QueueError::Timeout)?,
            None => rx.await,
        };
        // A dropped sender means the worker vanished without completing us,
        // which only happens when the runtime tears the task down.
        received.map_err(|_| QueueError::Shutdown)?
    }

    /// Submit with the configured default command timeout
    pub async fn submit_default(
        &self,
        command: A::Command,
        priority: Priority,
    ) -> QueueResult<A::Response> {
        self.submit(command, priority, Some(self.shared.config.command_timeout))
            .await
    }

    /// Submit without waiting; the callback runs on the worker when the
    /// command completes (or is cancelled)
    ///
    /// Fails with `QueueFull` when the lane has no room.
    pub fn submit_with_callback(
        &self,
        command: A::Command,
        priority: Priority,
        callback: impl FnOnce(CommandId, CommandOutcome<A>) + Send + 'static,
    ) -> QueueResult<CommandId> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(QueueError::Shutdown);
        }
        let boxed: CommandCallback<A> = Box::new(callback);
        let cmd = Command::new(command, priority, Completion::Callback(boxed));
        let id = cmd.id;
        self.shared
            .queues
            .try_enqueue(cmd)
            .map(|()| id)
            .map_err(|_| QueueError::QueueFull)
    }

    /// Cancel one queued command; fails if it is unknown or already running
    pub fn cancel(&self, id: CommandId) -> QueueResult<()> {
        if self.shared.queues.cancel_where(|cmd| cmd.id == id) == 1 {
            Ok(())
        } else {
            Err(QueueError::InvalidParameter(format!(
                "command {id} is not queued"
            )))
        }
    }

    /// Cancel every queued command of one kind; returns how many
    pub fn cancel_by_kind(&self, kind: A::Kind) -> usize {
        self.shared.queues.cancel_where(|cmd| cmd.kind == kind)
    }

    /// Cancel every queued command older than `age`; returns how many
    pub fn cancel_older_than(&self, age: Duration) -> usize {
        let now = Instant::now();
        self.shared
            .queues
            .cancel_where(|cmd| now.duration_since(cmd.submitted_at) >= age)
    }

    /// Cancel everything queued; returns how many
    pub fn cancel_all(&self) -> usize {
        self.shared.queues.cancel_where(|_| true)
    }

    /// Whether any lane currently holds a command of this kind
    pub fn has_kind(&self, kind: A::Kind) -> bool {
        self.shared.queues.has_kind(kind)
    }

    /// Whether the worker is alive and accepting work
    pub fn is_running(&self) -> bool {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return false;
        }
        self.worker
            .lock()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Snapshot the counters and flags
    pub fn stats(&self) -> StatsSnapshot {
        let stats = &self.shared.stats;
        let active = stats.active_transaction.load(Ordering::Acquire);
        StatsSnapshot {
            high_queued: self.shared.queues.queued(Priority::High),
            normal_queued: self.shared.queues.queued(Priority::Normal),
            low_queued: self.shared.queues.queued(Priority::Low),
            processed: stats.processed.load(Ordering::Relaxed),
            errors: stats.errors.load(Ordering::Relaxed),
            reconnect_attempts: stats.reconnect_attempts.load(Ordering::Acquire),
            connected: stats.connected.load(Ordering::Acquire),
            processing: stats.processing.load(Ordering::Acquire),
            active_transaction: match active {
                0 => None,
                raw => Some(TransactionId::from_raw(raw)),
            },
            in_transaction_mode: stats.in_transaction_mode.load(Ordering::Acquire),
        }
    }

    /// Open a transaction with default flags
    pub fn begin_transaction(&self) -> QueueResult<TransactionId> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(QueueError::Shutdown);
        }
        Ok(self.shared.transactions.begin())
    }

    /// Append a command to an open transaction
    pub fn transaction_add(
        &self,
        transaction: TransactionId,
        command: A::Command,
    ) -> QueueResult<CommandId> {
        self.shared.transactions.add(transaction, command)
    }

    /// Change the error behavior of an open transaction
    pub fn transaction_set_mode(
        &self,
        transaction: TransactionId,
        mode: TransactionMode,
    ) -> QueueResult<()> {
        self.shared.transactions.set_mode(transaction, mode)
    }

    /// Change the priority of an open transaction
    pub fn transaction_set_priority(
        &self,
        transaction: TransactionId,
        priority: Priority,
    ) -> QueueResult<()> {
        self.shared.transactions.set_priority(transaction, priority)
    }

    /// Change the wall-clock timeout of an open transaction
    pub fn transaction_set_timeout(
        &self,
        transaction: TransactionId,
        timeout: Duration,
    ) -> QueueResult<()> {
        self.shared.transactions.set_timeout(transaction, timeout)
    }

    /// Commit: the transaction leaves the open pool and becomes eligible
    /// for execution; the callback receives the final report
    pub fn commit_transaction(
        &self,
        transaction: TransactionId,
        callback: impl FnOnce(TransactionReport<A>) + Send + 'static,
    ) -> QueueResult<()> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(QueueError::Shutdown);
        }
        let boxed: TransactionCallback<A> = Box::new(callback);
        self.shared.transactions.commit(transaction, boxed)
    }

    /// Drop an open transaction; rejected once committed
    pub fn cancel_transaction(&self, transaction: TransactionId) -> QueueResult<()> {
        self.shared.transactions.cancel(transaction)
    }

    /// Whether the worker is currently inside a transaction
    pub fn is_in_transaction(&self) -> bool {
        self.shared
            .stats
            .in_transaction_mode
            .load(Ordering::Acquire)
    }

    /// Stop the worker and cancel everything still queued
    ///
    /// Idempotent: the second and later calls return immediately. After
    /// this returns, every in-flight envelope has been completed as
    /// `Cancelled`, committed transactions have received all-cancelled
    /// reports, the device is disconnected and no further callback fires.
    pub async fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        // Sweep anything that raced the shutdown flag.
        self.shared.queues.cancel_where(|_| true);
        for txn in self.shared.transactions.drain_ready() {
            let (callback, report) = txn.into_cancelled_report();
            if let Some(callback) = callback {
                callback(report);
            }
        }
        self.shared.transactions.drain_open();
    }
}

impl<A: DeviceAdapter> Drop for DeviceScheduler<A> {
    fn drop(&mut self) {
        // Best effort: the worker notices the flag, drains and exits on its
        // own. Callers that need the drain to have finished use `shutdown`.
        self.shared.shutdown.store(true, Ordering::Release);
    }
}
