//! The per-device worker task
//!
//! Exactly one worker exists per scheduler. It owns the adapter — and with
//! it the wire — for the scheduler's whole lifetime, so every protocol
//! interaction happens on one task with no further locking. The loop:
//! shutdown check, reconnect window, committed transactions, then priority
//! traffic, then a short idle tick.

use crate::adapter::DeviceAdapter;
use crate::command::Command;
use crate::config::SchedulerConfig;
use crate::connection::ConnectionSupervisor;
use crate::error::QueueError;
use crate::queues::PriorityQueues;
use crate::transaction::{Transaction, TransactionRegistry, TransactionReport};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Lock-free counters and flags published by the worker
#[derive(Debug, Default)]
pub(crate) struct Stats {
    /// Commands that completed successfully
    pub processed: AtomicU64,
    /// Commands that completed with an error
    pub errors: AtomicU64,
    /// Consecutive failed reconnect attempts; 0 while connected
    pub reconnect_attempts: AtomicU32,
    pub connected: AtomicBool,
    /// A command is on the wire right now
    pub processing: AtomicBool,
    /// Raw id of the executing transaction; 0 when none
    pub active_transaction: AtomicU64,
    pub in_transaction_mode: AtomicBool,
}

/// State shared between the scheduler facade and its worker
pub(crate) struct Shared<A: DeviceAdapter> {
    pub config: SchedulerConfig,
    pub queues: PriorityQueues<A>,
    pub transactions: TransactionRegistry<A>,
    pub stats: Stats,
    pub shutdown: AtomicBool,
}

impl<A: DeviceAdapter> Shared<A> {
    pub(crate) fn new(config: SchedulerConfig) -> Self {
        let queues = PriorityQueues::new(&config);
        let transactions =
            TransactionRegistry::new(config.transaction_max_commands, config.transaction_timeout);
        Self {
            config,
            queues,
            transactions,
            stats: Stats::default(),
            shutdown: AtomicBool::new(false),
        }
    }
}

pub(crate) struct Worker<A: DeviceAdapter> {
    pub adapter: A,
    pub supervisor: ConnectionSupervisor,
    pub shared: std::sync::Arc<Shared<A>>,
}

impl<A: DeviceAdapter> Worker<A> {
    pub(crate) async fn run(mut self) {
        let label = self.shared.config.label.clone();
        info!(device = %label, "device worker started");

        loop {
            if self.shared.shutdown.load(Ordering::Acquire) {
                break;
            }

            if !self.supervisor.is_connected() {
                self.reconnect_step().await;
                continue;
            }

            if let Some(txn) = self.shared.transactions.try_next_ready() {
                self.run_transaction(txn).await;
                continue;
            }

            match self.shared.queues.try_dequeue() {
                Some(cmd) => self.execute_command(cmd).await,
                None => sleep(self.shared.config.idle_tick).await,
            }
        }

        self.teardown().await;
        info!(device = %label, "device worker stopped");
    }

    /// One pass of the disconnected branch: attempt if due, else wait a tick
    async fn reconnect_step(&mut self) {
        let now = Instant::now();
        if !self.supervisor.reconnect_due(now) {
            sleep(self.shared.config.disconnected_tick).await;
            return;
        }

        match self.adapter.connect().await {
            Ok(()) => {
                self.supervisor.connected();
                self.shared.stats.connected.store(true, Ordering::Release);
                self.shared
                    .stats
                    .reconnect_attempts
                    .store(0, Ordering::Release);
                info!(device = %self.shared.config.label, "device connected");
            }
            Err(error) => {
                let (attempts, delay) = self.supervisor.connect_failed(Instant::now());
                self.shared
                    .stats
                    .reconnect_attempts
                    .store(attempts, Ordering::Release);
                warn!(
                    device = %self.shared.config.label,
                    attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    %error,
                    "connect attempt failed"
                );
            }
        }
    }

    /// Drop the link after a wire failure and arm a reconnect
    fn demote(&mut self, error: &QueueError) {
        warn!(device = %self.shared.config.label, %error, "link lost, scheduling reconnect");
        self.supervisor.demote(Instant::now());
        self.shared.stats.connected.store(false, Ordering::Release);
    }

    async fn execute_command(&mut self, cmd: Command<A>) {
        let Command {
            id,
            kind,
            request,
            completion,
            ..
        } = cmd;
        let shared = std::sync::Arc::clone(&self.shared);
        let stats = &shared.stats;
        stats.processing.store(true, Ordering::Release);
        debug!(device = %self.shared.config.label, %id, command = A::command_name(kind), "executing");

        let outcome = self.adapter.execute(kind, request).await;
        match &outcome {
            Ok(_) => {
                stats.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                if error.is_link_failure() {
                    self.demote(error);
                }
            }
        }
        completion.deliver(id, outcome);

        let delay = self.adapter.post_delay(kind);
        if !delay.is_zero() {
            sleep(delay).await;
        }
        stats.processing.store(false, Ordering::Release);
    }

    /// Run a committed transaction to completion, timeout or abort
    ///
    /// While this runs, no other traffic touches the device; the queues are
    /// simply not polled.
    async fn run_transaction(&mut self, txn: Transaction<A>) {
        let Transaction {
            id,
            commands,
            mode,
            timeout,
            callback,
            ..
        } = txn;
        let shared = std::sync::Arc::clone(&self.shared);
        let stats = &shared.stats;
        stats.in_transaction_mode.store(true, Ordering::Release);
        stats.active_transaction.store(id.raw(), Ordering::Release);
        info!(device = %self.shared.config.label, %id, commands = commands.len(), "transaction started");

        let started = Instant::now();
        let mut results = Vec::with_capacity(commands.len());
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        // Once set, every remaining command is stamped with this error.
        let mut poison: Option<QueueError> = None;

        for cmd in commands {
            if poison.is_none() && started.elapsed() > timeout {
                poison = Some(QueueError::Timeout);
            }
            if let Some(error) = &poison {
                results.push((cmd.id, Err(error.clone())));
                failed += 1;
                continue;
            }

            let outcome = self.adapter.execute(cmd.kind, cmd.request).await;
            match &outcome {
                Ok(_) => {
                    succeeded += 1;
                    stats.processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(error) => {
                    failed += 1;
                    stats.errors.fetch_add(1, Ordering::Relaxed);
                    if error.is_link_failure() {
                        self.demote(error);
                    }
                    if mode == crate::transaction::TransactionMode::AbortOnError {
                        poison = Some(QueueError::Cancelled);
                    }
                }
            }
            results.push((cmd.id, outcome));

            let delay = self.adapter.post_delay(cmd.kind);
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }

        info!(device = %self.shared.config.label, %id, succeeded, failed, "transaction finished");
        if let Some(callback) = callback {
            callback(TransactionReport {
                transaction: id,
                succeeded,
                failed,
                results,
            });
        }
        stats.active_transaction.store(0, Ordering::Release);
        stats.in_transaction_mode.store(false, Ordering::Release);
    }

    /// Shutdown path: cancel queued work, fail committed transactions,
    /// release the wire
    async fn teardown(&mut self) {
        let cancelled = self.shared.queues.cancel_where(|_| true);
        if cancelled > 0 {
            debug!(device = %self.shared.config.label, cancelled, "cancelled queued commands at shutdown");
        }
        for txn in self.shared.transactions.drain_ready() {
            let (callback, report) = txn.into_cancelled_report();
            if let Some(callback) = callback {
                callback(report);
            }
        }
        self.adapter.disconnect().await;
        self.shared.stats.connected.store(false, Ordering::Release);
    }
}
