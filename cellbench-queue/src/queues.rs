//! Bounded priority queue set
//!
//! Three thread-safe FIFO lanes (high/normal/low) plus a pending-command
//! index. The index answers `has_kind` across all three lanes; cancel scans
//! drain a lane, complete matches as `Cancelled` and write survivors back in
//! order, so FIFO is preserved end-to-end.

use crate::adapter::DeviceAdapter;
use crate::command::{Command, Priority};
use crate::config::SchedulerConfig;
use crate::error::{QueueError, QueueResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How long an enqueue may wait for a free slot
#[derive(Debug, Clone, Copy)]
pub(crate) enum EnqueueBudget {
    /// Fail with `QueueFull` immediately
    NoWait,
    /// Poll until the deadline, then fail with `Timeout`
    Until(Instant),
    /// Poll until a slot frees up
    Forever,
}

/// Poll interval while waiting on a full lane
const ENQUEUE_RETRY_TICK: Duration = Duration::from_millis(5);

/// Index entry for a command sitting in a lane
struct PendingEntry<K> {
    kind: K,
    #[allow(dead_code)]
    priority: Priority,
}

struct Lane<A: DeviceAdapter> {
    tx: flume::Sender<Command<A>>,
    rx: flume::Receiver<Command<A>>,
}

impl<A: DeviceAdapter> Lane<A> {
    fn bounded(capacity: usize) -> Self {
        let (tx, rx) = flume::bounded(capacity);
        Self { tx, rx }
    }
}

/// The scheduler's three priority lanes
///
/// The structure lock serializes enqueue, dequeue and scans against each
/// other; none of them is held across an await point. Lane contents and the
/// pending index therefore never disagree.
pub(crate) struct PriorityQueues<A: DeviceAdapter> {
    high: Lane<A>,
    normal: Lane<A>,
    low: Lane<A>,
    pending: DashMap<u64, PendingEntry<A::Kind>>,
    structure: Mutex<()>,
}

impl<A: DeviceAdapter> PriorityQueues<A> {
    pub(crate) fn new(config: &SchedulerConfig) -> Self {
        Self {
            high: Lane::bounded(config.high_capacity),
            normal: Lane::bounded(config.normal_capacity),
            low: Lane::bounded(config.low_capacity),
            pending: DashMap::new(),
            structure: Mutex::new(()),
        }
    }

    fn lane(&self, priority: Priority) -> &Lane<A> {
        match priority {
            Priority::High => &self.high,
            Priority::Normal => &self.normal,
            Priority::Low => &self.low,
        }
    }

    /// Queued command count in one lane
    pub(crate) fn queued(&self, priority: Priority) -> usize {
        self.lane(priority).rx.len()
    }

    /// One-shot enqueue attempt; returns the envelope on a full lane
    pub(crate) fn try_enqueue(&self, cmd: Command<A>) -> Result<(), Command<A>> {
        let id = cmd.id;
        let entry = PendingEntry {
            kind: cmd.kind,
            priority: cmd.priority,
        };
        let _guard = self.structure.lock();
        match self.lane(cmd.priority).tx.try_send(cmd) {
            Ok(()) => {
                self.pending.insert(id.raw(), entry);
                Ok(())
            }
            Err(flume::TrySendError::Full(cmd)) | Err(flume::TrySendError::Disconnected(cmd)) => {
                Err(cmd)
            }
        }
    }

    /// Enqueue with a wait budget
    ///
    /// Atomic per the submit contract: on `Ok` the envelope is queued and
    /// will be completed exactly once; on `Err` it was never consumed.
    pub(crate) async fn enqueue(
        &self,
        mut cmd: Command<A>,
        budget: EnqueueBudget,
        shutdown: &AtomicBool,
    ) -> QueueResult<()> {
        loop {
            if shutdown.load(Ordering::Acquire) {
                return Err(QueueError::Shutdown);
            }
            match self.try_enqueue(cmd) {
                Ok(()) => return Ok(()),
                Err(returned) => {
                    cmd = returned;
                    match budget {
                        EnqueueBudget::NoWait => return Err(QueueError::QueueFull),
                        EnqueueBudget::Until(deadline) if Instant::now() >= deadline => {
                            return Err(QueueError::Timeout)
                        }
                        _ => tokio::time::sleep(ENQUEUE_RETRY_TICK).await,
                    }
                }
            }
        }
    }

    /// Pop the next command in strict high > normal > low order
    pub(crate) fn try_dequeue(&self) -> Option<Command<A>> {
        let _guard = self.structure.lock();
        for priority in Priority::DRAIN_ORDER {
            if let Ok(cmd) = self.lane(priority).rx.try_recv() {
                self.pending.remove(&cmd.id.raw());
                return Some(cmd);
            }
        }
        None
    }

    /// Remove every queued command matching the predicate and complete it
    /// as `Cancelled`; survivors keep their FIFO positions
    ///
    /// Returns the number of commands cancelled. Completion runs after the
    /// structure lock is released so continuations may re-enter the queue.
    pub(crate) fn cancel_where(&self, pred: impl Fn(&Command<A>) -> bool) -> usize {
        let mut cancelled = Vec::new();
        {
            let _guard = self.structure.lock();
            for priority in Priority::DRAIN_ORDER {
                let lane = self.lane(priority);
                let mut survivors = Vec::new();
                while let Ok(cmd) = lane.rx.try_recv() {
                    if pred(&cmd) {
                        self.pending.remove(&cmd.id.raw());
                        cancelled.push(cmd);
                    } else {
                        survivors.push(cmd);
                    }
                }
                for cmd in survivors {
                    // Cannot fail: the lane was just drained and the lock
                    // keeps producers out.
                    match lane.tx.try_send(cmd) {
                        Ok(()) => {}
                        Err(flume::TrySendError::Full(cmd))
                        | Err(flume::TrySendError::Disconnected(cmd)) => {
                            tracing::error!(id = %cmd.id, "lost lane slot during scan");
                            self.pending.remove(&cmd.id.raw());
                            cancelled.push(cmd);
                        }
                    }
                }
            }
        }
        let count = cancelled.len();
        for cmd in cancelled {
            cmd.reject(QueueError::Cancelled);
        }
        count
    }

    /// Whether any lane holds a command of the given kind
    pub(crate) fn has_kind(&self, kind: A::Kind) -> bool {
        self.pending.iter().any(|entry| entry.kind == kind)
    }
}
