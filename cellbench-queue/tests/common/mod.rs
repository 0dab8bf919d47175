#![allow(dead_code)]

//! Scripted in-memory device for scheduler tests

use async_trait::async_trait;
use cellbench_queue::{DeviceAdapter, QueueError, QueueResult};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Command discriminants of the scripted device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockKind {
    Echo,
    Sleep,
    Fail,
    LinkFail,
}

/// Commands with scripted behavior; every variant carries a tag that is
/// recorded in execution order
#[derive(Debug, Clone)]
pub enum MockCommand {
    /// Succeed immediately
    Echo(u32),
    /// Succeed after holding the wire for a while
    Sleep { tag: u32, hold: Duration },
    /// Fail with `OperationFailed`
    Fail(u32),
    /// Fail with `CommunicationFailed` (demotes the link)
    LinkFail(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    Echoed(u32),
    Slept(u32),
}

/// Observation shared between the test body and the adapter
#[derive(Debug, Default)]
pub struct MockState {
    /// Tags in the order the device executed them
    pub executed: Mutex<Vec<u32>>,
    /// Connect attempts remaining that must fail
    pub connect_failures_left: AtomicU32,
    /// Instant of every connect attempt
    pub connect_attempts: Mutex<Vec<Instant>>,
}

impl MockState {
    pub fn executed(&self) -> Vec<u32> {
        self.executed.lock().unwrap().clone()
    }

    pub fn connect_attempt_count(&self) -> usize {
        self.connect_attempts.lock().unwrap().len()
    }
}

pub struct MockAdapter {
    connected: bool,
    pub state: Arc<MockState>,
}

impl MockAdapter {
    pub fn new() -> (Self, Arc<MockState>) {
        let state = Arc::new(MockState::default());
        (
            Self {
                connected: false,
                state: Arc::clone(&state),
            },
            state,
        )
    }

    /// Script the next `n` connect attempts to fail
    pub fn failing_connects(n: u32) -> (Self, Arc<MockState>) {
        let (adapter, state) = Self::new();
        state.connect_failures_left.store(n, Ordering::Release);
        (adapter, state)
    }
}

#[async_trait]
impl DeviceAdapter for MockAdapter {
    type Kind = MockKind;
    type Command = MockCommand;
    type Response = MockResponse;

    async fn connect(&mut self) -> QueueResult<()> {
        self.state
            .connect_attempts
            .lock()
            .unwrap()
            .push(Instant::now());
        let left = self.state.connect_failures_left.load(Ordering::Acquire);
        if left > 0 {
            self.state
                .connect_failures_left
                .store(left - 1, Ordering::Release);
            return Err(QueueError::CommunicationFailed("scripted refusal".into()));
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    async fn test_connection(&mut self) -> QueueResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(QueueError::NotConnected)
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn execute(
        &mut self,
        _kind: MockKind,
        command: MockCommand,
    ) -> QueueResult<MockResponse> {
        match command {
            MockCommand::Echo(tag) => {
                self.state.executed.lock().unwrap().push(tag);
                Ok(MockResponse::Echoed(tag))
            }
            MockCommand::Sleep { tag, hold } => {
                self.state.executed.lock().unwrap().push(tag);
                tokio::time::sleep(hold).await;
                Ok(MockResponse::Slept(tag))
            }
            MockCommand::Fail(tag) => {
                self.state.executed.lock().unwrap().push(tag);
                Err(QueueError::OperationFailed("scripted failure".into()))
            }
            MockCommand::LinkFail(tag) => {
                self.state.executed.lock().unwrap().push(tag);
                Err(QueueError::CommunicationFailed("scripted link drop".into()))
            }
        }
    }

    fn kind_of(command: &MockCommand) -> MockKind {
        match command {
            MockCommand::Echo(_) => MockKind::Echo,
            MockCommand::Sleep { .. } => MockKind::Sleep,
            MockCommand::Fail(_) => MockKind::Fail,
            MockCommand::LinkFail(_) => MockKind::LinkFail,
        }
    }

    fn command_name(kind: MockKind) -> &'static str {
        match kind {
            MockKind::Echo => "echo",
            MockKind::Sleep => "sleep",
            MockKind::Fail => "fail",
            MockKind::LinkFail => "link-fail",
        }
    }
}

/// Poll a condition until it holds or the budget runs out
pub async fn wait_until(budget: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + budget;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    cond()
}

/// Route worker tracing through the test harness when RUST_LOG asks for it
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scheduler config with fast ticks suited to tests
pub fn fast_config(label: &str) -> cellbench_queue::SchedulerConfig {
    init_tracing();
    cellbench_queue::SchedulerConfig {
        label: label.into(),
        idle_tick: Duration::from_millis(1),
        disconnected_tick: Duration::from_millis(2),
        ..cellbench_queue::SchedulerConfig::default()
    }
}
