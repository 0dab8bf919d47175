//! Submission-order guarantees: FIFO within a class, strict preemption
//! across classes

mod common;

use common::{fast_config, wait_until, MockAdapter, MockCommand, MockResponse};
use cellbench_queue::{DeviceScheduler, Priority};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
async fn fifo_within_one_priority_class() {
    let (adapter, state) = MockAdapter::new();
    let sched = DeviceScheduler::start(adapter, fast_config("fifo"))
        .await
        .unwrap();

    let completions: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
    for tag in [1u32, 2, 3] {
        let completions = Arc::clone(&completions);
        sched
            .submit_with_callback(MockCommand::Echo(tag), Priority::Normal, move |_, outcome| {
                if let Ok(MockResponse::Echoed(tag)) = outcome {
                    completions.lock().unwrap().push(tag);
                }
            })
            .unwrap();
    }

    assert!(
        wait_until(Duration::from_secs(2), || completions.lock().unwrap().len() == 3).await
    );
    assert_eq!(*completions.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(state.executed(), vec![1, 2, 3]);
    sched.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn high_preempts_queued_low_traffic() {
    let (adapter, state) = MockAdapter::new();
    let sched = DeviceScheduler::start(adapter, fast_config("preempt"))
        .await
        .unwrap();

    for tag in 1u32..=10 {
        sched
            .submit_with_callback(
                MockCommand::Sleep {
                    tag,
                    hold: Duration::from_millis(50),
                },
                Priority::Low,
                |_, _| {},
            )
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    let response = sched
        .submit(MockCommand::Echo(99), Priority::High, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(response, MockResponse::Echoed(99));

    // The high command beat all low commands that had not started yet; at
    // most three lows (in flight or picked at the same tick) precede it.
    let executed = state.executed();
    let high_pos = executed.iter().position(|&tag| tag == 99).unwrap();
    assert!(
        high_pos <= 3,
        "high command ran at position {high_pos} of {executed:?}"
    );
    sched.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn normal_preempts_queued_low_and_yields_to_high() {
    let (adapter, state) = MockAdapter::new();
    let sched = DeviceScheduler::start(adapter, fast_config("classes"))
        .await
        .unwrap();

    // Occupy the wire so the queues fill while the worker is busy.
    sched
        .submit_with_callback(
            MockCommand::Sleep {
                tag: 1,
                hold: Duration::from_millis(60),
            },
            Priority::Normal,
            |_, _| {},
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    sched
        .submit_with_callback(MockCommand::Echo(30), Priority::Low, |_, _| {})
        .unwrap();
    sched
        .submit_with_callback(MockCommand::Echo(20), Priority::Normal, |_, _| {})
        .unwrap();
    sched
        .submit_with_callback(MockCommand::Echo(10), Priority::High, |_, _| {})
        .unwrap();

    assert!(wait_until(Duration::from_secs(2), || state.executed().len() == 4).await);
    assert_eq!(state.executed(), vec![1, 10, 20, 30]);
    sched.shutdown().await;
}
