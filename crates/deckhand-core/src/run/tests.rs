use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::Receiver;

use super::*;
use crate::driver::{DriverError, MockDriver, SimulatedConfig, SimulatedDriver};
use crate::error::ErrorKind;
use crate::event_bus::{EventBus, ServerEvent, Severity};
use crate::protocol::{DeckGraph, Instruction, Instrument, Labware, Protocol};

fn protocol(instructions: usize) -> Arc<Protocol> {
    let mut steps = vec![
        Instruction::new("pick_up_tip").with_axis("a"),
        Instruction::new("aspirate")
            .with_axis("a")
            .with_arg("volume", serde_json::json!(100)),
        Instruction::new("dispense").with_axis("a"),
        Instruction::new("drop_tip").with_axis("a"),
    ];
    steps.truncate(instructions);
    Arc::new(Protocol {
        filename: "transfer.json".to_string(),
        instructions: steps,
        deck: DeckGraph {
            instruments: vec![Instrument {
                axis: "a".to_string(),
                name: "p200".to_string(),
                channels: 1,
                max_volume: Some(200),
                calibrate: true,
            }],
            labware: vec![Labware {
                label: "plate".to_string(),
                slot: "B1".to_string(),
                kind: "96-flat".to_string(),
                calibrate: true,
            }],
        },
        ..Protocol::default()
    })
}

async fn simulated(step_delay: Duration, protocol: &Arc<Protocol>) -> Arc<SimulatedDriver> {
    let driver = Arc::new(SimulatedDriver::new(SimulatedConfig {
        step_delay,
        ..SimulatedConfig::default()
    }));
    crate::driver::Driver::load_protocol(driver.as_ref(), protocol.clone())
        .await
        .unwrap();
    driver
}

fn drain(rx: &mut Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Notifications and the terminal event, without per-instruction progress
fn outcome_events(events: &[ServerEvent]) -> Vec<ServerEvent> {
    events
        .iter()
        .filter(|e| !matches!(e, ServerEvent::CommandRun { .. }))
        .cloned()
        .collect()
}

#[tokio::test]
async fn test_completed_run_publishes_summary_in_order() {
    let protocol = protocol(4);
    let driver = simulated(Duration::ZERO, &protocol).await;
    driver.push_warning("Tip rack is almost empty");
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let orchestrator = RunOrchestrator::new(driver.clone(), bus);

    let started = orchestrator.start_run(protocol).await.unwrap();
    assert_eq!(started.state, RunState::Running);
    assert!(started.id.is_some());

    let session = orchestrator.wait().await;
    assert_eq!(session.state, RunState::Completed);
    assert_eq!(session.progress.completed, 4);
    assert!(session.errors.is_empty());
    assert_eq!(driver.executed(), 4);

    let events = outcome_events(&drain(&mut rx));
    assert_eq!(
        events,
        vec![
            ServerEvent::notification("Tip rack is almost empty", Severity::Warning),
            ServerEvent::notification("Run complete in 0:00:00", Severity::Success),
            ServerEvent::RunFinished,
        ]
    );
}

#[tokio::test]
async fn test_progress_events_follow_instruction_order() {
    let protocol = protocol(3);
    let driver = simulated(Duration::ZERO, &protocol).await;
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let orchestrator = RunOrchestrator::new(driver, bus);

    orchestrator.start_run(protocol).await.unwrap();
    orchestrator.wait().await;

    let indices: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ServerEvent::CommandRun {
                command_index,
                commands_total,
                ..
            } => Some((command_index, commands_total)),
            _ => None,
        })
        .collect();
    assert_eq!(indices, vec![(0, 3), (1, 3), (2, 3)]);
}

#[tokio::test]
async fn test_driver_failure_fails_run() {
    let protocol = protocol(4);
    let driver = simulated(Duration::ZERO, &protocol).await;
    driver.fail_on_instruction(1, "Limit switch hit on the z axis");
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let orchestrator = RunOrchestrator::new(driver, bus);

    orchestrator.start_run(protocol).await.unwrap();
    let session = orchestrator.wait().await;

    assert_eq!(session.state, RunState::Failed);
    assert_eq!(session.errors, vec!["Limit switch hit on the z axis"]);
    assert_eq!(session.progress.completed, 1);
    assert!(session.ended_at.is_some());

    let events = outcome_events(&drain(&mut rx));
    assert_eq!(events.len(), 3);
    assert_eq!(
        events[0].as_notification(),
        Some(("Limit switch hit on the z axis", Severity::Danger))
    );
    assert_eq!(events[1].as_notification().map(|n| n.1), Some(Severity::Success));
    assert_eq!(events[2], ServerEvent::RunFinished);
}

#[tokio::test]
async fn test_disconnected_robot_fails_run() {
    let protocol = protocol(2);
    let driver = Arc::new(SimulatedDriver::new(SimulatedConfig {
        connect_on_start: false,
        ..SimulatedConfig::default()
    }));
    let orchestrator = RunOrchestrator::new(driver, Arc::new(EventBus::default()));

    orchestrator.start_run(protocol).await.unwrap();
    let session = orchestrator.wait().await;

    assert_eq!(session.state, RunState::Failed);
    assert_eq!(session.errors, vec![DriverError::not_connected().to_string()]);
}

#[tokio::test]
async fn test_second_start_conflicts_while_running() {
    let protocol = protocol(4);
    let driver = simulated(Duration::from_millis(50), &protocol).await;
    let orchestrator = RunOrchestrator::new(driver, Arc::new(EventBus::default()));

    let first = orchestrator.start_run(protocol.clone()).await.unwrap();
    let err = orchestrator.start_run(protocol.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(orchestrator.session().await.id, first.id);

    orchestrator.wait().await;
    let second = orchestrator.start_run(protocol).await.unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(orchestrator.wait().await.state, RunState::Completed);
}

#[tokio::test]
async fn test_controls_without_active_run_conflict() {
    let driver = Arc::new(SimulatedDriver::default());
    let orchestrator = RunOrchestrator::new(driver, Arc::new(EventBus::default()));

    assert_eq!(orchestrator.session().await.state, RunState::Idle);
    for err in [
        orchestrator.pause().await.unwrap_err(),
        orchestrator.resume().await.unwrap_err(),
        orchestrator.cancel().await.unwrap_err(),
    ] {
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}

#[tokio::test]
async fn test_pause_and_resume() {
    let protocol = protocol(4);
    let driver = simulated(Duration::from_millis(30), &protocol).await;
    let orchestrator = RunOrchestrator::new(driver.clone(), Arc::new(EventBus::default()));

    orchestrator.start_run(protocol).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(orchestrator.pause().await.unwrap().state, RunState::Paused);
    assert!(driver.is_paused());
    // Pausing again reports the current state
    assert_eq!(orchestrator.pause().await.unwrap().state, RunState::Paused);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let held = orchestrator.session().await.progress.completed;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(orchestrator.session().await.progress.completed, held);

    assert_eq!(orchestrator.resume().await.unwrap().state, RunState::Running);
    assert!(!driver.is_paused());
    assert_eq!(orchestrator.resume().await.unwrap().state, RunState::Running);

    let session = orchestrator.wait().await;
    assert_eq!(session.state, RunState::Completed);
    assert_eq!(session.progress.completed, 4);
}

#[tokio::test]
async fn test_cancel_ends_run_once() {
    let protocol = protocol(4);
    let driver = simulated(Duration::from_millis(200), &protocol).await;
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let orchestrator = RunOrchestrator::new(driver, bus);

    orchestrator.start_run(protocol).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(orchestrator.cancel().await.unwrap().state, RunState::Cancelled);
    let err = orchestrator.resume().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let session = orchestrator.wait().await;
    assert_eq!(session.state, RunState::Cancelled);
    assert!(session.errors.is_empty());
    assert!(session.progress.completed < 4);

    let events = outcome_events(&drain(&mut rx));
    assert_eq!(
        events
            .iter()
            .filter(|e| **e == ServerEvent::RunFinished)
            .count(),
        1
    );
    assert_eq!(events.last(), Some(&ServerEvent::RunFinished));
}

#[tokio::test]
async fn test_cancel_while_paused() {
    let protocol = protocol(4);
    let driver = simulated(Duration::from_millis(20), &protocol).await;
    let orchestrator = RunOrchestrator::new(driver, Arc::new(EventBus::default()));

    orchestrator.start_run(protocol).await.unwrap();
    orchestrator.pause().await.unwrap();
    orchestrator.cancel().await.unwrap();

    let session = tokio::time::timeout(Duration::from_secs(2), orchestrator.wait())
        .await
        .unwrap();
    assert_eq!(session.state, RunState::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_stop_is_kept_as_warning() {
    let mut driver = MockDriver::new();
    driver.expect_resume().returning(|| Ok(()));
    driver.expect_home().returning(|_| {
        std::thread::sleep(Duration::from_millis(200));
        Ok("Homed XYZAB".to_string())
    });
    driver
        .expect_stop()
        .times(1)
        .returning(|| Err(DriverError::new("Serial port closed")));
    driver.expect_take_warnings().returning(Vec::new);

    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let orchestrator = RunOrchestrator::new(Arc::new(driver), bus);

    orchestrator.start_run(protocol(2)).await.unwrap();
    assert_eq!(orchestrator.cancel().await.unwrap().state, RunState::Cancelled);

    let session = orchestrator.wait().await;
    assert_eq!(session.state, RunState::Cancelled);
    assert_eq!(session.warnings, vec!["Failed to stop the robot: Serial port closed"]);

    let events = outcome_events(&drain(&mut rx));
    assert_eq!(
        events[0].as_notification(),
        Some(("Failed to stop the robot: Serial port closed", Severity::Warning))
    );
    assert_eq!(events.last(), Some(&ServerEvent::RunFinished));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_driver_pause_failure_keeps_running() {
    let mut driver = MockDriver::new();
    driver.expect_resume().returning(|| Ok(()));
    driver.expect_home().returning(|_| {
        std::thread::sleep(Duration::from_millis(200));
        Ok("Homed XYZAB".to_string())
    });
    driver
        .expect_pause()
        .returning(|| Err(DriverError::new("Robot is busy")));
    driver.expect_stop().returning(|| Ok(()));
    driver.expect_take_warnings().returning(Vec::new);

    let orchestrator = RunOrchestrator::new(Arc::new(driver), Arc::new(EventBus::default()));
    orchestrator.start_run(protocol(1)).await.unwrap();

    let err = orchestrator.pause().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Driver);
    assert_eq!(orchestrator.session().await.state, RunState::Running);

    orchestrator.cancel().await.unwrap();
    assert_eq!(orchestrator.wait().await.state, RunState::Cancelled);
}

#[tokio::test]
async fn test_panicking_driver_fails_the_run() {
    let mut driver = MockDriver::new();
    driver.expect_resume().returning(|| Ok(()));
    driver
        .expect_home()
        .returning(|_| Ok("Homed XYZAB".to_string()));
    driver
        .expect_execute()
        .returning(|_| panic!("firmware returned garbage"));
    driver.expect_take_warnings().returning(Vec::new);

    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let orchestrator = RunOrchestrator::new(Arc::new(driver), bus);

    orchestrator.start_run(protocol(1)).await.unwrap();
    let session = tokio::time::timeout(Duration::from_secs(2), orchestrator.wait())
        .await
        .unwrap();
    assert_eq!(session.state, RunState::Failed);
    assert_eq!(session.errors, vec!["The run stopped unexpectedly"]);
    assert!(session.ended_at.is_some());
    assert_eq!(
        outcome_events(&drain(&mut rx)).last(),
        Some(&ServerEvent::RunFinished)
    );

    // The orchestrator accepts the next run
    assert!(orchestrator.start_run(protocol(1)).await.is_ok());
    assert_eq!(orchestrator.wait().await.state, RunState::Failed);
}

#[tokio::test]
async fn test_shutdown_cancels_active_run() {
    let protocol = protocol(4);
    let driver = simulated(Duration::from_millis(100), &protocol).await;
    let orchestrator = RunOrchestrator::new(driver, Arc::new(EventBus::default()));

    orchestrator.start_run(protocol).await.unwrap();
    orchestrator.shutdown(Duration::from_secs(2)).await;

    assert_eq!(orchestrator.session().await.state, RunState::Cancelled);
}

#[test]
fn test_format_elapsed() {
    assert_eq!(format_elapsed(chrono::Duration::zero()), "0:00:00");
    assert_eq!(format_elapsed(chrono::Duration::seconds(65)), "0:01:05");
    assert_eq!(format_elapsed(chrono::Duration::seconds(3 * 3600 + 7)), "3:00:07");
    assert_eq!(format_elapsed(chrono::Duration::seconds(-4)), "0:00:00");
}
