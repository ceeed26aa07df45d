use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::session::{format_elapsed, RunSession, RunState};
use crate::driver::{Driver, DriverError};
use crate::error::{Error, Result};
use crate::event_bus::{EventBus, ServerEvent, Severity};
use crate::protocol::Protocol;

/// Caller reported on per-instruction progress events
const CALLER: &str = "ui";

/// Signals shared between the orchestrator and the running task
struct RunControl {
    cancel: CancellationToken,
    pause: watch::Sender<bool>,
}

#[derive(Default)]
struct Inner {
    session: RunSession,
    control: Option<RunControl>,
    done: Option<watch::Receiver<bool>>,
    task: Option<JoinHandle<()>>,
}

impl Inner {
    /// Whether the last run's task has published its final events
    fn unwound(&self) -> bool {
        self.done.as_ref().is_none_or(|done| {
            let finished = *done.borrow();
            finished || done.has_changed().is_err()
        })
    }
}

/// Owns the single in-flight protocol run.
///
/// A run executes on a background task; pause, resume and cancel take effect
/// between instructions. State transitions happen under one mutex, which is
/// held across the driver call that accompanies each transition.
pub struct RunOrchestrator {
    driver: Arc<dyn Driver>,
    event_bus: Arc<EventBus>,
    inner: Arc<Mutex<Inner>>,
}

impl RunOrchestrator {
    /// Create an idle orchestrator
    pub fn new(driver: Arc<dyn Driver>, event_bus: Arc<EventBus>) -> Self {
        Self {
            driver,
            event_bus,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Snapshot of the current or most recent run
    pub async fn session(&self) -> RunSession {
        self.inner.lock().await.session.clone()
    }

    /// Start executing `protocol` in the background.
    ///
    /// Returns as soon as the run is accepted. Fails with a conflict while
    /// another run is active or still unwinding.
    pub async fn start_run(&self, protocol: Arc<Protocol>) -> Result<RunSession> {
        let mut inner = self.inner.lock().await;
        if inner.session.state.is_active() {
            return Err(Error::conflict("A protocol is already running"));
        }
        if !inner.unwound() {
            return Err(Error::conflict("The previous run is still finishing"));
        }

        let session = RunSession::begin(protocol.instructions.len());
        let cancel = CancellationToken::new();
        let (pause_tx, pause_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);

        info!(
            run_id = ?session.id,
            filename = %protocol.filename,
            instructions = protocol.instructions.len(),
            "Run started"
        );

        let task = RunTask {
            driver: self.driver.clone(),
            event_bus: self.event_bus.clone(),
            inner: self.inner.clone(),
            protocol,
            cancel: cancel.clone(),
            pause: pause_rx,
        };

        inner.session = session.clone();
        inner.control = Some(RunControl {
            cancel,
            pause: pause_tx,
        });
        inner.done = Some(done_rx);
        inner.task = Some(tokio::spawn(async move {
            task.run().await;
            done_tx.send_replace(true);
        }));

        Ok(session)
    }

    /// Pause the active run between instructions
    pub async fn pause(&self) -> Result<RunSession> {
        let mut inner = self.inner.lock().await;
        match inner.session.state {
            RunState::Paused => return Ok(inner.session.clone()),
            RunState::Running => {}
            _ => return Err(Error::conflict("No protocol is running")),
        }

        self.driver.pause().await?;
        inner.session.state = RunState::Paused;
        if let Some(control) = &inner.control {
            control.pause.send_replace(true);
        }
        info!(run_id = ?inner.session.id, "Run paused");
        Ok(inner.session.clone())
    }

    /// Resume a paused run
    pub async fn resume(&self) -> Result<RunSession> {
        let mut inner = self.inner.lock().await;
        match inner.session.state {
            RunState::Running => return Ok(inner.session.clone()),
            RunState::Paused => {}
            _ => return Err(Error::conflict("No protocol is running")),
        }

        self.driver.resume().await?;
        inner.session.state = RunState::Running;
        if let Some(control) = &inner.control {
            control.pause.send_replace(false);
        }
        info!(run_id = ?inner.session.id, "Run resumed");
        Ok(inner.session.clone())
    }

    /// Stop the active run. The run ends as cancelled.
    ///
    /// A failing driver stop is kept as a run warning; the run still winds
    /// down at the next instruction boundary.
    pub async fn cancel(&self) -> Result<RunSession> {
        let mut inner = self.inner.lock().await;
        if !inner.session.state.is_active() {
            return Err(Error::conflict("No protocol is running"));
        }

        if let Err(e) = self.driver.stop().await {
            warn!(error = %e, "Driver failed to stop");
            inner
                .session
                .warnings
                .push(format!("Failed to stop the robot: {e}"));
        }
        if let Some(control) = &inner.control {
            control.cancel.cancel();
            control.pause.send_replace(false);
        }
        inner.session.state = RunState::Cancelled;
        info!(run_id = ?inner.session.id, "Run cancelled");
        Ok(inner.session.clone())
    }

    /// Wait until the current run has published its final events
    pub async fn wait(&self) -> RunSession {
        let done = self.inner.lock().await.done.clone();
        if let Some(mut done) = done {
            loop {
                let finished = *done.borrow_and_update();
                if finished || done.changed().await.is_err() {
                    break;
                }
            }
        }
        self.session().await
    }

    /// Cancel an active run and wait up to `timeout` for it to unwind
    pub async fn shutdown(&self, timeout: Duration) {
        if self.session().await.state.is_active() {
            if let Err(e) = self.cancel().await {
                debug!(error = %e, "Run ended before shutdown could cancel it");
            }
        }
        if tokio::time::timeout(timeout, self.wait()).await.is_err() {
            warn!(
                timeout_secs = timeout.as_secs(),
                "Run did not finish before the shutdown timeout, aborting"
            );
            if let Some(task) = self.inner.lock().await.task.take() {
                task.abort();
            }
        }
    }
}

/// Background execution of one run
struct RunTask {
    driver: Arc<dyn Driver>,
    event_bus: Arc<EventBus>,
    inner: Arc<Mutex<Inner>>,
    protocol: Arc<Protocol>,
    cancel: CancellationToken,
    pause: watch::Receiver<bool>,
}

impl RunTask {
    async fn run(mut self) {
        let caught = AssertUnwindSafe(self.execute()).catch_unwind().await;
        let outcome = match caught {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(filename = %self.protocol.filename, "Run task panicked");
                Err(DriverError::new("The run stopped unexpectedly"))
            }
        };
        self.finish(outcome).await;
    }

    async fn execute(&mut self) -> std::result::Result<(), DriverError> {
        self.driver.resume().await?;
        if self.checkpoint().await {
            return Ok(());
        }
        self.driver.home(None).await?;

        let protocol = self.protocol.clone();
        let total = protocol.instructions.len();
        for (index, instruction) in protocol.instructions.iter().enumerate() {
            if self.checkpoint().await {
                return Ok(());
            }
            self.event_bus.publish(ServerEvent::CommandRun {
                caller: CALLER.to_string(),
                command_index: index,
                commands_total: total,
                command_description: instruction.describe(),
            });
            self.driver.execute(instruction).await?;
            self.inner.lock().await.session.progress.completed = index + 1;
        }
        Ok(())
    }

    /// Block while paused. Returns true once the run is cancelled.
    async fn checkpoint(&mut self) -> bool {
        loop {
            if self.cancel.is_cancelled() {
                return true;
            }
            let paused = *self.pause.borrow_and_update();
            if !paused {
                return false;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return true,
                changed = self.pause.changed() => {
                    if changed.is_err() {
                        return self.cancel.is_cancelled();
                    }
                }
            }
        }
    }

    async fn finish(self, outcome: std::result::Result<(), DriverError>) {
        let driver_warnings = self.driver.take_warnings().await;

        let mut inner = self.inner.lock().await;
        inner.control = None;
        let session = &mut inner.session;
        session.ended_at = Some(Utc::now());

        let cancelled = self.cancel.is_cancelled();
        match outcome {
            Err(e) if !cancelled => {
                warn!(error = %e, "Run failed");
                session.errors.push(e.to_string());
                session.state = RunState::Failed;
            }
            Err(e) => debug!(error = %e, "Driver error after cancellation ignored"),
            Ok(()) if cancelled => session.state = RunState::Cancelled,
            Ok(()) => session.state = RunState::Completed,
        }
        if cancelled {
            session.state = RunState::Cancelled;
        }

        let mut warnings = driver_warnings;
        warnings.append(&mut session.warnings);
        session.warnings = warnings;

        let snapshot = session.clone();
        drop(inner);

        let elapsed = format_elapsed(snapshot.elapsed().unwrap_or_else(chrono::Duration::zero));
        info!(
            run_id = ?snapshot.id,
            state = %snapshot.state,
            elapsed = %elapsed,
            warnings = snapshot.warnings.len(),
            errors = snapshot.errors.len(),
            "Run finished"
        );

        self.event_bus
            .notify_all(snapshot.warnings.iter().cloned(), Severity::Warning);
        self.event_bus
            .notify_all(snapshot.errors.iter().cloned(), Severity::Danger);
        self.event_bus
            .notify(format!("Run complete in {elapsed}"), Severity::Success);
        self.event_bus.publish(ServerEvent::RunFinished);
    }
}
