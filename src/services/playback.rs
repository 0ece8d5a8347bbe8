//! Playback process supervision
//!
//! Launches the external playback workflow with one structured JSON
//! argument, drains its stdout/stderr continuously (an undrained pipe can
//! deadlock the child), and bounds its runtime. Exit code 0 becomes
//! `PlaybackFinished`; every failure mode - launch error, nonzero exit,
//! timeout - is normalized to a `PlaybackError` event and is never fatal
//! to the booth.

use crate::domain::{EventPayload, ProcessState, Session};
use crate::infra::{Config, EventPublisher, Metrics};
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to launch playback process: {0}")]
    Launch(#[from] std::io::Error),
    #[error("failed to encode playback request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outcome of one supervised run
enum Outcome {
    Finished,
    Failed { code: Option<i32>, cause: String },
    TimedOut,
    /// Stopped via stop(); the caller drives state, no event is published
    Cancelled,
}

/// One live playback run
struct RunHandle {
    session_id: String,
    cancel_tx: watch::Sender<bool>,
    state: Arc<Mutex<ProcessState>>,
    task: JoinHandle<()>,
}

pub struct PlaybackSupervisor {
    publisher: EventPublisher,
    metrics: Arc<Metrics>,
    command: String,
    args: Vec<String>,
    run_timeout: Duration,
    stop_grace: Duration,
    current: Mutex<Option<RunHandle>>,
}

impl PlaybackSupervisor {
    pub fn new(config: &Config, publisher: EventPublisher, metrics: Arc<Metrics>) -> Self {
        Self {
            publisher,
            metrics,
            command: config.playback_command().to_string(),
            args: config.playback_args().to_vec(),
            run_timeout: Duration::from_secs(config.playback_timeout_secs()),
            stop_grace: Duration::from_secs(config.stop_grace_secs()),
            current: Mutex::new(None),
        }
    }

    /// State of the most recent run, if any
    pub fn process_state(&self) -> Option<ProcessState> {
        self.current.lock().as_ref().map(|run| *run.state.lock())
    }

    pub fn is_running(&self) -> bool {
        matches!(self.process_state(), Some(ProcessState::Running))
    }

    /// Spawn the playback workflow for a session.
    ///
    /// Returns promptly; the run continues under a supervise task. A spawn
    /// failure publishes `PlaybackError` before returning so the
    /// orchestrator still observes a terminal event.
    pub async fn launch(&self, session: &Session) -> Result<(), PlaybackError> {
        // Single-flight is the orchestrator's invariant; a live run here
        // means something upstream broke, so fail safe and stop it.
        if self.is_running() {
            warn!("playback_already_running");
            self.stop().await;
        }

        let request = serde_json::to_string(&session.playback_request())?;
        info!(
            session_id = %session.id,
            command = %self.command,
            request = %request,
            "playback_launching"
        );

        let spawn_result = Command::new(&self.command)
            .args(&self.args)
            .arg(&request)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match spawn_result {
            Ok(child) => child,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "playback_launch_failed");
                self.metrics.record_playback_failure();
                self.publisher.publish(EventPayload::PlaybackError {
                    session_id: Some(session.id.clone()),
                    cause: format!("launch failed: {e}"),
                });
                return Err(PlaybackError::Launch(e));
            }
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let state = Arc::new(Mutex::new(ProcessState::Running));
        let supervise = Supervise {
            session_id: session.id.clone(),
            publisher: self.publisher.clone(),
            metrics: self.metrics.clone(),
            run_timeout: self.run_timeout,
            stop_grace: self.stop_grace,
            state: state.clone(),
        };
        let task = tokio::spawn(supervise.run(child, cancel_rx));

        *self.current.lock() =
            Some(RunHandle { session_id: session.id.clone(), cancel_tx, state, task });
        Ok(())
    }

    /// Stop any live run: SIGTERM, bounded grace, then SIGKILL.
    ///
    /// No orphaned child survives this; a run stopped here publishes no
    /// terminal event since the caller is already driving the reset.
    pub async fn stop(&self) {
        let Some(run) = self.current.lock().take() else {
            return;
        };

        if run.task.is_finished() {
            return;
        }

        info!(session_id = %run.session_id, "playback_stopping");
        let _ = run.cancel_tx.send(true);
        if timeout(self.stop_grace + Duration::from_secs(1), run.task).await.is_err() {
            warn!("playback_supervise_join_timeout");
        }
    }
}

/// Context for one supervise task
struct Supervise {
    session_id: String,
    publisher: EventPublisher,
    metrics: Arc<Metrics>,
    run_timeout: Duration,
    stop_grace: Duration,
    state: Arc<Mutex<ProcessState>>,
}

impl Supervise {
    async fn run(self, mut child: Child, mut cancel_rx: watch::Receiver<bool>) {
        // Drain both pipes for the whole run; a full pipe buffer would
        // block the child.
        let stdout_task = spawn_drain(child.stdout.take(), false);
        let stderr_task = spawn_drain(child.stderr.take(), true);

        let outcome = tokio::select! {
            result = child.wait() => match result {
                Ok(status) if status.success() => Outcome::Finished,
                Ok(status) => {
                    let code = status.code();
                    let shown = code.map_or("signal".to_string(), |c| c.to_string());
                    Outcome::Failed { code, cause: format!("process exit code: {shown}") }
                }
                Err(e) => Outcome::Failed { code: None, cause: format!("wait failed: {e}") },
            },
            _ = sleep(self.run_timeout) => {
                warn!(
                    session_id = %self.session_id,
                    timeout_secs = self.run_timeout.as_secs(),
                    "playback_timeout"
                );
                terminate_then_kill(&mut child, self.stop_grace).await;
                Outcome::TimedOut
            }
            _ = cancel_rx.changed() => {
                terminate_then_kill(&mut child, self.stop_grace).await;
                Outcome::Cancelled
            }
        };

        // Join the drains before declaring a terminal state so buffered
        // output lands in the log first
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        match outcome {
            Outcome::Finished => {
                *self.state.lock() = ProcessState::Exited(0);
                info!(session_id = %self.session_id, "playback_finished");
                self.publisher
                    .publish(EventPayload::PlaybackFinished { session_id: self.session_id });
            }
            Outcome::Failed { code, cause } => {
                *self.state.lock() = ProcessState::Exited(code.unwrap_or(-1));
                warn!(session_id = %self.session_id, cause = %cause, "playback_failed");
                self.metrics.record_playback_failure();
                self.publisher.publish(EventPayload::PlaybackError {
                    session_id: Some(self.session_id),
                    cause,
                });
            }
            Outcome::TimedOut => {
                *self.state.lock() = ProcessState::TimedOut;
                self.metrics.record_playback_failure();
                self.publisher.publish(EventPayload::PlaybackError {
                    session_id: Some(self.session_id),
                    cause: format!("timed out after {}s", self.run_timeout.as_secs()),
                });
            }
            Outcome::Cancelled => {
                *self.state.lock() = ProcessState::Killed;
                info!(session_id = %self.session_id, "playback_killed");
            }
        }
    }
}

/// Stream one pipe into the log, line by line
fn spawn_drain<R>(reader: Option<R>, is_stderr: bool) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(reader) = reader else {
            return;
        };
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                warn!(line = %line, "playback_stderr");
            } else {
                info!(line = %line, "playback_stdout");
            }
        }
    })
}

/// Two-phase termination: graceful signal, bounded grace, then hard kill
async fn terminate_then_kill(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        match timeout(grace, child.wait()).await {
            Ok(_) => return,
            Err(_) => warn!(pid = pid, "playback_terminate_grace_expired"),
        }
    }

    if let Err(e) = child.kill().await {
        warn!(error = %e, "playback_kill_failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Event, EventType, QrPayload};
    use crate::infra::{EventBus, EventHandler};
    use async_trait::async_trait;

    struct EventCollector {
        events: Arc<Mutex<Vec<Event>>>,
    }

    #[async_trait]
    impl EventHandler for EventCollector {
        async fn handle(&self, event: Event) -> anyhow::Result<()> {
            self.events.lock().push(event);
            Ok(())
        }
    }

    fn session() -> Session {
        Session::from_admission(&QrPayload {
            hero_names: vec!["Alice".to_string()],
            subcategory_id: 13,
            timestamp: 1754300000.0,
            payload_type: "heroes_selection".to_string(),
            payment_id: Some("pay_001".to_string()),
            amount: None,
        })
    }

    struct SupervisorFixture {
        supervisor: PlaybackSupervisor,
        events: Arc<Mutex<Vec<Event>>>,
        stop_tx: tokio::sync::watch::Sender<bool>,
        bus_task: JoinHandle<()>,
    }

    fn fixture(config: Config) -> SupervisorFixture {
        let mut bus = EventBus::new(16, Duration::from_millis(10));
        let events = Arc::new(Mutex::new(Vec::new()));
        let collector = Arc::new(EventCollector { events: events.clone() });
        bus.subscribe(EventType::PlaybackFinished, collector.clone());
        bus.subscribe(EventType::PlaybackError, collector);
        let publisher = bus.publisher();
        let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        let bus_task = tokio::spawn(bus.run(stop_rx));

        let supervisor = PlaybackSupervisor::new(&config, publisher, Arc::new(Metrics::new()));
        SupervisorFixture { supervisor, events, stop_tx, bus_task }
    }

    async fn settle(fx: SupervisorFixture) -> Vec<Event> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        fx.stop_tx.send(true).unwrap();
        fx.bus_task.await.unwrap();
        let events = fx.events.lock().clone();
        events
    }

    #[tokio::test]
    async fn test_exit_zero_publishes_finished() {
        let config = Config::default().with_playback_command("sh", &["-c", "exit 0"]);
        let fx = fixture(config);
        let session = session();

        fx.supervisor.launch(&session).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(fx.supervisor.process_state(), Some(ProcessState::Exited(0)));
        let events = settle(fx).await;
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            EventPayload::PlaybackFinished { session_id } => assert_eq!(session_id, &session.id),
            other => panic!("expected PlaybackFinished, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_publishes_error() {
        let config = Config::default().with_playback_command("sh", &["-c", "exit 3"]);
        let fx = fixture(config);

        fx.supervisor.launch(&session()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let events = settle(fx).await;
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            EventPayload::PlaybackError { cause, .. } => assert!(cause.contains("3")),
            other => panic!("expected PlaybackError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_launch_failure_publishes_error() {
        let config =
            Config::default().with_playback_command("/nonexistent/playback-binary", &[]);
        let fx = fixture(config);

        let result = fx.supervisor.launch(&session()).await;
        assert!(result.is_err());

        let events = settle(fx).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].payload, EventPayload::PlaybackError { .. }));
    }

    #[tokio::test]
    async fn test_hung_child_is_killed_after_timeout() {
        let config = Config::default()
            .with_playback_command("sh", &["-c", "sleep 30"])
            .with_playback_timeout_secs(1);
        let fx = fixture(config);

        fx.supervisor.launch(&session()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(fx.supervisor.process_state(), Some(ProcessState::TimedOut));
        let events = settle(fx).await;
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            EventPayload::PlaybackError { cause, .. } => assert!(cause.contains("timed out")),
            other => panic!("expected PlaybackError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_kills_child_without_event() {
        let config = Config::default().with_playback_command("sh", &["-c", "sleep 30"]);
        let fx = fixture(config);

        fx.supervisor.launch(&session()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(fx.supervisor.is_running());

        fx.supervisor.stop().await;
        assert!(!fx.supervisor.is_running());

        // A stop-killed run publishes no terminal event
        let events = settle(fx).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_stop_without_run_is_noop() {
        let config = Config::default();
        let fx = fixture(config);
        fx.supervisor.stop().await;
        let events = settle(fx).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_child_output_is_drained() {
        // A child writing more than a pipe buffer must still exit cleanly
        let config = Config::default().with_playback_command(
            "sh",
            &["-c", "i=0; while [ $i -lt 2000 ]; do echo line-$i; i=$((i+1)); done; exit 0"],
        );
        let fx = fixture(config);

        fx.supervisor.launch(&session()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(800)).await;

        assert_eq!(fx.supervisor.process_state(), Some(ProcessState::Exited(0)));
        let events = settle(fx).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].payload, EventPayload::PlaybackFinished { .. }));
    }
}
