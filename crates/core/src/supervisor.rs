//! Child process supervision with line-by-line output relay
//!
//! One relay task owns each child. It waits for the child to exit or for a
//! stop request, terminates the child (SIGTERM, then SIGKILL after the grace
//! period) and publishes the resulting [`RunState`]. Two reader tasks forward
//! stdout/stderr lines into a bounded channel that the caller drains through
//! [`OutputStream`].

use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch, Mutex};

use crate::command::LaunchCommand;
use crate::config::SupervisorConfig;
use crate::error::LaunchError;

/// How long readers keep reading after the child was reaped
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of a supervised child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopping,
    /// Exited with code 0
    Completed,
    /// Exited non-zero, was killed by a signal (`code: None`), or never started
    Failed { code: Option<i32>, stopped: bool },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed { .. })
    }

    /// A child exists and has not been reaped yet
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Running | RunState::Stopping)
    }

    fn from_exit(status: ExitStatus, stopped: bool) -> Self {
        match status.code() {
            Some(0) => RunState::Completed,
            code => RunState::Failed { code, stopped },
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "Idle"),
            RunState::Running => write!(f, "Running"),
            RunState::Stopping => write!(f, "Stopping"),
            RunState::Completed => write!(f, "Completed"),
            RunState::Failed { stopped: true, .. } => write!(f, "Stopped"),
            RunState::Failed { code: Some(code), .. } => write!(f, "Failed (exit code {})", code),
            RunState::Failed { code: None, .. } => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    Stdout,
    Stderr,
}

/// One line of child output, without its line terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub source: OutputSource,
    pub text: String,
}

/// Lines produced by one child, in the order each pipe produced them.
///
/// Ends once both pipes are closed. Dropping the stream does not stop the
/// child; remaining output is discarded.
pub struct OutputStream {
    lines: mpsc::Receiver<OutputLine>,
}

impl OutputStream {
    pub async fn next(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }
}

/// Observes and controls one run. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RunControl {
    pid: Option<u32>,
    state: watch::Receiver<RunState>,
    stop: Arc<watch::Sender<bool>>,
}

impl RunControl {
    /// A run that ended before it started, e.g. a spawn failure
    fn finished(state: RunState) -> Self {
        let (_, state_rx) = watch::channel(state);
        let (stop_tx, _) = watch::channel(false);
        Self {
            pid: None,
            state: state_rx,
            stop: Arc::new(stop_tx),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.clone()
    }

    /// Ask the relay to terminate the child. Returns immediately.
    pub fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    /// Wait until the child has been reaped
    pub async fn wait(&self) -> RunState {
        let mut state = self.state.clone();
        let result = state.wait_for(RunState::is_terminal).await.map(|s| *s);
        result.unwrap_or_else(|_| *state.borrow())
    }

    /// Request termination and wait for the child to be reaped
    pub async fn stop(&self) -> RunState {
        self.request_stop();
        self.wait().await
    }
}

pub struct RunHandle {
    pub control: RunControl,
    pub output: OutputStream,
}

impl RunHandle {
    pub fn into_parts(self) -> (RunControl, OutputStream) {
        (self.control, self.output)
    }
}

/// Starts and supervises at most one child at a time
pub struct Supervisor {
    grace_period: Duration,
    output_buffer: usize,
    current: Mutex<Option<RunControl>>,
}

impl Supervisor {
    pub fn new(config: &SupervisorConfig) -> Self {
        Self {
            grace_period: config.grace_period(),
            output_buffer: config.output_buffer.max(1),
            current: Mutex::new(None),
        }
    }

    /// Override the stop grace period
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Spawn `command`. Rejected with [`LaunchError::Busy`] while the
    /// previous child is still running or stopping.
    pub async fn start(&self, command: &LaunchCommand) -> Result<RunHandle, LaunchError> {
        let mut current = self.current.lock().await;
        if let Some(run) = current.as_ref() {
            if run.state().is_active() {
                tracing::warn!("Start rejected, process {:?} is still running", run.pid());
                return Err(LaunchError::Busy);
            }
        }

        let mut child = match Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(source) => {
                tracing::error!("Failed to start {:?}: {}", command.program(), source);
                *current = Some(RunControl::finished(RunState::Failed {
                    code: None,
                    stopped: false,
                }));
                return Err(LaunchError::Spawn {
                    program: command.program().to_path_buf(),
                    source,
                });
            }
        };

        let pid = child.id();
        tracing::info!("Started {:?} (PID: {:?})", command.program(), pid);

        let (state_tx, state_rx) = watch::channel(RunState::Running);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (exited_tx, exited_rx) = watch::channel(false);
        let (line_tx, line_rx) = mpsc::channel(self.output_buffer);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_lines(stdout, OutputSource::Stdout, line_tx.clone(), exited_rx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(read_lines(stderr, OutputSource::Stderr, line_tx, exited_rx));
        }

        tokio::spawn(relay(child, state_tx, stop_rx, exited_tx, self.grace_period));

        let control = RunControl {
            pid,
            state: state_rx,
            stop: Arc::new(stop_tx),
        };
        *current = Some(control.clone());

        Ok(RunHandle {
            control,
            output: OutputStream { lines: line_rx },
        })
    }

    /// State of the most recent run, `Idle` if nothing was started
    pub async fn status(&self) -> RunState {
        self.current
            .lock()
            .await
            .as_ref()
            .map(RunControl::state)
            .unwrap_or(RunState::Idle)
    }

    /// Control of the most recent run
    pub async fn current(&self) -> Option<RunControl> {
        self.current.lock().await.clone()
    }

    /// Stop the current child, if any, and wait for it to be reaped
    pub async fn stop(&self) -> Option<RunState> {
        let run = self.current().await?;
        Some(run.stop().await)
    }
}

enum RelayEvent {
    Exited(io::Result<ExitStatus>),
    StopRequested,
}

async fn relay(
    mut child: Child,
    state: watch::Sender<RunState>,
    mut stop: watch::Receiver<bool>,
    exited: watch::Sender<bool>,
    grace_period: Duration,
) {
    let pid = child.id();

    let event = tokio::select! {
        status = child.wait() => RelayEvent::Exited(status),
        _ = stop_requested(&mut stop) => RelayEvent::StopRequested,
    };

    let (status, stopped) = match event {
        RelayEvent::Exited(status) => (status, false),
        RelayEvent::StopRequested => {
            tracing::info!("Stopping process (PID: {:?})...", pid);
            state.send_replace(RunState::Stopping);
            (terminate(&mut child, grace_period).await, true)
        }
    };

    exited.send_replace(true);

    let final_state = match status {
        Ok(status) => RunState::from_exit(status, stopped),
        Err(e) => {
            tracing::error!("Failed to wait for process (PID: {:?}): {}", pid, e);
            RunState::Failed {
                code: None,
                stopped,
            }
        }
    };
    tracing::info!("Process (PID: {:?}) finished: {}", pid, final_state);
    state.send_replace(final_state);
}

/// Resolves once a stop was requested. Never resolves if every control
/// handle was dropped without asking.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn terminate(child: &mut Child, grace_period: Duration) -> io::Result<ExitStatus> {
    if let Some(status) = child.try_wait()? {
        return Ok(status);
    }

    send_terminate(child);

    match tokio::time::timeout(grace_period, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!(
                "Process (PID: {:?}) did not exit within {:?}, forcing kill",
                child.id(),
                grace_period
            );
            child.kill().await?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    // No graceful signal available; the grace wait still applies.
    let _ = child.start_kill();
}

async fn read_lines<R>(
    pipe: R,
    source: OutputSource,
    lines: mpsc::Sender<OutputLine>,
    mut exited: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    let mut forwarding = true;

    loop {
        let read = if *exited.borrow() {
            // The child is gone; only a lingering grandchild could keep the
            // pipe open.
            match tokio::time::timeout(DRAIN_TIMEOUT, reader.read_until(b'\n', &mut buf)).await {
                Ok(read) => read,
                Err(_) => {
                    tracing::debug!("{:?} still open after exit, closing", source);
                    Ok(0)
                }
            }
        } else {
            tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => read,
                changed = exited.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        };

        match read {
            Ok(0) => break,
            Ok(_) => {
                let line = OutputLine {
                    source,
                    text: decode_line(&buf),
                };
                buf.clear();
                if forwarding && lines.send(line).await.is_err() {
                    // Consumer is gone. Keep draining so the child never
                    // blocks on a full pipe.
                    forwarding = false;
                }
            }
            Err(e) => {
                tracing::debug!("Error reading {:?}: {}", source, e);
                break;
            }
        }
    }

    if forwarding && !buf.is_empty() {
        let _ = lines
            .send(OutputLine {
                source,
                text: decode_line(&buf),
            })
            .await;
    }
}

fn decode_line(buf: &[u8]) -> String {
    let text = String::from_utf8_lossy(buf);
    text.trim_end_matches(['\n', '\r']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_mapping() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed { code: Some(1), stopped: false }.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Stopping.is_active());
        assert!(!RunState::Idle.is_active());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(
            RunState::Failed { code: Some(2), stopped: false }.to_string(),
            "Failed (exit code 2)"
        );
        assert_eq!(
            RunState::Failed { code: None, stopped: true }.to_string(),
            "Stopped"
        );
    }

    #[test]
    fn test_decode_line_strips_terminators() {
        assert_eq!(decode_line(b"hello\r\n"), "hello");
        assert_eq!(decode_line(b"partial"), "partial");
        assert_eq!(decode_line(b"bad \xff byte\n"), "bad \u{fffd} byte");
    }

    #[tokio::test]
    async fn test_finished_control_waits_immediately() {
        let control = RunControl::finished(RunState::Failed { code: None, stopped: false });
        assert_eq!(
            control.wait().await,
            RunState::Failed { code: None, stopped: false }
        );
        assert_eq!(control.pid(), None);
    }

    #[tokio::test]
    async fn test_idle_supervisor() {
        let supervisor = Supervisor::new(&SupervisorConfig::default());
        assert_eq!(supervisor.status().await, RunState::Idle);
        assert_eq!(supervisor.stop().await, None);
    }
}
