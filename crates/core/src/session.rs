//! Combined run + poll lifecycle for llama-server

use std::fmt;

use tokio::sync::{watch, Mutex};

use crate::command::LaunchCommand;
use crate::error::LaunchError;
use crate::health::{HealthPoller, HealthReport, HealthStatus, PollTiming, PollerHandle};
use crate::params::Endpoint;
use crate::supervisor::{RunHandle, RunState, Supervisor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    Idle,
    /// Process running, endpoint not answering yet
    Starting,
    Serving,
    Stopping,
}

impl ServerPhase {
    pub fn derive(run: RunState, health: HealthStatus) -> Self {
        match run {
            RunState::Running if health == HealthStatus::Reachable => ServerPhase::Serving,
            RunState::Running => ServerPhase::Starting,
            RunState::Stopping => ServerPhase::Stopping,
            _ => ServerPhase::Idle,
        }
    }
}

impl fmt::Display for ServerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerPhase::Idle => write!(f, "Stopped"),
            ServerPhase::Starting => write!(f, "Starting..."),
            ServerPhase::Serving => write!(f, "Serving"),
            ServerPhase::Stopping => write!(f, "Stopping..."),
        }
    }
}

struct ActivePoller {
    base_url: String,
    handle: PollerHandle,
}

/// A llama-server child plus the poller watching its endpoint.
///
/// Start and restart are serialized: a restart waits for the previous child
/// to be reaped before spawning the next one, so two servers never compete
/// for the same port.
pub struct ServerSession {
    supervisor: Supervisor,
    timing: PollTiming,
    poller: Mutex<Option<ActivePoller>>,
    lifecycle: Mutex<()>,
}

impl ServerSession {
    pub fn new(supervisor: Supervisor, timing: PollTiming) -> Self {
        Self {
            supervisor,
            timing,
            poller: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub async fn start(&self, command: &LaunchCommand, endpoint: &Endpoint) -> Result<RunHandle, LaunchError> {
        let _lifecycle = self.lifecycle.lock().await;
        self.start_locked(command, endpoint).await
    }

    /// Stop the current server, wait until it has exited, then start it
    /// again with `command`.
    pub async fn restart(&self, command: &LaunchCommand, endpoint: &Endpoint) -> Result<RunHandle, LaunchError> {
        let _lifecycle = self.lifecycle.lock().await;

        if let Some(state) = self.supervisor.stop().await {
            tracing::info!("Previous server finished ({}), restarting", state);
        }
        self.start_locked(command, endpoint).await
    }

    async fn start_locked(&self, command: &LaunchCommand, endpoint: &Endpoint) -> Result<RunHandle, LaunchError> {
        // Client errors are reported before anything is spawned.
        let poller = HealthPoller::new(endpoint.base_url(), self.timing)?;
        let handle = self.supervisor.start(command).await?;
        self.watch_endpoint(poller).await;
        Ok(handle)
    }

    /// Stop the server. The poller keeps running so the endpoint going
    /// offline is still observed.
    pub async fn stop(&self) -> Option<RunState> {
        self.supervisor.stop().await
    }

    /// Stop the server and the poller
    pub async fn shutdown(&self) {
        self.stop().await;
        if let Some(active) = self.poller.lock().await.take() {
            active.handle.stop().await;
        }
    }

    pub async fn phase(&self) -> ServerPhase {
        let run = self.supervisor.status().await;
        ServerPhase::derive(run, self.health().await.status)
    }

    pub async fn health(&self) -> HealthReport {
        self.poller
            .lock()
            .await
            .as_ref()
            .map(|active| active.handle.latest())
            .unwrap_or_default()
    }

    pub async fn subscribe_health(&self) -> Option<watch::Receiver<HealthReport>> {
        self.poller
            .lock()
            .await
            .as_ref()
            .map(|active| active.handle.subscribe())
    }

    /// Poll the endpoint now
    pub async fn refresh(&self) {
        if let Some(active) = self.poller.lock().await.as_ref() {
            active.handle.refresh();
        }
    }

    async fn watch_endpoint(&self, candidate: HealthPoller) {
        let base_url = candidate.base_url().to_string();
        let mut poller = self.poller.lock().await;

        if let Some(active) = poller.as_ref() {
            if active.base_url == base_url {
                active.handle.refresh();
                return;
            }
        }

        if let Some(previous) = poller.take() {
            tracing::debug!("Endpoint changed from {}, replacing poller", previous.base_url);
            previous.handle.stop().await;
        }

        *poller = Some(ActivePoller {
            handle: candidate.spawn(),
            base_url,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_derivation() {
        use HealthStatus::*;

        assert_eq!(ServerPhase::derive(RunState::Idle, Unknown), ServerPhase::Idle);
        assert_eq!(ServerPhase::derive(RunState::Running, Unknown), ServerPhase::Starting);
        assert_eq!(ServerPhase::derive(RunState::Running, Unreachable), ServerPhase::Starting);
        assert_eq!(ServerPhase::derive(RunState::Running, Reachable), ServerPhase::Serving);
        assert_eq!(ServerPhase::derive(RunState::Stopping, Reachable), ServerPhase::Stopping);
        assert_eq!(ServerPhase::derive(RunState::Completed, Reachable), ServerPhase::Idle);
        assert_eq!(
            ServerPhase::derive(RunState::Failed { code: Some(1), stopped: false }, Unreachable),
            ServerPhase::Idle
        );
    }

    #[tokio::test]
    async fn test_new_session_is_idle() {
        let session = ServerSession::new(
            Supervisor::new(&Default::default()),
            PollTiming::default(),
        );
        assert_eq!(session.phase().await, ServerPhase::Idle);
        assert_eq!(session.health().await, HealthReport::default());
        assert!(session.subscribe_health().await.is_none());
        session.shutdown().await;
    }
}
