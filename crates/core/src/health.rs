//! Periodic health polling of a llama-server endpoint

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::config::MonitorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthStatus {
    #[default]
    Unknown,
    Reachable,
    Unreachable,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Unknown => write!(f, "Unknown"),
            HealthStatus::Reachable => write!(f, "Online"),
            HealthStatus::Unreachable => write!(f, "Offline"),
        }
    }
}

/// Result of one complete poll cycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// First model listed by `/v1/models`
    pub model: Option<String>,
    /// Increases by one per completed cycle; 0 before the first poll
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub interval: Duration,
    pub timeout: Duration,
    pub initial_delay: Duration,
}

impl From<&MonitorConfig> for PollTiming {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            interval: config.interval(),
            timeout: config.timeout(),
            initial_delay: config.initial_delay(),
        }
    }
}

impl Default for PollTiming {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelObject>,
}

#[derive(Debug, Deserialize)]
struct ModelObject {
    id: String,
}

pub struct HealthPoller {
    client: reqwest::Client,
    base_url: String,
    timing: PollTiming,
}

impl HealthPoller {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8080`.
    /// Fails only if the HTTP client cannot be initialized.
    pub fn new(base_url: impl Into<String>, timing: PollTiming) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timing.timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timing,
        })
    }

    pub fn timing(&self) -> PollTiming {
        self.timing
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One health check. Never fails: every error means `Unreachable`.
    pub async fn poll_once(&self) -> (HealthStatus, Option<String>) {
        let health_url = format!("{}/health", self.base_url);

        match self.client.get(&health_url).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::debug!("{} returned {}", health_url, response.status());
                return (HealthStatus::Unreachable, None);
            }
            Err(e) => {
                tracing::debug!("{} unreachable: {}", health_url, e);
                return (HealthStatus::Unreachable, None);
            }
        }

        let model = match self.loaded_model().await {
            Ok(model) => model,
            Err(e) => {
                tracing::debug!("Failed to list models at {}: {}", self.base_url, e);
                None
            }
        };

        (HealthStatus::Reachable, model)
    }

    async fn loaded_model(&self) -> reqwest::Result<Option<String>> {
        let models: ModelsResponse = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(models.data.into_iter().next().map(|model| model.id))
    }

    /// Poll on a background task until the returned handle is stopped or
    /// dropped. Cycles never overlap, so a report is never replaced by an
    /// older one.
    pub fn spawn(self) -> PollerHandle {
        let (report_tx, report_rx) = watch::channel(HealthReport::default());
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let refresh = Arc::new(Notify::new());
        let wake = refresh.clone();

        let task = tokio::spawn(async move {
            let mut delay = self.timing.initial_delay;
            let mut sequence = 0;

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = wake.notified() => {}
                    _ = stop_rx.changed() => break,
                }

                let (status, model) = tokio::select! {
                    result = self.poll_once() => result,
                    _ = stop_rx.changed() => break,
                };

                sequence += 1;
                let previous = report_tx.send_replace(HealthReport {
                    status,
                    model: model.clone(),
                    sequence,
                });
                if previous.status != status || previous.model != model {
                    tracing::debug!(
                        "{}: {} (model: {})",
                        self.base_url,
                        status,
                        model.as_deref().unwrap_or("Unknown")
                    );
                }

                delay = self.timing.interval;
            }

            tracing::debug!("Health poller for {} stopped", self.base_url);
        });

        PollerHandle {
            report: report_rx,
            stop: stop_tx,
            refresh,
            task,
        }
    }
}

pub struct PollerHandle {
    report: watch::Receiver<HealthReport>,
    stop: watch::Sender<bool>,
    refresh: Arc<Notify>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn latest(&self) -> HealthReport {
        self.report.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthReport> {
        self.report.clone()
    }

    /// Run the next cycle now instead of waiting for the interval
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// Stop polling and wait for the task to finish. An in-flight request
    /// is abandoned.
    pub async fn stop(self) {
        self.stop.send_replace(true);
        if let Err(e) = self.task.await {
            tracing::warn!("Health poller task failed: {}", e);
        }
    }
}
