use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use llama_launcher_core::{
    build_command, preflight, BinaryKind, Config, Endpoint, HealthReport, LaunchCommand,
    PollTiming, RunState, ServerParams, ServerSession, Supervisor,
};

use crate::signals::Listener;

#[derive(Args)]
pub struct ServeArgs {
    /// GGUF model file
    #[arg(short, long)]
    pub model: PathBuf,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Sampling temperature (0.0-2.0)
    #[arg(long = "temp")]
    pub temperature: Option<f32>,

    /// Context size (256-32768)
    #[arg(short, long)]
    pub ctx_size: Option<u32>,

    /// Worker threads (1-256)
    #[arg(short, long)]
    pub threads: Option<u32>,

    /// Path to llama-server (skips auto-detection)
    #[arg(long)]
    pub binary: Option<PathBuf>,

    /// Set a parameter by name, e.g. --set threads=4. An empty value omits it.
    #[arg(short, long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

impl ServeArgs {
    fn params(&self, config: &Config) -> Result<ServerParams> {
        let mut params = ServerParams::from_config(&config.server);
        params.model = self.model.clone();
        if let Some(host) = &self.host {
            params.host = host.clone();
        }
        if let Some(port) = self.port {
            params.port = port;
        }
        if self.temperature.is_some() {
            params.temperature = self.temperature;
        }
        if self.ctx_size.is_some() {
            params.ctx_size = self.ctx_size;
        }
        if self.threads.is_some() {
            params.threads = self.threads;
        }
        super::apply_overrides(&mut params, &self.overrides)?;
        Ok(params)
    }

    fn prepare(&self, config: &Config) -> Result<(LaunchCommand, Endpoint)> {
        let params = self.params(config)?;
        let binary = super::resolve_binary(BinaryKind::Server, self.binary.clone(), config);

        let command = build_command(binary.as_ref(), &params)?;
        preflight(&command, &params)?;
        Ok((command, params.endpoint()))
    }
}

pub async fn execute(config_path: Option<&Path>, config: Config, args: ServeArgs) -> Result<i32> {
    let (command, endpoint) = args.prepare(&config)?;
    let session = ServerSession::new(
        Supervisor::new(&config.supervisor),
        PollTiming::from(&config.monitor),
    );

    let mut interrupt = Listener::interrupt()?;
    let mut reload = Listener::reload()?;
    let mut refresh = Listener::refresh()?;

    println!("Command: {}\n", command);
    println!("OpenAI-compatible endpoint: {}", endpoint.openai_url());
    println!("Press Ctrl+C to stop\n");

    let (mut control, mut output) = session.start(&command, &endpoint).await?.into_parts();
    let mut health = session
        .subscribe_health()
        .await
        .context("Health poller not running")?;
    let mut health_open = true;
    let mut last = HealthReport::default();

    let mut interrupted = false;
    let mut restart_failed = false;

    loop {
        tokio::select! {
            line = output.next() => match line {
                Some(line) => println!("{}", line.text),
                None => break,
            },
            changed = health.changed(), if health_open => {
                if changed.is_err() {
                    health_open = false;
                    continue;
                }
                let report = health.borrow_and_update().clone();
                if report.status != last.status || report.model != last.model {
                    println!(
                        "[{}] Server Status: {} | Loaded Model: {}",
                        session.phase().await,
                        report.status,
                        report.model.as_deref().unwrap_or("Unknown")
                    );
                }
                last = report;
            }
            _ = interrupt.recv(), if !interrupted => {
                interrupted = true;
                control.request_stop();
            }
            _ = refresh.recv() => {
                tracing::info!("Refreshing server status");
                session.refresh().await;
            }
            _ = reload.recv(), if !interrupted => {
                let prepared = Config::load(config_path).and_then(|config| args.prepare(&config));
                let (command, endpoint) = match prepared {
                    Ok(prepared) => prepared,
                    Err(e) => {
                        tracing::error!("Reload failed, keeping the running server: {:#}", e);
                        continue;
                    }
                };

                println!("\n=== Restarting server ===\n");
                println!("Command: {}\n", command);
                match session.restart(&command, &endpoint).await {
                    Ok(handle) => {
                        (control, output) = handle.into_parts();
                    }
                    Err(e) => {
                        tracing::error!("Restart failed: {}", e);
                        restart_failed = true;
                        break;
                    }
                }
                if let Some(receiver) = session.subscribe_health().await {
                    health = receiver;
                    health_open = true;
                }
                println!("OpenAI-compatible endpoint: {}", endpoint.openai_url());
            }
        }
    }

    let state = control.wait().await;
    session.shutdown().await;

    let (banner, code) = exit_report(state, interrupted, restart_failed);
    println!("\n=== {} ===", banner);
    Ok(code)
}

/// Final banner and process exit code
fn exit_report(state: RunState, interrupted: bool, restart_failed: bool) -> (String, i32) {
    match state {
        _ if restart_failed => ("Server restart failed".to_string(), 1),
        _ if interrupted => ("Server stopped by user".to_string(), 0),
        RunState::Completed => ("Server exited".to_string(), 0),
        RunState::Failed { code: Some(code), .. } => (format!("Server exited with code {}", code), code),
        state => (format!("Server exited ({})", state), 1),
    }
}
