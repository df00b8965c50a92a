//! llama_launcher_core - Supervisory core for llama.cpp binaries
//!
//! This crate provides:
//! - Binary discovery for `llama-cli` / `llama-server`
//! - Parameter validation and command-line building
//! - Process supervision with line-by-line output relay
//! - Health polling of a running server endpoint

pub mod command;
pub mod config;
pub mod error;
pub mod health;
pub mod locator;
pub mod params;
pub mod session;
pub mod supervisor;

pub use command::{build_command, preflight, LaunchCommand};
pub use config::Config;
pub use error::{ConfigError, LaunchError};
pub use health::{HealthPoller, HealthReport, HealthStatus, PollTiming, PollerHandle};
pub use locator::{BinaryKind, BinaryLocation, Locator, SearchStrategy};
pub use params::{Endpoint, InferenceParams, ParameterSet, ServerParams};
pub use session::{ServerPhase, ServerSession};
pub use supervisor::{
    OutputLine, OutputSource, OutputStream, RunControl, RunHandle, RunState, Supervisor,
};
