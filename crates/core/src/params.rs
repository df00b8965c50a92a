//! Parameter sets for the inference and server binaries
//!
//! Each parameter set knows its valid ranges, the flag token of every field,
//! and how to accept raw form text for a named field.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::{InferenceConfig, ServerConfig};
use crate::error::ConfigError;
use crate::locator::BinaryKind;

pub const MAX_TOKENS_RANGE: (u32, u32) = (1, 4096);
pub const TEMPERATURE_RANGE: (f32, f32) = (0.0, 2.0);
pub const TOP_P_RANGE: (f32, f32) = (0.0, 1.0);
pub const TOP_K_RANGE: (u32, u32) = (1, 100);
pub const PORT_RANGE: (u16, u16) = (1, 65535);
pub const CTX_SIZE_RANGE: (u32, u32) = (256, 32768);
pub const THREADS_RANGE: (u32, u32) = (1, 256);

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;

/// A validated set of parameters that maps onto one binary's command line.
pub trait ParameterSet {
    /// The binary these parameters are for
    const KIND: BinaryKind;

    /// Check every field against its documented range
    fn validate(&self) -> Result<(), ConfigError>;

    /// Flag/value pairs in command-line order. Omitted optionals are absent.
    ///
    /// Only meaningful after [`ParameterSet::validate`] succeeded.
    fn flags(&self) -> Vec<(&'static str, String)>;

    /// Set a field from raw form text
    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError>;

    /// Path of the model file
    fn model(&self) -> &Path;
}

/// Parameters for a single prompt run of `llama-cli`
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceParams {
    pub model: PathBuf,
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

impl InferenceParams {
    pub fn new(model: impl Into<PathBuf>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Start from the configured defaults
    pub fn from_config(config: &InferenceConfig) -> Self {
        Self {
            model: PathBuf::new(),
            prompt: String::new(),
            max_tokens: Some(config.max_tokens),
            temperature: Some(config.temperature),
            top_p: Some(config.top_p),
            top_k: Some(config.top_k),
        }
    }
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self::from_config(&InferenceConfig::default())
    }
}

impl ParameterSet for InferenceParams {
    const KIND: BinaryKind = BinaryKind::Cli;

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.as_os_str().is_empty() {
            return Err(ConfigError::Missing { field: "model" });
        }
        if self.prompt.trim().is_empty() {
            return Err(ConfigError::Missing { field: "prompt" });
        }
        check_optional("max_tokens", self.max_tokens, MAX_TOKENS_RANGE)?;
        check_optional("temperature", self.temperature, TEMPERATURE_RANGE)?;
        check_optional("top_p", self.top_p, TOP_P_RANGE)?;
        check_optional("top_k", self.top_k, TOP_K_RANGE)?;
        Ok(())
    }

    fn flags(&self) -> Vec<(&'static str, String)> {
        let mut flags = vec![
            ("-m", self.model.display().to_string()),
            ("-p", self.prompt.trim().to_string()),
        ];
        push_optional(&mut flags, "-n", self.max_tokens);
        push_optional(&mut flags, "--temp", self.temperature);
        push_optional(&mut flags, "--top-p", self.top_p);
        push_optional(&mut flags, "--top-k", self.top_k);
        flags
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "model" | "m" => self.model = PathBuf::from(value.trim()),
            "prompt" | "p" => self.prompt = value.to_string(),
            "max_tokens" | "n" => self.max_tokens = parse_integer("max_tokens", value)?,
            "temperature" | "temp" => self.temperature = parse_float("temperature", value)?,
            "top_p" => self.top_p = parse_float("top_p", value)?,
            "top_k" => self.top_k = parse_integer("top_k", value)?,
            _ => {
                return Err(ConfigError::UnknownField {
                    field: key.to_string(),
                })
            }
        }
        Ok(())
    }

    fn model(&self) -> &Path {
        &self.model
    }
}

/// Parameters for a long-lived `llama-server`
#[derive(Debug, Clone, PartialEq)]
pub struct ServerParams {
    pub model: PathBuf,
    pub host: String,
    pub port: u16,
    pub temperature: Option<f32>,
    pub ctx_size: Option<u32>,
    pub threads: Option<u32>,
}

impl ServerParams {
    pub fn new(model: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            model: PathBuf::new(),
            host: config.host.clone(),
            port: config.port,
            temperature: Some(config.temperature),
            ctx_size: Some(config.ctx_size),
            threads: Some(config.threads),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.trim(), self.port)
    }
}

impl Default for ServerParams {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

impl ParameterSet for ServerParams {
    const KIND: BinaryKind = BinaryKind::Server;

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.as_os_str().is_empty() {
            return Err(ConfigError::Missing { field: "model" });
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing { field: "host" });
        }
        check_range("port", self.port, PORT_RANGE)?;
        check_optional("temperature", self.temperature, TEMPERATURE_RANGE)?;
        check_optional("ctx_size", self.ctx_size, CTX_SIZE_RANGE)?;
        check_optional("threads", self.threads, THREADS_RANGE)?;
        Ok(())
    }

    fn flags(&self) -> Vec<(&'static str, String)> {
        let mut flags = vec![
            ("--model", self.model.display().to_string()),
            ("--host", self.host.trim().to_string()),
            ("--port", self.port.to_string()),
        ];
        push_optional(&mut flags, "--temp", self.temperature);
        push_optional(&mut flags, "--ctx-size", self.ctx_size);
        push_optional(&mut flags, "--threads", self.threads);
        flags
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "model" => self.model = PathBuf::from(value.trim()),
            "host" => self.host = value.trim().to_string(),
            // A blank port is a missing required field, reported as port 0.
            "port" => self.port = parse_integer("port", value)?.unwrap_or(0),
            "temperature" | "temp" => self.temperature = parse_float("temperature", value)?,
            "ctx_size" | "ctx-size" => self.ctx_size = parse_integer("ctx_size", value)?,
            "threads" => self.threads = parse_integer("threads", value)?,
            _ => {
                return Err(ConfigError::UnknownField {
                    field: key.to_string(),
                })
            }
        }
        Ok(())
    }

    fn model(&self) -> &Path {
        &self.model
    }
}

/// Where a server listens, as seen by clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Root URL, e.g. `http://127.0.0.1:8080`
    pub fn base_url(&self) -> String {
        let host = match self.host.trim() {
            "" => DEFAULT_HOST,
            host => host,
        };
        let port = if self.port == 0 { DEFAULT_PORT } else { self.port };
        format!("http://{}:{}", host, port)
    }

    /// OpenAI-compatible base URL, e.g. `http://127.0.0.1:8080/v1`
    pub fn openai_url(&self) -> String {
        format!("{}/v1", self.base_url())
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

fn check_range<T>(field: &'static str, value: T, (min, max): (T, T)) -> Result<(), ConfigError>
where
    T: PartialOrd + Display,
{
    // Written so that NaN fails the check.
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        })
    }
}

fn check_optional<T>(field: &'static str, value: Option<T>, range: (T, T)) -> Result<(), ConfigError>
where
    T: PartialOrd + Display,
{
    match value {
        Some(value) => check_range(field, value, range),
        None => Ok(()),
    }
}

fn push_optional<T: Display>(flags: &mut Vec<(&'static str, String)>, flag: &'static str, value: Option<T>) {
    if let Some(value) = value {
        flags.push((flag, value.to_string()));
    }
}

/// Parse an integer field. Blank text clears the field.
///
/// Values that are numeric but do not fit the target type (negative counts,
/// ports above 65535) are reported as out of range rather than non-numeric.
fn parse_integer<T>(field: &'static str, raw: &str) -> Result<Option<T>, ConfigError>
where
    T: TryFrom<i64> + Bounded + Display,
{
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let wide: i64 = raw.parse().map_err(|_| ConfigError::NotNumeric {
        field,
        value: raw.to_string(),
    })?;
    T::try_from(wide).map(Some).map_err(|_| ConfigError::OutOfRange {
        field,
        value: raw.to_string(),
        min: T::MIN_VALUE.to_string(),
        max: T::MAX_VALUE.to_string(),
    })
}

fn parse_float<T: FromStr>(field: &'static str, raw: &str) -> Result<Option<T>, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some).map_err(|_| ConfigError::NotNumeric {
        field,
        value: raw.to_string(),
    })
}

trait Bounded {
    const MIN_VALUE: Self;
    const MAX_VALUE: Self;
}

impl Bounded for u16 {
    const MIN_VALUE: Self = u16::MIN;
    const MAX_VALUE: Self = u16::MAX;
}

impl Bounded for u32 {
    const MIN_VALUE: Self = u32::MIN;
    const MAX_VALUE: Self = u32::MAX;
}
