//! Turning a parameter set into a command line

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, LaunchError};
use crate::locator::BinaryLocation;
use crate::params::ParameterSet;

/// A fully-formed command line, ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program.display().to_string()))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"') {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

/// Build the command line for `params`.
///
/// Fails without side effects when the binary was not found or a parameter
/// is invalid; a partially-formed command is never returned.
pub fn build_command<P: ParameterSet>(
    binary: Option<&BinaryLocation>,
    params: &P,
) -> Result<LaunchCommand, LaunchError> {
    let binary = binary.ok_or(LaunchError::BinaryNotFound {
        name: P::KIND.name(),
    })?;
    params.validate()?;

    let args = params
        .flags()
        .into_iter()
        .flat_map(|(flag, value)| [flag.to_string(), value])
        .collect();

    Ok(LaunchCommand::new(binary.path(), args))
}

/// Filesystem checks that must pass before spawning
pub fn preflight<P: ParameterSet>(command: &LaunchCommand, params: &P) -> Result<(), ConfigError> {
    if !command.program().is_file() {
        return Err(ConfigError::FileNotFound {
            field: "binary",
            path: command.program().to_path_buf(),
        });
    }

    let model = params.model();
    if !model.is_file() {
        return Err(ConfigError::FileNotFound {
            field: "model",
            path: model.to_path_buf(),
        });
    }

    let is_gguf = model
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gguf"))
        .unwrap_or(false);
    if !is_gguf {
        tracing::warn!("Model {:?} does not have a .gguf extension", model);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::{BinaryKind, Locator};
    use crate::params::{InferenceParams, ServerParams};
    use std::fs;

    fn example() -> InferenceParams {
        InferenceParams {
            model: PathBuf::from("m.gguf"),
            prompt: "Hello".to_string(),
            max_tokens: Some(256),
            temperature: Some(0.7),
            top_p: Some(0.9),
            top_k: Some(40),
        }
    }

    #[test]
    fn test_inference_argv() {
        let binary = BinaryLocation::manual("/usr/local/bin/llama-cli");
        let command = build_command(Some(&binary), &example()).unwrap();

        assert_eq!(
            command.args(),
            [
                "-m", "m.gguf", "-p", "Hello", "-n", "256", "--temp", "0.7", "--top-p", "0.9",
                "--top-k", "40"
            ]
        );
        assert_eq!(command.program(), Path::new("/usr/local/bin/llama-cli"));
    }

    #[test]
    fn test_each_flag_appears_once() {
        let binary = BinaryLocation::manual("/bin/llama-server");
        let command = build_command(Some(&binary), &ServerParams::new("m.gguf")).unwrap();

        for flag in ["--model", "--host", "--port", "--temp", "--ctx-size", "--threads"] {
            let count = command.args().iter().filter(|arg| *arg == flag).count();
            assert_eq!(count, 1, "{} appears {} times", flag, count);
        }
        assert_eq!(command.args().len(), 12);
    }

    #[test]
    fn test_missing_binary_rejected_first() {
        let empty = tempfile::tempdir().unwrap();
        let locator = Locator::new(vec![], vec![empty.path().to_path_buf()], vec![]);
        let location = locator.locate(BinaryKind::Server);
        assert!(location.is_none());

        let result = build_command(location.as_ref(), &ServerParams::new("m.gguf"));
        assert!(matches!(
            result,
            Err(LaunchError::BinaryNotFound { name: "llama-server" })
        ));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let binary = BinaryLocation::manual("/bin/llama-cli");
        let params = InferenceParams {
            top_k: Some(0),
            ..example()
        };

        let result = build_command(Some(&binary), &params);
        assert!(matches!(
            result,
            Err(LaunchError::Config(ConfigError::OutOfRange { field: "top_k", .. }))
        ));
    }

    #[test]
    fn test_display_quotes_whitespace() {
        let command = LaunchCommand::new(
            "/bin/llama-cli",
            vec!["-p".to_string(), "tell me a story".to_string()],
        );
        assert_eq!(command.to_string(), "/bin/llama-cli -p \"tell me a story\"");
    }

    #[test]
    fn test_preflight_checks_files() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("llama-cli");
        let model = dir.path().join("tiny.gguf");
        fs::write(&binary, "").unwrap();

        let params = InferenceParams::new(&model, "Hello");
        let command = build_command(Some(&BinaryLocation::manual(&binary)), &params).unwrap();
        assert_eq!(
            preflight(&command, &params),
            Err(ConfigError::FileNotFound {
                field: "model",
                path: model.clone()
            })
        );

        fs::write(&model, "GGUF").unwrap();
        assert_eq!(preflight(&command, &params), Ok(()));

        let missing = LaunchCommand::new(dir.path().join("nope"), vec![]);
        assert!(matches!(
            preflight(&missing, &params),
            Err(ConfigError::FileNotFound { field: "binary", .. })
        ));
    }
}
