use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use llama_launcher_core::{build_command, preflight, BinaryKind, Config, InferenceParams, RunState, Supervisor};

use crate::signals::Listener;

#[derive(Args)]
pub struct RunArgs {
    /// GGUF model file
    #[arg(short, long)]
    pub model: PathBuf,

    /// Prompt text
    #[arg(short, long)]
    pub prompt: String,

    /// Max tokens to generate (1-4096)
    #[arg(short = 'n', long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0-2.0)
    #[arg(long = "temp")]
    pub temperature: Option<f32>,

    /// Top-p sampling (0.0-1.0)
    #[arg(long)]
    pub top_p: Option<f32>,

    /// Top-k sampling (1-100)
    #[arg(long)]
    pub top_k: Option<u32>,

    /// Path to llama-cli (skips auto-detection)
    #[arg(long)]
    pub binary: Option<PathBuf>,

    /// Set a parameter by name, e.g. --set top_k=50. An empty value omits it.
    #[arg(short, long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

impl RunArgs {
    fn params(&self, config: &Config) -> Result<InferenceParams> {
        let mut params = InferenceParams::from_config(&config.inference);
        params.model = self.model.clone();
        params.prompt = self.prompt.clone();
        if self.max_tokens.is_some() {
            params.max_tokens = self.max_tokens;
        }
        if self.temperature.is_some() {
            params.temperature = self.temperature;
        }
        if self.top_p.is_some() {
            params.top_p = self.top_p;
        }
        if self.top_k.is_some() {
            params.top_k = self.top_k;
        }
        super::apply_overrides(&mut params, &self.overrides)?;
        Ok(params)
    }
}

pub async fn execute(config: &Config, args: RunArgs) -> Result<i32> {
    let params = args.params(config)?;
    let binary = super::resolve_binary(BinaryKind::Cli, args.binary, config);

    let command = build_command(binary.as_ref(), &params)?;
    preflight(&command, &params)?;

    let mut interrupt = Listener::interrupt()?;
    let supervisor = Supervisor::new(&config.supervisor);
    println!("Command: {}\n", command);
    let (control, mut output) = supervisor.start(&command).await?.into_parts();

    let mut interrupted = false;
    loop {
        tokio::select! {
            line = output.next() => match line {
                Some(line) => println!("{}", line.text),
                None => break,
            },
            _ = interrupt.recv(), if !interrupted => {
                interrupted = true;
                control.request_stop();
            }
        }
    }

    let code = match control.wait().await {
        _ if interrupted => {
            println!("\n=== Inference stopped by user ===");
            130
        }
        RunState::Completed => {
            println!("\n=== Inference completed successfully ===");
            0
        }
        RunState::Failed { code: Some(code), .. } => {
            println!("\n=== Inference failed with exit code {} ===", code);
            code
        }
        state => {
            println!("\n=== Inference failed ({}) ===", state);
            1
        }
    };

    Ok(code)
}
