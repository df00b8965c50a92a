use llama_launcher_core::{BinaryKind, Config};

pub fn execute(config: &Config, kind: BinaryKind) -> i32 {
    match super::resolve_binary(kind, None, config) {
        Some(location) => {
            println!("{}", location.path().display());
            println!("  found via: {}", location.strategy());
            if !location.path().exists() {
                eprintln!("Warning: {} does not exist", location.path().display());
            }
            0
        }
        None => {
            eprintln!(
                "{} not found. Install llama.cpp or set binaries.{} in the config file.",
                kind,
                match kind {
                    BinaryKind::Cli => "cli",
                    BinaryKind::Server => "server",
                }
            );
            1
        }
    }
}
