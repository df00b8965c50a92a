use anyhow::Result;
use llama_launcher_core::Config;

pub fn execute(config: &Config, key: Option<&str>) -> Result<i32> {
    let Some(key) = key else {
        show_all(config);
        return Ok(0);
    };

    println!("{}", config.get(key)?);
    Ok(0)
}

fn show_all(config: &Config) {
    match Config::config_path() {
        Some(path) if path.exists() => println!("Configuration file: {:?}\n", path),
        Some(path) => println!("Configuration file: {:?} (not found, using defaults)\n", path),
        None => println!("Configuration file: (no config directory)\n"),
    }

    let path_or_auto = |path: &Option<std::path::PathBuf>| {
        path.as_ref()
            .map(|p| format!("{:?}", p.display().to_string()))
            .unwrap_or_else(|| "(auto-detect)".to_string())
    };

    println!("[binaries]");
    println!("  cli = {}", path_or_auto(&config.binaries.cli));
    println!("  server = {}", path_or_auto(&config.binaries.server));
    println!();
    println!("[inference]");
    println!("  max_tokens = {}", config.inference.max_tokens);
    println!("  temperature = {}", config.inference.temperature);
    println!("  top_p = {}", config.inference.top_p);
    println!("  top_k = {}", config.inference.top_k);
    println!();
    println!("[server]");
    println!("  host = \"{}\"", config.server.host);
    println!("  port = {}", config.server.port);
    println!("  temperature = {}", config.server.temperature);
    println!("  ctx_size = {}", config.server.ctx_size);
    println!("  threads = {}", config.server.threads);
    println!();
    println!("[supervisor]");
    println!("  grace_period_secs = {}", config.supervisor.grace_period_secs);
    println!("  output_buffer = {}", config.supervisor.output_buffer);
    println!();
    println!("[monitor]");
    println!("  poll_interval_secs = {}", config.monitor.poll_interval_secs);
    println!("  timeout_secs = {}", config.monitor.timeout_secs);
    println!("  initial_delay_secs = {}", config.monitor.initial_delay_secs);
}
