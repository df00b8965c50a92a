use llama_launcher_core::{Config, Endpoint, HealthPoller, HealthStatus, PollTiming};

pub async fn execute(config: &Config, host: Option<String>, port: Option<u16>) -> i32 {
    let endpoint = Endpoint::new(
        host.unwrap_or_else(|| config.server.host.clone()),
        port.unwrap_or(config.server.port),
    );
    let poller = match HealthPoller::new(endpoint.base_url(), PollTiming::from(&config.monitor)) {
        Ok(poller) => poller,
        Err(e) => {
            tracing::error!("Failed to create HTTP client: {}", e);
            return 1;
        }
    };

    let (status, model) = poller.poll_once().await;
    println!("Server Status: {}", status);
    println!("Loaded Model: {}", model.as_deref().unwrap_or("Unknown"));
    println!("Endpoint: {}", endpoint.openai_url());

    match status {
        HealthStatus::Reachable => 0,
        _ => 1,
    }
}
