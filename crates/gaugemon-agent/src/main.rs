use anyhow::Result;
use gaugemon_agent::{Agent, AgentConfig, Schedule, Transport};
use gaugemon_collector::default_collectors;
use gaugemon_common::shutdown::shutdown_signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gaugemon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = AgentConfig::load(&config_path)?;
    tracing::info!(
        server = %config.server_addr,
        poll_interval_secs = config.poll_interval_secs,
        report_interval_secs = config.report_interval_secs,
        rate_limit = config.rate_limit,
        signing = config.key.is_some(),
        "gaugemon-agent starting"
    );

    let transport = Transport::new(&config.server_addr, config.key.as_deref())?;
    let agent = Agent::new(Schedule::from(&config), default_collectors(), transport);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    agent.run(shutdown).await
}
