//! Clinic Dispatcher Server
//!
//! Accepts doctors over TCP and patients over TCP or UDP on one port,
//! queues patients per doctor and runs each call to completion.

mod command;
mod config;
mod event;
mod server;
mod session;

use clap::Parser;
use clinic_shared::limits;
use config::{ServerConfig, TimeoutPolicy};
use server::Server;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "clinic-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Interface to bind both listeners to
    #[arg(long, env = "CLINIC_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port shared by the TCP and UDP listeners
    #[arg(short, long, env = "CLINIC_PORT", default_value_t = limits::DEFAULT_PORT)]
    port: u16,

    /// Maximum concurrently registered doctors
    #[arg(long, default_value_t = limits::MAX_DOCTORS)]
    max_doctors: usize,

    /// Seconds a called patient has to answer
    #[arg(long, default_value_t = limits::CALL_TIMEOUT_SECS)]
    call_timeout_secs: u64,

    /// What happens to timed-out and orphaned patients
    #[arg(long, value_enum, default_value_t = TimeoutPolicy::Discard)]
    timeout_policy: TimeoutPolicy,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            max_doctors: args.max_doctors,
            call_timeout: Duration::from_secs(args.call_timeout_secs),
            timeout_policy: args.timeout_policy,
            ..Default::default()
        }
    }
}

/// `RUST_LOG` directives when set and valid, `info` otherwise
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let config = ServerConfig::from(Args::parse());
    info!(
        max_doctors = config.max_doctors,
        call_timeout = ?config.call_timeout,
        policy = ?config.timeout_policy,
        "Starting clinic dispatcher"
    );

    let server = Server::bind(config).await?;
    info!(addr = %server.local_addr()?, "Dispatcher listening (stream + datagram)");
    server.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_map_to_config() {
        let args = Args::try_parse_from([
            "clinic-server",
            "--port",
            "4000",
            "--call-timeout-secs",
            "3",
            "--timeout-policy",
            "requeue",
        ])
        .unwrap();
        let config = ServerConfig::from(args);
        assert_eq!(config.port, 4000);
        assert_eq!(config.call_timeout, Duration::from_secs(3));
        assert_eq!(config.timeout_policy, TimeoutPolicy::Requeue);
        assert_eq!(config.max_doctors, 2);
    }

    #[test]
    fn test_log_filter_defaults_to_info() {
        assert_eq!(log_filter(None).to_string(), "info");
        assert_eq!(log_filter(Some("debug")).to_string(), "debug");
    }
}
