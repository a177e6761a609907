// Standalone Tether relay.
//
// Binds UDP, accepts participants, and relays their avatar and rigidbody
// updates to each other until Ctrl-C.
//
// Usage:
//   tether-relay [OPTIONS]
//     --port <PORT>             Listen port (default: 7777)
//     --max-connections <N>     Max concurrent participants (default: 10)
//     --timeout-ms <MS>         Silence before a participant times out (default: 10000)
//     --config <FILE>           JSON config file; flags override its values

use anyhow::{Context, bail};
use tether::{RelayServer, ServerConfig, ServerEvent};
use tether_tick::TickScheduler;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = parse_args()?;
    let tick_rate_hz = config.tick_rate_hz;

    let mut relay = RelayServer::builder()
        .config(config)
        .bind()
        .await
        .context("failed to start relay")?;
    tracing::info!(addr = %relay.local_addr(), tick_rate_hz, "relay running, Ctrl-C to stop");

    let mut scheduler = TickScheduler::with_rate(tick_rate_hz);
    let mut host = RelayHost { relay: &mut relay };
    let ticks = scheduler
        .run(&mut host, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    relay.stop();
    tracing::info!(ticks, "relay shut down");
    Ok(())
}

/// Ticks the relay and logs what happened.
struct RelayHost<'a> {
    relay: &'a mut RelayServer<tether_transport::UdpTransport>,
}

impl tether_tick::Tickable for RelayHost<'_> {
    fn tick(&mut self, dt: std::time::Duration) {
        self.relay.tick(dt);
        for event in self.relay.drain_events() {
            match event {
                ServerEvent::ParticipantJoined { id, addr } => {
                    tracing::debug!(session_id = %id, %addr, "joined");
                }
                ServerEvent::ParticipantLeft { id, reason } => {
                    tracing::debug!(session_id = %id, %reason, "left");
                }
                ServerEvent::MessageRejected { id, error } => {
                    tracing::debug!(session_id = %id, %error, "message rejected");
                }
                ServerEvent::ConnectionRejected { addr, reason } => {
                    tracing::debug!(%addr, %reason, "connection rejected");
                }
            }
        }
    }
}

/// Parses command-line flags over an optional JSON config. Uses plain
/// `std::env::args()` matching.
fn parse_args() -> anyhow::Result<ServerConfig> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // The config file is the base layer, so find it before applying flags.
    let mut config = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).context("--config requires a file path")?;
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read config file {path}"))?;
            ServerConfig::from_json_str(&json)?
        }
        None => ServerConfig::default(),
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--port" => config.port = value(&mut iter, "--port")?,
            "--max-connections" => config.max_connections = value(&mut iter, "--max-connections")?,
            "--timeout-ms" => config.timeout_ms = value(&mut iter, "--timeout-ms")?,
            "--config" => {
                iter.next();
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                print_usage();
                bail!("unknown argument: {other}");
            }
        }
    }

    config.validate()?;
    Ok(config)
}

fn value<'a, T>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = iter.next().with_context(|| format!("{flag} requires a value"))?;
    raw.parse()
        .with_context(|| format!("{flag}: invalid value {raw:?}"))
}

fn print_usage() {
    println!("Usage: tether-relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>           Listen port (default: 7777)");
    println!("  --max-connections <N>   Max concurrent participants (default: 10)");
    println!("  --timeout-ms <MS>       Silence before a participant times out (default: 10000)");
    println!("  --config <FILE>         JSON config file; flags override its values");
    println!("  --help, -h              Show this help");
}
