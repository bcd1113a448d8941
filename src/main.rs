use clap::Parser;

use sackboy_relay::config::RelayConfig;
use sackboy_relay::relay_state::RelayState;
use sackboy_relay::server;

#[derive(Parser, Debug)]
#[command(
    name = "sackboy-relay",
    about = "Streaming relay between the photo-styling UI and the upstream image API"
)]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Wall-clock ceiling for one generation request, in seconds.
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    /// Cadence of synthetic progress events, in milliseconds.
    #[arg(long, default_value_t = 1500)]
    progress_interval_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = RelayConfig::from_env(
        args.host,
        args.port,
        args.timeout_secs,
        args.progress_interval_ms,
    )?;
    let state = RelayState::new(config.clone())?;
    actix_web::rt::System::new().block_on(server::startup(config, state))?;
    Ok(())
}
