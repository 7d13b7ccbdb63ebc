use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info};

use hubcast::config;
use hubcast::executor::{DiscordNotifier, DryRunNotifier, Notifier, Runtime};
use hubcast::lifecycle;
use hubcast::sources::{GithubSource, HttpTransport};
use hubcast::state::JsonFileStore;

/// hubcast CLI
#[derive(Debug, Parser)]
#[command(
    name = hubcast::PKG_NAME,
    version = hubcast::PKG_VERSION,
    about = "Relays a GitHub user's public activity feed into a Discord channel"
)]
struct Args {
    /// Optional JSON configuration file; environment variables override its values
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Log rendered messages instead of posting them to Discord
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Run a single poll cycle and exit
    #[arg(long = "once")]
    once: bool,

    /// Set log level (e.g., trace, debug, info, warn, error). Overrides RUST_LOG and DEBUG.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Print the resolved configuration (secrets masked) and exit
    #[arg(long = "print-config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let cfg = match config::load(args.config.as_deref()).await {
        Ok(cfg) => cfg,
        Err(e) => {
            hubcast::init_tracing(false);
            error!(target: "hubcast::config", error = %format!("{e:#}"), "Invalid configuration");
            return Err(e);
        }
    };

    // --log-level wins over RUST_LOG and the DEBUG toggle.
    match args.log_level.as_deref().and_then(hubcast::parse_level) {
        Some(level) => hubcast::init_tracing_with_level(level),
        None => hubcast::init_tracing(cfg.debug),
    }

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&cfg.redacted())?);
        return Ok(());
    }

    info!(
        version = hubcast::PKG_VERSION,
        user = %cfg.github_username,
        interval_ms = cfg.poll_interval.as_millis() as u64,
        dry_run = args.dry_run,
        once = args.once,
        "Starting hubcast"
    );

    let transport =
        HttpTransport::new(cfg.github_token.clone()).context("Failed to build HTTP client")?;
    let source = Arc::new(GithubSource::new(transport));

    let notifier: Arc<dyn Notifier> = if args.dry_run {
        Arc::new(DryRunNotifier)
    } else {
        Arc::new(
            DiscordNotifier::new(cfg.discord_token.clone(), cfg.channel_id.clone())
                .context("Failed to build Discord client")?,
        )
    };

    let store = Arc::new(JsonFileStore::new(&cfg.state_file));
    debug!(state_file = %cfg.state_file.display(), "Using file state store");

    let runtime = Runtime::new(source, notifier, store, cfg.github_username.clone())
        .with_allowed(cfg.event_types.iter().copied());

    lifecycle::run(
        Arc::new(runtime),
        cfg.poll_interval,
        args.once,
        lifecycle::shutdown_signal(),
    )
    .await
    .context("Failed to connect to the destination channel")?;

    info!("hubcast exited");
    Ok(())
}
