//! `sepp`: SEPP interconnect gateway entry point.
//!
//! | Flag / variable | Default | Description |
//! |-----------------|---------|-------------|
//! | `--config`, `SEPP_CONFIG` | `config.yaml` | Configuration file (YAML, TOML or JSON). |
//! | `--log-format` | `text` | `text` or `json`. |
//! | `-v`, `--verbose` | off | Debug logging for the gateway crates. |
//! | `RUST_LOG` | *(none)* | Overrides the log filter entirely. |
//! | `SEPP_SEPP__...` | *(none)* | Overrides individual configuration keys. |

use anyhow::Context;
use clap::{Parser, ValueEnum};
use sepp_gateway::SeppServer;
use sepp_kernel::settings::SeppConfig;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "sepp", version, about = "SEPP interconnect gateway")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "SEPP_CONFIG", default_value = "config.yaml")]
    config: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(format: LogFormat, verbose: bool) {
    let default_directives = if verbose {
        "sepp_gateway=debug,sepp_kernel=debug,tower_http=debug"
    } else {
        "sepp_gateway=info,sepp_kernel=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SeppConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;
    info!(
        fqdn = %config.local_fqdn(),
        n32 = %config.n32_addr(),
        sbi = %config.sbi_addr(),
        remote = config.remote_url().unwrap_or("-"),
        "configuration loaded"
    );

    let server = SeppServer::new(config).context("failed to initialise gateway")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    server.run(cancel).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("sepp: {e:#}");
        std::process::exit(1);
    }
}
