//! Terraform Provider for kops
//!
//! Reads one JSON-RPC request per line from stdin and answers on stdout.
//! Logs go to stderr so they never interleave with protocol traffic.

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};
use terraform_provider_kops::KopsProvider;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Terraform Provider for kops
#[derive(Parser, Debug)]
#[command(name = "terraform-provider-kops")]
#[command(about = "Terraform provider exposing kops clusters from a kops state store")]
struct Args {
    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Log level passed down by Terraform (TRACE, DEBUG, INFO, WARN, ERROR, JSON)
    #[arg(long, env = "TF_LOG")]
    log_level: Option<String>,
}

impl Args {
    /// Default tracing filter when `RUST_LOG` is not set
    fn log_filter(&self) -> &'static str {
        if self.debug {
            return "debug";
        }
        match self
            .log_level
            .as_deref()
            .map(|level| level.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("trace") | Some("json") => "trace",
            Some("debug") => "debug",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    tracing::info!("Starting Terraform Provider for kops");

    let mut provider = KopsProvider::new().context("failed to start async runtime")?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();

    for line in stdin.lock().lines() {
        let input = line.context("failed to read request")?;
        if input.trim().is_empty() {
            continue;
        }

        let response = provider.handle_request(&input);
        writeln!(stdout_lock, "{}", response).context("failed to write response")?;
        stdout_lock.flush().context("failed to flush stdout")?;
    }

    tracing::info!("Terraform Provider shutting down");
    Ok(())
}
