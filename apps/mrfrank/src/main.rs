//! # mrfrank - Markov Random Field Retrieval
//!
//! The main binary for the mrfrank ranking engine.
//!
//! This application provides:
//! - Index building from a corpus file
//! - Batch ranking of query files with one or more models (TREC output)
//! - Single-query ranking and concept bin inspection
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 apps/mrfrank (THE BINARY)                │
//! │                                                          │
//! │  ┌─────────────┐    ┌──────────────────────────────┐    │
//! │  │   CLI       │───▶│  worker pool (tokio,         │    │
//! │  │  (clap)     │    │  spawn_blocking + Semaphore) │    │
//! │  └──────┬──────┘    └──────────────┬───────────────┘    │
//! │         └──────────────┬───────────┘                    │
//! │                        ▼                                 │
//! │                ┌───────────────┐                         │
//! │                │ mrfrank-core  │                         │
//! │                │ (THE LOGIC)   │                         │
//! │                └───────────────┘                         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! mrfrank -I robust04.mrfx index -c corpus.tsv
//! mrfrank -I robust04.mrfx status
//! mrfrank run -c mrfrank.toml --workers 4
//! mrfrank -I robust04.mrfx rank -m sd.toml -Q "information retrieval"
//! mrfrank bins -t impact -p "3 0" -n 10
//! ```

use clap::Parser;
use mrfrank::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // MRFRANK_LOG_FORMAT=json switches to JSON log lines.
    // Logs go to stderr; stdout carries results.
    let log_format = std::env::var("MRFRANK_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "mrfrank=debug,mrfrank_core=debug"
    } else {
        "mrfrank=info,mrfrank_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    // Display startup banner
    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the mrfrank startup banner.
fn print_banner() {
    eprintln!(
        r#"
  mrfrank v{}
  Markov Random Field retrieval
"#,
        env!("CARGO_PKG_VERSION")
    );
}
