//! # Tweet Report
//!
//! Reads the most recent rows from a hosted `tweets` table, asks an
//! OpenAI-compatible LLM to turn them into a markdown briefing, and writes the
//! answer to a dated file.
//!
//! ## Usage
//!
//! ```sh
//! SUPABASE_URL=https://xyz.supabase.co SUPABASE_KEY=... AI_API_KEY=... tweet_report
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Validating**: check the loaded configuration
//! 2. **Fetching**: query recent tweets through the PostgREST API
//! 3. **Composing**: send one prompt to the chat-completion endpoint
//! 4. **Writing**: store the markdown under `REPORT_DIR`
//!
//! With `--schedule` the same pipeline runs at every `SCHEDULE_CRON` tick.

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod composer;
mod config;
mod datasource;
mod error;
mod models;
mod pipeline;
mod schedule;
mod utils;
mod writer;

use api::ChatCompletionClient;
use cli::Cli;
use config::Config;
use datasource::SupabaseSource;
use error::ReportError;
use pipeline::{PipelineState, ReportPipeline};

#[tokio::main]
async fn main() -> ExitCode {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    // .env first so it can feed clap's env fallbacks too
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => error!(error = %e, "Ignoring unreadable .env file"),
    }

    // Parse CLI
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    info!(version = env!("CARGO_PKG_VERSION"), "tweet_report starting up");

    let config = match Config::from_env(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(kind = "ConfigurationError", error = %e, "Invalid configuration");
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        table = %config.database.table,
        model = %config.ai.model,
        report_dir = %config.report.base_dir.display(),
        timezone = %config.report.timezone,
        "Loaded configuration"
    );

    if args.schedule {
        schedule::run_on_schedule(&config, || generate(&config, args.show_content)).await;
        return ExitCode::SUCCESS;
    }

    if generate(&config, args.show_content).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Build the external clients and run the pipeline once.
#[instrument(level = "info", skip_all)]
async fn generate(config: &Config, show_content: bool) -> bool {
    let clients = SupabaseSource::new(&config.database, config.proxy.as_ref()).and_then(|source| {
        ChatCompletionClient::new(&config.ai, config.proxy.as_ref()).map(|client| (source, client))
    });
    let (source, client) = match clients {
        Ok(pair) => pair,
        Err(e) => {
            report_failure(&e);
            return false;
        }
    };

    debug!(endpoint = client.endpoint(), "Using chat-completion endpoint");

    let mut pipeline = ReportPipeline::new(config, source, client);
    pipeline.run().await;

    match pipeline.state() {
        PipelineState::Done(result) => {
            println!(
                "Report written to {} ({} tweets, {})",
                result.file_path, result.metadata.tweets_processed, result.summary.duration
            );
            if show_content {
                println!("\n{}", result.report_content);
            }
            true
        }
        PipelineState::Failed(failure) => {
            let status = failure
                .error
                .status()
                .map(|s| format!(" [HTTP {s}]"))
                .unwrap_or_default();
            eprintln!(
                "Report generation failed while {} after {:.2}s{status}: {}: {}",
                failure.step,
                failure.elapsed.as_secs_f64(),
                failure.error.kind(),
                failure.error
            );
            false
        }
        other => {
            error!(state = other.name(), "Pipeline stopped in a non-terminal state");
            false
        }
    }
}

fn report_failure(e: &ReportError) {
    error!(kind = e.kind(), error = %e, "Could not start report generation");
    eprintln!("Report generation failed: {}: {e}", e.kind());
}
