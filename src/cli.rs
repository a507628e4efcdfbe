//! Command-line interface definitions.
//!
//! Connection settings come from the environment (see [`crate::config`]);
//! the flags here only choose how a run behaves.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Command-line arguments for the report generator.
///
/// # Examples
///
/// ```sh
/// # Generate today's report once
/// tweet_report
///
/// # Print the generated markdown as well
/// tweet_report --show-content
///
/// # Stay resident and run on SCHEDULE_CRON
/// tweet_report --schedule --config rules.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about, disable_version_flag = true)]
pub struct Cli {
    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,

    /// Echo the generated report to the console
    #[arg(long)]
    pub show_content: bool,

    /// Optional YAML file with business rules (environment variables take precedence)
    #[arg(short, long, env = "REPORT_RULES_FILE")]
    pub config: Option<PathBuf>,

    /// Keep running and generate a report at every SCHEDULE_CRON tick
    #[arg(long)]
    pub schedule: bool,
}
