//! Report generation pipeline.
//!
//! One run moves through
//!
//! ```text
//! Idle → Validating → Fetching → Composing → Writing → Done
//!            │            │           │          │
//!            └────────────┴───────────┴──────────┴──→ Failed
//! ```
//!
//! Any step error short-circuits to `Failed`, which keeps the originating
//! error and the elapsed time. The report file is only written in the last
//! step, so a failed run leaves nothing on disk. There is no retry or resume;
//! calling [`ReportPipeline::run`] again starts over from `Idle`.

use crate::api::AskAsync;
use crate::composer::compose_report;
use crate::config::Config;
use crate::datasource::{TweetFilters, TweetSource};
use crate::error::{ReportError, Result};
use crate::models::{GenerationMetadata, GenerationResult, GenerationSummary};
use crate::utils::format_duration;
use crate::writer::{report_date, write_report};
use chrono::Utc;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};

/// Where a pipeline run currently stands.
#[derive(Debug)]
pub enum PipelineState {
    Idle,
    Validating,
    Fetching,
    Composing,
    Writing,
    Done(GenerationResult),
    Failed(PipelineFailure),
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Validating => "validating",
            PipelineState::Fetching => "fetching",
            PipelineState::Composing => "composing",
            PipelineState::Writing => "writing",
            PipelineState::Done(_) => "done",
            PipelineState::Failed(_) => "failed",
        }
    }
}

/// Terminal failure record.
#[derive(Debug)]
pub struct PipelineFailure {
    pub error: ReportError,
    /// Step that was running when the error occurred.
    pub step: &'static str,
    pub elapsed: Duration,
}

/// Sequences fetch, compose and write for one report.
pub struct ReportPipeline<'a, S, A> {
    config: &'a Config,
    source: S,
    client: A,
    state: PipelineState,
}

impl<'a, S, A> ReportPipeline<'a, S, A>
where
    S: TweetSource,
    A: AskAsync,
{
    pub fn new(config: &'a Config, source: S, client: A) -> Self {
        Self {
            config,
            source,
            client,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Execute one full run and return its summary.
    ///
    /// The outcome is also kept in [`state`](Self::state) as `Done` or `Failed`.
    #[instrument(level = "info", skip_all)]
    pub async fn run(&mut self) -> GenerationResult {
        self.state = PipelineState::Idle;
        let t0 = Instant::now();
        let mut processed = 0usize;

        match self.execute(&mut processed).await {
            Ok((path, content)) => {
                let elapsed = t0.elapsed();
                let result = GenerationResult {
                    success: true,
                    file_path: path.display().to_string(),
                    report_content: content,
                    metadata: GenerationMetadata {
                        tweets_processed: processed,
                    },
                    summary: GenerationSummary {
                        duration: format_duration(elapsed),
                    },
                    error: None,
                };
                info!(
                    path = %result.file_path,
                    tweets_processed = processed,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Report generated"
                );
                self.transition(PipelineState::Done(result.clone()));
                result
            }
            Err(error) => {
                let elapsed = t0.elapsed();
                let step = self.state.name();
                error!(
                    kind = error.kind(),
                    step,
                    error = %error,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Report generation failed"
                );
                let result = GenerationResult {
                    success: false,
                    file_path: String::new(),
                    report_content: String::new(),
                    metadata: GenerationMetadata {
                        tweets_processed: processed,
                    },
                    summary: GenerationSummary {
                        duration: format_duration(elapsed),
                    },
                    error: Some(format!("{}: {}", error.kind(), error)),
                };
                self.transition(PipelineState::Failed(PipelineFailure {
                    error,
                    step,
                    elapsed,
                }));
                result
            }
        }
    }

    async fn execute(&mut self, processed: &mut usize) -> Result<(PathBuf, String)> {
        let config = self.config;
        let rules = &config.rules;

        self.transition(PipelineState::Validating);
        config.validate()?;

        self.transition(PipelineState::Fetching);
        let tweets = self
            .source
            .fetch_recent_tweets(rules.max_tweets_to_fetch, &TweetFilters::from(rules))
            .await?;
        let required = rules.min_tweets_required.max(1);
        if tweets.len() < required {
            return Err(ReportError::NotEnoughTweets {
                found: tweets.len(),
                required,
            });
        }
        let batch = &tweets[..tweets.len().min(rules.max_report_items)];
        *processed = batch.len();
        debug!(fetched = tweets.len(), used = batch.len(), "Selected tweets for report");

        self.transition(PipelineState::Composing);
        let now = Utc::now();
        let date = report_date(now, config.report.timezone);
        let content = compose_report(&self.client, batch, rules, date).await?;

        self.transition(PipelineState::Writing);
        let path = write_report(&config.report, &content, now).await?;

        Ok((path, content))
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = self.state.name(), to = next.name(), "Pipeline transition");
        self.state = next;
    }
}
