//! Prompt construction and report composition.
//!
//! The composer turns a batch of [`TweetRecord`]s into one natural-language
//! prompt and hands it to an [`AskAsync`] client. Each tweet's content is cut
//! to `max_content_length` characters and at most `max_report_items` tweets
//! are embedded.

use crate::api::AskAsync;
use crate::config::BusinessRules;
use crate::error::Result;
use crate::models::TweetRecord;
use chrono::NaiveDate;
use std::fmt::Write;
use tracing::{debug, instrument};

/// Instruction sent as the system message of every request.
pub const SYSTEM_PROMPT: &str = "You are an analyst who writes concise daily briefings in Markdown. \
Group related posts into themes, highlight notable announcements and trends, and cite the \
original links inline. Respond with the Markdown document only.";

/// Keep exactly the first `max` characters of `text`.
///
/// Works on `char` boundaries, so multi-byte text is never split.
pub fn truncate_content(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        None => text.to_string(),
        Some((cut, _)) => text[..cut].to_string(),
    }
}

/// Build the user prompt for a report dated `report_date`.
pub fn build_prompt(records: &[TweetRecord], rules: &BusinessRules, report_date: NaiveDate) -> String {
    let used = records.len().min(rules.max_report_items);
    let mut prompt = format!(
        "Write the AI news briefing for {report_date} based on the {used} posts below.\n\
         Start with a title line, then a short overview, then one section per theme.\n\n"
    );

    for (i, tweet) in records.iter().take(rules.max_report_items).enumerate() {
        let content = truncate_content(tweet.text().unwrap_or_default(), rules.max_content_length);
        let _ = writeln!(prompt, "{}. {}", i + 1, content);
        if let Some(link) = tweet.link() {
            let _ = writeln!(prompt, "   Link: {link}");
        }
        let _ = writeln!(
            prompt,
            "   Published: {}",
            tweet.published().format("%Y-%m-%d %H:%M UTC")
        );
        prompt.push('\n');
    }

    prompt
}

/// Compose a report from `records` with a single request to `client`.
///
/// No caching: calling this twice with the same input issues two requests.
///
/// # Arguments
///
/// * `client` - Chat-completion backend that answers the prompt.
/// * `records` - Tweets to summarize, newest first. At most
///   `rules.max_report_items` of them reach the prompt.
/// * `rules` - Item cap and per-item content length.
/// * `report_date` - Date named in the prompt.
///
/// # Returns
///
/// The markdown text of the report as returned by the model.
///
/// # Errors
///
/// Propagates the [`ReportError::AiService`](crate::error::ReportError::AiService)
/// raised by `client`.
#[instrument(level = "info", skip_all, fields(records = records.len(), %report_date))]
pub async fn compose_report<A: AskAsync>(
    client: &A,
    records: &[TweetRecord],
    rules: &BusinessRules,
    report_date: NaiveDate,
) -> Result<String> {
    let prompt = build_prompt(records, rules, report_date);
    debug!(prompt_chars = prompt.chars().count(), "Built report prompt");
    client.ask(SYSTEM_PROMPT, &prompt).await
}
