//! Report file output.
//!
//! # Output Path
//!
//! ```text
//! REPORT_DIR/
//! ├── ai-report-2025-05-05.md
//! └── ai-report-2025-05-06.md
//! ```
//!
//! The date comes from the current instant rendered in the configured
//! timezone, so a run at 20:00 UTC with `TIMEZONE=Asia/Shanghai` is filed
//! under the next calendar day. A template may also spread reports over
//! subdirectories, e.g. `{date:%Y}/{date:%m%d}.md`.

use crate::config::ReportSettings;
use crate::error::{ReportError, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument};

static DATE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{date(?::([^}]+))?\}").expect("placeholder pattern is valid"));

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Check that `template` has a date placeholder with a usable format.
pub fn validate_template(template: &str) -> std::result::Result<(), String> {
    let mut found = false;
    for caps in DATE_PLACEHOLDER.captures_iter(template) {
        found = true;
        let format = caps.get(1).map_or(DEFAULT_DATE_FORMAT, |m| m.as_str());
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(format!("invalid date format {format:?}"));
        }
    }
    if found {
        Ok(())
    } else {
        Err("template has no {date} placeholder".to_string())
    }
}

/// Calendar date of `now` in `tz`.
pub fn report_date(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Substitute every `{date}` / `{date:<strftime>}` in `template`.
pub fn report_filename(template: &str, now: DateTime<Utc>, tz: Tz) -> String {
    let local = tz.from_utc_datetime(&now.naive_utc());
    DATE_PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let format = caps.get(1).map_or(DEFAULT_DATE_FORMAT, |m| m.as_str());
            let items: Vec<Item> = StrftimeItems::new(format).collect();
            if items.iter().any(|item| matches!(item, Item::Error)) {
                local.format(DEFAULT_DATE_FORMAT).to_string()
            } else {
                local.format_with_items(items.into_iter()).to_string()
            }
        })
        .into_owned()
}

/// Sibling file a report is staged in before it replaces `path`.
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

async fn write_staged(path: &Path, staging: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(staging).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(staging, path).await
}

/// Write the report to its dated path under `settings.base_dir`.
///
/// Directories named by the rendered filename (e.g. `{date:%Y}/{date:%m%d}.md`)
/// are created first. The bytes go to a hidden sibling file which is then
/// renamed over the target, so an existing report for the same day is only
/// replaced once the new one is complete.
///
/// # Arguments
///
/// * `settings` - Output directory, filename template, timezone and encoding.
/// * `content` - Markdown returned by the composer.
/// * `now` - Instant of the run, rendered in `settings.timezone` for the date.
///
/// # Returns
///
/// The path of the written file.
///
/// # Errors
///
/// [`ReportError::Io`] when a directory cannot be created or the file cannot
/// be written or moved into place. The staged file is removed in that case.
#[instrument(level = "info", skip_all, fields(base_dir = %settings.base_dir.display()))]
pub async fn write_report(
    settings: &ReportSettings,
    content: &str,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    let filename = report_filename(&settings.filename_template, now, settings.timezone);
    let path = settings.base_dir.join(filename);
    let parent = path
        .parent()
        .map_or_else(|| settings.base_dir.clone(), Path::to_path_buf);

    if let Err(e) = fs::create_dir_all(&parent).await {
        error!(dir = %parent.display(), error = %e, "Failed to create report directory");
        return Err(ReportError::Io {
            path: parent,
            source: e,
        });
    }

    info!(path = %path.display(), "Writing report");
    let staging = staging_path(&path);
    if let Err(e) = write_staged(&path, &staging, settings.encoding.encode(content)).await {
        error!(path = %path.display(), error = %e, "Failed writing report");
        if let Err(cleanup) = fs::remove_file(&staging).await {
            debug!(path = %staging.display(), error = %cleanup, "Staged report not removed");
        }
        return Err(ReportError::Io { path, source: e });
    }
    info!(path = %path.display(), bytes = content.len(), "Wrote report");

    Ok(path)
}
