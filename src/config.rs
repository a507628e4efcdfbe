//! Typed configuration loaded from the environment.
//!
//! [`Config`] is built once in `main` and handed to each component by
//! reference. Loading never stops at the first problem: every missing
//! required variable and every unparsable value ends up in one
//! [`ConfigError`].
//!
//! Business rules may also come from a YAML file (`--config`). Precedence is
//! defaults, then the file, then the environment.

use crate::error::ConfigError;
use crate::schedule::parse_cron;
use crate::writer::validate_template;
use chrono_tz::Tz;
use serde::Deserialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

pub const DEFAULT_AI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_AI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_FILENAME_TEMPLATE: &str = "ai-report-{date}.md";
pub const DEFAULT_SCHEDULE: &str = "0 9 * * *";

/// Process-wide settings, read-only after loading.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseSettings,
    pub ai: AiSettings,
    pub report: ReportSettings,
    pub rules: BusinessRules,
    pub proxy: Option<ProxySettings>,
    pub schedule: ScheduleSettings,
}

/// Hosted table endpoint.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Url,
    pub key: String,
    pub table: String,
    pub timeout: Duration,
}

/// Chat-completion endpoint and sampling parameters.
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub base_url: Url,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Where and how the report file is written.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub base_dir: PathBuf,
    /// Filename with a `{date}` or `{date:<strftime>}` placeholder.
    pub filename_template: String,
    pub timezone: Tz,
    pub encoding: TextEncoding,
}

/// Thresholds and validation switches applied to fetched rows.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BusinessRules {
    pub max_tweets_to_fetch: usize,
    pub min_tweets_required: usize,
    /// Characters of content kept per tweet in the prompt.
    pub max_content_length: usize,
    pub max_report_items: usize,
    pub validate_content: bool,
    pub validate_url: bool,
    pub validate_published_date: bool,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            max_tweets_to_fetch: 100,
            min_tweets_required: 1,
            max_content_length: 500,
            max_report_items: 50,
            validate_content: true,
            validate_url: true,
            validate_published_date: true,
        }
    }
}

impl BusinessRules {
    /// Load rules from a YAML document; absent keys keep their defaults.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn from_yaml_file(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let rules: BusinessRules = serde_yaml::from_str(&raw).map_err(|e| e.to_string())?;
        debug!(?rules, "Loaded business rules file");
        Ok(rules)
    }
}

/// Outbound HTTP proxy applied to both external services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxySettings {
    pub fn url(&self) -> String {
        if self.host.contains("://") {
            format!("{}:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    /// Expression as configured, before normalization.
    pub expression: String,
    pub schedule: cron::Schedule,
}

/// Text encoding of the written report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
}

impl TextEncoding {
    pub fn encode(self, text: &str) -> &[u8] {
        match self {
            TextEncoding::Utf8 => text.as_bytes(),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            other => Err(format!("unsupported encoding {other:?} (only utf-8 is supported)")),
        }
    }
}

impl Config {
    /// Load from the process environment.
    pub fn from_env(rules_file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok(), rules_file)
    }

    /// Load from any variable lookup; blank values count as unset.
    ///
    /// # Arguments
    ///
    /// * `lookup` - Returns the raw value of a variable, `None` when unset.
    /// * `rules_file` - Optional YAML file with business rules. Variables
    ///   from `lookup` override the values it sets.
    ///
    /// # Returns
    ///
    /// A fully parsed [`Config`]. Cross-field checks are left to
    /// [`Config::validate`].
    ///
    /// # Errors
    ///
    /// A [`ConfigError`] naming every missing required variable and every
    /// value that failed to parse, not just the first one. An unreadable
    /// `rules_file` is reported under `--config`.
    pub fn from_lookup<F>(lookup: F, rules_file: Option<&Path>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = EnvReader {
            lookup,
            errors: ConfigError::default(),
        };

        let file_rules = match rules_file {
            Some(path) => BusinessRules::from_yaml_file(path).unwrap_or_else(|reason| {
                env.errors.invalid("--config", reason);
                BusinessRules::default()
            }),
            None => BusinessRules::default(),
        };

        let db_url = env.required_url("SUPABASE_URL");
        let db_key = env.required("SUPABASE_KEY");
        let ai_key = env.required("AI_API_KEY");

        let database_timeout = env.parsed("SUPABASE_TIMEOUT_SECS", 30u64);
        let table = env.string("SUPABASE_TABLE", "tweets");

        let ai_base_url = env.optional_url("AI_BASE_URL", DEFAULT_AI_BASE_URL);
        let model = env.string("AI_MODEL", DEFAULT_AI_MODEL);
        let temperature = env.parsed("AI_TEMPERATURE", 0.7f32);
        if !(0.0..=2.0).contains(&temperature) {
            env.errors
                .invalid("AI_TEMPERATURE", format!("{temperature} is outside 0.0..=2.0"));
        }
        let max_tokens = env.parsed("AI_MAX_TOKENS", 4000u32);
        let ai_timeout = env.parsed("AI_TIMEOUT_SECS", 300u64);

        let base_dir = PathBuf::from(env.string("REPORT_DIR", "./reports"));
        let filename_template = env.string("REPORT_FILENAME_TEMPLATE", DEFAULT_FILENAME_TEMPLATE);
        if let Err(reason) = validate_template(&filename_template) {
            env.errors.invalid("REPORT_FILENAME_TEMPLATE", reason);
        }
        let timezone = env.parsed("TIMEZONE", Tz::UTC);
        let encoding = env.parsed("REPORT_ENCODING", TextEncoding::Utf8);

        let rules = BusinessRules {
            max_tweets_to_fetch: env.parsed("MAX_TWEETS_TO_FETCH", file_rules.max_tweets_to_fetch),
            min_tweets_required: env.parsed("MIN_TWEETS_REQUIRED", file_rules.min_tweets_required),
            max_content_length: env.parsed("MAX_CONTENT_LENGTH", file_rules.max_content_length),
            max_report_items: env.parsed("MAX_REPORT_ITEMS", file_rules.max_report_items),
            validate_content: env.flag("VALIDATE_CONTENT", file_rules.validate_content),
            validate_url: env.flag("VALIDATE_URL", file_rules.validate_url),
            validate_published_date: env
                .flag("VALIDATE_PUBLISHED_DATE", file_rules.validate_published_date),
        };

        let proxy = env.optional("PROXY_HOST").map(|host| ProxySettings {
            host,
            port: env.parsed("PROXY_PORT", 8080u16),
            username: env.optional("PROXY_USERNAME"),
            password: env.optional("PROXY_PASSWORD"),
        });

        let expression = env.string("SCHEDULE_CRON", DEFAULT_SCHEDULE);
        let schedule = parse_cron(&expression)
            .map_err(|reason| env.errors.invalid("SCHEDULE_CRON", reason))
            .ok();

        let EnvReader { mut errors, .. } = env;
        let (Some(db_url), Some(ai_base_url), Some(schedule)) = (db_url, ai_base_url, schedule)
        else {
            return Err(errors);
        };

        let config = Config {
            database: DatabaseSettings {
                url: db_url,
                key: db_key,
                table,
                timeout: Duration::from_secs(database_timeout),
            },
            ai: AiSettings {
                base_url: ai_base_url,
                api_key: ai_key,
                model,
                temperature,
                max_tokens,
                timeout: Duration::from_secs(ai_timeout),
            },
            report: ReportSettings {
                base_dir,
                filename_template,
                timezone,
                encoding,
            },
            rules,
            proxy,
            schedule: ScheduleSettings {
                expression,
                schedule,
            },
        };

        if let Err(rule_errors) = config.validate() {
            errors.invalid.extend(rule_errors.invalid);
        }
        errors.into_result()?;
        Ok(config)
    }

    /// Cross-field checks that also apply to hand-built configurations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = ConfigError::default();
        let rules = &self.rules;
        if rules.max_report_items == 0 {
            errors.invalid("MAX_REPORT_ITEMS", "must be at least 1");
        }
        if rules.max_content_length == 0 {
            errors.invalid("MAX_CONTENT_LENGTH", "must be at least 1");
        }
        if rules.max_tweets_to_fetch < rules.min_tweets_required {
            errors.invalid(
                "MAX_TWEETS_TO_FETCH",
                format!(
                    "{} is below MIN_TWEETS_REQUIRED ({})",
                    rules.max_tweets_to_fetch, rules.min_tweets_required
                ),
            );
        }
        if self.ai.api_key.trim().is_empty() {
            errors.missing("AI_API_KEY");
        }
        if self.database.key.trim().is_empty() {
            errors.missing("SUPABASE_KEY");
        }
        errors.into_result()
    }
}

struct EnvReader<F> {
    lookup: F,
    errors: ConfigError,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, var: &str, default: &str) -> String {
        self.optional(var).unwrap_or_else(|| default.to_string())
    }

    fn required(&mut self, var: &str) -> String {
        self.optional(var).unwrap_or_else(|| {
            self.errors.missing(var);
            String::new()
        })
    }

    fn parsed<T>(&mut self, var: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(var) {
            None => default,
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                self.errors.invalid(var, format!("{raw:?}: {e}"));
                default
            }),
        }
    }

    fn flag(&mut self, var: &str, default: bool) -> bool {
        match self.optional(var).map(|v| v.to_ascii_lowercase()) {
            None => default,
            Some(v) => match v.as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => {
                    self.errors.invalid(var, format!("{v:?} is not a boolean"));
                    default
                }
            },
        }
    }

    fn required_url(&mut self, var: &str) -> Option<Url> {
        let raw = self.optional(var);
        match raw {
            None => {
                self.errors.missing(var);
                None
            }
            Some(raw) => self.url(var, &raw),
        }
    }

    fn optional_url(&mut self, var: &str, default: &str) -> Option<Url> {
        let raw = self.string(var, default);
        self.url(var, &raw)
    }

    fn url(&mut self, var: &str, raw: &str) -> Option<Url> {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
            Ok(url) => {
                self.errors
                    .invalid(var, format!("unsupported scheme {:?}", url.scheme()));
                None
            }
            Err(e) => {
                self.errors.invalid(var, format!("{raw:?}: {e}"));
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("SUPABASE_URL", "https://project.supabase.co"),
        ("SUPABASE_KEY", "service-key"),
        ("AI_API_KEY", "sk-test"),
    ];

    /// Fixture configuration pointing both services at `base`.
    pub(crate) fn fixture(base: &str, report_dir: &Path) -> Config {
        let dir = report_dir.to_string_lossy().to_string();
        let vars = [
            ("SUPABASE_URL", base),
            ("SUPABASE_KEY", "service-key"),
            ("AI_API_KEY", "sk-test"),
            ("AI_BASE_URL", base),
            ("AI_TIMEOUT_SECS", "5"),
            ("REPORT_DIR", dir.as_str()),
        ];
        Config::from_lookup(lookup(&vars), None).unwrap()
    }

    #[test]
    fn test_reports_every_missing_variable() {
        let err = Config::from_lookup(lookup(&[]), None).unwrap_err();
        assert_eq!(err.missing, vec!["SUPABASE_URL", "SUPABASE_KEY", "AI_API_KEY"]);
    }

    #[test]
    fn test_reports_remaining_missing_variables() {
        let err = Config::from_lookup(lookup(&[("SUPABASE_KEY", "k")]), None).unwrap_err();
        assert_eq!(err.missing, vec!["SUPABASE_URL", "AI_API_KEY"]);
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let mut vars = REQUIRED.to_vec();
        vars[2] = ("AI_API_KEY", "   ");
        let err = Config::from_lookup(lookup(&vars), None).unwrap_err();
        assert_eq!(err.missing, vec!["AI_API_KEY"]);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(REQUIRED), None).unwrap();

        assert_eq!(config.database.table, "tweets");
        assert_eq!(config.ai.base_url.as_str(), "https://api.openai.com/v1");
        assert_eq!(config.ai.model, DEFAULT_AI_MODEL);
        assert_eq!(config.ai.timeout, Duration::from_secs(300));
        assert_eq!(config.report.filename_template, "ai-report-{date}.md");
        assert_eq!(config.report.timezone, Tz::UTC);
        assert_eq!(config.report.encoding, TextEncoding::Utf8);
        assert_eq!(config.rules, BusinessRules::default());
        assert!(config.proxy.is_none());
        assert_eq!(config.schedule.expression, DEFAULT_SCHEDULE);
    }

    #[test]
    fn test_invalid_values_are_collected_with_missing() {
        let vars = [
            ("SUPABASE_URL", "not a url"),
            ("AI_MAX_TOKENS", "lots"),
            ("TIMEZONE", "Mars/Olympus"),
            ("REPORT_ENCODING", "latin-1"),
            ("VALIDATE_URL", "maybe"),
        ];
        let err = Config::from_lookup(lookup(&vars), None).unwrap_err();

        assert_eq!(err.missing, vec!["SUPABASE_KEY", "AI_API_KEY"]);
        let invalid: Vec<&str> = err.invalid.iter().map(|(v, _)| v.as_str()).collect();
        assert_eq!(
            invalid,
            vec!["SUPABASE_URL", "AI_MAX_TOKENS", "TIMEZONE", "REPORT_ENCODING", "VALIDATE_URL"]
        );
    }

    #[test]
    fn test_environment_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("TIMEZONE", "Asia/Shanghai"),
            ("MAX_REPORT_ITEMS", "10"),
            ("VALIDATE_PUBLISHED_DATE", "no"),
            ("PROXY_HOST", "127.0.0.1"),
            ("PROXY_PORT", "7890"),
            ("SCHEDULE_CRON", "30 8 * * 1-5"),
        ]);
        let config = Config::from_lookup(lookup(&vars), None).unwrap();

        assert_eq!(config.report.timezone, chrono_tz::Asia::Shanghai);
        assert_eq!(config.rules.max_report_items, 10);
        assert!(!config.rules.validate_published_date);
        assert_eq!(config.proxy.unwrap().url(), "http://127.0.0.1:7890");
        assert_eq!(config.schedule.expression, "30 8 * * 1-5");
    }

    #[test]
    fn test_rules_file_then_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_report_items: 5\nmax_content_length: 140\nvalidate_url: false").unwrap();

        let mut vars = REQUIRED.to_vec();
        vars.push(("MAX_CONTENT_LENGTH", "280"));
        let config = Config::from_lookup(lookup(&vars), Some(file.path())).unwrap();

        assert_eq!(config.rules.max_report_items, 5);
        assert_eq!(config.rules.max_content_length, 280);
        assert!(!config.rules.validate_url);
        assert_eq!(config.rules.max_tweets_to_fetch, 100);
    }

    #[test]
    fn test_unreadable_rules_file() {
        let err = Config::from_lookup(lookup(REQUIRED), Some(Path::new("/nonexistent/rules.yaml")))
            .unwrap_err();
        assert_eq!(err.invalid[0].0, "--config");
    }

    #[test]
    fn test_cross_field_rules() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([("MAX_TWEETS_TO_FETCH", "2"), ("MIN_TWEETS_REQUIRED", "5")]);
        let err = Config::from_lookup(lookup(&vars), None).unwrap_err();
        assert_eq!(err.invalid[0].0, "MAX_TWEETS_TO_FETCH");
    }

    #[test]
    fn test_template_needs_date_placeholder() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("REPORT_FILENAME_TEMPLATE", "report.md"));
        let err = Config::from_lookup(lookup(&vars), None).unwrap_err();
        assert_eq!(err.invalid[0].0, "REPORT_FILENAME_TEMPLATE");
    }

    #[test]
    fn test_encoding_parse() {
        assert_eq!("UTF-8".parse::<TextEncoding>(), Ok(TextEncoding::Utf8));
        assert!("utf-16".parse::<TextEncoding>().is_err());
    }
}
