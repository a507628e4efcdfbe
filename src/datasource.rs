//! Reads recent tweets from the hosted table.
//!
//! The table is served through a PostgREST interface (`/rest/v1/<table>`).
//! Each fetch is a single `GET` ordered by `created_at` descending and
//! bounded by `limit`, with `not.is.null` filters for every enabled
//! validation rule.
//!
//! Rows are checked again after decoding: blank strings are treated as
//! missing, duplicates are collapsed, and the result is re-sorted and cut to
//! `limit` so callers never depend on server-side behavior.

use crate::config::{BusinessRules, DatabaseSettings, ProxySettings};
use crate::error::{ReportError, Result};
use crate::models::TweetRecord;
use crate::utils::{build_http_client, truncate_for_log};
use itertools::Itertools;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

const SELECT_COLUMNS: &str = "id,content,url,created_at,published_at,list_id";

/// Which columns must be present for a row to be usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TweetFilters {
    pub require_content: bool,
    pub require_url: bool,
    pub require_published_date: bool,
}

impl TweetFilters {
    /// `true` when the record satisfies every enabled rule.
    pub fn accepts(&self, tweet: &TweetRecord) -> bool {
        (!self.require_content || tweet.text().is_some())
            && (!self.require_url || tweet.link().is_some())
            && (!self.require_published_date || tweet.published_at.is_some())
    }

    /// PostgREST `not.is.null` query pairs for the enabled rules.
    fn query_pairs(&self) -> Vec<(&'static str, &'static str)> {
        [
            (self.require_content, "content"),
            (self.require_url, "url"),
            (self.require_published_date, "published_at"),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, column)| (column, "not.is.null"))
        .collect()
    }
}

impl From<&BusinessRules> for TweetFilters {
    fn from(rules: &BusinessRules) -> Self {
        Self {
            require_content: rules.validate_content,
            require_url: rules.validate_url,
            require_published_date: rules.validate_published_date,
        }
    }
}

/// A store that can hand back the most recent tweets.
pub trait TweetSource {
    /// Return at most `limit` records, newest first, each accepted by `filters`.
    ///
    /// # Arguments
    ///
    /// * `limit` - Maximum number of records. `0` yields an empty list.
    /// * `filters` - Fields a record must carry to be kept.
    ///
    /// # Returns
    ///
    /// Records ordered by `created_at` descending with no duplicate ids.
    ///
    /// # Errors
    ///
    /// A `DataSource` error when the store is unreachable, answers with a
    /// non-success status, or returns a body that is not a list of records.
    async fn fetch_recent_tweets(
        &self,
        limit: usize,
        filters: &TweetFilters,
    ) -> Result<Vec<TweetRecord>>;
}

/// PostgREST-backed [`TweetSource`] for a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseSource {
    client: reqwest::Client,
    endpoint: Url,
    key: String,
}

impl SupabaseSource {
    pub fn new(settings: &DatabaseSettings, proxy: Option<&ProxySettings>) -> Result<Self> {
        let client = build_http_client(settings.timeout, proxy)
            .map_err(|e| ReportError::data_source(format!("failed to build HTTP client: {e}")))?;
        let endpoint = table_endpoint(&settings.url, &settings.table)?;
        Ok(Self {
            client,
            endpoint,
            key: settings.key.clone(),
        })
    }
}

/// `<base>/rest/v1/<table>`, keeping any path prefix on `base`.
fn table_endpoint(base: &Url, table: &str) -> Result<Url> {
    let base = format!("{}/", base.as_str().trim_end_matches('/'));
    let path = format!("rest/v1/{}", urlencoding::encode(table));
    Url::parse(&base)
        .and_then(|b| b.join(&path))
        .map_err(|e| ReportError::data_source(format!("invalid table endpoint: {e}")))
}

impl TweetSource for SupabaseSource {
    /// Issues one `GET` against the PostgREST table endpoint with the filters
    /// pushed into the query string, then re-applies them locally.
    #[instrument(level = "info", skip_all, fields(limit = limit, endpoint = %self.endpoint))]
    async fn fetch_recent_tweets(
        &self,
        limit: usize,
        filters: &TweetFilters,
    ) -> Result<Vec<TweetRecord>> {
        if limit == 0 {
            debug!("Limit is zero; skipping query");
            return Ok(Vec::new());
        }

        let t0 = Instant::now();
        let limit_param = limit.to_string();
        let mut query = vec![
            ("select", SELECT_COLUMNS),
            ("order", "created_at.desc"),
            ("limit", limit_param.as_str()),
        ];
        query.extend(filters.query_pairs());

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&query)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Tweet query failed to send");
                ReportError::data_source(format!("query failed: {e}"))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReportError::data_source(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            error!(
                status = status.as_u16(),
                body = %truncate_for_log(&body, 300),
                "Tweet query rejected"
            );
            return Err(ReportError::DataSource {
                message: format!("query returned HTTP {status}: {}", truncate_for_log(&body, 300)),
                status: Some(status.as_u16()),
            });
        }

        let rows: Option<Vec<TweetRecord>> = serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, body = %truncate_for_log(&body, 300), "Undecodable tweet rows");
            ReportError::data_source(format!("unexpected response shape: {e}"))
        })?;
        let rows = rows.unwrap_or_default();
        let received = rows.len();

        let tweets = select_recent(rows, limit, filters);
        info!(
            received,
            kept = tweets.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched recent tweets"
        );
        Ok(tweets)
    }
}

/// Apply `filters`, drop duplicate ids, order newest first and cap at `limit`.
pub fn select_recent(
    rows: Vec<TweetRecord>,
    limit: usize,
    filters: &TweetFilters,
) -> Vec<TweetRecord> {
    rows.into_iter()
        .filter(|t| filters.accepts(t))
        .sorted_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)))
        .unique_by(|t| t.id)
        .take(limit)
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::DatabaseSettings;
    use serde_json::{Value, json};
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// A valid row created `hour` o'clock on 2025-05-06.
    pub(crate) fn row(id: i64, hour: u32) -> Value {
        json!({
            "id": id,
            "content": format!("tweet number {id}"),
            "url": format!("https://x.com/someone/status/{id}"),
            "created_at": format!("2025-05-06T{hour:02}:00:00Z"),
            "published_at": format!("2025-05-06T{hour:02}:00:00Z"),
            "list_id": 1
        })
    }

    fn settings(server: &MockServer) -> DatabaseSettings {
        DatabaseSettings {
            url: Url::parse(&server.uri()).unwrap(),
            key: "service-key".into(),
            table: "tweets".into(),
            timeout: Duration::from_secs(5),
        }
    }

    fn all_filters() -> TweetFilters {
        TweetFilters {
            require_content: true,
            require_url: true,
            require_published_date: true,
        }
    }

    #[test]
    fn test_table_endpoint_keeps_prefix() {
        let base = Url::parse("https://example.com/supabase").unwrap();
        assert_eq!(
            table_endpoint(&base, "tweets").unwrap().as_str(),
            "https://example.com/supabase/rest/v1/tweets"
        );
    }

    #[tokio::test]
    async fn test_query_shape_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/tweets"))
            .and(query_param("order", "created_at.desc"))
            .and(query_param("limit", "3"))
            .and(query_param("content", "not.is.null"))
            .and(query_param("url", "not.is.null"))
            .and(query_param("published_at", "not.is.null"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(1, 9)])))
            .expect(1)
            .mount(&server)
            .await;

        let source = SupabaseSource::new(&settings(&server), None).unwrap();
        let tweets = source.fetch_recent_tweets(3, &all_filters()).await.unwrap();
        assert_eq!(tweets.len(), 1);
    }

    #[tokio::test]
    async fn test_limit_and_ordering_enforced_locally() {
        let server = MockServer::start().await;
        let rows = json!([row(1, 8), row(2, 11), row(3, 9), row(4, 10), row(2, 11)]);
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows))
            .mount(&server)
            .await;

        let source = SupabaseSource::new(&settings(&server), None).unwrap();
        let tweets = source.fetch_recent_tweets(3, &all_filters()).await.unwrap();

        let ids: Vec<i64> = tweets.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 4, 3]);
        assert!(tweets.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[tokio::test]
    async fn test_invalid_rows_are_dropped_when_rules_enabled() {
        let server = MockServer::start().await;
        let mut no_content = row(1, 8);
        no_content["content"] = Value::Null;
        let mut blank_url = row(2, 9);
        blank_url["url"] = json!("   ");
        let mut no_date = row(3, 10);
        no_date["published_at"] = Value::Null;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                no_content,
                blank_url,
                no_date,
                row(4, 7)
            ])))
            .mount(&server)
            .await;

        let source = SupabaseSource::new(&settings(&server), None).unwrap();

        let strict = source.fetch_recent_tweets(10, &all_filters()).await.unwrap();
        assert_eq!(strict.iter().map(|t| t.id).collect::<Vec<_>>(), vec![4]);
        for tweet in &strict {
            assert!(tweet.text().is_some());
            assert!(tweet.link().is_some());
            assert!(tweet.published_at.is_some());
        }

        let lenient = source
            .fetch_recent_tweets(
                10,
                &TweetFilters {
                    require_content: false,
                    require_url: false,
                    require_published_date: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(lenient.len(), 4);
    }

    #[tokio::test]
    async fn test_null_body_means_no_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let source = SupabaseSource::new(&settings(&server), None).unwrap();
        let tweets = source.fetch_recent_tweets(5, &all_filters()).await.unwrap();
        assert!(tweets.is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_skips_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(1, 8)])))
            .expect(0)
            .mount(&server)
            .await;

        let source = SupabaseSource::new(&settings(&server), None).unwrap();
        let tweets = source.fetch_recent_tweets(0, &all_filters()).await.unwrap();
        assert!(tweets.is_empty());
    }

    #[tokio::test]
    async fn test_error_response_is_data_source_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_string(r#"{"message":"relation \"public.tweets\" does not exist"}"#),
            )
            .mount(&server)
            .await;

        let source = SupabaseSource::new(&settings(&server), None).unwrap();
        let err = source
            .fetch_recent_tweets(5, &all_filters())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "DataSourceError");
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_data_source_error() {
        let settings = DatabaseSettings {
            url: Url::parse("http://127.0.0.1:9").unwrap(),
            key: "k".into(),
            table: "tweets".into(),
            timeout: Duration::from_secs(2),
        };
        let source = SupabaseSource::new(&settings, None).unwrap();
        let err = source
            .fetch_recent_tweets(5, &all_filters())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::DataSource { status: None, .. }));
    }
}
