//! AMDA-style REST client
//!
//! A fetch is three round trips:
//! 1. `GET /php/rest/auth.php` for a session token
//! 2. `GET /php/rest/getParameter.php` with the window, parameter and token,
//!    answered by JSON listing one or more data file URLs
//! 3. `GET` each data file, a whitespace-separated ASCII table

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::cache::range::TimeRange;
use crate::remote::{RemoteError, RemoteSource};
use crate::storage::Row;

/// Configuration for the REST client
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Server root (e.g., "http://amda.irap.omp.eu")
    pub base_url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Maximum attempts per request
    pub max_retries: u32,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: "http://amda.irap.omp.eu".to_string(),
            request_timeout_ms: 30_000,
            max_retries: 3,
        }
    }
}

/// Remote source speaking the AMDA REST protocol
pub struct RestSource {
    client: Client,
    config: RestConfig,
}

impl RestSource {
    pub fn new(config: RestConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/php/rest/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Request a session token
    pub async fn token(&self) -> Result<String, RemoteError> {
        let body = self.get_text(&self.endpoint("auth.php"), &[]).await?;
        Ok(body.trim().to_string())
    }

    /// Ask the server for the data files covering `range`
    pub async fn data_file_urls(
        &self,
        series_id: &str,
        range: &TimeRange,
        token: &str,
    ) -> Result<Vec<String>, RemoteError> {
        let start = format_time(range.start());
        let stop = format_time(range.stop());
        let body = self
            .get_text(
                &self.endpoint("getParameter.php"),
                &[
                    ("startTime", start.as_str()),
                    ("stopTime", stop.as_str()),
                    ("parameterID", series_id),
                    ("token", token),
                ],
            )
            .await?;

        let response: ParameterResponse = serde_json::from_str(&body)
            .map_err(|e| RemoteError::Protocol(format!("getParameter response: {}", e)))?;

        if !response.success {
            return Err(RemoteError::Api {
                status: StatusCode::OK.as_u16(),
                message: format!("getParameter failed for {} {}", series_id, range),
            });
        }

        Ok(match response.data_file_urls {
            Some(FileUrls::One(url)) => vec![url],
            Some(FileUrls::Many(urls)) => urls,
            None => Vec::new(),
        })
    }

    /// GET with retry logic
    async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, RemoteError> {
        let mut last_error = RemoteError::Unavailable;
        let mut retry_after: Option<Duration> = None;

        for attempt in 0..self.config.max_retries.max(1) {
            if attempt > 0 {
                // Server-requested delay, else quadratic backoff: 1s, 4s, 9s...
                let delay = retry_after
                    .take()
                    .unwrap_or_else(|| backoff_delay(attempt));
                tracing::warn!(
                    "Retrying {} in {:?} (attempt {}): {}",
                    url,
                    delay,
                    attempt + 1,
                    last_error
                );
                tokio::time::sleep(delay).await;
            }

            match self.client.get(url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.text().await.map_err(RemoteError::from_transport);
                    } else if status == StatusCode::TOO_MANY_REQUESTS {
                        retry_after = response
                            .headers()
                            .get("Retry-After")
                            .and_then(|v| v.to_str().ok())
                            .and_then(parse_retry_after);
                        last_error = RemoteError::RateLimited;
                    } else if matches!(
                        status,
                        StatusCode::BAD_GATEWAY
                            | StatusCode::SERVICE_UNAVAILABLE
                            | StatusCode::GATEWAY_TIMEOUT
                    ) {
                        last_error = RemoteError::Unavailable;
                    } else {
                        let message = response.text().await.unwrap_or_default();
                        return Err(RemoteError::Api {
                            status: status.as_u16(),
                            message,
                        });
                    }
                }
                Err(e) => {
                    last_error = RemoteError::from_transport(e);
                    if !last_error.is_retryable() {
                        return Err(last_error);
                    }
                }
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl RemoteSource for RestSource {
    async fn fetch(&self, series_id: &str, range: &TimeRange) -> Result<Vec<Row>, RemoteError> {
        let token = self.token().await?;
        let urls = self.data_file_urls(series_id, range, &token).await?;
        tracing::debug!("{} {}: {} data file(s)", series_id, range, urls.len());

        let mut rows: Vec<Row> = Vec::new();
        for url in &urls {
            let text = self.get_text(url, &[]).await?;
            let parsed = parse_ascii_rows(&text)?;
            if let (Some(prev), Some(next)) = (rows.first(), parsed.first()) {
                if prev.width() != next.width() {
                    return Err(RemoteError::Protocol(format!(
                        "{}: {} values per row, earlier files had {}",
                        url,
                        next.width(),
                        prev.width()
                    )));
                }
            }
            rows.extend(parsed);
        }
        Ok(rows)
    }
}

#[derive(Debug, Deserialize)]
struct ParameterResponse {
    success: bool,
    #[serde(rename = "dataFileURLs", default)]
    data_file_urls: Option<FileUrls>,
}

/// The server sends a bare string for a single file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FileUrls {
    One(String),
    Many(Vec<String>),
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs((attempt as u64).pow(2))
}

/// `Retry-After` in its delay-seconds form
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn format_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(field: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(field) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(field, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parse an ASCII data file into rows
///
/// Lines starting with `#` are comments. Each data line is a timestamp
/// (naive timestamps are UTC) followed by the component values.
///
/// Every data line must have as many values as the first one.
pub fn parse_ascii_rows(text: &str) -> Result<Vec<Row>, RemoteError> {
    let mut rows = Vec::new();
    let mut width: Option<usize> = None;

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let Some(first) = fields.next() else {
            continue;
        };
        let timestamp = parse_timestamp(first).ok_or_else(|| {
            RemoteError::Protocol(format!("line {}: bad timestamp {:?}", lineno + 1, first))
        })?;

        let values = fields
            .map(|f| {
                f.parse::<f64>().map_err(|_| {
                    RemoteError::Protocol(format!("line {}: bad value {:?}", lineno + 1, f))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let expected = *width.get_or_insert(values.len());
        if values.len() != expected {
            return Err(RemoteError::Protocol(format!(
                "line {}: expected {} values, got {}",
                lineno + 1,
                expected,
                values.len()
            )));
        }

        rows.push(Row::new(timestamp, values));
    }

    Ok(rows)
}
