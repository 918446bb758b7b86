//! HTTP transport with automatic retries.
//!
//! Network errors, timeouts and the usual "try again later" statuses
//! (429, 502, 503, 504) are retried with a wait taken from `Retry-After`
//! and capped at the configured maximum. Every other response is handed
//! back to the caller as is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode, Url};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::config::RemoteConfig;
use crate::error::{RemoteError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Request body.
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    Bytes(Bytes),
}

/// A response as read off the wire.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    /// Final URL, after redirects.
    pub url: String,
    pub body: Bytes,
}

impl Reply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. `action` names the step for error messages.
    async fn send(&self, action: &'static str, method: Method, url: &Url, body: Body) -> Result<Reply>;

    /// Fetch `url` into `target`; returns the number of bytes written.
    async fn download(&self, url: &Url, target: &Path) -> Result<u64>;
}

/// Retry settings.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Longest wait between attempts.
    pub retry_after: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_after: Duration::from_secs(30),
            timeout: Duration::from_secs(300),
        }
    }
}

impl From<&RemoteConfig> for RetryConfig {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_after: config.retry_after,
            timeout: config.timeout,
        }
    }
}

/// Statuses that mean "try again later".
fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 502 | 503 | 504)
}

/// Wait before the next attempt: the server's `Retry-After` (seconds)
/// when given, capped at `cap`.
fn retry_wait(response: Option<&Response>, cap: Duration) -> Duration {
    response
        .and_then(|r| r.headers().get(header::RETRY_AFTER))
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(cap))
        .unwrap_or(cap)
}

/// Bearer-authenticated HTTP transport.
pub struct HttpTransport {
    client: Client,
    token: String,
    retry: RetryConfig,
}

impl HttpTransport {
    pub fn new(token: impl Into<String>, retry: RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(retry.timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RemoteError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token: token.into(),
            retry,
        })
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        Self::new(config.token.clone(), RetryConfig::from(config))
    }

    /// Run `build` until it yields a response that is not a transient
    /// failure.
    async fn execute<F>(&self, action: &'static str, url: &Url, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = build().bearer_auth(&self.token).send().await;

            let (wait, last) = match result {
                Ok(response) if is_retryable(response.status()) => (
                    retry_wait(Some(&response), self.retry.retry_after),
                    format!("HTTP {}", response.status()),
                ),
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                    (retry_wait(None, self.retry.retry_after), e.to_string())
                }
                Err(e) => return Err(RemoteError::transport(action, url, e)),
            };

            if attempt > self.retry.max_retries {
                return Err(RemoteError::RetriesExhausted {
                    action,
                    url: url.to_string(),
                    attempts: attempt,
                    last,
                });
            }

            warn!(
                action,
                url = %url,
                error = %last,
                retry = attempt,
                max_retries = self.retry.max_retries,
                delay_secs = wait.as_secs(),
                "Request failed, retrying"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, body), fields(url = %url))]
    async fn send(&self, action: &'static str, method: Method, url: &Url, body: Body) -> Result<Reply> {
        let response = self
            .execute(action, url, || {
                let request = match method {
                    Method::Get => self.client.get(url.clone()),
                    Method::Post => self.client.post(url.clone()),
                };
                match &body {
                    Body::Empty => request,
                    Body::Json(value) => request.json(value),
                    Body::Bytes(bytes) => request.body(bytes.clone()),
                }
            })
            .await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| RemoteError::transport(action, url, e))?;
        debug!(status, bytes = body.len(), "Received reply");

        Ok(Reply {
            status,
            url: final_url,
            body,
        })
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn download(&self, url: &Url, target: &Path) -> Result<u64> {
        let response = self
            .execute("download", url, || self.client.get(url.clone()))
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(RemoteError::Unauthorized),
            status if !status.is_success() => {
                return Err(RemoteError::Rejected {
                    action: "download",
                    status: format!("{} {}", url, status.as_u16()),
                    reason: None,
                })
            }
            _ => {}
        }

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| RemoteError::transport("download", url, e)));
        let written = save_stream(stream, target).await?;
        info!(path = %target.display(), bytes = written, "Download completed");
        Ok(written)
    }
}

/// Write `stream` to `<target>.download`, then move it to `target`. The
/// partial file is removed when anything fails.
pub async fn save_stream<S>(stream: S, target: &Path) -> Result<u64>
where
    S: Stream<Item = Result<Bytes>>,
{
    let partial = partial_path(target);
    let result = match write_partial(stream, &partial).await {
        Ok(written) => fs::rename(&partial, target)
            .await
            .map(|_| written)
            .map_err(RemoteError::from),
        Err(e) => Err(e),
    };
    if result.is_err() {
        if let Err(e) = fs::remove_file(&partial).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %partial.display(), error = %e, "Failed to remove partial download");
            }
        }
    }
    result
}

async fn write_partial<S>(stream: S, partial: &Path) -> Result<u64>
where
    S: Stream<Item = Result<Bytes>>,
{
    let mut stream = Box::pin(stream);
    let mut file = File::create(partial).await?;
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// `<target>.download`, where a download lives until it is complete.
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".download");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for code in [429u16, 502, 503, 504] {
            assert!(is_retryable(StatusCode::from_u16(code).unwrap()), "{code}");
        }
        for code in [200u16, 400, 401, 404, 500] {
            assert!(!is_retryable(StatusCode::from_u16(code).unwrap()), "{code}");
        }
    }

    #[test]
    fn test_wait_without_header_is_cap() {
        assert_eq!(retry_wait(None, Duration::from_secs(30)), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_save_stream_renames_when_complete() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.grib");
        let chunks = vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];

        let written = save_stream(futures::stream::iter(chunks), &target).await.unwrap();

        assert_eq!(written, 4);
        assert_eq!(std::fs::read(&target).unwrap(), b"abcd");
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn test_save_stream_removes_partial_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.grib");
        let chunks = vec![
            Ok(Bytes::from_static(b"ab")),
            Err(RemoteError::Config("connection reset".into())),
        ];

        let err = save_stream(futures::stream::iter(chunks), &target).await.unwrap_err();

        assert!(err.to_string().contains("connection reset"));
        assert!(!partial_path(&target).exists());
        assert!(!target.exists());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/out.grib")),
            PathBuf::from("/tmp/out.grib.download")
        );
    }
}
