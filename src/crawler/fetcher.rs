//! Rate-limited HTTP transport
//!
//! This module handles every outbound request, including:
//! - Process-wide pacing with jitter through a shared [`Pacer`]
//! - Pseudo-random `User-Agent` rotation
//! - Bounded retry with exponential backoff for transient failures
//! - Detection of challenge pages ("soft blocks") via a [`BlockDetector`]
//! - Response size limits
//!
//! # Failure Classification
//!
//! | Condition | Action |
//! |-----------|--------|
//! | Challenge page / challenge redirect | Immediate → `Blocked` |
//! | HTTP 5xx, 408, 429 | Retry up to `max-attempts` |
//! | Timeout / connection error | Retry up to `max-attempts` |
//! | Other HTTP 4xx | Immediate → `Status` |
//! | Body over the size limit | Immediate → `TooLarge` |

use crate::config::{default_tool_user_agent, BlockDetectionConfig, Config, TransportConfig};
use crate::crawler::retry::{RetryDecision, RetryPolicy};
use crate::{TransportError, TransportResult};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ARTIFACT_ACCEPT: &str = "application/pdf,application/octet-stream;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.9";

/// Anything that can fetch pages and artifacts
///
/// [`RateLimitedTransport`] is the production implementation; the crawl and
/// download phases only depend on this trait.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetches a listing page
    async fn fetch(&self, url: &str) -> TransportResult<Vec<u8>>;

    /// Fetches a binary artifact (longer timeout, binary `Accept`)
    async fn fetch_artifact(&self, url: &str) -> TransportResult<Vec<u8>>;
}

/// Decides whether a response is a challenge page instead of real content
pub trait BlockDetector: Send + Sync {
    /// Inspects a response
    ///
    /// # Arguments
    ///
    /// * `final_url` - URL after redirects
    /// * `content_type` - `Content-Type` header, if any
    /// * `body` - Full response body
    ///
    /// # Returns
    ///
    /// `Some(reason)` if the response is a block, `None` otherwise
    fn detect(&self, final_url: &str, content_type: Option<&str>, body: &[u8]) -> Option<String>;
}

/// Matches challenge phrases in textual bodies and challenge redirect targets
#[derive(Debug, Clone)]
pub struct KeywordBlockDetector {
    phrases: Vec<String>,
    redirect_markers: Vec<String>,
}

impl KeywordBlockDetector {
    pub fn new(phrases: Vec<String>, redirect_markers: Vec<String>) -> Self {
        Self {
            phrases: phrases.into_iter().map(|p| p.to_lowercase()).collect(),
            redirect_markers,
        }
    }

    pub fn from_config(config: &BlockDetectionConfig) -> Self {
        Self::new(config.phrases.clone(), config.redirect_markers.clone())
    }
}

impl Default for KeywordBlockDetector {
    fn default() -> Self {
        Self::from_config(&BlockDetectionConfig::default())
    }
}

/// Binary payloads are never scanned for phrases
fn is_textual(content_type: Option<&str>, body: &[u8]) -> bool {
    if body.starts_with(b"%PDF") {
        return false;
    }
    match content_type {
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/")
                || ct.contains("html")
                || ct.contains("json")
                || ct.contains("xml")
        }
        None => true,
    }
}

impl BlockDetector for KeywordBlockDetector {
    fn detect(&self, final_url: &str, content_type: Option<&str>, body: &[u8]) -> Option<String> {
        if let Some(marker) = self
            .redirect_markers
            .iter()
            .find(|m| final_url.contains(m.as_str()))
        {
            return Some(format!("redirected to challenge ({})", marker));
        }

        if !is_textual(content_type, body) {
            return None;
        }

        let text = String::from_utf8_lossy(body).to_lowercase();
        self.phrases
            .iter()
            .find(|p| text.contains(p.as_str()))
            .map(|p| format!("challenge phrase '{}'", p))
    }
}

/// Enforces a minimum spacing between consecutive requests
///
/// Clones share the same clock, so one pacer can govern several transports.
#[derive(Debug, Clone)]
pub struct Pacer {
    min_interval: Duration,
    jitter: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl Pacer {
    pub fn new(min_interval: Duration, jitter: Duration) -> Self {
        Self {
            min_interval,
            jitter,
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.request_delay(), config.jitter())
    }

    /// Waits until the next request may be issued, then claims the slot
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(previous) = *last {
            let jitter_ms = self.jitter.as_millis() as u64;
            let jitter = if jitter_ms == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
            };

            let ready_at = previous + self.min_interval + jitter;
            let now = Instant::now();
            if ready_at > now {
                tracing::debug!("Pacing: sleeping {}ms", (ready_at - now).as_millis());
                tokio::time::sleep_until(ready_at).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Page,
    Artifact,
}

/// Outcome of a single attempt that did not produce a body
enum AttemptError {
    Transient(String),
    Fatal(TransportError),
}

/// Returns true for statuses worth retrying
fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Builds the HTTP client shared by all requests
///
/// Per-request timeouts are set on each request, so the client itself only
/// bounds connection setup.
pub fn build_http_client() -> TransportResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
        .map_err(|e| TransportError::Build(e.to_string()))
}

/// HTTP transport with pacing, identity rotation, retry and block detection
pub struct RateLimitedTransport {
    client: Client,
    pacer: Pacer,
    retry: RetryPolicy,
    detector: Arc<dyn BlockDetector>,
    user_agents: Vec<String>,
    page_timeout: Duration,
    artifact_timeout: Duration,
    max_body_bytes: Option<u64>,
}

impl RateLimitedTransport {
    /// Creates a transport from the transport configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Transport settings (pacing, timeouts, retry, identities)
    /// * `detector` - Block detector consulted before any body is returned
    ///
    /// # Returns
    ///
    /// * `Ok(RateLimitedTransport)` - Ready to use
    /// * `Err(TransportError::Build)` - The HTTP client could not be built
    pub fn new(
        config: &TransportConfig,
        detector: Arc<dyn BlockDetector>,
    ) -> TransportResult<Self> {
        let user_agents = if config.user_agents.is_empty() {
            vec![default_tool_user_agent()]
        } else {
            config.user_agents.clone()
        };

        let max_body_bytes = match config.max_body_bytes() {
            0 => None,
            limit => Some(limit),
        };

        Ok(Self {
            client: build_http_client()?,
            pacer: Pacer::from_config(config),
            retry: RetryPolicy::from_config(config),
            detector,
            user_agents,
            page_timeout: config.timeout(),
            artifact_timeout: config.download_timeout(),
            max_body_bytes,
        })
    }

    /// Creates a transport with the keyword detector from `config`
    pub fn from_config(config: &Config) -> TransportResult<Self> {
        let detector = Arc::new(KeywordBlockDetector::from_config(&config.block_detection));
        Self::new(&config.transport, detector)
    }

    /// Replaces the pacer, e.g. with a clone shared by another transport
    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or("")
    }

    async fn execute(&self, url: &str, kind: RequestKind) -> TransportResult<Vec<u8>> {
        let mut attempt = 1;

        loop {
            self.pacer.wait().await;

            let last_error = match self.attempt(url, kind).await {
                Ok(body) => return Ok(body),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient(message)) => message,
            };

            match self.retry.should_retry(attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt,
                        self.retry.max_attempts(),
                        url,
                        last_error
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::GiveUp => {
                    return Err(TransportError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        last_error,
                    });
                }
            }
        }
    }

    async fn attempt(&self, url: &str, kind: RequestKind) -> Result<Vec<u8>, AttemptError> {
        let (accept, timeout) = match kind {
            RequestKind::Page => (PAGE_ACCEPT, self.page_timeout),
            RequestKind::Artifact => (ARTIFACT_ACCEPT, self.artifact_timeout),
        };

        tracing::debug!("GET {}", url);
        let mut response = self
            .client
            .get(url)
            .header(USER_AGENT, self.pick_user_agent())
            .header(ACCEPT, accept)
            .header(ACCEPT_LANGUAGE, ACCEPT_LANGUAGE_VALUE)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    AttemptError::Fatal(TransportError::Build(e.to_string()))
                } else if e.is_timeout() {
                    AttemptError::Transient("request timed out".to_string())
                } else {
                    AttemptError::Transient(e.to_string())
                }
            })?;

        let status = response.status();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let (Some(limit), Some(length)) = (self.max_body_bytes, response.content_length()) {
            if length > limit {
                return Err(AttemptError::Fatal(TransportError::TooLarge {
                    url: url.to_string(),
                    limit,
                }));
            }
        }

        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk);
                    if let Some(limit) = self.max_body_bytes {
                        if body.len() as u64 > limit {
                            return Err(AttemptError::Fatal(TransportError::TooLarge {
                                url: url.to_string(),
                                limit,
                            }));
                        }
                    }
                }
                Ok(None) => break,
                Err(e) if e.is_timeout() => {
                    return Err(AttemptError::Transient("body read timed out".to_string()))
                }
                Err(e) => return Err(AttemptError::Transient(e.to_string())),
            }
        }

        if let Some(reason) = self
            .detector
            .detect(&final_url, content_type.as_deref(), &body)
        {
            tracing::warn!("Block detected at {}: {}", final_url, reason);
            return Err(AttemptError::Fatal(TransportError::Blocked {
                url: url.to_string(),
                reason,
            }));
        }

        if is_transient_status(status) {
            return Err(AttemptError::Transient(format!("HTTP {}", status.as_u16())));
        }

        if !status.is_success() {
            return Err(AttemptError::Fatal(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }));
        }

        tracing::debug!("Fetched {} ({} bytes)", final_url, body.len());
        Ok(body)
    }
}

#[async_trait]
impl Fetch for RateLimitedTransport {
    async fn fetch(&self, url: &str) -> TransportResult<Vec<u8>> {
        self.execute(url, RequestKind::Page).await
    }

    async fn fetch_artifact(&self, url: &str) -> TransportResult<Vec<u8>> {
        self.execute(url, RequestKind::Artifact).await
    }
}
