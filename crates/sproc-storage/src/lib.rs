//! Secondary-document transport: HTTP fetcher, retry policy and the retry wrapper
//! that every remote lookup goes through.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "sproc-storage";

/// Attempt budget and the pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    pub fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error("{0}")]
    Message(String),
}

/// One GET against a remote document store, without retries.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http status {status} for {url} after {attempts} attempts")]
    HttpStatus {
        status: u16,
        url: String,
        attempts: usize,
    },
    #[error("request failed after {attempts} attempts: {source}")]
    Transport {
        attempts: usize,
        #[source]
        source: TransportError,
    },
}

impl FetchError {
    pub fn attempts(&self) -> usize {
        match self {
            FetchError::HttpStatus { attempts, .. } | FetchError::Transport { attempts, .. } => {
                *attempts
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub final_url: String,
    pub body: Vec<u8>,
    pub attempts: usize,
}

/// Issue GETs until one answers 200 or the policy runs out of attempts.
/// Non-200 statuses and transport failures are both retried.
pub async fn fetch_with_retry<S>(
    source: &S,
    policy: &RetryPolicy,
    url: &str,
) -> Result<FetchedDocument, FetchError>
where
    S: DocumentSource + ?Sized,
{
    let max_attempts = policy.attempts();
    let mut attempt = 0usize;

    loop {
        attempt += 1;
        let failure = match source.get(url).await {
            Ok(resp) if resp.status == 200 => {
                return Ok(FetchedDocument {
                    final_url: resp.final_url,
                    body: resp.body,
                    attempts: attempt,
                });
            }
            Ok(resp) => {
                warn!(url, status = resp.status, attempt, "non-200 response");
                FetchError::HttpStatus {
                    status: resp.status,
                    url: resp.final_url,
                    attempts: attempt,
                }
            }
            Err(err) => {
                warn!(url, attempt, error = %err, "request failed");
                FetchError::Transport {
                    attempts: attempt,
                    source: err,
                }
            }
        };

        if attempt >= max_attempts {
            return Err(failure);
        }
        debug!(url, delay = ?policy.delay, "retrying after delay");
        tokio::time::sleep(policy.delay).await;
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: None,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            retry: config.retry,
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn fetch_document(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        let span = info_span!("secondary_fetch", url);
        fetch_with_retry(self, &self.retry, url).instrument(span).await
    }
}

#[async_trait]
impl DocumentSource for HttpFetcher {
    async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp.bytes().await?.to_vec();
        Ok(RawResponse {
            status,
            final_url,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedSource {
        replies: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedSource {
        fn new(replies: Vec<Result<RawResponse, TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl DocumentSource for ScriptedSource {
        async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Message(format!("no reply for {url}"))))
        }
    }

    fn status(code: u16) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status: code,
            final_url: "https://example.test/doc.json".into(),
            body: b"{}".to_vec(),
        })
    }

    #[test]
    fn default_policy_is_three_attempts_two_seconds_apart() {
        let policy = RetryPolicy::default();
        assert_eq!(policy, RetryPolicy::fixed(3, Duration::from_secs(2)));
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).attempts(), 1);
    }

    #[tokio::test]
    async fn persistent_503_exhausts_after_max_attempts() {
        let source = ScriptedSource::new(vec![status(503), status(503), status(503), status(200)]);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        let err = fetch_with_retry(&source, &policy, "https://example.test/doc.json")
            .await
            .unwrap_err();

        assert_eq!(source.calls(), 3);
        assert_eq!(err.attempts(), 3);
        assert!(matches!(err, FetchError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn success_on_a_later_attempt_reports_attempt_count() {
        let source = ScriptedSource::new(vec![
            Err(TransportError::Message("connection reset".into())),
            status(500),
            status(200),
        ]);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        let doc = fetch_with_retry(&source, &policy, "https://example.test/doc.json")
            .await
            .unwrap();

        assert_eq!(doc.attempts, 3);
        assert_eq!(doc.body, b"{}".to_vec());
    }

    #[tokio::test]
    async fn transport_failures_surface_the_last_cause() {
        let source = ScriptedSource::new(vec![
            Err(TransportError::Message("timeout".into())),
            Err(TransportError::Message("dns".into())),
        ]);
        let policy = RetryPolicy::fixed(2, Duration::ZERO);

        let err = fetch_with_retry(&source, &policy, "https://example.test/doc.json")
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 2);
        assert!(err.to_string().contains("dns"));
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_delay_is_slept_between_attempts_only() {
        let source = ScriptedSource::new(vec![status(503), status(503)]);
        let policy = RetryPolicy::fixed(2, Duration::from_secs(2));
        let started = tokio::time::Instant::now();

        let _ = fetch_with_retry(&source, &policy, "https://example.test/doc.json").await;

        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
