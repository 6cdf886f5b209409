//! Fetching documents over HTTP

use super::retry::RetryPolicy;
use crate::error::{FeedError, FeedResult};
use async_trait::async_trait;
use std::io::Read;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 100;

const CHUNK_SIZE: usize = 64 * 1024;

/// User agent sent with every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgent(String);

impl UserAgent {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UserAgent {
    fn default() -> Self {
        Self(format!(
            "feedkit/{} ({})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS
        ))
    }
}

/// Fetches the body of a document by URI
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, uri: &str, token: &CancellationToken) -> FeedResult<Vec<u8>>;

    /// Write the body of `uri` into `destination` and return its length.
    ///
    /// The default buffers the whole body through [`fetch`](Self::fetch).
    async fn fetch_into(
        &self,
        uri: &str,
        destination: &mut (dyn AsyncWrite + Unpin + Send),
        token: &CancellationToken,
    ) -> FeedResult<u64> {
        let body = self.fetch(uri, token).await?;
        destination
            .write_all(&body)
            .await
            .map_err(|e| FeedError::io(format!("writing body of {}", uri), e))?;
        Ok(body.len() as u64)
    }
}

/// HTTP fetcher backed by a blocking `ureq` agent, with retries
pub struct UreqFetcher {
    agent: ureq::Agent,
    user_agent: UserAgent,
    policy: RetryPolicy,
}

impl UreqFetcher {
    pub fn new(user_agent: UserAgent, policy: RetryPolicy, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            agent,
            user_agent,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn should_retry(&self, error: &FeedError) -> bool {
        match error {
            FeedError::Transport {
                status: Some(429), ..
            } => self.policy.retry_on_rate_limit,
            other => other.is_retryable(),
        }
    }

    async fn fetch_once(&self, uri: &str) -> FeedResult<Vec<u8>> {
        let agent = self.agent.clone();
        let user_agent = self.user_agent.as_str().to_string();
        let target = uri.to_string();

        tokio::task::spawn_blocking(move || {
            let mut response = agent
                .get(&target)
                .header("User-Agent", &user_agent)
                .call()
                .map_err(|e| request_error(&target, e))?;
            response
                .body_mut()
                .with_config()
                .limit(u64::MAX)
                .read_to_vec()
                .map_err(|e| request_error(&target, e))
        })
        .await
        .map_err(|e| FeedError::Internal(format!("request task failed: {}", e)))?
    }

    /// Read the body on a blocking thread and hand chunks over a channel.
    /// `written` counts the bytes already in `destination`.
    async fn stream_once(
        &self,
        uri: &str,
        destination: &mut (dyn AsyncWrite + Unpin + Send),
        written: &mut u64,
    ) -> FeedResult<()> {
        let agent = self.agent.clone();
        let user_agent = self.user_agent.as_str().to_string();
        let target = uri.to_string();
        let (sender, mut receiver) = mpsc::channel::<FeedResult<Vec<u8>>>(4);

        let reader = tokio::task::spawn_blocking(move || {
            let response = match agent.get(&target).header("User-Agent", &user_agent).call() {
                Ok(response) => response,
                Err(e) => {
                    let _ = sender.blocking_send(Err(request_error(&target, e)));
                    return;
                }
            };
            let mut body = response.into_body().into_reader();
            let mut buffer = vec![0u8; CHUNK_SIZE];
            loop {
                let chunk = match body.read(&mut buffer) {
                    Ok(0) => return,
                    Ok(read) => Ok(buffer[..read].to_vec()),
                    Err(e) => Err(FeedError::transport(&target, None, e.to_string())),
                };
                let failed = chunk.is_err();
                // A closed channel means the receiving side gave up
                if sender.blocking_send(chunk).is_err() || failed {
                    return;
                }
            }
        });

        while let Some(chunk) = receiver.recv().await {
            let chunk = chunk?;
            destination
                .write_all(&chunk)
                .await
                .map_err(|e| FeedError::io(format!("writing body of {}", uri), e))?;
            *written += chunk.len() as u64;
        }

        reader
            .await
            .map_err(|e| FeedError::Internal(format!("request task failed: {}", e)))
    }

    /// Wait out the retry delay, or fail when the token fires first
    async fn pause(&self, error: &FeedError, token: &CancellationToken) -> FeedResult<()> {
        warn!("Request failed, retrying in {}ms: {}", self.policy.delay_ms, error);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(self.policy.delay_ms)) => Ok(()),
            _ = token.cancelled() => Err(FeedError::Cancelled),
        }
    }
}

fn request_error(uri: &str, error: ureq::Error) -> FeedError {
    match error {
        ureq::Error::StatusCode(code) => {
            FeedError::transport(uri, Some(code), format!("server returned status {}", code))
        }
        other => FeedError::transport(uri, None, other.to_string()),
    }
}

#[async_trait]
impl DocumentFetcher for UreqFetcher {
    async fn fetch(&self, uri: &str, token: &CancellationToken) -> FeedResult<Vec<u8>> {
        let attempts = self.policy.max_attempts();

        let mut attempt = 1;
        loop {
            if token.is_cancelled() {
                return Err(FeedError::Cancelled);
            }

            debug!("GET {} (attempt {}/{})", uri, attempt, attempts);
            let result = tokio::select! {
                result = self.fetch_once(uri) => result,
                _ = token.cancelled() => return Err(FeedError::Cancelled),
            };

            match result {
                Ok(body) => return Ok(body),
                Err(e) if attempt < attempts && self.should_retry(&e) => {
                    self.pause(&e, token).await?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Streams the body in chunks. A failed attempt is only retried when
    /// nothing has been written yet.
    async fn fetch_into(
        &self,
        uri: &str,
        destination: &mut (dyn AsyncWrite + Unpin + Send),
        token: &CancellationToken,
    ) -> FeedResult<u64> {
        let attempts = self.policy.max_attempts();

        let mut attempt = 1;
        loop {
            if token.is_cancelled() {
                return Err(FeedError::Cancelled);
            }

            debug!("GET {} streaming (attempt {}/{})", uri, attempt, attempts);
            let mut written = 0;
            let result = tokio::select! {
                result = self.stream_once(uri, destination, &mut written) => result,
                _ = token.cancelled() => return Err(FeedError::Cancelled),
            };

            match result {
                Ok(()) => return Ok(written),
                Err(e) if written == 0 && attempt < attempts && self.should_retry(&e) => {
                    self.pause(&e, token).await?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
