//! HTTP embedding provider client.
//!
//! The provider contract: POST a batch of texts plus a model identifier,
//! receive one fixed-length float vector per input text, in input order.
//! A response that disagrees with the request (wrong count, wrong
//! dimension) is a typed error; callers must never silently proceed on a
//! malformed shape.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Default vector dimension for the general-purpose embedder.
pub const DEFAULT_DIM: usize = 1024;
/// Texts are embedded in batches of this size.
pub const DEFAULT_BATCH_SIZE: usize = 16;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("embedding provider returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed embedding response: {0}")]
    BadShape(String),
    #[error("invalid embedding client config: {0}")]
    Config(String),
}

/// Capability contract for obtaining embeddings. Injected into the vector
/// matcher so tests can substitute deterministic doubles.
#[allow(async_fn_in_trait)]
pub trait EmbeddingProvider {
    /// Fixed output dimension of this provider's vectors.
    fn dim(&self) -> usize;

    /// Embed one batch, returning one vector per input text, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedItem>,
}

#[derive(Deserialize)]
struct EmbedItem {
    embedding: Vec<f32>,
}

/// Validate the response shape against what was requested.
fn vectors_from_response(
    resp: EmbedResponse,
    expected_count: usize,
    expected_dim: usize,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if resp.data.len() != expected_count {
        return Err(EmbedError::BadShape(format!(
            "expected {expected_count} vectors, got {}",
            resp.data.len()
        )));
    }
    let vectors: Vec<Vec<f32>> = resp.data.into_iter().map(|item| item.embedding).collect();
    if let Some(bad) = vectors.iter().find(|v| v.len() != expected_dim) {
        return Err(EmbedError::BadShape(format!(
            "expected {expected_dim}-d vectors, got {}-d",
            bad.len()
        )));
    }
    Ok(vectors)
}

/// Bearer-authenticated client against an OpenAI-style `/embeddings`
/// endpoint. Retries transport failures and 5xx responses with
/// exponential backoff; every request carries a hard timeout.
#[derive(Debug)]
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    dim: usize,
}

impl HttpEmbeddingClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, EmbedError> {
        let api_url = api_url.into();
        if api_url.is_empty() {
            return Err(EmbedError::Config("api_url is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_url,
            api_key: api_key.into(),
            model: model.into(),
            dim: DEFAULT_DIM,
        })
    }

    /// Override the expected vector dimension (provider-specific).
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    fn headers(&self) -> Result<HeaderMap, EmbedError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| EmbedError::Config("api key is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn post_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = EmbedRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
        };

        let resp = self
            .client
            .post(format!("{}/embeddings", self.api_url))
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Status { status, body });
        }

        let parsed: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| EmbedError::BadShape(e.to_string()))?;
        vectors_from_response(parsed, texts.len(), self.dim)
    }
}

impl EmbeddingProvider for HttpEmbeddingClient {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut backoff = BACKOFF_BASE;
        let mut last_err: Option<EmbedError> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.post_once(texts).await {
                Ok(vectors) => return Ok(vectors),
                // 4xx and shape errors won't improve on retry.
                Err(e @ EmbedError::BadShape(_)) | Err(e @ EmbedError::Config(_)) => return Err(e),
                Err(EmbedError::Status { status, body }) if status.is_client_error() => {
                    return Err(EmbedError::Status { status, body });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "embedding request failed, retrying");
                    last_err = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| EmbedError::BadShape("no attempts made".to_string())))
    }
}
