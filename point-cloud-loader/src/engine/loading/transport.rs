use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;

/// Response body delivered chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Status line, size hint and body of an HTTP response.
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    /// Value of `content-length`, when the server sent one.
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Issues GET requests on behalf of the ingestor.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::ReqwestTransport;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use async_trait::async_trait;
    use futures::{StreamExt, TryStreamExt};

    use super::{HttpResponse, HttpTransport};
    use crate::error::{PipelineError, Result};

    /// [`HttpTransport`] over a shared `reqwest::Client`.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new() -> Result<Self> {
            let client = reqwest::Client::builder()
                .build()
                .map_err(|e| PipelineError::Transport(e.to_string()))?;
            Ok(Self { client })
        }

        /// Reuse a pre-configured client (timeouts, proxies, headers).
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn get(&self, url: &str) -> Result<HttpResponse> {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| PipelineError::Transport(e.to_string()))?;

            let status = response.status();
            let content_length = response.content_length();
            let body = response
                .bytes_stream()
                .map_err(|e| PipelineError::Transport(e.to_string()))
                .boxed();

            Ok(HttpResponse {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
                content_length,
                body,
            })
        }
    }
}
