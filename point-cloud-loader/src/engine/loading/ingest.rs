use std::sync::Arc;

use bytes::Bytes;
use constants::loading::BUFFER_PREVIEW_BYTES;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::request::{DecodeRequest, DecodeSource};
use super::transport::HttpTransport;
use crate::config::format_memory;
use crate::error::{PipelineError, Result};

/// Turns a [`DecodeRequest`] into one contiguous byte buffer.
#[derive(Clone, Default)]
pub struct StreamIngestor {
    transport: Option<Arc<dyn HttpTransport>>,
}

impl StreamIngestor {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    /// An ingestor that only accepts in-memory buffers.
    pub fn buffers_only() -> Self {
        Self::default()
    }

    /// Acquire the request's bytes.
    ///
    /// `on_progress` receives `(received, total)` after each chunk, only when
    /// the server announced a total size. Cancellation yields
    /// [`PipelineError::Aborted`] and stops further reads.
    pub async fn acquire(
        &self,
        request: &DecodeRequest,
        cancel: &CancellationToken,
        on_progress: impl FnMut(u64, u64),
    ) -> Result<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Aborted);
        }

        let buffer = match request.source() {
            // The caller keeps its buffer; decode works on a private copy.
            DecodeSource::Buffer(bytes) => bytes.to_vec(),
            DecodeSource::Url(url) => self.fetch(url, cancel, on_progress).await?,
        };

        if buffer.is_empty() {
            return Err(PipelineError::EmptySource);
        }

        let preview = &buffer[..buffer.len().min(BUFFER_PREVIEW_BYTES)];
        debug!(
            "Acquired {} from {}, first bytes: {:02x?}",
            format_memory(buffer.len() as u64),
            request.describe(),
            preview
        );

        Ok(buffer)
    }

    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
        mut on_progress: impl FnMut(u64, u64),
    ) -> Result<Vec<u8>> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| PipelineError::Transport("no HTTP transport configured".into()))?;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Fetch of {} aborted before response", url);
                return Err(PipelineError::Aborted);
            }
            response = transport.get(url) => response?,
        };

        if !response.is_success() {
            return Err(PipelineError::Fetch {
                url: url.to_string(),
                status: response.status,
                reason: response.reason,
            });
        }

        let total = response.content_length.filter(|total| *total > 0);
        let mut body = response.body;
        let mut chunks: Vec<Bytes> = Vec::new();
        let mut received = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Fetch of {} aborted after {} bytes", url, received);
                    return Err(PipelineError::Aborted);
                }
                next = body.next() => next,
            };

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }

            received += chunk.len() as u64;
            chunks.push(chunk);

            if let Some(total) = total {
                on_progress(received, total);
            }
        }

        let mut buffer = Vec::with_capacity(received as usize);
        for chunk in &chunks {
            buffer.extend_from_slice(chunk);
        }
        Ok(buffer)
    }
}

impl std::fmt::Debug for StreamIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamIngestor")
            .field("transport", &self.transport.is_some())
            .finish()
    }
}
