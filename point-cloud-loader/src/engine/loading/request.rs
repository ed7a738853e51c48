use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Per-request decode switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Extract RGB channels when the point format carries them.
    pub enable_color: bool,
}

/// Where the raw LAS/LAZ bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeSource {
    /// Bytes already in memory. Copied before use.
    Buffer(Arc<[u8]>),
    /// Fetched over HTTP in chunks.
    Url(String),
}

/// One immutable load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeRequest {
    source: DecodeSource,
    options: DecodeOptions,
}

impl DecodeRequest {
    pub fn new(source: DecodeSource, options: DecodeOptions) -> Self {
        Self { source, options }
    }

    pub fn from_buffer(bytes: impl Into<Arc<[u8]>>, options: DecodeOptions) -> Self {
        Self::new(DecodeSource::Buffer(bytes.into()), options)
    }

    pub fn from_url(url: impl Into<String>, options: DecodeOptions) -> Self {
        Self::new(DecodeSource::Url(url.into()), options)
    }

    pub fn source(&self) -> &DecodeSource {
        &self.source
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match &self.source {
            DecodeSource::Buffer(bytes) => format!("buffer of {} bytes", bytes.len()),
            DecodeSource::Url(url) => url.clone(),
        }
    }
}
