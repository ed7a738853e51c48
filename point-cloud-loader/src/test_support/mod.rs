//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use parking_lot::Mutex;

use crate::engine::loading::transport::{HttpResponse, HttpTransport};
use crate::error::{PipelineError, Result};

mod las_fixture;

pub use las_fixture::{FixturePoint, write_las_fixture};

enum Script {
    Chunks {
        chunks: Vec<Vec<u8>>,
        content_length: Option<u64>,
    },
    Status {
        status: u16,
        reason: String,
    },
    /// Body fed by the test through a channel; usable for one request.
    Pending {
        body: Mutex<Option<mpsc::UnboundedReceiver<Result<Bytes>>>>,
        content_length: Option<u64>,
    },
}

/// HTTP transport answering every GET from a fixed script.
pub struct ScriptedTransport {
    script: Script,
    requests: AtomicUsize,
}

impl ScriptedTransport {
    pub fn ok(chunks: Vec<Vec<u8>>, content_length: Option<u64>) -> Self {
        Self::from_script(Script::Chunks {
            chunks,
            content_length,
        })
    }

    pub fn status(status: u16, reason: &str) -> Self {
        Self::from_script(Script::Status {
            status,
            reason: reason.to_string(),
        })
    }

    /// A 200 response whose body chunks arrive through the returned sender.
    pub fn pending(
        content_length: Option<u64>,
    ) -> (Self, mpsc::UnboundedSender<Result<Bytes>>) {
        let (sender, receiver) = mpsc::unbounded();
        let transport = Self::from_script(Script::Pending {
            body: Mutex::new(Some(receiver)),
            content_length,
        });
        (transport, sender)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn from_script(script: Script) -> Self {
        Self {
            script,
            requests: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, _url: &str) -> Result<HttpResponse> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        match &self.script {
            Script::Chunks {
                chunks,
                content_length,
            } => {
                let items: Vec<Result<Bytes>> = chunks
                    .iter()
                    .map(|chunk| Ok(Bytes::from(chunk.clone())))
                    .collect();
                Ok(HttpResponse {
                    status: 200,
                    reason: "OK".into(),
                    content_length: *content_length,
                    body: futures::stream::iter(items).boxed(),
                })
            }
            Script::Status { status, reason } => Ok(HttpResponse {
                status: *status,
                reason: reason.clone(),
                content_length: None,
                body: futures::stream::empty().boxed(),
            }),
            Script::Pending {
                body,
                content_length,
            } => {
                let receiver = body.lock().take().ok_or_else(|| {
                    PipelineError::Transport("pending body already consumed".into())
                })?;
                Ok(HttpResponse {
                    status: 200,
                    reason: "OK".into(),
                    content_length: *content_length,
                    body: receiver.boxed(),
                })
            }
        }
    }
}
