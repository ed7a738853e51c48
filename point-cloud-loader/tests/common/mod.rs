//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use point_cloud_loader::config::ModuleConfig;
use point_cloud_loader::engine::loading::ReqwestTransport;
use point_cloud_loader::engine::native::heap::HeapStats;
use point_cloud_loader::engine::native::{LasModule, ModuleFactory, ModuleInitError, NativeModule};
use point_cloud_loader::{
    DecodePipelineController, MemoryBudgetGuard, NativeDecodeBridge, NativeModuleLifecycle,
    PipelineEvent, StreamIngestor,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;

#[path = "../../src/test_support/las_fixture.rs"]
mod las_fixture;

pub use las_fixture::{FixturePoint, write_las_fixture};

/// Ingestor over a real `reqwest` client with a short connect timeout.
pub fn http_ingestor() -> StreamIngestor {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    StreamIngestor::new(Arc::new(ReqwestTransport::with_client(client)))
}

/// Builds [`LasModule`]s and keeps the last one for heap inspection.
#[derive(Default)]
pub struct TrackingFactory {
    module: Mutex<Option<Arc<LasModule>>>,
}

impl TrackingFactory {
    pub fn heap_stats(&self) -> Option<HeapStats> {
        self.module.lock().as_ref().map(|module| module.heap_stats())
    }
}

#[async_trait]
impl ModuleFactory for TrackingFactory {
    async fn instantiate(
        &self,
        config: &ModuleConfig,
    ) -> Result<Arc<dyn NativeModule>, ModuleInitError> {
        let module = Arc::new(LasModule::new(config));
        *self.module.lock() = Some(module.clone());
        Ok(module)
    }
}

pub struct Pipeline {
    pub controller: DecodePipelineController,
    pub events: UnboundedReceiver<PipelineEvent>,
    pub factory: Arc<TrackingFactory>,
    pub budget: MemoryBudgetGuard,
}

impl Pipeline {
    pub fn new(ingestor: StreamIngestor) -> Self {
        let factory = Arc::new(TrackingFactory::default());
        let lifecycle = Arc::new(NativeModuleLifecycle::new(factory.clone()));
        let budget = MemoryBudgetGuard::default();
        let bridge = NativeDecodeBridge::new(lifecycle, budget.clone());
        let (controller, events) = DecodePipelineController::new(ingestor, bridge);
        Self {
            controller,
            events,
            factory,
            budget,
        }
    }

    /// Collect events until the first `Loaded` or `Failed`.
    pub async fn until_settled(&mut self) -> Vec<PipelineEvent> {
        let mut seen = Vec::new();
        while let Some(event) = self.events.recv().await {
            let done = matches!(
                event,
                PipelineEvent::Loaded { .. } | PipelineEvent::Failed { .. }
            );
            seen.push(event);
            if done {
                break;
            }
        }
        seen
    }
}

/// Raw HTTP/1.1 response with a content length.
pub fn http_response(status_line: &str, body: &[u8]) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
        status_line,
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}

/// Serve `response` to every connection on a loopback port; returns the URL.
pub async fn serve(response: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let response = response.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buffer = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buffer).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buffer[..n]),
                    }
                }
                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}/cloud.las", address)
}

/// Accept connections and never answer them; returns the URL.
pub async fn serve_stalled() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    format!("http://{}/stalled.las", address)
}
