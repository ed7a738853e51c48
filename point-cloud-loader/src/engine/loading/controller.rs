//! Request sequencing for point cloud loads.
//!
//! Each [`DecodePipelineController::submit`] starts a new generation. Work
//! from older generations keeps running to completion (the native decode
//! cannot be interrupted) but its progress and results are dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::ingest::StreamIngestor;
use super::progress::{LoadPhase, LoadingProgress};
use super::request::DecodeRequest;
use crate::config::ModuleConfigOverrides;
use crate::engine::assets::{PointCloudGeometry, PointCloudStats};
use crate::engine::native::NativeDecodeBridge;
use crate::engine::processing::{PointCloudPostProcessor, PostProcessOptions};
use crate::error::{PipelineError, Result};
use crate::runtime;

/// Notifications for the current request generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Started {
        token: u64,
    },
    Progress {
        token: u64,
        received: u64,
        total: u64,
    },
    Loaded {
        token: u64,
        stats: PointCloudStats,
    },
    Failed {
        token: u64,
        message: String,
        code: u32,
    },
}

impl PipelineEvent {
    pub fn token(&self) -> u64 {
        match self {
            Self::Started { token }
            | Self::Progress { token, .. }
            | Self::Loaded { token, .. }
            | Self::Failed { token, .. } => *token,
        }
    }
}

struct ControllerState {
    token: u64,
    cancel: Option<CancellationToken>,
    phase: LoadPhase,
    progress: LoadingProgress,
    geometry: Option<Arc<PointCloudGeometry>>,
    post_process: PostProcessOptions,
    closed: bool,
}

struct ControllerShared {
    state: Mutex<ControllerState>,
    events: mpsc::UnboundedSender<PipelineEvent>,
}

impl ControllerShared {
    /// Run `apply` only while `token` is still the live generation.
    /// Events are sent under the lock so they keep token order.
    fn if_current(
        &self,
        token: u64,
        apply: impl FnOnce(&mut ControllerState) -> Option<PipelineEvent>,
    ) -> bool {
        let mut state = self.state.lock();
        if state.closed || state.token != token {
            return false;
        }
        if let Some(event) = apply(&mut state) {
            let _ = self.events.send(event);
        }
        true
    }

    /// Fails with [`PipelineError::Aborted`] once the request is cancelled
    /// or superseded; otherwise records the finished stage.
    fn checkpoint(
        &self,
        token: u64,
        cancel: &CancellationToken,
        stage: impl FnOnce(&mut LoadingProgress),
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Aborted);
        }
        let applied = self.if_current(token, |state| {
            stage(&mut state.progress);
            None
        });
        if applied {
            Ok(())
        } else {
            Err(PipelineError::Aborted)
        }
    }
}

/// Orchestrates ingest, module start-up, decode and post-processing.
///
/// Only the newest request may change visible state or emit events.
pub struct DecodePipelineController {
    shared: Arc<ControllerShared>,
    ingestor: StreamIngestor,
    bridge: NativeDecodeBridge,
    module_overrides: ModuleConfigOverrides,
}

impl DecodePipelineController {
    pub fn new(
        ingestor: StreamIngestor,
        bridge: NativeDecodeBridge,
    ) -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(ControllerShared {
            state: Mutex::new(ControllerState {
                token: 0,
                cancel: None,
                phase: LoadPhase::Idle,
                progress: LoadingProgress::default(),
                geometry: None,
                post_process: PostProcessOptions::default(),
                closed: false,
            }),
            events,
        });

        let controller = Self {
            shared,
            ingestor,
            bridge,
            module_overrides: ModuleConfigOverrides::default(),
        };
        (controller, receiver)
    }

    /// Explicit module config passed to every `ensure_ready`.
    pub fn with_module_config(mut self, overrides: ModuleConfigOverrides) -> Self {
        self.module_overrides = overrides;
        self
    }

    /// Applies from the next submit on.
    pub fn set_post_process(&self, options: PostProcessOptions) {
        self.shared.state.lock().post_process = options;
    }

    /// Start loading `request`, superseding any request in flight.
    ///
    /// Returns the new request token. Must be called inside a tokio runtime
    /// on native targets.
    pub fn submit(&self, request: DecodeRequest) -> Result<u64> {
        let (token, cancel, options) = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(PipelineError::Aborted);
            }

            if let Some(previous) = state.cancel.take() {
                previous.cancel();
            }
            if state.geometry.take().is_some() {
                debug!("Disposed geometry of request {}", state.token);
            }

            state.token += 1;
            let cancel = CancellationToken::new();
            state.cancel = Some(cancel.clone());
            state.phase = LoadPhase::Loading;
            state.progress = LoadingProgress::default();

            let token = state.token;
            let _ = self.shared.events.send(PipelineEvent::Started { token });
            (token, cancel, state.post_process)
        };

        info!("Loading request {} from {}", token, request.describe());

        let job = LoadJob {
            shared: self.shared.clone(),
            ingestor: self.ingestor.clone(),
            bridge: self.bridge.clone(),
            module_overrides: self.module_overrides,
            token,
            cancel,
            request,
            options,
        };
        runtime::spawn(job.run());

        Ok(token)
    }

    /// Token of the most recent submit; 0 before the first.
    pub fn token(&self) -> u64 {
        self.shared.state.lock().token
    }

    pub fn phase(&self) -> LoadPhase {
        self.shared.state.lock().phase.clone()
    }

    pub fn progress(&self) -> LoadingProgress {
        self.shared.state.lock().progress.clone()
    }

    /// Geometry of the last successful load, if it has not been superseded.
    pub fn geometry(&self) -> Option<Arc<PointCloudGeometry>> {
        self.shared.state.lock().geometry.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Cancel in-flight work, release geometry and stop all events.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        state.geometry = None;
        debug!("Pipeline controller shut down at request {}", state.token);
    }
}

impl Drop for DecodePipelineController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Everything one request generation needs, owned by its task.
struct LoadJob {
    shared: Arc<ControllerShared>,
    ingestor: StreamIngestor,
    bridge: NativeDecodeBridge,
    module_overrides: ModuleConfigOverrides,
    token: u64,
    cancel: CancellationToken,
    request: DecodeRequest,
    options: PostProcessOptions,
}

impl LoadJob {
    async fn run(self) {
        let outcome = self.execute().await;
        let token = self.token;

        let applied = self.shared.if_current(token, |state| {
            state.cancel = None;
            match &outcome {
                Ok(geometry) => {
                    state.progress.geometry_ready = true;
                    state.phase = LoadPhase::Ready;
                    state.geometry = Some(geometry.clone());
                    Some(PipelineEvent::Loaded {
                        token,
                        stats: geometry.stats,
                    })
                }
                Err(e) if e.is_abort() => None,
                Err(e) => {
                    state.phase = LoadPhase::Failed(e.to_string());
                    Some(PipelineEvent::Failed {
                        token,
                        message: e.to_string(),
                        code: e.error_code(),
                    })
                }
            }
        });

        match outcome {
            _ if !applied => debug!("Discarded stale outcome of request {}", token),
            Ok(geometry) => info!(
                "✓ Request {} loaded: {} of {} points displayed",
                token, geometry.stats.displayed_points, geometry.stats.decoded_points
            ),
            Err(e) if e.is_abort() => debug!("Request {} aborted", token),
            Err(e) => error!("Request {} failed: {}", token, e),
        }
    }

    async fn execute(&self) -> Result<Arc<PointCloudGeometry>> {
        let shared = self.shared.clone();
        let token = self.token;

        let bytes = self
            .ingestor
            .acquire(&self.request, &self.cancel, move |received, total| {
                shared.if_current(token, |state| {
                    state.progress.bytes_received = received;
                    state.progress.bytes_total = Some(total);
                    Some(PipelineEvent::Progress {
                        token,
                        received,
                        total,
                    })
                });
            })
            .await?;
        let received = bytes.len() as u64;
        self.shared.checkpoint(token, &self.cancel, |progress| {
            progress.source_acquired = true;
            progress.bytes_received = received;
        })?;

        self.bridge
            .lifecycle()
            .ensure_ready(&self.module_overrides)
            .await?;
        self.shared
            .checkpoint(token, &self.cancel, |progress| progress.module_ready = true)?;

        // Runs to completion once started; a stale result is dropped below.
        let decoded = self.bridge.decode(&bytes, self.request.options())?;
        drop(bytes);
        self.shared
            .checkpoint(token, &self.cancel, |progress| progress.decoded = true)?;

        let processor = PointCloudPostProcessor::new(self.options);
        Ok(Arc::new(processor.process(decoded)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::loading::request::DecodeOptions;
    use crate::engine::memory::MemoryBudgetGuard;
    use crate::engine::native::{LasModuleFactory, NativeModuleLifecycle};
    use crate::test_support::{FixturePoint, ScriptedTransport, write_las_fixture};
    use bytes::Bytes;

    fn pipeline(
        ingestor: StreamIngestor,
    ) -> (DecodePipelineController, mpsc::UnboundedReceiver<PipelineEvent>) {
        let lifecycle = Arc::new(NativeModuleLifecycle::new(Arc::new(LasModuleFactory)));
        let bridge = NativeDecodeBridge::new(lifecycle, MemoryBudgetGuard::default());
        DecodePipelineController::new(ingestor, bridge)
    }

    fn fixture() -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        write_las_fixture(
            dir.path(),
            &[
                FixturePoint::coloured(0.0, 0.0, 0.0, [0, 0, 0]),
                FixturePoint::coloured(2.0, 1.0, 1.0, [65535, 65535, 65535]),
                FixturePoint::coloured(4.0, 2.0, 2.0, [0, 0, 0]),
            ],
        )
    }

    #[tokio::test]
    async fn buffer_request_loads_and_reports_stats() {
        let (controller, mut events) = pipeline(StreamIngestor::buffers_only());
        controller.set_post_process(PostProcessOptions {
            decimate: 2,
            max_points: 10,
        });

        let token = controller
            .submit(DecodeRequest::from_buffer(
                fixture(),
                DecodeOptions { enable_color: true },
            ))
            .unwrap();
        assert_eq!(token, 1);

        assert_eq!(events.recv().await, Some(PipelineEvent::Started { token }));
        let Some(PipelineEvent::Loaded { stats, .. }) = events.recv().await else {
            panic!("expected a loaded event");
        };
        assert_eq!(stats.decoded_points, 3);
        assert_eq!(stats.displayed_points, 2);
        assert!(stats.has_color);

        assert_eq!(controller.phase(), LoadPhase::Ready);
        let progress = controller.progress();
        assert!(progress.source_acquired && progress.module_ready && progress.geometry_ready);
        let geometry = controller.geometry().unwrap();
        assert_eq!(geometry.point_count(), 2);
    }

    #[tokio::test]
    async fn decode_failure_is_reported_with_code() {
        let (controller, mut events) = pipeline(StreamIngestor::buffers_only());
        let token = controller
            .submit(DecodeRequest::from_buffer(vec![1u8; 30], DecodeOptions::default()))
            .unwrap();

        events.recv().await;
        assert_eq!(
            events.recv().await,
            Some(PipelineEvent::Failed {
                token,
                message: "Decode error: decoder returned no data; input may be malformed".into(),
                code: 202,
            })
        );
        assert!(matches!(controller.phase(), LoadPhase::Failed(_)));
        assert!(controller.geometry().is_none());
    }

    #[tokio::test]
    async fn reload_drops_the_superseded_request() {
        let (transport, feed) = ScriptedTransport::pending(Some(1024));
        let (controller, mut events) = pipeline(StreamIngestor::new(Arc::new(transport)));

        let first = controller
            .submit(DecodeRequest::from_url("http://host/a.laz", DecodeOptions::default()))
            .unwrap();
        feed.unbounded_send(Ok(Bytes::from_static(b"partial"))).unwrap();
        tokio::task::yield_now().await;

        let second = controller
            .submit(DecodeRequest::from_buffer(fixture(), DecodeOptions::default()))
            .unwrap();
        let _ = feed.unbounded_send(Ok(Bytes::from_static(b"late")));

        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            let done = matches!(
                event,
                PipelineEvent::Loaded { .. } | PipelineEvent::Failed { .. }
            );
            seen.push(event);
            if done {
                break;
            }
        }

        // Nothing from the first request after the second started.
        let started_second = seen
            .iter()
            .position(|e| *e == PipelineEvent::Started { token: second })
            .unwrap();
        assert!(seen[started_second..].iter().all(|e| e.token() == second));
        assert!(seen.iter().all(|e| !matches!(e, PipelineEvent::Failed { .. })));
        assert!(matches!(
            seen.last(),
            Some(PipelineEvent::Loaded { token, .. }) if *token == second
        ));
        assert_eq!(first + 1, second);
    }

    #[tokio::test]
    async fn shutdown_silences_in_flight_work() {
        let (transport, feed) = ScriptedTransport::pending(None);
        let (controller, mut events) = pipeline(StreamIngestor::new(Arc::new(transport)));

        controller
            .submit(DecodeRequest::from_url("http://host/a.laz", DecodeOptions::default()))
            .unwrap();
        assert!(matches!(events.recv().await, Some(PipelineEvent::Started { .. })));

        controller.shutdown();
        drop(feed);
        tokio::task::yield_now().await;

        assert!(controller.is_closed());
        assert!(events.try_recv().is_err());
        assert_eq!(
            controller.submit(DecodeRequest::from_buffer(fixture(), DecodeOptions::default())),
            Err(PipelineError::Aborted)
        );
    }
}
