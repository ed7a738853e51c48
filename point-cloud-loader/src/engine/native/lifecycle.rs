use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::module::{MessageHandler, ModuleFactory, ModuleHooks, ModuleInitError, NativeModule};
use crate::config::{ModuleConfig, ModuleConfigOverrides, format_memory};
use crate::error::{PipelineError, Result};

/// Shared reference to a ready native module and the config it was built with.
#[derive(Clone)]
pub struct NativeModuleHandle {
    module: Arc<dyn NativeModule>,
    config: ModuleConfig,
}

impl NativeModuleHandle {
    pub fn module(&self) -> &Arc<dyn NativeModule> {
        &self.module
    }

    /// Configuration the module was instantiated with.
    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// True when both handles point at the same module instance.
    pub fn same_instance(&self, other: &NativeModuleHandle) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.module), Arc::as_ptr(&other.module))
    }
}

impl fmt::Debug for NativeModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModuleHandle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

type InitOutcome = std::result::Result<NativeModuleHandle, ModuleInitError>;
type InitFuture = Shared<BoxFuture<'static, InitOutcome>>;

enum ModuleState {
    Uninitialized,
    /// One initialisation in flight, awaited by every concurrent caller.
    Initializing(InitFuture),
    Ready(NativeModuleHandle),
}

struct LifecycleInner {
    state: ModuleState,
    /// Process config; explicit per-call overrides are layered on top.
    cached: ModuleConfigOverrides,
    hooks: ModuleHooks,
}

impl LifecycleInner {
    fn debug_enabled(&self) -> bool {
        let fallback = match &self.state {
            ModuleState::Ready(handle) => handle.config.debug,
            _ => ModuleConfig::default().debug,
        };
        self.cached.debug.unwrap_or(fallback)
    }
}

/// Owns the native decoder module for the lifetime of the process.
///
/// State moves from uninitialised to initialising to ready and stays ready.
/// A failed initialisation returns to uninitialised so the next call retries.
pub struct NativeModuleLifecycle {
    factory: Arc<dyn ModuleFactory>,
    inner: Mutex<LifecycleInner>,
}

impl NativeModuleLifecycle {
    pub fn new(factory: Arc<dyn ModuleFactory>) -> Self {
        Self {
            factory,
            inner: Mutex::new(LifecycleInner {
                state: ModuleState::Uninitialized,
                cached: ModuleConfigOverrides::default(),
                hooks: ModuleHooks::default(),
            }),
        }
    }

    /// Seed the cached process config, e.g. from the environment or a file.
    pub fn with_config(self, overrides: ModuleConfigOverrides) -> Self {
        self.inner.lock().cached = overrides;
        self
    }

    /// Return the ready module, initialising it on first use.
    ///
    /// Concurrent callers share one in-flight initialisation and the factory
    /// is invoked at most once per attempt.
    pub async fn ensure_ready(
        &self,
        overrides: &ModuleConfigOverrides,
    ) -> Result<NativeModuleHandle> {
        let pending = {
            let mut inner = self.inner.lock();
            inner.cached = overrides.over(&inner.cached);
            let verbose = inner.debug_enabled();

            match &inner.state {
                ModuleState::Ready(handle) => {
                    warn_if_resized(handle, overrides);
                    lifecycle_log(verbose, "Returning cached native module");
                    return Ok(handle.clone());
                }
                ModuleState::Initializing(pending) => {
                    lifecycle_log(verbose, "Native module initialisation already in progress");
                    pending.clone()
                }
                ModuleState::Uninitialized => {
                    let config = ModuleConfig::default().merged_with(&inner.cached);
                    lifecycle_log(
                        config.debug,
                        &format!(
                            "Initialising native module (initial {}, maximum {})",
                            format_memory(config.memory_initial_size),
                            format_memory(config.memory_maximum_size)
                        ),
                    );

                    let pending = instantiate(self.factory.clone(), config).boxed().shared();
                    inner.state = ModuleState::Initializing(pending.clone());
                    pending
                }
            }
        };

        let outcome = pending.clone().await;

        let mut inner = self.inner.lock();
        let current = matches!(
            &inner.state,
            ModuleState::Initializing(active) if active.ptr_eq(&pending)
        );

        match outcome {
            Ok(handle) => {
                if current {
                    handle.module.set_hooks(inner.hooks.clone());
                    lifecycle_log(handle.config.debug, "✓ Native module ready");
                    inner.state = ModuleState::Ready(handle.clone());
                }
                Ok(handle)
            }
            Err(e) => {
                if current {
                    inner.state = ModuleState::Uninitialized;
                }
                error!("Native module initialisation failed: {}", e);
                Err(PipelineError::Initialization(e.to_string()))
            }
        }
    }

    /// Update the cached process config.
    ///
    /// Once the module is ready only the debug flag still has an effect;
    /// memory sizing changes are reported and otherwise ignored.
    pub fn set_config(&self, overrides: &ModuleConfigOverrides) {
        let mut inner = self.inner.lock();
        if let ModuleState::Ready(handle) = &inner.state {
            warn_if_resized(handle, overrides);
        }
        inner.cached = overrides.over(&inner.cached);
    }

    /// Sink for native error output.
    pub fn set_error_handler(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        let handler: MessageHandler = Arc::new(handler);
        self.update_hooks(|hooks| hooks.on_error = Some(handler));
    }

    /// Sink for native debug output.
    pub fn set_debug_handler(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        let handler: MessageHandler = Arc::new(handler);
        self.update_hooks(|hooks| hooks.on_debug = Some(handler));
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.inner.lock().state, ModuleState::Ready(_))
    }

    /// The ready module, if initialisation has completed.
    pub fn handle(&self) -> Option<NativeModuleHandle> {
        match &self.inner.lock().state {
            ModuleState::Ready(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    fn update_hooks(&self, apply: impl FnOnce(&mut ModuleHooks)) {
        let mut inner = self.inner.lock();
        apply(&mut inner.hooks);
        if let ModuleState::Ready(handle) = &inner.state {
            handle.module.set_hooks(inner.hooks.clone());
        }
    }
}

impl fmt::Debug for NativeModuleLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let state = match &inner.state {
            ModuleState::Uninitialized => "uninitialized",
            ModuleState::Initializing(_) => "initializing",
            ModuleState::Ready(_) => "ready",
        };
        f.debug_struct("NativeModuleLifecycle")
            .field("state", &state)
            .field("cached", &inner.cached)
            .finish()
    }
}

/// Run the factory, turning a panic into an aborted instantiation.
async fn instantiate(factory: Arc<dyn ModuleFactory>, config: ModuleConfig) -> InitOutcome {
    let attempt = AssertUnwindSafe(async move { factory.instantiate(&config).await });

    match attempt.catch_unwind().await {
        Ok(Ok(module)) => Ok(NativeModuleHandle { module, config }),
        Ok(Err(e)) => Err(e),
        Err(panic) => Err(ModuleInitError::Aborted(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "factory panicked".to_string()
    }
}

fn warn_if_resized(handle: &NativeModuleHandle, overrides: &ModuleConfigOverrides) {
    if !overrides.touches_memory() {
        return;
    }
    let requested = handle.config.merged_with(overrides);
    if requested.memory_differs(&handle.config) {
        warn!(
            "Native module already initialised with {} / {}; memory changes take effect only after restart",
            format_memory(handle.config.memory_initial_size),
            format_memory(handle.config.memory_maximum_size)
        );
    }
}

fn lifecycle_log(verbose: bool, message: &str) {
    if verbose {
        info!("{}", message);
    } else {
        debug!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::native::las_module::{LasModule, LasModuleFactory};
    use async_trait::async_trait;
    use constants::memory::MIB;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Counts instantiations and holds each one until released.
    struct GatedFactory {
        calls: AtomicUsize,
        gate: Notify,
        fail_first: bool,
    }

    impl GatedFactory {
        fn new(fail_first: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Notify::new(),
                fail_first,
            })
        }
    }

    #[async_trait]
    impl ModuleFactory for GatedFactory {
        async fn instantiate(
            &self,
            config: &ModuleConfig,
        ) -> std::result::Result<Arc<dyn NativeModule>, ModuleInitError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            if self.fail_first && call == 0 {
                return Err(ModuleInitError::Unavailable("factory missing".into()));
            }
            Ok(Arc::new(LasModule::new(config)))
        }
    }

    struct PanickingFactory;

    #[async_trait]
    impl ModuleFactory for PanickingFactory {
        async fn instantiate(
            &self,
            _config: &ModuleConfig,
        ) -> std::result::Result<Arc<dyn NativeModule>, ModuleInitError> {
            panic!("module abort");
        }
    }

    fn small() -> ModuleConfigOverrides {
        ModuleConfigOverrides {
            memory_initial_size: Some(MIB),
            memory_maximum_size: Some(4 * MIB),
            debug: Some(false),
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_initialisation() {
        let factory = GatedFactory::new(false);
        let lifecycle = NativeModuleLifecycle::new(factory.clone());
        let overrides = small();

        let (a, b, c, _) = tokio::join!(
            lifecycle.ensure_ready(&overrides),
            lifecycle.ensure_ready(&overrides),
            lifecycle.ensure_ready(&overrides),
            async {
                tokio::task::yield_now().await;
                factory.gate.notify_one();
            }
        );

        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert!(a.same_instance(&b));
        assert!(a.same_instance(&c));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);

        // Ready handles are cached forever.
        let again = lifecycle.ensure_ready(&overrides).await.unwrap();
        assert!(again.same_instance(&a));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_initialisation_is_not_cached() {
        let factory = GatedFactory::new(true);
        let lifecycle = NativeModuleLifecycle::new(factory.clone());

        factory.gate.notify_one();
        let err = lifecycle.ensure_ready(&small()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Initialization(_)));
        assert!(!lifecycle.is_initialized());
        assert!(lifecycle.handle().is_none());

        factory.gate.notify_one();
        lifecycle.ensure_ready(&small()).await.unwrap();
        assert!(lifecycle.is_initialized());
        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn factory_panic_surfaces_as_initialisation_error() {
        let lifecycle = NativeModuleLifecycle::new(Arc::new(PanickingFactory));
        let err = lifecycle.ensure_ready(&small()).await.unwrap_err();
        assert_eq!(
            err,
            PipelineError::Initialization(
                "native module aborted during instantiation: module abort".into()
            )
        );
        assert!(!lifecycle.is_initialized());
    }

    #[tokio::test]
    async fn explicit_config_beats_cached_and_resizing_later_is_ignored() {
        let lifecycle = NativeModuleLifecycle::new(Arc::new(LasModuleFactory)).with_config(
            ModuleConfigOverrides {
                memory_initial_size: Some(2 * MIB),
                memory_maximum_size: Some(8 * MIB),
                debug: None,
            },
        );

        let explicit = ModuleConfigOverrides {
            memory_maximum_size: Some(16 * MIB),
            ..Default::default()
        };
        let handle = lifecycle.ensure_ready(&explicit).await.unwrap();
        assert_eq!(handle.config().memory_initial_size, 2 * MIB);
        assert_eq!(handle.config().memory_maximum_size, 16 * MIB);

        lifecycle.set_config(&ModuleConfigOverrides {
            memory_maximum_size: Some(64 * MIB),
            ..Default::default()
        });
        let same = lifecycle.ensure_ready(&Default::default()).await.unwrap();
        assert!(same.same_instance(&handle));
        assert_eq!(same.config().memory_maximum_size, 16 * MIB);
    }

    #[tokio::test]
    async fn later_calls_can_switch_on_verbose_logging() {
        let lifecycle = NativeModuleLifecycle::new(Arc::new(LasModuleFactory));
        let handle = lifecycle.ensure_ready(&small()).await.unwrap();
        assert!(!lifecycle.inner.lock().debug_enabled());

        let verbose = ModuleConfigOverrides {
            debug: Some(true),
            ..Default::default()
        };
        let same = lifecycle.ensure_ready(&verbose).await.unwrap();
        assert!(same.same_instance(&handle));
        assert!(lifecycle.inner.lock().debug_enabled());
        assert_eq!(same.config().memory_maximum_size, 4 * MIB);
    }

    #[tokio::test]
    async fn handlers_reach_the_module_installed_before_or_after_ready() {
        let lifecycle = NativeModuleLifecycle::new(Arc::new(LasModuleFactory));
        let errors = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = errors.clone();
        lifecycle.set_error_handler(move |msg| sink.lock().push(msg.to_string()));

        let handle = lifecycle.ensure_ready(&small()).await.unwrap();
        handle.module().free(0x40);
        assert_eq!(errors.lock().len(), 1);

        let debug_lines = Arc::new(AtomicUsize::new(0));
        let counter = debug_lines.clone();
        lifecycle.set_debug_handler(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handle.module().free(0x48);
        assert_eq!(errors.lock().len(), 2);
    }
}
