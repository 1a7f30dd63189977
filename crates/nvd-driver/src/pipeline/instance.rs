use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use nvd_common::{DriverConfig, DriverError, DriverResult, ExportBackendKind};

use crate::caps::CapabilityProbe;
use crate::export::{direct::DirectBackend, egl::EglBackend, ExportBackend};
use crate::registry::Registry;

use super::device::DeviceContext;

/// Process-wide count of live Driver Instances, checked against
/// `DriverConfig::max_instances` at init (spec.md §5 "Concurrency limit").
static LIVE_INSTANCES: AtomicU32 = AtomicU32::new(0);

/// Serializes the check-then-increment of [`LIVE_INSTANCES`] against the
/// configured maximum so two racing inits can't both pass the check.
static CONCURRENCY_MUTEX: Mutex<()> = Mutex::new(());

/// Process-local driver state for one client connection (spec.md §3): the
/// device context, the object registry, the export backend selector, and
/// the capability flags used to gate advertised profiles.
pub struct DriverInstance {
    pub registry: Registry,
    pub caps: Arc<dyn CapabilityProbe>,
    pub export: Arc<dyn ExportBackend>,
    pub config: DriverConfig,
    /// `None` when no CUDA-capable device could be opened (headless CI,
    /// sandboxed build, or a test run) — the driver still functions against
    /// the [`StubProbe`](crate::caps::StubProbe)/stub decoder path.
    pub device: Option<DeviceContext>,
    /// The loaded CUVID entry points, shared by every `Context` this
    /// instance creates. `None` falls back to `StubDecoder` at
    /// `CreateContext` (headless CI, sandboxed build, or a test run).
    pub nvcuvid: Option<Arc<nvd_cuvid::NvcuvidLibrary>>,
}

impl DriverInstance {
    /// Checks the process-wide instance cap, then builds a new instance.
    /// Returns `HW_BUSY` without incrementing the counter when the cap is
    /// already at `max_instances` (0 = unbounded).
    pub fn new(config: DriverConfig, caps: Arc<dyn CapabilityProbe>) -> DriverResult<Self> {
        {
            let _guard = CONCURRENCY_MUTEX.lock();
            if config.max_instances > 0 && LIVE_INSTANCES.load(Ordering::SeqCst) >= config.max_instances {
                return Err(DriverError::HwBusy);
            }
            LIVE_INSTANCES.fetch_add(1, Ordering::SeqCst);
        }

        let export: Arc<dyn ExportBackend> = match config.backend {
            ExportBackendKind::Direct => Arc::new(DirectBackend::new()),
            ExportBackendKind::Egl => Arc::new(EglBackend::new()),
        };
        export.init_exporter()?;

        let device = match DeviceContext::open(config.gpu_index) {
            Ok(dev) => {
                tracing::info!(gpu = %dev.name(), "opened CUDA device context");
                Some(dev)
            }
            Err(e) => {
                tracing::warn!(error = %e, "no CUDA device available, continuing without one");
                None
            }
        };

        let nvcuvid = match nvd_cuvid::NvcuvidLibrary::load() {
            Ok(lib) => Some(Arc::new(lib)),
            Err(e) => {
                tracing::debug!(error = %e, "nvcuvid not loadable, contexts will use the stub decoder");
                None
            }
        };

        Ok(Self { registry: Registry::new(), caps, export, config, device, nvcuvid })
    }

    /// Always decrements the live-instance counter, even on a partially
    /// failed init, matching spec.md §5's "at terminate, always decrement".
    pub fn shutdown(&self) {
        use crate::registry::ObjectKind;

        let context_ids = self.registry.delete_all_matching(ObjectKind::Context);
        tracing::debug!(count = context_ids.len(), "tore down contexts at shutdown");

        self.export.destroy_all_backing_images();
        self.export.release_exporter();

        LIVE_INSTANCES.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for DriverInstance {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::StubProbe;
    use nvd_common::LogTarget;

    /// `LIVE_INSTANCES` is process-wide; serialize the tests that observe it
    /// so they can't interleave with each other's increments/decrements.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn config() -> DriverConfig {
        DriverConfig {
            log_target: LogTarget::Disabled,
            gpu_index: -1,
            max_instances: 0,
            backend: ExportBackendKind::Direct,
            force_init: false,
        }
    }

    #[test]
    fn unbounded_by_default() {
        let _guard = TEST_LOCK.lock();
        let a = DriverInstance::new(config(), Arc::new(StubProbe::default())).unwrap();
        let b = DriverInstance::new(config(), Arc::new(StubProbe::default())).unwrap();
        drop(a);
        drop(b);
    }

    #[test]
    fn instance_cap_rejects_beyond_max() {
        let _guard = TEST_LOCK.lock();
        let mut cfg = config();
        cfg.max_instances = 1;
        let _first = DriverInstance::new(cfg.clone(), Arc::new(StubProbe::default())).unwrap();
        assert!(matches!(
            DriverInstance::new(cfg, Arc::new(StubProbe::default())),
            Err(DriverError::HwBusy)
        ));
    }
}
