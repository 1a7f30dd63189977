//! Composes the Registry/Config/Context/Surface/Buffer/Image primitives into
//! the five client-visible sequences (spec.md §4.6) and the capability-gated
//! query paths (spec.md §4.7), as methods on [`DriverInstance`]. This is the
//! module `shim.rs`'s vtable glue calls into — nothing here talks to the C
//! ABI directly.

use std::sync::Arc;

use nvd_common::{BitDepth, ChromaFormat, DriverError, DriverResult, Profile, SurfaceFormat, VaEntrypoint};
use nvd_cuvid::nvdec::ffi::{
    CudaVideoChromaFormat, CudaVideoCodec, CudaVideoCreateFlags, CudaVideoDeinterlaceMode, CudaVideoSurfaceFormat,
    CuvidDecodeCreateInfo,
};

use crate::caps::MaxPictureSize;
use crate::codecs::find_for_profile;
use crate::export::{ExportBackend, ExportDescriptor, SurfaceDescriptor, EXPORT_FLAG_SEPARATE_LAYERS, MEM_TYPE_DRM_PRIME_2};
use crate::registry::ObjectKind;

use super::buffer::{Buffer, Image, VaBufferKind};
use super::context::Context;
use super::decoder::{CuvidDecoder, StubDecoder, VendorDecoder};
use super::instance::DriverInstance;
use super::surface::Surface;
use super::Config;

/// Cap on `surfaceCount` (spec.md §4.6 S3 step 4): `renderTargets.count`,
/// or 32 when the caller passes none.
pub const MAX_SURFACE_COUNT: u32 = 32;

// RT-format attribute bits, matching libva's own `VA_RT_FORMAT_*` values
// (spec.md §4.7's `GetConfigAttributes`/`QueryConfigAttributes` RT-format
// bitmask).
pub const RT_FORMAT_YUV420: u32 = 0x0000_0001;
pub const RT_FORMAT_YUV444: u32 = 0x0000_0004;
pub const RT_FORMAT_YUV420_10: u32 = 0x0000_0100;
pub const RT_FORMAT_YUV444_10: u32 = 0x0000_0400;
pub const RT_FORMAT_YUV420_12: u32 = 0x0000_1000;
pub const RT_FORMAT_YUV444_12: u32 = 0x0000_4000;

const ALL_PROFILES: &[Profile] = &[
    Profile::Mpeg2Simple,
    Profile::Mpeg2Main,
    Profile::Mpeg4AdvancedSimple,
    Profile::Vc1Advanced,
    Profile::H264Baseline,
    Profile::H264Main,
    Profile::H264High,
    Profile::H264StereoHigh,
    Profile::H264MultiviewHigh,
    Profile::JpegBaseline,
    Profile::HevcMain,
    Profile::HevcMain10,
    Profile::HevcMain12,
    Profile::HevcMain444,
    Profile::HevcMain444_10,
    Profile::HevcMain444_12,
    Profile::Vp8Version0_3,
    Profile::Vp9Profile0,
    Profile::Vp9Profile1,
    Profile::Vp9Profile2,
    Profile::Vp9Profile3,
    Profile::Av1Profile0,
    Profile::Av1Profile1,
];

/// `QuerySurfaceAttributes`' reply shape: size bounds plus the image
/// formats satisfiable under the named Config (spec.md §4.7).
#[derive(Clone, Debug)]
pub struct SurfaceAttributes {
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub formats: Vec<SurfaceFormat>,
}

impl DriverInstance {
    /// `CreateConfig` (S1): reject profiles no codec translates and
    /// entrypoints other than VLD, then apply the RT-format override table.
    pub fn create_config(
        &self,
        profile: Profile,
        entrypoint: VaEntrypoint,
        requested_10bit: bool,
        requested_12bit: bool,
    ) -> DriverResult<u32> {
        if find_for_profile(profile).is_none() {
            return Err(DriverError::UnsupportedProfile);
        }
        if entrypoint != VaEntrypoint::Vld {
            return Err(DriverError::UnsupportedEntrypoint);
        }

        let mut config = Config::with_defaults(profile, entrypoint);
        config.apply_rt_format_override(
            requested_10bit,
            requested_12bit,
            self.caps.supports_16bit_surface(),
            self.caps.supports_444_surface(),
        );
        Ok(self.registry.allocate(ObjectKind::Config, config))
    }

    pub fn destroy_config(&self, config_id: u32) -> DriverResult<()> {
        self.registry
            .lookup::<Config>(config_id, ObjectKind::Config)
            .ok_or(DriverError::InvalidHandle("config"))?;
        self.registry.delete(config_id);
        Ok(())
    }

    /// `CreateSurfaces2` (S2): round width/height per `format`'s chroma
    /// subsampling, then allocate `num_surfaces` unbound Surfaces.
    pub fn create_surfaces2(&self, format: SurfaceFormat, width: u32, height: u32, num_surfaces: u32) -> DriverResult<Vec<u32>> {
        let (chroma, bit_depth) = chroma_and_bit_depth_for(format);
        let (width, height) = chroma.round_up(width, height);

        let mut ids = Vec::with_capacity(num_surfaces as usize);
        for _ in 0..num_surfaces {
            let surface = Surface::new(width, height, chroma, format, bit_depth);
            ids.push(self.registry.allocate(ObjectKind::Surface, surface));
        }
        Ok(ids)
    }

    /// Legacy `CreateSurfaces`: fixed NV12 4:2:0, forwarding to
    /// [`Self::create_surfaces2`].
    pub fn create_surfaces(&self, width: u32, height: u32, num_surfaces: u32) -> DriverResult<Vec<u32>> {
        self.create_surfaces2(SurfaceFormat::Nv12, width, height, num_surfaces)
    }

    pub fn destroy_surfaces(&self, surface_ids: &[u32]) -> DriverResult<()> {
        for &id in surface_ids {
            self.registry
                .lookup::<Surface>(id, ObjectKind::Surface)
                .ok_or(DriverError::InvalidHandle("surface"))?;
        }
        for &id in surface_ids {
            self.export.detach_backing_image(id);
            self.registry.delete(id);
        }
        Ok(())
    }

    /// `CreateContext` (S3): inherit the first render target's format into a
    /// local Config copy, resolve the codec, compute `surfaceCount`, round
    /// the requested dimensions, build the vendor decoder, and spawn the
    /// Context.
    pub fn create_context(&self, config_id: u32, width: u32, height: u32, render_targets: &[u32]) -> DriverResult<u32> {
        let stored_config = self
            .registry
            .lookup::<Config>(config_id, ObjectKind::Config)
            .ok_or(DriverError::InvalidHandle("config"))?;
        let mut config = (*stored_config).clone();

        let mut target_surfaces = Vec::with_capacity(render_targets.len());
        for &id in render_targets {
            let surface = self
                .registry
                .lookup::<Surface>(id, ObjectKind::Surface)
                .ok_or(DriverError::InvalidHandle("surface"))?;
            target_surfaces.push(surface);
        }
        if let Some(first) = target_surfaces.first() {
            config.chroma = first.chroma;
            config.surface_format = first.format;
            config.bit_depth = first.bit_depth;
        }

        let codec = find_for_profile(config.profile).ok_or(DriverError::UnsupportedProfile)?;
        let surface_count = if target_surfaces.is_empty() {
            MAX_SURFACE_COUNT
        } else {
            (target_surfaces.len() as u32).min(MAX_SURFACE_COUNT)
        };
        let (width, height) = config.chroma.round_up(width, height);

        let decoder: Arc<dyn VendorDecoder> = match &self.nvcuvid {
            Some(lib) => {
                let info = build_create_info(&config, width, height, surface_count)?;
                Arc::new(CuvidDecoder::create(lib.clone(), info)?)
            }
            None => Arc::new(StubDecoder::default()),
        };

        let context = Context::new(codec, decoder, self.export.clone(), width, height, surface_count)?;
        Ok(self.registry.allocate_arc(ObjectKind::Context, context))
    }

    pub fn destroy_context(&self, context_id: u32) -> DriverResult<()> {
        let context = self
            .registry
            .lookup::<Context>(context_id, ObjectKind::Context)
            .ok_or(DriverError::InvalidHandle("context"))?;
        context.destroy();
        self.registry.delete(context_id);
        Ok(())
    }

    /// `BeginPicture` (S4 step 0: resolve handles, then delegate).
    pub fn begin_picture(&self, context_id: u32, target_id: u32) -> DriverResult<()> {
        let context = self
            .registry
            .lookup::<Context>(context_id, ObjectKind::Context)
            .ok_or(DriverError::InvalidHandle("context"))?;
        let target = self
            .registry
            .lookup::<Surface>(target_id, ObjectKind::Surface)
            .ok_or(DriverError::InvalidHandle("surface"))?;
        context.begin_picture(target_id, target)
    }

    /// `RenderPicture`: resolve each buffer handle, then delegate.
    pub fn render_picture(&self, context_id: u32, buffer_ids: &[u32]) -> DriverResult<()> {
        let context = self
            .registry
            .lookup::<Context>(context_id, ObjectKind::Context)
            .ok_or(DriverError::InvalidHandle("context"))?;

        let mut buffers = Vec::with_capacity(buffer_ids.len());
        for &id in buffer_ids {
            let buffer = self
                .registry
                .lookup::<Buffer>(id, ObjectKind::Buffer)
                .ok_or(DriverError::InvalidHandle("buffer"))?;
            buffers.push(buffer);
        }
        context.render_picture(&buffers)
    }

    pub fn end_picture(&self, context_id: u32) -> DriverResult<()> {
        let context = self
            .registry
            .lookup::<Context>(context_id, ObjectKind::Context)
            .ok_or(DriverError::InvalidHandle("context"))?;
        context.end_picture()
    }

    pub fn sync_surface(&self, surface_id: u32) -> DriverResult<()> {
        let surface = self
            .registry
            .lookup::<Surface>(surface_id, ObjectKind::Surface)
            .ok_or(DriverError::InvalidHandle("surface"))?;
        surface.sync();
        Ok(())
    }

    pub fn create_buffer(&self, kind: VaBufferKind, data: Vec<u8>, unalignment_offset: usize) -> DriverResult<u32> {
        let buffer = Buffer::new(kind, data, unalignment_offset);
        Ok(self.registry.allocate(ObjectKind::Buffer, buffer))
    }

    pub fn destroy_buffer(&self, buffer_id: u32) -> DriverResult<()> {
        self.registry
            .lookup::<Buffer>(buffer_id, ObjectKind::Buffer)
            .ok_or(DriverError::InvalidHandle("buffer"))?;
        self.registry.delete(buffer_id);
        Ok(())
    }

    /// `CreateImage` (spec.md §4.2): allocates a zeroed Buffer sized for
    /// `width x height` at `format`, then an Image wrapping the same `Arc`.
    pub fn create_image(&self, format: SurfaceFormat, width: u32, height: u32) -> DriverResult<u32> {
        let size = width as usize * height as usize * format.plane_count() as usize;
        let buffer = Arc::new(Buffer::new(VaBufferKind::Image, vec![0u8; size], 0));
        self.registry.allocate_arc(ObjectKind::Buffer, buffer.clone());
        let image = Image { buffer, width, height, format };
        Ok(self.registry.allocate(ObjectKind::Image, image))
    }

    /// `DestroyImage` (spec.md §4.2): recover the owning Buffer's id via
    /// `lookupByInnerPointer` against the Image's own `Arc`, then destroy
    /// both.
    pub fn destroy_image(&self, image_id: u32) -> DriverResult<()> {
        let image = self
            .registry
            .lookup::<Image>(image_id, ObjectKind::Image)
            .ok_or(DriverError::InvalidHandle("image"))?;
        if let Some(buffer_id) = self.registry.lookup_by_inner_pointer(Arc::as_ptr(&image.buffer)) {
            self.registry.delete(buffer_id);
        }
        self.registry.delete(image_id);
        Ok(())
    }

    /// `QueryConfigProfiles` (spec.md §4.7): every profile a codec
    /// translates, gated by the capability flags its bit depth/chroma need.
    pub fn query_config_profiles(&self) -> Vec<Profile> {
        ALL_PROFILES
            .iter()
            .copied()
            .filter(|&profile| {
                find_for_profile(profile).is_some()
                    && (!profile.requires_16bit() || self.caps.supports_16bit_surface())
                    && (!profile.requires_444() || self.caps.supports_444_surface())
            })
            .collect()
    }

    /// `QueryConfigEntrypoints`: this driver only ever advertises VLD, and
    /// only for profiles a codec translates.
    pub fn query_config_entrypoints(&self, profile: Profile) -> Vec<VaEntrypoint> {
        if find_for_profile(profile).is_some() {
            vec![VaEntrypoint::Vld]
        } else {
            Vec::new()
        }
    }

    /// `GetConfigAttributes`/`QueryConfigAttributes`' RT-format bitmask,
    /// independent of any already-created Config.
    pub fn config_rt_format_attribute(&self) -> u32 {
        let mut mask = RT_FORMAT_YUV420;
        let supports_16bit = self.caps.supports_16bit_surface();
        if supports_16bit {
            mask |= RT_FORMAT_YUV420_10 | RT_FORMAT_YUV420_12;
        }
        if self.caps.supports_444_surface() {
            mask |= RT_FORMAT_YUV444;
            if supports_16bit {
                mask |= RT_FORMAT_YUV444_10 | RT_FORMAT_YUV444_12;
            }
        }
        mask
    }

    /// `QueryImageFormats` (spec.md §6's fixed pixel-format table), gated by
    /// capability flags the same way the RT-format attribute is.
    pub fn query_image_formats(&self) -> Vec<SurfaceFormat> {
        let mut formats = vec![SurfaceFormat::Nv12];
        if self.caps.supports_16bit_surface() {
            formats.push(SurfaceFormat::P010);
            formats.push(SurfaceFormat::P012);
            formats.push(SurfaceFormat::P016);
        }
        if self.caps.supports_444_surface() {
            formats.push(SurfaceFormat::Yuv444);
            if self.caps.supports_16bit_surface() {
                formats.push(SurfaceFormat::Yuv444_16Bit);
            }
        }
        formats
    }

    /// `QuerySurfaceAttributes`: the device's max picture size for the named
    /// Config's `(codec, bitDepth, chroma)` triple, plus the satisfiable
    /// image formats.
    pub fn query_surface_attributes(&self, config_id: u32) -> DriverResult<SurfaceAttributes> {
        let config = self
            .registry
            .lookup::<Config>(config_id, ObjectKind::Config)
            .ok_or(DriverError::InvalidHandle("config"))?;
        let max = self
            .caps
            .query(config.codec, config.bit_depth, config.chroma)
            .unwrap_or(MaxPictureSize { width: 0, height: 0 });
        Ok(SurfaceAttributes {
            min_width: 32,
            min_height: 32,
            max_width: max.width,
            max_height: max.height,
            formats: self.query_image_formats(),
        })
    }

    /// `ExportSurfaceHandle` (spec.md §4.5/§4.6 scenario 5): requires
    /// `DRM_PRIME_2`/`SEPARATE_LAYERS` up front, then realises and describes
    /// the backing image.
    pub fn export_surface_handle(&self, surface_id: u32, mem_type: u32, flags: u32) -> DriverResult<ExportDescriptor> {
        if mem_type & MEM_TYPE_DRM_PRIME_2 == 0 {
            return Err(DriverError::UnsupportedMemoryType);
        }
        if flags & EXPORT_FLAG_SEPARATE_LAYERS == 0 {
            return Err(DriverError::InvalidSurface);
        }
        let surface = self
            .registry
            .lookup::<Surface>(surface_id, ObjectKind::Surface)
            .ok_or(DriverError::InvalidHandle("surface"))?;
        self.export.realise_surface(
            surface_id,
            SurfaceDescriptor { width: surface.width, height: surface.height, format: surface.format },
        )?;
        self.export.fill_export_descriptor(surface_id, mem_type, flags)
    }
}

/// `P016`/`Yuv444_16Bit` each carry both the 10- and 12-bit cases (the same
/// ambiguity `Config::apply_rt_format_override` already has) — newly created
/// Surfaces default the 16-bit case to Ten, matching the override table's
/// more common path; callers that actually need Twelve get it from the
/// render-target inheritance in `create_context`, not from this default.
fn chroma_and_bit_depth_for(format: SurfaceFormat) -> (ChromaFormat, BitDepth) {
    match format {
        SurfaceFormat::Nv12 => (ChromaFormat::Yuv420, BitDepth::Eight),
        SurfaceFormat::P010 => (ChromaFormat::Yuv420, BitDepth::Ten),
        SurfaceFormat::P012 => (ChromaFormat::Yuv420, BitDepth::Twelve),
        SurfaceFormat::P016 => (ChromaFormat::Yuv420, BitDepth::Ten),
        SurfaceFormat::Yuv444 => (ChromaFormat::Yuv444, BitDepth::Eight),
        SurfaceFormat::Yuv444_16Bit => (ChromaFormat::Yuv444, BitDepth::Ten),
    }
}

/// S3 step 5: the vendor decoder creation parameters. Coded/target
/// dimensions share the rounded width/height; one output surface, weave
/// deinterlace, `surface_count` decode surfaces — per spec.md §4.6.
fn build_create_info(config: &Config, width: u32, height: u32, surface_count: u32) -> DriverResult<CuvidDecodeCreateInfo> {
    let codec_type = CudaVideoCodec::from_common(config.codec).ok_or(DriverError::UnsupportedProfile)?;
    let chroma_format = cuvid_chroma(config.chroma);
    let output_format = cuvid_surface_format(chroma_format, config.bit_depth);
    let bit_depth_minus8 = match config.bit_depth {
        BitDepth::Eight => 0,
        BitDepth::Ten => 2,
        BitDepth::Twelve => 4,
    };
    let clamp = |v: u32| -> i16 { v.min(i16::MAX as u32) as i16 };

    Ok(CuvidDecodeCreateInfo {
        coded_width: width,
        coded_height: height,
        num_decode_surfaces: surface_count,
        codec_type,
        chroma_format,
        creation_flags: CudaVideoCreateFlags::Default as u32,
        bit_depth_minus8,
        intra_decode_only: 0,
        max_width: width,
        max_height: height,
        reserved1: 0,
        display_left: 0,
        display_top: 0,
        display_right: clamp(width),
        display_bottom: clamp(height),
        output_format,
        deinterlace_mode: CudaVideoDeinterlaceMode::Weave,
        target_width: width,
        target_height: height,
        num_output_surfaces: 1,
        vidlock: std::ptr::null_mut(),
        target_rect_left: 0,
        target_rect_top: 0,
        target_rect_right: clamp(width),
        target_rect_bottom: clamp(height),
        reserved2: [0; 5],
    })
}

fn cuvid_chroma(chroma: ChromaFormat) -> CudaVideoChromaFormat {
    match chroma {
        ChromaFormat::Yuv420 => CudaVideoChromaFormat::Yuv420,
        ChromaFormat::Yuv422 => CudaVideoChromaFormat::Yuv422,
        ChromaFormat::Yuv444 => CudaVideoChromaFormat::Yuv444,
    }
}

/// Mirrors `nvd_cuvid::nvdec::session::select_output_format`'s bit-depth
/// gate, generalized from `bitDepthLumaMinus8` to `BitDepth` for the
/// Begin/Render/EndPicture path (which has no parser-reported sequence
/// format to read it from).
fn cuvid_surface_format(chroma: CudaVideoChromaFormat, bit_depth: BitDepth) -> CudaVideoSurfaceFormat {
    let is_444 = matches!(chroma, CudaVideoChromaFormat::Yuv444);
    match (is_444, bit_depth) {
        (false, BitDepth::Eight) => CudaVideoSurfaceFormat::Nv12,
        (false, _) => CudaVideoSurfaceFormat::P016,
        (true, BitDepth::Eight) => CudaVideoSurfaceFormat::Yuv444,
        (true, _) => CudaVideoSurfaceFormat::Yuv444_16bit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::StubProbe;
    use nvd_common::{DriverConfig, ExportBackendKind, LogTarget};

    /// `LIVE_INSTANCES` is process-wide; serialize tests that construct a
    /// `DriverInstance`.
    static TEST_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

    fn instance() -> DriverInstance {
        let config = DriverConfig {
            log_target: LogTarget::Disabled,
            gpu_index: -1,
            max_instances: 0,
            backend: ExportBackendKind::Direct,
            force_init: false,
        };
        DriverInstance::new(config, Arc::new(StubProbe::default())).unwrap()
    }

    #[test]
    fn create_config_rejects_unknown_profile_or_entrypoint() {
        let _guard = TEST_LOCK.lock();
        let inst = instance();
        assert!(matches!(
            inst.create_config(Profile::HevcMain, VaEntrypoint::EncSlice, false, false),
            Err(DriverError::UnsupportedEntrypoint)
        ));
    }

    #[test]
    fn full_pipeline_round_trip_through_driver_instance() {
        let _guard = TEST_LOCK.lock();
        let inst = instance();

        let config_id = inst.create_config(Profile::H264High, VaEntrypoint::Vld, false, false).unwrap();
        let surface_ids = inst.create_surfaces2(SurfaceFormat::Nv12, 1921, 1079, 2).unwrap();
        let context_id = inst.create_context(config_id, 1921, 1079, &surface_ids).unwrap();

        let buf_id = inst.create_buffer(VaBufferKind::SliceData, vec![1, 2, 3, 4], 0).unwrap();
        inst.begin_picture(context_id, surface_ids[0]).unwrap();
        inst.render_picture(context_id, &[buf_id]).unwrap();
        inst.end_picture(context_id).unwrap();
        inst.sync_surface(surface_ids[0]).unwrap();

        inst.destroy_context(context_id).unwrap();
        inst.destroy_surfaces(&surface_ids).unwrap();
        inst.destroy_config(config_id).unwrap();
    }

    #[test]
    fn create_surfaces2_rounds_dimensions_for_420() {
        let _guard = TEST_LOCK.lock();
        let inst = instance();
        let ids = inst.create_surfaces2(SurfaceFormat::Nv12, 1919, 1079, 1).unwrap();
        let surface = inst.registry.lookup::<Surface>(ids[0], ObjectKind::Surface).unwrap();
        assert_eq!((surface.width, surface.height), (1920, 1080));
    }

    #[test]
    fn destroy_image_also_frees_its_backing_buffer() {
        let _guard = TEST_LOCK.lock();
        let inst = instance();
        let image_id = inst.create_image(SurfaceFormat::Nv12, 64, 64).unwrap();
        let image = inst.registry.lookup::<Image>(image_id, ObjectKind::Image).unwrap();
        let buffer_id = inst.registry.lookup_by_inner_pointer(Arc::as_ptr(&image.buffer)).unwrap();

        inst.destroy_image(image_id).unwrap();

        assert!(inst.registry.lookup::<Image>(image_id, ObjectKind::Image).is_none());
        assert!(inst.registry.lookup::<Buffer>(buffer_id, ObjectKind::Buffer).is_none());
    }

    #[test]
    fn query_config_profiles_excludes_16bit_when_unsupported() {
        let _guard = TEST_LOCK.lock();
        let config = DriverConfig {
            log_target: LogTarget::Disabled,
            gpu_index: -1,
            max_instances: 0,
            backend: ExportBackendKind::Direct,
            force_init: false,
        };
        let probe = StubProbe { supports_16bit: false, supports_444: true, max_size: MaxPictureSize { width: 4096, height: 4096 } };
        let inst = DriverInstance::new(config, Arc::new(probe)).unwrap();

        let profiles = inst.query_config_profiles();
        assert!(!profiles.contains(&Profile::HevcMain10));
        assert!(profiles.contains(&Profile::HevcMain));
    }

    #[test]
    fn export_surface_handle_requires_drm_prime_and_separate_layers() {
        let _guard = TEST_LOCK.lock();
        let inst = instance();
        let ids = inst.create_surfaces2(SurfaceFormat::Nv12, 64, 64, 1).unwrap();
        assert!(matches!(
            inst.export_surface_handle(ids[0], 0, EXPORT_FLAG_SEPARATE_LAYERS),
            Err(DriverError::UnsupportedMemoryType)
        ));
        let desc = inst.export_surface_handle(ids[0], MEM_TYPE_DRM_PRIME_2, EXPORT_FLAG_SEPARATE_LAYERS).unwrap();
        assert_eq!(desc.width, 64);
    }
}
