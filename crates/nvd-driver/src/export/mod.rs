//! Surface export backend: turns a decoded picture's device memory into an
//! externally exportable GPU surface described as DMA-BUF planes.
//!
//! Two implementations share one interface, selected at driver init from
//! [`nvd_common::ExportBackendKind`]: [`direct::DirectBackend`] (DMA-BUF via
//! DRM PRIME, grounded on the VA-API DRM-PRIME export path) and
//! [`egl::EglBackend`] (an EGL/GL interop stub for the `egl` backend
//! configuration).

pub mod direct;
pub mod egl;

use nvd_common::{DriverResult, SurfaceFormat};

/// One plane of an exported DMA-BUF surface.
#[derive(Clone, Debug)]
pub struct PlaneDescriptor {
    pub fd: i32,
    pub offset: u32,
    pub pitch: u32,
    pub modifier: u64,
}

/// The DMA-PRIME-v2 separate-layer descriptor `ExportSurfaceHandle` writes
/// on success: one layer per plane, each a single-object DRM PRIME layer.
#[derive(Clone, Debug)]
pub struct ExportDescriptor {
    pub fourcc: u32,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<PlaneDescriptor>,
}

impl ExportDescriptor {
    pub fn num_layers(&self) -> usize {
        self.planes.len()
    }
}

/// A decoded picture's device memory, handed to the backend by the resolve
/// thread after `cuvidMapVideoFrame64`.
#[derive(Copy, Clone, Debug)]
pub struct DecodedPicture {
    pub device_ptr: u64,
    pub pitch: u32,
}

/// Minimal surface shape the backend needs — deliberately independent of
/// `pipeline::Surface` so this module has no upward dependency on the
/// pipeline module.
#[derive(Copy, Clone, Debug)]
pub struct SurfaceDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: SurfaceFormat,
}

/// Required export gating: callers must request `DRM_PRIME_2` memory type
/// and `SEPARATE_LAYERS` layout flags (spec.md §4.5/§4.6 scenario 5).
pub const MEM_TYPE_DRM_PRIME_2: u32 = 0x4000_0000;
pub const EXPORT_FLAG_SEPARATE_LAYERS: u32 = 0x0000_0004;

/// The seven operations the core decode pipeline needs from an export
/// backend, independent of whether it is backed by DRM PRIME or EGL
/// interop.
pub trait ExportBackend: Send + Sync {
    /// One-shot setup; may open DRM nodes, initialize interop. Idempotent.
    fn init_exporter(&self) -> DriverResult<()>;

    /// Ensures a backing image exists for `surface` at its declared
    /// format/size. Idempotent — calling twice on an already-realised
    /// surface id is a no-op success.
    fn realise_surface(&self, surface_id: u32, desc: SurfaceDescriptor) -> DriverResult<()>;

    /// Copies (or re-references) one decoded picture out of the decoder
    /// into the surface's backing image. Called from the resolve thread.
    fn export_cuda_ptr(&self, surface_id: u32, picture: DecodedPicture) -> DriverResult<()>;

    /// Populates the DMA-PRIME export descriptor for an already-realised
    /// surface, gated on `mem_type`/`flags` per [`MEM_TYPE_DRM_PRIME_2`] /
    /// [`EXPORT_FLAG_SEPARATE_LAYERS`].
    fn fill_export_descriptor(
        &self,
        surface_id: u32,
        mem_type: u32,
        flags: u32,
    ) -> DriverResult<ExportDescriptor>;

    /// Releases the backing image; the surface becomes re-realisable.
    fn detach_backing_image(&self, surface_id: u32);

    /// Releases every backing image this backend holds.
    fn destroy_all_backing_images(&self);

    /// Full teardown, called once at driver shutdown.
    fn release_exporter(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_descriptor_layer_count_matches_plane_count() {
        let desc = ExportDescriptor {
            fourcc: 0x3231564E,
            width: 1920,
            height: 1080,
            planes: vec![
                PlaneDescriptor { fd: 3, offset: 0, pitch: 1920, modifier: 0 },
                PlaneDescriptor { fd: 3, offset: 1920 * 1080, pitch: 1920, modifier: 0 },
            ],
        };
        assert_eq!(desc.num_layers(), 2);
    }
}
