//! EGL/GL interop export backend, selected via `NVD_BACKEND=egl`.
//!
//! No EGL context management is implemented here — wiring a real
//! `EGL_EXT_image_dma_buf_import`/`cuGraphicsGLRegisterImage` path requires
//! an EGL display the driver doesn't own in this crate's scope. The backend
//! is kept as a distinct, honestly-unimplemented selector rather than
//! silently falling back to `DirectBackend`, so picking `egl` surfaces the
//! gap instead of masking it.

use nvd_common::{DriverError, DriverResult};

use super::{DecodedPicture, ExportBackend, ExportDescriptor, SurfaceDescriptor};

/// EGL backend stub. Every operation beyond `init_exporter` returns
/// `DriverError::Unimplemented`.
#[derive(Default)]
pub struct EglBackend;

impl EglBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ExportBackend for EglBackend {
    fn init_exporter(&self) -> DriverResult<()> {
        tracing::warn!("EGL export backend selected — surface export is unimplemented");
        Ok(())
    }

    fn realise_surface(&self, _surface_id: u32, _desc: SurfaceDescriptor) -> DriverResult<()> {
        Err(DriverError::Unimplemented)
    }

    fn export_cuda_ptr(&self, _surface_id: u32, _picture: DecodedPicture) -> DriverResult<()> {
        Err(DriverError::Unimplemented)
    }

    fn fill_export_descriptor(
        &self,
        _surface_id: u32,
        _mem_type: u32,
        _flags: u32,
    ) -> DriverResult<ExportDescriptor> {
        Err(DriverError::Unimplemented)
    }

    fn detach_backing_image(&self, _surface_id: u32) {}

    fn destroy_all_backing_images(&self) {}

    fn release_exporter(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_surface_operation_is_unimplemented() {
        let backend = EglBackend::new();
        assert!(backend.init_exporter().is_ok());
        assert!(matches!(
            backend.realise_surface(1, SurfaceDescriptor {
                width: 64,
                height: 64,
                format: nvd_common::SurfaceFormat::Nv12,
            }),
            Err(DriverError::Unimplemented)
        ));
    }
}
