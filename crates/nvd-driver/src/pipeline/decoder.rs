//! The vendor decoder handle a Context owns. Unlike `nvd_cuvid::nvdec::
//! session::NvDecSession` (which drives the CUVID parser callback flow for
//! self-demuxed playback), a VA-API Context is handed already-demuxed
//! picture parameters and slice data by the client one picture at a time —
//! so this talks to `cuvidCreateDecoder`/`cuvidDecodePicture`/
//! `cuvidMapVideoFrame64` directly, with no parser in the loop.

use std::sync::Arc;

use nvd_common::DriverResult;
use nvd_cuvid::nvdec::ffi::{CuvidDecodeCreateInfo, CuvidPicParams};

/// One mapped decoded frame: device pointer and row pitch, as returned by
/// `cuvidMapVideoFrame64`. The caller must unmap it via the same handle.
#[derive(Copy, Clone, Debug)]
pub struct MappedFrame {
    pub device_ptr: u64,
    pub pitch: u32,
}

/// The decoder operations a Context needs. Implemented once against the
/// real loaded CUVID library ([`CuvidDecoder`]) and once as a fixed-answer
/// stub ([`StubDecoder`]) for hardware-free tests.
pub trait VendorDecoder: Send + Sync {
    fn decode_picture(&self, params: &mut CuvidPicParams) -> DriverResult<()>;
    fn map_video_frame(&self, picture_idx: i32) -> DriverResult<MappedFrame>;
    fn unmap_video_frame(&self, frame: MappedFrame);
}

/// Real decoder backed by a loaded `libnvcuvid`.
pub struct CuvidDecoder {
    lib: Arc<nvd_cuvid::NvcuvidLibrary>,
    handle: nvd_cuvid::nvdec::ffi::CUvideodecoder,
}

impl CuvidDecoder {
    /// S3 step 5: create the vendor decoder with decode/target dimensions,
    /// codec, chroma, output format, `bitDepth - 8`, weave deinterlace, one
    /// output surface, and `num_decode_surfaces` decode surfaces.
    pub fn create(
        lib: Arc<nvd_cuvid::NvcuvidLibrary>,
        mut info: CuvidDecodeCreateInfo,
    ) -> DriverResult<Self> {
        let mut handle: nvd_cuvid::nvdec::ffi::CUvideodecoder = std::ptr::null_mut();
        // SAFETY: `info` is a fully initialized, repr(C) POD struct; `handle`
        // is an out-parameter the vendor library writes through.
        let result = unsafe { (lib.cuvidCreateDecoder)(&mut handle, &mut info) };
        nvd_cuvid::nvdec::ffi::check_cuvid_result(result, "cuvidCreateDecoder")
            .map_err(nvd_common::DriverError::OperationFailed)?;
        Ok(Self { lib, handle })
    }
}

impl VendorDecoder for CuvidDecoder {
    fn decode_picture(&self, params: &mut CuvidPicParams) -> DriverResult<()> {
        // SAFETY: `handle` was created by `cuvidCreateDecoder` and is owned
        // by `self`; `params` is a valid repr(C) struct for the call's
        // duration.
        let result = unsafe { (self.lib.cuvidDecodePicture)(self.handle, params) };
        nvd_cuvid::nvdec::ffi::check_cuvid_result(result, "cuvidDecodePicture")
            .map_err(nvd_common::DriverError::DecodingError)
    }

    fn map_video_frame(&self, picture_idx: i32) -> DriverResult<MappedFrame> {
        let mut dev_ptr: nvd_cuvid::nvdec::ffi::CUdeviceptr = 0;
        let mut pitch: u32 = 0;
        let mut proc_params = nvd_cuvid::nvdec::ffi::CuvidProcParams::default();
        // SAFETY: `handle` is owned by `self`; out-parameters are valid for
        // the call's duration.
        let result = unsafe {
            (self.lib.cuvidMapVideoFrame64)(self.handle, picture_idx, &mut dev_ptr, &mut pitch, &mut proc_params)
        };
        nvd_cuvid::nvdec::ffi::check_cuvid_result(result, "cuvidMapVideoFrame64")
            .map_err(nvd_common::DriverError::OperationFailed)?;
        Ok(MappedFrame { device_ptr: dev_ptr, pitch })
    }

    fn unmap_video_frame(&self, frame: MappedFrame) {
        // SAFETY: `frame.device_ptr` came from a prior, still-valid
        // `cuvidMapVideoFrame64` call on this same decoder handle.
        let result = unsafe { (self.lib.cuvidUnmapVideoFrame64)(self.handle, frame.device_ptr) };
        if let Err(e) = nvd_cuvid::nvdec::ffi::check_cuvid_result(result, "cuvidUnmapVideoFrame64") {
            tracing::warn!(error = %e, "cuvidUnmapVideoFrame64 failed");
        }
    }
}

impl Drop for CuvidDecoder {
    fn drop(&mut self) {
        // SAFETY: `handle` is owned exclusively by `self` and not used after
        // this call.
        let result = unsafe { (self.lib.cuvidDestroyDecoder)(self.handle) };
        if let Err(e) = nvd_cuvid::nvdec::ffi::check_cuvid_result(result, "cuvidDestroyDecoder") {
            tracing::warn!(error = %e, "cuvidDestroyDecoder failed during Context teardown");
        }
    }
}

// SAFETY: the vendor handle is only ever touched through the library's
// thread-safe entry points, guarded by the Context's own serialization.
unsafe impl Send for CuvidDecoder {}
unsafe impl Sync for CuvidDecoder {}

/// Fixed-answer decoder for hardware-free tests: every `decode_picture`
/// succeeds, every `map_video_frame` returns a synthetic, distinguishable
/// device pointer.
#[derive(Default)]
pub struct StubDecoder {
    pub fail_decode: std::sync::atomic::AtomicBool,
}

impl VendorDecoder for StubDecoder {
    fn decode_picture(&self, _params: &mut CuvidPicParams) -> DriverResult<()> {
        if self.fail_decode.load(std::sync::atomic::Ordering::SeqCst) {
            Err(nvd_common::DriverError::DecodingError("stub decode failure".into()))
        } else {
            Ok(())
        }
    }

    fn map_video_frame(&self, picture_idx: i32) -> DriverResult<MappedFrame> {
        Ok(MappedFrame { device_ptr: 0x1000 + picture_idx as u64, pitch: 1920 })
    }

    fn unmap_video_frame(&self, _frame: MappedFrame) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_decoder_maps_distinguishable_pointers() {
        let dec = StubDecoder::default();
        let a = dec.map_video_frame(0).unwrap();
        let b = dec.map_video_frame(1).unwrap();
        assert_ne!(a.device_ptr, b.device_ptr);
    }

    #[test]
    fn stub_decoder_can_be_forced_to_fail() {
        let dec = StubDecoder::default();
        dec.fail_decode.store(true, std::sync::atomic::Ordering::SeqCst);
        let mut params = CuvidPicParams::default();
        assert!(dec.decode_picture(&mut params).is_err());
    }
}
