//! NVENC encode side-branch.
//!
//! This mirrors the shape of the decode session (load the vendor library,
//! open a session keyed on a codec and a target resolution) but is an
//! explicit stub: it accepts configuration the same way the decode path
//! does, then refuses image submission with a clearly logged error rather
//! than silently returning a zero device pointer. There is no decode-quality
//! contract on this branch.

use std::ffi::c_void;

use libloading::Library;
use tracing::{info, warn};

use nvd_common::{DriverError, DriverResult, VideoCodec};

/// GUIDs identifying an NVENC codec, laid out the way `NV_ENC_CODEC_*_GUID`
/// is in the Video Codec SDK headers.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NvEncGuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

pub const NV_ENC_CODEC_H264_GUID: NvEncGuid = NvEncGuid {
    data1: 0x6bc8_2762,
    data2: 0x4e63,
    data3: 0x4ca4,
    data4: [0xaa, 0x85, 0x1e, 0x50, 0xf3, 0x21, 0xf6, 0xbf],
};

pub const NV_ENC_CODEC_HEVC_GUID: NvEncGuid = NvEncGuid {
    data1: 0x790c_dc88,
    data2: 0x4522,
    data3: 0x4d7b,
    data4: [0x94, 0x25, 0xbd, 0xa9, 0x97, 0x5f, 0x76, 0x03],
};

fn guid_for_codec(codec: VideoCodec) -> Option<NvEncGuid> {
    match codec {
        VideoCodec::H264 => Some(NV_ENC_CODEC_H264_GUID),
        VideoCodec::Hevc => Some(NV_ENC_CODEC_HEVC_GUID),
        _ => None,
    }
}

/// Configuration accepted by `NvencSession::open`, shaped like the decode
/// side's `CreateConfig` (codec, surface dimensions, target bitrate) so the
/// two branches can share a dispatch entrypoint at `VAEntrypointEncSlice`.
#[derive(Clone, Debug)]
pub struct EncodeConfig {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
}

/// Platform-specific NVENC library filename.
fn library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "nvEncodeAPI64.dll"
    } else {
        "libnvidia-encode.so.1"
    }
}

/// An opened NVENC session. Construction succeeds once the codec GUID is
/// resolved and the library is present; every subsequent operation that
/// would require an actual encode (submitting an image, requesting a
/// bitstream) returns [`DriverError::Unimplemented`].
pub struct NvencSession {
    _lib: Library,
    guid: NvEncGuid,
    config: EncodeConfig,
}

impl std::fmt::Debug for NvencSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NvencSession")
            .field("codec", &self.config.codec)
            .field("width", &self.config.width)
            .field("height", &self.config.height)
            .finish()
    }
}

impl NvencSession {
    /// Open an NVENC session for the given configuration.
    ///
    /// This loads `libnvidia-encode` and resolves the codec GUID, matching
    /// the decode side's library-load-then-configure shape, but does not
    /// call `NvEncodeAPICreateInstance` — there is no encode functionality
    /// behind this session yet.
    pub fn open(config: EncodeConfig) -> DriverResult<Self> {
        let guid = guid_for_codec(config.codec).ok_or(DriverError::UnsupportedProfile)?;

        let lib_name = library_name();
        // SAFETY: loading a well-known NVIDIA system library by name.
        let lib = unsafe { Library::new(lib_name) }
            .map_err(|e| DriverError::AllocationFailed(format!("{lib_name}: {e}")))?;

        info!(
            codec = config.codec.display_name(),
            width = config.width,
            height = config.height,
            bitrate = config.bitrate,
            "Opened NVENC stub session — encode is unimplemented"
        );

        Ok(Self { _lib: lib, guid, config })
    }

    pub fn codec_guid(&self) -> NvEncGuid {
        self.guid
    }

    /// Submit a mapped CUDA surface for encoding.
    ///
    /// Always fails: this branch has no working `map_va_surface_to_cuda`
    /// equivalent, and returning a fabricated device pointer here would be
    /// worse than an explicit error.
    pub fn submit_frame(&mut self, _device_ptr: *const c_void, _timestamp: i64) -> DriverResult<()> {
        warn!("NVENC submit_frame called — encode path is a stub, refusing");
        Err(DriverError::Unimplemented)
    }

    /// Retrieve the next encoded bitstream chunk. Always unimplemented.
    pub fn next_bitstream(&mut self) -> DriverResult<Vec<u8>> {
        Err(DriverError::Unimplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_lookup_covers_h264_and_hevc() {
        assert_eq!(guid_for_codec(VideoCodec::H264), Some(NV_ENC_CODEC_H264_GUID));
        assert_eq!(guid_for_codec(VideoCodec::Hevc), Some(NV_ENC_CODEC_HEVC_GUID));
        assert_eq!(guid_for_codec(VideoCodec::Vp9), None);
    }

    #[test]
    fn library_name_matches_platform() {
        if cfg!(target_os = "windows") {
            assert_eq!(library_name(), "nvEncodeAPI64.dll");
        } else {
            assert_eq!(library_name(), "libnvidia-encode.so.1");
        }
    }
}
