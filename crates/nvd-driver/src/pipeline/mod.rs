//! The decode pipeline: Config/Context/Surface/Buffer/Image and the five
//! client-visible sequences (Configure, Create Surfaces, Create Context,
//! Picture Submission, Resolve).

mod buffer;
mod context;
mod decoder;
mod device;
mod instance;
pub mod ops;
mod surface;

pub use buffer::{Buffer, Image, VaBufferKind};
pub use context::{Context, SURFACE_QUEUE_SIZE};
pub use decoder::{CuvidDecoder, MappedFrame, StubDecoder, VendorDecoder};
pub use device::{DeviceContext, DeviceContextGuard};
pub use instance::DriverInstance;
pub use ops::{SurfaceAttributes, RT_FORMAT_YUV420, RT_FORMAT_YUV420_10, RT_FORMAT_YUV420_12, RT_FORMAT_YUV444, RT_FORMAT_YUV444_10, RT_FORMAT_YUV444_12};
pub use surface::{Surface, NO_PICTURE_IDX};

use nvd_common::{BitDepth, ChromaFormat, Profile, SurfaceFormat, VaEntrypoint, VideoCodec};

/// Negotiated codec parameters, immutable after creation (spec.md §3).
#[derive(Clone, Debug)]
pub struct Config {
    pub profile: Profile,
    pub entrypoint: VaEntrypoint,
    pub codec: VideoCodec,
    pub chroma: ChromaFormat,
    pub surface_format: SurfaceFormat,
    pub bit_depth: BitDepth,
}

impl Config {
    /// Default chroma 4:2:0, surface format NV12, bit depth 8 (S1 step 3).
    pub fn with_defaults(profile: Profile, entrypoint: VaEntrypoint) -> Self {
        Self {
            profile,
            entrypoint,
            codec: profile.codec(),
            chroma: ChromaFormat::Yuv420,
            surface_format: SurfaceFormat::Nv12,
            bit_depth: BitDepth::Eight,
        }
    }

    /// S1 step 4: override defaults per (profile x caps flags x RT format).
    /// `requested_10bit`/`requested_12bit` reflect the first RT-format
    /// attribute the caller supplied; unsatisfiable combinations (bit depth
    /// requested without matching caps) leave the defaults unchanged, which
    /// later calls reject downstream rather than silently degrading.
    pub fn apply_rt_format_override(
        &mut self,
        requested_10bit: bool,
        requested_12bit: bool,
        supports_16bit: bool,
        supports_444: bool,
    ) {
        let wants_444 = self.profile.requires_444();
        let wants_16bit = self.profile.requires_16bit() || requested_10bit || requested_12bit;

        if wants_16bit && !supports_16bit {
            return;
        }
        if wants_444 && !supports_444 {
            return;
        }

        match (wants_444, requested_12bit, wants_16bit) {
            (false, _, false) => {}
            (false, true, true) => {
                self.surface_format = SurfaceFormat::P016;
                self.bit_depth = BitDepth::Twelve;
            }
            (false, false, true) => {
                self.surface_format = SurfaceFormat::P016;
                self.bit_depth = BitDepth::Ten;
            }
            (true, _, false) => {
                self.surface_format = SurfaceFormat::Yuv444;
                self.chroma = ChromaFormat::Yuv444;
            }
            (true, true, true) => {
                self.surface_format = SurfaceFormat::Yuv444_16Bit;
                self.chroma = ChromaFormat::Yuv444;
                self.bit_depth = BitDepth::Twelve;
            }
            (true, false, true) => {
                self.surface_format = SurfaceFormat::Yuv444_16Bit;
                self.chroma = ChromaFormat::Yuv444;
                self.bit_depth = BitDepth::Ten;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hevc_main10_overrides_to_p016_ten_bit() {
        let mut cfg = Config::with_defaults(Profile::HevcMain10, VaEntrypoint::Vld);
        cfg.apply_rt_format_override(true, false, true, true);
        assert_eq!(cfg.surface_format, SurfaceFormat::P016);
        assert_eq!(cfg.bit_depth, BitDepth::Ten);
    }

    #[test]
    fn unsatisfiable_bit_depth_leaves_defaults() {
        let mut cfg = Config::with_defaults(Profile::HevcMain10, VaEntrypoint::Vld);
        cfg.apply_rt_format_override(true, false, false, true);
        assert_eq!(cfg.surface_format, SurfaceFormat::Nv12);
        assert_eq!(cfg.bit_depth, BitDepth::Eight);
    }

    #[test]
    fn hevc_main444_10_overrides_to_yuv444_16bit() {
        let mut cfg = Config::with_defaults(Profile::HevcMain444_10, VaEntrypoint::Vld);
        cfg.apply_rt_format_override(true, false, true, true);
        assert_eq!(cfg.surface_format, SurfaceFormat::Yuv444_16Bit);
        assert_eq!(cfg.chroma, ChromaFormat::Yuv444);
        assert_eq!(cfg.bit_depth, BitDepth::Ten);
    }
}
