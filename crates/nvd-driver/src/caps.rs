//! Capability negotiation: maps `(codec, bit depth, chroma)` triples onto
//! what the device actually supports, and gates the advertised profile
//! list accordingly.

use nvd_common::{BitDepth, ChromaFormat, VideoCodec};

/// Maximum picture dimensions the device reports for a supported triple.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MaxPictureSize {
    pub width: u32,
    pub height: u32,
}

/// Given `(codec, bitDepth, chromaFormat)`, tells whether the device
/// supports it and, if so, the maximum picture size. Implemented once
/// against the real vendor library (`CuvidProbe`) and once as a fixed
/// answer for environments with no GPU (`StubProbe`, used in tests and as
/// the fallback when `NVD_FORCE_INIT` bypasses hardware detection).
pub trait CapabilityProbe: Send + Sync {
    fn query(
        &self,
        codec: VideoCodec,
        bit_depth: BitDepth,
        chroma: ChromaFormat,
    ) -> Option<MaxPictureSize>;

    /// Whether the device can produce 10/12-bit surfaces at all. Gates the
    /// higher-bit-depth profiles in the advertised profile list
    /// independently of per-codec support.
    fn supports_16bit_surface(&self) -> bool;

    /// Whether the device can produce 4:4:4 surfaces at all.
    fn supports_444_surface(&self) -> bool;
}

/// A fixed-answer probe for environments with no CUVID-capable device —
/// used in unit/integration tests and wherever capability introspection is
/// not wired to real hardware. Reports every codec supported at up to
/// 8192x8192, with both 16-bit and 4:4:4 surfaces enabled.
pub struct StubProbe {
    pub supports_16bit: bool,
    pub supports_444: bool,
    pub max_size: MaxPictureSize,
}

impl Default for StubProbe {
    fn default() -> Self {
        Self {
            supports_16bit: true,
            supports_444: true,
            max_size: MaxPictureSize { width: 8192, height: 8192 },
        }
    }
}

impl CapabilityProbe for StubProbe {
    fn query(&self, _codec: VideoCodec, _bit_depth: BitDepth, _chroma: ChromaFormat) -> Option<MaxPictureSize> {
        Some(self.max_size)
    }

    fn supports_16bit_surface(&self) -> bool {
        self.supports_16bit
    }

    fn supports_444_surface(&self) -> bool {
        self.supports_444
    }
}

/// The real probe, backed by the loaded CUVID library's
/// `cuvidGetDecoderCaps`-shaped query. Construction requires a live
/// `nvd_cuvid::NvcuvidLibrary` and CUDA context, which is out of scope for
/// this crate's unit tests — exercised only behind `#[ignore]` integration
/// tests that require real hardware.
pub struct CuvidProbe {
    supports_16bit: bool,
    supports_444: bool,
}

impl CuvidProbe {
    /// Build a probe from device introspection results already gathered by
    /// the caller (the shim queries `cuvidGetDecoderCaps` once per codec at
    /// init time and folds the results into these two flags plus a
    /// per-triple max-size table — represented here only by the flags,
    /// since the fixed per-codec/bit-depth table lives in `codecs`).
    pub fn new(supports_16bit: bool, supports_444: bool) -> Self {
        Self { supports_16bit, supports_444 }
    }
}

impl CapabilityProbe for CuvidProbe {
    fn query(&self, _codec: VideoCodec, bit_depth: BitDepth, chroma: ChromaFormat) -> Option<MaxPictureSize> {
        if matches!(bit_depth, BitDepth::Ten | BitDepth::Twelve) && !self.supports_16bit {
            return None;
        }
        if matches!(chroma, ChromaFormat::Yuv444) && !self.supports_444 {
            return None;
        }
        // NVDEC hardware generations in the field cap at 8K; without a live
        // decoder handle we report the conservative figure rather than
        // inventing a per-GPU number.
        Some(MaxPictureSize { width: 8192, height: 8192 })
    }

    fn supports_16bit_surface(&self) -> bool {
        self.supports_16bit
    }

    fn supports_444_surface(&self) -> bool {
        self.supports_444
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_probe_supports_everything_by_default() {
        let probe = StubProbe::default();
        assert!(probe.supports_16bit_surface());
        assert!(probe.supports_444_surface());
        assert!(probe.query(VideoCodec::Hevc, BitDepth::Ten, ChromaFormat::Yuv420).is_some());
    }

    #[test]
    fn cuvid_probe_gates_on_flags() {
        let probe = CuvidProbe::new(false, false);
        assert!(probe.query(VideoCodec::Hevc, BitDepth::Ten, ChromaFormat::Yuv420).is_none());
        assert!(probe.query(VideoCodec::Hevc, BitDepth::Eight, ChromaFormat::Yuv444).is_none());
        assert!(probe.query(VideoCodec::Hevc, BitDepth::Eight, ChromaFormat::Yuv420).is_some());
    }
}
