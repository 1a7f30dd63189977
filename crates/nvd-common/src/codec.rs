//! Codec, profile and pixel-format identifiers shared across the driver.
//!
//! These mirror the VA-API enumerations the driver translates against, but
//! are not the VA-API types themselves — those are consumed as an external,
//! fixed contract at the dispatch-table shim boundary.

/// A video codec this driver knows how to translate into a vendor decoder.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VideoCodec {
    Mpeg2,
    Mpeg4,
    Vc1,
    H264,
    H264Svc,
    H264Mvc,
    Jpeg,
    Hevc,
    Vp8,
    Vp9,
    Av1,
}

impl VideoCodec {
    pub fn display_name(&self) -> &'static str {
        match self {
            VideoCodec::Mpeg2 => "MPEG-2",
            VideoCodec::Mpeg4 => "MPEG-4",
            VideoCodec::Vc1 => "VC-1",
            VideoCodec::H264 => "H.264",
            VideoCodec::H264Svc => "H.264 SVC",
            VideoCodec::H264Mvc => "H.264 MVC",
            VideoCodec::Jpeg => "JPEG",
            VideoCodec::Hevc => "HEVC",
            VideoCodec::Vp8 => "VP8",
            VideoCodec::Vp9 => "VP9",
            VideoCodec::Av1 => "AV1",
        }
    }
}

/// Chroma subsampling of a decoded/rendered surface.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChromaFormat {
    Yuv420,
    Yuv422,
    Yuv444,
}

impl ChromaFormat {
    /// Round width/height up to the multiples this subsampling requires.
    /// 4:2:0 rounds both dimensions to 2; 4:2:2 rounds width only.
    pub fn round_up(&self, width: u32, height: u32) -> (u32, u32) {
        match self {
            ChromaFormat::Yuv420 => ((width + 1) & !1, (height + 1) & !1),
            ChromaFormat::Yuv422 => ((width + 1) & !1, height),
            ChromaFormat::Yuv444 => (width, height),
        }
    }
}

/// Bit depth of luma/chroma samples.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BitDepth {
    Eight,
    Ten,
    Twelve,
}

impl BitDepth {
    pub fn bits(&self) -> u32 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Ten => 10,
            BitDepth::Twelve => 12,
        }
    }
}

/// The surface pixel format exposed to clients (`QueryImageFormats`,
/// `QuerySurfaceAttributes`, and `Config` defaults).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SurfaceFormat {
    Nv12,
    P010,
    P012,
    P016,
    Yuv444,
    Yuv444_16Bit,
}

impl SurfaceFormat {
    pub fn plane_count(&self) -> u32 {
        match self {
            SurfaceFormat::Nv12 | SurfaceFormat::P010 | SurfaceFormat::P012 | SurfaceFormat::P016 => 2,
            SurfaceFormat::Yuv444 | SurfaceFormat::Yuv444_16Bit => 3,
        }
    }

    pub fn is_16bit(&self) -> bool {
        matches!(
            self,
            SurfaceFormat::P010 | SurfaceFormat::P012 | SurfaceFormat::P016 | SurfaceFormat::Yuv444_16Bit
        )
    }

    pub fn is_444(&self) -> bool {
        matches!(self, SurfaceFormat::Yuv444 | SurfaceFormat::Yuv444_16Bit)
    }

    /// DRM fourcc for the primary plane layout. `Yuv444_16Bit` (Q416) has no
    /// valid DRM fourcc in the fixed pixel-format table (spec.md §6).
    pub fn drm_fourcc(&self) -> Option<u32> {
        const fn fourcc(s: &[u8; 4]) -> u32 {
            (s[0] as u32) | (s[1] as u32) << 8 | (s[2] as u32) << 16 | (s[3] as u32) << 24
        }
        match self {
            SurfaceFormat::Nv12 => Some(fourcc(b"NV12")),
            SurfaceFormat::P010 => Some(fourcc(b"P010")),
            SurfaceFormat::P012 => Some(fourcc(b"P012")),
            SurfaceFormat::P016 => Some(fourcc(b"P016")),
            SurfaceFormat::Yuv444 => Some(fourcc(b"YUV4")),
            SurfaceFormat::Yuv444_16Bit => None,
        }
    }
}

/// VA-API entrypoint requested alongside a profile at `CreateConfig`. This
/// driver only decodes (`Vld`); `EncSlice` is recognized solely so the NVENC
/// stub branch can reject it with a clear status rather than falling through
/// as an unrecognized profile.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VaEntrypoint {
    Vld,
    EncSlice,
}

/// A VA-API profile this driver can be asked to configure.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Profile {
    Mpeg2Simple,
    Mpeg2Main,
    Mpeg4AdvancedSimple,
    Vc1Advanced,
    H264Baseline,
    H264Main,
    H264High,
    H264StereoHigh,
    H264MultiviewHigh,
    JpegBaseline,
    HevcMain,
    HevcMain10,
    HevcMain12,
    HevcMain444,
    HevcMain444_10,
    HevcMain444_12,
    Vp8Version0_3,
    Vp9Profile0,
    Vp9Profile1,
    Vp9Profile2,
    Vp9Profile3,
    Av1Profile0,
    Av1Profile1,
}

impl Profile {
    /// The codec family a profile belongs to.
    pub fn codec(&self) -> VideoCodec {
        match self {
            Profile::Mpeg2Simple | Profile::Mpeg2Main => VideoCodec::Mpeg2,
            Profile::Mpeg4AdvancedSimple => VideoCodec::Mpeg4,
            Profile::Vc1Advanced => VideoCodec::Vc1,
            Profile::H264Baseline | Profile::H264Main | Profile::H264High => VideoCodec::H264,
            Profile::H264StereoHigh => VideoCodec::H264Mvc,
            Profile::H264MultiviewHigh => VideoCodec::H264Mvc,
            Profile::JpegBaseline => VideoCodec::Jpeg,
            Profile::HevcMain
            | Profile::HevcMain10
            | Profile::HevcMain12
            | Profile::HevcMain444
            | Profile::HevcMain444_10
            | Profile::HevcMain444_12 => VideoCodec::Hevc,
            Profile::Vp8Version0_3 => VideoCodec::Vp8,
            Profile::Vp9Profile0 | Profile::Vp9Profile1 | Profile::Vp9Profile2 | Profile::Vp9Profile3 => {
                VideoCodec::Vp9
            }
            Profile::Av1Profile0 | Profile::Av1Profile1 => VideoCodec::Av1,
        }
    }

    /// Whether this profile requires `supports16BitSurface`.
    pub fn requires_16bit(&self) -> bool {
        matches!(
            self,
            Profile::HevcMain10
                | Profile::HevcMain12
                | Profile::HevcMain444_10
                | Profile::HevcMain444_12
                | Profile::Vp9Profile2
                | Profile::Vp9Profile3
        )
    }

    /// Whether this profile requires `supports444Surface`.
    pub fn requires_444(&self) -> bool {
        matches!(
            self,
            Profile::HevcMain444
                | Profile::HevcMain444_10
                | Profile::HevcMain444_12
                | Profile::Vp9Profile1
                | Profile::Vp9Profile3
                | Profile::Av1Profile1
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chroma_round_up() {
        assert_eq!(ChromaFormat::Yuv420.round_up(1919, 1079), (1920, 1080));
        assert_eq!(ChromaFormat::Yuv422.round_up(1919, 1079), (1920, 1079));
        assert_eq!(ChromaFormat::Yuv444.round_up(1919, 1079), (1919, 1079));
    }

    #[test]
    fn profile_gating() {
        assert!(Profile::HevcMain10.requires_16bit());
        assert!(!Profile::HevcMain10.requires_444());
        assert!(Profile::HevcMain444.requires_444());
        assert!(!Profile::HevcMain.requires_16bit());
        assert!(!Profile::HevcMain.requires_444());
    }

    #[test]
    fn entrypoint_is_distinguishable() {
        assert_ne!(VaEntrypoint::Vld, VaEntrypoint::EncSlice);
    }

    #[test]
    fn surface_format_planes() {
        assert_eq!(SurfaceFormat::Nv12.plane_count(), 2);
        assert_eq!(SurfaceFormat::Yuv444.plane_count(), 3);
        assert!(SurfaceFormat::P016.is_16bit());
        assert!(!SurfaceFormat::Nv12.is_16bit());
    }
}
