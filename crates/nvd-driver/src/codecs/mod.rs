//! Codec dispatch table: per-codec translation of client VA-API buffers
//! into the vendor decoder's picture-parameter struct.
//!
//! The source driver populates this table via a linker-section array
//! filled by one translation unit per codec. Rust has no equivalent
//! (and doesn't need one) — this is a plain compile-time registry: a fixed
//! array of [`CodecEntry`] built once by [`registry`], each carrying its
//! profile set, a codec-id mapper, and a handler lookup for the buffer
//! types `RenderPicture` may see. Unknown buffer types resolve to `None`
//! and the pipeline logs and skips them.

mod av1;
mod h264;
mod hevc;
mod jpeg;
mod mpeg2;
mod mpeg4;
mod vc1;
mod vp8;
mod vp9;

use nvd_common::Profile;
use nvd_cuvid::CudaVideoCodec;

use crate::appendable::AppendableBuffer;
use nvd_cuvid::nvdec::ffi::CuvidPicParams;

/// The VA-API buffer types `RenderPicture` may submit, consumed as a fixed
/// external contract (the real enumeration is defined by the VA-API
/// headers; values outside the ones a codec cares about fold to
/// `Unknown`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VaBufferType {
    PictureParameter,
    IqMatrix,
    SliceParameter,
    SliceData,
    HuffmanTable,
    ProbabilityData,
    Unknown(u32),
}

/// Mutable scratch state a buffer handler fills in or appends to.
/// `pic_params` is the Context's scratch picture-parameter struct (zeroed
/// at `BeginPicture`, consumed at `EndPicture`); `bitstream` and
/// `slice_offsets` are the Context's two [`AppendableBuffer`]s.
pub struct RenderScratch<'a> {
    pub pic_params: &'a mut CuvidPicParams,
    pub bitstream: &'a mut AppendableBuffer,
    pub slice_offsets: &'a mut AppendableBuffer,
}

/// A buffer handler: either fills fields in `pic_params`, or appends to the
/// bitstream/slice-offset scratch buffers.
pub type BufferHandler = fn(&mut RenderScratch, data: &[u8]);

/// Copies a raw client buffer into the codec-specific region of the
/// picture-parameter struct, truncating (and noting the truncation isn't
/// itself an error — the vendor parser requires its own framing within
/// this region) if the buffer is larger than the scratch region.
pub fn handle_picture_parameter(scratch: &mut RenderScratch, data: &[u8]) {
    let dst = &mut scratch.pic_params.codec_specific;
    let n = data.len().min(dst.len());
    dst[..n].copy_from_slice(&data[..n]);
}

/// Appends slice compressed data to the bitstream scratch buffer and
/// records its offset in the slice-offsets buffer, the layout
/// `cuvidDecodePicture` expects via `pBitstreamData`/`pSliceDataOffsets`.
pub fn handle_slice_data(scratch: &mut RenderScratch, data: &[u8]) {
    let offset = scratch.bitstream.len() as u32;
    scratch.bitstream.append(data);
    scratch.slice_offsets.append(&offset.to_ne_bytes());
    scratch.pic_params.num_slices += 1;
}

/// Slice parameter buffers carry per-slice header fields (count, flags)
/// rather than payload; for the vendor's own-parser-driven bitstream mode
/// we only need the slice count, which `handle_slice_data` already tracks,
/// so this is a no-op retained for symmetry with the real buffer-type
/// table (and so an unexpected duplicate submission isn't logged as
/// unknown).
pub fn handle_slice_parameter(_scratch: &mut RenderScratch, _data: &[u8]) {}

/// IQ matrix / Huffman table / probability data buffers are codec-specific
/// auxiliary tables; they land in the same codec-specific scratch region as
/// the picture parameters, appended after whatever the picture-parameter
/// handler already wrote. Callers ensure `PictureParameter` is submitted
/// before these.
pub fn handle_auxiliary_table(scratch: &mut RenderScratch, data: &[u8]) {
    handle_picture_parameter(scratch, data);
}

/// One codec's entry in the dispatch table.
pub struct CodecEntry {
    pub name: &'static str,
    pub supported_profiles: &'static [Profile],
    pub compute_cuda_codec: fn(Profile) -> Option<CudaVideoCodec>,
    pub handler_for: fn(VaBufferType) -> Option<BufferHandler>,
}

impl CodecEntry {
    /// Human-readable summary, used by diagnostics and the capability
    /// query path's logging — not load-bearing for dispatch.
    pub fn describe(&self) -> String {
        format!("{} ({} profiles)", self.name, self.supported_profiles.len())
    }
}

/// The fixed, compile-time codec dispatch table. `CreateContext` scans this
/// in order and picks the first entry whose `supported_profiles` includes
/// the Config's profile.
pub fn registry() -> &'static [CodecEntry] {
    &[
        mpeg2::ENTRY,
        mpeg4::ENTRY,
        vc1::ENTRY,
        h264::ENTRY,
        jpeg::ENTRY,
        hevc::ENTRY,
        vp8::ENTRY,
        vp9::ENTRY,
        av1::ENTRY,
    ]
}

/// Scan the registry for the first entry whose profile set contains
/// `profile`. `None` means `UNSUPPORTED_PROFILE`.
pub fn find_for_profile(profile: Profile) -> Option<&'static CodecEntry> {
    registry().iter().find(|entry| entry.supported_profiles.contains(&profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_profile_in_common_is_reachable_or_intentionally_absent() {
        // H264Svc has no VA profile mapping to it in this table (mirrors
        // upstream VA-API, which defines no standalone SVC profile), so it
        // is the one codec variant with no reachable profile.
        for profile in [
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
        ] {
            assert!(find_for_profile(profile).is_some(), "no codec entry for {profile:?}");
        }
    }

    #[test]
    fn unknown_buffer_type_has_no_handler() {
        for entry in registry() {
            assert!((entry.handler_for)(VaBufferType::Unknown(0xDEAD)).is_none());
        }
    }
}
