//! H.264, plus its MVC (stereo / multiview) profiles. VA-API defines no
//! standalone SVC profile, so `VideoCodec::H264Svc` has no profile that
//! routes here or anywhere else in the registry — it exists in
//! `nvd_common::VideoCodec` only because `CudaVideoCodec` itself has a
//! distinct SVC id.

use nvd_common::Profile;
use nvd_cuvid::CudaVideoCodec;

use super::{handle_picture_parameter, handle_slice_data, handle_slice_parameter};
use super::{BufferHandler, CodecEntry, VaBufferType};

fn compute_cuda_codec(profile: Profile) -> Option<CudaVideoCodec> {
    match profile {
        Profile::H264Baseline | Profile::H264Main | Profile::H264High => Some(CudaVideoCodec::H264),
        Profile::H264StereoHigh | Profile::H264MultiviewHigh => Some(CudaVideoCodec::H264Mvc),
        _ => None,
    }
}

fn handler_for(ty: VaBufferType) -> Option<BufferHandler> {
    match ty {
        VaBufferType::PictureParameter => Some(handle_picture_parameter),
        VaBufferType::SliceParameter => Some(handle_slice_parameter),
        VaBufferType::SliceData => Some(handle_slice_data),
        _ => None,
    }
}

pub const ENTRY: CodecEntry = CodecEntry {
    name: "h264",
    supported_profiles: &[
        Profile::H264Baseline,
        Profile::H264Main,
        Profile::H264High,
        Profile::H264StereoHigh,
        Profile::H264MultiviewHigh,
    ],
    compute_cuda_codec,
    handler_for,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mvc_profiles_map_to_the_mvc_codec_id() {
        assert_eq!(compute_cuda_codec(Profile::H264StereoHigh), Some(CudaVideoCodec::H264Mvc));
        assert_eq!(compute_cuda_codec(Profile::H264MultiviewHigh), Some(CudaVideoCodec::H264Mvc));
        assert_eq!(compute_cuda_codec(Profile::H264High), Some(CudaVideoCodec::H264));
    }
}
