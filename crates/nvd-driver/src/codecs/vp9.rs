use nvd_common::Profile;
use nvd_cuvid::CudaVideoCodec;

use super::{handle_picture_parameter, handle_slice_data, handle_auxiliary_table};
use super::{BufferHandler, CodecEntry, VaBufferType};

fn compute_cuda_codec(_profile: Profile) -> Option<CudaVideoCodec> {
    Some(CudaVideoCodec::Vp9)
}

fn handler_for(ty: VaBufferType) -> Option<BufferHandler> {
    match ty {
        VaBufferType::PictureParameter => Some(handle_picture_parameter),
        VaBufferType::ProbabilityData => Some(handle_auxiliary_table),
        VaBufferType::SliceData => Some(handle_slice_data),
        _ => None,
    }
}

pub const ENTRY: CodecEntry = CodecEntry {
    name: "vp9",
    supported_profiles: &[
        Profile::Vp9Profile0,
        Profile::Vp9Profile1,
        Profile::Vp9Profile2,
        Profile::Vp9Profile3,
    ],
    compute_cuda_codec,
    handler_for,
};
