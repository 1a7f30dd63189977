use nvd_common::Profile;
use nvd_cuvid::CudaVideoCodec;

use super::{handle_picture_parameter, handle_slice_data};
use super::{BufferHandler, CodecEntry, VaBufferType};

fn compute_cuda_codec(_profile: Profile) -> Option<CudaVideoCodec> {
    Some(CudaVideoCodec::Vp8)
}

fn handler_for(ty: VaBufferType) -> Option<BufferHandler> {
    match ty {
        VaBufferType::PictureParameter => Some(handle_picture_parameter),
        VaBufferType::SliceData => Some(handle_slice_data),
        _ => None,
    }
}

pub const ENTRY: CodecEntry = CodecEntry {
    name: "vp8",
    supported_profiles: &[Profile::Vp8Version0_3],
    compute_cuda_codec,
    handler_for,
};
