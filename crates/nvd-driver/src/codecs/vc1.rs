use nvd_common::Profile;
use nvd_cuvid::CudaVideoCodec;

use super::{handle_picture_parameter, handle_slice_data, handle_slice_parameter};
use super::{BufferHandler, CodecEntry, VaBufferType};

fn compute_cuda_codec(_profile: Profile) -> Option<CudaVideoCodec> {
    Some(CudaVideoCodec::Vc1)
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
    name: "vc1",
    supported_profiles: &[Profile::Vc1Advanced],
    compute_cuda_codec,
    handler_for,
};
