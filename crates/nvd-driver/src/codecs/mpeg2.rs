use nvd_common::Profile;
use nvd_cuvid::CudaVideoCodec;

use super::{handle_auxiliary_table, handle_picture_parameter, handle_slice_data, handle_slice_parameter};
use super::{BufferHandler, CodecEntry, VaBufferType};

fn compute_cuda_codec(_profile: Profile) -> Option<CudaVideoCodec> {
    Some(CudaVideoCodec::Mpeg2)
}

fn handler_for(ty: VaBufferType) -> Option<BufferHandler> {
    match ty {
        VaBufferType::PictureParameter => Some(handle_picture_parameter),
        VaBufferType::IqMatrix => Some(handle_auxiliary_table),
        VaBufferType::SliceParameter => Some(handle_slice_parameter),
        VaBufferType::SliceData => Some(handle_slice_data),
        _ => None,
    }
}

pub const ENTRY: CodecEntry = CodecEntry {
    name: "mpeg2",
    supported_profiles: &[Profile::Mpeg2Simple, Profile::Mpeg2Main],
    compute_cuda_codec,
    handler_for,
};
