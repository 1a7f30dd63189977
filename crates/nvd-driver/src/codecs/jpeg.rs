use nvd_common::Profile;
use nvd_cuvid::CudaVideoCodec;

use super::{handle_auxiliary_table, handle_picture_parameter, handle_slice_data};
use super::{BufferHandler, CodecEntry, VaBufferType};

fn compute_cuda_codec(_profile: Profile) -> Option<CudaVideoCodec> {
    Some(CudaVideoCodec::Jpeg)
}

fn handler_for(ty: VaBufferType) -> Option<BufferHandler> {
    match ty {
        VaBufferType::PictureParameter => Some(handle_picture_parameter),
        VaBufferType::HuffmanTable => Some(handle_auxiliary_table),
        VaBufferType::SliceData => Some(handle_slice_data),
        _ => None,
    }
}

pub const ENTRY: CodecEntry = CodecEntry {
    name: "jpeg",
    supported_profiles: &[Profile::JpegBaseline],
    compute_cuda_codec,
    handler_for,
};
