use nvd_common::Profile;
use nvd_cuvid::CudaVideoCodec;

use super::{handle_auxiliary_table, handle_picture_parameter, handle_slice_data, handle_slice_parameter};
use super::{BufferHandler, CodecEntry, VaBufferType};

fn compute_cuda_codec(_profile: Profile) -> Option<CudaVideoCodec> {
    Some(CudaVideoCodec::Hevc)
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
    name: "hevc",
    supported_profiles: &[
        Profile::HevcMain,
        Profile::HevcMain10,
        Profile::HevcMain12,
        Profile::HevcMain444,
        Profile::HevcMain444_10,
        Profile::HevcMain444_12,
    ],
    compute_cuda_codec,
    handler_for,
};
