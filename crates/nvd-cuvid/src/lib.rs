//! Vendor FFI layer: safe wrappers over NVIDIA's CUVID/NVDEC decode library
//! and the NVENC encode stub, both loaded dynamically via `libloading` so
//! this crate links against no NVIDIA library at build time.

pub mod nvdec;
pub mod nvenc;

pub use nvdec::ffi::{CudaVideoCodec, CudaVideoSurfaceFormat, NvcuvidLibrary, NvcuvidLoadError};
pub use nvdec::session::{DecodedFrameInfo, MappedFrame, NvDecSession, SessionStats};
pub use nvenc::{EncodeConfig, NvEncGuid, NvencSession};
