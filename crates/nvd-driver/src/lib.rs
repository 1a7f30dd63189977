//! VA-API driver core: object registry, codec dispatch, surface export, and
//! the decode pipeline that dispatches to NVIDIA's CUVID/NVDEC path.

pub mod appendable;
pub mod caps;
pub mod codecs;
pub mod export;
pub mod pipeline;
pub mod registry;
pub mod shim;

pub use appendable::AppendableBuffer;
pub use caps::{CapabilityProbe, CuvidProbe, MaxPictureSize, StubProbe};
pub use registry::{ObjectKind, Registry, INVALID_ID};
