//! Shared types for the NVDEC VA-API driver: codec/profile/format
//! identifiers, the internal error taxonomy, and environment configuration.
//!
//! Everything here is vendor- and VA-API-header-agnostic; `nvd-cuvid` maps
//! these onto CUVID enums, and `nvd-driver::shim` maps them onto the VA-API
//! wire types.

pub mod codec;
pub mod config;
pub mod error;

pub use codec::{BitDepth, ChromaFormat, Profile, SurfaceFormat, VaEntrypoint, VideoCodec};
pub use config::{DriverConfig, ExportBackendKind, LogTarget};
pub use error::{DriverError, DriverResult};
