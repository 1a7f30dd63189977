//! Internal error taxonomy.
//!
//! Variants map 1:1 onto the VA-API status categories in spec.md §7; the
//! conversion to the actual `VAStatus` wire values happens at the
//! dispatch-table shim boundary (`nvd-driver::shim`), keeping this crate and
//! `nvd-driver`'s core free of the VA-API header constants.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid handle of type {0}")]
    InvalidHandle(&'static str),

    #[error("unsupported profile")]
    UnsupportedProfile,

    #[error("unsupported entrypoint")]
    UnsupportedEntrypoint,

    #[error("unsupported format")]
    UnsupportedFormat,

    #[error("unsupported memory type")]
    UnsupportedMemoryType,

    #[error("invalid surface")]
    InvalidSurface,

    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("hardware busy")]
    HwBusy,

    #[error("unimplemented")]
    Unimplemented,

    #[error("maximum number of surfaces/pictures exceeded")]
    MaxNumExceeded,
}

pub type DriverResult<T> = Result<T, DriverError>;
