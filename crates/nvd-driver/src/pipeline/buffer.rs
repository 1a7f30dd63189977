use std::sync::Arc;

use crate::codecs::VaBufferType;

/// A typed client payload (spec.md §3): picture-params, slice-params,
/// slice-data, etc. `data` is an owned copy of what the client submitted via
/// `CreateBuffer`/`MapBuffer` — VA-API clients are expected to write through
/// the mapped pointer before `RenderPicture`, so by the time the dispatch
/// table sees a Buffer its content is final.
pub struct Buffer {
    pub kind: VaBufferKind,
    pub data: Vec<u8>,
    /// Byte offset into `data` where content actually starts — VP8 slice
    /// data buffers may carry a leading unalignment pad the client asked
    /// the driver to skip.
    pub unalignment_offset: usize,
}

impl Buffer {
    pub fn new(kind: VaBufferKind, data: Vec<u8>, unalignment_offset: usize) -> Self {
        Self { kind, data, unalignment_offset }
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[self.unalignment_offset.min(self.data.len())..]
    }
}

/// The driver's buffer-type enumeration, translated to [`VaBufferType`] at
/// the dispatch boundary (`crate::codecs`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VaBufferKind {
    PictureParameter,
    IqMatrix,
    SliceParameter,
    SliceData,
    HuffmanTable,
    ProbabilityData,
    Image,
    Unknown(u32),
}

impl From<VaBufferKind> for VaBufferType {
    fn from(kind: VaBufferKind) -> Self {
        match kind {
            VaBufferKind::PictureParameter => VaBufferType::PictureParameter,
            VaBufferKind::IqMatrix => VaBufferType::IqMatrix,
            VaBufferKind::SliceParameter => VaBufferType::SliceParameter,
            VaBufferKind::SliceData => VaBufferType::SliceData,
            VaBufferKind::HuffmanTable => VaBufferType::HuffmanTable,
            VaBufferKind::ProbabilityData => VaBufferType::ProbabilityData,
            VaBufferKind::Image | VaBufferKind::Unknown(_) => {
                VaBufferType::Unknown(match kind {
                    VaBufferKind::Unknown(v) => v,
                    _ => 0,
                })
            }
        }
    }
}

/// Host-visible copy target (spec.md §3). Its Buffer is deleted with it.
///
/// Holds a strong reference to the backing `Buffer` rather than its registry
/// id: `DestroyImage` recovers the id via `Registry::lookup_by_inner_pointer`
/// against this same `Arc`'s address (spec.md §4.2's `lookupByInnerPointer`),
/// rather than threading an id through the object itself.
pub struct Image {
    pub buffer: Arc<Buffer>,
    pub width: u32,
    pub height: u32,
    pub format: nvd_common::SurfaceFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_skips_unalignment_offset() {
        let buf = Buffer::new(VaBufferKind::SliceData, vec![0, 0, 1, 2, 3], 2);
        assert_eq!(buf.payload(), &[1, 2, 3]);
    }
}
