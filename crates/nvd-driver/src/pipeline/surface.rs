use parking_lot::{Condvar, Mutex};

use nvd_common::{BitDepth, ChromaFormat, SurfaceFormat};

/// Sentinel for an unbound picture index.
pub const NO_PICTURE_IDX: i32 = -1;

/// One decodable/exportable frame slot (spec.md §3). `context`/`picture_idx`
/// rebind across Contexts; `resolving` is the handoff flag between
/// `EndPicture`'s resolve-thread enqueue and `SyncSurface`'s wait.
pub struct Surface {
    pub width: u32,
    pub height: u32,
    pub chroma: ChromaFormat,
    pub format: SurfaceFormat,
    pub bit_depth: BitDepth,

    state: Mutex<SurfaceState>,
    condvar: Condvar,
}

struct SurfaceState {
    picture_idx: i32,
    /// The id of the Context that most recently ran `BeginPicture` against
    /// this surface, or `None` if never bound.
    context_id: Option<u32>,
    progressive_frame: bool,
    top_field_first: bool,
    second_field: bool,
    decode_failed: bool,
    resolving: bool,
    /// Opaque handle into the export backend's own bookkeeping; `None`
    /// until `realiseSurface` succeeds.
    backing_image: Option<u32>,
}

impl Surface {
    pub fn new(width: u32, height: u32, chroma: ChromaFormat, format: SurfaceFormat, bit_depth: BitDepth) -> Self {
        Self {
            width,
            height,
            chroma,
            format,
            bit_depth,
            state: Mutex::new(SurfaceState {
                picture_idx: NO_PICTURE_IDX,
                context_id: None,
                progressive_frame: true,
                top_field_first: false,
                second_field: false,
                decode_failed: false,
                resolving: false,
                backing_image: None,
            }),
        }
    }

    pub fn picture_idx(&self) -> i32 {
        self.state.lock().picture_idx
    }

    pub fn context_id(&self) -> Option<u32> {
        self.state.lock().context_id
    }

    pub fn backing_image(&self) -> Option<u32> {
        self.state.lock().backing_image
    }

    pub fn set_backing_image(&self, handle: Option<u32>) {
        self.state.lock().backing_image = handle;
    }

    pub fn decode_failed(&self) -> bool {
        self.state.lock().decode_failed
    }

    /// `BeginPicture` step 1: if bound to a different Context, detach and
    /// reset. Returns `true` if a detach happened (caller must release the
    /// backing image via the export backend).
    pub fn rebind_if_needed(&self, new_context_id: u32) -> bool {
        let mut state = self.state.lock();
        if let Some(existing) = state.context_id {
            if existing != new_context_id {
                state.picture_idx = NO_PICTURE_IDX;
                state.backing_image = None;
                return true;
            }
        }
        false
    }

    /// `BeginPicture` step 2: assign the next free picture index if unbound.
    /// Returns the index that will be used, or `None` if the Context's
    /// surface count is exhausted (`MAX_NUM_EXCEEDED`).
    pub fn assign_picture_idx(&self, next_idx_if_unbound: impl FnOnce() -> Option<i32>) -> Option<i32> {
        let mut state = self.state.lock();
        if state.picture_idx == NO_PICTURE_IDX {
            state.picture_idx = next_idx_if_unbound()?;
        }
        Some(state.picture_idx)
    }

    /// `BeginPicture` step 3.
    pub fn mark_resolving(&self) {
        self.state.lock().resolving = true;
    }

    /// `EndPicture` step 4: bind metadata after a (possibly failed) decode.
    pub fn bind_after_decode(&self, context_id: u32, bottom_field_flag: bool, second_field: bool, decode_failed: bool) {
        let mut state = self.state.lock();
        state.context_id = Some(context_id);
        state.top_field_first = !bottom_field_flag;
        state.second_field = second_field;
        state.decode_failed = decode_failed;
    }

    /// Resolve thread step 3/7: clear `resolving` and wake `SyncSurface`.
    pub fn clear_resolving(&self) {
        let mut state = self.state.lock();
        state.resolving = false;
        self.condvar.notify_all();
    }

    /// `SyncSurface`: block while `resolving`.
    pub fn sync(&self) {
        let mut state = self.state.lock();
        while state.resolving {
            self.condvar.wait(&mut state);
        }
    }

    pub fn field_flags(&self) -> (bool, bool, bool) {
        let s = self.state.lock();
        (s.progressive_frame, s.top_field_first, s.second_field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> Surface {
        Surface::new(1920, 1080, ChromaFormat::Yuv420, SurfaceFormat::Nv12, BitDepth::Eight)
    }

    #[test]
    fn fresh_surface_has_no_picture_idx() {
        let s = surface();
        assert_eq!(s.picture_idx(), NO_PICTURE_IDX);
    }

    #[test]
    fn rebind_to_same_context_is_a_no_op() {
        let s = surface();
        s.bind_after_decode(1, false, false, false);
        assert!(!s.rebind_if_needed(1));
    }

    #[test]
    fn rebind_to_different_context_resets_picture_idx() {
        let s = surface();
        s.assign_picture_idx(|| Some(3));
        s.bind_after_decode(1, false, false, false);
        assert!(s.rebind_if_needed(2));
        assert_eq!(s.picture_idx(), NO_PICTURE_IDX);
    }

    #[test]
    fn assign_picture_idx_only_happens_once() {
        let s = surface();
        let first = s.assign_picture_idx(|| Some(5));
        let second = s.assign_picture_idx(|| Some(99));
        assert_eq!(first, Some(5));
        assert_eq!(second, Some(5));
    }

    #[test]
    fn exhausted_surface_count_yields_none() {
        let s = surface();
        assert!(s.assign_picture_idx(|| None).is_none());
    }

    #[test]
    fn sync_returns_immediately_when_not_resolving() {
        let s = surface();
        s.sync();
    }
}
