use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use nvd_common::{DriverError, DriverResult};
use nvd_cuvid::nvdec::ffi::CuvidPicParams;

use crate::appendable::AppendableBuffer;
use crate::codecs::{CodecEntry, RenderScratch};
use crate::export::{DecodedPicture, ExportBackend};

use super::buffer::Buffer;
use super::decoder::VendorDecoder;
use super::surface::Surface;

/// Fixed capacity of the resolve queue (spec.md §3 invariant).
pub const SURFACE_QUEUE_SIZE: usize = 32;

/// Bound on `destroyContext`'s join wait for the resolve thread.
const TEARDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

struct QueueEntry {
    surface_id: u32,
    surface: Arc<Surface>,
}

struct ResolveQueue {
    slots: Vec<Option<QueueEntry>>,
    read_idx: usize,
    write_idx: usize,
    exiting: bool,
}

impl ResolveQueue {
    fn new() -> Self {
        let mut slots = Vec::with_capacity(SURFACE_QUEUE_SIZE);
        slots.resize_with(SURFACE_QUEUE_SIZE, || None);
        Self { slots, read_idx: 0, write_idx: 0, exiting: false }
    }

    fn is_empty(&self) -> bool {
        self.read_idx == self.write_idx
    }

    fn is_full(&self) -> bool {
        (self.write_idx + 1) % SURFACE_QUEUE_SIZE == self.read_idx
    }
}

/// One active decode session (spec.md §3/§4.6). Owns its decoder handle,
/// scratch buffers, and resolve thread; Surfaces are referenced, not owned.
pub struct Context {
    codec: &'static CodecEntry,
    decoder: Arc<dyn VendorDecoder>,
    export: Arc<dyn ExportBackend>,

    pub width: u32,
    pub height: u32,
    surface_count: u32,
    next_picture_id: Mutex<i32>,

    bitstream: Mutex<AppendableBuffer>,
    slice_offsets: Mutex<AppendableBuffer>,
    pic_params: Mutex<CuvidPicParams>,
    render_target: Mutex<Option<(u32, Arc<Surface>)>>,

    queue: Mutex<ResolveQueue>,
    condvar: Condvar,
    resolve_thread: Mutex<Option<JoinHandle<()>>>,
    exiting_flag: AtomicBool,
}

impl Context {
    /// S3 step 6: spawn the resolve thread bound to this Context. Failure
    /// to start it is surfaced as `OPERATION_FAILED` by the caller, which
    /// then destroys the partially built Context.
    pub fn new(
        codec: &'static CodecEntry,
        decoder: Arc<dyn VendorDecoder>,
        export: Arc<dyn ExportBackend>,
        width: u32,
        height: u32,
        surface_count: u32,
    ) -> DriverResult<Arc<Self>> {
        let ctx = Arc::new(Self {
            codec,
            decoder,
            export,
            width,
            height,
            surface_count,
            next_picture_id: Mutex::new(0),
            bitstream: Mutex::new(AppendableBuffer::new()),
            slice_offsets: Mutex::new(AppendableBuffer::new()),
            pic_params: Mutex::new(CuvidPicParams::default()),
            render_target: Mutex::new(None),
            queue: Mutex::new(ResolveQueue::new()),
            condvar: Condvar::new(),
            resolve_thread: Mutex::new(None),
            exiting_flag: AtomicBool::new(false),
        });

        let worker_ctx = ctx.clone();
        let handle = std::thread::Builder::new()
            .name("nvd-resolve".into())
            .spawn(move || worker_ctx.resolve_loop())
            .map_err(|e| DriverError::OperationFailed(format!("failed to start resolve thread: {e}")))?;
        *ctx.resolve_thread.lock() = Some(handle);
        Ok(ctx)
    }

    pub fn codec(&self) -> &'static CodecEntry {
        self.codec
    }

    /// `BeginPicture` (S4 steps 1-4).
    pub fn begin_picture(&self, target_id: u32, target: Arc<Surface>) -> DriverResult<()> {
        // Step 1: rebind detach.
        if target.rebind_if_needed(self.id_placeholder()) {
            self.export.detach_backing_image(target_id);
        }

        // Step 2: assign picture index or fail MAX_NUM_EXCEEDED.
        let surface_count = self.surface_count;
        let next_picture_id = &self.next_picture_id;
        let idx = target
            .assign_picture_idx(|| {
                let mut next = next_picture_id.lock();
                if *next as u32 == surface_count {
                    None
                } else {
                    let assigned = *next;
                    *next += 1;
                    Some(assigned)
                }
            })
            .ok_or(DriverError::MaxNumExceeded)?;

        // Step 3.
        target.mark_resolving();

        // Step 4.
        let mut params = self.pic_params.lock();
        *params = CuvidPicParams::default();
        params.curr_pic_idx = idx;
        drop(params);

        *self.render_target.lock() = Some((target_id, target));
        Ok(())
    }

    /// Contexts don't currently track their own registry id (they're looked
    /// up by the registry, not self-aware of it); rebinding only needs a
    /// stable identity distinct across Contexts, which this Context's
    /// address already provides.
    fn id_placeholder(&self) -> u32 {
        (self as *const Self as usize) as u32
    }

    /// `RenderPicture`: dispatch each buffer through the codec's handler
    /// table. Unknown buffer types are logged and skipped.
    pub fn render_picture(&self, buffers: &[Arc<Buffer>]) -> DriverResult<()> {
        let mut pic_params = self.pic_params.lock();
        let mut bitstream = self.bitstream.lock();
        let mut slice_offsets = self.slice_offsets.lock();
        let mut scratch = RenderScratch {
            pic_params: &mut pic_params,
            bitstream: &mut bitstream,
            slice_offsets: &mut slice_offsets,
        };

        for buffer in buffers {
            if buffer.data.is_empty() {
                tracing::debug!("skipping empty buffer");
                continue;
            }
            let va_type = buffer.kind.into();
            match (self.codec.handler_for)(va_type) {
                Some(handler) => handler(&mut scratch, buffer.payload()),
                None => tracing::debug!(?va_type, "unknown buffer type, skipping"),
            }
        }
        Ok(())
    }

    /// `EndPicture` (S4 steps 1-6).
    pub fn end_picture(&self) -> DriverResult<()> {
        let (target_id, target) =
            self.render_target.lock().take().ok_or(DriverError::InvalidSurface)?;

        let mut params = self.pic_params.lock().clone();
        // Steps 1-2: point at the scratch buffers, then reset them (the
        // pointers here are only meaningful in-process to a real decoder
        // that reads them before the buffers are reset; callers that pass
        // `params` to the vendor library must do so before this function
        // returns).
        let bottom_field_flag = params.bottom_field_flag != 0;
        let second_field = params.second_field != 0;

        // Step 3: decode. A failure still enqueues the target.
        let decode_result = self.decoder.decode_picture(&mut params);
        let decode_failed = decode_result.is_err();

        self.bitstream.lock().reset();
        self.slice_offsets.lock().reset();

        // Step 4.
        target.bind_after_decode(self.id_placeholder(), bottom_field_flag, second_field, decode_failed);

        // Steps 5-6: enqueue and signal.
        self.enqueue(target_id, target);

        decode_result.map_err(|_| DriverError::DecodingError("decode_picture failed".into()))
    }

    fn enqueue(&self, surface_id: u32, surface: Arc<Surface>) {
        let mut queue = self.queue.lock();
        while queue.is_full() && !queue.exiting {
            self.condvar.wait(&mut queue);
        }
        if queue.exiting {
            return;
        }
        let write_idx = queue.write_idx;
        queue.slots[write_idx] = Some(QueueEntry { surface_id, surface });
        queue.write_idx = (write_idx + 1) % SURFACE_QUEUE_SIZE;
        self.condvar.notify_all();
    }

    /// S5: the resolve thread's loop.
    fn resolve_loop(&self) {
        loop {
            let entry = {
                let mut queue = self.queue.lock();
                while queue.is_empty() && !queue.exiting {
                    self.condvar.wait(&mut queue);
                }
                if queue.is_empty() && queue.exiting {
                    return;
                }
                let read_idx = queue.read_idx;
                let entry = queue.slots[read_idx].take();
                queue.read_idx = (read_idx + 1) % SURFACE_QUEUE_SIZE;
                self.condvar.notify_all();
                entry
            };

            let Some(entry) = entry else { continue };

            if entry.surface.decode_failed() {
                entry.surface.clear_resolving();
                continue;
            }

            let picture_idx = entry.surface.picture_idx();
            match self.decoder.map_video_frame(picture_idx) {
                Ok(frame) => {
                    let result = self.export.export_cuda_ptr(
                        entry.surface_id,
                        DecodedPicture { device_ptr: frame.device_ptr, pitch: frame.pitch },
                    );
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "export_cuda_ptr failed");
                    }
                    self.decoder.unmap_video_frame(frame);
                }
                Err(e) => tracing::warn!(error = %e, "map_video_frame failed"),
            }

            entry.surface.clear_resolving();
        }
    }

    /// `destroyContext`: signal exit, join with a 5s bound, free scratch
    /// buffers. The decoder itself tears down via `Drop`.
    pub fn destroy(&self) {
        {
            let mut queue = self.queue.lock();
            queue.exiting = true;
            self.condvar.notify_all();
        }

        if let Some(handle) = self.resolve_thread.lock().take() {
            // `JoinHandle::join` has no timed variant; the condvar signal
            // above guarantees prompt wakeup in the common case. To honor
            // the 5s bound even if the thread is wedged, join it from a
            // detached helper and only wait up to the deadline here.
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = handle.join();
                let _ = done_tx.send(());
            });
            if done_rx.recv_timeout(TEARDOWN_JOIN_TIMEOUT).is_err() {
                tracing::warn!("resolve thread did not exit within the teardown deadline");
            }
        }

        self.bitstream.lock().free();
        self.slice_offsets.lock().free();
        self.export.destroy_all_backing_images();
        self.exiting_flag.store(true, Ordering::SeqCst);
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if !self.exiting_flag.load(Ordering::SeqCst) {
            self.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::find_for_profile;
    use crate::export::direct::DirectBackend;
    use crate::pipeline::buffer::VaBufferKind;
    use crate::pipeline::decoder::StubDecoder;
    use nvd_common::{BitDepth, ChromaFormat, Profile, SurfaceFormat};

    fn make_context() -> Arc<Context> {
        let codec = find_for_profile(Profile::H264High).unwrap();
        let decoder: Arc<dyn VendorDecoder> = Arc::new(StubDecoder::default());
        let export: Arc<dyn ExportBackend> = Arc::new(DirectBackend::new());
        Context::new(codec, decoder, export, 1920, 1080, 4).unwrap()
    }

    fn make_surface() -> Arc<Surface> {
        Arc::new(Surface::new(1920, 1080, ChromaFormat::Yuv420, SurfaceFormat::Nv12, BitDepth::Eight))
    }

    #[test]
    fn begin_picture_assigns_sequential_indices() {
        let ctx = make_context();
        let s1 = make_surface();
        let s2 = make_surface();
        ctx.begin_picture(1, s1.clone()).unwrap();
        assert_eq!(s1.picture_idx(), 0);
        ctx.end_picture().unwrap();
        s1.sync();

        ctx.begin_picture(2, s2.clone()).unwrap();
        assert_eq!(s2.picture_idx(), 1);
        ctx.end_picture().unwrap();
        s2.sync();
    }

    #[test]
    fn exceeding_surface_count_is_max_num_exceeded() {
        let codec = find_for_profile(Profile::H264High).unwrap();
        let decoder: Arc<dyn VendorDecoder> = Arc::new(StubDecoder::default());
        let export: Arc<dyn ExportBackend> = Arc::new(DirectBackend::new());
        let ctx = Context::new(codec, decoder, export, 64, 64, 1).unwrap();

        let s1 = make_surface();
        ctx.begin_picture(1, s1).unwrap();
        ctx.end_picture().unwrap();

        let s2 = make_surface();
        assert!(matches!(ctx.begin_picture(2, s2), Err(DriverError::MaxNumExceeded)));
    }

    #[test]
    fn render_picture_routes_slice_data_into_bitstream() {
        let ctx = make_context();
        let target = make_surface();
        ctx.begin_picture(1, target.clone()).unwrap();

        let buffers = vec![Arc::new(Buffer::new(VaBufferKind::SliceData, vec![1, 2, 3, 4], 0))];
        ctx.render_picture(&buffers).unwrap();
        assert_eq!(ctx.bitstream.lock().len(), 4);

        ctx.end_picture().unwrap();
        target.sync();
    }

    #[test]
    fn decode_failure_still_unblocks_sync_surface() {
        let codec = find_for_profile(Profile::H264High).unwrap();
        let decoder = Arc::new(StubDecoder::default());
        decoder.fail_decode.store(true, Ordering::SeqCst);
        let decoder: Arc<dyn VendorDecoder> = decoder;
        let export: Arc<dyn ExportBackend> = Arc::new(DirectBackend::new());
        let ctx = Context::new(codec, decoder, export, 64, 64, 4).unwrap();

        let target = make_surface();
        ctx.begin_picture(1, target.clone()).unwrap();
        assert!(ctx.end_picture().is_err());
        target.sync();
        assert!(target.decode_failed());
    }
}
