//! Raw FFI bindings for NVIDIA's CUVID (nvcuvid) library.
//!
//! These bindings are loaded dynamically at runtime via `libloading`, and
//! cover the full API surface the driver's codec dispatch table needs:
//! MPEG-2/4, VC-1, H.264 (including SVC/MVC), JPEG, HEVC, VP8/9 and AV1.
//!
//! Reference: NVIDIA Video Codec SDK — `nvcuvid.h` and `cuviddec.h`.

use std::ffi::c_void;
use std::path::Path;

use libloading::Library;
use tracing::{debug, info};

use nvd_common::VideoCodec;

// ---------------------------------------------------------------------------
// CUDA types we reference (these come from the CUDA driver API)
// ---------------------------------------------------------------------------

/// CUDA context handle (opaque pointer).
pub type CUcontext = *mut c_void;

/// CUDA stream handle (opaque pointer).
pub type CUstream = *mut c_void;

/// CUDA device pointer (GPU virtual address).
pub type CUdeviceptr = u64;

// ---------------------------------------------------------------------------
// CUVID result / status code
// ---------------------------------------------------------------------------

/// CUVID API return type — 0 means success.
pub type CUresult = i32;

/// Success return code.
pub const CUDA_SUCCESS: CUresult = 0;

// ---------------------------------------------------------------------------
// Opaque decoder / parser handles
// ---------------------------------------------------------------------------

/// Opaque NVDEC decoder handle.
pub type CUvideodecoder = *mut c_void;

/// Opaque CUVID video parser handle.
pub type CUvideoparser = *mut c_void;

/// Opaque CUVID video source handle (not used in our flow, but part of API).
pub type CUvideosource = *mut c_void;

// ---------------------------------------------------------------------------
// Codec type enum (cudaVideoCodec)
// ---------------------------------------------------------------------------

/// Video codec identifier for NVDEC. Matches `cudaVideoCodec` from `cuviddec.h`.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CudaVideoCodec {
    Mpeg1 = 0,
    Mpeg2 = 1,
    Mpeg4 = 2,
    Vc1 = 3,
    H264 = 4,
    Jpeg = 5,
    H264Svc = 6,
    H264Mvc = 7,
    Hevc = 8,
    Vp8 = 9,
    Vp9 = 10,
    Av1 = 12,
    NumCodecs = 13,
}

impl CudaVideoCodec {
    /// Convert from the driver's shared `VideoCodec` enum.
    pub fn from_common(codec: VideoCodec) -> Option<Self> {
        match codec {
            VideoCodec::Mpeg2 => Some(Self::Mpeg2),
            VideoCodec::Mpeg4 => Some(Self::Mpeg4),
            VideoCodec::Vc1 => Some(Self::Vc1),
            VideoCodec::H264 => Some(Self::H264),
            VideoCodec::H264Svc => Some(Self::H264Svc),
            VideoCodec::H264Mvc => Some(Self::H264Mvc),
            VideoCodec::Jpeg => Some(Self::Jpeg),
            VideoCodec::Hevc => Some(Self::Hevc),
            VideoCodec::Vp8 => Some(Self::Vp8),
            VideoCodec::Vp9 => Some(Self::Vp9),
            VideoCodec::Av1 => Some(Self::Av1),
        }
    }
}

// ---------------------------------------------------------------------------
// Surface format enum (cudaVideoSurfaceFormat)
// ---------------------------------------------------------------------------

/// Output surface format. Matches `cudaVideoSurfaceFormat`.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CudaVideoSurfaceFormat {
    Nv12 = 0,
    P016 = 1,
    Yuy2 = 2,
    Yuv444 = 3,
    Nv24 = 4,
    Yuv444_16bit = 5,
}

// ---------------------------------------------------------------------------
// Deinterlace mode enum (cudaVideoDeinterlaceMode)
// ---------------------------------------------------------------------------

/// Deinterlace mode. Matches `cudaVideoDeinterlaceMode`.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CudaVideoDeinterlaceMode {
    Weave = 0,
    Bob = 1,
    Adaptive = 2,
}

// ---------------------------------------------------------------------------
// Chroma format enum (cudaVideoChromaFormat)
// ---------------------------------------------------------------------------

/// Chroma subsampling format. Matches `cudaVideoChromaFormat`.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CudaVideoChromaFormat {
    Monochrome = 0,
    Yuv420 = 1,
    Yuv422 = 2,
    Yuv444 = 3,
}

// ---------------------------------------------------------------------------
// Create flags enum (cudaVideoCreateFlags)
// ---------------------------------------------------------------------------

/// Decoder creation flags. Matches `cudaVideoCreateFlags`.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CudaVideoCreateFlags {
    /// Default (automatic CUDA scheduling).
    Default = 0,
    /// Use a CUDA stream for decode operations.
    PreferCUDA = 1,
    /// Use dedicated NVDEC hardware.
    PreferDXVA = 2,
    /// Use a CUDA-based decoder.
    PreferCUVID = 4,
}

// ---------------------------------------------------------------------------
// CUVIDDECODECREATEINFO — decoder creation parameters
// ---------------------------------------------------------------------------

/// Decoder creation info struct. Matches `CUVIDDECODECREATEINFO` from `cuviddec.h`.
///
/// This struct configures the NVDEC decoder instance. Fields match the
/// C header layout exactly — padding and reserved fields are included.
///
/// Reference: NVIDIA Video Codec SDK `cuviddec.h`
#[repr(C)]
#[derive(Clone)]
pub struct CuvidDecodeCreateInfo {
    /// Coded sequence width (ulWidth).
    pub coded_width: u32,
    /// Coded sequence height (ulHeight).
    pub coded_height: u32,
    /// Maximum number of internal decode surfaces (ulNumDecodeSurfaces).
    pub num_decode_surfaces: u32,
    /// Codec type (CodecType: cudaVideoCodec).
    pub codec_type: CudaVideoCodec,
    /// Chroma format (ChromaFormat: cudaVideoChromaFormat).
    pub chroma_format: CudaVideoChromaFormat,
    /// Decoder creation flags (ulCreationFlags: cudaVideoCreateFlags).
    pub creation_flags: u32,
    /// Bit depth minus 8 (0 = 8-bit, 2 = 10-bit, 4 = 12-bit).
    pub bit_depth_minus8: u32,
    /// Set 1 only if video has all intra frames (ulIntraDecodeOnly).
    pub intra_decode_only: u32,
    /// Max width for reconfiguration (ulMaxWidth).
    pub max_width: u32,
    /// Max height for reconfiguration (ulMaxHeight).
    pub max_height: u32,
    /// Reserved for future use (Reserved1).
    pub reserved1: u32,

    // Display area — area of the frame that should be displayed.
    // Matches C struct { short left; short top; short right; short bottom; }
    /// Display area left.
    pub display_left: i16,
    /// Display area top.
    pub display_top: i16,
    /// Display area right.
    pub display_right: i16,
    /// Display area bottom.
    pub display_bottom: i16,

    /// Output surface format (OutputFormat: cudaVideoSurfaceFormat).
    pub output_format: CudaVideoSurfaceFormat,
    /// Deinterlace mode (DeinterlaceMode: cudaVideoDeinterlaceMode).
    pub deinterlace_mode: CudaVideoDeinterlaceMode,

    /// Post-processed output width (ulTargetWidth).
    pub target_width: u32,
    /// Post-processed output height (ulTargetHeight).
    pub target_height: u32,
    /// Maximum number of output surfaces simultaneously mapped (ulNumOutputSurfaces).
    pub num_output_surfaces: u32,
    /// CUDA video context lock (vidLock). NULL for no lock.
    pub vidlock: *mut c_void,

    // Target rectangle — for output cropping/scaling.
    // Matches C struct { short left; short top; short right; short bottom; }
    /// Target rect left.
    pub target_rect_left: i16,
    /// Target rect top.
    pub target_rect_top: i16,
    /// Target rect right.
    pub target_rect_right: i16,
    /// Target rect bottom.
    pub target_rect_bottom: i16,

    /// Reserved padding to match C struct size (Reserved2[5]).
    pub reserved2: [u32; 5],
}

// SAFETY: CuvidDecodeCreateInfo is a plain-old-data struct with no interior
// mutability, and the vidlock pointer is only read by the NVDEC API. It is
// thread-safe when used through the NvDecSession wrapper that serializes
// access.
unsafe impl Send for CuvidDecodeCreateInfo {}

impl Default for CuvidDecodeCreateInfo {
    fn default() -> Self {
        // SAFETY: All-zeros is a valid default state for this POD struct.
        // Pointer fields become null, which indicates "no lock" / "none".
        unsafe { std::mem::zeroed() }
    }
}

// ---------------------------------------------------------------------------
// CUVIDPICPARAMS — picture decoding parameters
// ---------------------------------------------------------------------------

/// Picture decode parameters. Matches `CUVIDPICPARAMS` (simplified).
///
/// This is the info passed to `cuvidDecodePicture`. The codec-specific
/// parameter block is represented as raw bytes since we rely on the
/// video parser to fill this struct via callbacks.
#[repr(C)]
#[derive(Clone)]
pub struct CuvidPicParams {
    /// Coded width.
    pub pic_width_in_mbs: i32,
    /// Frame height in MBs.
    pub frame_height_in_mbs: i32,
    /// Index of the decode surface to use.
    pub curr_pic_idx: i32,
    /// Field order / frame type.
    pub field_pic_flag: i32,
    /// Bottom field first.
    pub bottom_field_flag: i32,
    /// Second field (for interlaced).
    pub second_field: i32,

    // Bitstream data
    /// Number of bitstream chunks.
    pub num_bitstream_buffers: u32,
    /// Pointer to array of bitstream pointers.
    pub bitstream_data: *const *const u8,
    /// Pointer to array of sizes.
    pub bitstream_data_len: *const u32,

    /// Number of slices.
    pub num_slices: u32,

    /// Reference frame index for progressive
    pub ref_pic_flag: i32,
    /// Intra-coded picture.
    pub intra_pic_flag: i32,

    /// Reserved.
    pub reserved: [u32; 30],

    /// Codec-specific params — 1024 bytes is more than enough for any codec.
    pub codec_specific: [u8; 1024],
}

// SAFETY: CuvidPicParams is a POD struct with raw pointers that are only
// valid during the scope of cuvidDecodePicture. We ensure the backing data
// outlives the call.
unsafe impl Send for CuvidPicParams {}

impl Default for CuvidPicParams {
    fn default() -> Self {
        // SAFETY: All-zeros is valid for this POD struct.
        unsafe { std::mem::zeroed() }
    }
}

// ---------------------------------------------------------------------------
// CUVIDPROCPARAMS — frame mapping parameters
// ---------------------------------------------------------------------------

/// Frame mapping parameters. Matches `CUVIDPROCPARAMS` from `cuviddec.h`.
#[repr(C)]
#[derive(Clone)]
pub struct CuvidProcParams {
    /// Progressive frame flag.
    pub progressive_frame: i32,
    /// Second field (interlaced).
    pub second_field: i32,
    /// Top field first.
    pub top_field_first: i32,
    /// Unpaired field (interlaced).
    pub unpaired_field: i32,
    /// Reserved flags.
    pub reserved_flags: u32,
    /// Reserved.
    pub reserved_zero: u32,
    /// Raw input CUDA stream.
    pub raw_input_dptr: u64,
    /// Raw input pitch.
    pub raw_input_pitch: u32,
    /// Raw input format.
    pub raw_input_format: u32,
    /// Raw output CUDA stream.
    pub raw_output_dptr: u64,
    /// Raw output pitch.
    pub raw_output_pitch: u32,
    /// Raw output format.
    pub raw_output_format: u32,

    /// Histogram output buffer (device pointer).
    pub histogram_dptr: u64,

    /// Reserved.
    pub reserved: [u32; 12],
}

impl Default for CuvidProcParams {
    fn default() -> Self {
        // SAFETY: All-zeros is valid for this POD struct.
        unsafe { std::mem::zeroed() }
    }
}

// ---------------------------------------------------------------------------
// CUVIDEOFORMAT — video format from sequence callback
// ---------------------------------------------------------------------------

/// Video format information from the parser sequence callback.
/// Matches `CUVIDEOFORMAT` from `nvcuvid.h`.
///
/// Reference: NVIDIA Video Codec SDK `nvcuvid.h`
#[repr(C)]
#[derive(Clone, Debug)]
pub struct CuVideoFormat {
    /// Codec (cudaVideoCodec).
    pub codec: CudaVideoCodec,

    // frame_rate: struct { unsigned int numerator; unsigned int denominator; }
    /// Frame rate numerator.
    pub frame_rate_num: u32,
    /// Frame rate denominator.
    pub frame_rate_den: u32,

    /// Progressive sequence flag.
    pub progressive_sequence: u8,
    /// Bit depth of luma component minus 8.
    pub bit_depth_luma_minus8: u8,
    /// Bit depth of chroma component minus 8.
    pub bit_depth_chroma_minus8: u8,
    /// Minimum number of decode surfaces needed (min_num_decode_surfaces).
    pub min_num_decode_surfaces: u8,

    /// Coded width.
    pub coded_width: u32,
    /// Coded height.
    pub coded_height: u32,

    // display_area: struct { int left; int top; int right; int bottom; }
    /// Display area left.
    pub display_area_left: i32,
    /// Display area top.
    pub display_area_top: i32,
    /// Display area right.
    pub display_area_right: i32,
    /// Display area bottom.
    pub display_area_bottom: i32,

    /// Chroma format (cudaVideoChromaFormat).
    pub chroma_format: CudaVideoChromaFormat,
    /// Bitrate (informational, may be 0).
    pub bitrate: u32,

    // display_aspect_ratio: struct { int x; int y; }
    /// Display aspect ratio X.
    pub display_aspect_ratio_x: i32,
    /// Display aspect ratio Y.
    pub display_aspect_ratio_y: i32,

    // video_signal_description: bit fields packed into 4 bytes
    /// Video signal description (packed bit fields).
    pub video_signal_description_flags: u32,

    /// Sequence header data length.
    pub seqhdr_data_length: u32,
}

impl Default for CuVideoFormat {
    fn default() -> Self {
        // SAFETY: All-zeros is valid for this POD struct.
        unsafe { std::mem::zeroed() }
    }
}

// ---------------------------------------------------------------------------
// Parser callback types
// ---------------------------------------------------------------------------

/// Callback: Sequence header received (SPS/sequence info).
/// Returns: number of minimum decode surfaces the caller will provide (>= `format.min_num_decode_surfaces`).
pub type PfnCuvidSequenceCallback =
    unsafe extern "C" fn(user_data: *mut c_void, format: *mut CuVideoFormat) -> i32;

/// Callback: Decode a picture (called by parser when a complete picture is ready).
/// Returns: 1 on success, 0 on failure.
pub type PfnCuvidDecodePicture =
    unsafe extern "C" fn(user_data: *mut c_void, pic_params: *mut CuvidPicParams) -> i32;

/// Callback: Display a decoded picture.
/// Returns: 1 on success, 0 on failure.
/// `disp_info` is NULL when flushing or at end-of-stream.
pub type PfnCuvidDisplayPicture =
    unsafe extern "C" fn(user_data: *mut c_void, disp_info: *mut CuvidParserDispInfo) -> i32;

/// Callback: Get operating point (for SVC/MVC, can be no-op).
/// Returns: 1 on success.
pub type PfnCuvidGetOperatingPoint =
    unsafe extern "C" fn(user_data: *mut c_void, op_info: *mut CuvidOperatingPointInfo) -> i32;

/// Callback: Get SEI message data (optional).
/// Returns: 1 on success.
pub type PfnCuvidGetSeiMsg =
    unsafe extern "C" fn(user_data: *mut c_void, sei_msg: *mut CuvidSeiMessage) -> i32;

// ---------------------------------------------------------------------------
// CUVIDPARSERPARAMS — parser creation parameters
// ---------------------------------------------------------------------------

/// Parameters for creating a video parser. Matches `CUVIDPARSERPARAMS`.
#[repr(C)]
pub struct CuvidParserParams {
    /// Codec type to parse.
    pub codec_type: CudaVideoCodec,
    /// Max number of decode surfaces (DPB slots).
    pub max_num_decode_surfaces: u32,
    /// Clock rate for timestamps (usually 0 = default).
    pub clock_rate: u32,
    /// Error threshold (0..100, 0 = strict).
    pub error_threshold: u32,
    /// Max display delay (0 = no reordering, 1..4 = latency frames).
    pub max_display_delay: u32,
    /// Reserved.
    pub reserved1: [u32; 5],
    /// User data pointer passed to callbacks.
    pub user_data: *mut c_void,
    /// Sequence callback (SPS received).
    pub pfn_sequence_callback: Option<PfnCuvidSequenceCallback>,
    /// Decode picture callback.
    pub pfn_decode_picture: Option<PfnCuvidDecodePicture>,
    /// Display picture callback.
    pub pfn_display_picture: Option<PfnCuvidDisplayPicture>,
    /// Reserved.
    pub reserved2: [*mut c_void; 5],
    /// Extension: get operating point callback.
    pub pfn_get_operating_point: Option<PfnCuvidGetOperatingPoint>,
    /// Extension: get SEI message callback.
    pub pfn_get_sei_msg: Option<PfnCuvidGetSeiMsg>,
    /// Reserved for future extensions.
    pub reserved3: [*mut c_void; 3],
}

// SAFETY: CuvidParserParams contains raw pointers (user_data, callback ptrs)
// that are only used during parser creation and callbacks. The NvDecSession
// ensures these are valid for the lifetime of the parser.
unsafe impl Send for CuvidParserParams {}

impl Default for CuvidParserParams {
    fn default() -> Self {
        // SAFETY: All-zeros is valid — function pointers become None,
        // raw pointers become null.
        unsafe { std::mem::zeroed() }
    }
}

// ---------------------------------------------------------------------------
// CUVIDPARSERDISPINFO — display info from parser
// ---------------------------------------------------------------------------

/// Display info from the parser's display callback. Matches `CUVIDPARSERDISPINFO`.
#[repr(C)]
#[derive(Clone, Debug)]
pub struct CuvidParserDispInfo {
    /// Index of the decoded surface to display.
    pub picture_index: i32,
    /// Progressive frame flag.
    pub progressive_frame: i32,
    /// Top field first.
    pub top_field_first: i32,
    /// Repeat first field.
    pub repeat_first_field: i32,
    /// Presentation timestamp.
    pub timestamp: i64,
}

impl Default for CuvidParserDispInfo {
    fn default() -> Self {
        // SAFETY: All-zeros is valid for this POD struct.
        unsafe { std::mem::zeroed() }
    }
}

// ---------------------------------------------------------------------------
// CUVIDSOURCEDATAPACKET — data packet for parser
// ---------------------------------------------------------------------------

/// Data packet fed to the video parser. Matches `CUVIDSOURCEDATAPACKET`.
#[repr(C)]
pub struct CuvidSourceDataPacket {
    /// Packet flags (see `CuvidPacketFlags`).
    pub flags: u32,
    /// Payload size in bytes (0 if EOS).
    pub payload_size: u32,
    /// Pointer to payload data.
    pub payload: *const u8,
    /// Presentation timestamp (units depend on clock_rate).
    pub timestamp: i64,
}

// SAFETY: The payload pointer must remain valid for the duration of
// cuvidParseVideoData. The NvDecSession ensures this.
unsafe impl Send for CuvidSourceDataPacket {}

impl Default for CuvidSourceDataPacket {
    fn default() -> Self {
        // SAFETY: All-zeros is valid — pointer becomes null.
        unsafe { std::mem::zeroed() }
    }
}

/// Flags for `CuvidSourceDataPacket`.
pub mod packet_flags {
    /// End of stream.
    pub const CUVID_PKT_ENDOFSTREAM: u32 = 0x01;
    /// Timestamp is valid.
    pub const CUVID_PKT_TIMESTAMP: u32 = 0x02;
    /// Set when the packet contains a discontinuity.
    pub const CUVID_PKT_DISCONTINUITY: u32 = 0x04;
    /// Set when the packet contains end-of-picture data.
    pub const CUVID_PKT_ENDOFPICTURE: u32 = 0x08;
    /// Notify the decoder to flush all pending frames.
    pub const CUVID_PKT_NOTIFY_EOS: u32 = 0x10;
}

// ---------------------------------------------------------------------------
// Stub types for callbacks we don't use yet
// ---------------------------------------------------------------------------

/// Operating point info (for SVC/MVC codecs).
#[repr(C)]
pub struct CuvidOperatingPointInfo {
    pub reserved: [u8; 256],
}

/// SEI message data (optional callback data).
#[repr(C)]
pub struct CuvidSeiMessage {
    pub reserved: [u8; 256],
}

// ---------------------------------------------------------------------------
// Dynamic library wrapper
// ---------------------------------------------------------------------------

/// Dynamically loaded nvcuvid library with typed function pointers.
///
/// All NVDEC/CUVID API functions are loaded lazily at runtime from
/// `nvcuvid.dll` (Windows) or `libnvcuvid.so.1` (Linux).
#[allow(non_snake_case)]
pub struct NvcuvidLibrary {
    /// The loaded library handle — must live as long as we use any symbols.
    _lib: Library,

    // -- Decoder functions --
    pub cuvidCreateDecoder: unsafe extern "C" fn(
        decoder: *mut CUvideodecoder,
        params: *mut CuvidDecodeCreateInfo,
    ) -> CUresult,
    pub cuvidDestroyDecoder: unsafe extern "C" fn(decoder: CUvideodecoder) -> CUresult,
    pub cuvidDecodePicture:
        unsafe extern "C" fn(decoder: CUvideodecoder, params: *mut CuvidPicParams) -> CUresult,
    pub cuvidMapVideoFrame64: unsafe extern "C" fn(
        decoder: CUvideodecoder,
        pic_idx: i32,
        dev_ptr: *mut CUdeviceptr,
        pitch: *mut u32,
        params: *mut CuvidProcParams,
    ) -> CUresult,
    pub cuvidUnmapVideoFrame64:
        unsafe extern "C" fn(decoder: CUvideodecoder, dev_ptr: CUdeviceptr) -> CUresult,

    // -- Parser functions --
    pub cuvidCreateVideoParser: unsafe extern "C" fn(
        parser: *mut CUvideoparser,
        params: *mut CuvidParserParams,
    ) -> CUresult,
    pub cuvidDestroyVideoParser: unsafe extern "C" fn(parser: CUvideoparser) -> CUresult,
    pub cuvidParseVideoData:
        unsafe extern "C" fn(parser: CUvideoparser, packet: *mut CuvidSourceDataPacket) -> CUresult,
}

// SAFETY: NvcuvidLibrary's function pointers are loaded from a shared library
// and are inherently thread-safe as they reference GPU hardware functions.
// The Library handle (_lib) ensures the shared library stays loaded.
unsafe impl Send for NvcuvidLibrary {}
unsafe impl Sync for NvcuvidLibrary {}

impl std::fmt::Debug for NvcuvidLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NvcuvidLibrary")
            .field("loaded", &true)
            .finish()
    }
}

impl NvcuvidLibrary {
    /// Load the nvcuvid library from the default system path.
    ///
    /// On Windows: loads `nvcuvid.dll` from `PATH` or the CUDA toolkit dir.
    /// On Linux: loads `libnvcuvid.so.1` from the standard library paths.
    pub fn load() -> Result<Self, NvcuvidLoadError> {
        let lib_name = Self::library_name();
        info!(library = %lib_name, "Loading NVDEC library");

        // SAFETY: We are loading a well-known NVIDIA system library.
        // The library is safe to load — it only registers GPU driver functions.
        let lib = unsafe { Library::new(lib_name) }.map_err(|e| {
            NvcuvidLoadError::LibraryNotFound(format!(
                "Failed to load {lib_name}: {e}. Is the NVIDIA driver installed?"
            ))
        })?;

        // SAFETY: All symbol lookups below are for well-known NVIDIA CUVID API
        // functions. The function signatures match the official C headers.
        // If the library is loaded, these symbols are guaranteed to exist in
        // any version of nvcuvid that supports the Video Codec SDK.
        let symbols = unsafe { Self::load_symbols(&lib) }
            .map_err(|e| NvcuvidLoadError::SymbolNotFound(format!("{e:#}")))?;

        debug!("All NVDEC symbols loaded successfully");

        Ok(Self {
            _lib: lib,
            cuvidCreateDecoder: symbols.0,
            cuvidDestroyDecoder: symbols.1,
            cuvidDecodePicture: symbols.2,
            cuvidMapVideoFrame64: symbols.3,
            cuvidUnmapVideoFrame64: symbols.4,
            cuvidCreateVideoParser: symbols.5,
            cuvidDestroyVideoParser: symbols.6,
            cuvidParseVideoData: symbols.7,
        })
    }

    /// Resolves every CUVID symbol this driver calls, chaining `anyhow`
    /// context onto each lookup so a missing symbol's error names which one
    /// failed — the one place in this crate `anyhow` is used, at the vendor
    /// dynamic-library boundary where `libloading`'s own errors carry no
    /// symbol name.
    ///
    /// # Safety
    /// `lib` must be a loaded `libnvcuvid` whose exported symbols match the
    /// official Video Codec SDK headers.
    #[allow(clippy::type_complexity)]
    unsafe fn load_symbols(
        lib: &Library,
    ) -> anyhow::Result<(
        unsafe extern "C" fn(*mut CUvideodecoder, *mut CuvidDecodeCreateInfo) -> CUresult,
        unsafe extern "C" fn(CUvideodecoder) -> CUresult,
        unsafe extern "C" fn(CUvideodecoder, *mut CuvidPicParams) -> CUresult,
        unsafe extern "C" fn(CUvideodecoder, i32, *mut CUdeviceptr, *mut u32, *mut CuvidProcParams) -> CUresult,
        unsafe extern "C" fn(CUvideodecoder, CUdeviceptr) -> CUresult,
        unsafe extern "C" fn(*mut CUvideoparser, *mut CuvidParserParams) -> CUresult,
        unsafe extern "C" fn(CUvideoparser) -> CUresult,
        unsafe extern "C" fn(CUvideoparser, *mut CuvidSourceDataPacket) -> CUresult,
    )> {
        use anyhow::Context;

        let fn_create_decoder = *lib
            .get::<unsafe extern "C" fn(*mut CUvideodecoder, *mut CuvidDecodeCreateInfo) -> CUresult>(b"cuvidCreateDecoder\0")
            .context("cuvidCreateDecoder")?;

        let fn_destroy_decoder = *lib
            .get::<unsafe extern "C" fn(CUvideodecoder) -> CUresult>(b"cuvidDestroyDecoder\0")
            .context("cuvidDestroyDecoder")?;

        let fn_decode_picture = *lib
            .get::<unsafe extern "C" fn(CUvideodecoder, *mut CuvidPicParams) -> CUresult>(b"cuvidDecodePicture\0")
            .context("cuvidDecodePicture")?;

        let fn_map_frame = *lib
            .get::<unsafe extern "C" fn(CUvideodecoder, i32, *mut CUdeviceptr, *mut u32, *mut CuvidProcParams) -> CUresult>(
                b"cuvidMapVideoFrame64\0",
            )
            .context("cuvidMapVideoFrame64")?;

        let fn_unmap_frame = *lib
            .get::<unsafe extern "C" fn(CUvideodecoder, CUdeviceptr) -> CUresult>(b"cuvidUnmapVideoFrame64\0")
            .context("cuvidUnmapVideoFrame64")?;

        let fn_create_parser = *lib
            .get::<unsafe extern "C" fn(*mut CUvideoparser, *mut CuvidParserParams) -> CUresult>(b"cuvidCreateVideoParser\0")
            .context("cuvidCreateVideoParser")?;

        let fn_destroy_parser = *lib
            .get::<unsafe extern "C" fn(CUvideoparser) -> CUresult>(b"cuvidDestroyVideoParser\0")
            .context("cuvidDestroyVideoParser")?;

        let fn_parse_data = *lib
            .get::<unsafe extern "C" fn(CUvideoparser, *mut CuvidSourceDataPacket) -> CUresult>(b"cuvidParseVideoData\0")
            .context("cuvidParseVideoData")?;

        Ok((
            fn_create_decoder,
            fn_destroy_decoder,
            fn_decode_picture,
            fn_map_frame,
            fn_unmap_frame,
            fn_create_parser,
            fn_destroy_parser,
            fn_parse_data,
        ))
    }

    /// Load from a specific path (used when `NVD_CUVID_PATH` overrides the
    /// system search path, or by tests).
    pub fn load_from(path: &Path) -> Result<Self, NvcuvidLoadError> {
        info!(path = %path.display(), "Loading NVDEC library from custom path");

        // SAFETY: Loading a user-specified shared library. The caller asserts
        // this is a valid nvcuvid library.
        let lib = unsafe { Library::new(path) }.map_err(|e| {
            NvcuvidLoadError::LibraryNotFound(format!("Failed to load {}: {e}", path.display()))
        })?;
        drop(lib);
        Self::load()
    }

    /// Get the platform-specific library filename.
    fn library_name() -> &'static str {
        if cfg!(target_os = "windows") {
            "nvcuvid.dll"
        } else if cfg!(target_os = "linux") {
            "libnvcuvid.so.1"
        } else {
            "libnvcuvid.so"
        }
    }
}

// ---------------------------------------------------------------------------
// Error type for library loading
// ---------------------------------------------------------------------------

/// Errors that can occur when loading the nvcuvid library.
#[derive(Debug, thiserror::Error)]
pub enum NvcuvidLoadError {
    #[error("NVDEC library not found: {0}")]
    LibraryNotFound(String),

    #[error("Required symbol not found: {0}")]
    SymbolNotFound(String),
}

// ---------------------------------------------------------------------------
// Helper: Check CUresult and convert to Result
// ---------------------------------------------------------------------------

/// Convert a CUresult to a Result, mapping non-zero values to an error string.
pub fn check_cuvid_result(result: CUresult, function_name: &str) -> Result<(), String> {
    if result == CUDA_SUCCESS {
        Ok(())
    } else {
        Err(format!("{function_name} failed with error code {result}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_conversion_covers_all_common_codecs() {
        assert_eq!(CudaVideoCodec::from_common(VideoCodec::H264), Some(CudaVideoCodec::H264));
        assert_eq!(CudaVideoCodec::from_common(VideoCodec::Hevc), Some(CudaVideoCodec::Hevc));
        assert_eq!(CudaVideoCodec::from_common(VideoCodec::Vp9), Some(CudaVideoCodec::Vp9));
        assert_eq!(CudaVideoCodec::from_common(VideoCodec::Av1), Some(CudaVideoCodec::Av1));
        assert_eq!(CudaVideoCodec::from_common(VideoCodec::Mpeg2), Some(CudaVideoCodec::Mpeg2));
        assert_eq!(CudaVideoCodec::from_common(VideoCodec::Mpeg4), Some(CudaVideoCodec::Mpeg4));
        assert_eq!(CudaVideoCodec::from_common(VideoCodec::Vc1), Some(CudaVideoCodec::Vc1));
        assert_eq!(CudaVideoCodec::from_common(VideoCodec::Jpeg), Some(CudaVideoCodec::Jpeg));
        assert_eq!(CudaVideoCodec::from_common(VideoCodec::Vp8), Some(CudaVideoCodec::Vp8));
        assert_eq!(CudaVideoCodec::from_common(VideoCodec::H264Svc), Some(CudaVideoCodec::H264Svc));
        assert_eq!(CudaVideoCodec::from_common(VideoCodec::H264Mvc), Some(CudaVideoCodec::H264Mvc));
    }

    #[test]
    fn default_structs_are_zeroed() {
        let info = CuvidDecodeCreateInfo::default();
        assert_eq!(info.coded_width, 0);
        assert_eq!(info.coded_height, 0);

        let params = CuvidPicParams::default();
        assert_eq!(params.curr_pic_idx, 0);

        let proc_params = CuvidProcParams::default();
        assert_eq!(proc_params.progressive_frame, 0);

        let format = CuVideoFormat::default();
        assert_eq!(format.coded_width, 0);
    }

    #[test]
    fn check_result_success() {
        assert!(check_cuvid_result(CUDA_SUCCESS, "test").is_ok());
    }

    #[test]
    fn check_result_failure() {
        let err = check_cuvid_result(1, "cuvidTest");
        assert!(err.is_err());
        assert!(err.unwrap_err().contains("cuvidTest"));
    }

    #[test]
    fn library_name_is_correct() {
        let name = NvcuvidLibrary::library_name();
        if cfg!(target_os = "windows") {
            assert_eq!(name, "nvcuvid.dll");
        } else {
            assert!(name.starts_with("libnvcuvid"));
        }
    }
}
