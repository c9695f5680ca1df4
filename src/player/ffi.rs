//! The native engine ABI seam.
//!
//! `NativeApi` mirrors the C entry points of libmpv one-to-one. Everything
//! above this module talks to the engine exclusively through this trait, so
//! the lifecycle and ownership rules are enforced in one place regardless of
//! which binding sits underneath.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr::NonNull;

/// Opaque identifier of one native engine instance.
///
/// This is only an address. It grants no access by itself; every call that
/// dereferences it goes through `Engine`, which guards it against disposal.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(NonNull<c_void>);

// The engine is documented as thread-safe for all client API calls.
unsafe impl Send for RawHandle {}
unsafe impl Sync for RawHandle {}

impl RawHandle {
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }

    pub fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }
}

/// Data formats understood by the engine (`mpv_format`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    None,
    String,
    OsdString,
    Flag,
    Int64,
    Double,
    Node,
    NodeArray,
    NodeMap,
    ByteArray,
}

impl Format {
    pub fn as_raw(self) -> c_int {
        match self {
            Format::None => 0,
            Format::String => 1,
            Format::OsdString => 2,
            Format::Flag => 3,
            Format::Int64 => 4,
            Format::Double => 5,
            Format::Node => 6,
            Format::NodeArray => 7,
            Format::NodeMap => 8,
            Format::ByteArray => 9,
        }
    }

    pub fn from_raw(raw: c_int) -> Option<Self> {
        Some(match raw {
            0 => Format::None,
            1 => Format::String,
            2 => Format::OsdString,
            3 => Format::Flag,
            4 => Format::Int64,
            5 => Format::Double,
            6 => Format::Node,
            7 => Format::NodeArray,
            8 => Format::NodeMap,
            9 => Format::ByteArray,
            _ => return None,
        })
    }

    /// Formats this layer can decode into a `PropertyValue`.
    pub fn is_decodable(self) -> bool {
        matches!(
            self,
            Format::String | Format::Flag | Format::Int64 | Format::Double
        )
    }
}

/// Event ids (`mpv_event_id`).
pub mod event_id {
    use std::ffi::c_int;

    pub const NONE: c_int = 0;
    pub const SHUTDOWN: c_int = 1;
    pub const LOG_MESSAGE: c_int = 2;
    pub const GET_PROPERTY_REPLY: c_int = 3;
    pub const SET_PROPERTY_REPLY: c_int = 4;
    pub const COMMAND_REPLY: c_int = 5;
    pub const START_FILE: c_int = 6;
    pub const END_FILE: c_int = 7;
    pub const FILE_LOADED: c_int = 8;
    pub const CLIENT_MESSAGE: c_int = 16;
    pub const VIDEO_RECONFIG: c_int = 17;
    pub const AUDIO_RECONFIG: c_int = 18;
    pub const SEEK: c_int = 20;
    pub const PLAYBACK_RESTART: c_int = 21;
    pub const PROPERTY_CHANGE: c_int = 22;
    pub const QUEUE_OVERFLOW: c_int = 24;
    pub const HOOK: c_int = 25;
}

/// End-of-file reasons (`mpv_end_file_reason`).
pub mod end_file_reason {
    use std::ffi::c_int;

    pub const EOF: c_int = 0;
    pub const STOP: c_int = 2;
    pub const QUIT: c_int = 3;
    pub const ERROR: c_int = 4;
    pub const REDIRECT: c_int = 5;
}

/// Error codes (`mpv_error`).
pub mod error_code {
    use std::ffi::c_int;

    pub const SUCCESS: c_int = 0;
    pub const EVENT_QUEUE_FULL: c_int = -1;
    pub const NOMEM: c_int = -2;
    pub const UNINITIALIZED: c_int = -3;
    pub const INVALID_PARAMETER: c_int = -4;
    pub const OPTION_NOT_FOUND: c_int = -5;
    pub const OPTION_FORMAT: c_int = -6;
    pub const OPTION_ERROR: c_int = -7;
    pub const PROPERTY_NOT_FOUND: c_int = -8;
    pub const PROPERTY_FORMAT: c_int = -9;
    pub const PROPERTY_UNAVAILABLE: c_int = -10;
    pub const PROPERTY_ERROR: c_int = -11;
    pub const COMMAND: c_int = -12;
    pub const LOADING_FAILED: c_int = -13;
    pub const AO_INIT_FAILED: c_int = -14;
    pub const VO_INIT_FAILED: c_int = -15;
    pub const NOTHING_TO_PLAY: c_int = -16;
    pub const UNKNOWN_FORMAT: c_int = -17;
    pub const UNSUPPORTED: c_int = -18;
    pub const NOT_IMPLEMENTED: c_int = -19;
    pub const GENERIC: c_int = -20;
}

/// Symbolic name of a native error code, for log lines.
pub fn error_name(code: c_int) -> &'static str {
    match code {
        0 => "MPV_ERROR_SUCCESS",
        -1 => "MPV_ERROR_EVENT_QUEUE_FULL",
        -2 => "MPV_ERROR_NOMEM",
        -3 => "MPV_ERROR_UNINITIALIZED",
        -4 => "MPV_ERROR_INVALID_PARAMETER",
        -5 => "MPV_ERROR_OPTION_NOT_FOUND",
        -6 => "MPV_ERROR_OPTION_FORMAT",
        -7 => "MPV_ERROR_OPTION_ERROR",
        -8 => "MPV_ERROR_PROPERTY_NOT_FOUND",
        -9 => "MPV_ERROR_PROPERTY_FORMAT",
        -10 => "MPV_ERROR_PROPERTY_UNAVAILABLE",
        -11 => "MPV_ERROR_PROPERTY_ERROR",
        -12 => "MPV_ERROR_COMMAND",
        -13 => "MPV_ERROR_LOADING_FAILED",
        -14 => "MPV_ERROR_AO_INIT_FAILED",
        -15 => "MPV_ERROR_VO_INIT_FAILED",
        -16 => "MPV_ERROR_NOTHING_TO_PLAY",
        -17 => "MPV_ERROR_UNKNOWN_FORMAT",
        -18 => "MPV_ERROR_UNSUPPORTED",
        -19 => "MPV_ERROR_NOT_IMPLEMENTED",
        -20 => "MPV_ERROR_GENERIC",
        _ => "Unknown error",
    }
}

/// Layout-compatible mirror of `mpv_event`.
#[repr(C)]
#[derive(Debug)]
pub struct RawEvent {
    pub event_id: c_int,
    pub error: c_int,
    pub reply_userdata: u64,
    pub data: *mut c_void,
}

/// Layout-compatible mirror of `mpv_event_property`.
#[repr(C)]
#[derive(Debug)]
pub struct RawEventProperty {
    pub name: *const c_char,
    pub format: c_int,
    pub data: *mut c_void,
}

/// Layout-compatible mirror of `mpv_event_log_message`.
#[repr(C)]
#[derive(Debug)]
pub struct RawLogMessage {
    pub prefix: *const c_char,
    pub level: *const c_char,
    pub text: *const c_char,
    pub log_level: c_int,
}

/// Leading fields of `mpv_event_end_file`; later fields are never read.
#[repr(C)]
#[derive(Debug)]
pub struct RawEndFile {
    pub reason: c_int,
    pub error: c_int,
}

/// The engine's C client API.
///
/// Every `unsafe` method requires `handle` to come from `create` on the same
/// implementation and not to have been passed to `destroy` yet. Return codes
/// follow the engine convention: `>= 0` success, negative error.
pub trait NativeApi: Send + Sync + 'static {
    fn client_api_version(&self) -> u64;

    /// Returns `None` when the native factory hands back a null handle.
    fn create(&self) -> Option<RawHandle>;

    /// Human readable text for an error code.
    fn error_string(&self, code: c_int) -> String;

    /// # Safety
    /// `handle` must be live and never used again afterwards.
    unsafe fn destroy(&self, handle: RawHandle);

    /// # Safety
    /// See the trait documentation.
    unsafe fn initialize(&self, handle: RawHandle) -> c_int;

    /// # Safety
    /// See the trait documentation.
    unsafe fn request_log_messages(&self, handle: RawHandle, min_level: &CStr) -> c_int;

    /// # Safety
    /// See the trait documentation.
    unsafe fn set_option_string(&self, handle: RawHandle, name: &CStr, value: &CStr) -> c_int;

    /// # Safety
    /// `data` must point to a value laid out as `format` describes.
    unsafe fn set_option(
        &self,
        handle: RawHandle,
        name: &CStr,
        format: Format,
        data: *mut c_void,
    ) -> c_int;

    /// # Safety
    /// `data` must point to writable storage for `format`. For
    /// `Format::String` the engine writes a pointer it allocated, which must
    /// be released with `free`.
    unsafe fn get_property(
        &self,
        handle: RawHandle,
        name: &CStr,
        format: Format,
        data: *mut c_void,
    ) -> c_int;

    /// # Safety
    /// `args` must be a null-terminated array of valid C strings.
    unsafe fn command(&self, handle: RawHandle, args: *mut *const c_char) -> c_int;

    /// Blocks for at most `timeout` seconds. The returned event (and all
    /// memory it points to) stays valid until the next `wait_event` on the
    /// same handle or until `destroy`.
    ///
    /// # Safety
    /// See the trait documentation.
    unsafe fn wait_event(&self, handle: RawHandle, timeout: f64) -> *const RawEvent;

    /// Interrupts a blocked `wait_event`.
    ///
    /// # Safety
    /// See the trait documentation.
    unsafe fn wakeup(&self, handle: RawHandle);

    /// # Safety
    /// See the trait documentation.
    unsafe fn observe_property(
        &self,
        handle: RawHandle,
        token: u64,
        name: &CStr,
        format: Format,
    ) -> c_int;

    /// Returns the number of removed registrations, or a negative error.
    ///
    /// # Safety
    /// See the trait documentation.
    unsafe fn unobserve_property(&self, handle: RawHandle, token: u64) -> c_int;

    /// # Safety
    /// `data` must have been allocated by the engine and not freed yet.
    unsafe fn free(&self, data: *mut c_void);
}
