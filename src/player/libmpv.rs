//! `NativeApi` over the system libmpv (`libmpv2-sys`).

use super::ffi::{Format, NativeApi, RawEvent, RawHandle};
use libmpv2_sys::*;
use std::ffi::{CStr, c_char, c_int, c_void};
use tracing::debug;

/// The real engine. Stateless; every call forwards to the C client API.
#[derive(Debug, Default)]
pub struct LibMpv;

impl LibMpv {
    pub fn new() -> Self {
        // libmpv refuses to work with a locale that does not use '.' as
        // decimal separator.
        unsafe {
            libc::setlocale(libc::LC_NUMERIC, c"C".as_ptr());
        }
        LibMpv
    }
}

fn ctx(handle: RawHandle) -> *mut mpv_handle {
    handle.as_ptr().cast()
}

fn raw_format(format: Format) -> mpv_format {
    format.as_raw() as mpv_format
}

impl NativeApi for LibMpv {
    fn client_api_version(&self) -> u64 {
        unsafe { mpv_client_api_version() as u64 }
    }

    fn create(&self) -> Option<RawHandle> {
        let handle = unsafe { mpv_create() };
        if handle.is_null() {
            debug!("mpv_create returned null");
        }
        RawHandle::new(handle.cast())
    }

    fn error_string(&self, code: c_int) -> String {
        let text = unsafe { mpv_error_string(code) };
        if text.is_null() {
            return super::ffi::error_name(code).to_string();
        }
        // Static string owned by libmpv
        unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
    }

    unsafe fn destroy(&self, handle: RawHandle) {
        unsafe { mpv_terminate_destroy(ctx(handle)) }
    }

    unsafe fn initialize(&self, handle: RawHandle) -> c_int {
        unsafe { mpv_initialize(ctx(handle)) }
    }

    unsafe fn request_log_messages(&self, handle: RawHandle, min_level: &CStr) -> c_int {
        unsafe { mpv_request_log_messages(ctx(handle), min_level.as_ptr()) }
    }

    unsafe fn set_option_string(&self, handle: RawHandle, name: &CStr, value: &CStr) -> c_int {
        unsafe { mpv_set_option_string(ctx(handle), name.as_ptr(), value.as_ptr()) }
    }

    unsafe fn set_option(
        &self,
        handle: RawHandle,
        name: &CStr,
        format: Format,
        data: *mut c_void,
    ) -> c_int {
        unsafe { mpv_set_option(ctx(handle), name.as_ptr(), raw_format(format), data) }
    }

    unsafe fn get_property(
        &self,
        handle: RawHandle,
        name: &CStr,
        format: Format,
        data: *mut c_void,
    ) -> c_int {
        unsafe { mpv_get_property(ctx(handle), name.as_ptr(), raw_format(format), data) }
    }

    unsafe fn command(&self, handle: RawHandle, args: *mut *const c_char) -> c_int {
        unsafe { mpv_command(ctx(handle), args) }
    }

    unsafe fn wait_event(&self, handle: RawHandle, timeout: f64) -> *const RawEvent {
        // `RawEvent` mirrors `mpv_event` field for field
        unsafe { mpv_wait_event(ctx(handle), timeout) }
            .cast_const()
            .cast()
    }

    unsafe fn wakeup(&self, handle: RawHandle) {
        unsafe { mpv_wakeup(ctx(handle)) }
    }

    unsafe fn observe_property(
        &self,
        handle: RawHandle,
        token: u64,
        name: &CStr,
        format: Format,
    ) -> c_int {
        unsafe { mpv_observe_property(ctx(handle), token, name.as_ptr(), raw_format(format)) }
    }

    unsafe fn unobserve_property(&self, handle: RawHandle, token: u64) -> c_int {
        unsafe { mpv_unobserve_property(ctx(handle), token) }
    }

    unsafe fn free(&self, data: *mut c_void) {
        unsafe { mpv_free(data) }
    }
}
