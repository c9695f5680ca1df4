//! Typed access to engine options and properties.
//!
//! Ownership rule: a `Format::String` read hands back memory the engine
//! allocated, which must go back through the engine's `free`. Scalar reads
//! are written by value into a typed slot and there is nothing to release.
//! Strings are only ever read through `NativeString`, whose `Drop` does the
//! release, and scalars only through `ScalarSlot` types, which have no
//! pointer to free.

use super::engine::Engine;
use super::errors::{EngineError, EngineResult};
use super::ffi::{Format, NativeApi, error_code};
use crate::constants::STATUS_TOKEN_BASE;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::PoisonError;
use tracing::{debug, trace};

/// A decoded property or option value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Flag(bool),
    Int64(i64),
    Double(f64),
    String(String),
}

impl PropertyValue {
    pub fn format(&self) -> Format {
        match self {
            PropertyValue::Flag(_) => Format::Flag,
            PropertyValue::Int64(_) => Format::Int64,
            PropertyValue::Double(_) => Format::Double,
            PropertyValue::String(_) => Format::String,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            PropertyValue::Flag(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Flag(true) => f.write_str("yes"),
            PropertyValue::Flag(false) => f.write_str("no"),
            PropertyValue::Int64(value) => write!(f, "{}", value),
            PropertyValue::Double(value) => write!(f, "{}", value),
            PropertyValue::String(value) => f.write_str(value),
        }
    }
}

/// One property-change registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedProperty {
    pub token: u64,
    pub name: String,
    pub format: Format,
}

pub(crate) fn to_cstring(value: &str) -> EngineResult<CString> {
    CString::new(value)
        .map_err(|_| EngineError::InvalidArgument(format!("{:?} contains a NUL byte", value)))
}

/// A string allocated by the engine, released through the engine on drop.
pub(crate) struct NativeString<'a> {
    api: &'a dyn NativeApi,
    ptr: NonNull<c_char>,
}

impl<'a> NativeString<'a> {
    /// # Safety
    /// `ptr` must be null or a NUL-terminated string allocated by `api`
    /// that nobody else will free.
    pub(crate) unsafe fn from_raw(api: &'a dyn NativeApi, ptr: *mut c_char) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { api, ptr })
    }

    pub(crate) fn to_string_lossy(&self) -> String {
        // SAFETY: guaranteed NUL-terminated by `from_raw`'s contract.
        unsafe { CStr::from_ptr(self.ptr.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

impl Drop for NativeString<'_> {
    fn drop(&mut self) {
        // SAFETY: we own the allocation and release it exactly once.
        unsafe { self.api.free(self.ptr.as_ptr().cast()) };
    }
}

/// Plain-data storage the engine fills by value.
pub(crate) trait ScalarSlot: Copy + Default {
    const FORMAT: Format;
}

impl ScalarSlot for c_int {
    const FORMAT: Format = Format::Flag;
}

impl ScalarSlot for i64 {
    const FORMAT: Format = Format::Int64;
}

impl ScalarSlot for f64 {
    const FORMAT: Format = Format::Double;
}

impl Engine {
    /// Set an option from its string form. Works before and after
    /// `initialize()`; unknown names or values fail with `EngineError::Option`.
    pub fn set_option(&self, key: &str, value: &str) -> EngineResult<()> {
        let ckey = to_cstring(key)?;
        let cvalue = to_cstring(value)?;
        trace!("set_option {}={}", key, value);

        self.core.with_handle(|api, handle| {
            // SAFETY: live handle, valid C strings.
            let code = unsafe { api.set_option_string(handle, &ckey, &cvalue) };
            if code < 0 {
                debug!("Option {}={} rejected: {}", key, value, code);
                return Err(self.option_error(key, value, code));
            }
            Ok(())
        })
    }

    /// Set an option from a typed value (e.g. a window id as `Int64`)
    pub fn set_option_value(&self, key: &str, value: &PropertyValue) -> EngineResult<()> {
        match value {
            PropertyValue::Flag(flag) => {
                let mut slot: c_int = c_int::from(*flag);
                // SAFETY: `slot` is a live c_int for the duration of the call.
                unsafe { self.set_option_typed(key, value, Format::Flag, (&raw mut slot).cast()) }
            }
            PropertyValue::Int64(number) => {
                let mut slot: i64 = *number;
                unsafe { self.set_option_typed(key, value, Format::Int64, (&raw mut slot).cast()) }
            }
            PropertyValue::Double(number) => {
                let mut slot: f64 = *number;
                unsafe { self.set_option_typed(key, value, Format::Double, (&raw mut slot).cast()) }
            }
            PropertyValue::String(text) => self.set_option(key, text),
        }
    }

    /// Set an option from raw data.
    ///
    /// # Safety
    /// `data` must point to a value laid out as `format` describes and stay
    /// valid for the duration of the call.
    pub unsafe fn set_option_raw(
        &self,
        key: &str,
        format: Format,
        data: *mut c_void,
    ) -> EngineResult<()> {
        let shown = format!("<{:?}>", format);
        let ckey = to_cstring(key)?;
        self.core.with_handle(|api, handle| {
            // SAFETY: forwarded from the caller's contract.
            let code = unsafe { api.set_option(handle, &ckey, format, data) };
            if code < 0 {
                return Err(self.option_error(key, &shown, code));
            }
            Ok(())
        })
    }

    unsafe fn set_option_typed(
        &self,
        key: &str,
        value: &PropertyValue,
        format: Format,
        data: *mut c_void,
    ) -> EngineResult<()> {
        let ckey = to_cstring(key)?;
        trace!("set_option {}={} ({:?})", key, value, format);
        self.core.with_handle(|api, handle| {
            // SAFETY: forwarded from the caller's contract.
            let code = unsafe { api.set_option(handle, &ckey, format, data) };
            if code < 0 {
                return Err(self.option_error(key, &value.to_string(), code));
            }
            Ok(())
        })
    }

    fn option_error(&self, key: &str, value: &str, code: c_int) -> EngineError {
        EngineError::Option {
            key: key.to_string(),
            value: value.to_string(),
            code,
            message: self.core.message(code),
        }
    }

    pub(crate) fn property_error(&self, name: &str, code: c_int) -> EngineError {
        EngineError::Property {
            name: name.to_string(),
            code,
            message: self.core.message(code),
        }
    }

    /// Read a property in one of the decodable formats. Other formats fail
    /// with `EngineError::UnsupportedFormat` without touching the engine.
    pub fn get_property(&self, name: &str, format: Format) -> EngineResult<PropertyValue> {
        match format {
            Format::Flag => self.get_flag(name).map(PropertyValue::Flag),
            Format::Int64 => self.get_i64(name).map(PropertyValue::Int64),
            Format::Double => self.get_f64(name).map(PropertyValue::Double),
            Format::String => self.get_string(name).map(PropertyValue::String),
            other => Err(EngineError::UnsupportedFormat(other)),
        }
    }

    pub fn get_flag(&self, name: &str) -> EngineResult<bool> {
        self.read_scalar::<c_int>(name).map(|value| value != 0)
    }

    pub fn get_i64(&self, name: &str) -> EngineResult<i64> {
        self.read_scalar::<i64>(name)
    }

    pub fn get_f64(&self, name: &str) -> EngineResult<f64> {
        self.read_scalar::<f64>(name)
    }

    pub fn get_string(&self, name: &str) -> EngineResult<String> {
        let cname = to_cstring(name)?;
        self.core.with_handle(|api, handle| {
            let mut slot: *mut c_char = ptr::null_mut();
            // SAFETY: `slot` is writable pointer storage for Format::String.
            let code =
                unsafe { api.get_property(handle, &cname, Format::String, (&raw mut slot).cast()) };
            if code < 0 {
                return Err(self.property_error(name, code));
            }
            // SAFETY: on success the engine hands us ownership of `slot`.
            let value = unsafe { NativeString::from_raw(api, slot) }
                .ok_or_else(|| self.property_error(name, error_code::PROPERTY_ERROR))?;
            Ok(value.to_string_lossy())
        })
    }

    fn read_scalar<T: ScalarSlot>(&self, name: &str) -> EngineResult<T> {
        let cname = to_cstring(name)?;
        self.core.with_handle(|api, handle| {
            let mut slot = T::default();
            // SAFETY: `slot` has the layout `T::FORMAT` describes.
            let code =
                unsafe { api.get_property(handle, &cname, T::FORMAT, (&raw mut slot).cast()) };
            if code < 0 {
                return Err(self.property_error(name, code));
            }
            Ok(slot)
        })
    }

    /// Register for change notifications of `name`, delivered as
    /// `EngineEvent::PropertyChange` carrying `token`. Observing the same
    /// token again is allowed; the newest name/format is used for decoding.
    ///
    /// Tokens at and above `STATUS_TOKEN_BASE` drive `status()` and are
    /// rejected with `EngineError::InvalidArgument`.
    pub fn observe_property(&self, token: u64, name: &str, format: Format) -> EngineResult<()> {
        check_token(token)?;
        self.register_observer(token, name, format)
    }

    /// Observe without the reserved-token check. Status tracking only.
    pub(super) fn register_observer(
        &self,
        token: u64,
        name: &str,
        format: Format,
    ) -> EngineResult<()> {
        if !format.is_decodable() {
            return Err(EngineError::UnsupportedFormat(format));
        }
        let cname = to_cstring(name)?;

        // Registered first: the engine may report the initial value before
        // the native call even returns.
        let previous = self.registry().insert(
            token,
            ObservedProperty {
                token,
                name: name.to_string(),
                format,
            },
        );

        let result = self.core.with_handle(|api, handle| {
            // SAFETY: live handle, valid C string.
            let code = unsafe { api.observe_property(handle, token, &cname, format) };
            if code < 0 {
                return Err(self.property_error(name, code));
            }
            Ok(())
        });

        match result {
            Ok(()) => {
                debug!("Observing {} as {:?} (token {})", name, format, token);
                Ok(())
            }
            Err(e) => {
                let mut registry = self.registry();
                match previous {
                    Some(previous) => registry.insert(token, previous),
                    None => registry.remove(&token),
                };
                Err(e)
            }
        }
    }

    /// Remove every registration made with `token`. Returns how many the
    /// engine removed; unknown tokens yield 0.
    pub fn unobserve_property(&self, token: u64) -> EngineResult<usize> {
        check_token(token)?;
        let removed = self.core.with_handle(|api, handle| {
            // SAFETY: live handle.
            let code = unsafe { api.unobserve_property(handle, token) };
            if code < 0 {
                let name = self
                    .registry()
                    .get(&token)
                    .map(|observed| observed.name.clone())
                    .unwrap_or_else(|| format!("<token {}>", token));
                return Err(self.property_error(&name, code));
            }
            Ok(code as usize)
        })?;

        self.registry().remove(&token);
        debug!("Unobserved token {} ({} registrations)", token, removed);
        Ok(removed)
    }

    /// Snapshot of the current registrations, ordered by token
    pub fn observed_properties(&self) -> Vec<ObservedProperty> {
        let mut observed: Vec<_> = self.registry().values().cloned().collect();
        observed.sort_by_key(|property| property.token);
        observed
    }

    fn registry(
        &self,
    ) -> std::sync::MutexGuard<'_, std::collections::HashMap<u64, ObservedProperty>> {
        self.core
            .observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_token(token: u64) -> EngineResult<()> {
    if token >= STATUS_TOKEN_BASE {
        return Err(EngineError::InvalidArgument(format!(
            "observation token {:#x} is reserved for status tracking",
            token
        )));
    }
    Ok(())
}
