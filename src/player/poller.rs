//! The event poller: one OS thread per engine instance that blocks on the
//! native event queue, decodes what it gets and fans it out.

use super::engine::EngineCore;
use super::ffi::{
    Format, RawEndFile, RawEvent, RawEventProperty, RawLogMessage, event_id,
};
use super::property::{ObservedProperty, PropertyValue};
use crate::constants::POLLER_THREAD_NAME;
use crate::events::{EndFile, EndFileReason, EngineEvent, LogMessage, PropertyChange};
use std::collections::HashMap;
use std::ffi::{CStr, c_char, c_int, c_void};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, Weak, mpsc};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// Why a single event could not be decoded. Never leaves the poller.
#[derive(Error, Debug, Clone, PartialEq)]
pub(crate) enum DecodeError {
    #[error("{0} event without payload")]
    NullData(&'static str),

    #[error("property change for unregistered token {0}")]
    UnknownToken(u64),

    #[error("property {0} is unavailable")]
    Unavailable(String),

    #[error("property {name} arrived as {actual:?}, registered as {expected:?}")]
    FormatMismatch {
        name: String,
        expected: Format,
        actual: Format,
    },

    #[error("unknown format id {0}")]
    UnknownFormat(c_int),

    #[error("decoding {0:?} is not implemented")]
    Unsupported(Format),
}

enum Poll {
    Idle,
    Event(EngineEvent),
    Stop,
}

/// A running poller thread. `exited` fires (or disconnects) once the
/// loop has returned.
pub(super) struct Poller {
    pub(super) thread: JoinHandle<()>,
    pub(super) exited: mpsc::Receiver<()>,
}

pub(super) fn spawn(core: &Arc<EngineCore>) -> io::Result<Poller> {
    let core = Arc::downgrade(core);
    let (done, exited) = mpsc::channel();
    let thread = thread::Builder::new()
        .name(POLLER_THREAD_NAME.to_string())
        .spawn(move || {
            run(core);
            let _ = done.send(());
        })?;
    Ok(Poller { thread, exited })
}

fn run(core: Weak<EngineCore>) {
    debug!("Event poller started");

    loop {
        let Some(core) = core.upgrade() else {
            break;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match poll_once(&core) {
            Poll::Idle => true,
            Poll::Stop => false,
            Poll::Event(EngineEvent::Shutdown) => {
                dispatch(&core, EngineEvent::Shutdown);
                false
            }
            Poll::Event(event) => {
                dispatch(&core, event);
                true
            }
        }));

        match outcome {
            Ok(true) => {}
            Ok(false) => break,
            Err(_) => error!("Panic while handling an engine event; event dropped"),
        }
    }

    debug!("Event poller stopped");
}

fn poll_once(core: &EngineCore) -> Poll {
    if core.is_disposed() {
        return Poll::Stop;
    }

    let guard = core.handle.read().unwrap_or_else(PoisonError::into_inner);
    let Some(handle) = *guard else {
        return Poll::Stop;
    };
    if core.is_disposed() {
        return Poll::Stop;
    }

    let timeout = core.settings.poll_timeout.as_secs_f64();
    // SAFETY: the read guard keeps the handle alive through the wait and the
    // decode below, which is also the lifetime of the returned event.
    let raw = unsafe { core.api.wait_event(handle, timeout) };
    let decoded = {
        let observed = core.observed.lock().unwrap_or_else(PoisonError::into_inner);
        unsafe { decode_event(raw, &observed) }
    };
    drop(guard);

    match decoded {
        Ok(EngineEvent::None) => Poll::Idle,
        Ok(event) => Poll::Event(event),
        Err(DecodeError::Unavailable(name)) => {
            trace!("Property {} unavailable, change dropped", name);
            Poll::Idle
        }
        Err(e) => {
            debug!("Dropping undecodable engine event: {}", e);
            Poll::Idle
        }
    }
}

fn dispatch(core: &EngineCore, event: EngineEvent) {
    match &event {
        EngineEvent::LogMessage(message) => forward_log(message),
        EngineEvent::PropertyChange(change) => {
            if let Some(status) = core.status.apply(&change.name, &change.value) {
                debug!("Playback status changed to {:?}", status);
            }
        }
        EngineEvent::EndFile(end) => debug!("End of file: {:?}", end),
        EngineEvent::Shutdown => info!("Engine reported shutdown"),
        _ => {}
    }
    core.bus.publish(event);
}

fn forward_log(message: &LogMessage) {
    match message.level.as_str() {
        "fatal" | "error" => error!(target: "mpv", "[{}] {}", message.prefix, message.text),
        "warn" => warn!(target: "mpv", "[{}] {}", message.prefix, message.text),
        "info" | "status" => info!(target: "mpv", "[{}] {}", message.prefix, message.text),
        "trace" => trace!(target: "mpv", "[{}] {}", message.prefix, message.text),
        _ => debug!(target: "mpv", "[{}] {}", message.prefix, message.text),
    }
}

/// Copy a C string owned by the event. Never freed here.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn event_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// # Safety
/// `raw` must be null or the event most recently returned by `wait_event`
/// on a handle that is still alive.
pub(crate) unsafe fn decode_event(
    raw: *const RawEvent,
    observed: &HashMap<u64, ObservedProperty>,
) -> Result<EngineEvent, DecodeError> {
    let Some(event) = (unsafe { raw.as_ref() }) else {
        return Ok(EngineEvent::None);
    };

    match event.event_id {
        event_id::NONE => Ok(EngineEvent::None),
        event_id::SHUTDOWN => Ok(EngineEvent::Shutdown),
        event_id::LOG_MESSAGE => unsafe { decode_log(event.data) }.map(EngineEvent::LogMessage),
        event_id::PROPERTY_CHANGE => {
            unsafe { decode_property_change(event, observed) }.map(EngineEvent::PropertyChange)
        }
        event_id::VIDEO_RECONFIG => Ok(EngineEvent::VideoReconfigure),
        event_id::FILE_LOADED => Ok(EngineEvent::FileLoaded),
        event_id::END_FILE => unsafe { decode_end_file(event.data) }.map(EngineEvent::EndFile),
        other => Ok(EngineEvent::Other(other)),
    }
}

unsafe fn decode_log(data: *mut c_void) -> Result<LogMessage, DecodeError> {
    let message = unsafe { data.cast::<RawLogMessage>().as_ref() }
        .ok_or(DecodeError::NullData("log-message"))?;

    let text = unsafe { event_str(message.text) };
    Ok(LogMessage {
        level: unsafe { event_str(message.level) },
        prefix: unsafe { event_str(message.prefix) },
        text: text.trim_end_matches('\n').to_string(),
    })
}

unsafe fn decode_end_file(data: *mut c_void) -> Result<EndFile, DecodeError> {
    let end = unsafe { data.cast::<RawEndFile>().as_ref() }
        .ok_or(DecodeError::NullData("end-file"))?;
    Ok(EndFile {
        reason: EndFileReason::from_raw(end.reason),
        error: end.error,
    })
}

unsafe fn decode_property_change(
    event: &RawEvent,
    observed: &HashMap<u64, ObservedProperty>,
) -> Result<PropertyChange, DecodeError> {
    let property = unsafe { event.data.cast::<RawEventProperty>().as_ref() }
        .ok_or(DecodeError::NullData("property-change"))?;
    let name = unsafe { event_str(property.name) };

    let token = event.reply_userdata;
    let registered = observed.get(&token).ok_or(DecodeError::UnknownToken(token))?;

    let actual = Format::from_raw(property.format).ok_or(DecodeError::UnknownFormat(property.format))?;
    if actual == Format::None {
        return Err(DecodeError::Unavailable(name));
    }
    if actual != registered.format {
        return Err(DecodeError::FormatMismatch {
            name,
            expected: registered.format,
            actual,
        });
    }

    let value = unsafe { decode_value(registered.format, property.data) }?;
    Ok(PropertyChange { token, name, value })
}

/// Decode one value by format. The data belongs to the event.
///
/// # Safety
/// `data` must be null or point to a value of `format`.
pub(crate) unsafe fn decode_value(
    format: Format,
    data: *mut c_void,
) -> Result<PropertyValue, DecodeError> {
    if !format.is_decodable() {
        return Err(DecodeError::Unsupported(format));
    }
    if data.is_null() {
        return Err(DecodeError::NullData("property-value"));
    }

    let value = unsafe {
        match format {
            Format::Flag => PropertyValue::Flag(*data.cast::<c_int>() != 0),
            Format::Int64 => PropertyValue::Int64(*data.cast::<i64>()),
            Format::Double => PropertyValue::Double(*data.cast::<f64>()),
            Format::String => {
                let text = *data.cast::<*const c_char>();
                if text.is_null() {
                    return Err(DecodeError::NullData("string-value"));
                }
                PropertyValue::String(event_str(text))
            }
            other => return Err(DecodeError::Unsupported(other)),
        }
    };
    Ok(value)
}
