#![cfg(test)]

//! In-process stand-in for libmpv plus helpers shared by the unit tests.
//!
//! `FakeMpv` implements `NativeApi` with enough engine behavior for the
//! control layer to be exercised end to end: option validation, typed
//! property reads, a blocking event queue with `wakeup`, initial values on
//! observe, a few commands (`loadfile`, `set`, `seek`, `stop`) and a track
//! catalog per URI. Every string it hands out is tracked so leaks and bad
//! frees show up in assertions.

use crate::events::{EngineEvent, EventSubscriber};
use crate::player::ffi::{
    Format, NativeApi, RawEndFile, RawEvent, RawEventProperty, RawHandle, RawLogMessage,
    end_file_reason, error_code, error_name, event_id,
};
use crate::player::{Engine, EngineSettings, PropertyValue};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// One stream of a media file in the fake catalog
#[derive(Debug, Clone)]
pub struct FakeTrack {
    /// `video`, `audio` or `sub`
    pub kind: &'static str,
    pub id: i64,
    pub lang: Option<&'static str>,
    pub title: Option<&'static str>,
    pub codec: Option<&'static str>,
    pub default: bool,
    pub forced: bool,
}

/// A typical movie: one video, two audio and three subtitle streams. The
/// last subtitle has neither language nor title.
pub fn sample_tracks() -> Vec<FakeTrack> {
    let track = |kind, id, lang, title, codec, default, forced| FakeTrack {
        kind,
        id,
        lang,
        title,
        codec: Some(codec),
        default,
        forced,
    };
    vec![
        track("video", 1, None, None, "h264", true, false),
        track("audio", 1, Some("eng"), Some("Stereo"), "aac", true, false),
        track("audio", 2, Some("jpn"), Some("Japanese"), "opus", false, false),
        track("sub", 1, Some("eng"), Some("English"), "subrip", false, false),
        track("sub", 2, Some("jpn"), Some("Signs"), "ass", false, true),
        track("sub", 3, None, None, "ass", false, false),
    ]
}

pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        poll_timeout: Duration::from_millis(50),
        ..EngineSettings::default()
    }
}

/// A fresh fake plus an engine created on it
pub fn fake_engine() -> (Arc<FakeMpv>, Engine) {
    let fake = Arc::new(FakeMpv::new());
    let engine = Engine::create(fake.clone(), fast_settings()).expect("fake engine creation");
    (fake, engine)
}

/// Next event on `subscriber`, or `None` after two seconds
pub async fn recv_timeout(subscriber: &mut EventSubscriber) -> Option<EngineEvent> {
    tokio::time::timeout(Duration::from_secs(2), subscriber.recv())
        .await
        .ok()
        .flatten()
}

#[derive(Debug, Clone, Copy)]
enum OptionKind {
    Any,
    Flag,
    Choice(&'static [&'static str]),
    Int,
    Double,
    TrackId,
}

fn option_kind(name: &str) -> Option<OptionKind> {
    Some(match name {
        "vo" | "hwdec" | "alang" | "slang" | "start" | "msg-level" | "gpu-context"
        | "android-surface-size" | "demuxer-max-bytes" | "demuxer-max-back-bytes"
        | "loop-file" | "title" => OptionKind::Any,
        "input-default-bindings" | "input-vo-keyboard" | "osc" | "ytdl" | "load-scripts"
        | "terminal" | "config" | "pause" | "mute" => OptionKind::Flag,
        "keep-open" => OptionKind::Choice(&["yes", "no", "always"]),
        "cache" => OptionKind::Choice(&["yes", "no", "auto"]),
        "wid" => OptionKind::Int,
        "volume" | "speed" | "cache-secs" => OptionKind::Double,
        "aid" | "sid" | "vid" => OptionKind::TrackId,
        _ => return None,
    })
}

impl OptionKind {
    /// Typed property value for an option string, `None` if rejected
    fn parse(self, value: &str) -> Option<PropertyValue> {
        match self {
            OptionKind::Any => Some(PropertyValue::String(value.to_string())),
            OptionKind::Flag => match value {
                "yes" => Some(PropertyValue::Flag(true)),
                "no" => Some(PropertyValue::Flag(false)),
                _ => None,
            },
            OptionKind::Choice(choices) => choices
                .contains(&value)
                .then(|| PropertyValue::String(value.to_string())),
            OptionKind::Int => value.parse().ok().map(PropertyValue::Int64),
            OptionKind::Double => value.parse().ok().map(PropertyValue::Double),
            OptionKind::TrackId => (value == "no" || value == "auto" || value.parse::<i64>().is_ok())
                .then(|| PropertyValue::String(value.to_string())),
        }
    }
}

/// Convert a stored value to the format a caller asked for
fn convert(value: &PropertyValue, format: Format) -> Result<PropertyValue, c_int> {
    match (format, value) {
        (Format::Flag, PropertyValue::Flag(_))
        | (Format::Int64, PropertyValue::Int64(_))
        | (Format::Double, PropertyValue::Double(_)) => Ok(value.clone()),
        (Format::Double, PropertyValue::Int64(number)) => Ok(PropertyValue::Double(*number as f64)),
        (Format::String, value) => Ok(PropertyValue::String(value.to_string())),
        _ => Err(error_code::PROPERTY_FORMAT),
    }
}

enum Queued {
    Plain(c_int),
    Log {
        level: String,
        prefix: String,
        text: String,
    },
    Property {
        token: u64,
        name: String,
        value: Option<PropertyValue>,
    },
    EndFile {
        reason: c_int,
        error: c_int,
    },
}

/// Memory behind the event most recently returned by `wait_event`
#[derive(Default)]
struct EventStorage {
    event: Option<Box<RawEvent>>,
    strings: Vec<CString>,
    text: Option<Box<*const c_char>>,
    flag: Option<Box<c_int>>,
    int: Option<Box<i64>>,
    double: Option<Box<f64>>,
    property: Option<Box<RawEventProperty>>,
    log: Option<Box<RawLogMessage>>,
    end_file: Option<Box<RawEndFile>>,
}

// Only raw pointers into its own boxes; never shared outside the fake's lock.
unsafe impl Send for EventStorage {}

impl EventStorage {
    fn build(queued: Queued) -> Box<Self> {
        let mut storage = Box::new(EventStorage::default());
        let (id, reply, data) = match queued {
            Queued::Plain(id) => (id, 0, ptr::null_mut()),
            Queued::Log {
                level,
                prefix,
                text,
            } => {
                let mut log = Box::new(RawLogMessage {
                    prefix: storage.keep(prefix),
                    level: storage.keep(level),
                    text: storage.keep(text),
                    log_level: 0,
                });
                let data = (&raw mut *log).cast::<c_void>();
                storage.log = Some(log);
                (event_id::LOG_MESSAGE, 0, data)
            }
            Queued::Property { token, name, value } => {
                let name = storage.keep(name);
                let (format, value_ptr) = storage.store_value(value);
                let mut property = Box::new(RawEventProperty {
                    name,
                    format: format.as_raw(),
                    data: value_ptr,
                });
                let data = (&raw mut *property).cast::<c_void>();
                storage.property = Some(property);
                (event_id::PROPERTY_CHANGE, token, data)
            }
            Queued::EndFile { reason, error } => {
                let mut end = Box::new(RawEndFile { reason, error });
                let data = (&raw mut *end).cast::<c_void>();
                storage.end_file = Some(end);
                (event_id::END_FILE, 0, data)
            }
        };
        storage.event = Some(Box::new(RawEvent {
            event_id: id,
            error: 0,
            reply_userdata: reply,
            data,
        }));
        storage
    }

    fn keep(&mut self, text: String) -> *const c_char {
        let text = CString::new(text).unwrap_or_default();
        let ptr = text.as_ptr();
        self.strings.push(text);
        ptr
    }

    fn store_value(&mut self, value: Option<PropertyValue>) -> (Format, *mut c_void) {
        match value {
            None => (Format::None, ptr::null_mut()),
            Some(PropertyValue::Flag(flag)) => {
                let mut slot = Box::new(c_int::from(flag));
                let data = (&raw mut *slot).cast::<c_void>();
                self.flag = Some(slot);
                (Format::Flag, data)
            }
            Some(PropertyValue::Int64(number)) => {
                let mut slot = Box::new(number);
                let data = (&raw mut *slot).cast::<c_void>();
                self.int = Some(slot);
                (Format::Int64, data)
            }
            Some(PropertyValue::Double(number)) => {
                let mut slot = Box::new(number);
                let data = (&raw mut *slot).cast::<c_void>();
                self.double = Some(slot);
                (Format::Double, data)
            }
            Some(PropertyValue::String(text)) => {
                let mut slot = Box::new(self.keep(text));
                let data = (&raw mut *slot).cast::<c_void>();
                self.text = Some(slot);
                (Format::String, data)
            }
        }
    }

    fn as_ptr(&self) -> *const RawEvent {
        self.event
            .as_deref()
            .map_or(ptr::null(), |event| event as *const RawEvent)
    }
}

struct Observer {
    token: u64,
    name: String,
    format: Format,
}

#[derive(Default)]
struct Instance {
    initialized: bool,
    initialize_calls: usize,
    fail_initialize: Option<c_int>,
    fail_observe: Option<c_int>,
    log_level: Option<String>,
    options: HashMap<String, String>,
    properties: HashMap<String, PropertyValue>,
    observers: Vec<Observer>,
    queue: VecDeque<Queued>,
    current: Option<Box<EventStorage>>,
    woken: bool,
    wait_calls: usize,
    panic_next_wait: bool,
    commands: Vec<Vec<String>>,
    loaded: Option<Vec<FakeTrack>>,
    loaded_uri: Option<String>,
}

impl Instance {
    fn new() -> Self {
        let mut instance = Self::default();
        for (name, value) in [
            ("aid", PropertyValue::String("auto".to_string())),
            ("sid", PropertyValue::String("auto".to_string())),
            ("vid", PropertyValue::String("auto".to_string())),
            ("volume", PropertyValue::Double(100.0)),
            ("speed", PropertyValue::Double(1.0)),
            ("mute", PropertyValue::Flag(false)),
            ("idle-active", PropertyValue::Flag(true)),
            ("pause", PropertyValue::Flag(false)),
            ("paused-for-cache", PropertyValue::Flag(false)),
            ("core-idle", PropertyValue::Flag(true)),
            ("eof-reached", PropertyValue::Flag(false)),
            ("loop-file", PropertyValue::String("no".to_string())),
        ] {
            instance.properties.insert(name.to_string(), value);
        }
        instance
    }

    fn lookup(&self, name: &str) -> Option<PropertyValue> {
        let Some(path) = name.strip_prefix("track-list/") else {
            return self.properties.get(name).cloned();
        };
        let tracks = self.loaded.as_deref().unwrap_or_default();
        if path == "count" {
            return Some(PropertyValue::Int64(tracks.len() as i64));
        }

        let (index, field) = path.split_once('/')?;
        let track = tracks.get(index.parse::<usize>().ok()?)?;
        let text = |value: Option<&str>| value.map(|v| PropertyValue::String(v.to_string()));
        match field {
            "type" => text(Some(track.kind)),
            "id" => Some(PropertyValue::Int64(track.id)),
            "lang" => text(track.lang),
            "title" => text(track.title),
            "codec" => text(track.codec),
            "default" => Some(PropertyValue::Flag(track.default)),
            "forced" => Some(PropertyValue::Flag(track.forced)),
            _ => None,
        }
    }

    /// Store a value and queue a change event for every observer of `name`
    fn set_property(&mut self, name: &str, value: PropertyValue) {
        if self.properties.get(name) == Some(&value) {
            return;
        }
        self.properties.insert(name.to_string(), value);
        self.notify(name);
    }

    fn clear_property(&mut self, name: &str) {
        if self.properties.remove(name).is_some() {
            self.notify(name);
        }
    }

    fn notify(&mut self, name: &str) {
        let current = self.lookup(name);
        let changes: Vec<_> = self
            .observers
            .iter()
            .filter(|observer| observer.name == name)
            .map(|observer| Queued::Property {
                token: observer.token,
                name: name.to_string(),
                value: current
                    .as_ref()
                    .and_then(|value| convert(value, observer.format).ok()),
            })
            .collect();
        self.queue.extend(changes);
    }

    fn apply_option(&mut self, name: &str, value: &str) -> c_int {
        let Some(kind) = option_kind(name) else {
            return error_code::OPTION_NOT_FOUND;
        };
        let Some(typed) = kind.parse(value) else {
            return error_code::OPTION_ERROR;
        };
        self.options.insert(name.to_string(), value.to_string());
        self.set_property(name, typed);
        if name == "pause" {
            self.sync_core_idle();
        }
        error_code::SUCCESS
    }

    fn sync_core_idle(&mut self) {
        let paused = self.lookup("pause") == Some(PropertyValue::Flag(true));
        let idle = paused || self.loaded.is_none();
        self.set_property("core-idle", PropertyValue::Flag(idle));
    }

    fn run_command(&mut self, args: &[String], catalog: &HashMap<String, Vec<FakeTrack>>) -> c_int {
        let Some((verb, rest)) = args.split_first() else {
            return error_code::INVALID_PARAMETER;
        };
        match (verb.as_str(), rest) {
            ("loadfile", [uri, ..]) => self.load(uri, catalog),
            ("set", [name, value]) => match self.apply_option(name, value) {
                error_code::OPTION_NOT_FOUND => error_code::PROPERTY_NOT_FOUND,
                code if code < 0 => error_code::COMMAND,
                code => code,
            },
            ("seek", [target, ..]) => {
                if self.loaded.is_none() {
                    return error_code::COMMAND;
                }
                let Ok(seconds) = target.parse::<f64>() else {
                    return error_code::INVALID_PARAMETER;
                };
                self.queue.push_back(Queued::Plain(event_id::SEEK));
                self.set_property("time-pos", PropertyValue::Double(seconds));
                error_code::SUCCESS
            }
            ("stop", []) => {
                if self.loaded.take().is_some() {
                    self.loaded_uri = None;
                    self.queue.push_back(Queued::EndFile {
                        reason: end_file_reason::STOP,
                        error: 0,
                    });
                    self.notify("track-list/count");
                    self.clear_property("time-pos");
                    self.set_property("idle-active", PropertyValue::Flag(true));
                    self.sync_core_idle();
                }
                error_code::SUCCESS
            }
            _ => error_code::INVALID_PARAMETER,
        }
    }

    fn load(&mut self, uri: &str, catalog: &HashMap<String, Vec<FakeTrack>>) -> c_int {
        let Some(tracks) = catalog.get(uri) else {
            self.queue.push_back(Queued::EndFile {
                reason: end_file_reason::ERROR,
                error: error_code::LOADING_FAILED,
            });
            return error_code::SUCCESS;
        };

        self.loaded = Some(tracks.clone());
        self.loaded_uri = Some(uri.to_string());
        self.queue.push_back(Queued::Plain(event_id::FILE_LOADED));

        for (selector, kind) in [("aid", "audio"), ("sid", "sub")] {
            if self.lookup(selector) != Some(PropertyValue::String("auto".to_string())) {
                continue;
            }
            let chosen = tracks
                .iter()
                .filter(|track| track.kind == kind)
                .find(|track| track.default || track.forced)
                .map_or("no".to_string(), |track| track.id.to_string());
            self.set_property(selector, PropertyValue::String(chosen));
        }

        let start = self
            .options
            .get("start")
            .and_then(|start| start.trim_start_matches('+').parse::<f64>().ok())
            .unwrap_or(0.0);
        self.set_property("time-pos", PropertyValue::Double(start));
        self.notify("track-list/count");
        self.set_property("idle-active", PropertyValue::Flag(false));
        self.set_property("eof-reached", PropertyValue::Flag(false));
        self.sync_core_idle();
        error_code::SUCCESS
    }
}

#[derive(Default)]
struct FakeState {
    next_handle: usize,
    instances: HashMap<usize, Instance>,
    catalog: HashMap<String, Vec<FakeTrack>>,
    fail_create: bool,
    destroy_calls: usize,
    allocations: HashSet<usize>,
    frees: usize,
    invalid_frees: usize,
}

pub struct FakeMpv {
    state: Mutex<FakeState>,
    events: Condvar,
}

impl Default for FakeMpv {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMpv {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_handle: 0x1000,
                ..FakeState::default()
            }),
            events: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_instance<T>(&self, handle: RawHandle, f: impl FnOnce(&mut Instance) -> T) -> T {
        let mut state = self.lock();
        let instance = state
            .instances
            .get_mut(&handle.addr())
            .expect("handle used after destroy");
        let result = f(instance);
        drop(state);
        self.events.notify_all();
        result
    }

    // --- scripting ---

    pub fn fail_next_create(&self) {
        self.lock().fail_create = true;
    }

    pub fn fail_next_initialize(&self, handle: RawHandle, code: c_int) {
        self.with_instance(handle, |i| i.fail_initialize = Some(code));
    }

    pub fn fail_next_observe(&self, handle: RawHandle, code: c_int) {
        self.with_instance(handle, |i| i.fail_observe = Some(code));
    }

    /// Make the next `wait_event` on `handle` panic instead of returning
    pub fn panic_next_wait(&self, handle: RawHandle) {
        self.with_instance(handle, |i| i.panic_next_wait = true);
    }

    /// Make `uri` loadable with the given streams
    pub fn add_media(&self, uri: &str, tracks: Vec<FakeTrack>) {
        self.lock().catalog.insert(uri.to_string(), tracks);
    }

    pub fn push_event(&self, handle: RawHandle, id: c_int) {
        self.with_instance(handle, |i| i.queue.push_back(Queued::Plain(id)));
    }

    pub fn push_log(&self, handle: RawHandle, level: &str, prefix: &str, text: &str) {
        self.with_instance(handle, |i| {
            i.queue.push_back(Queued::Log {
                level: level.to_string(),
                prefix: prefix.to_string(),
                text: text.to_string(),
            })
        });
    }

    /// Queue a raw property-change event, whatever is registered
    pub fn push_property_change(
        &self,
        handle: RawHandle,
        token: u64,
        name: &str,
        value: PropertyValue,
    ) {
        self.with_instance(handle, |i| {
            i.queue.push_back(Queued::Property {
                token,
                name: name.to_string(),
                value: Some(value),
            })
        });
    }

    /// Simulate the engine changing a property on its own
    pub fn set_property(&self, handle: RawHandle, name: &str, value: PropertyValue) {
        self.with_instance(handle, |i| i.set_property(name, value));
    }

    // --- inspection ---

    pub fn live_instances(&self) -> usize {
        self.lock().instances.len()
    }

    pub fn destroy_calls(&self) -> usize {
        self.lock().destroy_calls
    }

    pub fn initialize_calls(&self, handle: RawHandle) -> usize {
        self.with_instance(handle, |i| i.initialize_calls)
    }

    pub fn log_level(&self, handle: RawHandle) -> Option<String> {
        self.with_instance(handle, |i| i.log_level.clone())
    }

    pub fn wait_calls(&self, handle: RawHandle) -> usize {
        self.with_instance(handle, |i| i.wait_calls)
    }

    pub fn pending_events(&self, handle: RawHandle) -> usize {
        self.with_instance(handle, |i| i.queue.len())
    }

    /// Last value set for option `name`, in string form
    pub fn option(&self, handle: RawHandle, name: &str) -> Option<String> {
        self.with_instance(handle, |i| i.options.get(name).cloned())
    }

    /// Every command sent so far, including rejected ones
    pub fn commands(&self, handle: RawHandle) -> Vec<Vec<String>> {
        self.with_instance(handle, |i| i.commands.clone())
    }

    pub fn loaded_uri(&self, handle: RawHandle) -> Option<String> {
        self.with_instance(handle, |i| i.loaded_uri.clone())
    }

    pub fn observer_count(&self, handle: RawHandle) -> usize {
        self.with_instance(handle, |i| i.observers.len())
    }

    pub fn outstanding_allocations(&self) -> usize {
        self.lock().allocations.len()
    }

    pub fn frees(&self) -> usize {
        self.lock().frees
    }

    pub fn invalid_frees(&self) -> usize {
        self.lock().invalid_frees
    }

    unsafe fn write_value(state: &mut FakeState, value: PropertyValue, data: *mut c_void) {
        unsafe {
            match value {
                PropertyValue::Flag(flag) => *data.cast::<c_int>() = c_int::from(flag),
                PropertyValue::Int64(number) => *data.cast::<i64>() = number,
                PropertyValue::Double(number) => *data.cast::<f64>() = number,
                PropertyValue::String(text) => {
                    let text = CString::new(text).unwrap_or_default().into_raw();
                    state.allocations.insert(text as usize);
                    *data.cast::<*mut c_char>() = text;
                }
            }
        }
    }

    unsafe fn read_value(format: Format, data: *mut c_void) -> Option<String> {
        if data.is_null() {
            return None;
        }
        unsafe {
            Some(match format {
                Format::Flag => PropertyValue::Flag(*data.cast::<c_int>() != 0).to_string(),
                Format::Int64 => (*data.cast::<i64>()).to_string(),
                Format::Double => (*data.cast::<f64>()).to_string(),
                Format::String => {
                    let text = *data.cast::<*const c_char>();
                    if text.is_null() {
                        return None;
                    }
                    CStr::from_ptr(text).to_string_lossy().into_owned()
                }
                _ => return None,
            })
        }
    }
}

impl NativeApi for FakeMpv {
    fn client_api_version(&self) -> u64 {
        0x0002_0003
    }

    fn create(&self) -> Option<RawHandle> {
        let mut state = self.lock();
        if std::mem::take(&mut state.fail_create) {
            return None;
        }
        let addr = state.next_handle;
        state.next_handle += 0x100;
        state.instances.insert(addr, Instance::new());
        RawHandle::new(addr as *mut c_void)
    }

    fn error_string(&self, code: c_int) -> String {
        error_name(code).to_string()
    }

    unsafe fn destroy(&self, handle: RawHandle) {
        let mut state = self.lock();
        state.instances.remove(&handle.addr());
        state.destroy_calls += 1;
        drop(state);
        self.events.notify_all();
    }

    unsafe fn initialize(&self, handle: RawHandle) -> c_int {
        self.with_instance(handle, |i| {
            i.initialize_calls += 1;
            if let Some(code) = i.fail_initialize.take() {
                return code;
            }
            if i.initialized {
                return error_code::INVALID_PARAMETER;
            }
            i.initialized = true;
            error_code::SUCCESS
        })
    }

    unsafe fn request_log_messages(&self, handle: RawHandle, min_level: &CStr) -> c_int {
        let level = min_level.to_string_lossy().into_owned();
        self.with_instance(handle, |i| i.log_level = Some(level));
        error_code::SUCCESS
    }

    unsafe fn set_option_string(&self, handle: RawHandle, name: &CStr, value: &CStr) -> c_int {
        let name = name.to_string_lossy();
        let value = value.to_string_lossy();
        self.with_instance(handle, |i| i.apply_option(&name, &value))
    }

    unsafe fn set_option(
        &self,
        handle: RawHandle,
        name: &CStr,
        format: Format,
        data: *mut c_void,
    ) -> c_int {
        let Some(value) = (unsafe { Self::read_value(format, data) }) else {
            return error_code::OPTION_FORMAT;
        };
        let name = name.to_string_lossy();
        self.with_instance(handle, |i| i.apply_option(&name, &value))
    }

    unsafe fn get_property(
        &self,
        handle: RawHandle,
        name: &CStr,
        format: Format,
        data: *mut c_void,
    ) -> c_int {
        let name = name.to_string_lossy();
        let mut state = self.lock();
        let Some(instance) = state.instances.get(&handle.addr()) else {
            return error_code::UNINITIALIZED;
        };
        let Some(value) = instance.lookup(&name) else {
            return error_code::PROPERTY_NOT_FOUND;
        };
        match convert(&value, format) {
            Ok(value) => {
                unsafe { Self::write_value(&mut state, value, data) };
                error_code::SUCCESS
            }
            Err(code) => code,
        }
    }

    unsafe fn command(&self, handle: RawHandle, args: *mut *const c_char) -> c_int {
        let mut argv = Vec::new();
        let mut cursor = args;
        unsafe {
            while !(*cursor).is_null() {
                argv.push(CStr::from_ptr(*cursor).to_string_lossy().into_owned());
                cursor = cursor.add(1);
            }
        }

        let mut state = self.lock();
        let FakeState {
            instances, catalog, ..
        } = &mut *state;
        let Some(instance) = instances.get_mut(&handle.addr()) else {
            return error_code::UNINITIALIZED;
        };
        instance.commands.push(argv.clone());
        let code = if instance.initialized {
            instance.run_command(&argv, catalog)
        } else {
            error_code::UNINITIALIZED
        };
        drop(state);
        self.events.notify_all();
        code
    }

    unsafe fn wait_event(&self, handle: RawHandle, timeout: f64) -> *const RawEvent {
        let deadline = Instant::now() + Duration::from_secs_f64(timeout.max(0.0));
        let mut state = self.lock();
        let panic_now = match state.instances.get_mut(&handle.addr()) {
            Some(instance) => {
                instance.wait_calls += 1;
                std::mem::take(&mut instance.panic_next_wait)
            }
            None => false,
        };
        if panic_now {
            drop(state);
            panic!("scripted wait_event failure");
        }

        loop {
            let Some(instance) = state.instances.get_mut(&handle.addr()) else {
                return ptr::null();
            };

            let next = match instance.queue.pop_front() {
                Some(queued) => Some(queued),
                None if std::mem::take(&mut instance.woken) => Some(Queued::Plain(event_id::NONE)),
                None if Instant::now() >= deadline => Some(Queued::Plain(event_id::NONE)),
                None => None,
            };
            if let Some(queued) = next {
                let storage = EventStorage::build(queued);
                let event = storage.as_ptr();
                instance.current = Some(storage);
                return event;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            state = self
                .events
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    unsafe fn wakeup(&self, handle: RawHandle) {
        let mut state = self.lock();
        if let Some(instance) = state.instances.get_mut(&handle.addr()) {
            instance.woken = true;
        }
        drop(state);
        self.events.notify_all();
    }

    unsafe fn observe_property(
        &self,
        handle: RawHandle,
        token: u64,
        name: &CStr,
        format: Format,
    ) -> c_int {
        let name = name.to_string_lossy().into_owned();
        self.with_instance(handle, |i| {
            if let Some(code) = i.fail_observe.take() {
                return code;
            }
            let initial = i
                .lookup(&name)
                .and_then(|value| convert(&value, format).ok());
            i.queue.push_back(Queued::Property {
                token,
                name: name.clone(),
                value: initial,
            });
            i.observers.push(Observer {
                token,
                name,
                format,
            });
            error_code::SUCCESS
        })
    }

    unsafe fn unobserve_property(&self, handle: RawHandle, token: u64) -> c_int {
        self.with_instance(handle, |i| {
            let before = i.observers.len();
            i.observers.retain(|observer| observer.token != token);
            (before - i.observers.len()) as c_int
        })
    }

    unsafe fn free(&self, data: *mut c_void) {
        let mut state = self.lock();
        if state.allocations.remove(&(data as usize)) {
            drop(unsafe { CString::from_raw(data.cast::<c_char>()) });
            state.frees += 1;
        } else {
            state.invalid_frees += 1;
        }
    }
}
