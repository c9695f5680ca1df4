use crate::player::ffi::end_file_reason;
use crate::player::property::PropertyValue;

/// One decoded occurrence from the native engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Wait timed out or the engine was woken up; never published
    None,
    /// The engine is shutting down; no further events follow
    Shutdown,
    LogMessage(LogMessage),
    PropertyChange(PropertyChange),
    VideoReconfigure,
    FileLoaded,
    EndFile(EndFile),
    /// Any event id this layer does not interpret
    Other(i32),
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::None => EventKind::None,
            EngineEvent::Shutdown => EventKind::Shutdown,
            EngineEvent::LogMessage(_) => EventKind::Log,
            EngineEvent::PropertyChange(_) => EventKind::PropertyChange,
            EngineEvent::VideoReconfigure => EventKind::VideoReconfigure,
            EngineEvent::FileLoaded => EventKind::FileLoaded,
            EngineEvent::EndFile(_) => EventKind::EndFile,
            EngineEvent::Other(_) => EventKind::Other,
        }
    }
}

/// Event discriminant used for filtering subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    None,
    Shutdown,
    Log,
    PropertyChange,
    VideoReconfigure,
    FileLoaded,
    EndFile,
    Other,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::None => "none",
            EventKind::Shutdown => "shutdown",
            EventKind::Log => "log",
            EventKind::PropertyChange => "property_change",
            EventKind::VideoReconfigure => "video_reconfigure",
            EventKind::FileLoaded => "file_loaded",
            EventKind::EndFile => "end_file",
            EventKind::Other => "other",
        }
    }
}

/// A log line emitted by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMessage {
    pub level: String,
    pub prefix: String,
    pub text: String,
}

/// A change of an observed property, decoded with its registered format
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub token: u64,
    pub name: String,
    pub value: PropertyValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndFileReason {
    Eof,
    Stop,
    Quit,
    Error,
    Redirect,
    Unknown(i32),
}

impl EndFileReason {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            end_file_reason::EOF => EndFileReason::Eof,
            end_file_reason::STOP => EndFileReason::Stop,
            end_file_reason::QUIT => EndFileReason::Quit,
            end_file_reason::ERROR => EndFileReason::Error,
            end_file_reason::REDIRECT => EndFileReason::Redirect,
            other => EndFileReason::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndFile {
    pub reason: EndFileReason,
    /// Native error code; only meaningful when `reason` is `Error`
    pub error: i32,
}
