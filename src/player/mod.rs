pub mod command;
pub mod controller;
pub mod engine;
pub mod errors;
pub mod ffi;
#[cfg(feature = "mpv")]
pub mod libmpv;
pub mod mpv_player;
mod poller;
pub mod property;
pub mod status;
pub mod tracks;
pub mod traits;

pub use controller::{PlayerController, PlayerHandle};
pub use engine::{Engine, EngineSettings};
pub use errors::{EngineError, EngineResult};
pub use ffi::{Format, NativeApi, RawHandle};
#[cfg(feature = "mpv")]
pub use libmpv::LibMpv;
pub use mpv_player::MpvPlayer;
pub use property::{ObservedProperty, PropertyValue};
pub use status::{PlaybackFlags, PlaybackStatus, STATUS_PROPERTIES};
pub use tracks::{IndexedList, TrackInfo, TrackKind};
pub use traits::{MediaSource, PlatformPlayer};
