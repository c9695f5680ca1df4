// Native media-engine control layer: engine lifecycle, property bridge,
// event polling, commands, playback status and track introspection

#![allow(clippy::result_large_err)]

pub mod config;
pub mod constants;
pub mod events;
pub mod platforms;
pub mod player;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use events::{EngineEvent, EventKind, EventSubscriber};
pub use player::{
    Engine, EngineError, EngineResult, EngineSettings, MediaSource, PlatformPlayer,
    PlaybackStatus, PlayerController, PlayerHandle, TrackInfo, TrackKind,
};
