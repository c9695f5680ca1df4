use super::engine::Engine;
use super::errors::EngineResult;
use super::ffi::Format;
use super::property::PropertyValue;
use crate::constants::STATUS_TOKEN_BASE;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

/// Coarse playback state visible to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    NotReady,
    Opening,
    Buffering,
    Paused,
    Playing,
    /// Never derived from engine flags; reserved for hosts that detect
    /// failures themselves (e.g. from `EndFileReason::Error`).
    Failed,
}

/// Engine properties the status is derived from, all observed as flags
pub const STATUS_PROPERTIES: [&str; 5] = [
    "idle-active",
    "pause",
    "paused-for-cache",
    "core-idle",
    "eof-reached",
];

/// Raw boolean inputs of the status derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackFlags {
    pub idle_active: bool,
    pub pause: bool,
    pub paused_for_cache: bool,
    pub core_idle: bool,
    pub eof_reached: bool,
}

impl PlaybackFlags {
    /// First matching rule wins.
    pub fn status(&self) -> PlaybackStatus {
        if self.idle_active && !self.eof_reached {
            PlaybackStatus::Opening
        } else if self.paused_for_cache {
            PlaybackStatus::Buffering
        } else if self.pause || self.core_idle {
            PlaybackStatus::Paused
        } else if !self.idle_active {
            PlaybackStatus::Playing
        } else if self.eof_reached {
            // End of stream reads as finished/paused
            PlaybackStatus::Paused
        } else {
            PlaybackStatus::NotReady
        }
    }

    /// Returns false when `name` is not one of the status inputs.
    fn set(&mut self, name: &str, value: bool) -> bool {
        let slot = match name {
            "idle-active" => &mut self.idle_active,
            "pause" => &mut self.pause,
            "paused-for-cache" => &mut self.paused_for_cache,
            "core-idle" => &mut self.core_idle,
            "eof-reached" => &mut self.eof_reached,
            _ => return false,
        };
        *slot = value;
        true
    }
}

/// Keeps the five flags and the derived status consistent.
///
/// A flag update and the recomputation happen under one lock, so every
/// published status corresponds to a real snapshot of the inputs.
#[derive(Debug)]
pub struct StatusTracker {
    flags: Mutex<PlaybackFlags>,
    sender: watch::Sender<PlaybackStatus>,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(PlaybackStatus::NotReady);
        Self {
            flags: Mutex::new(PlaybackFlags::default()),
            sender,
        }
    }

    /// Feed one property change. Returns the new status if it changed.
    pub fn apply(&self, name: &str, value: &PropertyValue) -> Option<PlaybackStatus> {
        let PropertyValue::Flag(flag) = value else {
            return None;
        };

        let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
        if !flags.set(name, *flag) {
            return None;
        }

        let status = flags.status();
        let changed = self.sender.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        changed.then_some(status)
    }

    pub fn current(&self) -> PlaybackStatus {
        *self.sender.borrow()
    }

    pub fn flags(&self) -> PlaybackFlags {
        *self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.sender.subscribe()
    }
}

impl Engine {
    /// Observe the status inputs so `status()` follows the engine.
    pub fn track_playback_status(&self) -> EngineResult<()> {
        for (offset, name) in STATUS_PROPERTIES.iter().enumerate() {
            self.register_observer(STATUS_TOKEN_BASE + offset as u64, name, Format::Flag)?;
        }
        Ok(())
    }

    /// Current raw status inputs as last reported by the engine
    pub fn playback_flags(&self) -> PlaybackFlags {
        self.core.status.flags()
    }
}
