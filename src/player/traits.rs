use super::engine::Engine;
use super::errors::EngineResult;
use super::mpv_player::MpvPlayer;
use super::status::PlaybackStatus;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::watch;

/// What to play, and where to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    /// Local path or URL
    pub uri: String,
    /// Resume position; `None` starts from the beginning
    pub start_position: Option<Duration>,
}

impl MediaSource {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            start_position: None,
        }
    }

    pub fn starting_at(mut self, position: Duration) -> Self {
        self.start_position = Some(position);
        self
    }

    /// Resume from a position given as seconds on the command line
    pub fn starting_at_secs(self, secs: &str) -> Result<Self> {
        let secs: f64 = secs
            .trim()
            .parse()
            .with_context(|| format!("start position {:?} is not a number", secs))?;
        let position = Duration::try_from_secs_f64(secs).with_context(|| {
            format!("start position {} must be finite and non-negative", secs)
        })?;
        Ok(self.starting_at(position))
    }
}

/// One logical player bound to one kind of output surface.
///
/// Implementations only differ in how the surface is handed to the engine
/// and how resizes are reported; transport is shared through `MpvPlayer`.
pub trait PlatformPlayer: Send {
    fn player(&self) -> &MpvPlayer;

    /// The output surface changed size, in pixels
    fn update_size(&self, width: u32, height: u32) -> EngineResult<()>;

    fn update_source(&self, source: &MediaSource) -> EngineResult<()> {
        self.player().load(source)
    }

    /// Seek to `position` from the start of the file
    fn update_position(&self, position: Duration) -> EngineResult<()> {
        self.engine().seek(position.as_secs_f64())
    }

    fn play_requested(&self) -> EngineResult<()> {
        self.engine().set_pause(false)
    }

    fn pause_requested(&self) -> EngineResult<()> {
        self.engine().set_pause(true)
    }

    fn stop_requested(&self) -> EngineResult<()> {
        self.engine().stop()
    }

    fn dispose(&self) {
        self.player().dispose();
    }

    fn engine(&self) -> &Engine {
        self.player().engine()
    }

    fn status(&self) -> watch::Receiver<PlaybackStatus> {
        self.engine().status()
    }
}
