use super::engine::Engine;
use super::errors::EngineResult;
use super::ffi::NativeApi;
use super::traits::MediaSource;
use crate::config::Config;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The player core every platform composes: one configured, initialized
/// engine instance with playback status tracking enabled.
#[derive(Debug)]
pub struct MpvPlayer {
    engine: Engine,
}

impl MpvPlayer {
    #[cfg(feature = "mpv")]
    pub fn new(
        config: &Config,
        bind_surface: impl FnOnce(&Engine) -> EngineResult<()>,
    ) -> EngineResult<Self> {
        Self::create(
            Arc::new(super::libmpv::LibMpv::new()),
            config,
            bind_surface,
        )
    }

    /// Create an engine through `api`, apply the configured options, let
    /// `bind_surface` set the output options, then initialize.
    pub fn create(
        api: Arc<dyn NativeApi>,
        config: &Config,
        bind_surface: impl FnOnce(&Engine) -> EngineResult<()>,
    ) -> EngineResult<Self> {
        let playback = &config.playback;
        info!(
            "Initializing MPV player (verbose_logging: {}, cache: {}MB/{}s)",
            playback.verbose_logging, playback.cache_size_mb, playback.cache_secs
        );

        let engine = Engine::create(api, config.engine.settings())?;

        for (key, value) in playback.engine_options() {
            match engine.set_option(key, &value) {
                Ok(()) => {}
                // Older engine builds lack some options; playback works without them
                Err(e) if e.is_unsupported_option() => {
                    warn!("Skipping option {}={}: {}", key, value, e);
                }
                Err(e) => return Err(e),
            }
        }

        bind_surface(&engine)?;
        engine.initialize()?;
        engine.track_playback_status()?;

        debug!("MPV player ready");
        Ok(Self { engine })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Replace the current file. The start position applies to this file
    /// only; without one a previous resume position is cleared.
    pub fn load(&self, source: &MediaSource) -> EngineResult<()> {
        let start = match source.start_position {
            Some(position) => format!("+{}", position.as_secs_f64()),
            None => "none".to_string(),
        };
        self.engine.set_option("start", &start)?;

        info!("Loading media: {} (start: {})", source.uri, start);
        self.engine.load_file(&source.uri)
    }

    pub fn dispose(&self) {
        self.engine.dispose();
    }
}
