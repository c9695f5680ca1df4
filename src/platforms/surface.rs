use crate::config::Config;
use crate::player::{EngineResult, MpvPlayer, NativeApi, PlatformPlayer, PropertyValue};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

/// Mobile player rendering into a platform surface handle.
///
/// Unlike a desktop window the surface does not report its size to the
/// engine, so every resize is forwarded as `android-surface-size`.
#[derive(Debug)]
pub struct SurfacePlayer {
    player: MpvPlayer,
    size: Mutex<(u32, u32)>,
}

fn surface_size(width: u32, height: u32) -> String {
    format!("{}x{}", width, height)
}

impl SurfacePlayer {
    #[cfg(feature = "mpv")]
    pub fn new(config: &Config, surface: i64, width: u32, height: u32) -> EngineResult<Self> {
        Self::create(
            Arc::new(crate::player::LibMpv::new()),
            config,
            surface,
            width,
            height,
        )
    }

    pub fn create(
        api: Arc<dyn NativeApi>,
        config: &Config,
        surface: i64,
        width: u32,
        height: u32,
    ) -> EngineResult<Self> {
        debug!("Binding engine to surface {:#x} ({}x{})", surface, width, height);
        let player = MpvPlayer::create(api, config, |engine| {
            engine.set_option_value("wid", &PropertyValue::Int64(surface))?;
            if width > 0 && height > 0 {
                engine.set_option("android-surface-size", &surface_size(width, height))?;
            }
            Ok(())
        })?;

        Ok(Self {
            player,
            size: Mutex::new((width, height)),
        })
    }

    /// Last size forwarded to the engine
    pub fn size(&self) -> (u32, u32) {
        *self.size.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PlatformPlayer for SurfacePlayer {
    fn player(&self) -> &MpvPlayer {
        &self.player
    }

    fn update_size(&self, width: u32, height: u32) -> EngineResult<()> {
        if width == 0 || height == 0 {
            trace!("Ignoring empty surface size {}x{}", width, height);
            return Ok(());
        }

        let mut size = self.size.lock().unwrap_or_else(PoisonError::into_inner);
        self.engine()
            .set_option("android-surface-size", &surface_size(width, height))?;
        *size = (width, height);
        Ok(())
    }
}
