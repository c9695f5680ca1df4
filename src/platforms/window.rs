use crate::config::Config;
use crate::player::{EngineResult, MpvPlayer, NativeApi, PlatformPlayer, PropertyValue};
use std::sync::Arc;
use tracing::debug;

/// Desktop player rendering into a native window (X11 window id, HWND).
///
/// The engine creates its own child surface inside the window and follows
/// its size, so resizes need no action here.
#[derive(Debug)]
pub struct WindowPlayer {
    player: MpvPlayer,
    window_id: i64,
}

impl WindowPlayer {
    #[cfg(feature = "mpv")]
    pub fn new(config: &Config, window_id: i64) -> EngineResult<Self> {
        Self::create(
            Arc::new(crate::player::LibMpv::new()),
            config,
            window_id,
        )
    }

    pub fn create(api: Arc<dyn NativeApi>, config: &Config, window_id: i64) -> EngineResult<Self> {
        debug!("Binding engine to window {:#x}", window_id);
        let player = MpvPlayer::create(api, config, |engine| {
            engine.set_option_value("wid", &PropertyValue::Int64(window_id))
        })?;
        Ok(Self { player, window_id })
    }

    pub fn window_id(&self) -> i64 {
        self.window_id
    }
}

impl PlatformPlayer for WindowPlayer {
    fn player(&self) -> &MpvPlayer {
        &self.player
    }

    fn update_size(&self, _width: u32, _height: u32) -> EngineResult<()> {
        Ok(())
    }
}
