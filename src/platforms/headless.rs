use crate::config::Config;
use crate::player::{EngineResult, MpvPlayer, NativeApi, PlatformPlayer};
use std::sync::Arc;

/// Player without video output, for audio-only playback and tests
#[derive(Debug)]
pub struct HeadlessPlayer {
    player: MpvPlayer,
}

impl HeadlessPlayer {
    #[cfg(feature = "mpv")]
    pub fn new(config: &Config) -> EngineResult<Self> {
        Self::create(Arc::new(crate::player::LibMpv::new()), config)
    }

    pub fn create(api: Arc<dyn NativeApi>, config: &Config) -> EngineResult<Self> {
        let player = MpvPlayer::create(api, config, |engine| engine.set_option("vo", "null"))?;
        Ok(Self { player })
    }
}

impl PlatformPlayer for HeadlessPlayer {
    fn player(&self) -> &MpvPlayer {
        &self.player
    }

    fn update_size(&self, _width: u32, _height: u32) -> EngineResult<()> {
        Ok(())
    }
}
