use super::errors::EngineResult;
use super::status::PlaybackStatus;
use super::tracks::{TrackInfo, TrackKind};
use super::traits::{MediaSource, PlatformPlayer};
use anyhow::Result;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace};

/// Requests processed by the player controller
#[derive(Debug)]
pub enum PlayerCommand {
    /// Replace the current media
    LoadMedia {
        source: MediaSource,
        respond_to: oneshot::Sender<EngineResult<()>>,
    },
    Play {
        respond_to: oneshot::Sender<EngineResult<()>>,
    },
    Pause {
        respond_to: oneshot::Sender<EngineResult<()>>,
    },
    Stop {
        respond_to: oneshot::Sender<EngineResult<()>>,
    },
    /// Seek to an absolute position
    Seek {
        position: Duration,
        respond_to: oneshot::Sender<EngineResult<()>>,
    },
    /// Output surface resized
    UpdateSize {
        width: u32,
        height: u32,
        respond_to: oneshot::Sender<EngineResult<()>>,
    },
    SetLoop {
        enabled: bool,
        respond_to: oneshot::Sender<EngineResult<()>>,
    },
    GetPosition {
        respond_to: oneshot::Sender<Option<Duration>>,
    },
    GetDuration {
        respond_to: oneshot::Sender<Option<Duration>>,
    },
    GetStatus {
        respond_to: oneshot::Sender<PlaybackStatus>,
    },
    /// Receiver following every status change
    WatchStatus {
        respond_to: oneshot::Sender<watch::Receiver<PlaybackStatus>>,
    },
    GetTracks {
        kind: TrackKind,
        respond_to: oneshot::Sender<EngineResult<Vec<TrackInfo>>>,
    },
    GetCurrentTrack {
        kind: TrackKind,
        respond_to: oneshot::Sender<EngineResult<i64>>,
    },
    SetAudioTrack {
        id: i64,
        respond_to: oneshot::Sender<EngineResult<()>>,
    },
    SetSubtitleTrack {
        id: i64,
        respond_to: oneshot::Sender<EngineResult<()>>,
    },
    SetSubtitleVisibility {
        visible: bool,
        respond_to: oneshot::Sender<EngineResult<()>>,
    },
    /// Dispose the player and end the loop
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Owns one platform player and serializes every request onto one task
pub struct PlayerController {
    player: Box<dyn PlatformPlayer>,
    receiver: mpsc::UnboundedReceiver<PlayerCommand>,
}

fn seconds(value: EngineResult<f64>) -> Option<Duration> {
    value.ok().and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

impl PlayerController {
    pub fn new(player: Box<dyn PlatformPlayer>) -> (PlayerHandle, PlayerController) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (PlayerHandle { sender }, PlayerController { player, receiver })
    }

    /// Run the controller event loop until every handle is dropped or
    /// shutdown is requested. The player is disposed either way.
    pub async fn run(mut self) {
        debug!("PlayerController event loop started");

        let mut shutdown = None;
        while let Some(command) = self.receiver.recv().await {
            if let PlayerCommand::Shutdown { respond_to } = command {
                debug!("Shutdown requested");
                shutdown = Some(respond_to);
                break;
            }
            self.handle(command);
        }

        self.player.dispose();
        if let Some(respond_to) = shutdown {
            let _ = respond_to.send(());
        }
        debug!("PlayerController event loop terminated");
    }

    fn handle(&self, command: PlayerCommand) {
        let player = self.player.as_ref();
        match command {
            PlayerCommand::LoadMedia { source, respond_to } => {
                trace!("Loading media: {}", source.uri);
                let _ = respond_to.send(player.update_source(&source));
            }
            PlayerCommand::Play { respond_to } => {
                trace!("Starting playback");
                let _ = respond_to.send(player.play_requested());
            }
            PlayerCommand::Pause { respond_to } => {
                trace!("Pausing playback");
                let _ = respond_to.send(player.pause_requested());
            }
            PlayerCommand::Stop { respond_to } => {
                trace!("Stopping playback");
                let _ = respond_to.send(player.stop_requested());
            }
            PlayerCommand::Seek {
                position,
                respond_to,
            } => {
                trace!("Seeking to {:?}", position);
                let _ = respond_to.send(player.update_position(position));
            }
            PlayerCommand::UpdateSize {
                width,
                height,
                respond_to,
            } => {
                let _ = respond_to.send(player.update_size(width, height));
            }
            PlayerCommand::SetLoop {
                enabled,
                respond_to,
            } => {
                let _ = respond_to.send(player.engine().set_loop(enabled));
            }
            PlayerCommand::GetPosition { respond_to } => {
                let _ = respond_to.send(seconds(player.engine().get_f64("time-pos")));
            }
            PlayerCommand::GetDuration { respond_to } => {
                let _ = respond_to.send(seconds(player.engine().get_f64("duration")));
            }
            PlayerCommand::GetStatus { respond_to } => {
                let _ = respond_to.send(player.engine().playback_status());
            }
            PlayerCommand::WatchStatus { respond_to } => {
                let _ = respond_to.send(player.status());
            }
            PlayerCommand::GetTracks { kind, respond_to } => {
                let _ = respond_to.send(player.engine().tracks(kind));
            }
            PlayerCommand::GetCurrentTrack { kind, respond_to } => {
                let _ = respond_to.send(player.engine().current_track(kind));
            }
            PlayerCommand::SetAudioTrack { id, respond_to } => {
                trace!("Setting audio track to {}", id);
                let _ = respond_to.send(player.engine().set_audio_track(id));
            }
            PlayerCommand::SetSubtitleTrack { id, respond_to } => {
                trace!("Setting subtitle track to {}", id);
                let _ = respond_to.send(player.engine().set_subtitle_track(id));
            }
            PlayerCommand::SetSubtitleVisibility {
                visible,
                respond_to,
            } => {
                let _ = respond_to.send(player.engine().set_subtitle_visibility(visible));
            }
            // Intercepted by `run`
            PlayerCommand::Shutdown { .. } => {}
        }
    }
}

/// Handle to send commands to the player controller
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    sender: mpsc::UnboundedSender<PlayerCommand>,
}

impl PlayerHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> PlayerCommand,
    ) -> Result<T> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(command(respond_to))
            .map_err(|_| anyhow::anyhow!("Player controller disconnected"))?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("Failed to receive response from player controller"))
    }

    pub async fn load_media(&self, source: MediaSource) -> Result<()> {
        Ok(self
            .request(|respond_to| PlayerCommand::LoadMedia { source, respond_to })
            .await??)
    }

    pub async fn play(&self) -> Result<()> {
        Ok(self
            .request(|respond_to| PlayerCommand::Play { respond_to })
            .await??)
    }

    pub async fn pause(&self) -> Result<()> {
        Ok(self
            .request(|respond_to| PlayerCommand::Pause { respond_to })
            .await??)
    }

    pub async fn stop(&self) -> Result<()> {
        Ok(self
            .request(|respond_to| PlayerCommand::Stop { respond_to })
            .await??)
    }

    pub async fn seek(&self, position: Duration) -> Result<()> {
        Ok(self
            .request(|respond_to| PlayerCommand::Seek {
                position,
                respond_to,
            })
            .await??)
    }

    pub async fn update_size(&self, width: u32, height: u32) -> Result<()> {
        Ok(self
            .request(|respond_to| PlayerCommand::UpdateSize {
                width,
                height,
                respond_to,
            })
            .await??)
    }

    pub async fn set_loop(&self, enabled: bool) -> Result<()> {
        Ok(self
            .request(|respond_to| PlayerCommand::SetLoop {
                enabled,
                respond_to,
            })
            .await??)
    }

    /// Current position, `None` when nothing is loaded
    pub async fn get_position(&self) -> Result<Option<Duration>> {
        self.request(|respond_to| PlayerCommand::GetPosition { respond_to })
            .await
    }

    pub async fn get_duration(&self) -> Result<Option<Duration>> {
        self.request(|respond_to| PlayerCommand::GetDuration { respond_to })
            .await
    }

    pub async fn get_status(&self) -> Result<PlaybackStatus> {
        self.request(|respond_to| PlayerCommand::GetStatus { respond_to })
            .await
    }

    pub async fn watch_status(&self) -> Result<watch::Receiver<PlaybackStatus>> {
        self.request(|respond_to| PlayerCommand::WatchStatus { respond_to })
            .await
    }

    pub async fn get_audio_tracks(&self) -> Result<Vec<TrackInfo>> {
        self.get_tracks(TrackKind::Audio).await
    }

    pub async fn get_subtitle_tracks(&self) -> Result<Vec<TrackInfo>> {
        self.get_tracks(TrackKind::Subtitle).await
    }

    async fn get_tracks(&self, kind: TrackKind) -> Result<Vec<TrackInfo>> {
        Ok(self
            .request(|respond_to| PlayerCommand::GetTracks { kind, respond_to })
            .await??)
    }

    pub async fn get_current_audio_track(&self) -> Result<i64> {
        Ok(self
            .request(|respond_to| PlayerCommand::GetCurrentTrack {
                kind: TrackKind::Audio,
                respond_to,
            })
            .await??)
    }

    pub async fn get_current_subtitle_track(&self) -> Result<i64> {
        Ok(self
            .request(|respond_to| PlayerCommand::GetCurrentTrack {
                kind: TrackKind::Subtitle,
                respond_to,
            })
            .await??)
    }

    pub async fn set_audio_track(&self, id: i64) -> Result<()> {
        Ok(self
            .request(|respond_to| PlayerCommand::SetAudioTrack { id, respond_to })
            .await??)
    }

    pub async fn set_subtitle_track(&self, id: i64) -> Result<()> {
        Ok(self
            .request(|respond_to| PlayerCommand::SetSubtitleTrack { id, respond_to })
            .await??)
    }

    pub async fn set_subtitle_visibility(&self, visible: bool) -> Result<()> {
        Ok(self
            .request(|respond_to| PlayerCommand::SetSubtitleVisibility {
                visible,
                respond_to,
            })
            .await??)
    }

    /// Dispose the player and stop the controller
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|respond_to| PlayerCommand::Shutdown { respond_to })
            .await
    }
}
