use anyhow::{Context, Result};
use reel_engine::events::EngineEvent;
use reel_engine::platforms::HeadlessPlayer;
use reel_engine::{Config, EventKind, MediaSource, PlatformPlayer, PlayerController};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("reel_engine=info,mpv=warn")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let uri = args
        .next()
        .context("usage: reel-engine <path-or-url> [start-seconds]")?;
    let mut source = MediaSource::new(uri);
    if let Some(start) = args.next() {
        source = source.starting_at_secs(&start)?;
    }

    let mut config = Config::load()?;
    // End of file must end playback so the loop below can exit
    config.playback.keep_open = false;
    info!("Starting reel-engine (poll timeout {}ms)", config.engine.poll_timeout_ms);

    let player = HeadlessPlayer::new(&config)?;
    let mut events = player.engine().subscribe_to(vec![EventKind::EndFile, EventKind::Shutdown]);
    let mut status = player.status();

    let (handle, controller) = PlayerController::new(Box::new(player));
    let controller = tokio::spawn(controller.run());

    handle.load_media(source).await?;

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                let position = handle.get_position().await?.unwrap_or_default();
                info!("Status: {:?} at {:.1}s", current, position.as_secs_f64());
            }
            event = events.recv() => {
                match event {
                    Some(EngineEvent::EndFile(end)) => {
                        info!("Playback ended: {:?}", end.reason);
                        break;
                    }
                    Some(EngineEvent::Shutdown) | None => break,
                    Some(_) => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
                break;
            }
        }
    }

    handle.shutdown().await?;
    controller.await?;
    info!("Done");
    Ok(())
}
