//! Headless demo shell: drives the sync engine against the built-in
//! simulated player and pipes the active lyric line to stdout. Rendering
//! layers consume the same subscription contract this binary does.

use lyricpip_core::{
    BlockPosition, Config, LyricsProviderType, LyricsResolver, LyricsSource, OffsetStore,
    PlaybackProvider, SessionEvent, SimulatedPlayback, SyncSession,
};
use lyricpip_lyrics_lrclib::LrclibSource;
use lyricpip_lyrics_musixmatch::MusixmatchSource;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::load_or_create() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let offsets = Arc::new(OffsetStore::open(config.offsets.file_path()).await);
    let sources = build_sources(&config.lyrics);
    if sources.is_empty() {
        warn!("No lyrics sources available; only waiting states will be shown");
    }
    let resolver = LyricsResolver::new(sources);
    info!("Lyrics sources (priority order): {:?}", resolver.source_names());

    let playback: Arc<dyn PlaybackProvider> = Arc::new(SimulatedPlayback::new());
    let session = SyncSession::new(playback, resolver, offsets, &config.sync, None);

    let mut events = session.subscribe();
    let handle = session.clone().start();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&session, event).await,
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Display fell behind by {skipped} events");
                }
            }
        }
    }

    session.cancel_token().cancel();
    let _ = handle.await;
}

fn build_sources(config: &lyricpip_core::LyricsConfig) -> Vec<Box<dyn LyricsSource>> {
    let mut sources: Vec<Box<dyn LyricsSource>> = Vec::new();
    for provider in &config.providers {
        match provider {
            LyricsProviderType::Musixmatch => {
                match MusixmatchSource::new(config.musixmatch_usertoken.clone()) {
                    Ok(source) => sources.push(Box::new(source)),
                    Err(e) => error!("Skipping musixmatch source: {e}"),
                }
            }
            LyricsProviderType::Lrclib => match LrclibSource::new() {
                Ok(source) => sources.push(Box::new(source)),
                Err(e) => error!("Skipping lrclib source: {e}"),
            },
        }
    }
    sources
}

async fn print_event(session: &SyncSession, event: SessionEvent) {
    match event {
        SessionEvent::TrackChanged { track } => {
            println!("\u{266a} {} - {}", track.artist, track.name);
        }
        SessionEvent::LyricsNotFound => {
            println!("(no lyrics found)");
        }
        SessionEvent::BlockChanged { position } => {
            let state = session.state().await;
            match (position, state.lyrics) {
                (BlockPosition::At(index), Some(lyrics)) => {
                    if let Some(block) = lyrics.blocks.get(index) {
                        println!("{}", block.text);
                    }
                }
                (BlockPosition::BeforeFirst, Some(_)) => println!("..."),
                _ => {}
            }
        }
        SessionEvent::Disconnected { message } => {
            warn!("Playback backend unavailable: {message}");
        }
        _ => {}
    }
}
