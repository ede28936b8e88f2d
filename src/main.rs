//! Somnus - Layered Soundscapes for Sleep Training
//!
//! Command line entry point.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use somnus::audio::{Announcer, AudioBackend, LogSynth, ScheduledAnnouncer, SpeechSynth};
use somnus::library::{FileSelector, MediaLibrary};
use somnus::routines::{AmbientBackground, NoiseType, ResourceRef};
use somnus::scheduler::{Layer, PlayOutcome, PlayRequest, PlaybackEvent, SoundPoolManager};
use somnus::storage::config::{self, AppConfig, SpeechSettings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "somnus", version, about = "Layered soundscapes for sleep training")]
struct Cli {
    /// Override the media library root
    #[arg(long, global = true)]
    media: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Play one or more routines back to back
    Play {
        /// Routine tags: wild, mild, wild-prompt, mild-prompt, ssild, pod
        #[arg(required = true)]
        tags: Vec<String>,

        /// Background noise type
        #[arg(long, default_value = "brown")]
        noise: NoiseType,

        /// Background resource (builtin id or file path), `<noise>-noise` by default
        #[arg(long)]
        background: Option<String>,

        /// Background to leave playing after the last routine
        #[arg(long)]
        end_background: Option<String>,

        /// Status label kept after the last routine
        #[arg(long)]
        end_label: Option<String>,

        /// Event label shown with each routine
        #[arg(long, default_value = "")]
        event: String,

        /// Play count (episode number for pod, repetition for ssild)
        #[arg(long, default_value_t = 1)]
        play_count: u32,

        /// Position of a prompt routine within a chain
        #[arg(long, default_value_t = 1)]
        prompt_count: u32,
    },

    /// List the audio files of a library directory
    List {
        /// Directory relative to the media root, e.g. `wild/clips`
        dir: String,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Somnus v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let mut app_config = config::load_config().context("Failed to load configuration")?;
    if let Some(media) = cli.media {
        app_config.library.root = Some(media);
    }

    match cli.command {
        Commands::Config => {
            print!("{}", config::to_toml(&app_config)?);
        }
        Commands::List { dir } => {
            let library = MediaLibrary::new(app_config.library_root());
            for name in library.list_files(&dir) {
                println!("{}", name);
            }
        }
        Commands::Play {
            tags,
            noise,
            background,
            end_background,
            end_label,
            event,
            play_count,
            prompt_count,
        } => {
            let resource = background
                .map(|b| parse_resource(&b))
                .unwrap_or_else(|| ResourceRef::builtin(format!("{}-noise", noise.key())));
            let ambient = AmbientBackground::new(noise, resource, noise.to_string());

            let mut request = PlayRequest::new(tags)
                .with_event_label(event)
                .with_play_count(play_count)
                .with_prompt_count(prompt_count);
            request.end_background = end_background.map(|b| parse_resource(&b));
            request.end_background_label = end_label;

            play(&app_config, ambient, request).await?;
        }
    }

    Ok(())
}

async fn play(app_config: &AppConfig, ambient: AmbientBackground, request: PlayRequest) -> Result<()> {
    let backend = open_backend();
    let library: Arc<dyn FileSelector> = Arc::new(MediaLibrary::new(app_config.library_root()));
    let announcer = open_announcer(&app_config.speech);
    let manager = SoundPoolManager::new(backend, library, announcer, app_config.engine_settings());

    manager.set_background(ambient).await;
    let keep_background = request.end_background_label.is_some();

    let mut events = manager.subscribe();
    match manager.play_routines(request) {
        PlayOutcome::Started => {}
        PlayOutcome::AlreadyRunning => return Ok(()),
        PlayOutcome::NothingToPlay => bail!("None of the routine tags can be played"),
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                manager.stop_all();
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(PlaybackEvent::StatusChanged(label)) => println!("Now playing: {}", label),
                Ok(PlaybackEvent::CueSkipped { index, resource }) => {
                    println!("  skipped cue {} ({})", index + 1, resource)
                }
                Ok(PlaybackEvent::SequenceFinished) | Err(RecvError::Closed) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => tracing::debug!("Missed {} playback events", missed),
            }
        }
    }

    if keep_background && manager.is_playing(Layer::Background) {
        println!("Background keeps playing, press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to wait for Ctrl-C")?;
    }
    manager.stop_all();
    Ok(())
}

/// Builtin id, or a path when the value names an existing file.
fn parse_resource(value: &str) -> ResourceRef {
    let path = Path::new(value);
    if path.is_file() {
        ResourceRef::Path(path.to_path_buf())
    } else {
        ResourceRef::builtin(value)
    }
}

#[cfg(feature = "playback")]
fn open_backend() -> Arc<dyn AudioBackend> {
    match somnus::audio::RodioBackend::new() {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            tracing::warn!("No audio output ({}), playing silently", e);
            Arc::new(somnus::audio::SimulatedBackend::default())
        }
    }
}

#[cfg(not(feature = "playback"))]
fn open_backend() -> Arc<dyn AudioBackend> {
    tracing::warn!("Built without the playback feature, playing silently");
    Arc::new(somnus::audio::SimulatedBackend::default())
}

#[cfg(feature = "speech")]
fn open_announcer(settings: &SpeechSettings) -> Arc<dyn Announcer> {
    match somnus::audio::TtsSynth::new() {
        Ok(synth) => {
            configure_synth(&synth, settings);
            Arc::new(ScheduledAnnouncer::new(Arc::new(synth), settings.enabled))
        }
        Err(e) => {
            tracing::warn!("Speech unavailable ({}), announcements are only logged", e);
            log_announcer(settings)
        }
    }
}

#[cfg(not(feature = "speech"))]
fn open_announcer(settings: &SpeechSettings) -> Arc<dyn Announcer> {
    log_announcer(settings)
}

fn log_announcer(settings: &SpeechSettings) -> Arc<dyn Announcer> {
    let synth = LogSynth::new();
    configure_synth(&synth, settings);
    Arc::new(ScheduledAnnouncer::new(Arc::new(synth), settings.enabled))
}

fn configure_synth(synth: &dyn SpeechSynth, settings: &SpeechSettings) {
    synth.set_rate(settings.rate);
    synth.set_volume(settings.volume);
}
