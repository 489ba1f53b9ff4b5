/// Moodify - offline harness for the audio core
use clap::{Parser, Subcommand, ValueEnum};
use moodify_audio::{
    settings::PRESETS, FrequencyBand, NormalizationMode, Preset, RoomSize, SettingsStore,
};
use moodify_cli::{config::MoodifyConfig, render, services, CliError};
use moodify_core::Track;
use moodify_playback::{PlaybackManager, RepeatMode};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "moodify")]
#[command(about = "Moodify audio core: render, tune and drive playback", long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./moodify.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a WAV file through the graph using the persisted settings
    Render {
        /// Input WAV file
        input: PathBuf,
        /// Output WAV file (32-bit float stereo)
        output: PathBuf,
        /// Frames per render block, overrides render.block_size
        #[arg(long)]
        block_size: Option<usize>,
    },
    /// List equalizer presets
    Presets,
    /// Inspect or change persisted audio settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Inspect or drive the persisted playback state
    Playback {
        #[command(subcommand)]
        action: PlaybackAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl Switch {
    fn enabled(self) -> bool {
        matches!(self, Switch::On)
    }
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings as JSON
    Show,
    /// Apply a named equalizer preset
    Preset { name: String },
    /// Set one equalizer band in dB
    Eq {
        /// Band center frequency (60, 310, 1000, 3000, 6000, 12000)
        band: FrequencyBand,
        #[arg(allow_negative_numbers = true)]
        gain_db: f32,
    },
    /// Enable or bypass the equalizer
    Equalizer { state: Switch },
    /// Loudness normalization (off, loud, normal, quiet)
    Normalization { mode: NormalizationMode },
    /// Convolution reverb
    Reverb {
        state: Switch,
        /// Wet share, 0.0 to 1.0
        #[arg(long)]
        mix: Option<f32>,
        /// Room (small, medium, large)
        #[arg(long)]
        room: Option<RoomSize>,
    },
    /// Spectrum analyser tap
    Analyzer { state: Switch },
    /// Playback-rate display multiplier
    Rate {
        state: Switch,
        #[arg(long)]
        value: Option<f32>,
    },
    /// Restore every default
    Reset,
}

#[derive(Subcommand)]
enum PlaybackAction {
    /// Print the current playback state as JSON
    Show,
    /// Replace the queue with tracks from a JSON file and start playing
    Play {
        /// JSON array of tracks
        tracks: PathBuf,
        /// Queue index to start from
        #[arg(long, default_value_t = 0)]
        start: usize,
    },
    /// Append tracks from a JSON file to the queue
    Enqueue { tracks: PathBuf },
    /// Jump to a queue index
    Skip { index: usize },
    /// Advance to the next track
    Next,
    /// Go back to the previous track
    Previous,
    /// Toggle play/pause
    Toggle,
    /// Toggle shuffle
    Shuffle,
    /// Set the repeat mode, or cycle it when omitted
    Repeat { mode: Option<RepeatMode> },
    /// Empty the queue
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moodify=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = MoodifyConfig::load(cli.config.as_deref())?;
    config.validate()?;

    match cli.command {
        Commands::Render {
            input,
            output,
            block_size,
        } => {
            render_command(&config, &input, &output, block_size).await?;
        }
        Commands::Presets => {
            for preset in PRESETS {
                let gains: Vec<String> = preset.gains.iter().map(|g| format!("{g:+.1}")).collect();
                println!("{:<14} {}", preset.name, gains.join(" "));
            }
        }
        Commands::Settings { action } => {
            let settings = services::open_settings(&config)?;
            settings_command(&settings, action)?;
            println!("{}", serde_json::to_string_pretty(&settings.snapshot())?);
        }
        Commands::Playback { action } => {
            let (mut manager, counter) = services::open_playback(&config)?;
            playback_command(&mut manager, action)?;

            for event in manager.drain_events() {
                tracing::debug!(?event, "Playback event");
            }
            println!("{}", serde_json::to_string_pretty(&manager.snapshot())?);

            if let Some(counter) = counter {
                counter.flush().await;
            }
        }
    }

    Ok(())
}

async fn render_command(
    config: &MoodifyConfig,
    input: &Path,
    output: &Path,
    block_size: Option<usize>,
) -> anyhow::Result<()> {
    let settings = services::open_settings(config)?;
    let loader = services::impulse_loader(config)?;
    let block_frames = block_size.unwrap_or(config.render.block_size);

    tracing::info!(
        input = %input.display(),
        preset = %settings.read(|s| s.active_preset_name.clone()),
        "Rendering"
    );

    let report = render::render_file(
        input,
        output,
        settings,
        loader,
        block_frames,
        config.render.settle_timeout(),
    )
    .await?;

    println!(
        "Rendered {} frames at {} Hz into {}",
        report.frames,
        report.sample_rate,
        output.display()
    );
    Ok(())
}

fn settings_command(settings: &SettingsStore, action: SettingsAction) -> Result<(), CliError> {
    match action {
        SettingsAction::Show => {}
        SettingsAction::Preset { name } => {
            let preset = Preset::find(&name)
                .ok_or_else(|| CliError::InvalidArgument(format!("unknown preset: {name}")))?;
            settings.apply_preset(preset);
        }
        SettingsAction::Eq { band, gain_db } => settings.set_equalizer_gain(band, gain_db),
        SettingsAction::Equalizer { state } => settings.set_equalizer_enabled(state.enabled()),
        SettingsAction::Normalization { mode } => settings.set_normalization_mode(mode),
        SettingsAction::Reverb { state, mix, room } => {
            settings.set_reverb_enabled(state.enabled());
            if let Some(mix) = mix {
                settings.set_reverb_mix(mix);
            }
            if let Some(room) = room {
                settings.set_reverb_room_size(room);
            }
        }
        SettingsAction::Analyzer { state } => settings.set_wave_analyzer_enabled(state.enabled()),
        SettingsAction::Rate { state, value } => {
            settings.set_playback_rate_enabled(state.enabled());
            if let Some(value) = value {
                settings.set_playback_rate(value);
            }
        }
        SettingsAction::Reset => settings.reset_audio_settings(),
    }
    Ok(())
}

fn read_tracks(path: &Path) -> Result<Vec<Track>, CliError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| {
        CliError::InvalidArgument(format!("{} is not a JSON track list: {e}", path.display()))
    })
}

fn playback_command(manager: &mut PlaybackManager, action: PlaybackAction) -> Result<(), CliError> {
    match action {
        PlaybackAction::Show => {}
        PlaybackAction::Play { tracks, start } => {
            manager.play_collection(read_tracks(&tracks)?, start);
        }
        PlaybackAction::Enqueue { tracks } => {
            for track in read_tracks(&tracks)? {
                manager.add_to_queue(track);
            }
        }
        PlaybackAction::Skip { index } => manager.skip_to_index(index)?,
        PlaybackAction::Next => manager.play_next(),
        PlaybackAction::Previous => manager.play_previous(),
        PlaybackAction::Toggle => manager.toggle_play(),
        PlaybackAction::Shuffle => manager.toggle_shuffle(),
        PlaybackAction::Repeat { mode: Some(mode) } => manager.set_repeat_mode(mode),
        PlaybackAction::Repeat { mode: None } => manager.cycle_repeat_mode(),
        PlaybackAction::Clear => manager.clear_queue(),
    }
    Ok(())
}
