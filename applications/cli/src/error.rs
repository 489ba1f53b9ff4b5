/// CLI error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Audio(#[from] moodify_audio::AudioError),

    #[error(transparent)]
    Core(#[from] moodify_core::MoodifyError),

    #[error(transparent)]
    Playback(#[from] moodify_playback::PlaybackError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
