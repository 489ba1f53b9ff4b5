//! Moodify CLI Library
//!
//! Offline harness around the audio core: renders WAV files through the
//! processing graph, edits persisted audio settings and drives the
//! persisted playback state.
//!
//! This library exposes the core components for testing purposes.

pub mod config;
pub mod error;
pub mod render;
pub mod services;

pub use config::MoodifyConfig;
pub use error::{CliError, Result};
pub use render::{read_wav, render_buffer, render_file, write_wav, RenderReport, StereoBuffer};
