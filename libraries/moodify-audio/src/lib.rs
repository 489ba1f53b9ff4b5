//! Moodify Audio
//!
//! Client-side signal processing for Moodify.
//!
//! This crate provides:
//! - Processing nodes (peaking EQ, compressor, convolver, gain, analyser)
//! - An [`AudioContext`] graph that renders blocks in topological order
//! - The persisted [`SettingsStore`] with change notification
//! - The [`AudioGraphService`] that rewires the chain on every settings change
//! - Impulse-response loading with in-flight de-duplication
//! - The [`SpectrumVisualizer`] frame loop
//!
//! # Example
//!
//! ```rust
//! use moodify_audio::{AudioContext, SettingsStore, Preset};
//!
//! let ctx = AudioContext::new(44100).into_shared();
//! let (input, output) = {
//!     let mut ctx = ctx.lock().unwrap();
//!     (ctx.create_source(), ctx.create_destination())
//! };
//!
//! let settings = SettingsStore::new();
//! settings.apply_preset(Preset::find("Bass Boost").unwrap());
//! assert_eq!(settings.snapshot().active_preset_name, "Bass Boost");
//! # let _ = (input, output);
//! ```

pub mod context;
mod error;
pub mod graph;
pub mod impulse;
pub mod node;
pub mod settings;
pub mod visualizer;

pub use context::{AudioContext, ContextState, NodeId, SharedContext};
pub use error::{AudioError, Result};
pub use graph::{normalization_curve, AudioGraphService, GraphSlots};
pub use impulse::{
    decode_impulse, AssetCache, AssetFetcher, FileAssetCache, HttpFetcher, ImpulseAssets,
    ImpulseLoader, IrCache, MemoryAssetCache,
};
pub use node::ImpulseResponse;
pub use settings::{
    AudioSettings, FrequencyBand, NormalizationMode, Preset, RoomSize, SettingsChange,
    SettingsStore,
};
pub use visualizer::{
    AudioSourceProbe, ContextProbe, FrameSink, SpectrumFrame, SpectrumVisualizer,
    VisualizerExit, VisualizerHandle, DEFAULT_FRAME_INTERVAL,
};
