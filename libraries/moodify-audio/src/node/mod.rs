//! Signal-processing nodes
//!
//! Every processor operates on interleaved stereo `f32` buffers
//! (L, R, L, R, ...) in the [-1.0, 1.0] range. Whether a processor is
//! audible is decided by how the graph is wired, not by a per-node bypass
//! flag, so the trait has no enable/disable switch.
//!
//! Available processors:
//! - **PeakingFilter**: one equalizer band (RBJ peaking biquad)
//! - **Compressor**: dynamic range compressor used for normalization
//! - **Convolver**: impulse-response convolution (100% wet)
//! - **Gain**: linear gain stage (dry/wet and junction nodes)
//! - **Analyser**: FFT spectrum tap for the visualizer

mod analyser;
mod compressor;
mod convolver;
mod filter;
mod gain;

pub use analyser::{
    Analyser, ANALYSER_FFT_SIZE, ANALYSER_MAX_DB, ANALYSER_MIN_DB, ANALYSER_SMOOTHING,
};
pub use compressor::{Compressor, CompressorSettings};
pub use convolver::{Convolver, ImpulseResponse};
pub use filter::{PeakingFilter, PEAKING_Q};
pub use gain::Gain;

/// Trait implemented by every processing node
///
/// # Real-Time Constraints
/// - `process()` must not block
/// - Must be Send so the graph can be rendered from an audio thread
pub trait AudioEffect: Send {
    /// Process audio buffer in-place
    ///
    /// # Arguments
    /// * `buffer` - Interleaved stereo samples (L, R, L, R, ...)
    /// * `sample_rate` - Sample rate in Hz
    fn process(&mut self, buffer: &mut [f32], sample_rate: u32);

    /// Reset internal state (e.g., when seeking or changing tracks)
    fn reset(&mut self);

    /// Effect name (for logging)
    fn name(&self) -> &str;
}

#[cfg(test)]
pub(crate) mod test_signals {
    /// Generate an interleaved stereo sine wave
    pub(crate) fn generate_sine(freq: f32, sample_rate: u32, duration_secs: f32) -> Vec<f32> {
        let num_samples = (sample_rate as f32 * duration_secs) as usize;
        let mut samples = Vec::with_capacity(num_samples * 2);

        for i in 0..num_samples {
            let t = i as f32 / sample_rate as f32;
            let sample = (2.0 * std::f32::consts::PI * freq * t).sin();
            samples.push(sample);
            samples.push(sample);
        }

        samples
    }

    /// RMS of the left channel, skipping the first `skip_frames` frames
    pub(crate) fn rms_left(buffer: &[f32], skip_frames: usize) -> f32 {
        let frames: Vec<f32> = buffer.chunks_exact(2).skip(skip_frames).map(|c| c[0]).collect();
        if frames.is_empty() {
            return 0.0;
        }
        (frames.iter().map(|s| s * s).sum::<f32>() / frames.len() as f32).sqrt()
    }
}
