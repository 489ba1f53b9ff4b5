/// Spectrum analyser tap
///
/// Keeps the most recent `ANALYSER_FFT_SIZE` mono-downmixed frames and
/// produces a smoothed magnitude spectrum on demand. Audio passes through
/// unchanged; the graph only ever wires it as a side tap.
use super::AudioEffect;
use apodize::hanning_iter;
use rustfft::{num_complex::Complex32, Fft, FftPlanner};
use std::sync::Arc;

/// Window size in frames
pub const ANALYSER_FFT_SIZE: usize = 2048;

/// Time-smoothing factor between successive spectra
pub const ANALYSER_SMOOTHING: f32 = 0.8;

/// Level mapped to byte value 0
pub const ANALYSER_MIN_DB: f32 = -90.0;

/// Level mapped to byte value 255
pub const ANALYSER_MAX_DB: f32 = -10.0;

/// Analyser node
pub struct Analyser {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Circular buffer of mono samples
    history: Vec<f32>,
    write_pos: usize,
    fft_buffer: Vec<Complex32>,
    smoothed: Vec<f32>,
    sample_rate: u32,
}

impl Analyser {
    /// Create an analyser with the fixed window, smoothing and range
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(ANALYSER_FFT_SIZE),
            window: hanning_iter(ANALYSER_FFT_SIZE).map(|x| x as f32).collect(),
            history: vec![0.0; ANALYSER_FFT_SIZE],
            write_pos: 0,
            fft_buffer: vec![Complex32::new(0.0, 0.0); ANALYSER_FFT_SIZE],
            smoothed: vec![0.0; ANALYSER_FFT_SIZE / 2],
            sample_rate: 44100,
        }
    }

    /// Number of frequency bins (half the FFT size)
    pub fn frequency_bin_count(&self) -> usize {
        ANALYSER_FFT_SIZE / 2
    }

    /// Sample rate of the most recently analysed block
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Center frequency of a bin in Hz
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / ANALYSER_FFT_SIZE as f32
    }

    /// Fill `out` with the spectrum in dB (one value per bin, up to `out.len()`)
    pub fn float_frequency_data(&mut self, out: &mut [f32]) {
        self.update_spectrum();
        for (dst, &magnitude) in out.iter_mut().zip(&self.smoothed) {
            *dst = magnitude_to_db(magnitude);
        }
    }

    /// Fill `out` with the spectrum scaled into 0..=255 over the dB range
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        self.update_spectrum();
        let range = ANALYSER_MAX_DB - ANALYSER_MIN_DB;
        for (dst, &magnitude) in out.iter_mut().zip(&self.smoothed) {
            let db = magnitude_to_db(magnitude);
            let scaled = 255.0 * (db - ANALYSER_MIN_DB) / range;
            *dst = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    fn update_spectrum(&mut self) {
        // Oldest sample first
        for (i, bin) in self.fft_buffer.iter_mut().enumerate() {
            let sample = self.history[(self.write_pos + i) % ANALYSER_FFT_SIZE];
            *bin = Complex32::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.fft_buffer);

        let scale = 1.0 / ANALYSER_FFT_SIZE as f32;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(&self.fft_buffer) {
            let magnitude = bin.norm() * scale;
            *smoothed = ANALYSER_SMOOTHING * *smoothed + (1.0 - ANALYSER_SMOOTHING) * magnitude;
            if !smoothed.is_finite() {
                *smoothed = 0.0;
            }
        }
    }
}

impl Default for Analyser {
    fn default() -> Self {
        Self::new()
    }
}

fn magnitude_to_db(magnitude: f32) -> f32 {
    if magnitude > 0.0 {
        20.0 * magnitude.log10()
    } else {
        f32::NEG_INFINITY
    }
}

impl AudioEffect for Analyser {
    fn process(&mut self, buffer: &mut [f32], sample_rate: u32) {
        self.sample_rate = sample_rate;
        for frame in buffer.chunks_exact(2) {
            self.history[self.write_pos] = (frame[0] + frame[1]) * 0.5;
            self.write_pos = (self.write_pos + 1) % ANALYSER_FFT_SIZE;
        }
    }

    fn reset(&mut self) {
        self.history.fill(0.0);
        self.smoothed.fill(0.0);
        self.write_pos = 0;
    }

    fn name(&self) -> &str {
        "Analyser"
    }
}
