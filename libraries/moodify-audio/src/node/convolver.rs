//! Convolution node for impulse-response reverb
//!
//! The convolver output is 100% wet: the dry/wet blend happens in the graph
//! through a separate pair of gain nodes. With no impulse attached the node
//! outputs silence, which is what makes a failed impulse load degrade to
//! "reverb off" instead of breaking the chain.
//!
//! Short impulses (<= 64 frames) are convolved directly in the time domain.
//! Longer ones use uniformly partitioned overlap-add with a fixed 1024-point
//! transform, so memory and per-block cost grow linearly with impulse length
//! rather than forcing one transform as long as the whole room tail.

use super::AudioEffect;
use crate::error::{AudioError, Result};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Threshold below which we use direct time-domain convolution
const TIME_DOMAIN_THRESHOLD: usize = 64;

/// Impulse piece length for partitioned convolution; transforms are twice this
const PARTITION_FRAMES: usize = 512;

/// Decoded impulse response (interleaved, mono or stereo)
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

impl ImpulseResponse {
    /// Wrap decoded samples
    ///
    /// # Errors
    /// Empty sample data, a channel count other than 1 or 2, or a sample
    /// count that is not a multiple of the channel count.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: usize) -> Result<Self> {
        if samples.is_empty() {
            return Err(AudioError::InvalidBuffer("impulse response is empty".into()));
        }
        if channels != 1 && channels != 2 {
            return Err(AudioError::InvalidBuffer(format!(
                "invalid channel count: {channels} (must be 1 or 2)"
            )));
        }
        if samples.len() % channels != 0 {
            return Err(AudioError::InvalidBuffer(format!(
                "{} samples is not a whole number of {channels}-channel frames",
                samples.len()
            )));
        }
        Ok(Self {
            samples,
            sample_rate,
            channels,
        })
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate the impulse was recorded at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count (1 or 2)
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Length in frames
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    /// Length in time
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    /// Left/right channel split, mono duplicated to both sides
    fn split_channels(&self) -> (Vec<f32>, Vec<f32>) {
        let frames = self.frames();
        let mut left = Vec::with_capacity(frames);
        let mut right = Vec::with_capacity(frames);
        for frame in self.samples.chunks_exact(self.channels) {
            left.push(frame[0]);
            right.push(if self.channels == 2 { frame[1] } else { frame[0] });
        }
        (left, right)
    }
}

/// Forward/inverse transforms shared by both channels, plus scratch space
struct Transforms {
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    sum: Vec<Complex<f32>>,
}

impl Transforms {
    fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            sum: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    fn size(&self) -> usize {
        self.scratch.len()
    }

    /// Zero-padded spectrum of `samples`, written into `out`
    fn spectrum_into(&self, samples: &[f32], out: &mut Vec<Complex<f32>>) {
        out.clear();
        out.extend(samples.iter().map(|&s| Complex::new(s, 0.0)));
        out.resize(self.size(), Complex::new(0.0, 0.0));
        self.forward.process(out);
    }

    /// Add `segment` convolved with one impulse piece into `acc` from `offset`
    fn convolve_into(
        &mut self,
        segment: &[f32],
        piece: &[Complex<f32>],
        acc: &mut [f32],
        offset: usize,
    ) {
        for (i, bin) in self.scratch.iter_mut().enumerate() {
            *bin = Complex::new(segment.get(i).copied().unwrap_or(0.0), 0.0);
        }
        self.forward.process(&mut self.scratch);
        for (bin, h) in self.scratch.iter_mut().zip(piece) {
            *bin = *bin * *h;
        }
        self.inverse.process(&mut self.scratch);

        let scale = 1.0 / self.size() as f32;
        let len = segment.len() + PARTITION_FRAMES - 1;
        for (a, bin) in acc[offset..].iter_mut().zip(&self.scratch).take(len) {
            *a += bin.re * scale;
        }
    }

    /// Add the sum of `spectra[m] * pieces[m]` (back in the time domain) into `acc`
    fn accumulate(
        &mut self,
        spectra: &VecDeque<Vec<Complex<f32>>>,
        pieces: &[Vec<Complex<f32>>],
        acc: &mut [f32],
    ) {
        self.sum.fill(Complex::new(0.0, 0.0));
        for (input, piece) in spectra.iter().zip(pieces) {
            for ((out, x), h) in self.sum.iter_mut().zip(input).zip(piece) {
                *out += x * h;
            }
        }
        self.inverse.process(&mut self.sum);

        let scale = 1.0 / self.size() as f32;
        for (a, bin) in acc.iter_mut().zip(&self.sum) {
            *a += bin.re * scale;
        }
    }
}

/// One channel of the partitioned convolution
struct ChannelState {
    /// Spectra of the impulse cut into `PARTITION_FRAMES` pieces
    pieces: Vec<Vec<Complex<f32>>>,
    /// Spectra of completed input partitions, newest first
    spectra: VecDeque<Vec<Complex<f32>>>,
    /// Input of the partition being filled
    block: Vec<f32>,
    /// Output for the current partition and the one after it
    acc: Vec<f32>,
}

impl ChannelState {
    fn new(ir: &[f32], transforms: &Transforms) -> Self {
        let pieces: Vec<_> = ir
            .chunks(PARTITION_FRAMES)
            .map(|piece| {
                let mut spectrum = Vec::with_capacity(transforms.size());
                transforms.spectrum_into(piece, &mut spectrum);
                spectrum
            })
            .collect();

        Self {
            spectra: VecDeque::with_capacity(pieces.len()),
            pieces,
            block: Vec::with_capacity(PARTITION_FRAMES),
            acc: vec![0.0; PARTITION_FRAMES * 2],
        }
    }

    /// Convolve new input with the first piece right away (no added latency)
    fn push(&mut self, segment: &[f32], transforms: &mut Transforms) {
        let fill = self.block.len();
        transforms.convolve_into(segment, &self.pieces[0], &mut self.acc, fill);
        self.block.extend_from_slice(segment);
    }

    /// Close the full input partition and fold earlier input into the later pieces
    fn advance(&mut self, transforms: &mut Transforms) {
        self.acc.copy_within(PARTITION_FRAMES.., 0);
        self.acc[PARTITION_FRAMES..].fill(0.0);

        let later = self.pieces.len() - 1;
        if later > 0 {
            // Recycle the oldest spectrum once the delay line is full
            let recycled = if self.spectra.len() == later {
                self.spectra.pop_back()
            } else {
                None
            };
            let mut spectrum = recycled.unwrap_or_default();
            transforms.spectrum_into(&self.block, &mut spectrum);
            self.spectra.push_front(spectrum);
            transforms.accumulate(&self.spectra, &self.pieces[1..], &mut self.acc);
        }
        self.block.clear();
    }

    fn reset(&mut self) {
        self.spectra.clear();
        self.block.clear();
        self.acc.fill(0.0);
    }
}

/// Uniformly partitioned overlap-add
///
/// The transform size is fixed at twice the partition, whatever the impulse
/// length; a longer impulse only adds one spectrum multiply per piece each
/// time an input partition completes.
struct FftState {
    transforms: Transforms,
    channels: [ChannelState; 2],
    segment: Vec<f32>,
}

impl FftState {
    fn new(ir_left: &[f32], ir_right: &[f32]) -> Self {
        let transforms = Transforms::new(PARTITION_FRAMES * 2);
        let channels = [
            ChannelState::new(ir_left, &transforms),
            ChannelState::new(ir_right, &transforms),
        ];
        Self {
            transforms,
            channels,
            segment: Vec::with_capacity(PARTITION_FRAMES),
        }
    }

    fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
    }

    fn process(&mut self, buffer: &mut [f32]) {
        let frames = buffer.len() / 2;
        let mut pos = 0;
        while pos < frames {
            // Segments never straddle a partition boundary
            let fill = self.channels[0].block.len();
            let count = (frames - pos).min(PARTITION_FRAMES - fill);

            for (channel, state) in self.channels.iter_mut().enumerate() {
                self.segment.clear();
                self.segment.extend(
                    buffer[pos * 2..(pos + count) * 2]
                        .iter()
                        .skip(channel)
                        .step_by(2),
                );
                state.push(&self.segment, &mut self.transforms);

                for (i, &wet) in state.acc[fill..fill + count].iter().enumerate() {
                    buffer[(pos + i) * 2 + channel] = wet;
                }
                if state.block.len() == PARTITION_FRAMES {
                    state.advance(&mut self.transforms);
                }
            }
            pos += count;
        }
    }
}

/// Convolution node
pub struct Convolver {
    buffer: Option<Arc<ImpulseResponse>>,
    /// Normalize impulse energy so different rooms play at similar loudness
    normalize: bool,
    ir_left: Vec<f32>,
    ir_right: Vec<f32>,
    fft_state: Option<Box<FftState>>,
    /// Previous input frames for time-domain convolution (interleaved)
    history: Vec<f32>,
    scratch: Vec<f32>,
}

impl Default for Convolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Convolver {
    /// Create a convolver with no impulse attached
    pub fn new() -> Self {
        Self {
            buffer: None,
            normalize: true,
            ir_left: Vec::new(),
            ir_right: Vec::new(),
            fft_state: None,
            history: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Enable or disable energy normalization (applies on next `set_buffer`)
    pub fn set_normalize(&mut self, normalize: bool) {
        self.normalize = normalize;
    }

    /// Currently attached impulse
    pub fn buffer(&self) -> Option<&Arc<ImpulseResponse>> {
        self.buffer.as_ref()
    }

    /// Whether an impulse is attached
    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    /// Attach (or clear with `None`) the impulse response
    ///
    /// Re-attaching the same `Arc` is a no-op so rebuilds don't reset the
    /// reverb tail.
    pub fn set_buffer(&mut self, buffer: Option<Arc<ImpulseResponse>>) {
        let unchanged = match (&self.buffer, &buffer) {
            (Some(current), Some(new)) => Arc::ptr_eq(current, new),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        self.buffer = buffer;
        self.fft_state = None;
        self.history.clear();

        let Some(ir) = self.buffer.as_ref() else {
            self.ir_left.clear();
            self.ir_right.clear();
            return;
        };

        let (mut left, mut right) = ir.split_channels();
        if self.normalize {
            let energy = left
                .iter()
                .chain(right.iter())
                .map(|s| s * s)
                .sum::<f32>()
                / 2.0;
            if energy > 1e-12 {
                let scale = 1.0 / energy.sqrt();
                left.iter_mut().for_each(|s| *s *= scale);
                right.iter_mut().for_each(|s| *s *= scale);
            }
        }

        let frames = left.len();
        if frames > TIME_DOMAIN_THRESHOLD {
            self.fft_state = Some(Box::new(FftState::new(&left, &right)));
        } else {
            self.history = vec![0.0; (frames - 1) * 2];
        }
        self.ir_left = left;
        self.ir_right = right;
    }

    fn convolve_time_domain(&mut self, buffer: &mut [f32]) {
        let ir_frames = self.ir_left.len();
        let history_frames = ir_frames - 1;

        // history ++ input, so frame (i - j) is always addressable
        self.scratch.clear();
        self.scratch.extend_from_slice(&self.history);
        self.scratch.extend_from_slice(buffer);

        let frames = buffer.len() / 2;
        for i in 0..frames {
            let mut left = 0.0f32;
            let mut right = 0.0f32;
            for j in 0..ir_frames {
                let idx = (history_frames + i - j) * 2;
                left += self.scratch[idx] * self.ir_left[j];
                right += self.scratch[idx + 1] * self.ir_right[j];
            }
            buffer[i * 2] = left;
            buffer[i * 2 + 1] = right;
        }

        let total = self.scratch.len();
        self.history
            .copy_from_slice(&self.scratch[total - history_frames * 2..]);
    }
}

impl AudioEffect for Convolver {
    fn process(&mut self, buffer: &mut [f32], _sample_rate: u32) {
        if self.buffer.is_none() {
            buffer.fill(0.0);
            return;
        }
        if buffer.is_empty() {
            return;
        }

        if let Some(state) = self.fft_state.as_mut() {
            state.process(buffer);
        } else {
            self.convolve_time_domain(buffer);
        }
    }

    fn reset(&mut self) {
        self.history.fill(0.0);
        if let Some(state) = &mut self.fft_state {
            state.reset();
        }
    }

    fn name(&self) -> &str {
        "Convolver"
    }
}
