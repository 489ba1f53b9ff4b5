/// Peaking equalizer band
///
/// One RBJ peaking biquad per frequency band. Boosts or cuts a bell-shaped
/// region around the center frequency without touching the rest of the
/// spectrum. Gain changes are smoothed per sample to avoid zipper noise
/// while a slider is being dragged.
use super::AudioEffect;

/// Fixed Q used for every equalizer band
pub const PEAKING_Q: f32 = 1.0;

/// Gain range accepted by the filter (dB)
const MAX_GAIN_DB: f32 = 24.0;

/// Per-sample exponential smoothing factor for coefficient changes
/// (~500 samples time constant, ~11ms at 44.1kHz)
const SMOOTH_COEFF: f32 = 0.002;

/// Normalized biquad coefficients (a0 == 1)
#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Coefficients {
    const NEUTRAL: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    fn peaking(sample_rate: f32, frequency: f32, q: f32, gain_db: f32) -> Self {
        if sample_rate < 1.0 {
            return Self::NEUTRAL;
        }

        let a = 10.0_f32.powf(gain_db / 40.0);
        // Keep well clear of Nyquist to stay stable
        let clamped_freq = frequency.min(sample_rate * 0.45);
        let omega = 2.0 * std::f32::consts::PI * clamped_freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_omega) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_omega) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }

    #[inline]
    fn approach(&mut self, target: &Self) {
        self.b0 += SMOOTH_COEFF * (target.b0 - self.b0);
        self.b1 += SMOOTH_COEFF * (target.b1 - self.b1);
        self.b2 += SMOOTH_COEFF * (target.b2 - self.b2);
        self.a1 += SMOOTH_COEFF * (target.a1 - self.a1);
        self.a2 += SMOOTH_COEFF * (target.a2 - self.a2);
    }
}

/// Direct form I state for one channel
#[derive(Debug, Clone, Copy, Default)]
struct ChannelState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl ChannelState {
    #[inline]
    fn tick(&mut self, c: &Coefficients, input: f32) -> f32 {
        let mut out = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        // Flush denormals
        if out.abs() < 1e-15 {
            out = 0.0;
        }

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = out;
        out
    }
}

/// Peaking filter node
#[derive(Debug, Clone)]
pub struct PeakingFilter {
    frequency: f32,
    gain_db: f32,
    q: f32,
    sample_rate: u32,
    target: Coefficients,
    active: Coefficients,
    left: ChannelState,
    right: ChannelState,
    needs_update: bool,
    /// Snap straight to the target on first use instead of smoothing
    primed: bool,
}

impl PeakingFilter {
    /// Create a band at `frequency` Hz with 0 dB gain and the fixed Q
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency,
            gain_db: 0.0,
            q: PEAKING_Q,
            sample_rate: 44100,
            target: Coefficients::NEUTRAL,
            active: Coefficients::NEUTRAL,
            left: ChannelState::default(),
            right: ChannelState::default(),
            needs_update: true,
            primed: false,
        }
    }

    /// Center frequency in Hz
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Current gain in dB
    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    /// Q factor
    pub fn q(&self) -> f32 {
        self.q
    }

    /// Set the band gain (clamped to ±24 dB)
    pub fn set_gain_db(&mut self, gain_db: f32) {
        let gain_db = gain_db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB);
        if (gain_db - self.gain_db).abs() > f32::EPSILON {
            self.gain_db = gain_db;
            self.needs_update = true;
        }
    }

    fn update_coefficients(&mut self) {
        if !self.needs_update {
            return;
        }
        self.target =
            Coefficients::peaking(self.sample_rate as f32, self.frequency, self.q, self.gain_db);
        if !self.primed {
            self.active = self.target;
            self.primed = true;
        }
        self.needs_update = false;
    }
}

impl AudioEffect for PeakingFilter {
    fn process(&mut self, buffer: &mut [f32], sample_rate: u32) {
        if self.sample_rate != sample_rate {
            self.sample_rate = sample_rate;
            self.needs_update = true;
        }
        self.update_coefficients();

        for frame in buffer.chunks_exact_mut(2) {
            self.active.approach(&self.target);
            frame[0] = self.left.tick(&self.active, frame[0]);
            frame[1] = self.right.tick(&self.active, frame[1]);
        }
    }

    fn reset(&mut self) {
        self.left = ChannelState::default();
        self.right = ChannelState::default();
        self.active = self.target;
    }

    fn name(&self) -> &str {
        "Peaking Filter"
    }
}
