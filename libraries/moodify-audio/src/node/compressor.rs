/// Loudness-normalization compressor
///
/// Stereo-linked downward compressor with a soft knee. The graph programs
/// it from a [`NormalizationMode`](crate::NormalizationMode) curve and
/// bypasses it entirely when normalization is off.
use super::AudioEffect;

/// Level the envelope falls back to in silence
const SILENCE_DB: f32 = -120.0;

/// How long the envelope holds a peak before falling back (seconds)
const ENVELOPE_DECAY_SECS: f32 = 0.05;

/// Compressor curve
///
/// Times are in seconds. Out-of-range values are clamped by
/// [`CompressorSettings::clamped`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorSettings {
    /// Level where compression starts, -100 to 0 dB
    pub threshold_db: f32,
    /// Width of the soft knee around the threshold, 0 to 40 dB
    pub knee_db: f32,
    /// Input dB above threshold per output dB, 1 to 20
    pub ratio: f32,
    /// Time to reach about 63% of a gain decrease, 0 to 1 s
    pub attack: f32,
    /// Time to recover about 63% of a gain increase, 0 to 1 s
    pub release: f32,
}

impl Default for CompressorSettings {
    /// -24 dB, 12:1, 6 dB knee, 3 ms attack, 250 ms release
    fn default() -> Self {
        Self {
            threshold_db: -24.0,
            knee_db: 6.0,
            ratio: 12.0,
            attack: 0.003,
            release: 0.25,
        }
    }
}

impl CompressorSettings {
    /// Curve with the default 6 dB knee
    pub fn from_curve(threshold_db: f32, ratio: f32, attack: f32, release: f32) -> Self {
        Self {
            threshold_db,
            ratio,
            attack,
            release,
            ..Self::default()
        }
        .clamped()
    }

    pub fn attack_secs(&self) -> f32 {
        self.attack
    }

    pub fn release_secs(&self) -> f32 {
        self.release
    }

    /// Same curve with every field pulled into range
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            threshold_db: self.threshold_db.clamp(-100.0, 0.0),
            knee_db: self.knee_db.clamp(0.0, 40.0),
            ratio: self.ratio.clamp(1.0, 20.0),
            attack: self.attack.clamp(0.0, 1.0),
            release: self.release.clamp(0.0, 1.0),
        }
    }

    /// Gain change in dB (0 or negative) the static curve applies at `level_db`
    pub fn reduction_at(&self, level_db: f32) -> f32 {
        let over = level_db - self.threshold_db;
        let half_knee = self.knee_db / 2.0;
        let slope = 1.0 - 1.0 / self.ratio;

        if over <= -half_knee {
            0.0
        } else if over >= half_knee {
            -over * slope
        } else {
            // Quadratic blend across the knee
            let into_knee = over + half_knee;
            -slope * into_knee * into_knee / (2.0 * self.knee_db)
        }
    }
}

/// One-pole smoothing coefficient for a time constant
fn time_coefficient(secs: f32, sample_rate: u32) -> f32 {
    let samples = secs * sample_rate as f32;
    if samples <= 0.0 {
        0.0
    } else {
        (-1.0 / samples).exp()
    }
}

/// Peak envelope in dB: jumps up instantly, falls back toward silence
#[derive(Debug, Clone, Copy)]
struct Envelope {
    level_db: f32,
    decay: f32,
}

impl Envelope {
    fn new() -> Self {
        Self {
            level_db: SILENCE_DB,
            decay: 0.0,
        }
    }

    fn follow(&mut self, input_db: f32) -> f32 {
        if input_db > self.level_db {
            self.level_db = input_db;
        } else {
            // Falls toward the floor rather than the input, which is -inf at zero crossings
            self.level_db = SILENCE_DB + self.decay * (self.level_db - SILENCE_DB);
        }
        self.level_db
    }
}

/// Stereo-linked soft-knee compressor
#[derive(Debug)]
pub struct Compressor {
    settings: CompressorSettings,
    envelope: Envelope,
    reduction_db: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Rate the coefficients were computed for; `None` forces a recompute
    prepared_for: Option<u32>,
}

impl Compressor {
    /// Compressor with the default curve
    pub fn new() -> Self {
        Self::with_settings(CompressorSettings::default())
    }

    pub fn with_settings(settings: CompressorSettings) -> Self {
        Self {
            settings: settings.clamped(),
            envelope: Envelope::new(),
            reduction_db: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            prepared_for: None,
        }
    }

    /// Replace the curve; the running envelope is kept
    pub fn set_settings(&mut self, settings: CompressorSettings) {
        let settings = settings.clamped();
        if settings != self.settings {
            self.settings = settings;
            self.prepared_for = None;
        }
    }

    pub fn settings(&self) -> CompressorSettings {
        self.settings
    }

    /// Gain reduction currently applied, in dB (0 or negative)
    pub fn reduction_db(&self) -> f32 {
        self.reduction_db
    }

    fn prepare(&mut self, sample_rate: u32) {
        if self.prepared_for == Some(sample_rate) {
            return;
        }
        self.attack_coeff = time_coefficient(self.settings.attack, sample_rate);
        self.release_coeff = time_coefficient(self.settings.release, sample_rate);
        self.envelope.decay = time_coefficient(ENVELOPE_DECAY_SECS, sample_rate);
        self.prepared_for = Some(sample_rate);
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEffect for Compressor {
    fn process(&mut self, buffer: &mut [f32], sample_rate: u32) {
        self.prepare(sample_rate);

        for frame in buffer.chunks_exact_mut(2) {
            let peak = frame[0].abs().max(frame[1].abs());
            let input_db = if peak > 1e-10 {
                20.0 * peak.log10()
            } else {
                SILENCE_DB
            };

            let level_db = self.envelope.follow(input_db);
            let target = self.settings.reduction_at(level_db);
            let coeff = if target < self.reduction_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.reduction_db = target + coeff * (self.reduction_db - target);

            let gain = 10.0_f32.powf(self.reduction_db / 20.0);
            frame[0] *= gain;
            frame[1] *= gain;
        }
    }

    fn reset(&mut self) {
        self.envelope.level_db = SILENCE_DB;
        self.reduction_db = 0.0;
    }

    fn name(&self) -> &str {
        "Compressor"
    }
}
