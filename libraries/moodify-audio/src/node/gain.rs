/// Linear gain stage
///
/// Used for the dry/wet pair and the junction node. A gain of 0.0 silences
/// the branch without disconnecting it.
use super::AudioEffect;

/// Gain node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gain {
    gain: f32,
}

impl Gain {
    /// Create a gain node with a linear factor
    pub fn new(gain: f32) -> Self {
        Self {
            gain: sanitize(gain),
        }
    }

    /// Current linear gain
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Set linear gain (negative and non-finite values become 0)
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = sanitize(gain);
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new(1.0)
    }
}

fn sanitize(gain: f32) -> f32 {
    if gain.is_finite() {
        gain.max(0.0)
    } else {
        0.0
    }
}

impl AudioEffect for Gain {
    fn process(&mut self, buffer: &mut [f32], _sample_rate: u32) {
        if (self.gain - 1.0).abs() < f32::EPSILON {
            return;
        }
        for sample in buffer.iter_mut() {
            *sample *= self.gain;
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "Gain"
    }
}
