//! Equalizer preset catalog

use super::FrequencyBand;

/// Name recorded once any band is edited by hand
pub const CUSTOM_PRESET_NAME: &str = "Custom";

/// Name of the default preset
pub const FLAT_PRESET_NAME: &str = "Flat";

/// Named set of band gains, ordered like [`FrequencyBand::ALL`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preset {
    /// Display name
    pub name: &'static str,
    /// Gain in dB for 60, 310, 1000, 3000, 6000 and 12000 Hz
    pub gains: [f32; 6],
}

/// Every built-in preset, "Flat" first
pub const PRESETS: &[Preset] = &[
    Preset {
        name: FLAT_PRESET_NAME,
        gains: [0.0; 6],
    },
    Preset {
        name: "Bass Boost",
        gains: [6.0, 4.0, 0.0, 0.0, 0.0, 0.0],
    },
    Preset {
        name: "Treble Boost",
        gains: [0.0, 0.0, 0.0, 2.0, 4.0, 6.0],
    },
    Preset {
        name: "Vocal Boost",
        gains: [-2.0, -1.0, 3.0, 4.0, 2.0, 0.0],
    },
    Preset {
        name: "Rock",
        gains: [4.0, 2.0, -1.0, 1.0, 3.0, 4.0],
    },
    Preset {
        name: "Pop",
        gains: [-1.0, 2.0, 4.0, 3.0, 1.0, -1.0],
    },
    Preset {
        name: "Jazz",
        gains: [3.0, 1.0, -1.0, 1.0, 2.0, 3.0],
    },
    Preset {
        name: "Classical",
        gains: [4.0, 2.0, 0.0, 0.0, 2.0, 4.0],
    },
    Preset {
        name: "Electronic",
        gains: [5.0, 3.0, 0.0, 1.0, 3.0, 5.0],
    },
    Preset {
        name: "Acoustic",
        gains: [2.0, 1.0, 1.0, 2.0, 2.0, 1.0],
    },
];

impl Preset {
    /// The default all-zero preset
    pub fn flat() -> &'static Preset {
        &PRESETS[0]
    }

    /// Look a preset up by name (case-insensitive)
    pub fn find(name: &str) -> Option<&'static Preset> {
        PRESETS
            .iter()
            .find(|preset| preset.name.eq_ignore_ascii_case(name))
    }

    /// Gain for one band
    pub fn gain(&self, band: FrequencyBand) -> f32 {
        self.gains[band.index()]
    }
}
