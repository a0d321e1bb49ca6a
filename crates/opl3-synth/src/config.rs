//! Voice manager configuration.

use crate::chip::register::DEFAULT_IO_BASE;

/// Largest number of MIDI channels a manager can serve
pub const MAX_MIDI_CHANNELS: u8 = 16;

/// Settings for a [`crate::NoteVoiceManager`]
///
/// With the `serde` feature this deserializes from any serde format;
/// missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct SynthConfig {
    /// Address of the primary index latch
    pub io_base_address: u16,
    /// Number of MIDI channels with their own patch (1-16)
    pub midi_channels: u8,
    /// Length of one LFO start delay step in milliseconds
    pub lfo_delay_unit_ms: u16,
    /// LFO start delay given to every patch, in steps
    pub default_lfo_start_delay: u8,
    /// Deep vibrato (14 cents) instead of 7 cents
    pub vibrato_depth: bool,
    /// Deep tremolo (4.8 dB) instead of 1 dB
    pub tremolo_depth: bool,
    /// Enable rhythm mode at init
    pub percussion: bool,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            io_base_address: DEFAULT_IO_BASE,
            midi_channels: MAX_MIDI_CHANNELS,
            lfo_delay_unit_ms: 150,
            default_lfo_start_delay: 5,
            vibrato_depth: true,
            tremolo_depth: false,
            percussion: false,
        }
    }
}

impl SynthConfig {
    /// Number of patches to keep, clamped to 1-16
    pub fn midi_channel_count(&self) -> usize {
        self.midi_channels.clamp(1, MAX_MIDI_CHANNELS) as usize
    }
}
