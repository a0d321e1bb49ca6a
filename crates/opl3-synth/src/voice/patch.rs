//! Per-MIDI-channel instrument settings.

use crate::allocator::channel::ChannelType;
use crate::chip::params::{OperatorField, Output};

/// Operator template applied to every voice a channel plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct OperatorPatch {
    /// Output level before velocity and volume scaling (0-63)
    pub level: u8,
    pub attack_rate: u8,
    pub decay_rate: u8,
    pub sustain_level: u8,
    pub release_rate: u8,
    pub key_scale_level: u8,
    pub waveform: u8,
    pub multiplier: u8,
    /// Requested tremolo, switched on once the LFO delay has passed
    pub tremolo: bool,
    /// Requested vibrato, switched on once the LFO delay has passed
    pub vibrato: bool,
    pub envelope_scaling: bool,
    /// How much of `level` velocity controls (0 none, 63 all of it)
    pub velocity_sensitivity: u8,
}

impl Default for OperatorPatch {
    fn default() -> Self {
        Self {
            level: 48,
            attack_rate: 11,
            decay_rate: 1,
            sustain_level: 5,
            release_rate: 7,
            key_scale_level: 0,
            waveform: 0,
            multiplier: 0,
            tremolo: false,
            vibrato: false,
            envelope_scaling: false,
            velocity_sensitivity: 32,
        }
    }
}

impl OperatorPatch {
    /// Value of a register field as the patch stores it
    ///
    /// Tremolo and vibrato are reported off: voices start without them.
    pub fn field(&self, field: OperatorField) -> u8 {
        match field {
            OperatorField::Tremolo | OperatorField::Vibrato => 0,
            OperatorField::Sustain => 1,
            OperatorField::EnvelopeScaling => u8::from(self.envelope_scaling),
            OperatorField::Multiplier => self.multiplier,
            OperatorField::KeyScaleLevel => self.key_scale_level,
            OperatorField::Attenuation => 63 - self.level.min(63),
            OperatorField::AttackRate => self.attack_rate,
            OperatorField::DecayRate => self.decay_rate,
            OperatorField::SustainLevel => self.sustain_level,
            OperatorField::ReleaseRate => self.release_rate,
            OperatorField::Waveform => self.waveform,
        }
    }

    /// Whether the patch asks for tremolo or vibrato
    pub fn field_requested(&self, field: OperatorField) -> bool {
        match field {
            OperatorField::Tremolo => self.tremolo,
            OperatorField::Vibrato => self.vibrato,
            _ => false,
        }
    }

    /// Store a register field value
    ///
    /// Attenuation and sustain are computed per voice and are not stored.
    pub fn set_field(&mut self, field: OperatorField, value: u8) {
        match field {
            OperatorField::Tremolo => self.tremolo = value != 0,
            OperatorField::Vibrato => self.vibrato = value != 0,
            OperatorField::EnvelopeScaling => self.envelope_scaling = value != 0,
            OperatorField::Multiplier => self.multiplier = value,
            OperatorField::KeyScaleLevel => self.key_scale_level = value,
            OperatorField::AttackRate => self.attack_rate = value,
            OperatorField::DecayRate => self.decay_rate = value,
            OperatorField::SustainLevel => self.sustain_level = value,
            OperatorField::ReleaseRate => self.release_rate = value,
            OperatorField::Waveform => self.waveform = value,
            OperatorField::Attenuation | OperatorField::Sustain => {}
        }
    }

    /// Attenuation for a note of `velocity` (0-127)
    ///
    /// `range = level * sensitivity / 63` of the level follows velocity,
    /// the rest is fixed. Carriers are further scaled by channel volume.
    pub fn attenuation(&self, velocity: u8, volume: Option<u8>) -> u8 {
        let level = self.level.min(63) as u16;
        let range = level * self.velocity_sensitivity.min(63) as u16 / 63;
        let base = level - range;
        let mut out = base + (velocity.min(127) as u16 >> 1) * range / 63;
        if let Some(volume) = volume {
            out = out * volume.min(63) as u16 / 63;
        }
        63 - out as u8
    }
}

/// Everything a MIDI channel remembers between notes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct MidiChannelPatch {
    pub operators: [OperatorPatch; 4],
    pub output: Output,
    pub channel_type: ChannelType,
    /// Synthesis algorithm: 0-1 for 2-op, 0-3 for 4-op
    pub algorithm: u8,
    pub feedback: u8,
    /// Channel volume (0-63)
    pub volume: u8,
    /// Current pitch bend in cents (-200 to 200)
    pub pitch_bend: i16,
    /// Sustain pedal held
    pub sustain: bool,
    /// Delay before requested tremolo/vibrato start, in steps
    pub lfo_start_delay: u8,
}

impl Default for MidiChannelPatch {
    fn default() -> Self {
        Self {
            operators: [OperatorPatch::default(); 4],
            output: Output::Stereo,
            channel_type: ChannelType::TwoOp,
            algorithm: 0,
            feedback: 0,
            volume: 63,
            pitch_bend: 0,
            sustain: false,
            lfo_start_delay: 5,
        }
    }
}

impl MidiChannelPatch {
    /// Default patch with a different LFO start delay
    pub fn with_lfo_start_delay(lfo_start_delay: u8) -> Self {
        Self {
            lfo_start_delay,
            ..Self::default()
        }
    }
}
