//! Typed channel and operator parameters and their register packing.
//!
//! The chip's registers are write-only, so the allocator keeps these typed
//! mirrors and rebuilds each register byte from them whenever one field
//! changes.

use crate::chip::register::{ChannelRegister, OperatorRegister};
use crate::error::{Result, SynthError};

/// Stereo output routing of a channel (register 0xC0 bits 5-4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Output {
    /// Channel is muted
    None = 0,
    /// Left speaker only
    Left = 1,
    /// Right speaker only
    Right = 2,
    /// Both speakers
    #[default]
    Stereo = 3,
}

impl Output {
    /// Output routing from the two-bit register value
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Output::None,
            1 => Output::Left,
            2 => Output::Right,
            _ => Output::Stereo,
        }
    }
}

/// Cached state of the three per-channel registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelParams {
    /// 10-bit frequency number
    pub f_num: u16,
    /// Block (octave), 0-7
    pub block: u8,
    /// Key-on bit
    pub key_on: bool,
    /// Output routing
    pub output: Output,
    /// Feedback modulation factor, 0-7
    pub feedback: u8,
    /// Connection bit (0 = FM, 1 = additive)
    pub connection: bool,
}

impl ChannelParams {
    /// Rebuild the byte for one of the channel registers
    pub fn pack(&self, register: ChannelRegister) -> u8 {
        match register {
            ChannelRegister::FnumLow => (self.f_num & 0xFF) as u8,
            ChannelRegister::KeyBlockFnum => {
                (u8::from(self.key_on) << 5)
                    | ((self.block & 0x07) << 2)
                    | ((self.f_num >> 8) & 0x03) as u8
            }
            ChannelRegister::OutputFeedback => {
                ((self.output as u8) << 4)
                    | ((self.feedback & 0x07) << 1)
                    | u8::from(self.connection)
            }
        }
    }
}

/// One independently settable operator field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorField {
    Tremolo,
    Vibrato,
    Sustain,
    EnvelopeScaling,
    Multiplier,
    KeyScaleLevel,
    Attenuation,
    AttackRate,
    DecayRate,
    SustainLevel,
    ReleaseRate,
    Waveform,
}

impl OperatorField {
    /// Largest value the field accepts
    pub fn max(self) -> u8 {
        match self {
            OperatorField::Tremolo
            | OperatorField::Vibrato
            | OperatorField::Sustain
            | OperatorField::EnvelopeScaling => 1,
            OperatorField::KeyScaleLevel => 3,
            OperatorField::Waveform => 7,
            OperatorField::Attenuation => 63,
            OperatorField::Multiplier
            | OperatorField::AttackRate
            | OperatorField::DecayRate
            | OperatorField::SustainLevel
            | OperatorField::ReleaseRate => 15,
        }
    }

    /// Register the field is packed into
    pub fn register(self) -> OperatorRegister {
        match self {
            OperatorField::Tremolo
            | OperatorField::Vibrato
            | OperatorField::Sustain
            | OperatorField::EnvelopeScaling
            | OperatorField::Multiplier => OperatorRegister::Characteristics,
            OperatorField::KeyScaleLevel | OperatorField::Attenuation => OperatorRegister::Levels,
            OperatorField::AttackRate | OperatorField::DecayRate => OperatorRegister::AttackDecay,
            OperatorField::SustainLevel | OperatorField::ReleaseRate => {
                OperatorRegister::SustainRelease
            }
            OperatorField::Waveform => OperatorRegister::Waveform,
        }
    }

    /// Field name used in errors and logs
    pub fn name(self) -> &'static str {
        match self {
            OperatorField::Tremolo => "tremolo",
            OperatorField::Vibrato => "vibrato",
            OperatorField::Sustain => "sustain",
            OperatorField::EnvelopeScaling => "envelope_scaling",
            OperatorField::Multiplier => "multiplier",
            OperatorField::KeyScaleLevel => "key_scale_level",
            OperatorField::Attenuation => "attenuation",
            OperatorField::AttackRate => "attack_rate",
            OperatorField::DecayRate => "decay_rate",
            OperatorField::SustainLevel => "sustain_level",
            OperatorField::ReleaseRate => "release_rate",
            OperatorField::Waveform => "waveform",
        }
    }

    /// Check a value against the field width
    pub fn validate(self, value: u8) -> Result<u8> {
        if value > self.max() {
            return Err(SynthError::OutOfRange {
                field: self.name(),
                value: value as u32,
                max: self.max() as u32,
            });
        }
        Ok(value)
    }
}

/// Hardware order of the key-scale level bits, indexed by the monotonic
/// value (0 none, 1 = 1.5 dB/oct, 2 = 3 dB/oct, 3 = 6 dB/oct).
const KSL_HARDWARE_ORDER: [u8; 4] = [0, 2, 1, 3];

/// Cached state of one physical operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperatorParams {
    pub tremolo: bool,
    pub vibrato: bool,
    pub sustain: bool,
    pub envelope_scaling: bool,
    pub multiplier: u8,
    /// Monotonic key-scale level, swapped into hardware order on packing
    pub key_scale_level: u8,
    pub attenuation: u8,
    pub attack_rate: u8,
    pub decay_rate: u8,
    pub sustain_level: u8,
    pub release_rate: u8,
    pub waveform: u8,
}

impl OperatorParams {
    /// Current value of a field
    pub fn get(&self, field: OperatorField) -> u8 {
        match field {
            OperatorField::Tremolo => u8::from(self.tremolo),
            OperatorField::Vibrato => u8::from(self.vibrato),
            OperatorField::Sustain => u8::from(self.sustain),
            OperatorField::EnvelopeScaling => u8::from(self.envelope_scaling),
            OperatorField::Multiplier => self.multiplier,
            OperatorField::KeyScaleLevel => self.key_scale_level,
            OperatorField::Attenuation => self.attenuation,
            OperatorField::AttackRate => self.attack_rate,
            OperatorField::DecayRate => self.decay_rate,
            OperatorField::SustainLevel => self.sustain_level,
            OperatorField::ReleaseRate => self.release_rate,
            OperatorField::Waveform => self.waveform,
        }
    }

    /// Validate and store a field value
    ///
    /// # Returns
    ///
    /// `OutOfRange` without touching the cached value if `value` is too wide
    pub fn set(&mut self, field: OperatorField, value: u8) -> Result<()> {
        let value = field.validate(value)?;
        match field {
            OperatorField::Tremolo => self.tremolo = value != 0,
            OperatorField::Vibrato => self.vibrato = value != 0,
            OperatorField::Sustain => self.sustain = value != 0,
            OperatorField::EnvelopeScaling => self.envelope_scaling = value != 0,
            OperatorField::Multiplier => self.multiplier = value,
            OperatorField::KeyScaleLevel => self.key_scale_level = value,
            OperatorField::Attenuation => self.attenuation = value,
            OperatorField::AttackRate => self.attack_rate = value,
            OperatorField::DecayRate => self.decay_rate = value,
            OperatorField::SustainLevel => self.sustain_level = value,
            OperatorField::ReleaseRate => self.release_rate = value,
            OperatorField::Waveform => self.waveform = value,
        }
        Ok(())
    }

    /// Rebuild the byte for one of the operator registers
    pub fn pack(&self, register: OperatorRegister) -> u8 {
        match register {
            OperatorRegister::Characteristics => {
                (u8::from(self.tremolo) << 7)
                    | (u8::from(self.vibrato) << 6)
                    | (u8::from(self.sustain) << 5)
                    | (u8::from(self.envelope_scaling) << 4)
                    | (self.multiplier & 0x0F)
            }
            OperatorRegister::Levels => {
                (KSL_HARDWARE_ORDER[(self.key_scale_level & 0x03) as usize] << 6)
                    | (self.attenuation & 0x3F)
            }
            OperatorRegister::AttackDecay => (self.attack_rate << 4) | (self.decay_rate & 0x0F),
            OperatorRegister::SustainRelease => {
                (self.sustain_level << 4) | (self.release_rate & 0x0F)
            }
            OperatorRegister::Waveform => self.waveform & 0x07,
        }
    }
}
