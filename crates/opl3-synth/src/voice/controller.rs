//! MIDI controller map.
//!
//! | CC | Meaning |
//! |----|---------|
//! | 7 | channel volume |
//! | 9 | channel type and algorithm |
//! | 10 | pan |
//! | 14-17 | velocity sensitivity, operators 0-3 |
//! | 18-21 | waveform, operators 0-3 |
//! | 22 / 27 | global tremolo / vibrato depth |
//! | 23-26 / 28-31 | tremolo / vibrato, operators 0-3 |
//! | 64 | sustain pedal |
//! | 75-78 | frequency multiplier, operators 0-3 |
//! | 79 | feedback |
//! | 80-83 | envelope scaling, operators 0-3 |
//! | 85, 102, 108, 114 | level, operators 0-3 |
//! | base+1 .. base+4 of the above | attack, decay, sustain level, release |
//! | base+5 | key-scale level |
//! | 120 / 121 / 123 | all sound off / reset controllers / all notes off |

use crate::allocator::channel::ChannelType;
use crate::chip::params::{OperatorField, Output};

/// Level controller of each operator; its envelope controllers follow it
const OPERATOR_BASES: [u8; 4] = [85, 102, 108, 114];

/// Envelope fields in controller order after the level controller
const ENVELOPE_FIELDS: [OperatorField; 4] = [
    OperatorField::AttackRate,
    OperatorField::DecayRate,
    OperatorField::SustainLevel,
    OperatorField::ReleaseRate,
];

/// A decoded controller change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerChange {
    Volume(u8),
    Topology {
        channel_type: ChannelType,
        algorithm: u8,
    },
    Output(Output),
    VelocitySensitivity {
        operator: usize,
        value: u8,
    },
    Level {
        operator: usize,
        value: u8,
    },
    /// Field written straight to every voice's operator
    Operator {
        operator: usize,
        field: OperatorField,
        value: u8,
    },
    Tremolo {
        operator: usize,
        enable: bool,
    },
    Vibrato {
        operator: usize,
        enable: bool,
    },
    TremoloDepth(bool),
    VibratoDepth(bool),
    Feedback(u8),
    Sustain(bool),
    AllSoundOff,
    ResetControllers,
    AllNotesOff,
}

impl ControllerChange {
    /// Decode controller `controller` set to `value` (both 0-127)
    ///
    /// # Returns
    ///
    /// None for controllers without a mapping
    pub fn decode(controller: u8, value: u8) -> Option<Self> {
        let value = value & 0x7F;
        let change = match controller {
            7 => ControllerChange::Volume(value >> 1),
            9 => topology(value),
            10 => ControllerChange::Output(pan(value)),
            14..=17 => ControllerChange::VelocitySensitivity {
                operator: (controller - 14) as usize,
                value: value >> 1,
            },
            18..=21 => ControllerChange::Operator {
                operator: (controller - 18) as usize,
                field: OperatorField::Waveform,
                value: value >> 4,
            },
            22 => ControllerChange::TremoloDepth(value > 63),
            23..=26 => ControllerChange::Tremolo {
                operator: (controller - 23) as usize,
                enable: value >> 6 != 0,
            },
            27 => ControllerChange::VibratoDepth(value > 63),
            28..=31 => ControllerChange::Vibrato {
                operator: (controller - 28) as usize,
                enable: value >> 6 != 0,
            },
            64 => ControllerChange::Sustain(value > 63),
            75..=78 => ControllerChange::Operator {
                operator: (controller - 75) as usize,
                field: OperatorField::Multiplier,
                value: value >> 3,
            },
            79 => ControllerChange::Feedback(value >> 4),
            80..=83 => ControllerChange::Operator {
                operator: (controller - 80) as usize,
                field: OperatorField::EnvelopeScaling,
                value: value >> 6,
            },
            120 => ControllerChange::AllSoundOff,
            121 => ControllerChange::ResetControllers,
            123 => ControllerChange::AllNotesOff,
            _ => return operator_controller(controller, value),
        };
        Some(change)
    }
}

/// Level, envelope and key-scale controllers of the four operators
fn operator_controller(controller: u8, value: u8) -> Option<ControllerChange> {
    let (operator, base) = OPERATOR_BASES
        .iter()
        .enumerate()
        .rev()
        .find(|(_, base)| controller >= **base)?;
    match controller - base {
        0 => Some(ControllerChange::Level {
            operator,
            value: value >> 1,
        }),
        offset @ 1..=4 => Some(ControllerChange::Operator {
            operator,
            field: ENVELOPE_FIELDS[(offset - 1) as usize],
            value: 15 - (value >> 3),
        }),
        5 => Some(ControllerChange::Operator {
            operator,
            field: OperatorField::KeyScaleLevel,
            value: value >> 5,
        }),
        _ => None,
    }
}

/// CC 9 bands: 12 values per 2-op/4-op algorithm, then the five drums
fn topology(value: u8) -> ControllerChange {
    let (channel_type, algorithm) = match value {
        0..=23 => (ChannelType::TwoOp, value / 12),
        24..=71 => (ChannelType::FourOp, (value - 24) / 12),
        72..=82 => (ChannelType::Kick, 0),
        83..=93 => (ChannelType::Snare, 0),
        94..=104 => (ChannelType::TomTom, 0),
        105..=115 => (ChannelType::Cymbal, 0),
        _ => (ChannelType::HiHat, 0),
    };
    ControllerChange::Topology {
        channel_type,
        algorithm,
    }
}

/// Low values pan left: `Output::Left` is register 0xC0 bit 4, right is bit 5
fn pan(value: u8) -> Output {
    if value < 43 {
        Output::Left
    } else if value > 85 {
        Output::Right
    } else {
        Output::Stereo
    }
}
