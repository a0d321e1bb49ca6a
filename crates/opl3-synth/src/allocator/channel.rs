//! Logical channel handles and channel topology.
//!
//! A [`LogicalChannel`] is what the allocator hands out: either one of the
//! 18 physical channels (2-op, or the primary half of a 4-op pair) or one of
//! the five rhythm-mode percussion roles.

use std::fmt;

use crate::chip::register::PHYSICAL_CHANNELS;

/// Number of logical channels (18 physical + 5 percussion roles)
pub const LOGICAL_CHANNELS: usize = PHYSICAL_CHANNELS + PercussionRole::ALL.len();

/// Channels that can be joined into 4-op pairs, `(primary, secondary)`.
///
/// The position in this table is the bit of the pair in register 0x104.
pub const FOUR_OP_PAIRS: [(u8, u8); 6] = [(0, 3), (1, 4), (2, 5), (9, 12), (10, 13), (11, 14)];

/// Physical channels whose operators are reused by percussion mode
pub const PERCUSSION_CHANNELS: [u8; 3] = [6, 7, 8];

/// Rhythm-mode percussion roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PercussionRole {
    Kick,
    Snare,
    TomTom,
    Cymbal,
    HiHat,
}

impl PercussionRole {
    pub const ALL: [PercussionRole; 5] = [
        PercussionRole::Kick,
        PercussionRole::Snare,
        PercussionRole::TomTom,
        PercussionRole::Cymbal,
        PercussionRole::HiHat,
    ];

    /// Position of the role in [`PercussionRole::ALL`]
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Key-on bit of the role in register 0xBD
    pub fn key_bit(self) -> u8 {
        match self {
            PercussionRole::Kick => 0x10,
            PercussionRole::Snare => 0x08,
            PercussionRole::TomTom => 0x04,
            PercussionRole::Cymbal => 0x02,
            PercussionRole::HiHat => 0x01,
        }
    }

    /// Physical operators the role plays through
    pub fn operators(self) -> &'static [u8] {
        match self {
            PercussionRole::Kick => &[12, 15],
            PercussionRole::Snare => &[16],
            PercussionRole::TomTom => &[14],
            PercussionRole::Cymbal => &[17],
            PercussionRole::HiHat => &[13],
        }
    }

    /// Physical channel whose frequency registers drive the role
    ///
    /// Cymbal and hi-hat have no frequency control of their own.
    pub fn frequency_channel(self) -> Option<u8> {
        match self {
            PercussionRole::Kick => Some(6),
            PercussionRole::Snare => Some(7),
            PercussionRole::TomTom => Some(8),
            PercussionRole::Cymbal | PercussionRole::HiHat => None,
        }
    }

    pub fn channel_type(self) -> ChannelType {
        match self {
            PercussionRole::Kick => ChannelType::Kick,
            PercussionRole::Snare => ChannelType::Snare,
            PercussionRole::TomTom => ChannelType::TomTom,
            PercussionRole::Cymbal => ChannelType::Cymbal,
            PercussionRole::HiHat => ChannelType::HiHat,
        }
    }
}

/// Handle to an allocatable channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicalChannel {
    /// Physical melody channel 0-17
    Physical(u8),
    /// Percussion role (rhythm mode only)
    Percussion(PercussionRole),
}

impl LogicalChannel {
    /// Flat index: 0-17 for physical channels, 18-22 for percussion roles
    pub fn index(self) -> usize {
        match self {
            LogicalChannel::Physical(n) => n as usize,
            LogicalChannel::Percussion(role) => PHYSICAL_CHANNELS + role.ordinal(),
        }
    }

    /// Handle from its flat index
    ///
    /// # Returns
    ///
    /// None if `index` is 23 or above
    pub fn from_index(index: usize) -> Option<Self> {
        if index < PHYSICAL_CHANNELS {
            Some(LogicalChannel::Physical(index as u8))
        } else {
            PercussionRole::ALL
                .get(index - PHYSICAL_CHANNELS)
                .map(|role| LogicalChannel::Percussion(*role))
        }
    }

    /// Physical channel index, if the handle names one that exists
    pub fn physical(self) -> Option<u8> {
        match self {
            LogicalChannel::Physical(n) if (n as usize) < PHYSICAL_CHANNELS => Some(n),
            _ => None,
        }
    }

    /// Check that the handle names an existing channel
    pub fn is_valid(self) -> bool {
        match self {
            LogicalChannel::Physical(n) => (n as usize) < PHYSICAL_CHANNELS,
            LogicalChannel::Percussion(_) => true,
        }
    }
}

impl fmt::Display for LogicalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalChannel::Physical(n) => write!(f, "ch{}", n),
            LogicalChannel::Percussion(role) => write!(f, "{:?}", role),
        }
    }
}

/// Topology of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChannelType {
    /// Not usable (secondary half of a 4-op pair, or reserved by percussion)
    Null,
    /// Two-operator melody channel
    #[default]
    TwoOp,
    /// Four-operator melody channel (primary half of a pair)
    FourOp,
    Kick,
    Snare,
    TomTom,
    Cymbal,
    HiHat,
}

impl ChannelType {
    /// Percussion role of the type, if it is one
    pub fn percussion_role(self) -> Option<PercussionRole> {
        match self {
            ChannelType::Kick => Some(PercussionRole::Kick),
            ChannelType::Snare => Some(PercussionRole::Snare),
            ChannelType::TomTom => Some(PercussionRole::TomTom),
            ChannelType::Cymbal => Some(PercussionRole::Cymbal),
            ChannelType::HiHat => Some(PercussionRole::HiHat),
            ChannelType::Null | ChannelType::TwoOp | ChannelType::FourOp => None,
        }
    }

    /// Number of operators a channel of this type plays through
    pub fn operator_count(self) -> usize {
        match self {
            ChannelType::Null => 0,
            ChannelType::FourOp => 4,
            ChannelType::TwoOp | ChannelType::Kick => 2,
            ChannelType::Snare
            | ChannelType::TomTom
            | ChannelType::Cymbal
            | ChannelType::HiHat => 1,
        }
    }

    /// Largest synthesis algorithm the type accepts
    pub fn max_algorithm(self) -> Option<u8> {
        match self {
            ChannelType::TwoOp => Some(1),
            ChannelType::FourOp => Some(3),
            _ => None,
        }
    }
}

/// Role of an operator within its channel's algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorType {
    /// Index beyond the channel's operator count
    Null,
    /// Output feeds another operator's phase
    Modulator,
    /// Output reaches the mixer
    Carrier,
}

use OperatorType::{Carrier as C, Modulator as M};

const TWO_OP_ROLES: [[OperatorType; 2]; 2] = [[M, C], [C, C]];

/// Indexed by `(primary connection << 1) | secondary connection`
const FOUR_OP_ROLES: [[OperatorType; 4]; 4] = [
    [M, M, M, C],
    [M, C, M, C],
    [C, M, M, C],
    [C, M, C, C],
];

/// Operator role for a channel type, algorithm and operator index
pub fn operator_role(channel_type: ChannelType, algorithm: u8, index: usize) -> OperatorType {
    if index >= channel_type.operator_count() {
        return OperatorType::Null;
    }
    match channel_type {
        ChannelType::TwoOp => TWO_OP_ROLES[(algorithm & 0x01) as usize][index],
        ChannelType::FourOp => FOUR_OP_ROLES[(algorithm & 0x03) as usize][index],
        ChannelType::Kick => TWO_OP_ROLES[0][index],
        ChannelType::Snare | ChannelType::TomTom | ChannelType::Cymbal | ChannelType::HiHat => C,
        ChannelType::Null => OperatorType::Null,
    }
}

/// Physical operator `index` of physical channel `channel`.
///
/// Holds for 4-op primaries too: operators 2 and 3 land on the secondary
/// channel's pair.
pub fn channel_operator(channel: u8, index: usize) -> u8 {
    (channel / 3) * 6 + channel % 3 + index as u8 * 3
}

/// Position of a pair in [`FOUR_OP_PAIRS`] for either of its channels
pub fn four_op_pair(channel: u8) -> Option<usize> {
    FOUR_OP_PAIRS
        .iter()
        .position(|&(primary, secondary)| primary == channel || secondary == channel)
}
