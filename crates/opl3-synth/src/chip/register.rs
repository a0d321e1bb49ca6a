//! YMF262 register addressing.
//!
//! The chip exposes two register sets ("ports"), each reached through an
//! index/data pair of I/O addresses. Registers are identified here by a
//! port-encoded `u16` (port 0: `0x000-0x0FF`, port 1: `0x100-0x1FF`).

use std::fmt;

/// Number of physical melody channels.
pub const PHYSICAL_CHANNELS: usize = 18;

/// Number of physical operators.
pub const OPERATORS: usize = 36;

/// Channels per register set.
pub const CHANNELS_PER_PORT: u8 = 9;

/// Operators per register set.
pub const OPERATORS_PER_PORT: u8 = 18;

/// Default I/O base address of the primary index/data pair.
pub const DEFAULT_IO_BASE: u16 = 0x388;

/// Register set selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Port {
    /// Primary register set (channels 0-8, operators 0-17, globals)
    Primary = 0,
    /// Secondary register set (channels 9-17, operators 18-35, 0x104/0x105)
    Secondary = 1,
}

impl Port {
    /// Port from its index (anything non-zero is the secondary set)
    pub fn from_index(index: u8) -> Self {
        if index & 1 == 0 {
            Port::Primary
        } else {
            Port::Secondary
        }
    }

    /// Offset of this port's index address from the I/O base
    pub fn io_offset(self) -> u16 {
        (self as u16) * 2
    }
}

/// A port-encoded register address
///
/// Port 0 registers: 0x0000-0x00FF
/// Port 1 registers: 0x0100-0x01FF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChipAddress(u16);

impl ChipAddress {
    /// Encode port and register into a single address
    pub const fn new(port: Port, register: u8) -> Self {
        Self((port as u16) << 8 | register as u16)
    }

    /// Decode a raw port-encoded value, rejecting anything above 0x1FF
    pub fn from_raw(raw: u16) -> Option<Self> {
        (raw <= 0x1FF).then_some(Self(raw))
    }

    /// Register set of this address
    pub fn port(self) -> Port {
        Port::from_index((self.0 >> 8) as u8)
    }

    /// Register index within the set
    pub fn register(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// The raw encoded value
    pub fn raw(self) -> u16 {
        self.0
    }

    /// I/O address of the index (register select) latch for this address
    pub fn index_io(self, io_base: u16) -> u16 {
        io_base + self.port().io_offset()
    }

    /// I/O address of the data latch for this address
    pub fn data_io(self, io_base: u16) -> u16 {
        self.index_io(io_base) + 1
    }
}

impl fmt::Display for ChipAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X}", self.0)
    }
}

/// Registers that are not tied to a channel or an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalRegister {
    /// 0x01: test register / waveform select enable (bit 5)
    Test,
    /// 0x02: timer 1 preset
    Timer1,
    /// 0x03: timer 2 preset
    Timer2,
    /// 0x04 (primary): timer control / IRQ reset
    TimerControl,
    /// 0x08: keyboard split (CSM / NTS)
    KeyboardSplit,
    /// 0xBD: tremolo depth, vibrato depth, rhythm mode and percussion keys
    Rhythm,
    /// 0x104: four-operator connection enable mask
    FourOpEnable,
    /// 0x105: OPL3 mode enable
    Opl3Enable,
}

impl GlobalRegister {
    /// Port-encoded address of the register
    pub fn address(self) -> ChipAddress {
        match self {
            GlobalRegister::Test => ChipAddress::new(Port::Primary, 0x01),
            GlobalRegister::Timer1 => ChipAddress::new(Port::Primary, 0x02),
            GlobalRegister::Timer2 => ChipAddress::new(Port::Primary, 0x03),
            GlobalRegister::TimerControl => ChipAddress::new(Port::Primary, 0x04),
            GlobalRegister::KeyboardSplit => ChipAddress::new(Port::Primary, 0x08),
            GlobalRegister::Rhythm => ChipAddress::new(Port::Primary, 0xBD),
            GlobalRegister::FourOpEnable => ChipAddress::new(Port::Secondary, 0x04),
            GlobalRegister::Opl3Enable => ChipAddress::new(Port::Secondary, 0x05),
        }
    }
}

/// Per-channel register groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRegister {
    /// 0xA0-0xA8: F-number low 8 bits
    FnumLow,
    /// 0xB0-0xB8: key on (bit 5), block (bits 4-2), F-number high bits (1-0)
    KeyBlockFnum,
    /// 0xC0-0xC8: output (bits 7-4), feedback (bits 3-1), connection (bit 0)
    OutputFeedback,
}

impl ChannelRegister {
    fn base(self) -> u8 {
        match self {
            ChannelRegister::FnumLow => 0xA0,
            ChannelRegister::KeyBlockFnum => 0xB0,
            ChannelRegister::OutputFeedback => 0xC0,
        }
    }

    /// Address of this register for physical channel `channel` (0-17)
    ///
    /// # Returns
    ///
    /// None if the channel index is out of range
    pub fn address(self, channel: u8) -> Option<ChipAddress> {
        if channel as usize >= PHYSICAL_CHANNELS {
            return None;
        }
        let port = Port::from_index(channel / CHANNELS_PER_PORT);
        Some(ChipAddress::new(
            port,
            self.base() + channel % CHANNELS_PER_PORT,
        ))
    }
}

/// Per-operator register groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorRegister {
    /// 0x20: tremolo, vibrato, sustain, envelope scaling, multiplier
    Characteristics,
    /// 0x40: key-scale level and attenuation
    Levels,
    /// 0x60: attack and decay rates
    AttackDecay,
    /// 0x80: sustain level and release rate
    SustainRelease,
    /// 0xE0: waveform select
    Waveform,
}

impl OperatorRegister {
    /// Every operator register, in the order they are reset
    pub const ALL: [OperatorRegister; 5] = [
        OperatorRegister::Characteristics,
        OperatorRegister::Levels,
        OperatorRegister::AttackDecay,
        OperatorRegister::SustainRelease,
        OperatorRegister::Waveform,
    ];

    fn base(self) -> u8 {
        match self {
            OperatorRegister::Characteristics => 0x20,
            OperatorRegister::Levels => 0x40,
            OperatorRegister::AttackDecay => 0x60,
            OperatorRegister::SustainRelease => 0x80,
            OperatorRegister::Waveform => 0xE0,
        }
    }

    /// Address of this register for physical operator `operator` (0-35)
    pub fn address(self, operator: u8) -> Option<ChipAddress> {
        if operator as usize >= OPERATORS {
            return None;
        }
        let port = Port::from_index(operator / OPERATORS_PER_PORT);
        Some(ChipAddress::new(port, self.base() + operator_offset(operator)))
    }
}

/// Register offset of an operator inside its register set.
///
/// Operators are laid out in groups of six with a two-register gap after
/// each group, so local operator 6 lives at offset 8 and 12 at offset 16.
pub fn operator_offset(operator: u8) -> u8 {
    let local = operator % OPERATORS_PER_PORT;
    match local {
        0..=5 => local,
        6..=11 => local + 2,
        _ => local + 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_offset_gaps() {
        assert_eq!(operator_offset(0), 0x00);
        assert_eq!(operator_offset(5), 0x05);
        assert_eq!(operator_offset(6), 0x08);
        assert_eq!(operator_offset(11), 0x0D);
        assert_eq!(operator_offset(12), 0x10);
        assert_eq!(operator_offset(17), 0x15);
        assert_eq!(operator_offset(18), 0x00);
        assert_eq!(operator_offset(35), 0x15);
    }

    #[test]
    fn test_channel_register_ports() {
        let a = ChannelRegister::KeyBlockFnum.address(8).unwrap();
        assert_eq!(a.raw(), 0x0B8);
        let b = ChannelRegister::FnumLow.address(9).unwrap();
        assert_eq!(b.raw(), 0x1A0);
        assert_eq!(b.port(), Port::Secondary);
        assert!(ChannelRegister::OutputFeedback.address(18).is_none());
    }

    #[test]
    fn test_operator_register_ports() {
        assert_eq!(OperatorRegister::Levels.address(13).unwrap().raw(), 0x051);
        assert_eq!(OperatorRegister::Waveform.address(21).unwrap().raw(), 0x1E3);
        assert!(OperatorRegister::Characteristics.address(36).is_none());
    }

    #[test]
    fn test_io_addresses() {
        let a = GlobalRegister::FourOpEnable.address();
        assert_eq!(a.index_io(DEFAULT_IO_BASE), 0x38A);
        assert_eq!(a.data_io(DEFAULT_IO_BASE), 0x38B);
        let b = GlobalRegister::Rhythm.address();
        assert_eq!(b.index_io(0x220), 0x220);
        assert_eq!(b.data_io(0x220), 0x221);
    }
}
