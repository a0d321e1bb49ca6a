//! YMF262 (OPL3) bus monitor.
//!
//! [`ChipMonitor`] passively decodes the index/data write protocol seen on
//! the I/O bus, reconstructs the chip's register file and reports key
//! on/off and tone changes for melody channels and rhythm-mode percussion.
//! It never writes to the bus itself.

use crate::allocator::channel::{FOUR_OP_PAIRS, LogicalChannel, PercussionRole};
use crate::chip::event::{KeyState, StateEvent, ToneInfo};
use crate::chip::fnumber::FNumber;
use crate::chip::register::{
    CHANNELS_PER_PORT, ChannelRegister, ChipAddress, GlobalRegister, PHYSICAL_CHANNELS, Port,
};
use crate::chip::storage::RegisterFile;

/// Rhythm mode enable bit of register 0xBD
const RHYTHM_ENABLE: u8 = 0x20;

/// Per-channel key/tone state
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelState {
    /// Current key state
    pub key_state: KeyState,
    /// Tone at the last key-on or tone change
    pub tone: Option<ToneInfo>,
}

/// Register state tracker fed from raw bus writes
///
/// # Port Handling
///
/// - `io_base + 0` / `io_base + 1`: index and data of the primary set
/// - `io_base + 2` / `io_base + 3`: index and data of the secondary set
///
/// A data write lands in whichever register the matching index latch
/// selected last.
#[derive(Debug, Clone)]
pub struct ChipMonitor {
    io_base: u16,
    latched: [Option<u8>; 2],
    channels: [ChannelState; PHYSICAL_CHANNELS],
    percussion: [KeyState; PercussionRole::ALL.len()],
    opl3_mode: bool,
    four_op_mask: u8,
    rhythm: u8,
    registers: RegisterFile,
}

impl ChipMonitor {
    /// Create a monitor for a chip decoded at `io_base`
    ///
    /// # Examples
    ///
    /// ```
    /// use opl3_synth::chip::monitor::ChipMonitor;
    /// use opl3_synth::chip::event::StateEvent;
    ///
    /// let mut monitor = ChipMonitor::new(0x388);
    /// monitor.observe(0x388, 0xA0);
    /// monitor.observe(0x389, 0xB1);
    /// monitor.observe(0x388, 0xB0);
    /// let events = monitor.observe(0x389, 0x2E).unwrap();
    /// assert!(matches!(events[0], StateEvent::KeyOn { .. }));
    /// ```
    pub fn new(io_base: u16) -> Self {
        Self {
            io_base,
            latched: [None; 2],
            channels: std::array::from_fn(|_| ChannelState::default()),
            percussion: [KeyState::Off; PercussionRole::ALL.len()],
            opl3_mode: false,
            four_op_mask: 0,
            rhythm: 0,
            registers: RegisterFile::default(),
        }
    }

    /// I/O base address this monitor decodes
    pub fn io_base(&self) -> u16 {
        self.io_base
    }

    /// Decode one bus write into a chip register write
    ///
    /// # Returns
    ///
    /// Some((address, value)) when `io_address` is a data latch and a
    /// register was selected, None for index writes and foreign addresses
    pub fn decode_bus_write(&mut self, io_address: u16, data: u8) -> Option<(ChipAddress, u8)> {
        let offset = io_address.checked_sub(self.io_base)?;
        if offset > 3 {
            return None;
        }
        let port = (offset / 2) as usize;
        if offset % 2 == 0 {
            self.latched[port] = Some(data);
            return None;
        }
        let register = self.latched[port]?;
        Some((ChipAddress::new(Port::from_index(port as u8), register), data))
    }

    /// Feed one bus write through the decoder and state tracker
    pub fn observe(&mut self, io_address: u16, data: u8) -> Option<Vec<StateEvent>> {
        let (address, value) = self.decode_bus_write(io_address, data)?;
        self.on_register_write(address, value)
    }

    /// Apply a decoded register write
    ///
    /// # Returns
    ///
    /// Some(events) if the write changed a key state or a sounding tone
    pub fn on_register_write(
        &mut self,
        address: ChipAddress,
        value: u8,
    ) -> Option<Vec<StateEvent>> {
        self.registers.write(address, value);

        if address == GlobalRegister::Opl3Enable.address() {
            self.opl3_mode = value & 0x01 != 0;
            return None;
        }
        if address == GlobalRegister::FourOpEnable.address() {
            self.four_op_mask = value & 0x3F;
            return None;
        }
        if address == GlobalRegister::Rhythm.address() {
            return self.handle_rhythm(value);
        }

        let register = address.register();
        let channel = address.port() as usize * CHANNELS_PER_PORT as usize;
        match register {
            0xB0..=0xB8 => self.handle_block_fnum_key(channel + (register - 0xB0) as usize, value),
            0xA0..=0xA8 => self.handle_fnum_low(channel + (register - 0xA0) as usize),
            _ => None,
        }
    }

    /// Last value written to a register
    pub fn read_register(&self, address: ChipAddress) -> Option<u8> {
        self.registers.read(address)
    }

    /// Every register written so far
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Key/tone state of a physical channel
    pub fn channel(&self, channel: u8) -> Option<&ChannelState> {
        self.channels.get(channel as usize)
    }

    /// Current key state of any logical channel
    pub fn key_state(&self, channel: LogicalChannel) -> KeyState {
        match channel {
            LogicalChannel::Physical(n) => self
                .channels
                .get(n as usize)
                .map(|c| c.key_state)
                .unwrap_or_default(),
            LogicalChannel::Percussion(role) => self.percussion[role.ordinal()],
        }
    }

    /// Number of channels currently keyed on, percussion included
    pub fn sounding(&self) -> usize {
        self.channels
            .iter()
            .filter(|c| c.key_state == KeyState::On)
            .count()
            + self
                .percussion
                .iter()
                .filter(|k| **k == KeyState::On)
                .count()
    }

    pub fn is_opl3_mode(&self) -> bool {
        self.opl3_mode
    }

    pub fn is_rhythm_mode(&self) -> bool {
        self.rhythm & RHYTHM_ENABLE != 0
    }

    /// Register 0x104 as last written
    pub fn four_op_mask(&self) -> u8 {
        self.four_op_mask
    }

    /// Check whether `channel` is the primary of an enabled 4-op pair
    pub fn is_four_op(&self, channel: u8) -> bool {
        FOUR_OP_PAIRS
            .iter()
            .enumerate()
            .any(|(bit, &(primary, _))| primary == channel && self.four_op_mask & (1 << bit) != 0)
    }

    /// Forget everything observed so far
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            *channel = ChannelState::default();
        }
        self.percussion = [KeyState::Off; PercussionRole::ALL.len()];
        self.latched = [None; 2];
        self.opl3_mode = false;
        self.four_op_mask = 0;
        self.rhythm = 0;
        self.registers.clear();
    }

    fn extract_tone(&self, channel: usize) -> Option<ToneInfo> {
        let channel = channel as u8;
        let fnum_low = self
            .registers
            .read(ChannelRegister::FnumLow.address(channel)?)?;
        let block_fnum_high = self
            .registers
            .read(ChannelRegister::KeyBlockFnum.address(channel)?)?;

        let f_num = fnum_low as u16 | ((block_fnum_high & 0x03) as u16) << 8;
        let block = (block_fnum_high >> 2) & 0x07;
        Some(ToneInfo::new(FNumber { f_num, block }))
    }

    fn handle_block_fnum_key(&mut self, channel: usize, value: u8) -> Option<Vec<StateEvent>> {
        if channel >= PHYSICAL_CHANNELS {
            return None;
        }
        let handle = LogicalChannel::Physical(channel as u8);
        let new_key_state = KeyState::from(value & 0x20 != 0);
        let old_key_state = self.channels[channel].key_state;
        self.channels[channel].key_state = new_key_state;

        match (old_key_state, new_key_state) {
            (KeyState::Off, KeyState::On) => {
                let tone = self.extract_tone(channel);
                self.channels[channel].tone = tone;
                Some(vec![StateEvent::KeyOn {
                    channel: handle,
                    tone,
                }])
            }
            (KeyState::On, KeyState::Off) => Some(vec![StateEvent::KeyOff { channel: handle }]),
            (KeyState::On, KeyState::On) => self.tone_change(channel),
            _ => None,
        }
    }

    fn handle_fnum_low(&mut self, channel: usize) -> Option<Vec<StateEvent>> {
        if channel >= PHYSICAL_CHANNELS || self.channels[channel].key_state != KeyState::On {
            return None;
        }
        self.tone_change(channel)
    }

    fn tone_change(&mut self, channel: usize) -> Option<Vec<StateEvent>> {
        let tone = self.extract_tone(channel)?;
        if self.channels[channel].tone == Some(tone) {
            return None;
        }
        self.channels[channel].tone = Some(tone);
        Some(vec![StateEvent::ToneChange {
            channel: LogicalChannel::Physical(channel as u8),
            tone,
        }])
    }

    fn handle_rhythm(&mut self, value: u8) -> Option<Vec<StateEvent>> {
        self.rhythm = value;
        let rhythm_on = value & RHYTHM_ENABLE != 0;

        let mut events = Vec::new();
        for role in PercussionRole::ALL {
            let new_key_state = KeyState::from(rhythm_on && value & role.key_bit() != 0);
            let old_key_state =
                std::mem::replace(&mut self.percussion[role.ordinal()], new_key_state);
            let channel = LogicalChannel::Percussion(role);
            match (old_key_state, new_key_state) {
                (KeyState::Off, KeyState::On) => events.push(StateEvent::KeyOn {
                    channel,
                    tone: role
                        .frequency_channel()
                        .and_then(|c| self.extract_tone(c as usize)),
                }),
                (KeyState::On, KeyState::Off) => events.push(StateEvent::KeyOff { channel }),
                _ => {}
            }
        }

        if events.is_empty() { None } else { Some(events) }
    }
}
