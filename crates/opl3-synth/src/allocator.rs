//! Channel allocation and register cache for the YMF262 (OPL3).
//!
//! [`ChannelAllocator`] owns the chip. It hands out [`LogicalChannel`]
//! handles from two free pools (2-op and 4-op), converts idle 4-op pairs
//! between the two topologies on demand, switches rhythm-mode percussion on
//! and off, and keeps a typed mirror of every register it writes. Because
//! the chip's registers are write-only, every setter recombines the cached
//! sibling fields of a register byte before writing it.
//!
//! # Failure semantics
//!
//! Every fallible operation validates its inputs before touching the cache.
//! An `Err` means the cache is unchanged and no bus cycle was issued.
//!
//! # Examples
//!
//! ```
//! use opl3_synth::{ChannelAllocator, ChannelType, RecordingBus};
//!
//! let mut opl3 = ChannelAllocator::new(RecordingBus::new(), 0x388);
//! opl3.init();
//!
//! let channel = opl3.allocate_channel(ChannelType::TwoOp).unwrap();
//! opl3.set_frequency(channel, 44_000).unwrap();
//! opl3.key_on(channel).unwrap();
//! assert_eq!(opl3.bus().monitor().sounding(), 1);
//! ```

pub mod channel;
pub mod pool;

use tracing::{debug, trace};

use crate::bus::RegisterBus;
use crate::chip::fnumber::FNumber;
use crate::chip::params::{ChannelParams, OperatorField, OperatorParams, Output};
use crate::chip::register::{
    ChannelRegister, ChipAddress, GlobalRegister, OPERATORS, OperatorRegister, PHYSICAL_CHANNELS,
    Port,
};
use crate::chip::storage::RegisterFile;
use crate::error::{Result, SynthError};

use channel::{
    ChannelType, FOUR_OP_PAIRS, LOGICAL_CHANNELS, LogicalChannel, OperatorType,
    PERCUSSION_CHANNELS, PercussionRole, channel_operator, four_op_pair, operator_role,
};
use pool::{ChannelPool, FOUR_OP_PRIORITY, TWO_OP_PRIORITY};

/// Rhythm mode enable bit of register 0xBD
const RHYTHM_ENABLE: u8 = 0x20;
/// Tremolo depth bit of register 0xBD (4.8 dB when set, 1 dB otherwise)
const TREMOLO_DEPTH: u8 = 0x80;
/// Vibrato depth bit of register 0xBD (14 cents when set, 7 otherwise)
const VIBRATO_DEPTH: u8 = 0x40;

/// Timer control values used by [`ChannelAllocator::detect`]
const TIMERS_RESET: u8 = 0x60;
const IRQ_RESET: u8 = 0x80;
const TIMER1_START: u8 = 0x21;
/// Status bits raised by an expired timer 1
const TIMER1_EXPIRED: u8 = 0xC0;
const STATUS_FLAGS: u8 = 0xE0;
/// Status bits that are always clear on an OPL3 (set on an OPL2)
const OPL2_ID_BITS: u8 = 0x06;

/// Where a physical channel currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelStatus {
    /// Held by a caller (the secondary half of an allocated 4-op pair too)
    Allocated,
    /// In the 2-op free pool
    FreeTwoOp,
    /// In the 4-op free pool (either half of the pair)
    FreeFourOp,
    /// Claimed by rhythm mode (channels 6-8)
    PercussionReserved,
}

/// Owner of the chip's channels, operators and register cache
#[derive(Debug)]
pub struct ChannelAllocator<B: RegisterBus> {
    bus: B,
    io_base: u16,
    shadow: RegisterFile,
    channels: [ChannelParams; PHYSICAL_CHANNELS],
    operators: [OperatorParams; OPERATORS],
    /// TwoOp, FourOp (pair primary) or Null (pair secondary)
    topology: [ChannelType; PHYSICAL_CHANNELS],
    four_op_mask: u8,
    allocated: [bool; LOGICAL_CHANNELS],
    free_two_op: ChannelPool,
    free_four_op: ChannelPool,
    percussion: bool,
    percussion_keys: u8,
    tremolo_depth: bool,
    vibrato_depth: bool,
}

impl<B: RegisterBus> ChannelAllocator<B> {
    /// Create an allocator for a chip at `io_base`
    ///
    /// No bus cycles are issued; call [`ChannelAllocator::init`] to bring
    /// the chip into the state the cache describes.
    ///
    /// # Arguments
    ///
    /// * `bus` - Bus the chip is reached through
    /// * `io_base` - Address of the primary index latch (usually 0x388)
    pub fn new(bus: B, io_base: u16) -> Self {
        Self {
            bus,
            io_base,
            shadow: RegisterFile::default(),
            channels: [ChannelParams::default(); PHYSICAL_CHANNELS],
            operators: [OperatorParams::default(); OPERATORS],
            topology: [ChannelType::TwoOp; PHYSICAL_CHANNELS],
            four_op_mask: 0,
            allocated: [false; LOGICAL_CHANNELS],
            free_two_op: ChannelPool::full(&TWO_OP_PRIORITY),
            free_four_op: ChannelPool::new(&FOUR_OP_PRIORITY),
            percussion: false,
            percussion_keys: 0,
            tremolo_depth: false,
            vibrato_depth: false,
        }
    }

    /// Check for an OPL3 with the timer 1 overflow test
    ///
    /// The caller's bus is expected to let enough time pass between the
    /// timer start and the following status read (80 us on hardware).
    ///
    /// # Returns
    ///
    /// true if an OPL3 answered; false for no chip or an OPL2
    pub fn detect(&mut self) -> bool {
        self.write_global(GlobalRegister::TimerControl, TIMERS_RESET);
        self.write_global(GlobalRegister::TimerControl, IRQ_RESET);

        let status = self.read_status();
        if status & STATUS_FLAGS != 0 {
            debug!(status, "no chip: status not clear after timer reset");
            return false;
        }

        self.write_global(GlobalRegister::Timer1, 0xFF);
        self.write_global(GlobalRegister::TimerControl, TIMER1_START);

        let status = self.read_status();

        self.write_global(GlobalRegister::TimerControl, TIMERS_RESET);
        self.write_global(GlobalRegister::TimerControl, IRQ_RESET);

        if status & STATUS_FLAGS != TIMER1_EXPIRED {
            debug!(status, "no chip: timer 1 did not expire");
            return false;
        }

        let opl3 = self.read_status() & OPL2_ID_BITS == 0;
        debug!(opl3, "chip detected");
        opl3
    }

    /// Reset the chip and the allocator to the all-2-op topology
    ///
    /// Every channel is keyed off and every channel and operator register
    /// is zeroed; waveform select and OPL3 mode are enabled, keyboard split
    /// is set and percussion mode is off.
    pub fn init(&mut self) {
        self.write_global(GlobalRegister::Test, 0x00);
        self.write_global(GlobalRegister::Opl3Enable, 0x01);

        self.four_op_mask = 0;
        self.write_global(GlobalRegister::FourOpEnable, 0x00);

        for channel in 0..PHYSICAL_CHANNELS as u8 {
            self.channels[channel as usize] = ChannelParams {
                output: Output::None,
                ..ChannelParams::default()
            };
            // Key-off first
            self.commit_channel(channel, ChannelRegister::KeyBlockFnum);
            self.commit_channel(channel, ChannelRegister::FnumLow);
            self.commit_channel(channel, ChannelRegister::OutputFeedback);
        }

        for operator in 0..OPERATORS as u8 {
            self.operators[operator as usize] = OperatorParams::default();
            for register in OperatorRegister::ALL {
                self.commit_operator(operator, register);
            }
        }

        self.write_global(GlobalRegister::Test, 0x20);
        self.write_global(GlobalRegister::KeyboardSplit, 0x40);

        self.percussion = false;
        self.percussion_keys = 0;
        self.tremolo_depth = false;
        self.vibrato_depth = false;
        self.commit_rhythm();

        self.topology = [ChannelType::TwoOp; PHYSICAL_CHANNELS];
        self.allocated = [false; LOGICAL_CHANNELS];
        self.free_two_op = ChannelPool::full(&TWO_OP_PRIORITY);
        self.free_four_op = ChannelPool::new(&FOUR_OP_PRIORITY);

        debug!(io_base = self.io_base, "chip initialised");
    }

    /// Allocate a channel of the requested type
    ///
    /// Melody types come from their free pool. When that pool is empty an
    /// idle pair of the other topology is converted (see
    /// [`pool::FOUR_OP_PRIORITY`] for the search order). Percussion roles
    /// are only available while percussion mode is enabled, one holder
    /// each.
    ///
    /// # Returns
    ///
    /// `ResourceExhausted` if nothing of that type can be provided
    pub fn allocate_channel(&mut self, channel_type: ChannelType) -> Result<LogicalChannel> {
        let channel = match channel_type {
            ChannelType::Null => None,
            ChannelType::TwoOp => self
                .free_two_op
                .pop()
                .map(LogicalChannel::Physical)
                .or_else(|| self.convert_pair(ChannelType::TwoOp)),
            ChannelType::FourOp => self
                .free_four_op
                .pop()
                .map(LogicalChannel::Physical)
                .or_else(|| self.convert_pair(ChannelType::FourOp)),
            _ => channel_type
                .percussion_role()
                .map(LogicalChannel::Percussion)
                .filter(|c| self.percussion && !self.allocated[c.index()]),
        };

        let Some(channel) = channel else {
            debug!(?channel_type, "allocation failed");
            return Err(SynthError::ResourceExhausted(channel_type));
        };

        self.allocated[channel.index()] = true;
        debug!(?channel_type, %channel, "channel allocated");
        Ok(channel)
    }

    /// Flip one idle pair to `target` and take a channel from it.
    ///
    /// 2-op to 4-op takes the first pair in 4-op priority whose halves are
    /// both free 2-op channels; 4-op to 2-op breaks the last free 4-op pair
    /// in that order and leaves the secondary half in the 2-op pool.
    fn convert_pair(&mut self, target: ChannelType) -> Option<LogicalChannel> {
        let (bit, primary, secondary) = match target {
            ChannelType::FourOp => FOUR_OP_PRIORITY.iter().find_map(|&primary| {
                let bit = four_op_pair(primary)?;
                let secondary = FOUR_OP_PAIRS[bit].1;
                (self.free_two_op.contains(primary) && self.free_two_op.contains(secondary))
                    .then_some((bit, primary, secondary))
            }),
            ChannelType::TwoOp => FOUR_OP_PRIORITY.iter().rev().find_map(|&primary| {
                let bit = four_op_pair(primary)?;
                self.free_four_op
                    .contains(primary)
                    .then_some((bit, primary, FOUR_OP_PAIRS[bit].1))
            }),
            _ => None,
        }?;

        if target == ChannelType::FourOp {
            self.free_two_op.remove(primary);
            self.free_two_op.remove(secondary);
            self.topology[primary as usize] = ChannelType::FourOp;
            self.topology[secondary as usize] = ChannelType::Null;
            self.four_op_mask |= 1 << bit;
        } else {
            self.free_four_op.remove(primary);
            self.topology[primary as usize] = ChannelType::TwoOp;
            self.topology[secondary as usize] = ChannelType::TwoOp;
            self.free_two_op.insert(secondary);
            self.four_op_mask &= !(1 << bit);
        }
        self.write_global(GlobalRegister::FourOpEnable, self.four_op_mask);

        debug!(
            ?target,
            primary,
            secondary,
            mask = self.four_op_mask,
            "converted channel pair"
        );
        Some(LogicalChannel::Physical(primary))
    }

    /// Return a channel to its free pool
    ///
    /// Registers are left as they are; silencing is the caller's business.
    pub fn free_channel(&mut self, channel: LogicalChannel) -> Result<()> {
        self.require_allocated(channel)?;

        if let LogicalChannel::Physical(n) = channel {
            let returned = match self.topology[n as usize] {
                ChannelType::FourOp => self.free_four_op.insert(n),
                _ => self.free_two_op.insert(n),
            };
            if !returned {
                return Err(SynthError::InvalidHandle(channel));
            }
        }
        self.allocated[channel.index()] = false;

        debug!(%channel, "channel freed");
        Ok(())
    }

    /// Switch on rhythm mode, reserving channels 6-8
    ///
    /// Succeeds without bus cycles when already enabled.
    ///
    /// # Returns
    ///
    /// `InvalidTransition` if any of channels 6-8 is allocated
    pub fn enable_percussion(&mut self) -> Result<()> {
        if self.percussion {
            return Ok(());
        }
        if PERCUSSION_CHANNELS
            .iter()
            .any(|&c| self.allocated[c as usize])
        {
            return Err(SynthError::InvalidTransition(
                "channels 6-8 are allocated",
            ));
        }

        for channel in PERCUSSION_CHANNELS {
            self.free_two_op.remove(channel);
        }
        self.percussion = true;
        self.commit_rhythm();

        debug!("percussion enabled");
        Ok(())
    }

    /// Switch off rhythm mode, returning channels 6-8 to the 2-op pool
    ///
    /// Succeeds without bus cycles when already disabled.
    ///
    /// # Returns
    ///
    /// `InvalidTransition` while a percussion key is on or a role is held
    pub fn disable_percussion(&mut self) -> Result<()> {
        if !self.percussion {
            return Ok(());
        }
        if self.percussion_keys != 0 {
            return Err(SynthError::InvalidTransition("percussion key is on"));
        }
        if PercussionRole::ALL
            .iter()
            .any(|&role| self.allocated[LogicalChannel::Percussion(role).index()])
        {
            return Err(SynthError::InvalidTransition(
                "percussion role is allocated",
            ));
        }

        self.percussion = false;
        for channel in PERCUSSION_CHANNELS {
            self.free_two_op.insert(channel);
        }
        self.commit_rhythm();

        debug!("percussion disabled");
        Ok(())
    }

    /// Program the channel's pitch
    ///
    /// # Arguments
    ///
    /// * `channel` - Allocated melody channel, kick, snare or tom-tom
    /// * `centihertz` - Frequency in hundredths of a hertz
    ///
    /// # Returns
    ///
    /// `Unsupported` for cymbal and hi-hat, which follow the tom-tom and
    /// snare frequencies on the chip
    pub fn set_frequency(&mut self, channel: LogicalChannel, centihertz: u32) -> Result<()> {
        self.require_allocated(channel)?;
        let physical = match channel {
            LogicalChannel::Physical(n) => n,
            LogicalChannel::Percussion(role) => role.frequency_channel().ok_or(
                SynthError::Unsupported {
                    operation: "set_frequency",
                    channel,
                },
            )?,
        };

        let fnum = FNumber::from_centihertz(centihertz);
        let params = &mut self.channels[physical as usize];
        params.f_num = fnum.f_num;
        params.block = fnum.block;

        self.commit_channel(physical, ChannelRegister::FnumLow);
        self.commit_channel(physical, ChannelRegister::KeyBlockFnum);
        Ok(())
    }

    /// Start the channel's envelopes
    pub fn key_on(&mut self, channel: LogicalChannel) -> Result<()> {
        self.set_key(channel, true)
    }

    /// Move the channel's envelopes into release
    pub fn key_off(&mut self, channel: LogicalChannel) -> Result<()> {
        self.set_key(channel, false)
    }

    fn set_key(&mut self, channel: LogicalChannel, on: bool) -> Result<()> {
        self.require_allocated(channel)?;
        match channel {
            LogicalChannel::Physical(n) => {
                self.channels[n as usize].key_on = on;
                self.commit_channel(n, ChannelRegister::KeyBlockFnum);
            }
            LogicalChannel::Percussion(role) => {
                if on {
                    self.percussion_keys |= role.key_bit();
                } else {
                    self.percussion_keys &= !role.key_bit();
                }
                self.commit_rhythm();
            }
        }
        Ok(())
    }

    /// Route the channel to the left, right or both outputs
    ///
    /// Both halves of a 4-op pair are written.
    pub fn set_output(&mut self, channel: LogicalChannel, output: Output) -> Result<()> {
        let (primary, secondary) = self.melody_channel(channel, "set_output")?;
        for n in std::iter::once(primary).chain(secondary) {
            self.channels[n as usize].output = output;
            self.commit_channel(n, ChannelRegister::OutputFeedback);
        }
        Ok(())
    }

    /// Set the first operator's self-feedback factor (0-7)
    pub fn set_feedback(&mut self, channel: LogicalChannel, feedback: u8) -> Result<()> {
        let (primary, _) = self.melody_channel(channel, "set_feedback")?;
        if feedback > 7 {
            return Err(SynthError::OutOfRange {
                field: "feedback",
                value: feedback as u32,
                max: 7,
            });
        }
        self.channels[primary as usize].feedback = feedback;
        self.commit_channel(primary, ChannelRegister::OutputFeedback);
        Ok(())
    }

    /// Select the operator connection
    ///
    /// 2-op: 0 (FM) or 1 (AM). 4-op: 0-3, the high bit being the primary
    /// half's connection and the low bit the secondary half's.
    pub fn set_synth_algorithm(&mut self, channel: LogicalChannel, algorithm: u8) -> Result<()> {
        let (primary, secondary) = self.melody_channel(channel, "set_synth_algorithm")?;
        let max = self.channel_type(channel).max_algorithm().unwrap_or(0);
        if algorithm > max {
            return Err(SynthError::OutOfRange {
                field: "synth_algorithm",
                value: algorithm as u32,
                max: max as u32,
            });
        }

        match secondary {
            None => {
                self.channels[primary as usize].connection = algorithm & 0x01 != 0;
                self.commit_channel(primary, ChannelRegister::OutputFeedback);
            }
            Some(secondary) => {
                self.channels[primary as usize].connection = algorithm & 0x02 != 0;
                self.channels[secondary as usize].connection = algorithm & 0x01 != 0;
                self.commit_channel(primary, ChannelRegister::OutputFeedback);
                self.commit_channel(secondary, ChannelRegister::OutputFeedback);
            }
        }
        Ok(())
    }

    /// Current synthesis algorithm of a melody channel
    pub fn synth_algorithm(&self, channel: LogicalChannel) -> Option<u8> {
        let n = channel.physical()? as usize;
        match self.channel_type(channel) {
            ChannelType::TwoOp => Some(u8::from(self.channels[n].connection)),
            ChannelType::FourOp => {
                let secondary = FOUR_OP_PAIRS[four_op_pair(n as u8)?].1 as usize;
                Some(
                    (u8::from(self.channels[n].connection) << 1)
                        | u8::from(self.channels[secondary].connection),
                )
            }
            _ => None,
        }
    }

    /// Set one operator field and write the register that holds it
    ///
    /// # Arguments
    ///
    /// * `channel` - Allocated channel
    /// * `index` - Operator index within the channel (0 to count - 1)
    /// * `field` - Field to change
    /// * `value` - New value, checked against the field width
    pub fn set_operator(
        &mut self,
        channel: LogicalChannel,
        index: usize,
        field: OperatorField,
        value: u8,
    ) -> Result<()> {
        self.require_allocated(channel)?;
        let operator = self.physical_operator(channel, index)?;
        self.operators[operator as usize].set(field, value)?;
        self.commit_operator(operator, field.register());
        Ok(())
    }

    pub fn set_attack_rate(
        &mut self,
        channel: LogicalChannel,
        index: usize,
        rate: u8,
    ) -> Result<()> {
        self.set_operator(channel, index, OperatorField::AttackRate, rate)
    }

    pub fn set_decay_rate(
        &mut self,
        channel: LogicalChannel,
        index: usize,
        rate: u8,
    ) -> Result<()> {
        self.set_operator(channel, index, OperatorField::DecayRate, rate)
    }

    pub fn set_sustain_level(
        &mut self,
        channel: LogicalChannel,
        index: usize,
        level: u8,
    ) -> Result<()> {
        self.set_operator(channel, index, OperatorField::SustainLevel, level)
    }

    pub fn set_release_rate(
        &mut self,
        channel: LogicalChannel,
        index: usize,
        rate: u8,
    ) -> Result<()> {
        self.set_operator(channel, index, OperatorField::ReleaseRate, rate)
    }

    pub fn set_waveform(
        &mut self,
        channel: LogicalChannel,
        index: usize,
        waveform: u8,
    ) -> Result<()> {
        self.set_operator(channel, index, OperatorField::Waveform, waveform)
    }

    /// Attenuation in 0.75 dB steps (0 loudest, 63 silent)
    pub fn set_attenuation(
        &mut self,
        channel: LogicalChannel,
        index: usize,
        attenuation: u8,
    ) -> Result<()> {
        self.set_operator(channel, index, OperatorField::Attenuation, attenuation)
    }

    /// Key-scale level: 0 none, 1 = 1.5 dB/oct, 2 = 3 dB/oct, 3 = 6 dB/oct
    pub fn set_key_scale_level(
        &mut self,
        channel: LogicalChannel,
        index: usize,
        level: u8,
    ) -> Result<()> {
        self.set_operator(channel, index, OperatorField::KeyScaleLevel, level)
    }

    pub fn set_frequency_multiplier(
        &mut self,
        channel: LogicalChannel,
        index: usize,
        factor: u8,
    ) -> Result<()> {
        self.set_operator(channel, index, OperatorField::Multiplier, factor)
    }

    pub fn set_tremolo(
        &mut self,
        channel: LogicalChannel,
        index: usize,
        enable: bool,
    ) -> Result<()> {
        self.set_operator(channel, index, OperatorField::Tremolo, u8::from(enable))
    }

    pub fn set_vibrato(
        &mut self,
        channel: LogicalChannel,
        index: usize,
        enable: bool,
    ) -> Result<()> {
        self.set_operator(channel, index, OperatorField::Vibrato, u8::from(enable))
    }

    /// Hold the sustain level until key-off instead of decaying through it
    pub fn set_sustain(
        &mut self,
        channel: LogicalChannel,
        index: usize,
        enable: bool,
    ) -> Result<()> {
        self.set_operator(channel, index, OperatorField::Sustain, u8::from(enable))
    }

    /// Shorten envelopes at higher pitches (KSR)
    pub fn set_envelope_scaling(
        &mut self,
        channel: LogicalChannel,
        index: usize,
        enable: bool,
    ) -> Result<()> {
        self.set_operator(channel, index, OperatorField::EnvelopeScaling, u8::from(enable))
    }

    /// Cached parameters of operator `index` of `channel`
    pub fn operator(&self, channel: LogicalChannel, index: usize) -> Result<&OperatorParams> {
        let operator = self.physical_operator(channel, index)?;
        Ok(&self.operators[operator as usize])
    }

    /// Whether operator `index` of `channel` feeds the output or another operator
    pub fn operator_type(&self, channel: LogicalChannel, index: usize) -> OperatorType {
        let channel_type = self.channel_type(channel);
        let algorithm = self.synth_algorithm(channel).unwrap_or(0);
        operator_role(channel_type, algorithm, index)
    }

    /// Number of operators `channel` plays through
    pub fn operator_count(&self, channel: LogicalChannel) -> usize {
        self.channel_type(channel).operator_count()
    }

    /// Current topology of `channel`
    ///
    /// Null for invalid handles, the secondary half of a 4-op pair,
    /// channels 6-8 while percussion is on, and percussion roles while it
    /// is off.
    pub fn channel_type(&self, channel: LogicalChannel) -> ChannelType {
        match channel {
            LogicalChannel::Physical(n) => match self.topology.get(n as usize) {
                Some(_) if self.percussion && PERCUSSION_CHANNELS.contains(&n) => ChannelType::Null,
                Some(channel_type) => *channel_type,
                None => ChannelType::Null,
            },
            LogicalChannel::Percussion(role) if self.percussion => role.channel_type(),
            LogicalChannel::Percussion(_) => ChannelType::Null,
        }
    }

    /// Pool membership of physical channel `channel`
    pub fn channel_status(&self, channel: u8) -> Option<ChannelStatus> {
        if channel as usize >= PHYSICAL_CHANNELS {
            return None;
        }
        if self.percussion && PERCUSSION_CHANNELS.contains(&channel) {
            return Some(ChannelStatus::PercussionReserved);
        }
        let owner = match self.topology[channel as usize] {
            ChannelType::Null => four_op_pair(channel).map(|bit| FOUR_OP_PAIRS[bit].0)?,
            _ => channel,
        };
        Some(if self.allocated[owner as usize] {
            ChannelStatus::Allocated
        } else if self.topology[owner as usize] == ChannelType::FourOp {
            ChannelStatus::FreeFourOp
        } else {
            ChannelStatus::FreeTwoOp
        })
    }

    /// Check whether `channel` is currently held
    pub fn is_allocated(&self, channel: LogicalChannel) -> bool {
        channel.is_valid() && self.allocated[channel.index()]
    }

    /// Check whether freeing the held `channel` would let an allocation of
    /// `wanted` succeed
    ///
    /// Any freed melody channel serves a 2-op request, converting a 4-op
    /// pair if needed. A 4-op request is served by a 4-op channel, or by a
    /// 2-op channel whose pair partner is already free. Percussion roles
    /// only serve the same role.
    pub fn frees_for(&self, channel: LogicalChannel, wanted: ChannelType) -> bool {
        if !self.is_allocated(channel) {
            return false;
        }
        match (channel, wanted) {
            (LogicalChannel::Percussion(role), _) => wanted.percussion_role() == Some(role),
            (LogicalChannel::Physical(_), ChannelType::TwoOp) => true,
            (LogicalChannel::Physical(n), ChannelType::FourOp) => {
                match self.topology[n as usize] {
                    ChannelType::FourOp => true,
                    _ => four_op_pair(n).is_some_and(|bit| {
                        let (primary, secondary) = FOUR_OP_PAIRS[bit];
                        let partner = if primary == n { secondary } else { primary };
                        self.free_two_op.contains(partner)
                    }),
                }
            }
            (LogicalChannel::Physical(_), _) => false,
        }
    }

    /// Channels left in the 2-op pool
    pub fn free_two_op_count(&self) -> usize {
        self.free_two_op.len()
    }

    /// Pairs left in the 4-op pool
    pub fn free_four_op_count(&self) -> usize {
        self.free_four_op.len()
    }

    pub fn is_percussion_enabled(&self) -> bool {
        self.percussion
    }

    /// Register 0x104 as last written
    pub fn four_op_mask(&self) -> u8 {
        self.four_op_mask
    }

    /// Select the deep (4.8 dB) tremolo
    pub fn set_tremolo_depth(&mut self, deep: bool) {
        self.tremolo_depth = deep;
        self.commit_rhythm();
    }

    /// Select the deep (14 cent) vibrato
    pub fn set_vibrato_depth(&mut self, deep: bool) {
        self.vibrato_depth = deep;
        self.commit_rhythm();
    }

    /// Cached registers of physical channel `channel`
    pub fn channel_params(&self, channel: u8) -> Option<&ChannelParams> {
        self.channels.get(channel as usize)
    }

    /// Last byte written to a register by this allocator
    pub fn shadow(&self, port: Port, register: u8) -> Option<u8> {
        self.shadow.read(ChipAddress::new(port, register))
    }

    pub fn io_base(&self) -> u16 {
        self.io_base
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    fn require_allocated(&self, channel: LogicalChannel) -> Result<()> {
        if self.is_allocated(channel) {
            Ok(())
        } else {
            Err(SynthError::InvalidHandle(channel))
        }
    }

    /// Allocated melody channel as `(primary, 4-op secondary)`
    fn melody_channel(
        &self,
        channel: LogicalChannel,
        operation: &'static str,
    ) -> Result<(u8, Option<u8>)> {
        self.require_allocated(channel)?;
        let LogicalChannel::Physical(n) = channel else {
            return Err(SynthError::Unsupported { operation, channel });
        };
        let secondary = match self.topology[n as usize] {
            ChannelType::FourOp => four_op_pair(n).map(|bit| FOUR_OP_PAIRS[bit].1),
            _ => None,
        };
        Ok((n, secondary))
    }

    fn physical_operator(&self, channel: LogicalChannel, index: usize) -> Result<u8> {
        let count = self.operator_count(channel);
        if index >= count {
            return Err(SynthError::OutOfRange {
                field: "operator_index",
                value: index as u32,
                max: count.saturating_sub(1) as u32,
            });
        }
        Ok(match channel {
            LogicalChannel::Physical(n) => channel_operator(n, index),
            LogicalChannel::Percussion(role) => role.operators()[index],
        })
    }

    fn read_status(&mut self) -> u8 {
        self.bus.read(self.io_base)
    }

    fn write_register(&mut self, address: ChipAddress, value: u8) {
        trace!(register = %address, value, "register write");
        self.shadow.write(address, value);
        self.bus
            .write(address.index_io(self.io_base), address.register());
        self.bus.write(address.data_io(self.io_base), value);
    }

    fn write_global(&mut self, register: GlobalRegister, value: u8) {
        self.write_register(register.address(), value);
    }

    fn commit_channel(&mut self, channel: u8, register: ChannelRegister) {
        if let Some(address) = register.address(channel) {
            let value = self.channels[channel as usize].pack(register);
            self.write_register(address, value);
        }
    }

    fn commit_operator(&mut self, operator: u8, register: OperatorRegister) {
        if let Some(address) = register.address(operator) {
            let value = self.operators[operator as usize].pack(register);
            self.write_register(address, value);
        }
    }

    fn commit_rhythm(&mut self) {
        let mut value = self.percussion_keys;
        if self.percussion {
            value |= RHYTHM_ENABLE;
        }
        if self.tremolo_depth {
            value |= TREMOLO_DEPTH;
        }
        if self.vibrato_depth {
            value |= VIBRATO_DEPTH;
        }
        self.write_global(GlobalRegister::Rhythm, value);
    }
}
