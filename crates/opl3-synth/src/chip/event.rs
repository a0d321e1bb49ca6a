//! Chip state events.
//!
//! This module defines the events a [`crate::chip::monitor::ChipMonitor`]
//! emits when the register writes it observes change a channel's key state
//! or pitch.

use crate::allocator::channel::LogicalChannel;
use crate::chip::fnumber::FNumber;

/// Key state for a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyState {
    /// Channel is not producing sound
    #[default]
    Off,
    /// Channel is producing sound
    On,
}

impl From<bool> for KeyState {
    fn from(on: bool) -> Self {
        if on { KeyState::On } else { KeyState::Off }
    }
}

/// Tone information extracted from register state
///
/// The F-number and block as written to registers 0xA0/0xB0, along with
/// the frequency they produce at the standard master clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneInfo {
    /// F-number and block
    pub fnum: FNumber,

    /// Produced frequency in Hz
    pub freq_hz: f64,
}

impl ToneInfo {
    /// Create a new ToneInfo, computing the produced frequency
    pub fn new(fnum: FNumber) -> Self {
        Self {
            fnum,
            freq_hz: fnum.frequency_hz(),
        }
    }
}

/// Events emitted from state tracking
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    /// Channel transitioned from Off to On
    ///
    /// Percussion roles have no tone of their own when they are keyed on
    /// through register 0xBD; cymbal and hi-hat always report None.
    KeyOn {
        channel: LogicalChannel,
        tone: Option<ToneInfo>,
    },

    /// Channel transitioned from On to Off
    KeyOff { channel: LogicalChannel },

    /// Frequency changed while the key is still on
    ToneChange {
        channel: LogicalChannel,
        tone: ToneInfo,
    },
}

impl StateEvent {
    /// Channel the event refers to
    pub fn channel(&self) -> LogicalChannel {
        match self {
            StateEvent::KeyOn { channel, .. }
            | StateEvent::KeyOff { channel }
            | StateEvent::ToneChange { channel, .. } => *channel,
        }
    }
}
