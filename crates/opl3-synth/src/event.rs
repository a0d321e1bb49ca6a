//! Decoded MIDI events consumed by the voice manager.
//!
//! Byte-stream parsing and running status are `midly`'s business; this
//! module only narrows its channel messages down to the four the voice
//! manager acts on.

use midly::MidiMessage;
use midly::live::LiveEvent;
use midly::num::u4;

use crate::error::UnsupportedEvent;

/// A channel event the voice manager understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MidiEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// 14-bit bend, 8192 is centre
    PitchBend { channel: u8, value: u16 },
}

impl MidiEvent {
    /// Narrow a channel message
    ///
    /// A note-on with velocity 0 becomes a note-off.
    ///
    /// # Returns
    ///
    /// `UnsupportedEvent` for aftertouch and program change
    pub fn from_message(channel: u4, message: MidiMessage) -> Result<Self, UnsupportedEvent> {
        let channel = channel.as_int();
        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => Ok(MidiEvent::NoteOff {
                channel,
                note: key.as_int(),
            }),
            MidiMessage::NoteOn { key, vel } => Ok(MidiEvent::NoteOn {
                channel,
                note: key.as_int(),
                velocity: vel.as_int(),
            }),
            MidiMessage::NoteOff { key, .. } => Ok(MidiEvent::NoteOff {
                channel,
                note: key.as_int(),
            }),
            MidiMessage::Controller { controller, value } => Ok(MidiEvent::ControlChange {
                channel,
                controller: controller.as_int(),
                value: value.as_int(),
            }),
            MidiMessage::PitchBend { bend } => Ok(MidiEvent::PitchBend {
                channel,
                value: bend.0.as_int(),
            }),
            other => Err(UnsupportedEvent(format!("{:?}", other))),
        }
    }

    /// MIDI channel (0-15) the event is addressed to
    pub fn channel(&self) -> u8 {
        match self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::PitchBend { channel, .. } => *channel,
        }
    }
}

impl TryFrom<LiveEvent<'_>> for MidiEvent {
    type Error = UnsupportedEvent;

    fn try_from(event: LiveEvent<'_>) -> Result<Self, Self::Error> {
        match event {
            LiveEvent::Midi { channel, message } => MidiEvent::from_message(channel, message),
            other => Err(UnsupportedEvent(format!("{:?}", other))),
        }
    }
}
