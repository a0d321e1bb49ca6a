#![doc = include_str!("../README.md")]
//! opl3-synth: channel allocator and polyphonic voice manager for the YMF262 (OPL3)
//!
//! The crate is split in two layers:
//!
//! - [`ChannelAllocator`] owns the chip. It keeps a typed cache of every
//!   register it has written (the chip cannot be read back), the free 2-op
//!   and 4-op channel pools, and the percussion (rhythm) mode state.
//!   Channels are handed out as [`LogicalChannel`] handles; idle 2-op pairs
//!   are converted to 4-op channels and back on demand.
//! - [`NoteVoiceManager`] sits on top and turns MIDI note, controller and
//!   pitch bend events into allocator calls. It keeps one patch per MIDI
//!   channel and one voice slot per logical channel, steals releasing voices
//!   when the chip is full, and frees voices whose release has finished
//!   when [`NoteVoiceManager::service`] advances time.
//!
//! Both talk to hardware through [`RegisterBus`]. [`RecordingBus`] is an
//! implementation that records every I/O cycle and feeds it to a
//! [`ChipMonitor`], which reconstructs the register file and reports key
//! events.
//!
//! Example: playing a note
//!
//! ```rust
//! use opl3_synth::{NoteVoiceManager, RecordingBus, SynthConfig};
//! use opl3_synth::chip::event::KeyState;
//!
//! let mut synth = NoteVoiceManager::new(RecordingBus::new(), SynthConfig::default());
//! synth.init();
//!
//! synth.play_note(0, 60, 100);
//! let channel = synth.voices()[0].channel.expect("note is bound");
//! assert_eq!(synth.bus().monitor().key_state(channel), KeyState::On);
//!
//! // Note-off keys the channel off but keeps it until the release ends
//! synth.stop_note(0, 60);
//! assert_eq!(synth.bus().monitor().key_state(channel), KeyState::Off);
//! assert_eq!(synth.active_voices(), 1);
//!
//! // Default release rate 7 lasts 300 ms
//! synth.service(301);
//! assert_eq!(synth.active_voices(), 0);
//! ```
//!
//! Example: driving the allocator directly
//!
//! ```rust
//! use opl3_synth::{ChannelAllocator, ChannelType, RecordingBus};
//! use opl3_synth::chip::register::DEFAULT_IO_BASE;
//!
//! let mut opl3 = ChannelAllocator::new(RecordingBus::new(), DEFAULT_IO_BASE);
//! opl3.init();
//!
//! // No free 4-op channel yet: an idle 2-op pair is converted
//! let channel = opl3.allocate_channel(ChannelType::FourOp).unwrap();
//! assert_eq!(opl3.channel_type(channel), ChannelType::FourOp);
//! assert_eq!(opl3.free_two_op_count(), 16);
//!
//! opl3.set_frequency(channel, 44_000).unwrap();
//! opl3.set_attack_rate(channel, 3, 15).unwrap();
//! opl3.key_on(channel).unwrap();
//!
//! opl3.free_channel(channel).unwrap();
//! assert_eq!(opl3.free_four_op_count(), 1);
//! ```
//!
//! Example: feeding `midly` events
//!
//! ```rust
//! use midly::live::LiveEvent;
//! use opl3_synth::{MidiEvent, NoteVoiceManager, RecordingBus, SynthConfig};
//!
//! let mut synth = NoteVoiceManager::new(RecordingBus::new(), SynthConfig::default());
//! synth.init();
//!
//! let bytes = [0x90, 64, 100];
//! let event = LiveEvent::parse(&bytes).unwrap();
//! synth.handle_event(MidiEvent::try_from(event).unwrap());
//! assert_eq!(synth.active_voices(), 1);
//! ```
pub mod allocator;
pub mod bus;
pub mod chip;
pub mod config;
pub mod error;
pub mod event;
pub mod voice;

pub use allocator::channel::{ChannelType, LogicalChannel, OperatorType, PercussionRole};
pub use allocator::{ChannelAllocator, ChannelStatus};
pub use bus::{BusTransaction, RecordingBus, RegisterBus};
pub use chip::monitor::ChipMonitor;
pub use chip::params::{OperatorField, Output};
pub use config::SynthConfig;
pub use error::{Result, SynthError, UnsupportedEvent};
pub use event::MidiEvent;
pub use voice::patch::{MidiChannelPatch, OperatorPatch};
pub use voice::slot::{VoiceSlot, VoiceState};
pub use voice::{NoteVoiceManager, VoiceStats};
