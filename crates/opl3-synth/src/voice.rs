//! Polyphonic note lifecycle on top of [`ChannelAllocator`].
//!
//! [`NoteVoiceManager`] keeps one [`MidiChannelPatch`] per MIDI channel and
//! a fixed pool of [`VoiceSlot`]s, one per logical channel. Notes take a
//! slot and a channel of their patch's type; when the allocator is out of
//! channels a releasing voice whose channel can serve the request is
//! stolen. Time comes in through [`NoteVoiceManager::service`], which
//! starts delayed LFOs and frees voices whose release has run its course.
//!
//! Invalid input is never an error here: out-of-range notes, channels and
//! values are dropped and logged at `debug`.

pub mod controller;
pub mod patch;
pub mod slot;

use tracing::{debug, info};

use crate::allocator::ChannelAllocator;
use crate::allocator::channel::{ChannelType, LOGICAL_CHANNELS, LogicalChannel, OperatorType};
use crate::bus::RegisterBus;
use crate::chip::fnumber::note_centihertz;
use crate::chip::params::OperatorField;
use crate::config::SynthConfig;
use crate::error::Result;
use crate::event::MidiEvent;

use controller::ControllerChange;
use patch::MidiChannelPatch;
use slot::{VoiceSlot, VoiceState, release_time_ms};

/// Largest 14-bit pitch bend value
const PITCH_BEND_MAX: u16 = 16_383;
const PITCH_BEND_CENTRE: u16 = 8_192;

/// Largest LFO start delay, in steps
const MAX_LFO_START_DELAY: u8 = 15;

/// Operator fields copied from the patch when a voice starts
const TEMPLATE_FIELDS: [OperatorField; 11] = [
    OperatorField::Waveform,
    OperatorField::Tremolo,
    OperatorField::Vibrato,
    OperatorField::AttackRate,
    OperatorField::DecayRate,
    OperatorField::SustainLevel,
    OperatorField::ReleaseRate,
    OperatorField::KeyScaleLevel,
    OperatorField::EnvelopeScaling,
    OperatorField::Multiplier,
    OperatorField::Sustain,
];

/// Counters kept for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoiceStats {
    /// Notes that were keyed on
    pub notes_played: u64,
    /// Notes dropped for lack of a slot or channel
    pub dropped: u64,
    /// Releasing voices cut short to make room
    pub steals: u64,
    /// Voices freed after their release ran out
    pub expired: u64,
    /// Most voices bound at once
    pub peak_voices: usize,
}

/// Register updates the manager applies on a best-effort basis
trait Logged {
    fn logged(self, operation: &'static str);
}

impl Logged for Result<()> {
    fn logged(self, operation: &'static str) {
        if let Err(error) = self {
            debug!(operation, %error, "register update refused");
        }
    }
}

/// Maps note and controller events onto allocated chip channels
#[derive(Debug)]
pub struct NoteVoiceManager<B: RegisterBus> {
    opl3: ChannelAllocator<B>,
    config: SynthConfig,
    patches: Vec<MidiChannelPatch>,
    voices: [VoiceSlot; LOGICAL_CHANNELS],
    stats: VoiceStats,
}

impl<B: RegisterBus> NoteVoiceManager<B> {
    /// Create a manager driving a chip on `bus`
    ///
    /// Call [`NoteVoiceManager::init`] before playing.
    pub fn new(bus: B, config: SynthConfig) -> Self {
        let opl3 = ChannelAllocator::new(bus, config.io_base_address);
        Self::with_allocator(opl3, config)
    }

    /// Create a manager around an existing allocator
    pub fn with_allocator(opl3: ChannelAllocator<B>, config: SynthConfig) -> Self {
        let delay = config.default_lfo_start_delay.min(MAX_LFO_START_DELAY);
        let patches = vec![
            MidiChannelPatch::with_lfo_start_delay(delay);
            config.midi_channel_count()
        ];
        Self {
            opl3,
            config,
            patches,
            voices: [VoiceSlot::default(); LOGICAL_CHANNELS],
            stats: VoiceStats::default(),
        }
    }

    /// Reset the chip and apply the configured global settings
    pub fn init(&mut self) {
        self.opl3.init();
        self.voices = [VoiceSlot::default(); LOGICAL_CHANNELS];
        self.opl3.set_vibrato_depth(self.config.vibrato_depth);
        self.opl3.set_tremolo_depth(self.config.tremolo_depth);
        if self.config.percussion {
            self.opl3.enable_percussion().logged("enable_percussion");
        }
        info!(
            midi_channels = self.patches.len(),
            percussion = self.opl3.is_percussion_enabled(),
            "voice manager initialised"
        );
    }

    /// Dispatch a decoded MIDI event
    pub fn handle_event(&mut self, event: MidiEvent) {
        match event {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => {
                if velocity == 0 {
                    self.stop_note(channel, note);
                } else {
                    self.play_note(channel, note, velocity);
                }
            }
            MidiEvent::NoteOff { channel, note } => self.stop_note(channel, note),
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => self.set_controller(channel, controller, value),
            MidiEvent::PitchBend { channel, value } => self.set_pitch_bend(channel, value),
        }
    }

    /// Start a note
    ///
    /// # Arguments
    ///
    /// * `channel` - MIDI channel (0 to the configured count - 1)
    /// * `note` - MIDI note (0-127)
    /// * `velocity` - Note velocity (0-127)
    pub fn play_note(&mut self, channel: u8, note: u8, velocity: u8) {
        if channel as usize >= self.patches.len() || note > 0x7F || velocity > 0x7F {
            debug!(channel, note, velocity, "note out of range");
            return;
        }
        let Some(slot) = self.voices.iter().position(|v| !v.is_bound()) else {
            debug!(channel, note, "no free voice slot");
            self.stats.dropped += 1;
            return;
        };

        let patch = self.patches[channel as usize];
        let handle = match self.opl3.allocate_channel(patch.channel_type) {
            Ok(handle) => handle,
            Err(_) => match self.steal_releasing_voice(patch.channel_type) {
                Some(()) => match self.opl3.allocate_channel(patch.channel_type) {
                    Ok(handle) => handle,
                    Err(error) => {
                        debug!(channel, note, %error, "note dropped after steal");
                        self.stats.dropped += 1;
                        return;
                    }
                },
                None => {
                    debug!(channel, note, channel_type = ?patch.channel_type, "note dropped");
                    self.stats.dropped += 1;
                    return;
                }
            },
        };

        if let LogicalChannel::Physical(_) = handle {
            self.opl3.set_output(handle, patch.output).logged("set_output");
            self.opl3
                .set_synth_algorithm(handle, patch.algorithm)
                .logged("set_synth_algorithm");
            self.opl3
                .set_feedback(handle, patch.feedback)
                .logged("set_feedback");
        }
        for index in 0..self.opl3.operator_count(handle) {
            let template = &patch.operators[index];
            for field in TEMPLATE_FIELDS {
                self.opl3
                    .set_operator(handle, index, field, template.field(field))
                    .logged("program_operator");
            }
        }

        self.voices[slot].bind(handle, channel, note, velocity);
        self.stats.notes_played += 1;
        let bound = self.active_voices();
        self.stats.peak_voices = self.stats.peak_voices.max(bound);

        self.opl3
            .set_frequency(handle, note_centihertz(note, patch.pitch_bend))
            .logged("set_frequency");
        self.apply_attenuation(slot);
        self.opl3.key_on(handle).logged("key_on");

        debug!(channel, note, velocity, %handle, slot, "note on");
    }

    /// Stop every voice playing `note` on `channel`
    ///
    /// With the sustain pedal held the voices only become `Sustained`.
    pub fn stop_note(&mut self, channel: u8, note: u8) {
        if channel as usize >= self.patches.len() || note > 0x7F {
            debug!(channel, note, "note off out of range");
            return;
        }
        let sustain = self.patches[channel as usize].sustain;

        for slot in 0..self.voices.len() {
            let voice = self.voices[slot];
            if !voice.belongs_to(channel)
                || voice.note != note
                || voice.state == VoiceState::Releasing
            {
                continue;
            }
            if sustain {
                self.voices[slot].state = VoiceState::Sustained;
            } else {
                self.release(slot);
            }
        }
    }

    /// Apply a controller change to the channel's patch and its voices
    pub fn set_controller(&mut self, channel: u8, controller: u8, value: u8) {
        if channel as usize >= self.patches.len() || controller > 0x7F || value > 0x7F {
            debug!(channel, controller, value, "controller out of range");
            return;
        }
        let Some(change) = ControllerChange::decode(controller, value) else {
            debug!(channel, controller, value, "unmapped controller");
            return;
        };
        let index = channel as usize;

        match change {
            ControllerChange::Volume(volume) => {
                self.patches[index].volume = volume;
                self.update_attenuation(channel);
            }
            ControllerChange::Topology {
                channel_type,
                algorithm,
            } => {
                if self.patches[index].channel_type != channel_type {
                    self.stop_all(channel, true);
                    self.patches[index].channel_type = channel_type;
                }
                self.patches[index].algorithm = algorithm;
                for handle in self.handles(channel) {
                    self.opl3
                        .set_synth_algorithm(handle, algorithm)
                        .logged("set_synth_algorithm");
                }
                self.update_attenuation(channel);
            }
            ControllerChange::Output(output) => {
                self.patches[index].output = output;
                for handle in self.handles(channel) {
                    self.opl3.set_output(handle, output).logged("set_output");
                }
            }
            ControllerChange::Feedback(feedback) => {
                self.patches[index].feedback = feedback;
                for handle in self.handles(channel) {
                    self.opl3
                        .set_feedback(handle, feedback)
                        .logged("set_feedback");
                }
            }
            ControllerChange::VelocitySensitivity { operator, value } => {
                self.patches[index].operators[operator].velocity_sensitivity = value;
                self.update_attenuation(channel);
            }
            ControllerChange::Level { operator, value } => {
                self.patches[index].operators[operator].level = value;
                self.update_attenuation(channel);
            }
            ControllerChange::Operator {
                operator,
                field,
                value,
            } => {
                self.patches[index].operators[operator].set_field(field, value);
                for handle in self.handles(channel) {
                    if operator < self.opl3.operator_count(handle) {
                        self.opl3
                            .set_operator(handle, operator, field, value)
                            .logged("set_operator");
                    }
                }
            }
            ControllerChange::Tremolo { operator, enable } => {
                self.set_lfo(channel, operator, OperatorField::Tremolo, enable)
            }
            ControllerChange::Vibrato { operator, enable } => {
                self.set_lfo(channel, operator, OperatorField::Vibrato, enable)
            }
            ControllerChange::TremoloDepth(deep) => self.opl3.set_tremolo_depth(deep),
            ControllerChange::VibratoDepth(deep) => self.opl3.set_vibrato_depth(deep),
            ControllerChange::Sustain(on) => self.set_sustain(channel, on),
            ControllerChange::AllSoundOff => self.stop_all(channel, true),
            ControllerChange::ResetControllers => {
                self.set_pitch_bend(channel, PITCH_BEND_CENTRE);
                self.set_sustain(channel, false);
            }
            ControllerChange::AllNotesOff => self.stop_all(channel, false),
        }
    }

    /// Bend every voice of `channel`
    ///
    /// # Arguments
    ///
    /// * `value` - 14-bit bend, 8192 centre; the range is +/- 200 cents
    pub fn set_pitch_bend(&mut self, channel: u8, value: u16) {
        if channel as usize >= self.patches.len() || value > PITCH_BEND_MAX {
            debug!(channel, value, "pitch bend out of range");
            return;
        }
        let offset = value as i32 - PITCH_BEND_CENTRE as i32;
        let divisor = if value < PITCH_BEND_CENTRE { 4096 } else { 4095 };
        let cents = (offset * 100 / divisor) as i16;
        self.patches[channel as usize].pitch_bend = cents;

        for slot in 0..self.voices.len() {
            let voice = self.voices[slot];
            let Some(handle) = voice.channel else {
                continue;
            };
            if voice.midi_channel == channel {
                self.opl3
                    .set_frequency(handle, note_centihertz(voice.note, cents))
                    .logged("set_frequency");
            }
        }
    }

    /// Set how long voices of `channel` wait before tremolo/vibrato start
    ///
    /// # Arguments
    ///
    /// * `steps` - Delay in units of the configured step length (0-15)
    pub fn set_lfo_start_delay(&mut self, channel: u8, steps: u8) {
        if channel as usize >= self.patches.len() || steps > MAX_LFO_START_DELAY {
            debug!(channel, steps, "LFO start delay out of range");
            return;
        }
        self.patches[channel as usize].lfo_start_delay = steps;
    }

    /// Advance every voice by `elapsed_ms`
    ///
    /// Starts requested tremolo/vibrato once a voice has played longer than
    /// its LFO delay, and frees releasing voices whose expected release
    /// time has passed. Must be called with non-decreasing time.
    pub fn service(&mut self, elapsed_ms: u32) {
        if elapsed_ms == 0 {
            return;
        }
        for slot in 0..self.voices.len() {
            let Some(handle) = self.voices[slot].channel else {
                continue;
            };
            self.voices[slot].advance(elapsed_ms);

            let voice = self.voices[slot];
            let patch = self.patches[voice.midi_channel as usize];
            let count = self.opl3.operator_count(handle);

            if !voice.lfo_triggered && voice.duration_ms as u32 > self.lfo_delay_ms(&patch) {
                self.voices[slot].lfo_triggered = true;
                for (index, template) in patch.operators.iter().enumerate().take(count) {
                    if template.vibrato {
                        self.opl3.set_vibrato(handle, index, true).logged("set_vibrato");
                    }
                    if template.tremolo {
                        self.opl3.set_tremolo(handle, index, true).logged("set_tremolo");
                    }
                }
            }

            if voice.state != VoiceState::Releasing {
                continue;
            }
            let expected = patch
                .operators
                .iter()
                .take(count)
                .map(|op| release_time_ms(op.release_rate))
                .try_fold(0, |longest, time| time.map(|t| t.max(longest)));
            if expected.is_some_and(|expected| voice.release_ms > expected) {
                self.silence(slot, false);
                self.stats.expired += 1;
            }
        }
    }

    /// Voices currently holding a channel
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_bound()).count()
    }

    pub fn voices(&self) -> &[VoiceSlot] {
        &self.voices
    }

    pub fn patch(&self, channel: u8) -> Option<&MidiChannelPatch> {
        self.patches.get(channel as usize)
    }

    /// Replace a channel's patch; sounding voices keep their settings
    pub fn set_patch(&mut self, channel: u8, patch: MidiChannelPatch) {
        if let Some(slot) = self.patches.get_mut(channel as usize) {
            *slot = patch;
        }
    }

    pub fn stats(&self) -> VoiceStats {
        self.stats
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn allocator(&self) -> &ChannelAllocator<B> {
        &self.opl3
    }

    pub fn allocator_mut(&mut self) -> &mut ChannelAllocator<B> {
        &mut self.opl3
    }

    pub fn bus(&self) -> &B {
        self.opl3.bus()
    }

    pub fn into_allocator(self) -> ChannelAllocator<B> {
        self.opl3
    }

    fn lfo_delay_ms(&self, patch: &MidiChannelPatch) -> u32 {
        patch.lfo_start_delay as u32 * self.config.lfo_delay_unit_ms as u32
    }

    /// Handles of the bound voices of `channel`
    fn handles(&self, channel: u8) -> Vec<LogicalChannel> {
        self.voices
            .iter()
            .filter(|v| v.belongs_to(channel))
            .filter_map(|v| v.channel)
            .collect()
    }

    /// Silence and free a releasing voice whose channel can serve `wanted`
    ///
    /// A voice already holding that channel type is preferred; otherwise
    /// the first one in slot order that frees a usable channel is taken.
    /// Nothing is stolen when no releasing voice would help.
    fn steal_releasing_voice(&mut self, wanted: ChannelType) -> Option<()> {
        let candidates: Vec<(usize, LogicalChannel)> = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.state == VoiceState::Releasing)
            .filter_map(|(slot, v)| v.channel.map(|handle| (slot, handle)))
            .filter(|(_, handle)| self.opl3.frees_for(*handle, wanted))
            .collect();
        let (slot, _) = candidates
            .iter()
            .find(|(_, handle)| self.opl3.channel_type(*handle) == wanted)
            .or_else(|| candidates.first())
            .copied()?;

        debug!(
            slot,
            note = self.voices[slot].note,
            ?wanted,
            "stealing releasing voice"
        );
        self.silence(slot, true);
        self.stats.steals += 1;
        Some(())
    }

    fn release(&mut self, slot: usize) {
        if let Some(handle) = self.voices[slot].channel {
            self.opl3.key_off(handle).logged("key_off");
            self.voices[slot].state = VoiceState::Releasing;
        }
    }

    /// Mute a voice, free its channel and clear the slot
    ///
    /// `cut` also forces the fastest release and keys off, for voices that
    /// may still be sounding.
    fn silence(&mut self, slot: usize, cut: bool) {
        let Some(handle) = self.voices[slot].channel else {
            return;
        };
        for index in 0..self.opl3.operator_count(handle) {
            if cut {
                self.opl3
                    .set_release_rate(handle, index, 15)
                    .logged("set_release_rate");
            }
            self.opl3
                .set_attenuation(handle, index, 63)
                .logged("set_attenuation");
        }
        if cut {
            self.opl3.key_off(handle).logged("key_off");
        }
        self.opl3.set_frequency(handle, 0).logged("set_frequency");
        self.opl3.free_channel(handle).logged("free_channel");
        self.voices[slot].clear();
    }

    /// Release (or with `immediate`, cut and free) every voice of `channel`
    fn stop_all(&mut self, channel: u8, immediate: bool) {
        for slot in 0..self.voices.len() {
            if !self.voices[slot].belongs_to(channel) {
                continue;
            }
            if immediate {
                self.silence(slot, true);
            } else {
                self.release(slot);
            }
        }
    }

    fn set_sustain(&mut self, channel: u8, on: bool) {
        self.patches[channel as usize].sustain = on;
        if on {
            return;
        }
        for slot in 0..self.voices.len() {
            let voice = self.voices[slot];
            if voice.belongs_to(channel) && voice.state == VoiceState::Sustained {
                self.release(slot);
            }
        }
    }

    /// Turn a requested tremolo/vibrato on or off for one operator
    ///
    /// Switching on only reaches voices that are already past their LFO
    /// delay; the others pick it up from `service`.
    fn set_lfo(&mut self, channel: u8, operator: usize, field: OperatorField, enable: bool) {
        let index = channel as usize;
        let template = &mut self.patches[index].operators[operator];
        let was_enabled = template.field_requested(field);
        template.set_field(field, u8::from(enable));
        if was_enabled == enable {
            return;
        }

        let delay = self.lfo_delay_ms(&self.patches[index]);
        for slot in 0..self.voices.len() {
            let voice = self.voices[slot];
            let Some(handle) = voice.channel else {
                continue;
            };
            if voice.midi_channel != channel || operator >= self.opl3.operator_count(handle) {
                continue;
            }
            if enable && voice.duration_ms as u32 <= delay {
                continue;
            }
            if enable {
                self.voices[slot].lfo_triggered = true;
            }
            self.opl3
                .set_operator(handle, operator, field, u8::from(enable))
                .logged("set_lfo");
        }
    }

    /// Attenuation of every bound voice of `channel`
    fn update_attenuation(&mut self, channel: u8) {
        for slot in 0..self.voices.len() {
            if self.voices[slot].belongs_to(channel) {
                self.apply_attenuation(slot);
            }
        }
    }

    fn apply_attenuation(&mut self, slot: usize) {
        let voice = self.voices[slot];
        let Some(handle) = voice.channel else {
            return;
        };
        let patch = self.patches[voice.midi_channel as usize];
        for index in 0..self.opl3.operator_count(handle) {
            let volume = match self.opl3.operator_type(handle, index) {
                OperatorType::Carrier => Some(patch.volume),
                _ => None,
            };
            let attenuation = patch.operators[index].attenuation(voice.velocity, volume);
            self.opl3
                .set_attenuation(handle, index, attenuation)
                .logged("set_attenuation");
        }
    }
}
