//! Voice slots: one sounding (or fading) note bound to a channel.

use crate::allocator::channel::LogicalChannel;

/// Durations saturate here (milliseconds)
pub const MAX_DURATION_MS: u16 = 32_767;

/// Lifecycle of a bound voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VoiceState {
    /// Key is on
    #[default]
    Playing,
    /// Note-off arrived while the sustain pedal was held; key still on
    Sustained,
    /// Key is off and the envelope is fading out
    Releasing,
}

impl std::fmt::Display for VoiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VoiceState::Playing => "playing",
            VoiceState::Sustained => "sustained",
            VoiceState::Releasing => "releasing",
        };
        f.write_str(name)
    }
}

/// One voice slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoiceSlot {
    pub midi_channel: u8,
    pub note: u8,
    pub velocity: u8,
    /// Allocator handle held by this slot; None while free
    pub channel: Option<LogicalChannel>,
    /// Time since note-on
    pub duration_ms: u16,
    /// Time since the voice entered `Releasing`
    pub release_ms: u16,
    pub state: VoiceState,
    /// Requested tremolo/vibrato has been switched on
    pub lfo_triggered: bool,
}

impl VoiceSlot {
    pub fn is_bound(&self) -> bool {
        self.channel.is_some()
    }

    /// Bound voice of `midi_channel`
    pub fn belongs_to(&self, midi_channel: u8) -> bool {
        self.is_bound() && self.midi_channel == midi_channel
    }

    /// Bind a freshly keyed note to `channel`
    pub fn bind(&mut self, channel: LogicalChannel, midi_channel: u8, note: u8, velocity: u8) {
        *self = VoiceSlot {
            midi_channel,
            note,
            velocity,
            channel: Some(channel),
            ..VoiceSlot::default()
        };
    }

    /// Release the slot (the allocator handle must already be freed)
    pub fn clear(&mut self) {
        *self = VoiceSlot::default();
    }

    /// Advance the note clock, and the release clock while releasing
    pub fn advance(&mut self, elapsed_ms: u32) {
        self.duration_ms = saturating_add_ms(self.duration_ms, elapsed_ms);
        if self.state == VoiceState::Releasing {
            self.release_ms = saturating_add_ms(self.release_ms, elapsed_ms);
        }
    }
}

fn saturating_add_ms(current: u16, elapsed_ms: u32) -> u16 {
    (current as u32).saturating_add(elapsed_ms).min(MAX_DURATION_MS as u32) as u16
}

/// Expected audible release for a release rate, in milliseconds
///
/// # Returns
///
/// None for rate 0, which never finishes releasing
pub fn release_time_ms(release_rate: u8) -> Option<u16> {
    match release_rate {
        0 => None,
        1 => Some(18_000),
        2 => Some(10_000),
        3 => Some(4_500),
        4 => Some(2_500),
        5 => Some(1_100),
        6 => Some(500),
        7 => Some(300),
        8 => Some(150),
        9 => Some(75),
        _ => Some(50),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_saturates() {
        let mut slot = VoiceSlot::default();
        slot.bind(LogicalChannel::Physical(0), 0, 60, 100);
        slot.advance(30_000);
        slot.advance(30_000);
        assert_eq!(slot.duration_ms, MAX_DURATION_MS);
        assert_eq!(slot.release_ms, 0);

        slot.state = VoiceState::Releasing;
        slot.advance(u32::MAX);
        assert_eq!(slot.release_ms, MAX_DURATION_MS);
    }

    #[test]
    fn test_release_table() {
        assert_eq!(release_time_ms(0), None);
        assert_eq!(release_time_ms(1), Some(18_000));
        assert_eq!(release_time_ms(7), Some(300));
        assert_eq!(release_time_ms(15), Some(50));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(VoiceState::Releasing.to_string(), "releasing");
        assert_eq!(VoiceState::Sustained.to_string(), "sustained");
    }
}
