use opl3_synth::chip::event::KeyState;
use opl3_synth::chip::register::{ChipAddress, Port};
use opl3_synth::{
    ChannelType, LogicalChannel, MidiEvent, NoteVoiceManager, PercussionRole, RecordingBus,
    SynthConfig, VoiceState,
};

fn synth_with(config: SynthConfig) -> NoteVoiceManager<RecordingBus> {
    let _ = tracing_subscriber::fmt::try_init();
    let mut synth = NoteVoiceManager::new(RecordingBus::new(), config);
    synth.init();
    synth
}

fn synth() -> NoteVoiceManager<RecordingBus> {
    synth_with(SynthConfig::default())
}

/// Last value written to a secondary-set register
fn secondary(synth: &NoteVoiceManager<RecordingBus>, register: u8) -> Option<u8> {
    synth
        .bus()
        .monitor()
        .read_register(ChipAddress::new(Port::Secondary, register))
}

fn bound_channel(synth: &NoteVoiceManager<RecordingBus>, note: u8) -> LogicalChannel {
    synth
        .voices()
        .iter()
        .find(|v| v.is_bound() && v.note == note)
        .and_then(|v| v.channel)
        .unwrap_or_else(|| panic!("note {} is not bound", note))
}

#[test]
fn test_play_note_programs_channel() {
    let mut synth = synth();
    synth.play_note(0, 60, 100);

    let channel = bound_channel(&synth, 60);
    assert_eq!(channel, LogicalChannel::Physical(15));
    assert_eq!(synth.allocator().free_two_op_count(), 17);

    // Operators 30 and 33 live at offsets 0x10 and 0x13 of the secondary set
    for offset in [0x10, 0x13] {
        assert_eq!(secondary(&synth, 0x60 + offset), Some(0xB1), "attack/decay");
        assert_eq!(secondary(&synth, 0x80 + offset), Some(0x57), "sustain/release");
        assert_eq!(secondary(&synth, 0xE0 + offset), Some(0x00), "waveform");
        assert_eq!(secondary(&synth, 0x40 + offset), Some(20), "attenuation");
        assert_eq!(secondary(&synth, 0x20 + offset), Some(0x20), "sustain flag");
    }

    // Note 60: block 3, fnum 689
    assert_eq!(secondary(&synth, 0xA6), Some(0xB1));
    assert_eq!(secondary(&synth, 0xB6), Some(0x2E));
    assert_eq!(synth.bus().monitor().key_state(channel), KeyState::On);
    assert_eq!(synth.stats().notes_played, 1);
}

#[test]
fn test_stop_note_releases_without_freeing() {
    let mut synth = synth();
    synth.play_note(0, 60, 100);
    let channel = bound_channel(&synth, 60);

    synth.stop_note(0, 60);
    assert_eq!(synth.bus().monitor().key_state(channel), KeyState::Off);
    assert_eq!(synth.voices()[0].state, VoiceState::Releasing);
    assert!(synth.allocator().is_allocated(channel));

    // Release rate 7 on both operators: 300 ms
    synth.service(300);
    assert_eq!(synth.active_voices(), 1);
    synth.service(1);
    assert_eq!(synth.active_voices(), 0);
    assert!(!synth.allocator().is_allocated(channel));
    assert_eq!(synth.allocator().free_two_op_count(), 18);
    assert_eq!(secondary(&synth, 0x53), Some(63));
    assert_eq!(synth.stats().expired, 1);
}

#[test]
fn test_release_rate_zero_never_expires() {
    let mut synth = synth();
    // CC 106 is the release controller of operator 1; 127 maps to rate 0
    synth.set_controller(0, 106, 127);
    synth.play_note(0, 60, 100);
    synth.stop_note(0, 60);

    synth.service(20_000);
    synth.service(20_000);
    assert_eq!(synth.active_voices(), 1);
}

#[test]
fn test_volume_scales_carriers_only() {
    let mut synth = synth();
    synth.play_note(0, 60, 100);

    synth.set_controller(0, 7, 0);
    assert_eq!(secondary(&synth, 0x53), Some(63));
    assert_eq!(secondary(&synth, 0x50), Some(20));
    assert_eq!(synth.patch(0).unwrap().operators[1].level, 48);
    assert_eq!(synth.patch(0).unwrap().volume, 0);

    synth.set_controller(0, 7, 127);
    assert_eq!(secondary(&synth, 0x53), Some(20));
}

#[test]
fn test_sustain_pedal_holds_notes() {
    let mut synth = synth();
    synth.play_note(0, 60, 100);
    let channel = bound_channel(&synth, 60);

    synth.set_controller(0, 64, 127);
    synth.stop_note(0, 60);
    assert_eq!(synth.voices()[0].state, VoiceState::Sustained);
    assert_eq!(synth.bus().monitor().key_state(channel), KeyState::On);

    synth.set_controller(0, 64, 0);
    assert_eq!(synth.voices()[0].state, VoiceState::Releasing);
    assert_eq!(synth.bus().monitor().key_state(channel), KeyState::Off);
}

#[test]
fn test_lfo_starts_after_delay() {
    let mut synth = synth();
    // Tremolo on operator 0, vibrato on operator 1
    synth.set_controller(0, 23, 127);
    synth.set_controller(0, 29, 127);
    synth.play_note(0, 60, 100);
    let channel = bound_channel(&synth, 60);
    assert!(!synth.allocator().operator(channel, 0).unwrap().tremolo);

    // Default delay: 5 steps of 150 ms
    synth.service(750);
    assert!(!synth.voices()[0].lfo_triggered);
    synth.service(1);
    assert!(synth.voices()[0].lfo_triggered);
    assert!(synth.allocator().operator(channel, 0).unwrap().tremolo);
    assert!(!synth.allocator().operator(channel, 0).unwrap().vibrato);
    assert!(synth.allocator().operator(channel, 1).unwrap().vibrato);
    assert_eq!(secondary(&synth, 0x30), Some(0xA0));

    // Disabling reaches the sounding voice at once
    synth.set_controller(0, 23, 0);
    assert!(!synth.allocator().operator(channel, 0).unwrap().tremolo);
}

#[test]
fn test_lfo_enable_reaches_voices_past_delay() {
    let mut synth = synth();
    synth.set_lfo_start_delay(0, 0);
    synth.play_note(0, 60, 100);
    let channel = bound_channel(&synth, 60);
    synth.service(10);

    synth.set_controller(0, 28, 127);
    assert!(synth.allocator().operator(channel, 0).unwrap().vibrato);
}

#[test]
fn test_steals_first_releasing_voice() {
    let mut synth = synth();
    for note in 40..58 {
        synth.play_note(0, note, 100);
    }
    assert_eq!(synth.active_voices(), 18);

    synth.play_note(0, 70, 100);
    assert_eq!(synth.active_voices(), 18);
    assert_eq!(synth.stats().dropped, 1);

    synth.stop_note(0, 45);
    synth.stop_note(0, 47);
    let stolen = bound_channel(&synth, 45);

    synth.play_note(0, 70, 100);
    assert_eq!(synth.stats().steals, 1);
    assert_eq!(synth.active_voices(), 18);
    assert_eq!(bound_channel(&synth, 70), stolen);
    assert!(synth.voices().iter().all(|v| !(v.is_bound() && v.note == 45)));
    assert!(synth.voices().iter().any(|v| v.is_bound() && v.note == 47));
    assert_eq!(synth.bus().monitor().key_state(stolen), KeyState::On);
}

#[test]
fn test_steal_prefers_matching_channel_type() {
    let config = SynthConfig {
        percussion: true,
        ..SynthConfig::default()
    };
    let mut synth = synth_with(config);
    synth.set_controller(9, 9, 72);
    synth.play_note(0, 60, 100);
    synth.play_note(9, 36, 110);
    synth.stop_note(0, 60);
    synth.stop_note(9, 36);

    // The releasing 2-op note cannot make room for a kick
    synth.play_note(9, 38, 110);
    let kick = LogicalChannel::Percussion(PercussionRole::Kick);
    assert_eq!(synth.stats().steals, 1);
    assert_eq!(synth.stats().dropped, 0);
    assert_eq!(bound_channel(&synth, 38), kick);
    assert_eq!(bound_channel(&synth, 60), LogicalChannel::Physical(15));
    assert!(synth.voices().iter().all(|v| !(v.is_bound() && v.note == 36)));
    assert_eq!(synth.bus().monitor().key_state(kick), KeyState::On);
}

#[test]
fn test_no_steal_when_nothing_releasing_fits() {
    let config = SynthConfig {
        percussion: true,
        ..SynthConfig::default()
    };
    let mut synth = synth_with(config);
    synth.set_controller(9, 9, 72);
    synth.play_note(9, 36, 110);
    synth.play_note(0, 60, 100);
    synth.stop_note(0, 60);

    synth.play_note(9, 38, 110);
    assert_eq!(synth.stats().steals, 0);
    assert_eq!(synth.stats().dropped, 1);
    assert_eq!(bound_channel(&synth, 60), LogicalChannel::Physical(15));
    assert_eq!(synth.voices()[1].state, VoiceState::Releasing);
}

#[test]
fn test_four_op_steal_needs_a_free_partner() {
    let mut synth = synth();
    // Notes 40-57 fill channels in priority order; 43 lands on 0, 44 on 3
    for note in 40..58 {
        let channel = if note == 44 { 2 } else { 0 };
        synth.play_note(channel, note, 100);
    }
    assert_eq!(bound_channel(&synth, 43), LogicalChannel::Physical(0));
    assert_eq!(bound_channel(&synth, 44), LogicalChannel::Physical(3));
    synth.set_controller(1, 9, 30);
    synth.stop_note(0, 40);
    synth.stop_note(0, 43);

    // Neither releasing voice can complete a pair
    synth.play_note(1, 70, 100);
    assert_eq!(synth.stats().steals, 0);
    assert_eq!(synth.stats().dropped, 1);
    assert_eq!(synth.active_voices(), 18);

    // With channel 3 free, stealing channel 0 completes pair 0/3
    synth.set_controller(2, 120, 0);
    synth.play_note(1, 70, 100);
    assert_eq!(synth.stats().steals, 1);
    assert_eq!(synth.stats().dropped, 1);
    let four = bound_channel(&synth, 70);
    assert_eq!(four, LogicalChannel::Physical(0));
    assert_eq!(synth.allocator().channel_type(four), ChannelType::FourOp);
    assert_eq!(synth.allocator().four_op_mask(), 0x01);
    assert_eq!(bound_channel(&synth, 40), LogicalChannel::Physical(15));
}

#[test]
fn test_algorithm_change_keeps_voice() {
    let mut synth = synth();
    synth.play_note(0, 60, 100);
    let channel = bound_channel(&synth, 60);
    assert_eq!(secondary(&synth, 0xC6), Some(0x30));

    // CC 9 = 12: still 2-op, algorithm 1 (additive)
    synth.set_controller(0, 9, 12);
    assert_eq!(synth.patch(0).unwrap().algorithm, 1);
    assert_eq!(synth.active_voices(), 1);
    assert_eq!(bound_channel(&synth, 60), channel);
    assert_eq!(synth.allocator().synth_algorithm(channel), Some(1));
    assert_eq!(secondary(&synth, 0xC6), Some(0x31));
    assert_eq!(synth.bus().monitor().key_state(channel), KeyState::On);
}

#[test]
fn test_pan_routes_output_bits() {
    let mut synth = synth();
    synth.play_note(0, 60, 100);

    // Left is bit 4 of register 0xC0, right is bit 5
    synth.set_controller(0, 10, 0);
    assert_eq!(secondary(&synth, 0xC6), Some(0x10));
    synth.set_controller(0, 10, 127);
    assert_eq!(secondary(&synth, 0xC6), Some(0x20));
    synth.set_controller(0, 10, 64);
    assert_eq!(secondary(&synth, 0xC6), Some(0x30));
}

#[test]
fn test_pitch_bend_retunes_voices() {
    let mut synth = synth();
    synth.play_note(0, 60, 100);

    // +200 cents: 293.66 Hz, block 3, fnum 774 (0x306)
    synth.set_pitch_bend(0, 16_383);
    assert_eq!(secondary(&synth, 0xA6), Some(0x06));
    assert_eq!(secondary(&synth, 0xB6), Some(0x2F));

    // Reset controllers recentres the bend
    synth.set_controller(0, 121, 0);
    assert_eq!(secondary(&synth, 0xA6), Some(0xB1));
    assert_eq!(synth.patch(0).unwrap().pitch_bend, 0);
}

#[test]
fn test_percussion_kick() {
    let config = SynthConfig {
        percussion: true,
        ..SynthConfig::default()
    };
    let mut synth = synth_with(config);
    assert!(synth.allocator().is_percussion_enabled());

    synth.set_controller(9, 9, 72);
    assert_eq!(synth.patch(9).unwrap().channel_type, ChannelType::Kick);
    synth.play_note(9, 36, 110);

    let kick = LogicalChannel::Percussion(PercussionRole::Kick);
    assert_eq!(bound_channel(&synth, 36), kick);
    assert_eq!(synth.bus().monitor().key_state(kick), KeyState::On);

    // Only one kick at a time; a second one has nothing to steal
    synth.play_note(9, 38, 110);
    assert_eq!(synth.stats().dropped, 1);

    synth.stop_note(9, 36);
    assert_eq!(synth.bus().monitor().key_state(kick), KeyState::Off);
}

#[test]
fn test_all_sound_off_frees_channels() {
    let mut synth = synth();
    synth.play_note(0, 60, 100);
    synth.play_note(0, 64, 100);
    synth.play_note(1, 67, 100);

    synth.set_controller(0, 120, 0);
    assert_eq!(synth.active_voices(), 1);
    assert_eq!(synth.allocator().free_two_op_count(), 17);
    assert_eq!(synth.bus().monitor().sounding(), 1);

    synth.set_controller(1, 123, 0);
    assert_eq!(synth.active_voices(), 1);
    assert_eq!(synth.bus().monitor().sounding(), 0);
}

#[test]
fn test_handle_event_dispatch() {
    let mut synth = synth();
    synth.handle_event(MidiEvent::NoteOn {
        channel: 2,
        note: 72,
        velocity: 90,
    });
    assert_eq!(synth.active_voices(), 1);

    synth.handle_event(MidiEvent::NoteOn {
        channel: 2,
        note: 72,
        velocity: 0,
    });
    assert_eq!(synth.voices()[0].state, VoiceState::Releasing);

    synth.handle_event(MidiEvent::ControlChange {
        channel: 2,
        controller: 10,
        value: 0,
    });
    assert_eq!(
        synth.patch(2).unwrap().output,
        opl3_synth::Output::Left
    );
}

#[test]
fn test_configured_channel_count() {
    let config = SynthConfig {
        midi_channels: 4,
        ..SynthConfig::default()
    };
    let mut synth = synth_with(config);
    synth.play_note(4, 60, 100);
    assert_eq!(synth.active_voices(), 0);
    assert!(synth.patch(4).is_none());
    synth.play_note(3, 60, 100);
    assert_eq!(synth.active_voices(), 1);
}
