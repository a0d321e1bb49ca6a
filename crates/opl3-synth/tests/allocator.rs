use opl3_synth::chip::event::KeyState;
use opl3_synth::chip::register::{ChipAddress, DEFAULT_IO_BASE, Port};
use opl3_synth::{
    ChannelAllocator, ChannelStatus, ChannelType, LogicalChannel, OperatorType, PercussionRole,
    RecordingBus, SynthError,
};

fn allocator() -> ChannelAllocator<RecordingBus> {
    let _ = tracing_subscriber::fmt::try_init();
    let mut opl3 = ChannelAllocator::new(RecordingBus::new(), DEFAULT_IO_BASE);
    opl3.init();
    opl3.bus_mut().clear();
    opl3
}

/// Every physical channel sits in exactly one pool and the pool counts agree
fn assert_pools_consistent(opl3: &ChannelAllocator<RecordingBus>, held: &[LogicalChannel]) {
    let mut free_two = 0;
    let mut free_four_halves = 0;
    for n in 0..18 {
        match opl3.channel_status(n) {
            Some(ChannelStatus::FreeTwoOp) => free_two += 1,
            Some(ChannelStatus::FreeFourOp) => free_four_halves += 1,
            Some(_) => {}
            None => panic!("channel {} has no status", n),
        }
    }
    assert_eq!(free_two, opl3.free_two_op_count());
    assert_eq!(free_four_halves, opl3.free_four_op_count() * 2);

    let held_equivalents: usize = held
        .iter()
        .filter_map(|c| c.physical())
        .map(|n| match opl3.channel_type(LogicalChannel::Physical(n)) {
            ChannelType::FourOp => 2,
            _ => 1,
        })
        .sum();
    let reserved = if opl3.is_percussion_enabled() { 3 } else { 0 };
    assert_eq!(
        held_equivalents + free_two + free_four_halves + reserved,
        18,
        "capacity mismatch with {:?}",
        held
    );

    for (i, a) in held.iter().enumerate() {
        assert!(opl3.is_allocated(*a));
        assert!(held[i + 1..].iter().all(|b| a != b), "{} held twice", a);
    }
}

#[test]
fn test_two_op_priority_order() {
    let mut opl3 = allocator();
    let order: Vec<u8> = (0..18)
        .map(|_| opl3.allocate_channel(ChannelType::TwoOp).unwrap())
        .filter_map(|c| c.physical())
        .collect();
    assert_eq!(
        order,
        vec![15, 16, 17, 0, 3, 1, 4, 2, 5, 9, 12, 10, 13, 11, 14, 6, 7, 8]
    );
    assert_eq!(
        opl3.allocate_channel(ChannelType::TwoOp),
        Err(SynthError::ResourceExhausted(ChannelType::TwoOp))
    );
    assert_eq!(
        opl3.allocate_channel(ChannelType::FourOp),
        Err(SynthError::ResourceExhausted(ChannelType::FourOp))
    );
}

#[test]
fn test_four_op_conversion_writes_mask() {
    let mut opl3 = allocator();

    let first = opl3.allocate_channel(ChannelType::FourOp).unwrap();
    let second = opl3.allocate_channel(ChannelType::FourOp).unwrap();
    assert_eq!(first, LogicalChannel::Physical(11));
    assert_eq!(second, LogicalChannel::Physical(10));
    assert_eq!(opl3.four_op_mask(), 0x30);

    let mask = ChipAddress::new(Port::Secondary, 0x04);
    assert_eq!(opl3.bus().writes_to(mask), vec![0x20, 0x30]);
    assert!(opl3.bus().monitor().is_four_op(11));
    assert_eq!(opl3.channel_status(14), Some(ChannelStatus::Allocated));
    assert_eq!(opl3.channel_type(LogicalChannel::Physical(14)), ChannelType::Null);
    assert_pools_consistent(&opl3, &[first, second]);
}

#[test]
fn test_four_op_pool_breaks_back_into_two_op() {
    let mut opl3 = allocator();

    let four: Vec<_> = (0..6)
        .map(|_| opl3.allocate_channel(ChannelType::FourOp).unwrap())
        .collect();
    assert_eq!(opl3.four_op_mask(), 0x3F);
    assert_eq!(opl3.free_two_op_count(), 6);
    assert_eq!(
        opl3.allocate_channel(ChannelType::FourOp),
        Err(SynthError::ResourceExhausted(ChannelType::FourOp))
    );
    for channel in &four {
        opl3.free_channel(*channel).unwrap();
    }
    assert_eq!(opl3.free_four_op_count(), 6);

    let mut held = Vec::new();
    for _ in 0..7 {
        held.push(opl3.allocate_channel(ChannelType::TwoOp).unwrap());
    }
    // The six plain 2-op channels go first, then the last 4-op pair in
    // priority order (primary 0) is split
    assert_eq!(held[6], LogicalChannel::Physical(0));
    assert_eq!(opl3.four_op_mask(), 0x3E);
    assert_eq!(opl3.channel_status(3), Some(ChannelStatus::FreeTwoOp));
    assert_pools_consistent(&opl3, &held);
}

#[test]
fn test_pool_invariants_hold_under_churn() {
    let mut opl3 = allocator();
    let mut held: Vec<LogicalChannel> = Vec::new();
    let mut seed: u32 = 0x1234_5678;

    for _ in 0..500 {
        seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let pick = (seed >> 16) as usize;
        match pick % 3 {
            0 | 1 if held.len() < 18 => {
                let channel_type = if pick & 0x100 == 0 {
                    ChannelType::TwoOp
                } else {
                    ChannelType::FourOp
                };
                if let Ok(channel) = opl3.allocate_channel(channel_type) {
                    held.push(channel);
                }
            }
            _ if !held.is_empty() => {
                let channel = held.swap_remove(pick % held.len());
                opl3.free_channel(channel).unwrap();
            }
            _ => {}
        }
        assert_pools_consistent(&opl3, &held);
    }
}

#[test]
fn test_frees_for_matches_requested_type() {
    let mut opl3 = allocator();
    opl3.enable_percussion().unwrap();
    let held: Vec<LogicalChannel> = (0..15)
        .map(|_| opl3.allocate_channel(ChannelType::TwoOp).unwrap())
        .collect();
    let kick = opl3.allocate_channel(ChannelType::Kick).unwrap();

    let ch0 = LogicalChannel::Physical(0);
    let ch3 = LogicalChannel::Physical(3);
    let ch15 = LogicalChannel::Physical(15);
    assert!(held.contains(&ch0) && held.contains(&ch3));

    // Any melody channel serves a 2-op request, none serves a drum
    assert!(opl3.frees_for(ch15, ChannelType::TwoOp));
    assert!(!opl3.frees_for(ch15, ChannelType::Kick));
    assert!(opl3.frees_for(kick, ChannelType::Kick));
    assert!(!opl3.frees_for(kick, ChannelType::Snare));
    assert!(!opl3.frees_for(kick, ChannelType::TwoOp));

    // A 2-op half only completes a pair once its partner is free
    assert!(!opl3.frees_for(ch15, ChannelType::FourOp));
    assert!(!opl3.frees_for(ch0, ChannelType::FourOp));
    opl3.free_channel(ch3).unwrap();
    assert!(opl3.frees_for(ch0, ChannelType::FourOp));
    assert!(!opl3.frees_for(ch3, ChannelType::FourOp));

    opl3.free_channel(ch0).unwrap();
    let four = opl3.allocate_channel(ChannelType::FourOp).unwrap();
    assert_eq!(four, ch0);
    assert!(opl3.frees_for(four, ChannelType::FourOp));
    assert!(opl3.frees_for(four, ChannelType::TwoOp));
}

#[test]
fn test_free_invalid_handle_leaves_pools() {
    let mut opl3 = allocator();
    let channel = opl3.allocate_channel(ChannelType::TwoOp).unwrap();
    opl3.free_channel(channel).unwrap();

    assert_eq!(
        opl3.free_channel(channel),
        Err(SynthError::InvalidHandle(channel))
    );
    assert_eq!(
        opl3.free_channel(LogicalChannel::Physical(18)),
        Err(SynthError::InvalidHandle(LogicalChannel::Physical(18)))
    );
    assert_eq!(opl3.free_two_op_count(), 18);
    assert!(opl3.bus().chip_writes().is_empty());
}

#[test]
fn test_percussion_allocation() {
    let mut opl3 = allocator();
    assert_eq!(
        opl3.allocate_channel(ChannelType::Kick),
        Err(SynthError::ResourceExhausted(ChannelType::Kick))
    );

    opl3.enable_percussion().unwrap();
    assert!(opl3.bus().monitor().is_rhythm_mode());
    assert_eq!(opl3.free_two_op_count(), 15);
    assert_eq!(
        opl3.channel_status(7),
        Some(ChannelStatus::PercussionReserved)
    );

    let kick = opl3.allocate_channel(ChannelType::Kick).unwrap();
    assert_eq!(kick, LogicalChannel::Percussion(PercussionRole::Kick));
    assert_eq!(
        opl3.allocate_channel(ChannelType::Kick),
        Err(SynthError::ResourceExhausted(ChannelType::Kick))
    );
    assert_eq!(opl3.operator_count(kick), 2);
    assert_eq!(opl3.operator_type(kick, 1), OperatorType::Carrier);

    opl3.set_frequency(kick, 10_000).unwrap();
    opl3.key_on(kick).unwrap();
    assert_eq!(opl3.bus().monitor().key_state(kick), KeyState::On);
    assert!(matches!(
        opl3.disable_percussion(),
        Err(SynthError::InvalidTransition(_))
    ));

    opl3.key_off(kick).unwrap();
    assert!(matches!(
        opl3.disable_percussion(),
        Err(SynthError::InvalidTransition(_))
    ));
    opl3.free_channel(kick).unwrap();
    opl3.disable_percussion().unwrap();
    assert_eq!(opl3.free_two_op_count(), 18);
}

#[test]
fn test_enable_percussion_refused_while_channel_six_held() {
    let mut opl3 = allocator();
    let held: Vec<_> = (0..16)
        .map(|_| opl3.allocate_channel(ChannelType::TwoOp).unwrap())
        .collect();
    assert_eq!(held[15], LogicalChannel::Physical(6));

    assert!(matches!(
        opl3.enable_percussion(),
        Err(SynthError::InvalidTransition(_))
    ));
    assert!(!opl3.is_percussion_enabled());
}

#[test]
fn test_cymbal_has_no_frequency() {
    let mut opl3 = allocator();
    opl3.enable_percussion().unwrap();
    let cymbal = opl3.allocate_channel(ChannelType::Cymbal).unwrap();
    opl3.bus_mut().clear();

    assert!(matches!(
        opl3.set_frequency(cymbal, 44_000),
        Err(SynthError::Unsupported { .. })
    ));
    assert!(matches!(
        opl3.set_output(cymbal, opl3_synth::Output::Left),
        Err(SynthError::Unsupported { .. })
    ));
    assert!(opl3.bus().chip_writes().is_empty());
}

#[test]
fn test_frequency_and_key_registers() {
    let mut opl3 = allocator();
    let channel = opl3.allocate_channel(ChannelType::TwoOp).unwrap();
    assert_eq!(channel, LogicalChannel::Physical(15));

    // Middle C: 261.63 Hz -> block 3, fnum 689 (0x2B1)
    opl3.set_frequency(channel, 26_163).unwrap();
    opl3.key_on(channel).unwrap();

    let fnum_low = ChipAddress::new(Port::Secondary, 0xA6);
    let key_block = ChipAddress::new(Port::Secondary, 0xB6);
    assert_eq!(opl3.bus().writes_to(fnum_low), vec![0xB1]);
    assert_eq!(opl3.bus().writes_to(key_block), vec![0x0E, 0x2E]);

    opl3.key_off(channel).unwrap();
    assert_eq!(opl3.shadow(Port::Secondary, 0xB6), Some(0x0E));
}

#[test]
fn test_operator_setter_single_write() {
    let mut opl3 = allocator();
    let channel = opl3.allocate_channel(ChannelType::TwoOp).unwrap();
    opl3.bus_mut().clear();

    // Operator 1 of channel 15 is physical operator 33 at offset 0x13
    opl3.set_sustain_level(channel, 1, 5).unwrap();
    opl3.set_release_rate(channel, 1, 7).unwrap();
    assert_eq!(
        opl3.bus().chip_writes(),
        &[
            (ChipAddress::new(Port::Secondary, 0x93), 0x50),
            (ChipAddress::new(Port::Secondary, 0x93), 0x57),
        ]
    );

    assert!(matches!(
        opl3.set_release_rate(channel, 1, 16),
        Err(SynthError::OutOfRange { max: 15, .. })
    ));
    assert!(opl3.set_waveform(channel, 2, 1).is_err());
    assert_eq!(opl3.bus().chip_writes().len(), 2);
    assert_eq!(opl3.operator(channel, 1).unwrap().release_rate, 7);
}

#[test]
fn test_operator_types_follow_algorithm() {
    let mut opl3 = allocator();
    let two = opl3.allocate_channel(ChannelType::TwoOp).unwrap();
    let four = opl3.allocate_channel(ChannelType::FourOp).unwrap();

    assert_eq!(opl3.operator_type(two, 0), OperatorType::Modulator);
    opl3.set_synth_algorithm(two, 1).unwrap();
    assert_eq!(opl3.operator_type(two, 0), OperatorType::Carrier);
    assert_eq!(opl3.operator_type(two, 2), OperatorType::Null);
    assert!(opl3.set_synth_algorithm(two, 2).is_err());

    let roles = |opl3: &ChannelAllocator<RecordingBus>| -> Vec<OperatorType> {
        (0..4).map(|i| opl3.operator_type(four, i)).collect()
    };
    use OperatorType::{Carrier as C, Modulator as M};
    assert_eq!(roles(&opl3), vec![M, M, M, C]);
    opl3.set_synth_algorithm(four, 1).unwrap();
    assert_eq!(roles(&opl3), vec![M, C, M, C]);
    opl3.set_synth_algorithm(four, 2).unwrap();
    assert_eq!(roles(&opl3), vec![C, M, M, C]);
    opl3.set_synth_algorithm(four, 3).unwrap();
    assert_eq!(roles(&opl3), vec![C, M, C, C]);
    assert_eq!(opl3.synth_algorithm(four), Some(3));
}
