use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use midly::{Format, MetaMessage, Smf, Timing, TrackEvent, TrackEventKind};
use opl3_synth::chip::event::StateEvent;
use opl3_synth::{LogicalChannel, MidiEvent, NoteVoiceManager, RecordingBus};
use tracing::{debug, info};

use crate::settings::Settings;

/// Tempo assumed until the first tempo meta event (120 BPM)
const DEFAULT_TEMPO_US: u64 = 500_000;

/// Options of the `play` command
#[derive(Debug, Clone, Copy)]
pub struct PlayOptions {
    pub dump: bool,
    pub tail_ms: u32,
}

/// A channel event placed on the absolute timeline
#[derive(Debug, Clone, Copy, PartialEq)]
struct TimedEvent {
    time_ms: u32,
    event: MidiEvent,
}

/// Chip activity collected while replaying
#[derive(Debug, Default)]
struct Summary {
    events: usize,
    skipped: usize,
    transactions: usize,
    register_writes: usize,
    key_ons: [usize; 23],
    peak_sounding: usize,
    duration_ms: u32,
}

/// Replay a Standard MIDI File through the voice manager
pub fn play(path: &Path, settings: &Settings, options: PlayOptions) -> Result<()> {
    let buf = fs::read(path)
        .with_context(|| format!("failed to open input file: {}", path.display()))?;
    let smf = Smf::parse(&buf).context("failed to parse MIDI file")?;

    let (timeline, skipped) = build_timeline(&smf);
    info!(
        events = timeline.len(),
        skipped,
        format = ?smf.header.format,
        "timeline built"
    );

    let mut synth = NoteVoiceManager::new(
        RecordingBus::with_base(settings.synth.io_base_address),
        settings.synth.clone(),
    );
    synth.init();
    for entry in &settings.patches {
        synth.set_patch(entry.channel, entry.patch);
    }
    drain(&mut synth, 0, false, &mut Summary::default());

    let mut summary = Summary {
        skipped,
        ..Summary::default()
    };
    let mut now = 0_u32;
    for timed in &timeline {
        synth.service(timed.time_ms - now);
        now = timed.time_ms;
        synth.handle_event(timed.event);
        summary.events += 1;
        drain(&mut synth, now, options.dump, &mut summary);
    }

    // Let the last releases run out
    let end = now.saturating_add(options.tail_ms);
    while now < end {
        let step = (end - now).min(10);
        synth.service(step);
        now += step;
        drain(&mut synth, now, options.dump, &mut summary);
    }
    summary.duration_ms = now;

    print_summary(path, &synth, &summary);
    Ok(())
}

/// Flatten the tracks into one timeline in milliseconds
///
/// Parallel files are merged by tick; sequential files play one track
/// after another. Tempo changes apply from their tick on in every track.
fn build_timeline(smf: &Smf) -> (Vec<TimedEvent>, usize) {
    let mut ticked: Vec<(u64, usize, &TrackEventKind)> = Vec::new();
    let mut offset = 0_u64;
    for track in &smf.tracks {
        let end = push_track(&mut ticked, track, offset);
        if smf.header.format == Format::Sequential {
            offset = end;
        }
    }
    // Stable by (tick, arrival) so same-tick events keep track order
    ticked.sort_by_key(|(tick, order, _)| (*tick, *order));

    let mut clock = TickClock::new(smf.header.timing);
    let mut timeline = Vec::new();
    let mut skipped = 0;
    for (tick, _, kind) in ticked {
        let time_ms = clock.to_ms(tick);
        match kind {
            TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                clock.set_tempo(tick, tempo.as_int())
            }
            TrackEventKind::Midi { channel, message } => {
                match MidiEvent::from_message(*channel, *message) {
                    Ok(event) => timeline.push(TimedEvent { time_ms, event }),
                    Err(error) => {
                        debug!(%error, tick, "skipping event");
                        skipped += 1;
                    }
                }
            }
            _ => {}
        }
    }
    (timeline, skipped)
}

/// Append a track's events with absolute ticks, returning its end tick
fn push_track<'a>(
    ticked: &mut Vec<(u64, usize, &'a TrackEventKind<'a>)>,
    track: &'a [TrackEvent<'a>],
    offset: u64,
) -> u64 {
    let mut tick = offset;
    for event in track {
        tick += event.delta.as_int() as u64;
        let order = ticked.len();
        ticked.push((tick, order, &event.kind));
    }
    tick
}

/// Converts absolute ticks to milliseconds through tempo changes
struct TickClock {
    timing: Timing,
    tempo_us: u64,
    anchor_tick: u64,
    anchor_us: u64,
}

impl TickClock {
    fn new(timing: Timing) -> Self {
        Self {
            timing,
            tempo_us: DEFAULT_TEMPO_US,
            anchor_tick: 0,
            anchor_us: 0,
        }
    }

    fn to_us(&self, tick: u64) -> u64 {
        let elapsed = tick.saturating_sub(self.anchor_tick);
        let us = match self.timing {
            Timing::Metrical(ppq) => elapsed * self.tempo_us / (ppq.as_int().max(1) as u64),
            Timing::Timecode(fps, subframes) => {
                let per_second = fps.as_f32() as f64 * subframes.max(1) as f64;
                (elapsed as f64 * 1_000_000.0 / per_second) as u64
            }
        };
        self.anchor_us + us
    }

    fn to_ms(&self, tick: u64) -> u32 {
        (self.to_us(tick) / 1000).min(u32::MAX as u64) as u32
    }

    /// Tempo changes only affect metrical timing
    fn set_tempo(&mut self, tick: u64, tempo_us: u32) {
        self.anchor_us = self.to_us(tick);
        self.anchor_tick = tick;
        self.tempo_us = tempo_us as u64;
    }
}

/// Collect what reached the chip since the last call and clear the bus log
fn drain(
    synth: &mut NoteVoiceManager<RecordingBus>,
    now: u32,
    dump: bool,
    summary: &mut Summary,
) {
    let bus = synth.allocator_mut().bus_mut();
    summary.transactions += bus.transactions().len();
    summary.register_writes += bus.chip_writes().len();
    let events = bus.take_events();
    bus.clear();
    summary.peak_sounding = summary.peak_sounding.max(bus.monitor().sounding());

    for event in events {
        if let StateEvent::KeyOn { channel, .. } = &event {
            summary.key_ons[channel.index()] += 1;
        }
        if dump {
            print_event(now, &event);
        }
    }
}

fn print_event(now: u32, event: &StateEvent) {
    let describe = |tone: &Option<opl3_synth::chip::event::ToneInfo>| match tone {
        Some(tone) => format!(
            "block {} fnum {:4} {:8.2} Hz",
            tone.fnum.block, tone.fnum.f_num, tone.freq_hz
        ),
        None => String::new(),
    };
    match event {
        StateEvent::KeyOn { channel, tone } => {
            println!("{:>9} ms  {:<8} key on   {}", now, channel.to_string(), describe(tone))
        }
        StateEvent::KeyOff { channel } => {
            println!("{:>9} ms  {:<8} key off", now, channel.to_string())
        }
        StateEvent::ToneChange { channel, tone } => println!(
            "{:>9} ms  {:<8} tone     {}",
            now,
            channel.to_string(),
            describe(&Some(*tone))
        ),
    }
}

fn print_summary(path: &Path, synth: &NoteVoiceManager<RecordingBus>, summary: &Summary) {
    let stats = synth.stats();
    let rows: Vec<(&str, String)> = vec![
        ("file", path.display().to_string()),
        (
            "duration",
            format!("{:.3} s", summary.duration_ms as f64 / 1000.0),
        ),
        (
            "events",
            format!("{} (skipped {})", summary.events, summary.skipped),
        ),
        ("notes played", stats.notes_played.to_string()),
        ("notes dropped", stats.dropped.to_string()),
        ("voices stolen", stats.steals.to_string()),
        ("releases expired", stats.expired.to_string()),
        ("peak voices", stats.peak_voices.to_string()),
        ("peak sounding", summary.peak_sounding.to_string()),
        ("bus transactions", summary.transactions.to_string()),
        ("register writes", summary.register_writes.to_string()),
        (
            "4-op mask",
            format!("0x{:02X}", synth.allocator().four_op_mask()),
        ),
    ];

    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Field"), Cell::new("Value")]);
    for (field, value) in rows {
        table.add_row(vec![Cell::new(field), Cell::new(value)]);
    }
    println!("{}", table);

    let mut channels = Table::new();
    channels
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Channel"), Cell::new("Key-ons")]);
    for (index, count) in summary.key_ons.iter().enumerate() {
        if *count == 0 {
            continue;
        }
        let Some(channel) = LogicalChannel::from_index(index) else {
            continue;
        };
        channels.add_row(vec![
            Cell::new(channel),
            Cell::new(count).set_alignment(CellAlignment::Right),
        ]);
    }
    println!();
    println!("{}", channels);
}
