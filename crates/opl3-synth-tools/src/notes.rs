use anyhow::{Result, ensure};
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use opl3_synth::chip::fnumber::{FNumber, note_centihertz};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Scientific pitch name of a MIDI note (60 is C4)
fn note_name(note: u8) -> String {
    let octave = note as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[note as usize % 12], octave)
}

/// Print the block/F-number the allocator programs for each note in `from..=to`.
pub fn print_note_table(from: u8, to: u8) -> Result<()> {
    ensure!(from <= to && to <= 127, "invalid note range {}..={}", from, to);

    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Note"),
            Cell::new("Name"),
            Cell::new("Target Hz"),
            Cell::new("Block"),
            Cell::new("F-Num"),
            Cell::new("Chip Hz"),
            Cell::new("Error cents"),
        ]);

    for note in from..=to {
        let centihertz = note_centihertz(note, 0);
        let fnum = FNumber::from_centihertz(centihertz);
        let target = centihertz as f64 / 100.0;
        let produced = fnum.frequency_hz();
        let error = if produced > 0.0 && target > 0.0 {
            format!("{:+.1}", 1200.0 * (produced / target).log2())
        } else {
            "-".to_string()
        };

        table.add_row(vec![
            Cell::new(note).set_alignment(CellAlignment::Right),
            Cell::new(note_name(note)),
            Cell::new(format!("{:.2}", target)).set_alignment(CellAlignment::Right),
            Cell::new(fnum.block).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} (0x{:03X})", fnum.f_num, fnum.f_num)),
            Cell::new(format!("{:.2}", produced)).set_alignment(CellAlignment::Right),
            Cell::new(error).set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{}", table);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(0), "C-1");
        assert_eq!(note_name(127), "G9");
    }

    #[test]
    fn test_rejects_reversed_range() {
        assert!(print_note_table(70, 60).is_err());
        assert!(print_note_table(0, 128).is_err());
    }
}
