//! F-number utilities for the YMF262 (OPL3).
//!
//! Frequencies are handled in centihertz (hundredths of a hertz) so that the
//! block/F-number conversion can be done with integer arithmetic only. The
//! chip produces `f_num * 49716 / 2^(20 - block)` Hz at its standard
//! 14.31818 MHz master clock, so each block doubles the ceiling of the
//! previous one starting from 48.48 Hz.
//!
//! # Examples
//!
//! ```rust
//! use opl3_synth::chip::fnumber::{FNumber, note_centihertz};
//!
//! // Middle C
//! let chz = note_centihertz(60, 0);
//! assert_eq!(chz, 26163);
//!
//! let fnum = FNumber::from_centihertz(chz);
//! assert_eq!(fnum.block, 3);
//! assert_eq!(fnum.f_num, 689);
//! ```

use crate::error::{Result, SynthError};

/// Standard YMF262 master clock in Hz
pub const MASTER_CLOCK_HZ: f64 = 14_318_180.0;

/// Largest F-number (10 bits)
pub const MAX_FNUM: u16 = 0x3FF;

/// Largest block value (3 bits)
pub const MAX_BLOCK: u8 = 7;

/// Ceiling of block 0 in centihertz; each following block doubles it
const BLOCK0_CEILING_CHZ: u32 = 4848;

/// Numerator of `fnum = f * 2^(20 - block) / 49716` at block 0, halved
const FNUM_NUMERATOR: u64 = 1 << 19;

/// The 49716 divisor scaled to centihertz (x100) and halved like the
/// numerator
const FNUM_DIVISOR_CHZ: u64 = 49_716 * 50;

/// Below this the produced frequency rounds to zero
const MIN_CHZ: u32 = 3;

/// Above this even block 7 cannot represent the frequency
const MAX_CHZ: u32 = 620_544;

/// Reference pitch (A4, MIDI note 69) in centihertz
const A4_CHZ: f64 = 44_000.0;

/// A block / F-number pair ready to be written to registers 0xA0 and 0xB0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FNumber {
    /// 10-bit F-number
    pub f_num: u16,
    /// Block (octave), 0-7
    pub block: u8,
}

impl FNumber {
    /// Convert a frequency in centihertz to the nearest representable pair
    ///
    /// The block is the smallest one whose ceiling exceeds the target and
    /// the F-number is truncated and clamped to 10 bits.
    pub fn from_centihertz(centihertz: u32) -> Self {
        let block = block_for_centihertz(centihertz);
        Self {
            f_num: fnum_for_centihertz(centihertz, block),
            block,
        }
    }

    /// Frequency this pair produces, in Hz
    pub fn frequency_hz(&self) -> f64 {
        // f_num and block are in range by construction
        fnum_block_to_freq(self.f_num as u32, self.block, MASTER_CLOCK_HZ).unwrap_or(0.0)
    }
}

/// Select the block for a frequency given in centihertz
///
/// # Returns
///
/// The smallest block (0-7) whose ceiling exceeds the frequency, or 7
pub fn block_for_centihertz(centihertz: u32) -> u8 {
    let mut ceiling = BLOCK0_CEILING_CHZ;
    for block in 0..MAX_BLOCK {
        if centihertz < ceiling {
            return block;
        }
        ceiling <<= 1;
    }
    MAX_BLOCK
}

/// Compute the F-number for a frequency in centihertz within `block`
///
/// # Arguments
///
/// * `centihertz` - Target frequency in hundredths of a hertz
/// * `block` - Block the F-number is relative to (0-7)
///
/// # Returns
///
/// The F-number clamped to 0-1023; 0 for frequencies below 0.03 Hz
pub fn fnum_for_centihertz(centihertz: u32, block: u8) -> u16 {
    if centihertz < MIN_CHZ {
        return 0;
    }
    if centihertz > MAX_CHZ {
        return MAX_FNUM;
    }
    let fnum = centihertz as u64 * (FNUM_NUMERATOR >> (block & MAX_BLOCK)) / FNUM_DIVISOR_CHZ;
    fnum.min(MAX_FNUM as u64) as u16
}

/// Frequency of a MIDI note, detuned by `cents`, in centihertz
///
/// Equal temperament around A4 = 440 Hz (note 69). Detuning below note 0
/// gives 0.
pub fn note_centihertz(note: u8, cents: i16) -> u32 {
    let absolute = note as i32 * 100 + cents as i32;
    if absolute < 0 {
        return 0;
    }
    let semitones = (absolute - 6900) as f64 / 1200.0;
    (A4_CHZ * semitones.exp2()).round() as u32
}

/// Compute the produced frequency (Hz) for `f_num` and `block`
///
/// # Arguments
///
/// * `f_num` - F-number (0-1023)
/// * `block` - Block (0-7)
/// * `master_clock_hz` - Chip master clock
///
/// # Returns
///
/// `OutOfRange` for an F-number or block that does not fit the register,
/// or a non-positive master clock
pub fn fnum_block_to_freq(f_num: u32, block: u8, master_clock_hz: f64) -> Result<f64> {
    if !master_clock_hz.is_finite() || master_clock_hz <= 0.0 {
        return Err(SynthError::OutOfRange {
            field: "master_clock_hz",
            value: 0,
            max: u32::MAX,
        });
    }
    if f_num > MAX_FNUM as u32 {
        return Err(SynthError::OutOfRange {
            field: "f_num",
            value: f_num,
            max: MAX_FNUM as u32,
        });
    }
    if block > MAX_BLOCK {
        return Err(SynthError::OutOfRange {
            field: "block",
            value: block as u32,
            max: MAX_BLOCK as u32,
        });
    }
    Ok(f_num as f64 * master_clock_hz / (288.0 * 2_f64.powi(20 - block as i32)))
}
