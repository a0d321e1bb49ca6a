//! Byte-level register file.
//!
//! Holds the last value written to every register of both register sets,
//! keyed by port-encoded [`ChipAddress`]. Registers that were never written
//! read back as `None`.

use crate::chip::register::ChipAddress;

/// Number of addressable registers across both sets
const REGISTER_SPACE: usize = 0x200;

/// Fixed-size storage of every register value written to the chip
///
/// # Examples
///
/// ```
/// use opl3_synth::chip::register::{ChipAddress, Port};
/// use opl3_synth::chip::storage::RegisterFile;
///
/// let mut file = RegisterFile::default();
/// let address = ChipAddress::new(Port::Secondary, 0x05);
/// file.write(address, 0x01);
/// assert_eq!(file.read(address), Some(0x01));
/// assert_eq!(file.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RegisterFile {
    registers: [Option<u8>; REGISTER_SPACE],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            registers: [None; REGISTER_SPACE],
        }
    }
}

impl RegisterFile {
    /// Record a register write
    pub fn write(&mut self, address: ChipAddress, value: u8) {
        self.registers[address.raw() as usize] = Some(value);
    }

    /// Last value written to `address`
    ///
    /// # Returns
    ///
    /// Some(value) if the register has been written, None otherwise
    pub fn read(&self, address: ChipAddress) -> Option<u8> {
        self.registers[address.raw() as usize]
    }

    /// Forget every written value
    pub fn clear(&mut self) {
        self.registers.fill(None);
    }

    /// Number of registers that have been written
    pub fn len(&self) -> usize {
        self.registers.iter().filter(|r| r.is_some()).count()
    }

    /// Check if no registers have been written
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over every written register in address order
    pub fn iter(&self) -> impl Iterator<Item = (ChipAddress, u8)> + '_ {
        self.registers.iter().enumerate().filter_map(|(raw, value)| {
            let address = ChipAddress::from_raw(raw as u16)?;
            value.map(|v| (address, v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip::register::Port;

    #[test]
    fn test_ports_are_distinct() {
        let mut file = RegisterFile::default();
        file.write(ChipAddress::new(Port::Primary, 0xA0), 0x11);
        file.write(ChipAddress::new(Port::Secondary, 0xA0), 0x22);

        assert_eq!(file.read(ChipAddress::new(Port::Primary, 0xA0)), Some(0x11));
        assert_eq!(file.read(ChipAddress::new(Port::Secondary, 0xA0)), Some(0x22));
        assert_eq!(file.read(ChipAddress::new(Port::Primary, 0xB0)), None);
    }

    #[test]
    fn test_clear_and_iter() {
        let mut file = RegisterFile::default();
        file.write(ChipAddress::new(Port::Secondary, 0x04), 0x3F);
        file.write(ChipAddress::new(Port::Primary, 0xBD), 0x20);

        let written: Vec<_> = file.iter().map(|(a, v)| (a.raw(), v)).collect();
        assert_eq!(written, vec![(0x0BD, 0x20), (0x104, 0x3F)]);

        file.clear();
        assert!(file.is_empty());
    }
}
