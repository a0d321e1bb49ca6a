//! Register bus abstraction.
//!
//! The chip sits behind two index/data I/O address pairs. How bytes reach
//! those addresses (ISA cycles, a shift register, an emulator) is not this
//! crate's concern: everything goes through [`RegisterBus`].

use std::collections::VecDeque;

use crate::chip::event::StateEvent;
use crate::chip::monitor::ChipMonitor;
use crate::chip::register::{ChipAddress, DEFAULT_IO_BASE};

/// Synchronous byte-wide I/O bus
///
/// Writes are fire-and-forget; the chip gives no acknowledgement and its
/// registers cannot be read back. Only the status register is readable.
pub trait RegisterBus {
    /// Write `data` to I/O address `address`
    fn write(&mut self, address: u16, data: u8);

    /// Read one byte from I/O address `address`
    fn read(&mut self, address: u16) -> u8;
}

impl<B: RegisterBus + ?Sized> RegisterBus for &mut B {
    fn write(&mut self, address: u16, data: u8) {
        (**self).write(address, data)
    }

    fn read(&mut self, address: u16) -> u8 {
        (**self).read(address)
    }
}

impl<B: RegisterBus + ?Sized> RegisterBus for Box<B> {
    fn write(&mut self, address: u16, data: u8) {
        (**self).write(address, data)
    }

    fn read(&mut self, address: u16) -> u8 {
        (**self).read(address)
    }
}

/// One I/O cycle seen by a [`RecordingBus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusTransaction {
    Write { address: u16, data: u8 },
    Read { address: u16, data: u8 },
}

/// Value returned by reads when nothing was queued (an undriven bus)
const FLOATING_BUS: u8 = 0xFF;

/// A [`RegisterBus`] that records every cycle and decodes it through a
/// [`ChipMonitor`]
///
/// Reads return queued values in order, then `0xFF`.
#[derive(Debug, Clone)]
pub struct RecordingBus {
    transactions: Vec<BusTransaction>,
    chip_writes: Vec<(ChipAddress, u8)>,
    events: Vec<StateEvent>,
    reads: VecDeque<u8>,
    monitor: ChipMonitor,
}

impl Default for RecordingBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBus {
    /// Recording bus decoding a chip at the default base address (0x388)
    pub fn new() -> Self {
        Self::with_base(DEFAULT_IO_BASE)
    }

    /// Recording bus decoding a chip at `io_base`
    pub fn with_base(io_base: u16) -> Self {
        Self {
            transactions: Vec::new(),
            chip_writes: Vec::new(),
            events: Vec::new(),
            reads: VecDeque::new(),
            monitor: ChipMonitor::new(io_base),
        }
    }

    /// Queue a value for a future read
    pub fn queue_read(&mut self, data: u8) {
        self.reads.push_back(data);
    }

    /// Every I/O cycle since the last [`RecordingBus::clear`]
    pub fn transactions(&self) -> &[BusTransaction] {
        &self.transactions
    }

    /// Decoded register writes since the last clear
    pub fn chip_writes(&self) -> &[(ChipAddress, u8)] {
        &self.chip_writes
    }

    /// Values written to one register, oldest first
    pub fn writes_to(&self, address: ChipAddress) -> Vec<u8> {
        self.chip_writes
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Drain the key/tone events decoded so far
    pub fn take_events(&mut self) -> Vec<StateEvent> {
        std::mem::take(&mut self.events)
    }

    /// Chip state as reconstructed from the writes
    pub fn monitor(&self) -> &ChipMonitor {
        &self.monitor
    }

    /// Forget recorded cycles, writes and events; chip state is kept
    pub fn clear(&mut self) {
        self.transactions.clear();
        self.chip_writes.clear();
        self.events.clear();
    }
}

impl RegisterBus for RecordingBus {
    fn write(&mut self, address: u16, data: u8) {
        self.transactions
            .push(BusTransaction::Write { address, data });
        if let Some((register, value)) = self.monitor.decode_bus_write(address, data) {
            self.chip_writes.push((register, value));
            if let Some(events) = self.monitor.on_register_write(register, value) {
                self.events.extend(events);
            }
        }
    }

    fn read(&mut self, address: u16) -> u8 {
        let data = self.reads.pop_front().unwrap_or(FLOATING_BUS);
        self.transactions.push(BusTransaction::Read { address, data });
        data
    }
}
