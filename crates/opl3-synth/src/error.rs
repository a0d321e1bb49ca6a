//! Error types for allocator and event handling.

use crate::allocator::channel::{ChannelType, LogicalChannel};

/// Errors returned by [`crate::ChannelAllocator`] operations.
///
/// Every operation that fails leaves the register cache untouched and
/// performs no bus writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthError {
    #[error("{0} is not an allocated channel")]
    InvalidHandle(LogicalChannel),

    #[error("{field} value {value} is out of range (max {max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    #[error("no free {0:?} channel")]
    ResourceExhausted(ChannelType),

    #[error("transition refused: {0}")]
    InvalidTransition(&'static str),

    #[error("{operation} is not supported on {channel}")]
    Unsupported {
        operation: &'static str,
        channel: LogicalChannel,
    },
}

/// Result alias used throughout the crate
pub type Result<T, E = SynthError> = std::result::Result<T, E>;

/// A MIDI message that has no meaning to the voice manager
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported MIDI event: {0}")]
pub struct UnsupportedEvent(pub String);
