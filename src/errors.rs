//! Error types for Suraxit protocol operations.
//!
//! Decode failures are kept in their own enum because the relay treats them
//! as drop reasons rather than faults; everything else folds into
//! [`SuraxitError`].

use std::io;

/// Result type alias for Suraxit operations
pub type Result<T> = std::result::Result<T, SuraxitError>;

/// Why a received frame could not be turned into a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Fewer bytes than the packet variant's fixed size
    #[error("truncated buffer: need {expected} bytes, got {received}")]
    TruncatedBuffer { expected: usize, received: usize },

    /// First byte is not Emergency, Ack or Heartbeat
    #[error("unknown packet type: {0:#04x}")]
    UnknownPacketType(u8),
}

/// Suraxit protocol error enumeration
#[derive(Debug, thiserror::Error)]
pub enum SuraxitError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Radio or socket failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Caller-supplied buffer cannot hold the encoded packet
    #[error("buffer too small: required {required}, available {available}")]
    BufferTooSmall { required: usize, available: usize },

    /// Frame exceeds the radio payload limit
    #[error("frame too large: {size} bytes exceeds {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("invalid MAC address: {0}")]
    InvalidMacAddress(String),

    /// Battery percentage above 100 that is not the unknown sentinel
    #[error("invalid battery level: {0}")]
    InvalidBatteryLevel(u8),

    /// The other end of a node channel has gone away
    #[error("channel closed")]
    ChannelClosed,
}
