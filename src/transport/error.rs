//! Error types for the AMQP transport.

use std::io;

use thiserror::Error;

use crate::types::DecodeError;

/// Errors raised while talking to the peer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket or codec I/O failure.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// A frame body is not a valid AMQP encoding.
    #[error("malformed frame body: {0}")]
    Decode(#[from] DecodeError),
    /// The peer answered the protocol header with something else.
    #[error("unsupported protocol header: {0:02x?}")]
    ProtocolHeader([u8; 8]),
    /// The frame header is inconsistent.
    #[error("invalid frame header: {reason}")]
    InvalidFrame {
        /// What is wrong with the header.
        reason: &'static str,
    },
    /// A frame exceeds the negotiated maximum size.
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame {
        /// Size announced in the frame header.
        size: usize,
        /// Maximum accepted size.
        max: usize,
    },
    /// A described value that is not a known performative arrived.
    #[error("unknown performative {code:#x}")]
    UnknownPerformative {
        /// Descriptor code found.
        code: u64,
    },
    /// A performative arrived that the receiver cannot act on.
    #[error("unexpected {performative} on channel {channel}")]
    Unexpected {
        /// Performative name.
        performative: &'static str,
        /// Channel the frame arrived on.
        channel: u16,
    },
    /// An intent arrived before the state it depends on.
    #[error("cannot apply {intent}: {reason}")]
    InvalidIntent {
        /// Intent being applied.
        intent: &'static str,
        /// Missing precondition.
        reason: &'static str,
    },
    /// The connection ended before the exchange completed.
    #[error("connection closed by peer")]
    Disconnected,
}
