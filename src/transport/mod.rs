//! Transports deliver protocol events and realise intents.
//!
//! The [`Transport`] trait is the seam between the pure receiver state
//! machine and I/O. [`AmqpTransport`] implements it for AMQP 1.0 over any
//! async byte stream; tests substitute scripted transports.

use async_trait::async_trait;

use crate::{event::Event, intent::Intent};

mod amqp;
pub mod error;
pub mod frame;
pub mod performative;

pub use amqp::{AmqpStream, AmqpTransport, INCOMING_WINDOW, LINK_HANDLE, SESSION_CHANNEL};
pub use error::TransportError;
pub use frame::{DEFAULT_MAX_FRAME_SIZE, Frame, FrameCodec, PROTOCOL_HEADER};

/// Source of events and sink for intents.
///
/// `next_event` must be cancellation safe: the runtime races it against the
/// idle timer and the shutdown signal.
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next event.
    ///
    /// Returns `Ok(None)` once the transport has nothing further to report.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the connection fails.
    async fn next_event(&mut self) -> Result<Option<Event>, TransportError>;

    /// Realise `intent`. Outbound frames may be buffered until
    /// [`flush`](Self::flush).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the intent cannot be carried out.
    async fn apply(&mut self, intent: Intent) -> Result<(), TransportError>;

    /// Write any buffered frames.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the connection fails.
    async fn flush(&mut self) -> Result<(), TransportError>;
}
