//! Side effects requested by the receiver.
//!
//! The receiver never performs I/O. Each call to
//! [`Receiver::handle`](crate::receiver::Receiver::handle) returns an ordered
//! list of [`Intent`]s that the transport realises in sequence.

use std::fmt;

use crate::event::DeliveryId;

/// Operator-facing report produced while processing deliveries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// The delivery body was a single string.
    Message(String),
    /// The delivery was received but carried no printable body.
    Received,
    /// The payload exceeded the read buffer and was cut short.
    Truncated {
        /// Delivery whose payload was truncated.
        delivery: DeliveryId,
        /// Bytes read for decoding.
        read: usize,
        /// Bytes buffered for the delivery.
        pending: usize,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(text) => write!(f, "Message: [{text}]"),
            Self::Received => f.write_str("Message received!"),
            Self::Truncated {
                delivery,
                read,
                pending,
            } => write!(
                f,
                "Message truncated: delivery {delivery}, read {read} of {pending} bytes"
            ),
        }
    }
}

/// A single action for the transport to carry out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    /// Open the connection.
    OpenConnection {
        /// Container identity to announce.
        container_id: String,
        /// Host name of the peer.
        hostname: String,
    },
    /// Create the session on the connection.
    CreateSession,
    /// Open the session.
    OpenSession,
    /// Create the receiving link on the session.
    CreateReceiver {
        /// Link name.
        name: String,
    },
    /// Set the source node address of the receiving link.
    SetSource {
        /// Source node address.
        address: String,
    },
    /// Open the receiving link.
    OpenLink,
    /// Set the link's outstanding credit to `credit`.
    Flow {
        /// New outstanding credit.
        credit: u32,
    },
    /// Read up to `max_bytes` of the delivery's payload.
    Recv {
        /// Delivery to read from.
        delivery: DeliveryId,
        /// Read buffer size.
        max_bytes: usize,
    },
    /// Update the delivery's disposition to accepted.
    Accept {
        /// Delivery to accept.
        delivery: DeliveryId,
    },
    /// Advance the link's delivery cursor past the delivery.
    Advance {
        /// Delivery being released.
        delivery: DeliveryId,
    },
    /// Settle the delivery locally.
    Settle {
        /// Delivery to settle.
        delivery: DeliveryId,
    },
    /// Close the receiving link.
    CloseLink,
    /// Close the session.
    CloseSession,
    /// Close the connection.
    CloseConnection,
    /// Surface a notice to the operator.
    Report(Notice),
}

impl Intent {
    /// Returns `true` for the endpoint close intents.
    #[must_use]
    pub fn is_close(&self) -> bool {
        matches!(self, Self::CloseLink | Self::CloseSession | Self::CloseConnection)
    }
}
