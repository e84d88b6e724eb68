//! Protocol events consumed by the receiver.
//!
//! A transport translates whatever it reads off the wire into [`Event`]s and
//! hands them to [`Receiver::handle`](crate::receiver::Receiver::handle) one
//! at a time.

use std::{cmp::Ordering, fmt};

use bytes::Bytes;

use crate::endpoint::EndpointKind;

/// Transfer-level identifier of a delivery on the link.
///
/// Delivery ids are RFC 1982 serial numbers: they wrap at `u32::MAX`, so
/// ordering is defined by [`DeliveryId::serial_cmp`] rather than `Ord`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeliveryId(u32);

impl DeliveryId {
    /// Wrap a raw delivery id.
    #[must_use]
    pub const fn new(id: u32) -> Self { Self(id) }

    /// Raw delivery id.
    #[must_use]
    pub const fn get(self) -> u32 { self.0 }

    /// Compare two ids using serial number arithmetic.
    ///
    /// Returns `None` when the ids are exactly half the number space apart and
    /// the comparison is undefined.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::cmp::Ordering;
    ///
    /// use amqp_receiver::event::DeliveryId;
    ///
    /// let before = DeliveryId::new(u32::MAX);
    /// let after = DeliveryId::new(1);
    /// assert_eq!(after.serial_cmp(before), Some(Ordering::Greater));
    /// ```
    #[must_use]
    pub fn serial_cmp(self, other: Self) -> Option<Ordering> {
        let distance = self.0.wrapping_sub(other.0);
        match distance {
            0 => Some(Ordering::Equal),
            d if d < 1 << 31 => Some(Ordering::Greater),
            d if d > 1 << 31 => Some(Ordering::Less),
            _ => None,
        }
    }

    /// Returns `true` if `self` is `other` or precedes it in serial order.
    #[must_use]
    pub fn is_at_or_before(self, other: Self) -> bool {
        matches!(
            self.serial_cmp(other),
            Some(Ordering::Less | Ordering::Equal)
        )
    }

    /// Returns `true` if `self` lies in the serial range `first..=last`.
    ///
    /// The range may wrap past `u32::MAX`.
    #[must_use]
    pub fn is_within(self, first: Self, last: Self) -> bool {
        first.is_at_or_before(self) && self.is_at_or_before(last)
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// Snapshot of an inbound delivery as seen by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Delivery id assigned by the sender.
    pub id: DeliveryId,
    /// Opaque delivery tag.
    pub tag: Bytes,
    /// Whether buffered payload bytes are available to read.
    pub readable: bool,
    /// Whether more transfer frames are still expected.
    pub partial: bool,
    /// Whether the sender already settled the delivery.
    pub settled: bool,
    /// Buffered, not yet read, payload bytes.
    pub payload: Bytes,
}

impl Delivery {
    /// Create a readable, complete, unsettled delivery carrying `payload`.
    #[must_use]
    pub fn complete(id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            id: DeliveryId::new(id),
            tag: Bytes::copy_from_slice(&id.to_be_bytes()),
            readable: true,
            partial: false,
            settled: false,
            payload: payload.into(),
        }
    }

    /// Mark the delivery as still receiving frames.
    #[must_use]
    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    /// Mark the delivery as already settled by the sender.
    #[must_use]
    pub fn presettled(mut self) -> Self {
        self.settled = true;
        self
    }

    /// Size of the buffered payload.
    #[must_use]
    pub fn pending_bytes(&self) -> usize { self.payload.len() }

    /// Returns `true` once the delivery may be processed.
    #[must_use]
    pub fn is_ready(&self) -> bool { self.readable && !self.partial }
}

/// Error condition carried by a remote close.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteError {
    /// Symbolic error condition, e.g. `amqp:not-found`.
    pub condition: String,
    /// Optional human readable description.
    pub description: Option<String>,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {description}", self.condition),
            None => f.write_str(&self.condition),
        }
    }
}

/// A discrete protocol event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// The transport is connected and ready for the open sequence.
    ConnectionInit,
    /// The peer answered an open request for an endpoint.
    RemoteOpened(EndpointKind),
    /// A delivery changed state on the receiving link.
    DeliveryReady {
        /// Delivery snapshot.
        delivery: Delivery,
        /// Credit outstanding on the link when the delivery arrived.
        link_credit: u32,
    },
    /// The peer closed an endpoint.
    RemoteClosed {
        /// Endpoint closed by the peer.
        kind: EndpointKind,
        /// Error condition, if the close carried one.
        error: Option<RemoteError>,
    },
    /// External cancellation was requested.
    Interrupt,
    /// The underlying connection ended.
    TransportClosed,
    /// Any event not relevant to a receiving link.
    Other(&'static str),
}

impl Event {
    /// Short name used in log messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionInit => "connection-init",
            Self::RemoteOpened(_) => "remote-opened",
            Self::DeliveryReady { .. } => "delivery-ready",
            Self::RemoteClosed { .. } => "remote-closed",
            Self::Interrupt => "interrupt",
            Self::TransportClosed => "transport-closed",
            Self::Other(name) => name,
        }
    }
}
