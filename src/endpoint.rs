//! Lifecycle tracking for the connection, session, and receiving link.
//!
//! [`Endpoints`] enforces the nesting discipline of AMQP endpoints: a child
//! may only begin opening once its parent has, and closing always proceeds
//! from the link outwards to the connection.

use std::fmt;

use log::{debug, info, warn};
use thiserror::Error;

use crate::intent::Intent;

/// The three endpoints a receiver manages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// The AMQP connection.
    Connection,
    /// The session on the connection.
    Session,
    /// The receiving link on the session.
    Link,
}

impl EndpointKind {
    /// Endpoints from outermost to innermost.
    pub const ALL: [Self; 3] = [Self::Connection, Self::Session, Self::Link];

    /// Enclosing endpoint, if any.
    #[must_use]
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::Connection => None,
            Self::Session => Some(Self::Connection),
            Self::Link => Some(Self::Session),
        }
    }

    /// Directly nested endpoint, if any.
    #[must_use]
    pub fn child(self) -> Option<Self> {
        match self {
            Self::Connection => Some(Self::Session),
            Self::Session => Some(Self::Link),
            Self::Link => None,
        }
    }

    fn close_intent(self) -> Intent {
        match self {
            Self::Connection => Intent::CloseConnection,
            Self::Session => Intent::CloseSession,
            Self::Link => Intent::CloseLink,
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connection => "connection",
            Self::Session => "session",
            Self::Link => "link",
        })
    }
}

/// Lifecycle state of a single endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EndpointState {
    /// Not yet asked to open.
    #[default]
    Uninitialized,
    /// Open requested locally, not yet confirmed by the peer.
    Opening,
    /// Open on both sides.
    Open,
    /// Close requested locally, not yet confirmed by the peer.
    Closing,
    /// Closed.
    Closed,
}

impl EndpointState {
    /// Returns `true` while the endpoint has begun opening and not begun closing.
    #[must_use]
    pub fn is_active(self) -> bool { matches!(self, Self::Opening | Self::Open) }
}

/// Invalid lifecycle transitions.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    /// The endpoint is not in a state that permits the transition.
    #[error("{kind} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        /// Endpoint being transitioned.
        kind: EndpointKind,
        /// Current state.
        from: EndpointState,
        /// Requested state.
        to: EndpointState,
    },
    /// The enclosing endpoint has not begun opening.
    #[error("{kind} cannot open while {parent} is {state:?}")]
    ParentNotOpen {
        /// Endpoint being opened.
        kind: EndpointKind,
        /// Enclosing endpoint.
        parent: EndpointKind,
        /// State of the enclosing endpoint.
        state: EndpointState,
    },
    /// A nested endpoint must be closed first.
    #[error("{kind} cannot close while {child} is {state:?}")]
    ChildStillOpen {
        /// Endpoint being closed.
        kind: EndpointKind,
        /// Nested endpoint.
        child: EndpointKind,
        /// State of the nested endpoint.
        state: EndpointState,
    },
}

/// Parameters of the open sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenSettings {
    /// Container identity announced on the connection.
    pub container_id: String,
    /// Host name of the peer.
    pub hostname: String,
    /// Name of the receiving link.
    pub link_name: String,
    /// Source node address the link attaches to.
    pub source: String,
}

/// State of the connection, session, and link.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Endpoints {
    connection: EndpointState,
    session: EndpointState,
    link: EndpointState,
}

impl Endpoints {
    /// Create a set of uninitialised endpoints.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Current state of `kind`.
    #[must_use]
    pub fn state(&self, kind: EndpointKind) -> EndpointState {
        match kind {
            EndpointKind::Connection => self.connection,
            EndpointKind::Session => self.session,
            EndpointKind::Link => self.link,
        }
    }

    fn set(&mut self, kind: EndpointKind, to: EndpointState) {
        let slot = match kind {
            EndpointKind::Connection => &mut self.connection,
            EndpointKind::Session => &mut self.session,
            EndpointKind::Link => &mut self.link,
        };
        debug!("endpoint transition: kind={kind}, from={:?}, to={to:?}", *slot);
        *slot = to;
    }

    /// Emit the open sequence for every endpoint.
    ///
    /// The sequence is connection, session, link; nothing is emitted unless
    /// every endpoint is still uninitialised.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::InvalidTransition`] if any endpoint has
    /// already been opened.
    pub fn open_sequence(&mut self, settings: &OpenSettings) -> Result<Vec<Intent>, EndpointError> {
        if let Some(kind) = EndpointKind::ALL
            .into_iter()
            .find(|kind| self.state(*kind) != EndpointState::Uninitialized)
        {
            return Err(EndpointError::InvalidTransition {
                kind,
                from: self.state(kind),
                to: EndpointState::Opening,
            });
        }

        let mut intents = Vec::with_capacity(6);
        self.begin_open(EndpointKind::Connection)?;
        intents.push(Intent::OpenConnection {
            container_id: settings.container_id.clone(),
            hostname: settings.hostname.clone(),
        });
        self.begin_open(EndpointKind::Session)?;
        intents.extend([Intent::CreateSession, Intent::OpenSession]);
        self.begin_open(EndpointKind::Link)?;
        intents.extend([
            Intent::CreateReceiver {
                name: settings.link_name.clone(),
            },
            Intent::SetSource {
                address: settings.source.clone(),
            },
            Intent::OpenLink,
        ]);
        Ok(intents)
    }

    fn begin_open(&mut self, kind: EndpointKind) -> Result<(), EndpointError> {
        if let Some(parent) = kind.parent() {
            let state = self.state(parent);
            if !state.is_active() {
                return Err(EndpointError::ParentNotOpen {
                    kind,
                    parent,
                    state,
                });
            }
        }
        match self.state(kind) {
            EndpointState::Uninitialized => {
                self.set(kind, EndpointState::Opening);
                Ok(())
            }
            from => Err(EndpointError::InvalidTransition {
                kind,
                from,
                to: EndpointState::Opening,
            }),
        }
    }

    /// Emit close intents, innermost first, for every endpoint still active.
    ///
    /// Endpoints that never began opening, or are already closing, are
    /// skipped; calling this twice emits nothing the second time.
    pub fn close_sequence(&mut self) -> Vec<Intent> {
        let mut intents = Vec::with_capacity(3);
        for kind in EndpointKind::ALL.into_iter().rev() {
            match self.begin_close(kind) {
                Ok(true) => intents.push(kind.close_intent()),
                Ok(false) => {}
                Err(error) => {
                    warn!("close sequence halted: error={error}");
                    break;
                }
            }
        }
        intents
    }

    fn begin_close(&mut self, kind: EndpointKind) -> Result<bool, EndpointError> {
        if !self.state(kind).is_active() {
            return Ok(false);
        }
        if let Some(child) = kind.child() {
            let state = self.state(child);
            if state.is_active() {
                return Err(EndpointError::ChildStillOpen { kind, child, state });
            }
        }
        self.set(kind, EndpointState::Closing);
        Ok(true)
    }

    /// Record the peer's confirmation of an open.
    ///
    /// An open confirmation for an endpoint that is already closing is
    /// accepted without changing state.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::InvalidTransition`] unless the endpoint is
    /// opening or closing.
    pub fn on_remote_opened(&mut self, kind: EndpointKind) -> Result<(), EndpointError> {
        match self.state(kind) {
            EndpointState::Opening => {
                self.set(kind, EndpointState::Open);
                Ok(())
            }
            EndpointState::Closing => Ok(()),
            from => Err(EndpointError::InvalidTransition {
                kind,
                from,
                to: EndpointState::Open,
            }),
        }
    }

    /// Record a close from the peer.
    ///
    /// Confirms a local close, or, when the peer initiated it, closes the
    /// endpoint's descendants implicitly and returns the close intents for
    /// the endpoint and every enclosing endpoint still active.
    pub fn on_remote_closed(&mut self, kind: EndpointKind) -> Vec<Intent> {
        match self.state(kind) {
            EndpointState::Closing => {
                self.mark_closed(kind);
                Vec::new()
            }
            EndpointState::Opening | EndpointState::Open => {
                info!("peer closed endpoint: kind={kind}");
                let mut child = kind.child();
                while let Some(nested) = child {
                    if self.state(nested) != EndpointState::Closed {
                        self.set(nested, EndpointState::Closed);
                    }
                    child = nested.child();
                }
                let intents = self.close_sequence();
                self.mark_closed(kind);
                intents
            }
            state => {
                warn!("ignoring remote close: kind={kind}, state={state:?}");
                Vec::new()
            }
        }
    }

    fn mark_closed(&mut self, kind: EndpointKind) {
        let mut current = Some(kind);
        while let Some(endpoint) = current {
            if self.state(endpoint) != EndpointState::Closed {
                self.set(endpoint, EndpointState::Closed);
            }
            current = endpoint.child();
        }
    }

    /// Mark every endpoint closed after the connection was lost.
    pub fn on_transport_closed(&mut self) { self.mark_closed(EndpointKind::Connection); }

    /// Returns `true` while deliveries on the link should be processed.
    #[must_use]
    pub fn accepts_deliveries(&self) -> bool { self.link.is_active() }

    /// Returns `true` once the connection is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.connection == EndpointState::Closed }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn settings() -> OpenSettings {
        OpenSettings {
            container_id: "ReceiveExample".into(),
            hostname: "localhost".into(),
            link_name: "MyReceiver".into(),
            source: "examples".into(),
        }
    }

    #[fixture]
    fn opened(settings: OpenSettings) -> Endpoints {
        let mut endpoints = Endpoints::new();
        endpoints.open_sequence(&settings).expect("fresh endpoints open");
        endpoints
    }

    #[rstest]
    fn open_sequence_is_outermost_first(settings: OpenSettings) {
        let mut endpoints = Endpoints::new();
        let intents = endpoints.open_sequence(&settings).expect("fresh endpoints open");
        assert_eq!(
            intents,
            vec![
                Intent::OpenConnection {
                    container_id: "ReceiveExample".into(),
                    hostname: "localhost".into(),
                },
                Intent::CreateSession,
                Intent::OpenSession,
                Intent::CreateReceiver {
                    name: "MyReceiver".into(),
                },
                Intent::SetSource {
                    address: "examples".into(),
                },
                Intent::OpenLink,
            ]
        );
        for kind in EndpointKind::ALL {
            assert_eq!(endpoints.state(kind), EndpointState::Opening);
        }
    }

    #[rstest]
    fn second_open_sequence_is_rejected(mut opened: Endpoints, settings: OpenSettings) {
        let before = opened.clone();
        assert_eq!(
            opened.open_sequence(&settings),
            Err(EndpointError::InvalidTransition {
                kind: EndpointKind::Connection,
                from: EndpointState::Opening,
                to: EndpointState::Opening,
            })
        );
        assert_eq!(opened, before);
    }

    #[test]
    fn child_cannot_open_before_parent() {
        let mut endpoints = Endpoints::new();
        assert_eq!(
            endpoints.begin_open(EndpointKind::Link),
            Err(EndpointError::ParentNotOpen {
                kind: EndpointKind::Link,
                parent: EndpointKind::Session,
                state: EndpointState::Uninitialized,
            })
        );
    }

    #[rstest]
    fn close_sequence_is_innermost_first_and_runs_once(mut opened: Endpoints) {
        assert_eq!(
            opened.close_sequence(),
            vec![Intent::CloseLink, Intent::CloseSession, Intent::CloseConnection]
        );
        assert!(opened.close_sequence().is_empty());
        assert!(!opened.accepts_deliveries());
    }

    #[test]
    fn nothing_to_close_before_open() {
        assert!(Endpoints::new().close_sequence().is_empty());
    }

    #[test]
    fn parent_cannot_close_over_active_child() {
        let mut endpoints = Endpoints {
            connection: EndpointState::Open,
            session: EndpointState::Open,
            link: EndpointState::Open,
        };
        assert_eq!(
            endpoints.begin_close(EndpointKind::Session),
            Err(EndpointError::ChildStillOpen {
                kind: EndpointKind::Session,
                child: EndpointKind::Link,
                state: EndpointState::Open,
            })
        );
    }

    #[rstest]
    fn remote_open_confirms_opening(mut opened: Endpoints) {
        opened
            .on_remote_opened(EndpointKind::Connection)
            .expect("opening connection may be confirmed");
        assert_eq!(opened.state(EndpointKind::Connection), EndpointState::Open);
        assert_eq!(
            opened.on_remote_opened(EndpointKind::Connection),
            Err(EndpointError::InvalidTransition {
                kind: EndpointKind::Connection,
                from: EndpointState::Open,
                to: EndpointState::Open,
            })
        );
    }

    #[rstest]
    fn remote_close_confirms_local_close(mut opened: Endpoints) {
        opened.close_sequence();
        for kind in [EndpointKind::Link, EndpointKind::Session] {
            assert!(opened.on_remote_closed(kind).is_empty());
            assert_eq!(opened.state(kind), EndpointState::Closed);
        }
        assert!(!opened.is_closed());
        assert!(opened.on_remote_closed(EndpointKind::Connection).is_empty());
        assert!(opened.is_closed());
    }

    #[rstest]
    fn remote_link_detach_closes_everything(mut opened: Endpoints) {
        assert_eq!(
            opened.on_remote_closed(EndpointKind::Link),
            vec![Intent::CloseLink, Intent::CloseSession, Intent::CloseConnection]
        );
        assert_eq!(opened.state(EndpointKind::Link), EndpointState::Closed);
        assert_eq!(opened.state(EndpointKind::Session), EndpointState::Closing);
    }

    #[rstest]
    fn remote_connection_close_implicitly_closes_children(mut opened: Endpoints) {
        assert_eq!(
            opened.on_remote_closed(EndpointKind::Connection),
            vec![Intent::CloseConnection]
        );
        assert!(opened.is_closed());
        assert_eq!(opened.state(EndpointKind::Link), EndpointState::Closed);
    }

    #[rstest]
    fn transport_loss_closes_everything(mut opened: Endpoints) {
        opened.on_transport_closed();
        for kind in EndpointKind::ALL {
            assert_eq!(opened.state(kind), EndpointState::Closed);
        }
        assert!(opened.close_sequence().is_empty());
    }
}
