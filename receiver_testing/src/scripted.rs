//! In-memory [`Transport`] replaying a fixed list of events.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use amqp_receiver::{
    EndpointKind,
    Event,
    Intent,
    transport::{Transport, TransportError},
};
use async_trait::async_trait;

/// Shared record of what a [`ScriptedTransport`] was asked to do.
#[derive(Clone, Debug, Default)]
pub struct TransportLog {
    inner: Arc<Mutex<LogInner>>,
}

#[derive(Debug, Default)]
struct LogInner {
    applied: Vec<Intent>,
    flushes: usize,
}

impl TransportLog {
    fn lock(&self) -> std::sync::MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Intents applied so far, in order.
    pub fn applied(&self) -> Vec<Intent> { self.lock().applied.clone() }

    /// Number of times the transport was flushed.
    pub fn flushes(&self) -> usize { self.lock().flushes }

    /// Applied intents that close an endpoint, in order.
    pub fn closes(&self) -> Vec<Intent> {
        self.lock()
            .applied
            .iter()
            .filter(|intent| intent.is_close())
            .cloned()
            .collect()
    }
}

/// What the transport does once the script runs out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WhenDrained {
    /// Report the end of the transport with `Ok(None)`.
    #[default]
    End,
    /// Report [`Event::TransportClosed`], then end.
    Close,
    /// Never produce another event.
    Stall,
}

/// Transport that replays scripted events and records applied intents.
///
/// With [`answering_peer`](Self::answering_peer) it also plays a cooperative
/// peer: every open or close request is answered with the matching remote
/// event before the next scripted one.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: VecDeque<Event>,
    replies: VecDeque<Event>,
    answer: bool,
    when_drained: WhenDrained,
    closed: bool,
    log: TransportLog,
}

impl ScriptedTransport {
    /// Replay `events` in order.
    pub fn new(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            script: events.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Answer open and close intents like a cooperative peer.
    #[must_use]
    pub fn answering_peer(mut self) -> Self {
        self.answer = true;
        self
    }

    /// Choose the behaviour once the script is exhausted.
    #[must_use]
    pub fn when_drained(mut self, when_drained: WhenDrained) -> Self {
        self.when_drained = when_drained;
        self
    }

    /// Handle onto the record of applied intents.
    pub fn log(&self) -> TransportLog { self.log.clone() }

    fn reply_to(intent: &Intent) -> Option<Event> {
        let opened = |kind| Some(Event::RemoteOpened(kind));
        let closed = |kind| {
            Some(Event::RemoteClosed {
                kind,
                error: None,
            })
        };
        match intent {
            Intent::OpenConnection { .. } => opened(EndpointKind::Connection),
            Intent::OpenSession => opened(EndpointKind::Session),
            Intent::OpenLink => opened(EndpointKind::Link),
            Intent::CloseLink => closed(EndpointKind::Link),
            Intent::CloseSession => closed(EndpointKind::Session),
            Intent::CloseConnection => closed(EndpointKind::Connection),
            _ => None,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn next_event(&mut self) -> Result<Option<Event>, TransportError> {
        if let Some(event) = self.replies.pop_front().or_else(|| self.script.pop_front()) {
            return Ok(Some(event));
        }
        match self.when_drained {
            WhenDrained::End => Ok(None),
            WhenDrained::Close if !self.closed => {
                self.closed = true;
                Ok(Some(Event::TransportClosed))
            }
            WhenDrained::Close => Ok(None),
            WhenDrained::Stall => std::future::pending().await,
        }
    }

    async fn apply(&mut self, intent: Intent) -> Result<(), TransportError> {
        if self.answer {
            self.replies.extend(Self::reply_to(&intent));
        }
        self.log.lock().applied.push(intent);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.log.lock().flushes += 1;
        Ok(())
    }
}
