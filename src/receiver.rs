//! Event dispatch for a single receiving link.
//!
//! [`Receiver`] is a pure state machine: [`Receiver::handle`] consumes one
//! [`Event`] and returns the [`Intent`]s the transport must carry out, in
//! order. It performs no I/O and never blocks.

use log::{debug, info, warn};

use crate::{
    config::{ConfigError, ReceiverConfig},
    context::{ReceiverContext, RunSummary},
    endpoint::{EndpointKind, EndpointState},
    event::{Delivery, Event},
    intent::Intent,
    message::{AmqpMessageDecoder, MessageDecoder},
    processor::DeliveryProcessor,
};

/// Receiving-link state machine.
///
/// # Examples
///
/// ```
/// use amqp_receiver::{Event, Intent, Receiver, ReceiverConfig};
///
/// let mut receiver = Receiver::new(&ReceiverConfig::default()).expect("valid config");
/// let intents = receiver.handle(Event::ConnectionInit);
/// assert_eq!(intents.last(), Some(&Intent::Flow { credit: 100 }));
/// ```
#[derive(Debug)]
pub struct Receiver<D = AmqpMessageDecoder> {
    ctx: ReceiverContext,
    processor: DeliveryProcessor<D>,
}

impl Receiver<AmqpMessageDecoder> {
    /// Create a receiver using the standard message decoder.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` fails validation.
    pub fn new(config: &ReceiverConfig) -> Result<Self, ConfigError> {
        Self::with_decoder(config, AmqpMessageDecoder)
    }
}

impl<D: MessageDecoder> Receiver<D> {
    /// Create a receiver decoding payloads with `decoder`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` fails validation.
    pub fn with_decoder(config: &ReceiverConfig, decoder: D) -> Result<Self, ConfigError> {
        Ok(Self {
            ctx: ReceiverContext::new(config)?,
            processor: DeliveryProcessor::new(decoder),
        })
    }

    /// Handle one event and return the intents it produces.
    pub fn handle(&mut self, event: Event) -> Vec<Intent> {
        match event {
            Event::ConnectionInit => self.on_connection_init(),
            Event::RemoteOpened(kind) => {
                if let Err(error) = self.ctx.endpoints.on_remote_opened(kind) {
                    warn!("ignoring remote open: error={error}");
                }
                Vec::new()
            }
            Event::DeliveryReady {
                delivery,
                link_credit,
            } => self.on_delivery(&delivery, link_credit),
            Event::RemoteClosed { kind, error } => {
                if let Some(error) = error {
                    warn!("peer closed endpoint with error: kind={kind}, error={error}");
                }
                let intents = self.ctx.endpoints.on_remote_closed(kind);
                if !intents.is_empty() {
                    self.ctx.shutdown_requested = true;
                }
                intents
            }
            Event::Interrupt => self.on_shutdown_request(),
            Event::TransportClosed => {
                info!("transport closed, releasing receiver state");
                self.ctx.endpoints.on_transport_closed();
                self.ctx.release();
                Vec::new()
            }
            other @ Event::Other(_) => {
                debug!("ignoring event: kind={}", other.name());
                Vec::new()
            }
        }
    }

    fn on_connection_init(&mut self) -> Vec<Intent> {
        if self.ctx.shutdown_requested {
            warn!("ignoring connection init after shutdown request");
            return Vec::new();
        }
        match self.ctx.endpoints.open_sequence(&self.ctx.settings) {
            Ok(mut intents) => {
                intents.push(self.ctx.credit.grant_initial().into_intent());
                intents
            }
            Err(error) => {
                warn!("ignoring connection init: error={error}");
                Vec::new()
            }
        }
    }

    fn on_delivery(&mut self, delivery: &Delivery, link_credit: u32) -> Vec<Intent> {
        let mut intents = Vec::new();
        self.processor
            .process(&mut self.ctx, delivery, link_credit, &mut intents);
        intents
    }

    fn on_shutdown_request(&mut self) -> Vec<Intent> {
        if self.ctx.shutdown_requested {
            debug!("shutdown already requested");
            return Vec::new();
        }
        info!("shutdown requested");
        self.ctx.shutdown_requested = true;
        self.ctx.endpoints.close_sequence()
    }

    /// Returns `true` once there is nothing left for the receiver to do.
    ///
    /// That is when the connection has closed, or when shutdown was requested
    /// before the connection ever began opening.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        let connection = self.ctx.endpoints.state(EndpointKind::Connection);
        self.ctx.endpoints.is_closed()
            || (self.ctx.shutdown_requested && connection == EndpointState::Uninitialized)
    }

    /// Link state owned by this receiver.
    #[must_use]
    pub fn context(&self) -> &ReceiverContext { &self.ctx }

    /// Counters accumulated so far.
    #[must_use]
    pub fn summary(&self) -> RunSummary { self.ctx.summary() }
}
