//! State owned by a single receiving link.

use std::num::NonZeroU32;

use crate::{
    config::{ConfigError, ReceiverConfig, RemainingCount},
    credit::CreditController,
    endpoint::{Endpoints, OpenSettings},
    event::DeliveryId,
    message::Message,
};

/// Counters describing what the receiver has done so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Deliveries accepted (or remotely settled) and settled.
    pub deliveries_settled: u64,
    /// Deliveries whose payload did not decode.
    pub decode_failures: u64,
    /// Deliveries whose payload exceeded the read buffer.
    pub truncated: u64,
}

/// Everything the receiver mutates while handling events.
///
/// `scratch` is only meaningful inside a single delivery's processing; its
/// contents are cleared before every decode.
#[derive(Debug)]
pub struct ReceiverContext {
    pub(crate) endpoints: Endpoints,
    pub(crate) credit: CreditController,
    pub(crate) remaining: RemainingCount,
    pub(crate) settings: OpenSettings,
    pub(crate) quiet: bool,
    pub(crate) max_read_bytes: usize,
    pub(crate) scratch: Message,
    pub(crate) last_settled: Option<DeliveryId>,
    pub(crate) shutdown_requested: bool,
    pub(crate) summary: RunSummary,
}

impl ReceiverContext {
    /// Build the context from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration fails validation.
    pub fn new(config: &ReceiverConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let window = NonZeroU32::new(config.credit_window()).ok_or(ConfigError::ZeroCreditWindow)?;
        let (hostname, _) = config.host_port()?;
        Ok(Self {
            endpoints: Endpoints::new(),
            credit: CreditController::new(window),
            remaining: config.remaining(),
            settings: OpenSettings {
                container_id: config.container_id().to_owned(),
                hostname,
                link_name: config.link_name().to_owned(),
                source: config.source().to_owned(),
            },
            quiet: config.quiet(),
            max_read_bytes: config.max_read_bytes(),
            scratch: Message::new(),
            last_settled: None,
            shutdown_requested: false,
            summary: RunSummary::default(),
        })
    }

    /// Endpoint lifecycle states.
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints { &self.endpoints }

    /// Deliveries still expected before shutdown.
    #[must_use]
    pub fn remaining(&self) -> RemainingCount { self.remaining }

    /// Configured credit window.
    #[must_use]
    pub fn credit_window(&self) -> u32 { self.credit.window() }

    /// Source node address of the link.
    #[must_use]
    pub fn source_address(&self) -> &str { &self.settings.source }

    /// Counters accumulated so far.
    #[must_use]
    pub fn summary(&self) -> RunSummary { self.summary }

    /// Returns `true` once a close sequence has been requested.
    #[must_use]
    pub fn shutdown_requested(&self) -> bool { self.shutdown_requested }

    /// Returns `true` when `id` is not newer than the last settled delivery.
    pub(crate) fn already_settled(&self, id: DeliveryId) -> bool {
        self.last_settled
            .is_some_and(|last| id.is_at_or_before(last))
    }

    /// Drop per-delivery state after the connection has gone.
    pub(crate) fn release(&mut self) {
        self.scratch = Message::new();
        self.last_settled = None;
    }
}
