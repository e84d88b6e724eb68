#![doc(html_root_url = "https://docs.rs/amqp-receiver/latest")]
//! Public API for the `amqp-receiver` library.
//!
//! This crate implements a single-link AMQP 1.0 receiving endpoint. The core
//! is a pure state machine, [`Receiver`], that maps protocol [`Event`]s to
//! ordered [`Intent`]s: it sequences the connection, session, and link
//! lifecycle, keeps link credit topped up, and drives each delivery through
//! decode, acceptance, and settlement. A [`Transport`] realises those intents
//! on the wire and the [`runtime`] ties the two together.

pub mod config;
pub mod context;
pub mod credit;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod intent;
pub mod message;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod processor;
pub mod receiver;
pub mod runtime;
pub mod transport;
pub mod types;

pub use config::{ConfigError, ReceiverConfig, RemainingCount};
pub use context::{ReceiverContext, RunSummary};
pub use credit::{CreditController, CreditGrant};
pub use endpoint::{EndpointError, EndpointKind, EndpointState, Endpoints};
pub use error::ReceiverError;
pub use event::{Delivery, DeliveryId, Event, RemoteError};
pub use intent::{Intent, Notice};
pub use message::{AmqpMessageDecoder, Message, MessageDecoder};
pub use processor::{DeliveryOutcome, DeliveryProcessor};
pub use receiver::Receiver;
pub use runtime::{Driver, run, run_with_shutdown};
pub use transport::{AmqpTransport, Transport, TransportError};
