//! Test support for `amqp-receiver`.
//!
//! Provides a serialised log capture fixture, a [`ScriptedTransport`] that
//! replays events into a [`Driver`](amqp_receiver::Driver), and a
//! [`MockBroker`] that speaks enough AMQP 1.0 to exercise the real transport
//! end to end.
//!
//! ```rust,no_run
//! use amqp_receiver::{Event, Receiver, ReceiverConfig, runtime::Driver};
//! use amqp_receiver_testing::ScriptedTransport;
//!
//! # async fn example() -> amqp_receiver_testing::TestResult {
//! let config = ReceiverConfig::default();
//! let transport = ScriptedTransport::new([Event::ConnectionInit]).answering_peer();
//! let log = transport.log();
//! let receiver = Receiver::new(&config)?;
//! Driver::new(transport, receiver, std::io::sink(), config.idle_timeout())
//!     .run_until(std::future::pending())
//!     .await?;
//! assert!(!log.applied().is_empty());
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod logging;
pub mod scripted;

pub use broker::{BrokerLog, MockBroker};
pub use logging::{LoggerHandle, logger};
pub use scripted::{ScriptedTransport, TransportLog, WhenDrained};

/// Result type for fallible tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
