//! Top-level error type for running a receiver.

use std::{io, time::Duration};

use thiserror::Error;

use crate::{config::ConfigError, transport::TransportError};

/// Errors returned by [`run`](crate::runtime::run) and the [`Driver`](crate::runtime::Driver).
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// The configuration was rejected before connecting.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The TCP connection could not be established.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// Address dialled.
        address: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// The TCP connection was not established in time.
    #[error("timed out connecting to {address} after {timeout:?}")]
    ConnectTimeout {
        /// Address dialled.
        address: String,
        /// Connect timeout in force.
        timeout: Duration,
    },
    /// The connection failed after it was established.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A notice could not be written to the output.
    #[error("failed to write notice: {0}")]
    Output(#[from] io::Error),
}

/// Result alias used by the runtime.
pub type Result<T> = std::result::Result<T, ReceiverError>;
