//! Command line interface for the `amqp-receiver` binary.
//!
//! Kept free of crate dependencies so the build script can include it to
//! render the man page.

use clap::Parser;

/// Command line arguments for the `amqp-receiver` binary.
#[derive(Debug, Parser)]
#[command(
    name = "amqp-receiver",
    version,
    about = "Receive messages from an AMQP 1.0 source node"
)]
pub struct Cli {
    /// Address of the peer as `host[:port]`.
    #[arg(short = 'a', long, default_value = "localhost")]
    pub address: String,

    /// Number of messages to receive; 0 receives until interrupted.
    #[arg(short = 'c', long, default_value_t = 1)]
    pub count: u64,

    /// Source node address to receive from.
    #[arg(short = 's', long, default_value = "examples")]
    pub source: String,

    /// Container identity announced to the peer.
    #[arg(short = 'i', long = "container", default_value = "ReceiveExample")]
    pub container_id: String,

    /// Suppress per-message output.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Credit window: maximum deliveries outstanding at once.
    #[arg(
        short = 'f',
        long = "credit",
        default_value_t = 100,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub credit_window: u32,

    /// Name of the receiving link.
    #[arg(long, default_value = "MyReceiver")]
    pub link_name: String,

    /// Milliseconds to wait for activity between liveness checks.
    #[arg(long, default_value_t = 5000)]
    pub idle_timeout_ms: u64,

    /// Payload bytes read per delivery for display.
    #[arg(long, default_value_t = 512)]
    pub max_read_bytes: usize,
}
