//! `amqp-receiver` binary.
//!
//! Parses the command line, connects to the peer, and prints each received
//! message until the requested count arrives or Ctrl-C is pressed.

mod cli;

use std::{process::ExitCode, time::Duration};

use amqp_receiver::{ReceiverConfig, run};
use clap::{CommandFactory, Parser, error::ErrorKind};

fn config_from_cli(cli: cli::Cli) -> ReceiverConfig {
    ReceiverConfig::default()
        .with_address(cli.address)
        .with_count(cli.count)
        .with_source(cli.source)
        .with_container_id(cli.container_id)
        .with_link_name(cli.link_name)
        .with_quiet(cli.quiet)
        .with_credit_window(cli.credit_window)
        .with_idle_timeout(Duration::from_millis(cli.idle_timeout_ms))
        .with_max_read_bytes(cli.max_read_bytes)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Stdout carries message notices; diagnostics go to stderr.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = config_from_cli(cli::Cli::parse());
    if let Err(error) = config.validate() {
        cli::Cli::command()
            .error(ErrorKind::ValueValidation, error)
            .exit();
    }

    match run(&config).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("amqp-receiver: {error}");
            ExitCode::FAILURE
        }
    }
}
