//! Event loop connecting a [`Receiver`] to a [`Transport`].
//!
//! The [`Driver`] waits for the next transport event, bounded by the idle
//! timeout, feeds it to the receiver, and applies the returned intents in
//! order before flushing. A shutdown future is mapped to a single
//! [`Event::Interrupt`]; since each event is handled to completion before the
//! next wait, an in-flight delivery always finishes settling first.

use std::{future::Future, io::Write, time::Duration};

use tokio::{net::TcpStream, time::timeout};
use tracing::{Instrument, debug, info, warn};

use crate::{
    config::ReceiverConfig,
    context::RunSummary,
    error::{ReceiverError, Result},
    event::Event,
    intent::Intent,
    message::MessageDecoder,
    receiver::Receiver,
    transport::{AmqpTransport, FrameCodec, Transport},
};

enum Wake {
    Shutdown,
    Event(Option<Event>),
    Idle,
}

/// Drives one receiver over one transport until it finishes.
#[derive(Debug)]
pub struct Driver<T, D, W> {
    transport: T,
    receiver: Receiver<D>,
    output: W,
    idle_timeout: Duration,
}

impl<T, D, W> Driver<T, D, W>
where
    T: Transport,
    D: MessageDecoder,
    W: Write,
{
    /// Create a driver writing notices to `output`.
    pub fn new(transport: T, receiver: Receiver<D>, output: W, idle_timeout: Duration) -> Self {
        Self {
            transport,
            receiver,
            output,
            idle_timeout,
        }
    }

    /// Run until the receiver finishes or the transport ends.
    ///
    /// `shutdown` resolving requests a graceful close; the loop keeps running
    /// until the peer confirms it or a further idle timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::Transport`] when the connection fails and
    /// [`ReceiverError::Output`] when a notice cannot be written.
    pub async fn run_until<S>(mut self, shutdown: S) -> Result<RunSummary>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut interrupted = false;
        while !self.receiver.is_finished() {
            let wake = tokio::select! {
                biased;

                () = &mut shutdown, if !interrupted => Wake::Shutdown,
                event = self.transport.next_event() => match event {
                    Ok(event) => Wake::Event(event),
                    Err(error) => {
                        warn!(%error, "transport failed");
                        return Err(error.into());
                    }
                },
                () = tokio::time::sleep(self.idle_timeout) => Wake::Idle,
            };
            match wake {
                Wake::Shutdown => {
                    info!("interrupt received");
                    interrupted = true;
                    self.dispatch(Event::Interrupt).await?;
                }
                Wake::Event(Some(event)) => {
                    let closed = event == Event::TransportClosed;
                    self.dispatch(event).await?;
                    if closed {
                        break;
                    }
                }
                Wake::Event(None) => {
                    debug!("transport ended");
                    break;
                }
                Wake::Idle if self.receiver.context().shutdown_requested() => {
                    warn!(
                        idle_timeout_ms = self.idle_timeout.as_millis(),
                        "peer did not confirm close"
                    );
                    break;
                }
                Wake::Idle => debug!(
                    idle_timeout_ms = self.idle_timeout.as_millis(),
                    "idle tick"
                ),
            }
        }
        let summary = self.receiver.summary();
        info!(
            settled = summary.deliveries_settled,
            decode_failures = summary.decode_failures,
            truncated = summary.truncated,
            "receiver finished"
        );
        Ok(summary)
    }

    async fn dispatch(&mut self, event: Event) -> Result<()> {
        let intents = self.receiver.handle(event);
        if intents.is_empty() {
            return Ok(());
        }
        for intent in intents {
            match intent {
                Intent::Report(notice) => writeln!(self.output, "{notice}")?,
                intent => self.transport.apply(intent).await?,
            }
        }
        self.output.flush()?;
        self.transport.flush().await?;
        Ok(())
    }

    /// Receiver driven by this loop.
    #[must_use]
    pub fn receiver(&self) -> &Receiver<D> { &self.receiver }
}

/// Connect to the configured peer and receive until done or Ctrl-C.
///
/// # Errors
///
/// See [`run_with_shutdown`].
pub async fn run(config: &ReceiverConfig) -> Result<RunSummary> {
    run_with_shutdown(config, async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Connect to the configured peer and receive until done or `shutdown`
/// resolves. Notices are written to stdout.
///
/// # Errors
///
/// Returns [`ReceiverError::Config`] for an invalid configuration,
/// [`ReceiverError::Connect`] or [`ReceiverError::ConnectTimeout`] when the
/// peer cannot be reached, and any error of [`Driver::run_until`].
pub async fn run_with_shutdown<S>(config: &ReceiverConfig, shutdown: S) -> Result<RunSummary>
where
    S: Future<Output = ()>,
{
    let receiver = Receiver::new(config)?;
    let (host, port) = config.host_port()?;
    let address = format!("{host}:{port}");
    let span = tracing::info_span!("receiver.run", peer.addr = %address, source = config.source());
    async move {
        let stream = match timeout(config.connect_timeout(), TcpStream::connect((host.as_str(), port)))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ReceiverError::Connect { address, source }),
            Err(_) => {
                return Err(ReceiverError::ConnectTimeout {
                    address,
                    timeout: config.connect_timeout(),
                });
            }
        };
        info!("connected");
        let transport = AmqpTransport::handshake(stream, FrameCodec::default()).await?;
        Driver::new(
            transport,
            receiver,
            std::io::stdout(),
            config.idle_timeout(),
        )
        .run_until(shutdown)
        .await
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tracing_test::traced_test;

    use super::*;
    use crate::transport::TransportError;

    #[derive(Default)]
    struct Replay {
        events: VecDeque<Event>,
        applied: Vec<Intent>,
    }

    #[async_trait]
    impl Transport for Replay {
        async fn next_event(&mut self) -> std::result::Result<Option<Event>, TransportError> {
            Ok(self.events.pop_front())
        }

        async fn apply(&mut self, intent: Intent) -> std::result::Result<(), TransportError> {
            self.applied.push(intent);
            Ok(())
        }

        async fn flush(&mut self) -> std::result::Result<(), TransportError> { Ok(()) }
    }

    struct Failing;

    #[async_trait]
    impl Transport for Failing {
        async fn next_event(&mut self) -> std::result::Result<Option<Event>, TransportError> {
            Err(TransportError::Disconnected)
        }

        async fn apply(&mut self, _: Intent) -> std::result::Result<(), TransportError> { Ok(()) }

        async fn flush(&mut self) -> std::result::Result<(), TransportError> { Ok(()) }
    }

    fn receiver() -> Receiver {
        Receiver::new(&ReceiverConfig::default()).expect("default config is valid")
    }

    #[tokio::test]
    #[traced_test]
    async fn summary_is_logged_on_exit() {
        let transport = Replay {
            events: VecDeque::from([Event::ConnectionInit, Event::TransportClosed]),
            ..Replay::default()
        };
        let driver = Driver::new(transport, receiver(), std::io::sink(), Duration::from_secs(1));
        let summary = driver
            .run_until(std::future::pending())
            .await
            .expect("run");
        assert_eq!(summary, RunSummary::default());
        assert!(logs_contain("receiver finished"));
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let driver = Driver::new(Failing, receiver(), std::io::sink(), Duration::from_secs(1));
        let error = driver
            .run_until(std::future::pending())
            .await
            .expect_err("transport failed");
        assert!(matches!(
            error,
            ReceiverError::Transport(TransportError::Disconnected)
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn invalid_config_fails_before_connecting() {
        let config = ReceiverConfig::default().with_credit_window(0);
        let error = run_with_shutdown(&config, std::future::pending())
            .await
            .expect_err("zero window");
        assert!(matches!(error, ReceiverError::Config(_)));
        assert!(!logs_contain("connected"));
    }

    #[tokio::test]
    #[traced_test]
    async fn connect_failure_is_reported() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        let config = ReceiverConfig::default().with_address(format!("127.0.0.1:{port}"));
        let error = run_with_shutdown(&config, std::future::pending())
            .await
            .expect_err("nothing listening");
        assert!(matches!(error, ReceiverError::Connect { .. }));
    }

    #[test]
    fn driver_exposes_receiver() {
        let driver = Driver::new(
            Replay::default(),
            receiver(),
            std::io::sink(),
            Duration::from_secs(1),
        );
        assert!(!driver.receiver().is_finished());
    }
}
