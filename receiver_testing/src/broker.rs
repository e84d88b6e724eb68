//! Minimal AMQP 1.0 sending peer for end-to-end tests.
//!
//! [`MockBroker`] accepts one connection, answers the open sequence, sends
//! its queued messages as the receiver grants credit, and records every
//! disposition and close it sees.

use std::{io, net::SocketAddr};

use amqp_receiver::{
    message::Message,
    transport::{
        Frame,
        FrameCodec,
        PROTOCOL_HEADER,
        TransportError,
        performative::{Attach, Begin, Detach, Disposition, Open, Performative, Role, Transfer},
    },
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_util::codec::Framed;

/// What the broker observed during one connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BrokerLog {
    /// Transfers sent to the receiver.
    pub sent: usize,
    /// Dispositions received, in order.
    pub dispositions: Vec<Disposition>,
    /// Names of the close performatives received, in order.
    pub closes: Vec<&'static str>,
    /// Source address requested by the receiver's attach.
    pub source: Option<String>,
}

/// Scripted sending peer.
#[derive(Clone, Debug, Default)]
pub struct MockBroker {
    messages: Vec<Message>,
    presettled: bool,
    chunk: Option<usize>,
    initial_delivery_count: u32,
}

impl MockBroker {
    /// Broker that sends `messages` in order.
    pub fn new(messages: impl IntoIterator<Item = Message>) -> Self {
        Self {
            messages: messages.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Broker sending `count` text messages numbered from 1.
    pub fn numbered(count: usize) -> Self {
        Self::new((1..=count).map(|n| Message::text(format!("message {n}"))))
    }

    /// Send every delivery already settled.
    #[must_use]
    pub fn presettled(mut self) -> Self {
        self.presettled = true;
        self
    }

    /// Split each payload into transfer frames of at most `chunk` bytes.
    #[must_use]
    pub fn chunked(mut self, chunk: usize) -> Self {
        self.chunk = Some(chunk.max(1));
        self
    }

    /// Start the link's delivery count at `count` instead of 0.
    #[must_use]
    pub fn with_initial_delivery_count(mut self, count: u32) -> Self {
        self.initial_delivery_count = count;
        self
    }

    /// Bind to an ephemeral localhost port and serve one connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn spawn(
        self,
    ) -> io::Result<(SocketAddr, JoinHandle<Result<BrokerLog, TransportError>>)> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await?;
            self.serve(stream).await
        });
        Ok((addr, handle))
    }

    async fn serve(self, mut stream: TcpStream) -> Result<BrokerLog, TransportError> {
        let mut header = [0u8; 8];
        stream.read_exact(&mut header).await?;
        if header != PROTOCOL_HEADER {
            return Err(TransportError::ProtocolHeader(header));
        }
        stream.write_all(&PROTOCOL_HEADER).await?;

        let mut framed = Framed::new(stream, FrameCodec::default());
        let mut log = BrokerLog::default();
        let mut delivery_count = self.initial_delivery_count;
        let mut credit_limit = delivery_count;
        let mut next_delivery_id = 0u32;

        while let Some(frame) = framed.next().await.transpose()? {
            if frame.is_heartbeat() {
                continue;
            }
            let (performative, _) = Performative::from_frame(&frame)?;
            match performative {
                Performative::Open(_) => {
                    send(
                        &mut framed,
                        &Performative::Open(Open {
                            container_id: "mock-broker".into(),
                            ..Open::default()
                        }),
                        &[],
                    )
                    .await?;
                }
                Performative::Begin(begin) => {
                    send(
                        &mut framed,
                        &Performative::Begin(Begin {
                            remote_channel: Some(frame.channel),
                            next_outgoing_id: 0,
                            incoming_window: 2048,
                            outgoing_window: 2048,
                            handle_max: begin.handle_max,
                        }),
                        &[],
                    )
                    .await?;
                }
                Performative::Attach(attach) => {
                    log.source = attach.source.as_ref().and_then(|s| s.address.clone());
                    send(
                        &mut framed,
                        &Performative::Attach(Attach {
                            role: Role::Sender,
                            initial_delivery_count: Some(self.initial_delivery_count),
                            ..attach
                        }),
                        &[],
                    )
                    .await?;
                }
                Performative::Flow(flow) => {
                    if let Some(credit) = flow.link_credit {
                        credit_limit = flow
                            .delivery_count
                            .unwrap_or(self.initial_delivery_count)
                            .wrapping_add(credit);
                    }
                    while delivery_count != credit_limit && log.sent < self.messages.len() {
                        self.transfer(&mut framed, log.sent, next_delivery_id).await?;
                        next_delivery_id = next_delivery_id.wrapping_add(1);
                        delivery_count = delivery_count.wrapping_add(1);
                        log.sent += 1;
                    }
                    SinkExt::<Frame>::flush(&mut framed).await?;
                }
                Performative::Disposition(disposition) => log.dispositions.push(disposition),
                Performative::Detach(detach) => {
                    log.closes.push("detach");
                    send(
                        &mut framed,
                        &Performative::Detach(Detach {
                            closed: true,
                            ..detach
                        }),
                        &[],
                    )
                    .await?;
                }
                Performative::End(_) => {
                    log.closes.push("end");
                    send(&mut framed, &Performative::End(None), &[]).await?;
                }
                Performative::Close(_) => {
                    log.closes.push("close");
                    send(&mut framed, &Performative::Close(None), &[]).await?;
                    break;
                }
                Performative::Transfer(_) => {
                    return Err(TransportError::Unexpected {
                        performative: "transfer",
                        channel: frame.channel,
                    });
                }
            }
        }
        Ok(log)
    }

    async fn transfer(
        &self,
        framed: &mut Framed<TcpStream, FrameCodec>,
        index: usize,
        delivery_id: u32,
    ) -> Result<(), TransportError> {
        let payload = self.messages[index].to_bytes().freeze();
        let chunk = self.chunk.unwrap_or(payload.len()).max(1);
        let mut chunks = payload.chunks(chunk).peekable();
        let mut first = true;
        // An empty payload still needs one transfer.
        if chunks.peek().is_none() {
            return feed(framed, &self.first_transfer(delivery_id, false), &[]).await;
        }
        while let Some(part) = chunks.next() {
            let more = chunks.peek().is_some();
            let transfer = if first {
                self.first_transfer(delivery_id, more)
            } else {
                Performative::Transfer(Transfer {
                    more,
                    ..Transfer::default()
                })
            };
            feed(framed, &transfer, part).await?;
            first = false;
        }
        Ok(())
    }

    fn first_transfer(&self, delivery_id: u32, more: bool) -> Performative {
        Performative::Transfer(Transfer {
            handle: 0,
            delivery_id: Some(delivery_id),
            delivery_tag: Some(Bytes::copy_from_slice(&delivery_id.to_be_bytes())),
            message_format: Some(0),
            settled: Some(self.presettled),
            more,
            aborted: false,
        })
    }
}

async fn feed(
    framed: &mut Framed<TcpStream, FrameCodec>,
    performative: &Performative,
    payload: &[u8],
) -> Result<(), TransportError> {
    framed.feed(performative.to_frame(0, payload)).await
}

async fn send(
    framed: &mut Framed<TcpStream, FrameCodec>,
    performative: &Performative,
    payload: &[u8],
) -> Result<(), TransportError> {
    framed.send(performative.to_frame(0, payload)).await
}
