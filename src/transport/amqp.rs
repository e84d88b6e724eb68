//! AMQP 1.0 transport over a byte stream.
//!
//! [`AmqpTransport`] owns the framed connection. It turns inbound frames into
//! [`Event`]s, realises [`Intent`]s as outbound frames, and keeps the
//! link-level bookkeeping a receiver needs: link credit, the delivery count,
//! the delivery being assembled from multiple transfer frames, and the map of
//! unsettled deliveries.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};
use tokio_util::codec::Framed;
use tracing::Instrument;

use super::{
    Frame,
    FrameCodec,
    PROTOCOL_HEADER,
    Transport,
    TransportError,
    performative::{
        Attach,
        Begin,
        Detach,
        Disposition,
        Flow,
        Open,
        Outcome,
        Performative,
        Role,
        Terminus,
        Transfer,
    },
};
use crate::{
    endpoint::EndpointKind,
    event::{Delivery, DeliveryId, Event},
    intent::Intent,
};

/// Channel used for the single session.
pub const SESSION_CHANNEL: u16 = 0;

/// Handle used for the single link.
pub const LINK_HANDLE: u32 = 0;

/// Session incoming window announced to the peer.
///
/// Link credit is the only flow control the receiver applies.
pub const INCOMING_WINDOW: u32 = u32::MAX;

/// Session outgoing window announced to the peer.
pub const OUTGOING_WINDOW: u32 = 2048;

/// Largest message accepted on the link unless configured otherwise.
pub const DEFAULT_MAX_MESSAGE_SIZE: u64 = 1024 * 1024;

/// Trait alias for streams the transport can run over.
pub trait AmqpStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T> AmqpStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Delivery being assembled from transfer frames.
#[derive(Debug)]
struct Assembly {
    id: DeliveryId,
    tag: Bytes,
    settled: bool,
    tracked: bool,
    oversized: bool,
    payload: BytesMut,
}

/// Per-delivery state kept until local settlement.
#[derive(Clone, Copy, Debug, Default)]
struct Unsettled {
    remotely_settled: bool,
    outcome: Option<Outcome>,
}

/// Link-level bookkeeping.
#[derive(Debug, Default)]
struct LinkState {
    name: Option<String>,
    source: Option<String>,
    credit: u32,
    delivery_count: u32,
    attached: bool,
    closing: bool,
    flow_deferred: bool,
    last_settled: Option<DeliveryId>,
}

/// Receiver side of an AMQP 1.0 connection with one session and one link.
pub struct AmqpTransport<S = TcpStream> {
    framed: Framed<S, FrameCodec>,
    pending: VecDeque<Event>,
    link: LinkState,
    next_incoming_id: Option<u32>,
    max_message_size: u64,
    assembly: Option<Assembly>,
    unsettled: HashMap<DeliveryId, Unsettled>,
    ended: bool,
}

impl<S> std::fmt::Debug for AmqpTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpTransport")
            .field("link_credit", &self.link.credit)
            .field("delivery_count", &self.link.delivery_count)
            .field("unsettled", &self.unsettled.len())
            .finish_non_exhaustive()
    }
}

impl<S: AmqpStream> AmqpTransport<S> {
    /// Exchange protocol headers over `stream` and wrap it in a transport.
    ///
    /// The first event produced is [`Event::ConnectionInit`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ProtocolHeader`] when the peer answers with
    /// a different header, [`TransportError::Disconnected`] when it hangs up
    /// first, or [`TransportError::Io`] on socket failure.
    pub async fn handshake(mut stream: S, codec: FrameCodec) -> Result<Self, TransportError> {
        async {
            stream.write_all(&PROTOCOL_HEADER).await?;
            stream.flush().await?;
            let mut header = [0u8; 8];
            stream.read_exact(&mut header).await.map_err(|error| {
                if error.kind() == std::io::ErrorKind::UnexpectedEof {
                    TransportError::Disconnected
                } else {
                    TransportError::Io(error)
                }
            })?;
            if header != PROTOCOL_HEADER {
                return Err(TransportError::ProtocolHeader(header));
            }
            tracing::debug!("protocol header accepted");
            Ok::<(), TransportError>(())
        }
        .instrument(tracing::info_span!("transport.handshake"))
        .await?;

        Ok(Self {
            framed: Framed::new(stream, codec),
            pending: VecDeque::from([Event::ConnectionInit]),
            link: LinkState::default(),
            next_incoming_id: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            assembly: None,
            unsettled: HashMap::new(),
            ended: false,
        })
    }

    /// Cap the size of a single delivery, announced to the peer on attach.
    ///
    /// Payload bytes beyond the cap are discarded and the delivery is handed
    /// on truncated.
    #[must_use]
    pub fn with_max_message_size(mut self, max_message_size: u64) -> Self {
        self.max_message_size = max_message_size.max(1);
        self
    }

    /// Link credit currently outstanding.
    #[must_use]
    pub fn link_credit(&self) -> u32 { self.link.credit }

    /// Number of deliveries not yet settled locally.
    #[must_use]
    pub fn unsettled_count(&self) -> usize { self.unsettled.len() }

    async fn send(&mut self, performative: &Performative) -> Result<(), TransportError> {
        tracing::debug!(performative = performative.name(), "sending frame");
        self.framed
            .feed(performative.to_frame(SESSION_CHANNEL, &[]))
            .await
    }

    fn on_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let (performative, payload) = Performative::from_frame(frame)?;
        tracing::debug!(
            performative = performative.name(),
            channel = frame.channel,
            "received frame"
        );
        let event = match performative {
            Performative::Open(open) => {
                debug!(
                    "peer opened connection: container_id={}, max_frame_size={:?}",
                    open.container_id, open.max_frame_size
                );
                Event::RemoteOpened(EndpointKind::Connection)
            }
            Performative::Begin(begin) => {
                self.next_incoming_id = Some(begin.next_outgoing_id);
                Event::RemoteOpened(EndpointKind::Session)
            }
            Performative::Attach(attach) => {
                if attach.role != Role::Sender {
                    return Err(TransportError::Unexpected {
                        performative: "receiver attach",
                        channel: frame.channel,
                    });
                }
                self.link.delivery_count = attach.initial_delivery_count.unwrap_or(0);
                self.link.attached = true;
                if attach.source.is_none() {
                    warn!("peer attached without a source: name={}", attach.name);
                }
                Event::RemoteOpened(EndpointKind::Link)
            }
            Performative::Transfer(transfer) => {
                return self.on_transfer(transfer, payload, frame.channel);
            }
            Performative::Flow(flow) => {
                if let Some(count) = flow.delivery_count {
                    debug!(
                        "peer flow: delivery_count={count}, available={:?}",
                        flow.available
                    );
                }
                Event::Other("flow")
            }
            Performative::Disposition(disposition) => {
                if disposition.settled {
                    let first = DeliveryId::new(disposition.first);
                    let last = DeliveryId::new(disposition.last.unwrap_or(disposition.first));
                    for (id, entry) in &mut self.unsettled {
                        if id.is_within(first, last) {
                            entry.remotely_settled = true;
                        }
                    }
                }
                Event::Other("disposition")
            }
            Performative::Detach(detach) => {
                self.forget_unsettled();
                Event::RemoteClosed {
                    kind: EndpointKind::Link,
                    error: detach.error,
                }
            }
            Performative::End(error) => Event::RemoteClosed {
                kind: EndpointKind::Session,
                error,
            },
            Performative::Close(error) => {
                self.ended = true;
                Event::RemoteClosed {
                    kind: EndpointKind::Connection,
                    error,
                }
            }
        };
        self.pending.push_back(event);
        Ok(())
    }

    fn on_transfer(
        &mut self,
        transfer: Transfer,
        payload: Bytes,
        channel: u16,
    ) -> Result<(), TransportError> {
        if transfer.handle != LINK_HANDLE {
            return Err(TransportError::Unexpected {
                performative: "transfer",
                channel,
            });
        }
        self.next_incoming_id = self.next_incoming_id.map(|id| id.wrapping_add(1));

        let mut assembly = match (self.assembly.take(), transfer.delivery_id) {
            (Some(assembly), None) => assembly,
            (Some(assembly), Some(id)) if assembly.id.get() == id => assembly,
            (previous, Some(id)) => {
                if let Some(previous) = previous {
                    warn!("abandoning incomplete delivery: id={}", previous.id);
                }
                self.link.credit = self.link.credit.saturating_sub(1);
                self.link.delivery_count = self.link.delivery_count.wrapping_add(1);
                let id = DeliveryId::new(id);
                Assembly {
                    id,
                    tag: transfer.delivery_tag.unwrap_or_default(),
                    settled: false,
                    tracked: self.tracks(id),
                    oversized: false,
                    payload: BytesMut::new(),
                }
            }
            (None, None) => {
                return Err(TransportError::Unexpected {
                    performative: "transfer without delivery id",
                    channel,
                });
            }
        };

        if transfer.aborted {
            debug!("delivery aborted: id={}", assembly.id);
            self.pending.push_back(Event::Other("aborted"));
            return Ok(());
        }

        assembly.settled |= transfer.settled.unwrap_or(false);
        self.append(&mut assembly, &payload);
        let delivery = Delivery {
            id: assembly.id,
            tag: assembly.tag.clone(),
            readable: true,
            partial: transfer.more,
            settled: assembly.settled,
            payload: if transfer.more {
                Bytes::new()
            } else {
                assembly.payload.split().freeze()
            },
        };
        if transfer.more {
            self.assembly = Some(assembly);
        } else if assembly.tracked {
            self.unsettled.insert(
                assembly.id,
                Unsettled {
                    remotely_settled: assembly.settled,
                    outcome: None,
                },
            );
        }
        self.pending.push_back(Event::DeliveryReady {
            delivery,
            link_credit: self.link.credit,
        });
        Ok(())
    }

    fn append(&self, assembly: &mut Assembly, payload: &[u8]) {
        let room = usize::try_from(self.max_message_size)
            .unwrap_or(usize::MAX)
            .saturating_sub(assembly.payload.len());
        if payload.len() > room && !assembly.oversized {
            assembly.oversized = true;
            warn!(
                "delivery exceeds max message size, discarding excess: id={}, max={}",
                assembly.id, self.max_message_size
            );
        }
        assembly
            .payload
            .extend_from_slice(&payload[..payload.len().min(room)]);
    }

    /// Returns `true` if a new delivery `id` needs local settlement.
    ///
    /// Deliveries on a closing link, and repeats of settled ids, are never
    /// settled by the receiver.
    fn tracks(&self, id: DeliveryId) -> bool {
        let repeated = self
            .link
            .last_settled
            .is_some_and(|last| id.is_at_or_before(last));
        !self.link.closing && !repeated
    }

    fn forget_unsettled(&mut self) {
        if !self.unsettled.is_empty() {
            debug!("dropping unsettled deliveries: count={}", self.unsettled.len());
            self.unsettled.clear();
        }
    }

    /// Flow state for the link.
    ///
    /// The incoming id and delivery count are only known once the peer's
    /// begin and attach have arrived, and are omitted until then.
    fn flow(&self) -> Flow {
        Flow {
            next_incoming_id: self.next_incoming_id,
            incoming_window: INCOMING_WINDOW,
            next_outgoing_id: 0,
            outgoing_window: OUTGOING_WINDOW,
            handle: Some(LINK_HANDLE),
            delivery_count: self.link.attached.then_some(self.link.delivery_count),
            link_credit: Some(self.link.credit),
            ..Flow::default()
        }
    }

    async fn send_flow(&mut self) -> Result<(), TransportError> {
        let flow = self.flow();
        self.send(&Performative::Flow(flow)).await
    }
}

#[async_trait]
impl<S: AmqpStream> Transport for AmqpTransport<S> {
    async fn next_event(&mut self) -> Result<Option<Event>, TransportError> {
        loop {
            if self.link.flow_deferred && self.link.attached {
                self.send_flow().await?;
                self.link.flow_deferred = false;
                SinkExt::<Frame>::flush(&mut self.framed).await?;
            }
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.ended {
                return Ok(None);
            }
            let Some(frame) = self.framed.next().await.transpose()? else {
                self.ended = true;
                return Ok(Some(Event::TransportClosed));
            };
            if frame.is_heartbeat() {
                tracing::debug!("heartbeat received");
                continue;
            }
            self.on_frame(&frame)?;
        }
    }

    async fn apply(&mut self, intent: Intent) -> Result<(), TransportError> {
        match intent {
            Intent::OpenConnection {
                container_id,
                hostname,
            } => {
                let max_frame_size = u32::try_from(self.framed.codec().max_frame_size()).ok();
                self.send(&Performative::Open(Open {
                    container_id,
                    hostname: Some(hostname),
                    max_frame_size,
                    channel_max: Some(SESSION_CHANNEL),
                    idle_time_out: None,
                }))
                .await?;
            }
            Intent::CreateSession => debug!("session created: channel={SESSION_CHANNEL}"),
            Intent::OpenSession => {
                self.send(&Performative::Begin(Begin {
                    remote_channel: None,
                    next_outgoing_id: 0,
                    incoming_window: INCOMING_WINDOW,
                    outgoing_window: OUTGOING_WINDOW,
                    handle_max: Some(LINK_HANDLE),
                }))
                .await?;
            }
            Intent::CreateReceiver { name } => self.link.name = Some(name),
            Intent::SetSource { address } => self.link.source = Some(address),
            Intent::OpenLink => {
                let name = self.link.name.clone().ok_or(TransportError::InvalidIntent {
                    intent: "open-link",
                    reason: "receiver not created",
                })?;
                let source = self.link.source.clone().map(Terminus::at);
                self.send(&Performative::Attach(Attach {
                    name,
                    handle: LINK_HANDLE,
                    role: Role::Receiver,
                    snd_settle_mode: None,
                    rcv_settle_mode: Some(0),
                    source,
                    target: Some(Terminus::default()),
                    initial_delivery_count: None,
                    max_message_size: Some(self.max_message_size),
                }))
                .await?;
            }
            Intent::Flow { credit } => {
                self.link.credit = credit;
                if self.link.attached {
                    self.send_flow().await?;
                } else {
                    debug!("deferring flow until the peer attaches: credit={credit}");
                    self.link.flow_deferred = true;
                }
            }
            Intent::Recv {
                delivery,
                max_bytes,
            } => debug!("payload read: id={delivery}, max_bytes={max_bytes}"),
            Intent::Accept { delivery } => {
                if let Some(entry) = self.unsettled.get_mut(&delivery) {
                    entry.outcome = Some(Outcome::Accepted);
                }
            }
            Intent::Advance { delivery } => {
                if self.assembly.as_ref().is_some_and(|assembly| assembly.id == delivery) {
                    self.assembly = None;
                }
            }
            Intent::Settle { delivery } => {
                let Some(entry) = self.unsettled.remove(&delivery) else {
                    return Err(TransportError::InvalidIntent {
                        intent: "settle",
                        reason: "unknown delivery",
                    });
                };
                self.link.last_settled = Some(delivery);
                if !entry.remotely_settled {
                    self.send(&Performative::Disposition(Disposition {
                        role: Role::Receiver,
                        first: delivery.get(),
                        last: None,
                        settled: true,
                        state: entry.outcome,
                    }))
                    .await?;
                }
            }
            Intent::CloseLink => {
                self.link.closing = true;
                self.link.flow_deferred = false;
                self.forget_unsettled();
                self.send(&Performative::Detach(Detach {
                    handle: LINK_HANDLE,
                    closed: true,
                    error: None,
                }))
                .await?;
            }
            Intent::CloseSession => self.send(&Performative::End(None)).await?,
            Intent::CloseConnection => self.send(&Performative::Close(None)).await?,
            Intent::Report(notice) => debug!("notice not handled by transport: {notice}"),
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        SinkExt::<Frame>::flush(&mut self.framed).await
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::{SinkExt, StreamExt};
    use rstest::rstest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
    use tokio_util::codec::Framed;
    use tracing_test::traced_test;

    use super::*;
    use crate::event::RemoteError;

    type Peer = Framed<DuplexStream, FrameCodec>;

    async fn connected() -> (AmqpTransport<DuplexStream>, Peer) {
        let (client, mut server) = duplex(1 << 16);
        server
            .write_all(&PROTOCOL_HEADER)
            .await
            .expect("write header");
        let mut transport = AmqpTransport::handshake(client, FrameCodec::default())
            .await
            .expect("handshake");
        let mut header = [0u8; 8];
        server.read_exact(&mut header).await.expect("read header");
        assert_eq!(header, PROTOCOL_HEADER);
        assert_eq!(
            transport.next_event().await.expect("event"),
            Some(Event::ConnectionInit)
        );
        (transport, Framed::new(server, FrameCodec::default()))
    }

    async fn send(peer: &mut Peer, performative: Performative, payload: &[u8]) {
        peer.send(performative.to_frame(SESSION_CHANNEL, payload))
            .await
            .expect("peer send");
    }

    async fn receive(peer: &mut Peer) -> Performative {
        let frame = peer.next().await.expect("frame").expect("valid frame");
        Performative::from_frame(&frame).expect("performative").0
    }

    fn transfer(id: u32, more: bool, settled: bool) -> Performative {
        Performative::Transfer(Transfer {
            delivery_id: Some(id),
            delivery_tag: Some(Bytes::copy_from_slice(&id.to_be_bytes())),
            settled: Some(settled),
            more,
            ..Transfer::default()
        })
    }

    fn peer_begin(next_outgoing_id: u32) -> Performative {
        Performative::Begin(Begin {
            remote_channel: Some(SESSION_CHANNEL),
            next_outgoing_id,
            incoming_window: 10,
            outgoing_window: 10,
            handle_max: None,
        })
    }

    fn peer_attach(initial_delivery_count: u32) -> Performative {
        Performative::Attach(Attach {
            name: "link".into(),
            handle: LINK_HANDLE,
            role: Role::Sender,
            snd_settle_mode: None,
            rcv_settle_mode: None,
            source: Some(Terminus::at("queue")),
            target: None,
            initial_delivery_count: Some(initial_delivery_count),
            max_message_size: None,
        })
    }

    /// Grant `credit` before the peer's begin and attach, as the receiver
    /// does, and return the flow the transport sends once attached.
    async fn attach_with_credit(
        transport: &mut AmqpTransport<DuplexStream>,
        peer: &mut Peer,
        next_outgoing_id: u32,
        initial_delivery_count: u32,
        credit: u32,
    ) -> Flow {
        transport
            .apply(Intent::Flow { credit })
            .await
            .expect("flow");
        transport.flush().await.expect("flush");
        send(peer, peer_begin(next_outgoing_id), &[]).await;
        send(peer, peer_attach(initial_delivery_count), &[]).await;
        assert_eq!(
            transport.next_event().await.expect("event"),
            Some(Event::RemoteOpened(EndpointKind::Session))
        );
        assert_eq!(
            transport.next_event().await.expect("event"),
            Some(Event::RemoteOpened(EndpointKind::Link))
        );
        let Performative::Flow(flow) = receive(peer).await else {
            panic!("expected flow");
        };
        flow
    }

    async fn granted(credit: u32) -> (AmqpTransport<DuplexStream>, Peer) {
        let (mut transport, mut peer) = connected().await;
        let flow = attach_with_credit(&mut transport, &mut peer, 0, 0, credit).await;
        assert_eq!(flow.link_credit, Some(credit));
        assert_eq!(flow.incoming_window, INCOMING_WINDOW);
        (transport, peer)
    }

    #[tokio::test]
    #[traced_test]
    async fn handshake_runs_in_span() {
        let _ = connected().await;
        assert!(logs_contain("transport.handshake"));
        assert!(logs_contain("protocol header accepted"));
    }

    #[tokio::test]
    async fn foreign_header_is_rejected() {
        let (client, mut server) = duplex(64);
        server.write_all(b"AMQP\x03\x01\x00\x00").await.expect("write");
        let error = AmqpTransport::handshake(client, FrameCodec::default())
            .await
            .expect_err("sasl header is unsupported");
        assert!(matches!(error, TransportError::ProtocolHeader(h) if h[4] == 3));
    }

    #[tokio::test]
    async fn open_sequence_becomes_frames() {
        let (mut transport, mut peer) = connected().await;
        for intent in [
            Intent::OpenConnection {
                container_id: "edge-node".into(),
                hostname: "broker".into(),
            },
            Intent::CreateSession,
            Intent::OpenSession,
            Intent::CreateReceiver {
                name: "link".into(),
            },
            Intent::SetSource {
                address: "queue".into(),
            },
            Intent::OpenLink,
        ] {
            transport.apply(intent).await.expect("apply");
        }
        transport.flush().await.expect("flush");

        let Performative::Open(open) = receive(&mut peer).await else {
            panic!("expected open");
        };
        assert_eq!(open.container_id, "edge-node");
        assert_eq!(open.hostname.as_deref(), Some("broker"));
        assert!(matches!(receive(&mut peer).await, Performative::Begin(_)));
        let Performative::Attach(attach) = receive(&mut peer).await else {
            panic!("expected attach");
        };
        assert_eq!(attach.name, "link");
        assert_eq!(attach.role, Role::Receiver);
        assert_eq!(attach.source, Some(Terminus::at("queue")));
        assert_eq!(attach.max_message_size, Some(DEFAULT_MAX_MESSAGE_SIZE));
    }

    #[tokio::test]
    async fn open_link_requires_receiver() {
        let (mut transport, _peer) = connected().await;
        let error = transport
            .apply(Intent::OpenLink)
            .await
            .expect_err("no receiver created");
        assert!(matches!(error, TransportError::InvalidIntent { .. }));
    }

    #[rstest]
    #[case::connection(Performative::Open(Open::default()), EndpointKind::Connection)]
    #[case::session(
        Performative::Begin(Begin {
            remote_channel: Some(0),
            next_outgoing_id: 0,
            incoming_window: 10,
            outgoing_window: 10,
            handle_max: None,
        }),
        EndpointKind::Session
    )]
    #[tokio::test]
    async fn remote_opens_become_events(
        #[case] performative: Performative,
        #[case] kind: EndpointKind,
    ) {
        let (mut transport, mut peer) = connected().await;
        send(&mut peer, performative, &[]).await;
        assert_eq!(
            transport.next_event().await.expect("event"),
            Some(Event::RemoteOpened(kind))
        );
    }

    #[tokio::test]
    async fn receiver_attach_from_peer_is_unexpected() {
        let (mut transport, mut peer) = connected().await;
        let attach = Attach {
            name: "loop".into(),
            handle: LINK_HANDLE,
            role: Role::Receiver,
            snd_settle_mode: None,
            rcv_settle_mode: None,
            source: None,
            target: None,
            initial_delivery_count: None,
            max_message_size: None,
        };
        send(&mut peer, Performative::Attach(attach), &[]).await;
        let error = transport.next_event().await.expect_err("role clash");
        assert!(matches!(error, TransportError::Unexpected { .. }));
    }

    #[tokio::test]
    async fn transfer_consumes_credit() {
        let (mut transport, mut peer) = granted(10).await;
        send(&mut peer, transfer(0, false, false), b"payload").await;

        let Some(Event::DeliveryReady {
            delivery,
            link_credit,
        }) = transport.next_event().await.expect("event")
        else {
            panic!("expected delivery");
        };
        assert_eq!(link_credit, 9);
        assert_eq!(delivery, Delivery::complete(0, Bytes::from_static(b"payload")));
        assert_eq!(transport.link_credit(), 9);
        assert_eq!(transport.unsettled_count(), 1);
    }

    #[tokio::test]
    async fn multi_frame_delivery_is_assembled() {
        let (mut transport, mut peer) = granted(10).await;
        send(&mut peer, transfer(3, true, false), b"hello ").await;
        send(
            &mut peer,
            Performative::Transfer(Transfer::default()),
            b"world",
        )
        .await;

        let Some(Event::DeliveryReady { delivery, .. }) =
            transport.next_event().await.expect("event")
        else {
            panic!("expected partial delivery");
        };
        assert!(delivery.partial);
        assert!(delivery.payload.is_empty());

        let Some(Event::DeliveryReady {
            delivery,
            link_credit,
        }) = transport.next_event().await.expect("event")
        else {
            panic!("expected complete delivery");
        };
        assert!(delivery.is_ready());
        assert_eq!(delivery.payload, Bytes::from_static(b"hello world"));
        assert_eq!(link_credit, 9);
    }

    #[tokio::test]
    async fn settlement_sends_accepted_disposition() {
        let (mut transport, mut peer) = granted(10).await;
        send(&mut peer, transfer(0, false, false), b"x").await;
        transport.next_event().await.expect("event");

        let delivery = DeliveryId::new(0);
        for intent in [
            Intent::Accept { delivery },
            Intent::Advance { delivery },
            Intent::Settle { delivery },
        ] {
            transport.apply(intent).await.expect("apply");
        }
        transport.flush().await.expect("flush");

        assert_eq!(
            receive(&mut peer).await,
            Performative::Disposition(Disposition {
                role: Role::Receiver,
                first: 0,
                last: None,
                settled: true,
                state: Some(Outcome::Accepted),
            })
        );
        assert_eq!(transport.unsettled_count(), 0);
    }

    #[tokio::test]
    async fn remotely_settled_delivery_needs_no_disposition() {
        let (mut transport, mut peer) = granted(10).await;
        send(&mut peer, transfer(0, false, true), b"x").await;
        transport.next_event().await.expect("event");

        let delivery = DeliveryId::new(0);
        transport
            .apply(Intent::Advance { delivery })
            .await
            .expect("advance");
        transport
            .apply(Intent::Settle { delivery })
            .await
            .expect("settle");
        transport.apply(Intent::CloseLink).await.expect("close");
        transport.flush().await.expect("flush");

        assert!(matches!(receive(&mut peer).await, Performative::Detach(_)));
    }

    #[tokio::test]
    async fn settling_unknown_delivery_fails() {
        let (mut transport, _peer) = connected().await;
        let error = transport
            .apply(Intent::Settle {
                delivery: DeliveryId::new(42),
            })
            .await
            .expect_err("unknown delivery");
        assert!(matches!(error, TransportError::InvalidIntent { .. }));
    }

    #[tokio::test]
    async fn heartbeats_are_skipped() {
        let (mut transport, mut peer) = connected().await;
        peer.send(Frame::new(0, Bytes::new())).await.expect("heartbeat");
        send(&mut peer, Performative::End(None), &[]).await;
        assert_eq!(
            transport.next_event().await.expect("event"),
            Some(Event::RemoteClosed {
                kind: EndpointKind::Session,
                error: None,
            })
        );
    }

    #[tokio::test]
    async fn remote_close_ends_the_transport() {
        let (mut transport, mut peer) = connected().await;
        let error = RemoteError {
            condition: "amqp:connection:forced".into(),
            description: None,
        };
        send(&mut peer, Performative::Close(Some(error.clone())), &[]).await;
        assert_eq!(
            transport.next_event().await.expect("event"),
            Some(Event::RemoteClosed {
                kind: EndpointKind::Connection,
                error: Some(error),
            })
        );
        assert_eq!(transport.next_event().await.expect("event"), None);
    }

    #[tokio::test]
    async fn peer_hang_up_closes_transport() {
        let (mut transport, peer) = connected().await;
        drop(peer);
        assert_eq!(
            transport.next_event().await.expect("event"),
            Some(Event::TransportClosed)
        );
        assert_eq!(transport.next_event().await.expect("event"), None);
    }

    #[tokio::test]
    async fn flow_waits_for_peer_attach() {
        let (mut transport, mut peer) = connected().await;
        let flow = attach_with_credit(&mut transport, &mut peer, 40, 6, 10).await;
        assert_eq!(flow.next_incoming_id, Some(40));
        assert_eq!(flow.delivery_count, Some(6));
        assert_eq!(flow.link_credit, Some(10));
        assert_eq!(flow.handle, Some(LINK_HANDLE));
    }

    #[tokio::test]
    async fn flow_after_attach_is_sent_at_once() {
        let (mut transport, mut peer) = granted(10).await;
        send(&mut peer, transfer(0, false, false), b"x").await;
        transport.next_event().await.expect("event");

        transport
            .apply(Intent::Flow { credit: 10 })
            .await
            .expect("flow");
        transport.flush().await.expect("flush");
        let Performative::Flow(flow) = receive(&mut peer).await else {
            panic!("expected flow");
        };
        assert_eq!(flow.next_incoming_id, Some(1));
        assert_eq!(flow.delivery_count, Some(1));
        assert_eq!(flow.link_credit, Some(10));
    }

    #[tokio::test]
    async fn oversized_delivery_is_capped() {
        let (transport, mut peer) = granted(10).await;
        let mut transport = transport.with_max_message_size(16);
        send(&mut peer, transfer(0, true, false), b"0123456789").await;
        send(
            &mut peer,
            Performative::Transfer(Transfer {
                more: true,
                ..Transfer::default()
            }),
            b"abcdefghij",
        )
        .await;
        send(
            &mut peer,
            Performative::Transfer(Transfer::default()),
            b"ABCDEFGHIJ",
        )
        .await;

        for _ in 0..2 {
            let Some(Event::DeliveryReady { delivery, .. }) =
                transport.next_event().await.expect("event")
            else {
                panic!("expected partial delivery");
            };
            assert!(delivery.partial);
        }
        let Some(Event::DeliveryReady { delivery, .. }) =
            transport.next_event().await.expect("event")
        else {
            panic!("expected complete delivery");
        };
        assert!(delivery.is_ready());
        assert_eq!(delivery.payload, Bytes::from_static(b"0123456789abcdef"));
        assert_eq!(transport.unsettled_count(), 1);
    }

    #[tokio::test]
    async fn disposition_range_wraps() {
        let (mut transport, mut peer) = granted(10).await;
        send(&mut peer, transfer(u32::MAX, false, false), b"x").await;
        send(&mut peer, transfer(0, false, false), b"y").await;
        transport.next_event().await.expect("event");
        transport.next_event().await.expect("event");
        assert_eq!(transport.unsettled_count(), 2);

        send(
            &mut peer,
            Performative::Disposition(Disposition {
                role: Role::Sender,
                first: u32::MAX,
                last: Some(0),
                settled: true,
                state: Some(Outcome::Accepted),
            }),
            &[],
        )
        .await;
        assert_eq!(
            transport.next_event().await.expect("event"),
            Some(Event::Other("disposition"))
        );

        for id in [u32::MAX, 0] {
            transport
                .apply(Intent::Settle {
                    delivery: DeliveryId::new(id),
                })
                .await
                .expect("settle");
        }
        transport.apply(Intent::CloseLink).await.expect("close");
        transport.flush().await.expect("flush");
        assert!(matches!(receive(&mut peer).await, Performative::Detach(_)));
    }

    #[tokio::test]
    async fn repeated_settled_delivery_is_not_tracked() {
        let (mut transport, mut peer) = granted(10).await;
        send(&mut peer, transfer(0, false, false), b"x").await;
        transport.next_event().await.expect("event");
        transport
            .apply(Intent::Settle {
                delivery: DeliveryId::new(0),
            })
            .await
            .expect("settle");

        send(&mut peer, transfer(0, false, false), b"x").await;
        assert!(matches!(
            transport.next_event().await.expect("event"),
            Some(Event::DeliveryReady { .. })
        ));
        assert_eq!(transport.unsettled_count(), 0);
    }

    #[tokio::test]
    async fn closing_link_drops_unsettled_deliveries() {
        let (mut transport, mut peer) = granted(10).await;
        send(&mut peer, transfer(0, false, false), b"x").await;
        transport.next_event().await.expect("event");
        assert_eq!(transport.unsettled_count(), 1);

        transport.apply(Intent::CloseLink).await.expect("close");
        assert_eq!(transport.unsettled_count(), 0);

        send(&mut peer, transfer(1, false, false), b"y").await;
        transport.next_event().await.expect("event");
        assert_eq!(transport.unsettled_count(), 0);
    }

    #[tokio::test]
    async fn remote_detach_drops_unsettled_deliveries() {
        let (mut transport, mut peer) = granted(10).await;
        send(&mut peer, transfer(0, false, false), b"x").await;
        transport.next_event().await.expect("event");

        send(
            &mut peer,
            Performative::Detach(Detach {
                handle: LINK_HANDLE,
                closed: true,
                error: None,
            }),
            &[],
        )
        .await;
        assert_eq!(
            transport.next_event().await.expect("event"),
            Some(Event::RemoteClosed {
                kind: EndpointKind::Link,
                error: None,
            })
        );
        assert_eq!(transport.unsettled_count(), 0);
    }
}
