//! AMQP 1.0 performatives.
//!
//! Only the fields a single receiving link (and the peer it talks to) needs
//! are modelled; unknown trailing fields are ignored on decode.

use bytes::{Bytes, BytesMut};

use super::{Frame, TransportError};
use crate::{
    event::RemoteError,
    types::{AmqpValue, DecodeError, Fields, decode_value},
};

/// Descriptor codes of the performatives and their nested composites.
pub mod descriptor {
    /// `amqp:open:list`
    pub const OPEN: u64 = 0x10;
    /// `amqp:begin:list`
    pub const BEGIN: u64 = 0x11;
    /// `amqp:attach:list`
    pub const ATTACH: u64 = 0x12;
    /// `amqp:flow:list`
    pub const FLOW: u64 = 0x13;
    /// `amqp:transfer:list`
    pub const TRANSFER: u64 = 0x14;
    /// `amqp:disposition:list`
    pub const DISPOSITION: u64 = 0x15;
    /// `amqp:detach:list`
    pub const DETACH: u64 = 0x16;
    /// `amqp:end:list`
    pub const END: u64 = 0x17;
    /// `amqp:close:list`
    pub const CLOSE: u64 = 0x18;
    /// `amqp:error:list`
    pub const ERROR: u64 = 0x1d;
    /// `amqp:accepted:list`
    pub const ACCEPTED: u64 = 0x24;
    /// `amqp:source:list`
    pub const SOURCE: u64 = 0x28;
    /// `amqp:target:list`
    pub const TARGET: u64 = 0x29;
}

/// Link role; encoded as a boolean where `true` is receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Sending end of a link.
    Sender,
    /// Receiving end of a link.
    Receiver,
}

impl Role {
    fn to_value(self) -> AmqpValue { AmqpValue::Bool(self == Self::Receiver) }

    fn from_flag(flag: bool) -> Self { if flag { Self::Receiver } else { Self::Sender } }
}

/// Source or target of a link.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Terminus {
    /// Node address.
    pub address: Option<String>,
}

impl Terminus {
    /// Terminus attached to `address`.
    #[must_use]
    pub fn at(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
        }
    }

    fn to_value(&self, code: u64) -> AmqpValue {
        AmqpValue::composite(code, vec![self.address.clone().into()])
    }

    fn from_value(value: AmqpValue) -> Result<Self, DecodeError> {
        let (_, value) = value.into_described_code()?;
        let mut fields = Fields::new("terminus", value)?;
        let address = match fields.take(0) {
            AmqpValue::Null => None,
            AmqpValue::String(address) | AmqpValue::Symbol(address) => Some(address),
            other => return Err(DecodeError::unexpected("string", &other)),
        };
        Ok(Self { address })
    }
}

/// Delivery outcome carried in a disposition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// `amqp:accepted:list`
    Accepted,
    /// Any other outcome, by descriptor code.
    Other(u64),
}

impl Outcome {
    fn to_value(self) -> AmqpValue {
        match self {
            Self::Accepted => AmqpValue::composite(descriptor::ACCEPTED, Vec::new()),
            Self::Other(code) => AmqpValue::composite(code, Vec::new()),
        }
    }

    fn from_value(value: AmqpValue) -> Result<Self, DecodeError> {
        let (code, _) = value.into_described_code()?;
        Ok(if code == descriptor::ACCEPTED {
            Self::Accepted
        } else {
            Self::Other(code)
        })
    }
}

fn error_to_value(error: Option<&RemoteError>) -> AmqpValue {
    error.map_or(AmqpValue::Null, |error| {
        AmqpValue::composite(
            descriptor::ERROR,
            vec![
                AmqpValue::Symbol(error.condition.clone()),
                error.description.clone().into(),
            ],
        )
    })
}

fn error_from_value(value: Option<AmqpValue>) -> Result<Option<RemoteError>, DecodeError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let (_, value) = value.into_described_code()?;
    let mut fields = Fields::new("error", value)?;
    let condition = fields.opt_symbol(0)?.ok_or(DecodeError::MissingField {
        composite: "error",
        field: "condition",
    })?;
    Ok(Some(RemoteError {
        condition,
        description: fields.opt_string(1)?,
    }))
}

fn flag(value: bool) -> AmqpValue { if value { AmqpValue::Bool(true) } else { AmqpValue::Null } }

fn ushort(value: Option<u16>) -> AmqpValue { value.map_or(AmqpValue::Null, AmqpValue::Ushort) }

fn ubyte(value: Option<u8>) -> AmqpValue { value.map_or(AmqpValue::Null, AmqpValue::Ubyte) }

/// Connection open.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Open {
    /// Container identity.
    pub container_id: String,
    /// Virtual host name.
    pub hostname: Option<String>,
    /// Largest frame the sender will accept.
    pub max_frame_size: Option<u32>,
    /// Highest channel number usable.
    pub channel_max: Option<u16>,
    /// Idle timeout in milliseconds.
    pub idle_time_out: Option<u32>,
}

/// Session begin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Begin {
    /// Channel of the peer's session, when answering a begin.
    pub remote_channel: Option<u16>,
    /// Next transfer id the sender will use.
    pub next_outgoing_id: u32,
    /// Incoming transfer window.
    pub incoming_window: u32,
    /// Outgoing transfer window.
    pub outgoing_window: u32,
    /// Highest link handle usable.
    pub handle_max: Option<u32>,
}

/// Link attach.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attach {
    /// Link name.
    pub name: String,
    /// Link handle.
    pub handle: u32,
    /// Role of the sender of this frame.
    pub role: Role,
    /// Sender settle mode.
    pub snd_settle_mode: Option<u8>,
    /// Receiver settle mode.
    pub rcv_settle_mode: Option<u8>,
    /// Source terminus.
    pub source: Option<Terminus>,
    /// Target terminus.
    pub target: Option<Terminus>,
    /// Initial delivery count; set by senders.
    pub initial_delivery_count: Option<u32>,
    /// Largest message the sender of this frame will accept.
    pub max_message_size: Option<u64>,
}

/// Flow control update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Flow {
    /// Next transfer id expected from the peer.
    pub next_incoming_id: Option<u32>,
    /// Incoming transfer window.
    pub incoming_window: u32,
    /// Next transfer id the sender will use.
    pub next_outgoing_id: u32,
    /// Outgoing transfer window.
    pub outgoing_window: u32,
    /// Link handle, for link-level flow.
    pub handle: Option<u32>,
    /// Link delivery count.
    pub delivery_count: Option<u32>,
    /// Link credit.
    pub link_credit: Option<u32>,
    /// Deliveries available at the sender.
    pub available: Option<u32>,
    /// Drain mode.
    pub drain: bool,
    /// Request for a flow in reply.
    pub echo: bool,
}

/// Message transfer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transfer {
    /// Link handle.
    pub handle: u32,
    /// Delivery id; present on the first frame of a delivery.
    pub delivery_id: Option<u32>,
    /// Delivery tag; present on the first frame of a delivery.
    pub delivery_tag: Option<Bytes>,
    /// Message format.
    pub message_format: Option<u32>,
    /// Whether the sender settled the delivery.
    pub settled: Option<bool>,
    /// Whether more frames follow for this delivery.
    pub more: bool,
    /// Whether the delivery was aborted.
    pub aborted: bool,
}

/// Delivery state update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disposition {
    /// Role of the sender of this frame.
    pub role: Role,
    /// First delivery id covered.
    pub first: u32,
    /// Last delivery id covered; defaults to `first`.
    pub last: Option<u32>,
    /// Whether the deliveries are settled.
    pub settled: bool,
    /// Outcome of the deliveries.
    pub state: Option<Outcome>,
}

/// Link detach.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Detach {
    /// Link handle.
    pub handle: u32,
    /// Whether the link is closed rather than suspended.
    pub closed: bool,
    /// Error condition.
    pub error: Option<RemoteError>,
}

/// A decoded performative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Performative {
    /// `open`
    Open(Open),
    /// `begin`
    Begin(Begin),
    /// `attach`
    Attach(Attach),
    /// `flow`
    Flow(Flow),
    /// `transfer`
    Transfer(Transfer),
    /// `disposition`
    Disposition(Disposition),
    /// `detach`
    Detach(Detach),
    /// `end`
    End(Option<RemoteError>),
    /// `close`
    Close(Option<RemoteError>),
}

impl Performative {
    /// Performative name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open(_) => "open",
            Self::Begin(_) => "begin",
            Self::Attach(_) => "attach",
            Self::Flow(_) => "flow",
            Self::Transfer(_) => "transfer",
            Self::Disposition(_) => "disposition",
            Self::Detach(_) => "detach",
            Self::End(_) => "end",
            Self::Close(_) => "close",
        }
    }

    /// Described-list encoding of the performative.
    #[must_use]
    pub fn to_value(&self) -> AmqpValue {
        match self {
            Self::Open(open) => AmqpValue::composite(
                descriptor::OPEN,
                vec![
                    open.container_id.clone().into(),
                    open.hostname.clone().into(),
                    open.max_frame_size.into(),
                    ushort(open.channel_max),
                    open.idle_time_out.into(),
                ],
            ),
            Self::Begin(begin) => AmqpValue::composite(
                descriptor::BEGIN,
                vec![
                    ushort(begin.remote_channel),
                    begin.next_outgoing_id.into(),
                    begin.incoming_window.into(),
                    begin.outgoing_window.into(),
                    begin.handle_max.into(),
                ],
            ),
            Self::Attach(attach) => AmqpValue::composite(
                descriptor::ATTACH,
                vec![
                    attach.name.clone().into(),
                    attach.handle.into(),
                    attach.role.to_value(),
                    ubyte(attach.snd_settle_mode),
                    ubyte(attach.rcv_settle_mode),
                    attach
                        .source
                        .as_ref()
                        .map_or(AmqpValue::Null, |source| source.to_value(descriptor::SOURCE)),
                    attach
                        .target
                        .as_ref()
                        .map_or(AmqpValue::Null, |target| target.to_value(descriptor::TARGET)),
                    AmqpValue::Null,
                    AmqpValue::Null,
                    attach.initial_delivery_count.into(),
                    attach.max_message_size.into(),
                ],
            ),
            Self::Flow(flow) => AmqpValue::composite(
                descriptor::FLOW,
                vec![
                    flow.next_incoming_id.into(),
                    flow.incoming_window.into(),
                    flow.next_outgoing_id.into(),
                    flow.outgoing_window.into(),
                    flow.handle.into(),
                    flow.delivery_count.into(),
                    flow.link_credit.into(),
                    flow.available.into(),
                    flag(flow.drain),
                    flag(flow.echo),
                ],
            ),
            Self::Transfer(transfer) => AmqpValue::composite(
                descriptor::TRANSFER,
                vec![
                    transfer.handle.into(),
                    transfer.delivery_id.into(),
                    transfer
                        .delivery_tag
                        .clone()
                        .map_or(AmqpValue::Null, AmqpValue::Binary),
                    transfer.message_format.into(),
                    transfer.settled.into(),
                    flag(transfer.more),
                    AmqpValue::Null,
                    AmqpValue::Null,
                    AmqpValue::Null,
                    flag(transfer.aborted),
                ],
            ),
            Self::Disposition(disposition) => AmqpValue::composite(
                descriptor::DISPOSITION,
                vec![
                    disposition.role.to_value(),
                    disposition.first.into(),
                    disposition.last.into(),
                    flag(disposition.settled),
                    disposition.state.map_or(AmqpValue::Null, Outcome::to_value),
                ],
            ),
            Self::Detach(detach) => AmqpValue::composite(
                descriptor::DETACH,
                vec![
                    detach.handle.into(),
                    flag(detach.closed),
                    error_to_value(detach.error.as_ref()),
                ],
            ),
            Self::End(error) => {
                AmqpValue::composite(descriptor::END, vec![error_to_value(error.as_ref())])
            }
            Self::Close(error) => {
                AmqpValue::composite(descriptor::CLOSE, vec![error_to_value(error.as_ref())])
            }
        }
    }

    /// Build a frame carrying this performative followed by `payload`.
    #[must_use]
    pub fn to_frame(&self, channel: u16, payload: &[u8]) -> Frame {
        let mut body = BytesMut::new();
        self.to_value().encode(&mut body);
        body.extend_from_slice(payload);
        Frame::new(channel, body.freeze())
    }

    /// Decode the performative at the start of `frame` and return it with
    /// the remaining payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] for malformed bodies and
    /// [`TransportError::UnknownPerformative`] for unrecognised descriptors.
    pub fn from_frame(frame: &Frame) -> Result<(Self, Bytes), TransportError> {
        let mut input = &frame.body[..];
        let performative = Self::decode(&mut input)?;
        let consumed = frame.body.len() - input.len();
        Ok((performative, frame.body.slice(consumed..)))
    }

    /// Decode one performative from the front of `input`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decode`] for malformed encodings and
    /// [`TransportError::UnknownPerformative`] for unrecognised descriptors.
    pub fn decode(input: &mut &[u8]) -> Result<Self, TransportError> {
        let (code, value) = decode_value(input)?.into_described_code()?;
        let performative = match code {
            descriptor::OPEN => {
                let mut fields = Fields::new("open", value)?;
                Self::Open(Open {
                    container_id: fields.string(0, "container-id")?,
                    hostname: fields.opt_string(1)?,
                    max_frame_size: fields.opt_u32(2)?,
                    channel_max: fields.opt_u16(3)?,
                    idle_time_out: fields.opt_u32(4)?,
                })
            }
            descriptor::BEGIN => {
                let mut fields = Fields::new("begin", value)?;
                Self::Begin(Begin {
                    remote_channel: fields.opt_u16(0)?,
                    next_outgoing_id: fields.u32(1, "next-outgoing-id")?,
                    incoming_window: fields.u32(2, "incoming-window")?,
                    outgoing_window: fields.u32(3, "outgoing-window")?,
                    handle_max: fields.opt_u32(4)?,
                })
            }
            descriptor::ATTACH => {
                let mut fields = Fields::new("attach", value)?;
                Self::Attach(Attach {
                    name: fields.string(0, "name")?,
                    handle: fields.u32(1, "handle")?,
                    role: Role::from_flag(fields.bool(2, "role")?),
                    snd_settle_mode: fields.opt_u8(3)?,
                    rcv_settle_mode: fields.opt_u8(4)?,
                    source: fields.opt_value(5).map(Terminus::from_value).transpose()?,
                    target: fields.opt_value(6).map(Terminus::from_value).transpose()?,
                    initial_delivery_count: fields.opt_u32(9)?,
                    max_message_size: fields.opt_u64(10)?,
                })
            }
            descriptor::FLOW => {
                let mut fields = Fields::new("flow", value)?;
                Self::Flow(Flow {
                    next_incoming_id: fields.opt_u32(0)?,
                    incoming_window: fields.u32(1, "incoming-window")?,
                    next_outgoing_id: fields.u32(2, "next-outgoing-id")?,
                    outgoing_window: fields.u32(3, "outgoing-window")?,
                    handle: fields.opt_u32(4)?,
                    delivery_count: fields.opt_u32(5)?,
                    link_credit: fields.opt_u32(6)?,
                    available: fields.opt_u32(7)?,
                    drain: fields.opt_bool(8)?.unwrap_or(false),
                    echo: fields.opt_bool(9)?.unwrap_or(false),
                })
            }
            descriptor::TRANSFER => {
                let mut fields = Fields::new("transfer", value)?;
                Self::Transfer(Transfer {
                    handle: fields.u32(0, "handle")?,
                    delivery_id: fields.opt_u32(1)?,
                    delivery_tag: fields.opt_binary(2)?,
                    message_format: fields.opt_u32(3)?,
                    settled: fields.opt_bool(4)?,
                    more: fields.opt_bool(5)?.unwrap_or(false),
                    aborted: fields.opt_bool(9)?.unwrap_or(false),
                })
            }
            descriptor::DISPOSITION => {
                let mut fields = Fields::new("disposition", value)?;
                Self::Disposition(Disposition {
                    role: Role::from_flag(fields.bool(0, "role")?),
                    first: fields.u32(1, "first")?,
                    last: fields.opt_u32(2)?,
                    settled: fields.opt_bool(3)?.unwrap_or(false),
                    state: fields.opt_value(4).map(Outcome::from_value).transpose()?,
                })
            }
            descriptor::DETACH => {
                let mut fields = Fields::new("detach", value)?;
                Self::Detach(Detach {
                    handle: fields.u32(0, "handle")?,
                    closed: fields.opt_bool(1)?.unwrap_or(false),
                    error: error_from_value(fields.opt_value(2))?,
                })
            }
            descriptor::END => {
                let mut fields = Fields::new("end", value)?;
                Self::End(error_from_value(fields.opt_value(0))?)
            }
            descriptor::CLOSE => {
                let mut fields = Fields::new("close", value)?;
                Self::Close(error_from_value(fields.opt_value(0))?)
            }
            code => return Err(TransportError::UnknownPerformative { code }),
        };
        Ok(performative)
    }
}
