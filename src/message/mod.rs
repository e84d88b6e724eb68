//! AMQP 1.0 message model.
//!
//! A [`Message`] is the bare-message-plus-annotations view of a transfer
//! payload: a sequence of described sections. The receiver keeps one
//! `Message` as scratch space and [`Message::clear`]s it before each decode so
//! repeated deliveries reuse the same allocations.

use bytes::Bytes;

use crate::types::AmqpValue;

mod decode;
mod encode;

pub use decode::{
    AmqpMessageDecoder,
    MessageDecodeError,
    MessageDecoder,
    decode,
    extract_single_string,
};

/// Descriptor codes of the message sections.
pub mod section {
    /// `amqp:header:list`
    pub const HEADER: u64 = 0x70;
    /// `amqp:delivery-annotations:map`
    pub const DELIVERY_ANNOTATIONS: u64 = 0x71;
    /// `amqp:message-annotations:map`
    pub const MESSAGE_ANNOTATIONS: u64 = 0x72;
    /// `amqp:properties:list`
    pub const PROPERTIES: u64 = 0x73;
    /// `amqp:application-properties:map`
    pub const APPLICATION_PROPERTIES: u64 = 0x74;
    /// `amqp:data:binary`
    pub const DATA: u64 = 0x75;
    /// `amqp:amqp-sequence:list`
    pub const AMQP_SEQUENCE: u64 = 0x76;
    /// `amqp:amqp-value:*`
    pub const AMQP_VALUE: u64 = 0x77;
    /// `amqp:footer:map`
    pub const FOOTER: u64 = 0x78;
}

/// Transport headers carried with the message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// Whether the message must survive intermediary restarts.
    pub durable: bool,
    /// Relative priority; `None` means the default of 4.
    pub priority: Option<u8>,
    /// Time to live in milliseconds.
    pub ttl: Option<u32>,
    /// Whether this is the first acquisition of the message.
    pub first_acquirer: bool,
    /// Number of prior unsuccessful delivery attempts.
    pub delivery_count: u32,
}

/// Immutable properties of the bare message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Properties {
    /// Application message identifier.
    pub message_id: Option<AmqpValue>,
    /// Identity of the producing user.
    pub user_id: Option<Bytes>,
    /// Destination node address.
    pub to: Option<String>,
    /// Application subject.
    pub subject: Option<String>,
    /// Node to send replies to.
    pub reply_to: Option<String>,
    /// Identifier correlating this message with another.
    pub correlation_id: Option<AmqpValue>,
    /// MIME type of the body.
    pub content_type: Option<String>,
    /// Content encoding of the body.
    pub content_encoding: Option<String>,
    /// Absolute expiry time in milliseconds since the epoch.
    pub absolute_expiry_time: Option<i64>,
    /// Creation time in milliseconds since the epoch.
    pub creation_time: Option<i64>,
    /// Group the message belongs to.
    pub group_id: Option<String>,
    /// Position within the group.
    pub group_sequence: Option<u32>,
    /// Group replies should be sent to.
    pub reply_to_group_id: Option<String>,
}

/// Application payload of a message.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Body {
    /// No body section was present.
    #[default]
    Empty,
    /// A single `amqp-value` section.
    Value(AmqpValue),
    /// One or more `data` sections.
    Data(Vec<Bytes>),
    /// One or more `amqp-sequence` sections.
    Sequence(Vec<Vec<AmqpValue>>),
}

impl Body {
    fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Value(_) => "amqp-value",
            Self::Data(_) => "data",
            Self::Sequence(_) => "amqp-sequence",
        }
    }
}

/// A decoded AMQP 1.0 message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    /// Header section.
    pub header: Option<Header>,
    /// Delivery annotations, in wire order.
    pub delivery_annotations: Vec<(AmqpValue, AmqpValue)>,
    /// Message annotations, in wire order.
    pub message_annotations: Vec<(AmqpValue, AmqpValue)>,
    /// Properties section.
    pub properties: Option<Properties>,
    /// Application properties keyed by string.
    pub application_properties: Vec<(String, AmqpValue)>,
    /// Body sections.
    pub body: Body,
    /// Footer, in wire order.
    pub footer: Vec<(AmqpValue, AmqpValue)>,
}

impl Message {
    /// Create an empty message.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create a message whose body is a single string `amqp-value`.
    ///
    /// # Examples
    ///
    /// ```
    /// use amqp_receiver::message::{Message, extract_single_string};
    ///
    /// let message = Message::text("hello");
    /// assert_eq!(extract_single_string(&message.body), Some("hello"));
    /// ```
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_body(Body::Value(AmqpValue::String(body.into())))
    }

    /// Create a message carrying `body`.
    #[must_use]
    pub fn with_body(body: Body) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    /// Reset every section for reuse.
    ///
    /// Annotation, property and footer storage keeps its capacity. The body
    /// is replaced with [`Body::Empty`] so the next decode may pick any body
    /// kind.
    pub fn clear(&mut self) {
        self.header = None;
        self.delivery_annotations.clear();
        self.message_annotations.clear();
        self.properties = None;
        self.application_properties.clear();
        self.body = Body::Empty;
        self.footer.clear();
    }

    /// Returns `true` when no section is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool { *self == Self::default() }
}
