//! Section-level decoding of transfer payloads into [`Message`]s.

use thiserror::Error;

use super::{Body, Header, Message, Properties, section};
use crate::types::{AmqpValue, DecodeError, Fields, decode_value};

/// Errors produced while decoding a message payload.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MessageDecodeError {
    /// The payload is not a valid AMQP encoding.
    #[error("malformed section: {0}")]
    Value(#[from] DecodeError),

    /// A section carried a descriptor that is not a message section.
    #[error("unknown message section {code:#x}")]
    UnknownSection {
        /// Offending descriptor code.
        code: u64,
    },

    /// Body sections of different kinds were mixed, or `amqp-value` repeated.
    #[error("{found} section cannot follow {existing} body")]
    ConflictingBody {
        /// Kind of body already decoded.
        existing: &'static str,
        /// Kind of body section encountered.
        found: &'static str,
    },
}

/// Converts raw transfer bytes into a [`Message`].
///
/// Implementations decode into caller-owned storage so a receiver can keep a
/// single scratch message alive across deliveries.
pub trait MessageDecoder {
    /// Decode `bytes` into `message`, which the caller has already cleared.
    ///
    /// On failure `message` may be partially populated.
    ///
    /// # Errors
    ///
    /// Returns [`MessageDecodeError`] when `bytes` is not a valid message.
    fn decode_into(&self, bytes: &[u8], message: &mut Message) -> Result<(), MessageDecodeError>;
}

/// Decoder for the standard AMQP 1.0 message format.
#[derive(Clone, Copy, Debug, Default)]
pub struct AmqpMessageDecoder;

impl MessageDecoder for AmqpMessageDecoder {
    fn decode_into(&self, bytes: &[u8], message: &mut Message) -> Result<(), MessageDecodeError> {
        let mut input = bytes;
        while !input.is_empty() {
            let (code, value) = decode_value(&mut input)?.into_described_code()?;
            apply_section(message, code, value)?;
        }
        Ok(())
    }
}

/// Decode `bytes` into a new [`Message`].
///
/// # Errors
///
/// Returns [`MessageDecodeError`] when `bytes` is not a valid message.
///
/// # Examples
///
/// ```
/// use amqp_receiver::message::{Message, decode};
///
/// let encoded = Message::text("ping").to_bytes();
/// let message = decode(&encoded).expect("valid message");
/// assert_eq!(message, Message::text("ping"));
/// ```
pub fn decode(bytes: &[u8]) -> Result<Message, MessageDecodeError> {
    let mut message = Message::new();
    AmqpMessageDecoder.decode_into(bytes, &mut message)?;
    Ok(message)
}

/// Return the body text when the body is exactly one string `amqp-value`.
#[must_use]
pub fn extract_single_string(body: &Body) -> Option<&str> {
    match body {
        Body::Value(value) => value.as_str(),
        _ => None,
    }
}

fn apply_section(
    message: &mut Message,
    code: u64,
    value: AmqpValue,
) -> Result<(), MessageDecodeError> {
    match code {
        section::HEADER => message.header = Some(decode_header(value)?),
        section::DELIVERY_ANNOTATIONS => message.delivery_annotations = expect_map(value)?,
        section::MESSAGE_ANNOTATIONS => message.message_annotations = expect_map(value)?,
        section::PROPERTIES => message.properties = Some(decode_properties(value)?),
        section::APPLICATION_PROPERTIES => {
            message.application_properties = expect_map(value)?
                .into_iter()
                .map(|(key, value)| match key {
                    AmqpValue::String(key) => Ok((key, value)),
                    other => Err(DecodeError::unexpected("string", &other)),
                })
                .collect::<Result<_, _>>()?;
        }
        section::DATA => {
            let chunk = match value {
                AmqpValue::Binary(chunk) => chunk,
                other => return Err(DecodeError::unexpected("binary", &other).into()),
            };
            match &mut message.body {
                Body::Data(chunks) => chunks.push(chunk),
                Body::Empty => message.body = Body::Data(vec![chunk]),
                existing => return Err(conflict(existing, "data")),
            }
        }
        section::AMQP_SEQUENCE => {
            let list = match value {
                AmqpValue::List(list) => list,
                other => return Err(DecodeError::unexpected("list", &other).into()),
            };
            match &mut message.body {
                Body::Sequence(items) => items.push(list),
                Body::Empty => message.body = Body::Sequence(vec![list]),
                existing => return Err(conflict(existing, "amqp-sequence")),
            }
        }
        section::AMQP_VALUE => match &message.body {
            Body::Empty => message.body = Body::Value(value),
            existing => return Err(conflict(existing, "amqp-value")),
        },
        section::FOOTER => message.footer = expect_map(value)?,
        code => return Err(MessageDecodeError::UnknownSection { code }),
    }
    Ok(())
}

fn conflict(existing: &Body, found: &'static str) -> MessageDecodeError {
    MessageDecodeError::ConflictingBody {
        existing: existing.kind(),
        found,
    }
}

fn expect_map(value: AmqpValue) -> Result<Vec<(AmqpValue, AmqpValue)>, DecodeError> {
    match value {
        AmqpValue::Map(pairs) => Ok(pairs),
        other => Err(DecodeError::unexpected("map", &other)),
    }
}

fn decode_header(value: AmqpValue) -> Result<Header, DecodeError> {
    let mut fields = Fields::new("header", value)?;
    Ok(Header {
        durable: fields.opt_bool(0)?.unwrap_or(false),
        priority: fields.opt_u8(1)?,
        ttl: fields.opt_u32(2)?,
        first_acquirer: fields.opt_bool(3)?.unwrap_or(false),
        delivery_count: fields.opt_u32(4)?.unwrap_or(0),
    })
}

fn decode_properties(value: AmqpValue) -> Result<Properties, DecodeError> {
    let mut fields = Fields::new("properties", value)?;
    Ok(Properties {
        message_id: fields.opt_value(0),
        user_id: fields.opt_binary(1)?,
        to: fields.opt_string(2)?,
        subject: fields.opt_string(3)?,
        reply_to: fields.opt_string(4)?,
        correlation_id: fields.opt_value(5),
        content_type: fields.opt_symbol(6)?,
        content_encoding: fields.opt_symbol(7)?,
        absolute_expiry_time: fields.opt_timestamp(8)?,
        creation_time: fields.opt_timestamp(9)?,
        group_id: fields.opt_string(10)?,
        group_sequence: fields.opt_u32(11)?,
        reply_to_group_id: fields.opt_string(12)?,
    })
}
