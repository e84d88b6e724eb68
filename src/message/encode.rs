//! Encoding of [`Message`]s into transfer payloads.

use bytes::BytesMut;

use super::{Body, Header, Message, Properties, section};
use crate::types::AmqpValue;

impl Message {
    /// Append the section encoding of this message to `buf`.
    ///
    /// Sections are written in the order the message format defines; empty
    /// annotation maps and absent sections are omitted.
    pub fn encode(&self, buf: &mut BytesMut) {
        if let Some(header) = &self.header {
            header.to_value().encode(buf);
        }
        put_map_section(buf, section::DELIVERY_ANNOTATIONS, &self.delivery_annotations);
        put_map_section(buf, section::MESSAGE_ANNOTATIONS, &self.message_annotations);
        if let Some(properties) = &self.properties {
            properties.to_value().encode(buf);
        }
        if !self.application_properties.is_empty() {
            let pairs = self
                .application_properties
                .iter()
                .map(|(key, value)| (AmqpValue::String(key.clone()), value.clone()))
                .collect();
            AmqpValue::described(section::APPLICATION_PROPERTIES, AmqpValue::Map(pairs))
                .encode(buf);
        }
        match &self.body {
            Body::Empty => {}
            Body::Value(value) => AmqpValue::described(section::AMQP_VALUE, value.clone()).encode(buf),
            Body::Data(chunks) => {
                for chunk in chunks {
                    AmqpValue::described(section::DATA, AmqpValue::Binary(chunk.clone())).encode(buf);
                }
            }
            Body::Sequence(lists) => {
                for list in lists {
                    AmqpValue::described(section::AMQP_SEQUENCE, AmqpValue::List(list.clone()))
                        .encode(buf);
                }
            }
        }
        put_map_section(buf, section::FOOTER, &self.footer);
    }

    /// Encode this message into a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf
    }
}

fn put_map_section(buf: &mut BytesMut, code: u64, pairs: &[(AmqpValue, AmqpValue)]) {
    if !pairs.is_empty() {
        AmqpValue::described(code, AmqpValue::Map(pairs.to_vec())).encode(buf);
    }
}

impl Header {
    fn to_value(&self) -> AmqpValue {
        AmqpValue::composite(
            section::HEADER,
            vec![
                AmqpValue::Bool(self.durable),
                self.priority.map_or(AmqpValue::Null, AmqpValue::Ubyte),
                self.ttl.into(),
                AmqpValue::Bool(self.first_acquirer),
                AmqpValue::Uint(self.delivery_count),
            ],
        )
    }
}

impl Properties {
    fn to_value(&self) -> AmqpValue {
        let symbol = |value: &Option<String>| value.clone().map_or(AmqpValue::Null, AmqpValue::Symbol);
        let timestamp = |value: Option<i64>| value.map_or(AmqpValue::Null, AmqpValue::Timestamp);
        AmqpValue::composite(
            section::PROPERTIES,
            vec![
                self.message_id.clone().unwrap_or_default(),
                self.user_id.clone().map_or(AmqpValue::Null, AmqpValue::Binary),
                self.to.clone().into(),
                self.subject.clone().into(),
                self.reply_to.clone().into(),
                self.correlation_id.clone().unwrap_or_default(),
                symbol(&self.content_type),
                symbol(&self.content_encoding),
                timestamp(self.absolute_expiry_time),
                timestamp(self.creation_time),
                self.group_id.clone().into(),
                self.group_sequence.into(),
                self.reply_to_group_id.clone().into(),
            ],
        )
    }
}
