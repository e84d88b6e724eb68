//! Encoder producing the AMQP 1.0 wire form of [`AmqpValue`]s.
//!
//! Scalars use the most compact encoding available (`uint0`, `smalluint`,
//! `str8`, `list8`, ...). Arrays always use the wide element constructor so
//! every element shares a single format code.

use bytes::{BufMut, BytesMut};

use super::{AmqpValue, DESCRIBED, Descriptor};

impl AmqpValue {
    /// Append the encoding of `self` to `buf`.
    ///
    /// # Examples
    ///
    /// ```
    /// use amqp_receiver::types::AmqpValue;
    /// use bytes::BytesMut;
    ///
    /// let mut buf = BytesMut::new();
    /// AmqpValue::Uint(7).encode(&mut buf);
    /// assert_eq!(&buf[..], &[0x52, 0x07]);
    /// ```
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Bool(true) => buf.put_u8(0x41),
            Self::Bool(false) => buf.put_u8(0x42),
            Self::Uint(0) => buf.put_u8(0x43),
            Self::Uint(value) if *value <= u32::from(u8::MAX) => {
                buf.put_u8(0x52);
                buf.put_u8(value.to_be_bytes()[3]);
            }
            Self::Ulong(0) => buf.put_u8(0x44),
            Self::Ulong(value) if *value <= u64::from(u8::MAX) => {
                buf.put_u8(0x53);
                buf.put_u8(value.to_be_bytes()[7]);
            }
            Self::Int(value) if i8::try_from(*value).is_ok() => {
                buf.put_u8(0x54);
                buf.put_slice(&value.to_be_bytes()[3..]);
            }
            Self::Long(value) if i8::try_from(*value).is_ok() => {
                buf.put_u8(0x55);
                buf.put_slice(&value.to_be_bytes()[7..]);
            }
            Self::Binary(bytes) if bytes.len() <= usize::from(u8::MAX) => {
                put_short_variable(buf, 0xa0, bytes);
            }
            Self::String(text) if text.len() <= usize::from(u8::MAX) => {
                put_short_variable(buf, 0xa1, text.as_bytes());
            }
            Self::Symbol(name) if name.len() <= usize::from(u8::MAX) => {
                put_short_variable(buf, 0xa3, name.as_bytes());
            }
            Self::List(items) if items.is_empty() => buf.put_u8(0x45),
            Self::List(items) => {
                let mut body = BytesMut::new();
                items.iter().for_each(|item| item.encode(&mut body));
                put_compound(buf, 0xc0, items.len(), &body);
            }
            Self::Map(pairs) => {
                let mut body = BytesMut::new();
                for (key, value) in pairs {
                    key.encode(&mut body);
                    value.encode(&mut body);
                }
                put_compound(buf, 0xc1, pairs.len() * 2, &body);
            }
            Self::Described(described) => {
                buf.put_u8(DESCRIBED);
                encode_descriptor(&described.descriptor, buf);
                described.value.encode(buf);
            }
            other => {
                buf.put_u8(other.wide_code());
                other.encode_wide_payload(buf);
            }
        }
    }

    /// Encode `self` into a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf
    }

    /// Format code of the widest fixed encoding for this variant.
    fn wide_code(&self) -> u8 {
        match self {
            Self::Null => 0x40,
            Self::Bool(_) => 0x56,
            Self::Ubyte(_) => 0x50,
            Self::Ushort(_) => 0x60,
            Self::Uint(_) => 0x70,
            Self::Ulong(_) => 0x80,
            Self::Byte(_) => 0x51,
            Self::Short(_) => 0x61,
            Self::Int(_) => 0x71,
            Self::Long(_) => 0x81,
            Self::Float(_) => 0x72,
            Self::Double(_) => 0x82,
            Self::Decimal32(_) => 0x74,
            Self::Decimal64(_) => 0x84,
            Self::Decimal128(_) => 0x94,
            Self::Char(_) => 0x73,
            Self::Timestamp(_) => 0x83,
            Self::Uuid(_) => 0x98,
            Self::Binary(_) => 0xb0,
            Self::String(_) => 0xb1,
            Self::Symbol(_) => 0xb3,
            Self::List(_) => 0xd0,
            Self::Map(_) => 0xd1,
            Self::Array(_) => 0xf0,
            Self::Described(described) => described.value.wide_code(),
        }
    }

    /// Payload matching [`wide_code`](Self::wide_code), without the constructor.
    fn encode_wide_payload(&self, buf: &mut BytesMut) {
        match self {
            Self::Null => {}
            Self::Bool(value) => buf.put_u8(u8::from(*value)),
            Self::Ubyte(value) => buf.put_u8(*value),
            Self::Ushort(value) => buf.put_u16(*value),
            Self::Uint(value) => buf.put_u32(*value),
            Self::Ulong(value) => buf.put_u64(*value),
            Self::Byte(value) => buf.put_i8(*value),
            Self::Short(value) => buf.put_i16(*value),
            Self::Int(value) => buf.put_i32(*value),
            Self::Long(value) | Self::Timestamp(value) => buf.put_i64(*value),
            Self::Float(value) => buf.put_f32(*value),
            Self::Double(value) => buf.put_f64(*value),
            Self::Decimal32(raw) => buf.put_slice(raw),
            Self::Decimal64(raw) => buf.put_slice(raw),
            Self::Decimal128(raw) | Self::Uuid(raw) => buf.put_slice(raw),
            Self::Char(value) => buf.put_u32(u32::from(*value)),
            Self::Binary(bytes) => put_long_variable(buf, bytes),
            Self::String(text) | Self::Symbol(text) => put_long_variable(buf, text.as_bytes()),
            Self::List(items) => {
                let mut body = BytesMut::new();
                items.iter().for_each(|item| item.encode(&mut body));
                put_wide_compound(buf, items.len(), &body);
            }
            Self::Map(pairs) => {
                let mut body = BytesMut::new();
                for (key, value) in pairs {
                    key.encode(&mut body);
                    value.encode(&mut body);
                }
                put_wide_compound(buf, pairs.len() * 2, &body);
            }
            Self::Array(items) => encode_array_payload(items, buf),
            Self::Described(described) => described.value.encode_wide_payload(buf),
        }
    }
}

fn encode_descriptor(descriptor: &Descriptor, buf: &mut BytesMut) {
    match descriptor {
        Descriptor::Code(code) => AmqpValue::Ulong(*code).encode(buf),
        Descriptor::Symbol(name) => AmqpValue::Symbol(name.clone()).encode(buf),
    }
}

fn put_short_variable(buf: &mut BytesMut, code: u8, raw: &[u8]) {
    buf.put_u8(code);
    buf.put_u8(u8::try_from(raw.len()).unwrap_or(u8::MAX));
    buf.put_slice(raw);
}

fn put_long_variable(buf: &mut BytesMut, raw: &[u8]) {
    buf.put_u32(u32::try_from(raw.len()).unwrap_or(u32::MAX));
    buf.put_slice(raw);
}

/// Write a list or map using the 8-bit form when it fits, else the 32-bit form.
fn put_compound(buf: &mut BytesMut, short_code: u8, count: usize, body: &[u8]) {
    match (u8::try_from(body.len() + 1), u8::try_from(count)) {
        (Ok(size), Ok(count)) => {
            buf.put_u8(short_code);
            buf.put_u8(size);
            buf.put_u8(count);
            buf.put_slice(body);
        }
        _ => {
            buf.put_u8(short_code + 0x10);
            put_wide_compound(buf, count, body);
        }
    }
}

fn put_wide_compound(buf: &mut BytesMut, count: usize, body: &[u8]) {
    buf.put_u32(u32::try_from(body.len() + 4).unwrap_or(u32::MAX));
    buf.put_u32(u32::try_from(count).unwrap_or(u32::MAX));
    buf.put_slice(body);
}

/// Arrays share the first element's constructor; an empty array uses `null`.
fn encode_array_payload(items: &[AmqpValue], buf: &mut BytesMut) {
    let mut body = BytesMut::new();
    match items.first() {
        None => body.put_u8(0x40),
        Some(AmqpValue::Described(first)) => {
            body.put_u8(DESCRIBED);
            encode_descriptor(&first.descriptor, &mut body);
            body.put_u8(first.value.wide_code());
        }
        Some(first) => body.put_u8(first.wide_code()),
    }
    items
        .iter()
        .for_each(|item| item.encode_wide_payload(&mut body));
    put_wide_compound(buf, items.len(), &body);
}
