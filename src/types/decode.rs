//! Bounded decoder for AMQP 1.0 encoded values.
//!
//! Every length and count field is checked against the bytes actually
//! available before anything is allocated, and nesting is capped at
//! [`MAX_NESTING_DEPTH`], so hostile input cannot force unbounded work.

use bytes::{Buf, Bytes};

use super::{AmqpValue, DESCRIBED, DecodeError, Described, Descriptor};

/// Deepest nesting of compound and described values accepted.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Largest array of zero-width elements (`null`, `true`, `uint0`, ...).
const MAX_ZERO_WIDTH_ELEMENTS: usize = 4096;

/// Decode one value from the front of `buf`, advancing it past the value.
///
/// # Errors
///
/// Returns a [`DecodeError`] when the bytes do not form a valid encoding.
///
/// # Examples
///
/// ```
/// use amqp_receiver::types::{AmqpValue, decode_value};
///
/// let mut input: &[u8] = &[0xa1, 0x02, b'h', b'i'];
/// assert_eq!(decode_value(&mut input), Ok(AmqpValue::from("hi")));
/// assert!(input.is_empty());
/// ```
pub fn decode_value(buf: &mut &[u8]) -> Result<AmqpValue, DecodeError> { decode_at(buf, 0) }

fn decode_at(buf: &mut &[u8], depth: usize) -> Result<AmqpValue, DecodeError> {
    let code = take_u8(buf)?;
    if code == DESCRIBED {
        let descriptor = decode_descriptor(buf, depth)?;
        let value = decode_at(buf, depth + 1)?;
        return Ok(AmqpValue::Described(Box::new(Described { descriptor, value })));
    }
    decode_with_code(code, buf, depth)
}

fn decode_descriptor(buf: &mut &[u8], depth: usize) -> Result<Descriptor, DecodeError> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(DecodeError::DepthExceeded(MAX_NESTING_DEPTH));
    }
    match decode_at(buf, depth + 1)? {
        AmqpValue::Ulong(code) => Ok(Descriptor::Code(code)),
        AmqpValue::Symbol(name) => Ok(Descriptor::Symbol(name)),
        other => Err(DecodeError::InvalidDescriptor {
            found: other.type_name(),
        }),
    }
}

fn ensure(buf: &[u8], needed: usize) -> Result<(), DecodeError> {
    if buf.len() < needed {
        return Err(DecodeError::UnexpectedEof {
            needed,
            remaining: buf.len(),
        });
    }
    Ok(())
}

fn take<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8], DecodeError> {
    ensure(buf, len)?;
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

fn take_array<const N: usize>(buf: &mut &[u8]) -> Result<[u8; N], DecodeError> {
    let mut out = [0_u8; N];
    out.copy_from_slice(take(buf, N)?);
    Ok(out)
}

fn take_u8(buf: &mut &[u8]) -> Result<u8, DecodeError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

fn take_u32(buf: &mut &[u8]) -> Result<u32, DecodeError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32())
}

fn take_len(buf: &mut &[u8], wide: bool) -> Result<usize, DecodeError> {
    if wide {
        take_u32(buf).map(|len| len as usize)
    } else {
        take_u8(buf).map(usize::from)
    }
}

fn take_utf8(buf: &mut &[u8], wide: bool, kind: &'static str) -> Result<String, DecodeError> {
    let len = take_len(buf, wide)?;
    let raw = take(buf, len)?;
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8 { kind })
}

/// Decode the payload following constructor `code`.
fn decode_with_code(code: u8, buf: &mut &[u8], depth: usize) -> Result<AmqpValue, DecodeError> {
    let value = match code {
        0x40 => AmqpValue::Null,
        0x41 => AmqpValue::Bool(true),
        0x42 => AmqpValue::Bool(false),
        0x56 => AmqpValue::Bool(take_u8(buf)? != 0),
        0x50 => AmqpValue::Ubyte(take_u8(buf)?),
        0x60 => AmqpValue::Ushort(u16::from_be_bytes(take_array(buf)?)),
        0x70 => AmqpValue::Uint(take_u32(buf)?),
        0x52 => AmqpValue::Uint(u32::from(take_u8(buf)?)),
        0x43 => AmqpValue::Uint(0),
        0x80 => AmqpValue::Ulong(u64::from_be_bytes(take_array(buf)?)),
        0x53 => AmqpValue::Ulong(u64::from(take_u8(buf)?)),
        0x44 => AmqpValue::Ulong(0),
        0x51 => AmqpValue::Byte(i8::from_be_bytes(take_array(buf)?)),
        0x61 => AmqpValue::Short(i16::from_be_bytes(take_array(buf)?)),
        0x71 => AmqpValue::Int(i32::from_be_bytes(take_array(buf)?)),
        0x54 => AmqpValue::Int(i32::from(i8::from_be_bytes(take_array(buf)?))),
        0x81 => AmqpValue::Long(i64::from_be_bytes(take_array(buf)?)),
        0x55 => AmqpValue::Long(i64::from(i8::from_be_bytes(take_array(buf)?))),
        0x72 => AmqpValue::Float(f32::from_be_bytes(take_array(buf)?)),
        0x82 => AmqpValue::Double(f64::from_be_bytes(take_array(buf)?)),
        0x74 => AmqpValue::Decimal32(take_array(buf)?),
        0x84 => AmqpValue::Decimal64(take_array(buf)?),
        0x94 => AmqpValue::Decimal128(take_array(buf)?),
        0x73 => {
            let point = take_u32(buf)?;
            AmqpValue::Char(char::from_u32(point).ok_or(DecodeError::InvalidChar(point))?)
        }
        0x83 => AmqpValue::Timestamp(i64::from_be_bytes(take_array(buf)?)),
        0x98 => AmqpValue::Uuid(take_array(buf)?),
        0xa0 | 0xb0 => {
            let len = take_len(buf, code == 0xb0)?;
            AmqpValue::Binary(Bytes::copy_from_slice(take(buf, len)?))
        }
        0xa1 | 0xb1 => AmqpValue::String(take_utf8(buf, code == 0xb1, "string")?),
        0xa3 | 0xb3 => AmqpValue::Symbol(take_utf8(buf, code == 0xb3, "symbol")?),
        0x45 => AmqpValue::List(Vec::new()),
        0xc0 | 0xd0 => AmqpValue::List(decode_list(buf, code == 0xd0, depth)?),
        0xc1 | 0xd1 => AmqpValue::Map(decode_map(buf, code == 0xd1, depth)?),
        0xe0 | 0xf0 => AmqpValue::Array(decode_array(buf, code == 0xf0, depth)?),
        other => return Err(DecodeError::InvalidFormatCode(other)),
    };
    Ok(value)
}

/// Split off a compound payload and read its element count.
fn compound_body<'a>(buf: &mut &'a [u8], wide: bool) -> Result<(&'a [u8], usize), DecodeError> {
    let size = take_len(buf, wide)?;
    let mut body = take(buf, size)?;
    let count = take_len(&mut body, wide)?;
    Ok((body, count))
}

fn enter(depth: usize) -> Result<usize, DecodeError> {
    let next = depth + 1;
    if next > MAX_NESTING_DEPTH {
        return Err(DecodeError::DepthExceeded(MAX_NESTING_DEPTH));
    }
    Ok(next)
}

fn finish(body: &[u8]) -> Result<(), DecodeError> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(DecodeError::SizeMismatch {
            trailing: body.len(),
        })
    }
}

fn decode_list(buf: &mut &[u8], wide: bool, depth: usize) -> Result<Vec<AmqpValue>, DecodeError> {
    let depth = enter(depth)?;
    let (mut body, count) = compound_body(buf, wide)?;
    if count > body.len() {
        return Err(DecodeError::CountExceedsSize {
            count,
            size: body.len(),
        });
    }
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(decode_at(&mut body, depth)?);
    }
    finish(body)?;
    Ok(items)
}

fn decode_map(
    buf: &mut &[u8],
    wide: bool,
    depth: usize,
) -> Result<Vec<(AmqpValue, AmqpValue)>, DecodeError> {
    let depth = enter(depth)?;
    let (mut body, count) = compound_body(buf, wide)?;
    if count % 2 != 0 {
        return Err(DecodeError::OddMapCount(count));
    }
    if count > body.len() {
        return Err(DecodeError::CountExceedsSize {
            count,
            size: body.len(),
        });
    }
    let mut pairs = Vec::with_capacity(count / 2);
    for _ in 0..count / 2 {
        let key = decode_at(&mut body, depth)?;
        let value = decode_at(&mut body, depth)?;
        pairs.push((key, value));
    }
    finish(body)?;
    Ok(pairs)
}

fn is_zero_width(code: u8) -> bool { matches!(code, 0x40 | 0x41 | 0x42 | 0x43 | 0x44 | 0x45) }

fn decode_array(buf: &mut &[u8], wide: bool, depth: usize) -> Result<Vec<AmqpValue>, DecodeError> {
    let depth = enter(depth)?;
    let (mut body, count) = compound_body(buf, wide)?;
    let mut code = take_u8(&mut body)?;
    let descriptor = if code == DESCRIBED {
        let descriptor = decode_descriptor(&mut body, depth)?;
        code = take_u8(&mut body)?;
        Some(descriptor)
    } else {
        None
    };
    let limit = if is_zero_width(code) {
        MAX_ZERO_WIDTH_ELEMENTS
    } else {
        body.len()
    };
    if count > limit {
        return Err(DecodeError::CountExceedsSize {
            count,
            size: body.len(),
        });
    }
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let value = decode_with_code(code, &mut body, depth)?;
        items.push(match &descriptor {
            Some(descriptor) => AmqpValue::Described(Box::new(Described {
                descriptor: descriptor.clone(),
                value,
            })),
            None => value,
        });
    }
    finish(body)?;
    Ok(items)
}
