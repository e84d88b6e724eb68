//! AMQP 1.0 type system.
//!
//! [`AmqpValue`] models every primitive and compound type defined by the
//! AMQP 1.0 type system along with described values. The [`decode`] and
//! [`encode`] submodules move values to and from their wire encodings.
//! Composite types (performatives, message sections) are described lists;
//! [`Fields`] gives positional, typed access to their members.

use bytes::Bytes;

pub mod decode;
pub mod encode;
pub mod error;

pub use decode::{MAX_NESTING_DEPTH, decode_value};
pub use error::DecodeError;

/// Constructor byte introducing a described value.
pub(crate) const DESCRIBED: u8 = 0x00;

/// A single AMQP 1.0 value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum AmqpValue {
    /// The null value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// Unsigned 8-bit integer.
    Ubyte(u8),
    /// Unsigned 16-bit integer.
    Ushort(u16),
    /// Unsigned 32-bit integer.
    Uint(u32),
    /// Unsigned 64-bit integer.
    Ulong(u64),
    /// Signed 8-bit integer.
    Byte(i8),
    /// Signed 16-bit integer.
    Short(i16),
    /// Signed 32-bit integer.
    Int(i32),
    /// Signed 64-bit integer.
    Long(i64),
    /// IEEE 754 binary32.
    Float(f32),
    /// IEEE 754 binary64.
    Double(f64),
    /// IEEE 754 decimal32, kept as raw bytes.
    Decimal32([u8; 4]),
    /// IEEE 754 decimal64, kept as raw bytes.
    Decimal64([u8; 8]),
    /// IEEE 754 decimal128, kept as raw bytes.
    Decimal128([u8; 16]),
    /// A single Unicode character.
    Char(char),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    /// RFC 4122 UUID bytes.
    Uuid([u8; 16]),
    /// Opaque binary data.
    Binary(Bytes),
    /// UTF-8 text.
    String(String),
    /// Symbolic value from a constrained domain.
    Symbol(String),
    /// Sequence of polymorphic values.
    List(Vec<AmqpValue>),
    /// Polymorphic key/value pairs in wire order.
    Map(Vec<(AmqpValue, AmqpValue)>),
    /// Sequence of values sharing one constructor.
    Array(Vec<AmqpValue>),
    /// A value annotated with a descriptor.
    Described(Box<Described>),
}

/// Descriptor attached to a described value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Descriptor {
    /// Numeric descriptor (`domain-id << 32 | descriptor-id`).
    Code(u64),
    /// Symbolic descriptor such as `amqp:open:list`.
    Symbol(String),
}

/// A described value: a descriptor plus the value it annotates.
#[derive(Clone, Debug, PartialEq)]
pub struct Described {
    /// Descriptor identifying the composite or restricted type.
    pub descriptor: Descriptor,
    /// The annotated value.
    pub value: AmqpValue,
}

impl AmqpValue {
    /// Build a described value with a numeric descriptor.
    #[must_use]
    pub fn described(code: u64, value: AmqpValue) -> Self {
        Self::Described(Box::new(Described {
            descriptor: Descriptor::Code(code),
            value,
        }))
    }

    /// Build a described list, the encoding of every AMQP composite type.
    #[must_use]
    pub fn composite(code: u64, fields: Vec<AmqpValue>) -> Self {
        Self::described(code, Self::List(trim_trailing_nulls(fields)))
    }

    /// AMQP type name, used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Ubyte(_) => "ubyte",
            Self::Ushort(_) => "ushort",
            Self::Uint(_) => "uint",
            Self::Ulong(_) => "ulong",
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Decimal32(_) => "decimal32",
            Self::Decimal64(_) => "decimal64",
            Self::Decimal128(_) => "decimal128",
            Self::Char(_) => "char",
            Self::Timestamp(_) => "timestamp",
            Self::Uuid(_) => "uuid",
            Self::Binary(_) => "binary",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Array(_) => "array",
            Self::Described(_) => "described",
        }
    }

    /// Returns `true` for the null value.
    #[must_use]
    pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

    /// Borrow the text of a `string` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    /// Split a described value into its numeric descriptor and inner value.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedType`] when the value is not described
    /// by a `ulong` descriptor.
    pub fn into_described_code(self) -> Result<(u64, AmqpValue), DecodeError> {
        match self {
            Self::Described(described) => match described.descriptor {
                Descriptor::Code(code) => Ok((code, described.value)),
                Descriptor::Symbol(_) => Err(DecodeError::UnexpectedType {
                    expected: "ulong descriptor",
                    found: "symbol",
                }),
            },
            other => Err(DecodeError::unexpected("described", &other)),
        }
    }
}

impl From<&str> for AmqpValue {
    fn from(value: &str) -> Self { Self::String(value.to_owned()) }
}

impl From<String> for AmqpValue {
    fn from(value: String) -> Self { Self::String(value) }
}

impl From<u32> for AmqpValue {
    fn from(value: u32) -> Self { Self::Uint(value) }
}

impl From<u64> for AmqpValue {
    fn from(value: u64) -> Self { Self::Ulong(value) }
}

impl From<bool> for AmqpValue {
    fn from(value: bool) -> Self { Self::Bool(value) }
}

impl<T: Into<AmqpValue>> From<Option<T>> for AmqpValue {
    fn from(value: Option<T>) -> Self { value.map_or(Self::Null, Into::into) }
}

/// Composite encodings may omit trailing null fields.
fn trim_trailing_nulls(mut fields: Vec<AmqpValue>) -> Vec<AmqpValue> {
    while fields.last().is_some_and(AmqpValue::is_null) {
        fields.pop();
    }
    fields
}

/// Positional accessor over the fields of a composite list.
///
/// Absent trailing fields read as null, matching the composite encoding
/// rules.
#[derive(Debug)]
pub struct Fields {
    composite: &'static str,
    values: Vec<AmqpValue>,
}

impl Fields {
    /// Wrap the list carried by a composite value.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedType`] when `value` is not a list.
    pub fn new(composite: &'static str, value: AmqpValue) -> Result<Self, DecodeError> {
        match value {
            AmqpValue::List(values) => Ok(Self { composite, values }),
            other => Err(DecodeError::unexpected("list", &other)),
        }
    }

    /// Take field `index`, leaving null in its place.
    pub fn take(&mut self, index: usize) -> AmqpValue {
        self.values
            .get_mut(index)
            .map_or(AmqpValue::Null, std::mem::take)
    }

    fn missing(&self, field: &'static str) -> DecodeError {
        DecodeError::MissingField {
            composite: self.composite,
            field,
        }
    }

    /// Optional `uint` field; `smalluint` and `uint0` decode to the same variant.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedType`] for non-`uint` values.
    pub fn opt_u32(&mut self, index: usize) -> Result<Option<u32>, DecodeError> {
        match self.take(index) {
            AmqpValue::Null => Ok(None),
            AmqpValue::Uint(value) => Ok(Some(value)),
            other => Err(DecodeError::unexpected("uint", &other)),
        }
    }

    /// Mandatory `uint` field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MissingField`] when null, or
    /// [`DecodeError::UnexpectedType`] for non-`uint` values.
    pub fn u32(&mut self, index: usize, field: &'static str) -> Result<u32, DecodeError> {
        self.opt_u32(index)?.ok_or_else(|| self.missing(field))
    }

    /// Optional `ulong` field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedType`] for non-`ulong` values.
    pub fn opt_u64(&mut self, index: usize) -> Result<Option<u64>, DecodeError> {
        match self.take(index) {
            AmqpValue::Null => Ok(None),
            AmqpValue::Ulong(value) => Ok(Some(value)),
            other => Err(DecodeError::unexpected("ulong", &other)),
        }
    }

    /// Optional `ushort` field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedType`] for non-`ushort` values.
    pub fn opt_u16(&mut self, index: usize) -> Result<Option<u16>, DecodeError> {
        match self.take(index) {
            AmqpValue::Null => Ok(None),
            AmqpValue::Ushort(value) => Ok(Some(value)),
            other => Err(DecodeError::unexpected("ushort", &other)),
        }
    }

    /// Optional `ubyte` field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedType`] for non-`ubyte` values.
    pub fn opt_u8(&mut self, index: usize) -> Result<Option<u8>, DecodeError> {
        match self.take(index) {
            AmqpValue::Null => Ok(None),
            AmqpValue::Ubyte(value) => Ok(Some(value)),
            other => Err(DecodeError::unexpected("ubyte", &other)),
        }
    }

    /// Optional `boolean` field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedType`] for non-boolean values.
    pub fn opt_bool(&mut self, index: usize) -> Result<Option<bool>, DecodeError> {
        match self.take(index) {
            AmqpValue::Null => Ok(None),
            AmqpValue::Bool(value) => Ok(Some(value)),
            other => Err(DecodeError::unexpected("boolean", &other)),
        }
    }

    /// Mandatory `boolean` field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MissingField`] when null, or
    /// [`DecodeError::UnexpectedType`] for non-boolean values.
    pub fn bool(&mut self, index: usize, field: &'static str) -> Result<bool, DecodeError> {
        self.opt_bool(index)?.ok_or_else(|| self.missing(field))
    }

    /// Optional `string` field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedType`] for non-string values.
    pub fn opt_string(&mut self, index: usize) -> Result<Option<String>, DecodeError> {
        match self.take(index) {
            AmqpValue::Null => Ok(None),
            AmqpValue::String(value) => Ok(Some(value)),
            other => Err(DecodeError::unexpected("string", &other)),
        }
    }

    /// Mandatory `string` field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MissingField`] when null, or
    /// [`DecodeError::UnexpectedType`] for non-string values.
    pub fn string(&mut self, index: usize, field: &'static str) -> Result<String, DecodeError> {
        self.opt_string(index)?.ok_or_else(|| self.missing(field))
    }

    /// Optional `symbol` field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedType`] for non-symbol values.
    pub fn opt_symbol(&mut self, index: usize) -> Result<Option<String>, DecodeError> {
        match self.take(index) {
            AmqpValue::Null => Ok(None),
            AmqpValue::Symbol(value) => Ok(Some(value)),
            other => Err(DecodeError::unexpected("symbol", &other)),
        }
    }

    /// Optional `binary` field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedType`] for non-binary values.
    pub fn opt_binary(&mut self, index: usize) -> Result<Option<Bytes>, DecodeError> {
        match self.take(index) {
            AmqpValue::Null => Ok(None),
            AmqpValue::Binary(value) => Ok(Some(value)),
            other => Err(DecodeError::unexpected("binary", &other)),
        }
    }

    /// Optional `timestamp` field.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedType`] for non-timestamp values.
    pub fn opt_timestamp(&mut self, index: usize) -> Result<Option<i64>, DecodeError> {
        match self.take(index) {
            AmqpValue::Null => Ok(None),
            AmqpValue::Timestamp(value) => Ok(Some(value)),
            other => Err(DecodeError::unexpected("timestamp", &other)),
        }
    }

    /// Optional field of any type.
    pub fn opt_value(&mut self, index: usize) -> Option<AmqpValue> {
        match self.take(index) {
            AmqpValue::Null => None,
            value => Some(value),
        }
    }
}
