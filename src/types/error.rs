//! Error type for AMQP 1.0 primitive decoding.

use thiserror::Error;

/// Errors produced while decoding AMQP 1.0 encoded values.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended before the value was complete.
    #[error("unexpected end of input: need {needed} bytes, have {remaining}")]
    UnexpectedEof {
        /// Bytes the decoder needed to continue.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// The constructor byte does not name a known encoding.
    #[error("invalid format code: {0:#04x}")]
    InvalidFormatCode(u8),

    /// A string or symbol did not contain valid UTF-8.
    #[error("invalid utf-8 in {kind}")]
    InvalidUtf8 {
        /// Whether the offending value was a string or a symbol.
        kind: &'static str,
    },

    /// A `char` value is not a Unicode scalar value.
    #[error("invalid char code point: {0:#x}")]
    InvalidChar(u32),

    /// A compound declared more elements than its payload can hold.
    #[error("element count {count} exceeds payload of {size} bytes")]
    CountExceedsSize {
        /// Declared element count.
        count: usize,
        /// Bytes available for the elements.
        size: usize,
    },

    /// A compound payload was not fully consumed by its elements.
    #[error("compound size mismatch: {trailing} trailing bytes")]
    SizeMismatch {
        /// Bytes left over after decoding every declared element.
        trailing: usize,
    },

    /// A map carried an odd number of elements.
    #[error("map has odd element count {0}")]
    OddMapCount(usize),

    /// Values nested deeper than the decoder allows.
    #[error("nesting depth exceeds {0}")]
    DepthExceeded(usize),

    /// A descriptor was neither a `ulong` nor a `symbol`.
    #[error("invalid descriptor type: {found}")]
    InvalidDescriptor {
        /// AMQP type name of the descriptor that was found.
        found: &'static str,
    },

    /// A value had a different type than the caller required.
    #[error("expected {expected}, found {found}")]
    UnexpectedType {
        /// AMQP type name the caller required.
        expected: &'static str,
        /// AMQP type name actually decoded.
        found: &'static str,
    },

    /// A mandatory composite field was absent or null.
    #[error("missing mandatory field {field} in {composite}")]
    MissingField {
        /// Composite type being decoded.
        composite: &'static str,
        /// Name of the absent field.
        field: &'static str,
    },
}

impl DecodeError {
    pub(crate) fn unexpected(expected: &'static str, found: &super::AmqpValue) -> Self {
        Self::UnexpectedType {
            expected,
            found: found.type_name(),
        }
    }
}
