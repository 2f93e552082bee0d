//! # Error Definitions
//!
//! Every way a buffer can fail to be a well-formed solowire document.

use crate::pack::Scope;

/// Wire format violations, raised while encoding or decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Byte does not correspond to a valid `Tag`, or a different tag was expected.
    InvalidTag(u8),
    /// String data is not valid UTF-8.
    InvalidUtf8,
    /// Buffer exhausted while reading.
    UnexpectedEnd,
    /// Blob or container length exceeds `u32::MAX`.
    BlobTooLarge(usize),
    /// Closing a scope that does not match the innermost open scope.
    ScopeMismatch { expected: Scope, actual: Scope },
    /// Attempted to close a scope when only the root remains.
    ScopeUnderflow,
    /// Attempted to finalize the buffer with open scopes.
    ScopeStillOpen,
    /// A variant received more than its single payload item.
    TooManyItems,
    /// A variant was closed without a payload item.
    EmptyVariant,
    /// A map may only contain variants (key/value pairs).
    InvalidMapEntry,
    /// Bytes were left over after a complete frame was read.
    TrailingBytes(usize),
    /// A frame was missing a required field.
    MissingField(&'static str),
    /// An unknown frame type, reply kind or failure kind was encountered.
    UnknownVariant(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTag(b) => write!(f, "Invalid tag byte: {:#04x}", b),
            Self::InvalidUtf8 => write!(f, "String is not valid UTF-8"),
            Self::UnexpectedEnd => write!(f, "Unexpected end of buffer"),
            Self::BlobTooLarge(len) => write!(f, "Blob of {} bytes is too large", len),
            Self::ScopeMismatch { expected, actual } => {
                write!(f, "Scope mismatch: expected {:?}, found {:?}", expected, actual)
            }
            Self::ScopeUnderflow => write!(f, "Closed more scopes than were opened"),
            Self::ScopeStillOpen => write!(f, "Encoder finalized with open scopes"),
            Self::TooManyItems => write!(f, "Variant holds more than one payload item"),
            Self::EmptyVariant => write!(f, "Variant closed without a payload item"),
            Self::InvalidMapEntry => write!(f, "Map entries must be variants"),
            Self::TrailingBytes(n) => write!(f, "{} trailing bytes after frame", n),
            Self::MissingField(name) => write!(f, "Missing field '{}'", name),
            Self::UnknownVariant(name) => write!(f, "Unknown variant '{}'", name),
        }
    }
}

impl std::error::Error for Error {}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;
