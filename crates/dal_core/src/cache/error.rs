use crate::cache::serializer::SerializationError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CacheResult<T> = Result<T, CacheError>;

/// Failure of one cache call.
#[derive(Debug)]
pub enum CacheError {
    /// The store could not be reached.
    Connection(String),
    /// The store rejected the command.
    Command(String),
    /// The key holds a value of another kind (string vs set vs list).
    WrongType(String),
    /// The stored value is not an integer, or the increment overflowed.
    NotInteger(String),
    Serialization(SerializationError),
    /// A raw string read found bytes that are not UTF-8.
    InvalidData(String),
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(message) => write!(f, "cache connection failure: {message}"),
            Self::Command(message) => write!(f, "cache command failed: {message}"),
            Self::WrongType(key) => {
                write!(f, "key `{key}` holds a value of the wrong kind")
            }
            Self::NotInteger(message) => write!(f, "value is not an integer: {message}"),
            Self::Serialization(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid cached data: {message}"),
        }
    }
}

impl Error for CacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Serialization(err) => Some(err),
            Self::Connection(_)
            | Self::Command(_)
            | Self::WrongType(_)
            | Self::NotInteger(_)
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<SerializationError> for CacheError {
    fn from(value: SerializationError) -> Self {
        Self::Serialization(value)
    }
}
