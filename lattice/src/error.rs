use std::error;
use std::fmt;
use std::io;

/// Library-wide error type. Transport closure is deliberately not a variant;
/// receive operations signal it with `Ok(None)` and sends with `Ok(false)`.
#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    /// The buffer ended before the typed read completed.
    Truncated,
    /// A deserialized string was not valid UTF-8.
    InvalidUtf8,
    /// A tagged-union index outside the variant range.
    InvalidVariantTag,
    /// The message id in the buffer does not match the expected type.
    IdMismatch,
    /// The frame exceeds what the configured size scalar can describe.
    OversizedFrame,
    /// CRC mismatch on a datagram.
    CorruptFrame,
    /// The received id has no registered factory.
    UnknownMessage,
    /// A message name was registered twice.
    DuplicateMessage,
    /// Registration was attempted after ids were materialized.
    RegistryFrozen,
    /// More registered messages than the id type can enumerate.
    TooManyMessages,
    /// A cipher key that is empty or not decodable.
    InvalidKey,
    Io(io::ErrorKind),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated => write!(f, "buffer too short for the typed read"),
            Error::InvalidUtf8 => write!(f, "string data is not valid utf-8"),
            Error::InvalidVariantTag => write!(f, "tagged union index out of range"),
            Error::IdMismatch => write!(f, "message id does not match the expected type"),
            Error::OversizedFrame => write!(f, "frame exceeds the configured size limit"),
            Error::CorruptFrame => write!(f, "datagram crc mismatch"),
            Error::UnknownMessage => write!(f, "no factory registered for the message id"),
            Error::DuplicateMessage => write!(f, "message name already registered"),
            Error::RegistryFrozen => write!(f, "registration attempted after id assignment"),
            Error::TooManyMessages => write!(f, "message id type too small for the registered set"),
            Error::InvalidKey => write!(f, "cipher key is empty or undecodable"),
            Error::Io(kind) => write!(f, "i/o failure: {:?}", kind),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(io_error: io::Error) -> Self {
        Error::Io(io_error.kind())
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;
