use thiserror::Error;

/// Errors from the packet codec and line codec.
///
/// Shared between `streamwire-codec` (which returns it) and `streamwire` (which wraps it into
/// its own transport-level error types).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("length {value} does not fit in a {field:?} header field")]
    LengthOverflow { field: &'static str, value: u64 },

    #[error("line exceeds the {0} byte maximum")]
    MaxLine(usize),

    #[error("line is missing its terminating newline")]
    InvalidLine,

    #[error("invalid line count prefix")]
    InvalidLineCount,

    #[error("malformed lines frame")]
    InvalidLines,

    #[error("varint is not valid (too long or truncated)")]
    InvalidVarint,
}

/// Failures recognized when a dialer attempts to resolve and connect to a [`crate::Multiaddr`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DialError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("connection refused")]
    ConnectionRefused,

    #[error("connect timed out")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for DialError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionRefused => DialError::ConnectionRefused,
            std::io::ErrorKind::TimedOut => DialError::Timeout,
            _ => DialError::Other(err.to_string()),
        }
    }
}
