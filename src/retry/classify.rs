use std::time::Duration;

/// The retry-relevant shape of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The call did not complete before its deadline
    Timeout,
    /// Connection refused, reset, DNS or TLS failure
    Connection,
    /// The upstream answered with a non-success HTTP status
    Status(u16),
    /// The response arrived but could not be understood
    Parse,
    /// The caller gave up; never retried, never counted as a failure
    Cancelled,
    Other,
}

impl ErrorKind {
    /// The HTTP status carried by this kind, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            _ => None,
        }
    }
}

/// Implemented by errors that flow through the retry engine and circuit breaker
pub trait Classify {
    fn kind(&self) -> ErrorKind;

    /// Server-provided hint for how long to wait (e.g. `Retry-After`)
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}
