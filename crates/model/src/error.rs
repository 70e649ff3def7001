use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The source didn't answer in time.
    Timeout,
    /// The answer source is rate limited.
    RateLimitExceeded,
    /// The source answered with something that can't be understood.
    MalformedPayload,
    /// Any other errors.
    Other,
}

impl ErrorKind {
    /// Returns `true` if retrying the same request later may succeed.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::RateLimitExceeded)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Timeout => write!(f, "Timed out"),
            ErrorKind::RateLimitExceeded => write!(f, "Rate limit exceeded"),
            ErrorKind::MalformedPayload => write!(f, "Malformed payload"),
            ErrorKind::Other => write!(f, "Other error"),
        }
    }
}
