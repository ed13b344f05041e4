//! Result of one remote call.

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    /// The service understood the request and said no ("face not matched",
    /// "Invalid OTP"). Retrying needs new input from the user.
    Rejected(String),
    /// The request did not complete (connection, timeout, 5xx, bad body).
    /// Safe to re-issue unchanged.
    TransportFailure(String),
}

impl<T> Outcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    /// Only transport failures may be retried with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Outcome::TransportFailure(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Ok(v) => Outcome::Ok(f(v)),
            Outcome::Rejected(r) => Outcome::Rejected(r),
            Outcome::TransportFailure(d) => Outcome::TransportFailure(d),
        }
    }

    /// Chain a fallible conversion of the payload.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self {
            Outcome::Ok(v) => f(v),
            Outcome::Rejected(r) => Outcome::Rejected(r),
            Outcome::TransportFailure(d) => Outcome::TransportFailure(d),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(v) => Some(v),
            _ => None,
        }
    }

    /// Human-readable failure text, if any.
    pub fn failure(&self) -> Option<&str> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Rejected(r) => Some(r),
            Outcome::TransportFailure(d) => Some(d),
        }
    }
}

impl<T> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ok(_) => f.write_str("ok"),
            Outcome::Rejected(r) => write!(f, "rejected: {r}"),
            Outcome::TransportFailure(d) => write!(f, "transport failure: {d}"),
        }
    }
}
