//! Error types for admission control
use crate::rate::Rate;
use http::StatusCode;
use std::fmt;

/// Admission control was attached to an operation that cannot be keyed.
///
/// This is an integration defect, not a per-request condition: the operation is invoked
/// without the request context needed to identify the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidInvocation {
    /// No request context was supplied to the admission check.
    #[error("request context is missing; admission control needs the in-flight request")]
    MissingRequestContext,
    /// The request has no usable forwarding header and no peer address.
    #[error("request carries no forwarding header and no peer address")]
    MissingPeerAddress,
}

/// Error returned by guarded operations and the admission middleware
#[derive(Debug, Clone)]
pub enum AdmissionError<E> {
    /// The caller exhausted its budget for the configured rate
    RateLimited { rate: Rate },
    /// The operation could not be keyed to a caller
    InvalidInvocation(InvalidInvocation),
    /// The underlying operation failed
    Inner(E),
}
impl<E: fmt::Display> fmt::Display for AdmissionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited { rate } => write!(f, "rate limit exceeded (limit: {})", rate),
            Self::InvalidInvocation(e) => write!(f, "invalid admission check: {}", e),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}
impl<E: std::error::Error + 'static> std::error::Error for AdmissionError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::InvalidInvocation(e) => Some(e),
            Self::RateLimited { .. } => None,
        }
    }
}
impl<E> From<InvalidInvocation> for AdmissionError<E> {
    fn from(e: InvalidInvocation) -> Self {
        Self::InvalidInvocation(e)
    }
}
impl<E> AdmissionError<E> {
    /// Check if the caller was throttled
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
    /// Check if admission control is misconfigured for this operation
    pub fn is_invalid_invocation(&self) -> bool {
        matches!(self, Self::InvalidInvocation(_))
    }
    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }
    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
    /// Status a host should answer with, or `None` for inner errors, which the wrapped
    /// operation maps itself.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            Self::InvalidInvocation(_) => Some(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Inner(_) => None,
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DummyError(&'static str);
    impl fmt::Display for DummyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    impl std::error::Error for DummyError {}
    fn rate() -> Rate {
        Rate::per_second(5.0).unwrap()
    }
    #[test]
    fn rate_limited_display() {
        let err: AdmissionError<io::Error> = AdmissionError::RateLimited { rate: rate() };
        let msg = format!("{}", err);
        assert!(msg.contains("rate limit exceeded"));
        assert!(msg.contains("5/s"));
    }
    #[test]
    fn invalid_invocation_display_includes_reason() {
        let err: AdmissionError<io::Error> = InvalidInvocation::MissingRequestContext.into();
        let msg = format!("{}", err);
        assert!(msg.contains("invalid admission check"));
        assert!(msg.contains("request context is missing"));
    }
    #[test]
    fn status_codes_distinguish_throttling_from_defects() {
        let limited: AdmissionError<DummyError> = AdmissionError::RateLimited { rate: rate() };
        assert_eq!(limited.status_code(), Some(StatusCode::TOO_MANY_REQUESTS));
        let invalid: AdmissionError<DummyError> =
            AdmissionError::InvalidInvocation(InvalidInvocation::MissingPeerAddress);
        assert_eq!(invalid.status_code(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        let inner = AdmissionError::Inner(DummyError("x"));
        assert_eq!(inner.status_code(), None);
    }
    #[test]
    fn predicates_cover_all_variants() {
        let limited: AdmissionError<DummyError> = AdmissionError::RateLimited { rate: rate() };
        assert!(limited.is_rate_limited());
        assert!(!limited.is_invalid_invocation());
        assert!(!limited.is_inner());
        let invalid: AdmissionError<DummyError> =
            InvalidInvocation::MissingRequestContext.into();
        assert!(invalid.is_invalid_invocation());
        assert!(!invalid.is_rate_limited());
        let inner = AdmissionError::Inner(DummyError("x"));
        assert!(inner.is_inner());
    }
    #[test]
    fn source_chains_to_cause() {
        let limited: AdmissionError<DummyError> = AdmissionError::RateLimited { rate: rate() };
        assert!(limited.source().is_none());
        let invalid: AdmissionError<DummyError> =
            InvalidInvocation::MissingRequestContext.into();
        assert!(invalid.source().is_some());
        let inner = AdmissionError::Inner(DummyError("boom"));
        assert_eq!(inner.source().unwrap().to_string(), "boom");
    }
    #[test]
    fn inner_accessors_work() {
        let err = AdmissionError::Inner(DummyError("x"));
        assert_eq!(err.as_inner(), Some(&DummyError("x")));
        assert_eq!(err.into_inner(), Some(DummyError("x")));
        let limited: AdmissionError<DummyError> = AdmissionError::RateLimited { rate: rate() };
        assert!(limited.into_inner().is_none());
    }
}
