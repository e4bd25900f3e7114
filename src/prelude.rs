//! Convenient re-exports for common Turnstile types.
pub use crate::{
    admission::{AdmissionControl, AdmissionPolicy},
    error::{AdmissionError, InvalidInvocation},
    identity::{AddressMetadata, CallerIdentity, IdentityResolver},
    middleware::{AdmissionLayer, AdmissionTarget},
    rate::Rate,
    registry::{AdmissionDecision, LimiterRegistry},
    request::{PeerAddr, RequestInfo},
};
