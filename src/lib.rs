#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Turnstile
//!
//! Per-caller admission control for Rust services: every caller gets its own token bucket,
//! keyed by the address information on its requests.
//!
//! ## Features
//!
//! - **Caller identity** from forwarding headers with a peer-address fallback
//! - **Keyed registry** creating exactly one limiter per caller, even under contention
//! - **Lock-free token buckets** that never wait for capacity
//! - **Tower middleware** and an `execute` policy for explicit composition
//! - **Injectable clocks** for deterministic tests
//!
//! ## Quick Start
//!
//! ```rust
//! use turnstile::{AdmissionControl, AdmissionError, Rate, RequestInfo};
//!
//! #[tokio::main]
//! async fn main() {
//!     let control = AdmissionControl::new();
//!     let policy = control.policy(Rate::per_second(10.0).unwrap());
//!     let request = RequestInfo::new().with_header("X-Forwarded-For", "203.0.113.7, 10.0.0.1");
//!
//!     let result = policy.execute(Some(&request), || async {
//!         // Your protected operation here
//!         Ok::<_, std::io::Error>(())
//!     }).await;
//!
//!     if let Err(AdmissionError::RateLimited { .. }) = result {
//!         // answer with 429 Too Many Requests
//!     }
//! }
//! ```

pub mod admission;
pub mod clock;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod prelude;
pub mod rate;
pub mod registry;
pub mod request;
pub mod token_bucket;

// Re-exports
pub use admission::{AdmissionControl, AdmissionControlBuilder, AdmissionPolicy, BuildError};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{AdmissionError, InvalidInvocation};
pub use identity::{AddressMetadata, CallerIdentity, IdentityResolver, FORWARDED_HEADERS};
pub use middleware::{AdmissionFuture, AdmissionLayer, AdmissionService, AdmissionTarget};
pub use rate::{Rate, RateError};
pub use registry::{AdmissionDecision, LimiterEntry, LimiterRegistry};
pub use request::{PeerAddr, RequestInfo};
pub use token_bucket::TokenBucket;
