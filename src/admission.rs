//! Admission entry point for hosts.
//!
//! [`AdmissionControl`] composes identity resolution with the limiter registry:
//!
//! ```rust
//! use turnstile::{AdmissionControl, AdmissionDecision, Rate, RequestInfo};
//!
//! let control = AdmissionControl::new();
//! let rate = Rate::per_second(1.0).unwrap();
//! let request = RequestInfo::new().with_header("X-Forwarded-For", "203.0.113.5");
//!
//! assert_eq!(control.check(rate, Some(&request)), Ok(AdmissionDecision::Allowed));
//! assert_eq!(control.check(rate, Some(&request)), Ok(AdmissionDecision::Rejected));
//! ```
//!
//! [`AdmissionPolicy`] wraps an operation so it only runs when admitted, and
//! [`crate::AdmissionLayer`] does the same for tower services.

use crate::clock::Clock;
use crate::error::{AdmissionError, InvalidInvocation};
use crate::identity::{AddressMetadata, CallerIdentity, IdentityResolver};
use crate::rate::Rate;
use crate::registry::{AdmissionDecision, LimiterRegistry};
use std::future::Future;
use std::sync::Arc;
use tracing::error;

/// Per-caller admission control.
///
/// Clones share the same registry, so every handle observes and consumes the same per-caller
/// budgets.
#[derive(Debug, Clone, Default)]
pub struct AdmissionControl {
    resolver: IdentityResolver,
    registry: Arc<LimiterRegistry>,
}

impl AdmissionControl {
    /// Admission control with the default header list and a fresh registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a new builder with defaults.
    pub fn builder() -> AdmissionControlBuilder {
        AdmissionControlBuilder::new()
    }

    /// Decide whether the caller behind `request` may perform an operation limited to `rate`.
    ///
    /// # Errors
    /// Returns [`InvalidInvocation`] when `request` is `None` or carries no address at all.
    pub fn check<M>(
        &self,
        rate: Rate,
        request: Option<&M>,
    ) -> Result<AdmissionDecision, InvalidInvocation>
    where
        M: AddressMetadata + ?Sized,
    {
        let key = self.resolver.resolve(request).map_err(|e| {
            error!(
                error = %e,
                "admission check attached to an operation without usable request context"
            );
            e
        })?;
        Ok(self.check_key(&key, rate))
    }

    /// Admission check for an already resolved caller.
    pub fn check_key(&self, key: &CallerIdentity, rate: Rate) -> AdmissionDecision {
        self.registry.check_admission(key, rate)
    }

    /// Policy guarding operations at a fixed `rate`.
    pub fn policy(&self, rate: Rate) -> AdmissionPolicy {
        AdmissionPolicy { control: self.clone(), rate }
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &Arc<LimiterRegistry> {
        &self.registry
    }
}

/// Errors produced while building admission control.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// A shared registry was supplied together with settings that only apply to a registry the
    /// builder creates.
    #[error("clock and creation hook cannot be combined with a shared registry")]
    SharedRegistryConflict,
}

/// Builder for [`AdmissionControl`].
#[must_use = "builder does nothing until you call build()"]
pub struct AdmissionControlBuilder {
    resolver: IdentityResolver,
    registry: LimiterRegistry,
    customized: bool,
    shared: Option<Arc<LimiterRegistry>>,
}

impl AdmissionControlBuilder {
    /// Create a builder with sane defaults.
    pub fn new() -> Self {
        Self {
            resolver: IdentityResolver::default(),
            registry: LimiterRegistry::new(),
            customized: false,
            shared: None,
        }
    }

    /// Consult `headers`, in order, instead of the default forwarding headers.
    pub fn headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resolver = IdentityResolver::with_headers(headers);
        self
    }

    /// Provide a custom resolver.
    pub fn resolver(mut self, resolver: IdentityResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Clock used by the limiters of the built registry.
    pub fn clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.registry = self.registry.with_clock(clock);
        self.customized = true;
        self
    }

    /// Hook run once per limiter the built registry creates.
    pub fn on_limiter_created<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CallerIdentity, Rate) + Send + Sync + 'static,
    {
        self.registry = self.registry.with_creation_hook(hook);
        self.customized = true;
        self
    }

    /// Use a registry owned elsewhere, e.g. one shared by several services of a process.
    pub fn registry(mut self, registry: Arc<LimiterRegistry>) -> Self {
        self.shared = Some(registry);
        self
    }

    /// Build admission control, validating inputs.
    pub fn build(self) -> Result<AdmissionControl, BuildError> {
        let registry = match self.shared {
            Some(_) if self.customized => return Err(BuildError::SharedRegistryConflict),
            Some(shared) => shared,
            None => Arc::new(self.registry),
        };
        Ok(AdmissionControl { resolver: self.resolver, registry })
    }
}

impl Default for AdmissionControlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Admission control at a fixed rate, guarding async operations.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    control: AdmissionControl,
    rate: Rate,
}

impl AdmissionPolicy {
    /// Rate applied to every caller.
    pub fn rate(&self) -> Rate {
        self.rate
    }

    pub fn control(&self) -> &AdmissionControl {
        &self.control
    }

    /// See [`AdmissionControl::check`].
    pub fn check<M>(&self, request: Option<&M>) -> Result<AdmissionDecision, InvalidInvocation>
    where
        M: AddressMetadata + ?Sized,
    {
        self.control.check(self.rate, request)
    }

    /// Run `operation` if the caller behind `request` is admitted.
    ///
    /// # Errors
    /// - `AdmissionError::RateLimited` when the caller is over budget; `operation` is not run.
    /// - `AdmissionError::InvalidInvocation` when `request` cannot be keyed.
    /// - `AdmissionError::Inner(E)` if the operation itself fails.
    pub async fn execute<T, E, M, Fut, Op>(
        &self,
        request: Option<&M>,
        operation: Op,
    ) -> Result<T, AdmissionError<E>>
    where
        M: AddressMetadata + ?Sized,
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        match self.check(request)? {
            AdmissionDecision::Allowed => operation().await.map_err(AdmissionError::Inner),
            AdmissionDecision::Rejected => Err(AdmissionError::RateLimited { rate: self.rate }),
        }
    }
}
