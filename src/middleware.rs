//! Tower middleware enforcing per-caller admission.
//!
//! ```rust
//! use std::convert::Infallible;
//! use tower::{service_fn, ServiceBuilder, ServiceExt};
//! use turnstile::{AdmissionControl, AdmissionLayer, PeerAddr, Rate};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let layer = AdmissionLayer::new(AdmissionControl::new(), Rate::per_second(1.0).unwrap());
//! let svc = ServiceBuilder::new()
//!     .layer(layer)
//!     .service(service_fn(|_req: http::Request<()>| async { Ok::<_, Infallible>("hello") }));
//!
//! let mut request = http::Request::new(());
//! request.extensions_mut().insert(PeerAddr("192.0.2.1:5000".parse().unwrap()));
//! assert_eq!(svc.clone().oneshot(request).await.unwrap(), "hello");
//!
//! let mut request = http::Request::new(());
//! request.extensions_mut().insert(PeerAddr("192.0.2.1:5000".parse().unwrap()));
//! let err = svc.oneshot(request).await.unwrap_err();
//! assert_eq!(err.status_code(), Some(http::StatusCode::TOO_MANY_REQUESTS));
//! # });
//! ```

use crate::admission::{AdmissionControl, AdmissionPolicy};
use crate::error::AdmissionError;
use crate::identity::AddressMetadata;
use crate::rate::Rate;
use crate::registry::AdmissionDecision;
use crate::request::RequestInfo;
use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Requests that can be checked by [`AdmissionService`].
pub trait AdmissionTarget {
    /// Address metadata carried by the request.
    type Metadata: AddressMetadata + ?Sized;

    /// `None` when the request carries no context to key the caller by.
    fn address_metadata(&self) -> Option<&Self::Metadata>;
}

impl<B> AdmissionTarget for http::Request<B> {
    type Metadata = Self;

    fn address_metadata(&self) -> Option<&Self::Metadata> {
        Some(self)
    }
}

impl AdmissionTarget for RequestInfo {
    type Metadata = Self;

    fn address_metadata(&self) -> Option<&Self::Metadata> {
        Some(self)
    }
}

impl<T: AdmissionTarget> AdmissionTarget for Option<T> {
    type Metadata = T::Metadata;

    fn address_metadata(&self) -> Option<&Self::Metadata> {
        self.as_ref().and_then(|request| request.address_metadata())
    }
}

/// A layer that checks every request against a per-caller rate before it reaches the inner
/// service.
#[derive(Clone, Debug)]
pub struct AdmissionLayer {
    policy: AdmissionPolicy,
}

impl AdmissionLayer {
    /// Create a layer admitting each caller at most `rate` times per second.
    ///
    /// Layers built from clones of one [`AdmissionControl`] share per-caller budgets.
    pub fn new(control: AdmissionControl, rate: Rate) -> Self {
        Self { policy: control.policy(rate) }
    }

    pub fn from_policy(policy: AdmissionPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionService { inner: service, policy: self.policy.clone() }
    }
}

/// Middleware service that enforces admission.
#[derive(Clone, Debug)]
pub struct AdmissionService<S> {
    inner: S,
    policy: AdmissionPolicy,
}

impl<S> AdmissionService<S> {
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, Req> Service<Req> for AdmissionService<S>
where
    S: Service<Req>,
    Req: AdmissionTarget,
{
    type Response = S::Response;
    type Error = AdmissionError<S::Error>;
    type Future = AdmissionFuture<S::Future, S::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AdmissionError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        match self.policy.check(req.address_metadata()) {
            Ok(AdmissionDecision::Allowed) => {
                AdmissionFuture::Admitted { future: self.inner.call(req) }
            }
            Ok(AdmissionDecision::Rejected) => AdmissionFuture::Rejected {
                error: Some(AdmissionError::RateLimited { rate: self.policy.rate() }),
            },
            Err(e) => {
                AdmissionFuture::Rejected { error: Some(AdmissionError::InvalidInvocation(e)) }
            }
        }
    }
}

/// Response future of [`AdmissionService`].
#[pin_project(project = AdmissionFutureProj)]
#[derive(Debug)]
pub enum AdmissionFuture<F, E> {
    /// Request admitted; driving the inner service.
    Admitted {
        #[pin]
        future: F,
    },
    /// Request refused before reaching the inner service.
    Rejected { error: Option<AdmissionError<E>> },
}

impl<F, T, E> Future for AdmissionFuture<F, E>
where
    F: Future<Output = Result<T, E>>,
{
    type Output = Result<T, AdmissionError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            AdmissionFutureProj::Admitted { future } => {
                future.poll(cx).map_err(AdmissionError::Inner)
            }
            AdmissionFutureProj::Rejected { error } => {
                Poll::Ready(Err(error.take().expect("AdmissionFuture polled after completion")))
            }
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::InvalidInvocation;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    fn layer(per_second: f64) -> AdmissionLayer {
        let control = AdmissionControl::builder().clock(ManualClock::new()).build().unwrap();
        AdmissionLayer::new(control, Rate::per_second(per_second).unwrap())
    }

    #[tokio::test]
    async fn rejected_requests_never_reach_inner_service() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let inner = service_fn(move |_req: RequestInfo| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(())
            }
        });
        let svc = ServiceBuilder::new().layer(layer(2.0)).service(inner);

        let request = RequestInfo::new().with_header("X-Forwarded-For", "203.0.113.9");
        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes.push(svc.clone().oneshot(request.clone()).await);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(outcomes[0].is_ok());
        assert!(outcomes[1].is_ok());
        assert!(outcomes[2].as_ref().unwrap_err().is_rate_limited());
        assert!(outcomes[3].as_ref().unwrap_err().is_rate_limited());
    }

    #[tokio::test]
    async fn missing_context_is_invalid_invocation() {
        let svc = ServiceBuilder::new()
            .layer(layer(2.0))
            .service(service_fn(|_req: Option<RequestInfo>| async { Ok::<_, Infallible>(()) }));

        let err = svc.oneshot(None).await.unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::InvalidInvocation(InvalidInvocation::MissingRequestContext)
        ));
    }

    #[tokio::test]
    async fn inner_errors_are_wrapped() {
        let inner = service_fn(|_req: RequestInfo| async {
            Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
        });
        let svc = ServiceBuilder::new().layer(layer(2.0)).service(inner);

        let request = RequestInfo::new().with_peer("10.1.1.1".parse().unwrap());
        let err = svc.oneshot(request).await.unwrap_err();
        assert!(err.is_inner());
        assert_eq!(err.status_code(), None);
        assert_eq!(err.into_inner().unwrap().to_string(), "boom");
    }

    #[test]
    fn option_target_delegates_to_inner_request() {
        let present = Some(RequestInfo::new());
        assert!(present.address_metadata().is_some());
        let absent: Option<RequestInfo> = None;
        assert!(absent.address_metadata().is_none());
    }
}
