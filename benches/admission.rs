use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::future::Ready;
use std::net::IpAddr;
use tower::{Service, ServiceBuilder, ServiceExt};
use turnstile::{
    AdmissionControl, AdmissionLayer, CallerIdentity, LimiterRegistry, ManualClock, Rate,
    RequestInfo,
};

// Returns a fixed response for every admitted request.
#[derive(Clone)]
struct EchoService;

impl Service<RequestInfo> for EchoService {
    type Response = &'static str;
    type Error = std::io::Error;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: RequestInfo) -> Self::Future {
        futures::future::ready(Ok("ok"))
    }
}

fn registry_existing_key(c: &mut Criterion) {
    let registry = LimiterRegistry::new();
    let key = CallerIdentity::from("203.0.113.1");
    let rate = Rate::per_second(1_000_000_000.0).unwrap();
    registry.check_admission(&key, rate);

    c.bench_function("registry_check_existing_key", |b| {
        b.iter(|| black_box(registry.check_admission(black_box(&key), rate)));
    });
}

fn registry_rejected_key(c: &mut Criterion) {
    // Frozen clock: the bucket drains once and every later check is a rejection.
    let registry = LimiterRegistry::new().with_clock(ManualClock::new());
    let key = CallerIdentity::from("203.0.113.2");
    let rate = Rate::per_second(1.0).unwrap();
    registry.check_admission(&key, rate);

    c.bench_function("registry_check_rejected_key", |b| {
        b.iter(|| black_box(registry.check_admission(black_box(&key), rate)));
    });
}

fn resolve_and_check(c: &mut Criterion) {
    let control = AdmissionControl::new();
    let rate = Rate::per_second(1_000_000_000.0).unwrap();
    let request = RequestInfo::new()
        .with_header("X-Forwarded-For", "198.51.100.10, 10.0.0.1")
        .with_peer("10.0.0.1".parse::<IpAddr>().unwrap());

    c.bench_function("control_check_forwarded_request", |b| {
        b.iter(|| black_box(control.check(rate, Some(black_box(&request)))));
    });
}

fn layer_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let rate = Rate::per_second(1_000_000_000.0).unwrap();
    let layer = AdmissionLayer::new(AdmissionControl::new(), rate);
    let svc = ServiceBuilder::new().layer(layer).service(EchoService);
    let request = RequestInfo::new().with_peer("192.0.2.10".parse::<IpAddr>().unwrap());

    c.bench_function("admission_layer_admitted", |b| {
        b.to_async(&rt).iter(|| async {
            let mut local_svc = svc.clone();
            let ready = local_svc.ready().await.unwrap();
            let _ = black_box(ready.call(black_box(request.clone()))).await;
        });
    });
}

criterion_group!(
    benches,
    registry_existing_key,
    registry_rejected_key,
    resolve_and_check,
    layer_throughput
);
criterion_main!(benches);
