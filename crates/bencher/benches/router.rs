use bencher::{TestCase, route_paths, test_cases};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use http::Method;
use std::hint::black_box;
use switchyard_http::protocol::{Request, Response};
use switchyard_web::router::{RawEndpoint, raw_endpoint};
use switchyard_web::Router;

fn ok() -> RawEndpoint {
    raw_endpoint(|_, _| Ok(Response::new()))
}

fn create_router(count: usize) -> Router<RawEndpoint> {
    let router = Router::new();
    for path in route_paths(count) {
        router.add((path, ok())).expect("benchmark routes should be valid");
    }
    router
}

fn create_request(case: &TestCase) -> Request {
    let method = Method::from_bytes(case.method().as_bytes()).expect("benchmark method should be valid");
    Request::from(http::Request::builder().method(method).uri(case.uri()).body(()).expect("benchmark uri should be valid"))
}

fn benchmark_router_dispatch(criterion: &mut Criterion) {
    let router = create_router(50);
    let mut group = criterion.benchmark_group("router_dispatch");

    for case in test_cases() {
        let request = create_request(&case);
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &request, |b, request| {
            b.iter(|| black_box(router.dispatch(request).is_ok()));
        });
    }

    group.finish();
}

fn benchmark_router_add(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("router_add");

    for count in [10, 100] {
        let router = create_router(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &router, |b, router| {
            b.iter(|| {
                let routes = router.add(("/added/<int:id>", ok())).expect("benchmark route should be valid");
                router.remove(&routes).expect("added route should be removable");
            });
        });
    }

    group.finish();
}

criterion_group!(router, benchmark_router_dispatch, benchmark_router_add);
criterion_main!(router);
