use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use webengine::{HttpRequestMethod, RequestHead, RouteRegistry};

fn registry(size: usize) -> RouteRegistry {
    let mut routes = RouteRegistry::new();
    for i in 0..size {
        let _ = routes.register(
            HttpRequestMethod::Get,
            &format!("/api/v{}/items/:id/detail", i),
            |_, res| res.complete(200),
        );
    }
    routes.set_secured(true, &[HttpRequestMethod::Get], "/api/*");
    routes
}

fn route_resolve_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_resolve");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let routes = registry(size);
            let path = format!("/api/v{}/items/42/detail?verbose=1", size - 1);

            b.iter(|| {
                let _ = routes.resolve(black_box(HttpRequestMethod::Get), black_box(&path));
            });
        });
    }

    group.finish();
}

fn route_miss_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_miss");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let routes = registry(size);

            b.iter(|| {
                let _ = routes.resolve(black_box(HttpRequestMethod::Get), black_box("/not/registered"));
            });
        });
    }

    group.finish();
}

fn request_head_parse_benchmark(c: &mut Criterion) {
    let raw = b"GET /api/v1/items/42/detail?verbose=1 HTTP/1.1\r\n\
Host: localhost:8888\r\n\
User-Agent: Mozilla/5.0\r\n\
Accept: text/html,application/xhtml+xml\r\n\
Accept-Encoding: gzip, deflate\r\n\
Cookie: sessionId=18c2f1a9b3d40001; token=0123456789abcdef0123456789abcdef\r\n\
Connection: keep-alive";

    c.bench_function("request_head_parse", |b| {
        b.iter(|| RequestHead::try_from(black_box(raw), 0));
    });
}

criterion_group!(
    benches,
    route_resolve_benchmark,
    route_miss_benchmark,
    request_head_parse_benchmark
);
criterion_main!(benches);
