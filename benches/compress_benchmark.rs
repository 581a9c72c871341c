use std::time::SystemTime;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use webengine::{
    compress::{compress, parse_accept_encoding},
    select_encoding, HttpEncoding, ResourceCache,
};

fn select_encoding_benchmark(c: &mut Criterion) {
    let headers = [
        "gzip",
        "gzip, deflate, br",
        "deflate;q=0.9, gzip;q=0.5, *;q=0.1",
        "br;q=1.0, *;q=0.3",
    ];

    let mut group = c.benchmark_group("select_encoding");
    for header in headers.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(header), header, |b, &header| {
            b.iter(|| select_encoding(&parse_accept_encoding(black_box(header))));
        });
    }
    group.finish();
}

fn compress_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");

    for size in [1024, 16 * 1024, 256 * 1024].iter() {
        let body: Vec<u8> = b"<div class=\"item\">webengine</div>\n"
            .iter()
            .cycle()
            .take(*size)
            .copied()
            .collect();
        for encoding in [HttpEncoding::Gzip, HttpEncoding::Deflate] {
            group.bench_with_input(
                BenchmarkId::new(encoding.to_string(), size),
                &body,
                |b, body| {
                    b.iter(|| compress(black_box(body), encoding));
                },
            );
        }
    }

    group.finish();
}

fn resource_cache_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("resource_cache_find");

    for size in [16, 256, 4096].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut cache = ResourceCache::from_capacity(size, 1024 * 1024);
            let time = SystemTime::now();
            let content = Bytes::from("h1{color:blue}");
            for i in 0..size {
                cache.push(&format!("css/{}.css", i), content.clone(), time);
            }

            b.iter(|| {
                for i in 0..size {
                    let _ = cache.find(black_box(&format!("css/{}.css", i)), black_box(time));
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    select_encoding_benchmark,
    compress_benchmark,
    resource_cache_benchmark
);
criterion_main!(benches);
