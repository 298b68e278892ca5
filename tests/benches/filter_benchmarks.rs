//! # Seen Filters Benchmarks
//!
//! | Path | Target |
//! |------|--------|
//! | Canonicalize a URL | < 10µs |
//! | Test a key against one filter | < 1µs |
//! | Combine two 2^20-bit filters | < 1ms |
//! | Decompress a published filter | < 10ms |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use seen_filters::{canonicalize, BitArray};

const URLS: [&str; 4] = [
    "https://example.com/",
    "https://www.nytimes.com/2024/01/01/world/story.html?utm_source=hn&ref=front",
    "https://web.archive.org/web/20200101000000/https://example.org/old/index.html",
    "https://youtu.be/dQw4w9WgXcQ?t=42",
];

fn bench_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonicalize");
    for (i, url) in URLS.iter().enumerate() {
        group.bench_with_input(BenchmarkId::new("url", i), url, |b, url| {
            b.iter(|| black_box(canonicalize(url).ok()))
        });
    }
    group.finish();
}

fn bench_bit_array(c: &mut Criterion) {
    let mut group = c.benchmark_group("bit-array");

    for size_param in [16u8, 20, 24] {
        let mut array = match BitArray::new(size_param) {
            Ok(array) => array,
            Err(_) => continue,
        };
        let keys: Vec<Vec<u8>> = (0..1_000)
            .map(|i| format!("//story{}.example/item", i).into_bytes())
            .collect();

        group.throughput(Throughput::Elements(keys.len() as u64));
        group.bench_with_input(BenchmarkId::new("insert", size_param), &keys, |b, keys| {
            b.iter(|| {
                for key in keys {
                    array.insert(black_box(key));
                }
            })
        });
        group.bench_with_input(BenchmarkId::new("contains", size_param), &keys, |b, keys| {
            b.iter(|| keys.iter().filter(|key| array.contains(key)).count())
        });
    }
    group.finish();
}

fn bench_merge_and_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    let size_param = 23;

    let (Ok(mut base), Ok(mut delta)) = (BitArray::new(size_param), BitArray::new(size_param))
    else {
        return;
    };
    for i in 0..10_000 {
        base.insert(format!("//base{}.example", i).as_bytes());
        delta.insert(format!("//delta{}.example", i).as_bytes());
    }
    let Ok(wire) = base.compress(3) else {
        return;
    };

    group.bench_function("combine", |b| {
        b.iter(|| {
            let mut merged = base.clone();
            black_box(merged.union(&delta).is_ok())
        })
    });
    group.throughput(Throughput::Bytes(base.byte_len() as u64));
    group.bench_function("decompress", |b| {
        b.iter(|| black_box(BitArray::decompress(&wire).is_ok()))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_canonicalize,
    bench_bit_array,
    bench_merge_and_decompress
);
criterion_main!(benches);
