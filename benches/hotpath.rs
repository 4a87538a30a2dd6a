use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lightning_hotpath::{parse, Arena, MemoryPool, PoolConfig, SlabAllocator, WorkerConfig, WorkerContext};
use std::hint::black_box;
use std::time::Duration;

fn bench_arena(c: &mut Criterion) {
    let mut group = c.benchmark_group("arena");
    group.measurement_time(Duration::from_secs(5));

    for size in [8usize, 64, 512].iter() {
        group.throughput(Throughput::Elements(100));
        group.bench_with_input(BenchmarkId::new("alloc_then_reset", size), size, |b, &size| {
            let mut arena = Arena::new(64 * 1024).unwrap();
            b.iter(|| {
                for _ in 0..100 {
                    black_box(arena.alloc(black_box(size)));
                }
                arena.reset();
            });
        });
    }

    group.finish();
}

fn bench_slab(c: &mut Criterion) {
    let mut group = c.benchmark_group("slab");
    let slab = SlabAllocator::new(64, 1024).unwrap();

    group.bench_function("alloc_free", |b| {
        b.iter(|| {
            let ptr = slab.alloc().unwrap();
            slab.free(black_box(ptr)).unwrap();
        });
    });

    group.bench_function("alloc_free_batch_256", |b| {
        let mut live = Vec::with_capacity(256);
        b.iter(|| {
            for _ in 0..256 {
                live.push(slab.alloc().unwrap());
            }
            for ptr in live.drain(..) {
                slab.free(ptr).unwrap();
            }
        });
    });

    group.finish();
}

fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_pool");
    let pool = MemoryPool::with_config(PoolConfig::default()).unwrap();
    let platform = MemoryPool::new();

    for size in [16usize, 256, 4096, 16384].iter() {
        group.bench_with_input(BenchmarkId::new("pooled", size), size, |b, &size| {
            b.iter(|| {
                let block = pool.alloc(black_box(size)).unwrap();
                pool.free(block);
            });
        });

        group.bench_with_input(BenchmarkId::new("platform", size), size, |b, &size| {
            b.iter(|| {
                let block = platform.alloc(black_box(size)).unwrap();
                platform.free(block);
            });
        });
    }

    group.bench_function("strdup", |b| {
        b.iter(|| {
            let s = pool.strdup(black_box("user:12345:session")).unwrap();
            pool.free_str(s);
        });
    });

    group.finish();
}

fn bench_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("parser");

    let inputs: [(&str, &[u8]); 4] = [
        ("get", b"GET user:1000"),
        ("set_quoted", br#"SET user:1000 "a value with spaces""#),
        ("incrby", b"INCRBY counter -42"),
        ("sadd_16", b"SADD set a b c d e f g h i j k l m n o p"),
    ];

    for (name, input) in inputs.iter() {
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_with_input(BenchmarkId::new("parse", name), input, |b, input| {
            let mut arena = Arena::new(64 * 1024).unwrap();
            b.iter(|| {
                arena.reset();
                black_box(parse(black_box(input), &arena).map(|r| r.arg_count()));
            });
        });
    }

    group.bench_function("worker_context", |b| {
        let mut ctx = WorkerContext::new(&WorkerConfig::default()).unwrap();
        b.iter(|| black_box(ctx.parse(black_box(b"HSET user:1 name alice")).is_some()));
    });

    group.finish();
}

criterion_group!(benches, bench_arena, bench_slab, bench_pool, bench_parser);
criterion_main!(benches);
