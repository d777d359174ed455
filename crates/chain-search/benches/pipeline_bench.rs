use chain_search::pipeline::{BatchReadback, CandidateBatch, KernelPipeline};
use chain_search::search::scan_batch;
use chain_search::{linker, BufferSet, EntryPoints, LengthLayout};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use engine_host::{ComputeBackend, HostBackend};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const SOURCE: &[u8] = b"__kernel void simple_sha512(__global uint *a) { }\n\
                        __kernel void simple_md5(__global uint *a) { }\n\
                        __kernel void simple_xor(__global uint *a) { }\n";

const BATCH: usize = 1 << 10;
const BLOCK_WORDS: usize = 16;

fn bench_host_batch(c: &mut Criterion) {
    let backend = HostBackend::new();
    let module = backend
        .compile_module("bench.cl", SOURCE, "")
        .expect("compile");
    let program = linker::link(&backend, &[&module], "").expect("link");
    let pipeline =
        KernelPipeline::new(&backend, &program, &EntryPoints::default()).expect("kernels");
    let buffers =
        BufferSet::allocate(&backend, BATCH, BLOCK_WORDS, LengthLayout::PerSlot).expect("buffers");

    let mut batch = CandidateBatch::new(BATCH, BLOCK_WORDS, LengthLayout::PerSlot, 4);
    let mut readback = BatchReadback::new(buffers.value_words(), buffers.length_words());

    let mut rng = ChaCha8Rng::seed_from_u64(12345);
    let mut target = [0u8; 64];
    rng.fill(&mut target[..]);

    c.bench_function("host_pipeline_batch_1k", |b| {
        let mut start = 0u64;
        b.iter(|| {
            batch.refill(black_box(start));
            pipeline
                .execute(&backend, &buffers, &batch, &mut readback)
                .expect("execute");
            let hit = scan_batch(
                &readback.values,
                &readback.lengths,
                LengthLayout::PerSlot,
                BLOCK_WORDS * 4,
                &target,
            )
            .expect("scan");
            start = start.wrapping_add(BATCH as u64);
            black_box(hit)
        })
    });
}

criterion_group!(benches, bench_host_batch);
criterion_main!(benches);
