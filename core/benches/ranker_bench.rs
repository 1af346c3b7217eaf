use criterion::{criterion_group, criterion_main, Criterion};
use postfeed_core::memory::{post_record, MemoryGraph};
use postfeed_core::feed::Abort;
use postfeed_core::ranker::rank_candidates;
use postfeed_core::store::GraphStore;

fn bench_rank(c: &mut Criterion) {
    let graph = MemoryGraph::new();
    let ids: Vec<u64> = (0..100_000).collect();
    for &id in &ids {
        graph.put_node(id, post_record("bench", ((id * 7919) % 1_000_000) as i64));
    }
    let view = graph.view();
    c.bench_function("rank_100k_sequential", |b| {
        b.iter(|| rank_candidates(view.as_ref(), &ids, 900_000, 25, usize::MAX, &Abort::default()))
    });
    c.bench_function("rank_100k_parallel", |b| {
        b.iter(|| rank_candidates(view.as_ref(), &ids, 900_000, 25, 1, &Abort::default()))
    });
}

criterion_group!(benches, bench_rank);
criterion_main!(benches);
