use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use flappy_swarm::game::tick::step;
use flappy_swarm::{AgentId, EpisodeState, InputBatch, SimConfig};

const STEPS: usize = 256;

fn random_batches(population: u32, seed: u64) -> Vec<InputBatch> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..STEPS)
        .map(|_| (0..population).map(|i| (AgentId(i), rng.gen_bool(0.05))).collect())
        .collect()
}

fn bench_step(c: &mut Criterion) {
    let config = SimConfig::default();
    let mut group = c.benchmark_group("episode_step");

    for population in [20u32, 1_000, 10_000] {
        let batches = random_batches(population, 0xF1A9);
        group.bench_with_input(BenchmarkId::new("steps256", population), &population, |b, &population| {
            b.iter_batched(
                || EpisodeState::new(&config, population, 1),
                |mut state| {
                    for batch in &batches {
                        step(&mut state, Some(batch), &config);
                    }
                    state
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let config = SimConfig::default();
    let state = EpisodeState::new(&config, 10_000, 1);

    c.bench_function("snapshot_capture_10000", |b| {
        b.iter(|| flappy_swarm::Snapshot::capture(&state, &config))
    });
}

criterion_group!(benches, bench_step, bench_snapshot);
criterion_main!(benches);
