//! Frame application throughput and replay cost.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use arena_replica::game::{Action, AuthoredAction, Direction, RequestId};
use arena_replica::{apply_frame, replay_frames, Frame, WorldConfig, WorldState};

const FRAME_NS: u64 = 16_666_667;

/// A lobby of `players` that joins, starts, then moves and shoots at random.
fn scripted_match(players: usize, frames: u64, seed: u64) -> Vec<Frame> {
    let mut rng = StdRng::seed_from_u64(seed);
    let names: Vec<String> = (0..players).map(|i| format!("player-{}", i)).collect();
    let act = |name: &str, action| AuthoredAction::new(name, RequestId::Number(0), action);

    let mut script = vec![
        Frame::new(0, FRAME_NS, names.iter().map(|n| act(n, Action::Join)).collect()),
        Frame::new(1, FRAME_NS, vec![act(&names[0], Action::StartMatch)]),
    ];

    for number in 2..frames {
        let events = names
            .iter()
            .map(|name| {
                let action = if rng.gen_bool(0.2) {
                    Action::shoot(rng.gen_range(0..3000), rng.gen_range(0..3000))
                } else {
                    let directions = [Direction::Up, Direction::Left, Direction::Down, Direction::Right];
                    Action::moving(directions[rng.gen_range(0..4)])
                };
                act(name, action)
            })
            .collect();
        script.push(Frame::new(number, FRAME_NS, events));
    }
    script
}

fn bench_apply_frame(c: &mut Criterion) {
    let config = WorldConfig::toroidal();
    let frames = scripted_match(8, 120, 7);
    let (warm, _) = replay_frames(&config, &frames[..100]);

    c.bench_function("apply_frame_8_players", |b| {
        b.iter_batched(
            || warm.clone(),
            |mut state: WorldState| {
                for frame in &frames[100..] {
                    black_box(apply_frame(&mut state, frame, &config));
                }
                state
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_replay(c: &mut Criterion) {
    let config = WorldConfig::bounded();
    let frames = scripted_match(4, 600, 11);

    c.bench_function("replay_600_frames_hash", |b| {
        b.iter(|| {
            let (state, _) = replay_frames(&config, black_box(&frames));
            state.compute_hash()
        })
    });
}

criterion_group!(benches, bench_apply_frame, bench_replay);
criterion_main!(benches);
