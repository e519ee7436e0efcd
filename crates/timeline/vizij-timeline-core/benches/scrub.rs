use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vizij_timeline_core::{Engine, PlayableId, Sample, TimelineCfg, TweenCfg};

/// A timeline of `n` staggered, overlapping tweens.
fn staggered(n: usize) -> (Engine, PlayableId) {
    let mut engine = Engine::default();
    let tl = engine.create_timeline(TimelineCfg::default()).unwrap();
    for i in 0..n {
        let tween = engine
            .create_tween(
                TweenCfg {
                    span: 1.0,
                    ..TweenCfg::default()
                },
                |s: &Sample| {
                    black_box(s.progress);
                },
            )
            .unwrap();
        engine.insert(tl, tween, i as f64 * 0.05).unwrap();
    }
    (engine, tl)
}

fn bench_scrub(c: &mut Criterion) {
    let (mut engine, tl) = staggered(200);
    let end = engine.duration(tl).unwrap();

    c.bench_function("scrub_full_range_200", |b| {
        b.iter(|| {
            engine.rewind_to(tl, black_box(end), true).unwrap();
            engine.rewind_to(tl, black_box(0.0), true).unwrap();
        })
    });

    c.bench_function("scrub_small_steps_200", |b| {
        let mut t = 0.0;
        b.iter(|| {
            t += 1.0 / 60.0;
            if t > end {
                t = 0.0;
            }
            engine.rewind_to(tl, black_box(t), true).unwrap();
        })
    });

    c.bench_function("build_index_200", |b| b.iter(|| black_box(staggered(200))));
}

criterion_group!(benches, bench_scrub);
criterion_main!(benches);
