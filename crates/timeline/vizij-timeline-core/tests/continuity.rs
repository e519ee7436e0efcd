//! Stepping a timeline frame by frame must produce the same lifecycle
//! events, in the same order, as jumping straight to the destination.
//! Per-frame updates are the only difference, so they are filtered out.

use std::cell::RefCell;
use std::rc::Rc;

use vizij_timeline_core::{
    CallbackCfg, Direction, Engine, EventKind, LoopType, PhaseEvent, PlayableId, Sample, Stage,
    TimelineCfg, TweenCfg,
};

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    who: &'static str,
    name: &'static str,
    loop_index: Option<u32>,
    direction: Direction,
}

type Log = Rc<RefCell<Vec<Entry>>>;

const LIFECYCLE: [PhaseEvent; 4] = [
    PhaseEvent::Start,
    PhaseEvent::LoopStart,
    PhaseEvent::LoopComplete,
    PhaseEvent::Complete,
];

fn watch(engine: &mut Engine, id: PlayableId, who: &'static str, log: &Log) {
    for phase in LIFECYCLE {
        for stage in [Stage::Before, Stage::After] {
            let sink = log.clone();
            engine
                .subscribe(id, EventKind::Phase(phase, stage), move |ev| {
                    sink.borrow_mut().push(Entry {
                        who,
                        name: ev.kind.name(),
                        loop_index: ev.loop_index,
                        direction: ev.direction,
                    })
                })
                .unwrap();
        }
    }
}

fn callback(engine: &mut Engine, who: &'static str, log: &Log) -> PlayableId {
    let sink = log.clone();
    engine
        .create_callback(CallbackCfg::default(), move |s: &Sample| {
            sink.borrow_mut().push(Entry {
                who,
                name: "fire",
                loop_index: Some(s.loop_index),
                direction: s.direction,
            })
        })
        .unwrap()
}

type Scene = fn(&mut Engine, &Log) -> PlayableId;

/// A at [0, 2], B at [1, 3] and a callback at 1.5.
fn overlapping(engine: &mut Engine, log: &Log) -> PlayableId {
    let tl = engine.create_timeline(TimelineCfg::default()).unwrap();
    let a = engine
        .create_tween(TweenCfg { span: 2.0, ..TweenCfg::default() }, |_: &Sample| {})
        .unwrap();
    let b = engine
        .create_tween(TweenCfg { span: 2.0, ..TweenCfg::default() }, |_: &Sample| {})
        .unwrap();
    let cb = callback(engine, "cb", log);
    engine.insert(tl, a, 0.0).unwrap();
    engine.insert(tl, b, 1.0).unwrap();
    engine.insert(tl, cb, 1.5).unwrap();
    watch(engine, tl, "tl", log);
    watch(engine, a, "a", log);
    watch(engine, b, "b", log);
    tl
}

/// Continue x2 around a Mirror x2 timeline around a Reset x2 tween.
fn nested(engine: &mut Engine, log: &Log) -> PlayableId {
    let outer = engine
        .create_timeline(TimelineCfg {
            loops_count: Some(2),
            loop_type: LoopType::Continue,
            ..TimelineCfg::default()
        })
        .unwrap();
    let inner = engine
        .create_timeline(TimelineCfg {
            loops_count: Some(2),
            loop_type: LoopType::Mirror,
            ..TimelineCfg::default()
        })
        .unwrap();
    let leaf = engine
        .create_tween(
            TweenCfg {
                span: 0.5,
                loops_count: 2,
                ..TweenCfg::default()
            },
            |_: &Sample| {},
        )
        .unwrap();
    engine.insert(inner, leaf, 0.0).unwrap();
    engine.insert(outer, inner, 0.0).unwrap();
    watch(engine, outer, "outer", log);
    watch(engine, inner, "inner", log);
    watch(engine, leaf, "leaf", log);
    outer
}

/// A Reset x2 timeline with a tween and a callback, behind a leading gap.
fn looping(engine: &mut Engine, log: &Log) -> PlayableId {
    let tl = engine
        .create_timeline(TimelineCfg {
            loops_count: Some(2),
            ..TimelineCfg::default()
        })
        .unwrap();
    let a = engine
        .create_tween(
            TweenCfg {
                span: 0.5,
                loop_type: LoopType::Mirror,
                ..TweenCfg::default()
            },
            |_: &Sample| {},
        )
        .unwrap();
    let cb = callback(engine, "cb", log);
    engine.insert(tl, a, 0.5).unwrap();
    engine.insert(tl, cb, 1.0).unwrap();
    watch(engine, tl, "tl", log);
    watch(engine, a, "a", log);
    tl
}

fn build(scene: Scene) -> (Engine, PlayableId, Log) {
    let mut engine = Engine::default();
    let log: Log = Rc::default();
    let root = scene(&mut engine, &log);
    (engine, root, log)
}

/// Events of direct jumps through `path`, after silently parking at its first point.
fn jumped(scene: Scene, path: &[f64]) -> Vec<Entry> {
    let (mut engine, root, log) = build(scene);
    engine.rewind_to(root, path[0], false).unwrap();
    for &to in &path[1..] {
        engine.rewind_to(root, to, true).unwrap();
    }
    let out = log.borrow().clone();
    out
}

/// Same walk in frames of `dt`, landing exactly on every waypoint.
fn stepped(scene: Scene, path: &[f64], dt: f64) -> Vec<Entry> {
    let (mut engine, root, log) = build(scene);
    engine.rewind_to(root, path[0], false).unwrap();
    for leg in path.windows(2) {
        let (from, to) = (leg[0], leg[1]);
        let sign = (to - from).signum();
        let mut i = 1;
        loop {
            let offset = dt * i as f64;
            if offset >= (to - from).abs() {
                engine.rewind_to(root, to, true).unwrap();
                break;
            }
            engine.rewind_to(root, from + sign * offset, true).unwrap();
            i += 1;
        }
    }
    let out = log.borrow().clone();
    out
}

fn assert_continuous(scene: Scene, path: &[f64]) {
    let direct = jumped(scene, path);
    assert!(!direct.is_empty());
    for dt in [0.125, 0.5, 0.07] {
        assert_eq!(stepped(scene, path, dt), direct, "dt = {dt}, path = {path:?}");
    }
}

#[test]
fn overlapping_children_forward() {
    assert_continuous(overlapping, &[0.0, 3.0]);
}

#[test]
fn overlapping_children_backward() {
    assert_continuous(overlapping, &[3.0, 0.0]);
}

#[test]
fn partial_sweeps_match() {
    assert_continuous(overlapping, &[0.75, 2.25]);
    assert_continuous(overlapping, &[2.25, 0.75]);
}

#[test]
fn nested_loops_forward() {
    assert_continuous(nested, &[0.0, 8.0]);
}

#[test]
fn nested_loops_backward() {
    assert_continuous(nested, &[8.0, 0.0]);
}

#[test]
fn looping_timeline_both_ways() {
    assert_continuous(looping, &[0.0, 3.0]);
    assert_continuous(looping, &[3.0, 0.0]);
}

#[test]
fn reversing_mid_path_matches() {
    assert_continuous(overlapping, &[0.0, 2.25, 0.5]);
    assert_continuous(overlapping, &[3.0, 1.2, 2.6]);
    assert_continuous(nested, &[0.0, 5.3, 1.1]);
    assert_continuous(nested, &[8.0, 2.9, 6.4]);
    assert_continuous(looping, &[0.2, 2.6, 0.4]);
}

#[test]
fn callback_fires_once_per_forward_loop() {
    let direct = jumped(looping, &[0.0, 3.0]);
    let fires = direct.iter().filter(|e| e.name == "fire").count();
    assert_eq!(fires, 2);
    let back = jumped(looping, &[3.0, 0.0]);
    assert!(back.iter().all(|e| e.name != "fire"));
}
