use std::cell::RefCell;
use std::rc::Rc;

use vizij_timeline_core::timeline::{DispatchStep, PhaseTag};
use vizij_timeline_core::{
    CallbackCfg, Config, Engine, EventKind, LoopType, PhaseEvent, PlayableId, Sample,
    TimelineCfg, TweenCfg,
};

fn tween(engine: &mut Engine, span: f64) -> PlayableId {
    let cfg = TweenCfg {
        span,
        ..TweenCfg::default()
    };
    engine.create_tween(cfg, |_: &Sample| {}).unwrap()
}

fn instants(engine: &Engine, tl: PlayableId) -> Vec<f64> {
    engine
        .chronoline_snapshot(tl)
        .unwrap()
        .chronolines
        .iter()
        .map(|c| c.instant)
        .collect()
}

/// Names of `children` in the order their Start fires on a full forward pass.
fn start_order(
    engine: &mut Engine,
    tl: PlayableId,
    children: &[(&'static str, PlayableId)],
) -> Vec<&'static str> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    for &(name, id) in children {
        let sink = seen.clone();
        engine
            .subscribe(id, EventKind::before(PhaseEvent::Start), move |_| {
                sink.borrow_mut().push(name)
            })
            .unwrap();
    }
    engine.rewind_to_end(tl, true).unwrap();
    let out = seen.borrow().clone();
    out
}

#[test]
fn instants_cover_every_phase_change() {
    let mut engine = Engine::default();
    let tl = engine.create_timeline(TimelineCfg::default()).unwrap();
    let looping = engine
        .create_tween(
            TweenCfg {
                span: 1.0,
                loops_count: 2,
                ..TweenCfg::default()
            },
            |_: &Sample| {},
        )
        .unwrap();
    let mirrored = engine
        .create_tween(
            TweenCfg {
                span: 0.5,
                loop_type: LoopType::Mirror,
                ..TweenCfg::default()
            },
            |_: &Sample| {},
        )
        .unwrap();
    engine.insert(tl, looping, 0.0).unwrap();
    engine.insert(tl, mirrored, 2.5).unwrap();

    assert_eq!(instants(&engine, tl), vec![0.0, 1.0, 2.0, 2.5, 3.0, 3.5]);
    assert_eq!(engine.chronoline_count(tl).unwrap(), 6);
}

#[test]
fn remove_then_reinsert_restores_the_index() {
    let mut engine = Engine::default();
    let tl = engine.create_timeline(TimelineCfg::default()).unwrap();
    let a = tween(&mut engine, 2.0);
    let b = tween(&mut engine, 2.0);
    let cb = engine
        .create_callback(CallbackCfg::default(), |_: &Sample| {})
        .unwrap();
    engine.insert(tl, a, 0.0).unwrap();
    engine.insert(tl, b, 1.0).unwrap();
    engine.insert(tl, cb, 1.5).unwrap();
    let before = engine.chronoline_snapshot(tl).unwrap();

    engine.remove(tl, b).unwrap();
    assert_ne!(engine.chronoline_snapshot(tl).unwrap(), before);
    engine.insert_at(tl, b, 1.0, 1).unwrap();
    assert_eq!(engine.chronoline_snapshot(tl).unwrap(), before);

    engine.set_start_time(tl, b, 0.25).unwrap();
    engine.set_start_time(tl, b, 1.0).unwrap();
    assert_eq!(engine.chronoline_snapshot(tl).unwrap(), before);
}

#[test]
fn removal_prunes_pass_through_instants() {
    let mut engine = Engine::default();
    let tl = engine.create_timeline(TimelineCfg::default()).unwrap();
    let long = tween(&mut engine, 4.0);
    let short = tween(&mut engine, 1.0);
    engine.insert(tl, long, 0.0).unwrap();
    engine.insert(tl, short, 1.0).unwrap();
    assert_eq!(instants(&engine, tl), vec![0.0, 1.0, 2.0, 4.0]);

    engine.remove(tl, short).unwrap();
    assert_eq!(instants(&engine, tl), vec![0.0, 4.0]);
}

#[test]
fn chains_split_arrival_from_departure() {
    let mut engine = Engine::default();
    let tl = engine.create_timeline(TimelineCfg::default()).unwrap();
    let a = tween(&mut engine, 2.0);
    let b = tween(&mut engine, 2.0);
    engine.insert(tl, a, 0.0).unwrap();
    engine.insert(tl, b, 1.0).unwrap();

    let snapshot = engine.chronoline_snapshot(tl).unwrap();
    let at_one = snapshot
        .chronolines
        .iter()
        .find(|c| c.instant == 1.0)
        .unwrap();
    let forward: Vec<_> = at_one
        .forward
        .records
        .iter()
        .map(|r| (r.order, r.tag))
        .collect();
    assert_eq!(
        forward,
        vec![
            (0, PhaseTag::LoopUpdate),
            (1, PhaseTag::Start),
            (1, PhaseTag::FirstLoopStart),
        ]
    );
    assert_eq!(at_one.forward.split, 2);
    assert_eq!(
        at_one.backward.records[0].step,
        DispatchStep::Sync { local_time: 1.0 }
    );
    assert_eq!(at_one.backward.records[1].tag, PhaseTag::Complete);

    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains("\"instant\":1.0"));
}

#[test]
fn zero_children_take_turns_loop_by_loop() {
    let mut engine = Engine::default();
    let tl = engine.create_timeline(TimelineCfg::default()).unwrap();
    let pad = tween(&mut engine, 2.0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (sa, sb, sdone) = (seen.clone(), seen.clone(), seen.clone());
    let a = engine
        .create_callback(
            CallbackCfg {
                loops_count: 2,
                ..CallbackCfg::default()
            },
            move |s: &Sample| sa.borrow_mut().push(format!("a{}", s.loop_index)),
        )
        .unwrap();
    let b = engine
        .create_callback(CallbackCfg::default(), move |s: &Sample| {
            sb.borrow_mut().push(format!("b{}", s.loop_index))
        })
        .unwrap();
    engine
        .subscribe(b, EventKind::before(PhaseEvent::Complete), move |_| {
            sdone.borrow_mut().push("b done".to_string())
        })
        .unwrap();
    engine.insert(tl, pad, 0.0).unwrap();
    engine.insert(tl, a, 1.0).unwrap();
    engine.insert(tl, b, 1.0).unwrap();

    engine.rewind_to_end(tl, true).unwrap();
    assert_eq!(*seen.borrow(), vec!["a0", "b0", "b done", "a1"]);
}

#[test]
fn reordering_changes_dispatch_order() {
    let mut engine = Engine::default();
    let tl = engine.create_timeline(TimelineCfg::default()).unwrap();
    let a = tween(&mut engine, 1.0);
    let b = tween(&mut engine, 1.0);
    engine.insert(tl, a, 0.0).unwrap();
    engine.insert(tl, b, 0.0).unwrap();

    engine.set_order(tl, b, 0).unwrap();
    assert_eq!(engine.element(tl, b).unwrap().order, 0);
    assert_eq!(engine.element(tl, a).unwrap().order, 1);
    assert_eq!(start_order(&mut engine, tl, &[("a", a), ("b", b)]), vec!["b", "a"]);
}

#[test]
fn tight_rank_gap_rebalances_transparently() {
    let mut engine = Engine::new(Config {
        rank_gap: 2,
        ..Config::default()
    });
    let tl = engine.create_timeline(TimelineCfg::default()).unwrap();
    let names = ["a", "b", "c", "d", "e"];
    let mut children = Vec::new();
    for name in names {
        let id = tween(&mut engine, 1.0);
        engine.insert_at(tl, id, 0.0, 0).unwrap();
        children.push((name, id));
    }
    let order: Vec<_> = engine
        .elements(tl)
        .unwrap()
        .iter()
        .map(|e| children.iter().find(|(_, id)| *id == e.child).unwrap().0)
        .collect();
    assert_eq!(order, vec!["e", "d", "c", "b", "a"]);
    assert_eq!(start_order(&mut engine, tl, &children), order);
}

#[test]
fn zero_intervals_hold_time_without_instants() {
    let mut engine = Engine::default();
    let tl = engine.create_timeline(TimelineCfg::default()).unwrap();
    let gap = engine
        .create_interval(TweenCfg {
            span: 0.0,
            ..TweenCfg::default()
        })
        .unwrap();
    engine.insert(tl, gap, 3.0).unwrap();
    assert_eq!(engine.duration(tl).unwrap(), 3.0);
    assert_eq!(engine.chronoline_count(tl).unwrap(), 0);

    let spacer = engine.create_interval(TweenCfg::default()).unwrap();
    engine.insert(tl, spacer, 0.0).unwrap();
    assert_eq!(instants(&engine, tl), vec![0.0, 1.0]);
    engine.rewind_to_end(tl, true).unwrap();
    assert_eq!(engine.played_time(spacer).unwrap(), 1.0);
}
