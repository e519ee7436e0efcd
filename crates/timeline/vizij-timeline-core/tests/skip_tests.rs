use std::cell::RefCell;
use std::rc::Rc;

use vizij_timeline_core::{
    CallbackCfg, Engine, EventKind, LoopResetBehaviour, PhaseEvent, PlayableId, Sample, Stage,
    TimelineCfg, TweenCfg,
};

type Log = Rc<RefCell<Vec<String>>>;

const PHASES: [PhaseEvent; 5] = [
    PhaseEvent::Start,
    PhaseEvent::LoopStart,
    PhaseEvent::LoopUpdate,
    PhaseEvent::LoopComplete,
    PhaseEvent::Complete,
];

fn watch(engine: &mut Engine, id: PlayableId, who: &'static str, log: &Log) {
    for phase in PHASES {
        for stage in [Stage::Before, Stage::After] {
            let sink = log.clone();
            engine
                .subscribe(id, EventKind::Phase(phase, stage), move |ev| {
                    sink.borrow_mut().push(format!(
                        "{who}:{}:{:?}:{:?}:{:?}",
                        ev.kind.name(),
                        ev.loop_index,
                        ev.looped_time,
                        ev.direction
                    ))
                })
                .unwrap();
        }
    }
}

/// A at [0, 2], B at [1, 3] and a callback at 1.5; every mutation lands in the log.
fn scene() -> (Engine, PlayableId, Log) {
    let mut engine = Engine::default();
    let log: Log = Rc::default();
    let tl = engine.create_timeline(TimelineCfg::default()).unwrap();
    let mut children = Vec::new();
    for (who, start) in [("a", 0.0), ("b", 1.0)] {
        let sink = log.clone();
        let id = engine
            .create_tween(
                TweenCfg {
                    span: 2.0,
                    ..TweenCfg::default()
                },
                move |s: &Sample| sink.borrow_mut().push(format!("{who}={}", s.progress)),
            )
            .unwrap();
        engine.insert(tl, id, start).unwrap();
        children.push((who, id));
    }
    let sink = log.clone();
    let cb = engine
        .create_callback(CallbackCfg::default(), move |_: &Sample| {
            sink.borrow_mut().push("cb".to_string())
        })
        .unwrap();
    engine.insert(tl, cb, 1.5).unwrap();
    watch(&mut engine, tl, "tl", &log);
    for (who, id) in children {
        watch(&mut engine, id, who, &log);
    }
    (engine, tl, log)
}

#[test]
fn skip_is_silent() {
    let (mut engine, tl, log) = scene();
    engine.skip_to(tl, 2.5).unwrap();
    assert!(log.borrow().is_empty());
    assert_eq!(engine.played_time(tl).unwrap(), 2.5);
    let b = engine.elements(tl).unwrap()[1].child;
    assert_eq!(engine.played_time(b).unwrap(), 1.5);
    assert!(engine.is_started(b).unwrap());
}

#[test]
fn skip_then_rewind_matches_silent_rewind_then_rewind() {
    for (parked, target) in [(1.5, 2.5), (2.5, 0.5), (1.25, 0.0)] {
        let (mut skipped, tl, skip_log) = scene();
        skipped.skip_to(tl, parked).unwrap();
        skipped.rewind_to(tl, target, true).unwrap();

        let (mut rewound, tl2, rewind_log) = scene();
        rewound.rewind_to(tl2, parked, false).unwrap();
        rewind_log.borrow_mut().clear();
        rewound.rewind_to(tl2, target, true).unwrap();

        assert_eq!(*skip_log.borrow(), *rewind_log.borrow(), "{parked} -> {target}");
    }
}

#[test]
fn skip_backward_from_the_end() {
    let (mut skipped, tl, skip_log) = scene();
    skipped.rewind_to_end(tl, false).unwrap();
    skip_log.borrow_mut().clear();
    skipped.skip_to(tl, 0.5).unwrap();
    assert!(skip_log.borrow().is_empty());
    skipped.rewind_to(tl, 0.0, true).unwrap();

    let (mut rewound, tl2, rewind_log) = scene();
    rewound.rewind_to_end(tl2, false).unwrap();
    rewound.rewind_to(tl2, 0.5, false).unwrap();
    rewind_log.borrow_mut().clear();
    rewound.rewind_to(tl2, 0.0, true).unwrap();

    assert_eq!(*skip_log.borrow(), *rewind_log.borrow());
}

#[test]
fn skipped_callbacks_count_as_passed() {
    let mut engine = Engine::default();
    let fired = Rc::new(RefCell::new(0));
    let sink = fired.clone();
    let cb = engine
        .create_callback(CallbackCfg::default(), move |_: &Sample| *sink.borrow_mut() += 1)
        .unwrap();

    engine.skip_to(cb, 1.0).unwrap();
    engine.rewind_to(cb, 1.0, true).unwrap();
    assert_eq!(*fired.borrow(), 0);
    engine.rewind_to(cb, 0.0, true).unwrap();
    engine.rewind_to(cb, 1.0, true).unwrap();
    assert_eq!(*fired.borrow(), 1);
}

#[test]
fn skip_rejects_bad_targets() {
    let (mut engine, tl, _) = scene();
    assert!(engine.skip_to(tl, f64::NAN).is_err());
    let a = engine.elements(tl).unwrap()[0].child;
    assert!(engine.skip_to(a, 0.5).is_err());
}

fn progress_trace(behaviour: LoopResetBehaviour) -> Vec<f64> {
    let mut engine = Engine::default();
    let tl = engine
        .create_timeline(TimelineCfg {
            loops_count: Some(2),
            loop_reset: Some(behaviour),
            ..TimelineCfg::default()
        })
        .unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let a = engine
        .create_tween(TweenCfg::default(), move |s: &Sample| {
            sink.borrow_mut().push(s.raw_progress)
        })
        .unwrap();
    engine.insert(tl, a, 0.0).unwrap();
    engine.rewind_to_end(tl, true).unwrap();
    let out = seen.borrow().clone();
    out
}

#[test]
fn rewind_reset_restores_values_between_loops() {
    assert_eq!(
        progress_trace(LoopResetBehaviour::Rewind),
        vec![0.0, 1.0, 0.0, 0.0, 1.0]
    );
}

#[test]
fn skip_reset_only_moves_positions() {
    assert_eq!(
        progress_trace(LoopResetBehaviour::Skip),
        vec![0.0, 1.0, 0.0, 1.0]
    );
}
