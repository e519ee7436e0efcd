//! Rewind and skip: turning a jump of a playable's position into its ordered
//! lifecycle events, and recursing through timelines into their children.
//!
//! Every playable advances by the same loop-by-loop walk. Timelines add two
//! hooks: a loop-start reset of their children and a content dispatch that
//! replays the chronoline index between the old and new content positions.

use tracing::trace;

use crate::engine::{Engine, NodeKind};
use crate::error::TimelineError;
use crate::events::{EventKind, PhaseEvent, PlayableEvent};
use crate::ids::PlayableId;
use crate::leaf::{sample_at, zero_sample};
use crate::playable::{Direction, LoopContext, LoopType, ZeroSide};
use crate::time::{beyond, entry_loop, loop_entry, loop_exit, reached, snap};
use crate::timeline::dispatch::{ContentWindow, Planned, SkipTarget};
use crate::timeline::{DispatchStep, LoopResetBehaviour};
use crate::Result;

/// Snap `t` onto the nearest loop boundary `k * l` when within `eps`.
fn snap_to_boundary(t: f64, l: f64, n: u32, eps: f64) -> f64 {
    if l <= 0.0 {
        return t;
    }
    let k = (t / l).round().clamp(0.0, n as f64);
    snap(t, k * l, eps)
}

impl Engine {
    /// Run `f` with `id` locked against nested rewinds and skips.
    ///
    /// The lock is released on every exit path, errors included.
    pub(crate) fn with_lock<T>(
        &mut self,
        id: PlayableId,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let core = self.core_mut(id)?;
        if core.locked {
            return Err(TimelineError::ReentrancyViolation {
                playable: format!("{id:?}"),
            });
        }
        core.locked = true;
        let out = f(self);
        if let Some(node) = self.nodes.get_mut(id) {
            node.core.locked = false;
        }
        out
    }

    /// Deliver a phase event to the observers of `id`.
    #[allow(clippy::too_many_arguments)]
    fn fire(
        &mut self,
        id: PlayableId,
        emit: bool,
        kind: EventKind,
        direction: Direction,
        loop_index: Option<u32>,
        looped_time: Option<f64>,
        ctx: LoopContext,
    ) -> Result<()> {
        if !emit {
            return Ok(());
        }
        let node = self.node_mut(id)?;
        if node.observers.is_empty() {
            return Ok(());
        }
        let ctx = match loop_index {
            Some(k) => ctx.descend(node.core.loop_type, node.core.loops_count, k),
            None => ctx,
        };
        let event = PlayableEvent {
            playable: id,
            kind,
            direction,
            loop_index,
            looped_time,
            continue_index: ctx.continue_index,
            continue_count: ctx.continue_count,
        };
        node.observers.notify(&event);
        Ok(())
    }

    /// Fire the Before and After stages of `phase` with nothing in between.
    #[allow(clippy::too_many_arguments)]
    fn fire_pair(
        &mut self,
        id: PlayableId,
        emit: bool,
        phase: PhaseEvent,
        direction: Direction,
        loop_index: Option<u32>,
        looped_time: Option<f64>,
        ctx: LoopContext,
    ) -> Result<()> {
        self.fire(id, emit, EventKind::before(phase), direction, loop_index, looped_time, ctx)?;
        self.fire(id, emit, EventKind::after(phase), direction, loop_index, looped_time, ctx)
    }

    // ---------- public rewind API ----------

    /// Move a top-level playable to `time`, replaying every phase event in between.
    ///
    /// `time` is clamped to `[0, duration]`; rewinding to the current
    /// position does nothing. With `emit_events` false values are still
    /// applied but no observer is notified. Zero-duration playables treat
    /// any positive `time` as their end.
    pub fn rewind_to(&mut self, id: PlayableId, time: f64, emit_events: bool) -> Result<()> {
        self.ensure_top_level(id)?;
        if time.is_nan() {
            return Err(TimelineError::invalid("rewind time must not be NaN"));
        }
        let core = self.core(id)?;
        if core.is_zero_duration() {
            let side = if time > 0.0 {
                ZeroSide::After
            } else {
                ZeroSide::Before
            };
            return self.with_lock(id, |e| e.zero_run(id, side, emit_events, LoopContext::ROOT));
        }
        let eps = self.cfg.time_epsilon;
        let target = snap_to_boundary(
            time.clamp(0.0, core.duration()),
            core.loop_duration(),
            core.loops_count,
            eps,
        );
        let Some(dir) = Direction::of_travel(core.played_time, target) else {
            return Ok(());
        };
        self.advance(id, target, dir, emit_events, LoopContext::ROOT)
    }

    pub fn rewind_to_start(&mut self, id: PlayableId, emit_events: bool) -> Result<()> {
        self.rewind_to(id, 0.0, emit_events)
    }

    pub fn rewind_to_end(&mut self, id: PlayableId, emit_events: bool) -> Result<()> {
        let core = self.core(id)?;
        let end = if core.is_zero_duration() {
            1.0
        } else {
            core.duration()
        };
        self.rewind_to(id, end, emit_events)
    }

    // ---------- positive-duration state machine ----------

    pub(crate) fn advance(
        &mut self,
        id: PlayableId,
        t: f64,
        dir: Direction,
        emit: bool,
        ctx: LoopContext,
    ) -> Result<()> {
        self.with_lock(id, |e| e.advance_locked(id, t, dir, emit, ctx))
    }

    fn advance_locked(
        &mut self,
        id: PlayableId,
        t: f64,
        dir: Direction,
        emit: bool,
        ctx: LoopContext,
    ) -> Result<()> {
        let eps = self.cfg.time_epsilon;
        let core = self.core(id)?;
        let l = core.loop_duration();
        let n = core.loops_count;
        if l <= 0.0 {
            return Ok(());
        }
        let span = core.span;
        let mirror = core.loop_type == LoopType::Mirror;
        let terminal = core.terminal(dir);
        let t = snap_to_boundary(t.clamp(0.0, core.duration()), l, n, eps);

        if !core.started {
            // Finished in this direction already; nothing left to replay.
            if core.played_time == terminal {
                return Ok(());
            }
            let origin = core.origin(dir);
            self.fire(id, emit, EventKind::before(PhaseEvent::Start), dir, None, None, ctx)?;
            let core = self.core_mut(id)?;
            core.played_time = origin;
            core.started = true;
            core.active_loop = None;
            core.entry_pending = false;
            self.fire(id, emit, EventKind::after(PhaseEvent::Start), dir, None, None, ctx)?;
        }

        loop {
            let core = self.core(id)?;
            let played = core.played_time;
            let entry_pending = core.entry_pending;
            let Some(k) = core.active_loop else {
                let k = entry_loop(played, l, n, dir, eps);
                let entry = loop_entry(k, l, dir);
                let local = entry - k as f64 * l;
                self.fire(id, emit, EventKind::before(PhaseEvent::LoopStart), dir, Some(k), Some(local), ctx)?;
                self.before_loop_start(id, k, dir, ctx)?;
                let core = self.core_mut(id)?;
                core.active_loop = Some(k);
                core.entry_pending = true;
                core.played_time = entry;
                self.fire(id, emit, EventKind::after(PhaseEvent::LoopStart), dir, Some(k), Some(local), ctx)?;
                continue;
            };

            let base = k as f64 * l;
            let exit = loop_exit(k, l, dir);
            let completes = reached(t, exit, dir);
            let dest = if completes { exit } else { t };
            if mirror {
                let mid = base + span;
                if beyond(mid, played, dir) && beyond(dest, mid, dir) {
                    self.update(id, k, mid, dir, emit, ctx)?;
                }
            }
            if !completes {
                if t == played && !entry_pending {
                    return Ok(());
                }
                return self.update(id, k, t, dir, emit, ctx);
            }

            self.update(id, k, exit, dir, emit, ctx)?;
            let local = exit - base;
            self.fire(id, emit, EventKind::before(PhaseEvent::LoopComplete), dir, Some(k), Some(local), ctx)?;
            let core = self.core_mut(id)?;
            core.active_loop = None;
            core.played_time = exit;
            self.fire(id, emit, EventKind::after(PhaseEvent::LoopComplete), dir, Some(k), Some(local), ctx)?;
            if exit == terminal {
                self.fire(id, emit, EventKind::before(PhaseEvent::Complete), dir, None, None, ctx)?;
                self.core_mut(id)?.started = false;
                self.fire(id, emit, EventKind::after(PhaseEvent::Complete), dir, None, None, ctx)?;
                return Ok(());
            }
            if t == exit {
                return Ok(());
            }
        }
    }

    /// One mutate step inside loop `k`, moving the position to `pos`.
    fn update(
        &mut self,
        id: PlayableId,
        k: u32,
        pos: f64,
        dir: Direction,
        emit: bool,
        ctx: LoopContext,
    ) -> Result<()> {
        let core = self.core(id)?;
        let base = k as f64 * core.loop_duration();
        let from = core.played_time - base;
        let from_start = core.entry_pending;
        let to = pos - base;
        self.fire(id, emit, EventKind::before(PhaseEvent::LoopUpdate), dir, Some(k), Some(to), ctx)?;
        self.run_handler(id, k, from, to, from_start, dir, emit, ctx)?;
        let core = self.core_mut(id)?;
        core.played_time = pos;
        core.entry_pending = false;
        self.fire(id, emit, EventKind::after(PhaseEvent::LoopUpdate), dir, Some(k), Some(to), ctx)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_handler(
        &mut self,
        id: PlayableId,
        k: u32,
        from: f64,
        to: f64,
        from_start: bool,
        dir: Direction,
        emit: bool,
        ctx: LoopContext,
    ) -> Result<()> {
        let eps = self.cfg.time_epsilon;
        let node = self.node_mut(id)?;
        let core = &node.core;
        let plan = match &mut node.kind {
            NodeKind::Tween(tween) => {
                tween.applier.apply(&sample_at(core, k, to, dir, ctx));
                return Ok(());
            }
            NodeKind::Callback(callback) => {
                if emit {
                    callback.fire(&sample_at(core, k, to, dir, ctx));
                }
                return Ok(());
            }
            NodeKind::Interval => return Ok(()),
            NodeKind::Timeline(tl) => {
                let window = ContentWindow {
                    span: core.span,
                    ease: core.ease,
                    mirror: core.loop_type == LoopType::Mirror,
                };
                tl.plan_segment(&window, from, to, dir, from_start, eps)
            }
        };
        let child_ctx = ctx.descend(core.loop_type, core.loops_count, k);
        self.execute(plan, emit, child_ctx)
    }

    /// Run planned child steps in order.
    fn execute(&mut self, plan: Vec<Planned>, emit: bool, ctx: LoopContext) -> Result<()> {
        for step in plan {
            trace!(child = ?step.child, step = ?step.step, dir = ?step.direction, "timeline: dispatch");
            let (child, dir) = (step.child, step.direction);
            match step.step {
                DispatchStep::Sync { local_time } => self.advance(child, local_time, dir, emit, ctx)?,
                DispatchStep::ZeroStart => {
                    self.with_lock(child, |e| e.zero_start(child, dir, emit, ctx))?
                }
                DispatchStep::ZeroLoop { loop_index } => {
                    self.with_lock(child, |e| e.zero_loop(child, loop_index, dir, emit, ctx))?
                }
                DispatchStep::ZeroComplete => {
                    self.with_lock(child, |e| e.zero_complete(child, dir, emit, ctx))?
                }
            }
        }
        Ok(())
    }

    // ---------- zero-duration state machine ----------

    /// Run the full Start..Complete sequence so the playable lands on `side`.
    fn zero_run(&mut self, id: PlayableId, side: ZeroSide, emit: bool, ctx: LoopContext) -> Result<()> {
        let core = self.core(id)?;
        if core.zero_side == side {
            return Ok(());
        }
        let n = core.loops_count;
        let dir = match side {
            ZeroSide::After => Direction::Forward,
            ZeroSide::Before => Direction::Backward,
        };
        self.zero_start(id, dir, emit, ctx)?;
        for i in 0..n {
            let k = match dir {
                Direction::Forward => i,
                Direction::Backward => n - 1 - i,
            };
            self.zero_loop(id, k, dir, emit, ctx)?;
        }
        self.zero_complete(id, dir, emit, ctx)
    }

    fn zero_start(&mut self, id: PlayableId, dir: Direction, emit: bool, ctx: LoopContext) -> Result<()> {
        let core = self.core(id)?;
        if core.zero_side == ZeroSide::terminal(dir) {
            return Ok(());
        }
        self.fire(id, emit, EventKind::before(PhaseEvent::Start), dir, None, None, ctx)?;
        self.core_mut(id)?.zero_running = true;
        self.fire(id, emit, EventKind::after(PhaseEvent::Start), dir, None, None, ctx)
    }

    /// One virtual loop at the playable's single instant.
    fn zero_loop(
        &mut self,
        id: PlayableId,
        k: u32,
        dir: Direction,
        emit: bool,
        ctx: LoopContext,
    ) -> Result<()> {
        let core = self.core(id)?;
        if !core.zero_running {
            return Ok(());
        }
        let (entry, exit) = match dir {
            Direction::Forward => (0.0, 1.0),
            Direction::Backward => (1.0, 0.0),
        };
        // Mirror loops pass the turnaround before landing on the far side.
        let turn_then_exit = [0.5, exit];
        let positions = match core.loop_type {
            LoopType::Mirror => &turn_then_exit[..],
            LoopType::Reset | LoopType::Continue => &turn_then_exit[1..],
        };
        self.fire(id, emit, EventKind::before(PhaseEvent::LoopStart), dir, Some(k), Some(entry), ctx)?;
        self.before_loop_start(id, k, dir, ctx)?;
        self.fire(id, emit, EventKind::after(PhaseEvent::LoopStart), dir, Some(k), Some(entry), ctx)?;
        for &pos in positions {
            self.fire(id, emit, EventKind::before(PhaseEvent::LoopUpdate), dir, Some(k), Some(pos), ctx)?;
            self.zero_handler(id, k, pos, dir, emit, ctx)?;
            self.fire(id, emit, EventKind::after(PhaseEvent::LoopUpdate), dir, Some(k), Some(pos), ctx)?;
        }
        self.fire_pair(id, emit, PhaseEvent::LoopComplete, dir, Some(k), Some(exit), ctx)
    }

    fn zero_complete(&mut self, id: PlayableId, dir: Direction, emit: bool, ctx: LoopContext) -> Result<()> {
        if !self.core(id)?.zero_running {
            return Ok(());
        }
        self.fire(id, emit, EventKind::before(PhaseEvent::Complete), dir, None, None, ctx)?;
        let core = self.core_mut(id)?;
        core.zero_side = ZeroSide::terminal(dir);
        core.zero_running = false;
        self.fire(id, emit, EventKind::after(PhaseEvent::Complete), dir, None, None, ctx)
    }

    /// Mutate step of a zero-duration playable at normalized `pos`.
    fn zero_handler(
        &mut self,
        id: PlayableId,
        k: u32,
        pos: f64,
        dir: Direction,
        emit: bool,
        ctx: LoopContext,
    ) -> Result<()> {
        let node = self.node_mut(id)?;
        let core = &node.core;
        let plan = match &mut node.kind {
            NodeKind::Tween(tween) => {
                tween.applier.apply(&zero_sample(core, k, pos, dir, ctx));
                return Ok(());
            }
            NodeKind::Callback(callback) => {
                if emit {
                    callback.fire(&zero_sample(core, k, pos, dir, ctx));
                }
                return Ok(());
            }
            NodeKind::Interval => return Ok(()),
            NodeKind::Timeline(tl) => {
                let desired = match core.loop_type {
                    LoopType::Mirror if pos == 0.5 => ZeroSide::After,
                    LoopType::Mirror => ZeroSide::Before,
                    LoopType::Reset | LoopType::Continue if pos >= 1.0 => ZeroSide::After,
                    LoopType::Reset | LoopType::Continue => ZeroSide::Before,
                };
                if tl.zero_last == desired {
                    return Ok(());
                }
                tl.zero_last = desired;
                tl.plan_instant(match desired {
                    ZeroSide::After => Direction::Forward,
                    ZeroSide::Before => Direction::Backward,
                })
            }
        };
        let child_ctx = ctx.descend(core.loop_type, core.loops_count, k);
        self.execute(plan, emit, child_ctx)
    }

    // ---------- timeline loop reset ----------

    /// Bring every child back to where loop `k` of timeline `id` begins.
    ///
    /// Runs before each loop, the first included. Rewind mode replays the
    /// way back silently so values are restored; Skip mode only parks.
    fn before_loop_start(&mut self, id: PlayableId, k: u32, dir: Direction, ctx: LoopContext) -> Result<()> {
        let node = self.node(id)?;
        let NodeKind::Timeline(tl) = &node.kind else {
            return Ok(());
        };
        let core = &node.core;
        let cd = match core.loop_type {
            LoopType::Mirror => Direction::Forward,
            LoopType::Reset | LoopType::Continue => dir,
        };
        let origin_side = match cd {
            Direction::Forward => ZeroSide::Before,
            Direction::Backward => ZeroSide::After,
        };
        let behaviour = tl.loop_reset;
        let order = tl.reset_order(cd);
        let child_ctx = ctx.descend(core.loop_type, core.loops_count, k);
        let eps = self.cfg.time_epsilon;

        for (child, zero) in order {
            match (behaviour, zero) {
                (LoopResetBehaviour::Rewind, false) => {
                    let origin = self.core(child)?.origin(cd);
                    self.advance(child, origin, cd.reversed(), false, child_ctx)?;
                    self.core_mut(child)?.park(origin, eps);
                }
                (LoopResetBehaviour::Rewind, true) => {
                    self.with_lock(child, |e| e.zero_run(child, origin_side, false, child_ctx))?;
                }
                (LoopResetBehaviour::Skip, false) => {
                    let origin = self.core(child)?.origin(cd);
                    self.with_lock(child, |e| {
                        e.skip_inner(child, SkipTarget::Time(origin), cd.reversed())
                    })?;
                }
                (LoopResetBehaviour::Skip, true) => {
                    self.with_lock(child, |e| {
                        e.skip_inner(child, SkipTarget::Side(origin_side), cd.reversed())
                    })?;
                }
            }
        }
        self.timeline_mut(id)?.zero_last = origin_side;
        Ok(())
    }

    // ---------- skip ----------

    /// Move a top-level playable to `time` without firing anything.
    ///
    /// Children are re-seated at the matching content position. The next
    /// rewind continues from there as if every phase before it had passed.
    pub fn skip_to(&mut self, id: PlayableId, time: f64) -> Result<()> {
        self.ensure_top_level(id)?;
        if time.is_nan() {
            return Err(TimelineError::invalid("skip time must not be NaN"));
        }
        let core = self.core(id)?;
        let target = if core.is_zero_duration() {
            SkipTarget::Side(if time > 0.0 {
                ZeroSide::After
            } else {
                ZeroSide::Before
            })
        } else {
            SkipTarget::Time(time)
        };
        let dir = Direction::of_travel(core.played_time, time).unwrap_or(core.direction);
        self.with_lock(id, |e| e.skip_inner(id, target, dir))
    }

    /// Re-seat a timeline and its children at its current position.
    pub(crate) fn reseat(&mut self, id: PlayableId) -> Result<()> {
        let core = self.core(id)?;
        let target = if core.is_zero_duration() {
            SkipTarget::Side(core.zero_side)
        } else {
            SkipTarget::Time(core.played_time)
        };
        let dir = core.direction;
        self.with_lock(id, |e| e.skip_inner(id, target, dir))
    }

    fn skip_inner(&mut self, id: PlayableId, target: SkipTarget, dir: Direction) -> Result<()> {
        let eps = self.cfg.time_epsilon;
        let node = self.node_mut(id)?;
        let core = &mut node.core;
        let target = match target {
            SkipTarget::Time(t) if core.is_zero_duration() => SkipTarget::Side(if t > 0.0 {
                ZeroSide::After
            } else {
                ZeroSide::Before
            }),
            other => other,
        };
        let plan = match target {
            SkipTarget::Side(side) => {
                core.park(0.0, eps);
                core.zero_side = side;
                let NodeKind::Timeline(tl) = &mut node.kind else {
                    return Ok(());
                };
                tl.zero_last = side;
                tl.elements
                    .iter()
                    .map(|e| (e.child, SkipTarget::Side(side)))
                    .collect::<Vec<_>>()
            }
            SkipTarget::Time(t) => {
                core.park(t, eps);
                let NodeKind::Timeline(tl) = &node.kind else {
                    return Ok(());
                };
                let l = core.loop_duration();
                let p = core.played_time;
                let k = entry_loop(p, l, core.loops_count, dir, eps);
                let tau = (p - k as f64 * l).clamp(0.0, l);
                let window = ContentWindow {
                    span: core.span,
                    ease: core.ease,
                    mirror: core.loop_type == LoopType::Mirror,
                };
                let cdir = window.content_direction(tau, dir);
                tl.plan_skip(window.content_at(tau), cdir)
            }
        };
        for (child, child_target) in plan {
            self.with_lock(child, |e| e.skip_inner(child, child_target, dir))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TweenCfg;
    use crate::leaf::Sample;

    #[test]
    fn locked_playable_rejects_rewind_and_unlocks_after() {
        let mut engine = Engine::default();
        let id = engine.create_tween(TweenCfg::default(), |_: &Sample| {}).unwrap();
        engine.core_mut(id).unwrap().locked = true;
        let err = engine.rewind_to(id, 0.5, true).unwrap_err();
        assert!(matches!(err, TimelineError::ReentrancyViolation { .. }));
        engine.core_mut(id).unwrap().locked = false;
        engine.rewind_to(id, 0.5, true).unwrap();
        assert!(!engine.core(id).unwrap().locked);
        assert_eq!(engine.played_time(id).unwrap(), 0.5);
    }

    #[test]
    fn boundary_snapping() {
        assert_eq!(snap_to_boundary(0.999_999_999_99, 1.0, 3, 1e-9), 1.0);
        assert_eq!(snap_to_boundary(1.5, 1.0, 3, 1e-9), 1.5);
        assert_eq!(snap_to_boundary(0.3, 0.0, 3, 1e-9), 0.3);
    }
}
