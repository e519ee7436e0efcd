//! Turning a move of the timeline's own position into an ordered list of
//! child steps, by walking the chronoline index.
//!
//! Planning only reads the index; the engine executes the returned steps
//! afterwards, which keeps child dispatch free of borrows on the timeline.

use tracing::{trace, warn};

use super::{DispatchStep, TimelineNode};
use crate::ease::Ease;
use crate::ids::PlayableId;
use crate::playable::{Direction, ZeroSide};
use crate::time::TimeKey;

/// One child step, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Planned {
    pub child: PlayableId,
    pub step: DispatchStep,
    pub direction: Direction,
}

/// Where a skip leaves a child.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SkipTarget {
    Time(f64),
    Side(ZeroSide),
}

/// Mapping from a timeline's looped time to its content time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ContentWindow {
    /// Content length; one forward traversal.
    pub span: f64,
    pub ease: Ease,
    pub mirror: bool,
}

impl ContentWindow {
    fn remap(&self, x: f64) -> f64 {
        if self.ease.is_linear() || self.span <= 0.0 {
            return x.clamp(0.0, self.span);
        }
        (self.span * self.ease.apply(x / self.span)).clamp(0.0, self.span)
    }

    /// Whether looped time `tau` lies in the return half of a Mirror loop.
    #[inline]
    fn returning(&self, tau: f64) -> bool {
        self.mirror && tau > self.span
    }

    /// Content position shown at looped time `tau`.
    pub fn content_at(&self, tau: f64) -> f64 {
        if self.returning(tau) {
            self.remap(2.0 * self.span - tau)
        } else {
            self.remap(tau)
        }
    }

    /// Direction content moves in when looped time moves in `dir` around `tau`.
    pub fn content_direction(&self, tau: f64, dir: Direction) -> Direction {
        if self.returning(tau) {
            dir.reversed()
        } else {
            dir
        }
    }
}

impl TimelineNode {
    /// Snap `c` onto an existing chronoline closer than `eps`.
    fn snap_instant(&self, c: f64, eps: f64) -> f64 {
        self.chronolines
            .range(TimeKey(c - eps)..=TimeKey(c + eps))
            .next()
            .map(|(k, _)| k.0)
            .unwrap_or(c)
    }

    fn push_chain(&self, out: &mut Vec<Planned>, c: f64, cd: Direction, pre: bool, post: bool) {
        let Some(line) = self.chronolines.get(&TimeKey(c)) else {
            return;
        };
        let chain = line.chain(cd);
        let pre_records = chain.pre().filter(|_| pre);
        let post_records = chain.post().filter(|_| post);
        out.extend(pre_records.chain(post_records).map(|r| Planned {
            child: r.child,
            step: r.step,
            direction: cd,
        }));
    }

    /// Plan a move from looped time `from` to `to` inside one loop.
    ///
    /// The segment never strictly crosses a Mirror turnaround; the state
    /// machine splits there. `from_start` marks a departure from the loop's
    /// entry edge, where the whole chain must fire.
    pub(crate) fn plan_segment(
        &self,
        window: &ContentWindow,
        from: f64,
        to: f64,
        dir: Direction,
        from_start: bool,
        eps: f64,
    ) -> Vec<Planned> {
        let probe = from.max(to);
        let nominal = window.content_direction(probe, dir);
        let c0 = self.snap_instant(window.content_at_folded(from, probe), eps);
        let c1 = self.snap_instant(window.content_at_folded(to, probe), eps);
        // Leaving the turnaround always reverses the content.
        let from_start = from_start || (window.mirror && from == window.span);
        let cd = match Direction::of_travel(c0, c1) {
            Some(actual) if actual != nominal => {
                warn!(c0, c1, "timeline: ease runs against travel direction");
                actual
            }
            Some(actual) => actual,
            None => nominal,
        };
        self.plan_content(c0, c1, cd, from_start, window.span)
    }

    fn plan_content(
        &self,
        c0: f64,
        c1: f64,
        cd: Direction,
        from_start: bool,
        span: f64,
    ) -> Vec<Planned> {
        let mut out = Vec::new();
        if from_start {
            self.push_chain(&mut out, c0, cd, true, true);
            if c0 == c1 {
                return out;
            }
        } else if c0 == c1 {
            return out;
        } else {
            self.push_chain(&mut out, c0, cd, false, true);
        }

        let (lo, hi) = if c0 < c1 { (c0, c1) } else { (c1, c0) };
        let mut between: Vec<f64> = self
            .chronolines
            .range(TimeKey(lo)..=TimeKey(hi))
            .map(|(k, _)| k.0)
            .filter(|x| *x > lo && *x < hi)
            .collect();
        if cd == Direction::Backward {
            between.reverse();
        }
        for x in between {
            self.push_chain(&mut out, x, cd, true, true);
        }

        if self.chronolines.contains_key(&TimeKey(c1)) {
            let at_edge = match cd {
                Direction::Forward => c1 == span,
                Direction::Backward => c1 == 0.0,
            };
            self.push_chain(&mut out, c1, cd, true, at_edge);
        } else {
            for e in self
                .elements
                .iter()
                .filter(|e| e.indexed() && !e.shape.is_zero())
                .filter(|e| e.start_time < c1 && c1 < e.end_time())
            {
                out.push(Planned {
                    child: e.child,
                    step: DispatchStep::Sync {
                        local_time: c1 - e.start_time,
                    },
                    direction: cd,
                });
            }
        }
        trace!(c0, c1, ?cd, steps = out.len(), "timeline: planned segment");
        out
    }

    /// Whole chain at content 0, used when the timeline itself has zero duration.
    pub(crate) fn plan_instant(&self, dir: Direction) -> Vec<Planned> {
        let mut out = Vec::new();
        self.push_chain(&mut out, 0.0, dir, true, true);
        out
    }

    /// Children in the order a loop reset walks them back to content origin.
    ///
    /// Returns `(child, zero_duration)` pairs in the order a sweep back to
    /// the origin would finish them, so overlapping values settle on the
    /// child that owns the loop origin.
    pub(crate) fn reset_order(&self, cd: Direction) -> Vec<(PlayableId, bool)> {
        let mut elems: Vec<_> = self.elements.iter().filter(|e| e.indexed()).collect();
        match cd {
            Direction::Forward => elems.sort_by(|a, b| {
                TimeKey(b.start_time)
                    .cmp(&TimeKey(a.start_time))
                    .then(b.rank.cmp(&a.rank))
            }),
            Direction::Backward => elems.sort_by(|a, b| {
                TimeKey(a.end_time())
                    .cmp(&TimeKey(b.end_time()))
                    .then(a.rank.cmp(&b.rank))
            }),
        }
        elems
            .into_iter()
            .map(|e| (e.child, e.shape.is_zero()))
            .collect()
    }

    /// Where each child ends up when the content is skipped to `c`.
    pub(crate) fn plan_skip(&self, c: f64, dir: Direction) -> Vec<(PlayableId, SkipTarget)> {
        self.elements
            .iter()
            .map(|e| {
                let target = if e.shape.is_zero() {
                    let side = if c > e.start_time {
                        ZeroSide::After
                    } else if c < e.start_time {
                        ZeroSide::Before
                    } else {
                        ZeroSide::terminal(dir)
                    };
                    SkipTarget::Side(side)
                } else {
                    SkipTarget::Time((c - e.start_time).clamp(0.0, e.shape.duration()))
                };
                (e.child, target)
            })
            .collect()
    }
}

impl ContentWindow {
    /// Content position of `tau`, folding by the half that `probe` lies in.
    fn content_at_folded(&self, tau: f64, probe: f64) -> f64 {
        if self.returning(probe) {
            self.remap(2.0 * self.span - tau)
        } else {
            self.remap(tau)
        }
    }
}
