//! Timeline composition: positioned child elements and the chronoline index.
//!
//! The index maps every instant at which some child changes phase (start,
//! loop boundary, end, Mirror turnaround) to a [`Chronoline`] holding, per
//! travel direction, the ordered records to dispatch when the timeline
//! arrives at or leaves that instant. It is maintained incrementally on
//! insert/remove; moves are remove-then-reinsert.

pub mod chronoline;
pub(crate) mod dispatch;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ids::PlayableId;
use crate::playable::{Direction, LoopType, ZeroSide};
use crate::time::TimeKey;

pub use chronoline::{
    Chain, ChainSnapshot, Chronoline, ChronolineSnapshot, DispatchStep, IndexSnapshot, PhaseTag,
    Record, RecordSnapshot, SlotKey,
};

/// What happens to children right before each loop of their timeline begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LoopResetBehaviour {
    /// Silently rewind every child to its loop-start state (values restored, no events).
    #[default]
    Rewind,
    /// Only move children's positions; values keep whatever they last were.
    Skip,
}

/// Duration-related facts about a child, captured when it is indexed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ChildShape {
    pub loop_duration: f64,
    pub span: f64,
    pub loops_count: u32,
    pub loop_type: LoopType,
    /// Zero-duration intervals are pure placeholders and never dispatched.
    pub placeholder: bool,
}

impl ChildShape {
    #[inline]
    pub fn duration(&self) -> f64 {
        self.loop_duration * self.loops_count as f64
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.loop_duration <= 0.0
    }
}

/// One child positioned inside a timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Element {
    pub child: PlayableId,
    pub start_time: f64,
    /// Sparse sort key; the public dense order is the element's index.
    pub rank: u64,
    pub shape: ChildShape,
}

impl Element {
    #[inline]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.shape.duration()
    }

    #[inline]
    fn indexed(&self) -> bool {
        !(self.shape.placeholder && self.shape.is_zero())
    }

    /// Instant of loop boundary `k`, with `k == loops_count` being the end.
    #[inline]
    fn boundary(&self, k: u32) -> f64 {
        self.start_time + k as f64 * self.shape.loop_duration
    }

    fn midpoint(&self, k: u32) -> f64 {
        self.boundary(k) + self.shape.span
    }

    /// Every instant at which this element changes phase.
    fn own_instants(&self) -> Vec<f64> {
        if self.shape.is_zero() {
            return vec![self.start_time];
        }
        let n = self.shape.loops_count;
        let mut out: Vec<f64> = (0..=n).map(|k| self.boundary(k)).collect();
        if self.shape.loop_type == LoopType::Mirror {
            out.extend((0..n).map(|k| self.midpoint(k)));
        }
        out
    }

    /// How this element relates to instant `x`, if it intersects it.
    fn role_at(&self, x: f64) -> Option<Role> {
        let s = self.start_time;
        if self.shape.is_zero() {
            return (x == s).then_some(Role::Zero);
        }
        let end = self.end_time();
        if x < s || x > end {
            return None;
        }
        if x == s {
            return Some(Role::Start);
        }
        if x == end {
            return Some(Role::End);
        }
        let l = self.shape.loop_duration;
        let q = (x - s) / l;
        let nearest = q.round();
        if nearest >= 1.0 && nearest < self.shape.loops_count as f64 {
            let k = nearest as u32;
            if self.boundary(k) == x {
                return Some(Role::Boundary(k));
            }
        }
        if self.shape.loop_type == LoopType::Mirror {
            let k = (q.floor().max(0.0) as u32).min(self.shape.loops_count - 1);
            if self.midpoint(k) == x {
                return Some(Role::Midpoint(k));
            }
        }
        Some(Role::Spanning)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Start,
    /// Between loop `k - 1` and loop `k`.
    Boundary(u32),
    End,
    /// Mirror turnaround of loop `k`.
    Midpoint(u32),
    /// Intersects the instant without changing phase there.
    Spanning,
    Zero,
}

/// Public view of one element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub child: PlayableId,
    pub start_time: f64,
    pub end_time: f64,
    pub order: usize,
}

#[derive(Debug, Default)]
pub struct TimelineNode {
    /// Sorted by rank, so the index is the dense order.
    pub(crate) elements: Vec<Element>,
    pub(crate) chronolines: BTreeMap<TimeKey, Chronoline>,
    pub(crate) loop_reset: LoopResetBehaviour,
    /// Side the children were last brought to while the whole timeline has zero duration.
    pub(crate) zero_last: ZeroSide,
}

impl TimelineNode {
    pub(crate) fn new(loop_reset: LoopResetBehaviour) -> Self {
        Self {
            loop_reset,
            ..Self::default()
        }
    }

    /// Length of the content: the latest element end.
    pub(crate) fn content_span(&self) -> f64 {
        self.elements
            .iter()
            .map(Element::end_time)
            .fold(0.0, f64::max)
    }

    pub(crate) fn position_of(&self, child: PlayableId) -> Option<usize> {
        self.elements.iter().position(|e| e.child == child)
    }

    pub(crate) fn info(&self, order: usize) -> ElementInfo {
        let e = &self.elements[order];
        ElementInfo {
            child: e.child,
            start_time: e.start_time,
            end_time: e.end_time(),
            order,
        }
    }

    pub(crate) fn chronoline_count(&self) -> usize {
        self.chronolines.len()
    }

    /// Insert a child at dense position `order` (clamped to the element count).
    pub(crate) fn insert_element(
        &mut self,
        child: PlayableId,
        shape: ChildShape,
        start_time: f64,
        order: usize,
        rank_gap: u64,
    ) {
        let order = order.min(self.elements.len());
        let rank = self.rank_for(order, rank_gap);
        let element = Element {
            child,
            start_time,
            rank: rank.unwrap_or(0),
            shape,
        };
        self.elements.insert(order, element);
        debug!(
            ?child,
            start_time,
            order,
            end_time = element.end_time(),
            "timeline: insert element"
        );
        match rank {
            Some(_) => self.index_element(order),
            None => self.rebalance(rank_gap),
        }
    }

    /// Remove a child and strip its records; returns the removed element.
    pub(crate) fn remove_element(&mut self, child: PlayableId) -> Option<Element> {
        let order = self.position_of(child)?;
        let element = self.elements.remove(order);
        debug!(?child, order, "timeline: remove element");
        self.unindex_element(&element);
        Some(element)
    }

    /// Rank strictly between the neighbours of `order`, or `None` when the gap is exhausted.
    fn rank_for(&self, order: usize, gap: u64) -> Option<u64> {
        let prev = order
            .checked_sub(1)
            .and_then(|i| self.elements.get(i))
            .map(|e| e.rank);
        let next = self.elements.get(order).map(|e| e.rank);
        match (prev, next) {
            (None, None) => Some(gap),
            (Some(p), None) => p.checked_add(gap),
            (None, Some(n)) => (n >= 2).then(|| n / 2),
            (Some(p), Some(n)) => (n - p >= 2).then(|| p + (n - p) / 2),
        }
    }

    /// Respace every rank and rebuild the whole index.
    ///
    /// The spacing shrinks below `gap` when `len * gap` would not fit in a rank.
    fn rebalance(&mut self, gap: u64) {
        let len = self.elements.len() as u64;
        let spacing = gap.min(u64::MAX / len.max(1)).max(1);
        debug!(elements = len, spacing, "timeline: rebalance ranks");
        for (i, e) in self.elements.iter_mut().enumerate() {
            e.rank = (i as u64 + 1) * spacing;
        }
        self.rebuild_index();
    }

    pub(crate) fn rebuild_index(&mut self) {
        self.chronolines.clear();
        for i in 0..self.elements.len() {
            self.index_element(i);
        }
    }

    fn index_element(&mut self, order: usize) {
        let e = self.elements[order];
        if !e.indexed() {
            return;
        }
        if e.shape.is_zero() {
            self.ensure_chronoline(e.start_time);
            self.rebuild_zero_block(e.start_time);
            return;
        }
        // Existing instants the element spans get its records merged in.
        let lo = TimeKey(e.start_time);
        let hi = TimeKey(e.end_time());
        for (x, line) in self.chronolines.range_mut(lo..=hi) {
            if let Some(role) = e.role_at(x.0) {
                add_records(line, &e, role, x.0);
            }
        }
        // Instants of its own that are not indexed yet.
        for x in e.own_instants() {
            self.ensure_chronoline(x);
        }
    }

    fn unindex_element(&mut self, e: &Element) {
        if !e.indexed() {
            return;
        }
        if e.shape.is_zero() {
            self.rebuild_zero_block(e.start_time);
            self.prune(e.start_time, e.start_time);
            return;
        }
        let lo = TimeKey(e.start_time);
        let hi = TimeKey(e.end_time());
        for (_, line) in self.chronolines.range_mut(lo..=hi) {
            line.remove_child(e.child);
        }
        self.prune(e.start_time, e.end_time());
    }

    fn prune(&mut self, from: f64, to: f64) {
        let dead: Vec<TimeKey> = self
            .chronolines
            .range(TimeKey(from)..=TimeKey(to))
            .filter(|(_, line)| !line.is_useful())
            .map(|(x, _)| *x)
            .collect();
        for x in dead {
            debug!(instant = x.0, "timeline: prune chronoline");
            self.chronolines.remove(&x);
        }
    }

    /// Create the chronoline at `x` with records for every intersecting element.
    fn ensure_chronoline(&mut self, x: f64) {
        let key = TimeKey(x);
        if self.chronolines.contains_key(&key) {
            return;
        }
        let mut line = Chronoline::default();
        for e in self.elements.iter().filter(|e| e.indexed() && !e.shape.is_zero()) {
            if let Some(role) = e.role_at(x) {
                add_records(&mut line, e, role, x);
            }
        }
        debug!(instant = x, "timeline: create chronoline");
        self.chronolines.insert(key, line);
        self.rebuild_zero_block(x);
    }

    /// Regenerate the round-robin block of zero-duration children sitting at `x`.
    ///
    /// Each zero child unrolls all of its virtual loops at this single
    /// instant. Children sharing the instant take turns loop by loop in
    /// element order, so a child with fewer loops completes before the
    /// others finish.
    fn rebuild_zero_block(&mut self, x: f64) {
        let members: Vec<(PlayableId, u64, u32)> = self
            .elements
            .iter()
            .filter(|e| e.indexed() && e.shape.is_zero() && e.start_time == x)
            .map(|e| (e.child, e.rank, e.shape.loops_count))
            .collect();
        let Some(line) = self.chronolines.get_mut(&TimeKey(x)) else {
            return;
        };
        for dir in [Direction::Forward, Direction::Backward] {
            let chain = line.chain_mut(dir);
            chain.clear_zero_block();
            let Some(block_rank) = members.iter().map(|m| m.1).min() else {
                continue;
            };
            let block = zero_block(&members, dir);
            for (seq, (child, step, tag)) in block.into_iter().enumerate() {
                let key = SlotKey {
                    rank: block_rank,
                    seq: seq as u32,
                };
                let record = Record {
                    child,
                    step,
                    tag,
                    useful: true,
                    zero: true,
                };
                chain.pre.insert(key, record);
                chain.post.insert(key, record);
            }
        }
    }

    /// Dense-order view of the index, independent of internal ranks.
    pub(crate) fn snapshot(&self) -> IndexSnapshot {
        let order_of = |child: PlayableId| self.position_of(child).unwrap_or(usize::MAX);
        let chain_snapshot = |chain: &Chain| ChainSnapshot {
            records: chain
                .full()
                .map(|r| RecordSnapshot {
                    order: order_of(r.child),
                    step: r.step,
                    tag: r.tag,
                })
                .collect(),
            split: chain.split(),
        };
        IndexSnapshot {
            chronolines: self
                .chronolines
                .iter()
                .map(|(x, line)| ChronolineSnapshot {
                    instant: x.0,
                    forward: chain_snapshot(&line.forward),
                    backward: chain_snapshot(&line.backward),
                })
                .collect(),
        }
    }
}

/// Round-robin unrolling of zero-duration members (sorted by rank) for one direction.
fn zero_block(
    members: &[(PlayableId, u64, u32)],
    dir: Direction,
) -> Vec<(PlayableId, DispatchStep, PhaseTag)> {
    let mut out = Vec::new();
    for &(child, _, _) in members {
        out.push((child, DispatchStep::ZeroStart, PhaseTag::Start));
    }
    // Scratch buffer: remaining virtual loops per member.
    let mut remaining: Vec<u32> = members.iter().map(|m| m.2).collect();
    let mut round = 0u32;
    while remaining.iter().any(|r| *r > 0) {
        for (i, &(child, _, loops)) in members.iter().enumerate() {
            if remaining[i] == 0 {
                continue;
            }
            let loop_index = match dir {
                Direction::Forward => round,
                Direction::Backward => loops - 1 - round,
            };
            let tag = if round == 0 {
                PhaseTag::FirstLoopStart
            } else {
                PhaseTag::LoopStart
            };
            out.push((child, DispatchStep::ZeroLoop { loop_index }, tag));
            remaining[i] -= 1;
            if remaining[i] == 0 {
                out.push((child, DispatchStep::ZeroComplete, PhaseTag::Complete));
            }
        }
        round += 1;
    }
    out
}

/// Merge the records of element `e` playing `role` at instant `x` into `line`.
fn add_records(line: &mut Chronoline, e: &Element, role: Role, x: f64) {
    let key = SlotKey::single(e.rank);
    let n = e.shape.loops_count;
    let l = e.shape.loop_duration;
    let record = |local_time: f64, tag: PhaseTag, useful: bool| Record {
        child: e.child,
        step: DispatchStep::Sync { local_time },
        tag,
        useful,
        zero: false,
    };
    // (forward pre, forward post, backward pre, backward post)
    let (fp, fo, bp, bo) = match role {
        Role::Start => (
            Some(record(0.0, PhaseTag::Start, true)),
            Some(record(0.0, PhaseTag::FirstLoopStart, true)),
            Some(record(0.0, PhaseTag::Complete, true)),
            Some(record(0.0, PhaseTag::Complete, true)),
        ),
        Role::End => {
            let d = e.shape.duration();
            (
                Some(record(d, PhaseTag::Complete, true)),
                Some(record(d, PhaseTag::Complete, true)),
                Some(record(d, PhaseTag::Start, true)),
                Some(record(d, PhaseTag::FirstLoopStart, true)),
            )
        }
        Role::Boundary(k) => {
            let local = k as f64 * l;
            (
                Some(record(local, PhaseTag::LoopComplete, true)),
                Some(record(local, PhaseTag::LoopStart, true)),
                Some(record(local, PhaseTag::LoopComplete, true)),
                Some(record(local, PhaseTag::LoopStart, true)),
            )
        }
        Role::Midpoint(k) => {
            let local = k as f64 * l + e.shape.span;
            // Turnaround: useful, unlike a pass-through update.
            let r = record(local, PhaseTag::LoopUpdate, true);
            (Some(r), None, Some(r), None)
        }
        Role::Spanning => {
            let r = record((x - e.start_time).clamp(0.0, l * n as f64), PhaseTag::LoopUpdate, false);
            (Some(r), None, Some(r), None)
        }
        Role::Zero => return,
    };
    if let Some(r) = fp {
        line.forward.pre.insert(key, r);
    }
    if let Some(r) = fo {
        line.forward.post.insert(key, r);
    }
    if let Some(r) = bp {
        line.backward.pre.insert(key, r);
    }
    if let Some(r) = bo {
        line.backward.post.insert(key, r);
    }
}
