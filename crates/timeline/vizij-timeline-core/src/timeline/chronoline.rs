//! Chronolines: the precomputed per-instant dispatch lists of a timeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::PlayableId;
use crate::playable::Direction;

/// What executing a record does to the referenced child.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DispatchStep {
    /// Bring a child with positive duration to `local_time` in its own time.
    Sync { local_time: f64 },
    /// Zero-duration child: fire Start if it sits on the near side.
    ZeroStart,
    /// Zero-duration child: run one virtual loop.
    ZeroLoop { loop_index: u32 },
    /// Zero-duration child: fire Complete and flip its side.
    ZeroComplete,
}

/// Phase transition a record represents at its instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseTag {
    Start,
    FirstLoopStart,
    LoopStart,
    LoopUpdate,
    LoopComplete,
    Complete,
}

/// One entry of a chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    pub child: PlayableId,
    pub step: DispatchStep,
    pub tag: PhaseTag,
    /// Marks a real phase transition of the child at this instant (its own
    /// start, loop boundary, end or turnaround), as opposed to a pass-through update.
    /// A Mirror turnaround counts as a transition even though it only updates, so
    /// its chronoline survives pruning.
    pub useful: bool,
    /// Part of the round-robin block of zero-duration children.
    pub zero: bool,
}

/// Sort key inside a chain: element rank, then sequence within the element's group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    pub rank: u64,
    pub seq: u32,
}

impl SlotKey {
    #[inline]
    pub fn single(rank: u64) -> Self {
        Self { rank, seq: 0 }
    }
}

/// One direction's dispatch list: `pre` fires on arrival, `post` on departure.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    pub(crate) pre: BTreeMap<SlotKey, Record>,
    pub(crate) post: BTreeMap<SlotKey, Record>,
}

impl Chain {
    /// Number of records fired on arrival; the pre/post split point.
    #[inline]
    pub fn split(&self) -> usize {
        self.pre.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pre.len() + self.post.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    pub fn pre(&self) -> impl Iterator<Item = &Record> {
        self.pre.values()
    }

    pub fn post(&self) -> impl Iterator<Item = &Record> {
        self.post.values()
    }

    /// Arrival records followed by departure records.
    pub fn full(&self) -> impl Iterator<Item = &Record> {
        self.pre.values().chain(self.post.values())
    }

    pub(crate) fn remove_child(&mut self, child: PlayableId) {
        self.pre.retain(|_, r| r.child != child);
        self.post.retain(|_, r| r.child != child);
    }

    pub(crate) fn clear_zero_block(&mut self) {
        self.pre.retain(|_, r| !r.zero);
        self.post.retain(|_, r| !r.zero);
    }

    fn is_useful(&self) -> bool {
        self.full().any(|r| r.useful)
    }
}

/// A single instant of the timeline's content time with its two chains.
#[derive(Debug, Clone, Default)]
pub struct Chronoline {
    pub(crate) forward: Chain,
    pub(crate) backward: Chain,
}

impl Chronoline {
    #[inline]
    pub fn chain(&self, dir: Direction) -> &Chain {
        match dir {
            Direction::Forward => &self.forward,
            Direction::Backward => &self.backward,
        }
    }

    #[inline]
    pub(crate) fn chain_mut(&mut self, dir: Direction) -> &mut Chain {
        match dir {
            Direction::Forward => &mut self.forward,
            Direction::Backward => &mut self.backward,
        }
    }

    pub(crate) fn remove_child(&mut self, child: PlayableId) {
        self.forward.remove_child(child);
        self.backward.remove_child(child);
    }

    /// A chronoline survives only while it carries at least one real phase transition.
    pub fn is_useful(&self) -> bool {
        self.forward.is_useful() || self.backward.is_useful()
    }
}

/// Serializable view of a timeline's index, keyed by dense element order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub chronolines: Vec<ChronolineSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChronolineSnapshot {
    pub instant: f64,
    pub forward: ChainSnapshot,
    pub backward: ChainSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub records: Vec<RecordSnapshot>,
    pub split: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub order: usize,
    pub step: DispatchStep,
    pub tag: PhaseTag,
}
