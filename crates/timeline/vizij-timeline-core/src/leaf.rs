//! Leaf playables: the value-applier contract and the Tween/Callback/Interval variants.

use crate::playable::{Direction, LoopContext, LoopType, PlayableCore};

/// What a leaf sees each time its mutate step runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub loop_index: u32,
    /// Position inside the current loop, in seconds. For zero-duration
    /// playables this is the normalized position (0, 0.5 or 1).
    pub looped_time: f64,
    /// Progress through the span, folded for Mirror, before easing.
    pub raw_progress: f64,
    /// Eased progress; what an interpolator should consume.
    pub progress: f64,
    /// Travel direction of the rewind.
    pub direction: Direction,
    /// Virtual loop index including this playable's own Continue loops.
    pub context: LoopContext,
}

/// Capability implemented by concrete animated-value nodes.
pub trait ValueApplier {
    fn apply(&mut self, sample: &Sample);
}

impl<F> ValueApplier for F
where
    F: FnMut(&Sample),
{
    fn apply(&mut self, sample: &Sample) {
        self(sample)
    }
}

pub struct TweenNode {
    pub(crate) applier: Box<dyn ValueApplier>,
}

pub struct CallbackNode {
    pub(crate) callback: Box<dyn FnMut(&Sample)>,
    pub(crate) fire_backward: bool,
}

impl CallbackNode {
    /// Callbacks fire when their instant is crossed forward, and backward when enabled.
    pub(crate) fn fire(&mut self, sample: &Sample) {
        if sample.direction.is_forward() || self.fire_backward {
            (self.callback)(sample);
        }
    }
}

/// Sample for a playable with a positive span.
pub(crate) fn sample_at(
    core: &PlayableCore,
    loop_index: u32,
    looped_time: f64,
    direction: Direction,
    ctx: LoopContext,
) -> Sample {
    let span = core.span;
    let raw = if span <= 0.0 {
        1.0
    } else if core.loop_type == LoopType::Mirror && looped_time > span {
        (2.0 * span - looped_time) / span
    } else {
        looped_time / span
    };
    let raw = raw.clamp(0.0, 1.0);
    Sample {
        loop_index,
        looped_time,
        raw_progress: raw,
        progress: core.ease.apply(raw),
        direction,
        context: ctx.descend(core.loop_type, core.loops_count, loop_index),
    }
}

/// Sample for a zero-duration playable at normalized position `position`.
///
/// Mirror loops use 0.5 as the turnaround: progress peaks there and falls
/// back to 0 at both ends.
pub(crate) fn zero_sample(
    core: &PlayableCore,
    loop_index: u32,
    position: f64,
    direction: Direction,
    ctx: LoopContext,
) -> Sample {
    let raw = match core.loop_type {
        LoopType::Mirror => 1.0 - (2.0 * position - 1.0).abs(),
        LoopType::Reset | LoopType::Continue => position,
    };
    Sample {
        loop_index,
        looped_time: position,
        raw_progress: raw,
        progress: core.ease.apply(raw),
        direction,
        context: ctx.descend(core.loop_type, core.loops_count, loop_index),
    }
}
