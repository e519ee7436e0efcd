//! Shared playable state: duration/loop configuration, playback state and
//! the phase bookkeeping the rewind state machine advances.

use serde::{Deserialize, Serialize};

use crate::ease::Ease;

/// How successive loops relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LoopType {
    /// Every loop replays the same local window.
    #[default]
    Reset,
    /// Every loop continues from where the previous one ended.
    Continue,
    /// Every loop goes forward through the span and then back.
    Mirror,
}

/// Travel or play direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    #[inline]
    pub fn reversed(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }

    /// Direction of travel from `from` to `to`; `None` when equal.
    #[inline]
    pub fn of_travel(from: f64, to: f64) -> Option<Self> {
        if to > from {
            Some(Self::Forward)
        } else if to < from {
            Some(Self::Backward)
        } else {
            None
        }
    }

    #[inline]
    pub fn is_forward(self) -> bool {
        matches!(self, Self::Forward)
    }
}

/// Playback state of a top-level playable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Reset,
    Playing,
    Paused,
    Completed,
}

impl PlaybackState {
    /// Get the name of this playback state
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

/// Which side of its single instant a zero-duration playable sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZeroSide {
    #[default]
    Before,
    After,
}

impl ZeroSide {
    /// Side a zero-duration playable ends on after a full pass in `dir`.
    #[inline]
    pub fn terminal(dir: Direction) -> Self {
        match dir {
            Direction::Forward => Self::After,
            Direction::Backward => Self::Before,
        }
    }
}

/// Virtual loop index threaded down through nested Continue playables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopContext {
    /// Running parent loop index, already multiplied through every Continue ancestor.
    pub continue_index: u64,
    /// Running product of the loop counts of every Continue ancestor.
    pub continue_count: u64,
}

impl Default for LoopContext {
    fn default() -> Self {
        Self::ROOT
    }
}

impl LoopContext {
    pub const ROOT: Self = Self {
        continue_index: 0,
        continue_count: 1,
    };

    /// Context seen inside loop `loop_index` of a playable configured with
    /// `loop_type` and `loops_count`.
    ///
    /// Continue multiplies the running index through this level's loops; Reset
    /// and Mirror loops return to their origin every iteration, so they hand
    /// the inherited index down unchanged.
    ///
    /// Both accumulators saturate at `u64::MAX`, with the index held below the count.
    pub fn descend(self, loop_type: LoopType, loops_count: u32, loop_index: u32) -> Self {
        match loop_type {
            LoopType::Continue => {
                let continue_count = self.continue_count.saturating_mul(loops_count as u64).max(1);
                let continue_index = self
                    .continue_index
                    .saturating_mul(loops_count as u64)
                    .saturating_add(loop_index as u64)
                    .min(continue_count - 1);
                Self {
                    continue_index,
                    continue_count,
                }
            }
            LoopType::Reset | LoopType::Mirror => self,
        }
    }
}

/// Configuration and phase bookkeeping shared by every playable variant.
#[derive(Debug, Clone)]
pub struct PlayableCore {
    /// One forward traversal. Derived from children for timelines.
    pub(crate) span: f64,
    pub(crate) loops_count: u32,
    pub(crate) loop_type: LoopType,
    /// Play direction used by the driver.
    pub(crate) direction: Direction,
    pub(crate) ease: Ease,

    pub(crate) played_time: f64,
    pub(crate) state: PlaybackState,
    /// Start fired and Complete not yet fired.
    pub(crate) started: bool,
    /// Loop currently entered (LoopStart fired, LoopComplete pending).
    pub(crate) active_loop: Option<u32>,
    /// The active loop was just entered; the next update departs from its entry edge.
    pub(crate) entry_pending: bool,
    pub(crate) zero_side: ZeroSide,
    /// Zero-duration sequence currently being unrolled by an owning timeline.
    pub(crate) zero_running: bool,
    /// Set while a rewind or skip is dispatching through this playable.
    pub(crate) locked: bool,

    pub(crate) wall_start: f64,
    pub(crate) wall_end: f64,
}

impl PlayableCore {
    pub(crate) fn new(span: f64, loops_count: u32, loop_type: LoopType, direction: Direction) -> Self {
        let mut core = Self {
            span,
            loops_count,
            loop_type,
            direction,
            ease: Ease::Linear,
            played_time: 0.0,
            state: PlaybackState::Reset,
            started: false,
            active_loop: None,
            entry_pending: false,
            zero_side: ZeroSide::Before,
            zero_running: false,
            locked: false,
            wall_start: 0.0,
            wall_end: 0.0,
        };
        core.played_time = core.origin(direction);
        core.zero_side = match direction {
            Direction::Forward => ZeroSide::Before,
            Direction::Backward => ZeroSide::After,
        };
        core
    }

    /// Length of one loop: the span, doubled for Mirror.
    #[inline]
    pub fn loop_duration(&self) -> f64 {
        match self.loop_type {
            LoopType::Mirror => self.span * 2.0,
            LoopType::Reset | LoopType::Continue => self.span,
        }
    }

    #[inline]
    pub fn duration(&self) -> f64 {
        self.loop_duration() * self.loops_count as f64
    }

    #[inline]
    pub fn is_zero_duration(&self) -> bool {
        self.loop_duration() <= 0.0
    }

    /// Position a pass in `dir` starts from.
    #[inline]
    pub fn origin(&self, dir: Direction) -> f64 {
        match dir {
            Direction::Forward => 0.0,
            Direction::Backward => self.duration(),
        }
    }

    /// Position a pass in `dir` ends at.
    #[inline]
    pub fn terminal(&self, dir: Direction) -> f64 {
        self.origin(dir.reversed())
    }

    /// Forget all phase progress and park at `position` without firing anything.
    pub(crate) fn park(&mut self, position: f64, eps: f64) {
        let duration = self.duration();
        self.played_time = position.clamp(0.0, duration);
        self.active_loop = None;
        self.entry_pending = false;
        self.zero_running = false;
        self.started = false;
        if duration <= 0.0 {
            return;
        }
        let p = self.played_time;
        if p <= eps || p >= duration - eps {
            return;
        }
        // Inside the body: everything up to here counts as already passed.
        self.started = true;
        let l = self.loop_duration();
        let q = p / l;
        let nearest = q.round();
        if (q - nearest).abs() * l <= eps {
            // Parked exactly between two loops.
            self.played_time = nearest * l;
        } else {
            self.active_loop = Some((q.floor() as u32).min(self.loops_count - 1));
        }
    }
}
