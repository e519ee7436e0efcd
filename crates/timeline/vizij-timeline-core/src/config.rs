//! Core configuration for vizij-timeline-core.

use serde::{Deserialize, Serialize};

use crate::error::TimelineError;
use crate::playable::{Direction, LoopType};
use crate::timeline::LoopResetBehaviour;

/// Engine-wide tuning knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tolerance used when snapping a time onto a loop boundary.
    pub time_epsilon: f64,
    /// Spacing between internal element ranks; larger gaps postpone rank rebalancing.
    pub rank_gap: u64,
    /// Loop reset behaviour given to timelines created without an explicit one.
    pub default_loop_reset: LoopResetBehaviour,
    /// `play` on a Completed playable resets it first instead of failing.
    pub auto_reset_on_play: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_epsilon: 1e-9,
            rank_gap: 1 << 16,
            default_loop_reset: LoopResetBehaviour::Rewind,
            auto_reset_on_play: true,
        }
    }
}

impl Config {
    /// Largest accepted `rank_gap`; leaves room for 2^32 elements before ranks run out.
    pub const MAX_RANK_GAP: u64 = 1 << 32;

    /// Parse a JSON config document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, TimelineError> {
        let cfg: Config = serde_json::from_str(json)?;
        if !(cfg.time_epsilon >= 0.0 && cfg.time_epsilon.is_finite()) {
            return Err(TimelineError::invalid("time_epsilon must be finite and >= 0"));
        }
        if !(2..=Self::MAX_RANK_GAP).contains(&cfg.rank_gap) {
            return Err(TimelineError::invalid("rank_gap must be in 2..=2^32"));
        }
        Ok(cfg)
    }
}

/// Construction parameters for a tween leaf.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TweenCfg {
    /// One forward traversal, in seconds.
    pub span: f64,
    pub loops_count: u32,
    pub loop_type: LoopType,
    pub direction: Direction,
}

impl Default for TweenCfg {
    fn default() -> Self {
        Self {
            span: 1.0,
            loops_count: 1,
            loop_type: LoopType::Reset,
            direction: Direction::Forward,
        }
    }
}

/// Construction parameters for a timeline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineCfg {
    pub loops_count: Option<u32>,
    pub loop_type: LoopType,
    pub direction: Direction,
    /// Falls back to [`Config::default_loop_reset`] when absent.
    pub loop_reset: Option<LoopResetBehaviour>,
}

/// Construction parameters for a callback leaf.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackCfg {
    pub loops_count: u32,
    /// Also fire when the owning timeline crosses the callback while travelling backward.
    pub fire_backward: bool,
}

impl Default for CallbackCfg {
    fn default() -> Self {
        Self {
            loops_count: 1,
            fire_backward: false,
        }
    }
}
