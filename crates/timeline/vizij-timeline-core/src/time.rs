//! Time keys and loop arithmetic shared by the state machine and the timeline index.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::playable::Direction;

/// Totally ordered instant, usable as a `BTreeMap` key.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimeKey(pub f64);

impl PartialEq for TimeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimeKey {}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Snap `value` onto `target` when they are closer than `eps`.
#[inline]
pub fn snap(value: f64, target: f64, eps: f64) -> f64 {
    if (value - target).abs() <= eps {
        target
    } else {
        value
    }
}

/// Loop entered when leaving position `p` in direction `dir`.
///
/// A position sitting exactly on a boundary belongs to the loop that lies
/// ahead of it in the travel direction.
pub fn entry_loop(p: f64, loop_duration: f64, loops_count: u32, dir: Direction, eps: f64) -> u32 {
    let last = loops_count.saturating_sub(1);
    if loop_duration <= 0.0 {
        return match dir {
            Direction::Forward => 0,
            Direction::Backward => last,
        };
    }
    let q = p / loop_duration;
    let idx = match dir {
        Direction::Forward => (q + eps).floor(),
        Direction::Backward => (q - eps).ceil() - 1.0,
    };
    if idx <= 0.0 {
        0
    } else {
        (idx as u32).min(last)
    }
}

/// Far edge of loop `k` in the travel direction, in playable time.
#[inline]
pub fn loop_exit(k: u32, loop_duration: f64, dir: Direction) -> f64 {
    match dir {
        Direction::Forward => (k as f64 + 1.0) * loop_duration,
        Direction::Backward => k as f64 * loop_duration,
    }
}

/// Near edge of loop `k` in the travel direction, in playable time.
#[inline]
pub fn loop_entry(k: u32, loop_duration: f64, dir: Direction) -> f64 {
    loop_exit(k, loop_duration, dir.reversed())
}

/// Is `t` at or past `edge` when travelling in `dir`?
#[inline]
pub fn reached(t: f64, edge: f64, dir: Direction) -> bool {
    match dir {
        Direction::Forward => t >= edge,
        Direction::Backward => t <= edge,
    }
}

/// Is `t` strictly past `edge` when travelling in `dir`?
#[inline]
pub fn beyond(t: f64, edge: f64, dir: Direction) -> bool {
    match dir {
        Direction::Forward => t > edge,
        Direction::Backward => t < edge,
    }
}
