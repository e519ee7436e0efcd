//! Notification contract: phase and routine events plus ordered observer lists.

use serde::{Deserialize, Serialize};

use crate::ids::{ObserverId, PlayableId};
use crate::playable::Direction;

/// Canonical lifecycle signals fired while a playable is rewound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseEvent {
    Start,
    LoopStart,
    LoopUpdate,
    LoopComplete,
    Complete,
}

/// Which side of the mutate step a phase notification is fired on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// The `...ing` notification, before the value mutation.
    Before,
    /// The `...ed` notification, after the value mutation.
    After,
}

/// Playback state transitions of a driven playable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutineEvent {
    Reset,
    Play,
    Pause,
    Complete,
}

/// Anything an observer can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Phase(PhaseEvent, Stage),
    Routine(RoutineEvent),
}

impl EventKind {
    pub const fn before(phase: PhaseEvent) -> Self {
        Self::Phase(phase, Stage::Before)
    }

    pub const fn after(phase: PhaseEvent) -> Self {
        Self::Phase(phase, Stage::After)
    }

    /// Get the name of this event kind
    pub fn name(&self) -> &'static str {
        match self {
            Self::Phase(PhaseEvent::Start, Stage::Before) => "starting",
            Self::Phase(PhaseEvent::Start, Stage::After) => "started",
            Self::Phase(PhaseEvent::LoopStart, Stage::Before) => "loop_starting",
            Self::Phase(PhaseEvent::LoopStart, Stage::After) => "loop_started",
            Self::Phase(PhaseEvent::LoopUpdate, Stage::Before) => "updating",
            Self::Phase(PhaseEvent::LoopUpdate, Stage::After) => "updated",
            Self::Phase(PhaseEvent::LoopComplete, Stage::Before) => "loop_completing",
            Self::Phase(PhaseEvent::LoopComplete, Stage::After) => "loop_completed",
            Self::Phase(PhaseEvent::Complete, Stage::Before) => "completing",
            Self::Phase(PhaseEvent::Complete, Stage::After) => "completed",
            Self::Routine(RoutineEvent::Reset) => "reset",
            Self::Routine(RoutineEvent::Play) => "play",
            Self::Routine(RoutineEvent::Pause) => "pause",
            Self::Routine(RoutineEvent::Complete) => "complete",
        }
    }
}

/// Payload delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayableEvent {
    pub playable: PlayableId,
    pub kind: EventKind,
    /// Travel direction of the rewind that produced the event.
    pub direction: Direction,
    /// Loop the event belongs to, for loop-scoped phases.
    pub loop_index: Option<u32>,
    /// Position inside the loop, for updates.
    pub looped_time: Option<f64>,
    pub continue_index: u64,
    pub continue_count: u64,
}

pub type ObserverFn = Box<dyn FnMut(&PlayableEvent)>;

/// Ordered observer list of one playable, across every event kind.
#[derive(Default)]
pub struct Observers {
    entries: Vec<(ObserverId, EventKind, ObserverFn)>,
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl Observers {
    pub fn push(&mut self, id: ObserverId, kind: EventKind, handler: ObserverFn) {
        self.entries.push((id, kind, handler));
    }

    /// Remove an observer; returns false when it was not registered here.
    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(oid, _, _)| *oid != id);
        before != self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invoke every observer registered for `event.kind`, in registration order.
    pub fn notify(&mut self, event: &PlayableEvent) {
        for (_, kind, handler) in self.entries.iter_mut() {
            if *kind == event.kind {
                handler(event);
            }
        }
    }
}
