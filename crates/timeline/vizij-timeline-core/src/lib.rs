//! Vizij Timeline Core (engine-agnostic)
//!
//! A playable state machine and a chronoline-indexed timeline scheduler.
//! Playables (tweens, callbacks, intervals and nested timelines) live in an
//! [`Engine`] arena and are driven by `rewind_to` / `skip_to` or by the
//! `play` / `tick` playback helpers. Rewinding a timeline replays, in order,
//! exactly the lifecycle events each child would emit if it were stepped
//! frame by frame, in time proportional to the events crossed.

pub mod config;
pub mod ease;
pub mod engine;
pub mod error;
pub mod events;
pub mod ids;
pub mod leaf;
pub mod playable;
mod playback;
pub mod repeat;
mod state_machine;
pub mod time;
pub mod timeline;

// Re-exports for consumers (drivers and adapters)
pub use config::{CallbackCfg, Config, TimelineCfg, TweenCfg};
pub use ease::Ease;
pub use engine::{Engine, PlayableKind};
pub use error::TimelineError;
pub use events::{EventKind, PhaseEvent, PlayableEvent, RoutineEvent, Stage};
pub use ids::{ObserverId, PlayableId};
pub use leaf::{Sample, ValueApplier};
pub use playable::{Direction, LoopContext, LoopType, PlaybackState, ZeroSide};
pub use repeat::Repeater;
pub use timeline::{ElementInfo, IndexSnapshot, LoopResetBehaviour};

pub type Result<T> = core::result::Result<T, TimelineError>;
