//! Playback state transitions and the wall-clock markers a driver ticks against.

use tracing::debug;

use crate::engine::Engine;
use crate::error::TimelineError;
use crate::events::{EventKind, PlayableEvent, RoutineEvent};
use crate::ids::PlayableId;
use crate::playable::{Direction, PlaybackState, ZeroSide};
use crate::Result;

impl Engine {
    fn notify_routine(&mut self, id: PlayableId, event: RoutineEvent) -> Result<()> {
        let node = self.node_mut(id)?;
        let payload = PlayableEvent {
            playable: id,
            kind: EventKind::Routine(event),
            direction: node.core.direction,
            loop_index: None,
            looped_time: None,
            continue_index: 0,
            continue_count: 1,
        };
        node.observers.notify(&payload);
        Ok(())
    }

    fn set_state(&mut self, id: PlayableId, state: PlaybackState) -> Result<()> {
        let core = self.core_mut(id)?;
        debug!(?id, from = core.state.name(), to = state.name(), "playback: state change");
        core.state = state;
        Ok(())
    }

    /// Start or resume playback at wall-clock `now`.
    ///
    /// A Completed playable is reset first when the engine config allows it.
    pub fn play(&mut self, id: PlayableId, now: f64) -> Result<()> {
        let allow = self.cfg.auto_reset_on_play;
        self.play_with_reset(id, now, allow)
    }

    /// [`Engine::play`] with an explicit permission to reset a Completed playable.
    pub fn play_with_reset(&mut self, id: PlayableId, now: f64, allow_reset: bool) -> Result<()> {
        self.ensure_top_level(id)?;
        if !now.is_finite() {
            return Err(TimelineError::invalid("play time must be finite"));
        }
        match self.core(id)?.state {
            PlaybackState::Playing => return Ok(()),
            PlaybackState::Completed if !allow_reset => {
                return Err(TimelineError::IllegalStateTransition {
                    from: PlaybackState::Completed.name().into(),
                    to: PlaybackState::Playing.name().into(),
                })
            }
            PlaybackState::Completed => self.reset(id)?,
            PlaybackState::Reset | PlaybackState::Paused => {}
        }
        let core = self.core_mut(id)?;
        let duration = core.duration();
        let elapsed = match core.direction {
            Direction::Forward => core.played_time,
            Direction::Backward => duration - core.played_time,
        };
        core.wall_start = now - elapsed;
        core.wall_end = core.wall_start + duration;
        self.set_state(id, PlaybackState::Playing)?;
        self.notify_routine(id, RoutineEvent::Play)
    }

    /// Pause a Playing playable; any other state is left untouched.
    pub fn pause(&mut self, id: PlayableId) -> Result<()> {
        self.ensure_top_level(id)?;
        if self.core(id)?.state != PlaybackState::Playing {
            return Ok(());
        }
        self.set_state(id, PlaybackState::Paused)?;
        self.notify_routine(id, RoutineEvent::Pause)
    }

    /// Silently rewind to the play-direction origin and enter Reset.
    pub fn reset(&mut self, id: PlayableId) -> Result<()> {
        self.ensure_top_level(id)?;
        let core = self.core(id)?;
        let origin = match (core.is_zero_duration(), core.direction) {
            (true, Direction::Forward) => 0.0,
            (true, Direction::Backward) => 1.0,
            (false, dir) => core.origin(dir),
        };
        self.rewind_to(id, origin, false)?;
        self.set_state(id, PlaybackState::Reset)?;
        self.notify_routine(id, RoutineEvent::Reset)
    }

    /// Played position implied by wall-clock `now` while Playing.
    pub fn position_at(&self, id: PlayableId, now: f64) -> Result<f64> {
        let core = self.core(id)?;
        if core.state != PlaybackState::Playing {
            return Ok(core.played_time);
        }
        let duration = core.duration();
        let elapsed = (now - core.wall_start).clamp(0.0, duration);
        Ok(match core.direction {
            Direction::Forward => elapsed,
            Direction::Backward => duration - elapsed,
        })
    }

    /// Advance a Playing playable to wall-clock `now`, completing it at its terminal edge.
    pub fn tick(&mut self, id: PlayableId, now: f64) -> Result<()> {
        self.ensure_top_level(id)?;
        let core = self.core(id)?;
        if core.state != PlaybackState::Playing {
            return Ok(());
        }
        let dir = core.direction;
        let done = if core.is_zero_duration() {
            let side = ZeroSide::terminal(dir);
            let target = match side {
                ZeroSide::After => 1.0,
                ZeroSide::Before => 0.0,
            };
            self.rewind_to(id, target, true)?;
            true
        } else {
            let pos = self.position_at(id, now)?;
            self.rewind_to(id, pos, true)?;
            now >= self.core(id)?.wall_end
        };
        if done {
            self.set_state(id, PlaybackState::Completed)?;
            self.notify_routine(id, RoutineEvent::Complete)?;
        }
        Ok(())
    }
}
