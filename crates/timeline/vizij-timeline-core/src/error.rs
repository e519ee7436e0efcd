//! Error types for the timeline scheduler

use serde::{Deserialize, Serialize};

/// Errors surfaced by [`crate::Engine`] operations.
///
/// All errors are synchronous and fail-fast: a mutating call that returns an
/// error has not altered any visible state.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TimelineError {
    /// Argument rejected before any state was touched
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Handle does not (or no longer) refer to a live playable
    #[error("Playable not found: {playable}")]
    PlayableNotFound { playable: String },

    /// A rewind or skip was attempted on a playable that is already dispatching
    #[error("Reentrant dispatch into locked playable {playable}")]
    ReentrancyViolation { playable: String },

    /// Requested state change is not allowed from the current state
    #[error("Illegal state transition: {from} -> {to}")]
    IllegalStateTransition { from: String, to: String },
}

impl TimelineError {
    /// Shorthand for [`TimelineError::InvalidArgument`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Check if this is a recoverable error
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ReentrancyViolation { .. })
    }

    /// Get error category for logging
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } | Self::PlayableNotFound { .. } => "argument",
            Self::ReentrancyViolation { .. } => "reentrancy",
            Self::IllegalStateTransition { .. } => "state",
        }
    }
}

impl From<serde_json::Error> for TimelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArgument {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(TimelineError::invalid("x").category(), "argument");
        let not_found = TimelineError::PlayableNotFound {
            playable: "p".into(),
        };
        assert_eq!(not_found.category(), "argument");
        let locked = TimelineError::ReentrancyViolation {
            playable: "p".into(),
        };
        assert_eq!(locked.category(), "reentrancy");
        assert!(!locked.is_recoverable());
        let state = TimelineError::IllegalStateTransition {
            from: "completed".into(),
            to: "playing".into(),
        };
        assert_eq!(state.category(), "state");
        assert!(state.is_recoverable());
    }

    #[test]
    fn test_serialization() {
        let error = TimelineError::invalid("loops_count must be >= 1");
        let serialized = serde_json::to_string(&error).unwrap();
        let deserialized: TimelineError = serde_json::from_str(&serialized).unwrap();
        assert_eq!(error, deserialized);
    }
}
