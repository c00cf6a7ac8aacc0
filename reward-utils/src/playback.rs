use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    NotStarted,
    Playing,
    Paused,
    Ended,
}

/// Callbacks reported by the media element
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PlaybackEvent {
    Play,
    Pause,
    /// Current position and reported duration, in seconds
    TimeUpdate { position: f64, duration: f64 },
    MediaEnded,
    LoadError(String),
}

/// Keeps the question phase locked until the video has played to the end.
///
/// Position is tracked for display only. Seeking back and replaying is not prevented.
#[derive(Clone, Debug)]
pub struct PlaybackGate {
    state: PlaybackState,
    position: f64,
    duration: Option<f64>,
    bypassed: bool,
}

impl Default for PlaybackGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackGate {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::NotStarted,
            position: 0.0,
            duration: None,
            bypassed: false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Questions may only be shown once playback has ended
    pub fn is_unlocked(&self) -> bool {
        self.state == PlaybackState::Ended
    }

    /// True if the gate was opened by a media load error rather than by playback
    pub fn bypassed(&self) -> bool {
        self.bypassed
    }

    /// Applies a media event. On an invalid transition the state is left unchanged.
    pub fn handle(&mut self, event: PlaybackEvent) -> Result<PlaybackState, Error> {
        use PlaybackState::*;

        let next = match (self.state, &event) {
            (Ended, _) => {
                return Err(Error::InvalidTransition(format!(
                    "playback already ended, ignoring {event:?}"
                )));
            }
            (_, PlaybackEvent::LoadError(reason)) => {
                warn!(%reason, "media failed to load, unlocking questions");
                self.bypassed = true;
                Ended
            }
            (NotStarted | Paused, PlaybackEvent::Play) => Playing,
            (Playing, PlaybackEvent::Pause) => Paused,
            (Playing | Paused, PlaybackEvent::TimeUpdate { position, duration }) => {
                self.position = position.max(0.0);
                if *duration > 0.0 {
                    self.duration = Some(*duration);
                }
                match self.duration {
                    Some(duration) if self.position >= duration => Ended,
                    _ => self.state,
                }
            }
            (Playing, PlaybackEvent::MediaEnded) => {
                if let Some(duration) = self.duration {
                    self.position = duration;
                }
                Ended
            }
            (state, event) => {
                return Err(Error::InvalidTransition(format!(
                    "{event:?} is not valid while {state:?}"
                )));
            }
        };

        if next != self.state {
            debug!(from = ?self.state, to = ?next, "playback transition");
        }
        self.state = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(position: f64, duration: f64) -> PlaybackEvent {
        PlaybackEvent::TimeUpdate { position, duration }
    }

    #[test]
    fn ends_only_when_position_reaches_duration() {
        let mut gate = PlaybackGate::new();
        assert_eq!(gate.handle(PlaybackEvent::Play), Ok(PlaybackState::Playing));
        assert_eq!(gate.handle(time(10.0, 30.0)), Ok(PlaybackState::Playing));
        assert!(!gate.is_unlocked());
        assert_eq!(gate.handle(PlaybackEvent::Pause), Ok(PlaybackState::Paused));
        assert_eq!(gate.handle(PlaybackEvent::Play), Ok(PlaybackState::Playing));
        assert_eq!(gate.handle(time(30.0, 30.0)), Ok(PlaybackState::Ended));
        assert!(gate.is_unlocked());
        assert!(!gate.bypassed());
    }

    #[test]
    fn unknown_duration_never_ends_on_time_update() {
        let mut gate = PlaybackGate::new();
        gate.handle(PlaybackEvent::Play).unwrap();
        assert_eq!(gate.handle(time(500.0, 0.0)), Ok(PlaybackState::Playing));
        assert_eq!(gate.handle(PlaybackEvent::MediaEnded), Ok(PlaybackState::Ended));
    }

    #[test]
    fn load_error_passes_through() {
        let mut gate = PlaybackGate::new();
        assert_eq!(
            gate.handle(PlaybackEvent::LoadError("404".into())),
            Ok(PlaybackState::Ended)
        );
        assert!(gate.is_unlocked());
        assert!(gate.bypassed());
    }

    #[test]
    fn invalid_transitions_leave_state_unchanged() {
        let mut gate = PlaybackGate::new();
        assert!(gate.handle(PlaybackEvent::Pause).is_err());
        assert!(gate.handle(PlaybackEvent::MediaEnded).is_err());
        assert!(gate.handle(time(5.0, 5.0)).is_err());
        assert_eq!(gate.state(), PlaybackState::NotStarted);

        gate.handle(PlaybackEvent::Play).unwrap();
        gate.handle(PlaybackEvent::MediaEnded).unwrap();
        assert!(gate.handle(PlaybackEvent::Play).is_err());
        assert_eq!(gate.state(), PlaybackState::Ended);
    }
}
