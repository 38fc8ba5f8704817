use std::time::{Duration, SystemTime};

use thiserror::Error;

/// High-level phases a match goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Created, clock not started; sequences are read-only.
    Pending,
    /// Clock running; sequences accept appends and undos.
    Ongoing {
        /// Wall-clock instant the countdown started.
        started_at: SystemTime,
    },
    /// Terminal, read-only.
    Completed {
        /// Start instant, when the match was ever started.
        started_at: Option<SystemTime>,
    },
}

impl MatchPhase {
    /// Start instant of the match clock, if any.
    pub fn started_at(&self) -> Option<SystemTime> {
        match self {
            MatchPhase::Pending => None,
            MatchPhase::Ongoing { started_at } => Some(*started_at),
            MatchPhase::Completed { started_at } => *started_at,
        }
    }
}

/// Events that can be applied to the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    /// Start the countdown at the given instant.
    Start {
        /// Server clock at the time the start request was applied.
        at: SystemTime,
    },
    /// Freeze the match.
    Complete {
        /// Server clock at the time the request was applied.
        at: SystemTime,
        /// Explicit confirmation allowing completion before the deadline.
        confirmed: bool,
    },
}

/// Reasons a lifecycle event was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The match clock is already running or has run; the start is ignored.
    #[error("match already started")]
    AlreadyStarted,
    /// Completion requested before the deadline without confirmation.
    #[error("countdown still running ({remaining_secs}s left); confirmation required")]
    CountdownRunning {
        /// Seconds remaining on the countdown.
        remaining_secs: u64,
    },
    /// The event is not valid from the current phase.
    #[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
    InvalidTransition {
        /// Phase at the time of the request.
        from: MatchPhase,
        /// Rejected event.
        event: MatchEvent,
    },
    /// A sequence mutation was attempted outside of the ongoing phase.
    #[error("sequences are read-only while the match is {0}")]
    ReadOnly(&'static str),
}

/// Lifecycle state machine: `Pending -> Ongoing -> Completed`.
#[derive(Debug, Clone)]
pub struct MatchLifecycle {
    phase: MatchPhase,
    duration: Duration,
    version: usize,
}

impl MatchLifecycle {
    /// Create a lifecycle for a match of the given duration in minutes.
    pub fn new(duration_minutes: u32) -> Self {
        Self::restore(MatchPhase::Pending, duration_minutes)
    }

    /// Rebuild a lifecycle from persisted data.
    pub fn restore(phase: MatchPhase, duration_minutes: u32) -> Self {
        Self {
            phase,
            duration: Duration::from_secs(u64::from(duration_minutes) * 60),
            version: 0,
        }
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Number of transitions applied since creation or restore.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Countdown deadline (`start + duration`).
    pub fn deadline(&self) -> Option<SystemTime> {
        self.phase.started_at().map(|start| start + self.duration)
    }

    /// Time left on the countdown, recomputed from the wall clock. `None`
    /// before the clock starts.
    pub fn remaining(&self, now: SystemTime) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.duration_since(now).unwrap_or(Duration::ZERO))
    }

    /// Whether the match is ongoing with time left on the countdown.
    pub fn countdown_running(&self, now: SystemTime) -> bool {
        matches!(self.phase, MatchPhase::Ongoing { .. })
            && self.remaining(now).is_some_and(|left| !left.is_zero())
    }

    /// Whether appends, undos and replacements are allowed.
    pub fn ensure_accepts_mutations(&self) -> Result<(), LifecycleError> {
        match self.phase {
            MatchPhase::Ongoing { .. } => Ok(()),
            MatchPhase::Pending => Err(LifecycleError::ReadOnly("pending")),
            MatchPhase::Completed { .. } => Err(LifecycleError::ReadOnly("completed")),
        }
    }

    /// Apply an event, returning the new phase.
    pub fn apply(&mut self, event: MatchEvent) -> Result<MatchPhase, LifecycleError> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(next)
    }

    fn compute_transition(&self, event: MatchEvent) -> Result<MatchPhase, LifecycleError> {
        let next = match (self.phase, event) {
            (MatchPhase::Pending, MatchEvent::Start { at }) => MatchPhase::Ongoing { started_at: at },
            (MatchPhase::Ongoing { .. }, MatchEvent::Start { .. }) => {
                return Err(LifecycleError::AlreadyStarted);
            }
            (MatchPhase::Ongoing { started_at }, MatchEvent::Complete { at, confirmed }) => {
                let remaining = self.remaining(at).unwrap_or(Duration::ZERO);
                if !remaining.is_zero() && !confirmed {
                    return Err(LifecycleError::CountdownRunning {
                        remaining_secs: remaining.as_secs(),
                    });
                }
                MatchPhase::Completed {
                    started_at: Some(started_at),
                }
            }
            (from, event) => return Err(LifecycleError::InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn initial_state_is_pending() {
        let lifecycle = MatchLifecycle::new(10);
        assert_eq!(lifecycle.phase(), MatchPhase::Pending);
        assert_eq!(lifecycle.deadline(), None);
        assert!(lifecycle.ensure_accepts_mutations().is_err());
    }

    #[test]
    fn full_happy_path_after_deadline() {
        let mut lifecycle = MatchLifecycle::new(1);
        assert_eq!(
            lifecycle.apply(MatchEvent::Start { at: at(100) }),
            Ok(MatchPhase::Ongoing { started_at: at(100) })
        );
        assert!(lifecycle.ensure_accepts_mutations().is_ok());
        assert_eq!(lifecycle.deadline(), Some(at(160)));

        assert_eq!(
            lifecycle.apply(MatchEvent::Complete {
                at: at(161),
                confirmed: false,
            }),
            Ok(MatchPhase::Completed {
                started_at: Some(at(100))
            })
        );
        assert_eq!(lifecycle.version(), 2);
        assert_eq!(
            lifecycle.ensure_accepts_mutations(),
            Err(LifecycleError::ReadOnly("completed"))
        );
    }

    #[test]
    fn countdown_runs_only_until_the_deadline() {
        let mut lifecycle = MatchLifecycle::new(1);
        assert!(!lifecycle.countdown_running(at(0)));

        lifecycle.apply(MatchEvent::Start { at: at(100) }).unwrap();
        assert!(lifecycle.countdown_running(at(159)));
        assert!(!lifecycle.countdown_running(at(160)));
        assert!(!lifecycle.countdown_running(at(4000)));

        lifecycle
            .apply(MatchEvent::Complete {
                at: at(120),
                confirmed: true,
            })
            .unwrap();
        assert!(!lifecycle.countdown_running(at(130)));
    }

    #[test]
    fn double_start_keeps_the_original_clock() {
        let mut lifecycle = MatchLifecycle::new(5);
        lifecycle.apply(MatchEvent::Start { at: at(10) }).unwrap();

        let err = lifecycle.apply(MatchEvent::Start { at: at(50) }).unwrap_err();
        assert_eq!(err, LifecycleError::AlreadyStarted);
        assert_eq!(lifecycle.phase().started_at(), Some(at(10)));
        assert_eq!(lifecycle.version(), 1);
    }

    #[test]
    fn early_completion_requires_confirmation() {
        let mut lifecycle = MatchLifecycle::new(2);
        lifecycle.apply(MatchEvent::Start { at: at(0) }).unwrap();

        let err = lifecycle
            .apply(MatchEvent::Complete {
                at: at(30),
                confirmed: false,
            })
            .unwrap_err();
        assert_eq!(err, LifecycleError::CountdownRunning { remaining_secs: 90 });

        assert!(
            lifecycle
                .apply(MatchEvent::Complete {
                    at: at(30),
                    confirmed: true,
                })
                .is_ok()
        );
    }

    #[test]
    fn completed_is_terminal() {
        let mut lifecycle = MatchLifecycle::restore(
            MatchPhase::Completed {
                started_at: Some(at(0)),
            },
            1,
        );
        for event in [
            MatchEvent::Start { at: at(500) },
            MatchEvent::Complete {
                at: at(500),
                confirmed: true,
            },
        ] {
            assert!(matches!(
                lifecycle.apply(event),
                Err(LifecycleError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn pending_cannot_complete() {
        let mut lifecycle = MatchLifecycle::new(1);
        let err = lifecycle
            .apply(MatchEvent::Complete {
                at: at(0),
                confirmed: true,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: MatchPhase::Pending,
                ..
            }
        ));
    }

    #[test]
    fn remaining_is_recomputed_from_the_wall_clock() {
        let mut lifecycle = MatchLifecycle::new(1);
        lifecycle.apply(MatchEvent::Start { at: at(0) }).unwrap();
        assert_eq!(lifecycle.remaining(at(15)), Some(Duration::from_secs(45)));
        assert_eq!(lifecycle.remaining(at(600)), Some(Duration::ZERO));
    }
}
