//! Subscription-counted tick scheduling
//!
//! ```text
//!            subscribe                      unsubscribe (last)
//!  Stopped ─────────────▶ Running{n} ───────────────────────▶ Draining{gen}
//!     ▲                     ▲    │ subscribe / unsubscribe (n>1)   │   │
//!     │                     │    └──────────────┘                  │   │
//!     │                     └──────── subscribe ───────────────────┘   │
//!     └──────────────────────── grace elapsed (gen matches) ───────────┘
//! ```
//!
//! The scheduler only decides; the caller performs the returned
//! [`TickAction`]. A grace timer carries the generation it was armed with,
//! so a timer from an earlier drain cannot stop a loop that has since
//! regained subscribers.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running { subscribers: usize },
    /// No subscribers; the loop keeps running until the grace timer fires
    Draining { generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    StartLoop,
    ArmGraceTimer(u64),
    StopLoop,
    None,
}

#[derive(Debug)]
pub struct TickScheduler {
    state: SchedulerState,
    generation: u64,
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TickScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Stopped,
            generation: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn subscribers(&self) -> usize {
        match self.state {
            SchedulerState::Running { subscribers } => subscribers,
            _ => 0,
        }
    }

    /// Whether the tick loop should currently exist.
    pub fn is_looping(&self) -> bool {
        !matches!(self.state, SchedulerState::Stopped)
    }

    pub fn on_subscribe(&mut self) -> TickAction {
        match self.state {
            SchedulerState::Stopped => {
                self.state = SchedulerState::Running { subscribers: 1 };
                TickAction::StartLoop
            }
            SchedulerState::Running { subscribers } => {
                self.state = SchedulerState::Running {
                    subscribers: subscribers + 1,
                };
                TickAction::None
            }
            SchedulerState::Draining { .. } => {
                // Loop is still alive; the pending grace timer goes stale
                self.generation += 1;
                self.state = SchedulerState::Running { subscribers: 1 };
                TickAction::None
            }
        }
    }

    pub fn on_unsubscribe(&mut self) -> TickAction {
        match self.state {
            SchedulerState::Running { subscribers } if subscribers > 1 => {
                self.state = SchedulerState::Running {
                    subscribers: subscribers - 1,
                };
                TickAction::None
            }
            SchedulerState::Running { .. } => {
                self.generation += 1;
                self.state = SchedulerState::Draining {
                    generation: self.generation,
                };
                TickAction::ArmGraceTimer(self.generation)
            }
            SchedulerState::Stopped | SchedulerState::Draining { .. } => TickAction::None,
        }
    }

    pub fn on_grace_elapsed(&mut self, generation: u64) -> TickAction {
        match self.state {
            SchedulerState::Draining { generation: current } if current == generation => {
                self.state = SchedulerState::Stopped;
                TickAction::StopLoop
            }
            _ => TickAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_subscriber_starts_loop() {
        let mut s = TickScheduler::new();
        assert_eq!(s.on_subscribe(), TickAction::StartLoop);
        assert_eq!(s.on_subscribe(), TickAction::None);
        assert_eq!(s.subscribers(), 2);
    }

    #[test]
    fn test_last_unsubscribe_drains_then_stops() {
        let mut s = TickScheduler::new();
        s.on_subscribe();
        s.on_subscribe();
        assert_eq!(s.on_unsubscribe(), TickAction::None);

        let TickAction::ArmGraceTimer(generation) = s.on_unsubscribe() else {
            panic!("expected grace timer");
        };
        assert!(s.is_looping());
        assert_eq!(s.on_grace_elapsed(generation), TickAction::StopLoop);
        assert_eq!(s.state(), SchedulerState::Stopped);
    }

    #[test]
    fn test_reconnect_during_grace_keeps_loop() {
        let mut s = TickScheduler::new();
        s.on_subscribe();
        let TickAction::ArmGraceTimer(stale) = s.on_unsubscribe() else {
            panic!("expected grace timer");
        };

        // Quick reconnect: no restart needed, and the old timer is ignored
        assert_eq!(s.on_subscribe(), TickAction::None);
        assert_eq!(s.on_grace_elapsed(stale), TickAction::None);
        assert_eq!(s.state(), SchedulerState::Running { subscribers: 1 });

        let TickAction::ArmGraceTimer(fresh) = s.on_unsubscribe() else {
            panic!("expected grace timer");
        };
        assert_ne!(fresh, stale);
        assert_eq!(s.on_grace_elapsed(fresh), TickAction::StopLoop);
    }

    #[test]
    fn test_spurious_events_are_ignored() {
        let mut s = TickScheduler::new();
        assert_eq!(s.on_unsubscribe(), TickAction::None);
        assert_eq!(s.on_grace_elapsed(0), TickAction::None);
        assert_eq!(s.state(), SchedulerState::Stopped);
    }
}
