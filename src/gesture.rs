use std::time::Duration;
use tokio::time::Instant;

/// Settings for swipe recognition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwipeSettings {
    /// Distance (in pixels) the row has to travel left to commit
    pub threshold: f32,
    /// Where the row animates to when committing (off-screen)
    pub exit_offset: f32,
    /// Time between the commit and the destructive action
    pub settle_delay: Duration,
}

impl Default for SwipeSettings {
    fn default() -> Self {
        Self {
            threshold: 100.0,
            exit_offset: -500.0,
            settle_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    Commit,
    Cancel,
}

/// How the presentation should move the row to the current offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transition {
    /// Track the pointer exactly
    None,
    /// Animate with easing
    #[default]
    Eased,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Active { origin: f32 },
    Committing { due_at: Instant },
}

/// Turns one leftward drag into a single commit or cancel. A commit becomes
/// due after the settle delay.
#[derive(Debug, Clone)]
pub struct SwipeRecognizer {
    settings: SwipeSettings,
    phase: Phase,
    offset: f32,
}

impl SwipeRecognizer {
    pub fn new(settings: SwipeSettings) -> Self {
        Self {
            settings,
            phase: Phase::Idle,
            offset: 0.0,
        }
    }

    /// Begins a gesture at `x`. Ignored unless idle.
    pub fn start(&mut self, x: f32) {
        if self.phase == Phase::Idle {
            self.phase = Phase::Active { origin: x };
            self.offset = 0.0;
        }
    }

    /// Updates the drag position. Rightward travel is clamped to zero.
    pub fn move_to(&mut self, x: f32) {
        if let Phase::Active { origin } = self.phase {
            self.offset = (x - origin).min(0.0);
        }
    }

    /// Ends the gesture. Returns `None` if no gesture was active.
    pub fn end(&mut self, now: Instant) -> Option<GestureOutcome> {
        let Phase::Active { .. } = self.phase else {
            return None;
        };

        if self.offset < -self.settings.threshold {
            self.offset = self.settings.exit_offset;
            self.phase = Phase::Committing {
                due_at: now + self.settings.settle_delay,
            };
            Some(GestureOutcome::Commit)
        } else {
            self.offset = 0.0;
            self.phase = Phase::Idle;
            Some(GestureOutcome::Cancel)
        }
    }

    /// Returns true exactly once, when a committed swipe has settled.
    /// The recognizer is idle again afterwards.
    pub fn take_settled(&mut self, now: Instant) -> bool {
        match self.phase {
            Phase::Committing { due_at } if due_at <= now => {
                self.phase = Phase::Idle;
                true
            }
            _ => false,
        }
    }

    /// Abandons any gesture, including a committed one whose action is not due yet
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.offset = 0.0;
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Active { .. })
    }

    pub fn is_committing(&self) -> bool {
        matches!(self.phase, Phase::Committing { .. })
    }

    pub fn settle_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Committing { due_at } => Some(due_at),
            _ => None,
        }
    }

    pub fn transition(&self) -> Transition {
        if self.is_active() {
            Transition::None
        } else {
            Transition::Eased
        }
    }
}

impl Default for SwipeRecognizer {
    fn default() -> Self {
        Self::new(SwipeSettings::default())
    }
}
