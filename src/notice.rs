use std::time::Duration;
use tokio::time::Instant;

/// How long a notice stays up unless told otherwise
pub const DEFAULT_DURATION: Duration = Duration::from_millis(4000);

pub type NoticeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    #[default]
    Info,
    Success,
    Error,
}

/// A button bound to a notice, e.g. "Undo"
#[derive(Debug, Clone, PartialEq)]
pub struct NoticeAction<A> {
    pub label: String,
    pub payload: A,
}

impl<A> NoticeAction<A> {
    pub fn new(label: impl Into<String>, payload: A) -> Self {
        Self {
            label: label.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NoticeOptions<A> {
    pub severity: Severity,
    pub action: Option<NoticeAction<A>>,
    pub duration: Duration,
}

impl<A> Default for NoticeOptions<A> {
    fn default() -> Self {
        Self {
            severity: Severity::Info,
            action: None,
            duration: DEFAULT_DURATION,
        }
    }
}

impl<A> NoticeOptions<A> {
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn action(mut self, action: NoticeAction<A>) -> Self {
        self.action = Some(action);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Notification<A> {
    pub id: NoticeId,
    pub message: String,
    pub severity: Severity,
    pub action: Option<NoticeAction<A>>,
    pub created_at: Instant,
    pub duration: Duration,
}

impl<A> Notification<A> {
    pub fn deadline(&self) -> Instant {
        self.created_at + self.duration
    }
}

/// Stack of live notices, oldest first. Each notice carries its own deadline;
/// the owner calls [`NoticeQueue::expire`] and sleeps until
/// [`NoticeQueue::next_deadline`].
#[derive(Debug)]
pub struct NoticeQueue<A> {
    notices: Vec<Notification<A>>,
    next_id: NoticeId,
}

impl<A> Default for NoticeQueue<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> NoticeQueue<A> {
    pub fn new() -> Self {
        Self {
            notices: Vec::new(),
            next_id: 0,
        }
    }

    /// Enqueues a notice and returns its id
    pub fn show(
        &mut self,
        message: impl Into<String>,
        options: NoticeOptions<A>,
        now: Instant,
    ) -> NoticeId {
        let id = self.next_id;
        self.next_id += 1;

        self.notices.push(Notification {
            id,
            message: message.into(),
            severity: options.severity,
            action: options.action,
            created_at: now,
            duration: options.duration,
        });
        id
    }

    /// Removes a notice. Returns false if it was already gone.
    pub fn dismiss(&mut self, id: NoticeId) -> bool {
        let before = self.notices.len();
        self.notices.retain(|n| n.id != id);
        self.notices.len() != before
    }

    /// Runs `handler` with the notice's bound action, then dismisses the notice.
    ///
    /// The action is taken out of the notice before the handler runs, so a
    /// second invocation for the same id finds nothing and returns `None`.
    pub fn invoke_action<R>(&mut self, id: NoticeId, handler: impl FnOnce(A) -> R) -> Option<R> {
        let action = self
            .notices
            .iter_mut()
            .find(|n| n.id == id)
            .and_then(|n| n.action.take())?;

        let result = handler(action.payload);
        self.dismiss(id);
        Some(result)
    }

    /// Removes and returns every notice whose lifetime has elapsed at `now`
    pub fn expire(&mut self, now: Instant) -> Vec<Notification<A>> {
        let (expired, live): (Vec<_>, Vec<_>) = self
            .notices
            .drain(..)
            .partition(|n| n.deadline() <= now);
        self.notices = live;
        expired
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.notices.iter().map(Notification::deadline).min()
    }

    pub fn notices(&self) -> &[Notification<A>] {
        &self.notices
    }

    pub fn get(&self, id: NoticeId) -> Option<&Notification<A>> {
        self.notices.iter().find(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.notices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}
