use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::compose::Draft;
use crate::email::Folder;
use crate::engine::{Engine, EngineSettings, EngineSnapshot, ViewParams};
use crate::gesture::{GestureOutcome, SwipeRecognizer, SwipeSettings, Transition};
use crate::mail_service::MailService;
use crate::notice::NoticeId;
use crate::worker::{self, MailResponse};

/// Pointer input for one row
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SwipeEvent {
    Start(f32),
    Move(f32),
    End,
}

/// Everything the host can ask for
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    SetFolder(Folder),
    /// Search box input; becomes a query change once typing pauses
    SearchInput(String),
    /// Query change that skips the debounce
    SetQuery(String),
    SetPage(u32),
    NextPage,
    PrevPage,
    Refresh,
    Sync(Option<u32>),
    ToggleStar(String),
    Star(String),
    Unstar(String),
    Trash(String),
    Undo(NoticeId),
    DismissNotice(NoticeId),
    CompleteAction(String),
    AddToCalendar(String),
    Compose(Draft),
    Reply(String),
    EditDraft(Draft),
    Send,
    CloseCompose,
    Swipe { email_id: String, event: SwipeEvent },
    Shutdown,
}

/// Swipe state of one row, for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct SwipeView {
    pub email_id: String,
    pub offset: f32,
    pub transition: Transition,
    pub committing: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub engine: EngineSnapshot,
    pub swipes: Vec<SwipeView>,
    /// Search text typed but not applied yet
    pub pending_search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub engine: EngineSettings,
    pub swipe: SwipeSettings,
    pub search_debounce: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            swipe: SwipeSettings::default(),
            search_debounce: Duration::from_millis(500),
        }
    }
}

struct PendingSearch {
    query: String,
    due_at: Instant,
}

/// Drives the engine on a single task: intents from the host, one spawned task
/// per engine request, timers for notice expiry, swipe settle and search
/// debounce, and a snapshot published after every step.
pub struct Session<S> {
    engine: Engine,
    service: Arc<S>,
    user_id: String,
    settings: SessionSettings,
    swipes: HashMap<String, SwipeRecognizer>,
    search: Option<PendingSearch>,
    response_tx: mpsc::UnboundedSender<MailResponse>,
    response_rx: mpsc::UnboundedReceiver<MailResponse>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl<S: MailService + 'static> Session<S> {
    pub fn new(
        service: Arc<S>,
        user_id: impl Into<String>,
        settings: SessionSettings,
    ) -> (Self, watch::Receiver<SessionSnapshot>) {
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());

        let session = Self {
            engine: Engine::new(settings.engine),
            service,
            user_id: user_id.into(),
            settings,
            swipes: HashMap::new(),
            search: None,
            response_tx,
            response_rx,
            snapshot_tx,
        };
        (session, snapshot_rx)
    }

    /// Runs until `Shutdown` or until every intent sender is gone
    pub async fn run(mut self, mut intents: mpsc::Receiver<Intent>) {
        info!(user_id = %self.user_id, "session started");
        self.engine.mount();

        loop {
            self.dispatch();
            self.publish();

            let deadline = self.next_deadline();
            tokio::select! {
                intent = intents.recv() => {
                    let Some(intent) = intent else { break };
                    if !self.apply(intent, Instant::now()) {
                        break;
                    }
                }
                Some(response) = self.response_rx.recv() => {
                    let before = self.engine.view().clone();
                    self.engine.handle_response(response, Instant::now());
                    self.after_step(&before);
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.fire_timers(Instant::now());
                }
            }
        }

        info!("session stopped");
    }

    /// Spawns a task for every request the engine queued
    fn dispatch(&mut self) {
        for request in self.engine.take_requests() {
            let service = Arc::clone(&self.service);
            let user_id = self.user_id.clone();
            let response_tx = self.response_tx.clone();

            tokio::spawn(async move {
                let response = worker::execute(service.as_ref(), &user_id, request).await;
                let _ = response_tx.send(response);
            });
        }
    }

    /// Returns false when the host asked to stop
    fn apply(&mut self, intent: Intent, now: Instant) -> bool {
        debug!(?intent, "intent");
        let before = self.engine.view().clone();

        match intent {
            Intent::SetFolder(folder) => {
                self.search = None;
                self.engine.set_folder(folder);
            }
            Intent::SearchInput(query) => {
                self.search = Some(PendingSearch {
                    query,
                    due_at: now + self.settings.search_debounce,
                });
            }
            Intent::SetQuery(query) => {
                self.search = None;
                self.engine.set_query(&query);
            }
            Intent::SetPage(page) => self.engine.set_page(page),
            Intent::NextPage => {
                self.engine.next_page();
            }
            Intent::PrevPage => {
                self.engine.prev_page();
            }
            Intent::Refresh => self.engine.refresh(),
            Intent::Sync(limit) => {
                self.engine.request_sync(limit);
            }
            Intent::ToggleStar(id) => {
                self.engine.toggle_star(&id);
            }
            Intent::Star(id) => {
                self.engine.star(&id);
            }
            Intent::Unstar(id) => {
                self.engine.unstar(&id);
            }
            Intent::Trash(id) => {
                self.engine.trash(&id, now);
            }
            Intent::Undo(notice) => {
                self.engine.undo(notice);
            }
            Intent::DismissNotice(notice) => {
                self.engine.dismiss_notice(notice);
            }
            Intent::CompleteAction(id) => {
                self.engine.complete_action(&id);
            }
            Intent::AddToCalendar(id) => {
                self.engine.add_to_calendar(&id);
            }
            Intent::Compose(draft) => self.engine.open_compose(draft),
            Intent::Reply(id) => {
                self.engine.reply(&id);
            }
            Intent::EditDraft(draft) => {
                if let Err(e) = self.engine.edit_draft(draft) {
                    warn!(error = %e, "draft not updated");
                }
            }
            Intent::Send => {
                if let Err(e) = self.engine.send() {
                    info!(error = %e, "send rejected");
                }
            }
            Intent::CloseCompose => self.engine.close_compose(),
            Intent::Swipe { email_id, event } => self.swipe(email_id, event, now),
            Intent::Shutdown => return false,
        }

        self.after_step(&before);
        true
    }

    fn swipe(&mut self, email_id: String, event: SwipeEvent, now: Instant) {
        if self.engine.email(&email_id).is_none() {
            debug!(%email_id, "swipe on a row that is not shown");
            return;
        }
        let settings = self.settings.swipe;
        let recognizer = self
            .swipes
            .entry(email_id.clone())
            .or_insert_with(|| SwipeRecognizer::new(settings));

        match event {
            SwipeEvent::Start(x) => recognizer.start(x),
            SwipeEvent::Move(x) => recognizer.move_to(x),
            SwipeEvent::End => {
                if let Some(outcome) = recognizer.end(now) {
                    debug!(%email_id, ?outcome, "swipe ended");
                    if outcome == GestureOutcome::Cancel {
                        self.swipes.remove(&email_id);
                    }
                }
            }
        }
    }

    fn fire_timers(&mut self, now: Instant) {
        let before = self.engine.view().clone();

        self.engine.tick(now);

        let settled: Vec<String> = self
            .swipes
            .iter_mut()
            .filter_map(|(id, recognizer)| recognizer.take_settled(now).then(|| id.clone()))
            .collect();
        for email_id in settled {
            self.swipes.remove(&email_id);
            self.engine.trash(&email_id, now);
        }

        if self.search.as_ref().is_some_and(|s| s.due_at <= now)
            && let Some(search) = self.search.take()
        {
            self.engine.set_query(&search.query);
        }

        self.after_step(&before);
    }

    /// A view change unmounts every row, so in-progress swipes are dropped
    fn after_step(&mut self, before: &ViewParams) {
        if self.engine.view() != before && !self.swipes.is_empty() {
            debug!(count = self.swipes.len(), "view changed, dropping swipes");
            self.swipes.clear();
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let swipe = self
            .swipes
            .values()
            .filter_map(SwipeRecognizer::settle_deadline)
            .min();
        let search = self.search.as_ref().map(|s| s.due_at);

        [self.engine.next_deadline(), swipe, search]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut swipes: Vec<SwipeView> = self
            .swipes
            .iter()
            .map(|(email_id, recognizer)| SwipeView {
                email_id: email_id.clone(),
                offset: recognizer.offset(),
                transition: recognizer.transition(),
                committing: recognizer.is_committing(),
            })
            .collect();
        swipes.sort_by(|a, b| a.email_id.cmp(&b.email_id));

        SessionSnapshot {
            engine: self.engine.snapshot(),
            swipes,
            pending_search: self.search.as_ref().map(|s| s.query.clone()),
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
