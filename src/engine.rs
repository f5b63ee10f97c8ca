//! The synchronization engine.
//!
//! Owns the collection for the active view and every flag the presentation
//! reads. It performs no I/O: entry points queue [`MailRequest`]s in an outbox
//! that the session drains, and results come back through
//! [`Engine::handle_response`].

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::compose::{ComposeError, ComposeState, Draft};
use crate::email::{Email, Folder};
use crate::mail_service::{CalendarEvent, CalendarLink, MailError, SentMessage};
use crate::notice::{NoticeAction, NoticeId, NoticeOptions, NoticeQueue, Notification, Severity};
use crate::optimistic::{self, LocalEdit, Snapshot};
use crate::worker::{ImportOrigin, MailRequest, MailResponse, PageRequest, Seq, Ticket};

const TRASHED_MESSAGE: &str = "Email moved to trash";
const SYNC_FAILED_MESSAGE: &str =
    "Failed to sync emails. You might need to re-login to grant permissions.";

/// Tunables the engine needs from configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub page_size: u32,
    pub background_import_limit: u32,
    pub sync_limit: u32,
    pub notice_duration: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            background_import_limit: 500,
            sync_limit: 50,
            notice_duration: crate::notice::DEFAULT_DURATION,
        }
    }
}

/// Which slice of the store is on screen
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewParams {
    pub folder: Folder,
    pub query: String,
    /// Zero-based
    pub page: u32,
}

impl ViewParams {
    /// Returns the parameters after a requested change.
    /// A different folder or query always lands on the first page.
    pub fn changed_to(&self, folder: Folder, query: &str, page: u32) -> ViewParams {
        let filter_changed = folder != self.folder || query != self.query;
        ViewParams {
            folder,
            query: query.to_string(),
            page: if filter_changed { 0 } else { page },
        }
    }

    pub fn skip(&self, page_size: u32) -> u32 {
        self.page.saturating_mul(page_size)
    }
}

/// Payload of the "Undo" button on a trash notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoTrash {
    pub email_id: String,
    pub ticket: Ticket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashPhase {
    /// Trash call not answered yet
    InFlight,
    /// Server trashed it; undo still possible while the notice lives
    Confirmed,
    /// Undone locally before the trash call landed; untrash goes out once it does
    UndoRequested,
    /// Untrash call in flight
    Restoring,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrashMutation {
    pub snapshot: Snapshot,
    pub phase: TrashPhase,
    /// The undo notice, while it is still up
    pub notice: Option<NoticeId>,
    /// View the email was trashed from; restores only apply there
    pub origin: ViewParams,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    Star { starred: bool },
    Trash(TrashMutation),
}

/// Untrash held back until the trash call it follows has landed
#[derive(Debug, Clone, PartialEq)]
struct OwedUntrash {
    ticket: Ticket,
    message_id: String,
}

/// An intent the server has not confirmed yet. At most one per email.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub ticket: Ticket,
    pub message_id: String,
    pub kind: MutationKind,
}

/// Notice as the presentation sees it
#[derive(Debug, Clone, PartialEq)]
pub struct NoticeView {
    pub id: NoticeId,
    pub message: String,
    pub severity: Severity,
    pub action_label: Option<String>,
}

impl From<&Notification<UndoTrash>> for NoticeView {
    fn from(notice: &Notification<UndoTrash>) -> Self {
        Self {
            id: notice.id,
            message: notice.message.clone(),
            severity: notice.severity,
            action_label: notice.action.as_ref().map(|a| a.label.clone()),
        }
    }
}

/// Read-only copy of everything the presentation renders
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineSnapshot {
    pub emails: Vec<Email>,
    pub view: ViewParams,
    pub loading: bool,
    pub syncing: bool,
    pub last_error: Option<String>,
    pub notices: Vec<NoticeView>,
    pub compose: Option<ComposeState>,
    pub has_next_page: bool,
    pub range_label: String,
    pub action_banner: Option<Email>,
}

pub struct Engine {
    settings: EngineSettings,
    view: ViewParams,
    emails: Vec<Email>,
    /// Ids of the last page the server returned, in its order
    layout: Vec<String>,
    loading: bool,
    syncing: bool,
    last_error: Option<String>,
    /// Sequence number of the newest list request; only its response is rendered
    latest_seq: Seq,
    next_ticket: Ticket,
    pending: HashMap<String, PendingMutation>,
    owed_untrash: HashMap<String, OwedUntrash>,
    clearing_actions: HashSet<String>,
    adding_to_calendar: HashSet<String>,
    notices: NoticeQueue<UndoTrash>,
    compose: Option<ComposeState>,
    outbox: Vec<MailRequest>,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            view: ViewParams::default(),
            emails: Vec::new(),
            layout: Vec::new(),
            loading: false,
            syncing: false,
            last_error: None,
            latest_seq: 0,
            next_ticket: 0,
            pending: HashMap::new(),
            owed_untrash: HashMap::new(),
            clearing_actions: HashSet::new(),
            adding_to_calendar: HashSet::new(),
            notices: NoticeQueue::new(),
            compose: None,
            outbox: Vec::new(),
        }
    }

    /// Loads the initial view: background import plus the first page
    pub fn mount(&mut self) {
        self.reload();
    }

    /// Hands over every request queued since the last call
    pub fn take_requests(&mut self) -> Vec<MailRequest> {
        std::mem::take(&mut self.outbox)
    }

    // View parameters

    /// Replaces the active view and fetches it. A folder or query change resets
    /// the page to 0 in the same step, so only one page is requested.
    pub fn set_view_parameters(&mut self, folder: Folder, query: &str, page: u32) {
        self.view = self.view.changed_to(folder, query, page);
        debug!(view = ?self.view, "view changed");
        self.reload();
    }

    pub fn set_folder(&mut self, folder: Folder) {
        let query = self.view.query.clone();
        self.set_view_parameters(folder, &query, self.view.page);
    }

    pub fn set_query(&mut self, query: &str) {
        self.set_view_parameters(self.view.folder, query, self.view.page);
    }

    pub fn set_page(&mut self, page: u32) {
        let query = self.view.query.clone();
        self.set_view_parameters(self.view.folder, &query, page);
    }

    /// Moves to the next page if the current one is full
    pub fn next_page(&mut self) -> bool {
        if !self.has_next_page() {
            return false;
        }
        self.set_page(self.view.page + 1);
        true
    }

    /// Moves to the previous page, stopping at the first
    pub fn prev_page(&mut self) -> bool {
        if self.view.page == 0 {
            return false;
        }
        self.set_page(self.view.page - 1);
        true
    }

    /// Re-reads the current page without changing the view
    pub fn refresh(&mut self) {
        self.latest_seq += 1;
        self.loading = true;
        self.outbox.push(MailRequest::List {
            seq: self.latest_seq,
            page: PageRequest {
                folder: self.view.folder,
                query: self.view.query.clone(),
                limit: self.settings.page_size,
                skip: self.view.skip(self.settings.page_size),
            },
        });
    }

    /// Best-effort import for the active folder; failures are only logged
    pub fn request_background_sync(&mut self, limit: u32) {
        self.outbox.push(MailRequest::Import {
            origin: ImportOrigin::Background,
            folder: self.view.folder,
            limit,
        });
    }

    /// User-triggered import. Ignored while one is already running.
    pub fn request_sync(&mut self, limit: Option<u32>) -> bool {
        if self.syncing {
            return false;
        }
        self.syncing = true;
        self.outbox.push(MailRequest::Import {
            origin: ImportOrigin::User,
            folder: self.view.folder,
            limit: limit.unwrap_or(self.settings.sync_limit),
        });
        true
    }

    fn reload(&mut self) {
        self.request_background_sync(self.settings.background_import_limit);
        self.refresh();
    }

    // Mutations

    pub fn star(&mut self, email_id: &str) -> bool {
        self.set_starred(email_id, true)
    }

    pub fn unstar(&mut self, email_id: &str) -> bool {
        self.set_starred(email_id, false)
    }

    pub fn toggle_star(&mut self, email_id: &str) -> bool {
        match self.email(email_id) {
            Some(email) => {
                let starred = email.is_starred();
                self.set_starred(email_id, !starred)
            }
            None => false,
        }
    }

    /// Flips the starred label locally, then asks the server to do the same.
    /// A failure is repaired by refetching the page, not by a local rollback.
    pub fn set_starred(&mut self, email_id: &str, starred: bool) -> bool {
        let Some(message_id) = self.email(email_id).map(|e| e.message_id.clone()) else {
            return false;
        };
        if optimistic::apply(&mut self.emails, email_id, LocalEdit::SetStar(starred)).is_none() {
            return false;
        }

        let ticket = self.issue_ticket();
        self.supersede(email_id);
        self.pending.insert(
            email_id.to_string(),
            PendingMutation {
                ticket,
                message_id: message_id.clone(),
                kind: MutationKind::Star { starred },
            },
        );
        self.outbox.push(MailRequest::SetStar {
            ticket,
            email_id: email_id.to_string(),
            message_id,
            starred,
        });
        true
    }

    /// Removes the email locally, offers an undo notice and asks the server to trash it
    pub fn trash(&mut self, email_id: &str, now: Instant) -> bool {
        let Some(message_id) = self.email(email_id).map(|e| e.message_id.clone()) else {
            return false;
        };
        let Some(snapshot) = optimistic::remove(&mut self.emails, email_id, &self.layout) else {
            return false;
        };

        let ticket = self.issue_ticket();
        self.supersede(email_id);
        // Trashing again makes a held-back untrash moot
        self.owed_untrash.remove(email_id);

        let notice = self.notices.show(
            TRASHED_MESSAGE,
            NoticeOptions::default()
                .action(NoticeAction::new(
                    "Undo",
                    UndoTrash {
                        email_id: email_id.to_string(),
                        ticket,
                    },
                ))
                .duration(self.settings.notice_duration),
            now,
        );

        self.pending.insert(
            email_id.to_string(),
            PendingMutation {
                ticket,
                message_id: message_id.clone(),
                kind: MutationKind::Trash(TrashMutation {
                    snapshot,
                    phase: TrashPhase::InFlight,
                    notice: Some(notice),
                    origin: self.view.clone(),
                }),
            },
        );
        self.outbox.push(MailRequest::SetTrashed {
            ticket,
            email_id: email_id.to_string(),
            message_id,
            trashed: true,
        });
        true
    }

    /// Runs the undo bound to a notice. Returns false if there was nothing to undo.
    pub fn undo(&mut self, notice_id: NoticeId) -> bool {
        let emails = &mut self.emails;
        let pending = &mut self.pending;
        let outbox = &mut self.outbox;
        let view = &self.view;

        self.notices
            .invoke_action(notice_id, |undo| {
                Self::undo_trash(emails, pending, outbox, view, undo)
            })
            .unwrap_or(false)
    }

    fn undo_trash(
        emails: &mut Vec<Email>,
        pending: &mut HashMap<String, PendingMutation>,
        outbox: &mut Vec<MailRequest>,
        view: &ViewParams,
        undo: UndoTrash,
    ) -> bool {
        let Some(entry) = pending.get_mut(&undo.email_id) else {
            return false;
        };
        if entry.ticket != undo.ticket {
            return false;
        }
        let MutationKind::Trash(trash) = &mut entry.kind else {
            return false;
        };

        if trash.origin == *view {
            optimistic::revert(emails, &undo.email_id, &trash.snapshot);
        }
        trash.notice = None;

        match trash.phase {
            TrashPhase::InFlight => {
                debug!(email_id = %undo.email_id, "undo before trash landed");
                trash.phase = TrashPhase::UndoRequested;
            }
            TrashPhase::Confirmed => {
                trash.phase = TrashPhase::Restoring;
                outbox.push(MailRequest::SetTrashed {
                    ticket: entry.ticket,
                    email_id: undo.email_id.clone(),
                    message_id: entry.message_id.clone(),
                    trashed: false,
                });
            }
            TrashPhase::UndoRequested | TrashPhase::Restoring => return false,
        }
        info!(email_id = %undo.email_id, "trash undone");
        true
    }

    /// Clears the action-required flag locally and tells the server, best effort
    pub fn complete_action(&mut self, email_id: &str) -> bool {
        if optimistic::apply(&mut self.emails, email_id, LocalEdit::ClearAction).is_none() {
            return false;
        }
        self.clearing_actions.insert(email_id.to_string());
        self.outbox.push(MailRequest::DismissAction {
            email_id: email_id.to_string(),
        });
        true
    }

    /// Puts the email's event on the user's calendar. Success completes the
    /// action as if it had been dismissed.
    pub fn add_to_calendar(&mut self, email_id: &str) -> bool {
        if self.adding_to_calendar.contains(email_id) {
            return false;
        }
        let Some(event) = self
            .email(email_id)
            .map(|email| CalendarEvent::for_email(email, Utc::now()))
        else {
            return false;
        };

        self.adding_to_calendar.insert(email_id.to_string());
        self.outbox.push(MailRequest::AddToCalendar {
            email_id: email_id.to_string(),
            event,
        });
        true
    }

    /// A newer intent replaces whatever is pending for the email. An undo that
    /// is still waiting on its trash call keeps its untrash owed, to be sent
    /// once that call lands.
    fn supersede(&mut self, email_id: &str) {
        let Some(previous) = self.pending.remove(email_id) else {
            return;
        };
        if let MutationKind::Trash(trash) = &previous.kind
            && trash.phase == TrashPhase::UndoRequested
        {
            self.owed_untrash.insert(
                email_id.to_string(),
                OwedUntrash {
                    ticket: previous.ticket,
                    message_id: previous.message_id.clone(),
                },
            );
        }
        debug!(email_id, ticket = previous.ticket, "pending mutation superseded");
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.next_ticket += 1;
        self.next_ticket
    }

    // Notices

    /// Dismisses a notice without running its action
    pub fn dismiss_notice(&mut self, notice_id: NoticeId) -> bool {
        let undo = self
            .notices
            .get(notice_id)
            .and_then(|n| n.action.as_ref())
            .map(|a| a.payload.clone());
        let removed = self.notices.dismiss(notice_id);
        if let Some(undo) = undo {
            self.close_undo_window(&undo);
        }
        removed
    }

    /// Expires notices that have run their course
    pub fn tick(&mut self, now: Instant) {
        for notice in self.notices.expire(now) {
            if let Some(action) = notice.action {
                self.close_undo_window(&action.payload);
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.notices.next_deadline()
    }

    /// The undo notice is gone; a confirmed trash no longer needs its snapshot
    fn close_undo_window(&mut self, undo: &UndoTrash) {
        let Some(entry) = self.pending.get_mut(&undo.email_id) else {
            return;
        };
        if entry.ticket != undo.ticket {
            return;
        }
        if let MutationKind::Trash(trash) = &mut entry.kind {
            trash.notice = None;
            if trash.phase == TrashPhase::Confirmed {
                self.pending.remove(&undo.email_id);
            }
        }
    }

    fn notify(&mut self, message: impl Into<String>, severity: Severity, now: Instant) {
        self.notices.show(
            message,
            NoticeOptions::default()
                .severity(severity)
                .duration(self.settings.notice_duration),
            now,
        );
    }

    // Compose

    pub fn open_compose(&mut self, draft: Draft) {
        self.compose = Some(ComposeState::new(draft));
    }

    /// Opens a reply to an email in the collection
    pub fn reply(&mut self, email_id: &str) -> bool {
        let Some(draft) = self.email(email_id).map(Draft::reply_to) else {
            return false;
        };
        self.open_compose(draft);
        true
    }

    pub fn edit_draft(&mut self, draft: Draft) -> Result<(), ComposeError> {
        let compose = self.compose.as_mut().ok_or(ComposeError::NotOpen)?;
        if compose.sending {
            return Err(ComposeError::AlreadySending);
        }
        compose.draft = draft;
        Ok(())
    }

    pub fn close_compose(&mut self) {
        self.compose = None;
    }

    /// Sends the open draft. Input problems are rejected here, before any request.
    pub fn send(&mut self) -> Result<(), ComposeError> {
        let compose = self.compose.as_mut().ok_or(ComposeError::NotOpen)?;
        if compose.sending {
            return Err(ComposeError::AlreadySending);
        }

        let payload = match compose.draft.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                compose.error = Some(e.to_string());
                return Err(e);
            }
        };

        compose.sending = true;
        compose.error = None;
        self.outbox.push(MailRequest::Send { payload });
        Ok(())
    }

    // Responses

    pub fn handle_response(&mut self, response: MailResponse, now: Instant) {
        match response {
            MailResponse::Listed { seq, result } => self.on_listed(seq, result),
            MailResponse::Imported { origin, result } => self.on_imported(origin, result, now),
            MailResponse::Starred {
                ticket,
                email_id,
                starred,
                result,
            } => self.on_starred(ticket, &email_id, starred, result),
            MailResponse::Trashed {
                ticket,
                email_id,
                trashed: true,
                result,
            } => self.on_trashed(ticket, &email_id, result, now),
            MailResponse::Trashed {
                ticket,
                email_id,
                trashed: false,
                result,
            } => self.on_untrashed(ticket, &email_id, result, now),
            MailResponse::ActionDismissed { email_id, result } => {
                self.clearing_actions.remove(&email_id);
                if let Err(e) = result {
                    warn!(%email_id, error = %e, "failed to dismiss action");
                }
            }
            MailResponse::Sent { result } => self.on_sent(result, now),
            MailResponse::CalendarAdded { email_id, result } => {
                self.on_calendar_added(&email_id, result, now)
            }
        }
    }

    fn on_listed(&mut self, seq: Seq, result: Result<Vec<Email>, MailError>) {
        if seq != self.latest_seq {
            debug!(seq, latest = self.latest_seq, "discarding stale list response");
            return;
        }
        self.loading = false;

        match result {
            Ok(emails) => {
                debug!(count = emails.len(), seq, "page loaded");
                self.layout = emails.iter().map(|e| e.id.clone()).collect();
                self.emails = emails;
                self.last_error = None;
                self.rebase_pending();
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch emails");
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Re-applies unconfirmed local edits on top of a freshly fetched page
    fn rebase_pending(&mut self) {
        let mut restores: Vec<(Ticket, &String, &TrashMutation)> = Vec::new();

        for (email_id, entry) in &self.pending {
            match &entry.kind {
                MutationKind::Star { starred } => {
                    optimistic::apply(&mut self.emails, email_id, LocalEdit::SetStar(*starred));
                }
                MutationKind::Trash(trash) => match trash.phase {
                    TrashPhase::InFlight | TrashPhase::Confirmed => {
                        optimistic::apply(&mut self.emails, email_id, LocalEdit::Remove);
                    }
                    TrashPhase::UndoRequested | TrashPhase::Restoring => {
                        if trash.origin == self.view {
                            restores.push((entry.ticket, email_id, trash));
                        }
                    }
                },
            }
        }

        restores.sort_by_key(|(ticket, ..)| *ticket);
        for (_, email_id, trash) in restores {
            optimistic::revert(&mut self.emails, email_id, &trash.snapshot);
        }

        for email_id in &self.clearing_actions {
            optimistic::apply(&mut self.emails, email_id, LocalEdit::ClearAction);
        }
    }

    fn on_imported(
        &mut self,
        origin: ImportOrigin,
        result: Result<u32, MailError>,
        now: Instant,
    ) {
        match (origin, result) {
            (ImportOrigin::Background, Ok(count)) => {
                debug!(count, "background import finished");
            }
            (ImportOrigin::Background, Err(e)) => {
                warn!(error = %e, "background import failed");
            }
            (ImportOrigin::User, Ok(count)) => {
                info!(count, "sync finished");
                self.syncing = false;
                self.refresh();
            }
            (ImportOrigin::User, Err(e)) => {
                warn!(error = %e, "sync failed");
                self.syncing = false;
                self.notify(SYNC_FAILED_MESSAGE, Severity::Error, now);
            }
        }
    }

    fn on_starred(
        &mut self,
        ticket: Ticket,
        email_id: &str,
        starred: bool,
        result: Result<(), MailError>,
    ) {
        let current = self
            .pending
            .get(email_id)
            .is_some_and(|entry| entry.ticket == ticket);
        if current {
            self.pending.remove(email_id);
        }

        if let Err(e) = result {
            warn!(email_id, starred, error = %e, "failed to update star, refetching");
            self.refresh();
        }
    }

    fn on_trashed(
        &mut self,
        ticket: Ticket,
        email_id: &str,
        result: Result<(), MailError>,
        now: Instant,
    ) {
        if self
            .owed_untrash
            .get(email_id)
            .is_some_and(|owed| owed.ticket == ticket)
            && let Some(owed) = self.owed_untrash.remove(email_id)
        {
            debug!(email_id, ticket, "trash landed, sending held-back untrash");
            self.outbox.push(MailRequest::SetTrashed {
                ticket,
                email_id: email_id.to_string(),
                message_id: owed.message_id,
                trashed: false,
            });
            return;
        }

        let Some(entry) = self.pending.get_mut(email_id) else {
            debug!(email_id, ticket, "trash response with nothing pending");
            return;
        };
        if entry.ticket != ticket {
            debug!(email_id, ticket, "trash response for superseded mutation");
            return;
        }
        let MutationKind::Trash(trash) = &mut entry.kind else {
            return;
        };

        match (trash.phase, result) {
            (TrashPhase::InFlight, Ok(())) => {
                trash.phase = TrashPhase::Confirmed;
                if trash.notice.is_none() {
                    self.pending.remove(email_id);
                }
            }
            (TrashPhase::InFlight, Err(e)) => {
                warn!(email_id, error = %e, "failed to trash email, restoring");
                let Some(PendingMutation {
                    kind: MutationKind::Trash(trash),
                    ..
                }) = self.pending.remove(email_id)
                else {
                    return;
                };
                if trash.origin == self.view {
                    optimistic::revert(&mut self.emails, email_id, &trash.snapshot);
                }
                if let Some(notice) = trash.notice {
                    self.notices.dismiss(notice);
                }
                self.notify("Failed to move email to trash", Severity::Error, now);
            }
            (TrashPhase::UndoRequested, _) => {
                trash.phase = TrashPhase::Restoring;
                let message_id = entry.message_id.clone();
                self.outbox.push(MailRequest::SetTrashed {
                    ticket,
                    email_id: email_id.to_string(),
                    message_id,
                    trashed: false,
                });
            }
            (phase, _) => {
                debug!(email_id, ?phase, "unexpected trash response");
            }
        }
    }

    fn on_untrashed(
        &mut self,
        ticket: Ticket,
        email_id: &str,
        result: Result<(), MailError>,
        now: Instant,
    ) {
        let current = self.pending.get(email_id).is_some_and(|entry| {
            entry.ticket == ticket
                && matches!(
                    &entry.kind,
                    MutationKind::Trash(TrashMutation {
                        phase: TrashPhase::Restoring,
                        ..
                    })
                )
        });
        if current {
            self.pending.remove(email_id);
        }

        if let Err(e) = result {
            warn!(email_id, error = %e, "failed to restore email");
            self.notify("Failed to restore email", Severity::Error, now);
            self.refresh();
        }
    }

    fn on_sent(
        &mut self,
        result: Result<SentMessage, MailError>,
        now: Instant,
    ) {
        match result {
            Ok(sent) => {
                info!(id = %sent.id, "email sent");
                self.compose = None;
                self.notify("Email sent successfully!", Severity::Success, now);
            }
            Err(e) => {
                warn!(error = %e, "failed to send email");
                if let Some(compose) = self.compose.as_mut() {
                    compose.sending = false;
                    compose.error = Some(e.to_string());
                }
                self.notify(format!("Failed to send email: {e}"), Severity::Error, now);
            }
        }
    }

    fn on_calendar_added(
        &mut self,
        email_id: &str,
        result: Result<CalendarLink, MailError>,
        now: Instant,
    ) {
        self.adding_to_calendar.remove(email_id);

        match result {
            Ok(link) => {
                info!(email_id, link = ?link.event_link, "event added to calendar");
                self.notify("Event added to Google Calendar!", Severity::Success, now);
                if !self.complete_action(email_id) {
                    self.outbox.push(MailRequest::DismissAction {
                        email_id: email_id.to_string(),
                    });
                }
            }
            Err(e) => {
                warn!(email_id, error = %e, "failed to add to calendar");
                self.notify("Failed to add to calendar", Severity::Error, now);
            }
        }
    }

    // Accessors

    pub fn email(&self, email_id: &str) -> Option<&Email> {
        self.emails.iter().find(|e| e.id == email_id)
    }

    pub fn emails(&self) -> &[Email] {
        &self.emails
    }

    pub fn view(&self) -> &ViewParams {
        &self.view
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn syncing(&self) -> bool {
        self.syncing
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn notices(&self) -> &[Notification<UndoTrash>] {
        self.notices.notices()
    }

    pub fn compose(&self) -> Option<&ComposeState> {
        self.compose.as_ref()
    }

    pub fn pending(&self, email_id: &str) -> Option<&PendingMutation> {
        self.pending.get(email_id)
    }

    /// A full page suggests there is another one
    pub fn has_next_page(&self) -> bool {
        self.emails.len() >= self.settings.page_size as usize
    }

    /// e.g. "101-200" on the second page
    pub fn range_label(&self) -> String {
        let skip = self.view.skip(self.settings.page_size) as usize;
        format!("{}-{}", skip + 1, skip + self.emails.len())
    }

    /// First email the assistant flagged as needing action that is not on
    /// the calendar yet
    pub fn action_banner(&self) -> Option<&Email> {
        self.emails
            .iter()
            .find(|e| e.action_required && e.calendar_event_id.is_none())
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            emails: self.emails.clone(),
            view: self.view.clone(),
            loading: self.loading,
            syncing: self.syncing,
            last_error: self.last_error.clone(),
            notices: self.notices.notices().iter().map(NoticeView::from).collect(),
            compose: self.compose.clone(),
            has_next_page: self.has_next_page(),
            range_label: self.range_label(),
            action_banner: self.action_banner().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_email(id: &str) -> Email {
        Email::new(id, &format!("sender{id}@example.com"), &format!("Subject {id}"))
    }

    fn page(ids: &[&str]) -> Vec<Email> {
        ids.iter().map(|id| create_test_email(id)).collect()
    }

    fn ids(engine: &Engine) -> Vec<&str> {
        engine.emails().iter().map(|e| e.id.as_str()).collect()
    }

    fn offline() -> MailError {
        MailError::Unavailable("offline".to_string())
    }

    fn list_seqs(requests: &[MailRequest]) -> Vec<(Seq, PageRequest)> {
        requests
            .iter()
            .filter_map(|r| match r {
                MailRequest::List { seq, page } => Some((*seq, page.clone())),
                _ => None,
            })
            .collect()
    }

    fn untrash_count(requests: &[MailRequest]) -> usize {
        requests
            .iter()
            .filter(|r| matches!(r, MailRequest::SetTrashed { trashed: false, .. }))
            .count()
    }

    /// Mounted engine showing `ids` on the first page of the inbox
    fn loaded_engine(ids: &[&str]) -> Engine {
        let mut engine = Engine::new(EngineSettings::default());
        engine.mount();
        let requests = engine.take_requests();
        let (seq, _) = list_seqs(&requests)[0].clone();
        engine.handle_response(
            MailResponse::Listed {
                seq,
                result: Ok(page(ids)),
            },
            Instant::now(),
        );
        engine
    }

    fn trash_ticket(requests: &[MailRequest]) -> Ticket {
        requests
            .iter()
            .find_map(|r| match r {
                MailRequest::SetTrashed {
                    ticket,
                    trashed: true,
                    ..
                } => Some(*ticket),
                _ => None,
            })
            .expect("trash request queued")
    }

    fn trashed(ticket: Ticket, email_id: &str, trashed: bool, result: Result<(), MailError>) -> MailResponse {
        MailResponse::Trashed {
            ticket,
            email_id: email_id.to_string(),
            trashed,
            result,
        }
    }

    #[test]
    fn test_mount_issues_background_import_and_first_page() {
        let mut engine = Engine::new(EngineSettings::default());
        engine.mount();
        let requests = engine.take_requests();

        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0],
            MailRequest::Import {
                origin: ImportOrigin::Background,
                folder: Folder::Inbox,
                limit: 500,
            }
        );
        let lists = list_seqs(&requests);
        assert_eq!(lists[0].1.skip, 0);
        assert_eq!(lists[0].1.limit, 100);
        assert!(engine.loading());
    }

    #[test]
    fn test_folder_change_resets_page_with_single_fetch() {
        let mut engine = loaded_engine(&[]);
        engine.set_page(3);
        engine.take_requests();

        engine.set_folder(Folder::Starred);
        let requests = engine.take_requests();
        let lists = list_seqs(&requests);

        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].1.folder, Folder::Starred);
        assert_eq!(lists[0].1.skip, 0);
        assert_eq!(engine.view().page, 0);
    }

    #[test]
    fn test_query_change_resets_page() {
        let mut engine = loaded_engine(&[]);
        engine.set_view_parameters(Folder::Inbox, "", 2);
        engine.take_requests();

        engine.set_view_parameters(Folder::Inbox, "invoice", 5);
        let lists = list_seqs(&engine.take_requests());

        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].1.query, "invoice");
        assert_eq!(lists[0].1.skip, 0);
    }

    #[test]
    fn test_next_page_requests_skip_of_one_page() {
        let ids: Vec<String> = (0..100).map(|i| i.to_string()).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let mut engine = loaded_engine(&id_refs);

        assert!(engine.has_next_page());
        assert_eq!(engine.range_label(), "1-100");
        assert!(engine.next_page());

        let lists = list_seqs(&engine.take_requests());
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].1.skip, 100);
    }

    #[test]
    fn test_partial_page_has_no_next_and_prev_clamps() {
        let mut engine = loaded_engine(&["1", "2"]);
        assert!(!engine.has_next_page());
        assert!(!engine.next_page());
        assert!(!engine.prev_page());
        assert!(engine.take_requests().is_empty());
    }

    #[test]
    fn test_stale_list_response_is_discarded() {
        let mut engine = loaded_engine(&[]);
        let now = Instant::now();

        engine.set_folder(Folder::Sent);
        let (first_seq, _) = list_seqs(&engine.take_requests())[0].clone();
        engine.set_folder(Folder::Spam);
        let (second_seq, _) = list_seqs(&engine.take_requests())[0].clone();

        engine.handle_response(
            MailResponse::Listed {
                seq: second_seq,
                result: Ok(page(&["spam-1"])),
            },
            now,
        );
        engine.handle_response(
            MailResponse::Listed {
                seq: first_seq,
                result: Ok(page(&["sent-1", "sent-2"])),
            },
            now,
        );

        assert_eq!(ids(&engine), vec!["spam-1"]);
        assert!(!engine.loading());
    }

    #[test]
    fn test_stale_response_does_not_clear_loading() {
        let mut engine = loaded_engine(&[]);
        engine.set_folder(Folder::Sent);
        let (first_seq, _) = list_seqs(&engine.take_requests())[0].clone();
        engine.set_folder(Folder::Spam);

        engine.handle_response(
            MailResponse::Listed {
                seq: first_seq,
                result: Ok(page(&["sent-1"])),
            },
            Instant::now(),
        );

        assert!(engine.loading());
        assert!(engine.emails().is_empty());
    }

    #[test]
    fn test_failed_list_keeps_collection_and_records_error() {
        let mut engine = loaded_engine(&["1"]);
        engine.refresh();
        let (seq, _) = list_seqs(&engine.take_requests())[0].clone();

        engine.handle_response(
            MailResponse::Listed {
                seq,
                result: Err(offline()),
            },
            Instant::now(),
        );

        assert_eq!(ids(&engine), vec!["1"]);
        assert!(engine.last_error().unwrap().contains("offline"));
        assert!(!engine.loading());
    }

    #[test]
    fn test_background_import_failure_is_swallowed() {
        let mut engine = loaded_engine(&["1"]);
        engine.handle_response(
            MailResponse::Imported {
                origin: ImportOrigin::Background,
                result: Err(offline()),
            },
            Instant::now(),
        );

        assert!(engine.notices().is_empty());
        assert!(engine.last_error().is_none());
        assert!(engine.take_requests().is_empty());
    }

    #[test]
    fn test_user_sync_success_refreshes() {
        let mut engine = loaded_engine(&["1"]);
        assert!(engine.request_sync(None));
        assert!(!engine.request_sync(Some(10)));
        assert!(engine.syncing());

        let requests = engine.take_requests();
        assert_eq!(
            requests,
            vec![MailRequest::Import {
                origin: ImportOrigin::User,
                folder: Folder::Inbox,
                limit: 50,
            }]
        );

        engine.handle_response(
            MailResponse::Imported {
                origin: ImportOrigin::User,
                result: Ok(3),
            },
            Instant::now(),
        );

        assert!(!engine.syncing());
        assert_eq!(list_seqs(&engine.take_requests()).len(), 1);
    }

    #[test]
    fn test_user_sync_failure_surfaces_notice() {
        let mut engine = loaded_engine(&["1"]);
        engine.request_sync(Some(20));
        engine.take_requests();

        engine.handle_response(
            MailResponse::Imported {
                origin: ImportOrigin::User,
                result: Err(offline()),
            },
            Instant::now(),
        );

        assert!(!engine.syncing());
        assert_eq!(engine.notices().len(), 1);
        assert_eq!(engine.notices()[0].severity, Severity::Error);
        assert!(engine.take_requests().is_empty());
    }

    #[test]
    fn test_star_is_optimistic() {
        let mut engine = loaded_engine(&["1", "2"]);
        assert!(engine.toggle_star("2"));

        assert!(engine.email("2").unwrap().is_starred());
        let requests = engine.take_requests();
        assert!(matches!(
            &requests[0],
            MailRequest::SetStar { starred: true, message_id, .. } if message_id == "msg_2"
        ));
    }

    #[test]
    fn test_star_failure_refetches_instead_of_rolling_back() {
        let mut engine = loaded_engine(&["1"]);
        engine.star("1");
        let ticket = match &engine.take_requests()[0] {
            MailRequest::SetStar { ticket, .. } => *ticket,
            other => panic!("unexpected request: {other:?}"),
        };

        engine.handle_response(
            MailResponse::Starred {
                ticket,
                email_id: "1".to_string(),
                starred: true,
                result: Err(offline()),
            },
            Instant::now(),
        );

        assert!(engine.email("1").unwrap().is_starred());
        assert!(engine.pending("1").is_none());
        let requests = engine.take_requests();
        assert_eq!(list_seqs(&requests).len(), 1);
        assert!(engine.notices().is_empty());
    }

    #[test]
    fn test_star_success_resolves_pending() {
        let mut engine = loaded_engine(&["1"]);
        engine.unstar("1");
        let ticket = match &engine.take_requests()[0] {
            MailRequest::SetStar { ticket, .. } => *ticket,
            other => panic!("unexpected request: {other:?}"),
        };
        assert!(engine.pending("1").is_some());

        engine.handle_response(
            MailResponse::Starred {
                ticket,
                email_id: "1".to_string(),
                starred: false,
                result: Ok(()),
            },
            Instant::now(),
        );
        assert!(engine.pending("1").is_none());
    }

    #[test]
    fn test_newer_star_supersedes_older() {
        let mut engine = loaded_engine(&["1"]);
        engine.star("1");
        engine.unstar("1");
        let requests = engine.take_requests();
        let tickets: Vec<Ticket> = requests
            .iter()
            .filter_map(|r| match r {
                MailRequest::SetStar { ticket, .. } => Some(*ticket),
                _ => None,
            })
            .collect();

        engine.handle_response(
            MailResponse::Starred {
                ticket: tickets[0],
                email_id: "1".to_string(),
                starred: true,
                result: Ok(()),
            },
            Instant::now(),
        );

        let pending = engine.pending("1").unwrap();
        assert_eq!(pending.ticket, tickets[1]);
        assert_eq!(pending.kind, MutationKind::Star { starred: false });
    }

    #[test]
    fn test_trash_then_undo_before_confirmation() {
        let mut engine = loaded_engine(&["1", "2", "3"]);
        let before = engine.emails().to_vec();
        let now = Instant::now();

        assert!(engine.trash("2", now));
        assert_eq!(ids(&engine), vec!["1", "3"]);
        let requests = engine.take_requests();
        let ticket = trash_ticket(&requests);

        let notice = engine.notices()[0].id;
        assert_eq!(engine.notices()[0].message, TRASHED_MESSAGE);
        assert!(engine.undo(notice));

        assert_eq!(engine.emails(), before.as_slice());
        assert!(engine.notices().is_empty());
        assert!(engine.take_requests().is_empty());

        // The untrash goes out once the trash call lands
        engine.handle_response(trashed(ticket, "2", true, Ok(())), now);
        let requests = engine.take_requests();
        assert_eq!(untrash_count(&requests), 1);

        engine.handle_response(trashed(ticket, "2", false, Ok(())), now);
        assert!(engine.pending("2").is_none());
        assert_eq!(engine.emails(), before.as_slice());
        assert!(engine.take_requests().is_empty());
    }

    #[test]
    fn test_undo_after_confirmation_untrashes_immediately() {
        let mut engine = loaded_engine(&["1", "2"]);
        let now = Instant::now();

        engine.trash("1", now);
        let ticket = trash_ticket(&engine.take_requests());
        engine.handle_response(trashed(ticket, "1", true, Ok(())), now);

        let notice = engine.notices()[0].id;
        assert!(engine.undo(notice));
        assert_eq!(ids(&engine), vec!["1", "2"]);
        assert_eq!(untrash_count(&engine.take_requests()), 1);

        // A second undo does nothing
        assert!(!engine.undo(notice));
        assert!(engine.take_requests().is_empty());
    }

    #[test]
    fn test_undo_when_trash_later_fails_still_sends_one_untrash() {
        let mut engine = loaded_engine(&["1", "2"]);
        let now = Instant::now();

        engine.trash("1", now);
        let ticket = trash_ticket(&engine.take_requests());
        let notice = engine.notices()[0].id;
        engine.undo(notice);

        engine.handle_response(trashed(ticket, "1", true, Err(offline())), now);
        assert_eq!(untrash_count(&engine.take_requests()), 1);
        assert_eq!(ids(&engine), vec!["1", "2"]);
        assert!(engine.notices().is_empty());
    }

    #[test]
    fn test_trash_failure_restores_without_untrash() {
        let mut engine = loaded_engine(&["1", "2", "3"]);
        let before = engine.emails().to_vec();
        let now = Instant::now();

        engine.trash("3", now);
        let ticket = trash_ticket(&engine.take_requests());
        engine.handle_response(trashed(ticket, "3", true, Err(offline())), now);

        assert_eq!(engine.emails(), before.as_slice());
        assert_eq!(untrash_count(&engine.take_requests()), 0);
        assert!(engine.pending("3").is_none());

        // Undo notice replaced by an error notice
        assert_eq!(engine.notices().len(), 1);
        assert_eq!(engine.notices()[0].severity, Severity::Error);
        assert!(engine.notices()[0].action.is_none());
    }

    #[test]
    fn test_trash_success_discards_snapshot_when_notice_expires() {
        let mut engine = loaded_engine(&["1", "2"]);
        let now = Instant::now();

        engine.trash("1", now);
        let ticket = trash_ticket(&engine.take_requests());
        engine.handle_response(trashed(ticket, "1", true, Ok(())), now);
        assert!(engine.pending("1").is_some());

        engine.tick(now + Duration::from_millis(3999));
        assert!(engine.pending("1").is_some());
        assert_eq!(engine.notices().len(), 1);

        engine.tick(now + Duration::from_millis(4000));
        assert!(engine.pending("1").is_none());
        assert!(engine.notices().is_empty());
        assert_eq!(ids(&engine), vec!["2"]);
        assert!(engine.take_requests().is_empty());
    }

    #[test]
    fn test_notice_expiry_before_confirmation_then_success() {
        let mut engine = loaded_engine(&["1", "2"]);
        let now = Instant::now();

        engine.trash("1", now);
        let ticket = trash_ticket(&engine.take_requests());
        engine.tick(now + Duration::from_secs(5));
        assert!(engine.pending("1").is_some());

        engine.handle_response(trashed(ticket, "1", true, Ok(())), now);
        assert!(engine.pending("1").is_none());
    }

    #[test]
    fn test_dismissing_undo_notice_closes_undo_window() {
        let mut engine = loaded_engine(&["1"]);
        let now = Instant::now();

        engine.trash("1", now);
        let ticket = trash_ticket(&engine.take_requests());
        engine.handle_response(trashed(ticket, "1", true, Ok(())), now);

        let notice = engine.notices()[0].id;
        assert!(engine.dismiss_notice(notice));
        assert!(!engine.dismiss_notice(notice));
        assert!(engine.pending("1").is_none());
        assert!(!engine.undo(notice));
    }

    #[test]
    fn test_refresh_keeps_pending_trash_removed() {
        let mut engine = loaded_engine(&["1", "2", "3"]);
        let now = Instant::now();

        engine.trash("2", now);
        engine.star("3");
        engine.take_requests();
        engine.refresh();
        let (seq, _) = list_seqs(&engine.take_requests())[0].clone();

        engine.handle_response(
            MailResponse::Listed {
                seq,
                result: Ok(page(&["1", "2", "3"])),
            },
            now,
        );

        assert_eq!(ids(&engine), vec!["1", "3"]);
        assert!(engine.email("3").unwrap().is_starred());
    }

    #[test]
    fn test_refresh_during_undo_keeps_email_visible() {
        let mut engine = loaded_engine(&["1", "2", "3"]);
        let now = Instant::now();

        engine.trash("2", now);
        engine.take_requests();
        let notice = engine.notices()[0].id;
        engine.undo(notice);

        engine.refresh();
        let (seq, _) = list_seqs(&engine.take_requests())[0].clone();
        engine.handle_response(
            MailResponse::Listed {
                seq,
                result: Ok(page(&["1", "3"])),
            },
            now,
        );

        assert_eq!(ids(&engine), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_untrash_failure_notifies_and_refetches() {
        let mut engine = loaded_engine(&["1"]);
        let now = Instant::now();

        engine.trash("1", now);
        let ticket = trash_ticket(&engine.take_requests());
        engine.handle_response(trashed(ticket, "1", true, Ok(())), now);
        let notice = engine.notices()[0].id;
        engine.undo(notice);
        engine.take_requests();

        engine.handle_response(trashed(ticket, "1", false, Err(offline())), now);

        assert_eq!(list_seqs(&engine.take_requests()).len(), 1);
        assert_eq!(engine.notices()[0].message, "Failed to restore email");
    }

    #[test]
    fn test_star_after_undo_holds_untrash_until_trash_lands() {
        let mut engine = loaded_engine(&["1"]);
        let now = Instant::now();

        engine.trash("1", now);
        let ticket = trash_ticket(&engine.take_requests());
        let notice = engine.notices()[0].id;
        engine.undo(notice);

        engine.star("1");
        let requests = engine.take_requests();
        assert_eq!(untrash_count(&requests), 0);
        assert!(matches!(&requests[..], [MailRequest::SetStar { starred: true, .. }]));

        // The untrash follows the trash call, never overtakes it
        engine.handle_response(trashed(ticket, "1", true, Ok(())), now);
        let requests = engine.take_requests();
        assert_eq!(untrash_count(&requests), 1);
        assert!(matches!(
            &requests[0],
            MailRequest::SetTrashed { ticket: t, trashed: false, .. } if *t == ticket
        ));
        assert!(matches!(
            engine.pending("1").map(|p| &p.kind),
            Some(MutationKind::Star { starred: true })
        ));

        // Sent once only
        engine.handle_response(trashed(ticket, "1", true, Ok(())), now);
        assert!(engine.take_requests().is_empty());
    }

    #[test]
    fn test_trash_again_after_undo_drops_held_back_untrash() {
        let mut engine = loaded_engine(&["1", "2"]);
        let now = Instant::now();

        engine.trash("1", now);
        let first = trash_ticket(&engine.take_requests());
        let notice = engine.notices()[0].id;
        engine.undo(notice);
        engine.star("1");
        engine.trash("1", now);
        engine.take_requests();

        engine.handle_response(trashed(first, "1", true, Ok(())), now);
        assert_eq!(untrash_count(&engine.take_requests()), 0);
        assert_eq!(ids(&engine), vec!["2"]);
    }

    #[test]
    fn test_out_of_order_undo_restores_listing_order() {
        for (trash_order, undo_order) in [
            (["1", "2"], ["1", "2"]),
            (["1", "2"], ["2", "1"]),
            (["2", "1"], ["2", "1"]),
            (["2", "1"], ["1", "2"]),
        ] {
            let mut engine = loaded_engine(&["1", "2", "3"]);
            let now = Instant::now();

            let mut notices = HashMap::new();
            for id in trash_order {
                engine.trash(id, now);
                let notice = engine.notices().last().unwrap().id;
                notices.insert(id, notice);
            }
            assert_eq!(ids(&engine), vec!["3"]);

            for id in undo_order {
                assert!(engine.undo(notices[id]));
            }
            assert_eq!(
                ids(&engine),
                vec!["1", "2", "3"],
                "trashed {trash_order:?}, undone {undo_order:?}"
            );
        }
    }

    #[test]
    fn test_refresh_during_two_undos_keeps_listing_order() {
        let mut engine = loaded_engine(&["1", "2", "3"]);
        let now = Instant::now();

        engine.trash("1", now);
        engine.trash("2", now);
        let notices: Vec<NoticeId> = engine.notices().iter().map(|n| n.id).collect();
        engine.undo(notices[1]);
        engine.undo(notices[0]);
        engine.take_requests();

        engine.refresh();
        let (seq, _) = list_seqs(&engine.take_requests())[0].clone();
        engine.handle_response(
            MailResponse::Listed {
                seq,
                result: Ok(page(&["3"])),
            },
            now,
        );

        assert_eq!(ids(&engine), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_trash_unknown_email_is_noop() {
        let mut engine = loaded_engine(&["1"]);
        assert!(!engine.trash("nope", Instant::now()));
        assert!(!engine.star("nope"));
        assert!(engine.take_requests().is_empty());
        assert!(engine.notices().is_empty());
    }

    #[test]
    fn test_undo_after_view_change_only_untrashes() {
        let mut engine = loaded_engine(&["1", "2"]);
        let now = Instant::now();

        engine.trash("1", now);
        let ticket = trash_ticket(&engine.take_requests());
        engine.handle_response(trashed(ticket, "1", true, Ok(())), now);

        engine.set_folder(Folder::Starred);
        engine.take_requests();
        let notice = engine.notices()[0].id;
        engine.undo(notice);

        assert_eq!(ids(&engine), vec!["2"]);
        assert_eq!(untrash_count(&engine.take_requests()), 1);
    }

    #[test]
    fn test_send_rejects_empty_recipients_without_request() {
        let mut engine = loaded_engine(&[]);
        assert_eq!(engine.send(), Err(ComposeError::NotOpen));

        engine.open_compose(Draft::new("  ", "Hi", "Body"));
        assert_eq!(engine.send(), Err(ComposeError::NoRecipients));
        assert!(engine.take_requests().is_empty());
        assert!(engine.compose().unwrap().error.is_some());
    }

    #[test]
    fn test_send_success_closes_compose() {
        let mut engine = loaded_engine(&[]);
        engine.open_compose(Draft::new("bob@test.com", "Hi", "Body"));
        engine.send().unwrap();

        assert!(engine.compose().unwrap().sending);
        assert_eq!(engine.send(), Err(ComposeError::AlreadySending));
        assert!(matches!(&engine.take_requests()[..], [MailRequest::Send { .. }]));

        engine.handle_response(
            MailResponse::Sent {
                result: Ok(SentMessage {
                    id: "sent-1".to_string(),
                }),
            },
            Instant::now(),
        );

        assert!(engine.compose().is_none());
        assert_eq!(engine.notices()[0].severity, Severity::Success);
    }

    #[test]
    fn test_send_failure_keeps_draft() {
        let mut engine = loaded_engine(&[]);
        let draft = Draft::new("bob@test.com", "Hi", "Body");
        engine.open_compose(draft.clone());
        engine.send().unwrap();
        engine.take_requests();

        engine.handle_response(MailResponse::Sent { result: Err(offline()) }, Instant::now());

        let compose = engine.compose().unwrap();
        assert_eq!(compose.draft, draft);
        assert!(!compose.sending);
        assert!(compose.error.as_deref().unwrap().contains("offline"));
        assert_eq!(engine.notices()[0].severity, Severity::Error);

        // Retry is allowed
        engine.send().unwrap();
        assert_eq!(engine.take_requests().len(), 1);
    }

    #[test]
    fn test_reply_opens_prefilled_draft() {
        let mut engine = loaded_engine(&["1"]);
        assert!(engine.reply("1"));
        let compose = engine.compose().unwrap();
        assert_eq!(compose.draft.to, "sender1@example.com");
        assert_eq!(compose.draft.subject, "Re: Subject 1");
        assert!(!engine.reply("missing"));
    }

    #[test]
    fn test_complete_action_survives_refresh() {
        let mut engine = Engine::new(EngineSettings::default());
        engine.mount();
        let (seq, _) = list_seqs(&engine.take_requests())[0].clone();
        let mut emails = page(&["1", "2"]);
        emails[1].action_required = true;
        engine.handle_response(
            MailResponse::Listed {
                seq,
                result: Ok(emails.clone()),
            },
            Instant::now(),
        );
        assert_eq!(engine.action_banner().unwrap().id, "2");

        assert!(engine.complete_action("2"));
        assert!(engine.action_banner().is_none());
        assert_eq!(
            engine.take_requests(),
            vec![MailRequest::DismissAction {
                email_id: "2".to_string()
            }]
        );

        engine.refresh();
        let (seq, _) = list_seqs(&engine.take_requests())[0].clone();
        engine.handle_response(MailResponse::Listed { seq, result: Ok(emails) }, Instant::now());
        assert!(engine.action_banner().is_none());

        engine.handle_response(
            MailResponse::ActionDismissed {
                email_id: "2".to_string(),
                result: Ok(()),
            },
            Instant::now(),
        );
        assert!(engine.notices().is_empty());
    }

    fn flagged_engine() -> Engine {
        let mut engine = Engine::new(EngineSettings::default());
        engine.mount();
        let (seq, _) = list_seqs(&engine.take_requests())[0].clone();
        let mut emails = page(&["1", "2", "3"]);
        emails[1].action_required = true;
        emails[1].event_title = Some("Thesis defense".to_string());
        emails[2].action_required = true;
        engine.handle_response(MailResponse::Listed { seq, result: Ok(emails) }, Instant::now());
        engine
    }

    #[test]
    fn test_action_banner_skips_emails_already_on_calendar() {
        let mut engine = Engine::new(EngineSettings::default());
        engine.mount();
        let (seq, _) = list_seqs(&engine.take_requests())[0].clone();
        let mut emails = page(&["1", "2"]);
        emails[0].action_required = true;
        emails[0].calendar_event_id = Some("evt_1".to_string());
        emails[1].action_required = true;
        engine.handle_response(MailResponse::Listed { seq, result: Ok(emails) }, Instant::now());

        assert_eq!(engine.action_banner().unwrap().id, "2");
    }

    #[test]
    fn test_add_to_calendar_success_completes_action() {
        let mut engine = flagged_engine();
        let now = Instant::now();

        assert!(engine.add_to_calendar("2"));
        assert!(!engine.add_to_calendar("2"));
        assert!(!engine.add_to_calendar("missing"));
        let requests = engine.take_requests();
        match &requests[..] {
            [MailRequest::AddToCalendar { email_id, event }] => {
                assert_eq!(email_id, "2");
                assert_eq!(event.title, "Thesis defense");
                assert!(event.description.starts_with("Source Email: Subject 2"));
            }
            other => panic!("unexpected requests: {other:?}"),
        }

        engine.handle_response(
            MailResponse::CalendarAdded {
                email_id: "2".to_string(),
                result: Ok(CalendarLink {
                    event_link: Some("https://calendar.test/e".to_string()),
                }),
            },
            now,
        );

        assert!(!engine.email("2").unwrap().action_required);
        assert_eq!(engine.action_banner().unwrap().id, "3");
        assert_eq!(
            engine.take_requests(),
            vec![MailRequest::DismissAction {
                email_id: "2".to_string()
            }]
        );
        assert_eq!(engine.notices()[0].message, "Event added to Google Calendar!");
        assert_eq!(engine.notices()[0].severity, Severity::Success);
    }

    #[test]
    fn test_add_to_calendar_failure_keeps_action() {
        let mut engine = flagged_engine();
        let now = Instant::now();

        engine.add_to_calendar("3");
        engine.take_requests();
        engine.handle_response(
            MailResponse::CalendarAdded {
                email_id: "3".to_string(),
                result: Err(offline()),
            },
            now,
        );

        assert!(engine.email("3").unwrap().action_required);
        assert!(engine.take_requests().is_empty());
        assert_eq!(engine.notices()[0].message, "Failed to add to calendar");
        assert_eq!(engine.notices()[0].severity, Severity::Error);

        // A retry is allowed once the first call has answered
        assert!(engine.add_to_calendar("3"));
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut engine = loaded_engine(&["1", "2"]);
        engine.trash("1", Instant::now());

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.emails.len(), 1);
        assert_eq!(snapshot.range_label, "1-1");
        assert_eq!(snapshot.notices[0].action_label.as_deref(), Some("Undo"));
        assert!(!snapshot.has_next_page);
    }
}
