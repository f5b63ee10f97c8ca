use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::email::{Email, EmailBuilder, Folder, STARRED, TRASH};
use crate::mail_service::{
    CalendarEvent, CalendarLink, MailError, MailService, SendPayload, SentMessage,
};

const INBOX: &str = "INBOX";
const SENT: &str = "SENT";
const DRAFT: &str = "DRAFT";
const SPAM: &str = "SPAM";
const SNOOZED: &str = "SNOOZED";
const DEMO_ADDRESS: &str = "Demo User <demo@example.com>";

/// Operations that can be made to fail on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemoOp {
    Import,
    List,
    Send,
    Star,
    Trash,
    Untrash,
    DismissAction,
    Calendar,
}

#[derive(Default)]
struct DemoStore {
    remote: Vec<Email>,
    local: Vec<Email>,
    calendar: Vec<CalendarEvent>,
    failures: HashMap<DemoOp, u32>,
    next_id: u32,
}

impl DemoStore {
    fn take_failure(&mut self, op: DemoOp) -> bool {
        match self.failures.get_mut(&op) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Applies `f` to every copy of the message, remote and local
    fn update(&mut self, message_id: &str, f: impl Fn(&mut Email)) -> Result<(), MailError> {
        let mut found = false;
        for email in self
            .remote
            .iter_mut()
            .chain(self.local.iter_mut())
            .filter(|e| e.message_id == message_id)
        {
            f(email);
            found = true;
        }
        if found {
            Ok(())
        } else {
            Err(MailError::Unavailable(format!("no such message: {message_id}")))
        }
    }
}

/// Mail service backed by canned demo emails. Keeps a "remote" mailbox and a
/// local store: imports copy the newest remote messages of a folder into the
/// store, and listing reads the store only.
pub struct DemoMailService {
    store: Mutex<DemoStore>,
    latency: Duration,
}

impl DemoMailService {
    /// A service whose store already holds the demo emails
    pub fn new() -> Self {
        let emails = create_demo_emails();
        let service = Self::with_emails(emails.clone());
        if let Ok(mut store) = service.store.lock() {
            store.local = emails;
        }
        service
    }

    /// A service with `remote` waiting to be imported and an empty store
    pub fn with_emails(remote: Vec<Email>) -> Self {
        Self {
            store: Mutex::new(DemoStore {
                remote,
                ..Default::default()
            }),
            latency: Duration::ZERO,
        }
    }

    /// Delays every call, to make in-flight states visible
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes the next `times` calls of `op` fail
    pub fn fail_next(&self, op: DemoOp, times: u32) {
        if let Ok(mut store) = self.store.lock() {
            *store.failures.entry(op).or_default() += times;
        }
    }

    /// Copy of the local store, for inspection
    pub fn stored(&self) -> Vec<Email> {
        self.store
            .lock()
            .map(|store| store.local.clone())
            .unwrap_or_default()
    }

    /// Events added to the demo calendar so far
    pub fn calendar(&self) -> Vec<CalendarEvent> {
        self.store
            .lock()
            .map(|store| store.calendar.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, DemoStore>, MailError> {
        self.store
            .lock()
            .map_err(|_| MailError::Unavailable("demo store poisoned".to_string()))
    }

    /// Waits out the latency, then locks the store unless a failure is due
    async fn begin(&self, op: DemoOp) -> Result<MutexGuard<'_, DemoStore>, MailError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut store = self.lock()?;
        if store.take_failure(op) {
            return Err(MailError::Unavailable(format!("simulated {op:?} failure")));
        }
        Ok(store)
    }
}

impl Default for DemoMailService {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether an email shows up in a folder
fn in_folder(email: &Email, folder: Folder) -> bool {
    let trashed = email.has_label(TRASH);
    match folder {
        Folder::Trash => trashed,
        Folder::Inbox => !trashed && email.has_label(INBOX),
        Folder::Starred => !trashed && email.has_label(STARRED),
        Folder::Sent => !trashed && email.has_label(SENT),
        Folder::Drafts => !trashed && email.has_label(DRAFT),
        Folder::Spam => email.has_label(SPAM),
        Folder::Snoozed => !trashed && email.has_label(SNOOZED),
    }
}

fn matches_query(email: &Email, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let query = query.to_lowercase();
    [&email.subject, &email.sender, &email.snippet]
        .iter()
        .any(|field| field.to_lowercase().contains(&query))
}

/// Newest first
fn sort_by_date(emails: &mut [Email]) {
    emails.sort_by(|a, b| b.received_at.cmp(&a.received_at));
}

impl MailService for DemoMailService {
    async fn import_recent(&self, _user_id: &str, folder: Folder, limit: u32) -> Result<u32, MailError> {
        let mut store = self.begin(DemoOp::Import).await?;

        let mut candidates: Vec<Email> = store
            .remote
            .iter()
            .filter(|e| in_folder(e, folder))
            .cloned()
            .collect();
        sort_by_date(&mut candidates);

        let mut imported = 0;
        for email in candidates.into_iter().take(limit as usize) {
            if !store.local.iter().any(|e| e.message_id == email.message_id) {
                store.local.push(email);
                imported += 1;
            }
        }
        Ok(imported)
    }

    async fn list(
        &self,
        _user_id: &str,
        folder: Folder,
        query: &str,
        limit: u32,
        skip: u32,
    ) -> Result<Vec<Email>, MailError> {
        let store = self.begin(DemoOp::List).await?;

        let mut emails: Vec<Email> = store
            .local
            .iter()
            .filter(|e| in_folder(e, folder) && matches_query(e, query))
            .cloned()
            .collect();
        sort_by_date(&mut emails);

        Ok(emails
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect())
    }

    async fn send(&self, _user_id: &str, payload: SendPayload) -> Result<SentMessage, MailError> {
        let mut store = self.begin(DemoOp::Send).await?;

        store.next_id += 1;
        let id = format!("demo_out_{}", store.next_id);
        let mut email = EmailBuilder::new()
            .id(&id)
            .sender(DEMO_ADDRESS)
            .subject(payload.subject)
            .snippet(payload.body.chars().take(100).collect::<String>())
            .received_at(Utc::now())
            .label(SENT)
            .build();
        email.recipient = payload.to.join(", ");

        store.remote.push(email.clone());
        store.local.push(email);
        Ok(SentMessage { id })
    }

    async fn set_star(&self, _user_id: &str, message_id: &str, starred: bool) -> Result<(), MailError> {
        let mut store = self.begin(DemoOp::Star).await?;
        store.update(message_id, |e| e.set_label(STARRED, starred))
    }

    async fn set_trashed(&self, _user_id: &str, message_id: &str, trashed: bool) -> Result<(), MailError> {
        let op = if trashed { DemoOp::Trash } else { DemoOp::Untrash };
        let mut store = self.begin(op).await?;
        store.update(message_id, |e| e.set_label(TRASH, trashed))
    }

    async fn dismiss_action(&self, _user_id: &str, email_id: &str) -> Result<(), MailError> {
        let mut store = self.begin(DemoOp::DismissAction).await?;
        for email in store.local.iter_mut().filter(|e| e.id == email_id) {
            email.action_required = false;
        }
        Ok(())
    }

    async fn add_calendar_event(&self, _user_id: &str, event: CalendarEvent) -> Result<CalendarLink, MailError> {
        let mut store = self.begin(DemoOp::Calendar).await?;
        store.calendar.push(event);
        Ok(CalendarLink {
            event_link: Some(format!(
                "https://calendar.example/demo_event_{}",
                store.calendar.len()
            )),
        })
    }
}

/// Creates a set of realistic demo emails
pub fn create_demo_emails() -> Vec<Email> {
    let now = Utc::now();
    let yesterday = now - ChronoDuration::days(1);
    let two_days_ago = now - ChronoDuration::days(2);
    let last_week = now - ChronoDuration::days(7);

    vec![
        // GitHub notifications
        EmailBuilder::new()
            .id("demo_1")
            .sender("GitHub <notifications@github.com>")
            .subject("[rust-lang/rust] Fix ICE in pattern matching (PR #12345)")
            .snippet("@bors merged this pull request. The changes look good and all CI checks passed")
            .received_at(now - ChronoDuration::hours(2))
            .label(INBOX)
            .build(),
        EmailBuilder::new()
            .id("demo_2")
            .sender("GitHub <notifications@github.com>")
            .subject("[tokio-rs/tokio] New issue: Memory leak in async runtime")
            .snippet("A new issue has been opened by @contributor. Steps to reproduce: 1. Create a new runtime")
            .received_at(now - ChronoDuration::hours(5))
            .label(INBOX)
            .build(),
        // Course deadlines the assistant flagged
        EmailBuilder::new()
            .id("demo_3")
            .sender("Registrar <registrar@university.edu>")
            .subject("Final exam schedule published")
            .snippet("The final exam for CS 241 is on December 12 at 9am in Hall B. Bring your student ID")
            .received_at(now - ChronoDuration::hours(1))
            .label(INBOX)
            .action_required("CS 241 final exam")
            .event_date(now + ChronoDuration::days(10))
            .build(),
        EmailBuilder::new()
            .id("demo_4")
            .sender("Linear <notify@linear.app>")
            .subject("ENG-1234: Implement user authentication")
            .snippet("Status changed to In Review. Alice assigned this issue to you for final review")
            .received_at(now - ChronoDuration::minutes(90))
            .label(INBOX)
            .label(STARRED)
            .build(),
        EmailBuilder::new()
            .id("demo_5")
            .sender("Linear <notify@linear.app>")
            .subject("Weekly project digest - Sprint 42")
            .snippet("12 issues completed, 3 in progress, 5 remaining. Team velocity is up 15% from last week")
            .received_at(two_days_ago)
            .label(INBOX)
            .build(),
        // Personal thread with Alice
        EmailBuilder::new()
            .id("demo_6")
            .sender("Alice Chen <alice@example.com>")
            .subject("Re: Coffee tomorrow?")
            .snippet("That works! How about the new place on Market St? I heard they have great espresso")
            .received_at(now - ChronoDuration::hours(3))
            .label(INBOX)
            .label(STARRED)
            .build(),
        EmailBuilder::new()
            .id("demo_7")
            .sender("Alice Chen <alice@example.com>")
            .subject("Coffee tomorrow?")
            .snippet("Hey! It's been a while. Want to grab coffee tomorrow afternoon? I'm free after 2pm")
            .received_at(yesterday - ChronoDuration::hours(2))
            .label(INBOX)
            .build(),
        EmailBuilder::new()
            .id("demo_sent_1")
            .sender(DEMO_ADDRESS)
            .subject("Re: Coffee tomorrow?")
            .snippet("Sure! 3pm works for me. Any preference on location?")
            .received_at(yesterday)
            .label(SENT)
            .build(),
        // Receipts
        EmailBuilder::new()
            .id("demo_8")
            .sender("Stripe <receipts@stripe.com>")
            .subject("Your receipt from Acme Corp")
            .snippet("Amount: $49.00. Thank you for your payment. Your subscription has been renewed")
            .received_at(two_days_ago)
            .label(INBOX)
            .build(),
        EmailBuilder::new()
            .id("demo_9")
            .sender("Stripe <receipts@stripe.com>")
            .subject("Your receipt from Cloud Services Inc")
            .snippet("Amount: $12.00. Payment successful. Your monthly invoice is attached")
            .received_at(last_week)
            .label(INBOX)
            .build(),
        EmailBuilder::new()
            .id("demo_10")
            .sender("Figma <no-reply@figma.com>")
            .subject("Bob commented on 'Homepage Redesign'")
            .snippet("Bob: 'Love the new hero section! Can we try a darker shade for the CTA button?'")
            .received_at(now - ChronoDuration::hours(4))
            .label(INBOX)
            .build(),
        EmailBuilder::new()
            .id("demo_11")
            .sender("This Week in Rust <noreply@this-week-in-rust.org>")
            .subject("This Week in Rust 542")
            .snippet("Hello and welcome to another issue of This Week in Rust! Updates from the community")
            .received_at(two_days_ago + ChronoDuration::hours(4))
            .label(INBOX)
            .build(),
        EmailBuilder::new()
            .id("demo_12")
            .sender("Amazon Web Services <no-reply@aws.amazon.com>")
            .subject("AWS Billing Alert: Your costs exceeded the threshold")
            .snippet("Your AWS account has exceeded the billing threshold of $100.00. Current charges: $127.43")
            .received_at(yesterday + ChronoDuration::hours(6))
            .label(INBOX)
            .build(),
        EmailBuilder::new()
            .id("demo_13")
            .sender("Slack <feedback@slack.com>")
            .subject("Your daily digest from Acme Workspace")
            .snippet("You have 23 unread messages in 5 channels. #engineering: 12 new, #random: 5 new")
            .received_at(now - ChronoDuration::hours(8))
            .label(INBOX)
            .build(),
        EmailBuilder::new()
            .id("demo_14")
            .sender("Bob Smith <bob@company.com>")
            .subject("Re: Q4 Planning")
            .snippet("I agree with Charlie's points. We should focus on the API improvements first")
            .received_at(now - ChronoDuration::hours(6))
            .label(INBOX)
            .build(),
        EmailBuilder::new()
            .id("demo_15")
            .sender("Charlie Davis <charlie@company.com>")
            .subject("Re: Q4 Planning")
            .snippet("Great overview! I think we should prioritize items 2 and 3 for the first milestone")
            .received_at(yesterday + ChronoDuration::hours(3))
            .label(INBOX)
            .build(),
        EmailBuilder::new()
            .id("demo_sent_2")
            .sender(DEMO_ADDRESS)
            .subject("Q4 Planning")
            .snippet("Hi team, I wanted to share my thoughts on Q4 priorities")
            .received_at(yesterday)
            .label(SENT)
            .build(),
        EmailBuilder::new()
            .id("demo_16")
            .sender("Prize Desk <winner@lottery.example>")
            .subject("You have been selected!")
            .snippet("Claim your reward today by replying with your bank details")
            .received_at(last_week)
            .label(SPAM)
            .build(),
        EmailBuilder::new()
            .id("demo_17")
            .sender("Old Newsletter <news@example.org>")
            .subject("Archive: March edition")
            .snippet("Catch up on everything that happened in March")
            .received_at(last_week - ChronoDuration::days(3))
            .label(INBOX)
            .label(TRASH)
            .build(),
    ]
}
