use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::email::{Email, Folder};

/// Failure of a call to the mail service. The engine only cares that it failed.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("mail service unavailable: {0}")]
    Unavailable(String),
}

/// Outgoing message as accepted by the send endpoint
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SendPayload {
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Reference to a message the service accepted for delivery
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SentMessage {
    pub id: String,
}

/// Event for the user's calendar, built from an email the assistant flagged
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEvent {
    pub title: String,
    /// ISO-8601
    pub start_time: String,
    pub description: String,
}

impl CalendarEvent {
    /// Uses the extracted event title and date, falling back to the subject and `now`
    pub fn for_email(email: &Email, now: DateTime<Utc>) -> Self {
        Self {
            title: email
                .event_title
                .clone()
                .unwrap_or_else(|| email.subject.clone()),
            start_time: email.event_date.unwrap_or(now).to_rfc3339(),
            description: format!("Source Email: {}\n\n{}", email.subject, email.snippet),
        }
    }
}

/// Where the created event can be opened
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CalendarLink {
    #[serde(default)]
    pub event_link: Option<String>,
}

#[derive(Serialize)]
struct CalendarEventRequest<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    event: &'a CalendarEvent,
}

#[derive(Debug, Deserialize)]
struct SyncSummary {
    #[serde(default)]
    emails_fetched: u32,
}

/// Trait for mail store operations - allows mocking in tests
#[cfg_attr(test, mockall::automock)]
pub trait MailService: Send + Sync {
    /// Imports up to `limit` recent messages of `folder` into the store
    fn import_recent(
        &self,
        user_id: &str,
        folder: Folder,
        limit: u32,
    ) -> impl Future<Output = Result<u32, MailError>> + Send;

    /// Reads one page of the locally stored messages, in delivery order
    fn list(
        &self,
        user_id: &str,
        folder: Folder,
        query: &str,
        limit: u32,
        skip: u32,
    ) -> impl Future<Output = Result<Vec<Email>, MailError>> + Send;

    /// Sends a new message
    fn send(
        &self,
        user_id: &str,
        payload: SendPayload,
    ) -> impl Future<Output = Result<SentMessage, MailError>> + Send;

    /// Adds or removes the starred label
    fn set_star(
        &self,
        user_id: &str,
        message_id: &str,
        starred: bool,
    ) -> impl Future<Output = Result<(), MailError>> + Send;

    /// Moves a message to or out of the trash
    fn set_trashed(
        &self,
        user_id: &str,
        message_id: &str,
        trashed: bool,
    ) -> impl Future<Output = Result<(), MailError>> + Send;

    /// Clears the action-required flag the assistant put on a message
    fn dismiss_action(
        &self,
        user_id: &str,
        email_id: &str,
    ) -> impl Future<Output = Result<(), MailError>> + Send;

    /// Creates an event in the user's primary calendar
    fn add_calendar_event(
        &self,
        user_id: &str,
        event: CalendarEvent,
    ) -> impl Future<Output = Result<CalendarLink, MailError>> + Send;
}

/// Mail service client for the REST backend
#[derive(Clone)]
pub struct HttpMailService {
    client: Client,
    base_url: String,
}

impl HttpMailService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Fires a request and maps any non-success status to an error
    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, MailError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(MailError::Status { status, body })
        }
    }

    async fn post_message_action(
        &self,
        user_id: &str,
        id: &str,
        action: &str,
    ) -> Result<(), MailError> {
        let request = self
            .client
            .post(self.url(&format!("emails/{id}/{action}")))
            .query(&[("user_id", user_id)]);
        self.execute(request).await?;
        Ok(())
    }
}

impl MailService for HttpMailService {
    async fn import_recent(&self, user_id: &str, folder: Folder, limit: u32) -> Result<u32, MailError> {
        let request = self.client.post(self.url("emails/sync")).query(&[
            ("user_id", user_id.to_string()),
            ("folder", folder.as_str().to_string()),
            ("limit", limit.to_string()),
        ]);

        let summary: SyncSummary = self
            .execute(request)
            .await?
            .json()
            .await
            .map_err(|e| MailError::Decode(e.to_string()))?;
        Ok(summary.emails_fetched)
    }

    async fn list(
        &self,
        user_id: &str,
        folder: Folder,
        query: &str,
        limit: u32,
        skip: u32,
    ) -> Result<Vec<Email>, MailError> {
        let mut params = vec![
            ("user_id", user_id.to_string()),
            ("folder", folder.as_str().to_string()),
            ("limit", limit.to_string()),
            ("skip", skip.to_string()),
        ];
        if !query.is_empty() {
            params.push(("q", query.to_string()));
        }

        let request = self.client.get(self.url("emails/")).query(&params);
        self.execute(request)
            .await?
            .json()
            .await
            .map_err(|e| MailError::Decode(e.to_string()))
    }

    async fn send(&self, user_id: &str, payload: SendPayload) -> Result<SentMessage, MailError> {
        let request = self
            .client
            .post(self.url("emails/send"))
            .query(&[("user_id", user_id)])
            .json(&payload);

        self.execute(request)
            .await?
            .json()
            .await
            .map_err(|e| MailError::Decode(e.to_string()))
    }

    async fn set_star(&self, user_id: &str, message_id: &str, starred: bool) -> Result<(), MailError> {
        let action = if starred { "star" } else { "unstar" };
        self.post_message_action(user_id, message_id, action).await
    }

    async fn set_trashed(&self, user_id: &str, message_id: &str, trashed: bool) -> Result<(), MailError> {
        let action = if trashed { "trash" } else { "untrash" };
        self.post_message_action(user_id, message_id, action).await
    }

    async fn dismiss_action(&self, user_id: &str, email_id: &str) -> Result<(), MailError> {
        self.post_message_action(user_id, email_id, "dismiss_action").await
    }

    async fn add_calendar_event(&self, user_id: &str, event: CalendarEvent) -> Result<CalendarLink, MailError> {
        let request = self
            .client
            .post(self.url("calendar/events"))
            .json(&CalendarEventRequest {
                user_id,
                event: &event,
            });

        self.execute(request)
            .await?
            .json()
            .await
            .map_err(|e| MailError::Decode(e.to_string()))
    }
}
