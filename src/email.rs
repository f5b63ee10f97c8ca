use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Label carried by starred messages
pub const STARRED: &str = "STARRED";

/// Label carried by trashed messages
pub const TRASH: &str = "TRASH";

/// A named partition of the mail store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Folder {
    #[default]
    Inbox,
    Starred,
    Sent,
    Drafts,
    Trash,
    Spam,
    Snoozed,
}

impl Folder {
    pub const ALL: [Folder; 7] = [
        Folder::Inbox,
        Folder::Starred,
        Folder::Sent,
        Folder::Drafts,
        Folder::Trash,
        Folder::Spam,
        Folder::Snoozed,
    ];

    /// The name the mail service expects for this folder
    pub fn as_str(&self) -> &'static str {
        match self {
            Folder::Inbox => "inbox",
            Folder::Starred => "starred",
            Folder::Sent => "sent",
            Folder::Drafts => "drafts",
            Folder::Trash => "trash",
            Folder::Spam => "spam",
            Folder::Snoozed => "snoozed",
        }
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Folder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Folder::ALL
            .into_iter()
            .find(|folder| folder.as_str() == wanted)
            .ok_or_else(|| format!("unknown folder: {s}"))
    }
}

/// Represents an email message as served by the mail service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    /// Locally-stable identifier, unique within a collection
    pub id: String,
    /// Server-stable identifier used for remote mutations
    pub message_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thread_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sender: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recipient: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub snippet: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub received_at: Option<DateTime<Utc>>,
    /// Label set; transported as a JSON array
    #[serde(rename = "labelIds", default, deserialize_with = "null_as_default")]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub is_processed: bool,
    #[serde(default)]
    pub event_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub action_required: bool,
    /// Set once the action has been put on the user's calendar
    #[serde(default)]
    pub calendar_event_id: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl Email {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Adds or removes a label. Labels are a set, so repeated adds are no-ops.
    pub fn set_label(&mut self, label: &str, present: bool) {
        if present {
            self.labels.insert(label.to_string());
        } else {
            self.labels.remove(label);
        }
    }

    pub fn is_starred(&self) -> bool {
        self.has_label(STARRED)
    }

    /// Sender without the address part, e.g. "Alice" for "Alice <a@x.com>"
    pub fn sender_name(&self) -> &str {
        let name = self.sender.split('<').next().unwrap_or_default().trim();
        if name.is_empty() {
            if self.sender.trim().is_empty() {
                "Unknown"
            } else {
                self.sender.trim()
            }
        } else {
            name
        }
    }

    /// Bare address of the sender
    pub fn sender_address(&self) -> String {
        extract_email(&self.sender)
    }
}

/// Builder for creating Email instances
#[derive(Default)]
pub struct EmailBuilder {
    id: String,
    message_id: Option<String>,
    sender: String,
    subject: String,
    snippet: String,
    received_at: Option<DateTime<Utc>>,
    labels: BTreeSet<String>,
    action_required: bool,
    event_title: Option<String>,
    event_date: Option<DateTime<Utc>>,
}

impl EmailBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    pub fn action_required(mut self, event_title: impl Into<String>) -> Self {
        self.action_required = true;
        self.event_title = Some(event_title.into());
        self
    }

    pub fn event_date(mut self, event_date: DateTime<Utc>) -> Self {
        self.event_date = Some(event_date);
        self
    }

    pub fn build(self) -> Email {
        Email {
            message_id: self
                .message_id
                .unwrap_or_else(|| format!("msg_{}", self.id)),
            thread_id: format!("thread_{}", self.id),
            id: self.id,
            sender: self.sender,
            recipient: String::new(),
            subject: self.subject,
            snippet: self.snippet,
            received_at: self.received_at,
            labels: self.labels,
            is_processed: false,
            event_title: self.event_title,
            event_date: self.event_date,
            deadline: None,
            action_required: self.action_required,
            calendar_event_id: None,
            priority: None,
            category: None,
        }
    }
}

/// Extracts the email address from a "Name <email>" format string
/// If no angle brackets are present, returns the string trimmed as-is
pub fn extract_email(from: &str) -> String {
    static ADDRESS: OnceLock<Regex> = OnceLock::new();
    let re = ADDRESS.get_or_init(|| Regex::new(r"<([^>]+)>").expect("valid address regex"));
    if let Some(captures) = re.captures(from) {
        captures
            .get(1)
            .map_or_else(String::new, |m| m.as_str().trim().to_string())
    } else {
        from.trim().to_string()
    }
}

/// Parses a timestamp as served by the mail service.
/// The backend emits naive ISO-8601 values for UTC columns, so those are accepted too.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    for fmt in &formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
impl Email {
    /// Creates a plain inbox email for tests
    pub fn new(id: &str, sender: &str, subject: &str) -> Self {
        EmailBuilder::new()
            .id(id)
            .sender(sender)
            .subject(subject)
            .snippet("Snippet")
            .build()
    }
}
