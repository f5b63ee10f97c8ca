use crate::email::Email;
use crate::mail_service::SendPayload;

/// Rejections raised before anything goes over the wire
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    #[error("Please specify a recipient.")]
    NoRecipients,

    #[error("The message is already being sent.")]
    AlreadySending,

    #[error("No message is being composed.")]
    NotOpen,
}

/// Contents of the compose form
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Draft {
    /// Comma-separated recipients, as typed
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Draft {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Builds a reply to `email`, quoting its snippet
    pub fn reply_to(email: &Email) -> Self {
        let subject = if email.subject.starts_with("Re:") {
            email.subject.clone()
        } else {
            format!("Re: {}", email.subject)
        };

        let when = email
            .received_at
            .map(|dt| dt.format("%a, %b %d, %Y at %H:%M").to_string())
            .unwrap_or_else(|| "an earlier date".to_string());

        let body = format!(
            "\n\n\nOn {}, {} wrote:\n> {}...",
            when, email.sender, email.snippet
        );

        Self {
            to: email.sender_address(),
            subject,
            body,
        }
    }

    /// Splits the recipient field into addresses, dropping empty entries
    pub fn recipients(&self) -> Vec<String> {
        self.to
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Validates the draft and turns it into a send payload
    pub fn to_payload(&self) -> Result<SendPayload, ComposeError> {
        let to = self.recipients();
        if to.is_empty() {
            return Err(ComposeError::NoRecipients);
        }

        Ok(SendPayload {
            to,
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: self.subject.clone(),
            body: self.body.clone(),
        })
    }
}

/// State of the compose form while it is open
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComposeState {
    pub draft: Draft,
    pub sending: bool,
    /// Why the last send attempt failed, kept until the next attempt
    pub error: Option<String>,
}

impl ComposeState {
    pub fn new(draft: Draft) -> Self {
        Self {
            draft,
            sending: false,
            error: None,
        }
    }
}
