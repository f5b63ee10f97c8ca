use tracing::debug;

use crate::email::{Email, Folder};
use crate::mail_service::{
    CalendarEvent, CalendarLink, MailError, MailService, SendPayload, SentMessage,
};

/// Sequence number of a list request
pub type Seq = u64;

/// Number tying a mutation response to the pending mutation that issued it
pub type Ticket = u64;

/// Who asked for an import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOrigin {
    /// Prefetch on view change; failures are swallowed
    Background,
    /// The sync button; failures are surfaced
    User,
}

/// Page of the collection to read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub folder: Folder,
    pub query: String,
    pub limit: u32,
    pub skip: u32,
}

/// Operations the engine hands out. The session runs each one with
/// [`execute`] and feeds the [`MailResponse`] back.
#[derive(Debug, Clone, PartialEq)]
pub enum MailRequest {
    Import {
        origin: ImportOrigin,
        folder: Folder,
        limit: u32,
    },
    List {
        seq: Seq,
        page: PageRequest,
    },
    SetStar {
        ticket: Ticket,
        email_id: String,
        message_id: String,
        starred: bool,
    },
    SetTrashed {
        ticket: Ticket,
        email_id: String,
        message_id: String,
        trashed: bool,
    },
    DismissAction {
        email_id: String,
    },
    Send {
        payload: SendPayload,
    },
    AddToCalendar {
        email_id: String,
        event: CalendarEvent,
    },
}

/// Outcomes reported back to the engine
#[derive(Debug)]
pub enum MailResponse {
    Imported {
        origin: ImportOrigin,
        result: Result<u32, MailError>,
    },
    Listed {
        seq: Seq,
        result: Result<Vec<Email>, MailError>,
    },
    Starred {
        ticket: Ticket,
        email_id: String,
        starred: bool,
        result: Result<(), MailError>,
    },
    Trashed {
        ticket: Ticket,
        email_id: String,
        trashed: bool,
        result: Result<(), MailError>,
    },
    ActionDismissed {
        email_id: String,
        result: Result<(), MailError>,
    },
    Sent {
        result: Result<SentMessage, MailError>,
    },
    CalendarAdded {
        email_id: String,
        result: Result<CalendarLink, MailError>,
    },
}

/// Runs one request against the mail service
pub async fn execute<S: MailService>(service: &S, user_id: &str, request: MailRequest) -> MailResponse {
    debug!(?request, "dispatching mail request");

    match request {
        MailRequest::Import {
            origin,
            folder,
            limit,
        } => MailResponse::Imported {
            origin,
            result: service.import_recent(user_id, folder, limit).await,
        },
        MailRequest::List { seq, page } => MailResponse::Listed {
            seq,
            result: service
                .list(user_id, page.folder, &page.query, page.limit, page.skip)
                .await,
        },
        MailRequest::SetStar {
            ticket,
            email_id,
            message_id,
            starred,
        } => MailResponse::Starred {
            ticket,
            result: service.set_star(user_id, &message_id, starred).await,
            email_id,
            starred,
        },
        MailRequest::SetTrashed {
            ticket,
            email_id,
            message_id,
            trashed,
        } => MailResponse::Trashed {
            ticket,
            result: service.set_trashed(user_id, &message_id, trashed).await,
            email_id,
            trashed,
        },
        MailRequest::DismissAction { email_id } => MailResponse::ActionDismissed {
            result: service.dismiss_action(user_id, &email_id).await,
            email_id,
        },
        MailRequest::Send { payload } => MailResponse::Sent {
            result: service.send(user_id, payload).await,
        },
        MailRequest::AddToCalendar { email_id, event } => MailResponse::CalendarAdded {
            result: service.add_calendar_event(user_id, event).await,
            email_id,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail_service::MockMailService;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_execute_list_passes_page() {
        let mut mock = MockMailService::new();
        mock.expect_list()
            .with(eq("u1"), eq(Folder::Trash), eq("invoice"), eq(100), eq(200))
            .returning(|_, _, _, _, _| Box::pin(async { Ok(Vec::new()) }));

        let request = MailRequest::List {
            seq: 7,
            page: PageRequest {
                folder: Folder::Trash,
                query: "invoice".to_string(),
                limit: 100,
                skip: 200,
            },
        };

        match execute(&mock, "u1", request).await {
            MailResponse::Listed { seq, result } => {
                assert_eq!(seq, 7);
                assert!(result.unwrap().is_empty());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_trash_keeps_ticket_and_reports_failure() {
        let mut mock = MockMailService::new();
        mock.expect_set_trashed()
            .with(eq("u1"), eq("m9"), eq(true))
            .returning(|_, _, _| {
                Box::pin(async { Err(MailError::Unavailable("offline".to_string())) })
            });

        let request = MailRequest::SetTrashed {
            ticket: 3,
            email_id: "9".to_string(),
            message_id: "m9".to_string(),
            trashed: true,
        };

        match execute(&mock, "u1", request).await {
            MailResponse::Trashed {
                ticket,
                email_id,
                trashed,
                result,
            } => {
                assert_eq!(ticket, 3);
                assert_eq!(email_id, "9");
                assert!(trashed);
                assert!(result.is_err());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_add_to_calendar_reports_email() {
        let mut mock = MockMailService::new();
        mock.expect_add_calendar_event()
            .withf(|user_id, event| user_id == "u1" && event.title == "Exam")
            .returning(|_, _| Box::pin(async { Ok(CalendarLink::default()) }));

        let request = MailRequest::AddToCalendar {
            email_id: "e4".to_string(),
            event: CalendarEvent {
                title: "Exam".to_string(),
                start_time: "2026-12-12T09:00:00+00:00".to_string(),
                description: String::new(),
            },
        };

        match execute(&mock, "u1", request).await {
            MailResponse::CalendarAdded { email_id, result } => {
                assert_eq!(email_id, "e4");
                assert!(result.is_ok());
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
