use std::fmt::Write as _;

use crate::compose::Draft;
use crate::email::Folder;
use crate::notice::Severity;
use crate::session::{Intent, SessionSnapshot, SwipeEvent};

pub const HELP: &str = "\
commands:
  folder <name>            inbox, starred, sent, drafts, trash, spam, snoozed
  search <text>            debounced search (empty text clears)
  next | prev | page <n>   paging
  refresh | sync [limit]
  star <id> | unstar <id> | toggle <id>
  trash <id> | swipe <id> <distance>
  undo [notice] | dismiss <notice>
  done <id>                clear an action-required flag
  calendar <id>            add the flagged event to the calendar
  compose <to> | <subject> | <body>
  reply <id> | send | cancel
  help | quit";

/// Parses one command line from the line shell into intents. A swipe expands into its whole gesture.
pub fn parse_command(line: &str, snapshot: &SessionSnapshot) -> Result<Vec<Intent>, String> {
    let line = line.trim();
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let intent = match command {
        "" => return Ok(Vec::new()),
        "folder" => Intent::SetFolder(rest.parse::<Folder>()?),
        "search" => Intent::SearchInput(rest.to_string()),
        "next" => Intent::NextPage,
        "prev" => Intent::PrevPage,
        "page" => {
            let page: u32 = parse_arg(rest, "page number")?;
            Intent::SetPage(page.saturating_sub(1))
        }
        "refresh" => Intent::Refresh,
        "sync" if rest.is_empty() => Intent::Sync(None),
        "sync" => Intent::Sync(Some(parse_arg(rest, "limit")?)),
        "star" => Intent::Star(required(rest, "email id")?),
        "unstar" => Intent::Unstar(required(rest, "email id")?),
        "toggle" => Intent::ToggleStar(required(rest, "email id")?),
        "trash" => Intent::Trash(required(rest, "email id")?),
        "undo" if rest.is_empty() => {
            let notice = snapshot
                .engine
                .notices
                .iter()
                .rev()
                .find(|n| n.action_label.is_some())
                .ok_or("nothing to undo")?;
            Intent::Undo(notice.id)
        }
        "undo" => Intent::Undo(parse_arg(rest, "notice id")?),
        "dismiss" => Intent::DismissNotice(parse_arg(rest, "notice id")?),
        "done" => Intent::CompleteAction(required(rest, "email id")?),
        "calendar" => Intent::AddToCalendar(required(rest, "email id")?),
        "compose" => {
            let mut parts = rest.splitn(3, '|').map(str::trim);
            let to = parts.next().unwrap_or_default();
            let subject = parts.next().unwrap_or_default();
            let body = parts.next().unwrap_or_default();
            Intent::Compose(Draft::new(to, subject, body))
        }
        "reply" => Intent::Reply(required(rest, "email id")?),
        "send" => Intent::Send,
        "cancel" => Intent::CloseCompose,
        "swipe" => {
            let (email_id, distance) = rest.split_once(' ').ok_or("usage: swipe <id> <distance>")?;
            let distance: f32 = parse_arg(distance, "distance")?;
            return Ok(swipe_gesture(email_id.trim(), distance));
        }
        "quit" | "q" => Intent::Shutdown,
        other => return Err(format!("unknown command: {other} (try help)")),
    };
    Ok(vec![intent])
}

/// A leftward drag of `distance` pixels on one row
fn swipe_gesture(email_id: &str, distance: f32) -> Vec<Intent> {
    let start = 400.0;
    [
        SwipeEvent::Start(start),
        SwipeEvent::Move(start - distance / 2.0),
        SwipeEvent::Move(start - distance),
        SwipeEvent::End,
    ]
    .into_iter()
    .map(|event| Intent::Swipe {
        email_id: email_id.to_string(),
        event,
    })
    .collect()
}

fn required(value: &str, what: &str) -> Result<String, String> {
    if value.is_empty() {
        Err(format!("missing {what}"))
    } else {
        Ok(value.to_string())
    }
}

fn parse_arg<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, String> {
    value.parse().map_err(|_| format!("invalid {what}: {value:?}"))
}

/// Renders a snapshot as plain text
pub fn render(snapshot: &SessionSnapshot) -> String {
    let engine = &snapshot.engine;
    let mut out = String::new();

    let _ = write!(out, "[{}]", engine.view.folder);
    if !engine.view.query.is_empty() {
        let _ = write!(out, " \"{}\"", engine.view.query);
    }
    if engine.emails.is_empty() {
        out.push_str(" (empty)");
    } else {
        let _ = write!(out, " {}", engine.range_label);
    }
    if engine.has_next_page {
        out.push_str(" >");
    }
    if engine.loading {
        out.push_str(" loading...");
    }
    if engine.syncing {
        out.push_str(" syncing...");
    }
    if let Some(query) = &snapshot.pending_search {
        let _ = write!(out, " (typing \"{query}\")");
    }
    out.push('\n');

    if let Some(error) = &engine.last_error {
        let _ = writeln!(out, "! {error}");
    }
    if let Some(email) = &engine.action_banner {
        let title = email.event_title.as_deref().unwrap_or(&email.subject);
        let _ = writeln!(out, "ACTION REQUIRED: {title} ({})", email.id);
    }

    for email in &engine.emails {
        let star = if email.is_starred() { '*' } else { ' ' };
        let swipe = snapshot
            .swipes
            .iter()
            .find(|s| s.email_id == email.id)
            .map(|s| format!(" <{:.0}>", s.offset))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{star} {:<14} {:<24} {}{swipe}",
            email.id,
            truncate(email.sender_name(), 24),
            email.subject
        );
    }

    for notice in &engine.notices {
        let tag = match notice.severity {
            Severity::Info => "info",
            Severity::Success => "ok",
            Severity::Error => "error",
        };
        let _ = write!(out, "#{} [{tag}] {}", notice.id, notice.message);
        if let Some(label) = &notice.action_label {
            let _ = write!(out, " ({} {})", label.to_lowercase(), notice.id);
        }
        out.push('\n');
    }

    if let Some(compose) = &engine.compose {
        let status = if compose.sending { " sending..." } else { "" };
        let _ = writeln!(
            out,
            "draft to {:?}: {}{status}",
            compose.draft.to, compose.draft.subject
        );
        if let Some(error) = &compose.error {
            let _ = writeln!(out, "! {error}");
        }
    }

    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
