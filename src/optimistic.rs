use crate::email::{Email, STARRED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalEdit {
    SetStar(bool),
    Remove,
    ClearAction,
}

/// Pre-image of a local edit, kept with the pending mutation and handed back
/// to [`revert`] if the server disagrees
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Starred { was: bool },
    /// `successors` are the ids that followed the email in the listing it was
    /// removed from, nearest first
    Removed {
        index: usize,
        email: Email,
        successors: Vec<String>,
    },
    ActionRequired { was: bool },
}

/// Applies `edit` to the email with `id`. Returns `None` if it is not in the collection.
pub fn apply(emails: &mut Vec<Email>, id: &str, edit: LocalEdit) -> Option<Snapshot> {
    let index = emails.iter().position(|e| e.id == id)?;

    let snapshot = match edit {
        LocalEdit::SetStar(starred) => {
            let email = &mut emails[index];
            let was = email.is_starred();
            email.set_label(STARRED, starred);
            Snapshot::Starred { was }
        }
        LocalEdit::Remove => return remove(emails, id, &[]),
        LocalEdit::ClearAction => {
            let email = &mut emails[index];
            let was = email.action_required;
            email.action_required = false;
            Snapshot::ActionRequired { was }
        }
    };
    Some(snapshot)
}

/// Removes the email with `id`, recording its neighbours from `layout` (the
/// ids of the last server listing). Emails the layout does not know about
/// take their neighbours from the collection itself.
pub fn remove(emails: &mut Vec<Email>, id: &str, layout: &[String]) -> Option<Snapshot> {
    let index = emails.iter().position(|e| e.id == id)?;

    let successors = match layout.iter().position(|l| l == id) {
        Some(at) => layout[at + 1..].to_vec(),
        None => emails[index + 1..].iter().map(|e| e.id.clone()).collect(),
    };

    Some(Snapshot::Removed {
        index,
        email: emails.remove(index),
        successors,
    })
}

/// Puts back what `snapshot` recorded for the email with `id`.
/// A removed email goes back in front of its nearest successor that is still
/// present, at the end if it had none, and otherwise at its old index clamped
/// to the current length. Nothing happens if it is already present.
pub fn revert(emails: &mut Vec<Email>, id: &str, snapshot: &Snapshot) {
    match snapshot {
        Snapshot::Starred { was } => {
            if let Some(email) = emails.iter_mut().find(|e| e.id == id) {
                email.set_label(STARRED, *was);
            }
        }
        Snapshot::Removed {
            index,
            email,
            successors,
        } => {
            if emails.iter().any(|e| e.id == id) {
                return;
            }
            let at = successors
                .iter()
                .find_map(|next| emails.iter().position(|e| &e.id == next))
                .unwrap_or(if successors.is_empty() {
                    emails.len()
                } else {
                    (*index).min(emails.len())
                });
            emails.insert(at, email.clone());
        }
        Snapshot::ActionRequired { was } => {
            if let Some(email) = emails.iter_mut().find(|e| e.id == id) {
                email.action_required = *was;
            }
        }
    }
}
