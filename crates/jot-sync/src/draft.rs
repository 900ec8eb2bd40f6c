use jot_api::{Instant, NOTES, Priority, RecordFields, RecordPatch};
use jot_core::{JotError, JotResult};
use serde::{Deserialize, Serialize};

/// A record the user is about to create; the remote store assigns its id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub due_date: Option<Instant>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub subtasks: Vec<String>,
}

impl RecordDraft {
    pub fn task(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn note(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Owner and creation time are stamped here, never taken from the caller.
    pub fn into_fields(self, user_id: &str, collection: &str) -> RecordFields {
        let timestamp = (collection == NOTES).then(Instant::now);
        RecordFields {
            user_id: user_id.to_string(),
            title: self.title.trim().to_string(),
            description: self.description,
            content: self.content,
            due_date: self.due_date,
            priority: self.priority,
            subtasks: self
                .subtasks
                .into_iter()
                .map(|subtask| subtask.trim().to_string())
                .filter(|subtask| !subtask.is_empty())
                .collect(),
            timestamp,
        }
    }
}

pub fn validate_draft(collection: &str, draft: &RecordDraft) -> JotResult<()> {
    if draft.title.trim().is_empty() {
        return Err(JotError::validation("title is required"));
    }

    if collection == NOTES && draft.content.trim().is_empty() {
        return Err(JotError::validation("note content is required"));
    }

    Ok(())
}

pub fn validate_patch(collection: &str, patch: &RecordPatch) -> JotResult<()> {
    if patch.is_empty() {
        return Err(JotError::usage("nothing to update; pass at least one field"));
    }

    if let Some(title) = &patch.title
        && title.trim().is_empty()
    {
        return Err(JotError::validation("title cannot be empty"));
    }

    if collection == NOTES
        && let Some(content) = &patch.content
        && content.trim().is_empty()
    {
        return Err(JotError::validation("note content cannot be empty"));
    }

    Ok(())
}
