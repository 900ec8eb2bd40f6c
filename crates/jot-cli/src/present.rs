use jot_api::{Instant, Record};
use serde::Serialize;
use std::cmp::Ordering;

use crate::SortKey;

/// Flattened record for output; dates are rendered as RFC 3339.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RecordView {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    pub due: Option<String>,
    pub priority: String,
    pub subtasks: Vec<String>,
    pub created_at: Option<String>,
}

impl From<&Record> for RecordView {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            title: record.fields.title.clone(),
            description: record.fields.description.clone(),
            content: record.fields.content.clone(),
            due: record.fields.due_date.and_then(render_instant),
            priority: record.fields.priority.as_str().to_string(),
            subtasks: record.fields.subtasks.clone(),
            created_at: record.fields.timestamp.and_then(render_instant),
        }
    }
}

pub(crate) fn views(records: &[Record]) -> Vec<RecordView> {
    records.iter().map(RecordView::from).collect()
}

/// Stable sort; records without a due date always go last.
pub(crate) fn sort_records(records: &mut [Record], key: Option<SortKey>, descending: bool) {
    let Some(key) = key else {
        if descending {
            records.reverse();
        }
        return;
    };

    records.sort_by(|left, right| match key {
        SortKey::Due => match (left.fields.due_date, right.fields.due_date) {
            (Some(a), Some(b)) => directed(a.cmp(&b), descending),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortKey::Priority => directed(
            left.fields.priority.cmp(&right.fields.priority),
            descending,
        ),
    });
}

fn directed(ordering: Ordering, descending: bool) -> Ordering {
    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}

fn render_instant(instant: Instant) -> Option<String> {
    instant.to_datetime().map(|value| value.to_rfc3339())
}

pub(crate) fn print_record_lines(records: &[Record]) {
    if records.is_empty() {
        println!("  (empty)");
        return;
    }

    for record in records {
        let mut line = format!("  {}  {}", record.id, record.fields.title);
        if record.fields.priority != jot_api::Priority::None {
            line.push_str(&format!("  [{}]", record.fields.priority.as_str()));
        }
        if let Some(due) = record
            .fields
            .due_date
            .and_then(Instant::to_datetime)
        {
            line.push_str(&format!("  due {}", due.format("%Y-%m-%d")));
        }
        println!("{line}");

        if !record.fields.content.is_empty() {
            println!("      {}", record.fields.content);
        }
        for subtask in &record.fields.subtasks {
            println!("      - {subtask}");
        }
    }
}
