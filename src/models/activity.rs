use chrono::{DateTime, Utc};
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityAction {
    Created,
    Edited,
    Deleted,
    Restored,
}

/// Append-only audit entry. Never updated or removed, so it may outlive its task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(rename = "_id", default)]
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    pub action: ActivityAction,
    #[serde(default)]
    pub changes: Document,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a best-effort activity write. A dropped entry never fails the
/// operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityLogged {
    Recorded(String),
    Dropped,
}
