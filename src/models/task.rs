use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    /// Soft-deleted. The record stays in the store.
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Personal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    /// Reference to an uploaded file (URL or storage key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Request payload for creating a task
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub category: Category,
    pub description: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub attachment: Option<String>,
}

impl NewTask {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Task name is required".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(Error::Validation("Task description is required".to_string()));
        }
        Ok(())
    }
}

/// Partial update. Only fields that are `Some` get written, and the same
/// serialized form is what the activity log records as the change set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.category.is_none()
            && self.due_date.is_none()
            && self.attachment.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::Validation("No fields to update".to_string()));
        }
        if self.status == Some(TaskStatus::Deleted) {
            return Err(Error::Validation(
                "Use the delete operation to remove a task".to_string(),
            ));
        }
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(Error::Validation("Task name cannot be empty".to_string()));
        }
        if matches!(&self.description, Some(d) if d.trim().is_empty()) {
            return Err(Error::Validation("Task description cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// What an edit hands back: the applied changes plus the stamp written with them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskUpdateEcho {
    pub id: String,
    #[serde(flatten)]
    pub changes: TaskUpdate,
    pub updated_at: DateTime<Utc>,
}
