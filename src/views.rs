//! Client-side projections of a user's task collection: filtering, the
//! sectioned list, the three-column board, the per-row context menu and
//! bulk deletion of checked rows.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Category, Task, TaskStatus};
use crate::services::TaskService;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DueWindow {
    #[default]
    #[serde(alias = "")]
    Any,
    Today,
    /// `today ..= today + 6 days`
    ThisWeek,
}

impl DueWindow {
    pub fn contains(&self, due: Option<NaiveDate>, today: NaiveDate) -> bool {
        match (self, due) {
            (DueWindow::Any, _) => true,
            (_, None) => false,
            (DueWindow::Today, Some(date)) => date == today,
            (DueWindow::ThisWeek, Some(date)) => date >= today && date <= today + Duration::days(6),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    /// Case-insensitive substring of the task name.
    pub search: String,
    pub category: Option<Category>,
    pub due: DueWindow,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task, today: NaiveDate) -> bool {
        task.name.to_lowercase().contains(&self.search.to_lowercase())
            && self.category.map_or(true, |c| task.category == c)
            && self.due.contains(task.due_date, today)
    }

    pub fn apply(&self, tasks: &[Task], today: NaiveDate) -> Vec<Task> {
        tasks.iter().filter(|t| self.matches(t, today)).cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    Todo,
    InProgress,
    Completed,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Todo, Section::InProgress, Section::Completed];

    pub fn label(&self) -> &'static str {
        match self {
            Section::Todo => "todo",
            Section::InProgress => "inProgress",
            Section::Completed => "completed",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Section::Todo => "Todo",
            Section::InProgress => "In Progress",
            Section::Completed => "Completed",
        }
    }

    pub fn status(&self) -> TaskStatus {
        match self {
            Section::Todo => TaskStatus::Pending,
            Section::InProgress => TaskStatus::InProgress,
            Section::Completed => TaskStatus::Completed,
        }
    }

    fn select(&self, tasks: &[Task]) -> Vec<Task> {
        let status = self.status();
        tasks.iter().filter(|t| t.status == status).cloned().collect()
    }
}

/// Which list sections are expanded. All start collapsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionState {
    open: HashSet<Section>,
}

impl SectionState {
    /// Parses a comma-separated list of open sections, e.g. `todo,inProgress`.
    pub fn parse(labels: &str) -> Result<Self> {
        let mut state = SectionState::default();
        for label in labels.split(',').map(str::trim).filter(|l| !l.is_empty()) {
            let section = Section::ALL
                .into_iter()
                .find(|s| s.label() == label)
                .ok_or_else(|| Error::Validation(format!("Unknown section '{}'", label)))?;
            if !state.is_open(section) {
                state.toggle(section);
            }
        }
        Ok(state)
    }

    pub fn toggle(&mut self, section: Section) {
        if !self.open.remove(&section) {
            self.open.insert(section);
        }
    }

    pub fn is_open(&self, section: Section) -> bool {
        self.open.contains(&section)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListSection {
    pub section: Section,
    pub title: &'static str,
    pub open: bool,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListView {
    pub sections: Vec<ListSection>,
}

impl ListView {
    pub fn project(tasks: &[Task], state: &SectionState) -> Self {
        let sections = Section::ALL
            .into_iter()
            .map(|section| ListSection {
                section,
                title: section.title(),
                open: state.is_open(section),
                tasks: section.select(tasks),
            })
            .collect();
        ListView { sections }
    }

    pub fn section(&self, section: Section) -> Option<&ListSection> {
        self.sections.iter().find(|s| s.section == section)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardColumn {
    pub section: Section,
    pub title: &'static str,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardView {
    pub columns: Vec<BoardColumn>,
}

impl BoardView {
    pub fn project(tasks: &[Task]) -> Self {
        let columns = Section::ALL
            .into_iter()
            .map(|section| BoardColumn {
                section,
                title: section.title(),
                tasks: section.select(tasks),
            })
            .collect();
        BoardView { columns }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Edit,
    Delete,
}

/// Context menu across all rows. At most one row is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowMenu {
    open: Option<String>,
}

impl RowMenu {
    pub fn toggle(&mut self, task_id: &str) {
        if self.open.as_deref() == Some(task_id) {
            self.open = None;
        } else {
            self.open = Some(task_id.to_string());
        }
    }

    /// Picks an entry from the open menu and closes it.
    pub fn select(&mut self, action: MenuAction) -> Option<(MenuAction, String)> {
        self.open.take().map(|id| (action, id))
    }

    pub fn open_row(&self) -> Option<&str> {
        self.open.as_deref()
    }

    pub fn is_open(&self, task_id: &str) -> bool {
        self.open_row() == Some(task_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkDeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<FailedDelete>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedDelete {
    pub task_id: String,
    pub error: String,
}

/// A fetched task collection plus the rows the user has checked.
#[derive(Debug, Clone, Default)]
pub struct TaskCollection {
    tasks: Vec<Task>,
    checked: HashSet<String>,
}

impl TaskCollection {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks, checked: HashSet::new() }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn toggle_checked(&mut self, task_id: &str) {
        if !self.checked.remove(task_id) {
            self.checked.insert(task_id.to_string());
        }
    }

    pub fn is_checked(&self, task_id: &str) -> bool {
        self.checked.contains(task_id)
    }

    pub fn checked_count(&self) -> usize {
        self.checked.len()
    }

    /// Local removal after a single successful delete.
    pub fn remove(&mut self, task_id: &str) {
        self.tasks.retain(|t| t.id != task_id);
        self.checked.remove(task_id);
    }

    /// Deletes every checked task concurrently and waits for all of them.
    /// Successes leave the collection; failures stay in it and stay checked.
    pub async fn delete_selected(
        &mut self,
        service: &TaskService,
        user_id: &str,
    ) -> Result<BulkDeleteReport> {
        if self.checked.is_empty() {
            return Err(Error::Validation("No tasks selected for deletion".to_string()));
        }
        let mut ids: Vec<String> = self.checked.iter().cloned().collect();
        ids.sort();

        let results = join_all(ids.into_iter().map(|id| async move {
            let outcome = service.delete_task(&id, user_id).await;
            (id, outcome)
        }))
        .await;

        let mut report = BulkDeleteReport::default();
        for (id, outcome) in results {
            match outcome {
                Ok(()) => {
                    self.remove(&id);
                    report.deleted.push(id);
                }
                Err(e) => {
                    warn!("Bulk delete of {} failed: {}", id, e);
                    report.failed.push(FailedDelete { task_id: id, error: e.to_string() });
                }
            }
        }
        info!(
            "Bulk delete for {}: {} deleted, {} failed",
            user_id,
            report.deleted.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
