// src/task.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{NaiveDate, Utc};
use log::debug;
use serde::de::value::StringDeserializer;
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Deserializer, Serialize};

use crate::app_state::AppState;
use crate::auth::{current_identity, Identity};
use crate::error::{Error, Result};
use crate::models::{Category, NewTask, Task, TaskUpdate};
use crate::views::{
    BoardView, BulkDeleteReport, DueWindow, FailedDelete, ListView, SectionState, TaskCollection,
    TaskFilter,
};

/// `?category=` arrives as an empty string when no filter is set.
fn empty_as_none<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => {
            let de: StringDeserializer<D::Error> = raw.into_deserializer();
            T::deserialize(de).map(Some)
        }
        _ => Ok(None),
    }
}

/// Filter parameters shared by the list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub category: Option<Category>,
    #[serde(default)]
    pub due: DueWindow,
    /// Caller's calendar date. Defaults to the server's UTC date.
    #[serde(default, deserialize_with = "empty_as_none")]
    pub today: Option<NaiveDate>,
    /// Comma-separated open sections for `/tasks/list`.
    #[serde(default)]
    pub open: Option<String>,
}

impl TaskQuery {
    fn filter(&self) -> TaskFilter {
        TaskFilter { search: self.search.clone(), category: self.category, due: self.due }
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub task_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DeletedTask<'a> {
    id: &'a str,
    status: &'static str,
}

async fn filtered_tasks(
    data: &AppState,
    identity: &Identity,
    query: &TaskQuery,
) -> Result<Vec<Task>> {
    let tasks = data.tasks.get_tasks_by_owner(&identity.user_id).await?;
    Ok(query.filter().apply(&tasks, query.today()))
}

/// Not-found unless the caller owns the task. Soft-deleted tasks count when
/// `include_deleted` is set.
async fn ensure_owned(
    data: &AppState,
    identity: &Identity,
    task_id: &str,
    include_deleted: bool,
) -> Result<()> {
    match data.tasks.get_task_by_id(task_id).await {
        Ok(task) if task.owner_id == identity.user_id => return Ok(()),
        Ok(_) => return Err(Error::task_not_found(task_id)),
        Err(e) if e.is_not_found() && include_deleted => {}
        Err(e) => return Err(e),
    }
    let trash = data.tasks.get_deleted_tasks(&identity.user_id).await?;
    if trash.iter().any(|t| t.id == task_id) {
        Ok(())
    } else {
        Err(Error::task_not_found(task_id))
    }
}

/// GET /tasks
pub async fn list_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<TaskQuery>,
) -> Result<HttpResponse> {
    let identity = current_identity(&req)?;
    debug!("list_tasks for {} with {:?}", identity.user_id, query);
    let tasks = filtered_tasks(&data, &identity, &query).await?;
    Ok(HttpResponse::Ok().json(tasks))
}

/// GET /tasks/list
pub async fn list_view(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<TaskQuery>,
) -> Result<HttpResponse> {
    let identity = current_identity(&req)?;
    let state = SectionState::parse(query.open.as_deref().unwrap_or(""))?;
    let tasks = filtered_tasks(&data, &identity, &query).await?;
    Ok(HttpResponse::Ok().json(ListView::project(&tasks, &state)))
}

/// GET /tasks/board
pub async fn board_view(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<TaskQuery>,
) -> Result<HttpResponse> {
    let identity = current_identity(&req)?;
    let tasks = filtered_tasks(&data, &identity, &query).await?;
    Ok(HttpResponse::Ok().json(BoardView::project(&tasks)))
}

/// GET /tasks/deleted
pub async fn deleted_tasks(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse> {
    let identity = current_identity(&req)?;
    let tasks = data.tasks.get_deleted_tasks(&identity.user_id).await?;
    Ok(HttpResponse::Ok().json(tasks))
}

/// POST /tasks
pub async fn create_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<NewTask>,
) -> Result<HttpResponse> {
    let identity = current_identity(&req)?;
    let task = data.tasks.create_task(&identity.user_id, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(task))
}

/// GET /tasks/{task_id}
pub async fn get_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let identity = current_identity(&req)?;
    let task = data.tasks.get_task_by_id(&path).await?;
    if task.owner_id != identity.user_id {
        return Err(Error::task_not_found(&path));
    }
    Ok(HttpResponse::Ok().json(task))
}

/// PUT /tasks/{task_id}
pub async fn update_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<TaskUpdate>,
) -> Result<HttpResponse> {
    let identity = current_identity(&req)?;
    ensure_owned(&data, &identity, &path, false).await?;
    let echo = data
        .tasks
        .edit_task(&path, &identity.user_id, payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(echo))
}

/// DELETE /tasks/{task_id}
pub async fn delete_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let identity = current_identity(&req)?;
    ensure_owned(&data, &identity, &path, false).await?;
    data.tasks.delete_task(&path, &identity.user_id).await?;
    Ok(HttpResponse::Ok().json(DeletedTask { id: &path, status: "deleted" }))
}

/// POST /tasks/{task_id}/restore
pub async fn restore_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let identity = current_identity(&req)?;
    ensure_owned(&data, &identity, &path, true).await?;
    let task = data.tasks.restore_task(&path, &identity.user_id).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// GET /tasks/{task_id}/history
/// Oldest first.
pub async fn task_history(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let identity = current_identity(&req)?;
    ensure_owned(&data, &identity, &path, true).await?;
    let mut history = data.tasks.get_activity_history(&path).await?;
    history.sort_by_key(|record| record.timestamp);
    Ok(HttpResponse::Ok().json(history))
}

/// POST /tasks/bulk_delete
/// Ids the caller does not own are reported as failures without touching the store.
pub async fn bulk_delete(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<BulkDeleteRequest>,
) -> Result<HttpResponse> {
    let identity = current_identity(&req)?;
    if payload.task_ids.is_empty() {
        return Err(Error::Validation("No tasks selected for deletion".to_string()));
    }

    let owned = data.tasks.get_tasks_by_owner(&identity.user_id).await?;
    let mut collection = TaskCollection::new(owned);
    let mut unknown = Vec::new();
    for task_id in &payload.task_ids {
        let known = collection.tasks().iter().any(|t| &t.id == task_id);
        if !known {
            unknown.push(FailedDelete {
                task_id: task_id.clone(),
                error: Error::task_not_found(task_id).to_string(),
            });
        } else if !collection.is_checked(task_id) {
            collection.toggle_checked(task_id);
        }
    }

    let mut report = if collection.checked_count() > 0 {
        collection.delete_selected(&data.tasks, &identity.user_id).await?
    } else {
        BulkDeleteReport::default()
    };
    report.failed.extend(unknown);
    Ok(HttpResponse::Ok().json(report))
}
