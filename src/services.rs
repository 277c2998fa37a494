//! Data-access layer: task CRUD, membership-list upkeep and the activity log.
//!
//! Create, delete and restore touch several documents; each runs as a
//! [`Saga`] so a failed required step is compensated. Activity writes happen
//! after the required steps and are best-effort.

use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use mongodb::bson::{doc, from_document, to_bson, to_document, Bson, Document};
use serde::de::DeserializeOwned;

use crate::auth::Identity;
use crate::error::{Error, Result};
use crate::models::{
    ActivityAction, ActivityLogged, ActivityRecord, NewTask, Task, TaskStatus, TaskUpdate,
    TaskUpdateEcho, UserProfile,
};
use crate::saga::{Compensation, Saga};
use crate::store::{DocumentStore, ACTIVITY_LOGS, ID_FIELD, TASKS, USERS};

const MEMBERSHIP: &str = UserProfile::MEMBERSHIP_FIELD;

fn decode<T: DeserializeOwned>(doc: Document) -> Result<T> {
    Ok(from_document(doc)?)
}

fn task_missing(task_id: &str) -> impl FnOnce(Error) -> Error + '_ {
    move |e| if e.is_not_found() { Error::task_not_found(task_id) } else { e }
}

#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn DocumentStore>,
}

impl TaskService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Appends an activity record. Failures are logged and reported as
    /// `Dropped`, never as an error.
    pub async fn log_activity(
        &self,
        task_id: &str,
        user_id: &str,
        action: ActivityAction,
        changes: Document,
    ) -> ActivityLogged {
        let record = ActivityRecord {
            id: String::new(),
            task_id: task_id.to_string(),
            user_id: user_id.to_string(),
            action,
            changes,
            timestamp: self.store.server_timestamp(),
        };
        let mut doc = match to_document(&record) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Error encoding activity for task {}: {}", task_id, e);
                return ActivityLogged::Dropped;
            }
        };
        doc.remove(ID_FIELD);
        match self.store.insert(ACTIVITY_LOGS, doc).await {
            Ok(id) => ActivityLogged::Recorded(id),
            Err(e) => {
                warn!("Error logging {:?} activity for task {}: {}", action, task_id, e);
                ActivityLogged::Dropped
            }
        }
    }

    /// Returns the user record, creating it on first sign-in. Concurrent first
    /// sign-ins converge on one record; an existing record is never replaced.
    pub async fn ensure_user(&self, identity: &Identity) -> Result<UserProfile> {
        let profile = UserProfile {
            id: identity.user_id.clone(),
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
            photo: identity.photo_url.clone(),
            todo: Vec::new(),
        };
        if self.store.insert_if_absent(USERS, &profile.id, to_document(&profile)?).await? {
            info!("User registered: {}", profile.id);
        }
        self.get_user(&identity.user_id).await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<UserProfile> {
        match self.store.get(USERS, user_id).await? {
            Some(doc) => decode(doc),
            None => Err(Error::user_not_found(user_id)),
        }
    }

    /// Persists a new `pending` task, registers it in the owner's membership
    /// list, then logs `Created`.
    pub async fn create_task(&self, owner_id: &str, input: NewTask) -> Result<Task> {
        input.validate()?;
        if self.store.get(USERS, owner_id).await?.is_none() {
            return Err(Error::user_not_found(owner_id));
        }

        let mut task = Task {
            id: String::new(),
            owner_id: owner_id.to_string(),
            name: input.name.trim().to_string(),
            description: input.description,
            status: TaskStatus::Pending,
            category: input.category,
            due_date: input.due_date,
            attachment: input.attachment.filter(|a| !a.is_empty()),
            created_at: self.store.server_timestamp(),
            updated_at: None,
            deleted_at: None,
        };
        let mut doc = to_document(&task)?;
        doc.remove(ID_FIELD);

        let mut saga = Saga::new("create_task");
        let id = saga.run(self.store(), self.store.insert(TASKS, doc), None).await?;
        saga.record(Compensation::Delete { collection: TASKS, id: id.clone() });
        saga.run(
            self.store(),
            self.store.array_union(USERS, owner_id, MEMBERSHIP, Bson::from(id.as_str())),
            None,
        )
        .await?;

        self.log_activity(&id, owner_id, ActivityAction::Created, Document::new()).await;

        task.id = id;
        info!("Task created: {} for {}", task.id, owner_id);
        Ok(task)
    }

    /// Logs `Edited` with the change set, then writes only the given fields plus
    /// `updated_at`. The write refuses a task deleted in the meantime.
    /// Ownership is not checked here.
    pub async fn edit_task(
        &self,
        task_id: &str,
        user_id: &str,
        update: TaskUpdate,
    ) -> Result<TaskUpdateEcho> {
        update.validate()?;
        self.get_task_by_id(task_id).await?;

        let changes = to_document(&update)?;
        self.log_activity(task_id, user_id, ActivityAction::Edited, changes.clone()).await;

        let updated_at = Utc::now();
        let mut fields = changes;
        fields.insert("updated_at", to_bson(&updated_at)?);
        self.store
            .update_fields_unless(TASKS, task_id, "status", to_bson(&TaskStatus::Deleted)?, fields)
            .await
            .map_err(task_missing(task_id))
            .map_err(|e| {
                error!("Error updating task {}: {}", task_id, e);
                e
            })?;

        info!("Task updated: {}", task_id);
        Ok(TaskUpdateEcho { id: task_id.to_string(), changes: update, updated_at })
    }

    /// Soft delete: marks the task `deleted`, drops it from the owner's
    /// membership list, then logs `Deleted`.
    pub async fn delete_task(&self, task_id: &str, user_id: &str) -> Result<()> {
        let task = self.get_task_by_id(task_id).await?;
        let previous = doc! {
            "status": to_bson(&task.status)?,
            "deleted_at": Bson::Null,
        };
        let marked = doc! {
            "status": to_bson(&TaskStatus::Deleted)?,
            "deleted_at": to_bson(&self.store.server_timestamp())?,
        };

        let mut saga = Saga::new("delete_task");
        saga.run(
            self.store(),
            self.store.update_fields(TASKS, task_id, marked),
            Some(Compensation::RestoreFields {
                collection: TASKS,
                id: task_id.to_string(),
                fields: previous,
            }),
        )
        .await
        .map_err(task_missing(task_id))?;
        saga.run(
            self.store(),
            self.store.array_remove(USERS, &task.owner_id, MEMBERSHIP, Bson::from(task_id)),
            None,
        )
        .await?;

        self.log_activity(task_id, user_id, ActivityAction::Deleted, Document::new()).await;
        info!("Task deleted: {}", task_id);
        Ok(())
    }

    /// Brings a soft-deleted task back as `pending` and re-registers it.
    pub async fn restore_task(&self, task_id: &str, user_id: &str) -> Result<Task> {
        let task: Task = match self.store.get(TASKS, task_id).await? {
            Some(doc) => decode(doc)?,
            None => return Err(Error::task_not_found(task_id)),
        };
        if task.status != TaskStatus::Deleted {
            return Err(Error::Validation(format!("Task {} is not deleted", task_id)));
        }

        let previous = doc! {
            "status": to_bson(&TaskStatus::Deleted)?,
            "deleted_at": to_bson(&task.deleted_at)?,
            "updated_at": to_bson(&task.updated_at)?,
        };
        let restored = doc! {
            "status": to_bson(&TaskStatus::Pending)?,
            "deleted_at": Bson::Null,
            "updated_at": to_bson(&Utc::now())?,
        };

        let mut saga = Saga::new("restore_task");
        saga.run(
            self.store(),
            self.store.update_fields(TASKS, task_id, restored),
            Some(Compensation::RestoreFields {
                collection: TASKS,
                id: task_id.to_string(),
                fields: previous,
            }),
        )
        .await?;
        saga.run(
            self.store(),
            self.store.array_union(USERS, &task.owner_id, MEMBERSHIP, Bson::from(task_id)),
            None,
        )
        .await?;

        self.log_activity(task_id, user_id, ActivityAction::Restored, Document::new()).await;
        info!("Task restored: {}", task_id);
        self.get_task_by_id(task_id).await
    }

    /// Live tasks owned by `user_id`, in store order.
    pub async fn get_tasks_by_owner(&self, user_id: &str) -> Result<Vec<Task>> {
        let docs = self.store.find_eq(TASKS, doc! { "owner_id": user_id }).await?;
        let mut tasks = Vec::with_capacity(docs.len());
        for doc in docs {
            let task: Task = decode(doc)?;
            if task.status != TaskStatus::Deleted {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    /// Fails with not-found for unknown and soft-deleted ids alike.
    pub async fn get_task_by_id(&self, task_id: &str) -> Result<Task> {
        let doc = self
            .store
            .get(TASKS, task_id)
            .await?
            .ok_or_else(|| Error::task_not_found(task_id))?;
        let task: Task = decode(doc)?;
        if task.status == TaskStatus::Deleted {
            return Err(Error::task_not_found(task_id));
        }
        Ok(task)
    }

    /// All activity for a task, unordered. Callers sort for display.
    pub async fn get_activity_history(&self, task_id: &str) -> Result<Vec<ActivityRecord>> {
        let docs = self.store.find_eq(ACTIVITY_LOGS, doc! { "task_id": task_id }).await?;
        docs.into_iter().map(decode).collect()
    }

    pub async fn get_deleted_tasks(&self, user_id: &str) -> Result<Vec<Task>> {
        let filter = doc! {
            "owner_id": user_id,
            "status": to_bson(&TaskStatus::Deleted)?,
        };
        let docs = self.store.find_eq(TASKS, filter).await?;
        docs.into_iter().map(decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use crate::store::test_support::FlakyStore;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn identity(uid: &str) -> Identity {
        Identity {
            user_id: uid.to_string(),
            email: Some(format!("{}@example.com", uid)),
            display_name: Some(uid.to_uppercase()),
            photo_url: None,
        }
    }

    fn new_task(name: &str) -> NewTask {
        NewTask {
            name: name.to_string(),
            category: Category::Work,
            description: "quarterly numbers".to_string(),
            due_date: NaiveDate::from_ymd_opt(2024, 1, 5),
            attachment: None,
        }
    }

    async fn service_with_user(uid: &str) -> TaskService {
        let service = TaskService::new(Arc::new(MemoryStore::new()));
        service.ensure_user(&identity(uid)).await.unwrap();
        service
    }

    async fn flaky_service(uid: &str) -> (TaskService, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore::new());
        let service = TaskService::new(store.clone());
        service.ensure_user(&identity(uid)).await.unwrap();
        (service, store)
    }

    #[actix_web::test]
    async fn ensure_user_is_idempotent() {
        let service = service_with_user("u1").await;
        let created = service.create_task("u1", new_task("report")).await.unwrap();

        let again = service.ensure_user(&identity("u1")).await.unwrap();
        assert_eq!(again.todo, vec![created.id]);
        assert_eq!(again.email.as_deref(), Some("u1@example.com"));
    }

    #[actix_web::test]
    async fn concurrent_first_sign_ins_keep_one_record() {
        let service = TaskService::new(Arc::new(MemoryStore::new()));
        let (first, second) = (identity("u1"), identity("u1"));
        let (a, b) = futures::join!(
            service.ensure_user(&first),
            service.ensure_user(&second)
        );
        assert_eq!(a.unwrap(), b.unwrap());

        let task = service.create_task("u1", new_task("report")).await.unwrap();
        let late = Identity { email: Some("other@example.com".into()), ..identity("u1") };
        let profile = service.ensure_user(&late).await.unwrap();
        assert_eq!(profile.todo, vec![task.id]);
        assert_eq!(profile.email.as_deref(), Some("u1@example.com"));
    }

    #[actix_web::test]
    async fn created_task_reads_back_pending_with_input_fields() {
        let service = service_with_user("u1").await;
        let created = service.create_task("u1", new_task("report")).await.unwrap();

        let fetched = service.get_task_by_id(&created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.status, TaskStatus::Pending);
        assert_eq!(fetched.name, "report");
        assert_eq!(fetched.owner_id, "u1");
        assert_eq!(fetched.category, Category::Work);
        assert_eq!(fetched.due_date, NaiveDate::from_ymd_opt(2024, 1, 5));
        assert!(fetched.updated_at.is_none());
    }

    #[actix_web::test]
    async fn create_registers_membership_once_and_logs_created() {
        let service = service_with_user("u1").await;
        let task = service.create_task("u1", new_task("report")).await.unwrap();

        let user = service.get_user("u1").await.unwrap();
        assert_eq!(user.todo.iter().filter(|id| **id == task.id).count(), 1);

        let history = service.get_activity_history(&task.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, ActivityAction::Created);
        assert_eq!(history[0].user_id, "u1");
    }

    #[actix_web::test]
    async fn create_rejects_invalid_input_before_any_write() {
        let service = service_with_user("u1").await;
        let mut input = new_task("report");
        input.description = String::new();
        assert!(matches!(service.create_task("u1", input).await, Err(Error::Validation(_))));
        assert!(service.get_tasks_by_owner("u1").await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn create_for_unknown_owner_is_not_found() {
        let service = service_with_user("u1").await;
        let err = service.create_task("ghost", new_task("x")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[actix_web::test]
    async fn failed_membership_write_rolls_back_the_task() {
        let (service, store) = flaky_service("u1").await;
        store.fail_on("array_union", USERS, Some("u1"));

        let err = service.create_task("u1", new_task("report")).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        store.heal();
        assert!(service.get_tasks_by_owner("u1").await.unwrap().is_empty());
        assert!(service.get_user("u1").await.unwrap().todo.is_empty());
    }

    #[actix_web::test]
    async fn failed_rollback_surfaces_partial_failure() {
        let (service, store) = flaky_service("u1").await;
        store.fail_on("array_union", USERS, None);
        store.fail_on("delete", TASKS, None);

        let err = service.create_task("u1", new_task("report")).await.unwrap_err();
        assert!(matches!(err, Error::PartialFailure { operation: "create_task", .. }));
    }

    #[actix_web::test]
    async fn activity_failure_does_not_fail_the_operation() {
        let (service, store) = flaky_service("u1").await;
        store.fail_on("insert", ACTIVITY_LOGS, None);

        let task = service.create_task("u1", new_task("report")).await.unwrap();
        assert!(service.get_activity_history(&task.id).await.unwrap().is_empty());

        let logged = service
            .log_activity(&task.id, "u1", ActivityAction::Edited, Document::new())
            .await;
        assert_eq!(logged, ActivityLogged::Dropped);
    }

    #[actix_web::test]
    async fn status_edit_changes_only_status_and_stamp() {
        let service = service_with_user("u1").await;
        let before = service.create_task("u1", new_task("report")).await.unwrap();

        let update = TaskUpdate { status: Some(TaskStatus::Completed), ..Default::default() };
        let echo = service.edit_task(&before.id, "u1", update.clone()).await.unwrap();
        assert_eq!(echo.changes, update);

        let after = service.get_task_by_id(&before.id).await.unwrap();
        assert_eq!(after.status, TaskStatus::Completed);
        assert!(after.updated_at.is_some());
        assert_eq!(
            Task { status: before.status, updated_at: None, ..after.clone() },
            before
        );
    }

    #[actix_web::test]
    async fn edit_logs_change_set() {
        let service = service_with_user("u1").await;
        let task = service.create_task("u1", new_task("report")).await.unwrap();
        let update = TaskUpdate { name: Some("final report".into()), ..Default::default() };
        service.edit_task(&task.id, "u2", update).await.unwrap();

        let history = service.get_activity_history(&task.id).await.unwrap();
        let edited = history.iter().find(|r| r.action == ActivityAction::Edited).unwrap();
        assert_eq!(edited.user_id, "u2");
        assert_eq!(edited.changes, doc! { "name": "final report" });
    }

    #[actix_web::test]
    async fn edit_of_missing_task_is_not_found() {
        let service = service_with_user("u1").await;
        let update = TaskUpdate { name: Some("x".into()), ..Default::default() };
        assert!(service.edit_task("nope", "u1", update).await.unwrap_err().is_not_found());
    }

    #[actix_web::test]
    async fn edit_racing_a_delete_leaves_task_deleted() {
        let (service, store) = flaky_service("u1").await;
        let task = service.create_task("u1", new_task("report")).await.unwrap();
        service.get_task_by_id(&task.id).await.unwrap();

        // Another client deletes the task while the edit is logging its activity.
        store.interleave_before_insert(
            ACTIVITY_LOGS,
            TASKS,
            &task.id,
            doc! { "status": "deleted", "deleted_at": to_bson(&Utc::now()).unwrap() },
        );
        store
            .array_remove(USERS, "u1", MEMBERSHIP, Bson::from(task.id.as_str()))
            .await
            .unwrap();

        let update = TaskUpdate { status: Some(TaskStatus::Completed), ..Default::default() };
        let err = service.edit_task(&task.id, "u1", update).await.unwrap_err();
        assert!(err.is_not_found());

        assert!(service.get_task_by_id(&task.id).await.unwrap_err().is_not_found());
        assert!(service.get_tasks_by_owner("u1").await.unwrap().is_empty());
        let trash = service.get_deleted_tasks("u1").await.unwrap();
        assert_eq!(trash.len(), 1);
        assert_eq!(trash[0].status, TaskStatus::Deleted);
        assert!(trash[0].updated_at.is_none());
    }

    #[actix_web::test]
    async fn sequential_edits_log_non_decreasing_timestamps() {
        let service = service_with_user("u1").await;
        let task = service.create_task("u1", new_task("report")).await.unwrap();
        for status in [TaskStatus::InProgress, TaskStatus::Completed, TaskStatus::Pending] {
            let update = TaskUpdate { status: Some(status), ..Default::default() };
            service.edit_task(&task.id, "u1", update).await.unwrap();
        }

        let edits: Vec<ActivityRecord> = service
            .get_activity_history(&task.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.action == ActivityAction::Edited)
            .collect();
        assert_eq!(edits.len(), 3);
        assert!(edits.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[actix_web::test]
    async fn delete_hides_task_and_keeps_it_in_trash() {
        let service = service_with_user("u1").await;
        let task = service.create_task("u1", new_task("report")).await.unwrap();
        let keep = service.create_task("u1", new_task("keep")).await.unwrap();

        service.delete_task(&task.id, "u1").await.unwrap();

        assert!(service.get_task_by_id(&task.id).await.unwrap_err().is_not_found());
        let live = service.get_tasks_by_owner("u1").await.unwrap();
        assert_eq!(live.iter().map(|t| t.id.clone()).collect::<Vec<_>>(), vec![keep.id.clone()]);
        assert_eq!(service.get_user("u1").await.unwrap().todo, vec![keep.id]);

        let trash = service.get_deleted_tasks("u1").await.unwrap();
        assert_eq!(trash.len(), 1);
        assert_eq!(trash[0].id, task.id);
        assert!(trash[0].deleted_at.is_some());

        let actions: Vec<ActivityAction> = service
            .get_activity_history(&task.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.action)
            .collect();
        assert_eq!(actions, vec![ActivityAction::Created, ActivityAction::Deleted]);
    }

    #[actix_web::test]
    async fn deleting_twice_is_not_found() {
        let service = service_with_user("u1").await;
        let task = service.create_task("u1", new_task("report")).await.unwrap();
        service.delete_task(&task.id, "u1").await.unwrap();
        assert!(service.delete_task(&task.id, "u1").await.unwrap_err().is_not_found());
    }

    #[actix_web::test]
    async fn failed_membership_removal_restores_status() {
        let (service, store) = flaky_service("u1").await;
        let task = service.create_task("u1", new_task("report")).await.unwrap();
        store.fail_on("array_remove", USERS, Some("u1"));

        assert!(service.delete_task(&task.id, "u1").await.is_err());
        store.heal();
        let fetched = service.get_task_by_id(&task.id).await.unwrap();
        assert_eq!(fetched.status, TaskStatus::Pending);
        assert!(fetched.deleted_at.is_none());
        assert!(service.get_deleted_tasks("u1").await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn restore_brings_task_back_as_pending() {
        let service = service_with_user("u1").await;
        let task = service.create_task("u1", new_task("report")).await.unwrap();
        service
            .edit_task(
                &task.id,
                "u1",
                TaskUpdate { status: Some(TaskStatus::Completed), ..Default::default() },
            )
            .await
            .unwrap();
        service.delete_task(&task.id, "u1").await.unwrap();

        let restored = service.restore_task(&task.id, "u1").await.unwrap();
        assert_eq!(restored.status, TaskStatus::Pending);
        assert!(restored.deleted_at.is_none());
        assert_eq!(service.get_user("u1").await.unwrap().todo, vec![task.id.clone()]);
        assert!(service.get_deleted_tasks("u1").await.unwrap().is_empty());

        let err = service.restore_task(&task.id, "u1").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[actix_web::test]
    async fn failed_restore_rolls_back_every_field() {
        let (service, store) = flaky_service("u1").await;
        let task = service.create_task("u1", new_task("report")).await.unwrap();
        service.delete_task(&task.id, "u1").await.unwrap();
        let deleted = service.get_deleted_tasks("u1").await.unwrap().remove(0);
        store.fail_on("array_union", USERS, Some("u1"));

        assert!(service.restore_task(&task.id, "u1").await.is_err());
        store.heal();
        let after = service.get_deleted_tasks("u1").await.unwrap().remove(0);
        assert_eq!(after, deleted);
        assert!(after.updated_at.is_none());
        assert!(service.get_user("u1").await.unwrap().todo.is_empty());
    }

    #[actix_web::test]
    async fn history_outlives_deleted_task() {
        let service = service_with_user("u1").await;
        let task = service.create_task("u1", new_task("report")).await.unwrap();
        service.delete_task(&task.id, "u1").await.unwrap();
        assert_eq!(service.get_activity_history(&task.id).await.unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn owners_only_see_their_own_tasks() {
        let service = service_with_user("u1").await;
        service.ensure_user(&identity("u2")).await.unwrap();
        service.create_task("u1", new_task("mine")).await.unwrap();
        service.create_task("u2", new_task("theirs")).await.unwrap();

        let mine = service.get_tasks_by_owner("u1").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].name, "mine");
        assert!(service.get_deleted_tasks("u2").await.unwrap().is_empty());
    }
}
