//! Task lifecycle rules: authorization, validation, the auto-lock guard, and
//! notification dispatch, layered over [`TaskStorage`].

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::identity::{require_admin, Principal};
use crate::notify::{Notifier, NotifyEvent};
use crate::storage::Storage;

use super::model::{lock_due, AdminResponse, Priority, Status, TaskRow, MIN_EXCUSE_LEN};
use super::storage::{TaskCounts, TaskFilter, TaskStorage, TaskUpdateFields};

/// All fields optional at the wire level so a missing field surfaces as the
/// engine's own 400, not a deserialization rejection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<String>,
    /// Unix epoch seconds; must be in the future.
    pub due_date: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<String>,
    pub due_date: Option<i64>,
}

/// Admin dashboard aggregates: task counts plus the non-admin user count.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: i64,
    #[serde(flatten)]
    pub tasks: TaskCounts,
}

#[derive(Clone)]
pub struct TaskEngine {
    tasks: Arc<TaskStorage>,
    storage: Arc<Storage>,
    notifier: Notifier,
}

impl TaskEngine {
    pub fn new(tasks: Arc<TaskStorage>, storage: Arc<Storage>, notifier: Notifier) -> Self {
        Self {
            tasks,
            storage,
            notifier,
        }
    }

    // ─── Admin operations ───────────────────────────────────────────────────

    pub async fn create_task(
        &self,
        principal: &Principal,
        req: CreateTaskRequest,
    ) -> Result<TaskRow, EngineError> {
        require_admin(principal)?;

        let title = req.title.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let assigned_to = req.assigned_to.as_deref().filter(|a| !a.is_empty());
        let (Some(title), Some(assigned_to), Some(due_date)) =
            (title, assigned_to, req.due_date)
        else {
            return Err(EngineError::validation(
                "title, assignedTo and dueDate are required",
            ));
        };

        let priority = match req.priority.as_deref() {
            None => Priority::Medium,
            Some(p) => Priority::parse(p)
                .ok_or_else(|| EngineError::validation("invalid priority"))?,
        };
        let now = Utc::now().timestamp();
        if due_date <= now {
            return Err(EngineError::validation("due date must be in the future"));
        }
        if self.storage.get_user(assigned_to).await?.is_none() {
            return Err(EngineError::not_found("assigned user not found"));
        }

        let task = self
            .tasks
            .create_task(
                title,
                req.description.as_deref(),
                priority.as_str(),
                due_date,
                assigned_to,
                &principal.user_id,
            )
            .await?;

        self.notifier.send(
            NotifyEvent::new("task.assigned")
                .with_task(&task.id)
                .with_user(&task.assigned_to),
        );
        info!(task_id = %task.id, assigned_to = %task.assigned_to, "task created");
        Ok(task)
    }

    pub async fn update_task(
        &self,
        principal: &Principal,
        id: &str,
        req: UpdateTaskRequest,
    ) -> Result<TaskRow, EngineError> {
        require_admin(principal)?;

        let now = Utc::now().timestamp();
        if let Some(due) = req.due_date {
            if due <= now {
                return Err(EngineError::validation("due date must be in the future"));
            }
        }
        if let Some(p) = req.priority.as_deref() {
            Priority::parse(p).ok_or_else(|| EngineError::validation("invalid priority"))?;
        }

        let fields = TaskUpdateFields {
            title: req.title,
            description: req.description,
            priority: req.priority,
            assigned_to: req.assigned_to,
            due_date: req.due_date,
        };
        if !self.tasks.update_fields(id, &fields, now).await? {
            return Err(EngineError::not_found("task not found"));
        }
        self.tasks
            .get_task(id)
            .await?
            .ok_or_else(|| EngineError::not_found("task not found"))
    }

    pub async fn delete_task(&self, principal: &Principal, id: &str) -> Result<(), EngineError> {
        require_admin(principal)?;
        if !self.tasks.delete(id).await? {
            return Err(EngineError::not_found("task not found"));
        }
        Ok(())
    }

    pub async fn reassign_task(
        &self,
        principal: &Principal,
        id: &str,
        new_assignee: &str,
    ) -> Result<TaskRow, EngineError> {
        require_admin(principal)?;
        if new_assignee.is_empty() {
            return Err(EngineError::validation("assignedTo is required"));
        }
        if self.storage.get_user(new_assignee).await?.is_none() {
            return Err(EngineError::not_found("assigned user not found"));
        }
        let now = Utc::now().timestamp();
        if !self.tasks.reassign(id, new_assignee, now).await? {
            return Err(EngineError::not_found("task not found"));
        }
        self.notifier.send(
            NotifyEvent::new("task.reassigned")
                .with_task(id)
                .with_user(new_assignee),
        );
        self.tasks
            .get_task(id)
            .await?
            .ok_or_else(|| EngineError::not_found("task not found"))
    }

    pub async fn respond_excuse(
        &self,
        principal: &Principal,
        id: &str,
        response: &str,
        message: Option<&str>,
    ) -> Result<(), EngineError> {
        require_admin(principal)?;
        let response = AdminResponse::parse(response)
            .ok_or_else(|| EngineError::validation("invalid response"))?;

        let task = self
            .tasks
            .get_task(id)
            .await?
            .ok_or_else(|| EngineError::not_found("task not found"))?;
        if task.excuse.is_none() {
            return Err(EngineError::validation("no excuse to respond to"));
        }

        let now = Utc::now().timestamp();
        let applied = self
            .tasks
            .respond(
                id,
                response.as_str(),
                message.unwrap_or(""),
                response.resulting_status().as_str(),
                now,
            )
            .await?;
        if !applied {
            return Err(EngineError::validation("no excuse to respond to"));
        }

        self.notifier.send(
            NotifyEvent::new("excuse.responded")
                .with_task(id)
                .with_user(&task.assigned_to)
                .with_detail(response.as_str()),
        );
        info!(task_id = %id, response = response.as_str(), "excuse adjudicated");
        Ok(())
    }

    pub async fn unlock_task(&self, principal: &Principal, id: &str) -> Result<(), EngineError> {
        require_admin(principal)?;
        let now = Utc::now().timestamp();
        if !self.tasks.unlock(id, now).await? {
            return Err(EngineError::not_found("task not found"));
        }
        info!(task_id = %id, "task unlocked by admin");
        Ok(())
    }

    pub async fn search_tasks(
        &self,
        principal: &Principal,
        filter: TaskFilter,
    ) -> Result<Vec<TaskRow>, EngineError> {
        require_admin(principal)?;
        Ok(self.tasks.search(&filter).await?)
    }

    /// Excuse inbox: tasks awaiting adjudication.
    pub async fn excuse_inbox(&self, principal: &Principal) -> Result<Vec<TaskRow>, EngineError> {
        require_admin(principal)?;
        Ok(self.tasks.pending_excuses().await?)
    }

    pub async fn dashboard(&self, principal: &Principal) -> Result<DashboardStats, EngineError> {
        require_admin(principal)?;
        let now = Utc::now().timestamp();
        let tasks = self.tasks.dashboard_counts(now).await?;
        let total_users = self.storage.count_users_with_role("User").await?;
        Ok(DashboardStats { total_users, tasks })
    }

    // ─── Assignee operations ────────────────────────────────────────────────

    pub async fn my_tasks(&self, principal: &Principal) -> Result<Vec<TaskRow>, EngineError> {
        Ok(self.tasks.list_for_assignee(&principal.user_id).await?)
    }

    /// Admins may fetch any task; users only their own — a foreign task is
    /// indistinguishable from a missing one.
    pub async fn get_task(
        &self,
        principal: &Principal,
        id: &str,
    ) -> Result<TaskRow, EngineError> {
        let task = if principal.is_admin() {
            self.tasks.get_task(id).await?
        } else {
            self.tasks.get_task_owned(id, &principal.user_id).await?
        };
        task.ok_or_else(|| EngineError::not_found("task not found"))
    }

    pub async fn complete_task(
        &self,
        principal: &Principal,
        id: &str,
    ) -> Result<(), EngineError> {
        let now = Utc::now().timestamp();
        let task = self
            .tasks
            .get_task_owned(id, &principal.user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("task not found"))?;

        let locked = self.apply_lock_guard(&task, now).await;
        if locked {
            return Err(EngineError::forbidden("task is locked due to overdue"));
        }
        if task.status != Status::Todo.as_str() {
            return Err(EngineError::validation("task cannot be completed"));
        }

        if !self.tasks.complete(id, &principal.user_id, now).await? {
            return Err(self.classify_rejection(id, &principal.user_id).await);
        }

        self.notifier.send(
            NotifyEvent::new("task.completed")
                .with_task(id)
                .with_user(&principal.user_id),
        );
        Ok(())
    }

    pub async fn submit_excuse(
        &self,
        principal: &Principal,
        id: &str,
        excuse: &str,
    ) -> Result<(), EngineError> {
        let now = Utc::now().timestamp();
        let task = self
            .tasks
            .get_task_owned(id, &principal.user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("task not found"))?;

        // The lock sweep runs before the length check: an overdue task locks
        // on this touch even when the submission itself is rejected.
        let locked = self.apply_lock_guard(&task, now).await;

        if excuse.chars().count() < MIN_EXCUSE_LEN {
            return Err(EngineError::validation(
                "excuse must be at least 32 characters",
            ));
        }
        if locked {
            return Err(EngineError::forbidden("task is locked due to overdue"));
        }
        if task.status != Status::Todo.as_str() {
            return Err(EngineError::validation("cannot submit excuse"));
        }

        if !self
            .tasks
            .set_excuse(id, &principal.user_id, excuse, now)
            .await?
        {
            return Err(self.classify_rejection(id, &principal.user_id).await);
        }

        self.notifier.send(
            NotifyEvent::new("excuse.submitted")
                .with_task(id)
                .with_user(&principal.user_id),
        );
        Ok(())
    }

    // ─── Internals ──────────────────────────────────────────────────────────

    /// Evaluate and persist the auto-lock guard. Returns the task's effective
    /// locked state for this request: when persisting the lock fails, the
    /// request still treats the task as locked and the failure is logged for
    /// reconciliation.
    async fn apply_lock_guard(&self, task: &TaskRow, now: i64) -> bool {
        if task.locked {
            return true;
        }
        if !lock_due(task, now) {
            return false;
        }
        if let Err(e) = self.tasks.sweep_lock(&task.id, now).await {
            warn!(task_id = %task.id, err = %e, "failed to persist auto-lock");
        }
        true
    }

    /// A guarded write was rejected after our pre-checks passed — another
    /// request moved the task first. Re-read and classify.
    async fn classify_rejection(&self, id: &str, assignee: &str) -> EngineError {
        match self.tasks.get_task_owned(id, assignee).await {
            Ok(Some(task)) if task.locked => {
                EngineError::forbidden("task is locked due to overdue")
            }
            Ok(Some(_)) => EngineError::validation("task cannot be completed"),
            Ok(None) => EngineError::not_found("task not found"),
            Err(e) => EngineError::Internal(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifyConfig;
    use crate::identity::Role;
    use crate::storage::NewUser;

    async fn test_engine() -> (TaskEngine, Arc<Storage>) {
        let storage = Arc::new(Storage::in_memory().await.unwrap());
        let tasks = Arc::new(TaskStorage::new(storage.pool()));
        let notifier = crate::notify::spawn(NotifyConfig::default());
        (
            TaskEngine::new(tasks, storage.clone(), notifier),
            storage,
        )
    }

    async fn seed_user(storage: &Storage, name: &str, role: Role) -> Principal {
        let user = NewUser {
            id: uuid::Uuid::new_v4().to_string(),
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "phc".to_string(),
            security_question: "q?".to_string(),
            answer_hash: "phc".to_string(),
            role: role.as_str().to_string(),
            verify_token_hash: None,
            verify_token_expires: None,
        };
        storage.insert_user(&user, false).await.unwrap();
        Principal {
            user_id: user.id,
            role,
        }
    }

    fn in_one_hour() -> i64 {
        Utc::now().timestamp() + 3_600
    }

    fn task_req(title: &str, assigned_to: &str, due_date: i64) -> CreateTaskRequest {
        CreateTaskRequest {
            title: Some(title.to_string()),
            assigned_to: Some(assigned_to.to_string()),
            due_date: Some(due_date),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn non_admin_cannot_create() {
        let (engine, storage) = test_engine().await;
        let user = seed_user(&storage, "worker01", Role::User).await;
        let err = engine
            .create_task(&user, task_req("t", &user.user_id, in_one_hour()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[tokio::test]
    async fn create_requires_title_assignee_and_due_date() {
        let (engine, storage) = test_engine().await;
        let admin = seed_user(&storage, "admin001", Role::Admin).await;

        for req in [
            CreateTaskRequest::default(),
            CreateTaskRequest {
                title: Some("  ".into()),
                assigned_to: Some(admin.user_id.clone()),
                due_date: Some(in_one_hour()),
                ..Default::default()
            },
            CreateTaskRequest {
                title: Some("t".into()),
                assigned_to: Some(admin.user_id.clone()),
                due_date: None,
                ..Default::default()
            },
        ] {
            let err = engine.create_task(&admin, req).await.unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn create_rejects_past_due_date() {
        let (engine, storage) = test_engine().await;
        let admin = seed_user(&storage, "admin001", Role::Admin).await;
        let user = seed_user(&storage, "worker01", Role::User).await;
        let err = engine
            .create_task(
                &admin,
                task_req("t", &user.user_id, Utc::now().timestamp() - 86_400),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn create_rejects_unknown_assignee_and_bad_priority() {
        let (engine, storage) = test_engine().await;
        let admin = seed_user(&storage, "admin001", Role::Admin).await;

        let err = engine
            .create_task(&admin, task_req("t", "ghost", in_one_hour()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        let err = engine
            .create_task(
                &admin,
                CreateTaskRequest {
                    priority: Some("Urgent".into()),
                    ..task_req("t", &admin.user_id, in_one_hour())
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn complete_happy_path_keeps_lock_clear() {
        let (engine, storage) = test_engine().await;
        let admin = seed_user(&storage, "admin001", Role::Admin).await;
        let user = seed_user(&storage, "worker01", Role::User).await;

        let task = engine
            .create_task(
                &admin,
                CreateTaskRequest {
                    priority: Some("High".into()),
                    ..task_req("ship it", &user.user_id, in_one_hour())
                },
            )
            .await
            .unwrap();

        engine.complete_task(&user, &task.id).await.unwrap();
        let done = engine.get_task(&admin, &task.id).await.unwrap();
        assert_eq!(done.status, "Completed");
        assert!(!done.locked);
    }

    #[tokio::test]
    async fn short_excuse_rejected_but_lock_still_persists() {
        let (engine, storage) = test_engine().await;
        let admin = seed_user(&storage, "admin001", Role::Admin).await;
        let user = seed_user(&storage, "worker01", Role::User).await;

        let task = engine
            .create_task(&admin, task_req("late", &user.user_id, in_one_hour()))
            .await
            .unwrap();
        // Backdate the due date to make the task overdue.
        sqlx::query("UPDATE tasks SET due_date = 1 WHERE id = ?")
            .bind(&task.id)
            .execute(&storage.pool())
            .await
            .unwrap();

        let err = engine.submit_excuse(&user, &task.id, "short").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        // The lock side effect is observable even though the caller saw 400.
        let task = engine.get_task(&admin, &task.id).await.unwrap();
        assert!(task.locked);
    }

    #[tokio::test]
    async fn excuse_boundary_is_exactly_32_chars() {
        let (engine, storage) = test_engine().await;
        let admin = seed_user(&storage, "admin001", Role::Admin).await;
        let user = seed_user(&storage, "worker01", Role::User).await;

        let task = engine
            .create_task(&admin, task_req("t", &user.user_id, in_one_hour()))
            .await
            .unwrap();

        let err = engine
            .submit_excuse(&user, &task.id, &"x".repeat(31))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        engine
            .submit_excuse(&user, &task.id, &"x".repeat(32))
            .await
            .unwrap();
        let task = engine.get_task(&admin, &task.id).await.unwrap();
        assert_eq!(task.excuse.as_deref(), Some("x".repeat(32).as_str()));
        // Submission does not adjudicate.
        assert_eq!(task.status, "Todo");
    }

    #[tokio::test]
    async fn respond_requires_pending_excuse_and_admin() {
        let (engine, storage) = test_engine().await;
        let admin = seed_user(&storage, "admin001", Role::Admin).await;
        let user = seed_user(&storage, "worker01", Role::User).await;

        let task = engine
            .create_task(&admin, task_req("t", &user.user_id, in_one_hour()))
            .await
            .unwrap();

        let err = engine
            .respond_excuse(&admin, &task.id, "accepted", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        engine
            .submit_excuse(&user, &task.id, &"e".repeat(40))
            .await
            .unwrap();

        let err = engine
            .respond_excuse(&user, &task.id, "accepted", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));

        let err = engine
            .respond_excuse(&admin, &task.id, "maybe", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        engine
            .respond_excuse(&admin, &task.id, "accepted", Some("fair enough"))
            .await
            .unwrap();
        let task = engine.get_task(&admin, &task.id).await.unwrap();
        assert_eq!(task.status, "Excused");
        assert_eq!(task.admin_response.as_deref(), Some("accepted"));
    }
}
