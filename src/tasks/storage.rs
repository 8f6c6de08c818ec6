//! Task SQLite operations.
//!
//! Every transition is a single conditional UPDATE whose WHERE clause carries
//! the full guard, checked through `rows_affected` — two racing requests can
//! never both observe a stale `locked = false` and proceed.

use sqlx::SqlitePool;

use super::model::TaskRow;

/// Search filter for the admin task listing. All fields optional.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Case-insensitive title substring.
    pub search: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<String>,
}

/// Partial update; absent fields are untouched, never nulled.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdateFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<String>,
    pub due_date: Option<i64>,
}

/// Dashboard aggregates, computed from `status`/`due_date` directly — never
/// from `locked`, which lags for tasks nobody has touched since their due
/// date passed.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounts {
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub todo_tasks: i64,
    pub overdue_tasks: i64,
    pub users_with_todo_tasks: i64,
    pub pending_excuses: i64,
}

pub struct TaskStorage {
    pub(crate) pool: SqlitePool,
}

impl TaskStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_task(
        &self,
        title: &str,
        description: Option<&str>,
        priority: &str,
        due_date: i64,
        assigned_to: &str,
        created_by: &str,
    ) -> sqlx::Result<TaskRow> {
        let id = super::model::new_id();
        sqlx::query(
            "INSERT INTO tasks (id, title, description, priority, due_date, assigned_to, created_by) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(title)
        .bind(description)
        .bind(priority)
        .bind(due_date)
        .bind(assigned_to)
        .bind(created_by)
        .execute(&self.pool)
        .await?;
        self.get_task(&id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_task(&self, id: &str) -> sqlx::Result<Option<TaskRow>> {
        sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Fetch a task only if it belongs to `assignee` — callers cannot tell a
    /// missing task from someone else's.
    pub async fn get_task_owned(
        &self,
        id: &str,
        assignee: &str,
    ) -> sqlx::Result<Option<TaskRow>> {
        sqlx::query_as("SELECT * FROM tasks WHERE id = ? AND assigned_to = ?")
            .bind(id)
            .bind(assignee)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn list_for_assignee(&self, assignee: &str) -> sqlx::Result<Vec<TaskRow>> {
        sqlx::query_as("SELECT * FROM tasks WHERE assigned_to = ? ORDER BY due_date ASC")
            .bind(assignee)
            .fetch_all(&self.pool)
            .await
    }

    pub async fn search(&self, filter: &TaskFilter) -> sqlx::Result<Vec<TaskRow>> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT * FROM tasks WHERE 1=1");
        if let Some(s) = &filter.search {
            qb.push(" AND title LIKE ").push_bind(format!("%{s}%"));
        }
        if let Some(s) = &filter.status {
            qb.push(" AND status = ").push_bind(s.clone());
        }
        if let Some(p) = &filter.priority {
            qb.push(" AND priority = ").push_bind(p.clone());
        }
        if let Some(a) = &filter.assigned_to {
            qb.push(" AND assigned_to = ").push_bind(a.clone());
        }
        qb.push(" ORDER BY created_at DESC");
        qb.build_query_as::<TaskRow>().fetch_all(&self.pool).await
    }

    // ─── Transitions ────────────────────────────────────────────────────────

    /// Apply the auto-lock guard as one conditional write. Returns true when
    /// the lock was applied by this call.
    pub async fn sweep_lock(&self, id: &str, now: i64) -> sqlx::Result<bool> {
        let rows = sqlx::query(
            "UPDATE tasks SET locked = 1, updated_at = ? \
             WHERE id = ? AND status = 'Todo' AND locked = 0 \
               AND unlocked_by_admin = 0 AND due_date < ?",
        )
        .bind(now)
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Guarded completion: only an unlocked Todo task owned by `assignee`
    /// moves. Returns false when the guard rejected the write.
    pub async fn complete(&self, id: &str, assignee: &str, now: i64) -> sqlx::Result<bool> {
        let rows = sqlx::query(
            "UPDATE tasks SET status = 'Completed', updated_at = ? \
             WHERE id = ? AND assigned_to = ? AND status = 'Todo' AND locked = 0",
        )
        .bind(now)
        .bind(id)
        .bind(assignee)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Record an excuse and wipe any earlier adjudication, so stale admin
    /// commentary never reads as an answer to the new submission. Status
    /// stays Todo until the admin responds.
    pub async fn set_excuse(
        &self,
        id: &str,
        assignee: &str,
        excuse: &str,
        now: i64,
    ) -> sqlx::Result<bool> {
        let rows = sqlx::query(
            "UPDATE tasks SET excuse = ?, admin_response = NULL, \
             admin_response_message = NULL, updated_at = ? \
             WHERE id = ? AND assigned_to = ? AND status = 'Todo' AND locked = 0",
        )
        .bind(excuse)
        .bind(now)
        .bind(id)
        .bind(assignee)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Record the admin's disposition. The excuse-present guard rides in the
    /// WHERE clause, so a response can never exist without an excuse.
    pub async fn respond(
        &self,
        id: &str,
        response: &str,
        message: &str,
        new_status: &str,
        now: i64,
    ) -> sqlx::Result<bool> {
        let rows = sqlx::query(
            "UPDATE tasks SET admin_response = ?, admin_response_message = ?, \
             status = ?, updated_at = ? \
             WHERE id = ? AND excuse IS NOT NULL",
        )
        .bind(response)
        .bind(message)
        .bind(new_status)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Admin unlock: clears the lock and opts the task out of auto-locking
    /// for good.
    pub async fn unlock(&self, id: &str, now: i64) -> sqlx::Result<bool> {
        let rows = sqlx::query(
            "UPDATE tasks SET locked = 0, unlocked_by_admin = 1, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    pub async fn reassign(&self, id: &str, assignee: &str, now: i64) -> sqlx::Result<bool> {
        let rows = sqlx::query("UPDATE tasks SET assigned_to = ?, updated_at = ? WHERE id = ?")
            .bind(assignee)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    /// Partial field update; absent fields keep their value.
    pub async fn update_fields(
        &self,
        id: &str,
        fields: &TaskUpdateFields,
        now: i64,
    ) -> sqlx::Result<bool> {
        let rows = sqlx::query(
            "UPDATE tasks SET \
             title = COALESCE(?, title), \
             description = COALESCE(?, description), \
             priority = COALESCE(?, priority), \
             assigned_to = COALESCE(?, assigned_to), \
             due_date = COALESCE(?, due_date), \
             updated_at = ? \
             WHERE id = ?",
        )
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(&fields.priority)
        .bind(&fields.assigned_to)
        .bind(fields.due_date)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    pub async fn delete(&self, id: &str) -> sqlx::Result<bool> {
        let rows = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    /// Tasks awaiting adjudication: excuse present, no response yet.
    pub async fn pending_excuses(&self) -> sqlx::Result<Vec<TaskRow>> {
        sqlx::query_as(
            "SELECT * FROM tasks \
             WHERE excuse IS NOT NULL AND admin_response IS NULL \
             ORDER BY updated_at ASC",
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn dashboard_counts(&self, now: i64) -> sqlx::Result<TaskCounts> {
        let (total_tasks,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await?;
        let (completed_tasks,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status = 'Completed'")
                .fetch_one(&self.pool)
                .await?;
        let (todo_tasks,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status = 'Todo'")
                .fetch_one(&self.pool)
                .await?;
        let (overdue_tasks,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE status = 'Todo' AND due_date < ?")
                .bind(now)
                .fetch_one(&self.pool)
                .await?;
        let (users_with_todo_tasks,): (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT assigned_to) FROM tasks WHERE status = 'Todo'",
        )
        .fetch_one(&self.pool)
        .await?;
        let (pending_excuses,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks WHERE excuse IS NOT NULL AND admin_response IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(TaskCounts {
            total_tasks,
            completed_tasks,
            todo_tasks,
            overdue_tasks,
            users_with_todo_tasks,
            pending_excuses,
        })
    }
}
