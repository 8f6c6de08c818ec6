//! Task data model types and the lock-evaluation guard.

use serde::{Deserialize, Serialize};

/// Generate a new ULID string.
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Minimum excuse length, in characters.
pub const MIN_EXCUSE_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Todo,
    Completed,
    Excused,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Todo => "Todo",
            Status::Completed => "Completed",
            Status::Excused => "Excused",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Todo" => Some(Status::Todo),
            "Completed" => Some(Status::Completed),
            "Excused" => Some(Status::Excused),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Low" => Some(Priority::Low),
            "Medium" => Some(Priority::Medium),
            "High" => Some(Priority::High),
            _ => None,
        }
    }
}

/// The admin's disposition of a submitted excuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminResponse {
    Accepted,
    Declined,
}

impl AdminResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminResponse::Accepted => "accepted",
            AdminResponse::Declined => "declined",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "accepted" => Some(AdminResponse::Accepted),
            "declined" => Some(AdminResponse::Declined),
            _ => None,
        }
    }

    /// The status an adjudication leaves the task in: accepted excuses the
    /// task, declined sends it back to the assignee.
    pub fn resulting_status(&self) -> Status {
        match self {
            AdminResponse::Accepted => Status::Excused,
            AdminResponse::Declined => Status::Todo,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: String,
    pub status: String,
    /// Unix epoch seconds.
    pub due_date: i64,
    pub locked: bool,
    pub unlocked_by_admin: bool,
    pub assigned_to: String,
    pub created_by: String,
    pub excuse: Option<String>,
    pub admin_response: Option<String>,
    pub admin_response_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The auto-lock guard: true when a task must be locked before any
/// user-initiated transition is considered.
///
/// Evaluated lazily at the start of every user-facing mutation — there is no
/// background scheduler, so staleness is bounded by the interval between
/// client actions. Once an admin has unlocked a task it never re-locks.
pub fn lock_due(task: &TaskRow, now: i64) -> bool {
    task.due_date < now
        && task.status == Status::Todo.as_str()
        && !task.unlocked_by_admin
        && !task.locked
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn task(due_date: i64, status: Status, locked: bool, unlocked_by_admin: bool) -> TaskRow {
        TaskRow {
            id: new_id(),
            title: "t".to_string(),
            description: None,
            priority: Priority::Medium.as_str().to_string(),
            status: status.as_str().to_string(),
            due_date,
            locked,
            unlocked_by_admin,
            assigned_to: "u1".to_string(),
            created_by: "a1".to_string(),
            excuse: None,
            admin_response: None,
            admin_response_message: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn locks_only_overdue_todo() {
        assert!(lock_due(&task(99, Status::Todo, false, false), 100));
        assert!(!lock_due(&task(100, Status::Todo, false, false), 100)); // not yet overdue
        assert!(!lock_due(&task(99, Status::Completed, false, false), 100));
        assert!(!lock_due(&task(99, Status::Excused, false, false), 100));
    }

    #[test]
    fn admin_unlock_is_permanent() {
        assert!(!lock_due(&task(0, Status::Todo, false, true), i64::MAX));
    }

    #[test]
    fn adjudication_statuses() {
        assert_eq!(AdminResponse::Accepted.resulting_status(), Status::Excused);
        assert_eq!(AdminResponse::Declined.resulting_status(), Status::Todo);
    }

    proptest! {
        // An admin-unlocked task never trips the guard, whatever its dates.
        #[test]
        fn unlocked_by_admin_never_relocks(due in i64::MIN..i64::MAX, now in i64::MIN..i64::MAX) {
            prop_assert!(!lock_due(&task(due, Status::Todo, false, true), now));
        }

        // The guard fires exactly when the due date has passed on an
        // untouched Todo task.
        #[test]
        fn guard_matches_overdue(due in -1_000_000i64..1_000_000, now in -1_000_000i64..1_000_000) {
            let fired = lock_due(&task(due, Status::Todo, false, false), now);
            prop_assert_eq!(fired, due < now);
        }
    }
}
