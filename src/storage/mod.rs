//! SQLite-backed storage: connection pool, migrations, user and token rows.
//!
//! Task rows live in [`crate::tasks::storage::TaskStorage`], which shares this
//! pool. The user-delete cascade lives here because it spans both tables.

use anyhow::{Context as _, Result};
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub security_question: String,
    pub answer_hash: String,
    pub role: String,
    pub verified: bool,
    /// SHA-256 hex digest of the emailed verification token.
    pub verify_token_hash: Option<String>,
    pub verify_token_expires: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Insert payload for a new user. Hashes are computed by the identity layer —
/// clear secrets never reach storage.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub security_question: String,
    pub answer_hash: String,
    pub role: String,
    pub verify_token_hash: Option<String>,
    pub verify_token_expires: Option<i64>,
}

/// Partial profile update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub security_question: Option<String>,
    pub answer_hash: Option<String>,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding it
    /// are logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("taskd.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory storage for tests. Single connection — every pooled
    /// connection to `:memory:` would otherwise get its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    /// Used to create TaskStorage sharing the same SQLite connection.
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("src/storage/migrations")
            .run(pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    // ─── Users ──────────────────────────────────────────────────────────────

    /// Insert a user row. When `first_admin_only` is set, the insert only
    /// succeeds while no Admin row exists — a single conditional statement, so
    /// concurrent first-registration attempts serialize at the store.
    /// Returns false when the guard rejected the insert.
    pub async fn insert_user(
        &self,
        user: &NewUser,
        first_admin_only: bool,
    ) -> sqlx::Result<bool> {
        let rows = if first_admin_only {
            sqlx::query(
                "INSERT INTO users \
                 (id, username, email, password_hash, security_question, answer_hash, role, \
                  verify_token_hash, verify_token_expires) \
                 SELECT ?, ?, ?, ?, ?, ?, ?, ?, ? \
                 WHERE NOT EXISTS (SELECT 1 FROM users WHERE role = 'Admin')",
            )
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.security_question)
            .bind(&user.answer_hash)
            .bind(&user.role)
            .bind(&user.verify_token_hash)
            .bind(user.verify_token_expires)
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                "INSERT INTO users \
                 (id, username, email, password_hash, security_question, answer_hash, role, \
                  verify_token_hash, verify_token_expires) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.security_question)
            .bind(&user.answer_hash)
            .bind(&user.role)
            .bind(&user.verify_token_hash)
            .bind(user.verify_token_expires)
            .execute(&self.pool)
            .await?
            .rows_affected()
        };
        Ok(rows > 0)
    }

    pub async fn get_user(&self, id: &str) -> sqlx::Result<Option<UserRow>> {
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn get_user_by_username(&self, username: &str) -> sqlx::Result<Option<UserRow>> {
        sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
    }

    /// Duplicate pre-check for registration.
    pub async fn username_or_email_taken(
        &self,
        username: &str,
        email: &str,
    ) -> sqlx::Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT id FROM users WHERE username = ? OR email = ? LIMIT 1")
                .bind(username)
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Case-insensitive substring search over username/email, optional role
    /// filter. SQLite LIKE is case-insensitive for ASCII.
    pub async fn search_users(
        &self,
        search: Option<&str>,
        role: Option<&str>,
    ) -> sqlx::Result<Vec<UserRow>> {
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("SELECT * FROM users WHERE 1=1");
        if let Some(s) = search {
            let pattern = format!("%{s}%");
            qb.push(" AND (username LIKE ")
                .push_bind(pattern.clone())
                .push(" OR email LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(r) = role {
            qb.push(" AND role = ").push_bind(r.to_string());
        }
        qb.push(" ORDER BY created_at ASC");
        qb.build_query_as::<UserRow>().fetch_all(&self.pool).await
    }

    pub async fn count_users_with_role(&self, role: &str) -> sqlx::Result<i64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = ?")
            .bind(role)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Partial update; absent fields are untouched.
    pub async fn update_user(&self, id: &str, update: &UserUpdate) -> sqlx::Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let rows = sqlx::query(
            "UPDATE users SET \
             username = COALESCE(?, username), \
             email = COALESCE(?, email), \
             password_hash = COALESCE(?, password_hash), \
             security_question = COALESCE(?, security_question), \
             answer_hash = COALESCE(?, answer_hash), \
             updated_at = ? \
             WHERE id = ?",
        )
        .bind(&update.username)
        .bind(&update.email)
        .bind(&update.password_hash)
        .bind(&update.security_question)
        .bind(&update.answer_hash)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    pub async fn set_password_hash(&self, id: &str, password_hash: &str) -> sqlx::Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let rows = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    /// Flip `verified` if the token digest matches and has not expired.
    pub async fn verify_email(&self, token_hash: &str, now: i64) -> sqlx::Result<bool> {
        let rows = sqlx::query(
            "UPDATE users SET verified = 1, verify_token_hash = NULL, verify_token_expires = NULL \
             WHERE verify_token_hash = ? AND verify_token_expires >= ?",
        )
        .bind(token_hash)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    /// Delete a user and everything that hangs off them: auth tokens and all
    /// tasks assigned to them. Returns false when the user did not exist.
    pub async fn delete_user(&self, id: &str) -> sqlx::Result<bool> {
        sqlx::query("DELETE FROM auth_tokens WHERE user_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE assigned_to = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let rows = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    // ─── Auth tokens ────────────────────────────────────────────────────────

    pub async fn insert_auth_token(
        &self,
        token_hash: &str,
        user_id: &str,
        expires_at: i64,
    ) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO auth_tokens (token_hash, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(token_hash)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Resolve a token digest to its user, ignoring expired tokens.
    pub async fn user_for_token(
        &self,
        token_hash: &str,
        now: i64,
    ) -> sqlx::Result<Option<UserRow>> {
        sqlx::query_as(
            "SELECT u.* FROM users u \
             JOIN auth_tokens t ON t.user_id = u.id \
             WHERE t.token_hash = ? AND t.expires_at >= ?",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
    }

    /// Drop expired tokens. Called from a background sweep.
    pub async fn prune_expired_tokens(&self, now: i64) -> sqlx::Result<u64> {
        Ok(sqlx::query("DELETE FROM auth_tokens WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(name: &str, role: &str) -> NewUser {
        NewUser {
            id: uuid::Uuid::new_v4().to_string(),
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "phc".to_string(),
            security_question: "favorite color?".to_string(),
            answer_hash: "phc".to_string(),
            role: role.to_string(),
            verify_token_hash: None,
            verify_token_expires: None,
        }
    }

    #[tokio::test]
    async fn first_admin_guard_rejects_second_admin() {
        let s = Storage::in_memory().await.unwrap();
        let first = sample_user("admin1", "Admin");
        let second = sample_user("admin2", "Admin");
        assert!(s.insert_user(&first, true).await.unwrap());
        assert!(!s.insert_user(&second, true).await.unwrap());
        // Plain users are unaffected by the guard.
        assert!(s.insert_user(&sample_user("user1", "User"), false).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_username_is_a_constraint_error() {
        let s = Storage::in_memory().await.unwrap();
        assert!(s.insert_user(&sample_user("bob", "User"), false).await.unwrap());
        let mut dup = sample_user("bob", "User");
        dup.email = "other@example.com".to_string();
        let err = s.insert_user(&dup, false).await.unwrap_err();
        match err {
            sqlx::Error::Database(db) => assert!(db.is_unique_violation()),
            other => panic!("expected database error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn token_roundtrip_and_expiry() {
        let s = Storage::in_memory().await.unwrap();
        let u = sample_user("carol", "User");
        s.insert_user(&u, false).await.unwrap();

        s.insert_auth_token("digest-1", &u.id, 1_000).await.unwrap();
        assert!(s.user_for_token("digest-1", 999).await.unwrap().is_some());
        assert!(s.user_for_token("digest-1", 1_001).await.unwrap().is_none());
        assert!(s.user_for_token("unknown", 0).await.unwrap().is_none());

        assert_eq!(s.prune_expired_tokens(2_000).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_user_cascades_to_tasks_and_tokens() {
        let s = Storage::in_memory().await.unwrap();
        let u = sample_user("dave", "User");
        s.insert_user(&u, false).await.unwrap();
        s.insert_auth_token("digest-2", &u.id, i64::MAX).await.unwrap();
        sqlx::query(
            "INSERT INTO tasks (id, title, due_date, assigned_to, created_by) \
             VALUES ('t1', 'title', 99, ?, 'admin')",
        )
        .bind(&u.id)
        .execute(&s.pool)
        .await
        .unwrap();

        assert!(s.delete_user(&u.id).await.unwrap());
        assert!(s.get_user(&u.id).await.unwrap().is_none());
        let (tasks,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
            .fetch_one(&s.pool)
            .await
            .unwrap();
        assert_eq!(tasks, 0);
        assert!(s.user_for_token("digest-2", 0).await.unwrap().is_none());
    }
}
