//! Accounts and authentication.
//!
//! Registration (first-admin-wins), opaque bearer tokens with a 1 h TTL,
//! email-verification tokens, and the security-question password-reset flow.
//! Passwords and security answers are stored as argon2id PHC strings; bearer
//! and verification tokens are stored as SHA-256 hex digests — the clear
//! value is handed out once and never persisted.

pub mod validate;

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::DaemonConfig;
use crate::error::EngineError;
use crate::notify::{Notifier, NotifyEvent};
use crate::storage::{NewUser, Storage, UserRow, UserUpdate};

const DEFAULT_SECURITY_QUESTION: &str = "What is your favorite color?";
const DEFAULT_ANSWER: &str = "default";

// ─── Principal ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::User => "User",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Admin" => Some(Role::Admin),
            "User" => Some(Role::User),
            _ => None,
        }
    }
}

/// The authenticated caller, as seen by the task engine.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ─── Requests ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub security_question: String,
    pub answer: String,
    /// Optional; "Admin" is honored only while no admin exists.
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub security_question: Option<String>,
    pub answer: Option<String>,
}

/// Admin user creation; question/answer fall back to fixed defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub security_question: Option<String>,
    pub answer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub role: Role,
    pub expires_at: i64,
}

// ─── Hashing helpers ─────────────────────────────────────────────────────────

fn hash_secret(secret: &str) -> Result<String, EngineError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| EngineError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

fn verify_secret(secret: &str, phc: &str) -> bool {
    PasswordHash::new(phc)
        .map(|parsed| {
            Argon2::default()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// SHA-256 hex digest used for at-rest token storage.
fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Opaque 32-character hex token (UUID v4 without dashes).
fn new_token() -> String {
    Uuid::new_v4().to_string().replace('-', "")
}

// ─── Identity service ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Identity {
    storage: Arc<Storage>,
    config: Arc<DaemonConfig>,
    notifier: Notifier,
}

impl Identity {
    pub fn new(storage: Arc<Storage>, config: Arc<DaemonConfig>, notifier: Notifier) -> Self {
        Self {
            storage,
            config,
            notifier,
        }
    }

    /// Register a new account.
    ///
    /// `role = "Admin"` is accepted only while no admin row exists; the guard
    /// is a conditional insert, so racing first registrations serialize at
    /// the store. Dispatches a `user.registered` event carrying the
    /// email-verification link.
    pub async fn register(&self, req: RegisterRequest) -> Result<(String, Role), EngineError> {
        validate::username(&req.username)?;
        validate::email(&req.email)?;
        validate::password(&req.password)?;
        validate::security_question(&req.security_question)?;
        validate::answer(&req.answer)?;

        let username = req.username.to_lowercase();
        if self
            .storage
            .username_or_email_taken(&username, &req.email)
            .await?
        {
            return Err(EngineError::conflict(
                "user with this email or username already exists",
            ));
        }

        let wants_admin = match req.role.as_deref() {
            None | Some("User") => false,
            Some("Admin") => true,
            Some(_) => return Err(EngineError::validation("invalid role")),
        };
        let role = if wants_admin { Role::Admin } else { Role::User };

        let verify_token = new_token();
        let now = Utc::now().timestamp();
        let user = NewUser {
            id: Uuid::new_v4().to_string(),
            username: username.clone(),
            email: req.email.clone(),
            password_hash: hash_secret(&req.password)?,
            security_question: req.security_question.clone(),
            answer_hash: hash_secret(&req.answer)?,
            role: role.as_str().to_string(),
            verify_token_hash: Some(token_digest(&verify_token)),
            verify_token_expires: Some(now + self.config.auth.verify_token_ttl_secs),
        };

        let inserted = self.storage.insert_user(&user, wants_admin).await?;
        if !inserted {
            return Err(EngineError::forbidden("admin registration is disabled"));
        }

        let link = format!(
            "{}/api/v1/auth/verify-email?token={verify_token}",
            self.config.public_base_url()
        );
        self.notifier.send(
            NotifyEvent::new("user.registered")
                .with_user(&user.id)
                .with_link(link),
        );
        info!(username = %username, role = role.as_str(), "user registered");

        Ok((user.id, role))
    }

    /// Flip `verified` for the user holding this token, if unexpired.
    pub async fn verify_email(&self, token: &str) -> Result<(), EngineError> {
        let now = Utc::now().timestamp();
        if self
            .storage
            .verify_email(&token_digest(token), now)
            .await?
        {
            Ok(())
        } else {
            Err(EngineError::validation(
                "invalid or expired verification token",
            ))
        }
    }

    /// Exchange credentials for a bearer token.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, EngineError> {
        let user = self
            .storage
            .get_user_by_username(&username.to_lowercase())
            .await?
            .ok_or_else(|| EngineError::unauthorized("invalid credentials"))?;

        if !verify_secret(password, &user.password_hash) {
            return Err(EngineError::unauthorized("invalid credentials"));
        }

        let role = Role::parse(&user.role)
            .ok_or_else(|| EngineError::Internal(anyhow::anyhow!("unknown role {}", user.role)))?;

        let token = new_token();
        let expires_at = Utc::now().timestamp() + self.config.auth.token_ttl_secs;
        self.storage
            .insert_auth_token(&token_digest(&token), &user.id, expires_at)
            .await?;

        Ok(LoginOutcome {
            token,
            role,
            expires_at,
        })
    }

    /// Resolve a bearer token to a principal. 401 on anything unknown or
    /// expired — the caller cannot distinguish the two.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, EngineError> {
        let now = Utc::now().timestamp();
        let user = self
            .storage
            .user_for_token(&token_digest(token), now)
            .await?
            .ok_or_else(|| EngineError::unauthorized("invalid token"))?;
        let role = Role::parse(&user.role)
            .ok_or_else(|| EngineError::Internal(anyhow::anyhow!("unknown role {}", user.role)))?;
        Ok(Principal {
            user_id: user.id,
            role,
        })
    }

    // ─── Password reset ─────────────────────────────────────────────────────

    pub async fn security_question(&self, username: &str) -> Result<String, EngineError> {
        let user = self
            .storage
            .get_user_by_username(&username.to_lowercase())
            .await?
            .ok_or_else(|| EngineError::not_found("user not found"))?;
        Ok(user.security_question)
    }

    pub async fn reset_password(
        &self,
        username: &str,
        answer: &str,
        new_password: &str,
    ) -> Result<(), EngineError> {
        validate::password(new_password)?;

        let user = self
            .storage
            .get_user_by_username(&username.to_lowercase())
            .await?
            .ok_or_else(|| EngineError::not_found("user not found"))?;

        if !verify_secret(answer, &user.answer_hash) {
            return Err(EngineError::unauthorized("wrong answer"));
        }

        self.storage
            .set_password_hash(&user.id, &hash_secret(new_password)?)
            .await?;
        info!(username = %user.username, "password reset");
        Ok(())
    }

    // ─── Profile self-service ───────────────────────────────────────────────

    pub async fn profile(&self, user_id: &str) -> Result<UserRow, EngineError> {
        self.storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user not found"))
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        req: UpdateProfileRequest,
    ) -> Result<(), EngineError> {
        let mut update = UserUpdate::default();

        if let Some(username) = req.username {
            validate::username(&username)?;
            update.username = Some(username.to_lowercase());
        }
        if let Some(email) = req.email {
            validate::email(&email)?;
            update.email = Some(email);
        }
        if let Some(password) = req.password {
            validate::password(&password)?;
            update.password_hash = Some(hash_secret(&password)?);
        }
        if let Some(question) = req.security_question {
            validate::security_question(&question)?;
            update.security_question = Some(question);
        }
        if let Some(answer) = req.answer {
            validate::answer(&answer)?;
            update.answer_hash = Some(hash_secret(&answer)?);
        }

        if !self.storage.update_user(user_id, &update).await? {
            return Err(EngineError::not_found("user not found"));
        }
        Ok(())
    }

    pub async fn delete_account(&self, user_id: &str) -> Result<(), EngineError> {
        if !self.storage.delete_user(user_id).await? {
            return Err(EngineError::not_found("user not found"));
        }
        info!(user_id = %user_id, "account deleted");
        Ok(())
    }

    // ─── Admin user management ──────────────────────────────────────────────

    pub async fn search_users(
        &self,
        principal: &Principal,
        search: Option<&str>,
        role: Option<&str>,
    ) -> Result<Vec<UserRow>, EngineError> {
        require_admin(principal)?;
        Ok(self.storage.search_users(search, role).await?)
    }

    pub async fn get_user(
        &self,
        principal: &Principal,
        user_id: &str,
    ) -> Result<UserRow, EngineError> {
        require_admin(principal)?;
        self.storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user not found"))
    }

    /// Admin-created account: no verification email, fixed fallbacks for the
    /// security question, and any role except a second admin.
    pub async fn create_user(
        &self,
        principal: &Principal,
        req: CreateUserRequest,
    ) -> Result<UserRow, EngineError> {
        require_admin(principal)?;
        validate::username(&req.username)?;
        validate::email(&req.email)?;
        validate::password(&req.password)?;

        let username = req.username.to_lowercase();
        if self
            .storage
            .username_or_email_taken(&username, &req.email)
            .await?
        {
            return Err(EngineError::conflict(
                "user with this email or username already exists",
            ));
        }

        let role = match req.role.as_deref() {
            None | Some("User") => Role::User,
            Some("Admin") => return Err(EngineError::forbidden("admin registration is disabled")),
            Some(_) => return Err(EngineError::validation("invalid role")),
        };

        let user = NewUser {
            id: Uuid::new_v4().to_string(),
            username,
            email: req.email,
            password_hash: hash_secret(&req.password)?,
            security_question: req
                .security_question
                .unwrap_or_else(|| DEFAULT_SECURITY_QUESTION.to_string()),
            answer_hash: hash_secret(req.answer.as_deref().unwrap_or(DEFAULT_ANSWER))?,
            role: role.as_str().to_string(),
            verify_token_hash: None,
            verify_token_expires: None,
        };
        self.storage.insert_user(&user, false).await?;

        self.storage
            .get_user(&user.id)
            .await?
            .ok_or_else(|| EngineError::Internal(anyhow::anyhow!("user not found after insert")))
    }

    pub async fn delete_user(
        &self,
        principal: &Principal,
        user_id: &str,
    ) -> Result<(), EngineError> {
        require_admin(principal)?;
        if !self.storage.delete_user(user_id).await? {
            return Err(EngineError::not_found("user not found"));
        }
        Ok(())
    }
}

/// Guard shared with the task engine.
pub fn require_admin(principal: &Principal) -> Result<(), EngineError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(EngineError::forbidden("admin access required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_hash_and_verify() {
        let phc = hash_secret("Str0ng!pass").unwrap();
        assert!(phc.starts_with("$argon2"));
        assert!(verify_secret("Str0ng!pass", &phc));
        assert!(!verify_secret("wrong", &phc));
        assert!(!verify_secret("Str0ng!pass", "not-a-phc-string"));
    }

    #[test]
    fn token_digest_is_stable_hex() {
        let a = token_digest("token");
        assert_eq!(a, token_digest("token"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, token_digest("other"));
    }

    #[test]
    fn tokens_are_opaque_hex() {
        let t = new_token();
        assert_eq!(t.len(), 32);
        assert!(t.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
