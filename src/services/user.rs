//! User service
//!
//! Registration (the first account becomes admin), login, logout and
//! session validation.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{CreateUserInput, Session, User, UserRole};
use crate::services::password::{hash_password, verify_password};
use crate::services::validation::FormErrors;
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// The submitted form has field errors
    #[error("Validation error: {0}")]
    Validation(FormErrors),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Register a new account.
    ///
    /// The very first account is always an admin. Otherwise the requested
    /// role is used, except that admin can't be requested.
    ///
    /// # Errors
    ///
    /// - `Validation` for blank or malformed fields and taken username/email
    /// - `Internal` for database errors
    pub async fn register(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let mut errors = validate_register_input(&input);

        if !errors.contains("username")
            && self
                .user_repo
                .get_by_username(input.username.trim())
                .await
                .context("Failed to check username")?
                .is_some()
        {
            errors.add("username", "A user with that username already exists.");
        }

        if !errors.contains("email")
            && self
                .user_repo
                .get_by_email(input.email.trim())
                .await
                .context("Failed to check email")?
                .is_some()
        {
            errors.add("email", "A user with that email already exists.");
        }

        if !errors.is_empty() {
            return Err(UserServiceError::Validation(errors));
        }

        let role = if self.is_first_user().await? {
            UserRole::Admin
        } else {
            match input.role {
                Some(UserRole::Instructor) => UserRole::Instructor,
                _ => UserRole::Student,
            }
        };

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(
            input.username.trim().to_string(),
            input.email.trim().to_string(),
            password_hash,
            role,
        );

        let created = self.user_repo.create(&user).await.context("Failed to create user")?;
        tracing::info!("Registered user {} as {}", created.username, created.role);

        Ok(created)
    }

    /// Check credentials (username or email) and open a session
    pub async fn login(&self, username_or_email: &str, password: &str) -> Result<Session, UserServiceError> {
        let invalid = || {
            UserServiceError::AuthenticationError(
                "Please enter a correct username and password.".to_string(),
            )
        };

        let user = self
            .find_user_by_username_or_email(username_or_email.trim())
            .await?
            .ok_or_else(invalid)?;

        let valid = verify_password(password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            return Err(invalid());
        }

        self.create_session(user.id).await
    }

    /// Invalidate a session
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// User behind a session token, or `None` when the session is unknown
    /// or expired. Expired sessions are deleted on sight.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(session) => session,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.user_repo.get_by_id(id).await.context("Failed to get user by ID")?)
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        Ok(count == 0)
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    async fn find_user_by_username_or_email(&self, login: &str) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(login)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        Ok(self
            .user_repo
            .get_by_email(login)
            .await
            .context("Failed to get user by email")?)
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };

        Ok(self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?)
    }
}

fn validate_register_input(input: &CreateUserInput) -> FormErrors {
    let mut errors = FormErrors::new();

    errors.require("username", &input.username);
    errors.max_length("username", input.username.trim(), 150);
    if input
        .username
        .trim()
        .chars()
        .any(|c| !(c.is_alphanumeric() || "@.+-_".contains(c)))
    {
        errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }

    errors.require("email", &input.email);
    if !input.email.trim().is_empty() && !input.email.contains('@') {
        errors.add("email", "Enter a valid email address.");
    }

    if input.password.is_empty() {
        errors.add("password", "This field is required.");
    } else if input.password.chars().count() < 8 {
        errors.add("password", "This password is too short. It must contain at least 8 characters.");
    }

    errors
}
