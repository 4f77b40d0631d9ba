//! User use-case service.
//!
//! # Responsibility
//! - Enforce user lifecycle rules: server-assigned fields at creation,
//!   username uniqueness, merge semantics on update.
//! - Delegate persistence to repository implementations.
//!
//! # Invariants
//! - `create_user` never persists when the username is already taken.
//! - `update_user` never writes when the target user does not exist.
//! - Service layer remains storage-agnostic.

use crate::db::DbError;
use crate::model::user::{NewUser, User, UserId, UserPatch, UserStatus};
use crate::repo::user_repo::{RepoError, UserRepository};
use chrono::Utc;
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Service error for user use-cases.
#[derive(Debug)]
pub enum UserServiceError {
    /// Target user does not exist.
    NotFound(UserId),
    /// A unique field value is already held by another user.
    Conflict { field: &'static str },
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for UserServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "user with id {id} not found"),
            Self::Conflict { field } => write!(
                f,
                "the {field} provided is not unique; the user could not be saved"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for UserServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for UserServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::UniqueViolation { column } => Self::Conflict { field: column },
            other => Self::Repo(other),
        }
    }
}

// Raised by the unit of work when opening or committing its transaction.
impl From<DbError> for UserServiceError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

pub type ServiceResult<T> = Result<T, UserServiceError>;

/// User service facade over repository implementations.
pub struct UserService<R: UserRepository> {
    repo: R,
}

impl<R: UserRepository> UserService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Returns all persisted users. No filtering, no pagination.
    pub fn get_users(&self) -> ServiceResult<Vec<User>> {
        Ok(self.repo.find_all()?)
    }

    /// Returns the user with `id`, or `NotFound`.
    pub fn get_user_by_id(&self, id: UserId) -> ServiceResult<User> {
        self.repo
            .find_by_id(id)?
            .ok_or(UserServiceError::NotFound(id))
    }

    /// Creates a user from a candidate record.
    ///
    /// # Contract
    /// - Assigns a fresh random token, `Offline` status and the current time
    ///   as creation date.
    /// - Fails with `Conflict { field: "username" }` when the username is
    ///   taken; nothing is written in that case.
    /// - Returns the persisted record including the store-assigned id.
    pub fn create_user(&self, candidate: NewUser) -> ServiceResult<User> {
        let user = User {
            id: None,
            name: candidate.name,
            username: candidate.username,
            password: candidate.password,
            birthday: candidate.birthday,
            creation_date: Utc::now().timestamp_millis(),
            status: UserStatus::Offline,
            token: Uuid::new_v4().to_string(),
        };

        self.ensure_username_free(&user.username, None)?;

        let created = self.repo.save(&user)?;
        self.repo.flush()?;

        info!(
            "event=user_create module=service status=ok user_id={}",
            created.id.map_or_else(|| "none".to_string(), |id| id.to_string())
        );
        Ok(created)
    }

    /// Applies a partial update to an existing user.
    ///
    /// # Contract
    /// - Fails with `NotFound` (no write) when `id` does not exist.
    /// - Only fields present in `patch` are overwritten.
    /// - A username change is re-checked for uniqueness against other users.
    /// - An empty patch is a no-op once the user is known to exist.
    pub fn update_user(&self, id: UserId, patch: &UserPatch) -> ServiceResult<()> {
        let mut user = self.get_user_by_id(id)?;
        if patch.is_empty() {
            debug!(
                "event=user_update module=service status=skipped reason=empty_patch user_id={id}"
            );
            return Ok(());
        }

        if let Some(username) = patch.username.as_deref() {
            if username != user.username {
                self.ensure_username_free(username, Some(id))?;
            }
        }

        patch.apply_to(&mut user);
        self.repo.save(&user)?;
        self.repo.flush()?;

        debug!("event=user_update module=service status=ok user_id={id}");
        Ok(())
    }

    fn ensure_username_free(&self, username: &str, owner: Option<UserId>) -> ServiceResult<()> {
        match self.repo.find_by_username(username)? {
            Some(existing) if existing.id != owner => {
                warn!(
                    "event=username_conflict module=service status=rejected existing_user_id={}",
                    existing
                        .id
                        .map_or_else(|| "none".to_string(), |id| id.to_string())
                );
                Err(UserServiceError::Conflict { field: "username" })
            }
            _ => Ok(()),
        }
    }
}
