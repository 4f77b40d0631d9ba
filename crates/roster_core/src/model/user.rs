//! User domain model.
//!
//! # Responsibility
//! - Define the persisted `User` record and its caller-facing inputs.
//! - Own the patch merge rules used by partial updates.
//!
//! # Invariants
//! - `id` is assigned by the store and never changes afterwards.
//! - `creation_date`, initial `status` and `token` are server-assigned.
//! - A patch only overwrites fields that are present.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Store-assigned user identifier.
pub type UserId = i64;

/// Presence state of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Online,
    Offline,
}

impl UserStatus {
    /// Stable lowercase label used for storage and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    /// Parses a storage label. Case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

/// Canonical user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// `None` until the store persists the record.
    pub id: Option<UserId>,
    pub name: String,
    /// Unique across all persisted users.
    pub username: String,
    /// Opaque, stored as given.
    pub password: String,
    pub birthday: Option<NaiveDate>,
    /// Unix epoch milliseconds.
    pub creation_date: i64,
    pub status: UserStatus,
    /// Opaque authentication token.
    pub token: String,
}

/// Candidate record for user creation.
///
/// Server-assigned fields (`token`, `status`, `creation_date`) are not part of
/// this shape, so a caller cannot smuggle them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
}

impl NewUser {
    pub fn new(name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            username: username.into(),
            password: String::new(),
            birthday: None,
        }
    }
}

/// Partial update input.
///
/// `None` means "not supplied". For `birthday`, `Some(None)` clears the
/// stored date, while a missing JSON key leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub birthday: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl UserPatch {
    /// Returns whether no field is supplied.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.birthday.is_none()
            && self.status.is_none()
            && self.token.is_none()
    }

    /// Merges supplied fields into `user`, leaving absent ones untouched.
    pub fn apply_to(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(username) = &self.username {
            user.username = username.clone();
        }
        if let Some(password) = &self.password {
            user.password = password.clone();
        }
        if let Some(birthday) = self.birthday {
            user.birthday = birthday;
        }
        if let Some(status) = self.status {
            user.status = status;
        }
        if let Some(token) = &self.token {
            user.token = token.clone();
        }
    }
}

// A present key (even `null`) maps to `Some(..)`; `#[serde(default)]` covers
// the missing-key case.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
