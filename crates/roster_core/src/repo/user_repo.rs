//! User repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide keyed lookup, upsert and flush over canonical `users` storage.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Read paths reject invalid persisted state instead of masking it.
//! - A store-level unique violation on `users.username` surfaces as
//!   `RepoError::UniqueViolation`, never as a raw DB error.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::user::{User, UserId, UserStatus};
use chrono::NaiveDate;
use log::debug;
use rusqlite::{ffi, params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const USER_SELECT_SQL: &str = "SELECT
    id,
    name,
    username,
    password,
    birthday,
    creation_date,
    status,
    token
FROM users";

const REQUIRED_USER_COLUMNS: [&str; 8] = [
    "id",
    "name",
    "username",
    "password",
    "birthday",
    "creation_date",
    "status",
    "token",
];

const BIRTHDAY_FORMAT: &str = "%Y-%m-%d";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for user persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(UserId),
    UniqueViolation {
        column: &'static str,
    },
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "user not found: {id}"),
            Self::UniqueViolation { column } => {
                write!(f, "unique constraint violated on users.{column}")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted user data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} is older than required {expected_version}; open it through db::open_db"
            ),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        match unique_violation_column(&value) {
            Some(column) => Self::UniqueViolation { column },
            None => Self::Db(DbError::Sqlite(value)),
        }
    }
}

/// Repository interface consumed by the user service.
pub trait UserRepository {
    /// Returns every persisted user ordered by id.
    fn find_all(&self) -> RepoResult<Vec<User>>;
    fn find_by_id(&self, id: UserId) -> RepoResult<Option<User>>;
    fn find_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    /// Inserts a user without id (assigning one) or updates the row with
    /// the user's id. Returns the persisted record.
    fn save(&self, user: &User) -> RepoResult<User>;
    /// Forces pending writes of the current transaction to durable storage.
    fn flush(&self) -> RepoResult<()>;
}

/// SQLite-backed user repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// Accepts a `&Transaction` as well, through deref.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_user_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn insert(&self, user: &User) -> RepoResult<User> {
        self.conn.execute(
            "INSERT INTO users (
                name,
                username,
                password,
                birthday,
                creation_date,
                status,
                token
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                user.name.as_str(),
                user.username.as_str(),
                user.password.as_str(),
                user.birthday.map(birthday_to_db),
                user.creation_date,
                user.status.as_str(),
                user.token.as_str(),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!("event=user_insert module=repo status=ok user_id={id}");
        Ok(User {
            id: Some(id),
            ..user.clone()
        })
    }

    fn update(&self, id: UserId, user: &User) -> RepoResult<User> {
        let changed = self.conn.execute(
            "UPDATE users
             SET
                name = ?1,
                username = ?2,
                password = ?3,
                birthday = ?4,
                creation_date = ?5,
                status = ?6,
                token = ?7
             WHERE id = ?8;",
            params![
                user.name.as_str(),
                user.username.as_str(),
                user.password.as_str(),
                user.birthday.map(birthday_to_db),
                user.creation_date,
                user.status.as_str(),
                user.token.as_str(),
                id,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        debug!("event=user_update module=repo status=ok user_id={id}");
        Ok(user.clone())
    }

    fn find_one(&self, filter: &str, value: &dyn rusqlite::ToSql) -> RepoResult<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE {filter} = ?1;"))?;
        let mut rows = stmt.query(params![value])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_user_row(row)?));
        }
        Ok(None)
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn find_all(&self) -> RepoResult<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut users = Vec::new();

        while let Some(row) = rows.next()? {
            users.push(parse_user_row(row)?);
        }

        Ok(users)
    }

    fn find_by_id(&self, id: UserId) -> RepoResult<Option<User>> {
        self.find_one("id", &id)
    }

    fn find_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        self.find_one("username", &username)
    }

    fn save(&self, user: &User) -> RepoResult<User> {
        match user.id {
            Some(id) => self.update(id, user),
            None => self.insert(user),
        }
    }

    fn flush(&self) -> RepoResult<()> {
        self.conn.cache_flush()?;
        Ok(())
    }
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    let status_text: String = row.get("status")?;
    let status = UserStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{status_text}` in users.status"))
    })?;

    let birthday = match row.get::<_, Option<String>>("birthday")? {
        Some(value) => Some(NaiveDate::parse_from_str(&value, BIRTHDAY_FORMAT).map_err(
            |_| RepoError::InvalidData(format!("invalid date `{value}` in users.birthday")),
        )?),
        None => None,
    };

    Ok(User {
        id: Some(row.get("id")?),
        name: row.get("name")?,
        username: row.get("username")?,
        password: row.get("password")?,
        birthday,
        creation_date: row.get("creation_date")?,
        status,
        token: row.get("token")?,
    })
}

fn birthday_to_db(date: NaiveDate) -> String {
    date.format(BIRTHDAY_FORMAT).to_string()
}

fn unique_violation_column(err: &rusqlite::Error) -> Option<&'static str> {
    match err {
        rusqlite::Error::SqliteFailure(failure, Some(message))
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                && message.contains("users.username") =>
        {
            Some("username")
        }
        _ => None,
    }
}

fn ensure_user_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version < expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "users")? {
        return Err(RepoError::MissingRequiredTable("users"));
    }

    for column in REQUIRED_USER_COLUMNS {
        if !table_has_column(conn, "users", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "users",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
