//! Command line front end for the Roster user store.
//!
//! # Responsibility
//! - Resolve store/logging configuration from flags and environment.
//! - Run each command as one unit of work over `roster_core::UserService`.
//! - Print results as JSON on stdout.

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::info;
use roster_core::db::{open_db, with_read_unit_of_work, with_unit_of_work};
use roster_core::{
    default_log_level, init_logging, NewUser, ServiceResult, SqliteUserRepository, UserId,
    UserPatch, UserService,
};
use rusqlite::Transaction;
use std::path::PathBuf;

const DEFAULT_DB_FILE_NAME: &str = "roster.sqlite3";

#[derive(Parser)]
#[command(name = "roster")]
#[command(about = "Minimal user management store", long_about = None)]
struct Cli {
    /// SQLite database file (defaults to a file in the system temp dir)
    #[arg(long, env = "ROSTER_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Log level: trace|debug|info|warn|error
    #[arg(long, env = "ROSTER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long, env = "ROSTER_LOG_DIR")]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all users
    List,
    /// Show one user
    Get {
        /// User id
        id: UserId,
    },
    /// Create a new user
    Create {
        /// Display name
        #[arg(short, long)]
        name: String,
        /// Unique username
        #[arg(short, long)]
        username: String,
        /// Password (stored as given)
        #[arg(short, long, default_value = "")]
        password: String,
        /// Birthday as YYYY-MM-DD
        #[arg(short, long)]
        birthday: Option<NaiveDate>,
    },
    /// Apply a partial update given as a JSON object
    ///
    /// Missing keys are left untouched; `"birthday": null` clears the date.
    Update {
        /// User id
        id: UserId,
        /// Patch, e.g. '{"name":"New Name","status":"ONLINE"}'
        patch: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir).map_err(|err| anyhow!(err))?;
    }

    let db_path = resolve_db_path(cli.db_path);
    let mut conn = open_db(&db_path)
        .with_context(|| format!("failed to open user store `{}`", db_path.display()))?;
    info!(
        "event=cli_start module=cli status=ok db_path={}",
        db_path.display()
    );

    let access = cli.command.access();
    let output = match cli.command {
        Commands::List => run(&mut conn, access, |service| {
            Ok(serde_json::to_value(service.get_users()?))
        })?,
        Commands::Get { id } => run(&mut conn, access, |service| {
            Ok(serde_json::to_value(service.get_user_by_id(id)?))
        })?,
        Commands::Create {
            name,
            username,
            password,
            birthday,
        } => {
            let candidate = NewUser {
                name,
                username,
                password,
                birthday,
            };
            run(&mut conn, access, |service| {
                Ok(serde_json::to_value(service.create_user(candidate)?))
            })?
        }
        Commands::Update { id, patch } => {
            let patch: UserPatch =
                serde_json::from_str(&patch).context("patch must be a JSON object")?;
            run(&mut conn, access, |service| {
                service.update_user(id, &patch)?;
                Ok(serde_json::to_value(service.get_user_by_id(id)?))
            })?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output?)?);
    Ok(())
}

/// Transaction kind a command needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

impl Commands {
    fn access(&self) -> Access {
        match self {
            Self::List | Self::Get { .. } => Access::Read,
            Self::Create { .. } | Self::Update { .. } => Access::Write,
        }
    }
}

/// Runs one command in its own unit of work.
fn run<T>(
    conn: &mut rusqlite::Connection,
    access: Access,
    command: impl FnOnce(&UserService<SqliteUserRepository<'_>>) -> ServiceResult<T>,
) -> anyhow::Result<T> {
    let work = |tx: &Transaction<'_>| {
        let repo = SqliteUserRepository::try_new(tx)?;
        command(&UserService::new(repo))
    };
    let value = match access {
        Access::Read => with_read_unit_of_work(conn, work)?,
        Access::Write => with_unit_of_work(conn, work)?,
    };
    Ok(value)
}

fn resolve_db_path(configured: Option<PathBuf>) -> PathBuf {
    configured
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_DB_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::{resolve_db_path, Access, Cli, Commands, DEFAULT_DB_FILE_NAME};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn resolve_db_path_falls_back_to_temp_dir() {
        assert_eq!(
            resolve_db_path(None),
            std::env::temp_dir().join(DEFAULT_DB_FILE_NAME)
        );
        assert_eq!(
            resolve_db_path(Some(PathBuf::new())),
            std::env::temp_dir().join(DEFAULT_DB_FILE_NAME)
        );
        assert_eq!(
            resolve_db_path(Some(PathBuf::from("/data/users.db"))),
            PathBuf::from("/data/users.db")
        );
    }

    #[test]
    fn create_parses_birthday() {
        let cli = Cli::try_parse_from([
            "roster",
            "create",
            "--name",
            "Firstname Lastname",
            "--username",
            "firstname@lastname",
            "--birthday",
            "1990-04-01",
        ])
        .unwrap();

        match cli.command {
            Commands::Create {
                username, birthday, ..
            } => {
                assert_eq!(username, "firstname@lastname");
                assert_eq!(birthday.unwrap().to_string(), "1990-04-01");
            }
            _ => panic!("expected create command"),
        }
    }

    #[test]
    fn create_rejects_malformed_birthday() {
        let result = Cli::try_parse_from([
            "roster",
            "create",
            "--name",
            "n",
            "--username",
            "u",
            "--birthday",
            "April first",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn only_list_and_get_run_as_reads() {
        let access = |args: &[&str]| Cli::try_parse_from(args).unwrap().command.access();

        assert_eq!(access(&["roster", "list"]), Access::Read);
        assert_eq!(access(&["roster", "get", "3"]), Access::Read);
        assert_eq!(
            access(&["roster", "create", "--name", "A", "--username", "a"]),
            Access::Write
        );
        assert_eq!(
            access(&["roster", "update", "3", r#"{"name":"B"}"#]),
            Access::Write
        );
    }
}
