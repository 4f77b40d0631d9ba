use chrono::{NaiveDate, Utc};
use roster_core::db::{open_db, open_db_in_memory, with_unit_of_work};
use roster_core::{
    NewUser, SqliteUserRepository, User, UserPatch, UserService, UserServiceError, UserStatus,
};
use rusqlite::Connection;

fn service(conn: &Connection) -> UserService<SqliteUserRepository<'_>> {
    UserService::new(SqliteUserRepository::try_new(conn).unwrap())
}

fn create(conn: &Connection, name: &str, username: &str) -> User {
    service(conn)
        .create_user(NewUser::new(name, username))
        .unwrap()
}

#[test]
fn create_assigns_id_token_offline_status_and_timestamp() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let before = Utc::now().timestamp_millis();
    let created = service
        .create_user(NewUser::new("Firstname Lastname", "firstname@lastname"))
        .unwrap();
    let after = Utc::now().timestamp_millis();

    assert!(created.id.is_some());
    assert!(!created.token.is_empty());
    assert_eq!(created.status, UserStatus::Offline);
    assert!(created.creation_date >= before && created.creation_date <= after);
    assert_eq!(created.name, "Firstname Lastname");
    assert_eq!(created.username, "firstname@lastname");
}

#[test]
fn tokens_are_unique_per_user() {
    let conn = open_db_in_memory().unwrap();

    let first = create(&conn, "A", "a");
    let second = create(&conn, "B", "b");

    assert_ne!(first.token, second.token);
}

#[test]
fn second_create_with_same_username_conflicts_and_keeps_first() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let first = service
        .create_user(NewUser::new("Firstname Lastname", "firstname@lastname"))
        .unwrap();
    let err = service
        .create_user(NewUser::new("Someone Else", "firstname@lastname"))
        .unwrap_err();

    assert!(matches!(
        err,
        UserServiceError::Conflict { field: "username" }
    ));
    assert!(err.to_string().contains("not unique"));
    let all = service.get_users().unwrap();
    assert_eq!(all, vec![first]);
}

#[test]
fn get_users_returns_everything() {
    let conn = open_db_in_memory().unwrap();
    assert!(service(&conn).get_users().unwrap().is_empty());

    create(&conn, "A", "a");
    create(&conn, "B", "b");

    assert_eq!(service(&conn).get_users().unwrap().len(), 2);
}

#[test]
fn get_user_by_id_returns_created_user_or_not_found() {
    let conn = open_db_in_memory().unwrap();
    let created = create(&conn, "A", "a");

    let fetched = service(&conn)
        .get_user_by_id(created.id.unwrap())
        .unwrap();
    assert_eq!(fetched, created);

    let err = service(&conn).get_user_by_id(12_345).unwrap_err();
    assert!(matches!(err, UserServiceError::NotFound(12_345)));
}

#[test]
fn update_with_only_name_changes_only_name() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut candidate = NewUser::new("Old Name", "keeper");
    candidate.password = "pw".to_string();
    candidate.birthday = NaiveDate::from_ymd_opt(1999, 9, 9);
    let created = service.create_user(candidate).unwrap();
    let id = created.id.unwrap();

    let patch = UserPatch {
        name: Some("New Name".to_string()),
        ..UserPatch::default()
    };
    service.update_user(id, &patch).unwrap();

    let updated = service.get_user_by_id(id).unwrap();
    assert_eq!(
        updated,
        User {
            name: "New Name".to_string(),
            ..created
        }
    );
}

#[test]
fn update_overwrites_every_supplied_field() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let created = service
        .create_user(NewUser::new("Full", "full"))
        .unwrap();
    let id = created.id.unwrap();

    let patch = UserPatch {
        name: Some("Fuller".to_string()),
        username: Some("fuller".to_string()),
        password: Some("new-pw".to_string()),
        birthday: Some(NaiveDate::from_ymd_opt(2001, 1, 1)),
        status: Some(UserStatus::Online),
        token: Some("replacement-token".to_string()),
    };
    service.update_user(id, &patch).unwrap();

    let updated = service.get_user_by_id(id).unwrap();
    assert_eq!(updated.name, "Fuller");
    assert_eq!(updated.username, "fuller");
    assert_eq!(updated.password, "new-pw");
    assert_eq!(updated.birthday, NaiveDate::from_ymd_opt(2001, 1, 1));
    assert_eq!(updated.status, UserStatus::Online);
    assert_eq!(updated.token, "replacement-token");
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.creation_date, created.creation_date);
}

#[test]
fn update_can_clear_birthday() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut candidate = NewUser::new("Dated", "dated");
    candidate.birthday = NaiveDate::from_ymd_opt(1980, 5, 17);
    let id = service.create_user(candidate).unwrap().id.unwrap();

    let patch: UserPatch = serde_json::from_str(r#"{"birthday":null}"#).unwrap();
    service.update_user(id, &patch).unwrap();

    assert_eq!(service.get_user_by_id(id).unwrap().birthday, None);
}

#[test]
fn update_missing_user_is_not_found_and_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let existing = create(&conn, "A", "a");

    let patch = UserPatch {
        name: Some("Nobody".to_string()),
        ..UserPatch::default()
    };
    let err = service(&conn).update_user(777, &patch).unwrap_err();

    assert!(matches!(err, UserServiceError::NotFound(777)));
    assert_eq!(service(&conn).get_users().unwrap(), vec![existing]);
}

#[test]
fn applying_same_patch_twice_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let id = service
        .create_user(NewUser::new("Twice", "twice"))
        .unwrap()
        .id
        .unwrap();
    let patch = UserPatch {
        name: Some("Once".to_string()),
        status: Some(UserStatus::Online),
        ..UserPatch::default()
    };

    service.update_user(id, &patch).unwrap();
    let after_first = service.get_user_by_id(id).unwrap();
    service.update_user(id, &patch).unwrap();
    let after_second = service.get_user_by_id(id).unwrap();

    assert_eq!(after_first, after_second);
}

#[test]
fn update_to_taken_username_conflicts_and_keeps_state() {
    let conn = open_db_in_memory().unwrap();
    create(&conn, "Holder", "taken");
    let mover = create(&conn, "Mover", "mover");
    let id = mover.id.unwrap();

    let patch = UserPatch {
        username: Some("taken".to_string()),
        name: Some("Moved".to_string()),
        ..UserPatch::default()
    };
    let err = service(&conn).update_user(id, &patch).unwrap_err();

    assert!(matches!(
        err,
        UserServiceError::Conflict { field: "username" }
    ));
    assert_eq!(service(&conn).get_user_by_id(id).unwrap(), mover);
}

#[test]
fn unit_of_work_commits_created_user_to_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roster.sqlite3");

    let mut conn = open_db(&path).unwrap();
    let created = with_unit_of_work(&mut conn, |tx| {
        service(tx).create_user(NewUser::new("Durable", "durable"))
    })
    .unwrap();
    drop(conn);

    let reopened = open_db(&path).unwrap();
    let fetched = service(&reopened)
        .get_user_by_id(created.id.unwrap())
        .unwrap();
    assert_eq!(fetched, created);
}

#[test]
fn unit_of_work_rolls_back_failed_request() {
    let mut conn = open_db_in_memory().unwrap();
    create(&conn, "Holder", "dup");

    let result = with_unit_of_work(&mut conn, |tx| {
        let service = service(tx);
        service.create_user(NewUser::new("Fresh", "fresh"))?;
        service.create_user(NewUser::new("Clash", "dup"))
    });

    assert!(matches!(
        result,
        Err(UserServiceError::Conflict { field: "username" })
    ));
    let usernames: Vec<_> = service(&conn)
        .get_users()
        .unwrap()
        .into_iter()
        .map(|user| user.username)
        .collect();
    assert_eq!(usernames, vec!["dup".to_string()]);
}

#[test]
fn blank_name_create_and_update_succeed() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    let created = service.create_user(NewUser::new("", "someone")).unwrap();
    let id = created.id.unwrap();
    let patch = UserPatch {
        name: Some(" ".to_string()),
        ..UserPatch::default()
    };
    service.update_user(id, &patch).unwrap();

    assert_eq!(service.get_user_by_id(id).unwrap().name, " ");
    assert_eq!(service.get_users().unwrap().len(), 1);
}
