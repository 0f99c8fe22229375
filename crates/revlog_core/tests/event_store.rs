use revlog_core::db::migrations::latest_version;
use revlog_core::db::open_db_in_memory;
use revlog_core::{
    EventListQuery, EventPatch, EventRepository, EventValidationError, NewEvent, RepoError,
    RepoResult, SqliteEventRepository, Store,
};
use rusqlite::Connection;

fn setup() -> Store {
    Store::open_in_memory().unwrap()
}

#[test]
fn create_and_read_roundtrip() {
    let mut store = setup();

    let id = store
        .in_transaction(|tx| tx.create(&NewEvent::new("Our very first event!", 1_000)))
        .unwrap();

    let loaded = store.in_transaction(|tx| tx.read(id)).unwrap();
    assert_eq!(loaded.id, id);
    assert_eq!(loaded.title, "Our very first event!");
    assert_eq!(loaded.date, 1_000);
}

#[test]
fn ids_are_generated_and_distinct() {
    let mut store = setup();

    let (first, second) = store
        .in_transaction(|tx| {
            let first = tx.create(&NewEvent::new("first", 0))?;
            let second = tx.create(&NewEvent::new("second", 0))?;
            Ok::<_, RepoError>((first, second))
        })
        .unwrap();

    assert!(second > first);
}

#[test]
fn read_missing_returns_not_found_and_find_returns_none() {
    let mut store = setup();

    let err = store.in_transaction(|tx| tx.read(404)).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(404)));

    let found = store.in_transaction(|tx| tx.find(404)).unwrap();
    assert!(found.is_none());
}

#[test]
fn update_applies_patch_fields() {
    let mut store = setup();
    let id = store
        .in_transaction(|tx| tx.create(&NewEvent::new("draft", 10)))
        .unwrap();

    store
        .in_transaction(|tx| tx.update(id, &EventPatch::title("final").with_date(20)))
        .unwrap();

    let loaded = store.in_transaction(|tx| tx.read(id)).unwrap();
    assert_eq!(loaded.title, "final");
    assert_eq!(loaded.date, 20);
}

#[test]
fn update_missing_returns_not_found() {
    let mut store = setup();

    let err = store
        .in_transaction(|tx| tx.update(9, &EventPatch::title("ghost")))
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound(9)));
}

#[test]
fn delete_removes_live_row() {
    let mut store = setup();
    let id = store
        .in_transaction(|tx| tx.create(&NewEvent::new("short lived", 0)))
        .unwrap();

    store.in_transaction(|tx| tx.delete(id)).unwrap();

    let err = store.in_transaction(|tx| tx.read(id)).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(missing) if missing == id));

    let again = store.in_transaction(|tx| tx.delete(id)).unwrap_err();
    assert!(matches!(again, RepoError::NotFound(_)));
}

#[test]
fn blank_title_is_rejected_on_create_and_update() {
    let mut store = setup();

    let create_err = store
        .in_transaction(|tx| tx.create(&NewEvent::new("   ", 0)))
        .unwrap_err();
    assert!(matches!(
        create_err,
        RepoError::Validation(EventValidationError::BlankTitle)
    ));

    let id = store
        .in_transaction(|tx| tx.create(&NewEvent::new("valid", 0)))
        .unwrap();
    let update_err = store
        .in_transaction(|tx| tx.update(id, &EventPatch::title("")))
        .unwrap_err();
    assert!(matches!(update_err, RepoError::Validation(_)));
}

#[test]
fn list_returns_all_events_in_id_order() {
    let mut store = setup();
    store
        .in_transaction(|tx| -> RepoResult<()> {
            tx.create(&NewEvent::new("saving by entity manager-01", 0))?;
            tx.create(&NewEvent::new("saving by entity manager-02", 0))?;
            tx.create(&NewEvent::new("standup", 0))?;
            Ok(())
        })
        .unwrap();

    let all = store
        .in_transaction(|tx| tx.list(&EventListQuery::default()))
        .unwrap();
    let titles: Vec<_> = all.iter().map(|event| event.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "saving by entity manager-01",
            "saving by entity manager-02",
            "standup"
        ]
    );
}

#[test]
fn list_filters_by_title_case_insensitively() {
    let mut store = setup();
    store
        .in_transaction(|tx| -> RepoResult<()> {
            tx.create(&NewEvent::new("Team Standup", 0))?;
            tx.create(&NewEvent::new("Retro", 0))?;
            Ok(())
        })
        .unwrap();

    let query = EventListQuery {
        title_contains: Some("standup".to_string()),
        ..EventListQuery::default()
    };
    let matched = store.in_transaction(|tx| tx.list(&query)).unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].title, "Team Standup");
}

#[test]
fn list_pagination_with_limit_and_offset_is_stable() {
    let mut store = setup();
    let ids = store
        .in_transaction(|tx| -> RepoResult<Vec<i64>> {
            (0..4)
                .map(|index| tx.create(&NewEvent::new(format!("event {index}"), 0)))
                .collect()
        })
        .unwrap();

    let page = store
        .in_transaction(|tx| {
            tx.list(&EventListQuery {
                limit: Some(2),
                offset: 1,
                ..EventListQuery::default()
            })
        })
        .unwrap();
    assert_eq!(
        page.iter().map(|event| event.id).collect::<Vec<_>>(),
        ids[1..3].to_vec()
    );

    let tail = store
        .in_transaction(|tx| {
            tx.list(&EventListQuery {
                offset: 3,
                ..EventListQuery::default()
            })
        })
        .unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].id, ids[3]);
}

#[test]
fn repository_can_be_used_directly_on_a_migrated_connection() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteEventRepository::try_new(&conn).unwrap();

    let created = repo.insert_event(&NewEvent::new("unaudited", 5)).unwrap();
    let loaded = repo.get_event(created.id).unwrap().unwrap();
    assert_eq!(loaded, created);
}

#[test]
fn repository_rejects_uninitialized_connection() {
    let conn = Connection::open_in_memory().unwrap();

    match SqliteEventRepository::try_new(&conn) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version: 0,
        }) => assert_eq!(expected_version, latest_version()),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

#[test]
fn repository_rejects_connection_without_events_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteEventRepository::try_new(&conn);
    assert!(matches!(
        result,
        Err(RepoError::MissingRequiredTable("events"))
    ));
}

#[test]
fn repository_rejects_connection_missing_event_date_column() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL
        );",
    )
    .unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    let result = SqliteEventRepository::try_new(&conn);
    assert!(matches!(
        result,
        Err(RepoError::MissingRequiredColumn {
            table: "events",
            column: "event_date"
        })
    ));
}
