use chrono::{TimeZone, Utc};
use garage_core::storage::{FileKvStore, KeyValueStore, PREFS_KEY, StorageAdapter, TASKS_KEY};
use garage_core::store::TaskStore;
use garage_core::task::{Priority, TaskInput};
use tempfile::tempdir;

#[test]
fn file_store_roundtrip_survives_reload() {
    let temp = tempdir().expect("tempdir");
    let storage = StorageAdapter::new(FileKvStore::open(temp.path()).expect("open store"));

    let (tasks, _) = storage.load();
    let mut store = TaskStore::new(tasks, storage.clone());
    let now = Utc
        .with_ymd_and_hms(2026, 10, 18, 9, 30, 0)
        .single()
        .expect("valid now");

    let id = store
        .create_at(
            TaskInput {
                notes: "  Q3 numbers ".into(),
                due: chrono::NaiveDate::from_ymd_opt(2026, 10, 20),
                priority: Priority::High,
                progress: 40,
                ..TaskInput::titled("  Write report ")
            },
            now,
        )
        .expect("create");

    let reopened = StorageAdapter::new(FileKvStore::open(temp.path()).expect("reopen store"));
    let (tasks, prefs) = reopened.load();
    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.id, id);
    assert_eq!(task.title, "Write report");
    assert_eq!(task.notes, "Q3 numbers");
    assert_eq!(task.due_iso().as_deref(), Some("2026-10-20"));
    assert_eq!(task.priority, Priority::High);
    assert_eq!(task.progress, 40);
    assert!(!task.completed);
    assert_eq!(task.created_at, now);
    assert_eq!(prefs, Default::default());

    let raw = FileKvStore::open(temp.path())
        .expect("open raw")
        .get(TASKS_KEY)
        .expect("read")
        .expect("present");
    assert!(raw.contains("\"createdAt\":\"2026-10-18T09:30:00.000Z\""));
    assert!(raw.contains("\"lastNotified\":null"));
}

#[test]
fn malformed_documents_load_with_defaults() {
    let temp = tempdir().expect("tempdir");
    let kv = FileKvStore::open(temp.path()).expect("open store");
    kv.set(
        TASKS_KEY,
        r#"[{"title":"No id","progress":"250","priority":"urgent","due":"soon"}, 7, {"id":"x","title":"ok"}]"#,
    )
    .expect("seed tasks");
    kv.set(PREFS_KEY, "{not json").expect("seed prefs");

    let (tasks, prefs) = StorageAdapter::new(kv).load();
    assert_eq!(tasks.len(), 2);

    let first = &tasks[0];
    assert!(first.id.as_str().starts_with("t_"));
    assert_eq!(first.progress, 100);
    assert_eq!(first.priority.rank(), 99);
    assert_eq!(first.due, None);
    assert_eq!(tasks[1].priority, Priority::Medium);
    assert_eq!(prefs, Default::default());
}

#[test]
fn toggle_back_loses_partial_progress() {
    let temp = tempdir().expect("tempdir");
    let storage = StorageAdapter::new(FileKvStore::open(temp.path()).expect("open store"));
    let mut store = TaskStore::new(Vec::new(), storage);

    let id = store
        .create(TaskInput {
            progress: 60,
            ..TaskInput::titled("Half done")
        })
        .expect("create");

    assert!(store.toggle_complete(&id).expect("complete"));
    assert_eq!(store.get(&id).expect("present").progress, 100);
    assert!(!store.toggle_complete(&id).expect("reopen"));
    assert_eq!(store.get(&id).expect("present").progress, 0);
}

#[test]
fn clearing_an_empty_store_writes_nothing() {
    let temp = tempdir().expect("tempdir");
    let storage = StorageAdapter::new(FileKvStore::open(temp.path()).expect("open store"));
    let mut store = TaskStore::new(Vec::new(), storage);

    assert_eq!(store.clear_all().expect("clear"), 0);
    assert_eq!(store.revision(), 0);
    let kv = FileKvStore::open(temp.path()).expect("reopen");
    assert_eq!(kv.get(TASKS_KEY).expect("read"), None);
}
