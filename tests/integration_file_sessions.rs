use taskflow::task::{FileStorage, Filter, Persistence, TaskStore};

fn storage(dir: &std::path::Path) -> FileStorage {
    FileStorage::new(dir.to_path_buf(), "tasks").expect("valid key")
}

#[test]
fn tasks_survive_a_restart() {
    let td = tempfile::tempdir().expect("tempdir");

    let mut first = TaskStore::open(storage(td.path()));
    let milk = first.add_task("Buy milk").expect("added");
    first.add_task("Call mom").expect("added");
    first.toggle_complete(milk);
    first.set_filter(Filter::Completed);
    let snapshot = first.tasks().to_vec();
    drop(first);

    let second = TaskStore::open(storage(td.path()));
    assert_eq!(second.tasks(), snapshot.as_slice());
    assert_eq!(second.filter(), Filter::All, "filter is not persisted");
    assert_eq!(second.counts().completed, 1);
}

#[test]
fn malformed_file_is_replaced_on_next_write() {
    let td = tempfile::tempdir().expect("tempdir");
    std::fs::write(td.path().join("tasks.json"), "{ this is not json").expect("write");

    let mut store = TaskStore::open(storage(td.path()));
    assert!(store.tasks().is_empty());

    store.add_task("fresh start").expect("added");
    let raw = storage(td.path()).load().expect("load").expect("present");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(value[0]["text"], "fresh start");
}

#[test]
fn browser_export_loads_unchanged() {
    let td = tempfile::tempdir().expect("tempdir");
    let exported = r#"[
        {"id":1712345678901,"text":"Water plants","completed":false,"createdAt":"2024-04-05T19:34:38.901Z"},
        {"id":1712345680000,"text":"Pay rent","completed":true,"createdAt":"2024-04-05T19:34:40.000Z"}
    ]"#;
    std::fs::write(td.path().join("tasks.json"), exported).expect("write");

    let mut store = TaskStore::open(storage(td.path()));
    assert_eq!(store.tasks().len(), 2);
    assert_eq!(store.tasks()[1].text, "Pay rent");

    store.set_filter(Filter::Pending);
    let pending: Vec<&str> = store
        .visible_tasks()
        .iter()
        .map(|t| t.text.as_str())
        .collect();
    assert_eq!(pending, ["Water plants"]);

    let id = store.add_task("Plan trip").expect("added");
    assert!(id > 1_712_345_680_000);
}

#[test]
fn separate_keys_do_not_share_tasks() {
    let td = tempfile::tempdir().expect("tempdir");
    let work = FileStorage::new(td.path().to_path_buf(), "work").expect("valid key");

    let mut home = TaskStore::open(storage(td.path()));
    home.add_task("Fold laundry").expect("added");
    let mut office = TaskStore::open(work);
    office.add_task("Send report").expect("added");

    assert_eq!(TaskStore::open(storage(td.path())).tasks().len(), 1);
    assert!(td.path().join("work.json").exists());
}
