use handoff_store::Store;
use tempfile::TempDir;

#[test]
fn migrations_apply_once() {
    let store = Store::open_in_memory().expect("open in memory");
    assert_eq!(store.schema_version().expect("version before"), 0);
    store.migrate().expect("migrate");
    store.migrate().expect("migrate again");
    assert_eq!(store.schema_version().expect("schema version"), 1);
}

#[cfg(unix)]
#[test]
fn database_file_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("handoff.sqlite3");
    {
        let store = Store::open(&path).expect("create");
        store.migrate().expect("migrate");
    }
    let store = Store::open(&path).expect("reopen");
    assert_eq!(store.schema_version().expect("version"), 1);
    let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o077, 0);
}
