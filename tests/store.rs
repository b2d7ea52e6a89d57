use camino::Utf8PathBuf;

use fandango_dls::domain::ProjectKey;
use fandango_dls::store::Store;

fn temp_store() -> (tempfile::TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("fandango.db")).unwrap();
    (temp, Store::open(path))
}

#[test]
fn get_latest_returns_most_recent_write() {
    let (_temp, store) = temp_store();

    store.put("proj", ProjectKey::MetadataJson, "{\"v\": 1}").unwrap();
    store.put("proj", ProjectKey::MetadataJson, "{\"v\": 2}").unwrap();
    store.put("proj", ProjectKey::MetadataJson, "{\"v\": 3}").unwrap();

    assert_eq!(
        store.get_latest("proj", ProjectKey::MetadataJson).unwrap().as_deref(),
        Some("{\"v\": 3}")
    );
}

#[test]
fn put_appends_instead_of_overwriting() {
    let (_temp, store) = temp_store();

    store.put("proj", ProjectKey::AcquisitionId, "first").unwrap();
    store.put("proj", ProjectKey::AcquisitionId, "second").unwrap();

    let info = store.list_all("proj").unwrap();
    let values = info
        .rows
        .iter()
        .map(|row| row.value.as_deref().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(values, vec!["first", "second"]);
}

#[test]
fn list_all_is_scoped_to_project_in_insertion_order() {
    let (_temp, store) = temp_store();

    store.put("alpha", ProjectKey::AcquisitionId, "a-1").unwrap();
    store.put("beta", ProjectKey::AcquisitionId, "b-1").unwrap();
    store.put("alpha", ProjectKey::DataLocation, "/dls/m02/data").unwrap();

    let info = store.list_all("alpha").unwrap();
    assert_eq!(info.columns, vec!["project_name", "key", "value"]);
    assert_eq!(info.rows.len(), 2);
    assert_eq!(info.rows[0].key, "acquisition_id");
    assert_eq!(info.rows[1].key, "data_location");
    assert!(info.rows.iter().all(|row| row.project_name == "alpha"));
}

#[test]
fn keys_do_not_leak_across_projects() {
    let (_temp, store) = temp_store();

    store.put("alpha", ProjectKey::DataLocation, "/a").unwrap();

    assert_eq!(store.get_latest("beta", ProjectKey::DataLocation).unwrap(), None);
    assert!(store.list_all("beta").unwrap().rows.is_empty());
}

#[test]
fn values_persist_across_store_handles() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("fandango.db")).unwrap();

    Store::open(path.clone())
        .put("proj", ProjectKey::AcquisitionId, "kept")
        .unwrap();

    let reopened = Store::open(path);
    assert_eq!(
        reopened.get_latest("proj", ProjectKey::AcquisitionId).unwrap().as_deref(),
        Some("kept")
    );
}

#[test]
fn put_all_writes_rows_together_in_order() {
    let (_temp, store) = temp_store();
    store.put("proj", ProjectKey::MetadataJson, "{\"v\": 1}").unwrap();

    store
        .put_all(
            "proj",
            &[
                (ProjectKey::AcquisitionId, "acq-2"),
                (ProjectKey::MetadataJson, "{\"v\": 2}"),
            ],
        )
        .unwrap();

    let keys = store
        .list_all("proj")
        .unwrap()
        .rows
        .into_iter()
        .map(|row| row.key)
        .collect::<Vec<_>>();
    assert_eq!(keys, vec!["metadata_json", "acquisition_id", "metadata_json"]);
    assert_eq!(
        store.get_latest("proj", ProjectKey::MetadataJson).unwrap().as_deref(),
        Some("{\"v\": 2}")
    );
}

#[test]
fn failed_batch_leaves_no_partial_rows() {
    let (temp, store) = temp_store();
    store.put("proj", ProjectKey::AcquisitionId, "acq-1").unwrap();

    let conn = rusqlite::Connection::open(temp.path().join("fandango.db")).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_metadata BEFORE INSERT ON project_info
         WHEN NEW.key = 'metadata_json'
         BEGIN SELECT RAISE(ABORT, 'metadata rejected'); END;",
    )
    .unwrap();
    drop(conn);

    let result = store.put_all(
        "proj",
        &[
            (ProjectKey::AcquisitionId, "acq-2"),
            (ProjectKey::MetadataJson, "{}"),
        ],
    );

    assert!(result.is_err());
    assert_eq!(
        store.get_latest("proj", ProjectKey::AcquisitionId).unwrap().as_deref(),
        Some("acq-1")
    );
}
