use denserank_core::{
    FieldValue, ListConfig, ListKeeper, NewRow, Orderable, RowId, Scope, SiblingFilter,
};
use denserank_sqlite::{SqliteStore, TableSpec};

fn spec() -> TableSpec {
    TableSpec::new("items").scope_column("list_id")
}

fn fresh_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory(spec()).unwrap();
    store.ensure_table().unwrap();
    store
}

#[test]
fn sqlite_store_passes_the_conformance_suite() {
    denserank_test_support::run_conformance(&fresh_store);
}

#[test]
fn lists_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("items.db");

    {
        let store = SqliteStore::open(&path, spec()).unwrap();
        store.ensure_table().unwrap();
        let mut keeper = ListKeeper::new(store, ListConfig::new(Scope::field("list_id")));
        for id in 1..=3 {
            keeper
                .insert(NewRow::new(RowId(id)).field("list_id", 1i64))
                .unwrap();
        }
        keeper.set_position(RowId(3), Some(1)).unwrap();
    }

    let store = SqliteStore::open(&path, spec()).unwrap();
    let keeper = ListKeeper::new(store, ListConfig::new(Scope::field("list_id")));
    let filter = SiblingFilter::Equals(vec![("list_id".into(), FieldValue::Int(1))]);
    let rows = keeper.list(&filter).unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r.row_id().0).collect();
    assert_eq!(ids, vec![3, 1, 2]);
}

#[test]
fn renamed_columns_work_through_the_spec() {
    let spec = TableSpec::new("todo_items")
        .id_column("todo_id")
        .position_column("sort_order")
        .stamp_column("touched_at")
        .scope_column("todo_list_id");
    let store = SqliteStore::open_in_memory(spec).unwrap();
    store.ensure_table().unwrap();
    let mut keeper = ListKeeper::new(store, ListConfig::new(Scope::field("todo_list_id")));
    for id in 1..=3 {
        keeper
            .insert(NewRow::new(RowId(id)).field("todo_list_id", 9i64))
            .unwrap();
    }
    keeper.remove(RowId(1)).unwrap();
    let filter = SiblingFilter::Equals(vec![("todo_list_id".into(), FieldValue::Int(9))]);
    let rows = keeper.list(&filter).unwrap();
    let got: Vec<(i64, Option<i64>)> = rows
        .iter()
        .map(|r| (r.row_id().0, r.position()))
        .collect();
    assert_eq!(got, vec![(2, Some(1)), (3, Some(2))]);
}
