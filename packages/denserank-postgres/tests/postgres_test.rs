use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use postgres::{Client, NoTls};
use uuid::Uuid;

use denserank_core::{
    FieldValue, ListConfig, ListKeeper, NewRow, Orderable, RankStore, RowId, Scope, SiblingFilter,
};
use denserank_postgres::{ColumnKind, PostgresStore, TableSpec};

fn connect() -> Option<Rc<RefCell<Client>>> {
    let url = std::env::var("DENSERANK_POSTGRES_URL").ok()?;
    let client = Client::connect(&url, NoTls).ok()?;
    Some(Rc::new(RefCell::new(client)))
}

fn fresh_table_name() -> String {
    format!("denserank_test_{}", Uuid::new_v4().simple())
}

fn make_store(client: &Rc<RefCell<Client>>, table: &str) -> PostgresStore {
    let spec = TableSpec::new(table).scope_column("list_id", ColumnKind::BigInt);
    let store = PostgresStore::new(client.clone(), spec);
    store.ensure_table().unwrap();
    store
}

#[test]
fn postgres_store_passes_the_conformance_suite() {
    let Some(client) = connect() else {
        return;
    };
    let base = fresh_table_name();
    let counter = AtomicU32::new(0);
    let factory = move || {
        let n = counter.fetch_add(1, Ordering::Relaxed);
        make_store(&client, &format!("{base}_{n}"))
    };
    denserank_test_support::run_conformance(&factory);
}

#[test]
fn keeper_runs_end_to_end_on_postgres() {
    let Some(client) = connect() else {
        return;
    };
    let table = fresh_table_name();
    let store = make_store(&client, &table);
    let mut keeper = ListKeeper::new(store, ListConfig::new(Scope::field("list_id")));
    for id in 1..=5 {
        keeper
            .insert(NewRow::new(RowId(id)).field("list_id", 1i64))
            .unwrap();
    }
    keeper.set_position(RowId(3), Some(5)).unwrap();
    keeper.remove(RowId(1)).unwrap();

    let filter = SiblingFilter::Equals(vec![("list_id".into(), FieldValue::Int(1))]);
    let rows = keeper.list(&filter).unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r.row_id().0).collect();
    assert_eq!(ids, vec![2, 4, 5, 3]);

    client
        .borrow_mut()
        .batch_execute(&format!("DROP TABLE IF EXISTS \"{table}\""))
        .unwrap();
}

#[test]
fn text_scope_columns_partition_independently() {
    let Some(client) = connect() else {
        return;
    };
    let table = fresh_table_name();
    let spec = TableSpec::new(table.as_str()).scope_column("bucket", ColumnKind::Text);
    let store = PostgresStore::new(client.clone(), spec);
    store.ensure_table().unwrap();

    let mut keeper = ListKeeper::new(store, ListConfig::new(Scope::field("bucket")));
    for (id, bucket) in [(1, "a"), (2, "a"), (3, "b")] {
        keeper
            .insert(NewRow::new(RowId(id)).field("bucket", bucket))
            .unwrap();
    }
    keeper.remove(RowId(1)).unwrap();

    let a = SiblingFilter::Equals(vec![("bucket".into(), FieldValue::Text("a".into()))]);
    let rows = keeper.list(&a).unwrap();
    let got: Vec<(i64, Option<i64>)> = rows
        .iter()
        .map(|r| (r.row_id().0, r.position()))
        .collect();
    assert_eq!(got, vec![(2, Some(1))]);

    let row3 = keeper.store().get(RowId(3)).unwrap().unwrap();
    assert_eq!(row3.position(), Some(1));

    client
        .borrow_mut()
        .batch_execute(&format!("DROP TABLE IF EXISTS \"{table}\""))
        .unwrap();
}
