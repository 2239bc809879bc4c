//! Shared conformance suite for denserank storage backends.
//!
//! Every backend is exercised through the same checks: the dense invariant,
//! idempotence, both insertion policies, gap closing on delete, and the
//! end-to-end reorder scenarios. Factories must produce a fresh, empty
//! store whose table carries a `list_id` scope column.

use denserank_core::{
    FieldValue, InsertPolicy, ListConfig, ListKeeper, NewRow, Orderable, Position, RankStore,
    RowId, Scope, SiblingFilter,
};

/// Produces a fresh, empty store for each check.
pub trait StoreFactory {
    type Store: RankStore;
    fn make(&self) -> Self::Store;
}

impl<S: RankStore, F: Fn() -> S> StoreFactory for F {
    type Store = S;
    fn make(&self) -> S {
        self()
    }
}

pub fn filter(list: i64) -> SiblingFilter {
    SiblingFilter::Equals(vec![("list_id".into(), FieldValue::Int(list))])
}

fn keeper<F: StoreFactory>(factory: &F, policy: InsertPolicy) -> ListKeeper<F::Store> {
    ListKeeper::new(
        factory.make(),
        ListConfig::new(Scope::field("list_id")).policy(policy),
    )
}

fn seed<S: RankStore>(keeper: &mut ListKeeper<S>, list: i64, count: i64) {
    for id in 1..=count {
        keeper
            .insert(NewRow::new(RowId(id)).field("list_id", list))
            .unwrap();
    }
}

fn positions_by_id<S: RankStore>(
    keeper: &ListKeeper<S>,
    list: i64,
) -> Vec<(i64, Option<Position>)> {
    let mut rows = keeper.store().fetch(&filter(list)).unwrap();
    rows.sort_by_key(|r| r.row_id());
    rows.iter().map(|r| (r.row_id().0, r.position())).collect()
}

fn assert_dense<S: RankStore>(keeper: &ListKeeper<S>, list: i64) {
    let mut listed: Vec<Position> = keeper
        .store()
        .fetch(&filter(list))
        .unwrap()
        .iter()
        .filter_map(|r| r.position())
        .collect();
    listed.sort_unstable();
    let expected: Vec<Position> = (1..=listed.len() as Position).collect();
    assert_eq!(listed, expected, "list {list} is not dense");
}

/// Run every conformance check against the backend.
pub fn run_conformance<F: StoreFactory>(factory: &F) {
    density_after_interleaved_mutations(factory);
    bottom_insertion_appends(factory);
    top_insertion_shifts_existing(factory);
    deletion_closes_gaps(factory);
    normalization_is_idempotent(factory);
    reorder_scenarios(factory);
    scopes_are_independent(factory);
    unlisted_rows_stay_unlisted(factory);
}

pub fn density_after_interleaved_mutations<F: StoreFactory>(factory: &F) {
    let mut k = keeper(factory, InsertPolicy::Bottom);
    seed(&mut k, 1, 5);
    k.set_position(RowId(2), Some(4)).unwrap();
    assert_dense(&k, 1);
    k.remove(RowId(1)).unwrap();
    assert_dense(&k, 1);
    k.insert(NewRow::new(RowId(6)).field("list_id", 1i64))
        .unwrap();
    assert_dense(&k, 1);
    assert_eq!(k.normalize(&filter(1)).unwrap(), 0);
}

pub fn bottom_insertion_appends<F: StoreFactory>(factory: &F) {
    let mut k = keeper(factory, InsertPolicy::Bottom);
    seed(&mut k, 1, 4);
    k.insert(NewRow::new(RowId(5)).field("list_id", 1i64))
        .unwrap();
    let row = k.store().get(RowId(5)).unwrap().unwrap();
    assert_eq!(row.position(), Some(5));
    assert_dense(&k, 1);
}

pub fn top_insertion_shifts_existing<F: StoreFactory>(factory: &F) {
    let mut k = keeper(factory, InsertPolicy::Top);
    for id in 1..=3 {
        k.insert(NewRow::new(RowId(id)).field("list_id", 1i64).at(id))
            .unwrap();
    }
    k.insert(NewRow::new(RowId(4)).field("list_id", 1i64))
        .unwrap();
    assert_eq!(
        positions_by_id(&k, 1),
        vec![(1, Some(2)), (2, Some(3)), (3, Some(4)), (4, Some(1))]
    );
}

pub fn deletion_closes_gaps<F: StoreFactory>(factory: &F) {
    let mut k = keeper(factory, InsertPolicy::Bottom);
    seed(&mut k, 1, 5);
    k.remove(RowId(3)).unwrap();
    assert_eq!(
        positions_by_id(&k, 1),
        vec![(1, Some(1)), (2, Some(2)), (4, Some(3)), (5, Some(4))]
    );
}

pub fn normalization_is_idempotent<F: StoreFactory>(factory: &F) {
    let mut k = keeper(factory, InsertPolicy::Bottom);
    seed(&mut k, 1, 5);
    k.set_position(RowId(4), Some(2)).unwrap();
    assert_eq!(k.normalize(&filter(1)).unwrap(), 0);
    assert_eq!(k.normalize(&filter(1)).unwrap(), 0);
}

pub fn reorder_scenarios<F: StoreFactory>(factory: &F) {
    let cases: [(Position, [(i64, Position); 5]); 4] = [
        (5, [(1, 1), (2, 2), (3, 5), (4, 3), (5, 4)]),
        (1, [(1, 2), (2, 3), (3, 1), (4, 4), (5, 5)]),
        (4, [(1, 1), (2, 2), (3, 4), (4, 3), (5, 5)]),
        (2, [(1, 1), (2, 3), (3, 2), (4, 4), (5, 5)]),
    ];
    for (target, expected) in cases {
        let mut k = keeper(factory, InsertPolicy::Bottom);
        seed(&mut k, 1, 5);
        k.set_position(RowId(3), Some(target)).unwrap();
        let want: Vec<(i64, Option<Position>)> =
            expected.iter().map(|(id, p)| (*id, Some(*p))).collect();
        assert_eq!(positions_by_id(&k, 1), want, "moving row 3 to {target}");
    }
}

pub fn scopes_are_independent<F: StoreFactory>(factory: &F) {
    let mut k = keeper(factory, InsertPolicy::Bottom);
    seed(&mut k, 1, 3);
    for id in 4..=6 {
        k.insert(NewRow::new(RowId(id)).field("list_id", 2i64))
            .unwrap();
    }
    k.set_position(RowId(1), Some(3)).unwrap();
    assert_eq!(
        positions_by_id(&k, 2),
        vec![(4, Some(1)), (5, Some(2)), (6, Some(3))]
    );
    assert_dense(&k, 1);
}

pub fn unlisted_rows_stay_unlisted<F: StoreFactory>(factory: &F) {
    let mut k = keeper(factory, InsertPolicy::None);
    k.insert(NewRow::new(RowId(1)).field("list_id", 1i64).at(1))
        .unwrap();
    k.insert(NewRow::new(RowId(2)).field("list_id", 1i64))
        .unwrap();
    k.set_position(RowId(1), Some(1)).unwrap();
    assert_eq!(
        positions_by_id(&k, 1),
        vec![(1, Some(1)), (2, None)]
    );
}
