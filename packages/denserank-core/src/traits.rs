use std::collections::BTreeMap;

use crate::change::ChangeSet;
use crate::error::{Error, Result};
use crate::normalize::{compute_ranks, RankOrder};
use crate::row::{FieldValue, NewRow, Orderable, Position, RowId, Stamp};
use crate::scope::SiblingFilter;

/// Pluggable stamp source so hosts can choose between a deterministic
/// per-write sequence and wall-clock time.
pub trait StampClock {
    fn tick(&mut self) -> Stamp;
    fn observe(&mut self, external: Stamp);
    fn now(&self) -> Stamp;
}

/// Monotonically increasing per-write counter; the deterministic default.
#[derive(Clone, Debug, Default)]
pub struct SequenceClock {
    counter: Stamp,
}

impl StampClock for SequenceClock {
    fn tick(&mut self) -> Stamp {
        self.counter += 1;
        self.counter
    }

    fn observe(&mut self, external: Stamp) {
        self.counter = self.counter.max(external);
    }

    fn now(&self) -> Stamp {
        self.counter
    }
}

/// Microsecond wall clock for hosts that share one table between processes.
/// Ties within the same microsecond fall back to the id ordering.
#[cfg(feature = "wall-clock")]
#[derive(Clone, Copy, Debug, Default)]
pub struct WallClock;

#[cfg(feature = "wall-clock")]
impl StampClock for WallClock {
    fn tick(&mut self) -> Stamp {
        self.now()
    }

    fn observe(&mut self, _external: Stamp) {}

    fn now(&self) -> Stamp {
        chrono::Utc::now().timestamp_micros().max(0) as Stamp
    }
}

/// Storage collaborator for one ordered table.
///
/// Implementations must query the base table directly, bypassing any default
/// display filter of the host type; a hidden filter would exclude siblings
/// from the ranking.
pub trait RankStore {
    type Row: Orderable;

    /// All rows matching the filter, the triggering row included.
    fn fetch(&self, filter: &SiblingFilter) -> Result<Vec<Self::Row>>;

    fn get(&self, id: RowId) -> Result<Option<Self::Row>>;

    fn min_position(&self, filter: &SiblingFilter) -> Result<Option<Position>>;

    fn max_position(&self, filter: &SiblingFilter) -> Result<Option<Position>>;

    /// Dense-rank every in-list row matched by the filter and persist the
    /// ranks that differ from the current position, as one atomic write.
    /// Returns the number of rows changed. Must not advance stamps: the
    /// rewrite is bookkeeping, not a user mutation, and stamps stay a valid
    /// tie-break signal.
    fn rank_rewrite(&mut self, filter: &SiblingFilter, order: &RankOrder) -> Result<u64>;

    fn insert_row(&mut self, row: NewRow, stamp: Stamp) -> Result<()>;

    /// Apply the new values recorded in the change set and advance the
    /// row's stamp.
    fn update_row(&mut self, id: RowId, changes: &ChangeSet, stamp: Stamp) -> Result<()>;

    fn delete_row(&mut self, id: RowId) -> Result<()>;
}

/// Row held by [`MemoryStore`].
#[derive(Clone, Debug)]
pub struct MemoryRow {
    pub id: RowId,
    pub position: Option<Position>,
    pub stamp: Stamp,
    pub fields: BTreeMap<String, FieldValue>,
}

impl MemoryRow {
    pub fn new(id: RowId, position: Option<Position>, stamp: Stamp) -> Self {
        Self {
            id,
            position,
            stamp,
            fields: BTreeMap::new(),
        }
    }
}

impl Orderable for MemoryRow {
    fn row_id(&self) -> RowId {
        self.id
    }

    fn position(&self) -> Option<Position> {
        self.position
    }

    fn stamp(&self) -> Stamp {
        self.stamp
    }

    fn field(&self, name: &str) -> FieldValue {
        self.fields.get(name).cloned().unwrap_or(FieldValue::Null)
    }
}

/// In-memory reference backend for tests and for embedding without a
/// database.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    rows: BTreeMap<RowId, MemoryRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn matching<'a>(
        &'a self,
        filter: &'a SiblingFilter,
    ) -> impl Iterator<Item = &'a MemoryRow> + 'a {
        self.rows.values().filter(move |row| filter.matches(*row))
    }
}

impl RankStore for MemoryStore {
    type Row = MemoryRow;

    fn fetch(&self, filter: &SiblingFilter) -> Result<Vec<MemoryRow>> {
        Ok(self.matching(filter).cloned().collect())
    }

    fn get(&self, id: RowId) -> Result<Option<MemoryRow>> {
        Ok(self.rows.get(&id).cloned())
    }

    fn min_position(&self, filter: &SiblingFilter) -> Result<Option<Position>> {
        Ok(self.matching(filter).filter_map(|r| r.position).min())
    }

    fn max_position(&self, filter: &SiblingFilter) -> Result<Option<Position>> {
        Ok(self.matching(filter).filter_map(|r| r.position).max())
    }

    fn rank_rewrite(&mut self, filter: &SiblingFilter, order: &RankOrder) -> Result<u64> {
        let siblings = self.fetch(filter)?;
        let writes = compute_ranks(&siblings, order);
        for (id, rank) in &writes {
            let row = self
                .rows
                .get_mut(id)
                .ok_or_else(|| Error::Storage(format!("ranked row {id} vanished")))?;
            row.position = Some(*rank);
        }
        Ok(writes.len() as u64)
    }

    fn insert_row(&mut self, row: NewRow, stamp: Stamp) -> Result<()> {
        if self.rows.contains_key(&row.id) {
            return Err(Error::DuplicateRow(row.id));
        }
        self.rows.insert(
            row.id,
            MemoryRow {
                id: row.id,
                position: row.position,
                stamp,
                fields: row.fields,
            },
        );
        Ok(())
    }

    fn update_row(&mut self, id: RowId, changes: &ChangeSet, stamp: Stamp) -> Result<()> {
        let row = self.rows.get_mut(&id).ok_or(Error::RowNotFound(id))?;
        if let Some(change) = changes.position() {
            row.position = change.new;
        }
        for (name, change) in changes.fields() {
            row.fields.insert(name.to_owned(), change.new.clone());
        }
        row.stamp = stamp;
        Ok(())
    }

    fn delete_row(&mut self, id: RowId) -> Result<()> {
        self.rows.remove(&id).ok_or(Error::RowNotFound(id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NullPlacement;
    use crate::normalize::TieBreak;

    fn list_filter(list: i64) -> SiblingFilter {
        SiblingFilter::Equals(vec![("list_id".into(), FieldValue::Int(list))])
    }

    fn seeded() -> MemoryStore {
        let mut store = MemoryStore::new();
        for (id, list, pos) in [(1, 1, 1), (2, 1, 2), (3, 1, 3), (4, 2, 1)] {
            store
                .insert_row(
                    NewRow::new(RowId(id)).field("list_id", list).at(pos),
                    id as Stamp,
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn fetch_respects_the_filter() {
        let store = seeded();
        let rows = store.fetch(&list_filter(1)).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.field("list_id") == FieldValue::Int(1)));
    }

    #[test]
    fn aggregates_cover_only_the_scope() {
        let store = seeded();
        assert_eq!(store.min_position(&list_filter(1)).unwrap(), Some(1));
        assert_eq!(store.max_position(&list_filter(1)).unwrap(), Some(3));
        assert_eq!(store.max_position(&list_filter(2)).unwrap(), Some(1));
        assert_eq!(store.max_position(&list_filter(9)).unwrap(), None);
    }

    #[test]
    fn rank_rewrite_reports_rows_changed_and_keeps_stamps() {
        let mut store = seeded();
        // Open a gap, then re-rank.
        let mut changes = ChangeSet::new();
        changes.assign_position(Some(2), Some(9));
        store.update_row(RowId(2), &changes, 10).unwrap();

        let order = RankOrder {
            origin: 1,
            tie_break: TieBreak::OldestFirst,
            nulls: NullPlacement::Last,
        };
        // Row 3 slides into the gap and row 2 lands at the end.
        let changed = store.rank_rewrite(&list_filter(1), &order).unwrap();
        assert_eq!(changed, 2);
        let row = store.get(RowId(2)).unwrap().unwrap();
        assert_eq!(row.position, Some(3));
        assert_eq!(row.stamp, 10);

        // Second pass over the now-dense scope writes nothing.
        assert_eq!(store.rank_rewrite(&list_filter(1), &order).unwrap(), 0);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut store = seeded();
        let err = store
            .insert_row(NewRow::new(RowId(1)).field("list_id", 1i64), 9)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRow(RowId(1))));
    }

    #[test]
    fn missing_rows_surface_not_found() {
        let mut store = MemoryStore::new();
        assert!(matches!(
            store.delete_row(RowId(7)),
            Err(Error::RowNotFound(RowId(7)))
        ));
        assert!(matches!(
            store.update_row(RowId(7), &ChangeSet::new(), 1),
            Err(Error::RowNotFound(RowId(7)))
        ));
    }
}
