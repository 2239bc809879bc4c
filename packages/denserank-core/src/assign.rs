use crate::config::{InsertPolicy, ListConfig};
use crate::error::Result;
use crate::row::Position;
use crate::scope::SiblingFilter;
use crate::traits::RankStore;

/// Default position for a row inserted without one.
///
/// `Top` deliberately reuses the current minimum: the duplicate it creates
/// is resolved by the next pass's tie-break, not by shifting siblings here.
pub fn initial_position<S: RankStore>(
    store: &S,
    filter: &SiblingFilter,
    config: &ListConfig,
) -> Result<Option<Position>> {
    match config.policy {
        InsertPolicy::Bottom => {
            let max = store.max_position(filter)?.unwrap_or(config.origin - 1);
            Ok(Some(max + 1))
        }
        InsertPolicy::Top => Ok(Some(store.min_position(filter)?.unwrap_or(config.origin))),
        InsertPolicy::None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{FieldValue, NewRow, RowId};
    use crate::scope::Scope;
    use crate::traits::MemoryStore;

    fn filter() -> SiblingFilter {
        SiblingFilter::Equals(vec![("list_id".into(), FieldValue::Int(1))])
    }

    fn store_with(positions: &[i64]) -> MemoryStore {
        let mut store = MemoryStore::new();
        for (idx, pos) in positions.iter().enumerate() {
            let row = NewRow::new(RowId(idx as i64 + 1))
                .field("list_id", 1i64)
                .at(*pos);
            store.insert_row(row, idx as u64 + 1).unwrap();
        }
        store
    }

    fn config(policy: InsertPolicy) -> ListConfig {
        ListConfig::new(Scope::field("list_id")).policy(policy)
    }

    #[test]
    fn bottom_takes_max_plus_one() {
        let store = store_with(&[1, 2, 3]);
        let pos = initial_position(&store, &filter(), &config(InsertPolicy::Bottom)).unwrap();
        assert_eq!(pos, Some(4));
    }

    #[test]
    fn bottom_on_empty_scope_starts_at_origin() {
        let store = MemoryStore::new();
        let pos = initial_position(&store, &filter(), &config(InsertPolicy::Bottom)).unwrap();
        assert_eq!(pos, Some(1));
        let pos = initial_position(
            &store,
            &filter(),
            &config(InsertPolicy::Bottom).origin(0),
        )
        .unwrap();
        assert_eq!(pos, Some(0));
    }

    #[test]
    fn top_duplicates_the_current_minimum() {
        let store = store_with(&[1, 2, 3]);
        let pos = initial_position(&store, &filter(), &config(InsertPolicy::Top)).unwrap();
        assert_eq!(pos, Some(1));
    }

    #[test]
    fn none_leaves_the_row_unlisted() {
        let store = store_with(&[1, 2]);
        let pos = initial_position(&store, &filter(), &config(InsertPolicy::None)).unwrap();
        assert_eq!(pos, None);
    }
}
