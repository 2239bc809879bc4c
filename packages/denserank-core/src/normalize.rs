use std::cmp::Ordering;

use crate::config::{InsertPolicy, NullPlacement};
use crate::row::{Orderable, Position, RowId, Stamp};

/// Secondary ordering among rows sharing a raw position value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TieBreak {
    OldestFirst,
    NewestFirst,
}

impl TieBreak {
    /// Direction hint derived from the old and new raw position of the row
    /// that triggered the pass. A numeric increase ranks older writes first
    /// among ties; a decrease ranks the most recent write first. Moves
    /// without a numeric direction fall back to the policy default.
    pub fn from_change(
        old: Option<Position>,
        new: Option<Position>,
        policy: InsertPolicy,
    ) -> Self {
        match (old, new) {
            (Some(o), Some(n)) if n > o => TieBreak::OldestFirst,
            (Some(o), Some(n)) if n < o => TieBreak::NewestFirst,
            _ => Self::for_policy(policy),
        }
    }

    /// Policy default: a policy that places new rows toward the front of a
    /// tie ranks the most recent write first, so a fresh top-insert lands
    /// ahead of the row whose position it duplicated.
    pub fn for_policy(policy: InsertPolicy) -> Self {
        match policy {
            InsertPolicy::Top => TieBreak::NewestFirst,
            InsertPolicy::Bottom | InsertPolicy::None => TieBreak::OldestFirst,
        }
    }

    fn cmp_stamps(self, a: Stamp, b: Stamp) -> Ordering {
        match self {
            TieBreak::OldestFirst => a.cmp(&b),
            TieBreak::NewestFirst => b.cmp(&a),
        }
    }
}

/// Ordering key for a ranked rewrite.
#[derive(Clone, Copy, Debug)]
pub struct RankOrder {
    pub origin: Position,
    pub tie_break: TieBreak,
    pub nulls: NullPlacement,
}

/// Compute the minimal set of position writes that makes a scope dense.
///
/// Only rows currently in the list receive a rank; not-in-list rows are
/// never pulled in by a pass. Rows are ordered by raw position, then by
/// stamp in the tie-break direction, then by id so the result is total.
/// The returned writes cover exactly the rows whose rank differs from
/// their current position; a pass over an already-dense scope is empty.
pub fn compute_ranks<R: Orderable>(rows: &[R], order: &RankOrder) -> Vec<(RowId, Position)> {
    let mut in_list: Vec<&R> = rows.iter().filter(|r| r.position().is_some()).collect();
    in_list.sort_by(|a, b| {
        a.position()
            .cmp(&b.position())
            .then_with(|| order.tie_break.cmp_stamps(a.stamp(), b.stamp()))
            .then_with(|| a.row_id().cmp(&b.row_id()))
    });
    in_list
        .iter()
        .enumerate()
        .filter_map(|(idx, row)| {
            let rank = order.origin + idx as Position;
            (row.position() != Some(rank)).then_some((row.row_id(), rank))
        })
        .collect()
}

/// Display ordering: in-list rows by position (stamp and id as tie-breaks),
/// not-in-list rows gathered at the configured end.
pub fn sort_for_display<R: Orderable>(rows: &mut [R], order: &RankOrder) {
    rows.sort_by(|a, b| match (a.position(), b.position()) {
        (Some(pa), Some(pb)) => pa
            .cmp(&pb)
            .then_with(|| order.tie_break.cmp_stamps(a.stamp(), b.stamp()))
            .then_with(|| a.row_id().cmp(&b.row_id())),
        (None, None) => a.row_id().cmp(&b.row_id()),
        (None, Some(_)) => match order.nulls {
            NullPlacement::First => Ordering::Less,
            NullPlacement::Last => Ordering::Greater,
        },
        (Some(_), None) => match order.nulls {
            NullPlacement::First => Ordering::Greater,
            NullPlacement::Last => Ordering::Less,
        },
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MemoryRow;

    fn row(id: i64, position: Option<Position>, stamp: Stamp) -> MemoryRow {
        MemoryRow::new(RowId(id), position, stamp)
    }

    fn order(tie_break: TieBreak) -> RankOrder {
        RankOrder {
            origin: 1,
            tie_break,
            nulls: NullPlacement::Last,
        }
    }

    #[test]
    fn empty_scope_is_a_no_op() {
        let rows: Vec<MemoryRow> = Vec::new();
        assert!(compute_ranks(&rows, &order(TieBreak::OldestFirst)).is_empty());
    }

    #[test]
    fn single_row_ranks_at_origin() {
        let rows = vec![row(1, Some(9), 1)];
        assert_eq!(
            compute_ranks(&rows, &order(TieBreak::OldestFirst)),
            vec![(RowId(1), 1)]
        );
    }

    #[test]
    fn dense_scope_yields_zero_writes() {
        let rows = vec![row(1, Some(1), 1), row(2, Some(2), 2), row(3, Some(3), 3)];
        assert!(compute_ranks(&rows, &order(TieBreak::OldestFirst)).is_empty());
    }

    #[test]
    fn gaps_close_without_reordering() {
        let rows = vec![row(1, Some(1), 1), row(2, Some(5), 2), row(3, Some(9), 3)];
        assert_eq!(
            compute_ranks(&rows, &order(TieBreak::OldestFirst)),
            vec![(RowId(2), 2), (RowId(3), 3)]
        );
    }

    #[test]
    fn duplicate_positions_resolve_by_stamp_direction() {
        let rows = vec![row(1, Some(1), 1), row(2, Some(1), 5)];
        assert_eq!(
            compute_ranks(&rows, &order(TieBreak::OldestFirst)),
            vec![(RowId(2), 2)]
        );
        assert_eq!(
            compute_ranks(&rows, &order(TieBreak::NewestFirst)),
            vec![(RowId(2), 1), (RowId(1), 2)]
        );
    }

    #[test]
    fn null_positions_are_never_ranked() {
        let rows = vec![row(1, Some(2), 1), row(2, None, 2), row(3, Some(7), 3)];
        assert_eq!(
            compute_ranks(&rows, &order(TieBreak::OldestFirst)),
            vec![(RowId(1), 1), (RowId(3), 2)]
        );
    }

    #[test]
    fn equal_stamps_fall_back_to_id() {
        let rows = vec![row(9, Some(4), 3), row(2, Some(4), 3)];
        assert_eq!(
            compute_ranks(&rows, &order(TieBreak::NewestFirst)),
            vec![(RowId(2), 1), (RowId(9), 2)]
        );
    }

    #[test]
    fn direction_hint_follows_the_move() {
        assert_eq!(
            TieBreak::from_change(Some(3), Some(5), InsertPolicy::Bottom),
            TieBreak::OldestFirst
        );
        assert_eq!(
            TieBreak::from_change(Some(3), Some(1), InsertPolicy::Bottom),
            TieBreak::NewestFirst
        );
        // No numeric direction: the policy decides.
        assert_eq!(
            TieBreak::from_change(Some(3), Some(3), InsertPolicy::Top),
            TieBreak::NewestFirst
        );
        assert_eq!(
            TieBreak::from_change(None, Some(1), InsertPolicy::Bottom),
            TieBreak::OldestFirst
        );
    }

    #[test]
    fn display_sort_places_unlisted_rows_at_the_configured_end() {
        let mut rows = vec![row(1, None, 1), row(2, Some(1), 2), row(3, Some(2), 3)];
        sort_for_display(
            &mut rows,
            &RankOrder {
                origin: 1,
                tie_break: TieBreak::OldestFirst,
                nulls: NullPlacement::Last,
            },
        );
        let ids: Vec<i64> = rows.iter().map(|r| r.row_id().0).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        sort_for_display(
            &mut rows,
            &RankOrder {
                origin: 1,
                tie_break: TieBreak::OldestFirst,
                nulls: NullPlacement::First,
            },
        );
        let ids: Vec<i64> = rows.iter().map(|r| r.row_id().0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
