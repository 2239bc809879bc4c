use crate::assign;
use crate::change::{reindex_required, ChangeSet};
use crate::config::ListConfig;
use crate::error::{Error, Result};
use crate::normalize::{sort_for_display, RankOrder, TieBreak};
use crate::row::{FieldValue, NewRow, Orderable, Position, RowId};
use crate::scope::SiblingFilter;
use crate::traits::{RankStore, SequenceClock, StampClock};

/// Facade wiring entity lifecycle events to scope resolution, position
/// assignment, and normalization over a pluggable store.
pub struct ListKeeper<S, C = SequenceClock>
where
    S: RankStore,
    C: StampClock,
{
    store: S,
    config: ListConfig,
    clock: C,
    defer_reindex: bool,
    deferred: Vec<SiblingFilter>,
}

impl<S: RankStore> ListKeeper<S, SequenceClock> {
    pub fn new(store: S, config: ListConfig) -> Self {
        Self::with_clock(store, config, SequenceClock::default())
    }
}

impl<S, C> ListKeeper<S, C>
where
    S: RankStore,
    C: StampClock,
{
    pub fn with_clock(store: S, config: ListConfig, clock: C) -> Self {
        Self {
            store,
            config,
            clock,
            defer_reindex: false,
            deferred: Vec::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ListConfig {
        &self.config
    }

    /// Insert a row. When no explicit position was supplied the insertion
    /// policy assigns one; the scope is then re-ranked, unless this runs
    /// inside [`bulk_load`](Self::bulk_load).
    pub fn insert(&mut self, mut row: NewRow) -> Result<RowId> {
        let filter = self.config.scope.filter_with(|name| row.value(name));
        if row.position.is_none() {
            row.position = assign::initial_position(&self.store, &filter, &self.config)?;
        }
        let id = row.id;
        let stamp = self.clock.tick();
        self.store.insert_row(row, stamp)?;
        if self.defer_reindex {
            if !self.deferred.contains(&filter) {
                self.deferred.push(filter);
            }
        } else {
            self.reindex(&filter, TieBreak::for_policy(self.config.policy))?;
        }
        Ok(id)
    }

    /// Move a row to an explicit position, or out of the list with `None`.
    /// Re-setting the current value still counts as a position write and
    /// forces a pass.
    pub fn set_position(&mut self, id: RowId, to: Option<Position>) -> Result<()> {
        let row = self.require(id)?;
        let mut changes = ChangeSet::new();
        changes.assign_position(row.position(), to);
        self.apply_update(row, changes)
    }

    /// Assign scope (or other) fields, dirty-tracking their old values.
    pub fn update_fields(&mut self, id: RowId, assignments: &[(&str, FieldValue)]) -> Result<()> {
        let row = self.require(id)?;
        let mut changes = ChangeSet::new();
        for (name, value) in assignments {
            changes.assign_field(*name, row.field(name), value.clone());
        }
        self.apply_update(row, changes)
    }

    /// Entry point for callers that track changes themselves.
    pub fn update(&mut self, id: RowId, changes: ChangeSet) -> Result<()> {
        let row = self.require(id)?;
        self.apply_update(row, changes)
    }

    /// Remove a row; the now-smaller scope is re-ranked unconditionally.
    pub fn remove(&mut self, id: RowId) -> Result<()> {
        let row = self.require(id)?;
        let filter = self.config.scope.filter_with(|name| row.field(name));
        self.store.delete_row(id)?;
        self.reindex(&filter, TieBreak::for_policy(self.config.policy))?;
        Ok(())
    }

    /// Run one normalization pass over a scope, returning the number of
    /// rows rewritten. Idempotent: a second call without an intervening
    /// mutation rewrites zero rows.
    pub fn normalize(&mut self, filter: &SiblingFilter) -> Result<u64> {
        self.reindex(filter, TieBreak::for_policy(self.config.policy))
    }

    /// Siblings in display order: in-list rows by position, not-in-list
    /// rows gathered at the end the insertion policy configures.
    pub fn list(&self, filter: &SiblingFilter) -> Result<Vec<S::Row>> {
        let mut rows = self.store.fetch(filter)?;
        let order = self.rank_order(TieBreak::for_policy(self.config.policy));
        sort_for_display(&mut rows, &order);
        Ok(rows)
    }

    /// Filter selecting the siblings of an existing row.
    pub fn scope_of(&self, id: RowId) -> Result<SiblingFilter> {
        let row = self.require(id)?;
        Ok(self.config.scope.filter_with(|name| row.field(name)))
    }

    /// Suppress post-insert normalization for the duration of the closure.
    /// Each scope touched inside is re-ranked once when the outermost block
    /// ends, whether or not the closure succeeded: its rows were already
    /// persisted.
    pub fn bulk_load<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let outer = self.defer_reindex;
        self.defer_reindex = true;
        let outcome = f(&mut *self);
        self.defer_reindex = outer;
        if outer {
            return outcome;
        }
        let deferred = std::mem::take(&mut self.deferred);
        let mut flush = Ok(());
        for filter in &deferred {
            if let Err(err) = self.reindex(filter, TieBreak::for_policy(self.config.policy)) {
                flush = Err(err);
                break;
            }
        }
        let value = outcome?;
        flush?;
        Ok(value)
    }

    fn apply_update(&mut self, row: S::Row, changes: ChangeSet) -> Result<()> {
        let id = row.row_id();
        let old_filter = self.config.scope.filter_with(|name| row.field(name));
        let stamp = self.clock.tick();
        self.store.update_row(id, &changes, stamp)?;
        if !reindex_required(&changes, &self.config.scope) {
            return Ok(());
        }
        let updated = self.require(id)?;
        let new_filter = self.config.scope.filter_with(|name| updated.field(name));
        let hint = match changes.position() {
            Some(change) => TieBreak::from_change(change.old, change.new, self.config.policy),
            None => TieBreak::for_policy(self.config.policy),
        };
        self.reindex(&new_filter, hint)?;
        if new_filter != old_filter {
            // The departed scope closes its gap with the policy default.
            self.reindex(&old_filter, TieBreak::for_policy(self.config.policy))?;
        }
        Ok(())
    }

    fn reindex(&mut self, filter: &SiblingFilter, tie_break: TieBreak) -> Result<u64> {
        let order = self.rank_order(tie_break);
        let rewritten = self.store.rank_rewrite(filter, &order)?;
        tracing::debug!(rewritten, ?tie_break, "scope re-ranked");
        Ok(rewritten)
    }

    fn rank_order(&self, tie_break: TieBreak) -> RankOrder {
        RankOrder {
            origin: self.config.origin,
            tie_break,
            nulls: self.config.policy.null_placement(),
        }
    }

    fn require(&self, id: RowId) -> Result<S::Row> {
        self.store.get(id)?.ok_or(Error::RowNotFound(id))
    }
}
