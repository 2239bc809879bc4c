use std::collections::BTreeMap;

use crate::row::{FieldValue, Position};
use crate::scope::Scope;

/// Old and new value of one assigned field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldChange {
    pub old: FieldValue,
    pub new: FieldValue,
}

/// Old and new raw position of the row that triggered the mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositionChange {
    pub old: Option<Position>,
    pub new: Option<Position>,
}

/// Dirty tracking for a single mutation.
///
/// An assignment is recorded even when it re-sets the current value: the
/// triggering rules key off the field being part of the change set, not off
/// the value actually differing.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    position: Option<PositionChange>,
    fields: BTreeMap<String, FieldChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign_position(&mut self, old: Option<Position>, new: Option<Position>) {
        self.position = Some(PositionChange { old, new });
    }

    pub fn assign_field(
        &mut self,
        name: impl Into<String>,
        old: impl Into<FieldValue>,
        new: impl Into<FieldValue>,
    ) {
        self.fields.insert(
            name.into(),
            FieldChange {
                old: old.into(),
                new: new.into(),
            },
        );
    }

    pub fn position(&self) -> Option<PositionChange> {
        self.position
    }

    pub fn position_assigned(&self) -> bool {
        self.position.is_some()
    }

    pub fn field_assigned(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn new_value(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).map(|c| &c.new)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldChange)> {
        self.fields.iter().map(|(name, c)| (name.as_str(), c))
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.fields.is_empty()
    }
}

/// Whether an update must be followed by a normalization pass: the position
/// field was assigned, or the scope the row belongs to changed.
pub fn reindex_required(changes: &ChangeSet, scope: &Scope) -> bool {
    changes.position_assigned() || scope.changed_in(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_value_position_write_is_still_an_assignment() {
        let mut changes = ChangeSet::new();
        changes.assign_position(Some(3), Some(3));
        assert!(changes.position_assigned());
        assert!(reindex_required(&changes, &Scope::field("list_id")));
    }

    #[test]
    fn unrelated_field_does_not_force_a_pass() {
        let mut changes = ChangeSet::new();
        changes.assign_field("title", FieldValue::Null, "renamed");
        assert!(!reindex_required(&changes, &Scope::field("list_id")));
    }

    #[test]
    fn scope_field_assignment_forces_a_pass() {
        let mut changes = ChangeSet::new();
        changes.assign_field("list_id", 1i64, 2i64);
        assert!(reindex_required(&changes, &Scope::field("list_id")));
    }
}
