use crate::change::ChangeSet;
use crate::row::{FieldValue, Orderable};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Boolean filter expression over row fields. A typed tree instead of a raw
/// string so the in-memory store can evaluate the exact filter the SQL
/// adapters render.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Predicate {
    Eq(String, FieldValue),
    Ne(String, FieldValue),
    IsNull(String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn matches(&self, row: &impl Orderable) -> bool {
        match self {
            Predicate::Eq(name, value) => row.field(name) == *value,
            Predicate::Ne(name, value) => row.field(name) != *value,
            Predicate::IsNull(name) => row.field(name).is_null(),
            Predicate::And(parts) => parts.iter().all(|p| p.matches(row)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(row)),
        }
    }

    /// Every field name the expression references.
    pub fn fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut Vec<String>) {
        match self {
            Predicate::Eq(name, _) | Predicate::Ne(name, _) | Predicate::IsNull(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Predicate::And(parts) | Predicate::Or(parts) => {
                for p in parts {
                    p.collect_fields(out);
                }
            }
        }
    }
}

/// How sibling rows are identified: a single field equality, a conjunction
/// of field equalities, or an arbitrary boolean predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Scope {
    Field(String),
    Fields(Vec<String>),
    Predicate(Predicate),
}

impl Scope {
    pub fn field(name: impl Into<String>) -> Self {
        Scope::Field(name.into())
    }

    /// Field names the scope depends on.
    pub fn fields(&self) -> Vec<String> {
        match self {
            Scope::Field(name) => vec![name.clone()],
            Scope::Fields(names) => names.clone(),
            Scope::Predicate(p) => p.fields(),
        }
    }

    /// True if the current mutation assigned any field the scope references.
    pub fn changed_in(&self, changes: &ChangeSet) -> bool {
        self.fields().iter().any(|name| changes.field_assigned(name))
    }

    /// Resolve the filter that selects exactly the siblings of a row with
    /// the given field values (the row itself included).
    pub fn filter_with<F>(&self, lookup: F) -> SiblingFilter
    where
        F: Fn(&str) -> FieldValue,
    {
        match self {
            Scope::Field(name) => SiblingFilter::Equals(vec![(name.clone(), lookup(name))]),
            Scope::Fields(names) => SiblingFilter::Equals(
                names.iter().map(|n| (n.clone(), lookup(n))).collect(),
            ),
            Scope::Predicate(p) => SiblingFilter::Where(p.clone()),
        }
    }
}

/// A resolved sibling filter, ready to hand to a store. Stores must apply it
/// against the unfiltered base table: an unrelated default display filter
/// would silently exclude siblings and corrupt the ranking.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SiblingFilter {
    Equals(Vec<(String, FieldValue)>),
    Where(Predicate),
}

impl SiblingFilter {
    pub fn matches(&self, row: &impl Orderable) -> bool {
        match self {
            SiblingFilter::Equals(pairs) => pairs.iter().all(|(name, v)| row.field(name) == *v),
            SiblingFilter::Where(p) => p.matches(row),
        }
    }
}
