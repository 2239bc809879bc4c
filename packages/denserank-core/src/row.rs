use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Monotonic last-modified tick, advanced on every write. Used only as the
/// tie-break signal when rows share a raw position value.
pub type Stamp = u64;

/// Integer rank of a row within its scope. A row whose position is `None`
/// is not part of any order.
pub type Position = i64;

/// Unique, immutable identifier for a row.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RowId(pub i64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Value domain for scope key fields.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

/// Read capability a host row type must provide so the core can resolve
/// scopes and rank siblings. Writes go through the store, never through
/// this trait.
pub trait Orderable {
    fn row_id(&self) -> RowId;
    fn position(&self) -> Option<Position>;
    fn stamp(&self) -> Stamp;
    /// Current value of a scope field. Fields the row does not carry read
    /// as null.
    fn field(&self, name: &str) -> FieldValue;
}

/// A row about to be inserted.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NewRow {
    pub id: RowId,
    pub position: Option<Position>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl NewRow {
    pub fn new(id: RowId) -> Self {
        Self {
            id,
            position: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Request an explicit position instead of the policy default.
    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn value(&self, name: &str) -> FieldValue {
        self.fields.get(name).cloned().unwrap_or(FieldValue::Null)
    }
}
