use crate::row::Position;
use crate::scope::Scope;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where a new row enters its list when no explicit position is supplied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InsertPolicy {
    /// New rows take the current minimum position; the duplicate this
    /// creates is resolved by the next normalization pass.
    Top,
    /// New rows take max + 1.
    #[default]
    Bottom,
    /// New rows stay out of the list until explicitly positioned.
    None,
}

impl InsertPolicy {
    /// Which end not-in-list rows sort to in display queries.
    pub fn null_placement(self) -> NullPlacement {
        match self {
            InsertPolicy::Top => NullPlacement::First,
            InsertPolicy::Bottom | InsertPolicy::None => NullPlacement::Last,
        }
    }
}

/// Display placement for rows whose position is null.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NullPlacement {
    First,
    Last,
}

/// Static configuration for one ordered list.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ListConfig {
    pub scope: Scope,
    /// Smallest position of the dense sequence.
    pub origin: Position,
    pub policy: InsertPolicy,
}

impl ListConfig {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            origin: 1,
            policy: InsertPolicy::default(),
        }
    }

    pub fn origin(mut self, origin: Position) -> Self {
        self.origin = origin;
        self
    }

    pub fn policy(mut self, policy: InsertPolicy) -> Self {
        self.policy = policy;
        self
    }
}
