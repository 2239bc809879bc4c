#![forbid(unsafe_code)]
//! Dense, gapless position maintenance for scoped row lists with pluggable storage.
//! This crate stays independent of concrete storage engines so it can sit on SQLite,
//! Postgres, or any host that can satisfy the traits defined here.
//!
//! All calls are synchronous and blocking. The read-rank-write sequence of a
//! pass is not isolated by itself: two concurrent mutations against the same
//! scope can race and briefly reintroduce duplicate or gapped positions,
//! which the next pass over that scope repairs. Callers that need stronger
//! guarantees wrap mutation plus normalization in a storage-level
//! transaction or serialize per scope themselves.

pub mod assign;
pub mod change;
pub mod config;
pub mod error;
pub mod keeper;
pub mod normalize;
pub mod row;
pub mod scope;
pub mod traits;

pub use change::{reindex_required, ChangeSet, FieldChange, PositionChange};
pub use config::{InsertPolicy, ListConfig, NullPlacement};
pub use error::{Error, Result};
pub use keeper::ListKeeper;
pub use normalize::{compute_ranks, sort_for_display, RankOrder, TieBreak};
pub use row::{FieldValue, NewRow, Orderable, Position, RowId, Stamp};
pub use scope::{Predicate, Scope, SiblingFilter};
#[cfg(feature = "wall-clock")]
pub use traits::WallClock;
pub use traits::{MemoryRow, MemoryStore, RankStore, SequenceClock, StampClock};
