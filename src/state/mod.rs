//! State module for tracking scheduled work
//!
//! # Components
//!
//! - `WorkItem` / `ItemId`: one unit of fetch work and its key
//! - `ItemState`: where an item is in the scheduling lifecycle
//! - `Batch`: a de-duplicated submission
//! - `Outcome`: the terminal `Success` or classified `Failure` of an item

mod item;
mod outcome;

// Re-export main types
pub use item::{Batch, ItemId, ItemState, WorkItem};
pub use outcome::{Failure, FailureKind, ImageRef, Outcome, PageRecord, Success};
