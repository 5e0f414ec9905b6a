//! Lifecycle rules for tracked orders.
//!
//! The transition table lives here; the engine consults it to narrow every
//! conditional update to statuses the target may legally follow.

pub mod order;

pub use order::{is_valid_transition, legal_predecessors, narrow_expected};
