//! Small helpers shared across the tracking crates.

pub mod formatting;
pub mod helpers;

pub use formatting::truncate_id;
pub use helpers::{remaining_until, start_of_day};
