//! Shared types for the order tracking service.
//!
//! Every crate in the workspace depends on this one for the tracking record,
//! its guard/patch pair, query and dashboard types, collaborator payloads
//! and the config validation framework.

/// HTTP request bodies, query strings and the API error type.
pub mod api;
/// Payloads exchanged with courier integrations.
pub mod delivery;
/// Notification requests and dispatch outcomes.
pub mod notification;
/// The tracking record, statuses, actors and conditional-update types.
pub mod order;
/// Store listing, search and dashboard types.
pub mod query;
/// Registry trait for config-selected implementations.
pub mod registry;
/// Storage namespaces.
pub mod storage;
/// Formatting and time helpers.
pub mod utils;
/// Schema checks for implementation config tables.
pub mod validation;

pub use api::*;
pub use delivery::*;
pub use notification::*;
pub use order::*;
pub use query::*;
pub use registry::*;
pub use storage::*;
pub use utils::{remaining_until, start_of_day, truncate_id};
pub use validation::*;
