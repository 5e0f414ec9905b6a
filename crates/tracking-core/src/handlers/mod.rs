//! Handlers for the parts of the order lifecycle driven by outside actors.
//!
//! Couriers go through the delivery coordinator, store staff through the
//! store manager. The notification trigger fans committed transitions out to
//! the customer.

pub mod delivery;
pub mod notification;
pub mod store;

pub use delivery::DeliveryCoordinator;
pub use notification::NotificationTrigger;
pub use store::StoreManager;
