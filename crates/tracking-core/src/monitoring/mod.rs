//! Background timers attached to tracked orders.

pub mod acknowledgment;

pub use acknowledgment::AcknowledgmentMonitor;
