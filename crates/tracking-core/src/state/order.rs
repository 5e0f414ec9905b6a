//! Order tracking state machine.
//!
//! Orders move along SUBMITTED -> STORE_NOTIFIED -> STORE_ACKNOWLEDGED ->
//! PICKING_IN_PROGRESS -> (SUBSTITUTIONS_NEEDED -> SUBSTITUTIONS_APPROVED ->)
//! PACKING_IN_PROGRESS -> READY_FOR_PICKUP -> DRIVER_ASSIGNED -> ... ->
//! IN_TRANSIT -> DELIVERED. FAILED and CANCELLED branch off most states;
//! once an order has left the store it can fail but no longer be cancelled.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use tracking_types::OrderTrackingStatus::{self, *};

/// Static transition table - each state maps to allowed next states.
static TRANSITIONS: Lazy<HashMap<OrderTrackingStatus, HashSet<OrderTrackingStatus>>> =
	Lazy::new(|| {
		let mut m = HashMap::new();

		let mut allow = |from: OrderTrackingStatus, to: &[OrderTrackingStatus]| {
			let mut next: HashSet<_> = to.iter().copied().collect();
			// Stores can flag substitutions at any point before the order is closed
			next.insert(SubstitutionsNeeded);
			m.insert(from, next);
		};

		allow(Submitted, &[StoreNotified, StoreAcknowledged, Failed, Cancelled]);
		allow(StoreNotified, &[StoreAcknowledged, Failed, Cancelled]);
		allow(StoreAcknowledged, &[PickingInProgress, Failed, Cancelled]);
		allow(
			PickingInProgress,
			&[PackingInProgress, ReadyForPickup, Failed, Cancelled],
		);
		allow(SubstitutionsNeeded, &[SubstitutionsApproved, Failed, Cancelled]);
		allow(
			SubstitutionsApproved,
			&[PackingInProgress, ReadyForPickup, Failed, Cancelled],
		);
		allow(PackingInProgress, &[ReadyForPickup, Failed, Cancelled]);
		allow(ReadyForPickup, &[DriverAssigned, Failed, Cancelled]);
		allow(DriverAssigned, &[DriverEnRouteToStore, Failed, Cancelled]);
		allow(DriverEnRouteToStore, &[DriverArrivedAtStore, Failed, Cancelled]);
		allow(DriverArrivedAtStore, &[DriverPickupComplete, Failed, Cancelled]);
		allow(DriverPickupComplete, &[InTransit, Failed]);
		allow(InTransit, &[Delivered, Failed]);

		for terminal in [Delivered, Failed, Cancelled] {
			m.insert(terminal, HashSet::new());
		}
		m
	});

/// Checks if a state transition is valid.
pub fn is_valid_transition(from: OrderTrackingStatus, to: OrderTrackingStatus) -> bool {
	TRANSITIONS
		.get(&from)
		.is_some_and(|next| next.contains(&to))
}

/// Every non-terminal status from which `target` may be entered.
pub fn legal_predecessors(target: OrderTrackingStatus) -> Vec<OrderTrackingStatus> {
	OrderTrackingStatus::all()
		.filter(|from| !from.is_terminal() && is_valid_transition(*from, target))
		.collect()
}

/// Intersects a caller's expected statuses with the legal predecessors of
/// `target`, preserving the caller's order.
pub fn narrow_expected(
	expected: &[OrderTrackingStatus],
	target: OrderTrackingStatus,
) -> Vec<OrderTrackingStatus> {
	expected
		.iter()
		.copied()
		.filter(|from| !from.is_terminal() && is_valid_transition(*from, target))
		.collect()
}
