//! Customer-facing message templates.
//!
//! Each status with a customer-visible meaning has its own title and message.
//! Everything else falls back to a generic "Order Update".

use tracking_types::{
	NotificationChannel, NotificationContent, NotificationContext, OrderTrackingStatus,
};

/// Builds the title and message for a status.
pub fn content_for(status: OrderTrackingStatus, context: &NotificationContext) -> NotificationContent {
	let store_name = context.store_name.as_deref().unwrap_or("the store");
	let driver_name = context
		.driver_name
		.as_deref()
		.unwrap_or("your delivery partner");
	let eta = context
		.eta
		.map(|at| at.format("%H:%M UTC").to_string())
		.unwrap_or_default();

	let (title, message) = match status {
		OrderTrackingStatus::Submitted => (
			"Order Received",
			format!("Your order has been received and sent to {}.", store_name),
		),
		OrderTrackingStatus::StoreAcknowledged => (
			"Order Confirmed",
			format!(
				"{} has confirmed your order and will start preparing it soon.",
				store_name
			),
		),
		OrderTrackingStatus::PickingInProgress => (
			"Order Preparation Started",
			format!("{} has started preparing your order.", store_name),
		),
		OrderTrackingStatus::SubstitutionsNeeded => (
			"Substitutions Required",
			"Some items in your order need substitution. Please check the app to approve or reject."
				.to_string(),
		),
		OrderTrackingStatus::ReadyForPickup => (
			"Order Ready",
			"Your order is ready and waiting for pickup.".to_string(),
		),
		OrderTrackingStatus::DriverAssigned => (
			"Driver Assigned",
			format!("{} will be delivering your order.", driver_name),
		),
		OrderTrackingStatus::DriverPickupComplete => (
			"Order Picked Up",
			format!("Your order is on its way! Estimated delivery time: {}", eta),
		),
		OrderTrackingStatus::Delivered => (
			"Order Delivered",
			"Your order has been delivered. Enjoy!".to_string(),
		),
		other => (
			"Order Update",
			format!("Your order status has been updated to {}", other),
		),
	};

	NotificationContent {
		title: title.to_string(),
		message,
	}
}

/// Formats content for a single channel.
pub fn render(
	channel: NotificationChannel,
	content: &NotificationContent,
	context: &NotificationContext,
) -> String {
	match channel {
		NotificationChannel::Email => {
			let mut body = format!("<h2>{}</h2>\n<p>{}</p>", content.title, content.message);
			for line in email_details(context) {
				body.push('\n');
				body.push_str(&line);
			}
			body
		},
		NotificationChannel::Sms => format!("{}: {}", content.title, content.message),
		NotificationChannel::Whatsapp => format!("*{}*\n\n{}", content.title, content.message),
		NotificationChannel::Push => content.message.clone(),
	}
}

fn email_details(context: &NotificationContext) -> Vec<String> {
	let mut lines = Vec::new();
	if let Some(total) = context.order_total {
		lines.push(format!("<p>Order Total: ${:.2}</p>", total));
	}
	if let Some(eta) = context.eta {
		lines.push(format!(
			"<p>Estimated Delivery Time: {}</p>",
			eta.format("%Y-%m-%d %H:%M UTC")
		));
	}
	if let (Some(name), Some(phone)) = (&context.driver_name, &context.driver_phone) {
		lines.push(format!("<p>Driver: {} (Phone: {})</p>", name, phone));
	}
	lines
}
