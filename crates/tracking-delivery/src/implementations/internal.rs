//! In-house delivery fleet.
//!
//! Drivers come from a configured roster and are handed out round-robin.
//! Without live telemetry, a driver's reported position is the fleet depot.

use crate::{DeliveryError, DeliveryFactory, DeliveryInterface, DeliveryRegistry};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracking_types::{
	ConfigSchema, DeliveryConfirmation, DriverAssignment, DriverDetails, DriverRequest, Field,
	FieldType, GeoLocation, ImplementationRegistry, Schema, ValidationError,
};

const DEFAULT_PICKUP_LEAD_MINUTES: i64 = 15;
const DEFAULT_DELIVERY_MINUTES: i64 = 30;

pub struct InternalFleet {
	drivers: Vec<DriverDetails>,
	next: AtomicUsize,
	depot: Option<(f64, f64)>,
	pickup_lead_minutes: i64,
	delivery_minutes: i64,
}

impl InternalFleet {
	pub fn new(
		drivers: Vec<DriverDetails>,
		depot: Option<(f64, f64)>,
		pickup_lead_minutes: i64,
		delivery_minutes: i64,
	) -> Self {
		Self {
			drivers,
			next: AtomicUsize::new(0),
			depot,
			pickup_lead_minutes,
			delivery_minutes,
		}
	}
}

#[async_trait]
impl DeliveryInterface for InternalFleet {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(InternalFleetSchema)
	}

	async fn request_driver(
		&self,
		request: &DriverRequest,
	) -> Result<DriverAssignment, DeliveryError> {
		if self.drivers.is_empty() {
			return Err(DeliveryError::Rejected("no drivers on the roster".into()));
		}
		let index = self.next.fetch_add(1, Ordering::Relaxed) % self.drivers.len();
		let driver = self.drivers[index].clone();

		let now = Utc::now();
		let pickup = request.ready_at.map_or(now, |ready| ready.max(now))
			+ Duration::minutes(self.pickup_lead_minutes);
		Ok(DriverAssignment {
			driver,
			estimated_pickup_time: Some(pickup),
			estimated_delivery_time: Some(pickup + Duration::minutes(self.delivery_minutes)),
		})
	}

	async fn driver_location(
		&self,
		order_id: &str,
		driver_id: &str,
	) -> Result<GeoLocation, DeliveryError> {
		if !self.drivers.iter().any(|d| d.driver_id == driver_id) {
			return Err(DeliveryError::Rejected(format!(
				"driver {} is not on the roster",
				driver_id
			)));
		}
		let (latitude, longitude) = self.depot.ok_or_else(|| {
			DeliveryError::Rejected(format!("no location available for order {}", order_id))
		})?;
		Ok(GeoLocation {
			latitude,
			longitude,
			accuracy: None,
			timestamp: Utc::now(),
		})
	}

	async fn confirm_delivery(
		&self,
		confirmation: &DeliveryConfirmation,
	) -> Result<(), DeliveryError> {
		tracing::info!(
			order_id = %confirmation.order_id,
			driver_id = ?confirmation.driver_id,
			delivered_at = %confirmation.delivered_at,
			"Internal delivery closed"
		);
		Ok(())
	}
}

pub struct InternalFleetSchema;

impl ConfigSchema for InternalFleetSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let driver = Schema::new(
			vec![
				Field::new("driver_id", FieldType::String),
				Field::new("name", FieldType::String),
			],
			vec![
				Field::new("phone", FieldType::String),
				Field::new("vehicle_type", FieldType::String),
				Field::new("vehicle_id", FieldType::String),
			],
		);
		let depot = Schema::new(
			vec![
				Field::new("latitude", FieldType::Float),
				Field::new("longitude", FieldType::Float),
			],
			vec![],
		);
		let minutes = || FieldType::Integer {
			min: Some(0),
			max: Some(24 * 60),
		};

		Schema::new(
			vec![Field::new(
				"drivers",
				FieldType::Array(Box::new(FieldType::Table(driver))),
			)
			.with_validator(|v| match v.as_array() {
				Some(drivers) if !drivers.is_empty() => Ok(()),
				_ => Err("at least one driver is required".to_string()),
			})],
			vec![
				Field::new("depot", FieldType::Table(depot)),
				Field::new("pickup_lead_minutes", minutes()),
				Field::new("delivery_minutes", minutes()),
			],
		)
		.validate(config)
	}
}

fn as_f64(value: &toml::Value) -> Option<f64> {
	value
		.as_float()
		.or_else(|| value.as_integer().map(|i| i as f64))
}

/// Configuration parameters:
/// - `drivers`: roster of `{ driver_id, name, phone?, vehicle_type?, vehicle_id? }` (required)
/// - `depot`: `{ latitude, longitude }` reported as the driver position
/// - `pickup_lead_minutes`: minutes from ready to pickup (default: 15)
/// - `delivery_minutes`: minutes from pickup to delivery (default: 30)
pub fn create_delivery(config: &toml::Value) -> Result<Box<dyn DeliveryInterface>, DeliveryError> {
	InternalFleetSchema
		.validate(config)
		.map_err(|e| DeliveryError::Configuration(e.to_string()))?;

	let drivers: Vec<DriverDetails> = config
		.get("drivers")
		.cloned()
		.ok_or_else(|| DeliveryError::Configuration("drivers is required".into()))?
		.try_into()
		.map_err(|e| DeliveryError::Configuration(format!("invalid driver roster: {}", e)))?;

	let depot = config.get("depot").and_then(|depot| {
		Some((
			as_f64(depot.get("latitude")?)?,
			as_f64(depot.get("longitude")?)?,
		))
	});
	let minutes = |key: &str, default: i64| {
		config
			.get(key)
			.and_then(|v| v.as_integer())
			.unwrap_or(default)
	};

	Ok(Box::new(InternalFleet::new(
		drivers,
		depot,
		minutes("pickup_lead_minutes", DEFAULT_PICKUP_LEAD_MINUTES),
		minutes("delivery_minutes", DEFAULT_DELIVERY_MINUTES),
	)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "internal";
	type Factory = DeliveryFactory;

	fn factory() -> Self::Factory {
		create_delivery
	}
}

impl DeliveryRegistry for Registry {}
