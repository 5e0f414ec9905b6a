//! Startup and shutdown of the tracking service.

use super::TrackingService;
use crate::recovery::RecoveryService;
use crate::TrackingError;

impl TrackingService {
	/// Re-arms acknowledgment timers for orders persisted by an earlier run.
	pub async fn initialize(&self) -> Result<(), TrackingError> {
		tracing::info!(service_id = %self.config.service.id, "Initializing tracking service");

		if !self.config.monitor.recover_on_startup {
			tracing::info!("Startup recovery disabled");
			return Ok(());
		}
		let report = RecoveryService::new(self.storage.clone(), self.monitor.clone())
			.recover()
			.await?;
		tracing::info!(
			scanned = report.scanned,
			rearmed = report.rearmed,
			overdue = report.overdue,
			"Recovery complete"
		);
		Ok(())
	}

	/// Releases every pending timer. Orders keep their stored state.
	pub async fn shutdown(&self) -> Result<(), TrackingError> {
		tracing::info!("Shutting down tracking service");
		self.monitor.cancel_all();
		Ok(())
	}
}
