//! Time helpers.

use chrono::{DateTime, Duration, Utc};

/// Midnight UTC of the day containing `at`.
pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
	at.date_naive().and_hms_opt(0, 0, 0).map_or(at, |midnight| midnight.and_utc())
}

/// Time remaining until `deadline`, clamped at zero.
pub fn remaining_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
	(deadline - now)
		.max(Duration::zero())
		.to_std()
		.unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn test_start_of_day() {
		let at = Utc.with_ymd_and_hms(2024, 5, 17, 15, 42, 7).unwrap();
		assert_eq!(
			start_of_day(at),
			Utc.with_ymd_and_hms(2024, 5, 17, 0, 0, 0).unwrap()
		);
	}

	#[test]
	fn test_remaining_until_clamps_past_deadlines() {
		let now = Utc::now();
		assert_eq!(remaining_until(now - Duration::seconds(5), now).as_secs(), 0);
		assert_eq!(remaining_until(now + Duration::seconds(90), now).as_secs(), 90);
	}
}
