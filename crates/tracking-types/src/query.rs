//! Listing, search and aggregation types for store-side queries.

use crate::{OrderTracking, OrderTrackingStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which record field a free-text search runs against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
	#[default]
	OrderId,
	Phone,
	CustomerName,
}

impl fmt::Display for SearchType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SearchType::OrderId => f.write_str("order_id"),
			SearchType::Phone => f.write_str("phone"),
			SearchType::CustomerName => f.write_str("customer_name"),
		}
	}
}

impl FromStr for SearchType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"order_id" => Ok(Self::OrderId),
			"phone" => Ok(Self::Phone),
			"customer_name" => Ok(Self::CustomerName),
			other => Err(format!("Unknown search type: {}", other)),
		}
	}
}

/// Case-insensitive substring search against one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSearch {
	pub query: String,
	pub search_type: SearchType,
}

impl TextSearch {
	pub fn matches(&self, record: &OrderTracking) -> bool {
		let needle = self.query.to_lowercase();
		let customer = record.customer_details.as_ref();
		let haystack = match self.search_type {
			SearchType::OrderId => Some(record.order_id.as_str()),
			SearchType::Phone => customer.and_then(|c| c.phone.as_deref()),
			SearchType::CustomerName => customer.and_then(|c| c.name.as_deref()),
		};
		haystack.is_some_and(|value| value.to_lowercase().contains(&needle))
	}
}

/// Filter over tracking records. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
	pub store_id: Option<String>,
	pub statuses: Option<Vec<OrderTrackingStatus>>,
	/// Inclusive lower bound on `created_at`.
	pub created_from: Option<DateTime<Utc>>,
	/// Inclusive upper bound on `created_at`.
	pub created_to: Option<DateTime<Utc>>,
	pub search: Option<TextSearch>,
}

impl OrderQuery {
	pub fn for_store(store_id: impl Into<String>) -> Self {
		Self {
			store_id: Some(store_id.into()),
			..Default::default()
		}
	}

	pub fn matches(&self, record: &OrderTracking) -> bool {
		self.store_id
			.as_ref()
			.is_none_or(|store| *store == record.store_id)
			&& self
				.statuses
				.as_ref()
				.is_none_or(|set| set.is_empty() || set.contains(&record.current_status))
			&& self.created_from.is_none_or(|from| record.created_at >= from)
			&& self.created_to.is_none_or(|to| record.created_at <= to)
			&& self.search.as_ref().is_none_or(|search| search.matches(record))
	}
}

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
	pub page: u32,
	pub page_size: u32,
}

impl PageRequest {
	pub fn new(page: u32, page_size: u32) -> Self {
		Self {
			page: page.max(1),
			page_size: page_size.max(1),
		}
	}

	pub fn offset(&self) -> usize {
		(self.page as usize - 1) * self.page_size as usize
	}
}

impl Default for PageRequest {
	fn default() -> Self {
		Self::new(1, 20)
	}
}

/// A page of results with its derived page count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paged<T> {
	pub items: Vec<T>,
	pub total: u64,
	pub page: u32,
	pub page_size: u32,
	pub total_pages: u64,
}

impl<T> Paged<T> {
	pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
		Self {
			items,
			total,
			page: request.page,
			page_size: request.page_size,
			total_pages: total.div_ceil(request.page_size as u64),
		}
	}
}

/// Per-store dashboard counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
	pub status_counts: BTreeMap<OrderTrackingStatus, u64>,
	pub total_orders: u64,
	pub today_orders: u64,
	pub attention_needed: u64,
}

/// A single recorded store search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
	pub query: String,
	pub search_type: SearchType,
	pub timestamp: DateTime<Utc>,
}

/// Bounded per-store log of recent searches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHistory {
	pub store_id: String,
	pub entries: Vec<SearchHistoryEntry>,
}

impl SearchHistory {
	pub const MAX_ENTRIES: usize = 50;

	/// Appends an entry, dropping the oldest ones beyond the cap.
	pub fn record(&mut self, entry: SearchHistoryEntry) {
		self.entries.push(entry);
		if self.entries.len() > Self::MAX_ENTRIES {
			let excess = self.entries.len() - Self::MAX_ENTRIES;
			self.entries.drain(..excess);
		}
	}

	/// Groups entries by query text, most recently used first.
	pub fn recent(&self, limit: usize) -> Vec<RecentSearch> {
		let mut grouped: Vec<RecentSearch> = Vec::new();
		for entry in &self.entries {
			match grouped.iter_mut().find(|r| r.query == entry.query) {
				Some(existing) => {
					existing.count += 1;
					if entry.timestamp >= existing.last_used {
						existing.last_used = entry.timestamp;
						existing.search_type = entry.search_type;
					}
				},
				None => grouped.push(RecentSearch {
					query: entry.query.clone(),
					search_type: entry.search_type,
					last_used: entry.timestamp,
					count: 1,
				}),
			}
		}
		grouped.sort_by(|a, b| b.last_used.cmp(&a.last_used));
		grouped.truncate(limit);
		grouped
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentSearch {
	pub query: String,
	pub search_type: SearchType,
	pub last_used: DateTime<Utc>,
	pub count: u64,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{CustomerDetails, DeliveryProvider};
	use chrono::Duration;
	use serde_json::Map;

	fn order(id: &str, name: &str, phone: &str) -> OrderTracking {
		let mut rec = OrderTracking::submitted(
			id,
			"S1",
			"C1",
			DeliveryProvider::Internal,
			Map::new(),
			Utc::now(),
		);
		rec.customer_details = Some(CustomerDetails {
			name: Some(name.to_string()),
			phone: Some(phone.to_string()),
		});
		rec
	}

	#[test]
	fn test_text_search_is_case_insensitive_substring() {
		let rec = order("ORD-1001", "Ada Lovelace", "+1 555 0100");
		let search = |q: &str, t| TextSearch {
			query: q.to_string(),
			search_type: t,
		};
		assert!(search("ord-10", SearchType::OrderId).matches(&rec));
		assert!(search("LOVE", SearchType::CustomerName).matches(&rec));
		assert!(search("555", SearchType::Phone).matches(&rec));
		assert!(!search("555", SearchType::CustomerName).matches(&rec));
		// Regex metacharacters are literal
		assert!(!search("ORD.1001", SearchType::OrderId).matches(&rec));
	}

	#[test]
	fn test_query_date_bounds_are_inclusive() {
		let rec = order("O1", "A", "1");
		let query = OrderQuery {
			created_from: Some(rec.created_at),
			created_to: Some(rec.created_at),
			..OrderQuery::for_store("S1")
		};
		assert!(query.matches(&rec));
		let later = OrderQuery {
			created_from: Some(rec.created_at + Duration::seconds(1)),
			..Default::default()
		};
		assert!(!later.matches(&rec));
	}

	#[test]
	fn test_paged_total_pages_rounds_up() {
		let paged: Paged<u8> = Paged::new(vec![], 41, PageRequest::new(1, 20));
		assert_eq!(paged.total_pages, 3);
		let empty: Paged<u8> = Paged::new(vec![], 0, PageRequest::new(1, 20));
		assert_eq!(empty.total_pages, 0);
	}

	#[test]
	fn test_search_history_caps_and_groups() {
		let start = Utc::now();
		let mut history = SearchHistory::default();
		for i in 0..60 {
			history.record(SearchHistoryEntry {
				query: format!("q{}", i % 3),
				search_type: SearchType::OrderId,
				timestamp: start + Duration::seconds(i),
			});
		}
		assert_eq!(history.entries.len(), SearchHistory::MAX_ENTRIES);

		let recent = history.recent(5);
		assert_eq!(recent.len(), 3);
		assert_eq!(recent[0].query, "q2");
		assert_eq!(recent.iter().map(|r| r.count).sum::<u64>(), 50);
	}
}
