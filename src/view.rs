//! Table concerns layered over the aggregate lists: ordering, top-N,
//! pagination, search and severity colouring.

use crate::types::{AggregateGroup, BookingRecord};
use crate::util::format_date;
use serde::Serialize;
use std::cmp::Ordering;

/// Rows shown in the accommodation and city rankings.
pub const DEFAULT_TOP_N: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Key,
    Revenue,
    Commission,
    Bookings,
    Nights,
    CancelledBookings,
    CancellationRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

fn compare(a: &AggregateGroup, b: &AggregateGroup, key: SortKey) -> Ordering {
    let (x, y) = (&a.current, &b.current);
    let float = |l: f64, r: f64| l.partial_cmp(&r).unwrap_or(Ordering::Equal);
    match key {
        SortKey::Key => a.key.cmp(&b.key),
        SortKey::Revenue => float(x.revenue, y.revenue),
        SortKey::Commission => float(x.commission, y.commission),
        SortKey::Bookings => x.bookings.cmp(&y.bookings),
        SortKey::Nights => x.nights.cmp(&y.nights),
        SortKey::CancelledBookings => x.cancelled_bookings.cmp(&y.cancelled_bookings),
        SortKey::CancellationRate => float(x.cancellation_rate(), y.cancellation_rate()),
    }
}

/// Stable sort: groups that compare equal keep their relative order.
pub fn sort_groups(groups: &mut [AggregateGroup], key: SortKey, order: SortOrder) {
    groups.sort_by(|a, b| {
        let ord = compare(a, b, key);
        match order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    });
}

/// Revenue descending, truncated to `n`.
pub fn rank(mut groups: Vec<AggregateGroup>, n: usize) -> Vec<AggregateGroup> {
    sort_groups(&mut groups, SortKey::Revenue, SortOrder::Descending);
    groups.truncate(n);
    groups
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CancellationSeverity {
    Low,
    Medium,
    High,
}

/// Classify a cancellation rate given as a fraction (`0.15` = 15%).
pub fn cancellation_severity(rate: f64) -> CancellationSeverity {
    if rate >= 0.2 {
        CancellationSeverity::High
    } else if rate >= 0.1 {
        CancellationSeverity::Medium
    } else {
        CancellationSeverity::Low
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// Slice out one page. Out-of-range pages are empty; a zero page size is
/// treated as one item per page.
pub fn paginate<T: Clone>(items: &[T], req: PageRequest) -> Page<T> {
    let per_page = req.per_page.max(1);
    let page = req.page.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(per_page);
    let start = (page - 1).saturating_mul(per_page).min(total);
    let end = start.saturating_add(per_page).min(total);
    Page {
        items: items[start..end].to_vec(),
        page,
        per_page,
        total,
        total_pages,
    }
}

/// Case-insensitive substring search across the textual columns of the
/// booking table, including the formatted dates. An empty term matches
/// everything.
pub fn search_records<'a>(records: &[&'a BookingRecord], term: &str) -> Vec<&'a BookingRecord> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .copied()
        .filter(|r| {
            let dates = [
                format_date(r.arrival_date),
                format_date(r.departure_date),
            ];
            let hit = [
                r.booking_code.as_str(),
                r.service_city.as_str(),
                r.service_name.as_str(),
                r.region.as_str(),
                r.country.as_str(),
                r.postal_code.as_str(),
                r.city.as_str(),
                r.service_country.as_str(),
            ]
            .into_iter()
            .chain(dates.iter().map(String::as_str))
            .any(|field| field.to_lowercase().contains(&needle));
            hit
        })
        .collect()
}

/// Default order of the booking table: newest booking first, records
/// without a timestamp last.
pub fn sort_by_booking_date_desc(records: &mut [&BookingRecord]) {
    records.sort_by(|a, b| b.booking_date.cmp(&a.booking_date));
}
