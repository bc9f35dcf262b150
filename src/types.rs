use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use tabled::Tabled;

/// One normalized booking row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingRecord {
    pub booking_code: String,
    pub booking_date: Option<NaiveDateTime>,
    pub arrival_date: NaiveDate,
    pub departure_date: NaiveDate,
    pub service_city: String,
    pub service_name: String,
    pub region: String,
    pub total_price: f64,
    pub adults: u32,
    pub children: u32,
    pub persons: u32,
    pub country: String,
    pub postal_code: String,
    pub city: String,
    pub service_country: String,
    pub cancelled: bool,
    pub cancellation_date: Option<NaiveDate>,
    pub commission: f64,
    /// Columns without a canonical mapping, keyed by lower-cased header.
    pub extra: BTreeMap<String, String>,
}

impl BookingRecord {
    /// Whole days between arrival and departure, clamped at zero.
    pub fn nights(&self) -> i64 {
        (self.departure_date - self.arrival_date).num_days().max(0)
    }

    pub fn revenue(&self) -> f64 {
        if self.cancelled {
            0.0
        } else {
            self.total_price
        }
    }

    pub fn earned_commission(&self) -> f64 {
        if self.cancelled {
            0.0
        } else {
            self.commission
        }
    }
}

/// Running totals for one group of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Accumulator {
    pub revenue: f64,
    pub commission: f64,
    pub bookings: usize,
    pub cancelled_bookings: usize,
    pub nights: i64,
}

impl Accumulator {
    pub fn add(&mut self, record: &BookingRecord) {
        self.bookings += 1;
        if record.cancelled {
            self.cancelled_bookings += 1;
        } else {
            self.revenue += record.total_price;
            self.commission += record.commission;
        }
        self.nights += record.nights();
    }

    /// Fraction of cancelled bookings in `0.0..=1.0`; zero for an empty group.
    pub fn cancellation_rate(&self) -> f64 {
        if self.bookings == 0 {
            0.0
        } else {
            self.cancelled_bookings as f64 / self.bookings as f64
        }
    }
}

/// Percentage changes against the comparison period. `None` whenever the
/// comparison value is zero or missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Changes {
    pub revenue: Option<f64>,
    pub commission: Option<f64>,
    pub bookings: Option<f64>,
    pub nights: Option<f64>,
    pub cancellation_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateGroup {
    pub key: String,
    /// First service city seen for the group. Only set when grouping by
    /// accommodation.
    pub city: Option<String>,
    pub current: Accumulator,
    pub comparison: Option<Accumulator>,
    pub changes: Changes,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KpiSummary {
    pub total_revenue: f64,
    pub total_commission: f64,
    pub total_bookings: usize,
    pub cancelled_bookings: usize,
    /// Commission per non-cancelled booking.
    pub average_commission: f64,
    /// Percent, `0.0..=100.0`.
    pub cancellation_rate: f64,
    /// Commission of cancelled bookings, i.e. what was lost.
    pub cancelled_commission: f64,
    /// Percent of the gross commission lost to cancellations.
    pub commission_loss_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KpiChanges {
    pub total_revenue: Option<f64>,
    pub total_commission: Option<f64>,
    pub total_bookings: Option<f64>,
    pub average_commission: Option<f64>,
    pub cancelled_bookings: Option<f64>,
    pub cancellation_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiComparison {
    pub current: KpiSummary,
    pub previous: Option<KpiSummary>,
    pub changes: KpiChanges,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPoint {
    /// `YYYY-MM`
    pub month: String,
    /// German short label, e.g. `Mär 2024`.
    pub label: String,
    pub arrivals: usize,
    pub revenue: f64,
    pub commission: f64,
    /// Percent.
    pub cancellation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub revenue: f64,
    pub bookings: usize,
    pub commission: f64,
}

#[derive(Debug, Clone, Tabled)]
pub struct GroupPreviewRow {
    #[tabled(rename = "Rang")]
    pub rank: usize,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Stadt")]
    pub city: String,
    #[tabled(rename = "Umsatz")]
    pub revenue: String,
    #[tabled(rename = "Buchungen")]
    pub bookings: usize,
    #[tabled(rename = "Provision")]
    pub commission: String,
    #[tabled(rename = "Übernachtungen")]
    pub nights: i64,
    #[tabled(rename = "Storno %")]
    pub cancellation_rate: String,
    #[tabled(rename = "Umsatz Änderung")]
    pub revenue_change: String,
}

#[derive(Debug, Clone, Tabled)]
pub struct MonthPreviewRow {
    #[tabled(rename = "Monat")]
    pub month: String,
    #[tabled(rename = "Umsatz")]
    pub revenue: String,
    #[tabled(rename = "Umsatz Vorjahr")]
    pub previous_revenue: String,
    #[tabled(rename = "Änderung")]
    pub revenue_change: String,
    #[tabled(rename = "Buchungen")]
    pub bookings: usize,
    #[tabled(rename = "Buchungen Vorjahr")]
    pub previous_bookings: usize,
    #[tabled(rename = "Stornoquote")]
    pub cancellation_rate: String,
}

#[derive(Debug, Clone, Tabled)]
pub struct RecordPreviewRow {
    #[tabled(rename = "Buchungscode")]
    pub booking_code: String,
    #[tabled(rename = "Anreise")]
    pub arrival: String,
    #[tabled(rename = "Abreise")]
    pub departure: String,
    #[tabled(rename = "Stadt")]
    pub city: String,
    #[tabled(rename = "Unterkunft")]
    pub service_name: String,
    #[tabled(rename = "Gesamtpreis")]
    pub total_price: String,
    #[tabled(rename = "Storniert")]
    pub cancelled: String,
}
