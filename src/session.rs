//! Loaded dataset plus active filter, kept apart from the pure folds.
//!
//! A `Session` never changes in place: loading a file builds a new one,
//! changing the filter returns a new one, and every dashboard is recomputed
//! from scratch.

use crate::error::ImportError;
use crate::filter::{self, FilterSpec, Filtered};
use crate::loader::{self, Import, ImportReport};
use crate::reports::{
    aggregate, daily_trend, kpi_comparison, monthly_comparison, monthly_series, GroupBy,
};
use crate::types::{AggregateGroup, BookingRecord, DailyPoint, KpiComparison, MonthlyPoint};
use crate::view::rank;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct Session {
    records: Vec<BookingRecord>,
    report: ImportReport,
    filter: FilterSpec,
}

/// Everything derived for one filter state.
#[derive(Debug, Clone)]
pub struct Dashboard<'a> {
    pub filtered: Filtered<'a>,
    pub kpis: KpiComparison,
    pub accommodations: Vec<AggregateGroup>,
    pub cities: Vec<AggregateGroup>,
    pub monthly: Vec<MonthlyPoint>,
    pub daily: Vec<DailyPoint>,
    /// Month-by-month table, only in year comparison mode.
    pub year_comparison: Option<Vec<AggregateGroup>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary<'a> {
    pub filter: String,
    pub import: &'a ImportReport,
    pub filtered_bookings: usize,
    pub comparison_bookings: Option<usize>,
    pub kpis: &'a KpiComparison,
}

impl Session {
    pub fn from_import(import: Import) -> Self {
        Self {
            records: import.records,
            report: import.report,
            filter: FilterSpec::default(),
        }
    }

    /// Replace everything with the contents of `text`. The filter resets.
    pub fn load(text: &str) -> Result<Self, ImportError> {
        loader::normalize(text).map(Self::from_import)
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        loader::load_file(path).map(Self::from_import)
    }

    pub fn with_filter(self, filter: FilterSpec) -> Self {
        Self { filter, ..self }
    }

    pub fn records(&self) -> &[BookingRecord] {
        &self.records
    }

    pub fn report(&self) -> &ImportReport {
        &self.report
    }

    pub fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    /// Distinct non-empty regions, sorted.
    pub fn regions(&self) -> Vec<String> {
        distinct(self.records.iter().map(|r| r.region.as_str()))
    }

    /// Distinct non-empty service cities, sorted.
    pub fn service_cities(&self) -> Vec<String> {
        distinct(self.records.iter().map(|r| r.service_city.as_str()))
    }

    /// Arrival years present in the data, ascending.
    pub fn arrival_years(&self) -> Vec<i32> {
        self.records
            .iter()
            .map(|r| r.arrival_date.year())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Earliest and latest arrival date, for bounding a date picker.
    pub fn arrival_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.records.iter().map(|r| r.arrival_date).min()?;
        let max = self.records.iter().map(|r| r.arrival_date).max()?;
        Some((min, max))
    }

    pub fn filtered(&self) -> Filtered<'_> {
        filter::apply(&self.records, &self.filter)
    }

    pub fn dashboard(&self, top_n: usize) -> Dashboard<'_> {
        let filtered = self.filtered();
        let comparison = filtered.comparison.as_deref();
        let current = filtered.current.as_slice();

        let kpis = kpi_comparison(current, comparison);
        let accommodations = rank(
            aggregate(current, comparison, GroupBy::Accommodation),
            top_n,
        );
        let cities = rank(aggregate(current, comparison, GroupBy::City), top_n);
        let monthly = monthly_series(current);
        let daily = daily_trend(current);
        let year_comparison = comparison.map(|prev| monthly_comparison(current, prev));

        Dashboard {
            kpis,
            accommodations,
            cities,
            monthly,
            daily,
            year_comparison,
            filtered,
        }
    }

    pub fn summary<'a>(&'a self, dashboard: &'a Dashboard<'_>) -> Summary<'a> {
        Summary {
            filter: self.filter.to_string(),
            import: &self.report,
            filtered_bookings: dashboard.filtered.current.len(),
            comparison_bookings: dashboard.filtered.comparison.as_ref().map(Vec::len),
            kpis: &dashboard.kpis,
        }
    }
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}
