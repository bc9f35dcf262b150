//! Narrowing the record set to a current period and an optional comparison
//! period.

use crate::types::BookingRecord;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Period {
    /// No date restriction.
    #[default]
    All,
    /// Arrival within `start..=end`, whole days.
    Range { start: NaiveDate, end: NaiveDate },
    /// Arrival year `current`, compared against arrival year `comparison`.
    YearComparison { current: i32, comparison: i32 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterSpec {
    pub period: Period,
    /// Exact region match; `None` or empty means all regions.
    pub region: Option<String>,
    /// Exact service city match; `None` or empty means all cities.
    pub service_city: Option<String>,
}

impl FilterSpec {
    pub fn range(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            period: Period::Range { start, end },
            ..Self::default()
        }
    }

    pub fn years(current: i32, comparison: i32) -> Self {
        Self {
            period: Period::YearComparison {
                current,
                comparison,
            },
            ..Self::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_service_city(mut self, city: impl Into<String>) -> Self {
        self.service_city = Some(city.into());
        self
    }

    pub fn is_year_comparison(&self) -> bool {
        matches!(self.period, Period::YearComparison { .. })
    }

    fn matches_attributes(&self, r: &BookingRecord) -> bool {
        let region_ok = match self.region.as_deref() {
            Some(region) if !region.is_empty() => r.region == region,
            _ => true,
        };
        let city_ok = match self.service_city.as_deref() {
            Some(city) if !city.is_empty() => r.service_city == city,
            _ => true,
        };
        region_ok && city_ok
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.period {
            Period::All => write!(f, "alle Anreisen")?,
            Period::Range { start, end } => write!(
                f,
                "Anreise {} bis {}",
                start.format("%d.%m.%Y"),
                end.format("%d.%m.%Y")
            )?,
            Period::YearComparison {
                current,
                comparison,
            } => write!(f, "Anreisejahr {} gegenüber {}", current, comparison)?,
        }
        if let Some(region) = self.region.as_deref().filter(|r| !r.is_empty()) {
            write!(f, ", Region {}", region)?;
        }
        if let Some(city) = self.service_city.as_deref().filter(|c| !c.is_empty()) {
            write!(f, ", Stadt {}", city)?;
        }
        Ok(())
    }
}

/// Result of applying a [`FilterSpec`]. Borrows from the full record set.
#[derive(Debug, Clone, Default)]
pub struct Filtered<'a> {
    pub current: Vec<&'a BookingRecord>,
    pub comparison: Option<Vec<&'a BookingRecord>>,
}

pub fn apply<'a>(records: &'a [BookingRecord], spec: &FilterSpec) -> Filtered<'a> {
    let select = |keep: &dyn Fn(&BookingRecord) -> bool| -> Vec<&'a BookingRecord> {
        records
            .iter()
            .filter(|r| keep(r) && spec.matches_attributes(r))
            .collect()
    };

    let filtered = match spec.period {
        Period::All => Filtered {
            current: select(&|_| true),
            comparison: None,
        },
        Period::Range { start, end } => Filtered {
            current: select(&|r| r.arrival_date >= start && r.arrival_date <= end),
            comparison: None,
        },
        Period::YearComparison {
            current,
            comparison,
        } => Filtered {
            current: select(&|r| r.arrival_date.year() == current),
            comparison: Some(select(&|r| r.arrival_date.year() == comparison)),
        },
    };
    debug!(
        total = records.len(),
        current = filtered.current.len(),
        comparison = filtered.comparison.as_ref().map(Vec::len),
        "filter applied"
    );
    filtered
}
