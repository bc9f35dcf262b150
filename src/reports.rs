use crate::types::{
    Accumulator, AggregateGroup, BookingRecord, Changes, DailyPoint, KpiChanges, KpiComparison,
    KpiSummary, MonthlyPoint,
};
use crate::util::{month_name, percent_change};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Grouping key for [`aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    /// Service (accommodation) name.
    Accommodation,
    /// Service city.
    City,
    /// Arrival month as `YYYY-MM`.
    Month,
    /// Arrival month of year as `01`..`12`, for comparing two years.
    MonthOfYear,
}

impl GroupBy {
    fn key(self, r: &BookingRecord) -> Option<String> {
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };
        match self {
            GroupBy::Accommodation => non_empty(&r.service_name),
            GroupBy::City => non_empty(&r.service_city),
            GroupBy::Month => Some(format!(
                "{:04}-{:02}",
                r.arrival_date.year(),
                r.arrival_date.month()
            )),
            GroupBy::MonthOfYear => Some(format!("{:02}", r.arrival_date.month())),
        }
    }
}

/// Insertion-ordered fold of records into per-key accumulators.
#[derive(Default)]
struct Fold {
    index: HashMap<String, usize>,
    groups: Vec<(String, Option<String>, Accumulator)>,
}

impl Fold {
    fn seeded(keys: impl IntoIterator<Item = String>) -> Self {
        let mut fold = Fold::default();
        for key in keys {
            fold.slot(key, None);
        }
        fold
    }

    fn slot(&mut self, key: String, city: Option<String>) -> &mut Accumulator {
        let idx = match self.index.get(&key) {
            Some(idx) => *idx,
            None => {
                let idx = self.groups.len();
                self.index.insert(key.clone(), idx);
                self.groups.push((key, city, Accumulator::default()));
                idx
            }
        };
        &mut self.groups[idx].2
    }

    fn run(mut self, records: &[&BookingRecord], by: GroupBy) -> Self {
        for r in records {
            let Some(key) = by.key(r) else { continue };
            let city = (by == GroupBy::Accommodation).then(|| r.service_city.clone());
            self.slot(key, city).add(r);
        }
        self
    }

    fn get(&self, key: &str) -> Option<&Accumulator> {
        self.index.get(key).map(|idx| &self.groups[*idx].2)
    }
}

fn changes(current: &Accumulator, previous: Option<&Accumulator>) -> Changes {
    Changes {
        revenue: percent_change(current.revenue, previous.map(|p| p.revenue)),
        commission: percent_change(current.commission, previous.map(|p| p.commission)),
        bookings: percent_change(current.bookings as f64, previous.map(|p| p.bookings as f64)),
        nights: percent_change(current.nights as f64, previous.map(|p| p.nights as f64)),
        cancellation_rate: percent_change(
            current.cancellation_rate(),
            previous.map(Accumulator::cancellation_rate),
        ),
    }
}

fn merge(current: Fold, comparison: Option<&Fold>) -> Vec<AggregateGroup> {
    current
        .groups
        .into_iter()
        .map(|(key, city, acc)| {
            let previous = comparison.and_then(|c| c.get(&key)).copied();
            AggregateGroup {
                changes: changes(&acc, previous.as_ref()),
                key,
                city,
                current: acc,
                comparison: previous,
            }
        })
        .collect()
}

/// Fold `current` into groups and attach the matching comparison groups.
///
/// Records without a key (empty accommodation or city) are left out of the
/// grouping. Groups come back in the order their key was first seen; only
/// keys present in `current` appear in the output.
pub fn aggregate(
    current: &[&BookingRecord],
    comparison: Option<&[&BookingRecord]>,
    by: GroupBy,
) -> Vec<AggregateGroup> {
    let cur = Fold::default().run(current, by);
    let cmp = comparison.map(|c| Fold::default().run(c, by));
    let groups = merge(cur, cmp.as_ref());
    debug!(?by, groups = groups.len(), "aggregated");
    groups
}

/// Twelve month-of-year groups (`01`..`12`) for a year against year table.
/// Every month is present, with zero totals where nothing arrived.
pub fn monthly_comparison(
    current: &[&BookingRecord],
    previous: &[&BookingRecord],
) -> Vec<AggregateGroup> {
    let months = || (1..=12).map(|m| format!("{:02}", m));
    let cur = Fold::seeded(months()).run(current, GroupBy::MonthOfYear);
    let prev = Fold::seeded(months()).run(previous, GroupBy::MonthOfYear);
    merge(cur, Some(&prev))
}

/// Display label for a month-of-year key such as `03`.
pub fn month_of_year_label(key: &str) -> &'static str {
    month_name(key.parse().unwrap_or(1))
}

pub fn kpis(records: &[&BookingRecord]) -> KpiSummary {
    let mut acc = Accumulator::default();
    let mut cancelled_commission = 0.0;
    for r in records {
        acc.add(r);
        if r.cancelled {
            cancelled_commission += r.commission;
        }
    }
    let active = acc.bookings - acc.cancelled_bookings;
    let average_commission = if active > 0 {
        acc.commission / active as f64
    } else {
        0.0
    };
    let gross_commission = acc.commission + cancelled_commission;
    let commission_loss_rate = if gross_commission > 0.0 {
        cancelled_commission / gross_commission * 100.0
    } else {
        0.0
    };
    KpiSummary {
        total_revenue: acc.revenue,
        total_commission: acc.commission,
        total_bookings: acc.bookings,
        cancelled_bookings: acc.cancelled_bookings,
        average_commission,
        cancellation_rate: acc.cancellation_rate() * 100.0,
        cancelled_commission,
        commission_loss_rate,
    }
}

pub fn kpi_comparison(
    current: &[&BookingRecord],
    comparison: Option<&[&BookingRecord]>,
) -> KpiComparison {
    let cur = kpis(current);
    let previous = comparison.map(kpis);
    let changes = KpiChanges {
        total_revenue: percent_change(cur.total_revenue, previous.map(|p| p.total_revenue)),
        total_commission: percent_change(
            cur.total_commission,
            previous.map(|p| p.total_commission),
        ),
        total_bookings: percent_change(
            cur.total_bookings as f64,
            previous.map(|p| p.total_bookings as f64),
        ),
        average_commission: percent_change(
            cur.average_commission,
            previous.map(|p| p.average_commission),
        ),
        cancelled_bookings: percent_change(
            cur.cancelled_bookings as f64,
            previous.map(|p| p.cancelled_bookings as f64),
        ),
        cancellation_rate: percent_change(
            cur.cancellation_rate,
            previous.map(|p| p.cancellation_rate),
        ),
    };
    KpiComparison {
        current: cur,
        previous,
        changes,
    }
}

/// Per arrival month, ascending. Feeds the arrivals, commission and
/// cancellation-rate charts.
pub fn monthly_series(records: &[&BookingRecord]) -> Vec<MonthlyPoint> {
    let mut months: BTreeMap<(i32, u32), Accumulator> = BTreeMap::new();
    for r in records {
        let key = (r.arrival_date.year(), r.arrival_date.month());
        months.entry(key).or_default().add(r);
    }
    months
        .into_iter()
        .map(|((year, month), acc)| MonthlyPoint {
            month: format!("{:04}-{:02}", year, month),
            label: format!("{} {}", month_name(month), year),
            arrivals: acc.bookings,
            revenue: acc.revenue,
            commission: acc.commission,
            cancellation_rate: acc.cancellation_rate() * 100.0,
        })
        .collect()
}

/// Longest span of booking days that [`daily_trend`] fills with empty days.
pub const MAX_TREND_DAYS: i64 = 3 * 366;

fn daily_point(date: NaiveDate, acc: &Accumulator) -> DailyPoint {
    DailyPoint {
        date,
        revenue: acc.revenue,
        bookings: acc.bookings,
        commission: acc.commission,
    }
}

/// Per booking day between the first and last booking, with empty days
/// filled in. Records without a booking timestamp are skipped. Spans longer
/// than [`MAX_TREND_DAYS`] only list the days that have bookings.
pub fn daily_trend(records: &[&BookingRecord]) -> Vec<DailyPoint> {
    let mut days: BTreeMap<NaiveDate, Accumulator> = BTreeMap::new();
    for r in records {
        if let Some(ts) = r.booking_date {
            days.entry(ts.date()).or_default().add(r);
        }
    }
    let (Some(first), Some(last)) = (
        days.keys().next().copied(),
        days.keys().next_back().copied(),
    ) else {
        return Vec::new();
    };

    let span = (last - first).num_days();
    if span > MAX_TREND_DAYS {
        warn!(%first, %last, span, "booking days too far apart, trend left sparse");
        return days.iter().map(|(day, acc)| daily_point(*day, acc)).collect();
    }

    let mut points = Vec::new();
    let mut day = first;
    while day <= last {
        let acc = days.get(&day).copied().unwrap_or_default();
        points.push(daily_point(day, &acc));
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{booking, date};
    use chrono::NaiveTime;

    fn refs(records: &[BookingRecord]) -> Vec<&BookingRecord> {
        records.iter().collect()
    }

    #[test]
    fn scenario_single_booking() {
        let records = vec![booking("Hotel A", "Berlin", 100.5, false)];
        let groups = aggregate(&refs(&records), None, GroupBy::Accommodation);
        assert_eq!(groups.len(), 1);
        let g = &groups[0];
        assert_eq!(g.key, "Hotel A");
        assert_eq!(g.city.as_deref(), Some("Berlin"));
        assert_eq!(g.current.revenue, 100.5);
        assert_eq!(g.current.bookings, 1);
        assert_eq!(g.current.cancelled_bookings, 0);
        assert_eq!(g.current.nights, 2);
        assert_eq!(g.comparison, None);
        assert_eq!(g.changes, Changes::default());
    }

    #[test]
    fn scenario_cancelled_booking() {
        let records = vec![booking("Hotel A", "Berlin", 100.5, true)];
        let g = &aggregate(&refs(&records), None, GroupBy::Accommodation)[0];
        assert_eq!(g.current.revenue, 0.0);
        assert_eq!(g.current.commission, 0.0);
        assert_eq!(g.current.bookings, 1);
        assert_eq!(g.current.cancelled_bookings, 1);
        assert_eq!(g.current.nights, 2);
    }

    #[test]
    fn revenue_change_against_comparison() {
        let current = vec![booking("Hotel A", "Berlin", 200.0, false)];
        let previous = vec![booking("Hotel A", "Berlin", 100.0, false)];
        let prev_refs = refs(&previous);
        let g = &aggregate(&refs(&current), Some(prev_refs.as_slice()), GroupBy::Accommodation)[0];
        assert_eq!(g.changes.revenue, Some(100.0));
        assert_eq!(g.changes.bookings, Some(0.0));
        assert_eq!(g.comparison.map(|c| c.revenue), Some(100.0));
    }

    #[test]
    fn missing_comparison_group_leaves_change_undefined() {
        let current = vec![booking("Hotel A", "Berlin", 200.0, false)];
        let previous = vec![booking("Hotel B", "Berlin", 100.0, false)];
        let prev_refs = refs(&previous);
        let groups = aggregate(&refs(&current), Some(prev_refs.as_slice()), GroupBy::Accommodation);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].comparison, None);
        assert_eq!(groups[0].changes.revenue, None);
    }

    #[test]
    fn zero_comparison_value_leaves_change_undefined() {
        let current = vec![booking("Hotel A", "Berlin", 200.0, true)];
        let previous = vec![booking("Hotel A", "Berlin", 100.0, true)];
        let prev_refs = refs(&previous);
        let g = &aggregate(&refs(&current), Some(prev_refs.as_slice()), GroupBy::Accommodation)[0];
        assert_eq!(g.comparison.map(|c| c.revenue), Some(0.0));
        assert_eq!(g.changes.revenue, None);
        assert_eq!(g.changes.commission, None);
        assert_eq!(g.changes.cancellation_rate, Some(0.0));
    }

    #[test]
    fn cancellation_rate_change() {
        let current = vec![
            booking("Hotel A", "Berlin", 100.0, true),
            booking("Hotel A", "Berlin", 100.0, false),
        ];
        let previous = vec![
            booking("Hotel A", "Berlin", 100.0, true),
            booking("Hotel A", "Berlin", 100.0, false),
            booking("Hotel A", "Berlin", 100.0, false),
            booking("Hotel A", "Berlin", 100.0, false),
        ];
        let prev_refs = refs(&previous);
        let g = &aggregate(&refs(&current), Some(prev_refs.as_slice()), GroupBy::Accommodation)[0];
        // 50% against 25%
        assert_eq!(g.changes.cancellation_rate, Some(100.0));
    }

    #[test]
    fn empty_keys_are_excluded() {
        let records = vec![
            booking("", "Berlin", 50.0, false),
            booking("Hotel A", "", 70.0, false),
        ];
        let by_name = aggregate(&refs(&records), None, GroupBy::Accommodation);
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].key, "Hotel A");
        let by_city = aggregate(&refs(&records), None, GroupBy::City);
        assert_eq!(by_city.len(), 1);
        assert_eq!(by_city[0].key, "Berlin");
        assert_eq!(by_city[0].city, None);
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let records = vec![
            booking("C", "Berlin", 1.0, false),
            booking("A", "Berlin", 3.0, false),
            booking("C", "Berlin", 1.0, false),
            booking("B", "Berlin", 2.0, false),
        ];
        let keys: Vec<_> = aggregate(&refs(&records), None, GroupBy::Accommodation)
            .into_iter()
            .map(|g| g.key)
            .collect();
        assert_eq!(keys, vec!["C", "A", "B"]);
    }

    #[test]
    fn month_grouping_keys() {
        let mut march = booking("Hotel A", "Berlin", 10.0, false);
        march.arrival_date = date(15, 3, 2023);
        march.departure_date = date(16, 3, 2023);
        let records = vec![march];
        let by_month = aggregate(&refs(&records), None, GroupBy::Month);
        assert_eq!(by_month[0].key, "2023-03");
        let by_moy = aggregate(&refs(&records), None, GroupBy::MonthOfYear);
        assert_eq!(by_moy[0].key, "03");
        assert_eq!(month_of_year_label(&by_moy[0].key), "Mär");
    }

    #[test]
    fn monthly_comparison_has_twelve_months() {
        let current = vec![booking("Hotel A", "Berlin", 200.0, false)];
        let mut last_year = booking("Hotel A", "Berlin", 100.0, false);
        last_year.arrival_date = date(5, 1, 2023);
        last_year.departure_date = date(6, 1, 2023);
        let previous = vec![last_year];
        let months = monthly_comparison(&refs(&current), &refs(&previous));
        assert_eq!(months.len(), 12);
        assert_eq!(months[0].key, "01");
        assert_eq!(months[0].changes.revenue, Some(100.0));
        assert_eq!(months[0].changes.nights, Some(100.0));
        assert_eq!(months[11].key, "12");
        assert_eq!(months[11].current.bookings, 0);
        assert_eq!(months[11].changes.revenue, None);
    }

    #[test]
    fn kpis_follow_cancellation_rules() {
        let records = vec![
            booking("Hotel A", "Berlin", 100.0, false),
            booking("Hotel A", "Berlin", 300.0, false),
            booking("Hotel B", "Berlin", 200.0, true),
            booking("Hotel B", "Berlin", 400.0, false),
        ];
        let k = kpis(&refs(&records));
        assert_eq!(k.total_bookings, 4);
        assert_eq!(k.cancelled_bookings, 1);
        assert_eq!(k.total_revenue, 800.0);
        assert!((k.total_commission - 80.0).abs() < 1e-9);
        assert!((k.average_commission - 80.0 / 3.0).abs() < 1e-9);
        assert_eq!(k.cancellation_rate, 25.0);
        assert!((k.cancelled_commission - 20.0).abs() < 1e-9);
        assert!((k.commission_loss_rate - 20.0).abs() < 1e-9);
    }

    #[test]
    fn kpis_of_empty_set_are_zero() {
        assert_eq!(kpis(&[]), KpiSummary::default());
        let all_cancelled = vec![booking("Hotel A", "Berlin", 100.0, true)];
        assert_eq!(kpis(&refs(&all_cancelled)).average_commission, 0.0);
    }

    #[test]
    fn kpi_comparison_changes() {
        let current = vec![booking("Hotel A", "Berlin", 300.0, false)];
        let previous = vec![booking("Hotel A", "Berlin", 200.0, false)];
        let prev_refs = refs(&previous);
        let cmp = kpi_comparison(&refs(&current), Some(prev_refs.as_slice()));
        assert_eq!(cmp.changes.total_revenue, Some(50.0));
        assert_eq!(cmp.changes.cancellation_rate, None);
        let alone = kpi_comparison(&refs(&current), None);
        assert!(alone.previous.is_none());
        assert_eq!(alone.changes, KpiChanges::default());
    }

    #[test]
    fn monthly_series_is_sorted_and_labelled() {
        let mut feb = booking("Hotel A", "Berlin", 50.0, true);
        feb.arrival_date = date(1, 2, 2024);
        feb.departure_date = date(2, 2, 2024);
        let mut dec = booking("Hotel A", "Berlin", 70.0, false);
        dec.arrival_date = date(30, 12, 2023);
        dec.departure_date = date(31, 12, 2023);
        let records = vec![feb, dec];
        let series = monthly_series(&refs(&records));
        let months: Vec<_> = series.iter().map(|p| p.month.as_str()).collect();
        assert_eq!(months, vec!["2023-12", "2024-02"]);
        assert_eq!(series[0].label, "Dez 2023");
        assert_eq!(series[1].cancellation_rate, 100.0);
        assert_eq!(series[1].arrivals, 1);
    }

    #[test]
    fn daily_trend_fills_gaps() {
        let at = |d: u32| Some(date(d, 1, 2024).and_time(NaiveTime::MIN));
        let mut a = booking("Hotel A", "Berlin", 10.0, false);
        a.booking_date = at(1);
        let mut b = booking("Hotel A", "Berlin", 20.0, false);
        b.booking_date = at(4);
        let no_timestamp = booking("Hotel A", "Berlin", 99.0, false);
        let records = vec![b, a, no_timestamp];
        let trend = daily_trend(&refs(&records));
        assert_eq!(trend.len(), 4);
        assert_eq!(trend[0].revenue, 10.0);
        assert_eq!(trend[1].bookings, 0);
        assert_eq!(trend[3].revenue, 20.0);
        assert!(daily_trend(&[]).is_empty());
    }

    #[test]
    fn distant_booking_days_are_not_gap_filled() {
        let mut a = booking("Hotel A", "Berlin", 10.0, false);
        a.booking_date = Some(date(1, 1, 2024).and_time(NaiveTime::MIN));
        let mut b = booking("Hotel A", "Berlin", 20.0, false);
        b.booking_date = Some(date(1, 1, 24).and_time(NaiveTime::MIN));
        let records = vec![a, b];
        let trend = daily_trend(&refs(&records));
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].date, date(1, 1, 24));
        assert_eq!(trend[1].revenue, 10.0);
    }
}
