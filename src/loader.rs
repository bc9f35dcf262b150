//! CSV normalizer: raw `;`-delimited booking exports into typed records.
//!
//! Each column is decoded by an explicit fallible step. A row that fails is
//! skipped and recorded in the [`ImportReport`]; only problems with the file
//! as a whole abort the import.

use crate::error::{ImportError, RowParseError};
use crate::types::BookingRecord;
use crate::util::{parse_amount, parse_count, parse_date, parse_flag, parse_timestamp};
use chrono::{Datelike, NaiveDate};
use csv::{ReaderBuilder, StringRecord};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

/// Canonical booking fields and the source headers they are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    BookingCode,
    BookingDate,
    ArrivalDate,
    DepartureDate,
    ServiceCity,
    ServiceName,
    Region,
    TotalPrice,
    Adults,
    Children,
    Persons,
    Country,
    PostalCode,
    City,
    ServiceCountry,
    Cancelled,
    CancellationDate,
    Commission,
}

impl Field {
    /// Export column order.
    pub const ALL: [Field; 18] = [
        Field::BookingCode,
        Field::BookingDate,
        Field::ArrivalDate,
        Field::DepartureDate,
        Field::ServiceCity,
        Field::ServiceName,
        Field::Region,
        Field::TotalPrice,
        Field::Adults,
        Field::Children,
        Field::Persons,
        Field::Country,
        Field::PostalCode,
        Field::City,
        Field::ServiceCountry,
        Field::Cancelled,
        Field::CancellationDate,
        Field::Commission,
    ];

    const REQUIRED: [Field; 3] = [Field::ArrivalDate, Field::DepartureDate, Field::TotalPrice];

    pub fn source_header(self) -> &'static str {
        match self {
            Field::BookingCode => "BookingCode",
            Field::BookingDate => "Buchungsdatum",
            Field::ArrivalDate => "Anreise",
            Field::DepartureDate => "Abreise",
            Field::ServiceCity => "ServiceCity",
            Field::ServiceName => "Service Name (SolR)",
            Field::Region => "Region",
            Field::TotalPrice => "Gesamtpreis",
            Field::Adults => "Erw.",
            Field::Children => "Kinder",
            Field::Persons => "Personen",
            Field::Country => "Land",
            Field::PostalCode => "PLZ",
            Field::City => "Stadt",
            Field::ServiceCountry => "ServiceCountry",
            Field::Cancelled => "Storniert",
            Field::CancellationDate => "Stornodatum",
            Field::Commission => "Vertriebsprovision Netto",
        }
    }

    pub fn canonical_name(self) -> &'static str {
        match self {
            Field::BookingCode => "bookingCode",
            Field::BookingDate => "bookingDate",
            Field::ArrivalDate => "arrivalDate",
            Field::DepartureDate => "departureDate",
            Field::ServiceCity => "serviceCity",
            Field::ServiceName => "serviceName",
            Field::Region => "region",
            Field::TotalPrice => "totalPrice",
            Field::Adults => "adults",
            Field::Children => "children",
            Field::Persons => "persons",
            Field::Country => "country",
            Field::PostalCode => "postalCode",
            Field::City => "city",
            Field::ServiceCountry => "serviceCountry",
            Field::Cancelled => "cancelled",
            Field::CancellationDate => "cancellationDate",
            Field::Commission => "commission",
        }
    }
}

static HEADER_MAP: Lazy<HashMap<&'static str, Field>> = Lazy::new(|| {
    Field::ALL
        .iter()
        .map(|f| (f.source_header(), *f))
        .collect()
});

/// Outcome counts of one import. `imported + rejected.len() == total_rows`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub total_rows: usize,
    pub imported: usize,
    #[serde(serialize_with = "serialize_rejections")]
    pub rejected: Vec<RowParseError>,
    /// Rows whose departure lies before arrival. Kept, counted as 0 nights.
    pub negative_stays: Vec<usize>,
    /// Cancellation dates dropped because the booking was not cancelled.
    pub dropped_cancellation_dates: usize,
    /// Rows whose booking date lies more than [`MAX_BOOKING_LEAD_YEARS`]
    /// before or over a year after the arrival. Kept as imported.
    pub implausible_booking_dates: Vec<usize>,
}

/// How far ahead of the arrival year a booking may plausibly be made.
pub const MAX_BOOKING_LEAD_YEARS: i32 = 5;

fn booking_date_plausible(booked: NaiveDate, arrival: NaiveDate) -> bool {
    let lead = arrival.year() - booked.year();
    (-1..=MAX_BOOKING_LEAD_YEARS).contains(&lead)
}

impl ImportReport {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

fn serialize_rejections<S>(rejected: &[RowParseError], s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.collect_seq(rejected.iter().map(|e| e.to_string()))
}

#[derive(Debug, Clone, Default)]
pub struct Import {
    pub records: Vec<BookingRecord>,
    pub report: ImportReport,
}

/// Header positions resolved once per file.
struct Columns {
    fields: HashMap<Field, usize>,
    extra: Vec<(String, usize)>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Self {
        let mut fields = HashMap::new();
        let mut extra = Vec::new();
        for (idx, header) in headers.iter().enumerate() {
            let header = header.trim();
            match HEADER_MAP.get(header) {
                Some(field) => {
                    fields.entry(*field).or_insert(idx);
                }
                None => extra.push((header.to_lowercase(), idx)),
            }
        }
        Self { fields, extra }
    }

    fn missing_required(&self) -> Vec<String> {
        Field::REQUIRED
            .iter()
            .filter(|f| !self.fields.contains_key(f))
            .map(|f| f.source_header().to_string())
            .collect()
    }
}

/// One undecoded row with column lookup by field.
struct RawRow<'a> {
    row: usize,
    record: &'a StringRecord,
    columns: &'a Columns,
}

impl<'a> RawRow<'a> {
    /// `None` when the column is absent from the header.
    fn cell(&self, field: Field) -> Option<&'a str> {
        let idx = *self.columns.fields.get(&field)?;
        Some(self.record.get(idx).unwrap_or("").trim())
    }

    fn text(&self, field: Field) -> String {
        self.cell(field).unwrap_or_default().to_string()
    }

    fn decode<T>(
        &self,
        field: Field,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Result<Option<T>, RowParseError> {
        match self.cell(field) {
            Some(value) => parse(value)
                .map(Some)
                .map_err(|reason| RowParseError::new(self.row, Some(field.canonical_name()), reason)),
            None => Ok(None),
        }
    }

    fn required<T>(
        &self,
        field: Field,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Result<T, RowParseError> {
        self.decode(field, parse)?.ok_or_else(|| {
            RowParseError::new(self.row, Some(field.canonical_name()), "column missing")
        })
    }

    /// Like `decode`, but an empty cell is treated like an absent column.
    fn optional<T>(
        &self,
        field: Field,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Result<Option<T>, RowParseError> {
        match self.cell(field) {
            Some(v) if !v.is_empty() => self.decode(field, parse),
            _ => Ok(None),
        }
    }
}

enum RowNote {
    NegativeStay,
    ImplausibleBookingDate,
    DroppedCancellationDate,
}

fn decode_row(raw: &RawRow<'_>) -> Result<(BookingRecord, Vec<RowNote>), RowParseError> {
    let mut notes = Vec::new();

    let arrival_date = raw.required(Field::ArrivalDate, parse_date)?;
    let departure_date = raw.required(Field::DepartureDate, parse_date)?;
    if departure_date < arrival_date {
        notes.push(RowNote::NegativeStay);
    }
    let total_price = raw.required(Field::TotalPrice, parse_amount)?;
    let commission = raw.decode(Field::Commission, parse_amount)?.unwrap_or(0.0);
    let booking_date = raw.optional(Field::BookingDate, parse_timestamp)?;
    if booking_date.is_some_and(|ts| !booking_date_plausible(ts.date(), arrival_date)) {
        notes.push(RowNote::ImplausibleBookingDate);
    }

    let cancelled = raw.cell(Field::Cancelled).map(parse_flag).unwrap_or(false);
    let mut cancellation_date = raw.optional(Field::CancellationDate, parse_date)?;
    if !cancelled && cancellation_date.is_some() {
        cancellation_date = None;
        notes.push(RowNote::DroppedCancellationDate);
    }

    let extra = raw
        .columns
        .extra
        .iter()
        .map(|(name, idx)| {
            let value = raw.record.get(*idx).unwrap_or("").to_string();
            (name.clone(), value)
        })
        .collect::<BTreeMap<_, _>>();

    let record = BookingRecord {
        booking_code: raw.text(Field::BookingCode),
        booking_date,
        arrival_date,
        departure_date,
        service_city: raw.text(Field::ServiceCity),
        service_name: raw.text(Field::ServiceName),
        region: raw.text(Field::Region),
        total_price,
        adults: raw.decode(Field::Adults, parse_count)?.unwrap_or(0),
        children: raw.decode(Field::Children, parse_count)?.unwrap_or(0),
        persons: raw.decode(Field::Persons, parse_count)?.unwrap_or(0),
        country: raw.text(Field::Country),
        postal_code: raw.text(Field::PostalCode),
        city: raw.text(Field::City),
        service_country: raw.text(Field::ServiceCountry),
        cancelled,
        cancellation_date,
        commission,
        extra,
    };
    Ok((record, notes))
}

/// Normalize raw CSV text into booking records.
///
/// Fails only when the input as a whole is unusable: empty, wrong delimiter,
/// or missing one of the arrival, departure and price columns. Malformed
/// rows are skipped and listed in the report.
pub fn normalize(text: &str) -> Result<Import, ImportError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if text.trim().is_empty() {
        return Err(ImportError::EmptyInput);
    }

    let mut rdr = ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr.headers()?.clone();
    if headers.len() == 1 {
        let only = headers.get(0).unwrap_or_default();
        if only.contains(',') || only.contains('\t') {
            return Err(ImportError::WrongDelimiter(only.to_string()));
        }
    }

    let columns = Columns::resolve(&headers);
    let missing = columns.missing_required();
    if !missing.is_empty() {
        return Err(ImportError::MissingColumns(missing));
    }
    debug!(
        mapped = columns.fields.len(),
        passthrough = columns.extra.len(),
        "resolved header"
    );

    let mut report = ImportReport::default();
    let mut records = Vec::new();

    for (idx, result) in rdr.records().enumerate() {
        let row = idx + 1;
        report.total_rows += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(row, error = %e, "unreadable row skipped");
                report
                    .rejected
                    .push(RowParseError::new(row, None, e.to_string()));
                continue;
            }
        };
        let raw = RawRow {
            row,
            record: &record,
            columns: &columns,
        };
        match decode_row(&raw) {
            Ok((booking, notes)) => {
                for note in notes {
                    match note {
                        RowNote::NegativeStay => {
                            warn!(row, code = %booking.booking_code, "departure before arrival, nights clamped to 0");
                            report.negative_stays.push(row);
                        }
                        RowNote::ImplausibleBookingDate => {
                            warn!(row, code = %booking.booking_code, "booking date far from arrival");
                            report.implausible_booking_dates.push(row);
                        }
                        RowNote::DroppedCancellationDate => {
                            debug!(row, "cancellation date on active booking dropped");
                            report.dropped_cancellation_dates += 1;
                        }
                    }
                }
                records.push(booking);
            }
            Err(e) => {
                warn!(row, error = %e, "row rejected");
                report.rejected.push(e);
            }
        }
    }

    report.imported = records.len();
    info!(
        total = report.total_rows,
        imported = report.imported,
        rejected = report.rejected_count(),
        "import finished"
    );
    Ok(Import { records, report })
}

/// Read a UTF-8 export from disk and normalize it.
pub fn load_file(path: impl AsRef<Path>) -> Result<Import, ImportError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8(bytes)?;
    info!(path = %path.display(), bytes = text.len(), "loaded input file");
    normalize(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::date;

    const SCENARIO: &str = "BookingCode;Buchungsdatum;Anreise;Abreise;ServiceCity;Service Name (SolR);Region;Gesamtpreis;Storniert\n\
        BK1;01.01.2024 10:00;05.01.2024;07.01.2024;Berlin;Hotel A;Nord;100,50;FALSCH";

    #[test]
    fn normalizes_scenario_row() {
        let import = normalize(SCENARIO).unwrap();
        assert_eq!(import.records.len(), 1);
        let r = &import.records[0];
        assert_eq!(r.booking_code, "BK1");
        assert_eq!(r.total_price, 100.5);
        assert_eq!(r.nights(), 2);
        assert!(!r.cancelled);
        assert_eq!(r.arrival_date, date(5, 1, 2024));
        assert_eq!(
            r.booking_date.map(|ts| ts.format("%Y-%m-%d %H:%M").to_string()),
            Some("2024-01-01 10:00".to_string())
        );
        assert_eq!(r.commission, 0.0);
        assert_eq!(import.report.imported, 1);
        assert_eq!(import.report.rejected_count(), 0);
    }

    #[test]
    fn wahr_marks_cancelled() {
        let text = SCENARIO.replace("FALSCH", "WAHR");
        let import = normalize(&text).unwrap();
        assert!(import.records[0].cancelled);
    }

    #[test]
    fn unmapped_headers_pass_through_lowercased() {
        let text = "Anreise;Abreise;Gesamtpreis;Kanal\n05.01.2024;07.01.2024;10,00;Online";
        let import = normalize(text).unwrap();
        assert_eq!(
            import.records[0].extra.get("kanal").map(String::as_str),
            Some("Online")
        );
    }

    #[test]
    fn bad_price_rejects_row_and_keeps_the_rest() {
        let text = "Anreise;Abreise;Gesamtpreis\n\
            05.01.2024;07.01.2024;abc\n\
            05.01.2024;07.01.2024;10,00\n\
            xx;07.01.2024;10,00";
        let import = normalize(text).unwrap();
        assert_eq!(import.records.len(), 1);
        assert_eq!(import.report.total_rows, 3);
        assert_eq!(import.report.rejected_count(), 2);
        assert_eq!(import.report.rejected[0].row, 1);
        assert_eq!(import.report.rejected[0].field, Some("totalPrice"));
        assert_eq!(import.report.rejected[1].row, 3);
        assert_eq!(import.report.rejected[1].field, Some("arrivalDate"));
    }

    #[test]
    fn empty_commission_cell_is_rejected() {
        let text = "Anreise;Abreise;Gesamtpreis;Vertriebsprovision Netto\n05.01.2024;07.01.2024;10,00;";
        let import = normalize(text).unwrap();
        assert!(import.records.is_empty());
        assert_eq!(import.report.rejected[0].field, Some("commission"));
    }

    #[test]
    fn negative_stay_is_flagged_not_rejected() {
        let text = "Anreise;Abreise;Gesamtpreis\n07.01.2024;05.01.2024;10,00";
        let import = normalize(text).unwrap();
        assert_eq!(import.records.len(), 1);
        assert_eq!(import.records[0].nights(), 0);
        assert_eq!(import.report.negative_stays, vec![1]);
    }

    #[test]
    fn distant_booking_year_is_flagged() {
        let text = "Buchungsdatum;Anreise;Abreise;Gesamtpreis\n\
            01.01.2024 09:00;05.01.2024;07.01.2024;10,00\n\
            01.01.0024 09:00;05.01.2024;07.01.2024;10,00\n\
            15.12.2019;05.01.2024;07.01.2024;10,00\n\
            10.01.2024;05.01.2024;07.01.2024;10,00";
        let import = normalize(text).unwrap();
        assert_eq!(import.records.len(), 4);
        assert_eq!(import.report.rejected_count(), 0);
        assert_eq!(import.report.implausible_booking_dates, vec![2]);
    }

    #[test]
    fn cancellation_date_requires_cancelled_flag() {
        let text = "Anreise;Abreise;Gesamtpreis;Storniert;Stornodatum\n\
            05.01.2024;07.01.2024;10,00;FALSCH;02.01.2024\n\
            05.01.2024;07.01.2024;10,00;WAHR;03.01.2024\n\
            05.01.2024;07.01.2024;10,00;WAHR;";
        let import = normalize(text).unwrap();
        assert_eq!(import.records[0].cancellation_date, None);
        assert_eq!(import.records[1].cancellation_date, Some(date(3, 1, 2024)));
        assert_eq!(import.records[2].cancellation_date, None);
        assert_eq!(import.report.dropped_cancellation_dates, 1);
    }

    #[test]
    fn header_only_input_is_valid() {
        let import = normalize("Anreise;Abreise;Gesamtpreis\n").unwrap();
        assert!(import.records.is_empty());
        assert_eq!(import.report.total_rows, 0);
    }

    #[test]
    fn fatal_errors() {
        assert!(matches!(normalize(""), Err(ImportError::EmptyInput)));
        assert!(matches!(
            normalize("Anreise,Abreise,Gesamtpreis\n05.01.2024,07.01.2024,10"),
            Err(ImportError::WrongDelimiter(_))
        ));
        match normalize("BookingCode;Anreise\nBK1;05.01.2024") {
            Err(ImportError::MissingColumns(cols)) => {
                assert_eq!(cols, vec!["Abreise".to_string(), "Gesamtpreis".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let text = format!("\u{feff}{SCENARIO}");
        assert_eq!(normalize(&text).unwrap().records.len(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            load_file("/nonexistent/bookings.csv"),
            Err(ImportError::Io(_))
        ));
    }
}
