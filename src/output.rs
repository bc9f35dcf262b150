//! Export formats: `;`-delimited CSV text, PDF tables, JSON summary and
//! markdown previews for the console.

use crate::error::ExportError;
use crate::loader::Field;
use crate::reports::{month_of_year_label, GroupBy};
use crate::types::{
    AggregateGroup, BookingRecord, GroupPreviewRow, MonthPreviewRow, RecordPreviewRow,
};
use crate::util::{
    decimal_comma, fixed_comma, format_change, format_currency, format_date, format_number,
    format_rate, format_timestamp,
};
use chrono::NaiveDate;
use csv::WriterBuilder;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

fn csv_text<I, R>(headers: &[String], rows: I) -> Result<String, ExportError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = String>,
{
    let mut wtr = WriterBuilder::new().delimiter(b';').from_writer(Vec::new());
    wtr.write_record(headers)?;
    for row in rows {
        let row: Vec<String> = row.into_iter().collect();
        wtr.write_record(&row)?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

fn record_fields(r: &BookingRecord, extra_keys: &[&str]) -> Vec<String> {
    let mut fields: Vec<String> = Field::ALL
        .iter()
        .map(|field| match field {
            Field::BookingCode => r.booking_code.clone(),
            Field::BookingDate => r.booking_date.map(format_timestamp).unwrap_or_default(),
            Field::ArrivalDate => format_date(r.arrival_date),
            Field::DepartureDate => format_date(r.departure_date),
            Field::ServiceCity => r.service_city.clone(),
            Field::ServiceName => r.service_name.clone(),
            Field::Region => r.region.clone(),
            Field::TotalPrice => decimal_comma(r.total_price),
            Field::Adults => r.adults.to_string(),
            Field::Children => r.children.to_string(),
            Field::Persons => r.persons.to_string(),
            Field::Country => r.country.clone(),
            Field::PostalCode => r.postal_code.clone(),
            Field::City => r.city.clone(),
            Field::ServiceCountry => r.service_country.clone(),
            Field::Cancelled => String::from(if r.cancelled { "WAHR" } else { "FALSCH" }),
            Field::CancellationDate => r.cancellation_date.map(format_date).unwrap_or_default(),
            Field::Commission => decimal_comma(r.commission),
        })
        .collect();
    fields.extend(
        extra_keys
            .iter()
            .map(|key| r.extra.get(*key).cloned().unwrap_or_default()),
    );
    fields
}

/// Booking records in the import layout, so the output can be loaded again.
/// Unmapped columns carried in `extra` follow the known ones, sorted by
/// name; a record without one of them gets an empty cell.
pub fn records_to_csv(records: &[&BookingRecord]) -> Result<String, ExportError> {
    let extra_keys: Vec<&str> = records
        .iter()
        .flat_map(|r| r.extra.keys().map(String::as_str))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let headers: Vec<String> = Field::ALL
        .iter()
        .map(|f| f.source_header().to_string())
        .chain(extra_keys.iter().map(|k| k.to_string()))
        .collect();
    csv_text(&headers, records.iter().map(|r| record_fields(r, &extra_keys)))
}

fn key_header(by: GroupBy) -> &'static str {
    match by {
        GroupBy::Accommodation => "Unterkunft",
        GroupBy::City => "Stadt",
        GroupBy::Month | GroupBy::MonthOfYear => "Monat",
    }
}

/// Ranked groups as CSV. Comparison columns are added when
/// `with_comparison` is set; missing values stay empty.
pub fn groups_to_csv(
    groups: &[AggregateGroup],
    by: GroupBy,
    with_comparison: bool,
) -> Result<String, ExportError> {
    let mut headers = vec!["Rang".to_string(), key_header(by).to_string()];
    if by == GroupBy::Accommodation {
        headers.push("Stadt".to_string());
    }
    headers.extend(
        ["Umsatz", "Buchungen", "Provision", "Übernachtungen", "Stornierungen"]
            .iter()
            .map(|s| s.to_string()),
    );
    if with_comparison {
        headers.extend(
            [
                "Umsatz Vorjahr",
                "Buchungen Vorjahr",
                "Provision Vorjahr",
                "Übernachtungen Vorjahr",
                "Stornierungen Vorjahr",
                "Umsatz Änderung",
                "Buchungen Änderung",
                "Provision Änderung",
                "Übernachtungen Änderung",
                "Stornoquote Änderung",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    }

    let rows = groups.iter().enumerate().map(|(idx, g)| {
        let mut row = vec![(idx + 1).to_string(), g.key.clone()];
        if by == GroupBy::Accommodation {
            row.push(g.city.clone().unwrap_or_default());
        }
        row.extend([
            fixed_comma(g.current.revenue, 2),
            g.current.bookings.to_string(),
            fixed_comma(g.current.commission, 2),
            g.current.nights.to_string(),
            g.current.cancelled_bookings.to_string(),
        ]);
        if with_comparison {
            let prev = g.comparison.as_ref();
            row.extend([
                prev.map(|p| fixed_comma(p.revenue, 2)).unwrap_or_default(),
                prev.map(|p| p.bookings.to_string()).unwrap_or_default(),
                prev.map(|p| fixed_comma(p.commission, 2)).unwrap_or_default(),
                prev.map(|p| p.nights.to_string()).unwrap_or_default(),
                prev.map(|p| p.cancelled_bookings.to_string()).unwrap_or_default(),
                format_change(g.changes.revenue),
                format_change(g.changes.bookings),
                format_change(g.changes.commission),
                format_change(g.changes.nights),
                format_change(g.changes.cancellation_rate),
            ]);
        }
        row
    });
    csv_text(&headers, rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Layout-independent description of a single-table PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfTable {
    pub title: String,
    pub subtitle: Option<String>,
    pub orientation: Orientation,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn records_pdf_table(records: &[&BookingRecord], generated_on: NaiveDate) -> PdfTable {
    let headers = [
        "Buchungscode",
        "Buchungsdatum",
        "Anreise",
        "Abreise",
        "Stadt",
        "Unterkunft",
        "Gesamtpreis",
        "Personen",
        "Storniert",
        "Provision",
    ];
    let rows = records
        .iter()
        .map(|r| {
            vec![
                r.booking_code.clone(),
                r.booking_date
                    .map(|ts| format_date(ts.date()))
                    .unwrap_or_default(),
                format_date(r.arrival_date),
                format_date(r.departure_date),
                r.service_city.clone(),
                r.service_name.clone(),
                format_currency(r.total_price),
                r.persons.to_string(),
                if r.cancelled { "Ja" } else { "Nein" }.to_string(),
                format_currency(r.commission),
            ]
        })
        .collect();
    PdfTable {
        title: "Buchungsübersicht".to_string(),
        subtitle: Some(format!("Erstellt am {}", format_date(generated_on))),
        orientation: Orientation::Portrait,
        headers: headers.iter().map(|h| h.to_string()).collect(),
        rows,
    }
}

pub fn groups_pdf_table(title: &str, groups: &[AggregateGroup], by: GroupBy) -> PdfTable {
    let mut headers = vec!["Rang".to_string(), "Name".to_string()];
    if by == GroupBy::Accommodation {
        headers.push("Stadt".to_string());
    }
    headers.extend(
        ["Buchungen", "Umsatz", "Provision", "Storno %"]
            .iter()
            .map(|s| s.to_string()),
    );
    let rows = groups
        .iter()
        .enumerate()
        .map(|(idx, g)| {
            let mut row = vec![(idx + 1).to_string(), g.key.clone()];
            if by == GroupBy::Accommodation {
                row.push(g.city.clone().unwrap_or_default());
            }
            row.extend([
                g.current.bookings.to_string(),
                format_currency(g.current.revenue),
                format_currency(g.current.commission),
                format_rate(g.current.cancellation_rate()),
            ]);
            row
        })
        .collect();
    PdfTable {
        title: title.to_string(),
        subtitle: None,
        orientation: Orientation::Landscape,
        headers,
        rows,
    }
}

const MARGIN_MM: f32 = 14.0;
const FONT_SIZE: f32 = 8.0;
const ROW_HEIGHT_MM: f32 = 5.0;
/// Rough Helvetica advance at `FONT_SIZE`, used to clip cell text.
const CHAR_WIDTH_MM: f32 = 1.5;

struct PdfFonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

/// Column widths proportional to the longest cell, capped so a single long
/// name cannot squeeze the other columns to nothing.
fn column_widths(table: &PdfTable, usable: f32) -> Vec<f32> {
    let weights: Vec<f32> = (0..table.headers.len())
        .map(|col| {
            let longest = table
                .rows
                .iter()
                .filter_map(|row| row.get(col))
                .chain(std::iter::once(&table.headers[col]))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(1);
            longest.clamp(4, 40) as f32
        })
        .collect();
    let total: f32 = weights.iter().sum();
    weights.iter().map(|w| w / total * usable).collect()
}

fn clip(text: &str, width: f32) -> String {
    let max_chars = ((width / CHAR_WIDTH_MM) as usize).max(1);
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    clipped.push_str("...");
    clipped
}

fn draw_row(
    layer: &PdfLayerReference,
    cells: &[String],
    widths: &[f32],
    y: f32,
    font: &IndirectFontRef,
) {
    let mut x = MARGIN_MM;
    for (cell, width) in cells.iter().zip(widths) {
        layer.use_text(clip(cell, *width), FONT_SIZE, Mm(x), Mm(y), font);
        x += width;
    }
}

/// Render a [`PdfTable`] to PDF bytes. Long tables continue on new pages
/// with the header row repeated.
pub fn render_pdf(table: &PdfTable) -> Result<Vec<u8>, ExportError> {
    let (width, height) = match table.orientation {
        Orientation::Portrait => (210.0, 297.0),
        Orientation::Landscape => (297.0, 210.0),
    };
    let (doc, page, layer) = PdfDocument::new(table.title.as_str(), Mm(width), Mm(height), "Tabelle");
    let fonts = PdfFonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold)?,
    };
    let widths = column_widths(table, width - 2.0 * MARGIN_MM);

    let mut current = doc.get_page(page).get_layer(layer);
    current.use_text(table.title.as_str(), 16.0, Mm(MARGIN_MM), Mm(height - 15.0), &fonts.bold);
    let mut y = height - 22.0;
    if let Some(subtitle) = &table.subtitle {
        current.use_text(subtitle.as_str(), 10.0, Mm(MARGIN_MM), Mm(y), &fonts.regular);
        y -= 8.0;
    }
    draw_row(&current, &table.headers, &widths, y, &fonts.bold);
    y -= ROW_HEIGHT_MM;

    for row in &table.rows {
        if y < MARGIN_MM {
            let (next_page, next_layer) = doc.add_page(Mm(width), Mm(height), "Tabelle");
            current = doc.get_page(next_page).get_layer(next_layer);
            y = height - MARGIN_MM - ROW_HEIGHT_MM;
            draw_row(&current, &table.headers, &widths, y, &fonts.bold);
            y -= ROW_HEIGHT_MM;
        }
        draw_row(&current, row, &widths, y, &fonts.regular);
        y -= ROW_HEIGHT_MM;
    }

    Ok(doc.save_to_bytes()?)
}

pub fn write_text(path: impl AsRef<Path>, text: &str) -> Result<(), ExportError> {
    std::fs::write(path, text)?;
    Ok(())
}

pub fn write_bytes(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), ExportError> {
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<(), ExportError> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn group_preview_rows(groups: &[AggregateGroup]) -> Vec<GroupPreviewRow> {
    groups
        .iter()
        .enumerate()
        .map(|(idx, g)| GroupPreviewRow {
            rank: idx + 1,
            name: g.key.clone(),
            city: g.city.clone().unwrap_or_default(),
            revenue: format_currency(g.current.revenue),
            bookings: g.current.bookings,
            commission: format_currency(g.current.commission),
            nights: g.current.nights,
            cancellation_rate: format_rate(g.current.cancellation_rate()),
            revenue_change: format_change(g.changes.revenue),
        })
        .collect()
}

pub fn month_preview_rows(months: &[AggregateGroup]) -> Vec<MonthPreviewRow> {
    months
        .iter()
        .map(|m| {
            let previous = m.comparison.unwrap_or_default();
            MonthPreviewRow {
                month: month_of_year_label(&m.key).to_string(),
                revenue: format_currency(m.current.revenue),
                previous_revenue: format_currency(previous.revenue),
                revenue_change: match m.changes.revenue {
                    Some(_) => format_change(m.changes.revenue),
                    None => "-".to_string(),
                },
                bookings: m.current.bookings,
                previous_bookings: previous.bookings,
                cancellation_rate: format!("{} %", format_number(m.current.cancellation_rate() * 100.0, 1)),
            }
        })
        .collect()
}

pub fn record_preview_rows(records: &[&BookingRecord]) -> Vec<RecordPreviewRow> {
    records
        .iter()
        .map(|r| RecordPreviewRow {
            booking_code: r.booking_code.clone(),
            arrival: format_date(r.arrival_date),
            departure: format_date(r.departure_date),
            city: r.service_city.clone(),
            service_name: r.service_name.clone(),
            total_price: format_currency(r.total_price),
            cancelled: if r.cancelled { "Ja" } else { "Nein" }.to_string(),
        })
        .collect()
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(keine Zeilen)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::normalize;
    use crate::reports::aggregate;
    use crate::types::fixtures::{booking, date};

    #[test]
    fn empty_record_export_is_header_only() {
        let csv = records_to_csv(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
        assert!(csv.starts_with("BookingCode;Buchungsdatum;Anreise;Abreise;"));
    }

    #[test]
    fn record_export_uses_decimal_comma_and_german_dates() {
        let mut r = booking("Hotel A", "Berlin", 100.5, true);
        r.booking_date = Some(date(1, 1, 2024).and_hms_opt(10, 0, 0).unwrap());
        let csv = records_to_csv(&[&r]).unwrap();
        let line = csv.lines().nth(1).unwrap();
        let fields: Vec<&str> = line.split(';').collect();
        assert_eq!(fields[1], "01.01.2024 10:00");
        assert_eq!(fields[2], "05.01.2024");
        assert_eq!(fields[7], "100,5");
        assert_eq!(fields[15], "WAHR");
        assert_eq!(fields[16], "01.01.2024");
        assert_eq!(fields[17], "10,05");
    }

    #[test]
    fn record_export_reimports() {
        let r = booking("Hotel; mit Semikolon", "Berlin", 99.99, false);
        let csv = records_to_csv(&[&r]).unwrap();
        let back = normalize(&csv).unwrap();
        assert_eq!(back.report.rejected_count(), 0);
        assert_eq!(back.records, vec![r]);
    }

    #[test]
    fn unmapped_columns_survive_export() {
        let first = normalize(
            "Anreise;Abreise;Gesamtpreis;Kanal;Buchungsdatum\n\
             05.01.2024;07.01.2024;10,00;Online;01.01.2024 10:00:30\n\
             06.01.2024;07.01.2024;20,00;;",
        )
        .unwrap();
        assert_eq!(first.records[0].extra.get("kanal").map(String::as_str), Some("Online"));

        let csv = records_to_csv(&first.records.iter().collect::<Vec<_>>()).unwrap();
        assert!(csv.lines().next().unwrap().ends_with(";kanal"));
        let second = normalize(&csv).unwrap();
        assert_eq!(second.report.rejected_count(), 0);
        assert_eq!(first.records, second.records);
    }

    #[test]
    fn missing_extra_key_exports_empty_cell() {
        let a = booking("Hotel A", "Berlin", 10.0, false);
        let mut b = booking("Hotel B", "Berlin", 10.0, false);
        b.extra.insert("kanal".into(), "Telefon".into());
        let csv = records_to_csv(&[&a, &b]).unwrap();
        let rows: Vec<&str> = csv.lines().collect();
        assert!(rows[0].ends_with(";kanal"));
        assert!(rows[1].ends_with(';'));
        assert!(rows[2].ends_with(";Telefon"));
    }

    #[test]
    fn group_export_with_comparison_columns() {
        let current = vec![booking("Hotel A", "Berlin", 200.0, false)];
        let previous = vec![booking("Hotel A", "Berlin", 100.0, false)];
        let cur: Vec<_> = current.iter().collect();
        let prev: Vec<_> = previous.iter().collect();
        let groups = aggregate(&cur, Some(prev.as_slice()), GroupBy::Accommodation);
        let csv = groups_to_csv(&groups, GroupBy::Accommodation, true).unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("Rang;Unterkunft;Stadt;Umsatz;"));
        assert!(header.ends_with("Stornoquote Änderung"));
        let row: Vec<&str> = lines.next().unwrap().split(';').collect();
        assert_eq!(row[..4], ["1", "Hotel A", "Berlin", "200,00"]);
        assert_eq!(row[8], "100,00");
        assert_eq!(row[13], "+100,0%");
        assert_eq!(row[17], "");
    }

    #[test]
    fn city_export_without_comparison() {
        let groups: Vec<AggregateGroup> = Vec::new();
        let csv = groups_to_csv(&groups, GroupBy::City, false).unwrap();
        assert_eq!(
            csv.trim_end(),
            "Rang;Stadt;Umsatz;Buchungen;Provision;Übernachtungen;Stornierungen"
        );
    }

    #[test]
    fn pdf_tables_format_currency() {
        let r = booking("Hotel A", "Berlin", 1234.5, false);
        let table = records_pdf_table(&[&r], date(2, 3, 2024));
        assert_eq!(table.orientation, Orientation::Portrait);
        assert_eq!(table.subtitle.as_deref(), Some("Erstellt am 02.03.2024"));
        assert_eq!(table.rows[0][6], "1.234,50 €");
        assert_eq!(table.rows[0].len(), table.headers.len());

        let records = vec![r];
        let refs: Vec<_> = records.iter().collect();
        let groups = aggregate(&refs, None, GroupBy::Accommodation);
        let table = groups_pdf_table("Top 30 Unterkünfte", &groups, GroupBy::Accommodation);
        assert_eq!(table.orientation, Orientation::Landscape);
        assert_eq!(table.rows[0], vec!["1", "Hotel A", "Berlin", "1", "1.234,50 €", "123,45 €", "0,0 %"]);
    }

    #[test]
    fn renders_pdf_bytes_including_empty_body() {
        let empty = records_pdf_table(&[], date(2, 3, 2024));
        let bytes = render_pdf(&empty).unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let records: Vec<_> = (0..120)
            .map(|i| booking(&format!("Hotel {i}"), "Berlin", 10.0, false))
            .collect();
        let refs: Vec<_> = records.iter().collect();
        let bytes = render_pdf(&records_pdf_table(&refs, date(2, 3, 2024))).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn clip_long_cells() {
        assert_eq!(clip("kurz", 30.0), "kurz");
        let clipped = clip(&"x".repeat(100), 15.0);
        assert_eq!(clipped.chars().count(), 10);
        assert!(clipped.ends_with("..."));
    }
}
