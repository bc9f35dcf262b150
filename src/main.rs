// Entry point and high-level CLI flow.
//
// One run loads the export, applies the filter from the command line, writes
// the CSV exports plus `summary.json` (and PDFs with `--pdf`) and prints
// Markdown previews of each report to the console.
use booking_report::config::{Cli, RunConfig};
use booking_report::loader::ImportReport;
use booking_report::output;
use booking_report::reports::GroupBy;
use booking_report::session::{Dashboard, Session};
use booking_report::types::KpiSummary;
use booking_report::util;
use booking_report::view::sort_by_booking_date_desc;
use booking_report::ExportError;
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const RECORDS_FILE: &str = "buchungsdaten.csv";
const ACCOMMODATIONS_FILE: &str = "top_unterkuenfte.csv";
const CITIES_FILE: &str = "top_staedte.csv";
const SUMMARY_FILE: &str = "summary.json";
const OVERVIEW_PDF: &str = "buchungsuebersicht.pdf";
const ACCOMMODATIONS_PDF: &str = "top_unterkuenfte.pdf";

fn init_tracing(cli: &Cli) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_directive().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Console lines describing one import, in display order.
fn load_notes(report: &ImportReport, max_errors: usize) -> Vec<String> {
    let mut lines = vec![format!(
        "Verarbeite Datensatz... ({} Zeilen gelesen, {} importiert)",
        util::format_int(report.total_rows),
        util::format_int(report.imported)
    )];
    if report.rejected_count() > 0 {
        lines.push(format!(
            "Hinweis: {} Zeilen wegen Lese- oder Prüffehlern übersprungen.",
            util::format_int(report.rejected_count())
        ));
        lines.extend(
            report
                .rejected
                .iter()
                .take(max_errors)
                .map(|err| format!("  - {}", err)),
        );
    }
    if !report.negative_stays.is_empty() {
        lines.push(format!(
            "Info: {} Zeilen mit Abreise vor Anreise, gezählt mit 0 Nächten.",
            util::format_int(report.negative_stays.len())
        ));
    }
    if !report.implausible_booking_dates.is_empty() {
        lines.push(format!(
            "Info: {} Zeilen mit unplausiblem Buchungsdatum (Zeilen {:?}).",
            util::format_int(report.implausible_booking_dates.len()),
            report.implausible_booking_dates
        ));
    }
    if report.dropped_cancellation_dates > 0 {
        lines.push(format!(
            "Info: Stornodatum bei {} nicht stornierten Zeilen ignoriert.",
            util::format_int(report.dropped_cancellation_dates)
        ));
    }
    lines
}

/// Load the export and print a short textual summary of what happened.
fn handle_load(cfg: &RunConfig) -> Option<Session> {
    match Session::load_file(&cfg.input) {
        Ok(session) => {
            for line in load_notes(session.report(), cfg.preview_rows) {
                println!("{line}");
            }
            println!();
            Some(session.with_filter(cfg.filter.clone()))
        }
        Err(e) => {
            error!(input = %cfg.input.display(), "import failed: {e}");
            eprintln!("Datei konnte nicht geladen werden: {}", e);
            None
        }
    }
}

/// The headline numbers echoed after `summary.json` is written.
fn headline_json(kpis: &KpiSummary) -> serde_json::Value {
    serde_json::json!({
        "total_revenue": kpis.total_revenue,
        "total_bookings": kpis.total_bookings,
    })
}

fn print_kpis(dash: &Dashboard<'_>) {
    let k = &dash.kpis;
    let change = |c: Option<f64>| {
        let s = util::format_change(c);
        if s.is_empty() {
            s
        } else {
            format!(" ({s})")
        }
    };
    let ch = &k.changes;
    println!("Kennzahlen");
    println!(
        "  Gesamtumsatz:     {}{}",
        util::format_currency(k.current.total_revenue),
        change(ch.total_revenue)
    );
    println!(
        "  Provision:        {}{}",
        util::format_currency(k.current.total_commission),
        change(ch.total_commission)
    );
    println!(
        "  Buchungen:        {}{}",
        util::format_int(k.current.total_bookings),
        change(ch.total_bookings)
    );
    println!(
        "  Stornoquote:      {}",
        util::format_rate(k.current.cancellation_rate / 100.0)
    );
    println!(
        "  Provisionsverlust durch Storno: {} ({})\n",
        util::format_currency(k.current.cancelled_commission),
        util::format_rate(k.current.commission_loss_rate / 100.0)
    );
}

/// Write every export and print Markdown previews of each report.
///
/// Write errors are reported and the remaining exports still run; the
/// return value says whether all of them succeeded.
fn handle_generate_reports(session: &Session, cfg: &RunConfig) -> bool {
    let dash = session.dashboard(cfg.top_n);
    let with_comparison = dash.filtered.comparison.is_some();
    let out = |name: &str| cfg.out_dir.join(name);
    let mut ok = true;
    let mut report = |file: &Path, result: Result<(), ExportError>| {
        if let Err(e) = result {
            eprintln!("Schreibfehler ({}): {}", file.display(), e);
            ok = false;
        } else {
            info!(file = %file.display(), "export written");
        }
    };

    println!("Erzeuge Berichte...");
    println!("Filter: {}\n", session.filter());
    print_kpis(&dash);

    let mut records = dash.filtered.current.clone();
    sort_by_booking_date_desc(&mut records);
    let file = out(RECORDS_FILE);
    report(
        &file,
        output::records_to_csv(&records).and_then(|csv| output::write_text(&file, &csv)),
    );
    println!("Buchungen ({} gefiltert)\n", util::format_int(records.len()));
    output::preview_table_rows(&output::record_preview_rows(&records), cfg.preview_rows);
    println!("(Vollständige Tabelle exportiert nach {})\n", file.display());

    let file = out(ACCOMMODATIONS_FILE);
    report(
        &file,
        output::groups_to_csv(&dash.accommodations, GroupBy::Accommodation, with_comparison)
            .and_then(|csv| output::write_text(&file, &csv)),
    );
    println!("Top {} Unterkünfte nach Umsatz\n", cfg.top_n);
    output::preview_table_rows(
        &output::group_preview_rows(&dash.accommodations),
        cfg.preview_rows,
    );
    println!("(Vollständige Tabelle exportiert nach {})\n", file.display());

    let file = out(CITIES_FILE);
    report(
        &file,
        output::groups_to_csv(&dash.cities, GroupBy::City, with_comparison)
            .and_then(|csv| output::write_text(&file, &csv)),
    );
    println!("Top {} Städte nach Umsatz\n", cfg.top_n);
    output::preview_table_rows(&output::group_preview_rows(&dash.cities), cfg.preview_rows);
    println!("(Vollständige Tabelle exportiert nach {})\n", file.display());

    if let Some(busiest) = dash
        .daily
        .iter()
        .filter(|p| p.bookings > 0)
        .max_by_key(|p| p.bookings)
    {
        println!(
            "Stärkster Buchungstag: {} ({} Buchungen, {})\n",
            util::format_date(busiest.date),
            util::format_int(busiest.bookings),
            util::format_currency(busiest.revenue)
        );
    }

    if let Some(months) = &dash.year_comparison {
        println!("Monatsvergleich\n");
        output::preview_table_rows(&output::month_preview_rows(months), 12);
    }

    let file = out(SUMMARY_FILE);
    report(&file, output::write_json(&file, &session.summary(&dash)));
    println!("Zusammenfassung ({}):", file.display());
    println!(
        "{}\n",
        headline_json(&dash.kpis.current)
    );

    if cfg.pdf {
        let today = chrono::Local::now().date_naive();
        let file = out(OVERVIEW_PDF);
        report(
            &file,
            output::render_pdf(&output::records_pdf_table(&records, today))
                .and_then(|bytes| output::write_bytes(&file, &bytes)),
        );
        let file = out(ACCOMMODATIONS_PDF);
        let title = format!("Top {} Unterkünfte nach Umsatz", cfg.top_n);
        report(
            &file,
            output::render_pdf(&output::groups_pdf_table(
                &title,
                &dash.accommodations,
                GroupBy::Accommodation,
            ))
            .and_then(|bytes| output::write_bytes(&file, &bytes)),
        );
        println!("PDF-Berichte gespeichert in {}\n", cfg.out_dir.display());
    }
    ok
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let cfg = match cli.run_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Fehler: {e}");
            return ExitCode::from(2);
        }
    };
    if let Err(e) = std::fs::create_dir_all(&cfg.out_dir) {
        eprintln!("Verzeichnis {} kann nicht angelegt werden: {}", cfg.out_dir.display(), e);
        return ExitCode::FAILURE;
    }

    let Some(session) = handle_load(&cfg) else {
        return ExitCode::FAILURE;
    };
    if handle_generate_reports(&session, &cfg) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
