//! Command-line configuration.

use crate::filter::{FilterSpec, Period};
use crate::util::parse_date;
use crate::view::DEFAULT_TOP_N;
use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(
    name = "booking-report",
    version,
    about = "Auswertung von Buchungsexporten (CSV, ';'-getrennt)"
)]
pub struct Cli {
    /// Buchungsexport (CSV, UTF-8)
    pub input: PathBuf,

    /// Anreise ab (TT.MM.JJJJ)
    #[arg(long, requires = "to", conflicts_with_all = ["year", "compare_year"])]
    pub from: Option<String>,

    /// Anreise bis (TT.MM.JJJJ)
    #[arg(long, requires = "from")]
    pub to: Option<String>,

    /// Anreisejahr für den Jahresvergleich
    #[arg(long, requires = "compare_year")]
    pub year: Option<i32>,

    /// Vergleichsjahr
    #[arg(long = "compare-year", requires = "year")]
    pub compare_year: Option<i32>,

    /// Nur Buchungen dieser Region
    #[arg(long)]
    pub region: Option<String>,

    /// Nur Buchungen in dieser Stadt
    #[arg(long)]
    pub city: Option<String>,

    /// Anzahl der Zeilen in den Ranglisten
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    pub top: usize,

    /// Zielverzeichnis für Exporte
    #[arg(short = 'o', long = "out-dir", default_value = ".")]
    pub out_dir: PathBuf,

    /// Zusätzlich PDF-Berichte schreiben
    #[arg(long)]
    pub pdf: bool,

    /// Zeilen je Vorschau-Tabelle auf der Konsole
    #[arg(long = "preview-rows", default_value_t = 5)]
    pub preview_rows: usize,

    /// Ausführlichere Protokollierung (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid --{flag} value: {reason}")]
    InvalidDate { flag: &'static str, reason: String },
}

/// Validated settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub input: PathBuf,
    pub filter: FilterSpec,
    pub top_n: usize,
    pub out_dir: PathBuf,
    pub pdf: bool,
    pub preview_rows: usize,
}

impl Cli {
    pub fn run_config(&self) -> Result<RunConfig, ConfigError> {
        let period = match (&self.from, &self.to, self.year, self.compare_year) {
            (Some(from), Some(to), _, _) => Period::Range {
                start: parse_date(from)
                    .map_err(|reason| ConfigError::InvalidDate { flag: "from", reason })?,
                end: parse_date(to)
                    .map_err(|reason| ConfigError::InvalidDate { flag: "to", reason })?,
            },
            (_, _, Some(current), Some(comparison)) => Period::YearComparison {
                current,
                comparison,
            },
            _ => Period::All,
        };
        Ok(RunConfig {
            input: self.input.clone(),
            filter: FilterSpec {
                period,
                region: self.region.clone(),
                service_city: self.city.clone(),
            },
            top_n: self.top,
            out_dir: self.out_dir.clone(),
            pdf: self.pdf,
            preview_rows: self.preview_rows,
        })
    }

    /// Log filter directive for the verbosity flags. `RUST_LOG` wins when set.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("booking-report").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn defaults() {
        let cfg = parse(&["bookings.csv"]).run_config().unwrap();
        assert_eq!(cfg.filter, FilterSpec::default());
        assert_eq!(cfg.top_n, 30);
        assert_eq!(cfg.preview_rows, 5);
        assert!(!cfg.pdf);
    }

    #[test]
    fn date_range() {
        let cfg = parse(&["in.csv", "--from", "01.01.2024", "--to", "31.01.2024", "--region", "Nord"])
            .run_config()
            .unwrap();
        assert_eq!(
            cfg.filter.period,
            Period::Range {
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            }
        );
        assert_eq!(cfg.filter.region.as_deref(), Some("Nord"));
    }

    #[test]
    fn year_comparison() {
        let cfg = parse(&["in.csv", "--year", "2024", "--compare-year", "2021"])
            .run_config()
            .unwrap();
        assert!(cfg.filter.is_year_comparison());
    }

    #[test]
    fn rejects_bad_date_and_conflicting_modes() {
        let err = parse(&["in.csv", "--from", "2024/01/01", "--to", "31.01.2024"])
            .run_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDate { flag: "from", .. }));
        assert!(Cli::try_parse_from([
            "booking-report",
            "in.csv",
            "--from",
            "01.01.2024",
            "--to",
            "02.01.2024",
            "--year",
            "2024",
            "--compare-year",
            "2023",
        ])
        .is_err());
        assert!(Cli::try_parse_from(["booking-report", "in.csv", "--year", "2024"]).is_err());
    }

    #[test]
    fn verbosity() {
        assert_eq!(parse(&["in.csv"]).log_directive(), "warn");
        assert_eq!(parse(&["in.csv", "-vv"]).log_directive(), "debug");
    }
}
