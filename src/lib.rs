//! Reporting over travel-booking CSV exports.
//!
//! Raw `;`-delimited exports are normalized into [`types::BookingRecord`]s,
//! narrowed by [`filter`], folded into grouped statistics by [`reports`],
//! ordered by [`view`] and written out by [`output`]. [`session::Session`]
//! ties the steps together for one loaded file.

pub mod config;
pub mod error;
pub mod filter;
pub mod loader;
pub mod output;
pub mod reports;
pub mod session;
pub mod types;
pub mod util;
pub mod view;

pub use error::{ExportError, ImportError, RowParseError};
pub use filter::{FilterSpec, Period};
pub use loader::{load_file, normalize, Import, ImportReport};
pub use reports::{aggregate, GroupBy};
pub use session::{Dashboard, Session};
pub use types::{AggregateGroup, BookingRecord};
