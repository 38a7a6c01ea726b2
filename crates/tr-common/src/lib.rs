pub mod db;
pub mod driver;
pub mod logging;
pub mod race_date;
pub mod renumber;
pub mod run_id;

pub use driver::{RaceDayProcessor, RunSummary, run_race_dates};
pub use race_date::{RaceDate, RaceDateError, RaceDates, race_dates};
pub use renumber::{DayReport, TicketLedger};
