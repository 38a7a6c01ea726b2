#![allow(async_fn_in_trait)]

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::race_date::{RaceDate, RaceDates};
use crate::renumber::DayReport;
use crate::{logging, run_id};

/// Assigns `new_id` values for every pending ticket of one race date.
pub trait RaceDayProcessor {
    type Error: std::error::Error;

    async fn process_day(&mut self, race_date: RaceDate) -> Result<DayReport, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub start: RaceDate,
    pub end: RaceDate,
    pub days: Vec<DayReport>,
    pub assigned: u64,
    pub elapsed_ms: u64,
}

fn as_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Process every date of `dates` in order, one at a time.
///
/// The first failing date aborts the run; dates after it are not touched.
#[instrument(skip(processor, dates), fields(run_id = run_id::get(), start = %dates.start(), end = %dates.end()))]
pub async fn run_race_dates<P: RaceDayProcessor>(
    processor: &mut P,
    dates: RaceDates,
) -> Result<RunSummary, P::Error> {
    if dates.is_empty() {
        warn!("start date is after end date; nothing to process");
    }

    let total_started = Instant::now();
    let mut days = Vec::with_capacity(dates.len());
    let mut assigned = 0u64;

    for race_date in dates.iter() {
        info!(%race_date, "processing race date");
        let _scope = logging::enter_race_date(race_date);
        let started = Instant::now();

        let mut report = processor
            .process_day(race_date)
            .await
            .inspect_err(|err| error!(%race_date, error = %err, "race date failed"))?;

        report.elapsed_ms = as_millis(started.elapsed());
        assigned += report.assigned;

        info!(
            %race_date,
            offset = report.offset,
            assigned = report.assigned,
            first_new_id = ?report.first_new_id(),
            last_new_id = ?report.last_new_id(),
            dry_run = report.dry_run,
            elapsed_ms = report.elapsed_ms,
            total_elapsed_ms = as_millis(total_started.elapsed()),
            "finished race date"
        );

        days.push(report);
    }

    let summary = RunSummary {
        run_id: run_id::get().to_string(),
        start: dates.start(),
        end: dates.end(),
        days,
        assigned,
        elapsed_ms: as_millis(total_started.elapsed()),
    };

    info!(
        dates = summary.days.len(),
        assigned = summary.assigned,
        elapsed_ms = summary.elapsed_ms,
        "renumbering run complete"
    );

    Ok(summary)
}
