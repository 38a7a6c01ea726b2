//! Ranking rules for `tickets.new_id`.
//!
//! Within one race date, tickets that have no `new_id` yet are ordered by the
//! `received_at` of their raw batch and then by ticket id. The n-th ticket in
//! that order receives `offset + n`, where `offset` is the largest `new_id`
//! present in the whole table before the date was processed.

pub mod ledger;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::race_date::RaceDate;

pub use ledger::TicketLedger;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RenumberError {
    #[error("max(new_id) is negative: {0}")]
    NegativeMax(i64),
    #[error("new_id overflow at offset {offset} with {count} pending tickets")]
    Overflow { offset: i64, count: usize },
}

/// Row of `tickets`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: i64,
    pub race_date: RaceDate,
    pub raw_ticket_batch_id: i64,
    pub new_id: Option<i64>,
}

impl Ticket {
    pub fn pending(id: i64, race_date: RaceDate, raw_ticket_batch_id: i64) -> Self {
        Self {
            id,
            race_date,
            raw_ticket_batch_id,
            new_id: None,
        }
    }
}

/// Row of `raw_ticket_batches`. Only the ordering key matters here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTicketBatch {
    pub id: i64,
    pub received_at: DateTime<Utc>,
}

/// Ticket still waiting for a `new_id`, with its ordering key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTicket {
    pub ticket_id: i64,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub ticket_id: i64,
    pub new_id: i64,
}

/// Outcome of processing a single race date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayReport {
    pub race_date: RaceDate,
    /// Largest `new_id` before the date was processed.
    pub offset: i64,
    /// Rows written (or planned, on a dry run).
    pub assigned: u64,
    pub dry_run: bool,
    pub elapsed_ms: u64,
}

impl DayReport {
    pub fn new(race_date: RaceDate, offset: i64, assigned: u64) -> Self {
        Self {
            race_date,
            offset,
            assigned,
            dry_run: false,
            elapsed_ms: 0,
        }
    }

    pub fn first_new_id(&self) -> Option<i64> {
        (self.assigned > 0).then(|| self.offset + 1)
    }

    pub fn last_new_id(&self) -> Option<i64> {
        let assigned = i64::try_from(self.assigned).ok()?;
        (assigned > 0).then(|| self.offset + assigned)
    }
}

/// Turn the `max(new_id)` aggregate into the offset for the next date.
///
/// An empty aggregate means nothing has been numbered yet, so numbering
/// starts at 1.
pub fn offset_from_max(max_new_id: Option<i64>) -> Result<i64, RenumberError> {
    match max_new_id {
        None => Ok(0),
        Some(max) if max < 0 => Err(RenumberError::NegativeMax(max)),
        Some(max) => Ok(max),
    }
}

/// Order pending tickets by `(received_at, ticket_id)` and number them from
/// `offset + 1`.
pub fn plan_assignments(
    offset: i64,
    pending: &[PendingTicket],
) -> Result<Vec<Assignment>, RenumberError> {
    let mut ordered: Vec<&PendingTicket> = pending.iter().collect();
    ordered.sort_by(|a, b| {
        a.received_at
            .cmp(&b.received_at)
            .then(a.ticket_id.cmp(&b.ticket_id))
    });

    let overflow = || RenumberError::Overflow {
        offset,
        count: pending.len(),
    };

    ordered
        .into_iter()
        .enumerate()
        .map(|(index, ticket)| {
            let rank = i64::try_from(index + 1).map_err(|_| overflow())?;
            let new_id = offset.checked_add(rank).ok_or_else(overflow)?;
            Ok(Assignment {
                ticket_id: ticket.ticket_id,
                new_id,
            })
        })
        .collect()
}
