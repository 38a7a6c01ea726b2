use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::driver::RaceDayProcessor;
use crate::race_date::RaceDate;
use crate::renumber::{
    DayReport, PendingTicket, RawTicketBatch, RenumberError, Ticket, offset_from_max,
    plan_assignments,
};

/// In-memory `tickets` + `raw_ticket_batches` pair that follows the same
/// numbering rules as the Postgres statements.
#[derive(Debug, Default, Clone)]
pub struct TicketLedger {
    batches: HashMap<i64, DateTime<Utc>>,
    tickets: BTreeMap<i64, Ticket>,
    writes: u64,
}

impl TicketLedger {
    pub fn insert_batch(&mut self, batch: RawTicketBatch) {
        self.batches.insert(batch.id, batch.received_at);
    }

    pub fn insert_ticket(&mut self, ticket: Ticket) {
        self.tickets.insert(ticket.id, ticket);
    }

    pub fn new_id(&self, ticket_id: i64) -> Option<i64> {
        self.tickets.get(&ticket_id).and_then(|t| t.new_id)
    }

    pub fn tickets(&self) -> impl Iterator<Item = &Ticket> {
        self.tickets.values()
    }

    /// Total number of `new_id` writes performed so far.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn last_new_id(&self) -> Result<i64, RenumberError> {
        offset_from_max(self.tickets.values().filter_map(|t| t.new_id).max())
    }

    /// Unnumbered tickets of `race_date`. Tickets whose batch is unknown have
    /// no ordering key and are skipped.
    pub fn pending(&self, race_date: RaceDate) -> Vec<PendingTicket> {
        self.tickets
            .values()
            .filter(|t| t.race_date == race_date && t.new_id.is_none())
            .filter_map(|t| {
                self.batches
                    .get(&t.raw_ticket_batch_id)
                    .map(|received_at| PendingTicket {
                        ticket_id: t.id,
                        received_at: *received_at,
                    })
            })
            .collect()
    }

    pub fn assign_day(&mut self, race_date: RaceDate) -> Result<DayReport, RenumberError> {
        let offset = self.last_new_id()?;
        let plan = plan_assignments(offset, &self.pending(race_date))?;

        let mut assigned = 0u64;
        for assignment in &plan {
            if let Some(ticket) = self.tickets.get_mut(&assignment.ticket_id) {
                if ticket.new_id.is_none() {
                    ticket.new_id = Some(assignment.new_id);
                    assigned += 1;
                }
            }
        }
        self.writes += assigned;

        Ok(DayReport::new(race_date, offset, assigned))
    }
}

impl RaceDayProcessor for TicketLedger {
    type Error = RenumberError;

    async fn process_day(&mut self, race_date: RaceDate) -> Result<DayReport, Self::Error> {
        self.assign_day(race_date)
    }
}
