use deadpool_postgres::Object;
use tracing::{debug, info, instrument, trace};

use crate::db::PgPool;
use crate::db::TicketTables;
use crate::db::tickets::{
    TicketStatements, TicketStorageError, assign_new_ids, last_new_id, lock_tickets,
    pending_tickets,
};
use crate::driver::RaceDayProcessor;
use crate::race_date::RaceDate;
use crate::renumber::{DayReport, plan_assignments};

/// What the pass assumes about other writers to `tickets`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConcurrencyMode {
    /// Nothing else writes `tickets` while the pass runs.
    #[default]
    Exclusive,
    /// Lock `tickets` against other writers for each date's transaction.
    TableLock,
}

impl ConcurrencyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConcurrencyMode::Exclusive => "exclusive",
            ConcurrencyMode::TableLock => "table-lock",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessorOptions {
    pub tables: TicketTables,
    pub concurrency: ConcurrencyMode,
    pub dry_run: bool,
}

/// Postgres-backed day processor holding the single connection of the run.
///
/// The connection goes back to the pool when the processor is dropped.
pub struct PgDayProcessor {
    client: Object,
    statements: TicketStatements,
    concurrency: ConcurrencyMode,
    dry_run: bool,
    planned_high_water: Option<i64>,
}

impl PgDayProcessor {
    pub async fn acquire(
        pool: &PgPool,
        options: ProcessorOptions,
    ) -> Result<Self, TicketStorageError> {
        let client = pool.get().await?;
        info!(
            schema = options.tables.schema(),
            concurrency = options.concurrency.as_str(),
            dry_run = options.dry_run,
            "acquired renumbering connection"
        );

        Ok(Self {
            client,
            statements: TicketStatements::new(&options.tables),
            concurrency: options.concurrency,
            dry_run: options.dry_run,
            planned_high_water: None,
        })
    }

    /// Offset read, ranking and update in one transaction. Any error drops
    /// the transaction uncommitted, so the date is either fully numbered or
    /// left as it was.
    #[instrument(skip(self), fields(race_date = %race_date))]
    async fn assign_day(&mut self, race_date: RaceDate) -> Result<DayReport, TicketStorageError> {
        let tx = self.client.transaction().await?;

        if self.concurrency == ConcurrencyMode::TableLock {
            lock_tickets(&tx, &self.statements).await?;
        }

        let offset = last_new_id(&tx, &self.statements).await?;
        debug!(offset, "processing from offset");

        let assigned = assign_new_ids(&tx, &self.statements, race_date, offset).await?;
        tx.commit().await?;

        Ok(DayReport::new(race_date, offset, assigned))
    }

    /// Compute the numbering without writing. Earlier planned dates raise
    /// the offset of later ones as a real pass would.
    #[instrument(skip(self), fields(race_date = %race_date))]
    async fn plan_day(&mut self, race_date: RaceDate) -> Result<DayReport, TicketStorageError> {
        let tx = self.client.transaction().await?;

        let stored = last_new_id(&tx, &self.statements).await?;
        let offset = stored.max(self.planned_high_water.unwrap_or(0));
        let pending = pending_tickets(&tx, &self.statements, race_date).await?;
        tx.rollback().await?;

        let plan = plan_assignments(offset, &pending)?;
        for assignment in &plan {
            trace!(
                ticket_id = assignment.ticket_id,
                new_id = assignment.new_id,
                "planned new_id"
            );
        }
        if let Some(last) = plan.last() {
            self.planned_high_water = Some(last.new_id);
        }

        let mut report = DayReport::new(race_date, offset, plan.len() as u64);
        report.dry_run = true;
        Ok(report)
    }
}

impl RaceDayProcessor for PgDayProcessor {
    type Error = TicketStorageError;

    async fn process_day(&mut self, race_date: RaceDate) -> Result<DayReport, Self::Error> {
        if self.dry_run {
            self.plan_day(race_date).await
        } else {
            self.assign_day(race_date).await
        }
    }
}
