use deadpool_postgres::{GenericClient, PoolError};
use tokio_postgres::Error as PgError;
use tracing::instrument;

use crate::db::TicketTables;
use crate::db::util::TimedClientExt;
use crate::race_date::RaceDate;
use crate::renumber::{PendingTicket, RenumberError, offset_from_max};

#[derive(Debug, thiserror::Error)]
pub enum TicketStorageError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
    #[error("invalid new_id state: {0}")]
    Renumber(#[from] RenumberError),
}

/// SQL for one schema, rendered once per run.
#[derive(Debug, Clone)]
pub struct TicketStatements {
    max_new_id: String,
    assign_new_ids: String,
    pending_tickets: String,
    lock_tickets: String,
}

impl TicketStatements {
    pub fn new(tables: &TicketTables) -> Self {
        let tickets = tables.tickets();
        let batches = tables.raw_ticket_batches();

        Self {
            max_new_id: format!("SELECT MAX(new_id)::BIGINT AS max_new_id FROM {tickets}"),
            assign_new_ids: format!(
                "WITH id_mapping AS (
                    SELECT
                        t.id AS old_id,
                        ROW_NUMBER() OVER (ORDER BY b.received_at, t.id) + $2::BIGINT AS new_id
                    FROM {tickets} AS t
                    INNER JOIN {batches} AS b ON b.id = t.raw_ticket_batch_id
                    WHERE t.race_date = $1
                      AND t.new_id IS NULL
                )
                UPDATE {tickets} AS t
                SET new_id = id_mapping.new_id
                FROM id_mapping
                WHERE t.id = id_mapping.old_id
                  AND t.new_id IS NULL"
            ),
            pending_tickets: format!(
                "SELECT
                    t.id::BIGINT AS ticket_id,
                    b.received_at::TIMESTAMPTZ AS received_at
                FROM {tickets} AS t
                INNER JOIN {batches} AS b ON b.id = t.raw_ticket_batch_id
                WHERE t.race_date = $1
                  AND t.new_id IS NULL
                ORDER BY b.received_at, t.id"
            ),
            lock_tickets: format!("LOCK TABLE {tickets} IN SHARE ROW EXCLUSIVE MODE"),
        }
    }

    pub fn max_new_id(&self) -> &str {
        &self.max_new_id
    }

    pub fn assign_new_ids(&self) -> &str {
        &self.assign_new_ids
    }

    pub fn pending_tickets(&self) -> &str {
        &self.pending_tickets
    }

    pub fn lock_tickets(&self) -> &str {
        &self.lock_tickets
    }
}

/// Largest `new_id` in the table, `0` when none has been assigned yet.
#[instrument(skip_all)]
pub async fn last_new_id<C>(
    client: &C,
    statements: &TicketStatements,
) -> Result<i64, TicketStorageError>
where
    C: GenericClient + ?Sized,
{
    let row = client
        .timed_query_one_cached(statements.max_new_id(), &[], "tickets.max_new_id")
        .await?;
    let max: Option<i64> = row.try_get("max_new_id")?;
    Ok(offset_from_max(max)?)
}

/// Number every unnumbered ticket of `race_date` from `offset + 1`, in
/// `(received_at, id)` order. Returns the number of rows written.
#[instrument(skip(client, statements), fields(race_date = %race_date))]
pub async fn assign_new_ids<C>(
    client: &C,
    statements: &TicketStatements,
    race_date: RaceDate,
    offset: i64,
) -> Result<u64, TicketStorageError>
where
    C: GenericClient + ?Sized,
{
    let date = race_date.date();
    let rows = client
        .timed_execute_cached(
            statements.assign_new_ids(),
            &[&date, &offset],
            "tickets.assign_new_ids",
        )
        .await?;
    Ok(rows)
}

/// Unnumbered tickets of `race_date` in ranking order.
#[instrument(skip(client, statements), fields(race_date = %race_date))]
pub async fn pending_tickets<C>(
    client: &C,
    statements: &TicketStatements,
    race_date: RaceDate,
) -> Result<Vec<PendingTicket>, TicketStorageError>
where
    C: GenericClient + ?Sized,
{
    let date = race_date.date();
    let rows = client
        .timed_query_cached(statements.pending_tickets(), &[&date], "tickets.pending")
        .await?;

    rows.iter()
        .map(|row| -> Result<PendingTicket, TicketStorageError> {
            Ok(PendingTicket {
                ticket_id: row.try_get("ticket_id")?,
                received_at: row.try_get("received_at")?,
            })
        })
        .collect()
}

/// Block other writers to `tickets` until the surrounding transaction ends.
pub async fn lock_tickets<C>(
    client: &C,
    statements: &TicketStatements,
) -> Result<(), TicketStorageError>
where
    C: GenericClient + ?Sized,
{
    client.batch_execute(statements.lock_tickets()).await?;
    Ok(())
}
