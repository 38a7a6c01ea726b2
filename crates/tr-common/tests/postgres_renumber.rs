//! End-to-end checks against a real Postgres.
//!
//! Skipped unless `TR_TEST_DATABASE_URL` points at a database the tests may
//! create and drop scratch schemas in.

use std::collections::BTreeMap;
use std::error::Error;

use tr_common::db::{
    ConcurrencyMode, PgDayProcessor, PgPool, ProcessorOptions, TicketStorageError, TicketTables,
    create_pool_from_url,
};
use tr_common::{RaceDate, RunSummary, race_dates, run_id, run_race_dates};

type TestResult<T> = Result<T, Box<dyn Error>>;

fn test_database_url() -> Option<String> {
    std::env::var("TR_TEST_DATABASE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
}

fn day(key: &str) -> RaceDate {
    key.parse().unwrap()
}

struct Scratch {
    pool: PgPool,
    tables: TicketTables,
}

impl Scratch {
    async fn create(url: &str, seed: &str) -> TestResult<Self> {
        let pool = create_pool_from_url(url, 2)?;
        let schema = format!("tr_test_{}", run_id::generate().to_ascii_lowercase());
        let tables = TicketTables::in_schema(&schema)?;

        let client = pool.get().await?;
        client
            .batch_execute(&format!(
                "CREATE SCHEMA {schema};
                 CREATE TABLE {schema}.raw_ticket_batches (
                    id BIGINT PRIMARY KEY,
                    received_at TIMESTAMP NOT NULL
                 );
                 CREATE TABLE {schema}.tickets (
                    id BIGINT PRIMARY KEY,
                    race_date DATE NOT NULL,
                    raw_ticket_batch_id BIGINT NOT NULL,
                    new_id BIGINT
                 );
                 SET search_path TO {schema};
                 {seed}
                 RESET search_path;"
            ))
            .await?;

        Ok(Self { pool, tables })
    }

    async fn new_ids(&self) -> TestResult<BTreeMap<i64, Option<i64>>> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT id, new_id FROM {} ORDER BY id", self.tables.tickets());
        let rows = client.query(sql.as_str(), &[]).await?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<_, i64>("id"), row.get::<_, Option<i64>>("new_id")))
            .collect())
    }

    async fn run(
        &self,
        start: &str,
        end: &str,
        concurrency: ConcurrencyMode,
        dry_run: bool,
    ) -> TestResult<RunSummary> {
        let options = ProcessorOptions {
            tables: self.tables.clone(),
            concurrency,
            dry_run,
        };
        let mut processor = PgDayProcessor::acquire(&self.pool, options).await?;
        Ok(run_race_dates(&mut processor, race_dates(day(start), day(end))).await?)
    }

    async fn drop_schema(self) {
        if let Ok(client) = self.pool.get().await {
            let _ = client
                .batch_execute(&format!("DROP SCHEMA {} CASCADE", self.tables.schema()))
                .await;
        }
        self.pool.close();
    }
}

const TIE_BREAK_SEED: &str = "
    INSERT INTO raw_ticket_batches (id, received_at) VALUES
        (1, '2018-02-19 08:00:00'),
        (2, '2018-02-20 09:00:00'),
        (3, '2018-02-20 10:00:00'),
        (4, '2018-02-21 07:00:00');
    INSERT INTO tickets (id, race_date, raw_ticket_batch_id, new_id) VALUES
        (1, '2018-02-19', 1, 100),
        (5, '2018-02-20', 2, NULL),
        (3, '2018-02-20', 2, NULL),
        (9, '2018-02-20', 3, NULL),
        (12, '2018-02-21', 4, NULL),
        (11, '2018-02-21', 4, NULL),
        (13, '2018-02-21', 999, NULL);
";

#[tokio::test]
async fn tie_break_scenario_continues_after_existing_max() {
    let Some(url) = test_database_url() else {
        eprintln!("TR_TEST_DATABASE_URL not set; skipping");
        return;
    };
    let scratch = Scratch::create(&url, TIE_BREAK_SEED).await.unwrap();

    let outcome = async {
        let first = scratch
            .run("20180220", "20180221", ConcurrencyMode::TableLock, false)
            .await?;
        let after_first = scratch.new_ids().await?;
        let second = scratch
            .run("20180220", "20180221", ConcurrencyMode::Exclusive, false)
            .await?;
        let after_second = scratch.new_ids().await?;
        TestResult::Ok((first, after_first, second, after_second))
    }
    .await;
    scratch.drop_schema().await;
    let (first, after_first, second, after_second) = outcome.unwrap();

    assert_eq!(after_first[&1], Some(100));
    assert_eq!(after_first[&3], Some(101));
    assert_eq!(after_first[&5], Some(102));
    assert_eq!(after_first[&9], Some(103));
    assert_eq!(after_first[&11], Some(104));
    assert_eq!(after_first[&12], Some(105));
    assert_eq!(after_first[&13], None, "ticket without a batch has no ordering key");

    let offsets: Vec<i64> = first.days.iter().map(|d| d.offset).collect();
    assert_eq!(offsets, vec![100, 103]);
    assert_eq!(first.assigned, 5);

    assert_eq!(second.assigned, 0);
    assert_eq!(after_second, after_first);
}

#[tokio::test]
async fn empty_table_starts_at_one_and_dry_run_writes_nothing() {
    let Some(url) = test_database_url() else {
        eprintln!("TR_TEST_DATABASE_URL not set; skipping");
        return;
    };
    let seed = "
        INSERT INTO raw_ticket_batches (id, received_at) VALUES
            (1, '2018-03-01 12:00:00'),
            (2, '2018-03-01 06:00:00'),
            (3, '2018-03-02 06:00:00');
        INSERT INTO tickets (id, race_date, raw_ticket_batch_id, new_id) VALUES
            (20, '2018-03-01', 1, NULL),
            (21, '2018-03-01', 2, NULL),
            (22, '2018-03-02', 3, NULL);
    ";
    let scratch = Scratch::create(&url, seed).await.unwrap();

    let outcome = async {
        let planned = scratch
            .run("20180301", "20180302", ConcurrencyMode::Exclusive, true)
            .await?;
        let after_plan = scratch.new_ids().await?;
        let applied = scratch
            .run("20180301", "20180302", ConcurrencyMode::Exclusive, false)
            .await?;
        let after_apply = scratch.new_ids().await?;
        TestResult::Ok((planned, after_plan, applied, after_apply))
    }
    .await;
    scratch.drop_schema().await;
    let (planned, after_plan, applied, after_apply) = outcome.unwrap();

    assert!(after_plan.values().all(Option::is_none));
    assert!(planned.days.iter().all(|d| d.dry_run));
    assert_eq!(planned.assigned, 3);

    assert_eq!(after_apply[&21], Some(1));
    assert_eq!(after_apply[&20], Some(2));
    assert_eq!(after_apply[&22], Some(3));

    let planned_offsets: Vec<i64> = planned.days.iter().map(|d| d.offset).collect();
    let applied_offsets: Vec<i64> = applied.days.iter().map(|d| d.offset).collect();
    assert_eq!(planned_offsets, vec![0, 2]);
    assert_eq!(applied_offsets, planned_offsets);
}

#[tokio::test]
async fn failed_date_rolls_back_and_aborts_the_run() {
    let Some(url) = test_database_url() else {
        eprintln!("TR_TEST_DATABASE_URL not set; skipping");
        return;
    };
    // 20180221 would hand out 3, 4 and 5; the constraint rejects 5.
    let seed = "
        ALTER TABLE tickets ADD CONSTRAINT tickets_new_id_check CHECK (new_id <> 5);
        INSERT INTO raw_ticket_batches (id, received_at) VALUES
            (1, '2018-02-20 08:00:00'),
            (2, '2018-02-21 08:00:00'),
            (3, '2018-02-22 08:00:00');
        INSERT INTO tickets (id, race_date, raw_ticket_batch_id, new_id) VALUES
            (1, '2018-02-20', 1, NULL),
            (2, '2018-02-20', 1, NULL),
            (3, '2018-02-21', 2, NULL),
            (4, '2018-02-21', 2, NULL),
            (5, '2018-02-21', 2, NULL),
            (6, '2018-02-22', 3, NULL);
    ";
    let scratch = Scratch::create(&url, seed).await.unwrap();

    let outcome = async {
        let options = ProcessorOptions {
            tables: scratch.tables.clone(),
            concurrency: ConcurrencyMode::TableLock,
            dry_run: false,
        };
        let mut processor = PgDayProcessor::acquire(&scratch.pool, options).await?;
        let result =
            run_race_dates(&mut processor, race_dates(day("20180220"), day("20180222"))).await;
        drop(processor);
        let after = scratch.new_ids().await?;
        TestResult::Ok((result, after))
    }
    .await;
    scratch.drop_schema().await;
    let (result, after) = outcome.unwrap();

    let err = result.unwrap_err();
    let TicketStorageError::Postgres(pg) = &err else {
        panic!("expected a postgres error, got {err:?}");
    };
    assert_eq!(
        pg.as_db_error().and_then(|db| db.constraint()),
        Some("tickets_new_id_check")
    );

    assert_eq!(after[&1], Some(1), "first date stays committed");
    assert_eq!(after[&2], Some(2), "first date stays committed");
    assert_eq!(after[&3], None, "failed date leaves no partial assignment");
    assert_eq!(after[&4], None, "failed date leaves no partial assignment");
    assert_eq!(after[&5], None, "failed date leaves no partial assignment");
    assert_eq!(after[&6], None, "dates after the failure are not processed");
}
