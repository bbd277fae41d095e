// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Module that handles the connection to the DuckDB database.
//!
//! # Description
//!
//! One connection behind a mutex backs every table. The lock is what gives the
//! storage contract its atomicity: cursor max-merges, the insert-if-absent on
//! the idempotency ledger and the read-modify-write on profile earnings all
//! run as one critical section, so the backfill task and the live watchers can
//! race over the same keys safely.

use crate::constants::{DUCKDB_BASE_TABLE_NAME, DUCKDB_SCHEMA_VERSION};
use crate::storage::storage_api::{
    JobRecord, JobStatus, JobUpsert, ProcessedEvent, ProfileRecord, RecordOutcome, Storage,
};
use alloy::primitives::U256;
use anyhow::Result;
use chrono::Utc;
use duckdb::{Connection, params};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

pub struct DuckDBStorage {
    conn: Mutex<Connection>,
}

impl DuckDBStorage {
    /// Opens (and initializes if needed) the database at the given path.
    pub fn with_db(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::initialize(conn)
    }

    /// In-memory database, used by the test suite.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        let storage = Self {
            conn: Mutex::new(conn),
        };

        let table_exists: bool = {
            let conn = storage.lock();
            conn.query_row(
                r#"
                    SELECT
                        count(*) > 0
                    FROM
                        information_schema.tables
                    WHERE
                        table_schema = 'main'
                        AND table_name = ?
                        AND table_type = 'BASE TABLE';"#,
                [DUCKDB_BASE_TABLE_NAME],
                |row| row.get(0),
            )?
        };

        if !table_exists {
            info!("Initializing DB...");
            storage.create_schema()?;
        } else {
            let version: String = {
                let conn = storage.lock();
                conn.query_row(
                    &format!("SELECT version FROM {DUCKDB_BASE_TABLE_NAME} LIMIT 1"),
                    [],
                    |row| row.get(0),
                )?
            };

            if version != DUCKDB_SCHEMA_VERSION {
                info!("Your database is out of date. Please run the database upgrade.");
            }
        }

        Ok(storage)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned mutex means another pipeline panicked mid-write; there is
        // no meaningful recovery beyond restarting the process.
        self.conn.lock().expect("storage mutex poisoned")
    }

    fn create_schema(&self) -> Result<()> {
        let statement = format!(
            "
            BEGIN;
            CREATE TABLE IF NOT EXISTS {DUCKDB_BASE_TABLE_NAME}(
                version VARCHAR NOT NULL,
                PRIMARY KEY (version)
            );
            CREATE TABLE IF NOT EXISTS sync_cursor(
                contract_name VARCHAR NOT NULL,
                last_block BIGINT NOT NULL,
                PRIMARY KEY (contract_name)
            );
            CREATE TABLE IF NOT EXISTS processed_events(
                transaction_hash VARCHAR NOT NULL,
                log_index BIGINT NOT NULL,
                event_name VARCHAR NOT NULL,
                block_number BIGINT NOT NULL,
                raw_args VARCHAR,
                notified BOOLEAN NOT NULL DEFAULT false,
                processed_at VARCHAR NOT NULL,
                PRIMARY KEY (transaction_hash, log_index)
            );
            CREATE TABLE IF NOT EXISTS jobs(
                job_id BIGINT NOT NULL,
                client VARCHAR,
                freelancer VARCHAR,
                amount VARCHAR,
                deadline BIGINT,
                status SMALLINT NOT NULL,
                dispute_id BIGINT,
                is_cross_chain BOOLEAN NOT NULL DEFAULT false,
                remote_job_id BIGINT,
                destination_chain VARCHAR,
                source_chain VARCHAR,
                PRIMARY KEY (job_id)
            );
            CREATE TABLE IF NOT EXISTS job_milestones(
                job_id BIGINT NOT NULL,
                milestone_id BIGINT NOT NULL,
                amount VARCHAR,
                description VARCHAR,
                released BOOLEAN NOT NULL DEFAULT false,
                PRIMARY KEY (job_id, milestone_id)
            );
            CREATE TABLE IF NOT EXISTS job_applicants(
                job_id BIGINT NOT NULL,
                applicant VARCHAR NOT NULL,
                stake VARCHAR,
                PRIMARY KEY (job_id, applicant)
            );
            CREATE TABLE IF NOT EXISTS job_reviews(
                job_id BIGINT NOT NULL,
                reviewer VARCHAR NOT NULL,
                freelancer VARCHAR,
                rating SMALLINT,
                PRIMARY KEY (job_id, reviewer)
            );
            CREATE TABLE IF NOT EXISTS profiles(
                address VARCHAR NOT NULL,
                total_earned VARCHAR NOT NULL DEFAULT '0',
                completed_jobs BIGINT NOT NULL DEFAULT 0,
                rating_sum BIGINT NOT NULL DEFAULT 0,
                rating_count BIGINT NOT NULL DEFAULT 0,
                PRIMARY KEY (address)
            );
            COMMIT;"
        );

        let conn = self.lock();
        conn.execute_batch(&statement)?;
        conn.execute(
            &format!("INSERT INTO {DUCKDB_BASE_TABLE_NAME} (version) VALUES (?);"),
            [DUCKDB_SCHEMA_VERSION],
        )?;

        Ok(())
    }

    fn ensure_profile(conn: &Connection, address: &str) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO profiles (address) VALUES (?);",
            [address],
        )?;
        Ok(())
    }

    fn job_status(conn: &Connection, job_id: u64) -> Result<Option<JobStatus>> {
        let code = match conn.query_row(
            "SELECT status FROM jobs WHERE job_id = ?;",
            [job_id as i64],
            |row| row.get::<_, i64>(0),
        ) {
            Ok(code) => code,
            Err(duckdb::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        JobStatus::from_code(code)
            .ok_or_else(|| anyhow::anyhow!("Unknown job status code {code} for job {job_id}"))
            .map(Some)
    }
}

impl Storage for DuckDBStorage {
    fn cursor(&self, contract_name: &str) -> Result<Option<u64>> {
        let conn = self.lock();
        match conn.query_row(
            "SELECT last_block FROM sync_cursor WHERE contract_name = ?;",
            [contract_name],
            |row| row.get::<_, i64>(0),
        ) {
            Ok(block) => Ok(Some(block as u64)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn advance_cursor(&self, contract_name: &str, block: u64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO sync_cursor (contract_name, last_block) VALUES (?, ?)
             ON CONFLICT (contract_name)
             DO UPDATE SET last_block = GREATEST(last_block, excluded.last_block);",
            params![contract_name, block as i64],
        )?;
        Ok(())
    }

    fn record_if_new(&self, record: &ProcessedEvent) -> Result<RecordOutcome> {
        let conn = self.lock();

        match conn.query_row(
            "SELECT notified FROM processed_events WHERE transaction_hash = ? AND log_index = ?;",
            params![record.transaction_hash, record.log_index as i64],
            |row| row.get::<_, bool>(0),
        ) {
            Ok(notified) => Ok(RecordOutcome {
                created: false,
                already_notified: notified,
            }),
            Err(duckdb::Error::QueryReturnedNoRows) => {
                conn.execute(
                    "INSERT INTO processed_events
                     (transaction_hash, log_index, event_name, block_number, raw_args, notified, processed_at)
                     VALUES (?, ?, ?, ?, ?, false, ?);",
                    params![
                        record.transaction_hash,
                        record.log_index as i64,
                        record.event_name,
                        record.block_number as i64,
                        record.raw_args.to_string(),
                        Utc::now().to_rfc3339(),
                    ],
                )?;
                Ok(RecordOutcome {
                    created: true,
                    already_notified: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn mark_notified(&self, transaction_hash: &str, log_index: u64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE processed_events SET notified = true
             WHERE transaction_hash = ? AND log_index = ?;",
            params![transaction_hash, log_index as i64],
        )?;
        Ok(())
    }

    fn find_processed(
        &self,
        transaction_hash: &str,
        log_index: u64,
    ) -> Result<Option<ProcessedEvent>> {
        let conn = self.lock();
        match conn.query_row(
            "SELECT transaction_hash, log_index, event_name, block_number, raw_args, notified
             FROM processed_events WHERE transaction_hash = ? AND log_index = ?;",
            params![transaction_hash, log_index as i64],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, bool>(5)?,
                ))
            },
        ) {
            Ok((tx, idx, name, block, raw, notified)) => Ok(Some(ProcessedEvent {
                transaction_hash: tx,
                log_index: idx as u64,
                event_name: name,
                block_number: block as u64,
                raw_args: raw
                    .as_deref()
                    .map(serde_json::from_str)
                    .transpose()?
                    .unwrap_or(serde_json::Value::Null),
                notified,
            })),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn upsert_job(&self, job: &JobUpsert) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO jobs (job_id, client, freelancer, amount, deadline, status)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (job_id) DO UPDATE SET
                client = excluded.client,
                freelancer = excluded.freelancer,
                amount = excluded.amount,
                deadline = excluded.deadline,
                status = GREATEST(status, excluded.status);",
            params![
                job.job_id as i64,
                job.client,
                job.freelancer,
                job.amount,
                job.deadline as i64,
                job.status.code(),
            ],
        )?;
        Ok(())
    }

    fn transition_job_status(&self, job_id: u64, status: JobStatus) -> Result<bool> {
        let conn = self.lock();

        match Self::job_status(&conn, job_id)? {
            None => {
                // Job shell for an out-of-order first reference; a later
                // JobCreated upsert fills the rest without regressing status.
                conn.execute(
                    "INSERT INTO jobs (job_id, status) VALUES (?, ?);",
                    params![job_id as i64, status.code()],
                )?;
                Ok(true)
            }
            Some(current) if current < status => {
                conn.execute(
                    "UPDATE jobs SET status = ? WHERE job_id = ?;",
                    params![status.code(), job_id as i64],
                )?;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    fn set_job_dispute(&self, job_id: u64, dispute_id: u64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET dispute_id = ? WHERE job_id = ?;",
            params![dispute_id as i64, job_id as i64],
        )?;
        Ok(())
    }

    fn transition_status_by_dispute(&self, dispute_id: u64, status: JobStatus) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE jobs SET status = ? WHERE dispute_id = ? AND status < ?;",
            params![status.code(), dispute_id as i64, status.code()],
        )?;
        Ok(changed > 0)
    }

    fn add_milestone(
        &self,
        job_id: u64,
        milestone_id: u64,
        amount: &str,
        description: &str,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO job_milestones (job_id, milestone_id, amount, description)
             VALUES (?, ?, ?, ?);",
            params![job_id as i64, milestone_id as i64, amount, description],
        )?;
        Ok(())
    }

    fn release_milestone(&self, job_id: u64, milestone_id: u64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE job_milestones SET released = true WHERE job_id = ? AND milestone_id = ?;",
            params![job_id as i64, milestone_id as i64],
        )?;
        Ok(())
    }

    fn add_applicant(&self, job_id: u64, applicant: &str, stake: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO job_applicants (job_id, applicant, stake) VALUES (?, ?, ?);",
            params![job_id as i64, applicant, stake],
        )?;
        Ok(())
    }

    fn add_review(
        &self,
        job_id: u64,
        reviewer: &str,
        freelancer: &str,
        rating: u8,
    ) -> Result<bool> {
        let conn = self.lock();

        let exists: bool = conn.query_row(
            "SELECT count(*) > 0 FROM job_reviews WHERE job_id = ? AND reviewer = ?;",
            params![job_id as i64, reviewer],
            |row| row.get(0),
        )?;
        if exists {
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO job_reviews (job_id, reviewer, freelancer, rating) VALUES (?, ?, ?, ?);",
            params![job_id as i64, reviewer, freelancer, rating as i64],
        )?;
        Ok(true)
    }

    fn mark_cross_chain(
        &self,
        job_id: u64,
        remote_job_id: u64,
        destination_chain: &str,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET is_cross_chain = true, remote_job_id = ?, destination_chain = ?
             WHERE job_id = ?;",
            params![remote_job_id as i64, destination_chain, job_id as i64],
        )?;
        Ok(())
    }

    fn set_job_source_chain(&self, job_id: u64, source_chain: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET source_chain = ? WHERE job_id = ?;",
            params![source_chain, job_id as i64],
        )?;
        Ok(())
    }

    fn find_job(&self, job_id: u64) -> Result<Option<JobRecord>> {
        let conn = self.lock();
        match conn.query_row(
            "SELECT job_id, client, freelancer, amount, deadline, status, dispute_id,
                    is_cross_chain, remote_job_id, destination_chain, source_chain
             FROM jobs WHERE job_id = ?;",
            [job_id as i64],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, bool>(7)?,
                    row.get::<_, Option<i64>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, Option<String>>(10)?,
                ))
            },
        ) {
            Ok((
                id,
                client,
                freelancer,
                amount,
                deadline,
                status,
                dispute_id,
                is_cross_chain,
                remote_job_id,
                destination_chain,
                source_chain,
            )) => Ok(Some(JobRecord {
                job_id: id as u64,
                client,
                freelancer,
                amount,
                deadline: deadline.map(|d| d as u64),
                status: JobStatus::from_code(status).ok_or_else(|| {
                    anyhow::anyhow!("Unknown job status code {status} for job {id}")
                })?,
                dispute_id: dispute_id.map(|d| d as u64),
                is_cross_chain,
                remote_job_id: remote_job_id.map(|r| r as u64),
                destination_chain,
                source_chain,
            })),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn credit_profile(&self, address: &str, amount: &str) -> Result<()> {
        let conn = self.lock();
        Self::ensure_profile(&conn, address)?;

        // Earnings are uint256 totals stored as decimal strings; the addition
        // happens here, under the connection lock.
        let current: String = conn.query_row(
            "SELECT total_earned FROM profiles WHERE address = ?;",
            [address],
            |row| row.get(0),
        )?;
        let total = U256::from_str(&current)
            .map_err(|e| anyhow::anyhow!("Corrupt total_earned for {address}: {e}"))?
            .checked_add(
                U256::from_str(amount)
                    .map_err(|e| anyhow::anyhow!("Invalid credit amount {amount}: {e}"))?,
            )
            .ok_or_else(|| anyhow::anyhow!("total_earned overflow for {address}"))?;

        conn.execute(
            "UPDATE profiles SET total_earned = ?, completed_jobs = completed_jobs + 1
             WHERE address = ?;",
            params![total.to_string(), address],
        )?;
        Ok(())
    }

    fn record_rating(&self, address: &str, rating: u8) -> Result<()> {
        let conn = self.lock();
        Self::ensure_profile(&conn, address)?;
        conn.execute(
            "UPDATE profiles SET rating_sum = rating_sum + ?, rating_count = rating_count + 1
             WHERE address = ?;",
            params![rating as i64, address],
        )?;
        Ok(())
    }

    fn find_profile(&self, address: &str) -> Result<Option<ProfileRecord>> {
        let conn = self.lock();
        match conn.query_row(
            "SELECT address, total_earned, completed_jobs, rating_sum, rating_count
             FROM profiles WHERE address = ?;",
            [address],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        ) {
            Ok((address, total_earned, completed_jobs, rating_sum, rating_count)) => {
                Ok(Some(ProfileRecord {
                    address,
                    total_earned,
                    completed_jobs: completed_jobs as u64,
                    rating_sum: rating_sum as u64,
                    rating_count: rating_count as u64,
                }))
            }
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn storage() -> DuckDBStorage {
        DuckDBStorage::in_memory().expect("failed to open in-memory duckdb")
    }

    fn sample_record(tx: &str, idx: u64) -> ProcessedEvent {
        ProcessedEvent {
            transaction_hash: tx.to_string(),
            log_index: idx,
            event_name: "JobCreated".to_string(),
            block_number: 100,
            raw_args: json!({"jobId": 1}),
            notified: false,
        }
    }

    #[rstest]
    fn cursor_is_absent_until_first_advance(storage: DuckDBStorage) {
        assert_eq!(storage.cursor("FreelanceEscrow").unwrap(), None);

        storage.advance_cursor("FreelanceEscrow", 100).unwrap();
        assert_eq!(storage.cursor("FreelanceEscrow").unwrap(), Some(100));
    }

    #[rstest]
    fn cursor_advance_is_a_monotonic_max_update(storage: DuckDBStorage) {
        storage.advance_cursor("FreelanceEscrow", 100).unwrap();
        // A late writer with a lower block must not regress the watermark.
        storage.advance_cursor("FreelanceEscrow", 50).unwrap();
        assert_eq!(storage.cursor("FreelanceEscrow").unwrap(), Some(100));

        storage.advance_cursor("FreelanceEscrow", 110).unwrap();
        assert_eq!(storage.cursor("FreelanceEscrow").unwrap(), Some(110));
    }

    #[rstest]
    fn cursors_are_independent_per_contract(storage: DuckDBStorage) {
        storage.advance_cursor("FreelanceEscrow", 100).unwrap();
        storage
            .advance_cursor("CrossChainEscrowManager", 60)
            .unwrap();

        assert_eq!(storage.cursor("FreelanceEscrow").unwrap(), Some(100));
        assert_eq!(
            storage.cursor("CrossChainEscrowManager").unwrap(),
            Some(60)
        );
    }

    #[rstest]
    fn record_if_new_deduplicates_on_tx_hash_and_log_index(storage: DuckDBStorage) {
        let record = sample_record("0xabc", 0);

        let first = storage.record_if_new(&record).unwrap();
        assert_eq!(
            first,
            RecordOutcome {
                created: true,
                already_notified: false
            }
        );

        let second = storage.record_if_new(&record).unwrap();
        assert_eq!(
            second,
            RecordOutcome {
                created: false,
                already_notified: false
            }
        );

        storage.mark_notified("0xabc", 0).unwrap();
        let third = storage.record_if_new(&record).unwrap();
        assert_eq!(
            third,
            RecordOutcome {
                created: false,
                already_notified: true
            }
        );

        // Same transaction, different log index is a different physical log.
        let sibling = storage.record_if_new(&sample_record("0xabc", 1)).unwrap();
        assert!(sibling.created);
    }

    #[rstest]
    fn job_upsert_never_regresses_status(storage: DuckDBStorage) {
        assert!(
            storage
                .transition_job_status(1, JobStatus::Completed)
                .unwrap()
        );

        // A replayed JobCreated fills the fields but keeps Completed.
        storage
            .upsert_job(&JobUpsert {
                job_id: 1,
                client: "0xc1".into(),
                freelancer: "0xf1".into(),
                amount: "1000".into(),
                deadline: 1_700_000_000,
                status: JobStatus::Active,
            })
            .unwrap();

        let job = storage.find_job(1).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.client.as_deref(), Some("0xc1"));
    }

    #[rstest]
    fn status_transitions_report_first_move_only(storage: DuckDBStorage) {
        assert!(
            storage
                .transition_job_status(7, JobStatus::Completed)
                .unwrap()
        );
        assert!(
            !storage
                .transition_job_status(7, JobStatus::Completed)
                .unwrap()
        );
        // Forward again is a move.
        assert!(
            storage
                .transition_job_status(7, JobStatus::Disputed)
                .unwrap()
        );
    }

    #[rstest]
    fn dispute_id_addresses_the_right_job(storage: DuckDBStorage) {
        storage.transition_job_status(3, JobStatus::Active).unwrap();
        storage.set_job_dispute(3, 99).unwrap();

        assert!(
            storage
                .transition_status_by_dispute(99, JobStatus::Disputed)
                .unwrap()
        );
        assert!(
            !storage
                .transition_status_by_dispute(99, JobStatus::Disputed)
                .unwrap()
        );
        assert_eq!(
            storage.find_job(3).unwrap().unwrap().status,
            JobStatus::Disputed
        );
    }

    #[rstest]
    fn profile_credit_accumulates_earnings(storage: DuckDBStorage) {
        storage.credit_profile("0xf1", "1000").unwrap();
        storage.credit_profile("0xf1", "500").unwrap();

        let profile = storage.find_profile("0xf1").unwrap().unwrap();
        assert_eq!(profile.total_earned, "1500");
        assert_eq!(profile.completed_jobs, 2);
    }

    #[rstest]
    fn review_rows_are_unique_per_job_and_reviewer(storage: DuckDBStorage) {
        assert!(storage.add_review(1, "0xc1", "0xf1", 5).unwrap());
        assert!(!storage.add_review(1, "0xc1", "0xf1", 5).unwrap());
        assert!(storage.add_review(2, "0xc1", "0xf1", 4).unwrap());
    }

    #[rstest]
    fn rating_aggregates_accumulate(storage: DuckDBStorage) {
        storage.record_rating("0xf1", 5).unwrap();
        storage.record_rating("0xf1", 3).unwrap();

        let profile = storage.find_profile("0xf1").unwrap().unwrap();
        assert_eq!(profile.rating_sum, 8);
        assert_eq!(profile.rating_count, 2);
    }

    #[rstest]
    fn milestones_and_applicants_are_insert_if_absent(storage: DuckDBStorage) {
        storage.add_milestone(1, 0, "500", "design").unwrap();
        storage.add_milestone(1, 0, "999", "changed").unwrap();
        storage.release_milestone(1, 0).unwrap();

        storage.add_applicant(1, "0xaa", "10").unwrap();
        storage.add_applicant(1, "0xaa", "10").unwrap();

        let conn = storage.lock();
        let milestone_count: i64 = conn
            .query_row("SELECT count(*) FROM job_milestones;", [], |r| r.get(0))
            .unwrap();
        let applicant_count: i64 = conn
            .query_row("SELECT count(*) FROM job_applicants;", [], |r| r.get(0))
            .unwrap();
        let amount: String = conn
            .query_row(
                "SELECT amount FROM job_milestones WHERE job_id = 1 AND milestone_id = 0;",
                [],
                |r| r.get(0),
            )
            .unwrap();

        assert_eq!(milestone_count, 1);
        assert_eq!(applicant_count, 1);
        assert_eq!(amount, "500");
    }

    #[rstest]
    fn cross_chain_marks_are_applied(storage: DuckDBStorage) {
        storage.transition_job_status(5, JobStatus::Active).unwrap();
        storage.mark_cross_chain(5, 77, "base").unwrap();
        storage.set_job_source_chain(5, "137").unwrap();

        let job = storage.find_job(5).unwrap().unwrap();
        assert!(job.is_cross_chain);
        assert_eq!(job.remote_job_id, Some(77));
        assert_eq!(job.destination_chain.as_deref(), Some("base"));
        assert_eq!(job.source_chain.as_deref(), Some("137"));
    }
}
