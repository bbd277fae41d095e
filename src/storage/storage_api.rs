// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Trait that defines the API between the event pipeline and the storage.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use strum_macros::Display;

/// Lifecycle status of a job aggregate. The numeric values are the on-chain
/// status codes and only ever move forward (Active is the floor, a job never
/// returns to Active once Completed/Disputed/Resolved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, Serialize)]
pub enum JobStatus {
    Active = 1,
    Completed = 2,
    Disputed = 3,
    Resolved = 4,
}

impl JobStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Active),
            2 => Some(Self::Completed),
            3 => Some(Self::Disputed),
            4 => Some(Self::Resolved),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// Field set applied when a job is first referenced. Upsert semantics: the row
/// is created if absent, and the listed fields are overwritten if present,
/// except that the status never moves backwards.
#[derive(Debug, Clone)]
pub struct JobUpsert {
    pub job_id: u64,
    pub client: String,
    pub freelancer: String,
    pub amount: String,
    pub deadline: u64,
    pub status: JobStatus,
}

/// Materialized job aggregate as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub job_id: u64,
    pub client: Option<String>,
    pub freelancer: Option<String>,
    pub amount: Option<String>,
    pub deadline: Option<u64>,
    pub status: JobStatus,
    pub dispute_id: Option<u64>,
    pub is_cross_chain: bool,
    pub remote_job_id: Option<u64>,
    pub destination_chain: Option<String>,
    pub source_chain: Option<String>,
}

/// Materialized freelancer reputation aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    pub address: String,
    pub total_earned: String,
    pub completed_jobs: u64,
    pub rating_sum: u64,
    pub rating_count: u64,
}

/// Durable dedup record for one physical log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEvent {
    pub transaction_hash: String,
    pub log_index: u64,
    pub event_name: String,
    pub block_number: u64,
    pub raw_args: Value,
    pub notified: bool,
}

/// Result of the insert-if-absent on the idempotency ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    pub created: bool,
    pub already_notified: bool,
}

/// Trait that defines the API between the event pipeline and the storage.
///
/// All operations on a given cursor key or a given (transaction hash, log
/// index) key must be serialized with respect to each other: backfill catch-up
/// and live-tail startup legitimately race over the same trailing blocks.
pub trait Storage: Send + Sync + 'static {
    // Progress cursor.

    /// Highest fully-processed block for a contract, if any chunk completed.
    fn cursor(&self, contract_name: &str) -> Result<Option<u64>>;
    /// Monotonic max-update: a concurrent writer that already advanced past
    /// `block` wins; the stored value never decreases.
    fn advance_cursor(&self, contract_name: &str, block: u64) -> Result<()>;

    // Idempotency ledger.

    /// Atomically inserts the record if the (transaction hash, log index) pair
    /// is new, and reports whether an existing record was already notified.
    fn record_if_new(&self, record: &ProcessedEvent) -> Result<RecordOutcome>;
    /// Flips the notified flag. Runs only after a successful publish.
    fn mark_notified(&self, transaction_hash: &str, log_index: u64) -> Result<()>;
    fn find_processed(
        &self,
        transaction_hash: &str,
        log_index: u64,
    ) -> Result<Option<ProcessedEvent>>;

    // Job aggregate.

    fn upsert_job(&self, job: &JobUpsert) -> Result<()>;
    /// Monotonic status transition; reports whether the row actually moved
    /// forward so increment-bearing handlers can gate on the first transition.
    /// Creates a job shell when the id has not been seen yet (out-of-order
    /// delivery across live tail and trailing backfill).
    fn transition_job_status(&self, job_id: u64, status: JobStatus) -> Result<bool>;
    fn set_job_dispute(&self, job_id: u64, dispute_id: u64) -> Result<()>;
    /// Status transition addressed by dispute id instead of job id (the
    /// arbitrator's events do not carry the job id).
    fn transition_status_by_dispute(&self, dispute_id: u64, status: JobStatus) -> Result<bool>;
    fn add_milestone(
        &self,
        job_id: u64,
        milestone_id: u64,
        amount: &str,
        description: &str,
    ) -> Result<()>;
    fn release_milestone(&self, job_id: u64, milestone_id: u64) -> Result<()>;
    fn add_applicant(&self, job_id: u64, applicant: &str, stake: &str) -> Result<()>;
    /// Insert-if-absent keyed (job, reviewer); reports whether the row is new.
    fn add_review(&self, job_id: u64, reviewer: &str, freelancer: &str, rating: u8)
    -> Result<bool>;
    fn mark_cross_chain(
        &self,
        job_id: u64,
        remote_job_id: u64,
        destination_chain: &str,
    ) -> Result<()>;
    fn set_job_source_chain(&self, job_id: u64, source_chain: &str) -> Result<()>;
    fn find_job(&self, job_id: u64) -> Result<Option<JobRecord>>;

    // Profile aggregate.

    /// Adds `amount` to the freelancer's lifetime earnings and bumps the
    /// completed-jobs counter. Callers gate this behind the job's Completed
    /// transition so replays cannot double-credit.
    fn credit_profile(&self, address: &str, amount: &str) -> Result<()>;
    fn record_rating(&self, address: &str, rating: u8) -> Result<()>;
    fn find_profile(&self, address: &str) -> Result<Option<ProfileRecord>>;
}
