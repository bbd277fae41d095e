// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Library of the Rocinante crate.

pub mod backoff;
pub mod cli;
pub mod collector_seed;
pub use collector_seed::ContractSeed;
pub mod configuration;
pub mod contract_events;
pub mod event_collector;
pub use event_collector::EventCollector;
pub mod event_handlers;
pub mod event_pipeline;
pub use event_pipeline::EventPipeline;
pub mod ledger;
pub mod live_watcher;
pub use live_watcher::LiveWatcher;
pub mod metrics;
pub mod notifier;
pub use notifier::EventNotifier;
pub mod syncer_app;
pub use syncer_app::SyncerApp;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

/// Module with constants used throughout the application.
pub mod constants {
    /// Default block range for a single get_logs window. Chosen to stay under
    /// third-party log-query result-size and rate limits.
    pub const DEFAULT_BLOCK_RANGE: u64 = 10;
    /// Default cap on how many blocks a single catch-up run may replay. When the
    /// gap between the cursor and the chain head exceeds this value, the start
    /// block is clamped forward.
    pub const DEFAULT_MAX_BLOCK_GAP: u64 = 100_000;
    /// Pause between successfully processed windows, in milliseconds. Keeps the
    /// provider request rate well under free-tier limits.
    pub const INTER_WINDOW_DELAY_MS: u64 = 250;
    /// Base delay for the rate-limit retry policy, in milliseconds.
    pub const RATE_LIMIT_BACKOFF_MS: u64 = 2_000;
    /// Base delay for the fetch-recovery retry policy, in milliseconds.
    pub const FETCH_RECOVERY_BACKOFF_MS: u64 = 5_000;
    /// Upper bound for any single retry delay, in milliseconds.
    pub const BACKOFF_CAP_MS: u64 = 60_000;
    /// Delay before a live watcher resubscribes after its stream drops, in seconds.
    pub const RESUBSCRIBE_DELAY_SECS: u64 = 5;
    /// Capacity of the notification fan-out channel.
    pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;
    /// Path to the DuckDB database file.
    pub const DUCKDB_FILE_PATH: &str = "rocinante_syncer.duckdb";
    /// Schema version for the DuckDB database.
    pub const DUCKDB_SCHEMA_VERSION: &str = "0.1.0";
    /// Base table name for the DuckDB database.
    pub const DUCKDB_BASE_TABLE_NAME: &str = "rocinante_info";
    /// Base address for the metrics server that runs locally.
    pub const DEFAULT_METRICS_ADDRESS: &str = "127.0.0.1";
    /// Default port for the metrics server.
    pub const DEFAULT_METRICS_PORT: u16 = 5054;
}

/// Module with definitions related to the storage of the materialized view.
pub mod storage {
    pub mod storage_api;
    pub use storage_api::{
        JobRecord, JobStatus, JobUpsert, ProcessedEvent, ProfileRecord, RecordOutcome, Storage,
    };
    pub mod storage_duckdb;
    pub use storage_duckdb::DuckDBStorage;
}

pub mod error_codes {
    pub const ERROR_CODE_WRONG_INPUT_ARGUMENTS: i32 = 2;
    pub const ERROR_CODE_FAILED_TO_LOAD_CONFIGURATION_FROM_FILE: i32 = 3;
}

pub type RxCancellationToken = tokio::sync::broadcast::Receiver<()>;

/// Cancellation token for a graceful shutdown of the components of the syncer app.
#[derive(Clone)]
pub struct CancellationToken(tokio::sync::broadcast::Sender<()>);

impl CancellationToken {
    pub fn subscribe(&self) -> RxCancellationToken {
        self.0.subscribe()
    }

    pub fn graceful_shutdown(&self) {
        // Errors only when no receiver is alive, which means everything already stopped.
        let _ = self.0.send(());
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self(tokio::sync::broadcast::Sender::new(1))
    }
}
