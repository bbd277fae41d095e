// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Module with the top-level orchestrator of the syncer.
//!
//! # Description
//!
//! Startup is two-phase: every configured contract is backfilled sequentially
//! up to the head observed when its collector starts (sequential on purpose,
//! one contract's catch-up at a time keeps the provider load bounded), and
//! only then are the live watchers spawned, one task per (contract, event
//! selector). The trailing blocks between a contract's backfill head and the
//! watchers' first delivery are covered by the idempotency ledger plus the
//! next restart's backfill.

use crate::{
    CancellationToken,
    backoff::RetryPolicy,
    collector_seed::{ContractSeed, build_seeds},
    configuration::SyncerConfiguration,
    constants, error_codes,
    event_collector::{CollectorOptions, EventCollector},
    event_pipeline::EventPipeline,
    ledger::{AlloyLedger, LedgerClient},
    live_watcher::LiveWatcher,
    metrics::{MetricsConfig, MetricsHandle},
    notifier::{EventEnvelope, EventNotifier},
    storage::DuckDBStorage,
};
use anyhow::Result;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal::ctrl_c, sync::broadcast};
use tracing::{error, info, warn};

pub struct SyncerApp {
    pipeline: Arc<EventPipeline>,
    ledger: Arc<dyn LedgerClient>,
    notifier: EventNotifier,
    metrics: MetricsHandle,
    metrics_config: MetricsConfig,
    collector_options: CollectorOptions,
    cancellation_token: CancellationToken,
    seeds: Vec<ContractSeed>,
}

impl SyncerApp {
    /// Builds a new instance of the syncer app using the configuration.
    pub fn build_app(config: &SyncerConfiguration) -> Result<Self> {
        let cancellation_token = CancellationToken::default();

        let metrics_config = MetricsConfig {
            enabled: config.metrics,
            address: config.metrics_address.clone(),
            port: config.metrics_port,
            allow_origin: config.metrics_allow_origin.clone(),
        };
        let metrics = MetricsHandle::new(&metrics_config)?;

        let storage = Arc::new(DuckDBStorage::with_db(&config.database_path)?);
        let notifier = EventNotifier::new(constants::NOTIFICATION_CHANNEL_CAPACITY);
        let ledger: Arc<dyn LedgerClient> =
            Arc::new(AlloyLedger::connect(config.rpc_url.expose_secret())?);

        let seeds = match build_seeds(config) {
            Ok(seeds) => seeds,
            Err(e) => {
                error!("Failed to build the sync seeds: {}", e);
                std::process::exit(error_codes::ERROR_CODE_WRONG_INPUT_ARGUMENTS);
            }
        };

        let pipeline = Arc::new(EventPipeline::new(
            storage,
            notifier.clone(),
            metrics.clone(),
        ));

        let collector_options = CollectorOptions {
            block_range: config.block_range,
            max_block_gap: config.max_block_gap,
            inter_window_delay: Duration::from_millis(constants::INTER_WINDOW_DELAY_MS),
            rate_limit_policy: RetryPolicy::rate_limit(),
            recovery_policy: RetryPolicy::recovery(),
        };

        Ok(Self {
            pipeline,
            ledger,
            notifier,
            metrics,
            metrics_config,
            collector_options,
            cancellation_token,
            seeds,
        })
    }

    /// A new subscription to the processed-event notifications.
    pub fn notifications(&self) -> broadcast::Receiver<EventEnvelope> {
        self.notifier.subscribe()
    }

    /// Runs the syncer app until Ctrl+C.
    pub async fn run(&self) -> Result<()> {
        self.metrics.serve(self.metrics_config.clone()).await?;

        let ctrl_c_task = Self::spawn_ctrl_c_handler(self.cancellation_token.clone());

        // Phase one: catch every contract up, one at a time.
        for seed in &self.seeds {
            let collector = EventCollector::new(
                self.ledger.clone(),
                self.pipeline.clone(),
                seed.registry(),
                seed.deploy_block,
                self.collector_options.clone(),
                self.metrics.clone(),
            );
            let mut cancel = self.cancellation_token.subscribe();
            collector.run(&mut cancel).await?;
        }

        info!("Backfill finished for all contracts, starting the live watchers");

        // Phase two: one watcher per (contract, event selector).
        let mut watcher_handles = Vec::new();
        for seed in &self.seeds {
            let registry = seed.registry();
            for topic in registry.topics() {
                let watcher = LiveWatcher::new(
                    self.ledger.clone(),
                    self.pipeline.clone(),
                    registry.clone(),
                    topic,
                );
                let mut cancel = self.cancellation_token.subscribe();

                watcher_handles.push(tokio::spawn(async move {
                    if let Err(e) = watcher.run(&mut cancel).await {
                        error!("Live watcher terminated with an error: {e:#}");
                    }
                }));
            }
        }

        ctrl_c_task.await?;

        for handle in watcher_handles {
            let _ = handle.await;
        }

        info!("Shutdown complete");

        Ok(())
    }

    fn spawn_ctrl_c_handler(cancellation_token: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            ctrl_c().await.ok();
            warn!("Received Ctrl+C, shutting down gracefully...");
            cancellation_token.graceful_shutdown();
        })
    }
}
