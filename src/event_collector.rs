// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Module with the chunked backfill collector.
//!
//! # Description
//!
//! Catches a contract up from its persisted cursor (or deploy block) to the
//! chain head observed at start, in fixed-width `get_logs` windows. A window
//! either completes fully or is retried in place: the cursor only ever
//! advances past a window whose logs all went through the pipeline, so a crash
//! mid-window replays at most one window on the next run and the idempotency
//! ledger absorbs the duplicates.
//!
//! Retries distinguish the provider's rate-limit signal (short backoff) from
//! any other failure (longer recovery backoff); both are exponential with
//! jitter and both retry the same window forever. When the gap between cursor
//! and head exceeds the configured maximum the start is clamped forward,
//! trading old history for recency.

use crate::RxCancellationToken;
use crate::backoff::RetryPolicy;
use crate::constants::{DEFAULT_BLOCK_RANGE, DEFAULT_MAX_BLOCK_GAP, INTER_WINDOW_DELAY_MS};
use crate::contract_events::EventRegistry;
use crate::event_pipeline::EventPipeline;
use crate::ledger::{LedgerClient, LedgerError};
use crate::metrics::MetricsHandle;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{error, info, warn};

/// Tuning knobs of the collector; defaults mirror the public-provider limits.
#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub block_range: u64,
    pub max_block_gap: u64,
    pub inter_window_delay: Duration,
    pub rate_limit_policy: RetryPolicy,
    pub recovery_policy: RetryPolicy,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            block_range: DEFAULT_BLOCK_RANGE,
            max_block_gap: DEFAULT_MAX_BLOCK_GAP,
            inter_window_delay: Duration::from_millis(INTER_WINDOW_DELAY_MS),
            rate_limit_policy: RetryPolicy::rate_limit(),
            recovery_policy: RetryPolicy::recovery(),
        }
    }
}

pub struct EventCollector {
    ledger: Arc<dyn LedgerClient>,
    pipeline: Arc<EventPipeline>,
    registry: EventRegistry,
    deploy_block: u64,
    options: CollectorOptions,
    metrics: MetricsHandle,
}

impl EventCollector {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        pipeline: Arc<EventPipeline>,
        registry: EventRegistry,
        deploy_block: u64,
        options: CollectorOptions,
        metrics: MetricsHandle,
    ) -> Self {
        Self {
            ledger,
            pipeline,
            registry,
            deploy_block,
            options,
            metrics,
        }
    }

    /// Backfills up to the head observed at start. Returns early (Ok) when the
    /// cancellation token fires at a window boundary. There is no failure
    /// path: every fetch, pipeline and storage error is retried in place.
    pub async fn run(&self, cancel: &mut RxCancellationToken) -> Result<()> {
        let contract_name = self.registry.contract_name();
        let head = self.head_with_retry().await;
        self.metrics.record_chain_head_block(&contract_name, head);

        let cursor = self.cursor_with_retry(&contract_name).await;
        let mut from = cursor.map_or(self.deploy_block, |block| block + 1);

        if head.saturating_sub(from) > self.options.max_block_gap {
            let clamped = head - self.options.max_block_gap;
            warn!(
                contract = %contract_name,
                from, clamped, head,
                "Catch-up gap exceeds the maximum, skipping ahead"
            );
            from = clamped;
        }

        if from > head {
            info!(contract = %contract_name, head, "Already synced to the head");
            return Ok(());
        }

        info!(contract = %contract_name, from, head, "Backfilling");

        while from <= head {
            if cancelled(cancel) {
                info!(contract = %contract_name, "Backfill cancelled");
                return Ok(());
            }

            let to = (from + self.options.block_range - 1).min(head);
            self.process_window(from, to).await;
            self.metrics.record_synced_block(&contract_name, to);

            from = to + 1;
            if from <= head {
                tokio::time::sleep(self.options.inter_window_delay).await;
            }
        }

        info!(contract = %contract_name, head, "Backfill complete");
        Ok(())
    }

    async fn head_with_retry(&self) -> u64 {
        let mut attempt = 0;
        loop {
            match self.ledger.block_height().await {
                Ok(head) => return head,
                Err(e) => {
                    let delay = self.options.recovery_policy.jittered_delay(attempt);
                    error!("Failed to fetch the chain head, retrying in {delay:?}: {e}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn cursor_with_retry(&self, contract_name: &str) -> Option<u64> {
        let mut attempt = 0;
        loop {
            match self.pipeline.storage().cursor(contract_name) {
                Ok(cursor) => return cursor,
                Err(e) => {
                    let delay = self.options.recovery_policy.jittered_delay(attempt);
                    error!("Failed to read the sync cursor, retrying in {delay:?}: {e:#}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Fetches and processes one window, retrying in place until the logs
    /// went through the pipeline and the cursor reached the window's upper
    /// bound. Partial progress within the window is safe to repeat.
    async fn process_window(&self, from: u64, to: u64) {
        let contract_name = self.registry.contract_name();
        let mut rate_limit_attempt = 0;
        let mut recovery_attempt = 0;

        loop {
            let logs = match self
                .ledger
                .fetch_logs(self.registry.address, from, to)
                .await
            {
                Ok(logs) => logs,
                Err(LedgerError::RateLimited) => {
                    let delay = self.options.rate_limit_policy.jittered_delay(rate_limit_attempt);
                    rate_limit_attempt += 1;
                    warn!(
                        contract = %contract_name,
                        from, to,
                        "Rate limited, retrying the window in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    let delay = self.options.recovery_policy.jittered_delay(recovery_attempt);
                    recovery_attempt += 1;
                    error!(
                        contract = %contract_name,
                        from, to,
                        "Log fetch failed, retrying the window in {delay:?}: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let failed = logs
                .iter()
                .find_map(|log| self.pipeline.process_log(&self.registry, log).err())
                .or_else(|| {
                    // The cursor moves even when the window was empty; a
                    // failed advance retries the whole window, which is
                    // idempotent.
                    self.pipeline
                        .storage()
                        .advance_cursor(&contract_name, to)
                        .err()
                });
            match failed {
                None => return,
                Some(e) => {
                    let delay = self.options.recovery_policy.jittered_delay(recovery_attempt);
                    recovery_attempt += 1;
                    error!(
                        contract = %contract_name,
                        from, to,
                        "Pipeline failed, retrying the window in {delay:?}: {e:#}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn cancelled(cancel: &mut RxCancellationToken) -> bool {
    !matches!(cancel.try_recv(), Err(TryRecvError::Empty))
}
