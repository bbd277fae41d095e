// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Module with the live tail watcher.
//!
//! # Description
//!
//! One watcher task per (contract, event selector). Each consumes the pushed
//! log batches of a `watch_logs` subscription and runs every log through the
//! shared pipeline. A pipeline error on a live log is logged and the log is
//! dropped: the cursor was not advanced, so the next backfill pass at restart
//! re-covers the interval. When the stream ends or the subscription fails the
//! watcher pauses and resubscribes; anything redelivered across the gap is
//! absorbed by the idempotency ledger.

use crate::RxCancellationToken;
use crate::constants::RESUBSCRIBE_DELAY_SECS;
use crate::contract_events::EventRegistry;
use crate::event_pipeline::EventPipeline;
use crate::ledger::LedgerClient;
use alloy::primitives::B256;
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct LiveWatcher {
    ledger: Arc<dyn LedgerClient>,
    pipeline: Arc<EventPipeline>,
    registry: EventRegistry,
    topic: B256,
    resubscribe_delay: Duration,
}

impl LiveWatcher {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        pipeline: Arc<EventPipeline>,
        registry: EventRegistry,
        topic: B256,
    ) -> Self {
        Self {
            ledger,
            pipeline,
            registry,
            topic,
            resubscribe_delay: Duration::from_secs(RESUBSCRIBE_DELAY_SECS),
        }
    }

    pub fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    /// Watches until the cancellation token fires.
    pub async fn run(&self, cancel: &mut RxCancellationToken) -> Result<()> {
        let contract_name = self.registry.contract_name();

        loop {
            match self.ledger.watch_logs(self.registry.address, self.topic).await {
                Ok(mut stream) => {
                    info!(
                        contract = %contract_name,
                        topic = %self.topic,
                        "Watching live logs"
                    );

                    loop {
                        tokio::select! {
                            _ = cancel.recv() => {
                                info!(contract = %contract_name, "Live watcher cancelled");
                                return Ok(());
                            }
                            batch = stream.next() => match batch {
                                Some(logs) => self.process_batch(logs),
                                None => {
                                    warn!(
                                        contract = %contract_name,
                                        "Live log stream ended, resubscribing"
                                    );
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        contract = %contract_name,
                        "Live log subscription failed, retrying: {e}"
                    );
                }
            }

            tokio::select! {
                _ = cancel.recv() => return Ok(()),
                _ = tokio::time::sleep(self.resubscribe_delay) => {}
            }
        }
    }

    fn process_batch(&self, logs: Vec<alloy::rpc::types::Log>) {
        for log in &logs {
            if let Err(e) = self.pipeline.process_log(&self.registry, log) {
                // Dropped on purpose: the cursor did not move, so the next
                // backfill pass replays this interval.
                error!(
                    contract = %self.registry.contract_name(),
                    tx_hash = ?log.transaction_hash,
                    log_index = ?log.log_index,
                    "Pipeline failed on a live log, dropping it: {e:#}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CancellationToken;
    use crate::constants::NOTIFICATION_CHANNEL_CAPACITY;
    use crate::contract_events::{ContractKind, FreelanceEscrow};
    use crate::metrics::MetricsHandle;
    use crate::notifier::EventNotifier;
    use crate::storage::{DuckDBStorage, Storage};
    use crate::test_utils::{MockLedger, fixture_address, job_created_log};
    use alloy::sol_types::SolEvent;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    async fn wait_for_job(storage: &DuckDBStorage, job_id: u64) {
        for _ in 0..200 {
            if storage.find_job(job_id).unwrap().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} never materialized");
    }

    #[tokio::test]
    async fn live_logs_flow_through_the_pipeline_and_survive_resubscription() {
        let ledger = Arc::new(MockLedger::new(100));
        let storage = Arc::new(DuckDBStorage::in_memory().unwrap());
        let pipeline = Arc::new(EventPipeline::new(
            storage.clone(),
            EventNotifier::new(NOTIFICATION_CHANNEL_CAPACITY),
            MetricsHandle::default(),
        ));
        let registry = EventRegistry::new(ContractKind::Escrow, fixture_address(0xE5));
        let contract = registry.address;

        let first = ledger.arm_watch_stream();
        let second = ledger.arm_watch_stream();

        let watcher = LiveWatcher::new(
            ledger.clone(),
            pipeline,
            registry,
            FreelanceEscrow::JobCreated::SIGNATURE_HASH,
        )
        .with_resubscribe_delay(Duration::from_millis(5));

        let token = CancellationToken::default();
        let mut cancel = token.subscribe();
        let handle = tokio::spawn(async move { watcher.run(&mut cancel).await });

        first
            .send(vec![job_created_log(
                contract,
                1,
                fixture_address(0xC1),
                fixture_address(0xF1),
                1000,
                1_700_000_000,
                101,
                0,
            )])
            .unwrap();
        wait_for_job(&storage, 1).await;

        // Dropping the sender ends the stream; the watcher must pick up the
        // second armed subscription and keep processing.
        drop(first);
        second
            .send(vec![job_created_log(
                contract,
                2,
                fixture_address(0xC1),
                fixture_address(0xF1),
                2000,
                1_700_000_000,
                102,
                0,
            )])
            .unwrap();
        wait_for_job(&storage, 2).await;

        token.graceful_shutdown();
        handle.await.unwrap().unwrap();

        assert_eq!(storage.cursor("FreelanceEscrow").unwrap(), Some(102));
    }
}
