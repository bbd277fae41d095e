// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Module with the per-log processing pipeline.
//!
//! # Description
//!
//! Backfill and live tail feed the exact same path: extract the log's physical
//! identity, decode it against the contract's registry, record it in the
//! idempotency ledger, run its handler, publish the notification unless a
//! previous run already did, and advance the contract cursor. The ledger
//! insert is what collapses the duplicate deliveries the two sources produce
//! over the same trailing blocks; the handler still re-runs on a replay
//! because every handler is idempotent, but the publish does not.

use crate::contract_events::{EventRegistry, LogMeta};
use crate::event_handlers::apply_event;
use crate::metrics::MetricsHandle;
use crate::notifier::{EventEnvelope, EventNotifier};
use crate::storage::{ProcessedEvent, Storage};
use alloy::rpc::types::Log;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

/// What the pipeline did with one log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Handler ran; `published` is false when a previous run already notified.
    Applied { published: bool },
    /// Pending log without block number or transaction hash.
    SkippedPending,
    /// Topic not registered for this contract, or undecodable payload.
    SkippedUndecoded,
}

pub struct EventPipeline {
    storage: Arc<dyn Storage>,
    notifier: EventNotifier,
    metrics: MetricsHandle,
}

impl EventPipeline {
    pub fn new(storage: Arc<dyn Storage>, notifier: EventNotifier, metrics: MetricsHandle) -> Self {
        Self {
            storage,
            notifier,
            metrics,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Runs one raw log through decode, dedup, materialization and fan-out.
    ///
    /// Errors out of storage or a handler propagate to the caller, which owns
    /// the retry decision; nothing is marked processed on an error path before
    /// the ledger insert committed.
    pub fn process_log(&self, registry: &EventRegistry, log: &Log) -> Result<PipelineOutcome> {
        let Some(meta) = LogMeta::from_log(log) else {
            debug!(
                contract = %registry.contract_name(),
                "Skipping pending log without mined metadata"
            );
            return Ok(PipelineOutcome::SkippedPending);
        };

        let Some(event) = registry.decode(log) else {
            return Ok(PipelineOutcome::SkippedUndecoded);
        };

        let contract_name = registry.contract_name();
        let tx_hash = format!("{:#x}", meta.transaction_hash);

        let outcome = self
            .storage
            .record_if_new(&ProcessedEvent {
                transaction_hash: tx_hash.clone(),
                log_index: meta.log_index,
                event_name: event.name().to_string(),
                block_number: meta.block_number,
                raw_args: serde_json::to_value(&event)?,
                notified: false,
            })
            .with_context(|| format!("Failed to record event {tx_hash}:{}", meta.log_index))?;

        // The handler runs on replays too; idempotency lives in the handlers.
        apply_event(self.storage.as_ref(), &event)
            .with_context(|| format!("Handler failed for {} {tx_hash}", event.name()))?;
        self.metrics
            .record_event_applied(&contract_name, event.name());

        let published = if outcome.already_notified {
            debug!(
                event = event.name(),
                tx_hash, "Replay of a notified event, publish suppressed"
            );
            false
        } else {
            let event_name = event.name();
            self.notifier
                .publish(EventEnvelope::new(event, &meta))
                .with_context(|| format!("Failed to publish {event_name} {tx_hash}"))?;
            self.metrics.record_notification_published(event_name);
            self.storage.mark_notified(&tx_hash, meta.log_index)?;
            true
        };

        self.storage
            .advance_cursor(&contract_name, meta.block_number)?;
        self.metrics
            .record_synced_block(&contract_name, meta.block_number);

        Ok(PipelineOutcome::Applied { published })
    }
}
