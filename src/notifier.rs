// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Module with the notification fan-out for downstream consumers.
//!
//! # Description
//!
//! Every newly processed event is published once as an [EventEnvelope] on a
//! broadcast channel. Delivery is best-effort per subscriber (a lagging
//! receiver drops the oldest messages); the durable `notified` flag in storage
//! is what makes the overall contract at-least-once: an event whose publish
//! never completed is re-published on the next replay.

use crate::contract_events::{LogMeta, MarketEvent};
use anyhow::Result;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Wire shape of one notification, serialized camelCase for the consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub data: MarketEvent,
    pub tx_hash: String,
    pub block_number: u64,
}

impl EventEnvelope {
    pub fn new(event: MarketEvent, meta: &LogMeta) -> Self {
        Self {
            event_type: event.name(),
            tx_hash: format!("{:#x}", meta.transaction_hash),
            block_number: meta.block_number,
            data: event,
        }
    }
}

/// Broadcast publisher for processed-event notifications.
#[derive(Clone)]
pub struct EventNotifier {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::Sender::new(capacity),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Publishes one envelope. Zero live subscribers is still a successful
    /// publish: the channel rejects the send, but there is no one to miss it.
    pub fn publish(&self, envelope: EventEnvelope) -> Result<usize> {
        match self.tx.send(envelope) {
            Ok(receivers) => Ok(receivers),
            Err(broadcast::error::SendError(envelope)) => {
                debug!(
                    event = envelope.event_type,
                    tx_hash = %envelope.tx_hash,
                    "No subscribers for notification"
                );
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixture_address;
    use alloy::primitives::{TxHash, U256};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    fn sample_envelope() -> EventEnvelope {
        let meta = LogMeta {
            block_number: 123,
            transaction_hash: TxHash::with_last_byte(0xAB),
            log_index: 0,
        };
        EventEnvelope::new(
            MarketEvent::FundsReleased {
                job_id: 1,
                freelancer: fixture_address(0xF1),
                amount: U256::from(1000u64),
                nft_id: 7,
            },
            &meta,
        )
    }

    #[rstest]
    fn envelope_serializes_to_the_consumer_wire_shape() {
        let envelope = sample_envelope();
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "FundsReleased",
                "data": {
                    "jobId": 1,
                    "freelancer": serde_json::to_value(fixture_address(0xF1)).unwrap(),
                    "amount": "0x3e8",
                    "nftId": 7,
                },
                "txHash": format!("{:#x}", TxHash::with_last_byte(0xAB)),
                "blockNumber": 123,
            })
        );
    }

    #[rstest]
    fn publish_without_subscribers_is_a_success() {
        let notifier = EventNotifier::new(4);
        assert_eq!(notifier.publish(sample_envelope()).unwrap(), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_published_envelopes() {
        let notifier = EventNotifier::new(4);
        let mut rx = notifier.subscribe();

        assert_eq!(notifier.publish(sample_envelope()).unwrap(), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, "FundsReleased");
        assert_eq!(received.block_number, 123);
    }
}
