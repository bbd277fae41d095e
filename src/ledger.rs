// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Module with the ledger-access seam.
//!
//! # Description
//!
//! Everything the engine consumes from the chain goes through the
//! [LedgerClient] trait: the current head, ranged log queries and a pushed
//! stream of new logs per event signature. The production implementation
//! wraps an `alloy` provider and is injected into the orchestrator, which
//! passes it down to the backfill collector and the live watchers.
//!
//! The error taxonomy is deliberately small: the collector only needs to
//! distinguish a rate-limit response (short backoff, same window) from any
//! other transport failure (longer recovery backoff, same window).

use alloy::{
    primitives::{Address, B256},
    providers::{Provider, ProviderBuilder},
    rpc::{client::RpcClient, types::Filter},
    transports::{RpcError, TransportError, http::reqwest::Url},
};
use anyhow::Result;
use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use std::sync::Arc;

/// A pushed batch stream of new logs, as delivered by the provider's filter poller.
pub type LogBatchStream = BoxStream<'static, Vec<alloy::rpc::types::Log>>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("rate limited by the RPC provider")]
    RateLimited,
    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current chain head as reported by the provider.
    async fn block_height(&self) -> Result<u64, LedgerError>;

    /// All logs emitted by `address` within the inclusive block range.
    /// The provider returns them block-number-then-log-index ascending.
    async fn fetch_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<alloy::rpc::types::Log>, LedgerError>;

    /// Subscribes to new logs for a single (address, topic0) pair. The stream
    /// ends on transport drop; recovery is the caller's resubscription.
    async fn watch_logs(
        &self,
        address: Address,
        event_topic: B256,
    ) -> Result<LogBatchStream, LedgerError>;
}

/// Production [LedgerClient] over an `alloy` HTTP provider.
pub struct AlloyLedger {
    provider: Arc<dyn Provider + Send + Sync>,
}

impl AlloyLedger {
    pub fn new(provider: Arc<dyn Provider + Send + Sync>) -> Self {
        Self { provider }
    }

    /// Connects a plain HTTP provider. Transport-level retry layers are left
    /// out on purpose: the backfill collector owns the retry policy and keys
    /// it on the rate-limit signal, which a retrying transport would hide.
    pub fn connect(rpc_url: &str) -> Result<Self> {
        let url: Url = rpc_url
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid RPC URL: {e}"))?;
        let provider = ProviderBuilder::new().connect_client(RpcClient::builder().http(url));

        Ok(Self {
            provider: Arc::new(provider),
        })
    }

    fn classify(err: TransportError) -> LedgerError {
        if let RpcError::ErrorResp(payload) = &err {
            let message = payload.message.to_lowercase();
            // 429 comes through some providers as a JSON-RPC error payload;
            // -32005 is the conventional "limit exceeded" code.
            if payload.code == 429
                || payload.code == -32005
                || message.contains("rate limit")
                || message.contains("too many requests")
            {
                return LedgerError::RateLimited;
            }
        }

        let text = err.to_string();
        if text.contains("429") || text.to_lowercase().contains("too many requests") {
            return LedgerError::RateLimited;
        }

        LedgerError::Transport(text)
    }
}

#[async_trait]
impl LedgerClient for AlloyLedger {
    async fn block_height(&self) -> Result<u64, LedgerError> {
        self.provider
            .get_block_number()
            .await
            .map_err(Self::classify)
    }

    async fn fetch_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<alloy::rpc::types::Log>, LedgerError> {
        let filter = Filter::new()
            .from_block(from_block)
            .to_block(to_block)
            .address(address);

        self.provider
            .get_logs(&filter)
            .await
            .map_err(Self::classify)
    }

    async fn watch_logs(
        &self,
        address: Address,
        event_topic: B256,
    ) -> Result<LogBatchStream, LedgerError> {
        let filter = Filter::new().address(address).event_signature(event_topic);

        let poller = self
            .provider
            .watch_logs(&filter)
            .await
            .map_err(Self::classify)?;

        Ok(poller.into_stream().boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn ledger_errors_render_their_cause() {
        assert_eq!(
            LedgerError::Transport("connection reset".into()).to_string(),
            "transport error: connection reset"
        );
        assert_eq!(
            LedgerError::RateLimited.to_string(),
            "rate limited by the RPC provider"
        );
    }
}
