// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Shared fixtures for the test suites: deterministic addresses, raw and
//! typed log builders, and a scriptable in-memory [LedgerClient].

use crate::contract_events::{CrossChainEscrowManager, FreelanceEscrow};
use crate::ledger::{LedgerClient, LedgerError, LogBatchStream};
use alloy::{
    primitives::{Address, B256, LogData, TxHash, U256},
    rpc::types::Log,
    sol_types::SolEvent,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub fn fixture_address(last_byte: u8) -> Address {
    Address::with_last_byte(last_byte)
}

/// A mined log with explicit topics and data. The transaction hash is derived
/// from the block and log index so distinct logs dedupe as distinct.
pub fn raw_log(
    address: Address,
    topics: Vec<B256>,
    data: Vec<u8>,
    block_number: u64,
    tx_seed: u8,
    log_index: u64,
) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address,
            data: LogData::new_unchecked(topics, data.into()),
        },
        block_hash: Some(B256::with_last_byte(block_number as u8)),
        block_number: Some(block_number),
        block_timestamp: None,
        transaction_hash: Some(TxHash::with_last_byte(tx_seed)),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

fn typed_log(address: Address, data: LogData, block_number: u64, log_index: u64) -> Log {
    let tx_seed = (block_number as u8).wrapping_mul(31).wrapping_add(log_index as u8);
    Log {
        inner: alloy::primitives::Log { address, data },
        block_hash: Some(B256::with_last_byte(block_number as u8)),
        block_number: Some(block_number),
        block_timestamp: None,
        transaction_hash: Some(TxHash::with_last_byte(tx_seed)),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

#[allow(clippy::too_many_arguments)]
pub fn job_created_log(
    contract: Address,
    job_id: u64,
    client: Address,
    freelancer: Address,
    amount: u64,
    deadline: u64,
    block_number: u64,
    log_index: u64,
) -> Log {
    let data = FreelanceEscrow::JobCreated {
        jobId: U256::from(job_id),
        client,
        freelancer,
        amount: U256::from(amount),
        deadline: U256::from(deadline),
    }
    .encode_log_data();
    typed_log(contract, data, block_number, log_index)
}

#[allow(clippy::too_many_arguments)]
pub fn funds_released_log(
    contract: Address,
    job_id: u64,
    freelancer: Address,
    amount: u64,
    nft_id: u64,
    block_number: u64,
    log_index: u64,
) -> Log {
    let data = FreelanceEscrow::FundsReleased {
        jobId: U256::from(job_id),
        freelancer,
        amount: U256::from(amount),
        nftId: U256::from(nft_id),
    }
    .encode_log_data();
    typed_log(contract, data, block_number, log_index)
}

pub fn cross_chain_job_created_log(
    contract: Address,
    local_job_id: u64,
    remote_job_id: u64,
    destination_chain: &str,
    block_number: u64,
    log_index: u64,
) -> Log {
    let data = CrossChainEscrowManager::CrossChainJobCreated {
        localJobId: U256::from(local_job_id),
        remoteJobId: U256::from(remote_job_id),
        destinationChain: destination_chain.to_string(),
    }
    .encode_log_data();
    typed_log(contract, data, block_number, log_index)
}

/// Scriptable ledger: fixed head, logs keyed by block, a queue of injected
/// fetch failures consumed one per call, and pre-armed watch streams.
pub struct MockLedger {
    height: u64,
    logs: Mutex<BTreeMap<u64, Vec<Log>>>,
    fetch_failures: Mutex<VecDeque<LedgerError>>,
    fetch_calls: Mutex<Vec<(u64, u64)>>,
    watch_streams: Mutex<VecDeque<LogBatchStream>>,
}

impl MockLedger {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            logs: Mutex::new(BTreeMap::new()),
            fetch_failures: Mutex::new(VecDeque::new()),
            fetch_calls: Mutex::new(Vec::new()),
            watch_streams: Mutex::new(VecDeque::new()),
        }
    }

    pub fn add_log(&self, log: Log) {
        let block = log.block_number.expect("mock logs must be mined");
        self.logs.lock().unwrap().entry(block).or_default().push(log);
    }

    /// Queues a failure for the next `fetch_logs` call; queued failures are
    /// consumed in order before any call succeeds again.
    pub fn fail_next_fetch(&self, error: LedgerError) {
        self.fetch_failures.lock().unwrap().push_back(error);
    }

    /// The `(from, to)` window of every `fetch_logs` call so far.
    pub fn fetch_calls(&self) -> Vec<(u64, u64)> {
        self.fetch_calls.lock().unwrap().clone()
    }

    /// Arms a watch stream fed by the returned sender; each `watch_logs` call
    /// consumes one armed stream (and errors once they run out).
    pub fn arm_watch_stream(&self) -> mpsc::UnboundedSender<Vec<Log>> {
        let (tx, rx) = mpsc::unbounded_channel::<Vec<Log>>();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|batch| (batch, rx))
        })
        .boxed();
        self.watch_streams.lock().unwrap().push_back(stream);
        tx
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn block_height(&self) -> Result<u64, LedgerError> {
        Ok(self.height)
    }

    async fn fetch_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, LedgerError> {
        self.fetch_calls.lock().unwrap().push((from_block, to_block));

        if let Some(error) = self.fetch_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let logs = self.logs.lock().unwrap();
        Ok(logs
            .range(from_block..=to_block)
            .flat_map(|(_, block_logs)| block_logs.iter())
            .filter(|log| log.address() == address)
            .cloned()
            .collect())
    }

    async fn watch_logs(
        &self,
        _address: Address,
        _event_topic: B256,
    ) -> Result<LogBatchStream, LedgerError> {
        self.watch_streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LedgerError::Transport("no armed watch stream".to_string()))
    }
}
