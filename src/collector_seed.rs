// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Module with the validated per-contract sync seeds.

use crate::configuration::SyncerConfiguration;
use crate::contract_events::{ContractKind, EventRegistry};
use alloy::primitives::Address;
use anyhow::{Context, Result, bail};

/// One monitored contract, with its address already validated.
#[derive(Debug, Clone)]
pub struct ContractSeed {
    pub kind: ContractKind,
    pub address: Address,
    pub deploy_block: u64,
}

impl ContractSeed {
    pub fn registry(&self) -> EventRegistry {
        EventRegistry::new(self.kind, self.address)
    }

    pub fn name(&self) -> String {
        self.kind.to_string()
    }
}

/// Builds the seeds from the resolved configuration, rejecting malformed
/// addresses and duplicate contract kinds up front.
pub fn build_seeds(config: &SyncerConfiguration) -> Result<Vec<ContractSeed>> {
    if config.contracts.is_empty() {
        bail!("No contracts configured, nothing to sync");
    }
    // A zero-width window cannot make progress.
    if config.block_range == 0 {
        bail!("block_range must be at least 1");
    }

    let mut seeds: Vec<ContractSeed> = Vec::with_capacity(config.contracts.len());
    for contract in &config.contracts {
        let address: Address = contract
            .address
            .parse()
            .with_context(|| format!("Invalid contract address '{}'", contract.address))?;

        if seeds.iter().any(|seed| seed.kind == contract.kind) {
            bail!("Contract kind {} configured twice", contract.kind);
        }

        seeds.push(ContractSeed {
            kind: contract.kind,
            address,
            deploy_block: contract.deploy_block.unwrap_or(0),
        });
    }

    Ok(seeds)
}
