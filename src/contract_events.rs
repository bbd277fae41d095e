// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Module with the event schema registry for the monitored contracts.
//!
//! # Description
//!
//! The two marketplace contracts emit a closed set of events. Their signatures
//! are compile-time `sol!` bindings, and every decoded log is mapped into the
//! [MarketEvent] sum type so that handler dispatch is an exhaustive match
//! instead of a string-keyed lookup. A log whose topic0 is not registered for
//! its contract is not an error: contracts emit topics the syncer does not
//! care about (e.g. the arbitrator's `Ruling` and `Evidence` events).

use alloy::{
    primitives::{Address, B256, TxHash, U256},
    rpc::types::Log,
    sol,
    sol_types::SolEvent,
};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::warn;

sol! {
    contract FreelanceEscrow {
        event JobCreated(uint256 indexed jobId, address indexed client, address indexed freelancer, uint256 amount, uint256 deadline);
        event FundsReleased(uint256 indexed jobId, address indexed freelancer, uint256 amount, uint256 nftId);
        event ApplicationSubmitted(uint256 indexed jobId, address indexed applicant, uint256 stake);
        event MilestoneCreated(uint256 indexed jobId, uint256 milestoneId, uint256 amount, string description);
        event MilestoneReleased(uint256 indexed jobId, uint256 indexed milestoneId, uint256 amount);
        event DisputeRaised(uint256 indexed jobId, uint256 disputeId);
        event Dispute(address indexed arbitrator, uint256 indexed disputeId, uint256 metaEvidenceId, uint256 evidenceId);
        event DisputeResolved(uint256 indexed jobId, uint256 freelancerBps);
        event ReviewSubmitted(uint256 indexed jobId, address indexed client, address indexed freelancer, uint8 rating, string review);
    }

    contract CrossChainEscrowManager {
        event CrossChainJobCreated(uint256 indexed localJobId, uint256 indexed remoteJobId, string destinationChain);
        event CrossChainFundsReleased(uint256 indexed localJobId, uint256 amount, string sourceChain);
        event CrossChainDisputeInitiated(uint256 indexed localJobId, uint256 disputeId, string sourceChain);
    }
}

/// The kind of monitored contract, selecting which event signatures apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    #[strum(to_string = "FreelanceEscrow")]
    Escrow,
    #[strum(to_string = "CrossChainEscrowManager")]
    CrossChain,
}

/// A decoded marketplace event with typed arguments.
///
/// Serialized untagged so the JSON shape is the bare argument object, matching
/// the envelope format the connected clients expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum MarketEvent {
    JobCreated {
        job_id: u64,
        client: Address,
        freelancer: Address,
        amount: U256,
        deadline: u64,
    },
    FundsReleased {
        job_id: u64,
        freelancer: Address,
        amount: U256,
        nft_id: u64,
    },
    ApplicationSubmitted {
        job_id: u64,
        applicant: Address,
        stake: U256,
    },
    MilestoneCreated {
        job_id: u64,
        milestone_id: u64,
        amount: U256,
        description: String,
    },
    MilestoneReleased {
        job_id: u64,
        milestone_id: u64,
        amount: U256,
    },
    DisputeRaised {
        job_id: u64,
        dispute_id: u64,
    },
    Dispute {
        arbitrator: Address,
        dispute_id: u64,
        meta_evidence_id: u64,
        evidence_id: u64,
    },
    DisputeResolved {
        job_id: u64,
        freelancer_bps: u64,
    },
    ReviewSubmitted {
        job_id: u64,
        client: Address,
        freelancer: Address,
        rating: u8,
        review: String,
    },
    CrossChainJobCreated {
        local_job_id: u64,
        remote_job_id: u64,
        destination_chain: String,
    },
    CrossChainFundsReleased {
        local_job_id: u64,
        amount: U256,
        source_chain: String,
    },
    CrossChainDisputeInitiated {
        local_job_id: u64,
        dispute_id: u64,
        source_chain: String,
    },
}

impl MarketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JobCreated { .. } => "JobCreated",
            Self::FundsReleased { .. } => "FundsReleased",
            Self::ApplicationSubmitted { .. } => "ApplicationSubmitted",
            Self::MilestoneCreated { .. } => "MilestoneCreated",
            Self::MilestoneReleased { .. } => "MilestoneReleased",
            Self::DisputeRaised { .. } => "DisputeRaised",
            Self::Dispute { .. } => "Dispute",
            Self::DisputeResolved { .. } => "DisputeResolved",
            Self::ReviewSubmitted { .. } => "ReviewSubmitted",
            Self::CrossChainJobCreated { .. } => "CrossChainJobCreated",
            Self::CrossChainFundsReleased { .. } => "CrossChainFundsReleased",
            Self::CrossChainDisputeInitiated { .. } => "CrossChainDisputeInitiated",
        }
    }
}

/// Physical identity of a log: the (transaction hash, log index) pair plus the
/// block it was mined in. Extracted before decoding; pending logs without this
/// metadata are skipped.
#[derive(Debug, Clone)]
pub struct LogMeta {
    pub block_number: u64,
    pub transaction_hash: TxHash,
    pub log_index: u64,
}

impl LogMeta {
    pub fn from_log(log: &Log) -> Option<Self> {
        Some(Self {
            block_number: log.block_number?,
            transaction_hash: log.transaction_hash?,
            log_index: log.log_index?,
        })
    }
}

/// Decoder for the registered event signatures of one monitored contract.
#[derive(Debug, Clone)]
pub struct EventRegistry {
    kind: ContractKind,
    pub address: Address,
}

impl EventRegistry {
    pub fn new(kind: ContractKind, address: Address) -> Self {
        Self { kind, address }
    }

    pub fn contract_name(&self) -> String {
        self.kind.to_string()
    }

    /// The topic0 selectors registered for this contract. Live watchers
    /// subscribe to one selector each.
    pub fn topics(&self) -> Vec<B256> {
        match self.kind {
            ContractKind::Escrow => vec![
                FreelanceEscrow::JobCreated::SIGNATURE_HASH,
                FreelanceEscrow::FundsReleased::SIGNATURE_HASH,
                FreelanceEscrow::ApplicationSubmitted::SIGNATURE_HASH,
                FreelanceEscrow::MilestoneCreated::SIGNATURE_HASH,
                FreelanceEscrow::MilestoneReleased::SIGNATURE_HASH,
                FreelanceEscrow::DisputeRaised::SIGNATURE_HASH,
                FreelanceEscrow::Dispute::SIGNATURE_HASH,
                FreelanceEscrow::DisputeResolved::SIGNATURE_HASH,
                FreelanceEscrow::ReviewSubmitted::SIGNATURE_HASH,
            ],
            ContractKind::CrossChain => vec![
                CrossChainEscrowManager::CrossChainJobCreated::SIGNATURE_HASH,
                CrossChainEscrowManager::CrossChainFundsReleased::SIGNATURE_HASH,
                CrossChainEscrowManager::CrossChainDisputeInitiated::SIGNATURE_HASH,
            ],
        }
    }

    /// Decodes a raw log into a typed event, or `None` when the log does not
    /// match any registered signature for this contract.
    ///
    /// A log whose topic0 matches but whose payload fails the typed decode can
    /// never succeed on a retry, so it is logged and skipped rather than left
    /// to wedge its window.
    pub fn decode(&self, log: &Log) -> Option<MarketEvent> {
        let topic0 = *log.topic0()?;

        let decoded = match self.kind {
            ContractKind::Escrow => Self::decode_escrow(topic0, log),
            ContractKind::CrossChain => Self::decode_cross_chain(topic0, log),
        };

        match decoded {
            Some(Ok(event)) => Some(event),
            Some(Err(e)) => {
                warn!(
                    contract = %self.contract_name(),
                    tx_hash = ?log.transaction_hash,
                    log_index = ?log.log_index,
                    "Skipping undecodable log for a registered signature: {e}"
                );
                None
            }
            // Unregistered topic, expected and silent.
            None => None,
        }
    }

    fn decode_escrow(topic0: B256, log: &Log) -> Option<Result<MarketEvent, DecodeError>> {
        use FreelanceEscrow as C;

        let event = if topic0 == C::JobCreated::SIGNATURE_HASH {
            C::JobCreated::decode_log(&log.inner)
                .map(|decoded| decoded.data)
                .map_err(DecodeError::from)
                .and_then(|ev| {
                    Ok(MarketEvent::JobCreated {
                        job_id: as_u64(ev.jobId, "jobId")?,
                        client: ev.client,
                        freelancer: ev.freelancer,
                        amount: ev.amount,
                        deadline: as_u64(ev.deadline, "deadline")?,
                    })
                })
        } else if topic0 == C::FundsReleased::SIGNATURE_HASH {
            C::FundsReleased::decode_log(&log.inner)
                .map(|decoded| decoded.data)
                .map_err(DecodeError::from)
                .and_then(|ev| {
                    Ok(MarketEvent::FundsReleased {
                        job_id: as_u64(ev.jobId, "jobId")?,
                        freelancer: ev.freelancer,
                        amount: ev.amount,
                        nft_id: as_u64(ev.nftId, "nftId")?,
                    })
                })
        } else if topic0 == C::ApplicationSubmitted::SIGNATURE_HASH {
            C::ApplicationSubmitted::decode_log(&log.inner)
                .map(|decoded| decoded.data)
                .map_err(DecodeError::from)
                .and_then(|ev| {
                    Ok(MarketEvent::ApplicationSubmitted {
                        job_id: as_u64(ev.jobId, "jobId")?,
                        applicant: ev.applicant,
                        stake: ev.stake,
                    })
                })
        } else if topic0 == C::MilestoneCreated::SIGNATURE_HASH {
            C::MilestoneCreated::decode_log(&log.inner)
                .map(|decoded| decoded.data)
                .map_err(DecodeError::from)
                .and_then(|ev| {
                    Ok(MarketEvent::MilestoneCreated {
                        job_id: as_u64(ev.jobId, "jobId")?,
                        milestone_id: as_u64(ev.milestoneId, "milestoneId")?,
                        amount: ev.amount,
                        description: ev.description.clone(),
                    })
                })
        } else if topic0 == C::MilestoneReleased::SIGNATURE_HASH {
            C::MilestoneReleased::decode_log(&log.inner)
                .map(|decoded| decoded.data)
                .map_err(DecodeError::from)
                .and_then(|ev| {
                    Ok(MarketEvent::MilestoneReleased {
                        job_id: as_u64(ev.jobId, "jobId")?,
                        milestone_id: as_u64(ev.milestoneId, "milestoneId")?,
                        amount: ev.amount,
                    })
                })
        } else if topic0 == C::DisputeRaised::SIGNATURE_HASH {
            C::DisputeRaised::decode_log(&log.inner)
                .map(|decoded| decoded.data)
                .map_err(DecodeError::from)
                .and_then(|ev| {
                    Ok(MarketEvent::DisputeRaised {
                        job_id: as_u64(ev.jobId, "jobId")?,
                        dispute_id: as_u64(ev.disputeId, "disputeId")?,
                    })
                })
        } else if topic0 == C::Dispute::SIGNATURE_HASH {
            C::Dispute::decode_log(&log.inner)
                .map(|decoded| decoded.data)
                .map_err(DecodeError::from)
                .and_then(|ev| {
                    Ok(MarketEvent::Dispute {
                        arbitrator: ev.arbitrator,
                        dispute_id: as_u64(ev.disputeId, "disputeId")?,
                        meta_evidence_id: as_u64(ev.metaEvidenceId, "metaEvidenceId")?,
                        evidence_id: as_u64(ev.evidenceId, "evidenceId")?,
                    })
                })
        } else if topic0 == C::DisputeResolved::SIGNATURE_HASH {
            C::DisputeResolved::decode_log(&log.inner)
                .map(|decoded| decoded.data)
                .map_err(DecodeError::from)
                .and_then(|ev| {
                    Ok(MarketEvent::DisputeResolved {
                        job_id: as_u64(ev.jobId, "jobId")?,
                        freelancer_bps: as_u64(ev.freelancerBps, "freelancerBps")?,
                    })
                })
        } else if topic0 == C::ReviewSubmitted::SIGNATURE_HASH {
            C::ReviewSubmitted::decode_log(&log.inner)
                .map(|decoded| decoded.data)
                .map_err(DecodeError::from)
                .and_then(|ev| {
                    Ok(MarketEvent::ReviewSubmitted {
                        job_id: as_u64(ev.jobId, "jobId")?,
                        client: ev.client,
                        freelancer: ev.freelancer,
                        rating: ev.rating,
                        review: ev.review.clone(),
                    })
                })
        } else {
            return None;
        };

        Some(event)
    }

    fn decode_cross_chain(topic0: B256, log: &Log) -> Option<Result<MarketEvent, DecodeError>> {
        use CrossChainEscrowManager as C;

        let event = if topic0 == C::CrossChainJobCreated::SIGNATURE_HASH {
            C::CrossChainJobCreated::decode_log(&log.inner)
                .map(|decoded| decoded.data)
                .map_err(DecodeError::from)
                .and_then(|ev| {
                    Ok(MarketEvent::CrossChainJobCreated {
                        local_job_id: as_u64(ev.localJobId, "localJobId")?,
                        remote_job_id: as_u64(ev.remoteJobId, "remoteJobId")?,
                        destination_chain: ev.destinationChain.clone(),
                    })
                })
        } else if topic0 == C::CrossChainFundsReleased::SIGNATURE_HASH {
            C::CrossChainFundsReleased::decode_log(&log.inner)
                .map(|decoded| decoded.data)
                .map_err(DecodeError::from)
                .and_then(|ev| {
                    Ok(MarketEvent::CrossChainFundsReleased {
                        local_job_id: as_u64(ev.localJobId, "localJobId")?,
                        amount: ev.amount,
                        source_chain: ev.sourceChain.clone(),
                    })
                })
        } else if topic0 == C::CrossChainDisputeInitiated::SIGNATURE_HASH {
            C::CrossChainDisputeInitiated::decode_log(&log.inner)
                .map(|decoded| decoded.data)
                .map_err(DecodeError::from)
                .and_then(|ev| {
                    Ok(MarketEvent::CrossChainDisputeInitiated {
                        local_job_id: as_u64(ev.localJobId, "localJobId")?,
                        dispute_id: as_u64(ev.disputeId, "disputeId")?,
                        source_chain: ev.sourceChain.clone(),
                    })
                })
        } else {
            return None;
        };

        Some(event)
    }
}

#[derive(Debug, thiserror::Error)]
enum DecodeError {
    #[error(transparent)]
    Abi(#[from] alloy::sol_types::Error),
    #[error("argument {0} does not fit in u64")]
    ArgumentRange(&'static str),
}

fn as_u64(value: U256, field: &'static str) -> Result<u64, DecodeError> {
    u64::try_from(value).map_err(|_| DecodeError::ArgumentRange(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{cross_chain_job_created_log, fixture_address, job_created_log, raw_log};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn decodes_a_job_created_log() {
        let contract = fixture_address(0xE5);
        let registry = EventRegistry::new(ContractKind::Escrow, contract);
        let client = fixture_address(0xC1);
        let freelancer = fixture_address(0xF1);

        let log = job_created_log(contract, 1, client, freelancer, 1000, 1_700_000_000, 100, 0);

        let event = registry.decode(&log).expect("log should decode");
        assert_eq!(
            event,
            MarketEvent::JobCreated {
                job_id: 1,
                client,
                freelancer,
                amount: U256::from(1000u64),
                deadline: 1_700_000_000,
            }
        );
        assert_eq!(event.name(), "JobCreated");
    }

    #[rstest]
    fn decodes_a_cross_chain_job_created_log() {
        let contract = fixture_address(0xCC);
        let registry = EventRegistry::new(ContractKind::CrossChain, contract);

        let log = cross_chain_job_created_log(contract, 5, 70, "base", 200, 1);

        let event = registry.decode(&log).expect("log should decode");
        assert_eq!(
            event,
            MarketEvent::CrossChainJobCreated {
                local_job_id: 5,
                remote_job_id: 70,
                destination_chain: "base".to_string(),
            }
        );
    }

    #[rstest]
    fn unregistered_topic_is_skipped() {
        let contract = fixture_address(0xE5);
        let registry = EventRegistry::new(ContractKind::Escrow, contract);

        // ERC20 Transfer is not part of the escrow schema.
        let transfer_topic0: B256 =
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
                .parse()
                .unwrap();
        let log = raw_log(contract, vec![transfer_topic0], vec![0u8; 32], 100, 1, 0);

        assert_eq!(registry.decode(&log), None);
    }

    #[rstest]
    fn escrow_signatures_do_not_decode_on_the_cross_chain_registry() {
        let contract = fixture_address(0xCC);
        let registry = EventRegistry::new(ContractKind::CrossChain, contract);
        let log = job_created_log(
            contract,
            7,
            fixture_address(0xC1),
            fixture_address(0xF1),
            500,
            1_700_000_000,
            42,
            3,
        );

        assert_eq!(registry.decode(&log), None);
    }

    #[rstest]
    fn registries_expose_their_selectors() {
        let escrow = EventRegistry::new(ContractKind::Escrow, fixture_address(1));
        let cross = EventRegistry::new(ContractKind::CrossChain, fixture_address(2));

        assert_eq!(escrow.topics().len(), 9);
        assert_eq!(cross.topics().len(), 3);
        assert_eq!(escrow.contract_name(), "FreelanceEscrow");
        assert_eq!(cross.contract_name(), "CrossChainEscrowManager");
    }

    #[rstest]
    fn metadata_extraction_requires_mined_logs() {
        let contract = fixture_address(0xE5);
        let mut log = job_created_log(
            contract,
            1,
            fixture_address(0xC1),
            fixture_address(0xF1),
            1000,
            0,
            100,
            0,
        );

        assert!(LogMeta::from_log(&log).is_some());

        log.block_number = None;
        assert!(LogMeta::from_log(&log).is_none());
    }
}
