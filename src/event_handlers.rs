// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Module that materializes decoded events into the entity tables.
//!
//! # Description
//!
//! One handler per event variant, dispatched by an exhaustive match. Handlers
//! must be safe to re-run: live tail and a trailing backfill can both deliver
//! the same physical log, and an already-recorded event is replayed through
//! its handler on restart. Counter-bearing mutations therefore gate on the
//! storage reporting a first-time change (a forward status transition, a new
//! review row); everything else is an upsert or an insert-if-absent.

use crate::contract_events::MarketEvent;
use crate::storage::{JobStatus, JobUpsert, Storage};
use anyhow::Result;
use tracing::debug;

/// Applies one decoded event to the materialized view.
pub fn apply_event(storage: &dyn Storage, event: &MarketEvent) -> Result<()> {
    match event {
        MarketEvent::JobCreated {
            job_id,
            client,
            freelancer,
            amount,
            deadline,
        } => {
            storage.upsert_job(&JobUpsert {
                job_id: *job_id,
                client: client.to_string(),
                freelancer: freelancer.to_string(),
                amount: amount.to_string(),
                deadline: *deadline,
                status: JobStatus::Active,
            })?;
        }
        MarketEvent::FundsReleased {
            job_id,
            freelancer,
            amount,
            nft_id: _,
        } => {
            // The profile counters ride on the first Completed transition;
            // a replay sees `false` here and leaves the profile untouched.
            if storage.transition_job_status(*job_id, JobStatus::Completed)? {
                storage.credit_profile(&freelancer.to_string(), &amount.to_string())?;
            } else {
                debug!(job_id, "FundsReleased replay, profile credit skipped");
            }
        }
        MarketEvent::ApplicationSubmitted {
            job_id,
            applicant,
            stake,
        } => {
            storage.add_applicant(*job_id, &applicant.to_string(), &stake.to_string())?;
        }
        MarketEvent::MilestoneCreated {
            job_id,
            milestone_id,
            amount,
            description,
        } => {
            storage.add_milestone(*job_id, *milestone_id, &amount.to_string(), description)?;
        }
        MarketEvent::MilestoneReleased {
            job_id,
            milestone_id,
            amount: _,
        } => {
            storage.release_milestone(*job_id, *milestone_id)?;
        }
        MarketEvent::DisputeRaised { job_id, dispute_id } => {
            storage.set_job_dispute(*job_id, *dispute_id)?;
            storage.transition_job_status(*job_id, JobStatus::Disputed)?;
        }
        MarketEvent::Dispute { dispute_id, .. } => {
            // The arbitrator's event only carries the dispute id; it lands on
            // whichever job DisputeRaised tagged with it, if any yet.
            if !storage.transition_status_by_dispute(*dispute_id, JobStatus::Disputed)? {
                debug!(dispute_id, "Dispute event without a matching job, ignored");
            }
        }
        MarketEvent::DisputeResolved {
            job_id,
            freelancer_bps: _,
        } => {
            storage.transition_job_status(*job_id, JobStatus::Resolved)?;
        }
        MarketEvent::ReviewSubmitted {
            job_id,
            client,
            freelancer,
            rating,
            review: _,
        } => {
            let is_new = storage.add_review(
                *job_id,
                &client.to_string(),
                &freelancer.to_string(),
                *rating,
            )?;
            if is_new {
                storage.record_rating(&freelancer.to_string(), *rating)?;
            }
        }
        MarketEvent::CrossChainJobCreated {
            local_job_id,
            remote_job_id,
            destination_chain,
        } => {
            storage.mark_cross_chain(*local_job_id, *remote_job_id, destination_chain)?;
        }
        MarketEvent::CrossChainFundsReleased {
            local_job_id,
            amount: _,
            source_chain,
        } => {
            storage.transition_job_status(*local_job_id, JobStatus::Completed)?;
            storage.set_job_source_chain(*local_job_id, source_chain)?;
        }
        MarketEvent::CrossChainDisputeInitiated {
            local_job_id,
            dispute_id,
            source_chain,
        } => {
            storage.set_job_dispute(*local_job_id, *dispute_id)?;
            storage.set_job_source_chain(*local_job_id, source_chain)?;
            storage.transition_job_status(*local_job_id, JobStatus::Disputed)?;
        }
    }

    Ok(())
}
