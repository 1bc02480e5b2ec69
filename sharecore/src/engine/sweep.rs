//! Background expiry sweep.
//!
//! The sweep is driven by the embedding application's scheduler; the
//! engine only exposes the single pass. Expiry is also enforced lazily
//! at payment start, so the sweep is a reclamation mechanism, not a
//! correctness requirement for the no-oversell invariant.
//!
//! Each project is swept under the same slot mutex that serializes
//! user-triggered transitions, so the sweep can never free a claim out
//! from under an in-flight completion.

use super::MarketEngine;
use crate::errors::EngineResult;
use crate::investment::InvestmentStatus;
use crate::ledger::{EntryMetadata, EntryType, LedgerStore, MetadataKey, NewEntry};
use crate::notification::{Notification, NotificationKind, NotificationSink, RelatedEntity};
use crate::types::{InvestmentId, ProjectId, Timestamp};

/// What one sweep pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Approved investments expired because their payment window
    /// lapsed with no attempt.
    pub expired: Vec<InvestmentId>,
    /// PROCESSING investments forced to REJECTED after sitting past
    /// the processing timeout with no payment outcome.
    pub rejected: Vec<InvestmentId>,
}

impl<L, N> MarketEngine<L, N>
where
    L: LedgerStore,
    N: NotificationSink,
{
    /// Runs one sweep pass at `now`: frees lapsed reservations and
    /// expires their investments, then rejects PROCESSING investments
    /// stuck past the processing timeout.
    ///
    /// Sweep transitions record no actor in the ledger.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, now: Timestamp) -> EngineResult<SweepReport> {
        let mut report = SweepReport::default();

        let project_ids: Vec<ProjectId> = self.projects.read().keys().cloned().collect();
        for project_id in project_ids {
            let slot = self.slot(&project_id);
            let _guard = slot.lock().await;
            for lapsed in self.inventory_ref().sweep_project(&project_id, now) {
                let Ok(investment) = self.load_investment(&lapsed.investment_id) else {
                    continue;
                };
                // Processing claims are handled by the timeout phase
                // below.
                if investment.status != InvestmentStatus::Approved {
                    continue;
                }
                let expired = self.expire_locked(investment, None, now).await?;
                report.expired.push(expired.id);
            }
        }

        let stuck: Vec<InvestmentId> = self
            .investments
            .read()
            .values()
            .filter(|inv| {
                inv.status == InvestmentStatus::Processing
                    && inv
                        .processing_started_at
                        .is_some_and(|started| started.plus(self.config.processing_timeout) <= now)
            })
            .map(|inv| inv.id.clone())
            .collect();

        for investment_id in stuck {
            let mut investment = self.load_investment(&investment_id)?;
            let slot = self.slot(&investment.project_id);
            let _guard = slot.lock().await;
            investment = self.load_investment(&investment_id)?;
            if investment.status != InvestmentStatus::Processing {
                continue;
            }

            self.ledger_ref()
                .append_batch(vec![
                    NewEntry::new(
                        EntryType::PaymentFailed,
                        investment.project_id.clone(),
                        None,
                        EntryMetadata::new()
                            .with_text(MetadataKey::InvestmentId, investment_id.to_string())
                            .with_text(MetadataKey::Reason, "payment processing timed out"),
                    ),
                    NewEntry::new(
                        EntryType::InvestmentRejected,
                        investment.project_id.clone(),
                        None,
                        EntryMetadata::new()
                            .with_text(MetadataKey::InvestmentId, investment_id.to_string())
                            .with_text(MetadataKey::Reason, "payment processing timed out"),
                    ),
                ])
                .await?;

            // The claim may already be gone when its extension lapsed
            // in an earlier pass; that is tolerated.
            if let Some(reservation_id) = investment.reservation_id.take() {
                self.release_quietly(reservation_id);
            }
            investment.status = InvestmentStatus::Rejected;
            investment.processing_started_at = None;
            self.store_investment(investment.clone());
            self.notify(Notification::new(
                NotificationKind::PaymentFailed,
                investment.investor_id.clone(),
                RelatedEntity::Investment(investment_id.clone()),
                "Payment failed",
                "The payment attempt timed out and the investment was rejected.",
                now,
            ))
            .await;
            report.rejected.push(investment_id);
        }

        if !report.expired.is_empty() || !report.rejected.is_empty() {
            tracing::info!(
                expired = report.expired.len(),
                rejected = report.rejected.len(),
                "sweep pass finished"
            );
        }
        Ok(report)
    }
}
