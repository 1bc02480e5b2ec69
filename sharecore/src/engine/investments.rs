//! Investment lifecycle operations.
//!
//! Share accounting follows one rule: the reservation is taken at
//! admin approval, before the ledger records it, and compensated if
//! the append fails; the irreversible inventory moves (commit,
//! release, credit) happen only after the corresponding ledger append
//! succeeds. A plain request claims nothing, so unreviewed requests
//! never block other investors.

use super::MarketEngine;
use crate::config::PaymentRetryPolicy;
use crate::errors::{unauthorized, EngineError, EngineResult, InventoryError};
use crate::investment::{Investment, InvestmentStatus};
use crate::ledger::{EntryMetadata, EntryType, LedgerStore, MetadataKey, MetadataValue, NewEntry};
use crate::notification::{Notification, NotificationKind, NotificationSink, RelatedEntity};
use crate::project::ProjectStatus;
use crate::types::{Actor, InvestmentId, ProjectId, ReservationId, Role, ShareCount, Timestamp};
use serde::{Deserialize, Serialize};

/// The payment collaborator's report on an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "outcome")]
pub enum PaymentOutcome {
    /// The payment cleared.
    Succeeded {
        /// The collaborator's transaction id.
        transaction_id: String,
        /// The method used, when reported.
        payment_method: Option<String>,
    },
    /// The payment did not clear.
    Failed {
        /// The collaborator's failure reason.
        reason: String,
    },
}

/// Post-completion exits from a COMPLETED investment. Each credits the
/// sold shares back to the project's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminAction {
    /// Investor-requested exit, allowed to the investor or an admin.
    Withdraw,
    /// Admin-initiated money-back.
    Refund,
    /// Admin correction of an erroneous completion.
    Reverse,
}

impl<L, N> MarketEngine<L, N>
where
    L: LedgerStore,
    N: NotificationSink,
{
    /// Requests an investment in an APPROVED project, snapshotting the
    /// per-share price. The shares are not claimed until an admin
    /// approves the request.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientShares` when the request exceeds what the
    /// pool currently has free, and an invalid-transition error when
    /// the project is not open for investment.
    #[tracing::instrument(skip(self), fields(project = %project_id, investor = %actor.user_id))]
    pub async fn request_investment(
        &self,
        actor: &Actor,
        project_id: &ProjectId,
        shares: ShareCount,
        request_note: Option<String>,
    ) -> EngineResult<Investment> {
        if actor.role != Role::Investor {
            return Err(unauthorized("the investor role"));
        }
        let slot = self.slot(project_id);
        let _guard = slot.lock().await;

        let project = self.load_project(project_id)?;
        if project.status != ProjectStatus::Approved {
            return Err(EngineError::invalid_project_transition(
                project.status,
                "invest in",
            ));
        }
        let now = Timestamp::now();
        if project.days_remaining(now) == 0 {
            return Err(EngineError::validation(
                "project",
                "the funding window has closed",
            ));
        }

        // A request larger than what is currently free is rejected up
        // front, but nothing is claimed: capacity is arbitrated among
        // approvals, not requests.
        let remaining = self.inventory_ref().remaining(project_id)?;
        if shares.get() > remaining {
            return Err(EngineError::InsufficientShares {
                requested: shares.get(),
                remaining,
            });
        }

        let investment_id = InvestmentId::generate();
        let investment = Investment::request(
            investment_id.clone(),
            project_id.clone(),
            actor.user_id.clone(),
            shares,
            project.per_share_price,
            request_note.clone(),
            now,
        )?;

        let mut metadata = EntryMetadata::new()
            .with_text(MetadataKey::InvestmentId, investment_id.to_string())
            .with_text(MetadataKey::InvestorId, actor.user_id.to_string())
            .with_shares(MetadataKey::Shares, shares)
            .with_money(MetadataKey::Amount, investment.total_amount)
            .with_money(MetadataKey::PricePerShare, investment.price_per_share);
        if let Some(note) = &request_note {
            metadata = metadata.with_text(MetadataKey::RequestNote, note.clone());
        }
        self.ledger_ref()
            .append(NewEntry::new(
                EntryType::InvestmentRequested,
                project_id.clone(),
                Some(actor.user_id.clone()),
                metadata,
            ))
            .await?;

        self.store_investment(investment.clone());
        self.notify(Notification::new(
            NotificationKind::InvestmentRequested,
            project.developer_id.clone(),
            RelatedEntity::Investment(investment_id),
            "New investment request",
            format!(
                "{} requested {shares} shares of '{}'.",
                actor.user_id, project.title
            ),
            now,
        ))
        .await;
        Ok(investment)
    }

    /// Records an admin's verdict on a REQUESTED investment. Approval
    /// reserves the shares and stamps the payment deadline; rejection
    /// changes nothing in the pool.
    ///
    /// Re-applying a verdict that already stands (approving an
    /// APPROVED investment, rejecting a REJECTED one) is an idempotent
    /// no-op: the record is returned unchanged with no ledger entry
    /// and no notification.
    #[tracing::instrument(skip(self), fields(investment = %investment_id))]
    pub async fn review_investment(
        &self,
        actor: &Actor,
        investment_id: &InvestmentId,
        approve: bool,
        admin_note: Option<String>,
    ) -> EngineResult<Investment> {
        if !actor.is_admin() {
            return Err(unauthorized("the admin role"));
        }
        let mut investment = self.load_investment(investment_id)?;
        let slot = self.slot(&investment.project_id);
        let _guard = slot.lock().await;
        investment = self.load_investment(investment_id)?;

        if (approve && investment.status == InvestmentStatus::Approved)
            || (!approve && investment.status == InvestmentStatus::Rejected)
        {
            return Ok(investment);
        }
        if !investment.status.allows_review() {
            return Err(EngineError::invalid_investment_transition(
                investment.status,
                "review",
            ));
        }

        let now = Timestamp::now();
        investment.reviewed_by = Some(actor.user_id.clone());
        investment.reviewed_at = Some(now);
        investment.admin_note = admin_note.clone();

        if approve {
            let deadline = now.plus(self.config.approval_window);
            let reservation_id = self.inventory_ref().reserve(
                &investment.project_id,
                investment.id.clone(),
                investment.shares,
                deadline,
            )?;

            let mut metadata = EntryMetadata::new()
                .with_text(MetadataKey::InvestmentId, investment_id.to_string())
                .with(MetadataKey::ExpiresAt, MetadataValue::Timestamp(deadline));
            if let Some(note) = &admin_note {
                metadata = metadata.with_text(MetadataKey::AdminNote, note.clone());
            }
            if let Err(err) = self
                .ledger_ref()
                .append(NewEntry::new(
                    EntryType::InvestmentApproved,
                    investment.project_id.clone(),
                    Some(actor.user_id.clone()),
                    metadata,
                ))
                .await
            {
                self.release_quietly(reservation_id);
                return Err(err.into());
            }

            investment.status = InvestmentStatus::Approved;
            investment.reservation_id = Some(reservation_id);
            investment.approval_expires_at = Some(deadline);
            self.store_investment(investment.clone());
            self.notify(Notification::new(
                NotificationKind::InvestmentApproved,
                investment.investor_id.clone(),
                RelatedEntity::Investment(investment_id.clone()),
                "Investment approved",
                format!(
                    "Your investment of {} shares was approved. Payment is due by {deadline}.",
                    investment.shares
                ),
                now,
            ))
            .await;
        } else {
            let mut metadata = EntryMetadata::new()
                .with_text(MetadataKey::InvestmentId, investment_id.to_string());
            if let Some(note) = &admin_note {
                metadata = metadata.with_text(MetadataKey::Reason, note.clone());
            }
            self.ledger_ref()
                .append(NewEntry::new(
                    EntryType::InvestmentRejected,
                    investment.project_id.clone(),
                    Some(actor.user_id.clone()),
                    metadata,
                ))
                .await?;

            investment.status = InvestmentStatus::Rejected;
            self.store_investment(investment.clone());
            self.notify(Notification::new(
                NotificationKind::InvestmentRejected,
                investment.investor_id.clone(),
                RelatedEntity::Investment(investment_id.clone()),
                "Investment rejected",
                admin_note.unwrap_or_else(|| "Your investment request was rejected.".to_string()),
                now,
            ))
            .await;
        }
        Ok(investment)
    }

    /// Cancels an unpaid investment at the investor's request,
    /// freeing the reservation. Cancelling an already-cancelled
    /// investment is a no-op.
    #[tracing::instrument(skip(self), fields(investment = %investment_id))]
    pub async fn cancel_investment(
        &self,
        actor: &Actor,
        investment_id: &InvestmentId,
    ) -> EngineResult<Investment> {
        let mut investment = self.load_investment(investment_id)?;
        let slot = self.slot(&investment.project_id);
        let _guard = slot.lock().await;
        investment = self.load_investment(investment_id)?;

        if investment.investor_id != actor.user_id && !actor.is_admin() {
            return Err(unauthorized("the owning investor"));
        }
        if investment.status == InvestmentStatus::Cancelled {
            return Ok(investment);
        }
        if !investment.status.allows_cancel() {
            return Err(EngineError::invalid_investment_transition(
                investment.status,
                "cancel",
            ));
        }

        let now = Timestamp::now();
        self.ledger_ref()
            .append(NewEntry::new(
                EntryType::InvestmentCancelled,
                investment.project_id.clone(),
                Some(actor.user_id.clone()),
                EntryMetadata::new()
                    .with_text(MetadataKey::InvestmentId, investment_id.to_string())
                    .with_shares(MetadataKey::Shares, investment.shares),
            ))
            .await?;

        if let Some(reservation_id) = investment.reservation_id.take() {
            self.release_quietly(reservation_id);
        }
        investment.status = InvestmentStatus::Cancelled;
        self.store_investment(investment.clone());
        self.notify(Notification::new(
            NotificationKind::InvestmentCancelled,
            investment.investor_id.clone(),
            RelatedEntity::Investment(investment_id.clone()),
            "Investment cancelled",
            "Your investment was cancelled and the shares released.",
            now,
        ))
        .await;
        Ok(investment)
    }

    /// Starts a payment attempt on an APPROVED investment. A lapsed
    /// approval is expired on the spot and the attempt rejected; an
    /// expired approval never becomes a sale.
    #[tracing::instrument(skip(self), fields(investment = %investment_id))]
    pub async fn start_payment(
        &self,
        actor: &Actor,
        investment_id: &InvestmentId,
    ) -> EngineResult<Investment> {
        let mut investment = self.load_investment(investment_id)?;
        let slot = self.slot(&investment.project_id);
        let _guard = slot.lock().await;
        investment = self.load_investment(investment_id)?;

        if investment.investor_id != actor.user_id {
            return Err(unauthorized("the owning investor"));
        }

        let now = Timestamp::now();
        if investment.approval_lapsed(now) {
            self.expire_locked(investment, Some(actor), now).await?;
            return Err(EngineError::Expired(investment_id.clone()));
        }
        if !investment.status.allows_payment_start() {
            return Err(EngineError::invalid_investment_transition(
                investment.status,
                "start payment",
            ));
        }

        // Hold the claim past the deadline while the attempt is in
        // flight; the processing timeout bounds how long.
        if let Some(reservation_id) = investment.reservation_id {
            self.inventory_ref()
                .extend(reservation_id, now.plus(self.config.processing_timeout))?;
        }

        if let Err(err) = self
            .ledger_ref()
            .append(NewEntry::new(
                EntryType::InvestmentProcessing,
                investment.project_id.clone(),
                Some(actor.user_id.clone()),
                EntryMetadata::new()
                    .with_text(MetadataKey::InvestmentId, investment_id.to_string())
                    .with_money(MetadataKey::Amount, investment.total_amount),
            ))
            .await
        {
            // Unwind the extension so the claim's expiry matches the
            // approval deadline again.
            if let (Some(reservation_id), Some(deadline)) =
                (investment.reservation_id, investment.approval_expires_at)
            {
                let _ = self.inventory_ref().extend(reservation_id, deadline);
            }
            return Err(err.into());
        }

        investment.status = InvestmentStatus::Processing;
        investment.processing_started_at = Some(now);
        self.store_investment(investment.clone());
        Ok(investment)
    }

    /// Records the payment collaborator's outcome for a PROCESSING
    /// investment.
    ///
    /// Success converts the reservation into sold shares and completes
    /// the investment. Duplicate callbacks are idempotent by outcome:
    /// success reported again on a COMPLETED investment and failure
    /// reported again on an investment the earlier failure already
    /// settled are both no-ops, so a collaborator retry cannot
    /// double-debit the pool or duplicate ledger entries.
    ///
    /// Failure is governed by the retry policy: `RetryUntilExpiry`
    /// returns the investment to APPROVED while the window is open;
    /// otherwise the investment is rejected and the claim is freed.
    #[tracing::instrument(skip(self, outcome), fields(investment = %investment_id))]
    pub async fn record_payment_outcome(
        &self,
        actor: &Actor,
        investment_id: &InvestmentId,
        outcome: PaymentOutcome,
    ) -> EngineResult<Investment> {
        let mut investment = self.load_investment(investment_id)?;
        let slot = self.slot(&investment.project_id);
        let _guard = slot.lock().await;
        investment = self.load_investment(investment_id)?;

        if investment.investor_id != actor.user_id && !actor.is_admin() {
            return Err(unauthorized("the owning investor"));
        }
        if investment.status == InvestmentStatus::Completed
            && matches!(outcome, PaymentOutcome::Succeeded { .. })
        {
            return Ok(investment);
        }
        if matches!(
            investment.status,
            InvestmentStatus::Rejected | InvestmentStatus::Expired
        ) && matches!(outcome, PaymentOutcome::Failed { .. })
        {
            return Ok(investment);
        }
        if investment.status != InvestmentStatus::Processing {
            return Err(EngineError::invalid_investment_transition(
                investment.status,
                "record a payment outcome",
            ));
        }

        let now = Timestamp::now();
        match outcome {
            PaymentOutcome::Succeeded {
                transaction_id,
                payment_method,
            } => {
                let mut payment_metadata = EntryMetadata::new()
                    .with_text(MetadataKey::InvestmentId, investment_id.to_string())
                    .with_text(MetadataKey::TransactionId, transaction_id)
                    .with_money(MetadataKey::Amount, investment.total_amount);
                if let Some(method) = payment_method {
                    payment_metadata = payment_metadata.with_text(MetadataKey::PaymentMethod, method);
                }
                let completed_metadata = EntryMetadata::new()
                    .with_text(MetadataKey::InvestmentId, investment_id.to_string())
                    .with_shares(MetadataKey::Shares, investment.shares)
                    .with_money(MetadataKey::Amount, investment.total_amount)
                    .with_money(MetadataKey::PricePerShare, investment.price_per_share);
                self.ledger_ref()
                    .append_batch(vec![
                        NewEntry::new(
                            EntryType::PaymentProcessed,
                            investment.project_id.clone(),
                            Some(actor.user_id.clone()),
                            payment_metadata,
                        ),
                        NewEntry::new(
                            EntryType::InvestmentCompleted,
                            investment.project_id.clone(),
                            Some(actor.user_id.clone()),
                            completed_metadata,
                        ),
                    ])
                    .await?;

                let reservation_id = investment
                    .reservation_id
                    .take()
                    .ok_or_else(|| EngineError::Internal("processing without reservation".into()))?;
                self.inventory_ref().commit(reservation_id)?;

                investment.status = InvestmentStatus::Completed;
                investment.processing_started_at = None;
                investment.completed_at = Some(now);
                self.store_investment(investment.clone());
                self.notify(Notification::new(
                    NotificationKind::PaymentCompleted,
                    investment.investor_id.clone(),
                    RelatedEntity::Investment(investment_id.clone()),
                    "Payment completed",
                    format!(
                        "Your payment of {} cleared; {} shares are now yours.",
                        investment.total_amount, investment.shares
                    ),
                    now,
                ))
                .await;
            }
            PaymentOutcome::Failed { reason } => {
                let window_open = investment
                    .approval_expires_at
                    .is_some_and(|deadline| now < deadline);
                let retry = self.config.payment_retry == PaymentRetryPolicy::RetryUntilExpiry
                    && window_open;

                let failure_metadata = EntryMetadata::new()
                    .with_text(MetadataKey::InvestmentId, investment_id.to_string())
                    .with_text(MetadataKey::Reason, reason.clone());
                let mut entries = vec![NewEntry::new(
                    EntryType::PaymentFailed,
                    investment.project_id.clone(),
                    Some(actor.user_id.clone()),
                    failure_metadata,
                )];
                if !retry {
                    entries.push(NewEntry::new(
                        EntryType::InvestmentRejected,
                        investment.project_id.clone(),
                        Some(actor.user_id.clone()),
                        EntryMetadata::new()
                            .with_text(MetadataKey::InvestmentId, investment_id.to_string())
                            .with_text(MetadataKey::Reason, reason.clone()),
                    ));
                }
                self.ledger_ref().append_batch(entries).await?;

                if retry {
                    if let Some(reservation_id) = investment.reservation_id {
                        if let Some(deadline) = investment.approval_expires_at {
                            self.inventory_ref().extend(reservation_id, deadline)?;
                        }
                    }
                    investment.status = InvestmentStatus::Approved;
                } else {
                    // Fail closed: the claim is freed and the record
                    // rejected rather than shares held for a payment
                    // that did not clear.
                    if let Some(reservation_id) = investment.reservation_id.take() {
                        self.release_quietly(reservation_id);
                    }
                    investment.status = InvestmentStatus::Rejected;
                }
                investment.processing_started_at = None;
                self.store_investment(investment.clone());
                self.notify(Notification::new(
                    NotificationKind::PaymentFailed,
                    investment.investor_id.clone(),
                    RelatedEntity::Investment(investment_id.clone()),
                    "Payment failed",
                    reason,
                    now,
                ))
                .await;
            }
        }
        Ok(investment)
    }

    /// Applies a post-completion exit, crediting the sold shares back
    /// to the project's pool.
    ///
    /// Withdrawal may be requested by the owning investor or an admin;
    /// refund and reversal are admin only.
    #[tracing::instrument(skip(self), fields(investment = %investment_id, action = ?action))]
    pub async fn apply_admin_action(
        &self,
        actor: &Actor,
        investment_id: &InvestmentId,
        action: AdminAction,
        admin_note: Option<String>,
    ) -> EngineResult<Investment> {
        let mut investment = self.load_investment(investment_id)?;
        let slot = self.slot(&investment.project_id);
        let _guard = slot.lock().await;
        investment = self.load_investment(investment_id)?;

        let allowed = match action {
            AdminAction::Withdraw => {
                actor.is_admin() || investment.investor_id == actor.user_id
            }
            AdminAction::Refund | AdminAction::Reverse => actor.is_admin(),
        };
        if !allowed {
            return Err(unauthorized("the admin role"));
        }
        if !investment.status.allows_completion_exit() {
            return Err(EngineError::invalid_investment_transition(
                investment.status,
                "exit after completion",
            ));
        }

        let (entry_type, status, kind, title) = match action {
            AdminAction::Withdraw => (
                EntryType::InvestmentWithdrawn,
                InvestmentStatus::Withdrawn,
                NotificationKind::InvestmentWithdrawn,
                "Investment withdrawn",
            ),
            AdminAction::Refund => (
                EntryType::InvestmentRefunded,
                InvestmentStatus::Refunded,
                NotificationKind::InvestmentRefunded,
                "Investment refunded",
            ),
            AdminAction::Reverse => (
                EntryType::InvestmentReversed,
                InvestmentStatus::Reversed,
                NotificationKind::InvestmentReversed,
                "Investment reversed",
            ),
        };

        let now = Timestamp::now();
        let mut metadata = EntryMetadata::new()
            .with_text(MetadataKey::InvestmentId, investment_id.to_string())
            .with_shares(MetadataKey::Shares, investment.shares)
            .with_money(MetadataKey::Amount, investment.total_amount);
        if let Some(note) = &admin_note {
            metadata = metadata.with_text(MetadataKey::AdminNote, note.clone());
        }
        self.ledger_ref()
            .append(NewEntry::new(
                entry_type,
                investment.project_id.clone(),
                Some(actor.user_id.clone()),
                metadata,
            ))
            .await?;

        self.inventory_ref()
            .credit(&investment.project_id, investment.shares)?;
        investment.status = status;
        investment.admin_note = admin_note;
        self.store_investment(investment.clone());
        self.notify(Notification::new(
            kind,
            investment.investor_id.clone(),
            RelatedEntity::Investment(investment_id.clone()),
            title,
            format!(
                "{} shares were credited back to '{}'.",
                investment.shares, investment.project_id
            ),
            now,
        ))
        .await;
        Ok(investment)
    }

    /// Expires one investment while the project slot is held. The
    /// reservation may already be gone when the inventory sweep beat
    /// the record update; that is tolerated.
    pub(crate) async fn expire_locked(
        &self,
        mut investment: Investment,
        actor: Option<&Actor>,
        now: Timestamp,
    ) -> EngineResult<Investment> {
        self.ledger_ref()
            .append(NewEntry::new(
                EntryType::InvestmentExpired,
                investment.project_id.clone(),
                actor.map(|a| a.user_id.clone()),
                EntryMetadata::new()
                    .with_text(MetadataKey::InvestmentId, investment.id.to_string())
                    .with_shares(MetadataKey::Shares, investment.shares),
            ))
            .await?;

        if let Some(reservation_id) = investment.reservation_id.take() {
            self.release_quietly(reservation_id);
        }
        investment.status = InvestmentStatus::Expired;
        investment.processing_started_at = None;
        self.store_investment(investment.clone());
        self.notify(Notification::new(
            NotificationKind::InvestmentExpired,
            investment.investor_id.clone(),
            RelatedEntity::Investment(investment.id.clone()),
            "Investment expired",
            "The payment window for your approved investment has lapsed.",
            now,
        ))
        .await;
        Ok(investment)
    }

    /// Releases a reservation, tolerating one the sweep already freed.
    pub(crate) fn release_quietly(&self, reservation_id: ReservationId) {
        match self.inventory_ref().release(reservation_id) {
            Ok(()) | Err(InventoryError::ReservationNotFound(_)) => {}
            Err(err) => {
                tracing::warn!(%reservation_id, error = %err, "reservation release failed");
            }
        }
    }
}
