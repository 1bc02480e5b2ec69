//! Investment records and their lifecycle state machine.
//!
//! An investment moves REQUESTED -> APPROVED -> PROCESSING -> COMPLETED
//! on the happy path. Every other status is a terminal exit:
//! REJECTED/CANCELLED/EXPIRED before payment, WITHDRAWN/REFUNDED/REVERSED
//! after completion. The per-share price is snapshotted at request time
//! and never recomputed, so later project edits cannot retroactively
//! change what an investor agreed to pay.

use crate::errors::{EngineError, EngineResult};
use crate::types::{InvestmentId, Money, ProjectId, ReservationId, ShareCount, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an investment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestmentStatus {
    /// Submitted by the investor, awaiting admin review. No claim on
    /// the share pool yet.
    Requested,
    /// Approved by an admin; the shares are reserved and payment must
    /// start before the approval window lapses.
    Approved,
    /// Rejected by an admin, or the payment failed or timed out.
    /// Terminal; any reservation is released.
    Rejected,
    /// Payment attempt in flight.
    Processing,
    /// Payment succeeded; the reservation was converted into sold
    /// shares. The only state from which post-completion exits apply.
    Completed,
    /// Investor-initiated exit after completion. Terminal.
    Withdrawn,
    /// Admin-initiated money-back after completion. Terminal.
    Refunded,
    /// Admin correction of an erroneous completion. Terminal.
    Reversed,
    /// The approval window lapsed before payment started. Terminal.
    Expired,
    /// Investor-initiated exit before completion. Terminal.
    Cancelled,
}

impl InvestmentStatus {
    /// Whether this status is terminal.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Rejected
                | Self::Withdrawn
                | Self::Refunded
                | Self::Reversed
                | Self::Expired
                | Self::Cancelled
        )
    }

    /// Whether an admin review (approve or reject) may act on this
    /// status.
    pub const fn allows_review(self) -> bool {
        matches!(self, Self::Requested)
    }

    /// Whether the investor may cancel from this status.
    pub const fn allows_cancel(self) -> bool {
        matches!(self, Self::Requested | Self::Approved)
    }

    /// Whether a payment attempt may start from this status.
    pub const fn allows_payment_start(self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Whether a post-completion exit (withdraw, refund, reverse) may
    /// act on this status.
    pub const fn allows_completion_exit(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether a still-open reservation backs this status. The claim
    /// is taken at approval, not at request.
    pub const fn holds_reservation(self) -> bool {
        matches!(self, Self::Approved | Self::Processing)
    }
}

impl std::fmt::Display for InvestmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Requested => "REQUESTED",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Withdrawn => "WITHDRAWN",
            Self::Refunded => "REFUNDED",
            Self::Reversed => "REVERSED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// An investment record.
///
/// `price_per_share` and `total_amount` are snapshots taken at request
/// time from the project's then-current pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    /// Stable, opaque identity.
    pub id: InvestmentId,
    /// The project invested in.
    pub project_id: ProjectId,
    /// The investing user.
    pub investor_id: UserId,
    /// Number of shares requested.
    pub shares: ShareCount,
    /// Per-share price snapshotted at request time.
    pub price_per_share: Money,
    /// `shares * price_per_share`, computed once at request time.
    pub total_amount: Money,
    /// Lifecycle status.
    pub status: InvestmentStatus,
    /// Optional note from the investor.
    pub request_note: Option<String>,
    /// Note from the reviewing or correcting admin.
    pub admin_note: Option<String>,
    /// The inventory reservation backing this investment, taken at
    /// approval. Cleared once committed, released, or expired.
    pub reservation_id: Option<ReservationId>,
    /// Payment deadline, stamped at approval.
    pub approval_expires_at: Option<Timestamp>,
    /// The admin who reviewed the request.
    pub reviewed_by: Option<UserId>,
    /// When the request was reviewed.
    pub reviewed_at: Option<Timestamp>,
    /// When the request was made.
    pub created_at: Timestamp,
    /// When the current payment attempt started. Cleared when the
    /// attempt resolves.
    pub processing_started_at: Option<Timestamp>,
    /// When payment completed.
    pub completed_at: Option<Timestamp>,
}

impl Investment {
    /// Creates a REQUESTED investment. No shares are claimed until an
    /// admin approves the request.
    ///
    /// The monetary snapshot is taken here: callers pass the project's
    /// current per-share price and this constructor derives the total.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `shares * price_per_share`
    /// exceeds the representable money range.
    pub fn request(
        id: InvestmentId,
        project_id: ProjectId,
        investor_id: UserId,
        shares: ShareCount,
        price_per_share: Money,
        request_note: Option<String>,
        now: Timestamp,
    ) -> EngineResult<Self> {
        let total_amount = price_per_share
            .times_shares(shares)
            .map_err(|e| EngineError::validation("shares", e.to_string()))?;
        Ok(Self {
            id,
            project_id,
            investor_id,
            shares,
            price_per_share,
            total_amount,
            status: InvestmentStatus::Requested,
            request_note,
            admin_note: None,
            reservation_id: None,
            approval_expires_at: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            processing_started_at: None,
            completed_at: None,
        })
    }

    /// Whether the approval window has lapsed at `now`. Only
    /// meaningful for APPROVED investments; false when no deadline is
    /// stamped.
    pub fn approval_lapsed(&self, now: Timestamp) -> bool {
        self.status == InvestmentStatus::Approved
            && self
                .approval_expires_at
                .is_some_and(|deadline| now >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn sample_investment() -> Investment {
        Investment::request(
            InvestmentId::try_new("INV-1").unwrap(),
            ProjectId::try_new("PRJ-1").unwrap(),
            UserId::try_new("investor-1").unwrap(),
            ShareCount::try_new(50).unwrap(),
            Money::new(dec!(100.00)).unwrap(),
            None,
            Timestamp::now(),
        )
        .unwrap()
    }

    #[test]
    fn request_snapshots_total_amount() {
        let investment = sample_investment();
        assert_eq!(investment.status, InvestmentStatus::Requested);
        assert_eq!(investment.total_amount.amount(), dec!(5000.00));
        // The pool is claimed at approval, not here.
        assert!(investment.reservation_id.is_none());
    }

    #[test]
    fn terminal_statuses() {
        for status in [
            InvestmentStatus::Rejected,
            InvestmentStatus::Withdrawn,
            InvestmentStatus::Refunded,
            InvestmentStatus::Reversed,
            InvestmentStatus::Expired,
            InvestmentStatus::Cancelled,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
        for status in [
            InvestmentStatus::Requested,
            InvestmentStatus::Approved,
            InvestmentStatus::Processing,
            InvestmentStatus::Completed,
        ] {
            assert!(!status.is_terminal(), "{status} should not be terminal");
        }
    }

    #[test]
    fn review_only_from_requested() {
        assert!(InvestmentStatus::Requested.allows_review());
        assert!(!InvestmentStatus::Approved.allows_review());
        assert!(!InvestmentStatus::Completed.allows_review());
    }

    #[test]
    fn cancel_window_closes_at_processing() {
        assert!(InvestmentStatus::Requested.allows_cancel());
        assert!(InvestmentStatus::Approved.allows_cancel());
        assert!(!InvestmentStatus::Processing.allows_cancel());
        assert!(!InvestmentStatus::Completed.allows_cancel());
    }

    #[test]
    fn completion_exits_only_from_completed() {
        assert!(InvestmentStatus::Completed.allows_completion_exit());
        assert!(!InvestmentStatus::Processing.allows_completion_exit());
        assert!(!InvestmentStatus::Refunded.allows_completion_exit());
    }

    #[test]
    fn reservation_held_from_approval_until_settled() {
        assert!(!InvestmentStatus::Requested.holds_reservation());
        assert!(InvestmentStatus::Approved.holds_reservation());
        assert!(InvestmentStatus::Processing.holds_reservation());
        assert!(!InvestmentStatus::Completed.holds_reservation());
        assert!(!InvestmentStatus::Expired.holds_reservation());
    }

    #[test]
    fn approval_lapse_requires_deadline_and_status() {
        let mut investment = sample_investment();
        let now = Timestamp::now();
        assert!(!investment.approval_lapsed(now));

        investment.status = InvestmentStatus::Approved;
        investment.approval_expires_at = Some(now.plus(Duration::days(7)));
        assert!(!investment.approval_lapsed(now));
        assert!(investment.approval_lapsed(now.plus(Duration::days(8))));

        investment.status = InvestmentStatus::Completed;
        assert!(!investment.approval_lapsed(now.plus(Duration::days(8))));
    }

    #[test]
    fn status_display_matches_wire_names() {
        assert_eq!(InvestmentStatus::Requested.to_string(), "REQUESTED");
        assert_eq!(
            serde_json::to_string(&InvestmentStatus::Processing).unwrap(),
            "\"PROCESSING\""
        );
    }
}
