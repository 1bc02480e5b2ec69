//! Outbound notification port.
//!
//! Every successful lifecycle transition emits exactly one
//! [`Notification`] through the [`NotificationSink`] trait. Delivery is
//! best-effort: the engine logs a failed delivery and moves on, and a
//! transition is never rolled back because a sink misbehaved.

use crate::types::{EditRequestId, InvestmentId, ProjectId, Timestamp, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The lifecycle moment a notification describes. A closed set so
/// sinks can route and template exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// A project entered review.
    ProjectSubmitted,
    /// A project was approved and is now live.
    ProjectApproved,
    /// A project was rejected.
    ProjectRejected,
    /// A project was sent back for changes.
    ProjectChangesRequested,
    /// A project was archived.
    ProjectArchived,
    /// An edit to a live project was staged.
    EditRequested,
    /// A staged edit was applied.
    EditApproved,
    /// A staged edit was discarded.
    EditRejected,
    /// An investor requested an investment.
    InvestmentRequested,
    /// An investment request was approved.
    InvestmentApproved,
    /// An investment request was rejected.
    InvestmentRejected,
    /// The investor cancelled an open investment.
    InvestmentCancelled,
    /// The approval window lapsed before payment.
    InvestmentExpired,
    /// Payment succeeded and shares were sold.
    PaymentCompleted,
    /// A payment attempt failed.
    PaymentFailed,
    /// A completed investment was refunded.
    InvestmentRefunded,
    /// A completed investment was withdrawn.
    InvestmentWithdrawn,
    /// A completed investment was reversed.
    InvestmentReversed,
}

/// The entity a notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "entity", content = "id")]
pub enum RelatedEntity {
    /// A project.
    Project(ProjectId),
    /// An investment.
    Investment(InvestmentId),
    /// A staged edit request.
    EditRequest(EditRequestId),
}

/// A notification addressed to a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Which lifecycle moment this describes.
    pub kind: NotificationKind,
    /// The addressed user.
    pub recipient: UserId,
    /// The entity the notification is about.
    pub entity: RelatedEntity,
    /// Short headline.
    pub title: String,
    /// Human-readable body.
    pub message: String,
    /// When the triggering transition committed.
    pub created_at: Timestamp,
}

impl Notification {
    /// Builds a notification for `recipient` about `entity`.
    pub fn new(
        kind: NotificationKind,
        recipient: UserId,
        entity: RelatedEntity,
        title: impl Into<String>,
        message: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            kind,
            recipient,
            entity,
            title: title.into(),
            message: message.into(),
            created_at,
        }
    }
}

/// A delivery failure reported by a sink.
#[derive(Debug, Clone, Error)]
#[error("Notification delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Port for delivering notifications.
///
/// Implementations must not block the engine: deliveries the sink
/// cannot complete promptly should be queued internally.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one notification. Errors are logged by the caller and
    /// never affect the transition that produced the notification.
    async fn deliver(&self, notification: Notification) -> Result<(), DeliveryError>;
}

/// A sink that drops every notification. Useful where delivery is not
/// wired up, such as tests that only assert on state and ledger.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn deliver(&self, _notification: Notification) -> Result<(), DeliveryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn related_entity_serializes_tagged() {
        let entity = RelatedEntity::Project(ProjectId::try_new("PRJ-1").unwrap());
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["entity"], "project");
        assert_eq!(json["id"], "PRJ-1");
    }

    #[tokio::test]
    async fn null_sink_accepts_everything() {
        let sink = NullSink;
        let note = Notification::new(
            NotificationKind::ProjectApproved,
            UserId::try_new("dev-1").unwrap(),
            RelatedEntity::Project(ProjectId::try_new("PRJ-1").unwrap()),
            "Project approved",
            "Your project is now live.",
            Timestamp::now(),
        );
        assert!(sink.deliver(note).await.is_ok());
    }
}
