//! Append-only ledger abstraction for the `ShareCore` engine.
//!
//! This module defines the `LedgerStore` trait that serves as the port
//! interface for ledger implementations. The ledger is the source of
//! truth for audit: every state transition of every project and
//! investment appends exactly one immutable entry. Entries are never
//! updated or deleted.

use crate::errors::LedgerResult;
use crate::types::{EntryId, LedgerSequence, Money, ProjectId, ShareCount, Timestamp, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kind of lifecycle transition a ledger entry records.
///
/// A closed enum: transition validation lives in the lifecycle engines,
/// never in per-call-site matching on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// A project was created in DRAFT.
    ProjectCreated,
    /// A project's content was mutated directly.
    ProjectUpdated,
    /// A project was submitted for review.
    ProjectSubmitted,
    /// An admin approved a project.
    ProjectApproved,
    /// An admin rejected a project.
    ProjectRejected,
    /// An admin sent a project back for changes.
    ProjectChangesRequested,
    /// A project was archived.
    ProjectArchived,
    /// A developer staged an edit to an approved project.
    ProjectEditRequested,
    /// An admin approved a staged edit and the diff was applied.
    ProjectEditApproved,
    /// An admin rejected a staged edit and the diff was discarded.
    ProjectEditRejected,
    /// An investor requested an investment.
    InvestmentRequested,
    /// An admin approved an investment, reserving shares.
    InvestmentApproved,
    /// An admin rejected an investment.
    InvestmentRejected,
    /// An investor cancelled an unpaid investment.
    InvestmentCancelled,
    /// An approved-but-unpaid investment passed its window.
    InvestmentExpired,
    /// Payment was initiated and the investment entered processing.
    InvestmentProcessing,
    /// Payment cleared and the share inventory was debited.
    InvestmentCompleted,
    /// A completed investment was refunded; shares credited back.
    InvestmentRefunded,
    /// A completed investment was withdrawn; shares credited back.
    InvestmentWithdrawn,
    /// A completed investment was reversed; shares credited back.
    InvestmentReversed,
    /// The payment collaborator confirmed a payment.
    PaymentProcessed,
    /// The payment collaborator reported a failed payment.
    PaymentFailed,
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A known metadata key. Keys are closed so the audit trail stays
/// machine-checkable; the values recorded under each key are fixed per
/// [`EntryType`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum MetadataKey {
    /// The investment the transition concerns.
    InvestmentId,
    /// The investor who owns the investment.
    InvestorId,
    /// The number of shares involved.
    Shares,
    /// The monetary amount involved.
    Amount,
    /// The per-share price snapshot.
    PricePerShare,
    /// The status after the transition.
    Status,
    /// Free-text note attached by an admin.
    AdminNote,
    /// Free-text note attached by the requesting investor.
    RequestNote,
    /// The reason given for a rejection or change request.
    Reason,
    /// When an approval window closes.
    ExpiresAt,
    /// The payment method used.
    PaymentMethod,
    /// The payment collaborator's transaction id.
    TransactionId,
    /// The project's title at transition time.
    ProjectTitle,
    /// The project's total value.
    TotalValue,
    /// The project's total share count.
    TotalShares,
    /// The project's funding duration in days.
    DurationDays,
    /// The fields changed by an edit, serialized as JSON.
    Changes,
}

/// A typed metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    /// Free-form text.
    Text(String),
    /// An integral count.
    Integer(u64),
    /// A monetary amount.
    Decimal(Money),
    /// A point in time.
    Timestamp(Timestamp),
    /// A boolean flag.
    Flag(bool),
}

/// A typed key/value snapshot of the transition's relevant fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntryMetadata(BTreeMap<MetadataKey, MetadataValue>);

impl EntryMetadata {
    /// Creates empty metadata.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds a value under `key`, replacing any previous value.
    #[must_use]
    pub fn with(mut self, key: MetadataKey, value: MetadataValue) -> Self {
        self.0.insert(key, value);
        self
    }

    /// Adds a text value under `key`.
    #[must_use]
    pub fn with_text(self, key: MetadataKey, value: impl Into<String>) -> Self {
        self.with(key, MetadataValue::Text(value.into()))
    }

    /// Adds a share count under `key`.
    #[must_use]
    pub fn with_shares(self, key: MetadataKey, shares: ShareCount) -> Self {
        self.with(key, MetadataValue::Integer(shares.get()))
    }

    /// Adds a monetary amount under `key`.
    #[must_use]
    pub fn with_money(self, key: MetadataKey, amount: Money) -> Self {
        self.with(key, MetadataValue::Decimal(amount))
    }

    /// Looks up the value stored under `key`.
    pub fn get(&self, key: MetadataKey) -> Option<&MetadataValue> {
        self.0.get(&key)
    }

    /// Returns whether no metadata was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the recorded key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&MetadataKey, &MetadataValue)> + '_ {
        self.0.iter()
    }
}

/// An immutable, appended ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Monotonic position in the ledger.
    pub sequence: LedgerSequence,
    /// Globally unique, time-ordered entry id.
    pub entry_id: EntryId,
    /// The transition this entry records.
    pub entry_type: EntryType,
    /// The project the transition belongs to.
    pub project_id: ProjectId,
    /// The user who triggered the transition; `None` for system-driven
    /// transitions such as expiry.
    pub actor_id: Option<UserId>,
    /// When the entry was appended.
    pub recorded_at: Timestamp,
    /// Typed snapshot of the transition's relevant fields.
    pub metadata: EntryMetadata,
}

/// An entry prepared by the engine, not yet assigned a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    /// The transition to record.
    pub entry_type: EntryType,
    /// The project the transition belongs to.
    pub project_id: ProjectId,
    /// The triggering user, if any.
    pub actor_id: Option<UserId>,
    /// Typed transition snapshot.
    pub metadata: EntryMetadata,
}

impl NewEntry {
    /// Creates a new entry to append.
    pub const fn new(
        entry_type: EntryType,
        project_id: ProjectId,
        actor_id: Option<UserId>,
        metadata: EntryMetadata,
    ) -> Self {
        Self {
            entry_type,
            project_id,
            actor_id,
            metadata,
        }
    }
}

/// Configuration for reading ledger entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    /// Only entries of this type. `None` = all types.
    pub entry_type: Option<EntryType>,
    /// Only entries for this project. `None` = all projects.
    pub project_id: Option<ProjectId>,
    /// Only entries recorded by this actor. `None` = all actors,
    /// including system transitions.
    pub actor_id: Option<UserId>,
    /// Maximum number of entries to return. `None` = no limit.
    pub max_entries: Option<usize>,
}

impl EntryFilter {
    /// Creates a filter matching every entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one entry type.
    #[must_use]
    pub fn entry_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    /// Restricts to one project.
    #[must_use]
    pub fn project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Restricts to one actor.
    #[must_use]
    pub fn actor(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Limits the number of returned entries.
    #[must_use]
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Returns whether `entry` passes this filter, ignoring
    /// `max_entries`.
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if let Some(entry_type) = self.entry_type {
            if entry.entry_type != entry_type {
                return false;
            }
        }
        if let Some(project_id) = &self.project_id {
            if &entry.project_id != project_id {
                return false;
            }
        }
        if let Some(actor_id) = &self.actor_id {
            if entry.actor_id.as_ref() != Some(actor_id) {
                return false;
            }
        }
        true
    }
}

/// The append-only ledger store port.
///
/// Implementations assign strictly monotonic sequences and provide
/// write durability; the engine requires no locking beyond that. A
/// batch append is atomic: all entries receive consecutive sequences or
/// none are recorded.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Appends one entry, returning its assigned sequence.
    async fn append(&self, entry: NewEntry) -> LedgerResult<LedgerSequence>;

    /// Appends several entries atomically, returning the sequence of
    /// the last entry appended.
    async fn append_batch(&self, entries: Vec<NewEntry>) -> LedgerResult<LedgerSequence>;

    /// Reads entries matching `filter`, ordered by sequence.
    async fn read(&self, filter: &EntryFilter) -> LedgerResult<Vec<LedgerEntry>>;

    /// Reads one project's entries, ordered by sequence.
    async fn read_project(
        &self,
        project_id: ProjectId,
        filter: EntryFilter,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        self.read(&filter.project(project_id)).await
    }

    /// Returns the sequence of the most recent entry, or `None` when
    /// the ledger is empty.
    async fn head(&self) -> LedgerResult<Option<LedgerSequence>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(entry_type: EntryType, project: &str, actor: Option<&str>) -> LedgerEntry {
        LedgerEntry {
            sequence: LedgerSequence::initial(),
            entry_id: EntryId::new(),
            entry_type,
            project_id: ProjectId::try_new(project).unwrap(),
            actor_id: actor.map(|a| UserId::try_new(a).unwrap()),
            recorded_at: Timestamp::now(),
            metadata: EntryMetadata::new(),
        }
    }

    #[test]
    fn metadata_builder_records_typed_values() {
        let shares = ShareCount::try_new(50).unwrap();
        let amount = Money::from_cents(125_000).unwrap();
        let metadata = EntryMetadata::new()
            .with_text(MetadataKey::InvestmentId, "INV-1")
            .with_shares(MetadataKey::Shares, shares)
            .with_money(MetadataKey::Amount, amount);

        assert_eq!(
            metadata.get(MetadataKey::Shares),
            Some(&MetadataValue::Integer(50))
        );
        assert_eq!(
            metadata.get(MetadataKey::Amount),
            Some(&MetadataValue::Decimal(amount))
        );
        assert!(metadata.get(MetadataKey::Reason).is_none());
        assert_eq!(metadata.iter().count(), 3);
    }

    #[test]
    fn metadata_roundtrip_serialization() {
        let metadata = EntryMetadata::new()
            .with_text(MetadataKey::Reason, "description too short")
            .with(MetadataKey::ExpiresAt, MetadataValue::Timestamp(Timestamp::now()));
        let json = serde_json::to_string(&metadata).unwrap();
        let deserialized: EntryMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(metadata, deserialized);
    }

    #[test]
    fn filter_matches_by_type_project_and_actor() {
        let entry = sample_entry(EntryType::InvestmentApproved, "PRJ-1", Some("admin-1"));

        assert!(EntryFilter::new().matches(&entry));
        assert!(EntryFilter::new()
            .entry_type(EntryType::InvestmentApproved)
            .matches(&entry));
        assert!(!EntryFilter::new()
            .entry_type(EntryType::InvestmentRejected)
            .matches(&entry));
        assert!(EntryFilter::new()
            .project(ProjectId::try_new("PRJ-1").unwrap())
            .matches(&entry));
        assert!(!EntryFilter::new()
            .project(ProjectId::try_new("PRJ-2").unwrap())
            .matches(&entry));
        assert!(EntryFilter::new()
            .actor(UserId::try_new("admin-1").unwrap())
            .matches(&entry));
        assert!(!EntryFilter::new()
            .actor(UserId::try_new("admin-2").unwrap())
            .matches(&entry));
    }

    #[test]
    fn filter_on_actor_excludes_system_entries() {
        let entry = sample_entry(EntryType::InvestmentExpired, "PRJ-1", None);
        assert!(!EntryFilter::new()
            .actor(UserId::try_new("admin-1").unwrap())
            .matches(&entry));
        assert!(EntryFilter::new().matches(&entry));
    }

    #[test]
    fn ledger_entry_roundtrip_serialization() {
        let entry = sample_entry(EntryType::ProjectCreated, "PRJ-9", Some("dev-1"));
        let json = serde_json::to_string(&entry).unwrap();
        let deserialized: LedgerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, deserialized);
    }
}
