//! `ShareCore` - investment lifecycle and share inventory engine for a
//! fractional-investment marketplace.
//!
//! The engine owns three coupled concerns: the project publication
//! state machine, the investment payment lifecycle, and the share
//! inventory that guarantees a project's pool is never oversold. Every
//! successful transition is recorded in an append-only ledger and
//! announced through a pluggable notification sink.
//!
//! Persistence and delivery are ports: [`ledger::LedgerStore`] and
//! [`notification::NotificationSink`] traits the embedding application
//! implements. The `sharecore-memory` crate provides in-memory
//! implementations for tests and prototyping.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod comparator;
pub mod config;
pub mod engine;
pub mod errors;
pub mod inventory;
pub mod investment;
pub mod ledger;
pub mod notification;
pub mod project;
pub mod query;
pub mod types;

pub use comparator::{compare, Comparison, ComparisonEntry, Metric};
pub use config::{EngineConfig, PaymentRetryPolicy};
pub use engine::{AdminAction, MarketEngine, PaymentOutcome, ReviewDecision, SweepReport};
pub use errors::{
    EngineError, EngineResult, InventoryError, InventoryResult, LedgerError, LedgerResult,
};
pub use inventory::{ExpiredReservation, Reservation, ShareInventory};
pub use investment::{Investment, InvestmentStatus};
pub use ledger::{
    EntryFilter, EntryMetadata, EntryType, LedgerEntry, LedgerStore, MetadataKey, MetadataValue,
    NewEntry,
};
pub use notification::{
    DeliveryError, Notification, NotificationKind, NotificationSink, NullSink, RelatedEntity,
};
pub use project::{
    Category, EditRequest, EditRequestStatus, NewProject, Project, ProjectChanges, ProjectStatus,
    RestrictedDetails,
};
pub use query::{InvestmentFilter, Page, ProjectFilter, ProjectSnapshot};
pub use types::{
    Actor, EditRequestId, EntryId, InvestmentId, LedgerSequence, Money, MoneyError, ProjectId,
    ReservationId, Role, ShareCount, Timestamp, UserId,
};
