//! Core types for the `ShareCore` marketplace engine.
//!
//! This module defines the fundamental types used throughout the library.
//! All types use smart constructors to ensure validity at construction time,
//! following the "parse, don't validate" principle.

use chrono::{DateTime, Duration, Utc};
use nutype::nutype;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A project identifier.
///
/// `ProjectId` values are guaranteed to be non-empty and at most 64
/// characters. Once constructed, a `ProjectId` is always valid.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ProjectId(String);

impl ProjectId {
    /// Generates a new unique `ProjectId`.
    pub fn generate() -> Self {
        let uuid = Uuid::now_v7();
        Self::try_new(format!("PRJ-{}", uuid.simple().to_string().to_uppercase()))
            .expect("generated project id is always valid")
    }
}

/// An investment identifier.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct InvestmentId(String);

impl InvestmentId {
    /// Generates a new unique `InvestmentId`.
    pub fn generate() -> Self {
        let uuid = Uuid::now_v7();
        Self::try_new(format!("INV-{}", uuid.simple().to_string().to_uppercase()))
            .expect("generated investment id is always valid")
    }
}

/// A user identifier supplied by the authentication collaborator.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 64),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct UserId(String);

/// A transient claim on share inventory, identified by a `UUIDv7`.
///
/// `ReservationId` values are guaranteed to be UUIDv7, which provides
/// time-based ordering and global uniqueness.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new `ReservationId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

/// A staged edit-request identifier.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EditRequestId(Uuid);

impl EditRequestId {
    /// Creates a new `EditRequestId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for EditRequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// A globally unique ledger entry identifier using UUIDv7 format.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Creates a new `EntryId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

/// The position of an entry within the ledger.
///
/// Sequences start at 1 and increment monotonically with each append.
#[nutype(
    validate(greater_or_equal = 1),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct LedgerSequence(u64);

impl LedgerSequence {
    /// The first sequence assigned to a ledger entry.
    pub fn initial() -> Self {
        Self::try_new(1).expect("1 is always a valid sequence")
    }

    /// Returns the next sequence after this one.
    #[must_use]
    pub fn next(self) -> Self {
        let current: u64 = self.into();
        Self::try_new(current + 1).expect("next sequence should always be valid")
    }
}

/// A positive number of shares requested, reserved, or traded.
///
/// Zero-share requests are unrepresentable; running counters that may
/// legitimately be zero use plain `u64`.
#[nutype(
    validate(greater_or_equal = 1),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct ShareCount(u64);

impl ShareCount {
    /// Returns the raw share count.
    pub fn get(self) -> u64 {
        self.into()
    }
}

/// Errors that can occur when working with [`Money`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is negative, which is not allowed.
    #[error("Money amount cannot be negative: {0}")]
    NegativeAmount(Decimal),

    /// The amount has too many decimal places.
    #[error("Money can only have up to 2 decimal places, got: {0}")]
    TooManyDecimalPlaces(Decimal),

    /// The amount exceeds the maximum allowed value.
    #[error("Money amount {0} exceeds maximum allowed value of {1}")]
    ExceedsMaximum(Decimal, Decimal),
}

/// Maximum amount of money that can be represented (1 trillion).
pub const MAX_MONEY_AMOUNT: Decimal = dec!(1_000_000_000_000.00);

/// A monetary amount with proper validation.
///
/// Money is always non-negative and has at most 2 decimal places.
/// This type ensures these invariants at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    /// Creates a new `Money` instance from a `Decimal`.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative, has more than 2
    /// decimal places, or exceeds the maximum allowed value.
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() {
            return Err(MoneyError::NegativeAmount(amount));
        }
        if amount.scale() > 2 {
            return Err(MoneyError::TooManyDecimalPlaces(amount));
        }
        if amount > MAX_MONEY_AMOUNT {
            return Err(MoneyError::ExceedsMaximum(amount, MAX_MONEY_AMOUNT));
        }
        Ok(Self(amount))
    }

    /// Creates `Money` from cents (e.g., 1234 = $12.34).
    pub fn from_cents(cents: u64) -> Result<Self, MoneyError> {
        let amount = Decimal::from(cents) / dec!(100);
        Self::new(amount)
    }

    /// Returns the amount as a `Decimal`.
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns the amount as an `f64` for metric computations.
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    /// Multiplies the amount by a share count.
    pub fn times_shares(&self, shares: ShareCount) -> Result<Self, MoneyError> {
        Self::new(self.0 * Decimal::from(shares.get()))
    }

    /// Divides the amount evenly across a number of shares, rounded to
    /// cents. Used once, at project creation, to fix the per-share price.
    pub fn per_share(&self, total_shares: ShareCount) -> Result<Self, MoneyError> {
        let price = (self.0 / Decimal::from(total_shares.get())).round_dp(2);
        Self::new(price)
    }

    /// Returns whether the amount is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Zero money value.
    pub fn zero() -> Self {
        Self(dec!(0))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// A timestamp for when a transition occurred.
///
/// This wrapper ensures consistent timestamp handling throughout the
/// system and keeps `chrono` at the edges of the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns this timestamp shifted forward by `duration`.
    #[must_use]
    pub fn plus(&self, duration: Duration) -> Self {
        Self(self.0 + duration)
    }

    /// Returns whole days until `other`, clamped at zero when `other`
    /// is in the past.
    pub fn days_until(&self, other: Self) -> u64 {
        let days = (other.0 - self.0).num_days();
        u64::try_from(days).unwrap_or(0)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The role the authentication collaborator attributes to a caller.
///
/// The core treats roles as opaque authorization inputs; it never
/// manages identity itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// May request, pay for, and cancel their own investments.
    Investor,
    /// May create, edit, submit, and archive their own projects.
    Developer,
    /// May review projects, investments, and edit requests, and apply
    /// post-completion actions.
    Admin,
}

/// The authenticated caller of an engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The caller's user id.
    pub user_id: UserId,
    /// The caller's role.
    pub role: Role,
}

impl Actor {
    /// Creates a new actor.
    pub const fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Returns whether this actor holds the admin role.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
