//! Project records and the publication state machine.
//!
//! A project is created in DRAFT, travels through review, and ends in
//! ARCHIVED. Transition validation lives here as pure guard functions;
//! the engine orchestrates side effects (inventory, ledger,
//! notifications) around them. Once a project is APPROVED, content
//! mutations are staged as [`EditRequest`]s and applied only when an
//! admin approves them.

use crate::errors::{EngineError, EngineResult};
use crate::types::{EditRequestId, Money, ProjectId, ShareCount, Timestamp, UserId};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Publication status of a project. ARCHIVED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    /// Being drafted by its developer; freely editable.
    Draft,
    /// Submitted, awaiting admin review.
    PendingReview,
    /// Sent back by an admin with a reason; freely editable.
    NeedsChanges,
    /// Live and open for investment; edits must be staged.
    Approved,
    /// Rejected by an admin with a reason; freely editable.
    Rejected,
    /// Retired; no further transitions.
    Archived,
}

impl ProjectStatus {
    /// Whether the developer may mutate content directly in this state.
    pub const fn allows_direct_edit(self) -> bool {
        matches!(self, Self::Draft | Self::NeedsChanges | Self::Rejected)
    }

    /// Whether the project may be submitted for review from this state.
    pub const fn allows_submit(self) -> bool {
        matches!(self, Self::Draft | Self::NeedsChanges)
    }

    /// Whether the project may be archived from this state.
    pub const fn allows_archive(self) -> bool {
        matches!(self, Self::Draft | Self::PendingReview | Self::Approved)
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "DRAFT",
            Self::PendingReview => "PENDING_REVIEW",
            Self::NeedsChanges => "NEEDS_CHANGES",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Archived => "ARCHIVED",
        };
        f.write_str(s)
    }
}

/// Market category a project belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Software and hardware ventures.
    Technology,
    /// Property developments.
    RealEstate,
    /// Power generation and storage.
    Energy,
    /// Clinics, devices, and care services.
    Healthcare,
    /// Farms and food production.
    Agriculture,
    /// Industrial production.
    Manufacturing,
    /// Consumer-facing commerce.
    Retail,
    /// Service businesses.
    Services,
    /// Anything else.
    Other,
}

/// Confidential fields gated behind `has_restricted_fields`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictedDetails {
    /// Forward-looking financial projections.
    pub financial_projections: Option<String>,
    /// The full business plan.
    pub business_plan: Option<String>,
    /// Team composition and backgrounds.
    pub team_details: Option<String>,
    /// Legal documentation.
    pub legal_documents: Option<String>,
    /// Risk assessment material.
    pub risk_assessment: Option<String>,
}

/// Input for creating a project. Economic attributes are fixed here:
/// the per-share price is derived once and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    /// Project title.
    pub title: String,
    /// Long-form description.
    pub description: String,
    /// One-paragraph summary.
    pub short_description: String,
    /// Market category.
    pub category: Category,
    /// Total funding goal.
    pub total_value: Money,
    /// Number of shares the goal is divided into.
    pub total_shares: ShareCount,
    /// Funding window length in days, started at approval.
    pub duration_days: u32,
    /// Image URLs; at least one is required to submit.
    pub images: Vec<String>,
    /// Optional thumbnail URL.
    pub thumbnail_url: Option<String>,
    /// Whether a 3D model accompanies the listing.
    pub has_3d_model: bool,
    /// URL of the 3D model, if any.
    pub model_3d_url: Option<String>,
    /// Whether the 3D model is publicly viewable.
    pub is_3d_public: bool,
    /// Whether confidential fields are present and gated.
    pub has_restricted_fields: bool,
    /// The gated confidential sub-document.
    pub restricted: Option<RestrictedDetails>,
}

/// A project record.
///
/// `shares_sold` is owned by the share inventory, not stored here;
/// snapshots recompute `remaining_shares` from the inventory so the two
/// can never drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Stable, opaque identity.
    pub id: ProjectId,
    /// The owning developer.
    pub developer_id: UserId,
    /// Project title.
    pub title: String,
    /// Long-form description.
    pub description: String,
    /// One-paragraph summary.
    pub short_description: String,
    /// Market category.
    pub category: Category,
    /// Publication status.
    pub status: ProjectStatus,
    /// Total funding goal.
    pub total_value: Money,
    /// Number of shares the goal is divided into.
    pub total_shares: ShareCount,
    /// Price per share, fixed at creation.
    pub per_share_price: Money,
    /// Funding window length in days.
    pub duration_days: u32,
    /// Window start, stamped at approval.
    pub start_date: Option<Timestamp>,
    /// Window end, stamped at approval.
    pub end_date: Option<Timestamp>,
    /// Image URLs.
    pub images: Vec<String>,
    /// Optional thumbnail URL.
    pub thumbnail_url: Option<String>,
    /// Whether a 3D model accompanies the listing.
    pub has_3d_model: bool,
    /// URL of the 3D model, if any.
    pub model_3d_url: Option<String>,
    /// Whether the 3D model is publicly viewable.
    pub is_3d_public: bool,
    /// Whether confidential fields are present and gated.
    pub has_restricted_fields: bool,
    /// The gated confidential sub-document.
    pub restricted: Option<RestrictedDetails>,
    /// Note from the last admin review.
    pub review_note: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
    /// Last submission time.
    pub submitted_at: Option<Timestamp>,
    /// Last review time.
    pub reviewed_at: Option<Timestamp>,
}

impl Project {
    /// Creates a DRAFT project owned by `developer_id`.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the funding goal is not
    /// positive; the per-share price must be derivable at creation.
    pub fn create(
        id: ProjectId,
        developer_id: UserId,
        input: NewProject,
        now: Timestamp,
    ) -> EngineResult<Self> {
        if !input.total_value.is_positive() {
            return Err(EngineError::validation(
                "total_value",
                "must be greater than zero",
            ));
        }
        let per_share_price = input
            .total_value
            .per_share(input.total_shares)
            .map_err(|e| EngineError::validation("total_value", e.to_string()))?;
        Ok(Self {
            id,
            developer_id,
            title: input.title,
            description: input.description,
            short_description: input.short_description,
            category: input.category,
            status: ProjectStatus::Draft,
            total_value: input.total_value,
            total_shares: input.total_shares,
            per_share_price,
            duration_days: input.duration_days,
            start_date: None,
            end_date: None,
            images: input.images,
            thumbnail_url: input.thumbnail_url,
            has_3d_model: input.has_3d_model,
            model_3d_url: input.model_3d_url,
            is_3d_public: input.is_3d_public,
            has_restricted_fields: input.has_restricted_fields,
            restricted: input.restricted,
            review_note: None,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            reviewed_at: None,
        })
    }

    /// Checks every submit guard, reporting the first failure by field
    /// name. No state change happens when any guard fails.
    pub fn validate_submit(&self) -> EngineResult<()> {
        if self.title.trim().chars().count() < 3 {
            return Err(EngineError::validation(
                "title",
                "must be at least 3 characters",
            ));
        }
        if self.description.trim().chars().count() < 50 {
            return Err(EngineError::validation(
                "description",
                "must be at least 50 characters",
            ));
        }
        if !self.total_value.is_positive() {
            return Err(EngineError::validation(
                "total_value",
                "must be greater than zero",
            ));
        }
        if self.duration_days == 0 {
            return Err(EngineError::validation(
                "duration_days",
                "must be greater than zero",
            ));
        }
        if self.images.is_empty() {
            return Err(EngineError::validation(
                "images",
                "at least one image is required",
            ));
        }
        Ok(())
    }

    /// Stamps the funding window at approval time.
    pub fn start_window(&mut self, now: Timestamp) {
        self.start_date = Some(now);
        if self.end_date.is_none() {
            self.end_date = Some(now.plus(Duration::days(i64::from(self.duration_days))));
        }
    }

    /// Whole days until the funding window closes; zero once closed or
    /// before the window is stamped.
    pub fn days_remaining(&self, now: Timestamp) -> u64 {
        self.end_date.map_or(0, |end| now.days_until(end))
    }

    /// Funding progress as a percentage, given the inventory's
    /// authoritative sold counter.
    pub fn funding_progress(&self, shares_sold: u64) -> f64 {
        let total = self.total_shares.get();
        if total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            (shares_sold as f64 / total as f64) * 100.0
        }
    }

    /// Applies a content diff to the record. Callers are responsible
    /// for having checked the state machine first.
    pub fn apply_changes(&mut self, changes: &ProjectChanges, now: Timestamp) {
        if let Some(title) = &changes.title {
            self.title = title.clone();
        }
        if let Some(description) = &changes.description {
            self.description = description.clone();
        }
        if let Some(short_description) = &changes.short_description {
            self.short_description = short_description.clone();
        }
        if let Some(category) = changes.category {
            self.category = category;
        }
        if let Some(total_value) = changes.total_value {
            self.total_value = total_value;
        }
        if let Some(total_shares) = changes.total_shares {
            self.total_shares = total_shares;
        }
        if let Some(duration_days) = changes.duration_days {
            self.duration_days = duration_days;
        }
        if let Some(images) = &changes.images {
            self.images = images.clone();
        }
        if let Some(thumbnail_url) = &changes.thumbnail_url {
            self.thumbnail_url = Some(thumbnail_url.clone());
        }
        if let Some(has_3d_model) = changes.has_3d_model {
            self.has_3d_model = has_3d_model;
        }
        if let Some(model_3d_url) = &changes.model_3d_url {
            self.model_3d_url = Some(model_3d_url.clone());
        }
        if let Some(is_3d_public) = changes.is_3d_public {
            self.is_3d_public = is_3d_public;
        }
        if let Some(has_restricted_fields) = changes.has_restricted_fields {
            self.has_restricted_fields = has_restricted_fields;
        }
        if let Some(restricted) = &changes.restricted {
            self.restricted = Some(restricted.clone());
        }
        self.updated_at = now;
    }
}

/// A per-field content diff. `None` leaves the field untouched.
///
/// Note the per-share price is deliberately absent: it is fixed at
/// creation, and completed investments keep their snapshots regardless.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectChanges {
    /// New title.
    pub title: Option<String>,
    /// New long-form description.
    pub description: Option<String>,
    /// New summary.
    pub short_description: Option<String>,
    /// New category.
    pub category: Option<Category>,
    /// New funding goal.
    pub total_value: Option<Money>,
    /// New share pool size.
    pub total_shares: Option<ShareCount>,
    /// New funding window length.
    pub duration_days: Option<u32>,
    /// Replacement image list.
    pub images: Option<Vec<String>>,
    /// New thumbnail URL.
    pub thumbnail_url: Option<String>,
    /// New 3D-model flag.
    pub has_3d_model: Option<bool>,
    /// New 3D-model URL.
    pub model_3d_url: Option<String>,
    /// New 3D visibility flag.
    pub is_3d_public: Option<bool>,
    /// New restricted-fields flag.
    pub has_restricted_fields: Option<bool>,
    /// Replacement confidential sub-document.
    pub restricted: Option<RestrictedDetails>,
}

impl ProjectChanges {
    /// Returns whether the diff changes nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Review state of a staged edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditRequestStatus {
    /// Awaiting admin review.
    Pending,
    /// Applied to the live record.
    Approved,
    /// Discarded.
    Rejected,
}

/// A staged mutation to an APPROVED project, awaiting admin review.
/// At most one pending edit request exists per project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRequest {
    /// The request's id.
    pub id: EditRequestId,
    /// The project to mutate.
    pub project_id: ProjectId,
    /// The developer who staged the diff.
    pub requested_by: UserId,
    /// The staged diff.
    pub changes: ProjectChanges,
    /// Review state.
    pub status: EditRequestStatus,
    /// Note from the reviewing admin.
    pub review_note: Option<String>,
    /// When the diff was staged.
    pub created_at: Timestamp,
    /// When the diff was reviewed.
    pub reviewed_at: Option<Timestamp>,
    /// The reviewing admin.
    pub reviewed_by: Option<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_input() -> NewProject {
        NewProject {
            title: "Solar Farm".to_string(),
            description: "A 5MW solar installation with long-term purchase agreements in place."
                .to_string(),
            short_description: "5MW solar installation".to_string(),
            category: Category::Energy,
            total_value: Money::new(dec!(100000.00)).unwrap(),
            total_shares: ShareCount::try_new(1000).unwrap(),
            duration_days: 90,
            images: vec!["https://img.example/solar-1.jpg".to_string()],
            thumbnail_url: None,
            has_3d_model: false,
            model_3d_url: None,
            is_3d_public: false,
            has_restricted_fields: false,
            restricted: None,
        }
    }

    fn sample_project() -> Project {
        Project::create(
            ProjectId::try_new("PRJ-1").unwrap(),
            UserId::try_new("dev-1").unwrap(),
            sample_input(),
            Timestamp::now(),
        )
        .unwrap()
    }

    #[test]
    fn create_fixes_per_share_price() {
        let project = sample_project();
        assert_eq!(project.status, ProjectStatus::Draft);
        assert_eq!(project.per_share_price.amount(), dec!(100.00));
    }

    #[test]
    fn create_rejects_zero_value() {
        let mut input = sample_input();
        input.total_value = Money::zero();
        let result = Project::create(
            ProjectId::try_new("PRJ-1").unwrap(),
            UserId::try_new("dev-1").unwrap(),
            input,
            Timestamp::now(),
        );
        assert!(matches!(
            result,
            Err(EngineError::Validation {
                field: "total_value",
                ..
            })
        ));
    }

    #[test]
    fn submit_guard_names_short_description() {
        let mut project = sample_project();
        project.description = "Only thirty characters long!!".to_string();
        let err = project.validate_submit().unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation {
                field: "description",
                ..
            }
        ));
        // The guard failure must leave status untouched.
        assert_eq!(project.status, ProjectStatus::Draft);
    }

    #[test]
    fn submit_guard_names_short_title() {
        let mut project = sample_project();
        project.title = "AB".to_string();
        let err = project.validate_submit().unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation { field: "title", .. }
        ));
    }

    #[test]
    fn submit_guard_requires_an_image() {
        let mut project = sample_project();
        project.images.clear();
        let err = project.validate_submit().unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation { field: "images", .. }
        ));
    }

    #[test]
    fn submit_guard_requires_duration() {
        let mut project = sample_project();
        project.duration_days = 0;
        let err = project.validate_submit().unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation {
                field: "duration_days",
                ..
            }
        ));
    }

    #[test]
    fn valid_project_passes_submit_guards() {
        assert!(sample_project().validate_submit().is_ok());
    }

    #[test]
    fn status_transition_predicates() {
        assert!(ProjectStatus::Draft.allows_submit());
        assert!(ProjectStatus::NeedsChanges.allows_submit());
        assert!(!ProjectStatus::Approved.allows_submit());
        assert!(!ProjectStatus::Archived.allows_submit());

        assert!(ProjectStatus::Draft.allows_direct_edit());
        assert!(ProjectStatus::Rejected.allows_direct_edit());
        assert!(!ProjectStatus::Approved.allows_direct_edit());
        assert!(!ProjectStatus::PendingReview.allows_direct_edit());

        assert!(ProjectStatus::Approved.allows_archive());
        assert!(ProjectStatus::PendingReview.allows_archive());
        assert!(!ProjectStatus::Rejected.allows_archive());
        assert!(!ProjectStatus::Archived.allows_archive());
    }

    #[test]
    fn start_window_stamps_end_from_duration() {
        let mut project = sample_project();
        let now = Timestamp::now();
        project.start_window(now);
        assert_eq!(project.start_date, Some(now));
        assert_eq!(project.days_remaining(now), 90);
    }

    #[test]
    fn funding_progress_is_percentage() {
        let project = sample_project();
        assert!((project.funding_progress(250) - 25.0).abs() < f64::EPSILON);
        assert!((project.funding_progress(0)).abs() < f64::EPSILON);
    }

    #[test]
    fn apply_changes_updates_only_given_fields() {
        let mut project = sample_project();
        let original_description = project.description.clone();
        let changes = ProjectChanges {
            title: Some("Solar Farm Phase II".to_string()),
            total_shares: Some(ShareCount::try_new(2000).unwrap()),
            ..ProjectChanges::default()
        };
        project.apply_changes(&changes, Timestamp::now());
        assert_eq!(project.title, "Solar Farm Phase II");
        assert_eq!(project.total_shares.get(), 2000);
        assert_eq!(project.description, original_description);
    }

    #[test]
    fn empty_changes_detected() {
        assert!(ProjectChanges::default().is_empty());
        let changes = ProjectChanges {
            title: Some("X".to_string()),
            ..ProjectChanges::default()
        };
        assert!(!changes.is_empty());
    }

    #[test]
    fn status_display_matches_wire_names() {
        assert_eq!(ProjectStatus::PendingReview.to_string(), "PENDING_REVIEW");
        assert_eq!(ProjectStatus::NeedsChanges.to_string(), "NEEDS_CHANGES");
        assert_eq!(
            serde_json::to_string(&ProjectStatus::PendingReview).unwrap(),
            "\"PENDING_REVIEW\""
        );
    }
}
