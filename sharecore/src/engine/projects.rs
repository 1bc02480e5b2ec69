//! Project lifecycle operations.

use super::MarketEngine;
use crate::errors::{unauthorized, EngineError, EngineResult, LedgerError};
use crate::ledger::{
    EntryMetadata, EntryType, LedgerStore, MetadataKey, MetadataValue, NewEntry,
};
use crate::notification::{Notification, NotificationKind, NotificationSink, RelatedEntity};
use crate::project::{
    EditRequest, EditRequestStatus, NewProject, Project, ProjectChanges, ProjectStatus,
};
use crate::types::{Actor, EditRequestId, ProjectId, Role, Timestamp};
use serde::{Deserialize, Serialize};

/// An admin's verdict on a submitted project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "decision", content = "reason")]
pub enum ReviewDecision {
    /// Approve the project; it goes live and its funding window starts.
    Approve,
    /// Reject the project with a reason.
    Reject(String),
    /// Send the project back with a reason; the developer may revise
    /// and resubmit.
    RequestChanges(String),
}

impl<L, N> MarketEngine<L, N>
where
    L: LedgerStore,
    N: NotificationSink,
{
    /// Creates a DRAFT project owned by the calling developer and
    /// registers its share pool with the inventory.
    #[tracing::instrument(skip(self, input), fields(developer = %actor.user_id))]
    pub async fn create_project(
        &self,
        actor: &Actor,
        input: NewProject,
    ) -> EngineResult<Project> {
        if actor.role != Role::Developer {
            return Err(unauthorized("the developer role"));
        }
        let now = Timestamp::now();
        let project_id = ProjectId::generate();
        let project = Project::create(project_id.clone(), actor.user_id.clone(), input, now)?;

        let slot = self.slot(&project_id);
        let _guard = slot.lock().await;

        self.inventory_ref()
            .register_project(project_id.clone(), project.total_shares);

        let metadata = EntryMetadata::new()
            .with_text(MetadataKey::ProjectTitle, project.title.clone())
            .with_money(MetadataKey::TotalValue, project.total_value)
            .with_shares(MetadataKey::TotalShares, project.total_shares)
            .with(
                MetadataKey::DurationDays,
                MetadataValue::Integer(u64::from(project.duration_days)),
            );
        self.ledger_ref()
            .append(NewEntry::new(
                EntryType::ProjectCreated,
                project_id,
                Some(actor.user_id.clone()),
                metadata,
            ))
            .await?;

        self.store_project(project.clone());
        tracing::info!(project = %project.id, "project created");
        Ok(project)
    }

    /// Applies a direct edit to a project still under its developer's
    /// control (DRAFT, NEEDS_CHANGES, or REJECTED).
    #[tracing::instrument(skip(self, changes), fields(project = %project_id))]
    pub async fn update_project(
        &self,
        actor: &Actor,
        project_id: &ProjectId,
        changes: ProjectChanges,
    ) -> EngineResult<Project> {
        let slot = self.slot(project_id);
        let _guard = slot.lock().await;

        let mut project = self.load_project(project_id)?;
        if project.developer_id != actor.user_id {
            return Err(unauthorized("the owning developer"));
        }
        if !project.status.allows_direct_edit() {
            return Err(EngineError::invalid_project_transition(
                project.status,
                "edit directly",
            ));
        }
        if changes.is_empty() {
            return Ok(project);
        }

        let previous_total = project.total_shares;
        let now = Timestamp::now();
        project.apply_changes(&changes, now);
        if changes.total_value.is_some() || changes.total_shares.is_some() {
            project.per_share_price = project
                .total_value
                .per_share(project.total_shares)
                .map_err(|e| EngineError::validation("total_value", e.to_string()))?;
        }
        let metadata = EntryMetadata::new().with_text(
            MetadataKey::Changes,
            serde_json::to_string(&changes)
                .map_err(|e| LedgerError::SerializationFailed(e.to_string()))?,
        );

        // The resize is the last step before the append: everything
        // fallible ahead of it is pure, so a rejected shrink leaves no
        // trace and an append failure has one mutation to unwind.
        if let Some(new_total) = changes.total_shares {
            self.inventory_ref().resize(project_id, new_total)?;
        }

        if let Err(err) = self
            .ledger_ref()
            .append(NewEntry::new(
                EntryType::ProjectUpdated,
                project_id.clone(),
                Some(actor.user_id.clone()),
                metadata,
            ))
            .await
        {
            // Restoring the previous total cannot shrink below
            // allocation: it accommodated the same claims before.
            if changes.total_shares.is_some() {
                let _ = self.inventory_ref().resize(project_id, previous_total);
            }
            return Err(err.into());
        }

        self.store_project(project.clone());
        Ok(project)
    }

    /// Submits a project for admin review. All submit guards must
    /// pass; a failed guard leaves the project untouched. Submitting
    /// an already-pending project is a no-op.
    #[tracing::instrument(skip(self), fields(project = %project_id))]
    pub async fn submit_project(
        &self,
        actor: &Actor,
        project_id: &ProjectId,
    ) -> EngineResult<Project> {
        let slot = self.slot(project_id);
        let _guard = slot.lock().await;

        let mut project = self.load_project(project_id)?;
        if project.developer_id != actor.user_id {
            return Err(unauthorized("the owning developer"));
        }
        if project.status == ProjectStatus::PendingReview {
            return Ok(project);
        }
        if !project.status.allows_submit() {
            return Err(EngineError::invalid_project_transition(
                project.status,
                "submit",
            ));
        }
        project.validate_submit()?;

        let now = Timestamp::now();
        project.status = ProjectStatus::PendingReview;
        project.submitted_at = Some(now);
        project.updated_at = now;

        self.ledger_ref()
            .append(NewEntry::new(
                EntryType::ProjectSubmitted,
                project_id.clone(),
                Some(actor.user_id.clone()),
                EntryMetadata::new().with_text(MetadataKey::ProjectTitle, project.title.clone()),
            ))
            .await?;

        self.store_project(project.clone());
        self.notify(Notification::new(
            NotificationKind::ProjectSubmitted,
            project.developer_id.clone(),
            RelatedEntity::Project(project_id.clone()),
            "Project submitted",
            format!("'{}' was submitted for review.", project.title),
            now,
        ))
        .await;
        Ok(project)
    }

    /// Records an admin's review verdict. Approval stamps the funding
    /// window and opens the project for investment.
    #[tracing::instrument(skip(self, decision), fields(project = %project_id))]
    pub async fn review_project(
        &self,
        actor: &Actor,
        project_id: &ProjectId,
        decision: ReviewDecision,
    ) -> EngineResult<Project> {
        if !actor.is_admin() {
            return Err(unauthorized("the admin role"));
        }
        let slot = self.slot(project_id);
        let _guard = slot.lock().await;

        let mut project = self.load_project(project_id)?;
        if project.status != ProjectStatus::PendingReview {
            return Err(EngineError::invalid_project_transition(
                project.status,
                "review",
            ));
        }

        let now = Timestamp::now();
        project.reviewed_at = Some(now);
        project.updated_at = now;

        let (entry_type, kind, title, message) = match &decision {
            ReviewDecision::Approve => {
                project.status = ProjectStatus::Approved;
                project.review_note = None;
                project.start_window(now);
                (
                    EntryType::ProjectApproved,
                    NotificationKind::ProjectApproved,
                    "Project approved",
                    format!("'{}' is now live and open for investment.", project.title),
                )
            }
            ReviewDecision::Reject(reason) => {
                project.status = ProjectStatus::Rejected;
                project.review_note = Some(reason.clone());
                (
                    EntryType::ProjectRejected,
                    NotificationKind::ProjectRejected,
                    "Project rejected",
                    format!("'{}' was rejected: {reason}", project.title),
                )
            }
            ReviewDecision::RequestChanges(reason) => {
                project.status = ProjectStatus::NeedsChanges;
                project.review_note = Some(reason.clone());
                (
                    EntryType::ProjectChangesRequested,
                    NotificationKind::ProjectChangesRequested,
                    "Changes requested",
                    format!("'{}' needs changes: {reason}", project.title),
                )
            }
        };

        let mut metadata = EntryMetadata::new()
            .with_text(MetadataKey::Status, project.status.to_string());
        if let Some(note) = &project.review_note {
            metadata = metadata.with_text(MetadataKey::Reason, note.clone());
        }
        self.ledger_ref()
            .append(NewEntry::new(
                entry_type,
                project_id.clone(),
                Some(actor.user_id.clone()),
                metadata,
            ))
            .await?;

        self.store_project(project.clone());
        self.notify(Notification::new(
            kind,
            project.developer_id.clone(),
            RelatedEntity::Project(project_id.clone()),
            title,
            message,
            now,
        ))
        .await;
        Ok(project)
    }

    /// Archives a project. Allowed from DRAFT, PENDING_REVIEW, and
    /// APPROVED, by the owning developer or an admin. Archiving an
    /// archived project is a no-op.
    #[tracing::instrument(skip(self), fields(project = %project_id))]
    pub async fn archive_project(
        &self,
        actor: &Actor,
        project_id: &ProjectId,
    ) -> EngineResult<Project> {
        let slot = self.slot(project_id);
        let _guard = slot.lock().await;

        let mut project = self.load_project(project_id)?;
        if !actor.is_admin() && project.developer_id != actor.user_id {
            return Err(unauthorized("the owning developer or an admin"));
        }
        if project.status == ProjectStatus::Archived {
            return Ok(project);
        }
        if !project.status.allows_archive() {
            return Err(EngineError::invalid_project_transition(
                project.status,
                "archive",
            ));
        }

        let now = Timestamp::now();
        project.status = ProjectStatus::Archived;
        project.updated_at = now;

        self.ledger_ref()
            .append(NewEntry::new(
                EntryType::ProjectArchived,
                project_id.clone(),
                Some(actor.user_id.clone()),
                EntryMetadata::new().with_text(MetadataKey::ProjectTitle, project.title.clone()),
            ))
            .await?;

        self.store_project(project.clone());
        self.notify(Notification::new(
            NotificationKind::ProjectArchived,
            project.developer_id.clone(),
            RelatedEntity::Project(project_id.clone()),
            "Project archived",
            format!("'{}' was archived.", project.title),
            now,
        ))
        .await;
        Ok(project)
    }

    /// Stages an edit to an APPROVED project. At most one pending edit
    /// request may exist per project.
    #[tracing::instrument(skip(self, changes), fields(project = %project_id))]
    pub async fn request_edit(
        &self,
        actor: &Actor,
        project_id: &ProjectId,
        changes: ProjectChanges,
    ) -> EngineResult<EditRequest> {
        let slot = self.slot(project_id);
        let _guard = slot.lock().await;

        let project = self.load_project(project_id)?;
        if project.developer_id != actor.user_id {
            return Err(unauthorized("the owning developer"));
        }
        if project.status != ProjectStatus::Approved {
            return Err(EngineError::invalid_project_transition(
                project.status,
                "stage an edit",
            ));
        }
        if changes.is_empty() {
            return Err(EngineError::validation("changes", "no fields to change"));
        }
        if self.has_pending_edit(project_id) {
            return Err(EngineError::Conflict(format!(
                "project {project_id} already has a pending edit request"
            )));
        }

        let now = Timestamp::now();
        let edit = EditRequest {
            id: EditRequestId::new(),
            project_id: project_id.clone(),
            requested_by: actor.user_id.clone(),
            changes: changes.clone(),
            status: EditRequestStatus::Pending,
            review_note: None,
            created_at: now,
            reviewed_at: None,
            reviewed_by: None,
        };

        let metadata = EntryMetadata::new().with_text(
            MetadataKey::Changes,
            serde_json::to_string(&changes)
                .map_err(|e| LedgerError::SerializationFailed(e.to_string()))?,
        );
        self.ledger_ref()
            .append(NewEntry::new(
                EntryType::ProjectEditRequested,
                project_id.clone(),
                Some(actor.user_id.clone()),
                metadata,
            ))
            .await?;

        self.store_edit(edit.clone());
        self.notify(Notification::new(
            NotificationKind::EditRequested,
            project.developer_id.clone(),
            RelatedEntity::EditRequest(edit.id),
            "Edit request staged",
            format!("An edit to '{}' is awaiting review.", project.title),
            now,
        ))
        .await;
        Ok(edit)
    }

    /// Reviews a staged edit. Approval applies the diff to the live
    /// project; the per-share price is never recomputed, and resizing
    /// the pool below sold-plus-reserved shares rejects the approval.
    #[tracing::instrument(skip(self), fields(edit = %edit_id))]
    pub async fn review_edit(
        &self,
        actor: &Actor,
        edit_id: &EditRequestId,
        approve: bool,
        note: Option<String>,
    ) -> EngineResult<EditRequest> {
        if !actor.is_admin() {
            return Err(unauthorized("the admin role"));
        }
        let mut edit = self.load_edit(edit_id)?;
        let slot = self.slot(&edit.project_id);
        let _guard = slot.lock().await;

        // Reload under the lock so a concurrent review is seen.
        edit = self.load_edit(edit_id)?;
        if edit.status != EditRequestStatus::Pending {
            return Ok(edit);
        }
        let mut project = self.load_project(&edit.project_id)?;
        let previous_total = project.total_shares;

        let now = Timestamp::now();
        edit.reviewed_at = Some(now);
        edit.reviewed_by = Some(actor.user_id.clone());
        edit.review_note = note.clone();

        let (entry_type, kind, title, message) = if approve {
            if let Some(new_total) = edit.changes.total_shares {
                self.inventory_ref().resize(&edit.project_id, new_total)?;
            }
            project.apply_changes(&edit.changes, now);
            edit.status = EditRequestStatus::Approved;
            (
                EntryType::ProjectEditApproved,
                NotificationKind::EditApproved,
                "Edit approved",
                format!("The staged edit to '{}' was applied.", project.title),
            )
        } else {
            edit.status = EditRequestStatus::Rejected;
            (
                EntryType::ProjectEditRejected,
                NotificationKind::EditRejected,
                "Edit rejected",
                format!("The staged edit to '{}' was rejected.", project.title),
            )
        };

        let mut metadata = EntryMetadata::new()
            .with_text(MetadataKey::Status, format!("{:?}", edit.status));
        if let Some(note) = &note {
            metadata = metadata.with_text(MetadataKey::AdminNote, note.clone());
        }
        if let Err(err) = self
            .ledger_ref()
            .append(NewEntry::new(
                entry_type,
                edit.project_id.clone(),
                Some(actor.user_id.clone()),
                metadata,
            ))
            .await
        {
            if approve && edit.changes.total_shares.is_some() {
                let _ = self.inventory_ref().resize(&edit.project_id, previous_total);
            }
            return Err(err.into());
        }

        if approve {
            self.store_project(project.clone());
        }
        self.store_edit(edit.clone());
        self.notify(Notification::new(
            kind,
            edit.requested_by.clone(),
            RelatedEntity::EditRequest(edit.id),
            title,
            message,
            now,
        ))
        .await;
        Ok(edit)
    }

    fn has_pending_edit(&self, project_id: &ProjectId) -> bool {
        self.edits
            .read()
            .values()
            .any(|e| &e.project_id == project_id && e.status == EditRequestStatus::Pending)
    }
}
