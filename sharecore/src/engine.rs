//! The market engine: the single write path for projects, investments,
//! and edit requests.
//!
//! Every transition follows the same shape: authorize the actor, take
//! the project's slot lock, check the state machine, apply the
//! inventory effect, append to the ledger, commit the record, then
//! emit exactly one notification. Inventory acquisition happens before
//! the ledger append and is compensated when the append fails;
//! irreversible inventory effects (commit, release, credit) happen
//! after the append succeeds. A failed notification is logged and
//! never unwinds the transition.
//!
//! Concurrency is per project: a slot mutex serializes every mutation
//! touching one project, including the investments against it.
//! Operations on different projects never contend.

mod investments;
mod projects;
mod sweep;

pub use investments::{AdminAction, PaymentOutcome};
pub use projects::ReviewDecision;
pub use sweep::SweepReport;

use crate::comparator::{self, Comparison};
use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};
use crate::inventory::ShareInventory;
use crate::investment::Investment;
use crate::ledger::{EntryFilter, LedgerEntry, LedgerStore};
use crate::notification::{Notification, NotificationSink};
use crate::project::{EditRequest, Project};
use crate::query::{
    project_visible, InvestmentFilter, Page, ProjectFilter, ProjectSnapshot,
};
use crate::types::{Actor, EditRequestId, InvestmentId, ProjectId, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The engine. Generic over the ledger store and the notification
/// sink so tests can substitute in-memory collaborators.
pub struct MarketEngine<L, N> {
    ledger: Arc<L>,
    notifications: Arc<N>,
    inventory: ShareInventory,
    config: EngineConfig,
    projects: Arc<RwLock<HashMap<ProjectId, Project>>>,
    investments: Arc<RwLock<HashMap<InvestmentId, Investment>>>,
    edits: Arc<RwLock<HashMap<EditRequestId, EditRequest>>>,
    // One mutex per project; taken for the full duration of any
    // mutation touching that project.
    slots: Arc<RwLock<HashMap<ProjectId, Arc<Mutex<()>>>>>,
}

impl<L, N> Clone for MarketEngine<L, N> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            notifications: Arc::clone(&self.notifications),
            inventory: self.inventory.clone(),
            config: self.config.clone(),
            projects: Arc::clone(&self.projects),
            investments: Arc::clone(&self.investments),
            edits: Arc::clone(&self.edits),
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<L, N> MarketEngine<L, N>
where
    L: LedgerStore,
    N: NotificationSink,
{
    /// Creates an engine with the given collaborators and config.
    pub fn new(ledger: L, notifications: N, config: EngineConfig) -> Self {
        Self {
            ledger: Arc::new(ledger),
            notifications: Arc::new(notifications),
            inventory: ShareInventory::new(),
            config,
            projects: Arc::new(RwLock::new(HashMap::new())),
            investments: Arc::new(RwLock::new(HashMap::new())),
            edits: Arc::new(RwLock::new(HashMap::new())),
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The share inventory. Exposed read-only in spirit: mutations go
    /// through engine operations.
    pub fn inventory(&self) -> &ShareInventory {
        &self.inventory
    }

    pub(crate) fn slot(&self, project_id: &ProjectId) -> Arc<Mutex<()>> {
        if let Some(slot) = self.slots.read().get(project_id) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        Arc::clone(
            slots
                .entry(project_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    pub(crate) fn load_project(&self, project_id: &ProjectId) -> EngineResult<Project> {
        self.projects
            .read()
            .get(project_id)
            .cloned()
            .ok_or_else(|| EngineError::ProjectNotFound(project_id.clone()))
    }

    pub(crate) fn store_project(&self, project: Project) {
        self.projects.write().insert(project.id.clone(), project);
    }

    pub(crate) fn load_investment(
        &self,
        investment_id: &InvestmentId,
    ) -> EngineResult<Investment> {
        self.investments
            .read()
            .get(investment_id)
            .cloned()
            .ok_or_else(|| EngineError::InvestmentNotFound(investment_id.clone()))
    }

    pub(crate) fn store_investment(&self, investment: Investment) {
        self.investments
            .write()
            .insert(investment.id.clone(), investment);
    }

    pub(crate) fn load_edit(&self, edit_id: &EditRequestId) -> EngineResult<EditRequest> {
        self.edits
            .read()
            .get(edit_id)
            .cloned()
            .ok_or_else(|| EngineError::Conflict(format!("edit request not found: {edit_id}")))
    }

    pub(crate) fn store_edit(&self, edit: EditRequest) {
        self.edits.write().insert(edit.id, edit);
    }

    pub(crate) fn inventory_ref(&self) -> &ShareInventory {
        &self.inventory
    }

    pub(crate) fn ledger_ref(&self) -> &L {
        &self.ledger
    }

    /// Delivers one notification, logging failures without propagating.
    pub(crate) async fn notify(&self, notification: Notification) {
        if let Err(err) = self.notifications.deliver(notification.clone()).await {
            tracing::warn!(
                kind = ?notification.kind,
                recipient = %notification.recipient,
                error = %err,
                "notification delivery failed"
            );
        }
    }

    fn snapshot_for(
        &self,
        project: &Project,
        viewer: Option<&Actor>,
        now: Timestamp,
    ) -> EngineResult<ProjectSnapshot> {
        let shares_sold = self
            .inventory
            .shares_sold(&project.id)
            .map_err(EngineError::from)?;
        let shares_reserved = self
            .inventory
            .open_reservations(&project.id)
            .map_err(EngineError::from)?;
        Ok(ProjectSnapshot::compose(
            project,
            shares_sold,
            shares_reserved,
            viewer,
            now,
        ))
    }

    /// Fetches one project as a snapshot, subject to visibility.
    /// A project the viewer may not see reads as not found, so the
    /// query surface does not leak existence.
    pub fn get_project(
        &self,
        viewer: Option<&Actor>,
        project_id: &ProjectId,
    ) -> EngineResult<ProjectSnapshot> {
        let project = self.load_project(project_id)?;
        if !project_visible(&project, viewer) {
            return Err(EngineError::ProjectNotFound(project_id.clone()));
        }
        self.snapshot_for(&project, viewer, Timestamp::now())
    }

    /// Lists visible projects matching `filter`, newest first.
    pub fn list_projects(
        &self,
        viewer: Option<&Actor>,
        filter: &ProjectFilter,
        page: Page,
    ) -> EngineResult<Vec<ProjectSnapshot>> {
        let now = Timestamp::now();
        let mut matched: Vec<Project> = self
            .projects
            .read()
            .values()
            .filter(|p| filter.matches(p) && project_visible(p, viewer))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        // Progress bounds need the composed counters, so they apply
        // after snapshotting and before paging.
        let snapshots = matched
            .iter()
            .map(|p| self.snapshot_for(p, viewer, now))
            .collect::<EngineResult<Vec<_>>>()?
            .into_iter()
            .filter(|s| filter.progress_matches(s))
            .collect();
        Ok(page.apply(snapshots))
    }

    /// Lists investments matching `filter`, scoped to what the actor
    /// may see: admins see everything, investors their own records,
    /// developers the investments against their projects.
    pub fn list_investments(
        &self,
        actor: &Actor,
        filter: &InvestmentFilter,
        page: Page,
    ) -> EngineResult<Vec<Investment>> {
        let projects = self.projects.read();
        let mut matched: Vec<Investment> = self
            .investments
            .read()
            .values()
            .filter(|inv| filter.matches(inv))
            .filter(|inv| {
                actor.is_admin()
                    || inv.investor_id == actor.user_id
                    || projects
                        .get(&inv.project_id)
                        .is_some_and(|p| p.developer_id == actor.user_id)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(page.apply(matched))
    }

    /// Fetches one investment, visible to its investor, the project's
    /// developer, and admins.
    pub fn get_investment(
        &self,
        actor: &Actor,
        investment_id: &InvestmentId,
    ) -> EngineResult<Investment> {
        let investment = self.load_investment(investment_id)?;
        let owns_project = self
            .projects
            .read()
            .get(&investment.project_id)
            .is_some_and(|p| p.developer_id == actor.user_id);
        if actor.is_admin() || investment.investor_id == actor.user_id || owns_project {
            Ok(investment)
        } else {
            Err(EngineError::InvestmentNotFound(investment_id.clone()))
        }
    }

    /// Compares two to four projects visible to the viewer.
    pub fn compare_projects(
        &self,
        viewer: Option<&Actor>,
        project_ids: &[ProjectId],
    ) -> EngineResult<Comparison> {
        let now = Timestamp::now();
        let snapshots: Vec<ProjectSnapshot> = project_ids
            .iter()
            .map(|id| {
                let project = self.load_project(id)?;
                if !project_visible(&project, viewer) {
                    return Err(EngineError::ProjectNotFound(id.clone()));
                }
                self.snapshot_for(&project, viewer, now)
            })
            .collect::<EngineResult<_>>()?;
        comparator::compare(&snapshots)
    }

    /// Reads the audit trail. Admin only.
    pub async fn audit_trail(
        &self,
        actor: &Actor,
        filter: &EntryFilter,
    ) -> EngineResult<Vec<LedgerEntry>> {
        if !actor.is_admin() {
            return Err(crate::errors::unauthorized("the admin role"));
        }
        Ok(self.ledger.read(filter).await?)
    }
}
