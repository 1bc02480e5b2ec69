//! Read-side filters, pagination, and project snapshots.
//!
//! The engine's query methods are assembled from the pure pieces here:
//! filter predicates, offset/limit paging, role-scoped visibility, and
//! [`ProjectSnapshot`], which merges a project record with the share
//! inventory's authoritative counters at a single instant.

use crate::investment::{Investment, InvestmentStatus};
use crate::project::{Category, Project, ProjectStatus};
use crate::types::{Actor, Money, ProjectId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Offset/limit paging. The limit is capped so a caller cannot demand
/// an unbounded page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Items to skip.
    pub offset: usize,
    /// Maximum items to return.
    pub limit: usize,
}

impl Page {
    /// The largest page a caller may request.
    pub const MAX_LIMIT: usize = 100;

    /// A page starting at `offset` returning at most `limit` items.
    #[must_use]
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.min(Self::MAX_LIMIT),
        }
    }

    /// Applies this page to a collected result set.
    pub fn apply<T>(self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.offset).take(self.limit).collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

/// Criteria for listing projects. All fields are conjunctive; a `None`
/// matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectFilter {
    /// Restrict to one status.
    pub status: Option<ProjectStatus>,
    /// Restrict to one category.
    pub category: Option<Category>,
    /// Restrict to one developer's projects.
    pub developer_id: Option<UserId>,
    /// Lowest acceptable per-share price.
    pub min_share_price: Option<Money>,
    /// Highest acceptable per-share price.
    pub max_share_price: Option<Money>,
    /// Lowest acceptable funding goal.
    pub min_total_value: Option<Money>,
    /// Highest acceptable funding goal.
    pub max_total_value: Option<Money>,
    /// Lowest acceptable funding progress, in percent.
    pub min_progress: Option<f64>,
    /// Highest acceptable funding progress, in percent.
    pub max_progress: Option<f64>,
}

impl ProjectFilter {
    /// Whether `project` satisfies the record-level criteria. Progress
    /// bounds need inventory counters and are checked per snapshot by
    /// [`ProjectFilter::progress_matches`].
    pub fn matches(&self, project: &Project) -> bool {
        self.status.is_none_or(|s| project.status == s)
            && self.category.is_none_or(|c| project.category == c)
            && self
                .developer_id
                .as_ref()
                .is_none_or(|d| &project.developer_id == d)
            && self
                .min_share_price
                .is_none_or(|min| project.per_share_price >= min)
            && self
                .max_share_price
                .is_none_or(|max| project.per_share_price <= max)
            && self
                .min_total_value
                .is_none_or(|min| project.total_value >= min)
            && self
                .max_total_value
                .is_none_or(|max| project.total_value <= max)
    }

    /// Whether a composed snapshot satisfies the progress bounds.
    pub fn progress_matches(&self, snapshot: &ProjectSnapshot) -> bool {
        self.min_progress
            .is_none_or(|min| snapshot.funding_progress >= min)
            && self
                .max_progress
                .is_none_or(|max| snapshot.funding_progress <= max)
    }
}

/// Criteria for listing investments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentFilter {
    /// Restrict to one status.
    pub status: Option<InvestmentStatus>,
    /// Restrict to one project.
    pub project_id: Option<ProjectId>,
    /// Restrict to one investor.
    pub investor_id: Option<UserId>,
}

impl InvestmentFilter {
    /// Whether `investment` satisfies this filter.
    pub fn matches(&self, investment: &Investment) -> bool {
        self.status.is_none_or(|s| investment.status == s)
            && self
                .project_id
                .as_ref()
                .is_none_or(|p| &investment.project_id == p)
            && self
                .investor_id
                .as_ref()
                .is_none_or(|i| &investment.investor_id == i)
    }
}

/// Whether `viewer` may see `project` at all. Approved and archived
/// projects are public; everything else is visible only to the owning
/// developer and admins.
pub fn project_visible(project: &Project, viewer: Option<&Actor>) -> bool {
    if matches!(
        project.status,
        ProjectStatus::Approved | ProjectStatus::Archived
    ) {
        return true;
    }
    viewer.is_some_and(|actor| actor.is_admin() || actor.user_id == project.developer_id)
}

/// Whether `viewer` may read the project's restricted sub-document.
pub fn restricted_visible(project: &Project, viewer: Option<&Actor>) -> bool {
    viewer.is_some_and(|actor| actor.is_admin() || actor.user_id == project.developer_id)
}

/// A point-in-time view of a project: the record plus the inventory's
/// counters and the derived funding metrics, with the restricted
/// sub-document already redacted for the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    /// The project record, possibly with `restricted` stripped.
    pub project: Project,
    /// Shares sold, from the inventory.
    pub shares_sold: u64,
    /// Shares held by open reservations, from the inventory.
    pub shares_reserved: u64,
    /// Shares still available to new requests.
    pub remaining_shares: u64,
    /// Sold shares as a percentage of the pool.
    pub funding_progress: f64,
    /// Whole days until the funding window closes.
    pub days_remaining: u64,
    /// When the counters were read.
    pub taken_at: Timestamp,
}

impl ProjectSnapshot {
    /// Composes a snapshot for `viewer`. The counters must come from
    /// one inventory read so they are mutually consistent.
    pub fn compose(
        project: &Project,
        shares_sold: u64,
        shares_reserved: u64,
        viewer: Option<&Actor>,
        now: Timestamp,
    ) -> Self {
        let mut project = project.clone();
        if !restricted_visible(&project, viewer) {
            project.restricted = None;
        }
        let total = project.total_shares.get();
        let remaining_shares = total.saturating_sub(shares_sold + shares_reserved);
        let funding_progress = project.funding_progress(shares_sold);
        let days_remaining = project.days_remaining(now);
        Self {
            project,
            shares_sold,
            shares_reserved,
            remaining_shares,
            funding_progress,
            days_remaining,
            taken_at: now,
        }
    }

    /// The project's funding goal.
    pub fn total_value(&self) -> Money {
        self.project.total_value
    }

    /// The fixed per-share price.
    pub fn per_share_price(&self) -> Money {
        self.project.per_share_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{NewProject, RestrictedDetails};
    use crate::types::{Role, ShareCount};
    use rust_decimal_macros::dec;

    fn project_with_status(status: ProjectStatus) -> Project {
        let mut project = Project::create(
            ProjectId::try_new("PRJ-1").unwrap(),
            UserId::try_new("dev-1").unwrap(),
            NewProject {
                title: "Wind Park".to_string(),
                description: "Coastal wind park with grid connection secured and permits granted."
                    .to_string(),
                short_description: "Coastal wind park".to_string(),
                category: Category::Energy,
                total_value: Money::new(dec!(50000.00)).unwrap(),
                total_shares: ShareCount::try_new(500).unwrap(),
                duration_days: 60,
                images: vec!["https://img.example/wind.jpg".to_string()],
                thumbnail_url: None,
                has_3d_model: false,
                model_3d_url: None,
                is_3d_public: false,
                has_restricted_fields: true,
                restricted: Some(RestrictedDetails {
                    business_plan: Some("confidential".to_string()),
                    ..RestrictedDetails::default()
                }),
            },
            Timestamp::now(),
        )
        .unwrap();
        project.status = status;
        project
    }

    fn actor(id: &str, role: Role) -> Actor {
        Actor {
            user_id: UserId::try_new(id).unwrap(),
            role,
        }
    }

    #[test]
    fn page_caps_limit() {
        let page = Page::new(0, 10_000);
        assert_eq!(page.limit, Page::MAX_LIMIT);
    }

    #[test]
    fn page_applies_offset_and_limit() {
        let items: Vec<u32> = (0..10).collect();
        let page = Page::new(3, 4);
        assert_eq!(page.apply(items), vec![3, 4, 5, 6]);
    }

    #[test]
    fn draft_hidden_from_strangers() {
        let project = project_with_status(ProjectStatus::Draft);
        assert!(!project_visible(&project, None));
        assert!(!project_visible(
            &project,
            Some(&actor("other", Role::Investor))
        ));
        assert!(project_visible(&project, Some(&actor("dev-1", Role::Developer))));
        assert!(project_visible(&project, Some(&actor("admin", Role::Admin))));
    }

    #[test]
    fn approved_is_public() {
        let project = project_with_status(ProjectStatus::Approved);
        assert!(project_visible(&project, None));
    }

    #[test]
    fn snapshot_redacts_restricted_for_investors() {
        let project = project_with_status(ProjectStatus::Approved);
        let now = Timestamp::now();
        let public = ProjectSnapshot::compose(
            &project,
            100,
            50,
            Some(&actor("investor-1", Role::Investor)),
            now,
        );
        assert!(public.project.restricted.is_none());
        assert!(public.project.has_restricted_fields);

        let owner =
            ProjectSnapshot::compose(&project, 100, 50, Some(&actor("dev-1", Role::Developer)), now);
        assert!(owner.project.restricted.is_some());
    }

    #[test]
    fn snapshot_counters_are_consistent() {
        let project = project_with_status(ProjectStatus::Approved);
        let snapshot = ProjectSnapshot::compose(&project, 100, 50, None, Timestamp::now());
        assert_eq!(snapshot.shares_sold, 100);
        assert_eq!(snapshot.shares_reserved, 50);
        assert_eq!(snapshot.remaining_shares, 350);
        assert!((snapshot.funding_progress - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn filters_are_conjunctive() {
        let project = project_with_status(ProjectStatus::Approved);
        let filter = ProjectFilter {
            status: Some(ProjectStatus::Approved),
            category: Some(Category::Energy),
            ..ProjectFilter::default()
        };
        assert!(filter.matches(&project));

        let filter = ProjectFilter {
            status: Some(ProjectStatus::Approved),
            category: Some(Category::Retail),
            ..ProjectFilter::default()
        };
        assert!(!filter.matches(&project));

        let filter = ProjectFilter {
            min_share_price: Some(Money::new(dec!(150.00)).unwrap()),
            ..ProjectFilter::default()
        };
        assert!(!filter.matches(&project));
        let filter = ProjectFilter {
            max_total_value: Some(Money::new(dec!(60000.00)).unwrap()),
            ..ProjectFilter::default()
        };
        assert!(filter.matches(&project));
    }
}
