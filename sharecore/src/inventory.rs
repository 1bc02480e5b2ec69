//! Share inventory manager.
//!
//! Owns the authoritative `shares_sold` counter and the open
//! reservations per project, and arbitrates concurrent reservation
//! attempts. The invariant enforced atomically per project is:
//!
//! `shares_sold + Σ(open reservations) <= total_shares`
//!
//! All mutations to a single project's counters are linearized through
//! that project's mutex; operations on different projects proceed in
//! parallel. Reservations are explicit entities with their own expiry
//! and are reconciled by [`ShareInventory::sweep_project`], never
//! silently dropped.
//!
//! Lock order: the reservation index may be acquired before a project
//! slot mutex, never after one. A fresh reservation is indexed before
//! its slot mutex is dropped, so the id is actionable the moment
//! `reserve` returns.

use crate::errors::{InventoryError, InventoryResult};
use crate::types::{InvestmentId, ProjectId, ReservationId, ShareCount, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// A transient claim on share inventory created when an investment is
/// approved. Not yet a permanent debit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    /// The reservation's id.
    pub id: ReservationId,
    /// The investment holding the claim.
    pub investment_id: InvestmentId,
    /// The number of shares claimed.
    pub shares: ShareCount,
    /// When the claim lapses if never committed or released.
    pub expires_at: Timestamp,
}

/// A reservation released by the expiry sweep, reported back to the
/// engine so the owning investment can be transitioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredReservation {
    /// The released reservation.
    pub reservation_id: ReservationId,
    /// The investment that held it.
    pub investment_id: InvestmentId,
    /// The project whose pool it claimed.
    pub project_id: ProjectId,
}

#[derive(Debug)]
struct Slot {
    total_shares: u64,
    shares_sold: u64,
    reservations: HashMap<ReservationId, Reservation>,
}

impl Slot {
    fn reserved(&self) -> u64 {
        self.reservations.values().map(|r| r.shares.get()).sum()
    }

    fn remaining(&self) -> u64 {
        self.total_shares - self.shares_sold - self.reserved()
    }
}

/// Thread-safe share inventory with per-project linearization.
#[derive(Clone, Default)]
pub struct ShareInventory {
    // Read-mostly map of project id to its serialization point.
    projects: Arc<RwLock<HashMap<ProjectId, Arc<Mutex<Slot>>>>>,
    // Maps reservation ids to the project whose slot holds them.
    index: Arc<Mutex<HashMap<ReservationId, ProjectId>>>,
}

impl ShareInventory {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a project's share pool. A no-op when the project is
    /// already registered.
    pub fn register_project(&self, project_id: ProjectId, total_shares: ShareCount) {
        let mut projects = self.projects.write();
        projects.entry(project_id).or_insert_with(|| {
            Arc::new(Mutex::new(Slot {
                total_shares: total_shares.get(),
                shares_sold: 0,
                reservations: HashMap::new(),
            }))
        });
    }

    fn slot(&self, project_id: &ProjectId) -> InventoryResult<Arc<Mutex<Slot>>> {
        let projects = self.projects.read();
        projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| InventoryError::UnknownProject(project_id.clone()))
    }

    /// Claims `shares` from the project's pool.
    ///
    /// The capacity check and the insertion happen under the project's
    /// mutex, so two concurrent calls can never both succeed when only
    /// one fits.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientShares` when the claim would overdraw
    /// `total_shares - shares_sold - open reservations`.
    pub fn reserve(
        &self,
        project_id: &ProjectId,
        investment_id: InvestmentId,
        shares: ShareCount,
        expires_at: Timestamp,
    ) -> InventoryResult<ReservationId> {
        let slot = self.slot(project_id)?;
        let reservation_id = ReservationId::new();
        let mut index = self.index.lock();
        let mut slot = slot.lock();
        let remaining = slot.remaining();
        if shares.get() > remaining {
            return Err(InventoryError::InsufficientShares {
                project_id: project_id.clone(),
                requested: shares.get(),
                remaining,
            });
        }
        slot.reservations.insert(
            reservation_id,
            Reservation {
                id: reservation_id,
                investment_id,
                shares,
                expires_at,
            },
        );
        // Indexed before the slot mutex drops: a concurrent release or
        // commit on the fresh id must find it.
        index.insert(reservation_id, project_id.clone());
        Ok(reservation_id)
    }

    /// Turns a reservation into a permanent debit: the claimed shares
    /// move into `shares_sold` and the reservation is dropped.
    pub fn commit(&self, reservation_id: ReservationId) -> InventoryResult<()> {
        self.take_reservation(reservation_id, |slot, reservation| {
            slot.shares_sold += reservation.shares.get();
        })
    }

    /// Drops a reservation with no counter change. Used for rejection,
    /// expiry, and cancellation before payment.
    pub fn release(&self, reservation_id: ReservationId) -> InventoryResult<()> {
        self.take_reservation(reservation_id, |_, _| {})
    }

    /// Restamps a reservation's expiry. Used when a payment attempt
    /// needs to hold the claim past the stamped approval deadline.
    pub fn extend(
        &self,
        reservation_id: ReservationId,
        expires_at: Timestamp,
    ) -> InventoryResult<()> {
        let project_id = self
            .index
            .lock()
            .get(&reservation_id)
            .cloned()
            .ok_or(InventoryError::ReservationNotFound(reservation_id))?;
        let slot = self.slot(&project_id)?;
        let mut slot = slot.lock();
        let reservation = slot
            .reservations
            .get_mut(&reservation_id)
            .ok_or(InventoryError::ReservationNotFound(reservation_id))?;
        reservation.expires_at = expires_at;
        Ok(())
    }

    fn take_reservation(
        &self,
        reservation_id: ReservationId,
        apply: impl FnOnce(&mut Slot, &Reservation),
    ) -> InventoryResult<()> {
        let project_id = self
            .index
            .lock()
            .remove(&reservation_id)
            .ok_or(InventoryError::ReservationNotFound(reservation_id))?;
        let slot = self.slot(&project_id)?;
        let mut slot = slot.lock();
        let reservation = slot
            .reservations
            .remove(&reservation_id)
            .ok_or(InventoryError::ReservationNotFound(reservation_id))?;
        apply(&mut slot, &reservation);
        Ok(())
    }

    /// Returns previously sold shares to the pool. Used for
    /// post-completion reversal, refund, and withdrawal.
    pub fn credit(&self, project_id: &ProjectId, shares: ShareCount) -> InventoryResult<()> {
        let slot = self.slot(project_id)?;
        let mut slot = slot.lock();
        slot.shares_sold = slot.shares_sold.saturating_sub(shares.get());
        Ok(())
    }

    /// Changes the project's total share pool, used when an approved
    /// edit request resizes a project.
    ///
    /// # Errors
    ///
    /// Returns `ShrinkBelowAllocation` when the new total cannot cover
    /// shares already sold plus open reservations.
    pub fn resize(&self, project_id: &ProjectId, new_total: ShareCount) -> InventoryResult<()> {
        let slot = self.slot(project_id)?;
        let mut slot = slot.lock();
        let allocated = slot.shares_sold + slot.reserved();
        if new_total.get() < allocated {
            return Err(InventoryError::ShrinkBelowAllocation {
                project_id: project_id.clone(),
                requested_total: new_total.get(),
                allocated,
            });
        }
        slot.total_shares = new_total.get();
        Ok(())
    }

    /// Shares sold for a project.
    pub fn shares_sold(&self, project_id: &ProjectId) -> InventoryResult<u64> {
        Ok(self.slot(project_id)?.lock().shares_sold)
    }

    /// Shares neither sold nor claimed by an open reservation.
    pub fn remaining(&self, project_id: &ProjectId) -> InventoryResult<u64> {
        Ok(self.slot(project_id)?.lock().remaining())
    }

    /// Total shares currently claimed by open reservations.
    pub fn open_reservations(&self, project_id: &ProjectId) -> InventoryResult<u64> {
        Ok(self.slot(project_id)?.lock().reserved())
    }

    /// Releases every reservation of one project past its expiry and
    /// reports them so the engine can transition the owning
    /// investments. Scoped to a single project so the caller can hold
    /// that project's serialization point across the sweep, keeping
    /// expiry ordered against user-triggered transitions. An unknown
    /// project sweeps nothing.
    pub fn sweep_project(&self, project_id: &ProjectId, now: Timestamp) -> Vec<ExpiredReservation> {
        let Ok(slot) = self.slot(project_id) else {
            return Vec::new();
        };
        let mut index = self.index.lock();
        let mut slot = slot.lock();
        let lapsed: Vec<ReservationId> = slot
            .reservations
            .values()
            .filter(|r| r.expires_at < now)
            .map(|r| r.id)
            .collect();
        let mut expired = Vec::with_capacity(lapsed.len());
        for reservation_id in lapsed {
            if let Some(reservation) = slot.reservations.remove(&reservation_id) {
                index.remove(&reservation_id);
                expired.push(ExpiredReservation {
                    reservation_id,
                    investment_id: reservation.investment_id,
                    project_id: project_id.clone(),
                });
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn shares(n: u64) -> ShareCount {
        ShareCount::try_new(n).unwrap()
    }

    fn project(id: &str) -> ProjectId {
        ProjectId::try_new(id).unwrap()
    }

    fn investment(id: &str) -> InvestmentId {
        InvestmentId::try_new(id).unwrap()
    }

    fn inventory_with(id: &str, total: u64) -> ShareInventory {
        let inventory = ShareInventory::new();
        inventory.register_project(project(id), shares(total));
        inventory
    }

    fn far_future() -> Timestamp {
        Timestamp::now().plus(Duration::days(7))
    }

    #[test]
    fn reserve_rejects_overdraw() {
        let inventory = inventory_with("PRJ-1", 100);
        let p = project("PRJ-1");

        inventory
            .reserve(&p, investment("INV-1"), shares(60), far_future())
            .unwrap();
        let err = inventory
            .reserve(&p, investment("INV-2"), shares(50), far_future())
            .unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientShares {
                project_id: p.clone(),
                requested: 50,
                remaining: 40,
            }
        );
        // A claim that fits the remainder still succeeds.
        inventory
            .reserve(&p, investment("INV-3"), shares(40), far_future())
            .unwrap();
        assert_eq!(inventory.remaining(&p).unwrap(), 0);
    }

    #[test]
    fn commit_moves_claim_into_sold() {
        let inventory = inventory_with("PRJ-1", 100);
        let p = project("PRJ-1");

        let reservation = inventory
            .reserve(&p, investment("INV-1"), shares(30), far_future())
            .unwrap();
        assert_eq!(inventory.shares_sold(&p).unwrap(), 0);
        inventory.commit(reservation).unwrap();
        assert_eq!(inventory.shares_sold(&p).unwrap(), 30);
        assert_eq!(inventory.open_reservations(&p).unwrap(), 0);
        assert_eq!(inventory.remaining(&p).unwrap(), 70);
    }

    #[test]
    fn release_returns_claim_without_selling() {
        let inventory = inventory_with("PRJ-1", 100);
        let p = project("PRJ-1");

        let reservation = inventory
            .reserve(&p, investment("INV-1"), shares(30), far_future())
            .unwrap();
        inventory.release(reservation).unwrap();
        assert_eq!(inventory.shares_sold(&p).unwrap(), 0);
        assert_eq!(inventory.remaining(&p).unwrap(), 100);
    }

    #[test]
    fn commit_then_credit_restores_sold_exactly() {
        let inventory = inventory_with("PRJ-1", 1000);
        let p = project("PRJ-1");

        let reservation = inventory
            .reserve(&p, investment("INV-1"), shares(50), far_future())
            .unwrap();
        inventory.commit(reservation).unwrap();
        assert_eq!(inventory.shares_sold(&p).unwrap(), 50);
        inventory.credit(&p, shares(50)).unwrap();
        assert_eq!(inventory.shares_sold(&p).unwrap(), 0);
        assert_eq!(inventory.remaining(&p).unwrap(), 1000);
    }

    #[test]
    fn unknown_reservation_is_reported() {
        let inventory = inventory_with("PRJ-1", 100);
        let bogus = ReservationId::new();
        assert_eq!(
            inventory.commit(bogus).unwrap_err(),
            InventoryError::ReservationNotFound(bogus)
        );
        assert_eq!(
            inventory.release(bogus).unwrap_err(),
            InventoryError::ReservationNotFound(bogus)
        );
    }

    #[test]
    fn double_commit_is_reported() {
        let inventory = inventory_with("PRJ-1", 100);
        let p = project("PRJ-1");
        let reservation = inventory
            .reserve(&p, investment("INV-1"), shares(10), far_future())
            .unwrap();
        inventory.commit(reservation).unwrap();
        assert!(matches!(
            inventory.commit(reservation),
            Err(InventoryError::ReservationNotFound(_))
        ));
    }

    #[test]
    fn resize_respects_allocation() {
        let inventory = inventory_with("PRJ-1", 100);
        let p = project("PRJ-1");
        let reservation = inventory
            .reserve(&p, investment("INV-1"), shares(40), far_future())
            .unwrap();
        inventory.commit(reservation).unwrap();
        inventory
            .reserve(&p, investment("INV-2"), shares(20), far_future())
            .unwrap();

        assert!(matches!(
            inventory.resize(&p, shares(50)),
            Err(InventoryError::ShrinkBelowAllocation { allocated: 60, .. })
        ));
        inventory.resize(&p, shares(60)).unwrap();
        assert_eq!(inventory.remaining(&p).unwrap(), 0);
        inventory.resize(&p, shares(200)).unwrap();
        assert_eq!(inventory.remaining(&p).unwrap(), 140);
    }

    #[test]
    fn sweep_releases_only_lapsed_reservations() {
        let inventory = inventory_with("PRJ-1", 100);
        let p = project("PRJ-1");
        let now = Timestamp::now();

        inventory
            .reserve(
                &p,
                investment("INV-old"),
                shares(30),
                now.plus(Duration::hours(-1)),
            )
            .unwrap();
        let kept = inventory
            .reserve(
                &p,
                investment("INV-new"),
                shares(20),
                now.plus(Duration::hours(1)),
            )
            .unwrap();

        let expired = inventory.sweep_project(&p, now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].investment_id, investment("INV-old"));
        assert_eq!(inventory.open_reservations(&p).unwrap(), 20);
        // The surviving reservation is still committable.
        inventory.commit(kept).unwrap();
        assert_eq!(inventory.shares_sold(&p).unwrap(), 20);
    }

    #[test]
    fn fresh_reservation_is_visible_across_threads() {
        let inventory = inventory_with("PRJ-1", 100);
        let p = project("PRJ-1");
        let (tx, rx) = std::sync::mpsc::channel();

        let reserving = {
            let inventory = inventory.clone();
            std::thread::spawn(move || {
                let id = inventory
                    .reserve(&p, investment("INV-1"), shares(10), far_future())
                    .unwrap();
                tx.send(id).unwrap();
            })
        };
        // The id must be releasable the moment another thread sees it.
        let id = rx.recv().unwrap();
        inventory.release(id).unwrap();
        reserving.join().unwrap();
        assert_eq!(
            inventory.remaining(&project("PRJ-1")).unwrap(),
            100
        );
    }

    #[test]
    fn concurrent_reserves_never_oversell() {
        let inventory = inventory_with("PRJ-1", 1000);
        let p = project("PRJ-1");

        let mut handles = Vec::new();
        for i in 0..2 {
            let inventory = inventory.clone();
            let p = p.clone();
            handles.push(std::thread::spawn(move || {
                inventory.reserve(
                    &p,
                    investment(&format!("INV-{i}")),
                    shares(700),
                    far_future(),
                )
            }));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(InventoryError::InsufficientShares { .. })))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(inventory.open_reservations(&p).unwrap(), 700);
    }

    #[test]
    fn operations_on_different_projects_are_independent() {
        let inventory = ShareInventory::new();
        inventory.register_project(project("PRJ-1"), shares(10));
        inventory.register_project(project("PRJ-2"), shares(10));

        inventory
            .reserve(
                &project("PRJ-1"),
                investment("INV-1"),
                shares(10),
                far_future(),
            )
            .unwrap();
        // PRJ-2's pool is untouched by PRJ-1's exhaustion.
        inventory
            .reserve(
                &project("PRJ-2"),
                investment("INV-2"),
                shares(10),
                far_future(),
            )
            .unwrap();
    }
}
