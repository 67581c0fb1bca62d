//! Reservation lifecycle.
//!
//! ```text
//! PENDING --confirm--> CONFIRMED
//! PENDING --cancel---> CANCELLED
//! PENDING --timer----> EXPIRED
//! ```
//!
//! Every transition is a compare-and-transition done inside the item's ledger
//! scope: the active index is re-checked under the scope, so whichever of
//! confirm / cancel / expiry gets there first wins and the others see
//! `ReservationNotActive`.
//!
//! Lock order is item scope → active index. Events go out after the scope is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use stockhold_core::{Clock, ItemId, ReservationId};

use crate::error::{ErrorKind, InventoryError, InventoryResult};
use crate::events::{EventPublisher, InventoryEvent, ReservationChanged, ReservationCreated};
use crate::ledger::{ItemTxn, StockLedger};
use crate::reorder::ReorderTrigger;
use crate::reservation::{Reservation, ReservationPolicy, ReservationRequest, ReservationStatus};
use crate::scheduler::{ExpiryCallback, ExpiryScheduler};
use crate::store::Store;

/// What a confirm attempt did inside the item scope.
enum ConfirmOutcome {
    Confirmed(Reservation),
    /// Deadline had already passed; stock was released instead.
    Expired(Reservation),
}

pub struct ReservationManager {
    me: Weak<ReservationManager>,
    ledger: Arc<StockLedger>,
    reservations: Arc<dyn Store<ReservationId, Reservation>>,
    active: Mutex<HashMap<ReservationId, Reservation>>,
    scheduler: Arc<dyn ExpiryScheduler>,
    reorder: Arc<ReorderTrigger>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    policy: ReservationPolicy,
}

impl core::fmt::Debug for ReservationManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReservationManager")
            .field("active", &self.index().len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ReservationManager {
    /// Expiry callbacks hold a weak reference back to the manager, hence `Arc<Self>`.
    pub fn new(
        ledger: Arc<StockLedger>,
        reservations: Arc<dyn Store<ReservationId, Reservation>>,
        scheduler: Arc<dyn ExpiryScheduler>,
        reorder: Arc<ReorderTrigger>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        policy: ReservationPolicy,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            ledger,
            reservations,
            active: Mutex::new(HashMap::new()),
            scheduler,
            reorder,
            publisher,
            clock,
            policy,
        })
    }

    pub fn policy(&self) -> &ReservationPolicy {
        &self.policy
    }

    fn index(&self) -> MutexGuard<'_, HashMap<ReservationId, Reservation>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold `quantity` units of `item_id` until `expiry_time`.
    pub fn reserve(
        &self,
        item_id: &ItemId,
        quantity: i64,
        expiry_time: DateTime<Utc>,
    ) -> InventoryResult<ReservationId> {
        self.place(ReservationRequest::new(item_id.clone(), quantity, expiry_time))
            .map(|res| res.id)
    }

    pub fn place(&self, request: ReservationRequest) -> InventoryResult<Reservation> {
        if request.quantity <= 0 {
            return Err(InventoryError::invalid_quantity(format!(
                "reservation quantity must be positive (got {})",
                request.quantity
            )));
        }
        self.policy.check_expiry(request.expiry_time, self.clock.now())?;

        let reservation = self.ledger.with_item(&request.item_id, |txn| {
            // The ledger mutation lands first; if bookkeeping fails below, the scope rolls it back.
            let allocations = txn.reserve(request.quantity)?;
            txn.commit()?;

            let reservation = Reservation::pending(ReservationId::new(), &request, allocations, txn.now());
            self.reservations.upsert(reservation.id, reservation.clone())?;
            self.index().insert(reservation.id, reservation.clone());
            self.arm(&reservation);
            Ok(reservation)
        })?;

        info!(
            reservation_id = %reservation.id,
            item_id = %reservation.item_id,
            quantity = reservation.quantity,
            expiry_time = %reservation.expiry_time,
            "reservation created"
        );
        self.publisher
            .publish(InventoryEvent::ReservationCreated(ReservationCreated::from_reservation(&reservation)));
        self.evaluate_reorder(&reservation.item_id);

        Ok(reservation)
    }

    /// `true` if this call confirmed the reservation. Unknown, already resolved and
    /// overdue reservations yield `false`; only invariant and store failures are `Err`.
    pub fn confirm(&self, id: ReservationId) -> InventoryResult<bool> {
        signal_as_false(id, "confirm", self.try_confirm(id))
    }

    /// `true` if this call cancelled the reservation.
    pub fn cancel(&self, id: ReservationId) -> InventoryResult<bool> {
        signal_as_false(id, "cancel", self.try_cancel(id))
    }

    /// `true` if this call expired the reservation. Invoked by the expiry timer.
    pub fn expire(&self, id: ReservationId) -> InventoryResult<bool> {
        signal_as_false(id, "expire", self.try_expire(id))
    }

    pub fn try_confirm(&self, id: ReservationId) -> InventoryResult<Reservation> {
        let item_id = self.active_entry(id)?.item_id;

        let outcome = self.ledger.with_item(&item_id, |txn| {
            let current = self.active_entry(id)?;
            let now = txn.now();

            if current.is_overdue(now) {
                txn.release(&current.allocations)?;
                let expired = self.resolve_in_scope(txn, &current, ReservationStatus::Expired)?;
                return Ok(ConfirmOutcome::Expired(expired));
            }

            txn.allocate(&current.allocations)?;
            let confirmed = self.resolve_in_scope(txn, &current, ReservationStatus::Confirmed)?;
            Ok(ConfirmOutcome::Confirmed(confirmed))
        })?;

        match outcome {
            ConfirmOutcome::Confirmed(res) => {
                info!(reservation_id = %res.id, item_id = %res.item_id, quantity = res.quantity, "reservation confirmed");
                self.publisher
                    .publish(InventoryEvent::ReservationConfirmed(ReservationChanged::from_reservation(&res)));
                self.evaluate_reorder(&res.item_id);
                Ok(res)
            }
            ConfirmOutcome::Expired(res) => {
                info!(
                    reservation_id = %res.id,
                    item_id = %res.item_id,
                    expiry_time = %res.expiry_time,
                    "confirm arrived after deadline; reservation expired"
                );
                self.publisher
                    .publish(InventoryEvent::ReservationExpired(ReservationChanged::from_reservation(&res)));
                Err(InventoryError::ReservationExpired(res.id))
            }
        }
    }

    pub fn try_cancel(&self, id: ReservationId) -> InventoryResult<Reservation> {
        let res = self.release_active(id, ReservationStatus::Cancelled)?;
        info!(reservation_id = %res.id, item_id = %res.item_id, quantity = res.quantity, "reservation cancelled");
        self.publisher
            .publish(InventoryEvent::ReservationCancelled(ReservationChanged::from_reservation(&res)));
        Ok(res)
    }

    pub fn try_expire(&self, id: ReservationId) -> InventoryResult<Reservation> {
        let res = self.release_active(id, ReservationStatus::Expired)?;
        info!(reservation_id = %res.id, item_id = %res.item_id, quantity = res.quantity, "reservation expired");
        self.publisher
            .publish(InventoryEvent::ReservationExpired(ReservationChanged::from_reservation(&res)));
        Ok(res)
    }

    /// Stored reservation in any state.
    pub fn get(&self, id: ReservationId) -> InventoryResult<Option<Reservation>> {
        Ok(self.reservations.get(&id)?)
    }

    /// PENDING reservations, oldest first.
    pub fn active(&self) -> Vec<Reservation> {
        let mut out: Vec<_> = self.index().values().cloned().collect();
        out.sort_by_key(|r| (r.created_at, r.id));
        out
    }

    /// Units held by PENDING reservations of `item_id`.
    pub fn pending_quantity(&self, item_id: &ItemId) -> i64 {
        self.index()
            .values()
            .filter(|r| &r.item_id == item_id)
            .map(|r| r.quantity)
            .sum()
    }

    /// Expire every active reservation whose deadline has passed. Returns how many expired.
    pub fn expire_overdue(&self) -> InventoryResult<usize> {
        let now = self.clock.now();
        let overdue: Vec<ReservationId> = self
            .index()
            .values()
            .filter(|r| r.is_overdue(now))
            .map(|r| r.id)
            .collect();

        let mut expired = 0;
        for id in overdue {
            if self.expire(id)? {
                expired += 1;
            }
        }
        if expired > 0 {
            info!(expired, "overdue reservations expired");
        }
        Ok(expired)
    }

    /// Reload PENDING reservations from the store and re-arm their timers.
    pub fn restore_active(&self) -> InventoryResult<usize> {
        let pending: Vec<Reservation> = self
            .reservations
            .list()?
            .into_iter()
            .filter(Reservation::is_active)
            .collect();

        let mut restored = 0;
        for res in pending {
            let fresh = self.index().insert(res.id, res.clone()).is_none();
            if fresh {
                self.arm(&res);
                restored += 1;
            }
        }
        info!(restored, "active reservations restored");
        Ok(restored)
    }

    fn arm(&self, res: &Reservation) {
        let me = self.me.clone();
        let callback: ExpiryCallback = Arc::new(move |id| {
            if let Some(manager) = me.upgrade() {
                manager.on_deadline(id);
            }
        });
        self.scheduler.schedule(res.id, res.expiry_time, callback);
    }

    fn on_deadline(&self, id: ReservationId) {
        match self.expire(id) {
            Ok(true) => {}
            Ok(false) => debug!(reservation_id = %id, "expiry timer found reservation already resolved"),
            Err(err) if err.is_fatal() => {
                error!(alert = true, reservation_id = %id, error = %err, "reservation expiry failed")
            }
            Err(err) => warn!(reservation_id = %id, error = %err, "reservation expiry failed; will retry on next sweep"),
        }
    }

    /// Release stock and move an active reservation to `to` (CANCELLED or EXPIRED).
    fn release_active(&self, id: ReservationId, to: ReservationStatus) -> InventoryResult<Reservation> {
        let item_id = self.active_entry(id)?.item_id;
        self.ledger.with_item(&item_id, |txn| {
            let current = self.active_entry(id)?;
            txn.release(&current.allocations)?;
            self.resolve_in_scope(txn, &current, to)
        })
    }

    /// Commit the ledger change, then record the terminal state. Must run inside the item scope.
    fn resolve_in_scope(
        &self,
        txn: &mut ItemTxn<'_>,
        current: &Reservation,
        to: ReservationStatus,
    ) -> InventoryResult<Reservation> {
        let next = current.resolve(to, txn.now())?;
        txn.commit()?;
        self.reservations.upsert(next.id, next.clone())?;
        self.index().remove(&next.id);
        self.scheduler.cancel(next.id);
        Ok(next)
    }

    fn active_entry(&self, id: ReservationId) -> InventoryResult<Reservation> {
        if let Some(res) = self.index().get(&id) {
            return Ok(res.clone());
        }
        Err(match self.reservations.get(&id)? {
            Some(res) => InventoryError::ReservationNotActive { id, status: res.status },
            None => InventoryError::NotFound(id),
        })
    }

    fn evaluate_reorder(&self, item_id: &ItemId) {
        if let Err(err) = self.reorder.evaluate(item_id) {
            warn!(item_id = %item_id, error = %err, "reorder evaluation failed");
        }
    }
}

fn signal_as_false(id: ReservationId, op: &'static str, result: InventoryResult<Reservation>) -> InventoryResult<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::Signal => {
            debug!(reservation_id = %id, op, reason = %err, "reservation transition was a no-op");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration as StdDuration;

    use chrono::Duration;
    use proptest::prelude::*;
    use stockhold_core::{LocationId, ManualClock, SupplierId, SystemClock};

    use crate::events::testing::RecordingPublisher;
    use crate::record::{StockSettings, StockStatus};
    use crate::reorder::ReorderRule;
    use crate::scheduler::{ManualExpiryScheduler, ThreadExpiryScheduler};
    use crate::store::{InMemoryStockStore, InMemoryStore, StoreError};

    /// Reservation store whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryStore<ReservationId, Reservation>,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn fail_writes(&self, on: bool) {
            self.failing.store(on, Ordering::SeqCst);
        }
    }

    impl Store<ReservationId, Reservation> for FlakyStore {
        fn get(&self, key: &ReservationId) -> Result<Option<Reservation>, StoreError> {
            self.inner.get(key)
        }

        fn upsert(&self, key: ReservationId, value: Reservation) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::unavailable("reservation store offline"));
            }
            self.inner.upsert(key, value)
        }

        fn remove(&self, key: &ReservationId) -> Result<Option<Reservation>, StoreError> {
            self.inner.remove(key)
        }

        fn list(&self) -> Result<Vec<Reservation>, StoreError> {
            self.inner.list()
        }
    }

    struct Fixture {
        manager: Arc<ReservationManager>,
        ledger: Arc<StockLedger>,
        store: Arc<FlakyStore>,
        scheduler: Arc<ManualExpiryScheduler>,
        publisher: Arc<RecordingPublisher>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::starting_now());
            let ledger = Arc::new(StockLedger::new(Arc::new(InMemoryStockStore::new()), clock.clone()));
            ledger
                .provision(&item(), &loc(), &StockSettings::new(10).with_reorder(3, 20))
                .unwrap();
            Self::with_ledger(ledger, clock, Arc::new(FlakyStore::default()))
        }

        fn with_ledger(ledger: Arc<StockLedger>, clock: Arc<ManualClock>, store: Arc<FlakyStore>) -> Self {
            let publisher = Arc::new(RecordingPublisher::default());
            let scheduler = Arc::new(ManualExpiryScheduler::new());
            let reorder = Arc::new(ReorderTrigger::new(
                ledger.clone(),
                Arc::new(InMemoryStore::new()),
                publisher.clone(),
                clock.clone(),
            ));
            reorder
                .set_rule(ReorderRule::new(item(), loc(), SupplierId::new("ACME")))
                .unwrap();
            let manager = ReservationManager::new(
                ledger.clone(),
                store.clone(),
                scheduler.clone(),
                reorder,
                publisher.clone(),
                clock.clone(),
                ReservationPolicy::default(),
            );
            Self {
                manager,
                ledger,
                store,
                scheduler,
                publisher,
                clock,
            }
        }

        fn in_an_hour(&self) -> DateTime<Utc> {
            self.clock.now() + Duration::hours(1)
        }

        fn quantities(&self) -> (i64, i64, i64) {
            let rec = self.ledger.record(&item(), &loc()).unwrap().unwrap();
            (rec.total_quantity, rec.available_quantity, rec.reserved_quantity)
        }
    }

    fn item() -> ItemId {
        ItemId::new("X")
    }

    fn loc() -> LocationId {
        LocationId::new("WH-1")
    }

    #[test]
    fn reserve_then_confirm_allocates_and_triggers_reorder_once() {
        let fx = Fixture::new();

        let id = fx.manager.reserve(&item(), 8, fx.in_an_hour()).unwrap();

        assert_eq!(fx.quantities(), (10, 2, 8));
        let rec = fx.ledger.record(&item(), &loc()).unwrap().unwrap();
        assert_eq!(rec.status(), StockStatus::LowStock);
        assert_eq!(fx.publisher.count("reorder_triggered"), 1);
        assert_eq!(fx.publisher.count("reservation_created"), 1);

        assert!(fx.manager.confirm(id).unwrap());
        assert_eq!(fx.quantities(), (2, 2, 0));
        assert_eq!(fx.manager.get(id).unwrap().unwrap().status, ReservationStatus::Confirmed);
        assert!(fx.manager.active().is_empty());
        assert_eq!(fx.scheduler.pending(), 0);
        assert_eq!(fx.publisher.count("reservation_confirmed"), 1);
    }

    #[test]
    fn cancel_and_confirm_are_idempotent() {
        let fx = Fixture::new();

        let a = fx.manager.reserve(&item(), 2, fx.in_an_hour()).unwrap();
        assert!(fx.manager.cancel(a).unwrap());
        assert!(!fx.manager.cancel(a).unwrap());

        let b = fx.manager.reserve(&item(), 2, fx.in_an_hour()).unwrap();
        assert!(fx.manager.confirm(b).unwrap());
        assert!(!fx.manager.confirm(b).unwrap());
        assert!(!fx.manager.cancel(b).unwrap());

        assert!(matches!(
            fx.manager.try_cancel(b),
            Err(InventoryError::ReservationNotActive {
                status: ReservationStatus::Confirmed,
                ..
            })
        ));
        assert_eq!(fx.publisher.count("reservation_cancelled"), 1);
    }

    #[test]
    fn unknown_reservation_is_not_found() {
        let fx = Fixture::new();
        let ghost = ReservationId::new();

        assert!(!fx.manager.confirm(ghost).unwrap());
        assert_eq!(fx.manager.try_cancel(ghost).unwrap_err(), InventoryError::NotFound(ghost));
    }

    #[test]
    fn cancel_restores_available_exactly() {
        let fx = Fixture::new();
        let before = fx.ledger.get_available(&item(), None).unwrap();

        let id = fx.manager.reserve(&item(), 5, fx.in_an_hour()).unwrap();
        assert!(fx.manager.cancel(id).unwrap());

        assert_eq!(fx.ledger.get_available(&item(), None).unwrap(), before);
        assert_eq!(fx.scheduler.pending(), 0);
    }

    #[test]
    fn invalid_input_creates_nothing() {
        let fx = Fixture::new();

        assert!(matches!(
            fx.manager.reserve(&item(), 0, fx.in_an_hour()),
            Err(InventoryError::InvalidQuantity(_))
        ));
        assert!(matches!(
            fx.manager.reserve(&item(), 1, fx.clock.now()),
            Err(InventoryError::InvalidExpiry(_))
        ));
        assert!(matches!(
            fx.manager.reserve(&item(), 11, fx.in_an_hour()),
            Err(InventoryError::InsufficientStock { requested: 11, available: 10, .. })
        ));

        assert_eq!(fx.quantities(), (10, 10, 0));
        assert!(fx.manager.active().is_empty());
        assert!(fx.publisher.events().is_empty());
    }

    #[test]
    fn timer_expires_pending_reservation() {
        let fx = Fixture::new();
        let id = fx
            .manager
            .reserve(&item(), 4, fx.clock.now() + Duration::seconds(1))
            .unwrap();

        fx.clock.advance(Duration::seconds(1));
        assert_eq!(fx.scheduler.fire_due(fx.clock.now()), 1);

        assert_eq!(fx.manager.get(id).unwrap().unwrap().status, ReservationStatus::Expired);
        assert_eq!(fx.quantities(), (10, 10, 0));
        assert!(!fx.manager.confirm(id).unwrap());
        assert_eq!(fx.publisher.count("reservation_expired"), 1);
    }

    #[test]
    fn confirm_after_deadline_expires_instead() {
        let fx = Fixture::new();
        let id = fx
            .manager
            .reserve(&item(), 4, fx.clock.now() + Duration::seconds(1))
            .unwrap();

        // Timer has not fired yet.
        fx.clock.advance(Duration::seconds(2));
        assert_eq!(fx.manager.try_confirm(id).unwrap_err(), InventoryError::ReservationExpired(id));

        let res = fx.manager.get(id).unwrap().unwrap();
        assert_eq!(res.status, ReservationStatus::Expired);
        assert_eq!(fx.quantities(), (10, 10, 0));
        assert_eq!(fx.scheduler.pending(), 0);
        assert!(!fx.manager.confirm(id).unwrap());
    }

    #[test]
    fn store_failure_on_create_leaves_no_residue() {
        let fx = Fixture::new();
        fx.store.fail_writes(true);

        let err = fx.manager.reserve(&item(), 5, fx.in_an_hour()).unwrap_err();

        assert!(matches!(err, InventoryError::Store(_)));
        assert_eq!(fx.quantities(), (10, 10, 0));
        assert!(fx.manager.active().is_empty());
        assert_eq!(fx.scheduler.pending(), 0);
        assert!(fx.publisher.events().is_empty());
    }

    #[test]
    fn store_failure_on_confirm_keeps_reservation_pending() {
        let fx = Fixture::new();
        let id = fx.manager.reserve(&item(), 5, fx.in_an_hour()).unwrap();

        fx.store.fail_writes(true);
        assert!(matches!(fx.manager.confirm(id), Err(InventoryError::Store(_))));

        assert_eq!(fx.quantities(), (10, 5, 5));
        assert_eq!(fx.manager.get(id).unwrap().unwrap().status, ReservationStatus::Pending);
        assert_eq!(fx.scheduler.pending(), 1);

        fx.store.fail_writes(false);
        assert!(fx.manager.confirm(id).unwrap());
        assert_eq!(fx.quantities(), (5, 5, 0));
    }

    #[test]
    fn expire_overdue_sweeps_missed_deadlines() {
        let fx = Fixture::new();
        let soon = fx.clock.now() + Duration::seconds(5);
        let a = fx.manager.reserve(&item(), 2, soon).unwrap();
        let b = fx.manager.reserve(&item(), 3, fx.in_an_hour()).unwrap();

        fx.clock.advance(Duration::seconds(10));
        assert_eq!(fx.manager.expire_overdue().unwrap(), 1);

        assert_eq!(fx.manager.get(a).unwrap().unwrap().status, ReservationStatus::Expired);
        assert_eq!(fx.manager.active().iter().map(|r| r.id).collect::<Vec<_>>(), vec![b]);
        assert_eq!(fx.manager.pending_quantity(&item()), 3);
    }

    #[test]
    fn restore_reloads_pending_reservations() {
        let fx = Fixture::new();
        let id = fx.manager.reserve(&item(), 3, fx.in_an_hour()).unwrap();
        let done = fx.manager.reserve(&item(), 1, fx.in_an_hour()).unwrap();
        fx.manager.cancel(done).unwrap();

        // Fresh manager over the same ledger and reservation store.
        let restarted = Fixture::with_ledger(fx.ledger.clone(), fx.clock.clone(), fx.store.clone());
        assert_eq!(restarted.manager.restore_active().unwrap(), 1);
        assert_eq!(restarted.scheduler.pending(), 1);

        assert!(restarted.manager.cancel(id).unwrap());
        assert_eq!(restarted.quantities(), (10, 10, 0));
    }

    #[test]
    fn concurrent_reservations_exactly_one_wins() {
        for _ in 0..50 {
            let fx = Fixture::new();
            let barrier = Arc::new(Barrier::new(2));
            let expiry = fx.in_an_hour();

            let spawn = |qty: i64| {
                let manager = fx.manager.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    manager.reserve(&item(), qty, expiry)
                })
            };
            let nine = spawn(9);
            let two = spawn(2);
            let results = [nine.join().unwrap(), two.join().unwrap()];

            let ok: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
            assert_eq!(ok.len(), 1);
            assert!(results.iter().any(|r| matches!(r, Err(InventoryError::InsufficientStock { .. }))));

            let (_, available, reserved) = fx.quantities();
            assert!(available == 1 || available == 8);
            assert_eq!(reserved, fx.manager.pending_quantity(&item()));
        }
    }

    #[test]
    fn racing_terminal_transitions_resolve_exactly_once() {
        for _ in 0..30 {
            let fx = Fixture::new();
            let id = fx.manager.reserve(&item(), 4, fx.in_an_hour()).unwrap();
            let barrier = Arc::new(Barrier::new(3));

            let handles: Vec<_> = (0..3)
                .map(|n| {
                    let manager = fx.manager.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        match n {
                            0 => manager.confirm(id),
                            1 => manager.cancel(id),
                            _ => manager.expire(id),
                        }
                    })
                })
                .collect();

            let wins = handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(wins, 1);

            let (total, available, reserved) = fx.quantities();
            assert_eq!(reserved, 0);
            match fx.manager.get(id).unwrap().unwrap().status {
                ReservationStatus::Confirmed => assert_eq!((total, available), (6, 6)),
                _ => assert_eq!((total, available), (10, 10)),
            }
        }
    }

    #[test]
    fn wall_clock_expiry_restores_stock() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ledger = Arc::new(StockLedger::new(Arc::new(InMemoryStockStore::new()), clock.clone()));
        ledger
            .provision(&item(), &loc(), &StockSettings::new(10).with_reorder(3, 20))
            .unwrap();
        let publisher = Arc::new(RecordingPublisher::default());
        let reorder = Arc::new(ReorderTrigger::new(
            ledger.clone(),
            Arc::new(InMemoryStore::new()),
            publisher.clone(),
            clock.clone(),
        ));
        let scheduler = Arc::new(ThreadExpiryScheduler::spawn("expiry-test").unwrap());
        let manager = ReservationManager::new(
            ledger.clone(),
            Arc::new(InMemoryStore::new()),
            scheduler.clone(),
            reorder,
            publisher.clone(),
            clock.clone(),
            ReservationPolicy::default(),
        );

        let id = manager
            .reserve(&item(), 6, clock.now() + Duration::seconds(1))
            .unwrap();
        assert_eq!(ledger.get_available(&item(), None).unwrap(), 4);

        let mut status = ReservationStatus::Pending;
        for _ in 0..60 {
            thread::sleep(StdDuration::from_millis(50));
            status = manager.get(id).unwrap().unwrap().status;
            if status.is_terminal() {
                break;
            }
        }

        assert_eq!(status, ReservationStatus::Expired);
        assert_eq!(ledger.get_available(&item(), None).unwrap(), 10);
        assert!(!manager.confirm(id).unwrap());
        scheduler.shutdown();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(i64),
        Confirm(usize),
        Cancel(usize),
        Tick(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..6).prop_map(Op::Reserve),
            (0usize..8).prop_map(Op::Confirm),
            (0usize..8).prop_map(Op::Cancel),
            (1i64..40).prop_map(Op::Tick),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of lifecycle operations, the ledger's reserved
        /// quantity equals the sum of PENDING reservations and available never goes negative.
        #[test]
        fn reserved_tracks_pending_reservations(ops in prop::collection::vec(op(), 1..50)) {
            let fx = Fixture::new();
            let mut ids: Vec<ReservationId> = Vec::new();

            for op in ops {
                match op {
                    Op::Reserve(q) => {
                        let expiry = fx.clock.now() + Duration::seconds(30);
                        if let Ok(id) = fx.manager.reserve(&item(), q, expiry) {
                            ids.push(id);
                        }
                    }
                    Op::Confirm(i) => {
                        if let Some(id) = ids.get(i) {
                            fx.manager.confirm(*id).unwrap();
                        }
                    }
                    Op::Cancel(i) => {
                        if let Some(id) = ids.get(i) {
                            fx.manager.cancel(*id).unwrap();
                        }
                    }
                    Op::Tick(secs) => {
                        fx.clock.advance(Duration::seconds(secs));
                        fx.scheduler.fire_due(fx.clock.now());
                    }
                }

                let (total, available, reserved) = fx.quantities();
                prop_assert!(available >= 0);
                prop_assert_eq!(available + reserved, total);
                prop_assert_eq!(reserved, fx.manager.pending_quantity(&item()));
            }
        }
    }
}
