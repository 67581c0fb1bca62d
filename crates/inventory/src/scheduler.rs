//! Expiry scheduling for pending reservations.
//!
//! A scheduler arranges for a callback to run once a reservation's deadline
//! passes. Callbacks never run while the scheduler holds its own lock, so a
//! callback may freely call back into `schedule`/`cancel`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use stockhold_core::ReservationId;

/// Invoked with the id of the reservation whose deadline passed.
pub type ExpiryCallback = Arc<dyn Fn(ReservationId) + Send + Sync>;

pub trait ExpiryScheduler: Send + Sync {
    /// Arrange for `callback(id)` to run at `deadline`. Replaces any timer already set for `id`.
    fn schedule(&self, id: ReservationId, deadline: DateTime<Utc>, callback: ExpiryCallback);

    /// Disarm the timer for `id`. Returns whether one was armed.
    fn cancel(&self, id: ReservationId) -> bool;

    /// Number of armed timers.
    fn pending(&self) -> usize;
}

impl<S> ExpiryScheduler for Arc<S>
where
    S: ExpiryScheduler + ?Sized,
{
    fn schedule(&self, id: ReservationId, deadline: DateTime<Utc>, callback: ExpiryCallback) {
        (**self).schedule(id, deadline, callback)
    }

    fn cancel(&self, id: ReservationId) -> bool {
        (**self).cancel(id)
    }

    fn pending(&self) -> usize {
        (**self).pending()
    }
}

fn fire(id: ReservationId, callback: ExpiryCallback) {
    if catch_unwind(AssertUnwindSafe(|| callback(id))).is_err() {
        error!(reservation_id = %id, "expiry callback panicked");
    }
}

struct TimerState {
    timers: HashMap<ReservationId, (DateTime<Utc>, ExpiryCallback)>,
    /// May hold stale entries for cancelled or re-armed timers; `timers` is authoritative.
    queue: BinaryHeap<Reverse<(DateTime<Utc>, ReservationId)>>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<TimerState>,
    wakeup: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wall-clock scheduler backed by one background thread.
pub struct ThreadExpiryScheduler {
    shared: Arc<Shared>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl core::fmt::Debug for ThreadExpiryScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreadExpiryScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

impl ThreadExpiryScheduler {
    const IDLE_TICK: Duration = Duration::from_millis(500);

    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState {
                timers: HashMap::new(),
                queue: BinaryHeap::new(),
                shutdown: false,
            }),
            wakeup: Condvar::new(),
        });

        let worker = shared.clone();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || timer_loop(&worker))?;

        Ok(Self {
            shared,
            join: Mutex::new(Some(join)),
        })
    }

    /// Stop the timer thread and wait for it. Armed timers are dropped unfired.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            if !state.timers.is_empty() {
                debug!(dropped = state.timers.len(), "expiry scheduler stopping with armed timers");
            }
            state.timers.clear();
            state.queue.clear();
        }
        self.shared.wakeup.notify_all();

        let join = self.join.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(join) = join {
            if join.thread().id() != thread::current().id() {
                let _ = join.join();
            }
        }
    }
}

impl Drop for ThreadExpiryScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ExpiryScheduler for ThreadExpiryScheduler {
    fn schedule(&self, id: ReservationId, deadline: DateTime<Utc>, callback: ExpiryCallback) {
        {
            let mut state = self.shared.lock();
            if state.shutdown {
                warn!(reservation_id = %id, "expiry scheduler is shut down; timer not armed");
                return;
            }
            state.timers.insert(id, (deadline, callback));
            state.queue.push(Reverse((deadline, id)));
        }
        self.shared.wakeup.notify_all();
    }

    fn cancel(&self, id: ReservationId) -> bool {
        self.shared.lock().timers.remove(&id).is_some()
    }

    fn pending(&self) -> usize {
        self.shared.lock().timers.len()
    }
}

fn timer_loop(shared: &Shared) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            break;
        }

        let now = Utc::now();
        let mut due = Vec::new();
        while let Some(&Reverse((deadline, id))) = state.queue.peek() {
            if deadline > now {
                break;
            }
            state.queue.pop();
            let armed = state.timers.get(&id).is_some_and(|(d, _)| *d == deadline);
            if armed {
                if let Some((_, callback)) = state.timers.remove(&id) {
                    due.push((id, callback));
                }
            }
        }

        if !due.is_empty() {
            drop(state);
            for (id, callback) in due {
                fire(id, callback);
            }
            state = shared.lock();
            continue;
        }

        let wait = state
            .queue
            .peek()
            .map(|Reverse((deadline, _))| (*deadline - now).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(ThreadExpiryScheduler::IDLE_TICK);

        state = shared
            .wakeup
            .wait_timeout(state, wait)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
    }
}

/// Scheduler driven by the caller: timers fire only from [`ManualExpiryScheduler::fire_due`].
///
/// Pairs with `ManualClock` for deterministic expiry in tests and replays.
#[derive(Default)]
pub struct ManualExpiryScheduler {
    timers: Mutex<HashMap<ReservationId, (DateTime<Utc>, ExpiryCallback)>>,
}

impl core::fmt::Debug for ManualExpiryScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ManualExpiryScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

impl ManualExpiryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<ReservationId, (DateTime<Utc>, ExpiryCallback)>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn deadline_of(&self, id: ReservationId) -> Option<DateTime<Utc>> {
        self.timers().get(&id).map(|(deadline, _)| *deadline)
    }

    /// Fire every timer with `deadline <= now`, earliest first. Returns how many fired.
    pub fn fire_due(&self, now: DateTime<Utc>) -> usize {
        let mut due: Vec<(DateTime<Utc>, ReservationId, ExpiryCallback)> = {
            let mut timers = self.timers();
            let ids: Vec<ReservationId> = timers
                .iter()
                .filter(|(_, (deadline, _))| *deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| timers.remove(&id).map(|(deadline, cb)| (deadline, id, cb)))
                .collect()
        };
        due.sort_by_key(|(deadline, id, _)| (*deadline, *id));

        let fired = due.len();
        for (_, id, callback) in due {
            fire(id, callback);
        }
        fired
    }
}

impl ExpiryScheduler for ManualExpiryScheduler {
    fn schedule(&self, id: ReservationId, deadline: DateTime<Utc>, callback: ExpiryCallback) {
        self.timers().insert(id, (deadline, callback));
    }

    fn cancel(&self, id: ReservationId) -> bool {
        self.timers().remove(&id).is_some()
    }

    fn pending(&self) -> usize {
        self.timers().len()
    }
}
