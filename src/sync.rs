// src/sync.rs
//! Rendezvous primitives for the "all agencies finished" edge.
//!
//! [`Barrier`] is a fixed-capacity rendezvous with an explicit [`Barrier::abort`]:
//! once aborted, every blocked and every future `wait` fails immediately
//! instead of hanging on a participant that will never arrive. [`ResultSlot`]
//! is a single-assignment cell with a compare-and-set claim, so exactly one
//! of the released workers computes the shared result and everyone else reads
//! it only after it has been published.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

use tokio::sync::watch;

/// The rendezvous (or its result) was abandoned before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rendezvous aborted")]
pub struct Aborted;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    Waiting,
    Released,
    Aborted,
}

/// A one-round rendezvous barrier for a fixed number of participants.
pub struct Barrier {
    count: usize,
    arrived: Mutex<usize>,
    phase: watch::Sender<Phase>,
}

impl Barrier {
    pub fn new(count: usize) -> Self {
        let (phase, _) = watch::channel(Phase::Waiting);
        Self {
            count: count.max(1),
            arrived: Mutex::new(0),
            phase,
        }
    }

    /// Block until all participants have arrived, or the barrier is aborted.
    pub async fn wait(&self) -> Result<(), Aborted> {
        let mut rx = self.phase.subscribe();
        {
            let mut arrived = self.arrived.lock().unwrap();
            match *rx.borrow_and_update() {
                Phase::Aborted => return Err(Aborted),
                Phase::Released => return Ok(()),
                Phase::Waiting => {}
            }
            *arrived += 1;
            if *arrived == self.count {
                self.phase.send_replace(Phase::Released);
                return Ok(());
            }
        }

        loop {
            match *rx.borrow_and_update() {
                Phase::Released => return Ok(()),
                Phase::Aborted => return Err(Aborted),
                Phase::Waiting => {}
            }
            if rx.changed().await.is_err() {
                return Err(Aborted);
            }
        }
    }

    /// Fail every current and future [`Barrier::wait`]. No-op once released.
    pub fn abort(&self) {
        let _arrived = self.arrived.lock().unwrap();
        self.phase.send_if_modified(|p| {
            if *p == Phase::Waiting {
                *p = Phase::Aborted;
                true
            } else {
                false
            }
        });
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum SlotState {
    Pending,
    Ready,
    Failed,
}

/// A write-once result cell shared between the released workers.
///
/// Exactly one caller wins [`ResultSlot::try_claim`]; it either
/// [`ResultSlot::publish`]es the value or [`ResultSlot::fail`]s the slot so
/// readers blocked in [`ResultSlot::get`] are released with an error rather
/// than left hanging.
pub struct ResultSlot<T> {
    claimed: AtomicBool,
    value: OnceLock<T>,
    state: watch::Sender<SlotState>,
}

impl<T> Default for ResultSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResultSlot<T> {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SlotState::Pending);
        Self {
            claimed: AtomicBool::new(false),
            value: OnceLock::new(),
            state,
        }
    }

    /// Returns true for exactly one caller over the slot's lifetime.
    pub fn try_claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    /// Publish the value and release all readers. First publication wins.
    pub fn publish(&self, value: T) {
        if self.value.set(value).is_err() {
            return;
        }
        self.state.send_replace(SlotState::Ready);
    }

    /// Release all readers with an error. No-op once published.
    pub fn fail(&self) {
        self.state.send_if_modified(|s| {
            if *s == SlotState::Pending {
                *s = SlotState::Failed;
                true
            } else {
                false
            }
        });
    }

    /// Block until the value is published (or the slot fails).
    pub async fn get(&self) -> Result<&T, Aborted> {
        let mut rx = self.state.subscribe();
        loop {
            match *rx.borrow_and_update() {
                SlotState::Ready => return self.value.get().ok_or(Aborted),
                SlotState::Failed => return Err(Aborted),
                SlotState::Pending => {}
            }
            if rx.changed().await.is_err() {
                return Err(Aborted);
            }
        }
    }
}
