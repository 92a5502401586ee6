use std::sync::Arc;

use tracing::{debug, warn};

use crate::container::events::EventBus;
use crate::container::store::{recv_settle, BeginDestroy, HolderStatus, HolderStore};

/// How many times an invalidation retries after parking on a holder that
/// keeps being re-created underneath it.
const MAX_SETTLE_ROUNDS: u32 = 3;

/// Options for a full store teardown.
#[derive(Debug, Clone, Copy)]
pub struct ClearAllOptions {
    /// Wait for every in-flight creation and destruction to settle before
    /// planning the teardown.
    pub wait_for_settlement: bool,
}

impl Default for ClearAllOptions {
    fn default() -> Self {
        Self {
            wait_for_settlement: true,
        }
    }
}

/// Drives safe, dependency-ordered destruction of holders: single
/// invalidations with their transitive dependents, and full-store clears.
///
/// Destruction order comes from a tri-color pass over the reverse
/// dependency index, so every holder is destroyed before anything it
/// depends on; dependency cycles are diagnosed, logged and then
/// force-destroyed rather than silently abandoned.
pub(crate) struct Invalidator {
    bus: Arc<EventBus>,
}

impl Invalidator {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Destroys the named holder and everything transitively depending on
    /// it, dependents first. Absent holders are a no-op; in-flight
    /// transitions are awaited so concurrent invalidations converge on a
    /// single teardown.
    pub fn invalidate(&self, store: &HolderStore, name: &str) {
        let mut round = 1;
        loop {
            match store.status(name) {
                None => return,
                Some(HolderStatus::Destroying) => {
                    if let Some(receiver) = store.wait_if_destroying(name) {
                        let _ = receiver.recv();
                    }
                    return;
                }
                Some(HolderStatus::Creating) => {
                    if round > MAX_SETTLE_ROUNDS {
                        warn!(
                            name,
                            rounds = MAX_SETTLE_ROUNDS,
                            "construction keeps outpacing invalidation, giving up"
                        );
                        return;
                    }
                    if let Some(receiver) = store.wait_if_creating(name) {
                        let _ = recv_settle(name, receiver);
                    }
                    round += 1;
                }
                Some(_) => break,
            }
        }

        let plan = store.destruction_plan(Some(name));
        self.warn_cycles(&plan.cycles);
        for member in &plan.order {
            self.destroy_one(store, member);
        }
    }

    /// Tears down every holder in the store, dependents before their
    /// dependencies. Holders created while the clear is running are left
    /// in place and reported.
    pub fn clear_all(&self, store: &HolderStore, options: ClearAllOptions) {
        if options.wait_for_settlement {
            self.ready(store);
        }

        let plan = store.destruction_plan(None);
        self.warn_cycles(&plan.cycles);
        debug!(count = plan.order.len(), "clearing all holders");
        for member in &plan.order {
            self.destroy_one(store, member);
        }

        let leftover = store.len();
        if leftover > 0 {
            warn!(leftover, "holders appeared during the clear and remain live");
        }
    }

    /// Blocks until every currently unsettled holder settles, mutating
    /// nothing. A barrier for graceful shutdown.
    pub fn ready(&self, store: &HolderStore) {
        let unsettled = store.filter(|_, status| {
            matches!(status, HolderStatus::Creating | HolderStatus::Destroying)
        });
        for name in unsettled {
            if let Some(receiver) = store.wait_if_creating(&name) {
                let _ = recv_settle(&name, receiver);
            } else if let Some(receiver) = store.wait_if_destroying(&name) {
                let _ = receiver.recv();
            }
        }
    }

    /// Destroys one settled holder, converging with any concurrent
    /// teardown so its destroy listeners run exactly once.
    fn destroy_one(&self, store: &HolderStore, name: &str) {
        let claim = match store.begin_destroy(name) {
            BeginDestroy::Absent => return,
            BeginDestroy::Converge(receiver) => {
                let _ = receiver.recv();
                return;
            }
            BeginDestroy::Unsettled(receiver) => {
                let _ = recv_settle(name, receiver);
                match store.begin_destroy(name) {
                    BeginDestroy::Claimed {
                        instance,
                        listeners,
                    } => Some((instance, listeners)),
                    BeginDestroy::Converge(receiver) => {
                        let _ = receiver.recv();
                        None
                    }
                    _ => None,
                }
            }
            BeginDestroy::Claimed {
                instance,
                listeners,
            } => Some((instance, listeners)),
        };

        let Some((instance, listeners)) = claim else {
            return;
        };
        for listener in listeners {
            // Failures are gathered independently: one failing listener
            // never prevents the rest from running.
            if let Err(err) = listener() {
                warn!(name, error = %err, "destroy listener failed");
            }
        }
        drop(instance);
        store.finish_destroy(name);
        self.bus.publish(name);
    }

    fn warn_cycles(&self, cycles: &[Vec<String>]) {
        for cycle in cycles {
            warn!(
                members = ?cycle,
                "cyclic dependency detected, force-destroying its members"
            );
        }
    }
}
