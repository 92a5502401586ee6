use std::collections::{HashMap, HashSet};
use std::iter;
use std::mem;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use oneshot::{Receiver, Sender};
use parking_lot::RwLock;
use tracing::debug;

use crate::container::graph::{destruction_order, DependencyGraph, NameArena, NameId};
use crate::container::injector::{construction_error, ResolveError};
use crate::container::{Instance, Managed};
use crate::provider::{DestroyListener, ProviderKind};
use crate::scope::Scope;

pub(crate) type SettleResult = Result<Instance, ResolveError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HolderStatus {
    Creating,
    Created,
    Destroying,
    Error,
}

/// The lifecycle record tracking one instance from construction to
/// teardown.
///
/// Status moves `Creating -> Created | Error` on settlement and
/// `Created | Error -> Destroying` on invalidation; `Destroying` ends with
/// the holder removed from the store. Concurrent observers of an
/// unsettled transition park on the waiter lists and are notified by the
/// single thread driving the transition.
struct Holder {
    status: HolderStatus,
    instance: Option<Instance>,
    error: Option<ResolveError>,
    kind: ProviderKind,
    scope: Scope,
    deps: HashSet<NameId>,
    destroy_listeners: Vec<DestroyListener>,
    created_at: Instant,
    ttl: Option<Duration>,
    creating_thread: Option<ThreadId>,
    creation_waiters: Vec<Sender<SettleResult>>,
    destroy_waiters: Vec<Sender<()>>,
}

impl Holder {
    fn creating(kind: ProviderKind, scope: Scope, ttl: Option<Duration>) -> Self {
        Self {
            status: HolderStatus::Creating,
            instance: None,
            error: None,
            kind,
            scope,
            deps: HashSet::new(),
            destroy_listeners: Vec::new(),
            created_at: Instant::now(),
            ttl,
            creating_thread: Some(thread::current().id()),
            creation_waiters: Vec::new(),
            destroy_waiters: Vec::new(),
        }
    }

    fn created(
        kind: ProviderKind,
        scope: Scope,
        instance: Instance,
        destroy_listeners: Vec<DestroyListener>,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            status: HolderStatus::Created,
            instance: Some(instance),
            error: None,
            kind,
            scope,
            deps: HashSet::new(),
            destroy_listeners,
            created_at: Instant::now(),
            ttl,
            creating_thread: None,
            creation_waiters: Vec::new(),
            destroy_waiters: Vec::new(),
        }
    }

    fn expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.created_at.elapsed() > ttl)
    }

    fn shared_instance(&self) -> Instance {
        let Some(instance) = self.instance.as_ref() else {
            unreachable!("a `Created` holder should hold an instance")
        };
        (**instance).dyn_clone()
    }

    fn cached_error(&self) -> ResolveError {
        let Some(error) = self.error.as_ref() else {
            unreachable!("an `Error` holder should hold its construction error")
        };
        error.clone()
    }
}

/// What a resolver should do after checking in with the store.
pub(crate) enum BeginResolve {
    /// The instance is settled; here is a shared handle.
    Ready(Instance),
    /// Another caller is constructing this identity; park on the receiver.
    Wait(Receiver<SettleResult>),
    /// The caller won the construction and must settle the holder.
    Claimed,
    /// The identity is not resolvable right now.
    Reject(ResolveError),
}

/// What an invalidator should do after trying to claim a destruction.
pub(crate) enum BeginDestroy {
    /// The caller owns the teardown and must call `finish_destroy`.
    Claimed {
        instance: Option<Instance>,
        listeners: Vec<DestroyListener>,
    },
    /// Teardown is already running; park until it completes.
    Converge(Receiver<()>),
    /// The holder is still constructing; park until it settles, then retry.
    Unsettled(Receiver<SettleResult>),
    Absent,
}

pub(crate) struct PlanNames {
    pub order: Vec<String>,
    pub cycles: Vec<Vec<String>>,
}

struct StoreInner {
    arena: NameArena,
    graph: DependencyGraph,
    holders: HashMap<NameId, Holder>,
    transient_seq: u64,
}

/// The per-store source of truth for instance identity: one holder per
/// name, creation deduplication, and the reverse-dependency index.
///
/// Every check-and-transition happens inside one critical section; all
/// blocking happens outside the lock on `oneshot` receivers, so the
/// at-most-one-construction guarantee holds under real parallelism.
pub(crate) struct HolderStore {
    inner: RwLock<StoreInner>,
    label: &'static str,
}

impl HolderStore {
    pub fn new(label: &'static str) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                arena: NameArena::default(),
                graph: DependencyGraph::default(),
                holders: HashMap::new(),
                transient_seq: 0,
            }),
            label,
        }
    }

    /// Checks in for the resolution of `name`, claiming the construction
    /// if no holder exists yet. This is the single deduplication point:
    /// exactly one caller per identity ever receives [`BeginResolve::Claimed`].
    pub fn begin_resolve(
        &self,
        name: &str,
        kind: ProviderKind,
        scope: Scope,
        ttl: Option<Duration>,
    ) -> BeginResolve {
        let mut inner = self.inner.write();
        let StoreInner {
            arena,
            graph,
            holders,
            ..
        } = &mut *inner;
        let id = arena.intern(name);
        graph.ensure(arena.len());

        let Some(holder) = holders.get_mut(&id) else {
            holders.insert(id, Holder::creating(kind, scope, ttl));
            debug!(store = self.label, name, "construction claimed");
            return BeginResolve::Claimed;
        };
        match holder.status {
            HolderStatus::Created if holder.expired() => {
                BeginResolve::Reject(ResolveError::Expired { name: name.into() })
            }
            HolderStatus::Created => BeginResolve::Ready(holder.shared_instance()),
            HolderStatus::Creating => {
                if holder.creating_thread == Some(thread::current().id()) {
                    BeginResolve::Reject(ResolveError::CyclicDependency { name: name.into() })
                } else {
                    let (sender, receiver) = oneshot::channel();
                    holder.creation_waiters.push(sender);
                    BeginResolve::Wait(receiver)
                }
            }
            HolderStatus::Destroying => {
                BeginResolve::Reject(ResolveError::Destroying { name: name.into() })
            }
            HolderStatus::Error => BeginResolve::Reject(holder.cached_error()),
        }
    }

    /// Settles a claimed construction with its instance, recording the
    /// dependencies the constructor resolved and updating the reverse
    /// index in the same critical section.
    pub fn settle_created(
        &self,
        name: &str,
        instance: Instance,
        deps: HashSet<String>,
        listeners: Vec<DestroyListener>,
    ) {
        let notifications;
        {
            let mut inner = self.inner.write();
            let StoreInner {
                arena,
                graph,
                holders,
                ..
            } = &mut *inner;
            let id = arena.intern(name);
            let dep_ids: HashSet<NameId> = deps.iter().map(|dep| arena.intern(dep)).collect();
            graph.ensure(arena.len());
            for &dep in &dep_ids {
                graph.add_edge(dep, id);
            }
            let Some(holder) = holders.get_mut(&id) else {
                unreachable!("the holder should exist while its creation settles")
            };
            holder.status = HolderStatus::Created;
            holder.instance = Some(instance);
            holder.deps = dep_ids;
            holder.destroy_listeners = listeners;
            holder.created_at = Instant::now();
            holder.creating_thread = None;
            notifications = mem::take(&mut holder.creation_waiters)
                .into_iter()
                .map(|waiter| (waiter, Ok(holder.shared_instance())))
                .collect::<Vec<_>>();
            debug!(
                store = self.label,
                name,
                kind = %holder.kind,
                scope = %holder.scope,
                "instance created"
            );
        }
        for (waiter, settled) in notifications {
            let _ = waiter.send(settled);
        }
    }

    /// Settles a claimed construction with its failure. The error is
    /// cached so repeated resolutions fail fast until invalidation; the
    /// dependencies resolved before the failure still count for ordering.
    pub fn settle_failed(&self, name: &str, error: ResolveError, deps: HashSet<String>) {
        let waiters;
        {
            let mut inner = self.inner.write();
            let StoreInner {
                arena,
                graph,
                holders,
                ..
            } = &mut *inner;
            let id = arena.intern(name);
            let dep_ids: HashSet<NameId> = deps.iter().map(|dep| arena.intern(dep)).collect();
            graph.ensure(arena.len());
            for &dep in &dep_ids {
                graph.add_edge(dep, id);
            }
            let Some(holder) = holders.get_mut(&id) else {
                unreachable!("the holder should exist while its creation settles")
            };
            holder.status = HolderStatus::Error;
            holder.error = Some(error.clone());
            holder.deps = dep_ids;
            holder.creating_thread = None;
            waiters = mem::take(&mut holder.creation_waiters);
        }
        debug!(store = self.label, name, %error, "construction failed");
        for waiter in waiters {
            let _ = waiter.send(Err(error.clone()));
        }
    }

    /// Directly stores a settled holder, for pre-seeded/bound values.
    /// Settled holders under the same name are replaced; unsettled ones
    /// reject the seed so in-flight transitions stay single-owner.
    pub fn store_created(
        &self,
        name: &str,
        kind: ProviderKind,
        scope: Scope,
        instance: Instance,
        listeners: Vec<DestroyListener>,
        ttl: Option<Duration>,
    ) -> Result<(), ResolveError> {
        let mut inner = self.inner.write();
        let StoreInner {
            arena,
            graph,
            holders,
            ..
        } = &mut *inner;
        let id = arena.intern(name);
        graph.ensure(arena.len());
        match holders.get(&id).map(|holder| holder.status) {
            Some(HolderStatus::Creating) | Some(HolderStatus::Destroying) => {
                return Err(ResolveError::Destroying { name: name.into() });
            }
            Some(_) => {
                debug!(store = self.label, name, "replacing settled holder with seeded instance");
                if let Some(old) = holders.remove(&id) {
                    for &dep in &old.deps {
                        graph.remove_edge(dep, id);
                    }
                }
            }
            None => {}
        }
        holders.insert(id, Holder::created(kind, scope, instance, listeners, ttl));
        Ok(())
    }

    /// Looks up a settled instance by name, reporting (never acting upon)
    /// expiration, teardown and cached construction failures. Blocks if
    /// the holder is still constructing.
    pub fn lookup(&self, name: &str) -> Result<Instance, ResolveError> {
        let receiver = {
            let mut inner = self.inner.write();
            let StoreInner { arena, holders, .. } = &mut *inner;
            let Some(holder) = arena.lookup(name).and_then(|id| holders.get_mut(&id)) else {
                return Err(ResolveError::NotFound { name: name.into() });
            };
            match holder.status {
                HolderStatus::Created if holder.expired() => {
                    return Err(ResolveError::Expired { name: name.into() });
                }
                HolderStatus::Created => return Ok(holder.shared_instance()),
                HolderStatus::Destroying => {
                    return Err(ResolveError::Destroying { name: name.into() });
                }
                HolderStatus::Error => return Err(holder.cached_error()),
                HolderStatus::Creating => {
                    let (sender, receiver) = oneshot::channel();
                    holder.creation_waiters.push(sender);
                    receiver
                }
            }
        };
        recv_settle(name, receiver)
    }

    /// Returns the instance only if it is already `Created` and unexpired.
    /// Never blocks, never constructs.
    pub fn try_get(&self, name: &str) -> Option<Instance> {
        let inner = self.inner.read();
        let holder = inner.arena.lookup(name).and_then(|id| inner.holders.get(&id))?;
        (holder.status == HolderStatus::Created && !holder.expired())
            .then(|| holder.shared_instance())
    }

    /// Tries to claim the teardown of `name`; see [`BeginDestroy`].
    pub fn begin_destroy(&self, name: &str) -> BeginDestroy {
        let mut inner = self.inner.write();
        let StoreInner { arena, holders, .. } = &mut *inner;
        let Some(holder) = arena.lookup(name).and_then(|id| holders.get_mut(&id)) else {
            return BeginDestroy::Absent;
        };
        match holder.status {
            HolderStatus::Creating => {
                let (sender, receiver) = oneshot::channel();
                holder.creation_waiters.push(sender);
                BeginDestroy::Unsettled(receiver)
            }
            HolderStatus::Destroying => {
                let (sender, receiver) = oneshot::channel();
                holder.destroy_waiters.push(sender);
                BeginDestroy::Converge(receiver)
            }
            HolderStatus::Created | HolderStatus::Error => {
                holder.status = HolderStatus::Destroying;
                holder.creating_thread = None;
                BeginDestroy::Claimed {
                    instance: holder.instance.take(),
                    listeners: mem::take(&mut holder.destroy_listeners),
                }
            }
        }
    }

    /// Completes a claimed teardown: clears the holder's dependency edges,
    /// removes it from the store and wakes everything converging on the
    /// destruction.
    pub fn finish_destroy(&self, name: &str) {
        let waiters;
        {
            let mut inner = self.inner.write();
            let StoreInner {
                arena,
                graph,
                holders,
                ..
            } = &mut *inner;
            let Some(id) = arena.lookup(name) else {
                return;
            };
            let Some(mut holder) = holders.remove(&id) else {
                return;
            };
            for &dep in &holder.deps {
                graph.remove_edge(dep, id);
            }
            holder.deps.clear();
            waiters = mem::take(&mut holder.destroy_waiters);
        }
        debug!(store = self.label, name, "instance destroyed");
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// Registers a settlement waiter iff the holder is currently
    /// `Creating`.
    pub fn wait_if_creating(&self, name: &str) -> Option<Receiver<SettleResult>> {
        let mut inner = self.inner.write();
        let StoreInner { arena, holders, .. } = &mut *inner;
        let holder = arena.lookup(name).and_then(|id| holders.get_mut(&id))?;
        (holder.status == HolderStatus::Creating).then(|| {
            let (sender, receiver) = oneshot::channel();
            holder.creation_waiters.push(sender);
            receiver
        })
    }

    /// Registers a teardown waiter iff the holder is currently
    /// `Destroying`.
    pub fn wait_if_destroying(&self, name: &str) -> Option<Receiver<()>> {
        let mut inner = self.inner.write();
        let StoreInner { arena, holders, .. } = &mut *inner;
        let holder = arena.lookup(name).and_then(|id| holders.get_mut(&id))?;
        (holder.status == HolderStatus::Destroying).then(|| {
            let (sender, receiver) = oneshot::channel();
            holder.destroy_waiters.push(sender);
            receiver
        })
    }

    pub fn status(&self, name: &str) -> Option<HolderStatus> {
        let inner = self.inner.read();
        inner
            .arena
            .lookup(name)
            .and_then(|id| inner.holders.get(&id))
            .map(|holder| holder.status)
    }

    /// Snapshot of all holder names matching the predicate.
    pub fn filter(&self, predicate: impl Fn(&str, HolderStatus) -> bool) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .holders
            .iter()
            .filter(|(id, holder)| predicate(inner.arena.name(**id), holder.status))
            .map(|(id, _)| inner.arena.name(*id).to_string())
            .collect()
    }

    /// Plans a dependency-ordered destruction: the transitive dependents
    /// of `root`, or every live holder when `root` is `None`. The order
    /// always destroys dependents before their dependencies; detected
    /// cycles are reported alongside.
    pub fn destruction_plan(&self, root: Option<&str>) -> PlanNames {
        let inner = self.inner.read();
        let live: HashSet<NameId> = inner.holders.keys().copied().collect();
        let plan = match root {
            Some(name) => {
                let Some(id) = inner.arena.lookup(name) else {
                    return PlanNames {
                        order: Vec::new(),
                        cycles: Vec::new(),
                    };
                };
                destruction_order(&inner.graph, &live, iter::once(id))
            }
            None => destruction_order(&inner.graph, &live, live.iter().copied()),
        };
        PlanNames {
            order: plan
                .order
                .iter()
                .map(|&id| inner.arena.name(id).to_string())
                .collect(),
            cycles: plan
                .cycles
                .iter()
                .map(|cycle| cycle.iter().map(|&id| inner.arena.name(id).to_string()).collect())
                .collect(),
        }
    }

    /// Allocates a unique holder name for one transient resolution.
    pub fn next_transient_name(&self, base: &str) -> String {
        let mut inner = self.inner.write();
        inner.transient_seq += 1;
        format!("{base}#{}", inner.transient_seq)
    }

    pub fn len(&self) -> usize {
        self.inner.read().holders.len()
    }
}

/// Blocks on a settlement receiver, mapping an abandoned construction
/// (e.g. a panicking constructor thread) to a construction failure.
pub(crate) fn recv_settle(name: &str, receiver: Receiver<SettleResult>) -> SettleResult {
    match receiver.recv() {
        Ok(settled) => settled,
        Err(_) => Err(construction_error(
            name,
            "the constructing thread disappeared before settling".into(),
        )),
    }
}
