use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::container::events::{DestroyEvent, EventBus};
use crate::container::injector::{construction_error, Injector, ResolveError};
use crate::container::invalidate::{ClearAllOptions, Invalidator};
use crate::container::registry::{Descriptor, TokenRegistry};
use crate::container::store::{recv_settle, BeginResolve, HolderStore};
use crate::container::{Instance, Managed};
use crate::provider::ProviderKind;
use crate::scope::Scope;
use crate::token;

/// The resolution engine behind one holder store: scope routing, creation
/// deduplication and construction driving.
///
/// The root core owns the process-wide store serving Singleton and
/// Transient resolutions. Request cores chain to the root: they serve
/// Request-scope resolutions from their private store and forward
/// everything else unchanged, so singletons stay shared across requests.
pub(crate) struct ResolverCore {
    registry: Arc<TokenRegistry>,
    store: HolderStore,
    parent: Option<Arc<ResolverCore>>,
    invalidator: Invalidator,
    bus: Arc<EventBus>,
}

impl ResolverCore {
    pub fn new_root(registry: Arc<TokenRegistry>, bus: Arc<EventBus>) -> Self {
        Self {
            registry,
            store: HolderStore::new("root"),
            parent: None,
            invalidator: Invalidator::new(Arc::clone(&bus)),
            bus,
        }
    }

    pub fn new_request(parent: Arc<ResolverCore>) -> Self {
        let registry = Arc::clone(&parent.registry);
        let bus = Arc::clone(&parent.bus);
        Self {
            registry,
            store: HolderStore::new("request"),
            parent: Some(parent),
            invalidator: Invalidator::new(Arc::clone(&bus)),
            bus,
        }
    }

    fn root(&self) -> &ResolverCore {
        self.parent.as_deref().map_or(self, |parent| parent.root())
    }

    pub fn is_registered(&self, token_id: &str) -> bool {
        self.registry.is_registered(token_id)
    }

    pub fn subscribe(&self, name: &str) -> crossbeam_channel::Receiver<DestroyEvent> {
        self.bus.subscribe(name)
    }

    /// Resolves `token_id` per its registered scope, constructing if
    /// needed and blocking on in-flight constructions.
    pub fn resolve(&self, token_id: &str, args: Option<&Value>) -> Result<Instance, ResolveError> {
        self.resolve_traced(token_id, args, None)
            .map(|(_, instance)| instance)
    }

    /// Returns the cached instance only if it is already settled: never
    /// blocks, never constructs.
    pub fn try_get_cached(&self, token_id: &str, args: Option<&Value>) -> Option<Instance> {
        let name = token::instance_name(token_id, args);
        match self.registry.get(token_id).map(|descriptor| descriptor.scope) {
            Some(Scope::Request) if self.parent.is_some() => self.store.try_get(&name),
            Some(Scope::Request) | Some(Scope::Transient) => None,
            Some(Scope::Singleton) | None => self.root().store.try_get(&name),
        }
    }

    /// Pre-seeds a settled holder under the token's name.
    pub fn add_seed(&self, name: &str, instance: Instance) -> Result<(), ResolveError> {
        self.store.store_created(
            name,
            ProviderKind::Value,
            Scope::Singleton,
            instance,
            Vec::new(),
            None,
        )
    }

    pub fn invalidate(&self, name: &str) {
        self.invalidator.invalidate(&self.store, name);
    }

    pub fn clear_all(&self, options: ClearAllOptions) {
        self.invalidator.clear_all(&self.store, options);
    }

    pub fn ready(&self) {
        self.invalidator.ready(&self.store);
    }

    pub fn holder_count(&self) -> usize {
        self.store.len()
    }

    fn resolve_traced(
        &self,
        token_id: &str,
        args: Option<&Value>,
        trace: Option<&Trace<'_>>,
    ) -> Result<(String, Instance), ResolveError> {
        let Some(descriptor) = self.registry.get(token_id) else {
            // Unregistered tokens can still hit a pre-seeded instance.
            let name = token::instance_name(token_id, args);
            let instance = self.root().store.lookup(&name)?;
            return Ok((name, instance));
        };
        match descriptor.scope {
            Scope::Request => {
                if self.parent.is_some() {
                    self.resolve_cached(descriptor, token_id, args, trace)
                } else {
                    Err(ResolveError::CrossScope {
                        token: token_id.into(),
                    })
                }
            }
            Scope::Singleton => self.root().resolve_cached(descriptor, token_id, args, trace),
            Scope::Transient => self.root().resolve_transient(descriptor, token_id, args, trace),
        }
    }

    fn resolve_cached(
        &self,
        descriptor: &Descriptor,
        token_id: &str,
        args: Option<&Value>,
        trace: Option<&Trace<'_>>,
    ) -> Result<(String, Instance), ResolveError> {
        let name = token::instance_name(token_id, args);
        if trace_contains(trace, &name) {
            return Err(ResolveError::CyclicDependency { name });
        }
        match self.store.begin_resolve(
            &name,
            descriptor.provider.kind(),
            descriptor.scope,
            descriptor.ttl,
        ) {
            BeginResolve::Ready(instance) => Ok((name, instance)),
            BeginResolve::Reject(err) => Err(err),
            BeginResolve::Wait(receiver) => {
                let instance = recv_settle(&name, receiver)?;
                Ok((name, instance))
            }
            BeginResolve::Claimed => self.construct(descriptor, &name, &name, args, trace),
        }
    }

    fn resolve_transient(
        &self,
        descriptor: &Descriptor,
        token_id: &str,
        args: Option<&Value>,
        trace: Option<&Trace<'_>>,
    ) -> Result<(String, Instance), ResolveError> {
        let logical = token::instance_name(token_id, args);
        if trace_contains(trace, &logical) {
            return Err(ResolveError::CyclicDependency { name: logical });
        }
        let name = self.store.next_transient_name(&logical);
        match self.store.begin_resolve(
            &name,
            descriptor.provider.kind(),
            descriptor.scope,
            descriptor.ttl,
        ) {
            BeginResolve::Claimed => self.construct(descriptor, &name, &logical, args, trace),
            _ => unreachable!("a freshly allocated transient name should be unclaimed"),
        }
    }

    /// Runs the provider for a claimed holder and settles it. Whatever the
    /// provider resolves through its injector becomes the holder's
    /// dependency set.
    fn construct(
        &self,
        descriptor: &Descriptor,
        name: &str,
        trace_label: &str,
        args: Option<&Value>,
        trace: Option<&Trace<'_>>,
    ) -> Result<(String, Instance), ResolveError> {
        let deps = Mutex::new(HashSet::new());
        let child_trace = Trace {
            name: trace_label,
            previous: trace,
        };
        let injector = TrackingInjector {
            core: self,
            trace: &child_trace,
            deps: &deps,
        };
        match descriptor.provider.provide(&injector, args) {
            Ok(provided) => {
                let shared = provided.instance.dyn_clone();
                self.store.settle_created(
                    name,
                    provided.instance,
                    deps.into_inner(),
                    provided.destroy_listeners,
                );
                Ok((name.to_string(), shared))
            }
            Err(source) => {
                let err = construction_error(name, source);
                self.store.settle_failed(name, err.clone(), deps.into_inner());
                Err(err)
            }
        }
    }
}

/// The chain of identities currently under construction on this call path,
/// used to fail fast on dependency cycles (including transient recursion,
/// which creation dedup alone never catches).
struct Trace<'a> {
    name: &'a str,
    previous: Option<&'a Trace<'a>>,
}

fn trace_contains(trace: Option<&Trace<'_>>, name: &str) -> bool {
    let mut current = trace;
    while let Some(entry) = current {
        if entry.name == name {
            return true;
        }
        current = entry.previous;
    }
    false
}

/// The injector handed to providers: forwards resolution to the owning
/// core while recording every resolved name as a dependency of the
/// instance under construction.
struct TrackingInjector<'a> {
    core: &'a ResolverCore,
    trace: &'a Trace<'a>,
    deps: &'a Mutex<HashSet<String>>,
}

impl Injector for TrackingInjector<'_> {
    fn dyn_get(&self, token_id: &str, args: Option<&Value>) -> Result<Instance, ResolveError> {
        let (name, instance) = self.core.resolve_traced(token_id, args, Some(self.trace))?;
        self.deps.lock().insert(name);
        Ok(instance)
    }
}
