use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use serde_json::Value;

use crate::container::core::ResolverCore;
use crate::container::events::{DestroyEvent, EventBus};
use crate::container::injector::{downcast_instance, ResolveError};
use crate::container::invalidate::ClearAllOptions;
use crate::container::registry::{ConfigurerImpl, RegistryError};
use crate::container::request::{ActiveRequests, RequestError, ScopedContainer};
use crate::container::Managed;
use crate::module::Module;
use crate::token::Token;

/// The public facade over the lifecycle engine: token registry, the
/// process-wide holder store, the invalidator and the set of active
/// request contexts.
///
/// Cloning a [`Container`] yields another handle onto the same engine;
/// handles are cheap and freely shared across threads.
#[derive(Clone)]
pub struct Container {
    core: Arc<ResolverCore>,
    active: Arc<ActiveRequests>,
}

impl Container {
    /// Builds a container from a module's bindings. Registration runs
    /// exactly once, before any resolution; every binding problem is
    /// reported here, aggregated.
    ///
    /// # Errors
    ///
    /// Returns an error if any binding is invalid, e.g. two bindings
    /// share one token id.
    pub fn init<M: Module>(module: M) -> Result<Self, RegistryError> {
        let mut configurer = ConfigurerImpl::new();
        module.setup(&mut configurer);
        let registry = configurer
            .finish()
            .map_err(|errors| RegistryError::Aggregated { errors })?;
        Ok(Self {
            core: Arc::new(ResolverCore::new_root(
                Arc::new(registry),
                Arc::new(EventBus::default()),
            )),
            active: Arc::new(ActiveRequests::default()),
        })
    }

    /// Resolves the instance for `token` per its registered scope,
    /// constructing it if needed. Blocks while a concurrent caller is
    /// constructing the same identity and returns the same shared
    /// instance once it settles.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is neither registered nor
    /// pre-seeded, if the instance is expired or being torn down, if its
    /// construction failed (cached until invalidation), or if resolution
    /// closes a dependency cycle. Request-scoped tokens always fail here:
    /// they resolve through [`Container::begin_request`].
    pub fn get<T>(&self, token: &Token<T>) -> Result<T, ResolveError>
    where
        T: Managed,
    {
        self.core
            .resolve(token.id(), None)
            .and_then(|instance| downcast_instance(token.id(), instance))
    }

    /// Like [`Container::get`], parameterized by `args`: each distinct
    /// argument set owns one cached instance.
    pub fn get_with<T>(&self, token: &Token<T>, args: &Value) -> Result<T, ResolveError>
    where
        T: Managed,
    {
        self.core
            .resolve(token.id(), Some(args))
            .and_then(|instance| downcast_instance(token.id(), instance))
    }

    /// Returns the instance only if it is already `Created` and
    /// unexpired. Never blocks, never constructs.
    pub fn try_get_sync<T>(&self, token: &Token<T>) -> Option<T>
    where
        T: Managed,
    {
        self.core
            .try_get_cached(token.id(), None)
            .and_then(|instance| downcast_instance(token.id(), instance).ok())
    }

    /// Pre-seeds a settled holder for `token`, bypassing construction.
    /// The token does not need a registered binding; bootstrap values and
    /// test doubles go through here.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is currently mid-construction or
    /// mid-teardown.
    pub fn add_instance<T>(&self, token: &Token<T>, value: T) -> Result<(), ResolveError>
    where
        T: Managed + Clone,
    {
        self.core.add_seed(token.id(), Box::new(value))
    }

    /// Destroys the named holder and everything transitively depending on
    /// it, so the next resolution reconstructs. Absent names are a no-op;
    /// concurrent invalidations of the same holder converge on a single
    /// teardown.
    pub fn invalidate(&self, name: &str) {
        self.core.invalidate(name);
    }

    /// Invalidates the argument-free instance of `token`.
    pub fn invalidate_token<T>(&self, token: &Token<T>) {
        self.core.invalidate(token.id());
    }

    pub fn is_registered<T>(&self, token: &Token<T>) -> bool {
        self.core.is_registered(token.id())
    }

    /// Opens a request context. Request-scoped resolutions through the
    /// returned handle are private to this context; everything else
    /// delegates back here.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is already active. Ids become reusable
    /// once their context ends.
    pub fn begin_request(&self, id: &str) -> Result<ScopedContainer, RequestError> {
        self.begin_request_with(id, HashMap::new(), 0)
    }

    pub fn begin_request_with(
        &self,
        id: &str,
        metadata: HashMap<String, Value>,
        priority: i32,
    ) -> Result<ScopedContainer, RequestError> {
        ScopedContainer::begin(Arc::clone(&self.core), &self.active, id, metadata, priority)
    }

    /// Ends the request context with this id, destroying every holder it
    /// owns and freeing the id for reuse.
    ///
    /// # Errors
    ///
    /// Returns an error if no such context is active.
    pub fn end_request(&self, id: &str) -> Result<(), RequestError> {
        let scoped = self.active.read().get(id).cloned();
        match scoped {
            Some(scoped) => {
                scoped.dispose();
                Ok(())
            }
            None => Err(RequestError::NotActive { id: id.into() }),
        }
    }

    /// Subscribes to destroy notifications for one instance name.
    pub fn subscribe(&self, name: &str) -> Receiver<DestroyEvent> {
        self.core.subscribe(name)
    }

    /// Blocks until every in-flight creation and destruction — in the
    /// root store and in every active request context — has settled.
    /// Mutates nothing; a barrier before graceful shutdown.
    pub fn ready(&self) {
        self.core.ready();
        let contexts: Vec<ScopedContainer> = self.active.read().values().cloned().collect();
        for scoped in contexts {
            scoped.ready();
        }
    }

    /// Gracefully shuts the engine down: waits for settlement, ends every
    /// active request context, then clears the process-wide store in
    /// dependency order.
    pub fn dispose(&self) {
        self.ready();
        let contexts: Vec<ScopedContainer> = self.active.read().values().cloned().collect();
        for scoped in contexts {
            scoped.dispose();
        }
        self.core.clear_all(ClearAllOptions::default());
    }

    /// Live holders in the process-wide store plus every active request
    /// context.
    pub fn holder_count(&self) -> usize {
        let scoped: usize = self
            .active
            .read()
            .values()
            .map(ScopedContainer::holder_count)
            .sum();
        self.core.holder_count() + scoped
    }
}
