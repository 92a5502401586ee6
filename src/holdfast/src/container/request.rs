use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use snafu::prelude::*;
use tracing::debug;

use crate::container::core::ResolverCore;
use crate::container::injector::{downcast_instance, ContextEndedSnafu, ResolveError};
use crate::container::invalidate::ClearAllOptions;
use crate::container::Managed;
use crate::token::Token;

/// The registry of currently active request contexts, shared between the
/// root container and every scoped handle it produced.
pub(crate) type ActiveRequests = RwLock<HashMap<String, ScopedContainer>>;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum RequestError {
    #[snafu(display("a request context with id {id} is already active"))]
    #[non_exhaustive]
    Conflict { id: String },
    #[snafu(display("no request context with id {id} is active"))]
    #[non_exhaustive]
    NotActive { id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestState {
    Active,
    Ending,
    Ended,
}

struct RequestShared {
    id: String,
    metadata: RwLock<HashMap<String, Value>>,
    priority: i32,
    core: ResolverCore,
    state: Mutex<RequestState>,
    active: Weak<ActiveRequests>,
}

/// A per-request resolution handle with its own private holder store.
///
/// Request-scoped resolutions are served from this context using the same
/// creation-dedup mechanism as the root store, so two different request
/// ids never share a Request-scope instance. Everything else delegates
/// unchanged to the parent container. The context moves
/// `Active -> Ending -> Ended`; once ended, its id becomes reusable and
/// the handle resolves nothing anymore.
#[derive(Clone)]
pub struct ScopedContainer {
    shared: Arc<RequestShared>,
}

impl ScopedContainer {
    pub(crate) fn begin(
        root: Arc<ResolverCore>,
        active: &Arc<ActiveRequests>,
        id: &str,
        metadata: HashMap<String, Value>,
        priority: i32,
    ) -> Result<Self, RequestError> {
        let mut registry = active.write();
        if registry.contains_key(id) {
            return ConflictSnafu { id }.fail();
        }
        let scoped = Self {
            shared: Arc::new(RequestShared {
                id: id.to_string(),
                metadata: RwLock::new(metadata),
                priority,
                core: ResolverCore::new_request(root),
                state: Mutex::new(RequestState::Active),
                active: Arc::downgrade(active),
            }),
        };
        registry.insert(id.to_string(), scoped.clone());
        debug!(id, "request context started");
        Ok(scoped)
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn priority(&self) -> i32 {
        self.shared.priority
    }

    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.shared.metadata.read().get(key).cloned()
    }

    pub fn set_metadata(&self, key: &str, value: Value) {
        self.shared.metadata.write().insert(key.to_string(), value);
    }

    /// Resolves per the token's scope: Request-scope from this context's
    /// private store, everything else through the parent container.
    pub fn get<T>(&self, token: &Token<T>) -> Result<T, ResolveError>
    where
        T: Managed,
    {
        self.ensure_active(token.id())?;
        self.shared
            .core
            .resolve(token.id(), None)
            .and_then(|instance| downcast_instance(token.id(), instance))
    }

    pub fn get_with<T>(&self, token: &Token<T>, args: &Value) -> Result<T, ResolveError>
    where
        T: Managed,
    {
        self.ensure_active(token.id())?;
        self.shared
            .core
            .resolve(token.id(), Some(args))
            .and_then(|instance| downcast_instance(token.id(), instance))
    }

    /// Returns the instance only if it is already settled here (or in the
    /// parent, for shared scopes). Never blocks, never constructs.
    pub fn try_get_sync<T>(&self, token: &Token<T>) -> Option<T>
    where
        T: Managed,
    {
        if *self.shared.state.lock() != RequestState::Active {
            return None;
        }
        self.shared
            .core
            .try_get_cached(token.id(), None)
            .and_then(|instance| downcast_instance(token.id(), instance).ok())
    }

    /// Invalidates one holder owned by this context, cascading to its
    /// dependents.
    pub fn invalidate(&self, name: &str) {
        self.shared.core.invalidate(name);
    }

    /// Ends the context: destroys every holder it owns (running their
    /// destroy listeners), then frees the id for reuse. Safe to call more
    /// than once; only the first caller drives the teardown.
    pub fn dispose(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state != RequestState::Active {
                return;
            }
            *state = RequestState::Ending;
        }
        self.shared.core.clear_all(ClearAllOptions::default());
        *self.shared.state.lock() = RequestState::Ended;
        if let Some(active) = self.shared.active.upgrade() {
            active.write().remove(&self.shared.id);
        }
        debug!(id = %self.shared.id, "request context ended");
    }

    pub(crate) fn ready(&self) {
        self.shared.core.ready();
    }

    pub(crate) fn holder_count(&self) -> usize {
        self.shared.core.holder_count()
    }

    fn ensure_active(&self, token_id: &str) -> Result<(), ResolveError> {
        if *self.shared.state.lock() == RequestState::Active {
            Ok(())
        } else {
            debug!(id = %self.shared.id, token_id, "resolution against ended context");
            ContextEndedSnafu {
                id: self.shared.id.clone(),
            }
            .fail()
        }
    }
}
