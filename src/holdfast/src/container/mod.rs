pub mod injector;
pub mod registry;

mod core;
mod events;
mod graph;
mod handle;
mod invalidate;
mod request;
mod store;

use std::fmt;

use crate::util::any::AsAny;

pub use events::DestroyEvent;
pub use handle::Container;
pub use invalidate::ClearAllOptions;
pub use request::{RequestError, ScopedContainer};

/// A value the engine can hold and hand out to concurrent resolvers.
///
/// Shared scopes clone the stored value on every hit, so sharing semantics
/// follow from the value's own [`Clone`]: an `Arc<T>` yields the same
/// underlying instance to every caller, which is what bindings almost
/// always register.
pub trait Managed: AsAny + Send + Sync + 'static {
    fn dyn_clone(&self) -> Box<dyn Managed>;
}

impl<T> Managed for T
where
    T: Clone + Send + Sync + 'static,
{
    fn dyn_clone(&self) -> Box<dyn Managed> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for dyn Managed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("type", &self.type_name())
            .finish()
    }
}

/// A type-erased constructed value, as stored in an instance holder.
pub type Instance = Box<dyn Managed>;
