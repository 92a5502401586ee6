use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use crate::container::injector::Injector;
use crate::provider::{DynError, Provided, Provider, ProviderKind};

/// A type that has a dedicated constructor for dependency injection.
///
/// Implementors fetch their dependencies from the injector and build
/// themselves; the engine wraps the result in an [`Arc`] and shares it
/// according to the binding's scope. [`Construct::on_destroy`] is collected
/// as a destroy listener at construction time and runs once when the
/// instance is invalidated or its owning store is torn down.
///
/// ```rust
/// # use std::sync::Arc;
/// # use holdfast::container::injector::{Injector, TypedInjector};
/// # use holdfast::provider::{Construct, DynError};
/// # use holdfast::token;
/// struct Config { url: String }
///
/// struct Database { config: Arc<Config> }
///
/// impl Construct for Database {
///     fn construct(injector: &dyn Injector) -> Result<Self, DynError> {
///         let config = injector.get(&token::of::<Arc<Config>>())?;
///         Ok(Self { config })
///     }
///
///     fn on_destroy(&self) -> Result<(), DynError> {
///         // close pools, flush buffers, ...
///         Ok(())
///     }
/// }
/// ```
pub trait Construct: Sized + Send + Sync + 'static {
    /// Retrieves the dependencies from the injector and creates the value.
    ///
    /// # Errors
    ///
    /// Returns an error if a dependency can't be fetched or the value
    /// itself can't be built.
    fn construct(injector: &dyn Injector) -> Result<Self, DynError>;

    /// Teardown hook, run during invalidation. The default does nothing.
    fn on_destroy(&self) -> Result<(), DynError> {
        Ok(())
    }
}

/// A [`Provider`] constructing `Arc<C>` through `C`'s [`Construct`]
/// implementation.
pub struct ConstructProvider<C: Construct> {
    _marker: PhantomData<fn() -> C>,
}

impl<C: Construct> ConstructProvider<C> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<C: Construct> Debug for ConstructProvider<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ConstructProvider<C>").finish_non_exhaustive()
    }
}

impl<C: Construct> Provider for ConstructProvider<C> {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Class
    }

    fn provide(
        &self,
        injector: &dyn Injector,
        _args: Option<&Value>,
    ) -> Result<Provided, DynError> {
        let built = Arc::new(C::construct(injector)?);
        let hooked = Arc::clone(&built);
        Ok(Provided::with_listener(
            Box::new(built),
            Box::new(move || hooked.on_destroy()),
        ))
    }
}
