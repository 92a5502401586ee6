pub mod construct;
pub mod factory;
pub mod instance;

use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use serde_json::Value;

use crate::container::injector::Injector;
use crate::container::Instance;

pub use construct::{Construct, ConstructProvider};
pub use factory::FactoryProvider;
pub use instance::ValueProvider;

/// The error type providers report construction failures with.
pub type DynError = Box<dyn Error + Send + Sync>;

/// A teardown callback collected at construction time and run once when the
/// owning holder is destroyed.
pub type DestroyListener = Box<dyn FnOnce() -> Result<(), DynError> + Send + Sync>;

/// How a binding produces its instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// A type constructed through its [`Construct`] implementation.
    Class,
    /// A closure, optionally parameterized per call.
    Factory,
    /// A pre-built value cloned out on every construction.
    Value,
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Class => "Class",
            Self::Factory => "Factory",
            Self::Value => "Value",
        };
        write!(f, "{name}")
    }
}

/// The outcome of one successful construction: the instance itself plus the
/// destroy listeners it registered.
pub struct Provided {
    pub instance: Instance,
    pub destroy_listeners: Vec<DestroyListener>,
}

impl Provided {
    pub fn new(instance: Instance) -> Self {
        Self {
            instance,
            destroy_listeners: Vec::new(),
        }
    }

    pub fn with_listener(instance: Instance, listener: DestroyListener) -> Self {
        Self {
            instance,
            destroy_listeners: vec![listener],
        }
    }
}

/// A universal factory which constructs instances for one token.
///
/// A [`Provider`] is a stateless object and may be called by multiple
/// threads; uniqueness of shared instances is enforced by the holder store,
/// never by the provider itself. Each call must produce a newly created
/// value together with whatever destroy listeners that value wants run at
/// teardown.
pub trait Provider: Debug + Send + Sync + 'static {
    /// The registration kind recorded on holders built from this provider.
    fn kind(&self) -> ProviderKind;

    /// Constructs one instance. Dependencies must be fetched through
    /// `injector` so the engine can record them. `args` carries the
    /// caller-supplied arguments for parameterized tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if a dependency can't be fetched or the
    /// construction itself fails.
    fn provide(
        &self,
        injector: &dyn Injector,
        args: Option<&Value>,
    ) -> Result<Provided, DynError>;
}
