#![allow(clippy::new_without_default)]

pub mod container;
pub mod module;
pub mod provider;
pub mod scope;
pub mod token;

mod util;

pub mod prelude {
    pub use crate::container::injector::{Injector, ResolveError, TypedInjector};
    pub use crate::container::registry::{Configurer, RegistryError};
    pub use crate::container::{
        ClearAllOptions, Container, DestroyEvent, RequestError, ScopedContainer,
    };
    pub use crate::module::{bind, Module};
    pub use crate::provider::{Construct, DynError};
    pub use crate::scope::Scope;
    pub use crate::token::{self, Token};
}
