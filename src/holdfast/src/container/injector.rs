use std::error::Error;
use std::sync::Arc;

use serde_json::Value;
use snafu::prelude::*;

use crate::container::{Instance, Managed};
use crate::token::Token;
use crate::util::any::{AsAny, Downcast};

/// The dynamic resolution surface handed to providers during construction.
///
/// Whatever a provider resolves through its injector is recorded as a
/// dependency of the instance under construction, which is what later
/// drives dependency-ordered invalidation.
#[cfg_attr(test, mockall::automock)]
pub trait Injector: Send + Sync {
    /// Resolves the instance for `token_id`, honoring the registered scope.
    /// Blocks if another caller is already constructing the same identity.
    ///
    /// # Errors
    ///
    /// Returns an error if no binding or pre-seeded instance exists, if the
    /// identity is expired or being torn down, if construction fails, or if
    /// the resolution closes a dependency cycle.
    fn dyn_get<'a>(
        &self,
        token_id: &str,
        args: Option<&'a Value>,
    ) -> Result<Instance, ResolveError>;
}

/// A static variant of [`Injector`], leveraging typed tokens.
pub trait TypedInjector: Injector {
    fn get<T>(&self, token: &Token<T>) -> Result<T, ResolveError>
    where
        T: Managed,
    {
        self.dyn_get(token.id(), None)
            .and_then(|instance| downcast_instance(token.id(), instance))
    }

    fn get_with<T>(&self, token: &Token<T>, args: &Value) -> Result<T, ResolveError>
    where
        T: Managed,
    {
        self.dyn_get(token.id(), Some(args))
            .and_then(|instance| downcast_instance(token.id(), instance))
    }
}

impl<I: Injector + ?Sized> TypedInjector for I {}

pub(crate) fn construction_error(
    name: &str,
    source: Box<dyn Error + Send + Sync>,
) -> ResolveError {
    ResolveError::Construction {
        name: name.into(),
        source: Arc::from(source),
    }
}

pub(crate) fn downcast_instance<T: Managed>(
    name: &str,
    instance: Instance,
) -> Result<T, ResolveError> {
    match instance.downcast::<T>() {
        Ok(value) => Ok(*value),
        Err(instance) => WrongTypeSnafu {
            name,
            actual: (*instance).type_name(),
        }
        .fail(),
    }
}

/// Everything that can go wrong while resolving or looking up an instance.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum ResolveError {
    #[snafu(display("no binding or instance exists under the name {name}"))]
    #[non_exhaustive]
    NotFound { name: String },
    #[snafu(display("the instance {name} is being torn down, retry once it settles"))]
    #[non_exhaustive]
    Destroying { name: String },
    #[snafu(display("the instance {name} outlived its ttl and awaits invalidation"))]
    #[non_exhaustive]
    Expired { name: String },
    #[snafu(display("could not construct the instance {name}"))]
    #[non_exhaustive]
    Construction {
        name: String,
        source: Arc<dyn Error + Send + Sync>,
    },
    #[snafu(display("could not construct the instance {name} which depends on itself somehow"))]
    #[non_exhaustive]
    CyclicDependency { name: String },
    #[snafu(display("token {token} is Request-scoped but no request context is active here"))]
    #[non_exhaustive]
    CrossScope { token: String },
    #[snafu(display("request context {id} already ended and no longer resolves anything"))]
    #[non_exhaustive]
    ContextEnded { id: String },
    #[snafu(display("the instance {name} is a {actual}, not the requested type"))]
    #[non_exhaustive]
    WrongType { name: String, actual: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_instance_succeeds_when_type_matches() {
        let instance: Instance = Box::new(42i32);
        assert_eq!(downcast_instance::<i32>("n", instance).unwrap(), 42);
    }

    #[test]
    fn downcast_instance_fails_when_type_differs() {
        let instance: Instance = Box::new(42i32);
        let err = downcast_instance::<u64>("n", instance).unwrap_err();
        assert!(matches!(err, ResolveError::WrongType { .. }));
    }

    #[test]
    fn construction_error_is_cloneable_and_keeps_its_source() {
        let err = construction_error("db", "boom".into());
        let copy = err.clone();
        assert!(copy.to_string().contains("db"));
    }
}
