use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use serde_json::Value;

use crate::container::injector::Injector;
use crate::container::Managed;
use crate::provider::factory::DestroyHook;
use crate::provider::{DynError, Provided, Provider, ProviderKind};

/// A [`Provider`] handing out clones of a pre-built value.
///
/// Bound values typically are `Arc`s, so every clone shares the one
/// underlying instance.
pub struct ValueProvider<T>
where
    T: Managed + Clone,
{
    value: T,
    hook: Option<DestroyHook<T>>,
}

impl<T> ValueProvider<T>
where
    T: Managed + Clone,
{
    pub fn new(value: T) -> Self {
        Self { value, hook: None }
    }

    pub(crate) fn with_hook(value: T, hook: Option<DestroyHook<T>>) -> Self {
        Self { value, hook }
    }
}

impl<T> Debug for ValueProvider<T>
where
    T: Managed + Clone,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ValueProvider<T>").finish_non_exhaustive()
    }
}

impl<T> Provider for ValueProvider<T>
where
    T: Managed + Clone,
{
    fn kind(&self) -> ProviderKind {
        ProviderKind::Value
    }

    fn provide(
        &self,
        _injector: &dyn Injector,
        _args: Option<&Value>,
    ) -> Result<Provided, DynError> {
        let value = self.value.clone();
        match &self.hook {
            Some(hook) => {
                let hook = Arc::clone(hook);
                let held = value.clone();
                Ok(Provided::with_listener(
                    Box::new(value),
                    Box::new(move || hook(&held)),
                ))
            }
            None => Ok(Provided::new(Box::new(value))),
        }
    }
}
