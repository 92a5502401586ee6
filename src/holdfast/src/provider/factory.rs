use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use serde_json::Value;

use crate::container::injector::Injector;
use crate::container::Managed;
use crate::provider::{DynError, Provided, Provider, ProviderKind};

pub(crate) type Factory<T> =
    Box<dyn Fn(&dyn Injector, Option<&Value>) -> Result<T, DynError> + Send + Sync>;

pub(crate) type DestroyHook<T> = Arc<dyn Fn(&T) -> Result<(), DynError> + Send + Sync>;

/// A [`Provider`] running a closure on every construction.
///
/// The closure receives the injector plus the caller's arguments, so one
/// binding can serve a whole family of parameterized instances; the holder
/// store keys each argument set separately.
pub struct FactoryProvider<T>
where
    T: Managed + Clone,
{
    factory: Factory<T>,
    hook: Option<DestroyHook<T>>,
}

impl<T> FactoryProvider<T>
where
    T: Managed + Clone,
{
    pub(crate) fn new(factory: Factory<T>, hook: Option<DestroyHook<T>>) -> Self {
        Self { factory, hook }
    }
}

impl<T> Debug for FactoryProvider<T>
where
    T: Managed + Clone,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FactoryProvider<T>").finish_non_exhaustive()
    }
}

impl<T> Provider for FactoryProvider<T>
where
    T: Managed + Clone,
{
    fn kind(&self) -> ProviderKind {
        ProviderKind::Factory
    }

    fn provide(
        &self,
        injector: &dyn Injector,
        args: Option<&Value>,
    ) -> Result<Provided, DynError> {
        let value = (self.factory)(injector, args)?;
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

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::container::injector::MockInjector;
    use crate::util::any::Downcast;

    use super::*;

    #[test]
    fn factory_provider_runs_the_closure_per_call() {
        let provider = FactoryProvider::new(
            Box::new(|_, args| {
                let suffix = args
                    .and_then(|v| v.get("suffix"))
                    .and_then(Value::as_str)
                    .unwrap_or("none");
                Ok(format!("built-{suffix}"))
            }),
            None,
        );
        let injector = MockInjector::new();

        let plain = provider.provide(&injector, None).unwrap();
        assert_eq!(
            *plain.instance.downcast::<String>().unwrap(),
            "built-none"
        );
        assert!(plain.destroy_listeners.is_empty());

        let args = json!({"suffix": "a"});
        let parameterized = provider.provide(&injector, Some(&args)).unwrap();
        assert_eq!(
            *parameterized.instance.downcast::<String>().unwrap(),
            "built-a"
        );
    }

    #[test]
    fn factory_provider_wraps_the_destroy_hook() {
        let provider = FactoryProvider::new(
            Box::new(|_, _| Ok(5i32)),
            Some(Arc::new(|value: &i32| {
                assert_eq!(*value, 5);
                Ok(())
            })),
        );
        let injector = MockInjector::new();

        let provided = provider.provide(&injector, None).unwrap();
        assert_eq!(provided.destroy_listeners.len(), 1);
        for listener in provided.destroy_listeners {
            listener().unwrap();
        }
    }
}
