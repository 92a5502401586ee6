use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::container::injector::Injector;
use crate::container::registry::{Configurer, Descriptor};
use crate::container::Managed;
use crate::provider::factory::{DestroyHook, Factory};
use crate::provider::{Construct, ConstructProvider, DynError, FactoryProvider, ValueProvider};
use crate::scope::Scope;
use crate::token::Token;

/// Starts a binding for `token`. Chain a source (`to_construct`,
/// `to_factory`, `to_factory_with_args`, `to_instance`), optionally a
/// scope, ttl and destroy hook, and finish with `set_on(configurer)`:
///
/// ```rust
/// # use std::sync::Arc;
/// # use holdfast::container::registry::Configurer;
/// # use holdfast::module::bind;
/// # use holdfast::scope::Scope;
/// # use holdfast::token;
/// # fn setup(configurer: &mut dyn Configurer) {
/// bind(token::named::<Arc<String>>("greeting"))
///     .to_factory(|_| Ok(Arc::new(String::from("hello"))))
///     .in_scope(Scope::Request)
///     .set_on(configurer);
/// # }
/// ```
pub fn bind<T>(token: Token<T>) -> Binding<T> {
    Binding { token }
}

pub struct Binding<T> {
    token: Token<T>,
}

impl<T> Binding<T>
where
    T: Managed + Clone,
{
    pub fn to_factory<F>(self, factory: F) -> FactoryBinding<T>
    where
        F: Fn(&dyn Injector) -> Result<T, DynError> + Send + Sync + 'static,
    {
        FactoryBinding::new(
            self.token,
            Box::new(move |injector, _| factory(injector)),
        )
    }

    /// Binds a factory whose result is parameterized by the caller's
    /// arguments; each distinct argument set owns one instance. A call
    /// without arguments receives [`Value::Null`].
    pub fn to_factory_with_args<F>(self, factory: F) -> FactoryBinding<T>
    where
        F: Fn(&dyn Injector, &Value) -> Result<T, DynError> + Send + Sync + 'static,
    {
        FactoryBinding::new(
            self.token,
            Box::new(move |injector, args| factory(injector, args.unwrap_or(&Value::Null))),
        )
    }

    pub fn to_instance(self, value: T) -> InstanceBinding<T> {
        InstanceBinding {
            token: self.token,
            value,
            hook: None,
            scope: Scope::Singleton,
            ttl: None,
        }
    }
}

impl<C: Construct> Binding<Arc<C>> {
    pub fn to_construct(self) -> ConstructBinding<C> {
        ConstructBinding {
            token_id: self.token.id(),
            scope: Scope::Singleton,
            ttl: None,
            _marker: std::marker::PhantomData,
        }
    }
}

pub struct FactoryBinding<T>
where
    T: Managed + Clone,
{
    token: Token<T>,
    factory: Factory<T>,
    hook: Option<DestroyHook<T>>,
    scope: Scope,
    ttl: Option<Duration>,
}

impl<T> FactoryBinding<T>
where
    T: Managed + Clone,
{
    fn new(token: Token<T>, factory: Factory<T>) -> Self {
        Self {
            token,
            factory,
            hook: None,
            scope: Scope::Singleton,
            ttl: None,
        }
    }

    pub fn in_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn on_destroy<H>(mut self, hook: H) -> Self
    where
        H: Fn(&T) -> Result<(), DynError> + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn set_on(self, configurer: &mut dyn Configurer) {
        let provider = Box::new(FactoryProvider::new(self.factory, self.hook));
        let mut descriptor = Descriptor::new(provider, self.scope);
        if let Some(ttl) = self.ttl {
            descriptor = descriptor.with_ttl(ttl);
        }
        configurer.register(self.token.id(), descriptor);
    }
}

pub struct ConstructBinding<C: Construct> {
    token_id: &'static str,
    scope: Scope,
    ttl: Option<Duration>,
    _marker: std::marker::PhantomData<fn() -> C>,
}

impl<C: Construct> ConstructBinding<C> {
    pub fn in_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn set_on(self, configurer: &mut dyn Configurer) {
        let provider = Box::new(ConstructProvider::<C>::new());
        let mut descriptor = Descriptor::new(provider, self.scope);
        if let Some(ttl) = self.ttl {
            descriptor = descriptor.with_ttl(ttl);
        }
        configurer.register(self.token_id, descriptor);
    }
}

pub struct InstanceBinding<T>
where
    T: Managed + Clone,
{
    token: Token<T>,
    value: T,
    hook: Option<DestroyHook<T>>,
    scope: Scope,
    ttl: Option<Duration>,
}

impl<T> InstanceBinding<T>
where
    T: Managed + Clone,
{
    pub fn in_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn on_destroy<H>(mut self, hook: H) -> Self
    where
        H: Fn(&T) -> Result<(), DynError> + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn set_on(self, configurer: &mut dyn Configurer) {
        let provider = Box::new(ValueProvider::with_hook(self.value, self.hook));
        let mut descriptor = Descriptor::new(provider, self.scope);
        if let Some(ttl) = self.ttl {
            descriptor = descriptor.with_ttl(ttl);
        }
        configurer.register(self.token.id(), descriptor);
    }
}

#[cfg(test)]
mod tests {
    use crate::container::registry::ConfigurerImpl;
    use crate::provider::ProviderKind;
    use crate::token;

    use super::*;

    struct Widget;

    impl Construct for Widget {
        fn construct(_injector: &dyn Injector) -> Result<Self, DynError> {
            Ok(Self)
        }
    }

    #[test]
    fn bindings_register_their_descriptors() {
        let mut configurer = ConfigurerImpl::new();

        bind(token::named::<i32>("answer"))
            .to_instance(42)
            .set_on(&mut configurer);
        bind(token::named::<String>("report"))
            .to_factory_with_args(|_, args| Ok(args.to_string()))
            .in_scope(Scope::Request)
            .set_on(&mut configurer);
        bind(token::of::<Arc<Widget>>())
            .to_construct()
            .in_scope(Scope::Transient)
            .with_ttl(Duration::from_secs(5))
            .set_on(&mut configurer);

        let registry = configurer.finish().unwrap();
        assert_eq!(registry.len(), 3);

        let report = registry.get("report").unwrap();
        assert_eq!(report.scope, Scope::Request);
        assert_eq!(report.provider.kind(), ProviderKind::Factory);

        let widget = registry.get(token::of::<Arc<Widget>>().id()).unwrap();
        assert_eq!(widget.scope, Scope::Transient);
        assert_eq!(widget.ttl, Some(Duration::from_secs(5)));
        assert_eq!(widget.provider.kind(), ProviderKind::Class);
    }
}
