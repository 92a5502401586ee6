use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

use snafu::prelude::*;

use crate::provider::{DynError, Provider};
use crate::scope::Scope;

/// Everything the engine needs to know about one registered token: how to
/// construct instances, which lifetime they get, and an optional ttl after
/// which `get` reports them expired.
///
/// Descriptors are registered once, before any resolution, and never
/// mutated afterwards.
#[derive(Debug)]
pub struct Descriptor {
    pub(crate) scope: Scope,
    pub(crate) ttl: Option<Duration>,
    pub(crate) provider: Box<dyn Provider>,
}

impl Descriptor {
    pub fn new(provider: Box<dyn Provider>, scope: Scope) -> Self {
        Self {
            scope,
            ttl: None,
            provider,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// The immutable token-id → descriptor map resolution reads from.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    entries: HashMap<String, Descriptor>,
}

impl TokenRegistry {
    pub(crate) fn get(&self, token_id: &str) -> Option<&Descriptor> {
        self.entries.get(token_id)
    }

    pub fn is_registered(&self, token_id: &str) -> bool {
        self.entries.contains_key(token_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The registration sink a [`Module`] writes its bindings into.
///
/// [`Module`]: crate::module::Module
pub trait Configurer: Send {
    fn register(&mut self, token_id: &str, descriptor: Descriptor);

    fn report_module_error(&mut self, module: &'static str, err: DynError);
}

pub(crate) struct ConfigurerImpl {
    entries: HashMap<String, Descriptor>,
    errors: Vec<RegistryError>,
}

impl ConfigurerImpl {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn finish(self) -> Result<TokenRegistry, Vec<RegistryError>> {
        if self.errors.is_empty() {
            Ok(TokenRegistry {
                entries: self.entries,
            })
        } else {
            Err(self.errors)
        }
    }
}

impl Configurer for ConfigurerImpl {
    fn register(&mut self, token_id: &str, descriptor: Descriptor) {
        if self.entries.contains_key(token_id) {
            self.errors.push(RegistryError::TokenDuplicated {
                token: token_id.to_string(),
            });
        } else {
            self.entries.insert(token_id.to_string(), descriptor);
        }
    }

    fn report_module_error(&mut self, module: &'static str, err: DynError) {
        self.errors
            .push(RegistryError::ModuleInner { module, source: err });
    }
}

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum RegistryError {
    #[snafu(display("the token {token} already exists in the registry"))]
    #[non_exhaustive]
    TokenDuplicated { token: String },
    #[snafu(display("module {module} fails to set up its bindings"))]
    #[non_exhaustive]
    ModuleInner {
        module: &'static str,
        source: DynError,
    },
    #[snafu(display("aggregated registry errors:\n{}", AggregatedDisplayer::new(errors)))]
    Aggregated { errors: Vec<RegistryError> },
}

struct AggregatedDisplayer<'a> {
    errors: &'a [RegistryError],
}

impl<'a> AggregatedDisplayer<'a> {
    fn new(errors: &'a [RegistryError]) -> Self {
        Self { errors }
    }
}

impl Display for AggregatedDisplayer<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for (i, error) in self.errors.iter().enumerate() {
            writeln!(f, "{:4}: {}", i + 1, error)?;
        }
        Ok(())
    }
}
