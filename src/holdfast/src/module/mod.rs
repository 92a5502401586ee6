pub mod dsl;

use std::any;

use crate::container::registry::Configurer;
use crate::provider::DynError;

pub use dsl::bind;

/// A cohesive group of bindings, registered as a whole before any
/// resolution starts.
///
/// Registration is an explicit, eager call sequence: [`Container::init`]
/// runs every module exactly once and fails with the aggregated errors if
/// any binding is invalid, so a successfully initialized container never
/// discovers registration problems at resolution time.
///
/// [`Container::init`]: crate::container::Container::init
pub trait Module {
    /// Registers this module's bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if the bindings can't be assembled, e.g. some
    /// external resource needed to decide the configuration is missing.
    fn configure(&self, configurer: &mut dyn Configurer) -> Result<(), DynError>;

    /// Runs [`Module::configure`] and funnels its failure into the
    /// configurer as a module-level registration error.
    fn setup(&self, configurer: &mut dyn Configurer)
    where
        Self: Sized,
    {
        if let Err(err) = self.configure(configurer) {
            configurer.report_module_error(any::type_name::<Self>(), err);
        }
    }
}
