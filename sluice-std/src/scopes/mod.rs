//! Standard scopes.
//!
//! A scope wraps a nested [`Chain`](sluice_core::Chain) and adds behaviour
//! around it:
//!
//! - [`TryScope`] - handles failures of the nested chain
//! - [`TimeoutScope`] - races the nested chain against a deadline
//! - [`TracingScope`] - runs the nested chain inside a tracing span
//! - [`RedeliveryPolicy`] - limits redelivery of failing messages

/// Implements the lifecycle methods of `Component` by delegating to chain
/// fields. Initialisation runs in field order and rolls back on failure.
macro_rules! delegate_lifecycle {
    ($($chain:ident),+ $(,)?) => {
        fn initialise(&self) -> Result<(), sluice_core::LifecycleError> {
            let chains: &[&sluice_core::Chain] = &[$(&self.$chain),+];
            for (index, chain) in chains.iter().enumerate() {
                if let Err(error) = sluice_core::Component::initialise(*chain) {
                    chains[..index]
                        .iter()
                        .rev()
                        .for_each(|done| sluice_core::Component::dispose(*done));
                    return Err(error);
                }
            }
            Ok(())
        }

        fn start(&self) -> Result<(), sluice_core::LifecycleError> {
            $( sluice_core::Component::start(&self.$chain)?; )+
            Ok(())
        }

        fn stop(&self) -> Result<(), sluice_core::LifecycleError> {
            let chains: &[&sluice_core::Chain] = &[$(&self.$chain),+];
            chains
                .iter()
                .rev()
                .try_for_each(|chain| sluice_core::Component::stop(*chain))
        }

        fn dispose(&self) {
            let chains: &[&sluice_core::Chain] = &[$(&self.$chain),+];
            chains
                .iter()
                .rev()
                .for_each(|chain| sluice_core::Component::dispose(*chain));
        }
    };
}

mod redelivery;
mod timeout;
mod traced;
mod try_scope;

pub use redelivery::{
    DigestAlgorithm, REDELIVERY_FAIL_ON_FIRST, RedeliveryCounter, RedeliveryPolicy,
    RedeliveryPolicyConfig,
};
pub use timeout::TimeoutScope;
pub use traced::{TRACE_ID_ATTRIBUTE, TracingScope};
pub use try_scope::{ERROR_VARIABLE, OnError, TryScope};
