//! Scope capability.
//!
//! A scope wraps a nested [`Chain`] and adds behaviour around it: error
//! handling, deadlines, redelivery limits. Scopes delegate their lifecycle to
//! the nested chain.

use crate::chain::Chain;

/// A processor wrapping a nested chain.
pub trait Scope: Send + Sync {
    /// The wrapped chain.
    fn nested(&self) -> &Chain;
}
