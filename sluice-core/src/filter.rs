//! Filter capability.
//!
//! A filter decides whether an event continues down a chain. The processor
//! that applies the decision (and what happens to rejected events) lives in
//! `sluice-std`.

use crate::message::Event;

/// Predicate deciding whether an event is accepted.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a `Filter`",
    label = "missing `Filter` implementation",
    note = "Implement `accept`, or use a closure `Fn(&Event) -> bool`."
)]
pub trait Filter: Send + Sync {
    /// Returns `true` if the event should continue.
    fn accept(&self, event: &Event) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    fn accept(&self, event: &Event) -> bool {
        self(event)
    }
}
