//! Standard routers.
//!
//! - [`ChoiceRouter`] - the first route whose condition accepts the event
//! - [`ScatterGatherRouter`] - every route concurrently, results aggregated

mod choice;
mod scatter_gather;

pub use choice::ChoiceRouter;
pub use scatter_gather::ScatterGatherRouter;
