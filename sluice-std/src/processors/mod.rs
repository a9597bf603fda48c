//! Standard plain processors.

mod logging;
mod map;

pub use logging::LoggingProcessor;
pub use map::{MapProcessor, TryMapProcessor};
