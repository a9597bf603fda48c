//! Logging processor for event observation.

use sluice_core::{Component, Event, ProcessResult, Processor};
use std::borrow::Cow;
use tracing::Level;

/// A processor that logs every event passing through it and forwards it
/// unchanged.
#[derive(Debug, Clone)]
pub struct LoggingProcessor {
    message: Cow<'static, str>,
    level: Level,
}

impl LoggingProcessor {
    /// Logs at `INFO` with the given message.
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
            level: Level::INFO,
        }
    }

    /// Sets the level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

impl Default for LoggingProcessor {
    fn default() -> Self {
        Self::new("processing event")
    }
}

impl Component for LoggingProcessor {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("logger")
    }
}

impl Processor for LoggingProcessor {
    async fn process(&self, event: Event) -> ProcessResult {
        let context = event.context().id();
        let message = self.message.as_ref();
        match self.level {
            Level::ERROR => tracing::error!(%context, ?event, "{message}"),
            Level::WARN => tracing::warn!(%context, ?event, "{message}"),
            Level::INFO => tracing::info!(%context, ?event, "{message}"),
            Level::DEBUG => tracing::debug!(%context, ?event, "{message}"),
            _ => tracing::trace!(%context, ?event, "{message}"),
        }
        Ok(Some(event))
    }
}
