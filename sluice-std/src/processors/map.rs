//! Event transformation processors.

use sluice_core::{BoxError, Component, Event, ProcessError, ProcessResult, Processor};
use std::borrow::Cow;

/// Transforms every event with a synchronous function.
pub struct MapProcessor<F> {
    name: Cow<'static, str>,
    mapper: F,
}

impl<F> MapProcessor<F>
where
    F: Fn(Event) -> Event + Send + Sync + 'static,
{
    /// Creates a map processor.
    pub fn new(name: impl Into<Cow<'static, str>>, mapper: F) -> Self {
        Self {
            name: name.into(),
            mapper,
        }
    }
}

impl<F> Component for MapProcessor<F>
where
    F: Fn(Event) -> Event + Send + Sync + 'static,
{
    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }
}

impl<F> Processor for MapProcessor<F>
where
    F: Fn(Event) -> Event + Send + Sync + 'static,
{
    async fn process(&self, event: Event) -> ProcessResult {
        Ok(Some((self.mapper)(event)))
    }
}

/// Transforms every event with a fallible synchronous function.
///
/// An error becomes a business failure of this processor.
pub struct TryMapProcessor<F> {
    name: Cow<'static, str>,
    mapper: F,
}

impl<F> TryMapProcessor<F>
where
    F: Fn(Event) -> Result<Event, BoxError> + Send + Sync + 'static,
{
    /// Creates a fallible map processor.
    pub fn new(name: impl Into<Cow<'static, str>>, mapper: F) -> Self {
        Self {
            name: name.into(),
            mapper,
        }
    }
}

impl<F> Component for TryMapProcessor<F>
where
    F: Fn(Event) -> Result<Event, BoxError> + Send + Sync + 'static,
{
    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }
}

impl<F> Processor for TryMapProcessor<F>
where
    F: Fn(Event) -> Result<Event, BoxError> + Send + Sync + 'static,
{
    async fn process(&self, event: Event) -> ProcessResult {
        (self.mapper)(event)
            .map(Some)
            .map_err(ProcessError::business)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::ContextArena;

    #[tokio::test]
    async fn test_map_and_try_map() {
        let arena = ContextArena::with_defaults();
        let event = Event::new("a", arena.new_root());

        let shout = MapProcessor::new("shout", |e: Event| {
            let text = e.payload().as_str().unwrap_or_default().to_uppercase();
            e.with_payload(text)
        });
        let out = shout.process(event.clone()).await.unwrap().unwrap();
        assert_eq!(out.payload().as_str(), Some("A"));

        let parse = TryMapProcessor::new("parse", |e: Event| {
            let n: u32 = e.payload().as_str().unwrap_or_default().parse()?;
            Ok(e.with_payload(serde_json::json!(n)))
        });
        let err = parse.process(event).await.unwrap_err();
        assert!(err.is_business());
    }
}
