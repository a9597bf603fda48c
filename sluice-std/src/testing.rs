//! Test doubles for pipelines.
//!
//! - [`RecordingProcessor`]: records every event and passes it on
//! - [`SpyProcessor`]: records events and returns a programmed outcome
//! - [`CountingProcessor`]: counts invocations, optionally after a delay
//! - [`FailingProcessor`]: always fails with a business error
//! - [`PassthroughProcessor`]: returns its input unchanged
//!
//! Every double is cheap to clone; clones share their recorded state.

use parking_lot::Mutex;
use sluice_core::{Component, Event, ProcessError, ProcessResult, Processor};
use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Recording Processor
// ============================================================================

/// A processor that records all events it receives.
///
/// # Example
///
/// ```rust,ignore
/// let recorder = RecordingProcessor::new();
/// let chain = Chain::builder().then(recorder.clone()).build();
///
/// chain.process(event).await?;
/// assert_eq!(recorder.count(), 1);
/// ```
#[derive(Clone, Default)]
pub struct RecordingProcessor {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingProcessor {
    /// Create a new recording processor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a clone of the recorded events.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Get the number of recorded events.
    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    /// Clear all recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Component for RecordingProcessor {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("recorder")
    }
}

impl Processor for RecordingProcessor {
    async fn process(&self, event: Event) -> ProcessResult {
        self.events.lock().push(event.clone());
        Ok(Some(event))
    }
}

// ============================================================================
// Spy Processor
// ============================================================================

#[derive(Clone)]
enum Programmed {
    Forward,
    Consume,
    Fail(String),
}

/// A processor that records events and can be programmed to return specific
/// outcomes.
#[derive(Clone)]
pub struct SpyProcessor {
    inputs: Arc<Mutex<Vec<Event>>>,
    outcome: Arc<Mutex<Programmed>>,
}

impl SpyProcessor {
    /// Create a spy that forwards its input.
    pub fn new() -> Self {
        Self {
            inputs: Arc::default(),
            outcome: Arc::new(Mutex::new(Programmed::Forward)),
        }
    }

    /// Forward inputs unchanged.
    pub fn forward(&self) {
        *self.outcome.lock() = Programmed::Forward;
    }

    /// Consume inputs, returning no event.
    pub fn consume(&self) {
        *self.outcome.lock() = Programmed::Consume;
    }

    /// Fail with a business error carrying `message`.
    pub fn fail(&self, message: impl Into<String>) {
        *self.outcome.lock() = Programmed::Fail(message.into());
    }

    /// Get recorded inputs.
    pub fn inputs(&self) -> Vec<Event> {
        self.inputs.lock().clone()
    }

    /// Get the number of times process was called.
    pub fn call_count(&self) -> usize {
        self.inputs.lock().len()
    }
}

impl Default for SpyProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for SpyProcessor {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("spy")
    }
}

impl Processor for SpyProcessor {
    async fn process(&self, event: Event) -> ProcessResult {
        self.inputs.lock().push(event.clone());
        let outcome = self.outcome.lock().clone();
        match outcome {
            Programmed::Forward => Ok(Some(event)),
            Programmed::Consume => Ok(None),
            Programmed::Fail(message) => Err(ProcessError::msg(message)),
        }
    }
}

// ============================================================================
// Counting Processor
// ============================================================================

/// A processor that counts invocations and passes events on.
#[derive(Clone, Default)]
pub struct CountingProcessor {
    count: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl CountingProcessor {
    /// Create a new counting processor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before passing each event on.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the current count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Reset the counter.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}

impl Component for CountingProcessor {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("counter")
    }
}

impl Processor for CountingProcessor {
    async fn process(&self, event: Event) -> ProcessResult {
        self.count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Some(event))
    }
}

// ============================================================================
// Failing Processor
// ============================================================================

/// A processor that always fails with a business error.
#[derive(Clone)]
pub struct FailingProcessor {
    message: Arc<str>,
    attempts: Arc<AtomicUsize>,
}

impl FailingProcessor {
    /// Create a processor failing with `message`.
    pub fn new(message: impl Into<Arc<str>>) -> Self {
        Self {
            message: message.into(),
            attempts: Arc::default(),
        }
    }

    /// Get the number of failed invocations.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Component for FailingProcessor {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("failing")
    }
}

impl Processor for FailingProcessor {
    async fn process(&self, _event: Event) -> ProcessResult {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ProcessError::msg(&*self.message))
    }
}

// ============================================================================
// Pass-through Processor
// ============================================================================

/// A processor that returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughProcessor;

impl Component for PassthroughProcessor {
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("passthrough")
    }
}

impl Processor for PassthroughProcessor {
    async fn process(&self, event: Event) -> ProcessResult {
        Ok(Some(event))
    }
}
