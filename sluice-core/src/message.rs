//! Immutable event values.
//!
//! An [`Event`] carries a [`Payload`], a map of attributes describing where the
//! message came from, and a map of flow variables. Every event is bound to
//! exactly one [`EventContext`]. Changing any field produces a new event; the
//! maps are shared behind `Arc` so clones stay cheap.

use crate::context::EventContext;
use bytes::Bytes;
use serde_json::Value;
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Attribute map of an event. Attributes describe the message origin.
pub type Attributes = HashMap<String, Value>;

/// Variable map of an event. Variables are set by processors along the flow.
pub type Variables = HashMap<String, Value>;

/// The body of an event.
#[derive(Clone, Default)]
pub enum Payload {
    /// No body.
    #[default]
    Empty,
    /// Raw bytes.
    Bytes(Bytes),
    /// UTF-8 text.
    Text(String),
    /// Structured JSON.
    Json(Value),
    /// An arbitrary in-process value. Cannot be serialized or hashed.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Payload {
    /// Wraps an arbitrary value as an opaque payload.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Payload::Opaque(Arc::new(value))
    }

    /// Returns `true` for [`Payload::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// Returns `true` for [`Payload::Opaque`].
    pub fn is_opaque(&self) -> bool {
        matches!(self, Payload::Opaque(_))
    }

    /// Serialized form of the payload, or `None` when it cannot be serialized.
    ///
    /// `Empty` and `Opaque` payloads have no stable byte representation.
    pub fn to_bytes(&self) -> Option<Cow<'_, [u8]>> {
        match self {
            Payload::Empty | Payload::Opaque(_) => None,
            Payload::Bytes(bytes) => Some(Cow::Borrowed(bytes.as_ref())),
            Payload::Text(text) => Some(Cow::Borrowed(text.as_bytes())),
            Payload::Json(value) => serde_json::to_vec(value).ok().map(Cow::Owned),
        }
    }

    /// JSON view of the payload used by expressions and aggregation.
    ///
    /// Text is exposed as a JSON string, bytes as a string when they are valid
    /// UTF-8. Opaque payloads have no JSON view.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Payload::Empty => Some(Value::Null),
            Payload::Bytes(bytes) => std::str::from_utf8(bytes)
                .ok()
                .map(|s| Value::String(s.to_owned())),
            Payload::Text(text) => Some(Value::String(text.clone())),
            Payload::Json(value) => Some(value.clone()),
            Payload::Opaque(_) => None,
        }
    }

    /// Text view of the payload, if it is text or UTF-8 bytes.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            Payload::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Downcasts an opaque payload.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Payload::Opaque(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Payload::Empty => "empty",
            Payload::Bytes(_) => "bytes",
            Payload::Text(_) => "text",
            Payload::Json(_) => "json",
            Payload::Opaque(_) => "opaque",
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Bytes(bytes) => f.debug_tuple("Bytes").field(bytes).finish(),
            Payload::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Payload::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Payload::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Payload::Empty, Payload::Empty) => true,
            (Payload::Bytes(a), Payload::Bytes(b)) => a == b,
            (Payload::Text(a), Payload::Text(b)) => a == b,
            (Payload::Json(a), Payload::Json(b)) => a == b,
            (Payload::Opaque(a), Payload::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_owned())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Bytes(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(value))
    }
}

/// An immutable message travelling through a flow.
#[derive(Clone)]
pub struct Event {
    payload: Arc<Payload>,
    attributes: Arc<Attributes>,
    variables: Arc<Variables>,
    context: EventContext,
}

impl Event {
    /// Creates an event with no attributes or variables.
    pub fn new(payload: impl Into<Payload>, context: EventContext) -> Self {
        Self {
            payload: Arc::new(payload.into()),
            attributes: Arc::default(),
            variables: Arc::default(),
            context,
        }
    }

    /// Starts building an event bound to `context`.
    pub fn builder(context: EventContext) -> EventBuilder {
        EventBuilder {
            payload: Payload::Empty,
            attributes: Attributes::new(),
            variables: Variables::new(),
            context,
        }
    }

    /// The message body.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// All attributes.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// A single attribute.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// All flow variables.
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// A single flow variable.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// The context this event is bound to.
    pub fn context(&self) -> &EventContext {
        &self.context
    }

    /// Returns a copy with a new payload.
    pub fn with_payload(&self, payload: impl Into<Payload>) -> Self {
        Self {
            payload: Arc::new(payload.into()),
            ..self.clone()
        }
    }

    /// Returns a copy with the attribute map replaced.
    pub fn with_attributes(&self, attributes: Attributes) -> Self {
        Self {
            attributes: Arc::new(attributes),
            ..self.clone()
        }
    }

    /// Returns a copy with `name` set to `value`.
    pub fn with_variable(&self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut variables = Variables::clone(&self.variables);
        variables.insert(name.into(), value.into());
        Self {
            variables: Arc::new(variables),
            ..self.clone()
        }
    }

    /// Returns a copy with every entry of `other` merged into the variables.
    pub fn with_variables(&self, other: impl IntoIterator<Item = (String, Value)>) -> Self {
        let mut variables = Variables::clone(&self.variables);
        variables.extend(other);
        Self {
            variables: Arc::new(variables),
            ..self.clone()
        }
    }

    /// Returns a copy without the variable `name`.
    pub fn without_variable(&self, name: &str) -> Self {
        if !self.variables.contains_key(name) {
            return self.clone();
        }
        let mut variables = Variables::clone(&self.variables);
        variables.remove(name);
        Self {
            variables: Arc::new(variables),
            ..self.clone()
        }
    }

    /// Quick copy of this event bound to another context.
    ///
    /// Used when forking into a child context and when mapping a child's
    /// result back onto its parent.
    pub fn rebind(&self, context: EventContext) -> Self {
        Self {
            context,
            ..self.clone()
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("context", &self.context.id())
            .field("payload", &self.payload)
            .field("attributes", &self.attributes)
            .field("variables", &self.variables)
            .finish()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event[{}] payload={}",
            self.context.id(),
            self.payload.kind()
        )
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.context.id() == other.context.id()
            && self.payload == other.payload
            && self.attributes == other.attributes
            && self.variables == other.variables
    }
}

/// Builder for [`Event`].
#[derive(Debug)]
pub struct EventBuilder {
    payload: Payload,
    attributes: Attributes,
    variables: Variables,
    context: EventContext,
}

impl EventBuilder {
    /// Sets the payload.
    pub fn payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Adds an attribute.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Adds a variable.
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Builds the event.
    pub fn build(self) -> Event {
        Event {
            payload: Arc::new(self.payload),
            attributes: Arc::new(self.attributes),
            variables: Arc::new(self.variables),
            context: self.context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextArena;
    use serde_json::json;

    #[test]
    fn test_with_variable_leaves_original_untouched() {
        let arena = ContextArena::with_defaults();
        let event = Event::new("hello", arena.new_root());
        let changed = event.with_variable("count", 3);

        assert!(event.variable("count").is_none());
        assert_eq!(changed.variable("count"), Some(&json!(3)));
        assert_eq!(changed.payload(), event.payload());
    }

    #[test]
    fn test_rebind_keeps_message_data() {
        let arena = ContextArena::with_defaults();
        let root = arena.new_root();
        let event = Event::builder(root.clone())
            .payload(json!({"a": 1}))
            .attribute("statusCode", 200)
            .build();
        let child = root.new_child(Default::default());
        let rebound = event.rebind(child.clone());

        assert_eq!(rebound.context().id(), child.id());
        assert_eq!(rebound.payload(), event.payload());
        assert_eq!(rebound.attribute("statusCode"), Some(&json!(200)));
        assert_ne!(rebound, event);
    }

    #[test]
    fn test_payload_serialization_views() {
        assert_eq!(
            Payload::from("abc").to_bytes().as_deref(),
            Some(&b"abc"[..])
        );
        assert!(Payload::opaque(5u32).to_bytes().is_none());
        assert!(Payload::Empty.to_bytes().is_none());
        assert_eq!(Payload::opaque(5u32).downcast_ref::<u32>(), Some(&5));
        assert_eq!(
            Payload::from(b"hi".to_vec()).to_json(),
            Some(Value::String("hi".into()))
        );
    }
}
