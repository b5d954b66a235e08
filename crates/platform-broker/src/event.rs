//! Event channel
//!
//! Broadcasts named events carrying any number of JSON values. Event names
//! are caller-supplied topics; handlers register on patterns:
//!
//! ```rust
//! use platform_broker::Broker;
//! use serde_json::json;
//!
//! let broker = Broker::new();
//! let events = broker.event_channel();
//!
//! let sub = events.on("user.*", |name, values| {
//!     println!("{name}: {values:?}");
//! });
//!
//! events.emit("user.created", [json!(42), json!("alice")]);
//! sub.unsubscribe();
//! ```

use crate::dispatcher::Dispatcher;
use crate::subscription::Subscription;
use serde_json::Value;
use std::sync::Arc;

/// Payload wrapper so event handlers only see event traffic.
struct EventEnvelope {
    values: Vec<Value>,
}

/// Named event broadcast over the shared dispatcher.
#[derive(Debug, Clone)]
pub struct EventChannel {
    dispatcher: Arc<Dispatcher>,
}

impl EventChannel {
    /// Create an event channel on `dispatcher`.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Subscribe `handler` to every event matching `pattern`.
    ///
    /// The handler receives the emitted event name and values.
    pub fn on<F>(&self, pattern: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&str, &[Value]) + Send + Sync + 'static,
    {
        self.dispatcher.on_envelope(
            pattern,
            move |name, envelope: &EventEnvelope| handler(name, &envelope.values),
            None,
        )
    }

    /// Subscribe `handler` to the next event matching `pattern` only.
    pub fn once<F>(&self, pattern: impl Into<String>, handler: F) -> Subscription
    where
        F: FnOnce(&str, &[Value]) + Send + 'static,
    {
        let pattern = pattern.into();
        let deliver = move |name: &str, e: &EventEnvelope| handler(name, &e.values);
        let id = self.dispatcher.once_envelope(pattern.clone(), deliver);
        Subscription::new(&self.dispatcher, id, pattern)
    }

    /// Emit `event` with `values` to every matching subscriber.
    ///
    /// A missing subscriber is a no-op.
    pub fn emit<I>(&self, event: &str, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        let envelope = EventEnvelope {
            values: values.into_iter().collect(),
        };
        self.dispatcher.emit(event, Arc::new(envelope));
    }
}
