//! Topic dispatcher
//!
//! The shared registry underneath every channel kind. Handlers register on a
//! topic pattern (see [`crate::topic`]) and `emit` delivers a payload to every
//! handler whose pattern matches, synchronously and in registration order.
//!
//! ## Rules
//! - **In-line delivery**: `emit` returns after every matching handler ran.
//! - **No lock held while handlers run**: handlers may subscribe, unsubscribe
//!   or emit from inside a callback.
//! - **Snapshot per emit**: the set of handlers is fixed when `emit` starts;
//!   a handler removed mid-emit by an earlier handler still runs once.
//! - **Once**: a `once` registration is removed from the registry in the same
//!   critical section that selects it, so no re-entrant emit can deliver it
//!   a second time.
//! - **Type-agnostic**: payloads are `Arc<dyn Any>`; channels downcast to
//!   their own envelope types and skip anything else.

use crate::config::BrokerConfig;
use crate::subscription::Subscription;
use crate::topic;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Opaque payload carried by the dispatcher.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Identity of one registration.
pub type HandlerId = Uuid;

type Handler = Arc<dyn Fn(&str, &Payload) + Send + Sync>;
type OnceHandler = Box<dyn FnOnce(&str, &Payload) + Send>;

/// Callback run once, right after a registration is removed with `off`.
pub(crate) type RemoveHook = Box<dyn FnOnce() + Send>;

enum Callback {
    Persistent(Handler),
    Once(OnceHandler),
}

struct Registration {
    id: HandlerId,
    pattern: String,
    /// Payload type this registration accepts; `None` accepts all
    accepts: Option<TypeId>,
    callback: Callback,
    on_remove: Option<RemoveHook>,
}

impl Registration {
    fn wants(&self, topic: &str, payload_type: TypeId) -> bool {
        self.accepts.map_or(true, |accepts| accepts == payload_type)
            && topic::matches(&self.pattern, topic)
    }
}

#[derive(Default)]
struct Registry {
    registrations: Vec<Registration>,
    /// Patterns that already triggered a leak warning
    warned: HashSet<String>,
}

/// Dispatcher statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    /// Total `emit` calls
    pub events_emitted: u64,
    /// Total handler invocations
    pub events_delivered: u64,
    /// `emit` calls that matched no handler
    pub events_undelivered: u64,
    /// Registrations currently held
    pub active_registrations: usize,
}

/// Synchronous, wildcard-capable publish/subscribe registry.
pub struct Dispatcher {
    registry: Mutex<Registry>,
    config: BrokerConfig,
    events_emitted: AtomicU64,
    events_delivered: AtomicU64,
    events_undelivered: AtomicU64,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("registrations", &self.len())
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            config,
            events_emitted: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            events_undelivered: AtomicU64::new(0),
        }
    }

    /// Configuration this dispatcher was built with.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    // Handlers never run under the lock, so a poisoned registry is still
    // consistent.
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` on `pattern` for every matching emit.
    pub fn on<F>(self: &Arc<Self>, pattern: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&str, &Payload) + Send + Sync + 'static,
    {
        let pattern = pattern.into();
        let id = self.register(
            pattern.clone(),
            None,
            Callback::Persistent(Arc::new(handler)),
            None,
        );
        Subscription::new(self, id, pattern)
    }

    /// Register `handler` on `pattern` for the first matching emit only.
    pub fn once<F>(self: &Arc<Self>, pattern: impl Into<String>, handler: F) -> Subscription
    where
        F: FnOnce(&str, &Payload) + Send + 'static,
    {
        let pattern = pattern.into();
        let id = self.register(
            pattern.clone(),
            None,
            Callback::Once(Box::new(handler)),
            None,
        );
        Subscription::new(self, id, pattern)
    }

    /// Register a handler that only sees payloads of type `E`.
    ///
    /// Other payloads on matching topics skip this registration entirely.
    /// `on_remove` runs once when the registration is removed, whether through
    /// the returned subscription or [`Dispatcher::off`].
    pub(crate) fn on_envelope<E, F>(
        self: &Arc<Self>,
        pattern: impl Into<String>,
        handler: F,
        on_remove: Option<RemoveHook>,
    ) -> Subscription
    where
        E: Any,
        F: Fn(&str, &E) + Send + Sync + 'static,
    {
        let pattern = pattern.into();
        let callback = Callback::Persistent(Arc::new(move |topic: &str, payload: &Payload| {
            if let Some(envelope) = payload.downcast_ref::<E>() {
                handler(topic, envelope);
            }
        }));
        let id = self.register(
            pattern.clone(),
            Some(TypeId::of::<E>()),
            callback,
            on_remove,
        );
        Subscription::new(self, id, pattern)
    }

    /// Register a once handler that only sees payloads of type `E`.
    ///
    /// A payload of another type never consumes the registration.
    pub(crate) fn once_envelope<E, F>(&self, pattern: impl Into<String>, handler: F) -> HandlerId
    where
        E: Any,
        F: FnOnce(&str, &E) + Send + 'static,
    {
        let callback = Callback::Once(Box::new(move |topic: &str, payload: &Payload| {
            if let Some(envelope) = payload.downcast_ref::<E>() {
                handler(topic, envelope);
            }
        }));
        self.register(pattern.into(), Some(TypeId::of::<E>()), callback, None)
    }

    fn register(
        &self,
        pattern: String,
        accepts: Option<TypeId>,
        callback: Callback,
        on_remove: Option<RemoveHook>,
    ) -> HandlerId {
        let id = Uuid::now_v7();
        let once = matches!(callback, Callback::Once(_));

        let mut registry = self.registry();
        registry.registrations.push(Registration {
            id,
            pattern: pattern.clone(),
            accepts,
            callback,
            on_remove,
        });

        let count = registry
            .registrations
            .iter()
            .filter(|r| r.pattern == pattern)
            .count();
        if self.config.exceeds_max_listeners(count) && registry.warned.insert(pattern.clone()) {
            tracing::warn!(
                pattern = %pattern,
                listeners = count,
                max_listeners = self.config.max_listeners,
                "Possible listener leak detected"
            );
        }
        drop(registry);

        tracing::debug!(
            handler_id = %id,
            pattern = %pattern,
            wildcard = topic::is_pattern(&pattern),
            once,
            "Handler registered"
        );
        id
    }

    /// Remove a registration by ID.
    ///
    /// Returns `false` if it was already removed (or a `once` handler fired).
    /// A channel's removal hook runs here, so removing a responder by ID
    /// frees its request channel for a new one.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut registry = self.registry();
        let Some(index) = registry.registrations.iter().position(|r| r.id == id) else {
            return false;
        };
        let removed = registry.registrations.remove(index);
        drop(registry);

        tracing::debug!(handler_id = %id, pattern = %removed.pattern, "Handler removed");
        if let Some(on_remove) = removed.on_remove {
            on_remove();
        }
        true
    }

    /// Deliver `payload` to every handler whose pattern matches `topic`.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&self, topic: &str, payload: Payload) -> usize {
        let concrete: &dyn Any = &*payload;
        let selected = self.select(topic, concrete.type_id());
        let delivered = selected.len();

        self.events_emitted.fetch_add(1, Ordering::Relaxed);
        self.events_delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        if delivered == 0 {
            self.events_undelivered.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(topic = %topic, delivered, "Event emitted");

        for callback in selected {
            match callback {
                Callback::Persistent(handler) => handler(topic, &payload),
                Callback::Once(handler) => handler(topic, &payload),
            }
        }

        delivered
    }

    // Snapshot matching handlers, taking `once` registrations out of the
    // registry before anything runs.
    fn select(&self, topic: &str, payload_type: TypeId) -> Vec<Callback> {
        let mut registry = self.registry();
        let registrations = &mut registry.registrations;
        let mut selected = Vec::new();

        let mut index = 0;
        while index < registrations.len() {
            if !registrations[index].wants(topic, payload_type) {
                index += 1;
                continue;
            }
            if let Callback::Persistent(handler) = &registrations[index].callback {
                selected.push(Callback::Persistent(handler.clone()));
                index += 1;
            } else {
                selected.push(registrations.remove(index).callback);
            }
        }

        selected
    }

    /// Whether a registration with this ID is present.
    pub fn contains(&self, id: HandlerId) -> bool {
        self.registry().registrations.iter().any(|r| r.id == id)
    }

    /// Number of registrations on exactly `pattern`.
    pub fn listener_count(&self, pattern: &str) -> usize {
        self.registry()
            .registrations
            .iter()
            .filter(|r| r.pattern == pattern)
            .count()
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.registry().registrations.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get dispatcher stats.
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_undelivered: self.events_undelivered.load(Ordering::Relaxed),
            active_registrations: self.len(),
        }
    }
}
