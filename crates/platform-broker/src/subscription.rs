//! Unsubscribe handles
//!
//! Every `on`/`once`/`listen` call returns a [`Subscription`]. Calling
//! [`Subscription::unsubscribe`] removes exactly that registration. Repeated
//! calls are no-ops. Dropping the handle does NOT unsubscribe.
//!
//! Cleanup tied to a registration (a request channel's responder slot) lives
//! on the registration itself and runs in [`Dispatcher::off`], so it fires
//! once however the registration is removed.

use crate::dispatcher::{Dispatcher, HandlerId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Handle to one dispatcher registration.
///
/// Cheap to clone; all clones refer to the same registration. A handler may
/// hold a clone of its own subscription and unsubscribe from inside the
/// callback.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<Inner>,
}

struct Inner {
    id: HandlerId,
    pattern: String,
    // Weak so a handler holding its own subscription does not keep the
    // dispatcher alive.
    dispatcher: Weak<Dispatcher>,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(dispatcher: &Arc<Dispatcher>, id: HandlerId, pattern: String) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                pattern,
                dispatcher: Arc::downgrade(dispatcher),
                active: AtomicBool::new(true),
            }),
        }
    }

    /// Registration ID.
    pub fn id(&self) -> HandlerId {
        self.inner.id
    }

    /// Topic pattern this subscription was registered on.
    pub fn pattern(&self) -> &str {
        &self.inner.pattern
    }

    /// Whether the registration is still present in the dispatcher.
    ///
    /// Turns false after `unsubscribe` and after a `once` handler fired.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
            && self
                .inner
                .dispatcher
                .upgrade()
                .is_some_and(|d| d.contains(self.inner.id))
    }

    /// Remove the registration.
    ///
    /// Returns `true` only if this call removed it. A `once` handler that
    /// already fired leaves nothing to remove.
    pub fn unsubscribe(&self) -> bool {
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return false;
        }

        self.inner
            .dispatcher
            .upgrade()
            .is_some_and(|dispatcher| dispatcher.off(self.inner.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("pattern", &self.inner.pattern)
            .field("active", &self.inner.active.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::dispatcher::RemoveHook;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let dispatcher = Arc::new(Dispatcher::new(BrokerConfig::default()));
        let sub = dispatcher.on("test.topic", |_, _| {});

        assert!(sub.is_active());
        assert!(sub.unsubscribe());
        assert!(!sub.is_active());
        assert!(!sub.unsubscribe());
        assert!(dispatcher.is_empty());
    }

    fn counting_hook(calls: &Arc<AtomicUsize>) -> Option<RemoveHook> {
        let counter = calls.clone();
        Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_hook_runs_once() {
        let dispatcher = Arc::new(Dispatcher::new(BrokerConfig::default()));
        let calls = Arc::new(AtomicUsize::new(0));

        let sub = dispatcher.on_envelope::<(), _>(
            "test.topic",
            |_, _| {},
            counting_hook(&calls),
        );

        let clone = sub.clone();
        sub.unsubscribe();
        clone.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hook_runs_when_removed_by_id() {
        let dispatcher = Arc::new(Dispatcher::new(BrokerConfig::default()));
        let calls = Arc::new(AtomicUsize::new(0));

        let sub = dispatcher.on_envelope::<(), _>(
            "test.topic",
            |_, _| {},
            counting_hook(&calls),
        );

        assert!(dispatcher.off(sub.id()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The handle has nothing left to remove.
        assert!(!sub.is_active());
        assert!(!sub.unsubscribe());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_after_once_fired() {
        let dispatcher = Arc::new(Dispatcher::new(BrokerConfig::default()));
        let sub = dispatcher.once("test.topic", |_, _| {});

        dispatcher.emit("test.topic", Arc::new(()));

        assert!(!sub.is_active());
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_unsubscribe_after_dispatcher_dropped() {
        let dispatcher = Arc::new(Dispatcher::new(BrokerConfig::default()));
        let sub = dispatcher.on("test.topic", |_, _| {});
        drop(dispatcher);

        assert!(!sub.is_active());
        assert!(!sub.unsubscribe());
    }
}
