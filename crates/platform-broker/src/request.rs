//! Typed request/reply channel
//!
//! One responder answers `T` requests with `K` replies. Each request carries a
//! fresh correlation ID, and both the request and its reply are addressed by
//! `(channel ID, correlation ID)`, so any number of requests can be in flight
//! and replies may arrive in any order.
//!
//! ## State machine
//! ```text
//!   idle ── listen() ──► listening ── unsubscribe() / off(id) ──► idle
//! ```
//! `listen` while listening fails with [`BrokerError::ListenerAlreadyExists`].
//! A request with nobody listening fails immediately with
//! [`BrokerError::MissingListener`] instead of waiting forever.
//!
//! ## Topics
//! - responder: `request.<channel>.*`
//! - request:   `request.<channel>.<correlation>`
//! - reply:     `reply.<channel>.<correlation>` (fire-once)
//!
//! ```rust
//! use platform_broker::Broker;
//!
//! # async fn example() -> platform_broker::BrokerResult<()> {
//! let broker = Broker::new();
//! let lengths = broker.request_channel::<String, usize>();
//!
//! let _responder = lengths.listen(|text: String, reply| reply.send(text.len()))?;
//!
//! assert_eq!(lengths.create_async("hello".to_string()).await?, 5);
//! # Ok(())
//! # }
//! ```

use crate::dispatcher::{Dispatcher, HandlerId};
use crate::error::{BrokerError, BrokerResult};
use crate::subscription::Subscription;
use crate::topic;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

struct RequestEnvelope<T> {
    correlation_id: Uuid,
    payload: Mutex<Option<T>>,
}

struct ReplyEnvelope<K> {
    result: Mutex<Option<BrokerResult<K>>>,
}

fn take<V>(slot: &Mutex<Option<V>>) -> Option<V> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// Handle a responder uses to answer one request.
///
/// Sending consumes the handle, so each request is answered at most once.
/// Dropping it unanswered fails the request with
/// [`BrokerError::ReplyDropped`]. The handle is `Send` and may be moved to
/// another task to answer later.
pub struct Reply<K: Send + 'static> {
    correlation_id: Uuid,
    target: Option<(Arc<Dispatcher>, String)>,
    _marker: PhantomData<fn(K)>,
}

impl<K: Send + 'static> Reply<K> {
    fn new(dispatcher: Arc<Dispatcher>, channel_id: &Uuid, correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            target: Some((dispatcher, topic::reply_topic(channel_id, &correlation_id))),
            _marker: PhantomData,
        }
    }

    /// Correlation ID of the request being answered.
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Answer the request with `value`.
    pub fn send(mut self, value: K) {
        self.deliver(Ok(value));
    }

    fn deliver(&mut self, result: BrokerResult<K>) {
        let Some((dispatcher, topic)) = self.target.take() else {
            return;
        };
        let envelope = ReplyEnvelope {
            result: Mutex::new(Some(result)),
        };
        if dispatcher.emit(&topic, Arc::new(envelope)) == 0 {
            // Waiter timed out or was canceled
            tracing::debug!(
                correlation_id = %self.correlation_id,
                "Reply has no waiting requester"
            );
        }
    }
}

impl<K: Send + 'static> Drop for Reply<K> {
    fn drop(&mut self) {
        if self.target.is_some() {
            tracing::warn!(
                correlation_id = %self.correlation_id,
                "Reply dropped without a value"
            );
            self.deliver(Err(BrokerError::ReplyDropped));
        }
    }
}

impl<K: Send + 'static> fmt::Debug for Reply<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("correlation_id", &self.correlation_id)
            .field("sent", &self.target.is_none())
            .finish()
    }
}

/// One-to-one request/reply exchange of `T` requests and `K` replies.
///
/// Clones refer to the same channel and share its responder slot.
pub struct RequestChannel<T, K> {
    id: Uuid,
    dispatcher: Arc<Dispatcher>,
    listening: Arc<AtomicBool>,
    _marker: PhantomData<fn(T) -> K>,
}

impl<T, K> RequestChannel<T, K>
where
    T: Send + 'static,
    K: Send + 'static,
{
    /// Create a request channel on `dispatcher` with fresh private topics.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            id: Uuid::now_v7(),
            dispatcher,
            listening: Arc::new(AtomicBool::new(false)),
            _marker: PhantomData,
        }
    }

    /// Channel ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether a responder is registered.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Register the channel's responder.
    ///
    /// `responder` is called once per request with the request value and a
    /// [`Reply`] handle. Unsubscribing the returned handle removes the
    /// responder and lets a new one register.
    ///
    /// # Errors
    ///
    /// [`BrokerError::ListenerAlreadyExists`] if a responder is already
    /// registered; the existing responder is left untouched.
    pub fn listen<F>(&self, responder: F) -> BrokerResult<Subscription>
    where
        F: Fn(T, Reply<K>) + Send + Sync + 'static,
    {
        if self
            .listening
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(channel_id = %self.id, "Responder already registered");
            return Err(BrokerError::ListenerAlreadyExists);
        }

        let channel_id = self.id;
        // Weak: the handler lives inside the dispatcher it points to.
        let dispatcher = Arc::downgrade(&self.dispatcher);
        let listening = self.listening.clone();

        let subscription = self.dispatcher.on_envelope(
            topic::request_pattern(&self.id),
            move |_, envelope: &RequestEnvelope<T>| {
                let (Some(data), Some(dispatcher)) = (take(&envelope.payload), dispatcher.upgrade())
                else {
                    return;
                };
                responder(data, Reply::new(dispatcher, &channel_id, envelope.correlation_id));
            },
            Some(Box::new(move || {
                listening.store(false, Ordering::Release);
                tracing::debug!(channel_id = %channel_id, "Responder removed");
            })),
        );

        tracing::debug!(channel_id = %self.id, "Responder registered");
        Ok(subscription)
    }

    /// Send `data` to the responder; `on_reply` receives the outcome.
    ///
    /// With no responder registered, `on_reply` is called right away with
    /// [`BrokerError::MissingListener`] and nothing is dispatched. Otherwise
    /// it is called once, when the responder replies (synchronously, before
    /// `create` returns, if the responder answers in-line).
    pub fn create<F>(&self, data: T, on_reply: F)
    where
        F: FnOnce(BrokerResult<K>) + Send + 'static,
    {
        self.dispatch(data, on_reply);
    }

    /// Send `data` to the responder and await the reply.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::MissingListener`] with no responder registered
    /// - [`BrokerError::ReplyDropped`] if the responder dropped its reply
    /// - [`BrokerError::Canceled`] if the pending reply was discarded
    pub async fn create_async(&self, data: T) -> BrokerResult<K> {
        let (tx, rx) = oneshot::channel();
        self.create(data, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(BrokerError::Canceled))
    }

    /// Like [`RequestChannel::create_async`], giving up after `timeout`.
    ///
    /// On timeout the pending reply registration is removed; a late reply is
    /// discarded. Must run inside a Tokio runtime with the timer enabled.
    ///
    /// # Errors
    ///
    /// [`BrokerError::Timeout`] in addition to those of `create_async`.
    pub async fn create_timeout(&self, data: T, timeout: Duration) -> BrokerResult<K> {
        let (tx, rx) = oneshot::channel();
        let pending = self.dispatch(data, move |result| {
            let _ = tx.send(result);
        });

        match tokio::time::timeout(timeout, rx).await {
            Ok(result) => result.unwrap_or(Err(BrokerError::Canceled)),
            Err(_) => {
                if let Some(reply_id) = pending {
                    self.dispatcher.off(reply_id);
                }
                tracing::warn!(channel_id = %self.id, ?timeout, "Request timed out");
                Err(BrokerError::Timeout(timeout))
            }
        }
    }

    // Returns the reply registration when a request went out.
    fn dispatch<F>(&self, data: T, on_reply: F) -> Option<HandlerId>
    where
        F: FnOnce(BrokerResult<K>) + Send + 'static,
    {
        if !self.is_listening() {
            tracing::debug!(channel_id = %self.id, "Request without responder");
            on_reply(Err(BrokerError::MissingListener));
            return None;
        }

        let correlation_id = Uuid::now_v7();
        let pending = Arc::new(Mutex::new(Some(on_reply)));

        // Registered before the request goes out: the responder may answer
        // in-line.
        let waiter = pending.clone();
        let reply_id = self.dispatcher.once_envelope(
            topic::reply_topic(&self.id, &correlation_id),
            move |_, envelope: &ReplyEnvelope<K>| {
                if let Some(on_reply) = take(&waiter) {
                    on_reply(take(&envelope.result).unwrap_or(Err(BrokerError::Canceled)));
                }
            },
        );

        let request = RequestEnvelope {
            correlation_id,
            payload: Mutex::new(Some(data)),
        };
        let delivered = self.dispatcher.emit(
            &topic::request_topic(&self.id, &correlation_id),
            Arc::new(request),
        );

        // Responder left between the check and the emit.
        if delivered == 0 && self.dispatcher.off(reply_id) {
            if let Some(on_reply) = take(&pending) {
                on_reply(Err(BrokerError::MissingListener));
            }
            return None;
        }

        Some(reply_id)
    }
}

impl<T, K> Clone for RequestChannel<T, K> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            dispatcher: self.dispatcher.clone(),
            listening: self.listening.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, K> fmt::Debug for RequestChannel<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestChannel")
            .field("id", &self.id)
            .field("listening", &self.listening.load(Ordering::Relaxed))
            .finish()
    }
}
