//! Typed data channel
//!
//! A single-writer, many-reader stream of `T` values bound to a topic private
//! to the channel. Two channels never share a topic, even when they carry the
//! same type, and event-channel patterns never observe their traffic.

use crate::dispatcher::Dispatcher;
use crate::subscription::Subscription;
use crate::topic;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

struct DataEnvelope<T> {
    data: T,
}

/// Broadcast stream of `T` values.
pub struct DataChannel<T> {
    id: Uuid,
    topic: String,
    dispatcher: Arc<Dispatcher>,
    _marker: PhantomData<fn(T)>,
}

impl<T> DataChannel<T>
where
    T: Send + Sync + 'static,
{
    /// Create a data channel on `dispatcher` with a fresh private topic.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let id = Uuid::now_v7();
        Self {
            id,
            topic: topic::data_topic(&id),
            dispatcher,
            _marker: PhantomData,
        }
    }

    /// Channel ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Register `handler` for every value published from now on.
    pub fn listen<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.dispatcher.on_envelope(
            self.topic.as_str(),
            move |_, envelope: &DataEnvelope<T>| handler(&envelope.data),
            None,
        )
    }

    /// Deliver `data` to every current listener.
    ///
    /// Values are not buffered: listeners registered later never see them.
    pub fn publish(&self, data: T) {
        self.dispatcher.emit(&self.topic, Arc::new(DataEnvelope { data }));
    }

    /// Number of current listeners.
    pub fn listener_count(&self) -> usize {
        self.dispatcher.listener_count(&self.topic)
    }
}

impl<T> Clone for DataChannel<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            topic: self.topic.clone(),
            dispatcher: self.dispatcher.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for DataChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChannel")
            .field("id", &self.id)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct User {
        id: u32,
        name: String,
    }

    fn user(id: u32, name: &str) -> User {
        User {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_publish_to_all_listeners() {
        let channel = DataChannel::<User>::new(Arc::new(Dispatcher::default()));
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let a = first.clone();
        channel.listen(move |u| a.lock().unwrap().push(u.clone()));
        let b = second.clone();
        channel.listen(move |u| b.lock().unwrap().push(u.id));

        channel.publish(user(1, "Mario"));

        assert_eq!(*first.lock().unwrap(), vec![user(1, "Mario")]);
        assert_eq!(*second.lock().unwrap(), vec![1]);
        assert_eq!(channel.listener_count(), 2);
    }

    #[test]
    fn test_no_buffering() {
        let channel = DataChannel::<u32>::new(Arc::new(Dispatcher::default()));
        channel.publish(1);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        channel.listen(move |n| sink.lock().unwrap().push(*n));
        channel.publish(2);

        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_self_unsubscribing_listener() {
        let channel = DataChannel::<User>::new(Arc::new(Dispatcher::default()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let sink = seen.clone();
        let s = slot.clone();
        let sub = channel.listen(move |u| {
            sink.lock().unwrap().push(u.name.clone());
            if let Some(sub) = s.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        channel.publish(user(1, "Mario"));
        channel.publish(user(2, "Piero"));

        assert_eq!(*seen.lock().unwrap(), vec!["Mario".to_string()]);
        assert_eq!(channel.listener_count(), 0);
    }

    #[test]
    fn test_same_type_channels_are_isolated() {
        let dispatcher = Arc::new(Dispatcher::default());
        let a = DataChannel::<u32>::new(dispatcher.clone());
        let b = DataChannel::<u32>::new(dispatcher);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        b.listen(move |n| sink.lock().unwrap().push(*n));
        a.publish(1);
        b.publish(2);

        assert_ne!(a.id(), b.id());
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_clone_shares_topic() {
        let channel = DataChannel::<u32>::new(Arc::new(Dispatcher::default()));
        let writer = channel.clone();
        let seen = Arc::new(Mutex::new(0));

        let sink = seen.clone();
        channel.listen(move |n| *sink.lock().unwrap() += *n);
        writer.publish(5);

        assert_eq!(*seen.lock().unwrap(), 5);
    }
}
