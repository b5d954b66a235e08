//! Broker root
//!
//! A [`Broker`] owns one [`Dispatcher`] and hands out channels bound to it.
//! Channels created from the same broker share the dispatcher; channels from
//! different brokers never see each other.
//!
//! Most applications use one broker per process. [`Broker::init`] installs
//! the process-wide instance with a chosen configuration; [`Broker::global`]
//! returns it, falling back to the default configuration when `init` was
//! never called. Tests and libraries that want isolation construct their own
//! with [`Broker::new`].

use crate::config::BrokerConfig;
use crate::data::DataChannel;
use crate::dispatcher::{Dispatcher, DispatcherStats};
use crate::error::{BrokerError, BrokerResult};
use crate::event::EventChannel;
use crate::request::RequestChannel;
use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<Broker> = OnceLock::new();

/// Factory for channels sharing one dispatcher.
#[derive(Debug, Clone)]
pub struct Broker {
    dispatcher: Arc<Dispatcher>,
}

impl Broker {
    /// Create a broker with the default configuration.
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Create a broker with a custom configuration.
    pub fn with_config(config: BrokerConfig) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(config)),
        }
    }

    /// Install the process-wide broker.
    ///
    /// # Errors
    ///
    /// [`BrokerError::AlreadyInitialized`] if `init` already ran or
    /// [`Broker::global`] was already used.
    pub fn init(config: BrokerConfig) -> BrokerResult<&'static Broker> {
        let mut installed = false;
        let broker = GLOBAL.get_or_init(|| {
            installed = true;
            Broker::with_config(config)
        });

        if !installed {
            return Err(BrokerError::AlreadyInitialized);
        }
        tracing::debug!(config = ?broker.dispatcher.config(), "Global broker initialized");
        Ok(broker)
    }

    /// The process-wide broker.
    pub fn global() -> &'static Broker {
        GLOBAL.get_or_init(Broker::new)
    }

    /// The shared dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Create an event channel.
    pub fn event_channel(&self) -> EventChannel {
        EventChannel::new(self.dispatcher.clone())
    }

    /// Create a data channel with its own private topic.
    pub fn data_channel<T>(&self) -> DataChannel<T>
    where
        T: Send + Sync + 'static,
    {
        let channel = DataChannel::new(self.dispatcher.clone());
        tracing::debug!(
            channel_id = %channel.id(),
            data_type = std::any::type_name::<T>(),
            "Data channel created"
        );
        channel
    }

    /// Create a request channel with its own private topics.
    pub fn request_channel<T, K>(&self) -> RequestChannel<T, K>
    where
        T: Send + 'static,
        K: Send + 'static,
    {
        let channel = RequestChannel::new(self.dispatcher.clone());
        tracing::debug!(
            channel_id = %channel.id(),
            request_type = std::any::type_name::<T>(),
            reply_type = std::any::type_name::<K>(),
            "Request channel created"
        );
        channel
    }

    /// Get dispatcher stats.
    pub fn stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_channels_share_dispatcher() {
        let broker = Broker::new();
        let events = broker.event_channel();
        let data = broker.data_channel::<u32>();
        let requests = broker.request_channel::<u32, u32>();

        events.on("a.*", |_, _| {});
        data.listen(|_| {});
        requests.listen(|n, reply| reply.send(n)).unwrap();

        assert_eq!(broker.dispatcher().len(), 3);
        assert_eq!(broker.stats().active_registrations, 3);
    }

    #[test]
    fn test_brokers_are_isolated() {
        let a = Broker::new();
        let b = Broker::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        b.event_channel().on("#", move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        a.event_channel().emit("anything", [json!(1)]);

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wildcard_events_never_see_channel_traffic() {
        let broker = Broker::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        broker.event_channel().on("#", move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        broker.data_channel::<u32>().publish(1);
        let requests = broker.request_channel::<u32, u32>();
        requests.listen(|n, reply| reply.send(n)).unwrap();
        requests.create(1, |_| {});

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_global_is_single_instance() {
        let first = Broker::global();
        let second = Broker::global();

        assert!(Arc::ptr_eq(first.dispatcher(), second.dispatcher()));
        assert_eq!(
            Broker::init(BrokerConfig::default()).unwrap_err(),
            BrokerError::AlreadyInitialized
        );
    }
}
