//! # Platform Broker
//!
//! This crate provides in-process messaging for the Relay platform, letting
//! independent components of one process talk without holding references to
//! each other.
//!
//! ## Overview
//!
//! The platform-broker crate handles:
//! - **Event Channels**: Named events with hierarchical wildcard matching
//! - **Data Channels**: Typed one-to-many streams on private topics
//! - **Request Channels**: Typed one-to-one request/reply with correlation
//! - **Dispatcher**: The shared synchronous registry underneath all three
//!
//! All delivery is synchronous: `emit`, `publish` and `create` return after
//! every matching handler ran.
//!
//! ## Usage
//!
//! ### Events
//!
//! ```rust
//! use platform_broker::Broker;
//! use serde_json::json;
//!
//! let broker = Broker::new();
//! let events = broker.event_channel();
//!
//! // Subscribe to all document events
//! let sub = events.on("document.*", |name, values| {
//!     println!("{name}: {values:?}");
//! });
//!
//! events.emit("document.created", [json!({"title": "My Document"})]);
//! sub.unsubscribe();
//! ```
//!
//! ### Data
//!
//! ```rust
//! use platform_broker::Broker;
//!
//! struct User {
//!     id: u32,
//!     name: String,
//! }
//!
//! let broker = Broker::new();
//! let users = broker.data_channel::<User>();
//!
//! let _sub = users.listen(|user| println!("{} {}", user.id, user.name));
//! users.publish(User { id: 1, name: "Mario".to_string() });
//! ```
//!
//! ### Requests
//!
//! ```rust
//! use platform_broker::{Broker, BrokerError};
//!
//! let broker = Broker::new();
//! let chat = broker.request_channel::<String, usize>();
//!
//! // Nobody listening yet: fails immediately
//! chat.create("ping".to_string(), |result| {
//!     assert_eq!(result, Err(BrokerError::MissingListener));
//! });
//!
//! let responder = chat.listen(|text, reply| reply.send(text.len())).unwrap();
//! chat.create("Messaggio 1".to_string(), |result| {
//!     assert_eq!(result, Ok(11));
//! });
//! responder.unsubscribe();
//! ```
//!
//! ## Topic Patterns
//!
//! Event names are `.`-delimited:
//! - `document.created` - Specific event
//! - `document.*` - All direct document events
//! - `*.created` - Creation events of any kind
//! - `#` - All events
//!
//! Wildcards:
//! - `*` matches exactly one segment
//! - `#` matches zero or more segments
//!
//! Data and request channels use private topics derived from a fresh UUID.
//! Event patterns, even `#`, never observe their traffic.

pub mod broker;
pub mod config;
pub mod data;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod request;
pub mod subscription;
pub mod topic;

// Re-export main types
pub use broker::Broker;
pub use config::BrokerConfig;
pub use data::DataChannel;
pub use dispatcher::{Dispatcher, DispatcherStats, HandlerId, Payload};
pub use error::{BrokerError, BrokerResult};
pub use event::EventChannel;
pub use request::{Reply, RequestChannel};
pub use subscription::Subscription;
