//! Push-channel manager for the fleet admin backend.
//!
//! Owns at most one WebSocket connection to the backend event endpoint,
//! multiplexes named topic subscriptions (job progress, container log
//! streams) over it, and reconnects with capped exponential backoff
//! after unexpected drops.
//!
//! Transport and protocol failures never surface as `Err` from the
//! subscription API; they are delivered to error listeners registered
//! with [`ChannelManager::add_error_listener`].

pub mod client;
pub mod config;
pub mod manager;
pub mod memory;
pub mod messages;
pub mod probe;
pub mod reconnect;
pub mod topic;

mod processor;

pub use client::{ChannelError, Connector, Link, LinkEvent, WsConnector};
pub use config::ChannelConfig;
pub use manager::{ChannelManager, ConnectionState, ListenerId};
pub use reconnect::ReconnectConfig;
pub use topic::{Topic, TopicMessage};
