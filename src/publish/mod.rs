//! Queue publishing module
//!
//! This module turns listings into persistent queue messages and delivers
//! them through a [`Publisher`] channel opened by a [`QueueConnector`]:
//! - `OutboundMessage`: the wire form of one listing
//! - `Publisher` / `QueueConnector`: the seam between the worker and the broker
//! - `AmqpConnector` / `AmqpPublisher`: the AMQP 0-9-1 implementation

mod amqp;

pub use amqp::{amqp_uri, AmqpConnector, AmqpPublisher};

use crate::model::Listing;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while publishing
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to serialize listing: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Broker rejected message for queue '{queue}'")]
    Nacked { queue: String },

    #[error("Invalid broker address: {0}")]
    Address(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for publishing operations
pub type PublishResult<T> = Result<T, PublishError>;

/// How far a successful publish is guaranteed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The broker acknowledged the message (publisher confirms)
    Confirmed,

    /// Accepted by the local transport only; the broker never confirmed it
    Unconfirmed,
}

/// Wire representation of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// UTF-8 JSON payload
    pub payload: Vec<u8>,

    /// Queue name, used as routing key on the default exchange
    pub routing_key: String,

    /// Whether the broker should persist the message to disk
    pub persistent: bool,
}

impl OutboundMessage {
    /// AMQP delivery mode for persistent messages
    pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

    /// AMQP delivery mode for transient messages
    pub const TRANSIENT_DELIVERY_MODE: u8 = 1;

    /// Builds a persistent message for `listing` addressed to `queue`
    pub fn from_listing(listing: &Listing, queue: &str) -> PublishResult<Self> {
        Ok(Self {
            payload: listing.to_json()?,
            routing_key: queue.to_string(),
            persistent: true,
        })
    }

    pub fn delivery_mode(&self) -> u8 {
        if self.persistent {
            Self::PERSISTENT_DELIVERY_MODE
        } else {
            Self::TRANSIENT_DELIVERY_MODE
        }
    }
}

/// An open channel to a durable queue
///
/// Implementations must not retry internally; the worker decides what a
/// failed publish means for the batch.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes one listing
    ///
    /// # Returns
    ///
    /// * `Ok(Delivery)` - The transport accepted the message
    /// * `Err(PublishError)` - Serialization failed, the transport failed,
    ///   or the broker refused the message
    async fn publish(&self, listing: &Listing) -> PublishResult<Delivery>;

    /// Closes the channel and its connection
    async fn close(&self) -> PublishResult<()>;
}

/// Opens queue channels
///
/// Every worker pass calls `connect` once, so concurrent passes never share
/// a channel.
#[async_trait]
pub trait QueueConnector: Send + Sync {
    type Channel: Publisher;

    /// Opens a connection and channel, and declares the queue durable
    async fn connect(&self) -> PublishResult<Self::Channel>;
}
