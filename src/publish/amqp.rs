//! AMQP 0-9-1 publisher built on lapin
//!
//! Messages go to the default exchange with the queue name as routing key,
//! marked persistent. With publisher confirms enabled every publish waits
//! for the broker's ack; without them a successful publish only means the
//! local transport accepted the frame, and the result says so.

use crate::config::BrokerConfig;
use crate::model::Listing;
use crate::publish::{Delivery, OutboundMessage, PublishError, PublishResult, Publisher, QueueConnector};
use async_trait::async_trait;
use std::future::Future;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel as AmqpChannel, Connection, ConnectionProperties};
use url::Url;

const REPLY_SUCCESS: u16 = 200;

/// Builds an `amqp://` URI from broker configuration
///
/// Credentials and the virtual host are percent-encoded. The default vhost
/// "/" is left implicit.
pub fn amqp_uri(config: &BrokerConfig) -> PublishResult<String> {
    let mut uri = Url::parse(&format!("amqp://{}:{}", config.host, config.port))
        .map_err(|e| PublishError::Address(format!("{}:{}: {}", config.host, config.port, e)))?;

    uri.set_username(&config.user)
        .map_err(|_| PublishError::Address("broker user cannot be set".to_string()))?;
    uri.set_password(Some(&config.pass))
        .map_err(|_| PublishError::Address("broker password cannot be set".to_string()))?;

    if config.vhost != "/" && !config.vhost.is_empty() {
        uri.set_path(&format!("/{}", config.vhost.replace('/', "%2F")));
    }

    Ok(uri.to_string())
}

/// Opens AMQP channels to the configured broker
pub struct AmqpConnector {
    uri: String,
    endpoint: String,
    queue: String,
    confirms: bool,
}

impl AmqpConnector {
    pub fn new(config: &BrokerConfig) -> PublishResult<Self> {
        Ok(Self {
            uri: amqp_uri(config)?,
            endpoint: format!("{}:{}", config.host, config.port),
            queue: config.queue_name.clone(),
            confirms: config.publisher_confirms,
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    async fn open_channel(&self, connection: &Connection) -> PublishResult<AmqpChannel> {
        let channel = connection.create_channel().await?;

        if self.confirms {
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await?;
        } else {
            tracing::warn!(
                "Publisher confirms disabled: publishes to '{}' are only accepted locally, not acknowledged by the broker",
                self.queue
            );
        }

        // Declaration is idempotent for an identical durable queue
        channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        Ok(channel)
    }
}

#[async_trait]
impl QueueConnector for AmqpConnector {
    type Channel = AmqpPublisher;

    async fn connect(&self) -> PublishResult<AmqpPublisher> {
        tracing::info!("Connecting to broker at {}...", self.endpoint);
        let connection = Connection::connect(&self.uri, ConnectionProperties::default()).await?;

        let channel = match self.open_channel(&connection).await {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(close_err) = connection.close(REPLY_SUCCESS, "setup failed").await {
                    tracing::debug!("Error closing broker connection after failed setup: {}", close_err);
                }
                return Err(e);
            }
        };

        tracing::info!(
            "Connected to broker and declared durable queue '{}'",
            self.queue
        );

        Ok(AmqpPublisher {
            connection,
            channel,
            queue: self.queue.clone(),
            confirms: self.confirms,
        })
    }
}

/// An open channel publishing to one durable queue
pub struct AmqpPublisher {
    connection: Connection,
    channel: AmqpChannel,
    queue: String,
    confirms: bool,
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn publish(&self, listing: &Listing) -> PublishResult<Delivery> {
        let message = OutboundMessage::from_listing(listing, &self.queue)?;
        let properties = BasicProperties::default()
            .with_delivery_mode(message.delivery_mode())
            .with_content_type("application/json".into());

        let confirmation = self
            .channel
            .basic_publish(
                "",
                &message.routing_key,
                BasicPublishOptions::default(),
                &message.payload,
                properties,
            )
            .await?
            .await?;

        let delivery = match confirmation {
            Confirmation::Ack(_) => Delivery::Confirmed,
            Confirmation::Nack(_) => {
                return Err(PublishError::Nacked {
                    queue: self.queue.clone(),
                })
            }
            Confirmation::NotRequested => Delivery::Unconfirmed,
        };

        if self.confirms && delivery == Delivery::Unconfirmed {
            tracing::warn!("Broker did not confirm publish to '{}'", self.queue);
        }

        tracing::debug!("Sent message to queue '{}': {}", self.queue, listing.title());
        Ok(delivery)
    }

    async fn close(&self) -> PublishResult<()> {
        let channel = async {
            if self.channel.status().connected() {
                self.channel.close(REPLY_SUCCESS, "OK").await
            } else {
                Ok(())
            }
        };
        let connection = async {
            if self.connection.status().connected() {
                self.connection.close(REPLY_SUCCESS, "OK").await
            } else {
                Ok(())
            }
        };

        close_in_order(channel, connection).await?;
        tracing::info!("Broker connection closed");
        Ok(())
    }
}

/// Closes the channel, then the connection, even when the channel close fails
///
/// # Returns
///
/// The channel's error if it had one, otherwise the connection's result.
async fn close_in_order<E: std::fmt::Display>(
    channel: impl Future<Output = Result<(), E>>,
    connection: impl Future<Output = Result<(), E>>,
) -> Result<(), E> {
    let channel_result = channel.await;
    if let Err(e) = &channel_result {
        tracing::warn!("Failed to close broker channel: {}", e);
    }
    let connection_result = connection.await;
    channel_result.and(connection_result)
}
