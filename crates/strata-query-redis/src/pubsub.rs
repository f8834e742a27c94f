//! Publish/subscribe channels.
//!
//! A [`Subscription`] owns a dedicated pub/sub connection. A background task
//! forwards incoming messages into a local buffer so that [`Subscription::next`]
//! never blocks.

use crate::{command_error, RedisStore};
use futures::StreamExt;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use strata_query::{DataError, Result};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A message received on a subscribed channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub channel: String,
    pub payload: String,
}

/// Live subscription to one channel. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    receiver: mpsc::UnboundedReceiver<ChannelMessage>,
    forwarder: JoinHandle<()>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next buffered message, `None` when nothing has arrived yet
    pub fn next(&mut self) -> Result<Option<ChannelMessage>> {
        match self.receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(DataError::backend(
                format!("Subscription to {} ended", self.channel),
                "pub/sub connection closed",
            )),
        }
    }

    /// Tear the subscription down
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!("Closing subscription to {}", self.channel);
        self.forwarder.abort();
    }
}

impl RedisStore {
    /// Broadcast `message` on `channel`, returning how many subscribers got it
    pub async fn publish(&self, channel: &str, message: &str) -> Result<usize> {
        let mut conn = self.connection().await?;

        debug!("PUBLISH {} {}", channel, message);
        conn.publish(channel, message)
            .await
            .map_err(command_error(format!("Failed to publish to {}", channel)))
    }

    /// Subscribe to `channel`. The server has confirmed the subscription when this
    /// returns, so messages published afterwards are delivered.
    ///
    /// Must be called within a tokio runtime, which runs the forwarding task.
    pub async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let mut pubsub = self.client().get_async_pubsub().await.map_err(command_error(
            format!(
                "Failed to open pub/sub connection to {}",
                self.config().connection_string()
            ),
        ))?;

        pubsub
            .subscribe(channel)
            .await
            .map_err(command_error(format!("Failed to subscribe to {}", channel)))?;
        debug!("Subscribed to {}", channel);

        let (sender, receiver) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let message = ChannelMessage {
                    channel: msg.get_channel_name().to_string(),
                    payload: String::from_utf8_lossy(msg.get_payload_bytes()).into_owned(),
                };
                if sender.send(message).is_err() {
                    break;
                }
            }
            warn!("Pub/sub message stream ended");
        });

        Ok(Subscription {
            channel: channel.to_string(),
            receiver,
            forwarder,
        })
    }
}
