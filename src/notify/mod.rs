//! Notification channels
//!
//! Notifications are fire-and-forget: [`dispatch`] sends to every configured
//! channel and only logs failures.

pub mod slack;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::Result;
use crate::external;

pub use slack::SlackNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &str, channel: &str) -> Result<()>;
}

/// Writes notifications to the log; used when no chat webhook is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &str, channel: &str) -> Result<()> {
        info!("[NOTIFY #{}] {}", channel, message);
        Ok(())
    }
}

/// Send `message` to each channel through each notifier.
/// Returns how many deliveries succeeded.
pub async fn dispatch(
    notifiers: &[Arc<dyn Notifier>],
    channels: &[String],
    message: &str,
    timeout: Duration,
) -> usize {
    let mut delivered = 0;
    for notifier in notifiers {
        for channel in channels {
            match external::call(notifier.name(), timeout, notifier.send(message, channel)).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    "Notification via {} to #{} failed: {}",
                    notifier.name(),
                    channel,
                    e
                ),
            }
        }
    }
    delivered
}
