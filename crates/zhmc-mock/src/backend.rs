//! [`NotificationBackend`] implementation over the faked HMC's in-memory
//! topics.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use zhmc_core::{
    Notification, NotificationAuth, NotificationBackend, NotificationHandle, Result,
};

use crate::hmc::MockHmc;

/// Subscribes to the faked HMC's topics and forwards notifications into
/// the handle's queue, like the STOMP receiver does for a real HMC.
#[derive(Debug, Clone)]
pub struct MockNotificationBackend {
    hmc: MockHmc,
}

impl MockNotificationBackend {
    /// Backend over the given faked HMC.
    pub fn new(hmc: MockHmc) -> Self {
        Self { hmc }
    }
}

#[async_trait]
impl NotificationBackend for MockNotificationBackend {
    async fn open(
        &self,
        _host: &str,
        topics: &[String],
        auth: &NotificationAuth,
    ) -> Result<NotificationHandle> {
        if !self
            .hmc
            .notification_auth_ok(&auth.userid, auth.password.expose())
        {
            // The userid may be a session token, so it is not echoed.
            return Err(zhmc_core::Error::ServerAuth {
                host: self.hmc.name().to_string(),
                userid: String::new(),
                detail: "the notification service rejected the logon".to_string(),
            });
        }
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        for topic in topics {
            let subscription = self.hmc.topics().subscribe(topic);
            tokio::spawn(forward(subscription, tx.clone(), cancel.clone()));
        }
        Ok(NotificationHandle::new(rx, cancel))
    }
}

async fn forward(
    mut subscription: broadcast::Receiver<Notification>,
    tx: mpsc::Sender<std::result::Result<Notification, zhmc_core::Error>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tx.closed() => return,
            received = subscription.recv() => match received {
                Ok(notification) => {
                    if tx.send(Ok(notification)).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "mock notification subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}
