//! [`NotificationBackend`] implementation over STOMP receivers.

use async_trait::async_trait;

use zhmc_core::{
    NotificationAuth, NotificationBackend, NotificationHandle, Result, VerifyCert,
};

use crate::receiver::{NotificationReceiver, StompConfig};

/// Opens STOMP receivers on demand; the notification source of real
/// sessions.
#[derive(Debug, Clone)]
pub struct StompBackend {
    port: u16,
    verify_cert: VerifyCert,
    use_tls: bool,
}

impl StompBackend {
    /// Backend for the given notification port and verification policy.
    pub fn new(port: u16, verify_cert: VerifyCert) -> Self {
        Self {
            port,
            verify_cert,
            use_tls: true,
        }
    }

    /// Use plain TCP instead of TLS (test servers only).
    #[must_use]
    pub fn without_tls(mut self) -> Self {
        self.use_tls = false;
        self
    }
}

#[async_trait]
impl NotificationBackend for StompBackend {
    async fn open(
        &self,
        host: &str,
        topics: &[String],
        auth: &NotificationAuth,
    ) -> Result<NotificationHandle> {
        let mut config = StompConfig::new(host, auth.userid.clone(), auth.password.clone())
            .with_port(self.port)
            .with_verify_cert(self.verify_cert.clone());
        if !self.use_tls {
            config = config.without_tls();
        }
        config.topics = topics.to_vec();
        let receiver = NotificationReceiver::connect(config).await?;
        Ok(receiver.into_handle())
    }
}
