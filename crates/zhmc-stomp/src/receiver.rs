//! The notification receiver and its background reader task.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rustls::pki_types::ServerName;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use zhmc_core::{
    Error, Notification, NotificationHandle, PropertyMap, Result, Secret, VerifyCert,
    DEFAULT_STOMP_PORT,
};

use crate::codec::{StompCodec, StompFrame};

/// How many times a lost connection is re-established before the stream
/// ends, and how long to wait between attempts.
const RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_WAIT: Duration = Duration::from_secs(5);

/// Configuration of a [`NotificationReceiver`].
#[derive(Debug, Clone)]
pub struct StompConfig {
    /// HMC host name or IP address.
    pub host: String,
    /// Notification port.
    pub port: u16,
    /// Userid (or a session token, which the HMC accepts in its place).
    pub userid: String,
    /// Password.
    pub password: Secret,
    /// Topics to subscribe to.
    pub topics: Vec<String>,
    /// Certificate verification policy for the notification port.
    pub verify_cert: VerifyCert,
    /// Whether to wrap the connection in TLS. The real HMC always uses
    /// TLS; plain TCP exists for test servers.
    pub use_tls: bool,
    /// Timeout for connecting and for the CONNECTED handshake.
    pub connect_timeout: Duration,
    /// Bound of the delivery queue. A full queue blocks the reader task,
    /// which pauses frame consumption; the HMC buffers.
    pub queue_size: usize,
}

impl StompConfig {
    /// Configuration with the documented defaults for the given host and
    /// credentials.
    pub fn new(host: impl Into<String>, userid: impl Into<String>, password: Secret) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_STOMP_PORT,
            userid: userid.into(),
            password,
            topics: Vec::new(),
            verify_cert: VerifyCert::Default,
            use_tls: true,
            connect_timeout: Duration::from_secs(30),
            queue_size: 64,
        }
    }

    /// Add a topic subscription.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(topic.into());
        self
    }

    /// Set the notification port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the certificate verification policy.
    #[must_use]
    pub fn with_verify_cert(mut self, verify_cert: VerifyCert) -> Self {
        self.verify_cert = verify_cert;
        self
    }

    /// Use plain TCP instead of TLS (test servers only).
    #[must_use]
    pub fn without_tls(mut self) -> Self {
        self.use_tls = false;
        self
    }
}

trait Io: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

type StompFramed = Framed<Box<dyn Io>, StompCodec>;

/// Receiver of HMC notifications over STOMP.
///
/// One background task drains frames into a bounded queue;
/// [`recv`](Self::recv) (or the stream from
/// [`into_stream`](Self::into_stream)) consumes it.
#[derive(Debug)]
pub struct NotificationReceiver {
    handle: NotificationHandle,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl NotificationReceiver {
    /// Connect, log on, and subscribe to the configured topics.
    pub async fn connect(config: StompConfig) -> Result<Self> {
        let framed = open_session(&config).await?;
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(reader_loop(config, framed, tx, cancel.clone()));
        Ok(Self {
            handle: NotificationHandle::new(rx, cancel),
            task: Some(task),
        })
    }

    /// Receive the next notification, in arrival order.
    ///
    /// JMS error frames and unparseable bodies are delivered as `Err`
    /// items and leave the connection running. `None` means the receiver
    /// was closed or the connection is permanently gone.
    pub async fn recv(&mut self) -> Option<Result<Notification>> {
        self.handle.recv().await
    }

    /// Close the receiver: cancel the background task, tear down the
    /// connection, and end the notification sequence. Idempotent.
    pub async fn close(&mut self) {
        self.handle.close();
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .is_err()
            {
                warn!("STOMP reader task did not stop within 5s");
            }
        }
    }

    /// Convert into the plain [`NotificationHandle`] used by the
    /// auto-update engine. The background task keeps running until the
    /// handle is closed or dropped.
    pub fn into_handle(mut self) -> NotificationHandle {
        self.task.take();
        self.handle
    }

    /// Convert into a lazy stream of notifications. Dropping the stream
    /// cancels the background task.
    pub fn into_stream(mut self) -> NotificationStream {
        self.task.take();
        let (rx, cancel) = self.handle.into_parts();
        NotificationStream {
            inner: ReceiverStream::new(rx),
            _guard: cancel.drop_guard(),
        }
    }
}

/// Stream adapter over a receiver; see
/// [`NotificationReceiver::into_stream`].
pub struct NotificationStream {
    inner: ReceiverStream<Result<Notification>>,
    _guard: tokio_util::sync::DropGuard,
}

impl futures::Stream for NotificationStream {
    type Item = Result<Notification>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Open the TCP/TLS stream, perform the CONNECT handshake, and subscribe
/// to all topics.
async fn open_session(config: &StompConfig) -> Result<StompFramed> {
    let io = open_stream(config).await?;
    let mut framed = Framed::new(io, StompCodec);

    framed
        .send(StompFrame::connect(
            &config.host,
            &config.userid,
            config.password.expose(),
        ))
        .await
        .map_err(|e| connection_error(config, &e))?;

    let connected = tokio::time::timeout(config.connect_timeout, framed.next())
        .await
        .map_err(|_| Error::ConnectTimeout {
            host: config.host.clone(),
            timeout: config.connect_timeout,
            attempts: 1,
        })?;
    match connected {
        Some(Ok(frame)) if frame.command == "CONNECTED" => {
            debug!(host = %config.host, "STOMP session established");
        }
        Some(Ok(frame)) if frame.command == "ERROR" => {
            return Err(Error::ServerAuth {
                host: config.host.clone(),
                userid: config.userid.clone(),
                detail: frame.header("message").unwrap_or("logon rejected").to_string(),
            });
        }
        Some(Ok(frame)) => {
            return Err(Error::Connection {
                host: config.host.clone(),
                detail: format!("unexpected STOMP frame {:?} during logon", frame.command),
            });
        }
        Some(Err(e)) => return Err(connection_error(config, &e)),
        None => {
            return Err(Error::Connection {
                host: config.host.clone(),
                detail: "connection closed during STOMP logon".to_string(),
            });
        }
    }

    for (id, topic) in config.topics.iter().enumerate() {
        framed
            .send(StompFrame::subscribe(id, topic))
            .await
            .map_err(|e| connection_error(config, &e))?;
        debug!(host = %config.host, topic = %topic, "subscribed");
    }
    Ok(framed)
}

async fn open_stream(config: &StompConfig) -> Result<Box<dyn Io>> {
    let address = (config.host.as_str(), config.port);
    let tcp = tokio::time::timeout(config.connect_timeout, TcpStream::connect(address))
        .await
        .map_err(|_| Error::ConnectTimeout {
            host: config.host.clone(),
            timeout: config.connect_timeout,
            attempts: 1,
        })?
        .map_err(|e| Error::Connection {
            host: config.host.clone(),
            detail: e.to_string(),
        })?;

    if !config.use_tls {
        return Ok(Box::new(tcp));
    }

    let tls_config = tls_client_config(&config.verify_cert, &config.host)?;
    let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));
    let server_name = ServerName::try_from(config.host.clone()).map_err(|e| Error::Connection {
        host: config.host.clone(),
        detail: format!("invalid TLS server name: {e}"),
    })?;
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::ClientAuth(format!("TLS handshake with {} failed: {e}", config.host)))?;
    Ok(Box::new(tls))
}

fn tls_client_config(verify_cert: &VerifyCert, host: &str) -> Result<rustls::ClientConfig> {
    if verify_cert.is_off() {
        warn!(
            host = %host,
            "certificate verification is disabled for this notification receiver"
        );
        return Ok(rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification))
            .with_no_client_auth());
    }

    let mut roots = rustls::RootCertStore::empty();
    if let Some(ca_path) = verify_cert.ca_path() {
        let data = std::fs::read(&ca_path).map_err(|e| {
            Error::ClientAuth(format!("cannot read CA bundle {}: {e}", ca_path.display()))
        })?;
        let mut reader = std::io::BufReader::new(data.as_slice());
        for der in rustls_pemfile::certs(&mut reader) {
            let der = der.map_err(|e| {
                Error::ClientAuth(format!("cannot parse CA bundle {}: {e}", ca_path.display()))
            })?;
            roots.add(der).map_err(|e| {
                Error::ClientAuth(format!("invalid certificate in {}: {e}", ca_path.display()))
            })?;
        }
    } else {
        let loaded = rustls_native_certs::load_native_certs();
        for cert in loaded.certs {
            // Platform stores routinely carry a few stale entries.
            let _ = roots.add(cert);
        }
    }
    Ok(rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth())
}

/// Certificate verifier that accepts everything, for
/// [`VerifyCert::Off`].
#[derive(Debug)]
struct NoVerification;

impl rustls::client::danger::ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn connection_error(config: &StompConfig, err: &std::io::Error) -> Error {
    Error::Connection {
        host: config.host.clone(),
        detail: err.to_string(),
    }
}

/// Single consumer of the STOMP stream. Routes MESSAGE frames into the
/// delivery queue, surfaces ERROR frames in-band, and re-establishes a
/// lost connection with bounded backoff.
async fn reader_loop(
    config: StompConfig,
    mut framed: StompFramed,
    tx: mpsc::Sender<Result<Notification>>,
    cancel: CancellationToken,
) {
    let mut reconnects: u32 = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = framed.send(StompFrame::disconnect()).await;
                debug!(host = %config.host, "STOMP receiver closed");
                return;
            }
            _ = tx.closed() => {
                let _ = framed.send(StompFrame::disconnect()).await;
                debug!(host = %config.host, "notification consumer dropped");
                return;
            }
            frame = framed.next() => {
                match frame {
                    Some(Ok(frame)) => match frame.command.as_str() {
                        "MESSAGE" => {
                            if tx.send(parse_message(&frame)).await.is_err() {
                                return;
                            }
                        }
                        "ERROR" => {
                            let err = Error::NotificationJms {
                                message: frame
                                    .header("message")
                                    .unwrap_or("unspecified JMS error")
                                    .to_string(),
                                details: body_value(&frame.body),
                            };
                            if tx.send(Err(err)).await.is_err() {
                                return;
                            }
                        }
                        "RECEIPT" => {}
                        other => {
                            debug!(host = %config.host, command = %other, "ignoring STOMP frame");
                        }
                    },
                    Some(Err(e)) => {
                        warn!(host = %config.host, error = %e, "STOMP connection error");
                        match reconnect(&config, &cancel, &mut reconnects).await {
                            Some(new_framed) => framed = new_framed,
                            None => return,
                        }
                    }
                    None => {
                        debug!(host = %config.host, "STOMP connection closed by peer");
                        match reconnect(&config, &cancel, &mut reconnects).await {
                            Some(new_framed) => framed = new_framed,
                            None => return,
                        }
                    }
                }
            }
        }
    }
}

async fn reconnect(
    config: &StompConfig,
    cancel: &CancellationToken,
    reconnects: &mut u32,
) -> Option<StompFramed> {
    while *reconnects < RECONNECT_ATTEMPTS {
        *reconnects += 1;
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(RECONNECT_WAIT) => {}
        }
        match open_session(config).await {
            Ok(framed) => {
                debug!(host = %config.host, attempt = *reconnects, "STOMP reconnected");
                return Some(framed);
            }
            Err(e) => {
                warn!(
                    host = %config.host,
                    attempt = *reconnects,
                    error = %e,
                    "STOMP reconnect failed"
                );
            }
        }
    }
    warn!(host = %config.host, "giving up on STOMP reconnection");
    None
}

fn parse_message(frame: &StompFrame) -> Result<Notification> {
    let topic = frame
        .header("destination")
        .map(|d| d.strip_prefix("/topic/").unwrap_or(d).to_string())
        .unwrap_or_default();
    let mut headers = PropertyMap::new();
    for (name, value) in &frame.headers {
        headers.insert(name.clone(), Value::String(value.clone()));
    }
    let body = if frame.body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&frame.body).map_err(|e| {
            Error::NotificationParse(format!("notification body is not valid JSON: {e}"))
        })?
    };
    Ok(Notification {
        topic,
        headers,
        body,
    })
}

/// Body of an ERROR frame as a JSON value, falling back to a string.
fn body_value(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_parsing_strips_topic_prefix() {
        let frame = StompFrame::new("MESSAGE")
            .with_header("destination", "/topic/t1.object-notifications")
            .with_header("notification-type", "status-change")
            .with_body(br#"{"change-reports":[]}"#.to_vec());
        let notification = parse_message(&frame).unwrap();
        assert_eq!(notification.topic, "t1.object-notifications");
        assert_eq!(
            notification.header_str("notification-type"),
            Some("status-change")
        );
    }

    #[test]
    fn bad_body_is_a_parse_error() {
        let frame = StompFrame::new("MESSAGE")
            .with_header("destination", "/topic/t")
            .with_body(b"not json".to_vec());
        assert!(matches!(
            parse_message(&frame),
            Err(Error::NotificationParse(_))
        ));
    }
}
