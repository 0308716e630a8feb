//! Session with an HMC: logon lifecycle, request execution, asynchronous
//! job polling.
//!
//! A session is constructed inactive; the first authenticated request
//! triggers logon. A 403.5 response (expired session token) during any
//! authenticated call is recovered by a serialized re-logon and a single
//! retry of the original request. At logon time, candidate hosts are
//! tried in order; once one yields a session token the session is pinned
//! to it until logoff.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use zhmc_core::error::{REASON_BUSY, REASON_SESSION_EXPIRED};
use zhmc_core::{
    ApiRequest, ApiResponse, DEFAULT_HMC_PORT, DEFAULT_STOMP_PORT, Error, HmcConnection, Method,
    NotificationAuth, NotificationBackend, RequestBody, Result, RetryTimeoutConfig, Secret,
    VerifyCert,
};
use zhmc_http::HttpTransport;
use zhmc_stomp::StompBackend;

use crate::autoupdate::AutoUpdater;
use crate::cache::NameUriCache;
use crate::job::Job;

/// Error bodies are preserved verbatim up to this many bytes in errors
/// and logs.
const ERROR_BODY_LIMIT: usize = 16 * 1024;

/// Longest interval between polls of an asynchronous job.
const MAX_JOB_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Interval between probes in [`Session::wait_for_available`].
const AVAILABILITY_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration of a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Candidate HMC hosts, tried in order at logon.
    pub hosts: Vec<String>,
    /// Web Services port.
    pub port: u16,
    /// STOMP notification port (used by auto-update).
    pub stomp_port: u16,
    /// Userid for logon.
    pub userid: String,
    /// Password for logon.
    pub password: Secret,
    /// Pre-existing session token to use instead of logging on.
    pub session_token: Option<Secret>,
    /// Retry/timeout policy.
    pub retry_timeout: RetryTimeoutConfig,
    /// Certificate verification policy.
    pub verify_cert: VerifyCert,
}

impl SessionConfig {
    /// Configuration for a single host with the documented defaults.
    pub fn new(host: impl Into<String>, userid: impl Into<String>, password: Secret) -> Self {
        Self {
            hosts: vec![host.into()],
            port: DEFAULT_HMC_PORT,
            stomp_port: DEFAULT_STOMP_PORT,
            userid: userid.into(),
            password,
            session_token: None,
            retry_timeout: RetryTimeoutConfig::default(),
            verify_cert: VerifyCert::Default,
        }
    }

    /// Configuration for a single host with a pre-existing session token
    /// instead of credentials.
    ///
    /// Such a session authenticates every request (including the
    /// notification subscription) with the token and cannot re-logon
    /// when the token expires.
    pub fn from_session_token(host: impl Into<String>, token: Secret) -> Self {
        Self {
            hosts: vec![host.into()],
            port: DEFAULT_HMC_PORT,
            stomp_port: DEFAULT_STOMP_PORT,
            userid: String::new(),
            password: Secret::default(),
            session_token: Some(token),
            retry_timeout: RetryTimeoutConfig::default(),
            verify_cert: VerifyCert::Default,
        }
    }

    /// Whether this configuration carries logon credentials (as opposed
    /// to only a pre-existing session token).
    pub fn has_credentials(&self) -> bool {
        !self.userid.is_empty() || !self.password.is_empty()
    }

    /// Replace the candidate host list.
    #[must_use]
    pub fn with_hosts(mut self, hosts: Vec<String>) -> Self {
        self.hosts = hosts;
        self
    }

    /// Set the Web Services port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the retry/timeout policy.
    #[must_use]
    pub fn with_retry_timeout(mut self, retry_timeout: RetryTimeoutConfig) -> Self {
        self.retry_timeout = retry_timeout;
        self
    }

    /// Set the certificate verification policy.
    #[must_use]
    pub fn with_verify_cert(mut self, verify_cert: VerifyCert) -> Self {
        self.verify_cert = verify_cert;
        self
    }

    /// Use a pre-existing session token instead of logging on.
    #[must_use]
    pub fn with_session_token(mut self, token: Secret) -> Self {
        self.session_token = Some(token);
        self
    }
}

/// Mutable session state, guarded by one lock so that re-logon is
/// serialized.
#[derive(Debug, Default)]
struct SessionState {
    token: Option<Secret>,
    active: Option<usize>,
    api_version: Option<(u64, u64)>,
    hmc_version: Option<String>,
    notification_topic: Option<String>,
    job_notification_topic: Option<String>,
}

/// Options for [`Session::post`].
#[derive(Debug, Clone)]
pub struct PostOptions {
    /// Poll an asynchronous (202) response to completion instead of
    /// returning the [`Job`].
    pub wait_for_completion: bool,
    /// Override of the configured operation timeout for job polling.
    pub operation_timeout: Option<Duration>,
    /// Number of retries when the HMC reports 409.1/409.2 (busy).
    pub busy_retries: u32,
    /// Wait between busy retries.
    pub busy_wait: Duration,
}

impl Default for PostOptions {
    fn default() -> Self {
        Self {
            wait_for_completion: true,
            operation_timeout: None,
            busy_retries: 0,
            busy_wait: Duration::from_secs(1),
        }
    }
}

impl PostOptions {
    /// Return the job handle of an asynchronous operation instead of
    /// polling it.
    #[must_use]
    pub fn no_wait(mut self) -> Self {
        self.wait_for_completion = false;
        self
    }

    /// Override the operation timeout for this call.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Enable busy retries for operations known to report 409.1/409.2.
    #[must_use]
    pub fn with_busy_retries(mut self, retries: u32, wait: Duration) -> Self {
        self.busy_retries = retries;
        self.busy_wait = wait;
        self
    }
}

/// Options for [`Session::delete`].
#[derive(Debug, Clone)]
pub struct DeleteOptions {
    /// Number of retries when the HMC reports 409.1/409.2 (busy).
    pub busy_retries: u32,
    /// Wait between busy retries.
    pub busy_wait: Duration,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            busy_retries: 0,
            busy_wait: Duration::from_secs(1),
        }
    }
}

impl DeleteOptions {
    /// Enable busy retries.
    #[must_use]
    pub fn with_busy_retries(mut self, retries: u32, wait: Duration) -> Self {
        self.busy_retries = retries;
        self.busy_wait = wait;
        self
    }
}

/// Outcome of a [`Session::post`].
#[derive(Debug)]
pub enum PostResult {
    /// Synchronous result body (or the results of an awaited job).
    Value(Value),
    /// Handle of an asynchronous operation, when
    /// [`PostOptions::wait_for_completion`] is off.
    Job(Job),
    /// The operation completed without a result body.
    None,
}

impl PostResult {
    /// The result value, if any.
    pub fn into_value(self) -> Option<Value> {
        match self {
            PostResult::Value(value) => Some(value),
            _ => None,
        }
    }

    /// The job handle, if the operation was left asynchronous.
    pub fn into_job(self) -> Option<Job> {
        match self {
            PostResult::Job(job) => Some(job),
            _ => None,
        }
    }
}

/// A session with one HMC (or a set of alternates for logon failover).
pub struct Session {
    config: SessionConfig,
    conns: Vec<Arc<dyn HmcConnection>>,
    notification_backend: Arc<dyn NotificationBackend>,
    state: Mutex<SessionState>,
    cache: NameUriCache,
    updater: Mutex<Option<Arc<AutoUpdater>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("hosts", &self.config.hosts)
            .field("userid", &self.config.userid)
            .finish()
    }
}

impl Session {
    /// Create a session talking HTTPS to the configured hosts.
    pub fn new(config: SessionConfig) -> Result<Arc<Self>> {
        let conns: Vec<Arc<dyn HmcConnection>> = config
            .hosts
            .iter()
            .map(|host| {
                HttpTransport::new(
                    format!("https://{host}:{}", config.port),
                    config.retry_timeout.clone(),
                    &config.verify_cert,
                )
                .map(|t| Arc::new(t) as Arc<dyn HmcConnection>)
            })
            .collect::<Result<_>>()?;
        let backend = Arc::new(StompBackend::new(
            config.stomp_port,
            config.verify_cert.clone(),
        ));
        Ok(Self::from_parts(conns, backend, config))
    }

    /// Create a session over externally supplied connections, e.g. the
    /// mocked HMC.
    pub fn with_connection(
        conn: Arc<dyn HmcConnection>,
        notification_backend: Arc<dyn NotificationBackend>,
        config: SessionConfig,
    ) -> Arc<Self> {
        Self::from_parts(vec![conn], notification_backend, config)
    }

    fn from_parts(
        conns: Vec<Arc<dyn HmcConnection>>,
        notification_backend: Arc<dyn NotificationBackend>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let state = SessionState {
            token: config.session_token.clone(),
            active: config.session_token.as_ref().map(|_| 0),
            ..SessionState::default()
        };
        Arc::new(Self {
            cache: NameUriCache::new(config.retry_timeout.name_uri_cache_ttl),
            conns,
            notification_backend,
            state: Mutex::new(state),
            updater: Mutex::new(None),
            config,
        })
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether a session token is currently held.
    pub async fn is_logged_on(&self) -> bool {
        self.state.lock().await.token.is_some()
    }

    /// Snapshot of the current session token.
    pub async fn session_token(&self) -> Option<Secret> {
        self.state.lock().await.token.clone()
    }

    /// The host the session is pinned to, once logged on.
    pub async fn actual_host(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.active.map(|idx| self.config.hosts[idx].clone())
    }

    /// The HMC version reported at logon, e.g. `"2.16.0"`.
    pub async fn hmc_version(&self) -> Option<String> {
        self.state.lock().await.hmc_version.clone()
    }

    /// The (major, minor) Web Services API version reported at logon.
    pub async fn api_version(&self) -> Option<(u64, u64)> {
        self.state.lock().await.api_version
    }

    /// The object notification topic reported at logon.
    pub(crate) async fn notification_topic(&self) -> Option<String> {
        self.state.lock().await.notification_topic.clone()
    }

    /// The job notification topic reported at logon.
    pub async fn job_notification_topic(&self) -> Option<String> {
        self.state.lock().await.job_notification_topic.clone()
    }

    /// Log on, trying the candidate hosts in order.
    ///
    /// Connect failures, connection refusals, and certificate failures
    /// advance to the next candidate; a rejected logon
    /// ([`Error::ServerAuth`]) does not, since the credentials would be
    /// equally wrong everywhere.
    pub async fn logon(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.logon_locked(&mut state).await
    }

    async fn logon_locked(&self, state: &mut SessionState) -> Result<()> {
        if !self.config.has_credentials() {
            // Token-only sessions have nothing to log on with.
            let idx = state.active.unwrap_or(0);
            return Err(Error::ServerAuth {
                host: self.conns[idx].host().to_string(),
                userid: String::new(),
                detail: "session was constructed from a token and has no credentials to log on with"
                    .to_string(),
            });
        }
        let mut last_error: Option<Error> = None;
        let start = state.active.unwrap_or(0);
        for offset in 0..self.conns.len() {
            let idx = (start + offset) % self.conns.len();
            let conn = &self.conns[idx];
            let body = json!({
                "userid": self.config.userid,
                "password": self.config.password.expose(),
            });
            let request = ApiRequest::post("/api/sessions", Some(body))
                .with_logon_auth(self.config.userid.clone(), self.config.password.clone());
            match conn.execute(request).await {
                Ok(response) if response.is_success() => {
                    let logon = response.json()?;
                    let token = logon
                        .get("api-session")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            Error::Consistency(
                                "logon response carries no 'api-session' field".to_string(),
                            )
                        })?;
                    state.token = Some(Secret::new(token));
                    state.active = Some(idx);
                    state.api_version = api_version_of(&logon);
                    state.hmc_version = logon
                        .get("hmc-version")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    state.notification_topic = logon
                        .get("notification-topic")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    state.job_notification_topic = logon
                        .get("job-notification-topic")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    info!(
                        host = conn.host(),
                        userid = %self.config.userid,
                        "logged on to HMC"
                    );
                    return Ok(());
                }
                Ok(response) => {
                    let error = self.http_error(Method::Post, "/api/sessions", &response);
                    if response.status == 403 {
                        return Err(Error::ServerAuth {
                            host: conn.host().to_string(),
                            userid: self.config.userid.clone(),
                            detail: error.to_string(),
                        });
                    }
                    return Err(error);
                }
                Err(error) if error.is_connection() || matches!(error, Error::ClientAuth(_)) => {
                    warn!(
                        host = conn.host(),
                        error = %error,
                        "logon attempt failed, trying next HMC"
                    );
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            Error::Consistency("session has no candidate hosts".to_string())
        }))
    }

    /// Log off and drop the session token. Idempotent; also tears down
    /// the auto-update engine.
    pub async fn logoff(self: &Arc<Self>) -> Result<()> {
        self.shutdown_auto_updater().await;
        let mut state = self.state.lock().await;
        let Some(token) = state.token.take() else {
            return Ok(());
        };
        let idx = state.active.unwrap_or(0);
        state.notification_topic = None;
        state.job_notification_topic = None;
        drop(state);

        let request =
            ApiRequest::delete("/api/sessions/this-session").with_session_token(Some(token));
        match self.conns[idx].execute(request).await {
            Ok(response) if response.is_success() => {
                info!(host = self.conns[idx].host(), "logged off from HMC");
            }
            Ok(response) => {
                debug!(
                    status = response.status,
                    "HMC rejected logoff; dropping token anyway"
                );
            }
            Err(error) => {
                debug!(error = %error, "logoff request failed; dropping token anyway");
            }
        }
        Ok(())
    }

    /// GET a URI and decode the JSON response body.
    pub async fn get(self: &Arc<Self>, uri: &str) -> Result<Value> {
        let response = self.request(Method::Get, uri, None).await?;
        if response.is_success() {
            if response.has_body() {
                response.json()
            } else {
                Ok(Value::Null)
            }
        } else {
            Err(self.http_error(Method::Get, uri, &response))
        }
    }

    /// POST a URI with an optional JSON body.
    ///
    /// A 202 response carrying a `job-uri` is an asynchronous operation:
    /// with [`PostOptions::wait_for_completion`] the job is polled and its
    /// `job-results` returned, otherwise the [`Job`] handle is returned. A
    /// 202 without a body tracks nothing (whole-HMC operations such as
    /// restart).
    pub async fn post(
        self: &Arc<Self>,
        uri: &str,
        body: Option<&Value>,
        options: &PostOptions,
    ) -> Result<PostResult> {
        let body = body.cloned().map(RequestBody::Json);
        let response = self
            .request_busy_retry(
                Method::Post,
                uri,
                body,
                options.busy_retries,
                options.busy_wait,
            )
            .await?;
        self.finish_post(uri, response, options).await
    }

    /// POST an opaque byte sequence with a caller-supplied content type
    /// (ISO image upload).
    pub async fn post_binary(
        self: &Arc<Self>,
        uri: &str,
        content_type: &str,
        data: bytes::Bytes,
        options: &PostOptions,
    ) -> Result<PostResult> {
        let body = RequestBody::Binary {
            content_type: content_type.to_string(),
            data,
        };
        let response = self
            .request_busy_retry(
                Method::Post,
                uri,
                Some(body),
                options.busy_retries,
                options.busy_wait,
            )
            .await?;
        self.finish_post(uri, response, options).await
    }

    /// DELETE a URI.
    pub async fn delete(self: &Arc<Self>, uri: &str, options: &DeleteOptions) -> Result<()> {
        let response = self
            .request_busy_retry(
                Method::Delete,
                uri,
                None,
                options.busy_retries,
                options.busy_wait,
            )
            .await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(self.http_error(Method::Delete, uri, &response))
        }
    }

    async fn finish_post(
        self: &Arc<Self>,
        uri: &str,
        response: ApiResponse,
        options: &PostOptions,
    ) -> Result<PostResult> {
        if !response.is_success() {
            return Err(self.http_error(Method::Post, uri, &response));
        }
        if response.status != 202 {
            return if response.has_body() {
                Ok(PostResult::Value(response.json()?))
            } else {
                Ok(PostResult::None)
            };
        }
        if !response.has_body() {
            // Asynchronous without completion tracking.
            return Ok(PostResult::None);
        }
        let value = response.json()?;
        let Some(job_uri) = value.get("job-uri").and_then(Value::as_str) else {
            return Ok(PostResult::Value(value));
        };
        let job = Job::new(self.clone(), job_uri);
        if options.wait_for_completion {
            match self
                .wait_for_completion(&job, options.operation_timeout)
                .await?
            {
                Some(results) => Ok(PostResult::Value(results)),
                None => Ok(PostResult::None),
            }
        } else {
            Ok(PostResult::Job(job))
        }
    }

    /// Poll a job until it reaches a terminal status.
    ///
    /// The poll interval starts at 1 s and doubles up to 10 s. On
    /// `complete` the `job-results` value is returned; the other terminal
    /// statuses are surfaced as [`Error::Http`] synthesized from the job
    /// error fields. Exceeding the operation timeout raises
    /// [`Error::OperationTimeout`].
    pub async fn wait_for_completion(
        self: &Arc<Self>,
        job: &Job,
        operation_timeout: Option<Duration>,
    ) -> Result<Option<Value>> {
        let timeout = operation_timeout.unwrap_or(self.config.retry_timeout.operation_timeout);
        let deadline = Instant::now() + timeout;
        let mut interval = Duration::from_secs(1);
        loop {
            let status = self.get(job.uri()).await?;
            let state = status
                .get("status")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::Consistency(format!(
                        "job status response of {} carries no 'status' field",
                        job.uri()
                    ))
                })?;
            if matches!(state, "complete" | "complete-with-error" | "canceled") {
                job.mark_terminal();
                // The job record is no longer needed on the HMC.
                if let Err(error) = self.delete(job.uri(), &DeleteOptions::default()).await {
                    debug!(job_uri = job.uri(), error = %error, "cannot delete job record");
                }
                if state == "complete" {
                    return Ok(status
                        .get("job-results")
                        .filter(|results| !results.is_null())
                        .cloned());
                }
                return Err(Error::from_job_failure(job.uri(), &status));
            }
            debug!(job_uri = job.uri(), status = state, "job still running");
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::OperationTimeout {
                    job_uri: job.uri().to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
            interval = (interval * 2).min(MAX_JOB_POLL_INTERVAL);
        }
    }

    /// Query the HMC version endpoint, which needs no logon.
    pub async fn query_api_version(self: &Arc<Self>) -> Result<Value> {
        self.get("/api/version").await
    }

    /// The notification topics available to the current session, as the
    /// HMC reports them. Used by auto-update when the session was
    /// constructed from a token and never saw a logon response.
    pub async fn get_notification_topics(self: &Arc<Self>) -> Result<Value> {
        self.get("/api/sessions/operations/get-notification-topics")
            .await
    }

    /// Repeatedly probe the version endpoint until the HMC produces a
    /// valid response, for use after an HMC restart.
    pub async fn wait_for_available(self: &Arc<Self>, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or(self.config.retry_timeout.operation_timeout);
        let deadline = Instant::now() + timeout;
        loop {
            match self.query_api_version().await {
                Ok(_) => return Ok(()),
                Err(error) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(error);
                    }
                    debug!(error = %error, "HMC not available yet");
                    tokio::time::sleep(AVAILABILITY_POLL_INTERVAL.min(deadline - now)).await;
                }
            }
        }
    }

    /// Fail with [`Error::Version`] unless the HMC's API version is at
    /// least `required`.
    pub async fn require_api_version(self: &Arc<Self>, required: (u64, u64)) -> Result<()> {
        let known = self.state.lock().await.api_version;
        let actual = match known {
            Some(version) => version,
            None => {
                let version = api_version_of(&self.query_api_version().await?)
                    .ok_or_else(|| {
                        Error::Consistency(
                            "version response carries no API version fields".to_string(),
                        )
                    })?;
                self.state.lock().await.api_version = Some(version);
                version
            }
        };
        if actual < required {
            return Err(Error::Version { required, actual });
        }
        Ok(())
    }

    /// Drop name-to-URI cache entries: all of one class, or everything.
    pub fn invalidate_cache(&self, class: Option<&str>) {
        match class {
            Some(class) => self.cache.invalidate_class(class),
            None => self.cache.clear(),
        }
    }

    pub(crate) fn cache(&self) -> &NameUriCache {
        &self.cache
    }

    /// Execute a request with logon interposed and one transparent retry
    /// after a recovered 403.5.
    async fn request(
        self: &Arc<Self>,
        method: Method,
        uri: &str,
        body: Option<RequestBody>,
    ) -> Result<ApiResponse> {
        let needs_auth = uri != "/api/version";
        let mut retried = false;
        loop {
            let (token, conn) = {
                let mut state = self.state.lock().await;
                if needs_auth && state.token.is_none() {
                    self.logon_locked(&mut state).await?;
                }
                let idx = state.active.unwrap_or(0);
                (state.token.clone(), self.conns[idx].clone())
            };
            let request = ApiRequest {
                method,
                uri: uri.to_string(),
                body: body.clone(),
                session_token: if needs_auth { token.clone() } else { None },
                read_timeout: None,
                logon_auth: None,
            };
            let response = conn.execute(request).await?;

            if needs_auth && response.status == 403 {
                let reason = reason_of(&response);
                if reason == Some(REASON_SESSION_EXPIRED) {
                    if retried {
                        return Err(Error::ServerAuth {
                            host: conn.host().to_string(),
                            userid: self.config.userid.clone(),
                            detail: "session token rejected again after re-logon".to_string(),
                        });
                    }
                    debug!(uri, "session token expired, re-logging on");
                    let mut state = self.state.lock().await;
                    if state.token == token {
                        // Nobody else refreshed the token in the meantime.
                        state.token = None;
                        self.logon_locked(&mut state).await?;
                    }
                    drop(state);
                    retried = true;
                    continue;
                }
            }
            return Ok(response);
        }
    }

    /// [`request`](Self::request) with bounded retries on 409.1/409.2.
    async fn request_busy_retry(
        self: &Arc<Self>,
        method: Method,
        uri: &str,
        body: Option<RequestBody>,
        busy_retries: u32,
        busy_wait: Duration,
    ) -> Result<ApiResponse> {
        let mut attempts: u32 = 0;
        loop {
            let response = self.request(method, uri, body.clone()).await?;
            if response.status == 409
                && attempts < busy_retries
                && reason_of(&response).is_some_and(|reason| REASON_BUSY.contains(&reason))
            {
                attempts += 1;
                warn!(
                    uri,
                    attempt = attempts,
                    "HMC resource busy, retrying after {:?}",
                    busy_wait
                );
                tokio::time::sleep(busy_wait).await;
                continue;
            }
            return Ok(response);
        }
    }

    /// Build an [`Error::Http`] from an HMC error response, preserving
    /// the body up to [`ERROR_BODY_LIMIT`].
    fn http_error(&self, method: Method, uri: &str, response: &ApiResponse) -> Error {
        let text = response.body_text(ERROR_BODY_LIMIT);
        if let Ok(body) = response.json() {
            let reason = body
                .get("reason")
                .and_then(Value::as_i64)
                .unwrap_or(zhmc_core::error::REASON_OPAQUE_BODY);
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| text.clone(), str::to_string);
            return Error::Http {
                status: response.status,
                reason,
                message,
                method: method.as_str().to_string(),
                uri: uri.to_string(),
                stack: body
                    .get("stack")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            };
        }
        let reason = if looks_like_ws_disabled(&text) {
            zhmc_core::error::REASON_WS_DISABLED
        } else {
            zhmc_core::error::REASON_OPAQUE_BODY
        };
        Error::Http {
            status: response.status,
            reason,
            message: text,
            method: method.as_str().to_string(),
            uri: uri.to_string(),
            stack: None,
        }
    }

    /// Get or lazily create the per-session auto-update engine.
    pub(crate) async fn auto_updater(self: &Arc<Self>) -> Result<Arc<AutoUpdater>> {
        let mut slot = self.updater.lock().await;
        if let Some(updater) = slot.as_ref() {
            return Ok(updater.clone());
        }
        let topic = {
            let mut state = self.state.lock().await;
            if state.token.is_none() {
                self.logon_locked(&mut state).await?;
            }
            state.notification_topic.clone()
        };
        let topic = match topic {
            Some(topic) => topic,
            // Token-provided sessions never saw a logon response; ask
            // the HMC which topic carries object notifications.
            None => {
                let topics = self.get_notification_topics().await?;
                let topic = object_topic_of(&topics).ok_or_else(|| {
                    Error::Consistency(
                        "the HMC reported no object notification topic".to_string(),
                    )
                })?;
                self.state.lock().await.notification_topic = Some(topic.clone());
                topic
            }
        };
        let host = self
            .actual_host()
            .await
            .unwrap_or_else(|| self.config.hosts[0].clone());
        let auth = if self.config.has_credentials() {
            NotificationAuth {
                userid: self.config.userid.clone(),
                password: self.config.password.clone(),
            }
        } else {
            // The HMC's notification service accepts the session token
            // in place of a userid.
            let token = self.state.lock().await.token.clone().ok_or_else(|| {
                Error::Consistency(
                    "session holds no token to log on to the notification service".to_string(),
                )
            })?;
            NotificationAuth {
                userid: token.expose().to_string(),
                password: Secret::default(),
            }
        };
        let handle = self
            .notification_backend
            .open(&host, std::slice::from_ref(&topic), &auth)
            .await?;
        info!(topic = %topic, "auto-update subscription opened");
        let updater = AutoUpdater::start(Arc::downgrade(self), handle);
        *slot = Some(updater.clone());
        Ok(updater)
    }

    /// Current auto-update engine, if one is live.
    pub(crate) async fn current_auto_updater(&self) -> Option<Arc<AutoUpdater>> {
        self.updater.lock().await.clone()
    }

    /// Tear the engine down if its registries emptied out.
    pub(crate) async fn auto_updater_maybe_teardown(&self) {
        let mut slot = self.updater.lock().await;
        if let Some(updater) = slot.as_ref() {
            if updater.is_empty() {
                updater.shutdown().await;
                *slot = None;
                info!("auto-update subscription closed");
            }
        }
    }

    async fn shutdown_auto_updater(&self) {
        let mut slot = self.updater.lock().await;
        if let Some(updater) = slot.take() {
            updater.shutdown().await;
        }
    }
}

fn api_version_of(value: &Value) -> Option<(u64, u64)> {
    let major = value.get("api-major-version").and_then(Value::as_u64)?;
    let minor = value.get("api-minor-version").and_then(Value::as_u64)?;
    Some((major, minor))
}

/// The object notification topic from a get-notification-topics
/// response.
fn object_topic_of(value: &Value) -> Option<String> {
    value
        .get("topics")?
        .as_array()?
        .iter()
        .find(|t| t.get("topic-type").and_then(Value::as_str) == Some("object-notification"))
        .and_then(|t| t.get("topic-name").and_then(Value::as_str))
        .map(str::to_string)
}

fn reason_of(response: &ApiResponse) -> Option<i64> {
    response.json().ok()?.get("reason")?.as_i64()
}

/// Heuristic for an HTML error page that indicates the Web Services API
/// is disabled on the HMC.
fn looks_like_ws_disabled(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("web services")
        && (lower.contains("disabled") || lower.contains("not enabled"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_disabled_heuristic() {
        assert!(looks_like_ws_disabled(
            "<html>The Web Services API is disabled on this console.</html>"
        ));
        assert!(looks_like_ws_disabled(
            "<html>Web Services interface not enabled</html>"
        ));
        assert!(!looks_like_ws_disabled("<html>Internal error</html>"));
    }

    #[test]
    fn session_debug_elides_credentials() {
        let config = SessionConfig::new("hmc1", "user", Secret::new("pa55word"));
        let session = Session::new(config).unwrap();
        let rendered = format!("{session:?}");
        assert!(rendered.contains("hmc1"));
        assert!(!rendered.contains("pa55word"));
    }

    #[test]
    fn post_options_defaults() {
        let options = PostOptions::default();
        assert!(options.wait_for_completion);
        assert_eq!(options.busy_retries, 0);
        assert_eq!(options.busy_wait, Duration::from_secs(1));
    }

    #[test]
    fn token_only_config_has_no_credentials() {
        let config = SessionConfig::from_session_token("hmc1", Secret::new("tok-1"));
        assert!(!config.has_credentials());
        assert!(config.session_token.is_some());
        let config = SessionConfig::new("hmc1", "user", Secret::new("pw"));
        assert!(config.has_credentials());
    }

    #[test]
    fn object_topic_extraction() {
        let topics = json!({
            "topics": [
                {"topic-type": "job-notification", "topic-name": "t1.jobs"},
                {"topic-type": "object-notification", "topic-name": "t1.objects"},
            ],
        });
        assert_eq!(object_topic_of(&topics).as_deref(), Some("t1.objects"));
        assert_eq!(object_topic_of(&json!({"topics": []})), None);
    }
}
