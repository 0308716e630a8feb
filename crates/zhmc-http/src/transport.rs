//! reqwest-based implementation of [`HmcConnection`].

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use reqwest::header;
use tracing::{debug, warn};

use zhmc_core::{
    ApiRequest, ApiResponse, Error, HmcConnection, Method, RequestBody, Result,
    RetryTimeoutConfig, SESSION_HEADER, VerifyCert,
};

/// HTTPS connection to one HMC.
pub struct HttpTransport {
    base_url: String,
    host: String,
    client: reqwest::Client,
    config: RetryTimeoutConfig,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpTransport {
    /// Create a transport for the given origin, e.g.
    /// `https://hmc1.example.com:6794`.
    pub fn new(
        base_url: impl Into<String>,
        config: RetryTimeoutConfig,
        verify_cert: &VerifyCert,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let host = host_of(&base_url)?;

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .redirect(reqwest::redirect::Policy::limited(
                config.max_redirects as usize,
            ));

        if verify_cert.is_off() {
            warn!(
                host = %host,
                "certificate verification is disabled for this session; \
                 only use this against test HMCs"
            );
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Some(ca_path) = verify_cert.ca_path() {
            for cert in load_ca_certs(&ca_path, &host)? {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder.build().map_err(|e| Error::Connection {
            host: host.clone(),
            detail: format!("cannot build HTTP client: {e}"),
        })?;

        Ok(Self {
            base_url,
            host,
            client,
            config,
        })
    }

    fn build_request(&self, request: &ApiRequest) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, request.uri);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };
        if let Some(token) = &request.session_token {
            builder = builder.header(SESSION_HEADER, token.expose());
        }
        if let Some((userid, password)) = &request.logon_auth {
            builder = builder.basic_auth(userid, Some(password.expose()));
        }
        match &request.body {
            Some(RequestBody::Json(value)) => builder = builder.json(value),
            Some(RequestBody::Binary { content_type, data }) => {
                builder = builder
                    .header(header::CONTENT_TYPE, content_type)
                    .body(data.clone());
            }
            None => {}
        }
        if let Some(timeout) = request.read_timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }

    fn classify(&self, err: &reqwest::Error, attempts: u32) -> Error {
        if err.is_redirect() {
            return Error::RetriesExceeded {
                host: self.host.clone(),
                attempts: self.config.max_redirects,
                detail: format!("redirect limit exceeded: {err}"),
            };
        }
        let chain = error_chain(err);
        if chain.contains("certificate") || chain.contains("UnknownIssuer") {
            return Error::ClientAuth(format!(
                "server certificate of {} did not verify: {chain}",
                self.host
            ));
        }
        if err.is_connect() {
            if err.is_timeout() {
                return Error::ConnectTimeout {
                    host: self.host.clone(),
                    timeout: self.config.connect_timeout,
                    attempts,
                };
            }
            return Error::Connection {
                host: self.host.clone(),
                detail: chain,
            };
        }
        if err.is_timeout() {
            return Error::ReadTimeout {
                host: self.host.clone(),
                timeout: self.config.read_timeout,
                attempts,
            };
        }
        Error::Connection {
            host: self.host.clone(),
            detail: chain,
        }
    }
}

#[async_trait]
impl HmcConnection for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut connect_attempts: u32 = 0;
        let mut read_attempts: u32 = 0;
        loop {
            debug!(
                method = %request.method,
                uri = %request.uri,
                host = %self.host,
                "sending HMC request"
            );
            let response = match self.build_request(&request).send().await {
                Ok(response) => response,
                Err(err) => {
                    if err.is_connect() && !err.is_redirect() {
                        connect_attempts += 1;
                        if connect_attempts <= self.config.connect_retries
                            && !error_chain(&err).contains("certificate")
                        {
                            debug!(
                                host = %self.host,
                                attempt = connect_attempts,
                                "connect failed, retrying"
                            );
                            continue;
                        }
                        return Err(self.classify(&err, connect_attempts));
                    }
                    if err.is_timeout() && request.method == Method::Get {
                        read_attempts += 1;
                        if read_attempts <= self.config.read_retries {
                            debug!(
                                host = %self.host,
                                attempt = read_attempts,
                                "read timed out on idempotent request, retrying"
                            );
                            continue;
                        }
                    }
                    return Err(self.classify(&err, read_attempts.max(1)));
                }
            };

            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response
                .bytes()
                .await
                .map_err(|e| self.classify(&e, read_attempts.max(1)))?;
            debug!(
                method = %request.method,
                uri = %request.uri,
                status,
                body_len = body.len(),
                "received HMC response"
            );
            return Ok(ApiResponse {
                status,
                content_type,
                body,
            });
        }
    }

    fn host(&self) -> &str {
        &self.host
    }
}

fn host_of(base_url: &str) -> Result<String> {
    let url = url::Url::parse(base_url).map_err(|e| Error::Connection {
        host: base_url.to_string(),
        detail: format!("invalid HMC URL: {e}"),
    })?;
    let host = url.host_str().ok_or_else(|| Error::Connection {
        host: base_url.to_string(),
        detail: "HMC URL has no host".to_string(),
    })?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Load CA certificates from a PEM file or a directory of PEM files.
fn load_ca_certs(path: &Path, host: &str) -> Result<Vec<reqwest::Certificate>> {
    let mut certs = Vec::new();
    let files: Vec<std::path::PathBuf> = if path.is_dir() {
        let entries = fs::read_dir(path).map_err(|e| {
            Error::ClientAuth(format!("cannot read CA directory {}: {e}", path.display()))
        })?;
        entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect()
    } else {
        vec![path.to_path_buf()]
    };

    for file in files {
        let data = fs::read(&file).map_err(|e| {
            Error::ClientAuth(format!("cannot read CA bundle {}: {e}", file.display()))
        })?;
        let mut reader = std::io::BufReader::new(data.as_slice());
        for der in rustls_pemfile::certs(&mut reader) {
            let der = der.map_err(|e| {
                Error::ClientAuth(format!("cannot parse CA bundle {}: {e}", file.display()))
            })?;
            let cert = reqwest::Certificate::from_der(&der).map_err(|e| {
                Error::ClientAuth(format!("invalid certificate in {}: {e}", file.display()))
            })?;
            certs.push(cert);
        }
    }

    if certs.is_empty() {
        return Err(Error::ClientAuth(format!(
            "no usable CA certificates found in {} for host {host}",
            path.display()
        )));
    }
    Ok(certs)
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        parts.push(inner.to_string());
        source = inner.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_extraction() {
        assert_eq!(
            host_of("https://hmc1.example.com:6794").unwrap(),
            "hmc1.example.com:6794"
        );
        assert_eq!(host_of("https://hmc1").unwrap(), "hmc1");
        assert!(host_of("not a url").is_err());
    }

    #[test]
    fn debug_has_no_credentials() {
        let transport = HttpTransport::new(
            "https://hmc1:6794",
            RetryTimeoutConfig::default(),
            &VerifyCert::Default,
        )
        .unwrap();
        let rendered = format!("{transport:?}");
        assert!(rendered.contains("hmc1"));
        assert!(!rendered.contains("password"));
    }
}
