//! [`HmcConnection`] implementation over the faked HMC.

use async_trait::async_trait;
use tracing::debug;

use zhmc_core::{ApiRequest, ApiResponse, Error, HmcConnection, Method, RequestBody, Result};

use crate::handlers::{self, MockResponse};
use crate::hmc::MockHmc;

/// Request-response connection to a [`MockHmc`].
#[derive(Debug, Clone)]
pub struct MockConnection {
    hmc: MockHmc,
    host: String,
}

impl MockConnection {
    /// Connection to the given faked HMC.
    pub fn new(hmc: MockHmc) -> Self {
        let host = hmc.name().to_string();
        Self { hmc, host }
    }
}

fn session_expired() -> MockResponse {
    MockResponse::error(403, 5, "No valid session token was provided")
}

#[async_trait]
impl HmcConnection for MockConnection {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        if !self.hmc.is_available() {
            return Err(Error::Connection {
                host: self.host.clone(),
                detail: "faked HMC is not available".to_string(),
            });
        }
        let (path, query) = request
            .uri
            .split_once('?')
            .unwrap_or((request.uri.as_str(), ""));
        debug!(method = %request.method, path, "faked HMC request");

        if path == "/api/sessions" && request.method == Method::Post {
            let body = match &request.body {
                Some(RequestBody::Json(value)) => Some(value.clone()),
                _ => None,
            };
            let response =
                handlers::logon(&self.hmc, request.logon_auth.as_ref(), body.as_ref());
            return Ok(response.into_api_response());
        }

        let unauthenticated = path == "/api/version";
        if !unauthenticated {
            {
                let mut state = self.hmc.inner.state.lock();
                if state.force_expired_responses > 0 {
                    state.force_expired_responses -= 1;
                    return Ok(session_expired().into_api_response());
                }
            }
            let token_valid = request
                .session_token
                .as_ref()
                .is_some_and(|token| self.hmc.valid_token(token.expose()));
            if !token_valid {
                return Ok(session_expired().into_api_response());
            }
            if matches!(request.method, Method::Post | Method::Delete) {
                let mut state = self.hmc.inner.state.lock();
                if state.force_busy_responses > 0 {
                    state.force_busy_responses -= 1;
                    return Ok(MockResponse::error(409, 1, "The resource is busy")
                        .into_api_response());
                }
            }
            if request.method == Method::Delete && path == "/api/sessions/this-session" {
                if let Some(token) = request.session_token.as_ref() {
                    self.hmc.inner.state.lock().sessions.remove(token.expose());
                }
                return Ok(MockResponse {
                    status: 204,
                    body: None,
                }
                .into_api_response());
            }
        }

        let response =
            handlers::dispatch(&self.hmc, request.method, path, query, request.body.as_ref());
        Ok(response.into_api_response())
    }

    fn host(&self) -> &str {
        &self.host
    }
}
