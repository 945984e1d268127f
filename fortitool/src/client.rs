//! Blocking HTTP session client for the appliance.
//!
//! Two calls per run, strictly in order: `login` establishes a session,
//! `fetch_certificate` spends it. Nothing is retried; every failure is
//! terminal and mapped into [`ClientError`].

use std::time::Duration;

use forti_cert::rpc::{self, CertRef, GetResponse, LoginResponse, RpcError, RpcRequest, Session};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Failures from one appliance exchange.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failure reported in an otherwise well-formed response.
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The request did not complete within the configured timeout.
    #[error("request to appliance timed out after {0}s")]
    Timeout(u64),

    /// Network or TLS failure below the RPC layer.
    #[error("transport error talking to appliance")]
    Transport(#[source] reqwest::Error),

    /// The endpoint answered, but not with a usable RPC response.
    #[error("appliance returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

/// One authenticated conversation with an appliance's `/jsonrpc` endpoint.
pub struct ApplianceClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    timeout_secs: u64,
}

impl ApplianceClient {
    /// Builds a client for `host` with an explicit request timeout.
    ///
    /// `accept_invalid_certs` skips TLS certificate verification for the
    /// appliance connection. Appliances commonly ship self-signed
    /// certificates, but this must stay an explicit caller decision: it is
    /// off unless the user asked for it.
    pub fn new(
        host: &str,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, ClientError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(ClientError::Transport)?;

        Ok(Self {
            http,
            endpoint: format!("https://{host}{}", rpc::RPC_PATH),
            timeout_secs: timeout.as_secs(),
        })
    }

    /// Logs in and returns the session token for the rest of the run.
    pub fn login(&self, username: &str, password: &str) -> Result<Session, ClientError> {
        let response: LoginResponse = self.call(&rpc::login(username, password))?;
        Ok(response.into_session()?)
    }

    /// Fetches the raw PEM encoding of the referenced certificate.
    pub fn fetch_certificate(
        &self,
        session: &Session,
        cert: &CertRef,
    ) -> Result<String, ClientError> {
        let response: GetResponse = self.call(&rpc::get_certificate(session, cert))?;
        Ok(response.certificate_pem(cert)?)
    }

    fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        request: &RpcRequest<'_, P>,
    ) -> Result<R, ClientError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .map_err(|err| self.wire_error(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }

        response.json().map_err(|err| self.wire_error(err))
    }

    fn wire_error(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.timeout_secs)
        } else {
            ClientError::Transport(err)
        }
    }
}
