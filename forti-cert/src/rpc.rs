//! Wire shapes for the appliance's JSON-RPC management endpoint.
//!
//! Every exchange is a single POST to [`RPC_PATH`]: one `exec` call to log
//! in, then one `get` call for a certificate resource. Responses are
//! modeled as explicit types in which everything the appliance may omit is
//! an `Option` or a defaulted `Vec`, so an unexpected response shape
//! degrades to [`RpcError::NotFound`] instead of a decode fault.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Path of the JSON-RPC endpoint on the appliance.
pub const RPC_PATH: &str = "/jsonrpc";

/// Fixed request id; this client never has more than one call in flight.
const REQUEST_ID: u32 = 1;

/// Failures reported by the appliance's RPC responses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RpcError {
    /// Login did not yield a session token.
    #[error("authentication failed: appliance issued no session token")]
    Auth,

    /// The queried store had no matching entry, or the response shape
    /// carried no certificate where one was expected.
    #[error("certificate {name:?} not found in the {kind} store")]
    NotFound {
        /// Store that was queried.
        kind: CertType,
        /// Appliance-assigned certificate name.
        name: String,
    },
}

/// Opaque session token issued on login.
///
/// Scoped to one program run and never persisted; no explicit logout is
/// sent, the appliance expires the token server-side.
#[derive(Clone, Debug, Serialize)]
#[serde(transparent)]
pub struct Session(String);

/// Which certificate store to query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CertType {
    /// CA certificate store.
    Ca,
    /// Locally-issued certificate store.
    Local,
}

impl CertType {
    /// Uppercase label used in report headers.
    pub fn label(self) -> &'static str {
        match self {
            CertType::Ca => "CA",
            CertType::Local => "LOCAL",
        }
    }
}

impl fmt::Display for CertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CertType::Ca => "ca",
            CertType::Local => "local",
        })
    }
}

/// Error returned when a certificate type string is neither `ca` nor
/// `local`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown certificate type {0:?} (expected \"ca\" or \"local\")")]
pub struct ParseCertTypeError(String);

impl FromStr for CertType {
    type Err = ParseCertTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ca" => Ok(CertType::Ca),
            "local" => Ok(CertType::Local),
            other => Err(ParseCertTypeError(other.to_owned())),
        }
    }
}

/// Identifies one stored certificate on the appliance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertRef {
    /// Store the certificate lives in.
    pub kind: CertType,
    /// Appliance-assigned name.
    pub name: String,
}

impl CertRef {
    /// CLI-style resource path for the `get` call.
    pub fn resource_url(&self) -> String {
        format!("/cli/global/system/certificate/{}/{}", self.kind, self.name)
    }
}

/// One JSON-RPC call envelope.
///
/// ```json
/// {"id": 1, "method": "...", "params": [ ... ], "session": ...}
/// ```
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a, P> {
    /// Request id, echoed back by the appliance.
    pub id: u32,
    /// RPC verb: `"exec"` for login, `"get"` for queries.
    pub method: &'static str,
    /// Single-element parameter list, per the appliance's convention.
    pub params: [P; 1],
    /// Session token; `None` for the login call itself.
    pub session: Option<&'a Session>,
}

/// Parameters of the login `exec` call.
#[derive(Debug, Serialize)]
pub struct LoginParams {
    /// Single credential record.
    pub data: [Credentials; 1],
    /// Login resource path.
    pub url: &'static str,
}

/// Credential record inside [`LoginParams`].
#[derive(Debug, Serialize)]
pub struct Credentials {
    /// Password, under the appliance's `passwd` key.
    pub passwd: String,
    /// User name, under the appliance's `user` key.
    pub user: String,
}

/// Parameters of a `get` call.
#[derive(Debug, Serialize)]
pub struct GetParams {
    /// Resource path being queried.
    pub url: String,
}

/// Builds the login request for the given credentials.
///
/// ```json
/// {"id": 1, "method": "exec",
///  "params": [{"data": [{"passwd": "...", "user": "..."}],
///              "url": "sys/login/user"}],
///  "session": null}
/// ```
pub fn login(username: &str, password: &str) -> RpcRequest<'static, LoginParams> {
    RpcRequest {
        id: REQUEST_ID,
        method: "exec",
        params: [LoginParams {
            data: [Credentials {
                passwd: password.to_owned(),
                user: username.to_owned(),
            }],
            url: "sys/login/user",
        }],
        session: None,
    }
}

/// Builds the certificate query for an authenticated session.
///
/// ```json
/// {"id": 1, "method": "get",
///  "params": [{"url": "/cli/global/system/certificate/{type}/{name}"}],
///  "session": "..."}
/// ```
pub fn get_certificate<'a>(session: &'a Session, cert: &CertRef) -> RpcRequest<'a, GetParams> {
    RpcRequest {
        id: REQUEST_ID,
        method: "get",
        params: [GetParams {
            url: cert.resource_url(),
        }],
        session: Some(session),
    }
}

/// Body of the login response; only the session token matters.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    /// Token issued on success; absent when credentials are rejected.
    pub session: Option<String>,
}

impl LoginResponse {
    /// Extracts the session token, treating its absence as an
    /// authentication failure rather than a protocol error.
    pub fn into_session(self) -> Result<Session, RpcError> {
        self.session.map(Session).ok_or(RpcError::Auth)
    }
}

/// Body of a certificate `get` response.
#[derive(Debug, Deserialize)]
pub struct GetResponse {
    /// Result list; empty or absent when nothing matched.
    #[serde(default)]
    pub result: Vec<ResultEntry>,
}

/// One entry of the result list.
#[derive(Debug, Deserialize)]
pub struct ResultEntry {
    /// Certificate records, keyed by store.
    pub data: Option<ResultData>,
}

/// Certificate records inside a result entry. CA entries carry PEM text
/// directly; local entries nest it under a `certificate` field.
#[derive(Debug, Default, Deserialize)]
pub struct ResultData {
    /// PEM encodings for a CA query.
    #[serde(default)]
    pub ca: Vec<String>,
    /// Records for a local-certificate query.
    #[serde(default)]
    pub local: Vec<LocalEntry>,
}

/// One local-certificate record.
#[derive(Debug, Deserialize)]
pub struct LocalEntry {
    /// PEM encoding of the certificate.
    pub certificate: Option<String>,
}

impl GetResponse {
    /// Extracts the raw PEM encoding for `cert`, following the store-specific
    /// nesting. Every missing key and empty array along the way means the
    /// certificate is not there: [`RpcError::NotFound`].
    pub fn certificate_pem(self, cert: &CertRef) -> Result<String, RpcError> {
        let not_found = || RpcError::NotFound {
            kind: cert.kind,
            name: cert.name.clone(),
        };

        let data = self
            .result
            .into_iter()
            .next()
            .and_then(|entry| entry.data)
            .ok_or_else(not_found)?;

        match cert.kind {
            CertType::Ca => data.ca.into_iter().next().ok_or_else(not_found),
            CertType::Local => data
                .local
                .into_iter()
                .next()
                .and_then(|entry| entry.certificate)
                .ok_or_else(not_found),
        }
    }
}
