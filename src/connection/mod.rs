//! Device capability for the Opengear REST API.
//!
//! The reconciliation engine never speaks HTTP itself. Everything it needs from a
//! device goes through the [`DeviceClient`] trait: read a resource, send a
//! command, open and close a session. Implementations own the transport, TLS and
//! token handling; this module only fixes the contract and the response framing.
//!
//! # Response framing
//!
//! Every API reply is JSON. A reply carrying an `error` key is a failure and is
//! surfaced as [`ConnectionError::Api`] with the device's status code and text.
//! Some successful `DELETE`/`POST` calls return no body at all. Those are
//! reported structurally as [`Response::Empty`] rather than as a parse failure:
//!
//! ```rust
//! use opengear_om::connection::{parse_response, Response};
//!
//! assert_eq!(parse_response("").unwrap(), Response::Empty);
//!
//! let err = parse_response(r#"{"error": [{"code": 404, "text": "No such user"}]}"#)
//!     .unwrap_err();
//! assert_eq!(err.code(), Some(404));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Base path every resource path is relative to.
pub const API_BASE: &str = "/api/v2/";

/// Session collection; login POSTs credentials here.
pub const SESSIONS_PATH: &str = "sessions/";

/// The caller's own session; logout DELETEs it.
pub const SESSION_SELF_PATH: &str = "sessions/self";

/// Message prefix older clients use for a reply with no parseable body.
pub const EMPTY_BODY_MARKER: &str = "Expecting value:";

/// Errors that can occur while talking to a device.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The device answered with an `error` envelope.
    #[error("{text} (status {code})")]
    Api {
        /// HTTP-style status code reported by the device
        code: u16,
        /// Error text reported by the device
        text: String,
    },

    /// The device answered successfully with no body.
    #[error("Empty response body")]
    EmptyBody,

    /// The reply could not be decoded.
    #[error("{0}")]
    InvalidResponse(String),

    /// The request never produced a reply.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Login was rejected.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A request was attempted without a session.
    #[error("Not logged in")]
    NotLoggedIn,
}

impl ConnectionError {
    /// Status code carried by the error, if the device reported one.
    pub fn code(&self) -> Option<u16> {
        match self {
            ConnectionError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether this error means "success with no content".
    ///
    /// [`ConnectionError::EmptyBody`] always qualifies. Clients that cannot tell an
    /// empty body from a decode failure report the latter with a message starting
    /// with `marker`; that form is accepted too, unless the marker is empty.
    pub fn is_tolerated_empty_body(&self, marker: &str) -> bool {
        match self {
            ConnectionError::EmptyBody => true,
            ConnectionError::Api { .. } => false,
            other => !marker.is_empty() && other.to_string().starts_with(marker),
        }
    }
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Put => write!(f, "PUT"),
            Method::Post => write!(f, "POST"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for Method {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "PUT" => Ok(Method::Put),
            "POST" => Ok(Method::Post),
            "DELETE" => Ok(Method::Delete),
            _ => Err(ConnectionError::InvalidResponse(format!(
                "Unsupported method: {}",
                s
            ))),
        }
    }
}

/// A decoded device reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// JSON document.
    Json(Value),
    /// Successful reply without a body.
    Empty,
}

impl Response {
    /// Returns true if the reply had no body.
    pub fn is_empty(&self) -> bool {
        matches!(self, Response::Empty)
    }

    /// Looks up a top-level key of a JSON reply.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Response::Json(value) => value.get(key),
            Response::Empty => None,
        }
    }

    /// Converts into the JSON document, if any.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Response::Json(value) => Some(value),
            Response::Empty => None,
        }
    }
}

/// Capability to execute REST operations against one device.
///
/// Paths are relative to [`API_BASE`]. Implementations must translate an
/// `error` envelope into [`ConnectionError::Api`] (see [`parse_response`]) and
/// report bodiless successes as [`Response::Empty`].
#[cfg_attr(test, mockall::automock)]
pub trait DeviceClient: Send + Sync {
    /// Open a session with the device.
    fn login(&self, username: &str, password: &str) -> ConnectionResult<()>;

    /// Read a resource.
    fn get(&self, path: &str) -> ConnectionResult<Value>;

    /// Send a mutating request.
    fn send(&self, method: Method, path: &str, body: Option<Value>) -> ConnectionResult<Response>;

    /// Close the session.
    fn logout(&self) -> ConnectionResult<()>;
}

/// Decode a raw reply body.
///
/// An empty body is a success without content. A body with an `error` key
/// becomes [`ConnectionError::Api`] built from its first entry.
pub fn parse_response(body: &str) -> ConnectionResult<Response> {
    if body.trim().is_empty() {
        return Ok(Response::Empty);
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| ConnectionError::InvalidResponse(e.to_string()))?;

    if let Some(error) = value.get("error") {
        let entry = match error {
            Value::Array(entries) => entries.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        let code = entry
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(0);
        let text = entry
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ConnectionError::Api { code, text });
    }

    Ok(Response::Json(value))
}

/// Header carrying the session token on every authenticated request.
pub fn session_header(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Token {}", token))
}

/// Login request body.
pub fn login_body(username: &str, password: &str) -> Value {
    serde_json::json!({ "username": username, "password": password })
}

/// Identity of the connected appliance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub network_os: String,
    pub firmware_version: String,
    pub rest_api_version: String,
    pub hostname: String,
    pub serial_number: String,
    pub model_name: String,
}

impl DeviceInfo {
    /// Read version, hostname, serial number and model from the device.
    pub fn gather(client: &dyn DeviceClient) -> ConnectionResult<Self> {
        let version = client.get("system/version")?;
        let version = version.get("system_version").ok_or_else(|| {
            ConnectionError::InvalidResponse("system/version: missing system_version".into())
        })?;

        let mut info = DeviceInfo {
            network_os: "opengear".to_string(),
            firmware_version: string_field(version, "firmware_version"),
            rest_api_version: string_field(version, "rest_api_version"),
            ..Default::default()
        };

        for endpoint in ["hostname", "serial_number", "model_name"] {
            let reply = client.get(&format!("system/{}", endpoint))?;
            let value = reply
                .get(format!("system_{}", endpoint))
                .map(|v| string_field(v, endpoint))
                .unwrap_or_default();
            match endpoint {
                "hostname" => info.hostname = value,
                "serial_number" => info.serial_number = value,
                _ => info.model_name = value,
            }
        }

        Ok(info)
    }
}

fn string_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
