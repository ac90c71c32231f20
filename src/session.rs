// 🔐 Session Client - Authenticated handle over the remote protocol
//
// connect() negotiates the version and authenticates on the common endpoint;
// invoke() is the single generic primitive over the object endpoint:
//
//   execute_kw(database, uid, secret, entity, method, positional_args)
//
// Typed helpers (search / read / write / search_read) own the argument
// wrapping so callers never build nested arrays by hand.

use crate::config::Credentials;
use crate::logging::SharedLog;
use crate::transport::{HttpTransport, Transport, TransportError};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// A field map as returned by `read` / `search_read`
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("not connected: call connect() first")]
    NotConnected,

    /// Transport or server fault, payload preserved
    #[error("remote call {entity}.{method} failed: {source}")]
    RemoteCall {
        entity: String,
        method: String,
        #[source]
        source: TransportError,
    },

    /// The call succeeded but the value has the wrong shape
    #[error("unexpected response from {entity}.{method}: {detail}")]
    UnexpectedResponse {
        entity: String,
        method: String,
        detail: String,
    },
}

// ============================================================================
// DOMAIN (search filter)
// ============================================================================

/// Conjunction of `(field, operator, value)` terms
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Domain {
    terms: Vec<(String, String, Value)>,
}

impl Domain {
    /// Empty domain: matches every record
    pub fn all() -> Self {
        Self::default()
    }

    pub fn equals(field: &str, value: impl Into<Value>) -> Self {
        Self::all().and(field, "=", value)
    }

    pub fn and(mut self, field: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.terms
            .push((field.to_string(), operator.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Wire form: `[[field, op, value], ...]`
    pub fn to_value(&self) -> Value {
        Value::Array(
            self.terms
                .iter()
                .map(|(field, op, value)| json!([field, op, value]))
                .collect(),
        )
    }
}

// ============================================================================
// SESSION CLIENT
// ============================================================================

pub struct SessionClient {
    credentials: Credentials,
    common: Box<dyn Transport>,
    object: Box<dyn Transport>,
    uid: Option<i64>,
    server_version: Option<String>,
    log: SharedLog,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("credentials", &self.credentials)
            .field("uid", &self.uid)
            .field("server_version", &self.server_version)
            .finish()
    }
}

impl SessionClient {
    /// HTTP-backed client for `credentials.url()`; no network traffic until `connect`
    pub fn new(credentials: Credentials, log: SharedLog) -> Result<Self, TransportError> {
        let common = HttpTransport::new(credentials.common_endpoint())?;
        let object = HttpTransport::new(credentials.object_endpoint())?;
        Ok(Self::with_transports(
            credentials,
            Box::new(common),
            Box::new(object),
            log,
        ))
    }

    pub fn with_transports(
        credentials: Credentials,
        common: Box<dyn Transport>,
        object: Box<dyn Transport>,
        log: SharedLog,
    ) -> Self {
        SessionClient {
            credentials,
            common,
            object,
            uid: None,
            server_version: None,
            log,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn uid(&self) -> Option<i64> {
        self.uid
    }

    pub fn is_connected(&self) -> bool {
        self.uid.is_some()
    }

    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    pub fn log(&self) -> &SharedLog {
        &self.log
    }

    /// Negotiate version, then authenticate. Never fails: the cause is logged
    /// and `false` returned.
    pub fn connect(&mut self) -> bool {
        self.uid = None;
        self.log.info(&format!("Connecting to {}", self.credentials.url()));

        match self.try_connect() {
            Ok(uid) => {
                self.uid = Some(uid);
                self.log
                    .info(&format!("Successfully authenticated as user ID: {}", uid));
                true
            }
            Err(cause) => {
                self.log.error(&format!("Connection failed: {}", cause));
                false
            }
        }
    }

    fn try_connect(&mut self) -> Result<i64, String> {
        let version = self
            .common
            .call("version", vec![])
            .map_err(|e| e.to_string())?;

        let server_version = version
            .get("server_version")
            .and_then(Value::as_str)
            .unwrap_or("Unknown version")
            .to_string();
        self.log.info(&format!("Connected to server {}", server_version));
        self.server_version = Some(server_version);

        let uid = self
            .common
            .call(
                "authenticate",
                vec![
                    json!(self.credentials.database()),
                    json!(self.credentials.username()),
                    json!(self.credentials.secret()),
                    json!({}),
                ],
            )
            .map_err(|e| e.to_string())?;

        // false / 0 / null all mean rejected credentials
        match uid.as_i64() {
            Some(uid) if uid > 0 => Ok(uid),
            _ => Err("Authentication failed - invalid credentials".to_string()),
        }
    }

    /// Generic call on the authenticated channel
    pub fn invoke(&self, entity: &str, method: &str, args: Vec<Value>) -> Result<Value, SessionError> {
        let uid = self.uid.ok_or(SessionError::NotConnected)?;

        self.object
            .call(
                "execute_kw",
                vec![
                    json!(self.credentials.database()),
                    json!(uid),
                    json!(self.credentials.secret()),
                    json!(entity),
                    json!(method),
                    Value::Array(args),
                ],
            )
            .map_err(|source| SessionError::RemoteCall {
                entity: entity.to_string(),
                method: method.to_string(),
                source,
            })
    }

    // ========================================================================
    // TYPED HELPERS - one per remote method
    // ========================================================================

    /// `search(domain) -> [id]`; args: `[domain]`
    pub fn search(&self, entity: &str, domain: &Domain) -> Result<Vec<i64>, SessionError> {
        let value = self.invoke(entity, "search", vec![domain.to_value()])?;

        let unexpected = |detail: &str| SessionError::UnexpectedResponse {
            entity: entity.to_string(),
            method: "search".to_string(),
            detail: detail.to_string(),
        };

        value
            .as_array()
            .ok_or_else(|| unexpected("expected a list of ids"))?
            .iter()
            .map(|id| id.as_i64().ok_or_else(|| unexpected("non-integer id")))
            .collect()
    }

    /// `read(ids, fields) -> [record]`; args: `[ids, fields]`
    pub fn read(&self, entity: &str, ids: &[i64], fields: &[&str]) -> Result<Vec<Record>, SessionError> {
        let value = self.invoke(entity, "read", vec![json!(ids), json!(fields)])?;
        records(entity, "read", value)
    }

    /// `write(ids, values) -> bool`; args: `[ids, values]`
    pub fn write(&self, entity: &str, ids: &[i64], values: Record) -> Result<bool, SessionError> {
        let value = self.invoke(entity, "write", vec![json!(ids), Value::Object(values)])?;

        value.as_bool().ok_or_else(|| SessionError::UnexpectedResponse {
            entity: entity.to_string(),
            method: "write".to_string(),
            detail: format!("expected boolean ack, got {}", value),
        })
    }

    /// `search_read(domain, fields) -> [record]`; args: `[domain, fields]`
    pub fn search_read(
        &self,
        entity: &str,
        domain: &Domain,
        fields: &[&str],
    ) -> Result<Vec<Record>, SessionError> {
        let value = self.invoke(entity, "search_read", vec![domain.to_value(), json!(fields)])?;
        records(entity, "search_read", value)
    }
}

fn records(entity: &str, method: &str, value: Value) -> Result<Vec<Record>, SessionError> {
    let unexpected = |detail: &str| SessionError::UnexpectedResponse {
        entity: entity.to_string(),
        method: method.to_string(),
        detail: detail.to_string(),
    };

    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                _ => Err(unexpected("expected a list of records")),
            })
            .collect(),
        _ => Err(unexpected("expected a list of records")),
    }
}

// ============================================================================
// TESTS
// ============================================================================
