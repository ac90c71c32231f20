// 🔌 Transport - One XML-RPC endpoint, one attempt per call
//
// The session holds two of these (common + object). There is no retry or
// backoff here: a call returns a value or fails once.

use crate::xmlrpc::{decode_response, encode_call, CodecError, MethodResponse};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    /// Connection refused, DNS, TLS, timeout
    #[error("connection error: {0}")]
    Connection(String),

    #[error("HTTP status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    /// Server-side fault (bad credentials, access rights, bad domain...)
    #[error("remote fault {code}: {message}")]
    Fault { code: i64, message: String },

    #[error("protocol error: {0}")]
    Protocol(#[from] CodecError),
}

/// A remote-procedure endpoint
pub trait Transport: Send + Sync {
    /// Invoke `method` with positional `params`
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError>;

    /// Where calls go (for logging)
    fn endpoint(&self) -> &str;
}

// ============================================================================
// HTTP TRANSPORT
// ============================================================================

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(HttpTransport {
            endpoint: endpoint.into(),
            client,
        })
    }
}

impl Transport for HttpTransport {
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let body = encode_call(method, &params)?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let text = response
            .text()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        match decode_response(&text)? {
            MethodResponse::Success(value) => Ok(value),
            MethodResponse::Fault { code, message } => Err(TransportError::Fault { code, message }),
        }
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// ============================================================================
// SCRIPTED TRANSPORT (tests)
// ============================================================================


#[cfg(test)]
mod tests {
    use super::fake::FakeTransport;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_transport_connection_refused() {
        // Port 9 (discard) on localhost is closed in test environments
        let transport = HttpTransport::with_timeout("http://127.0.0.1:9/xmlrpc/2/common", Duration::from_secs(2)).unwrap();

        let err = transport.call("version", vec![]).unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
        assert_eq!(transport.endpoint(), "http://127.0.0.1:9/xmlrpc/2/common");
    }

    #[test]
    fn test_fake_transport_replays_in_order() {
        let fake = FakeTransport::new();
        fake.respond("version", Ok(json!({"server_version": "17.0"})))
            .respond("version", Err(TransportError::Connection("down".to_string())));

        assert_eq!(fake.call("version", vec![]).unwrap()["server_version"], json!("17.0"));
        assert!(fake.call("version", vec![]).is_err());
        assert!(fake.call("version", vec![]).is_err());
        assert_eq!(fake.calls().len(), 3);
    }

    // ========================================================================
    // HTTP against a mock XML-RPC server
    // ========================================================================

    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OBJECT_PATH: &str = "/xmlrpc/2/object";

    /// The blocking client must not run on the runtime thread serving the mock
    async fn call_blocking(endpoint: String, params: Vec<Value>) -> Result<Value, TransportError> {
        tokio::task::spawn_blocking(move || {
            let transport = HttpTransport::with_timeout(endpoint, Duration::from_secs(5))?;
            transport.call("execute_kw", params)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_http_transport_posts_xml_and_decodes_value() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(OBJECT_PATH))
            .and(header("content-type", "text/xml"))
            .and(body_string_contains("<methodName>execute_kw</methodName>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<?xml version='1.0'?><methodResponse><params><param>\
                 <value><array><data><value><int>3</int></value></data></array></value>\
                 </param></params></methodResponse>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let result = call_blocking(
            format!("{}{}", server.uri(), OBJECT_PATH),
            vec![json!("shop"), json!(2), json!("product.template"), json!("search")],
        )
        .await;
        assert_eq!(result.unwrap(), json!([3]));

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        assert!(body.starts_with("<?xml version=\"1.0\"?>"));
        assert!(body.contains("<param><value><string>shop</string></value></param>"));
        assert!(body.contains("<param><value><int>2</int></value></param>"));
    }

    #[tokio::test]
    async fn test_http_transport_fault_in_ok_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(OBJECT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<?xml version='1.0'?><methodResponse><fault><value><struct>\
                 <member><name>faultCode</name><value><int>1</int></value></member>\
                 <member><name>faultString</name><value><string>boom</string></value></member>\
                 </struct></value></fault></methodResponse>",
            ))
            .mount(&server)
            .await;

        let err = call_blocking(format!("{}{}", server.uri(), OBJECT_PATH), vec![])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Fault {
                code: 1,
                message: "boom".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_http_transport_non_success_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(OBJECT_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .expect(1) // one attempt, no retry
            .mount(&server)
            .await;

        let endpoint = format!("{}{}", server.uri(), OBJECT_PATH);
        let err = call_blocking(endpoint.clone(), vec![]).await.unwrap_err();
        assert_eq!(err, TransportError::Status { endpoint, status: 500 });
    }

    #[tokio::test]
    async fn test_http_transport_non_xml_body_is_protocol_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(OBJECT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>maintenance</body></html>"))
            .mount(&server)
            .await;

        let err = call_blocking(format!("{}{}", server.uri(), OBJECT_PATH), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Protocol(CodecError::Malformed(_))));
    }

    #[test]
    fn test_fault_display() {
        let err = TransportError::Fault {
            code: 3,
            message: "Access Denied".to_string(),
        };
        assert_eq!(err.to_string(), "remote fault 3: Access Denied");
    }
}
