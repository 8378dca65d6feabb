//! SOAP operation invocation.
//!
//! Coordinates envelope serialization, principal resolution, the HTTP
//! exchange and response extraction for a single call.

use crate::auth::resolve_principal;
use crate::codec::{deserialize_response, serialize_request};
use crate::config::{InvokerConfig, ServiceSettings};
use crate::envelope::BODY;
use crate::error::{Result, SoapError};
use crate::http::{HttpClientProvider, HttpRequest, ReqwestClientProvider};
use crate::types::{ComplexContent, Value};
use crate::wsdl::OperationDefinition;
use encoding_rs::Encoding;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Input of a single invocation.
#[derive(Debug, Clone, Default)]
pub struct InvocationRequest {
    /// Overrides the endpoint declared by the WSDL
    pub endpoint: Option<String>,
    /// Passed to the HTTP client provider
    pub transaction_id: Option<String>,
    /// Content of the input part element
    pub request: Option<ComplexContent>,
    /// Overrides the service credentials
    pub authentication: Option<Authentication>,
}

/// Per-call credentials. Each field overrides its configured counterpart
/// independently.
#[derive(Clone, Default)]
pub struct Authentication {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for Authentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authentication")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Output of a single invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvocationResult {
    /// Content of the output part element, if present in the response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Content of the fault part element, if present in the response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<Value>,
}

/// Invokes one WSDL operation.
///
/// Holds no per-call state; a single invoker can serve concurrent calls.
pub struct SoapInvoker {
    operation: OperationDefinition,
    settings: ServiceSettings,
    clients: Arc<dyn HttpClientProvider>,
}

impl SoapInvoker {
    pub fn new(
        operation: OperationDefinition,
        settings: ServiceSettings,
        clients: Arc<dyn HttpClientProvider>,
    ) -> Self {
        Self {
            operation,
            settings,
            clients,
        }
    }

    /// Create an invoker using the reqwest transport.
    pub fn from_config(config: InvokerConfig) -> Result<Self> {
        let provider = ReqwestClientProvider::new(&config.http)?;
        Ok(Self::new(config.operation, config.settings, Arc::new(provider)))
    }

    pub fn operation(&self) -> &OperationDefinition {
        &self.operation
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// The explicit endpoint, else the first port of the first service.
    pub fn resolve_endpoint(&self, explicit: Option<&str>) -> Result<String> {
        explicit
            .or_else(|| self.operation.default_endpoint())
            .map(str::to_string)
            .ok_or(SoapError::NoEndpoint)
    }

    /// Invoke the operation.
    pub async fn invoke(&self, request: InvocationRequest) -> Result<InvocationResult> {
        let endpoint = self.resolve_endpoint(request.endpoint.as_deref())?;
        let encoding = self.settings.encoding()?;

        let body = serialize_request(
            &self.operation,
            &self.settings,
            request.request.as_ref(),
            encoding,
        )?;

        let auth = request.authentication.as_ref();
        let username = auth
            .and_then(|a| a.username.as_deref())
            .or(self.settings.username.as_deref());
        let password = auth
            .and_then(|a| a.password.as_deref())
            .or(self.settings.password.as_deref());
        let principal = resolve_principal(username, password);

        let uri = Url::parse(endpoint.trim())?;
        let client = self.clients.new_client(request.transaction_id.as_deref())?;
        let http_request = self.build_request(&uri, body, encoding);
        let secure = uri.scheme() == "https";

        debug!(
            operation = %self.operation.name,
            endpoint = %uri,
            transaction_id = ?request.transaction_id,
            auth = principal.as_ref().map(|p| p.scheme()).unwrap_or("none"),
            "Invoking SOAP operation"
        );

        let response = client
            .execute(http_request, principal.as_ref(), secure, true)
            .await?;

        if !self.settings.is_accepted_status(response.code) {
            warn!(
                operation = %self.operation.name,
                status = response.code,
                reason = %response.reason_phrase,
                "SOAP call rejected"
            );
            return Err(SoapError::HttpStatus {
                code: response.code,
                reason: response.reason_phrase,
            });
        }

        // Bodiless statuses (202, 204) of one-way operations
        if response.content.is_empty() {
            info!(
                operation = %self.operation.name,
                status = response.code,
                "SOAP call returned no envelope"
            );
            return Ok(InvocationResult::default());
        }

        let envelope = deserialize_response(&self.operation, &response.content, encoding)?;
        let result = self.extract(&envelope);

        info!(
            operation = %self.operation.name,
            status = response.code,
            has_response = result.response.is_some(),
            has_fault = result.fault.is_some(),
            "SOAP call completed"
        );

        Ok(result)
    }

    /// Build the outbound message for `body`.
    pub fn build_request(&self, uri: &Url, body: Vec<u8>, encoding: &'static Encoding) -> HttpRequest {
        let target = if self.settings.use_full_path_target {
            uri.to_string()
        } else {
            match uri.query() {
                Some(query) => format!("{}?{}", uri.path(), query),
                None => uri.path().to_string(),
            }
        };

        let mut headers = vec![
            ("Content-Length".to_string(), body.len().to_string()),
            (
                "Content-Type".to_string(),
                format!(
                    "{}; charset={}",
                    self.operation.soap_version.media_type(),
                    encoding.output_encoding().name().to_lowercase()
                ),
            ),
            ("Host".to_string(), authority(uri)),
        ];
        if let Some(action) = &self.operation.soap_action {
            headers.push(("SOAPAction".to_string(), format!("\"{}\"", action)));
        }

        HttpRequest {
            method: "POST".to_string(),
            target,
            headers,
            body,
        }
    }

    fn extract(&self, envelope: &ComplexContent) -> InvocationResult {
        let body = envelope.get(BODY).and_then(Value::as_complex);
        let lookup = |name: Option<&str>| -> Option<Value> {
            body.zip(name).and_then(|(b, n)| b.get(n)).cloned()
        };
        InvocationResult {
            response: lookup(self.operation.output_element().map(|e| e.name.as_str())),
            fault: lookup(self.operation.fault_element().map(|e| e.name.as_str())),
        }
    }
}

fn authority(uri: &Url) -> String {
    let host = uri.host_str().unwrap_or_default();
    match uri.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;
    use crate::config::SoapVersion;
    use crate::http::{HttpClient, HttpResponse};
    use crate::types::{ComplexType, ElementDef, SimpleType};
    use crate::wsdl::{Message, Part, Port, Service};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const NS: &str = "http://example.org/users";

    #[derive(Debug, Clone)]
    struct Call {
        transaction_id: Option<String>,
        request: HttpRequest,
        principal: Option<Principal>,
        secure: bool,
    }

    struct MockProvider {
        response: HttpResponse,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    struct MockClient {
        transaction_id: Option<String>,
        response: HttpResponse,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl HttpClientProvider for MockProvider {
        fn new_client(&self, transaction_id: Option<&str>) -> Result<Arc<dyn HttpClient>> {
            Ok(Arc::new(MockClient {
                transaction_id: transaction_id.map(str::to_string),
                response: self.response.clone(),
                calls: self.calls.clone(),
            }))
        }
    }

    #[async_trait]
    impl HttpClient for MockClient {
        async fn execute(
            &self,
            request: HttpRequest,
            principal: Option<&Principal>,
            secure: bool,
            _read_full_body: bool,
        ) -> Result<HttpResponse> {
            self.calls.lock().unwrap().push(Call {
                transaction_id: self.transaction_id.clone(),
                request,
                principal: principal.cloned(),
                secure,
            });
            Ok(self.response.clone())
        }
    }

    fn user_type(name: &str) -> ComplexType {
        ComplexType::new(name, Some(NS.to_string()))
            .with_child(ElementDef::simple("UserId", SimpleType::Int))
            .with_child(ElementDef::simple("Name", SimpleType::String).with_min_occurs(0))
    }

    fn message(name: &str) -> Message {
        Message {
            name: name.to_string(),
            parts: vec![Part {
                name: "parameters".to_string(),
                element: ElementDef::complex(name, user_type(name)).with_namespace(NS),
            }],
        }
    }

    fn operation() -> OperationDefinition {
        OperationDefinition {
            name: "GetUser".to_string(),
            soap_version: SoapVersion::Soap11,
            target_namespace: Some(NS.to_string()),
            soap_action: Some("urn:GetUser".to_string()),
            input: Some(message("GetUser")),
            output: Some(message("GetUserResponse")),
            faults: vec![message("UserFault")],
            services: vec![Service {
                name: "Users".to_string(),
                ports: vec![Port {
                    name: "UsersSoap".to_string(),
                    endpoint: Some("http://wsdl.example.org:8080/users/svc".to_string()),
                }],
            }],
        }
    }

    fn ok_body(element: &str) -> Vec<u8> {
        format!(
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body><{0} xmlns="http://example.org/users"><UserId>42</UserId><Name>Alice</Name></{0}></soap:Body>
</soap:Envelope>"#,
            element
        )
        .into_bytes()
    }

    fn response(code: u16, content: Vec<u8>) -> HttpResponse {
        HttpResponse {
            code,
            reason_phrase: "Reason".to_string(),
            content,
        }
    }

    fn invoker(
        operation: OperationDefinition,
        settings: ServiceSettings,
        response: HttpResponse,
    ) -> (SoapInvoker, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let provider = MockProvider {
            response,
            calls: calls.clone(),
        };
        (SoapInvoker::new(operation, settings, Arc::new(provider)), calls)
    }

    fn input() -> ComplexContent {
        let mut input = user_type("GetUser").new_instance();
        input.set("UserId", 42i64).unwrap();
        input
    }

    #[tokio::test]
    async fn test_invoke_extracts_output() {
        let (invoker, calls) = invoker(
            operation(),
            ServiceSettings::default(),
            response(200, ok_body("GetUserResponse")),
        );
        let result = invoker
            .invoke(InvocationRequest {
                request: Some(input()),
                transaction_id: Some("tx-9".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let output = result.response.as_ref().and_then(Value::as_complex).unwrap();
        assert_eq!(output.get("UserId"), Some(&Value::Integer(42)));
        assert_eq!(output.get("Name"), Some(&Value::from("Alice")));
        assert!(result.fault.is_none());

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].transaction_id.as_deref(), Some("tx-9"));
        assert!(!calls[0].secure);
        assert!(calls[0].principal.is_none());
    }

    #[tokio::test]
    async fn test_request_headers() {
        let (invoker, calls) = invoker(
            operation(),
            ServiceSettings::default(),
            response(200, ok_body("GetUserResponse")),
        );
        invoker
            .invoke(InvocationRequest {
                request: Some(input()),
                ..Default::default()
            })
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        let request = &calls[0].request;
        assert_eq!(request.method, "POST");
        assert_eq!(request.target, "/users/svc");
        assert_eq!(request.header("Host"), Some("wsdl.example.org:8080"));
        assert_eq!(request.header("Content-Type"), Some("text/xml; charset=utf-8"));
        assert_eq!(request.header("SOAPAction"), Some("\"urn:GetUser\""));
        assert_eq!(
            request.header("Content-Length"),
            Some(request.body.len().to_string().as_str())
        );
        let body = String::from_utf8(request.body.clone()).unwrap();
        assert!(body.contains("<soap:Body><GetUser><UserId>42</UserId></GetUser></soap:Body>"));
    }

    #[tokio::test]
    async fn test_soap_12_without_action() {
        let mut op = operation();
        op.soap_version = SoapVersion::Soap12;
        op.soap_action = None;
        let body = String::from_utf8(ok_body("GetUserResponse"))
            .unwrap()
            .replace(crate::envelope::SOAP_11_NS, crate::envelope::SOAP_12_NS);
        let (invoker, calls) = invoker(op, ServiceSettings::default(), response(200, body.into_bytes()));
        invoker.invoke(InvocationRequest::default()).await.unwrap();

        let calls = calls.lock().unwrap();
        let request = &calls[0].request;
        assert_eq!(
            request.header("Content-Type"),
            Some("application/soap+xml; charset=utf-8")
        );
        assert_eq!(request.header("SOAPAction"), None);
    }

    #[tokio::test]
    async fn test_explicit_endpoint_wins() {
        let settings = ServiceSettings {
            use_full_path_target: true,
            ..Default::default()
        };
        let (invoker, calls) = invoker(operation(), settings, response(200, ok_body("GetUserResponse")));
        invoker
            .invoke(InvocationRequest {
                endpoint: Some("https://override.example.org/soap endpoint".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert!(calls[0].secure);
        assert_eq!(
            calls[0].request.target,
            "https://override.example.org/soap%20endpoint"
        );
        assert_eq!(calls[0].request.header("Host"), Some("override.example.org"));
    }

    #[tokio::test]
    async fn test_no_endpoint() {
        let mut op = operation();
        op.services.clear();
        let (invoker, calls) = invoker(op, ServiceSettings::default(), response(200, Vec::new()));
        let err = invoker.invoke(InvocationRequest::default()).await.unwrap_err();
        assert!(matches!(err, SoapError::NoEndpoint));
        assert_eq!(err.code(), Some("SOAP-1"));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_status() {
        let (invoker, _) = invoker(
            operation(),
            ServiceSettings::default(),
            response(500, ok_body("UserFault")),
        );
        let err = invoker.invoke(InvocationRequest::default()).await.unwrap_err();
        assert_eq!(err.code(), Some("SOAP-2"));
        assert_eq!(err.http_status(), Some(500));
    }

    #[tokio::test]
    async fn test_allowed_status_extracts_fault() {
        let settings = ServiceSettings {
            allowed_http_codes: vec![500],
            ..Default::default()
        };
        let (invoker, _) = invoker(operation(), settings, response(500, ok_body("UserFault")));
        let result = invoker.invoke(InvocationRequest::default()).await.unwrap();
        assert!(result.response.is_none());
        let fault = result.fault.as_ref().and_then(Value::as_complex).unwrap();
        assert_eq!(fault.get("Name"), Some(&Value::from("Alice")));
    }

    #[tokio::test]
    async fn test_empty_success_body() {
        let settings = ServiceSettings {
            allowed_http_codes: vec![204],
            ..Default::default()
        };
        let (invoker, _) = invoker(operation(), settings, response(204, Vec::new()));
        let result = invoker.invoke(InvocationRequest::default()).await.unwrap();
        assert_eq!(result, InvocationResult::default());
    }

    #[tokio::test]
    async fn test_whitespace_body_is_not_empty() {
        let (invoker, _) = invoker(
            operation(),
            ServiceSettings::default(),
            response(200, b" \r\n".to_vec()),
        );
        let err = invoker.invoke(InvocationRequest::default()).await.unwrap_err();
        assert!(matches!(err, SoapError::Parse(_)));
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let (invoker, _) = invoker(
            operation(),
            ServiceSettings::default(),
            response(200, b"<soap:Envelope".to_vec()),
        );
        let err = invoker.invoke(InvocationRequest::default()).await.unwrap_err();
        assert!(matches!(err, SoapError::Parse(_)));
    }

    #[tokio::test]
    async fn test_credentials_override_per_field() {
        let settings = ServiceSettings {
            username: Some("CORP/svc".to_string()),
            password: Some("configured".to_string()),
            ..Default::default()
        };
        let (invoker, calls) = invoker(operation(), settings, response(200, ok_body("GetUserResponse")));

        invoker.invoke(InvocationRequest::default()).await.unwrap();
        invoker
            .invoke(InvocationRequest {
                authentication: Some(Authentication {
                    username: Some("alice".to_string()),
                    password: None,
                }),
                ..Default::default()
            })
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(
            calls[0].principal,
            Some(Principal::Ntlm {
                domain: "CORP".to_string(),
                name: "svc".to_string(),
                password: "configured".to_string(),
            })
        );
        assert_eq!(
            calls[1].principal,
            Some(Principal::Basic {
                name: "alice".to_string(),
                password: "configured".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_invalid_endpoint() {
        let (invoker, _) = invoker(operation(), ServiceSettings::default(), response(200, Vec::new()));
        let err = invoker
            .invoke(InvocationRequest {
                endpoint: Some("not a uri".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Uri);
    }
}
