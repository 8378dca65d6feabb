//! Configuration types for the SOAP invoker.

use crate::error::{Result, SoapError};
use crate::wsdl::OperationDefinition;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

/// Top-level configuration: one operation plus how to call it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokerConfig {
    /// Config version
    pub version: String,

    /// Service-level invocation settings
    pub settings: ServiceSettings,

    /// HTTP transport settings
    pub http: HttpSettings,

    /// The operation to invoke
    pub operation: OperationDefinition,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            settings: ServiceSettings::default(),
            http: HttpSettings::default(),
            operation: OperationDefinition::default(),
        }
    }
}

/// Settings attached to a WSDL service, shared by all of its operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Username used when the call does not pass one
    pub username: Option<String>,

    /// Password used when the call does not pass one
    pub password: Option<String>,

    /// Charset label for request and response bodies
    pub charset: String,

    /// Let the marshaller emit xsi attributes (xsi:nil)
    pub allow_xsi: bool,

    /// Let the marshaller declare a prefix-less default namespace
    pub allow_default_namespace: bool,

    /// Send the full URI as request target instead of only the path
    pub use_full_path_target: bool,

    /// Namespace/prefix bindings applied to every request
    pub namespaces: Vec<PredefinedNamespace>,

    /// Non-2xx status codes that still carry a parseable envelope
    pub allowed_http_codes: Vec<u16>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            charset: "utf-8".to_string(),
            allow_xsi: false,
            allow_default_namespace: true,
            use_full_path_target: false,
            namespaces: Vec::new(),
            allowed_http_codes: Vec::new(),
        }
    }
}

impl ServiceSettings {
    /// Resolve the configured charset label.
    pub fn encoding(&self) -> Result<&'static Encoding> {
        Encoding::for_label(self.charset.trim().as_bytes())
            .ok_or_else(|| SoapError::Config(format!("Unknown charset: {}", self.charset)))
    }

    /// Whether an HTTP status counts as a successful exchange.
    pub fn is_accepted_status(&self, code: u16) -> bool {
        (200..300).contains(&code) || self.allowed_http_codes.contains(&code)
    }
}

/// A fixed namespace to prefix binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredefinedNamespace {
    pub namespace: String,
    pub prefix: String,
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Total request timeout in seconds (0 disables)
    pub timeout_secs: u64,

    /// Connect timeout in seconds (0 disables)
    pub connect_timeout_secs: u64,

    /// User-Agent header value
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 10,
            user_agent: concat!("soap-invoker/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[default]
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    /// Envelope namespace URI.
    pub fn envelope_namespace(&self) -> &'static str {
        match self {
            Self::Soap11 => crate::envelope::SOAP_11_NS,
            Self::Soap12 => crate::envelope::SOAP_12_NS,
        }
    }

    /// Media type of request bodies.
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Soap11 => "text/xml",
            Self::Soap12 => "application/soap+xml",
        }
    }
}
