//! SOAP operation invoker
//!
//! Calls a single WSDL operation over HTTP(S): builds the SOAP 1.1/1.2
//! request envelope, resolves credentials, sends the call and extracts the
//! output or fault element from the response envelope.
//!
//! # Features
//!
//! - Envelope schema derived from the operation's message parts
//! - Namespace-aware marshalling with predefined and generated prefixes
//! - Basic and domain-qualified (NTLM) principal resolution
//! - Pluggable HTTP transport with a reqwest default
//! - Status allow-listing for services that answer faults with 500
//!
//! # Example
//!
//! ```ignore
//! use soap_invoker::{InvocationRequest, InvokerConfig, SoapInvoker};
//!
//! let invoker = SoapInvoker::from_config(config)?;
//! let result = invoker
//!     .invoke(InvocationRequest {
//!         request: Some(input),
//!         ..Default::default()
//!     })
//!     .await?;
//! ```

pub mod auth;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod invoker;
pub mod marshal;
pub mod parser;
pub mod types;
pub mod wsdl;

pub use auth::Principal;
pub use config::{InvokerConfig, ServiceSettings, SoapVersion};
pub use error::{ErrorKind, SoapError};
pub use http::{HttpClient, HttpClientProvider, HttpRequest, HttpResponse, ReqwestClientProvider};
pub use invoker::{Authentication, InvocationRequest, InvocationResult, SoapInvoker};
pub use types::{ComplexContent, ComplexType, ElementDef, Value};
pub use wsdl::OperationDefinition;
