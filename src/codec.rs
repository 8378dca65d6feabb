//! Request envelope serialization and response envelope parsing.

use crate::config::ServiceSettings;
use crate::envelope::{self, Direction, BODY, HEADER};
use crate::error::{Result, SoapError};
use crate::marshal::Marshaller;
use crate::parser;
use crate::types::{ComplexContent, Value};
use crate::wsdl::OperationDefinition;
use encoding_rs::Encoding;
use tracing::debug;

/// Wrap `input` in a request envelope and marshal it.
pub fn serialize_request(
    operation: &OperationDefinition,
    settings: &ServiceSettings,
    input: Option<&ComplexContent>,
    encoding: &'static Encoding,
) -> Result<Vec<u8>> {
    let schema = envelope::build_envelope(operation, Direction::Request);
    let header_type = envelope::header_type(&schema)
        .ok_or_else(|| SoapError::Serialization("Envelope has no Header".to_string()))?;
    let body_type = envelope::body_type(&schema)
        .ok_or_else(|| SoapError::Serialization("Envelope has no Body".to_string()))?;

    let mut body = body_type.new_instance();
    if let Some(input) = input {
        let element = operation.input_element().ok_or_else(|| {
            SoapError::Serialization(format!(
                "Operation {} declares no input part for the request",
                operation.name
            ))
        })?;
        body.set(&element.name, Value::Complex(input.clone()))?;
    }

    let mut envelope = schema.new_instance();
    envelope.set(HEADER, header_type.new_instance())?;
    envelope.set(BODY, body)?;

    let envelope_ns = operation.soap_version.envelope_namespace();
    let mut marshaller = Marshaller::new(&schema);
    marshaller.set_allow_xsi(settings.allow_xsi);
    marshaller.set_allow_default_namespace(settings.allow_default_namespace);
    if settings.allow_default_namespace {
        // Keep the payload prefix-free; lenient parsers cope better with it.
        let default_ns = input
            .and_then(|i| i.namespace())
            .or(operation.target_namespace.as_deref());
        if let Some(ns) = default_ns {
            marshaller.set_default_namespace(ns);
        }
    }

    let mut envelope_prefixed = false;
    let mut soap_taken = false;
    for binding in &settings.namespaces {
        marshaller.set_prefix(binding.namespace.as_str(), binding.prefix.as_str());
        envelope_prefixed |= binding.namespace == envelope_ns;
        soap_taken |= binding.prefix == "soap" && binding.namespace != envelope_ns;
    }
    // Otherwise the envelope gets a generated prefix
    if !envelope_prefixed && !soap_taken {
        marshaller.set_prefix(envelope_ns, "soap");
    }

    let bytes = marshaller.marshal(&envelope, encoding)?;
    debug!(
        operation = %operation.name,
        bytes = bytes.len(),
        has_input = input.is_some(),
        "Serialized request envelope"
    );
    Ok(bytes)
}

/// Parse a response body against the response envelope of `operation`.
pub fn deserialize_response(
    operation: &OperationDefinition,
    data: &[u8],
    encoding: &'static Encoding,
) -> Result<ComplexContent> {
    let schema = envelope::build_envelope(operation, Direction::Response);
    parser::unmarshal(data, encoding, &schema)
}
