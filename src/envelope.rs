//! SOAP envelope schema synthesis.
//!
//! The envelope type is a pure function of the operation: it is rebuilt for
//! every request and response and never cached.

use crate::types::{ComplexType, ElementDef};
use crate::wsdl::OperationDefinition;

/// SOAP namespace URIs.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

pub const ENVELOPE: &str = "Envelope";
pub const HEADER: &str = "Header";
pub const BODY: &str = "Body";

/// Which side of the exchange the envelope describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

/// Build the envelope schema for one direction of an operation.
pub fn build_envelope(operation: &OperationDefinition, direction: Direction) -> ComplexType {
    let namespace = operation.soap_version.envelope_namespace();

    // Header children are whatever the peer sends; only the element itself
    // is described.
    let header = ComplexType {
        name: HEADER.to_string(),
        namespace: None,
        children: Vec::new(),
        element_qualified: false,
        open: true,
    };

    let mut body = ComplexType {
        name: BODY.to_string(),
        namespace: Some(namespace.to_string()),
        children: Vec::new(),
        element_qualified: false,
        open: false,
    };

    let parts = match direction {
        Direction::Request => vec![operation.input_element()],
        Direction::Response => vec![operation.output_element(), operation.fault_element()],
    };
    body.children.extend(
        parts
            .into_iter()
            .flatten()
            .map(|element| element.clone().with_min_occurs(0)),
    );

    ComplexType::new(ENVELOPE, Some(namespace.to_string()))
        .with_child(ElementDef::complex(HEADER, header).with_min_occurs(0))
        .with_child(ElementDef::complex(BODY, body))
}

/// The Body type of an envelope built by [`build_envelope`].
pub fn body_type(envelope: &ComplexType) -> Option<&ComplexType> {
    complex_child(envelope, BODY)
}

/// The Header type of an envelope built by [`build_envelope`].
pub fn header_type(envelope: &ComplexType) -> Option<&ComplexType> {
    complex_child(envelope, HEADER)
}

fn complex_child<'a>(ty: &'a ComplexType, name: &str) -> Option<&'a ComplexType> {
    match &ty.child(name)?.kind {
        crate::types::ElementType::Complex(inner) => Some(inner),
        crate::types::ElementType::Simple(_) => None,
    }
}
