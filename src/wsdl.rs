//! Resolved WSDL operation metadata.
//!
//! These types are produced by a WSDL reader outside this crate (or loaded
//! from YAML) and are read-only to the invoker.

use crate::config::SoapVersion;
use crate::types::ElementDef;
use serde::{Deserialize, Serialize};

/// A single WSDL operation together with the definition-level data the
/// invoker needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationDefinition {
    /// Operation name
    pub name: String,

    /// SOAP version of the binding
    pub soap_version: SoapVersion,

    /// Target namespace of the WSDL definition
    pub target_namespace: Option<String>,

    /// SOAPAction of the binding operation
    pub soap_action: Option<String>,

    /// Input message
    pub input: Option<Message>,

    /// Output message
    pub output: Option<Message>,

    /// Fault messages
    pub faults: Vec<Message>,

    /// Services declared by the definition
    pub services: Vec<Service>,
}

/// A WSDL message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub name: String,
    pub parts: Vec<Part>,
}

/// A message part bound to a global element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub name: String,
    pub element: ElementDef,
}

/// A WSDL service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    pub name: String,
    pub ports: Vec<Port>,
}

/// A service port with its address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Port {
    pub name: String,
    pub endpoint: Option<String>,
}

fn first_part(message: Option<&Message>) -> Option<&Part> {
    message.and_then(|m| m.parts.first())
}

impl OperationDefinition {
    /// Element of the first input part.
    pub fn input_element(&self) -> Option<&ElementDef> {
        first_part(self.input.as_ref()).map(|p| &p.element)
    }

    /// Element of the first output part.
    pub fn output_element(&self) -> Option<&ElementDef> {
        first_part(self.output.as_ref()).map(|p| &p.element)
    }

    /// Element of the first part of the first fault.
    pub fn fault_element(&self) -> Option<&ElementDef> {
        first_part(self.faults.first()).map(|p| &p.element)
    }

    /// Endpoint of the first port of the first service.
    pub fn default_endpoint(&self) -> Option<&str> {
        self.services
            .first()
            .and_then(|s| s.ports.first())
            .and_then(|p| p.endpoint.as_deref())
    }
}
