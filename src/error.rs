//! Error types for the SOAP invoker.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// SOAP invocation errors.
#[derive(Error, Debug)]
pub enum SoapError {
    #[error("No endpoint passed in and none were found in the wsdl")]
    NoEndpoint,

    #[error("HTTP Exception [{code}] {reason}")]
    HttpStatus { code: u16, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid endpoint URI: {0}")]
    Uri(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("XML parsing error: {0}")]
    Parse(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`SoapError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Nothing to call, or settings that cannot be honoured
    Configuration,
    /// HTTP exchange failed or returned an unacceptable status
    Transport,
    /// Request envelope could not be produced
    Serialization,
    /// Response is not well-formed XML
    Parse,
    /// Response does not match the expected envelope schema
    Format,
    /// Endpoint is not a valid URI
    Uri,
}

impl ErrorKind {
    /// Get the string form of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "CONFIGURATION",
            Self::Transport => "TRANSPORT",
            Self::Serialization => "SERIALIZATION",
            Self::Parse => "PARSE",
            Self::Format => "FORMAT",
            Self::Uri => "URI",
        }
    }
}

impl SoapError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoEndpoint | Self::Config(_) => ErrorKind::Configuration,
            Self::HttpStatus { .. } | Self::Transport(_) => ErrorKind::Transport,
            Self::Uri(_) => ErrorKind::Uri,
            Self::Serialization(_) | Self::Io(_) => ErrorKind::Serialization,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Format(_) => ErrorKind::Format,
        }
    }

    /// Service error code, for the failures that carry one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::NoEndpoint => Some("SOAP-1"),
            Self::HttpStatus { .. } => Some("SOAP-2"),
            _ => None,
        }
    }

    /// HTTP status of a rejected response.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SoapError {
    fn from(e: reqwest::Error) -> Self {
        SoapError::Transport(e.to_string())
    }
}

impl From<quick_xml::Error> for SoapError {
    fn from(e: quick_xml::Error) -> Self {
        SoapError::Parse(e.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SoapError>;
