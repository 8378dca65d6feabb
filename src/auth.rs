//! Credential principal resolution.

use std::fmt;

/// The identity attached to an outbound request.
#[derive(Clone, PartialEq, Eq)]
pub enum Principal {
    /// Basic authentication.
    Basic { name: String, password: String },
    /// NTLM authentication against a Windows domain.
    Ntlm {
        domain: String,
        name: String,
        password: String,
    },
}

impl Principal {
    /// Account name without the domain.
    pub fn name(&self) -> &str {
        match self {
            Self::Basic { name, .. } | Self::Ntlm { name, .. } => name,
        }
    }

    pub fn password(&self) -> &str {
        match self {
            Self::Basic { password, .. } | Self::Ntlm { password, .. } => password,
        }
    }

    /// Scheme name, for logging.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Basic { .. } => "basic",
            Self::Ntlm { .. } => "ntlm",
        }
    }
}

// Keep passwords out of logs.
impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { name, .. } => f
                .debug_struct("Basic")
                .field("name", name)
                .finish_non_exhaustive(),
            Self::Ntlm { domain, name, .. } => f
                .debug_struct("Ntlm")
                .field("domain", domain)
                .field("name", name)
                .finish_non_exhaustive(),
        }
    }
}

/// Derive a principal from a username, which may carry a domain as
/// `DOMAIN/name` or `DOMAIN\name`.
pub fn resolve_principal(username: Option<&str>, password: Option<&str>) -> Option<Principal> {
    let username = username?;
    let password = password.unwrap_or_default().to_string();

    let separator = username.find('/').or_else(|| username.find('\\'));
    Some(match separator {
        None => Principal::Basic {
            name: username.to_string(),
            password,
        },
        Some(index) => Principal::Ntlm {
            domain: username[..index].to_string(),
            name: username[index + 1..].to_string(),
            password,
        },
    })
}
