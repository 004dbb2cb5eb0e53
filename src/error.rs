//! Crate-level error type surfaced to the CLI user as single-line messages.

use std::fmt;
use std::io;

use crate::core::config::ConfigError;
use crate::providers::{ProviderError, ProviderKind};

#[derive(Debug)]
pub enum ClaifError {
    /// Configuration could not be loaded, parsed, or edited.
    Config(ConfigError),
    /// The selected provider is disabled (or not registered).
    ProviderDisabled(ProviderKind),
    /// Every provider is disabled; nothing to dispatch to.
    NoProviders,
    /// A provider failed while handling a query.
    Provider {
        provider: ProviderKind,
        source: ProviderError,
    },
    /// Session history could not be read or written.
    Session(io::Error),
}

impl fmt::Display for ClaifError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaifError::Config(e) => write!(f, "{e}"),
            ClaifError::ProviderDisabled(kind) => {
                write!(f, "provider '{kind}' is disabled in the configuration")
            }
            ClaifError::NoProviders => write!(f, "no providers are enabled"),
            ClaifError::Provider { provider, source } => write!(f, "{provider}: {source}"),
            ClaifError::Session(e) => write!(f, "session error: {e}"),
        }
    }
}

impl std::error::Error for ClaifError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClaifError::Config(e) => Some(e),
            ClaifError::Provider { source, .. } => Some(source),
            ClaifError::Session(e) => Some(e),
            ClaifError::ProviderDisabled(_) | ClaifError::NoProviders => None,
        }
    }
}

impl From<ConfigError> for ClaifError {
    fn from(e: ConfigError) -> Self {
        ClaifError::Config(e)
    }
}
