// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the configuration module.

use std::fmt;
use std::io;
use thiserror::Error;

/// Errors raised by configuration providers.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The requested configuration key was not found.
    #[error("configuration key not found")]
    NotFound,

    /// A value could not be parsed or deserialized.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// An error raised by one provider, tagged with its name.
    #[error("provider error: {provider}: {message}")]
    ProviderError { provider: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl ConfigError {
    /// Create a new provider error.
    pub fn provider_error<P: fmt::Display, M: fmt::Display>(provider: P, message: M) -> Self {
        Self::ProviderError {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_provider_error_display() {
        let error = ConfigError::provider_error("file", "unsupported file format");
        assert_eq!(
            error.to_string(),
            "provider error: file: unsupported file format"
        );
    }

    #[test]
    fn test_parse_error_display() {
        let error = ConfigError::ParseError("failed to deserialize 'port'".to_string());
        assert_eq!(
            error.to_string(),
            "failed to parse configuration: failed to deserialize 'port'"
        );
    }

    #[test]
    fn test_io_error_keeps_source() {
        let error: ConfigError = IoError::new(ErrorKind::NotFound, "microfrontends.json").into();
        assert!(error.to_string().contains("microfrontends.json"));
        assert_eq!(error.source().unwrap().to_string(), "microfrontends.json");
        assert!(ConfigError::NotFound.source().is_none());
    }
}
