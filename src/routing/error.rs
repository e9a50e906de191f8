// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the routing configuration model.

use thiserror::Error;

/// Errors raised while building or querying a routing configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingConfigError {
    /// The configuration violates one or more rules; every violation is listed.
    #[error("invalid microfrontends configuration:\n{}", bullet_list(.0))]
    Invalid(Vec<String>),

    /// No application is registered under the given name or package name.
    #[error(
        "could not find microfrontends configuration for application \"{name}\". Configured applications: {}. If the name differs from the running application, set \"packageName\" to match it",
        .available.join(", ")
    )]
    ApplicationNotFound { name: String, available: Vec<String> },

    /// The configuration document could not be deserialized.
    #[error("failed to parse microfrontends configuration: {0}")]
    Parse(String),

    /// A host string or object could not be turned into an endpoint.
    #[error("invalid host \"{value}\": {reason}")]
    InvalidHost { value: String, reason: String },
}

impl RoutingConfigError {
    /// The individual violations, for errors that carry a list.
    pub fn violations(&self) -> Vec<String> {
        match self {
            RoutingConfigError::Invalid(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("  - {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_lists_every_violation() {
        let error = RoutingConfigError::Invalid(vec!["first".to_string(), "second".to_string()]);
        let message = error.to_string();
        assert!(message.contains("  - first"));
        assert!(message.contains("  - second"));
        assert_eq!(error.violations().len(), 2);
    }

    #[test]
    fn test_not_found_lists_configured_names() {
        let error = RoutingConfigError::ApplicationNotFound {
            name: "docs".to_string(),
            available: vec!["web".to_string(), "blog".to_string()],
        };
        let message = error.to_string();
        assert!(message.contains("\"docs\""));
        assert!(message.contains("web, blog"));
    }
}
