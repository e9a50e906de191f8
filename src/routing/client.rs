// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reduced configuration safe to ship to browsers, and the path lookup that
//! runs against it.
//!
//! Application names are replaced by their digest so internal naming never
//! reaches end users.

use std::collections::HashMap;
use std::sync::Mutex;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Options for [`super::MicrofrontendsConfig::to_client_view`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientViewOptions {
    /// Drop flag-gated groups instead of flattening them into the route set
    pub remove_flagged_paths: bool,
}

/// Browser view of the routing configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Applications keyed by hashed name, in declaration order
    pub applications: IndexMap<String, ClientApplication>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_flagged_paths: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientApplication {
    #[serde(default)]
    pub default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<Vec<ClientPathGroup>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPathGroup {
    pub paths: Vec<String>,
}

/// Body of the client-config endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfigResponse {
    pub config: ClientConfig,
}

/// Path -> application lookup over a [`ClientConfig`].
///
/// The mapping is pure for a fixed configuration, so results are memoized
/// for the lifetime of the router.
#[derive(Debug)]
pub struct ClientRouter {
    config: ClientConfig,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl ClientRouter {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Hashed name of the application serving `path`.
    ///
    /// The first matching group wins, in application then group order. Paths
    /// no group claims belong to the default application. `None` only when
    /// the configuration has no default application.
    pub fn application_for_path(&self, path: &str) -> Option<String> {
        let path = path.split(['?', '#']).next().unwrap_or(path);

        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(path) {
                return hit.clone();
            }
        }

        let resolved = self.lookup(path);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(path.to_string(), resolved.clone());
        }
        resolved
    }

    fn lookup(&self, path: &str) -> Option<String> {
        let matched = self.config.applications.iter().find(|(_, app)| {
            app.routing.iter().flatten().any(|group| {
                group
                    .paths
                    .iter()
                    .any(|pattern| crate::pattern::matches(pattern, path))
            })
        });

        if let Some((name, _)) = matched {
            return Some(name.clone());
        }

        self.config
            .applications
            .iter()
            .find(|(_, app)| app.default)
            .map(|(name, _)| name.clone())
    }
}
