// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serde view of the routing configuration document.
//!
//! These types mirror the JSON document byte-for-byte in meaning, so a
//! document that is deserialized and serialized again compares equal.
//! Application order is preserved because it decides routing precedence.
//!
//! ```json
//! {
//!   "applications": {
//!     "web":  { "development": { "fallback": "web.example.com" } },
//!     "docs": { "routing": [ { "paths": ["/docs", "/docs/:path*"] } ] }
//!   },
//!   "options": { "localProxyPort": 3024 }
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::host::Protocol;

/// Top-level routing document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    /// JSON schema reference, kept for round-trips
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Applications keyed by name, in declaration order
    pub applications: IndexMap<String, ApplicationDocument>,
    /// Global options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionsDocument>,
}

/// One application entry. An entry without `routing` is the default application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApplicationDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub development: Option<DevelopmentDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<Vec<PathGroupDocument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_prefix: Option<String>,
}

/// Where an application runs during development and where to go otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DevelopmentDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalHostDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<HostDocument>,
}

/// A set of paths routed to one application, optionally behind a flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathGroupDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    pub paths: Vec<String>,
}

/// `development.local`: a port, a host string or a structured host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalHostDocument {
    Port(u16),
    Url(String),
    Parts {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        protocol: Option<Protocol>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },
}

/// A host given as `[protocol://]host[:port]` or as an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostDocument {
    Url(String),
    Parts {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        protocol: Option<Protocol>,
        host: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },
}

/// Global options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_overrides: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_proxy_port: Option<u16>,
}

/// Host overrides keyed by application name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverridesDocument {
    #[serde(default)]
    pub applications: IndexMap<String, ApplicationOverrideDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationOverrideDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<HostDocument>,
}

/// Serialized form of a whole routing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedConfig {
    pub config: ConfigDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<OverridesDocument>,
}
