// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::host::Host;
use super::naming::{ASSET_PREFIX_PREFIX, generate_asset_prefix, hash_application_name};
use super::schema::PathGroupDocument;

/// A set of path patterns routed to one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathGroup {
    /// Diagnostic label
    pub group: Option<String>,
    /// Feature flag gating the group
    pub flag: Option<String>,
    /// Patterns in declaration order
    pub paths: Vec<String>,
}

impl PathGroup {
    pub fn is_flagged(&self) -> bool {
        self.flag.is_some()
    }

    /// Whether any pattern of the group matches `path`.
    pub fn matches(&self, path: &str) -> bool {
        self.paths.iter().any(|pattern| crate::pattern::matches(pattern, path))
    }
}

impl From<&PathGroupDocument> for PathGroup {
    fn from(document: &PathGroupDocument) -> Self {
        Self {
            group: document.group.clone(),
            flag: document.flag.clone(),
            paths: document.paths.clone(),
        }
    }
}

/// Default application versus an application that owns explicit routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationKind {
    /// Catch-all target; always has a fallback host
    Default { fallback: Host },
    /// Owns the listed path groups
    Child {
        routing: Vec<PathGroup>,
        fallback: Option<Host>,
    },
}

/// One participant of the routed topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    name: String,
    package_name: Option<String>,
    kind: ApplicationKind,
    asset_prefix: String,
    custom_asset_prefix: bool,
    local: Host,
    override_host: Option<Host>,
}

impl Application {
    pub(crate) fn new(
        name: String,
        package_name: Option<String>,
        kind: ApplicationKind,
        asset_prefix: Option<String>,
        local: Host,
    ) -> Self {
        let custom_asset_prefix = asset_prefix.is_some();
        let asset_prefix = asset_prefix.unwrap_or_else(|| generate_asset_prefix(&name));
        Self {
            name,
            package_name,
            kind,
            asset_prefix,
            custom_asset_prefix,
            local,
            override_host: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package_name(&self) -> Option<&str> {
        self.package_name.as_deref()
    }

    /// True when `name` is this application's name or package alias.
    pub fn is_named(&self, name: &str) -> bool {
        self.name == name || self.package_name.as_deref() == Some(name)
    }

    pub fn kind(&self) -> &ApplicationKind {
        &self.kind
    }

    pub fn is_default(&self) -> bool {
        matches!(self.kind, ApplicationKind::Default { .. })
    }

    /// Path groups in declaration order; empty for the default application.
    pub fn routing(&self) -> &[PathGroup] {
        match &self.kind {
            ApplicationKind::Default { .. } => &[],
            ApplicationKind::Child { routing, .. } => routing,
        }
    }

    pub fn asset_prefix(&self) -> &str {
        &self.asset_prefix
    }

    pub fn has_custom_asset_prefix(&self) -> bool {
        self.custom_asset_prefix
    }

    /// Every first path segment that addresses this application's assets.
    pub fn asset_prefixes(&self) -> Vec<String> {
        let mut prefixes = vec![self.asset_prefix.clone()];
        for alias in [
            format!("{ASSET_PREFIX_PREFIX}{}", self.name),
            format!("{ASSET_PREFIX_PREFIX}{}", hash_application_name(&self.name)),
        ] {
            if !prefixes.contains(&alias) {
                prefixes.push(alias);
            }
        }
        prefixes
    }

    pub fn development_local_host(&self) -> &Host {
        &self.local
    }

    /// Configured fallback host, if any.
    pub fn fallback_host(&self) -> Option<&Host> {
        match &self.kind {
            ApplicationKind::Default { fallback } => Some(fallback),
            ApplicationKind::Child { fallback, .. } => fallback.as_ref(),
        }
    }

    /// Session-scoped host override, if one was applied.
    pub fn environment_override_host(&self) -> Option<&Host> {
        self.override_host.as_ref()
    }

    /// Copy of this application with its override host replaced.
    pub fn with_override(&self, host: Host) -> Self {
        Self {
            override_host: Some(host),
            ..self.clone()
        }
    }
}
