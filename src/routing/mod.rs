// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Routing configuration model.
//!
//! A [`MicrofrontendsConfig`] is built once from a [`ConfigDocument`] and is
//! read-only afterwards, so it can be shared between request handlers
//! without locking. Construction validates everything up front and fails
//! with a single [`RoutingConfigError::Invalid`] listing every violation.
//!
//! Override-aware views ([`MicrofrontendsConfig::with_overrides`]) are
//! cheap: they share every unchanged [`Application`] with the base
//! configuration and replace only the overridden ones.

mod application;
pub mod client;
mod error;
mod host;
pub mod naming;
pub mod schema;


pub use application::{Application, ApplicationKind, PathGroup};
pub use client::{
    ClientApplication, ClientConfig, ClientConfigResponse, ClientPathGroup, ClientRouter,
    ClientViewOptions,
};
pub use error::RoutingConfigError;
pub use host::{Host, Protocol};
pub use schema::{
    ApplicationDocument, ConfigDocument, HostDocument, LocalHostDocument, OverridesDocument,
    PathGroupDocument, SerializedConfig,
};

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::strip_json_comments;
use crate::overrides::OverridesConfig;
use crate::pattern::{self, ApplicationPaths};
use naming::hash_application_name;

/// Port the local proxy listens on when nothing else is configured.
pub const DEFAULT_LOCAL_PROXY_PORT: u16 = 3024;

static ASSET_PREFIX_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

/// Global options after defaults are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigOptions {
    pub disable_overrides: bool,
    pub local_proxy_port: Option<u16>,
}

/// Immutable routing configuration.
#[derive(Debug, Clone)]
pub struct MicrofrontendsConfig {
    applications: Vec<Arc<Application>>,
    default_index: usize,
    options: ConfigOptions,
    document: Arc<ConfigDocument>,
    overrides: Option<Arc<OverridesDocument>>,
    warnings: Arc<Vec<String>>,
}

impl MicrofrontendsConfig {
    /// Build and validate a configuration.
    pub fn new(
        document: ConfigDocument,
        overrides: Option<OverridesDocument>,
    ) -> Result<Self, RoutingConfigError> {
        let mut errors = Vec::new();
        let mut applications = Vec::new();

        let defaults: Vec<&String> = document
            .applications
            .iter()
            .filter(|(_, app)| app.routing.is_none())
            .map(|(name, _)| name)
            .collect();

        match defaults.len() {
            0 => errors.push(
                "No default application found. Exactly one application must omit \"routing\"."
                    .to_string(),
            ),
            1 => {}
            _ => errors.push(format!(
                "Multiple default applications found: {}. Exactly one application must omit \"routing\".",
                defaults
                    .iter()
                    .map(|name| format!("\"{name}\""))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }

        for (name, app) in &document.applications {
            if let Some(application) = build_application(name, app, &document, &mut errors) {
                applications.push(Arc::new(application));
            }
        }

        let path_sets: Vec<ApplicationPaths<'_>> = document
            .applications
            .iter()
            .filter_map(|(name, app)| {
                app.routing.as_ref().map(|groups| ApplicationPaths {
                    application: name.as_str(),
                    groups: groups
                        .iter()
                        .map(|g| g.paths.iter().map(String::as_str).collect())
                        .collect(),
                })
            })
            .collect();
        let validation = pattern::validate(&path_sets);
        errors.extend(validation.errors);

        if !errors.is_empty() {
            return Err(RoutingConfigError::Invalid(errors));
        }

        for warning in &validation.warnings {
            crate::warn_fmt!("Config", "{}", warning);
        }

        let default_index = applications
            .iter()
            .position(|app| app.is_default())
            .ok_or_else(|| {
                RoutingConfigError::Invalid(vec!["No default application found.".to_string()])
            })?;

        let options = document
            .options
            .as_ref()
            .map(|o| ConfigOptions {
                disable_overrides: o.disable_overrides.unwrap_or(false),
                local_proxy_port: o.local_proxy_port,
            })
            .unwrap_or_default();

        let mut config = Self {
            applications,
            default_index,
            options,
            document: Arc::new(document),
            overrides: None,
            warnings: Arc::new(validation.warnings),
        };

        if let Some(overrides) = overrides {
            let parsed = OverridesConfig::from_document(&overrides)?;
            config = config.with_overrides(&parsed);
            config.overrides = Some(Arc::new(overrides));
        }

        crate::debug_fmt!(
            "Config",
            "Loaded {} application(s), default \"{}\"",
            config.applications.len(),
            config.default_application().name()
        );

        Ok(config)
    }

    /// Parse a JSON (or JSON-with-comments) document and build the model.
    pub fn from_json_str(text: &str) -> Result<Self, RoutingConfigError> {
        let document: ConfigDocument = serde_json::from_str(&strip_json_comments(text))
            .map_err(|e| RoutingConfigError::Parse(e.to_string()))?;
        Self::new(document, None)
    }

    /// Rebuild a configuration from [`Self::serialize`] output.
    pub fn from_serialized(serialized: SerializedConfig) -> Result<Self, RoutingConfigError> {
        Self::new(serialized.config, serialized.overrides)
    }

    /// The document (and overrides) this configuration was built from.
    pub fn serialize(&self) -> SerializedConfig {
        SerializedConfig {
            config: (*self.document).clone(),
            overrides: self.overrides.as_deref().cloned(),
        }
    }

    /// Look up an application by name or package name.
    pub fn get_application(&self, name: &str) -> Result<&Application, RoutingConfigError> {
        self.find_application(name)
            .map(Arc::as_ref)
            .ok_or_else(|| RoutingConfigError::ApplicationNotFound {
                name: name.to_string(),
                available: self.applications.iter().map(|a| a.name().to_string()).collect(),
            })
    }

    /// Like [`Self::get_application`] without building an error.
    pub fn find_application(&self, name: &str) -> Option<&Arc<Application>> {
        self.applications.iter().find(|app| app.is_named(name))
    }

    pub fn default_application(&self) -> &Application {
        &self.applications[self.default_index]
    }

    /// All applications in declaration order.
    pub fn applications(&self) -> &[Arc<Application>] {
        &self.applications
    }

    /// Every application except the default one.
    pub fn child_applications(&self) -> impl Iterator<Item = &Application> {
        self.applications
            .iter()
            .map(Arc::as_ref)
            .filter(|app| !app.is_default())
    }

    pub fn options(&self) -> ConfigOptions {
        self.options
    }

    /// Port for the local proxy: the configured one or the default.
    pub fn local_proxy_port(&self) -> u16 {
        self.options
            .local_proxy_port
            .unwrap_or(DEFAULT_LOCAL_PROXY_PORT)
    }

    /// Non-fatal findings from validation.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn has_flagged_paths(&self) -> bool {
        self.child_applications()
            .any(|app| app.routing().iter().any(PathGroup::is_flagged))
    }

    /// A view of this configuration with override hosts applied.
    ///
    /// `self` is untouched; unchanged applications are shared.
    pub fn with_overrides(&self, overrides: &OverridesConfig) -> Self {
        if overrides.is_empty() {
            return self.clone();
        }

        let applications = self
            .applications
            .iter()
            .map(|app| match overrides.host_for(app.name()) {
                Some(host) => Arc::new(app.with_override(host.clone())),
                None => app.clone(),
            })
            .collect();

        for name in overrides.application_names() {
            if self.find_application(name).is_none() {
                crate::debug_fmt!("Config", "Ignoring override for unknown application \"{}\"", name);
            }
        }

        Self {
            applications,
            ..self.clone()
        }
    }

    /// Reduced configuration for browsers.
    pub fn to_client_view(&self, options: ClientViewOptions) -> ClientConfig {
        let applications = self
            .applications
            .iter()
            .map(|app| {
                let routing = (!app.is_default()).then(|| {
                    let paths: Vec<String> = app
                        .routing()
                        .iter()
                        .filter(|group| !(options.remove_flagged_paths && group.is_flagged()))
                        .flat_map(|group| group.paths.iter().cloned())
                        .collect();
                    if paths.is_empty() {
                        Vec::new()
                    } else {
                        vec![ClientPathGroup { paths }]
                    }
                });

                (
                    hash_application_name(app.name()),
                    ClientApplication {
                        default: app.is_default(),
                        routing,
                    },
                )
            })
            .collect();

        ClientConfig {
            applications,
            has_flagged_paths: self.has_flagged_paths(),
        }
    }
}

fn build_application(
    name: &str,
    app: &ApplicationDocument,
    document: &ConfigDocument,
    errors: &mut Vec<String>,
) -> Option<Application> {
    let development = app.development.clone().unwrap_or_default();
    let mut valid = true;

    let local = match Host::local(name, development.local.as_ref()) {
        Ok(host) => Some(host),
        Err(e) => {
            errors.push(format!("Application \"{name}\" has an invalid development.local host: {e}."));
            None
        }
    };

    let fallback = match development.fallback.as_ref().map(|f| Host::from_document(f, Protocol::Https)) {
        Some(Ok(host)) => Some(host),
        Some(Err(e)) => {
            errors.push(format!("Application \"{name}\" has an invalid development.fallback host: {e}."));
            valid = false;
            None
        }
        None => None,
    };

    if let Some(package_name) = &app.package_name {
        let clash = document.applications.iter().any(|(other_name, other)| {
            other_name != name
                && (other_name == package_name || other.package_name.as_ref() == Some(package_name))
        });
        if clash {
            errors.push(format!(
                "Application \"{name}\" uses packageName \"{package_name}\" which is already used by another application."
            ));
        }
    }

    if let Some(prefix) = &app.asset_prefix {
        if !ASSET_PREFIX_FORMAT.is_match(prefix) {
            errors.push(format!(
                "Application \"{name}\" has an invalid assetPrefix \"{prefix}\": only letters, digits, \"-\" and \"_\" are allowed."
            ));
        }
    }

    let kind = match &app.routing {
        None => match fallback {
            Some(fallback) => ApplicationKind::Default { fallback },
            None => {
                if valid {
                    errors.push(format!(
                        "Default application \"{name}\" must declare development.fallback."
                    ));
                }
                return None;
            }
        },
        Some(groups) => {
            if groups.is_empty() {
                errors.push(format!(
                    "Application \"{name}\" declares an empty \"routing\" list; omit \"routing\" only on the default application."
                ));
            }
            for (index, group) in groups.iter().enumerate() {
                if group.paths.is_empty() {
                    errors.push(format!(
                        "Application \"{name}\" has a path group (index {index}) with no paths."
                    ));
                }
            }

            if let Some(prefix) = &app.asset_prefix {
                let required = format!("/{prefix}/:path*");
                let covered = groups
                    .iter()
                    .any(|group| group.flag.is_none() && group.paths.contains(&required));
                if !covered {
                    errors.push(format!(
                        "Application \"{name}\" sets assetPrefix \"{prefix}\" but its routing has no unflagged path \"{required}\"; its assets would never be routed."
                    ));
                }
            }

            ApplicationKind::Child {
                routing: groups.iter().map(PathGroup::from).collect(),
                fallback,
            }
        }
    };

    Some(Application::new(
        name.to_string(),
        app.package_name.clone(),
        kind,
        app.asset_prefix.clone(),
        local?,
    ))
}
