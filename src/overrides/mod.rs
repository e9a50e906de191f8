// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-application host overrides carried in cookies.
//!
//! One cookie per application: the name is [`OVERRIDE_COOKIE_PREFIX`]
//! followed by the application name, the value is a host string such as
//! `my-branch-docs.example.com` or `http://localhost:4000`.


use cookie::Cookie;
use indexmap::IndexMap;

use crate::routing::schema::{ApplicationOverrideDocument, HostDocument, OverridesDocument};
use crate::routing::{Host, Protocol, RoutingConfigError};

/// Name prefix of override cookies.
pub const OVERRIDE_COOKIE_PREFIX: &str = "vercel-micro-frontends-override:env:";

/// Cookie name carrying the override for `application`.
pub fn override_cookie_name(application: &str) -> String {
    format!("{OVERRIDE_COOKIE_PREFIX}{application}")
}

/// Whether a cookie name belongs to the override family.
pub fn is_override_cookie(name: &str) -> bool {
    name.starts_with(OVERRIDE_COOKIE_PREFIX)
}

/// Override hosts keyed by application name. Scoped to one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverridesConfig {
    applications: IndexMap<String, Host>,
}

impl OverridesConfig {
    /// Collect overrides from request cookies.
    ///
    /// Unrelated cookies, empty values and unparseable hosts are ignored.
    pub fn parse(cookies: &[Cookie<'_>]) -> Self {
        let mut applications = IndexMap::new();

        for cookie in cookies {
            let Some(application) = cookie.name().strip_prefix(OVERRIDE_COOKIE_PREFIX) else {
                continue;
            };
            if application.is_empty() {
                continue;
            }

            let raw = cookie.value();
            let value = urlencoding::decode(raw)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            if value.trim().is_empty() {
                continue;
            }

            match Host::parse(&value, Protocol::Https) {
                Ok(host) => {
                    applications.insert(application.to_string(), host);
                }
                Err(e) => {
                    crate::debug_fmt!("Overrides", "Ignoring override cookie for \"{}\": {}", application, e);
                }
            }
        }

        Self { applications }
    }

    /// Overrides declared in a configuration document.
    pub fn from_document(document: &OverridesDocument) -> Result<Self, RoutingConfigError> {
        let mut applications = IndexMap::new();
        for (name, entry) in &document.applications {
            if let Some(environment) = &entry.environment {
                applications.insert(name.clone(), Host::from_document(environment, Protocol::Https)?);
            }
        }
        Ok(Self { applications })
    }

    /// Document form, for serialization next to the configuration.
    pub fn to_document(&self) -> OverridesDocument {
        OverridesDocument {
            applications: self
                .applications
                .iter()
                .map(|(name, host)| {
                    (
                        name.clone(),
                        ApplicationOverrideDocument {
                            environment: Some(HostDocument::Url(host.url())),
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn insert(&mut self, application: impl Into<String>, host: Host) {
        self.applications.insert(application.into(), host);
    }

    pub fn host_for(&self, application: &str) -> Option<&Host> {
        self.applications.get(application)
    }

    pub fn application_names(&self) -> impl Iterator<Item = &str> {
        self.applications.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }
}
