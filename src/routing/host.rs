// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Network endpoints an application can be reached at.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use super::naming::generate_port;
use super::schema::{HostDocument, LocalHostDocument};
use super::RoutingConfigError;

/// Transport scheme of a [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// Port implied by the scheme.
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https => 443,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved endpoint: protocol, host name and optional port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    pub protocol: Protocol,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Host {
    pub fn new(protocol: Protocol, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
        }
    }

    /// Parse `[protocol://]host[:port]`.
    ///
    /// Credentials, paths, query strings and fragments are rejected.
    pub fn parse(value: &str, default_protocol: Protocol) -> Result<Self, RoutingConfigError> {
        let invalid = |reason: &str| RoutingConfigError::InvalidHost {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(invalid("host must not be empty"));
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("{default_protocol}://{trimmed}")
        };

        let url = Url::parse(&candidate).map_err(|e| invalid(&e.to_string()))?;

        let protocol = match url.scheme() {
            "http" => Protocol::Http,
            "https" => Protocol::Https,
            other => return Err(invalid(&format!("unsupported protocol \"{other}\""))),
        };
        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid("credentials are not allowed"));
        }
        if url.fragment().is_some() {
            return Err(invalid("fragments are not allowed"));
        }
        if url.query().is_some() {
            return Err(invalid("query strings are not allowed"));
        }
        if !matches!(url.path(), "" | "/") {
            return Err(invalid("paths are not allowed"));
        }

        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host name"))?
            .to_string();

        Ok(Self {
            protocol,
            host,
            port: url.port(),
        })
    }

    /// Build a host from its document form.
    pub fn from_document(
        document: &HostDocument,
        default_protocol: Protocol,
    ) -> Result<Self, RoutingConfigError> {
        match document {
            HostDocument::Url(value) => Self::parse(value, default_protocol),
            HostDocument::Parts { protocol, host, port } => {
                let mut parsed = Self::parse(host, protocol.unwrap_or(default_protocol))?;
                if let Some(protocol) = protocol {
                    parsed.protocol = *protocol;
                }
                if port.is_some() {
                    parsed.port = *port;
                }
                Ok(parsed)
            }
        }
    }

    /// Local development endpoint for `application`.
    ///
    /// Missing pieces default to `http://localhost` and a port derived from
    /// the application name.
    pub fn local(
        application: &str,
        document: Option<&LocalHostDocument>,
    ) -> Result<Self, RoutingConfigError> {
        let default_port = generate_port(application);
        let host = match document {
            None => Self::new(Protocol::Http, "localhost", Some(default_port)),
            Some(LocalHostDocument::Port(port)) => Self::new(Protocol::Http, "localhost", Some(*port)),
            Some(LocalHostDocument::Url(value)) => {
                let trimmed = value.trim();
                if let Ok(port) = trimmed.parse::<u16>() {
                    Self::new(Protocol::Http, "localhost", Some(port))
                } else {
                    let mut parsed = Self::parse(trimmed, Protocol::Http)?;
                    if parsed.port.is_none() {
                        // `url` drops a port equal to the scheme default
                        parsed.port = Some(if has_explicit_port(trimmed) {
                            parsed.protocol.default_port()
                        } else {
                            default_port
                        });
                    }
                    parsed
                }
            }
            Some(LocalHostDocument::Parts { protocol, host, port }) => {
                let protocol = protocol.unwrap_or(Protocol::Http);
                let mut parsed = match host {
                    Some(host) => Self::parse(host, protocol)?,
                    None => Self::new(protocol, "localhost", None),
                };
                parsed.protocol = protocol;
                parsed.port = port.or(parsed.port).or(Some(default_port));
                parsed
            }
        };
        Ok(host)
    }

    /// The port used on the wire.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// `host` or `host:port` when the port differs from the scheme default.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) if port != self.protocol.default_port() => format!("{}:{}", self.host, port),
            _ => self.host.clone(),
        }
    }

    /// Origin URL without a trailing slash.
    pub fn url(&self) -> String {
        format!("{}://{}", self.protocol, self.authority())
    }

    pub fn is_localhost(&self) -> bool {
        matches!(self.host.as_str(), "localhost" | "127.0.0.1" | "[::1]" | "::1")
    }
}

/// Whether the authority of `value` spells out a port.
fn has_explicit_port(value: &str) -> bool {
    let rest = value.split_once("://").map_or(value, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let after_ipv6 = authority.rsplit_once(']').map_or(authority, |(_, tail)| tail);
    after_ipv6.contains(':')
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}
