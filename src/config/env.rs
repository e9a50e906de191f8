// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `MFE_*` environment variables as a configuration layer.
//!
//! `MFE_PORT=4000` answers `port`, `MFE_LOCAL_APPS=web,docs` answers
//! `local.apps`, and `MFE_CONFIG` carries a whole serialized routing
//! document. The environment is read once, when the provider is created.

use std::collections::BTreeMap;
use std::env;

use serde_json::Value;

use super::{ConfigError, ConfigProvider, keys};

/// Prefix of the variables read by [`EnvConfigProvider::default`].
pub const DEFAULT_ENV_PREFIX: &str = "MFE_";

/// Snapshot of the prefixed environment variables, keyed by configuration key.
#[derive(Debug, Clone)]
pub struct EnvConfigProvider {
    prefix: String,
    values: BTreeMap<String, String>,
}

impl EnvConfigProvider {
    /// Read the process environment. Variables that are not valid unicode
    /// are skipped.
    pub fn new(prefix: &str) -> Self {
        let vars = env::vars_os()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)));
        Self::from_vars(prefix, vars)
    }

    /// Build from explicit `(name, value)` pairs; names without `prefix` are
    /// skipped.
    pub fn from_vars<I>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let values: BTreeMap<String, String> = vars
            .into_iter()
            .filter_map(|(name, value)| config_key(prefix, &name).map(|key| (key, value)))
            .collect();

        for key in values.keys().filter(|key| !keys::ALL.contains(&key.as_str())) {
            crate::debug_fmt!(
                "Config",
                "Ignoring {}{}: not a recognised setting",
                prefix,
                key.replace('.', "_").to_uppercase()
            );
        }

        Self {
            prefix: prefix.to_string(),
            values,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Configuration keys present in the snapshot.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new(DEFAULT_ENV_PREFIX)
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn provider_name(&self) -> &str {
        "env"
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.values.get(key).map(|raw| parse_env_value(raw)))
    }
}

/// `MFE_LOCAL_APPS` -> `local.apps`; `None` for other variables.
fn config_key(prefix: &str, name: &str) -> Option<String> {
    let rest = name.strip_prefix(prefix)?;
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_lowercase().replace('_', "."))
}

/// JSON when the value parses as JSON, then a bool in any case, then a
/// number, otherwise the text itself. A JSONC document stays text and is
/// stripped by the loader.
fn parse_env_value(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str(raw) {
        return value;
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(number) = raw.parse::<i64>() {
        return Value::from(number);
    }
    if let Some(number) = raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        return Value::Number(number);
    }
    Value::String(raw.to_string())
}
