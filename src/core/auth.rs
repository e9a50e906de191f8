// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deployment protection: automation bypass and the SSO interstitial.

use std::collections::HashMap;
use std::env;

use crate::router::ProxyTarget;
use crate::router::builtin::{HOST_OVERRIDE_QUERY_PARAM, SSO_PATH_PREFIX};
use crate::routing::MicrofrontendsConfig;

/// Header carrying an automation bypass secret.
pub const BYPASS_HEADER: &str = "x-vercel-protection-bypass";
/// Cookie an SSO-protected deployment sets on its 401 response.
pub const SSO_NONCE_COOKIE: &str = "_vercel_sso_nonce";

const BYPASS_ENV_PREFIX: &str = "AUTOMATION_BYPASS_";

/// Environment variable holding the bypass secret for `application`.
///
/// `my-app` reads `AUTOMATION_BYPASS_MY_APP`.
pub fn bypass_env_var(application: &str) -> String {
    let suffix: String = application
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{BYPASS_ENV_PREFIX}{suffix}")
}

/// Bypass secrets per application, captured at startup.
#[derive(Debug, Clone, Default)]
pub struct BypassSecrets {
    secrets: HashMap<String, String>,
}

impl BypassSecrets {
    /// Read one variable per configured application.
    pub fn from_env(config: &MicrofrontendsConfig) -> Self {
        let secrets = config
            .applications()
            .iter()
            .filter_map(|app| {
                env::var(bypass_env_var(app.name()))
                    .ok()
                    .filter(|secret| !secret.is_empty())
                    .map(|secret| (app.name().to_string(), secret))
            })
            .collect::<HashMap<_, _>>();

        for name in secrets.keys() {
            crate::debug_fmt!("Auth", "Automation bypass configured for \"{}\"", name);
        }
        Self { secrets }
    }

    pub fn insert(&mut self, application: impl Into<String>, secret: impl Into<String>) {
        self.secrets.insert(application.into(), secret.into());
    }

    pub fn get(&self, application: &str) -> Option<&str> {
        self.secrets.get(application).map(String::as_str)
    }
}

/// Value of the SSO nonce among `Set-Cookie` header values.
pub fn sso_nonce<'a>(set_cookies: impl IntoIterator<Item = &'a str>) -> Option<String> {
    set_cookies.into_iter().find_map(|value| {
        cookie::Cookie::parse(value)
            .ok()
            .filter(|c| c.name() == SSO_NONCE_COOKIE)
            .map(|c| c.value().to_string())
    })
}

/// Page served instead of an SSO 401 from a protected deployment.
///
/// It sends the browser through the proxy's own SSO path, which escapes
/// to the protected host, and back to `return_to` afterwards.
pub fn sso_interstitial(target: &ProxyTarget, nonce: &str, return_to: &str) -> String {
    let login = format!(
        "{SSO_PATH_PREFIX}/login?url={}&nonce={}&{HOST_OVERRIDE_QUERY_PARAM}={}",
        urlencoding::encode(return_to),
        urlencoding::encode(nonce),
        urlencoding::encode(&target.host),
    );
    let login = html_escape(&login);
    let application = html_escape(&target.application);
    let host = html_escape(&target.host);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="1; url={login}">
<title>Authentication required</title>
</head>
<body style="font-family: system-ui, sans-serif; max-width: 40rem; margin: 4rem auto;">
<h1>Authentication required</h1>
<p>The deployment of <strong>{application}</strong> at <code>{host}</code> is protected.</p>
<p>Redirecting you to sign in. If nothing happens, <a href="{login}">continue to sign in</a>.</p>
<p>To skip this step, set <code>{env}</code> to an automation bypass secret.</p>
</body>
</html>
"#,
        env = html_escape(&bypass_env_var(&target.application)),
    )
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
