// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal CLI wrapper so the library can run as a stand-alone proxy.
//!
//!  `mfe-proxy [APP...]` proxies every configured application, serving the
//!  named ones from their local development servers.
//!
//!  The binary honours MFE_CONFIG_FILE, then MFE_CONFIG, and otherwise looks
//!  for microfrontends.jsonc / microfrontends.json in the working directory.

use std::env;
use std::error::Error;
use std::path::Path;

use microfrontends::config::{ConfigProvider, ConfigProviderExt, EnvConfigProvider, keys};
use microfrontends::{LocalProxy, error_fmt, info_fmt};

const DEFAULT_FILES: [&str; 2] = ["microfrontends.jsonc", "microfrontends.json"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let local_apps: Vec<String> = env::args().skip(1).collect();

    // Base loader always pulls env vars; file path is optional.
    let mut loader = LocalProxy::loader().with_env_vars();

    let env_config = EnvConfigProvider::default();
    if let Some(path) = env_config.get::<String>(keys::CONFIG_FILE)? {
        println!("Using configuration from {path}");
        loader = loader.with_config_file(&path);
    } else if env_config.has(keys::CONFIG) {
        println!("Using configuration from MFE_CONFIG");
    } else {
        match DEFAULT_FILES.iter().find(|path| Path::new(path).exists()) {
            Some(path) => {
                println!("Using configuration from {path}");
                loader = loader.with_config_file(path);
            }
            None => {
                println!(
                    "No configuration found. Set MFE_CONFIG_FILE or create {} in the working directory.",
                    DEFAULT_FILES.join(" or ")
                );
                return Err(Box::from("No configuration file found."));
            }
        }
    }

    if !local_apps.is_empty() {
        loader = loader.with_local_apps(local_apps);
    }

    let proxy = match loader.build() {
        Ok(p) => p,
        Err(e) => {
            println!("Failed to build proxy: {e}");
            return Err(e.into());
        }
    };

    match proxy.start().await {
        Ok(()) => {
            info_fmt!("Proxy", "Proxy server stopped gracefully");
        }
        Err(e) => {
            error_fmt!("Proxy", "Proxy server failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
