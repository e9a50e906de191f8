// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Flag-aware path lookup for code that can evaluate feature flags.

use std::future::Future;

use async_trait::async_trait;

use super::builtin::{first_segment, strip_query};
use crate::routing::{Application, MicrofrontendsConfig};

/// Evaluates feature flags gating path groups.
#[async_trait]
pub trait FlagEvaluator: Send + Sync {
    async fn is_enabled(&self, flag: &str) -> bool;
}

#[async_trait]
impl<F, Fut> FlagEvaluator for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    async fn is_enabled(&self, flag: &str) -> bool {
        (self)(flag.to_string()).await
    }
}

impl MicrofrontendsConfig {
    /// Application serving `path`, evaluating flag-gated groups.
    ///
    /// Groups are tried in application then declaration order. A flagged
    /// group counts only when its flag is on; the first hit wins.
    pub async fn application_for_path_with_flags(
        &self,
        path: &str,
        evaluator: &dyn FlagEvaluator,
    ) -> &Application {
        let path = strip_query(path);

        if let Some(segment) = first_segment(path) {
            if let Some(app) = self
                .applications()
                .iter()
                .find(|app| app.asset_prefixes().iter().any(|p| p == segment))
            {
                return app;
            }
        }

        for app in self.child_applications() {
            for group in app.routing() {
                if !group.matches(path) {
                    continue;
                }
                match &group.flag {
                    Some(flag) if !evaluator.is_enabled(flag).await => continue,
                    _ => return app,
                }
            }
        }

        self.default_application()
    }
}
