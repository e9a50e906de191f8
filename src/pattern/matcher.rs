// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compiled path matchers and the process-wide matcher cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;

use super::parser::{self, Modifier, Token};
use super::{PatternError, negative_lookahead_alternatives};

const SEGMENT: &str = "[^/#?]+?";

/// Patterns are fixed once the configuration is loaded, so the cache is
/// never evicted.
static MATCHERS: Lazy<RwLock<HashMap<String, Arc<PathMatcher>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// A compiled path pattern.
#[derive(Debug)]
pub struct PathMatcher {
    pattern: String,
    regex: Regex,
    /// Capture group index -> prefixes the captured value must not start with
    exclusions: Vec<(usize, Vec<String>)>,
}

impl PathMatcher {
    /// Compile a pattern. Prefer [`matcher`] which caches the result.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let tokens = parser::parse(pattern)?;
        let mut source = String::from("^");
        let mut exclusions = Vec::new();
        let mut group = 0;

        for token in &tokens {
            match token {
                Token::Literal(literal) => source.push_str(&regex::escape(literal)),
                Token::Wildcard(wildcard) => {
                    group += 1;
                    let inner = match &wildcard.constraint {
                        None => SEGMENT.to_string(),
                        Some(constraint) => match negative_lookahead_alternatives(constraint) {
                            Some(alternatives) => {
                                exclusions.push((group, alternatives));
                                ".*".to_string()
                            }
                            None => format!("(?:{constraint})"),
                        },
                    };
                    let prefix = regex::escape(&wildcard.prefix);

                    match wildcard.modifier {
                        None => source.push_str(&format!("{prefix}({inner})")),
                        Some(Modifier::ZeroOrMore) => source.push_str(&format!(
                            "(?:{prefix}({inner}(?:{prefix}{inner})*))?"
                        )),
                        Some(Modifier::OneOrMore) => source.push_str(&format!(
                            "{prefix}({inner}(?:{prefix}{inner})*)"
                        )),
                    }
                }
            }
        }

        source.push_str("/?$");

        let regex = Regex::new(&source).map_err(|e| PatternError::Parse {
            position: 0,
            message: format!("failed to compile: {e}"),
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            exclusions,
        })
    }

    /// The source pattern this matcher was compiled from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Test a request path (without query string) against the pattern.
    pub fn is_match(&self, path: &str) -> bool {
        if self.exclusions.is_empty() {
            return self.regex.is_match(path);
        }

        let Some(captures) = self.regex.captures(path) else {
            return false;
        };

        self.exclusions.iter().all(|(index, prefixes)| {
            captures
                .get(*index)
                .is_none_or(|m| !prefixes.iter().any(|p| m.as_str().starts_with(p.as_str())))
        })
    }
}

/// Get the cached matcher for a pattern, compiling it on first use.
pub fn matcher(pattern: &str) -> Result<Arc<PathMatcher>, PatternError> {
    if let Ok(cache) = MATCHERS.read() {
        if let Some(found) = cache.get(pattern) {
            return Ok(found.clone());
        }
    }

    let compiled = Arc::new(PathMatcher::compile(pattern)?);
    if let Ok(mut cache) = MATCHERS.write() {
        cache
            .entry(pattern.to_string())
            .or_insert_with(|| compiled.clone());
    }
    Ok(compiled)
}

/// Test `path` against `pattern`. Patterns that fail to compile never match.
pub fn matches(pattern: &str, path: &str) -> bool {
    match matcher(pattern) {
        Ok(m) => m.is_match(path),
        Err(e) => {
            log::warn!("Ignoring invalid path pattern '{}': {}", pattern, e);
            false
        }
    }
}
