// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Path pattern grammar, matching and cross-application validation.
//!
//! Every routing path goes through [`validate`] once, when the routing
//! configuration is constructed. Request-time matching goes through
//! [`matches`], which hits a process-wide cache of compiled matchers.
//!
//! Custom wildcard regexes are limited to two shapes so that matching cost
//! stays bounded:
//!
//! * positive alternation of literals: `:lang(en|fr|de)`
//! * negative lookahead: `:path((?!docs|blog).*)`

mod matcher;
pub mod parser;

#[cfg(test)]
mod tests;

pub use matcher::{PathMatcher, matcher, matches};
pub use parser::{Modifier, Token, Wildcard};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const ALTERNATIVE: &str = r"(?:[A-Za-z0-9_~-]|\\.)+";

static POSITIVE_ALTERNATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^{ALTERNATIVE}(?:\|{ALTERNATIVE})*$")).expect("static regex")
});

static NEGATIVE_LOOKAHEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\(\?!({ALTERNATIVE}(?:\|{ALTERNATIVE})*)\)\.\*$")).expect("static regex")
});

/// A single grammar violation in one path pattern.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// The token stream could not be parsed
    #[error("failed to parse path at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// `{...}` groups or a `?` modifier
    #[error("optional segments are not supported")]
    OptionalSegment,

    /// A capture without a name such as `/(.*)`
    #[error("unnamed wildcard \"({pattern})\" is not supported, name it like \":name({pattern})\"")]
    UnnamedWildcard { pattern: String },

    /// `/:a-:b`
    #[error("only one wildcard is allowed per path segment")]
    MultipleWildcardsInSegment,

    /// A custom regex outside the two supported shapes
    #[error(
        "wildcard \":{name}\" uses an unsupported regex \"{constraint}\"; only literal alternatives like \"a|b\" or a negative lookahead like \"(?!a|b).*\" are allowed"
    )]
    UnsupportedRegex { name: String, constraint: String },

    /// `*` or `+` on anything but the final component
    #[error("modifier \"{modifier}\" on wildcard \":{name}\" is only allowed on the last path component")]
    ModifierNotLast { name: String, modifier: char },

    /// Paths are matched against absolute request paths
    #[error("path must start with \"/\"")]
    NotAbsolute,
}

/// Extract the excluded prefixes from a `(?!a|b).*` constraint.
///
/// Escapes are resolved so the prefixes can be compared against raw path
/// text.
pub fn negative_lookahead_alternatives(constraint: &str) -> Option<Vec<String>> {
    let captures = NEGATIVE_LOOKAHEAD.captures(constraint)?;
    let alternatives = captures.get(1)?.as_str();
    Some(split_alternatives(alternatives).into_iter().map(|a| unescape(&a)).collect())
}

fn split_alternatives(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '|' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn is_supported_regex(constraint: &str) -> bool {
    POSITIVE_ALTERNATION.is_match(constraint) || NEGATIVE_LOOKAHEAD.is_match(constraint)
}

/// Check the structural rules that need the whole token stream.
pub fn check_grammar(tokens: &[Token]) -> Vec<PatternError> {
    let mut errors = Vec::new();
    let mut wildcards_in_segment = 0;
    let mut reported_segment = false;

    for (index, token) in tokens.iter().enumerate() {
        match token {
            Token::Literal(literal) => {
                if literal.contains('/') {
                    wildcards_in_segment = 0;
                }
            }
            Token::Wildcard(wildcard) => {
                if wildcard.prefix == "/" {
                    wildcards_in_segment = 0;
                }
                wildcards_in_segment += 1;
                if wildcards_in_segment > 1 && !reported_segment {
                    errors.push(PatternError::MultipleWildcardsInSegment);
                    reported_segment = true;
                }

                if let Some(constraint) = &wildcard.constraint {
                    if !is_supported_regex(constraint) {
                        errors.push(PatternError::UnsupportedRegex {
                            name: wildcard.name.clone(),
                            constraint: constraint.clone(),
                        });
                    }
                }

                if let Some(modifier) = wildcard.modifier {
                    if index != tokens.len() - 1 {
                        errors.push(PatternError::ModifierNotLast {
                            name: wildcard.name.clone(),
                            modifier: modifier.as_char(),
                        });
                    }
                }
            }
        }
    }

    errors
}

/// Validate a single path against the grammar, returning every violation.
pub fn validate_path(path: &str) -> Vec<PatternError> {
    let mut errors = Vec::new();
    if !path.starts_with('/') {
        errors.push(PatternError::NotAbsolute);
    }
    match parser::parse(path) {
        Ok(tokens) => errors.extend(check_grammar(&tokens)),
        Err(e) => errors.push(e),
    }
    errors
}

/// The path groups one application routes, in declaration order.
#[derive(Debug, Clone)]
pub struct ApplicationPaths<'a> {
    pub application: &'a str,
    pub groups: Vec<Vec<&'a str>>,
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathValidation {
    /// Fatal violations, one human-readable sentence each
    pub errors: Vec<String>,
    /// Overlaps within a single application; matching order still applies
    pub warnings: Vec<String>,
}

impl PathValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate every path of every application and detect overlaps.
///
/// Two patterns overlap when either one's matcher accepts the other's
/// literal text. Overlaps between different applications are errors;
/// overlaps inside one application are reported as warnings only.
pub fn validate(applications: &[ApplicationPaths<'_>]) -> PathValidation {
    let mut result = PathValidation::default();
    let mut compiled: Vec<(&str, usize, &str, std::sync::Arc<PathMatcher>)> = Vec::new();

    for app in applications {
        for (group, path) in app
            .groups
            .iter()
            .enumerate()
            .flat_map(|(index, paths)| paths.iter().map(move |path| (index, *path)))
        {
            let errors = validate_path(path);
            if !errors.is_empty() {
                for error in errors {
                    result.errors.push(format!(
                        "Invalid path \"{}\" in application \"{}\": {}.",
                        path, app.application, error
                    ));
                }
                continue;
            }

            match matcher(path) {
                Ok(m) => compiled.push((app.application, group, path, m)),
                Err(e) => result.errors.push(format!(
                    "Invalid path \"{}\" in application \"{}\": {}.",
                    path, app.application, e
                )),
            }
        }
    }

    for (i, (app_a, group_a, path_a, matcher_a)) in compiled.iter().enumerate() {
        for (app_b, group_b, path_b, matcher_b) in compiled.iter().skip(i + 1) {
            if !(matcher_a.is_match(path_b) || matcher_b.is_match(path_a)) {
                continue;
            }

            if app_a == app_b {
                // paths of one group share a target, so overlap there is harmless
                if group_a == group_b {
                    continue;
                }
                result.warnings.push(format!(
                    "Path \"{path_a}\" overlaps with \"{path_b}\" within application \"{app_a}\"; the first declared group wins."
                ));
            } else {
                result.errors.push(format!(
                    "Overlapping path detected: \"{path_a}\" in application \"{app_a}\" overlaps with \"{path_b}\" in application \"{app_b}\"."
                ));
            }
        }
    }

    result
}
