// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tokenizer for the restricted path grammar.
//!
//! The grammar is a subset of the familiar `path-to-regexp` syntax:
//!
//! | syntax            | meaning                                     |
//! |-------------------|---------------------------------------------|
//! | `/docs`           | literal                                     |
//! | `:slug`           | named wildcard, one segment                 |
//! | `:path*`          | zero or more segments (final component only)|
//! | `:path+`          | one or more segments (final component only) |
//! | `:lang(en\|fr)`   | wildcard constrained to literal alternatives|
//! | `:p((?!a\|b).*)`  | wildcard excluding the listed prefixes      |
//!
//! Optional groups (`{...}`), optional modifiers (`?`) and unnamed captures
//! are recognised only so they can be rejected with a precise message.

use super::PatternError;

/// Repetition modifier attached to a named wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

impl Modifier {
    pub fn as_char(self) -> char {
        match self {
            Modifier::ZeroOrMore => '*',
            Modifier::OneOrMore => '+',
        }
    }
}

/// A named wildcard such as `:path*` or `:lang(en|fr)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wildcard {
    /// Wildcard name without the leading colon
    pub name: String,
    /// Either `"/"` when the wildcard opens a segment, or empty
    pub prefix: String,
    /// Raw custom regex between the parentheses, if any
    pub constraint: Option<String>,
    /// Repetition modifier, if any
    pub modifier: Option<Modifier>,
}

/// One parsed element of a path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Wildcard(Wildcard),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexKind {
    Char,
    Escaped,
    Name,
    Pattern,
    Modifier,
    Open,
    Close,
    End,
}

#[derive(Debug)]
struct Lexeme {
    kind: LexKind,
    index: usize,
    value: String,
}

fn lex(path: &str) -> Result<Vec<Lexeme>, PatternError> {
    let chars: Vec<char> = path.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' | '+' | '?' => {
                tokens.push(Lexeme { kind: LexKind::Modifier, index: i, value: c.to_string() });
                i += 1;
            }
            '\\' => {
                let escaped = chars.get(i + 1).ok_or_else(|| PatternError::Parse {
                    position: i,
                    message: "trailing escape character".to_string(),
                })?;
                tokens.push(Lexeme { kind: LexKind::Escaped, index: i, value: escaped.to_string() });
                i += 2;
            }
            '{' => {
                tokens.push(Lexeme { kind: LexKind::Open, index: i, value: c.to_string() });
                i += 1;
            }
            '}' => {
                tokens.push(Lexeme { kind: LexKind::Close, index: i, value: c.to_string() });
                i += 1;
            }
            ':' => {
                let mut j = i + 1;
                let mut name = String::new();
                while let Some(&n) = chars.get(j) {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        name.push(n);
                        j += 1;
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err(PatternError::Parse {
                        position: i,
                        message: "missing parameter name".to_string(),
                    });
                }
                tokens.push(Lexeme { kind: LexKind::Name, index: i, value: name });
                i = j;
            }
            '(' => {
                let mut depth = 1;
                let mut pattern = String::new();
                let mut j = i + 1;

                if chars.get(j) == Some(&'?') {
                    return Err(PatternError::Parse {
                        position: j,
                        message: "pattern cannot start with \"?\"".to_string(),
                    });
                }

                while let Some(&p) = chars.get(j) {
                    if p == '\\' {
                        pattern.push(p);
                        if let Some(&next) = chars.get(j + 1) {
                            pattern.push(next);
                        }
                        j += 2;
                        continue;
                    }
                    if p == ')' {
                        depth -= 1;
                        if depth == 0 {
                            j += 1;
                            break;
                        }
                    } else if p == '(' {
                        depth += 1;
                        if chars.get(j + 1) != Some(&'?') {
                            return Err(PatternError::Parse {
                                position: j,
                                message: "capturing groups are not allowed".to_string(),
                            });
                        }
                    }
                    pattern.push(p);
                    j += 1;
                }

                if depth != 0 {
                    return Err(PatternError::Parse {
                        position: i,
                        message: "unbalanced pattern".to_string(),
                    });
                }
                if pattern.is_empty() {
                    return Err(PatternError::Parse {
                        position: i,
                        message: "missing pattern".to_string(),
                    });
                }

                tokens.push(Lexeme { kind: LexKind::Pattern, index: i, value: pattern });
                i = j;
            }
            _ => {
                tokens.push(Lexeme { kind: LexKind::Char, index: i, value: c.to_string() });
                i += 1;
            }
        }
    }

    tokens.push(Lexeme { kind: LexKind::End, index: chars.len(), value: String::new() });
    Ok(tokens)
}

/// Parse a path pattern into tokens.
///
/// Syntax the grammar forbids outright (optional groups and modifiers,
/// unnamed captures) fails here; structural rules that need the whole token
/// stream live in [`super::check_grammar`].
pub fn parse(path: &str) -> Result<Vec<Token>, PatternError> {
    let lexemes = lex(path)?;
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < lexemes.len() {
        let lexeme = &lexemes[i];
        match lexeme.kind {
            LexKind::Char | LexKind::Escaped => {
                literal.push_str(&lexeme.value);
                i += 1;
            }
            LexKind::Name => {
                let name = lexeme.value.clone();
                i += 1;

                let mut constraint = None;
                if lexemes[i].kind == LexKind::Pattern {
                    constraint = Some(lexemes[i].value.clone());
                    i += 1;
                }

                let mut modifier = None;
                if lexemes[i].kind == LexKind::Modifier {
                    modifier = match lexemes[i].value.as_str() {
                        "*" => Some(Modifier::ZeroOrMore),
                        "+" => Some(Modifier::OneOrMore),
                        _ => return Err(PatternError::OptionalSegment),
                    };
                    i += 1;
                }

                let prefix = if literal.ends_with('/') {
                    literal.pop();
                    "/".to_string()
                } else {
                    String::new()
                };
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }

                tokens.push(Token::Wildcard(Wildcard { name, prefix, constraint, modifier }));
            }
            LexKind::Pattern => {
                return Err(PatternError::UnnamedWildcard { pattern: lexeme.value.clone() });
            }
            LexKind::Open => return Err(PatternError::OptionalSegment),
            LexKind::Modifier if lexeme.value == "?" => return Err(PatternError::OptionalSegment),
            LexKind::Modifier | LexKind::Close => {
                return Err(PatternError::Parse {
                    position: lexeme.index,
                    message: format!("unexpected \"{}\"", lexeme.value),
                });
            }
            LexKind::End => break,
        }
    }

    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }

    Ok(tokens)
}
