// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod pattern_tests {
    use crate::pattern::parser::{Modifier, Token, parse};
    use crate::pattern::{
        ApplicationPaths, PathMatcher, PatternError, matches, negative_lookahead_alternatives,
        validate, validate_path,
    };

    fn apps<'a>(entries: &[(&'a str, &[&'a str])]) -> Vec<ApplicationPaths<'a>> {
        entries
            .iter()
            .map(|(name, paths)| ApplicationPaths {
                application: name,
                groups: vec![paths.to_vec()],
            })
            .collect()
    }

    #[test]
    fn test_parse_named_wildcard_takes_segment_prefix() {
        let tokens = parse("/docs/:path*").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0], Token::Literal("/docs".to_string()));
        match &tokens[1] {
            Token::Wildcard(w) => {
                assert_eq!(w.name, "path");
                assert_eq!(w.prefix, "/");
                assert_eq!(w.modifier, Some(Modifier::ZeroOrMore));
                assert!(w.constraint.is_none());
            }
            other => panic!("expected wildcard, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_constraint() {
        let tokens = parse("/:lang(en|fr)/docs").unwrap();
        match &tokens[0] {
            Token::Wildcard(w) => assert_eq!(w.constraint.as_deref(), Some("en|fr")),
            other => panic!("expected wildcard, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_optional_syntax() {
        assert_eq!(validate_path("/docs{/:slug}"), vec![PatternError::OptionalSegment]);
        assert_eq!(validate_path("/docs/:slug?"), vec![PatternError::OptionalSegment]);
    }

    #[test]
    fn test_rejects_unnamed_capture_with_hint() {
        let errors = validate_path("/docs/(.*)");
        assert_eq!(errors.len(), 1);
        let message = errors[0].to_string();
        assert!(message.contains("unnamed"));
        assert!(message.contains(":name(.*)"));
    }

    #[test]
    fn test_rejects_two_wildcards_in_one_segment() {
        assert_eq!(
            validate_path("/docs/:a-:b"),
            vec![PatternError::MultipleWildcardsInSegment]
        );
        assert!(validate_path("/docs/:a/:b").is_empty());
    }

    #[test]
    fn test_regex_constraints() {
        assert!(validate_path("/:lang(en|fr|de-ch)/docs").is_empty());
        assert!(validate_path("/:file(robots\\.txt|humans\\.txt)").is_empty());
        assert!(validate_path("/:path((?!docs|blog).*)").is_empty());

        let errors = validate_path("/:id(\\d+)");
        assert!(matches!(errors[0], PatternError::UnsupportedRegex { .. }));

        let errors = validate_path("/:path(.*)");
        assert!(matches!(errors[0], PatternError::UnsupportedRegex { .. }));
    }

    #[test]
    fn test_modifier_only_on_last_component() {
        assert!(validate_path("/docs/:path+").is_empty());
        let errors = validate_path("/docs/:path*/edit");
        assert_eq!(
            errors,
            vec![PatternError::ModifierNotLast {
                name: "path".to_string(),
                modifier: '*'
            }]
        );
    }

    #[test]
    fn test_parse_failure_reports_position() {
        let errors = validate_path("/docs/:slug(en");
        match &errors[0] {
            PatternError::Parse { position, .. } => assert_eq!(*position, 11),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(errors[0].to_string().contains("position 11"));

        let errors = validate_path("/docs/:/x");
        assert!(matches!(errors[0], PatternError::Parse { position: 6, .. }));
    }

    #[test]
    fn test_relative_path_rejected() {
        assert!(validate_path("docs").contains(&PatternError::NotAbsolute));
    }

    #[test]
    fn test_matcher_segments() {
        let m = PathMatcher::compile("/docs/:slug").unwrap();
        assert!(m.is_match("/docs/intro"));
        assert!(m.is_match("/docs/intro/"));
        assert!(!m.is_match("/docs"));
        assert!(!m.is_match("/docs/intro/more"));
        assert_eq!(m.pattern(), "/docs/:slug");
    }

    #[test]
    fn test_matcher_zero_or_more() {
        assert!(matches("/docs/:path*", "/docs"));
        assert!(matches("/docs/:path*", "/docs/a"));
        assert!(matches("/docs/:path*", "/docs/a/b/c"));
        assert!(!matches("/docs/:path*", "/docsx"));
        assert!(!matches("/docs/:path*", "/blog"));
    }

    #[test]
    fn test_matcher_one_or_more() {
        assert!(!matches("/docs/:path+", "/docs"));
        assert!(matches("/docs/:path+", "/docs/a/b"));
    }

    #[test]
    fn test_matcher_alternation() {
        assert!(matches("/:lang(en|fr)/docs", "/en/docs"));
        assert!(matches("/:lang(en|fr)/docs", "/fr/docs"));
        assert!(!matches("/:lang(en|fr)/docs", "/de/docs"));
        assert!(!matches("/:lang(en|fr)/docs", "/english/docs"));
    }

    #[test]
    fn test_matcher_negative_lookahead() {
        let pattern = "/:path((?!docs|blog).*)";
        assert!(matches(pattern, "/pricing"));
        assert!(matches(pattern, "/pricing/enterprise"));
        assert!(!matches(pattern, "/docs"));
        assert!(!matches(pattern, "/docs/intro"));
        assert!(!matches(pattern, "/blog/post"));
    }

    #[test]
    fn test_negative_lookahead_alternatives_unescape() {
        assert_eq!(
            negative_lookahead_alternatives("(?!a\\.b|c).*"),
            Some(vec!["a.b".to_string(), "c".to_string()])
        );
        assert_eq!(negative_lookahead_alternatives("a|b"), None);
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        assert!(!matches("/docs/(.*)", "/docs/anything"));
    }

    #[test]
    fn test_validate_detects_cross_application_overlap() {
        let result = validate(&apps(&[
            ("docs", &["/docs/:path*"]),
            ("blog", &["/docs/guide"]),
        ]));
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("\"docs\""));
        assert!(result.errors[0].contains("\"blog\""));
        assert!(result.errors[0].contains("/docs/:path*"));
        assert!(result.errors[0].contains("/docs/guide"));
    }

    #[test]
    fn test_validate_detects_duplicate_literal_paths() {
        let result = validate(&apps(&[("a", &["/pricing"]), ("b", &["/pricing"])]));
        assert!(!result.is_valid());
    }

    #[test]
    fn test_validate_allows_same_application_overlap_with_warning() {
        let result = validate(&[ApplicationPaths {
            application: "docs",
            groups: vec![vec!["/docs/:path*"], vec!["/docs/intro"]],
        }]);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("first declared group wins"));
    }

    #[test]
    fn test_validate_reports_every_violation() {
        let result = validate(&apps(&[
            ("docs", &["/docs/(.*)", "/docs/:a-:b"]),
            ("blog", &["/blog{/:x}"]),
        ]));
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_validate_disjoint_paths() {
        let result = validate(&apps(&[
            ("docs", &["/docs", "/docs/:path*"]),
            ("blog", &["/blog", "/blog/:path*"]),
        ]));
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }
}
