//! Object model path parsing and matching.
//!
//! Filters are dot-separated (or, outside of G-code expressions, slash-separated)
//! strings like `move.axes[1].userPosition` or `state/**`. This module parses
//! them into typed tokens and matches concrete change paths against them.
//!
//! Filter syntax:
//! - `name` matches one property (case-insensitive)
//! - `*` matches any single property
//! - `**` matches everything below the current level
//! - `name[n]` selects list item `n`, `name[*]` selects every item

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// A single token of a parsed filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathToken {
    /// Property name, `*` or `**`
    Name(String),
    /// List index, `-1` selects all items
    Index(i32),
}

impl PathToken {
    pub fn name(name: impl Into<String>) -> Self {
        PathToken::Name(name.into())
    }

    /// Whether this is the `**` token.
    pub fn is_recursive_wildcard(&self) -> bool {
        matches!(self, PathToken::Name(n) if n == "**")
    }

    /// Whether this name token selects the given property name.
    pub fn matches_name(&self, name: &str) -> bool {
        match self {
            PathToken::Name(n) => n == "*" || n.eq_ignore_ascii_case(name),
            PathToken::Index(_) => false,
        }
    }
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathToken::Name(name) => write!(f, "{name}"),
            PathToken::Index(-1) => write!(f, "[*]"),
            PathToken::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// A single element of a concrete change path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathElement {
    /// Property or map key
    Name(String),
    /// Item of the named list
    Item { name: String, index: usize },
}

impl PathElement {
    pub fn name(name: impl Into<String>) -> Self {
        PathElement::Name(name.into())
    }

    pub fn item(name: impl Into<String>, index: usize) -> Self {
        PathElement::Item {
            name: name.into(),
            index,
        }
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Name(name) => write!(f, "{name}"),
            PathElement::Item { name, index } => write!(f, "{name}[{index}]"),
        }
    }
}

/// Format a change path the way filters are written.
pub fn format_path(path: &[PathElement]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Build the filter that selects exactly the value at a change path.
pub fn path_to_filter(path: &[PathElement]) -> Vec<PathToken> {
    let mut tokens = Vec::with_capacity(path.len());
    for element in path {
        match element {
            PathElement::Name(name) => tokens.push(PathToken::name(name.as_str())),
            PathElement::Item { name, index } => {
                tokens.push(PathToken::name(name.as_str()));
                let index = i32::try_from(*index).unwrap_or_else(|_| {
                    tracing::debug!(
                        name = %name,
                        index = *index,
                        "List index saturated in filter"
                    );
                    i32::MAX
                });
                tokens.push(PathToken::Index(index));
            }
        }
    }
    tokens
}

/// Where a filter string comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Subscription or lookup path, `.` and `/` are separators
    Path,
    /// Reference embedded in a G-code expression, only `.` separates
    Expression,
}

/// Errors that can occur when parsing a filter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("Invalid index selector '{selector}' in filter segment '{segment}'")]
    InvalidIndex { segment: String, selector: String },

    #[error("Index lists are not supported (filter segment '{0}')")]
    UnsupportedIndexList(String),
}

fn index_regex() -> &'static Regex {
    static INDEX_REGEX: OnceLock<Regex> = OnceLock::new();
    INDEX_REGEX.get_or_init(|| Regex::new(r"^(.*)\[([\d,*]+)\]$").expect("valid index regex"))
}

/// Parse a single filter expression into tokens.
pub fn parse_filter(text: &str, mode: ParseMode) -> Result<Vec<PathToken>, FilterError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let segments: Vec<&str> = match mode {
        ParseMode::Path => text.split(['.', '/']).collect(),
        ParseMode::Expression => text.split('.').collect(),
    };

    let mut tokens = Vec::with_capacity(segments.len());
    for segment in segments {
        match index_regex().captures(segment) {
            Some(caps) => {
                let selector = &caps[2];
                tokens.push(PathToken::name(&caps[1]));
                tokens.push(PathToken::Index(parse_selector(segment, selector)?));
            }
            None => tokens.push(PathToken::name(segment)),
        }
    }
    Ok(tokens)
}

fn parse_selector(segment: &str, selector: &str) -> Result<i32, FilterError> {
    if selector == "*" {
        return Ok(-1);
    }
    if selector.contains(',') {
        return Err(FilterError::UnsupportedIndexList(segment.to_string()));
    }
    selector.parse().map_err(|_| FilterError::InvalidIndex {
        segment: segment.to_string(),
        selector: selector.to_string(),
    })
}

/// Parse a delimited list of filters.
///
/// Filters may be separated by `,`, `|`, CR, LF or spaces. Empty segments are skipped.
/// Commas inside an index selector stay part of the filter, so `axes[0,1]` is
/// reported as an index list instead of being split apart.
pub fn parse_filters(text: &str) -> Result<Vec<Filter>, FilterError> {
    split_filter_list(text)
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(Filter::new)
        .filter(|f| !matches!(f, Ok(f) if f.is_empty()))
        .collect()
}

fn split_filter_list(text: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut in_selector = false;

    for (i, c) in text.char_indices() {
        match c {
            '[' => in_selector = true,
            ']' => in_selector = false,
            ',' if in_selector => {}
            ',' | '|' | '\r' | '\n' | ' ' => {
                entries.push(&text[start..i]);
                start = i + c.len_utf8();
                in_selector = false;
            }
            _ => {}
        }
    }
    entries.push(&text[start..]);
    entries
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// The original filter string
    raw: String,
    /// Parsed tokens
    tokens: Vec<PathToken>,
}

impl Filter {
    /// Parse a subscription filter (`.` and `/` separated).
    pub fn new(filter: &str) -> Result<Self, FilterError> {
        Self::parse(filter, ParseMode::Path)
    }

    pub fn parse(filter: &str, mode: ParseMode) -> Result<Self, FilterError> {
        Ok(Self {
            raw: filter.to_string(),
            tokens: parse_filter(filter, mode)?,
        })
    }

    /// Get the raw filter string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Get the parsed tokens.
    pub fn tokens(&self) -> &[PathToken] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether this filter covers the given change path.
    pub fn matches(&self, path: &[PathElement]) -> bool {
        path_matches(path, &self.tokens)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl AsRef<[PathToken]> for Filter {
    fn as_ref(&self) -> &[PathToken] {
        &self.tokens
    }
}

/// Check if a change path is covered by a filter.
///
/// The filter must describe the path exactly unless it ends in `**`.
pub fn path_matches(path: &[PathElement], filter: &[PathToken]) -> bool {
    let mut tokens = filter.iter().peekable();

    for element in path {
        let Some(token) = tokens.next() else {
            // Filter is shorter than the path
            return false;
        };
        if token.is_recursive_wildcard() {
            return true;
        }

        match element {
            PathElement::Name(name) => {
                if !token.matches_name(name) {
                    return false;
                }
            }
            PathElement::Item { name, index } => {
                if !token.matches_name(name) {
                    return false;
                }
                if let Some(&&PathToken::Index(wanted)) = tokens.peek() {
                    tokens.next();
                    if wanted != -1 && usize::try_from(wanted).ok() != Some(*index) {
                        return false;
                    }
                }
            }
        }
    }

    tokens.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name(n: &str) -> PathToken {
        PathToken::name(n)
    }

    #[test]
    fn test_parse_dotted_filter() {
        let tokens = parse_filter("move.axes[1].userPosition", ParseMode::Path).unwrap();
        assert_eq!(
            tokens,
            vec![
                name("move"),
                name("axes"),
                PathToken::Index(1),
                name("userPosition")
            ]
        );
    }

    #[test]
    fn test_parse_slash_only_in_path_mode() {
        let tokens = parse_filter("move/axes[*]/**", ParseMode::Path).unwrap();
        assert_eq!(
            tokens,
            vec![name("move"), name("axes"), PathToken::Index(-1), name("**")]
        );

        let tokens = parse_filter("global.a/b", ParseMode::Expression).unwrap();
        assert_eq!(tokens, vec![name("global"), name("a/b")]);
    }

    #[test]
    fn test_parse_malformed_bracket_is_verbatim() {
        let tokens = parse_filter("axes[1", ParseMode::Path).unwrap();
        assert_eq!(tokens, vec![name("axes[1")]);

        let tokens = parse_filter("axes[x]", ParseMode::Path).unwrap();
        assert_eq!(tokens, vec![name("axes[x]")]);
    }

    #[test]
    fn test_parse_index_errors() {
        assert_eq!(
            parse_filter("axes[1,2]", ParseMode::Path),
            Err(FilterError::UnsupportedIndexList("axes[1,2]".to_string()))
        );
        assert!(matches!(
            parse_filter("axes[1*]", ParseMode::Path),
            Err(FilterError::InvalidIndex { .. })
        ));
        assert!(matches!(
            parse_filter("axes[99999999999]", ParseMode::Path),
            Err(FilterError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn test_parse_filters_list() {
        let filters = parse_filters("state.status, move/axes[*]|global.**\r\n  job").unwrap();
        let raw: Vec<&str> = filters.iter().map(Filter::as_str).collect();
        assert_eq!(raw, vec!["state.status", "move/axes[*]", "global.**", "job"]);
        assert!(parse_filters("  , |\n").unwrap().is_empty());
        assert!(parse_filters("ok, bad[1,2]").is_err());
    }

    #[test]
    fn test_parse_filters_keeps_index_lists_together() {
        assert_eq!(
            parse_filters("heat.heaters[0,1]"),
            Err(FilterError::UnsupportedIndexList("heaters[0,1]".to_string()))
        );
        assert_eq!(
            parse_filters("state.status,tools[0,1].name"),
            Err(FilterError::UnsupportedIndexList("tools[0,1]".to_string()))
        );

        // An unterminated selector does not swallow the following filters
        let filters = parse_filters("axes[1 state.status,job").unwrap();
        let raw: Vec<&str> = filters.iter().map(Filter::as_str).collect();
        assert_eq!(raw, vec!["axes[1", "state.status", "job"]);
    }

    #[test]
    fn test_token_display() {
        let filter = Filter::new("move.axes[*]").unwrap();
        let text: Vec<String> = filter.tokens().iter().map(ToString::to_string).collect();
        assert_eq!(text, vec!["move", "axes", "[*]"]);
        assert_eq!(
            format_path(&[PathElement::name("move"), PathElement::item("axes", 2)]),
            "move.axes[2]"
        );
    }

    #[test]
    fn test_path_matches_table() {
        let status = vec![PathElement::name("state"), PathElement::name("status")];
        let axis_pos = vec![
            PathElement::name("move"),
            PathElement::item("axes", 1),
            PathElement::name("userPosition"),
        ];
        let buffer_len = vec![
            PathElement::name("state"),
            PathElement::name("gcodeBuffer"),
            PathElement::name("length"),
        ];

        let cases: &[(&[PathElement], &str, bool)] = &[
            (&status[..], "state.status", true),
            (&status[..], "STATE.Status", true),
            (&status[..], "state.*", true),
            (&status[..], "*.status", true),
            (&status[..], "state.**", true),
            (&status[..], "**", true),
            (&status[..], "state", false),
            (&status[..], "state.status.extra", false),
            (&status[..], "state.message", false),
            (&status[..], "state[0].status", false),
            (&axis_pos[..], "move.axes[1].userPosition", true),
            (&axis_pos[..], "move.axes[*].userPosition", true),
            (&axis_pos[..], "move.axes.userPosition", true),
            (&axis_pos[..], "move.AXES[1].userPosition", true),
            (&axis_pos[..], "move.axes[0].userPosition", false),
            (&axis_pos[..], "move.axes[1]", false),
            (&axis_pos[..], "move.axes[1].**", true),
            (&axis_pos[..], "move.*[1].*", true),
            (&buffer_len[..], "state.**", true),
            (&buffer_len[..], "state.*", false),
        ];

        for (path, filter, expected) in cases {
            let filter = Filter::new(filter).unwrap();
            assert_eq!(
                filter.matches(path),
                *expected,
                "filter {filter} on {}",
                format_path(path)
            );
        }
    }

    #[test]
    fn test_index_token_against_bare_name_fails() {
        let filter = vec![PathToken::Index(0)];
        assert!(!path_matches(&[PathElement::name("state")], &filter));
    }

    #[test]
    fn test_path_to_filter_matches_its_path() {
        let path = vec![
            PathElement::name("move"),
            PathElement::item("axes", 2),
            PathElement::name("letter"),
        ];
        let filter = path_to_filter(&path);
        assert_eq!(
            filter,
            vec![name("move"), name("axes"), PathToken::Index(2), name("letter")]
        );
        assert!(path_matches(&path, &filter));
    }

    #[test]
    fn test_empty_path_matches_only_empty_filter() {
        assert!(path_matches(&[], &[]));
        assert!(!path_matches(&[], &[name("state")]));
    }
}
