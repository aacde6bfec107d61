//! Core data models for the src.codes clients
//!
//! These structures describe a text-search query as it goes over the wire
//! and the results reconstructed from the server's line stream. All
//! coordinates in results are 0-indexed, as editors expect them; the
//! server's 1-indexed numbers never leave the `search` module.

use serde::{Deserialize, Serialize};

/// A position in a file (0-indexed line and byte column)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

/// An inclusive range between two positions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        Self {
            start: Position::new(start_line, start_col),
            end: Position::new(end_line, end_col),
        }
    }

    /// Whether `line` falls inside the range's line span
    pub fn contains_line(&self, line: usize) -> bool {
        self.start.line <= line && line <= self.end.line
    }
}

/// A text-search query as sent to the grep service
///
/// The whole struct is the identity of a query for pagination purposes:
/// two queries share cached results only if every field matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Query {
    /// Regular expression, in the server's syntax
    pub pattern: String,
    /// Regex flags (`i` for case-insensitive, `ms` for multiline)
    pub flags: String,
    /// Path globs a file must match
    pub includes: Vec<String>,
    /// Path globs that exclude a file
    pub excludes: Vec<String>,
    /// Lines of context to request around each match
    pub context_size: usize,
}

impl Query {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: impl Into<String>) -> Self {
        self.flags = flags.into();
        self
    }

    pub fn with_context(mut self, context_size: usize) -> Self {
        self.context_size = context_size;
        self
    }

    pub fn include(mut self, glob: impl Into<String>) -> Self {
        self.includes.push(glob.into());
        self
    }

    pub fn exclude(mut self, glob: impl Into<String>) -> Self {
        self.excludes.push(glob.into());
        self
    }

    /// Deterministic key identifying this query in the pagination cache
    pub fn cache_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }

    /// Query-string parameters in wire order
    ///
    /// `context` is omitted when zero; the resume cursor is added separately
    /// by the pagination layer.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("q".to_string(), self.pattern.clone()),
            ("flags".to_string(), self.flags.clone()),
        ];
        for glob in &self.includes {
            params.push(("include".to_string(), glob.clone()));
        }
        for glob in &self.excludes {
            params.push(("exclude".to_string(), glob.clone()));
        }
        if self.context_size > 0 {
            params.push(("context".to_string(), self.context_size.to_string()));
        }
        params
    }
}

/// Editor-level search options, before they are lowered into a `Query`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextSearchOptions {
    pub pattern: String,
    /// Treat `pattern` as a regex (otherwise it is escaped)
    pub is_regex: bool,
    pub is_case_sensitive: bool,
    pub is_multiline: bool,
    /// Match whole words only
    pub is_word_match: bool,
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    pub context_size: usize,
}

impl TextSearchOptions {
    /// Lower editor options into the wire query
    pub fn into_query(self) -> Query {
        let mut pattern = if self.is_regex {
            self.pattern
        } else {
            regex::escape(&self.pattern)
        };
        if self.is_word_match {
            pattern = format!(r"\b{}\b", pattern);
        }

        let mut flags = String::new();
        if !self.is_case_sensitive {
            flags.push('i');
        }
        if self.is_multiline {
            flags.push_str("ms");
        }

        Query {
            pattern,
            flags,
            includes: self.includes,
            excludes: self.excludes,
            context_size: self.context_size,
        }
    }
}

/// A line (or run of lines) satisfying the search pattern
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchLine {
    /// Server-relative path of the file
    pub path: String,
    /// Location of the match in the file
    pub range: Range,
    /// The full text block the server sent, context included
    pub preview_text: String,
    /// Location of the match relative to `preview_text`
    pub preview_matches: Vec<Range>,
}

/// A non-matching line shown around a match
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextLine {
    pub path: String,
    pub line_number: usize,
    pub text: String,
}

/// One reconstructed search result, in the order it was reported
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchResult {
    Match(MatchLine),
    Context(ContextLine),
}

impl SearchResult {
    pub fn path(&self) -> &str {
        match self {
            SearchResult::Match(m) => &m.path,
            SearchResult::Context(c) => &c.path,
        }
    }

    pub fn as_match(&self) -> Option<&MatchLine> {
        match self {
            SearchResult::Match(m) => Some(m),
            SearchResult::Context(_) => None,
        }
    }

    pub fn as_context(&self) -> Option<&ContextLine> {
        match self {
            SearchResult::Context(c) => Some(c),
            SearchResult::Match(_) => None,
        }
    }
}

/// Summary of one paginated execution
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchOutcome {
    /// The server reported a partial failure at some point; results may be incomplete
    pub has_errored: bool,
    /// Another execution of the same query will fetch more results
    pub has_more: bool,
}
