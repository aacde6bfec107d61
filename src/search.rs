//! Reconstruction of text-search results from the grep line stream
//!
//! The grep service prints one line per match:
//!
//! ```text
//! <path> <blockStart> <before> <after> <startCol> <endCol> <"quoted block">
//! ```
//!
//! The quoted block is the matched line(s) plus up to `before` lines of
//! context above and `after` lines below, starting at 1-indexed line
//! `blockStart`. Columns are 1-indexed and inclusive. Nearby matches send
//! overlapping blocks, so context is held back per file and reported once
//! the file is finished, minus every line that turned out to be a match.

use std::collections::{BTreeMap, HashSet};

use crate::error::LineParseError;
use crate::models::{ContextLine, MatchLine, Range, SearchResult};

/// One parsed data line, still in server (1-indexed) coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLine {
    pub path: String,
    pub block_start: usize,
    pub before: usize,
    pub after: usize,
    pub start_col: usize,
    pub end_col: usize,
    /// Lines of the text block, without terminators. A block that runs to
    /// the end of a newline-terminated file ends in an empty line, counted
    /// as after-context.
    pub lines: Vec<String>,
}

impl DataLine {
    /// First matched line (1-indexed)
    pub fn match_start_line(&self) -> usize {
        self.block_start + self.before
    }

    /// Last matched line (1-indexed, inclusive)
    pub fn match_end_line(&self) -> usize {
        self.block_start + self.lines.len() - self.after - 1
    }

    /// Block lines worth showing: the empty line past the file's final
    /// newline is dropped
    pub fn visible_lines(&self) -> &[String] {
        match self.lines.split_last() {
            Some((last, rest)) if self.after > 0 && last.is_empty() => rest,
            _ => &self.lines,
        }
    }

    /// Absolute (1-indexed) line number of each visible line in the block
    pub fn numbered_lines(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.visible_lines()
            .iter()
            .enumerate()
            .map(move |(i, text)| (self.block_start + i, text.as_str()))
    }
}

/// Parse a data line from the grep service
pub fn parse_data_line(line: &str) -> Result<DataLine, LineParseError> {
    let fields: Vec<&str> = line.splitn(7, ' ').collect();
    if fields.len() != 7 {
        return Err(LineParseError::FieldCount(fields.len()));
    }

    let block_start = parse_field("block_start", fields[1])?;
    let before = parse_field("before", fields[2])?;
    let after = parse_field("after", fields[3])?;
    let start_col = parse_field("start_col", fields[4])?;
    let end_col = parse_field("end_col", fields[5])?;

    if block_start == 0 {
        return Err(LineParseError::ZeroIndex("block_start"));
    }
    if start_col == 0 {
        return Err(LineParseError::ZeroIndex("start_col"));
    }
    if end_col == 0 {
        return Err(LineParseError::ZeroIndex("end_col"));
    }

    let text: String = serde_json::from_str(fields[6])
        .map_err(|e| LineParseError::InvalidTextBlock(e.to_string()))?;
    let lines: Vec<String> = text.split('\n').map(str::to_string).collect();

    if before + after >= lines.len() {
        return Err(LineParseError::InconsistentContext {
            before,
            after,
            total: lines.len(),
        });
    }

    Ok(DataLine {
        path: fields[0].to_string(),
        block_start,
        before,
        after,
        start_col,
        end_col,
        lines,
    })
}

fn parse_field(field: &'static str, value: &str) -> Result<usize, LineParseError> {
    value.parse().map_err(|_| LineParseError::InvalidInteger {
        field,
        value: value.to_string(),
    })
}

/// Per-execution state machine turning data lines into ordered results
///
/// Matches are emitted as soon as their line is parsed. Context lines wait
/// in `pending_context` until the stream moves to another file (or ends),
/// then are emitted in ascending line order, skipping any line that was
/// part of a match. Not shared between executions.
#[derive(Debug, Default)]
pub struct ResultReconstructor {
    current_file: Option<String>,
    /// 1-indexed line number -> text
    pending_context: BTreeMap<usize, String>,
    /// 1-indexed line numbers covered by a match in the current file
    matched_lines: HashSet<usize>,
    matches: usize,
    skipped: usize,
}

impl ResultReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of match results emitted so far
    pub fn match_count(&self) -> usize {
        self.matches
    }

    /// Number of malformed lines skipped so far
    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    /// Handle one framed data line
    ///
    /// A malformed line is logged and skipped: the rest of the stream is
    /// still worth reporting.
    pub fn push_line<F>(&mut self, line: &str, emit: &mut F)
    where
        F: FnMut(SearchResult) + ?Sized,
    {
        match parse_data_line(line) {
            Ok(data) => self.push(data, emit),
            Err(e) => {
                self.skipped += 1;
                log::warn!("Skipping malformed result line ({}): {:?}", e, line);
            }
        }
    }

    /// Handle one parsed data line
    pub fn push<F>(&mut self, data: DataLine, emit: &mut F)
    where
        F: FnMut(SearchResult) + ?Sized,
    {
        if self.current_file.as_deref() != Some(data.path.as_str()) {
            self.flush_context(emit);
            self.current_file = Some(data.path.clone());
        }

        let match_start = data.match_start_line();
        let match_end = data.match_end_line();

        for (number, text) in data.numbered_lines() {
            if number < match_start || number > match_end {
                self.pending_context.insert(number, text.to_string());
            }
        }

        let match_lines = match_end - match_start;
        self.matches += 1;
        emit(SearchResult::Match(MatchLine {
            range: Range::new(match_start - 1, data.start_col - 1, match_end - 1, data.end_col - 1),
            preview_text: data.visible_lines().join("\n"),
            preview_matches: vec![Range::new(
                data.before,
                data.start_col - 1,
                data.before + match_lines,
                data.end_col - 1,
            )],
            path: data.path,
        }));

        self.matched_lines.extend(match_start..=match_end);
    }

    /// Flush context still held for the last file; call once the stream ends
    pub fn finish<F>(&mut self, emit: &mut F)
    where
        F: FnMut(SearchResult) + ?Sized,
    {
        self.flush_context(emit);
        self.current_file = None;
    }

    fn flush_context<F>(&mut self, emit: &mut F)
    where
        F: FnMut(SearchResult) + ?Sized,
    {
        let pending = std::mem::take(&mut self.pending_context);
        let matched = std::mem::take(&mut self.matched_lines);
        let Some(path) = self.current_file.as_deref() else {
            return;
        };
        for (number, text) in pending {
            if matched.contains(&number) {
                continue;
            }
            emit(SearchResult::Context(ContextLine {
                path: path.to_string(),
                line_number: number - 1,
                text,
            }));
        }
    }
}
