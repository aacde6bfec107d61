//! Line framing for streamed service responses
//!
//! Every src.codes text endpoint answers with the same shape: a body of
//! `\n`-terminated lines, a blank line, then a footer of tab-separated
//! key/value pairs. The body arrives in chunks whose boundaries fall
//! anywhere, including inside a multi-byte character or between `\r` and
//! `\n`. `LineFramer` holds the bytes of the current unterminated line
//! between chunks and decodes only complete lines, so a split character is
//! reassembled before it is ever decoded.

use std::collections::BTreeMap;

use crate::error::{ClientError, Result};

/// Footer key carrying the resume cursor for paginated queries
pub const FOOTER_RESUME: &str = "Resume:";

/// Footer key set when the server hit an error partway through
pub const FOOTER_ERRORS: &str = "Errors:";

/// Key/value metadata that follows the first blank line of a response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Footer {
    fields: BTreeMap<String, String>,
    complete: bool,
}

impl Footer {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Cursor to pass as `after` on the next request, if the server stopped early
    pub fn resume_cursor(&self) -> Option<&str> {
        self.get(FOOTER_RESUME).filter(|cursor| !cursor.is_empty())
    }

    /// Whether the server reported a partial failure
    pub fn has_errors(&self) -> bool {
        self.get(FOOTER_ERRORS).is_some_and(|value| !value.is_empty())
    }

    /// Whether the stream reached the blank line that opens the footer
    ///
    /// A response that ends before this point was cut off: it carries
    /// neither a resume cursor nor a trustworthy end-of-results signal.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    fn parse_line(&mut self, line: &str) {
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() % 2 != 0 {
            log::debug!("Footer line has an odd field count: {:?}", line);
        }
        for pair in parts.chunks(2) {
            let key = pair[0];
            if key.is_empty() {
                continue;
            }
            let value = pair.get(1).copied().unwrap_or_default();
            self.fields.insert(key.to_string(), value.to_string());
        }
    }
}

/// Incremental decoder from response bytes to body lines and a `Footer`
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Bytes of the current line, not yet terminated
    pending: Vec<u8>,
    in_footer: bool,
    footer: Footer,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the blank line separating body and footer has been seen
    pub fn in_footer(&self) -> bool {
        self.in_footer
    }

    /// Frame one chunk, calling `on_line` for each completed body line
    pub fn feed<F>(&mut self, chunk: &[u8], on_line: &mut F) -> Result<()>
    where
        F: FnMut(String) + ?Sized,
    {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            let line = if self.pending.is_empty() {
                decode_line(head)?
            } else {
                self.pending.extend_from_slice(head);
                let bytes = std::mem::take(&mut self.pending);
                decode_line(&bytes)?
            };
            self.handle_line(line, on_line);
            rest = &tail[1..];
        }
        self.pending.extend_from_slice(rest);
        Ok(())
    }

    /// Finish the stream and return the accumulated footer
    ///
    /// An unterminated footer line is still parsed. An unterminated body
    /// line is dropped with a warning; the footer then reports itself
    /// incomplete, which is how callers learn the stream was truncated.
    pub fn finish(mut self) -> Result<Footer> {
        if !self.pending.is_empty() {
            let bytes = std::mem::take(&mut self.pending);
            let line = match String::from_utf8(bytes) {
                Ok(line) => line,
                Err(err) if err.utf8_error().error_len().is_none() => {
                    return Err(ClientError::Decode(
                        "stream ended inside a multi-byte character".to_string(),
                    ));
                }
                Err(err) => return Err(ClientError::Decode(err.utf8_error().to_string())),
            };
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if self.in_footer {
                self.footer.parse_line(line);
            } else {
                log::warn!(
                    "Stream ended mid-line without a footer; discarding {} trailing bytes",
                    line.len()
                );
            }
        }
        Ok(self.footer)
    }

    fn handle_line<F>(&mut self, line: String, on_line: &mut F)
    where
        F: FnMut(String) + ?Sized,
    {
        if self.in_footer {
            self.footer.parse_line(&line);
        } else if line.is_empty() {
            self.in_footer = true;
            self.footer.complete = true;
        } else {
            on_line(line);
        }
    }
}

fn decode_line(bytes: &[u8]) -> Result<String> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec()).map_err(|err| ClientError::Decode(err.utf8_error().to_string()))
}
