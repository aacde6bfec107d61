//! Fuzzy file-name search client
//!
//! The fzf service ranks every path in a distribution against a short
//! query and answers with one `<score> <path>` line per hit, best first,
//! followed by a debugging footer. Scoring happens server-side; this client
//! only frames and parses the response.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::transport::{FetchRequest, HttpTransport, LineTransport};

/// One file returned by the fzf service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMatch {
    pub score: f64,
    /// Server-relative path, `<package>/<path inside package>`
    pub path: String,
}

/// Parse a `<score> <path>` line; paths may contain spaces
pub fn parse_file_line(line: &str) -> Option<FileMatch> {
    let (score, path) = line.split_once(' ')?;
    if path.is_empty() {
        return None;
    }
    Some(FileMatch {
        score: score.parse().ok()?,
        path: path.to_string(),
    })
}

/// Client for the fzf service
pub struct FileSearchClient<T = HttpTransport> {
    transport: T,
    endpoint: String,
    distribution: String,
}

impl FileSearchClient<HttpTransport> {
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(
            HttpTransport::new()?,
            config.endpoints.fzf.clone(),
            config.distribution.clone(),
        ))
    }
}

impl<T: LineTransport> FileSearchClient<T> {
    pub fn new(transport: T, endpoint: impl Into<String>, distribution: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            distribution: distribution.into(),
        }
    }

    /// Files matching `query`, in the server's ranking order
    pub async fn query(&self, query: &str, cancel: &CancellationToken) -> Result<Vec<FileMatch>> {
        let request = FetchRequest::new(&self.endpoint, &self.distribution).param("q", query);

        let mut matches = Vec::new();
        let mut on_line = |line: String| match parse_file_line(&line) {
            Some(file) => matches.push(file),
            None => log::warn!("Skipping malformed file search line: {:?}", line),
        };
        let footer = self.transport.fetch(&request, &mut on_line, cancel).await?;

        log::debug!("File search for {:?}: {} results, footer {:?}", query, matches.len(), footer.fields());
        Ok(matches)
    }
}
