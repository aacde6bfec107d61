//! Streaming HTTP transport
//!
//! Issues a GET against one of the src.codes endpoints and feeds the
//! response body through a `LineFramer` chunk by chunk, so body lines reach
//! the caller while the transfer is still running and the body is never
//! held in memory as a whole.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};
use crate::framer::{Footer, LineFramer};

/// A GET request against a line-oriented endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Endpoint root, e.g. `https://grep.src.codes`
    pub base: String,
    /// Single path segment appended to the root (the distribution)
    pub path: String,
    /// Query-string parameters, in order; keys may repeat
    pub params: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn new(base: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            path: path.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn params(mut self, params: impl IntoIterator<Item = (String, String)>) -> Self {
        self.params.extend(params);
        self
    }

    /// Full URL with the path segment and query string escaped
    pub fn url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", self.base, e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(format!("{} cannot take a path", self.base)))?
            .pop_if_empty()
            .push(&self.path);
        if !self.params.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.params);
        }
        Ok(url)
    }
}

/// Source of framed response lines
///
/// `on_line` is called once per body line, in arrival order, before
/// `fetch` returns. Implementations must stop requesting data once
/// `cancel` fires and return `ClientError::Cancelled`.
#[async_trait]
pub trait LineTransport: Send + Sync {
    async fn fetch(
        &self,
        request: &FetchRequest,
        on_line: &mut (dyn FnMut(String) + Send),
        cancel: &CancellationToken,
    ) -> Result<Footer>;
}

/// `LineTransport` over a streaming reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("srcx/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client (shared connection pool, custom TLS, ...)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LineTransport for HttpTransport {
    async fn fetch(
        &self,
        request: &FetchRequest,
        on_line: &mut (dyn FnMut(String) + Send),
        cancel: &CancellationToken,
    ) -> Result<Footer> {
        let url = request.url()?;
        log::debug!("GET {}", url);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            response = self.client.get(url.clone()).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status,
                url: url.to_string(),
            });
        }

        // Dropping the stream on cancellation closes the connection
        let mut body = response.bytes_stream();
        let mut framer = LineFramer::new();
        let mut chunks = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("Cancelled {} after {} chunks", url, chunks);
                    return Err(ClientError::Cancelled);
                }
                next = body.next() => next,
            };
            match next {
                Some(chunk) => {
                    framer.feed(&chunk?, on_line)?;
                    chunks += 1;
                }
                None => break,
            }
        }

        let footer = framer.finish()?;
        log::debug!("Finished {} ({} chunks), footer: {:?}", url, chunks, footer.fields());
        Ok(footer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_path_and_params() {
        let request = FetchRequest::new("https://grep.src.codes", "jammy")
            .param("q", "a b&c")
            .param("include", "*.c")
            .param("include", "*.h");
        let url = request.url().unwrap();
        assert_eq!(url.path(), "/jammy");
        assert_eq!(url.query(), Some("q=a+b%26c&include=*.c&include=*.h"));
    }

    #[test]
    fn test_url_with_trailing_slash_base() {
        let url = FetchRequest::new("https://fzf.src.codes/", "jammy").url().unwrap();
        assert_eq!(url.as_str(), "https://fzf.src.codes/jammy");
    }

    #[test]
    fn test_path_segment_is_escaped() {
        let url = FetchRequest::new("http://localhost:5050", "a/b").url().unwrap();
        assert_eq!(url.path(), "/a%2Fb");
    }

    #[test]
    fn test_invalid_base() {
        let err = FetchRequest::new("not a url", "jammy").url().unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
    }

    #[test]
    fn test_new_transport() {
        assert!(HttpTransport::new().is_ok());
    }
}
