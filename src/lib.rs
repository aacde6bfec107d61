//! srccodes: streaming clients for the src.codes source mirror
//!
//! src.codes serves the source packages of Ubuntu and Debian releases as a
//! read-only tree, with remote full-text and fuzzy file-name search. This
//! crate is the client side of those searches: it streams responses line by
//! line, rebuilds match and context results as they arrive, and paginates
//! long result sets with server-issued resume cursors.
//!
//! # Architecture
//!
//! - **Framer**: splits the response byte stream into body lines and a footer
//! - **Transport**: streaming HTTP GET with cooperative cancellation
//! - **Reconstructor**: turns grep data lines into 0-indexed match/context results
//! - **Pagination cache**: replays earlier pages and resumes from the last cursor
//!
//! # Example Usage
//!
//! ```no_run
//! use srccodes::{ClientConfig, GrepClient, Query};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> srccodes::error::Result<()> {
//! let client = GrepClient::from_config(&ClientConfig::default())?;
//! let query = Query::new("fork_and_exec").with_context(2);
//!
//! let outcome = client
//!     .execute(&query, |result| println!("{:?}", result), &CancellationToken::new())
//!     .await?;
//! if outcome.has_more {
//!     // Calling execute again replays these results, then fetches the next page
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod files;
pub mod framer;
pub mod grep;
pub mod models;
pub mod output;
pub mod pagination;
pub mod search;
pub mod transport;

// Re-export commonly used types
pub use config::ClientConfig;
pub use error::{ClientError, LineParseError};
pub use files::{FileMatch, FileSearchClient};
pub use framer::{Footer, LineFramer};
pub use grep::GrepClient;
pub use models::{ContextLine, MatchLine, Position, Query, Range, SearchOutcome, SearchResult, TextSearchOptions};
pub use pagination::{CacheEntry, CachePolicy, ResumeState, SearchCache};
pub use search::ResultReconstructor;
pub use transport::{FetchRequest, HttpTransport, LineTransport};
