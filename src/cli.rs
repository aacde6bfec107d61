//! CLI argument parsing and command handlers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{self, ClientConfig};
use crate::files::FileSearchClient;
use crate::grep::GrepClient;
use crate::models::{SearchResult, TextSearchOptions};
use crate::output;

/// srcx: search the src.codes archive of Ubuntu and Debian sources
#[derive(Parser, Debug)]
#[command(
    name = "srcx",
    version,
    about = "Search the src.codes source package mirror from the terminal",
    long_about = "srcx talks to the src.codes grep and file-search services. Results \
                  stream in as the server produces them; long result sets are paginated \
                  and each page resumes where the previous one stopped."
)]
pub struct Cli {
    /// Enable verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to the configuration file (default: ~/.srccodes/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Full-text search across every package in the distribution
    ///
    /// Examples:
    ///   srcx grep "fork_and_exec"                 # literal, case-insensitive
    ///   srcx grep "^static int \w+_init" --regex  # regex
    ///   srcx grep "EINTR" -C 2 --include "*.c"    # two lines of context
    Grep {
        /// Search pattern
        pattern: String,

        /// Interpret the pattern as a regular expression
        #[arg(short = 'r', long)]
        regex: bool,

        /// Match case exactly
        #[arg(short = 's', long)]
        case_sensitive: bool,

        /// Match whole words only
        #[arg(short, long)]
        word: bool,

        /// Allow matches to span lines
        #[arg(long)]
        multiline: bool,

        /// Only search paths matching this glob (repeatable)
        #[arg(long, value_name = "GLOB")]
        include: Vec<String>,

        /// Skip paths matching this glob (repeatable)
        #[arg(long, value_name = "GLOB")]
        exclude: Vec<String>,

        /// Lines of context around each match
        #[arg(short = 'C', long, default_value_t = 0)]
        context: usize,

        /// Maximum number of pages to fetch
        #[arg(long, default_value_t = 1)]
        pages: usize,

        /// Output one JSON object per result
        #[arg(long)]
        json: bool,

        /// Disable colors
        #[arg(long)]
        plain: bool,
    },

    /// Fuzzy search for files by path
    Files {
        /// Query, e.g. "bash shell.c"
        query: String,

        /// Maximum number of results to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        // Setup logging based on verbosity
        let log_level = match self.verbose {
            0 => "warn",   // Default: only warnings and errors
            1 => "info",   // -v: show info messages
            2 => "debug",  // -vv: show debug messages
            _ => "trace",  // -vvv: show trace messages
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
            .init();

        let config = config::load_config(self.config.as_deref())?;

        match self.command {
            Command::Grep { pattern, regex, case_sensitive, word, multiline, include, exclude, context, pages, json, plain } => {
                let options = TextSearchOptions {
                    pattern,
                    is_regex: regex,
                    is_case_sensitive: case_sensitive,
                    is_multiline: multiline,
                    is_word_match: word,
                    includes: include,
                    excludes: exclude,
                    context_size: context,
                };
                handle_grep(&config, options, pages, json, plain)
            }
            Command::Files { query, limit, json } => {
                handle_files(&config, &query, limit, json)
            }
        }
    }
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, cancelling request");
            token.cancel();
        }
    });
}

/// Handle the `grep` subcommand
fn handle_grep(config: &ClientConfig, options: TextSearchOptions, pages: usize, json: bool, plain: bool) -> Result<()> {
    log::info!("Starting grep command");
    let query = options.into_query();
    let client = GrepClient::from_config(config).context("Failed to create grep client")?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let cancel = CancellationToken::new();
        cancel_on_ctrl_c(cancel.clone());

        let start = Instant::now();
        let mut printed = 0usize;
        let mut incomplete = false;
        let mut has_more = false;

        for page in 0..pages.max(1) {
            // Earlier pages are replayed from the cache first; skip what was printed
            let mut seen = 0usize;
            let on_result = |result: &SearchResult| {
                seen += 1;
                if seen <= printed {
                    return;
                }
                printed += 1;
                if json {
                    match serde_json::to_string(result) {
                        Ok(line) => println!("{}", line),
                        Err(e) => log::error!("Failed to serialize result: {}", e),
                    }
                } else {
                    println!("{}", output::format_result(result, config, plain));
                }
            };

            let outcome = client
                .execute(&query, on_result, &cancel)
                .await
                .with_context(|| format!("Search failed on page {}", page + 1))?;
            incomplete |= outcome.has_errored;
            has_more = outcome.has_more;
            if !has_more {
                break;
            }
        }

        if incomplete {
            output::warn("The server reported errors while searching; results may be incomplete.");
        }
        if !json {
            let elapsed = start.elapsed();
            if has_more {
                output::info(&format!(
                    "Showing {} results in {:.1?}. More are available (use --pages to fetch further).",
                    printed, elapsed
                ));
            } else {
                output::info(&format!("Found {} results in {:.1?}", printed, elapsed));
            }
        }

        Ok::<(), anyhow::Error>(())
    })
}

/// Handle the `files` subcommand
fn handle_files(config: &ClientConfig, query: &str, limit: Option<usize>, json: bool) -> Result<()> {
    log::info!("Starting files command");
    let client = FileSearchClient::from_config(config).context("Failed to create file search client")?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let cancel = CancellationToken::new();
        cancel_on_ctrl_c(cancel.clone());

        let mut matches = client.query(query, &cancel).await.context("File search failed")?;
        if let Some(limit) = limit {
            matches.truncate(limit);
        }

        if json {
            println!("{}", serde_json::to_string(&matches)?);
        } else if matches.is_empty() {
            output::info("No files found");
        } else {
            for file in &matches {
                println!("{}", config.file_uri(&file.path));
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
