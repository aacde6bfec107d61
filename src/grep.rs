//! Full-text search client
//!
//! Ties the pieces together: a `Query` is looked up in the `SearchCache`,
//! stored results are replayed, and the remaining page is streamed through
//! the transport and a fresh `ResultReconstructor`. Every new result goes
//! both to the caller and into the cache entry, so the next execution can
//! replay it exactly.

use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::models::{Query, SearchOutcome, SearchResult};
use crate::pagination::{CacheEntry, ResumeState, SearchCache};
use crate::search::ResultReconstructor;
use crate::transport::{FetchRequest, HttpTransport, LineTransport};

/// Query parameter carrying the resume cursor
pub const RESUME_PARAM: &str = "after";

/// Paginated client for the grep service
pub struct GrepClient<T = HttpTransport> {
    transport: T,
    endpoint: String,
    distribution: String,
    cache: SearchCache,
}

impl GrepClient<HttpTransport> {
    /// Client for the configured grep endpoint
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(
            HttpTransport::new()?,
            config.endpoints.grep.clone(),
            config.distribution.clone(),
            SearchCache::new(config.cache.policy()),
        ))
    }
}

impl<T: LineTransport> GrepClient<T> {
    pub fn new(
        transport: T,
        endpoint: impl Into<String>,
        distribution: impl Into<String>,
        cache: SearchCache,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            distribution: distribution.into(),
            cache,
        }
    }

    pub fn cache(&self) -> &SearchCache {
        &self.cache
    }

    /// Run `query`, reporting every result (cached first, then new) to `on_result`
    ///
    /// Returns once the current page is complete. `has_more` says whether
    /// calling again will fetch another page; `has_errored` whether the
    /// server reported failures, in which case results may be incomplete.
    /// Transport, decode and cancellation errors are returned as-is and
    /// leave the entry marked crashed, so the next call starts over.
    pub async fn execute<F>(
        &self,
        query: &Query,
        mut on_result: F,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome>
    where
        F: FnMut(&SearchResult) + Send,
    {
        let key = query.cache_key();
        let entry = self.cache.entry(&key);
        let mut entry = entry.lock().await;
        let CacheEntry {
            resume,
            has_errored,
            results,
        } = &mut *entry;

        match *resume {
            ResumeState::Crashed => {
                log::info!(
                    "Previous run of {:?} did not finish; discarding {} results and restarting",
                    query.pattern,
                    results.len()
                );
                results.clear();
                *resume = ResumeState::Start;
            }
            _ => {
                if !results.is_empty() {
                    log::info!("Replaying {} cached results for {:?}", results.len(), query.pattern);
                }
                for result in results.iter() {
                    on_result(result);
                }
            }
        }

        let mut request = FetchRequest::new(&self.endpoint, &self.distribution).params(query.to_params());
        match &*resume {
            ResumeState::Exhausted => {
                log::info!("No more results for {:?}; skipping request", query.pattern);
                return Ok(SearchOutcome {
                    has_errored: *has_errored,
                    has_more: false,
                });
            }
            ResumeState::After(cursor) => {
                request = request.param(RESUME_PARAM, cursor.clone());
            }
            ResumeState::Start | ResumeState::Crashed => {}
        }

        // Until the footer says otherwise, this run counts as crashed
        *resume = ResumeState::Crashed;

        let mut reconstructor = ResultReconstructor::new();
        let mut emit = |result: SearchResult| {
            on_result(&result);
            results.push(result);
        };
        let fetched = {
            let mut on_line = |line: String| {
                if !cancel.is_cancelled() {
                    reconstructor.push_line(&line, &mut emit);
                }
            };
            self.transport.fetch(&request, &mut on_line, cancel).await
        };

        let footer = match fetched {
            Ok(_) if cancel.is_cancelled() => {
                log::debug!("Search for {:?} cancelled after the last chunk", query.pattern);
                return Err(ClientError::Cancelled);
            }
            Ok(footer) => footer,
            Err(e) => {
                log::warn!("Search for {:?} failed: {}", query.pattern, e);
                return Err(e);
            }
        };
        reconstructor.finish(&mut emit);

        if reconstructor.skipped_count() > 0 {
            log::warn!(
                "Skipped {} malformed result lines for {:?}",
                reconstructor.skipped_count(),
                query.pattern
            );
        }

        let run_errored = footer.has_errors();
        if run_errored {
            log::warn!("Server reported errors for {:?}; results may be incomplete", query.pattern);
            *has_errored = true;
        }

        let has_more = match footer.resume_cursor() {
            Some(cursor) => {
                *resume = ResumeState::After(cursor.to_string());
                true
            }
            None if footer.is_complete() => {
                *resume = ResumeState::Exhausted;
                false
            }
            None => {
                log::warn!(
                    "Results for {:?} ended before the footer; the next run will restart",
                    query.pattern
                );
                true
            }
        };

        log::debug!(
            "Page for {:?}: {} matches, resume state {:?}",
            query.pattern,
            reconstructor.match_count(),
            resume
        );

        Ok(SearchOutcome {
            has_errored: *has_errored || run_errored,
            has_more,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framer::{Footer, LineFramer};
    use crate::models::Range;
    use crate::pagination::CachePolicy;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    enum Reply {
        Body(&'static str),
        /// Deliver the body's lines, then fail mid-character
        Fail(&'static str),
    }

    /// Plays back canned response bodies and records each request
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Reply>>,
        requests: Mutex<Vec<FetchRequest>>,
        /// Results seen by the caller so far, sampled when each request starts
        seen: Arc<AtomicUsize>,
        seen_at_request: Mutex<Vec<usize>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Reply>, seen: Arc<AtomicUsize>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
                seen,
                seen_at_request: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, i: usize) -> FetchRequest {
            self.requests.lock().unwrap()[i].clone()
        }
    }

    #[async_trait]
    impl LineTransport for ScriptedTransport {
        async fn fetch(
            &self,
            request: &FetchRequest,
            on_line: &mut (dyn FnMut(String) + Send),
            _cancel: &CancellationToken,
        ) -> Result<Footer> {
            self.requests.lock().unwrap().push(request.clone());
            self.seen_at_request
                .lock()
                .unwrap()
                .push(self.seen.load(Ordering::SeqCst));
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected request");

            let mut framer = LineFramer::new();
            match reply {
                Reply::Body(body) => {
                    framer.feed(body.as_bytes(), on_line)?;
                    framer.finish()
                }
                Reply::Fail(body) => {
                    framer.feed(body.as_bytes(), on_line)?;
                    Err(ClientError::Decode("stream ended inside a multi-byte character".to_string()))
                }
            }
        }
    }

    const PAGE_ONE: &str = "a.c 1 0 1 1 3 \"foo\\nbar\"\n\nResume:\tc1\n";
    const PAGE_TWO: &str = "b.c 7 0 0 2 4 \" foo\"\n\n";
    const PAGE_ERRORS: &str = "c.c 1 0 0 1 3 \"foo\"\n\nErrors:\t1\tResume:\tc2\n";
    const TRUNCATED: &str = "a.c 1 0 0 1 3 \"foo\"\n";

    fn client(replies: Vec<Reply>) -> (GrepClient<ScriptedTransport>, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        let transport = ScriptedTransport::new(replies, Arc::clone(&seen));
        let client = GrepClient::new(transport, "https://grep.src.codes", "jammy", SearchCache::unbounded());
        (client, seen)
    }

    async fn collect(
        client: &GrepClient<ScriptedTransport>,
        seen: &Arc<AtomicUsize>,
        query: &Query,
    ) -> (Result<SearchOutcome>, Vec<SearchResult>) {
        let mut results = Vec::new();
        let outcome = client
            .execute(
                query,
                |r| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    results.push(r.clone());
                },
                &CancellationToken::new(),
            )
            .await;
        (outcome, results)
    }

    fn has_param(request: &FetchRequest, key: &str, value: &str) -> bool {
        request.params.iter().any(|(k, v)| k == key && v == value)
    }

    #[tokio::test]
    async fn test_first_page() {
        let (client, seen) = client(vec![Reply::Body(PAGE_ONE)]);
        let query = Query::new("foo").with_context(1);

        let (outcome, results) = collect(&client, &seen, &query).await;
        assert_eq!(
            outcome.unwrap(),
            SearchOutcome {
                has_errored: false,
                has_more: true
            }
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_match().unwrap().range, Range::new(0, 0, 0, 2));
        assert_eq!(results[1].as_context().unwrap().line_number, 1);

        let request = client.transport.request(0);
        assert_eq!(request.base, "https://grep.src.codes");
        assert_eq!(request.path, "jammy");
        assert!(has_param(&request, "q", "foo"));
        assert!(has_param(&request, "context", "1"));
        assert!(!request.params.iter().any(|(k, _)| k == RESUME_PARAM));

        let entry = client.cache().peek(&query.cache_key()).unwrap();
        let entry = entry.lock().await;
        assert_eq!(entry.resume, ResumeState::After("c1".to_string()));
        assert_eq!(entry.results, results);
    }

    #[tokio::test]
    async fn test_replay_then_resume() {
        let (client, seen) = client(vec![Reply::Body(PAGE_ONE), Reply::Body(PAGE_TWO)]);
        let query = Query::new("foo").with_context(1);

        let (_, first) = collect(&client, &seen, &query).await;
        let (outcome, second) = collect(&client, &seen, &query).await;

        // Replayed results come first, identical, before the request goes out
        assert_eq!(&second[..first.len()], &first[..]);
        assert_eq!(*client.transport.seen_at_request.lock().unwrap(), vec![0, 4]);
        assert!(has_param(&client.transport.request(1), RESUME_PARAM, "c1"));

        assert_eq!(second.len(), 3);
        assert_eq!(second[2].path(), "b.c");
        assert_eq!(
            outcome.unwrap(),
            SearchOutcome {
                has_errored: false,
                has_more: false
            }
        );
    }

    #[tokio::test]
    async fn test_exhausted_query_makes_no_request() {
        let (client, seen) = client(vec![Reply::Body(PAGE_TWO)]);
        let query = Query::new("foo");

        collect(&client, &seen, &query).await.0.unwrap();
        assert_eq!(client.transport.request_count(), 1);

        let (outcome, replayed) = collect(&client, &seen, &query).await;
        assert_eq!(client.transport.request_count(), 1);
        assert!(!outcome.unwrap().has_more);
        assert_eq!(replayed.len(), 1);
    }

    #[tokio::test]
    async fn test_truncated_stream_restarts() {
        let (client, seen) = client(vec![Reply::Body(TRUNCATED), Reply::Body(PAGE_TWO)]);
        let query = Query::new("foo");

        let (outcome, first) = collect(&client, &seen, &query).await;
        assert!(outcome.unwrap().has_more);
        assert_eq!(first.len(), 1);

        let (outcome, second) = collect(&client, &seen, &query).await;
        assert!(!outcome.unwrap().has_more);
        // Crashed results are dropped, not replayed
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].path(), "b.c");
        assert!(!client.transport.request(1).params.iter().any(|(k, _)| k == RESUME_PARAM));

        let entry = client.cache().peek(&query.cache_key()).unwrap();
        assert_eq!(entry.lock().await.results, second);
    }

    #[tokio::test]
    async fn test_transport_failure_marks_crashed() {
        let (client, seen) = client(vec![Reply::Fail(TRUNCATED), Reply::Body(PAGE_TWO)]);
        let query = Query::new("foo");

        let (outcome, partial) = collect(&client, &seen, &query).await;
        assert!(matches!(outcome, Err(ClientError::Decode(_))));
        assert_eq!(partial.len(), 1);
        {
            let entry = client.cache().peek(&query.cache_key()).unwrap();
            assert_eq!(entry.lock().await.resume, ResumeState::Crashed);
        }

        let (outcome, results) = collect(&client, &seen, &query).await;
        assert!(outcome.is_ok());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].path(), "b.c");
    }

    #[tokio::test]
    async fn test_cancel_mid_chunk_stops_results() {
        let body = "a.c 1 0 0 1 3 \"foo\"\na.c 2 0 0 1 3 \"foo\"\n\nResume:\tc1\n";
        let (client, _) = client(vec![Reply::Body(body)]);
        let query = Query::new("foo");
        let cancel = CancellationToken::new();

        let mut results = Vec::new();
        let outcome = client
            .execute(
                &query,
                |r| {
                    results.push(r.clone());
                    cancel.cancel();
                },
                &cancel,
            )
            .await;

        assert!(matches!(outcome, Err(ClientError::Cancelled)));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_match().unwrap().range, Range::new(0, 0, 0, 2));

        let entry = client.cache().peek(&query.cache_key()).unwrap();
        assert_eq!(entry.lock().await.resume, ResumeState::Crashed);
    }

    #[tokio::test]
    async fn test_server_errors_are_sticky() {
        let (client, seen) = client(vec![Reply::Body(PAGE_ERRORS), Reply::Body(PAGE_TWO)]);
        let query = Query::new("foo");

        let (outcome, results) = collect(&client, &seen, &query).await;
        let outcome = outcome.unwrap();
        assert!(outcome.has_errored);
        assert!(outcome.has_more);
        assert_eq!(results.len(), 1);

        let (outcome, _) = collect(&client, &seen, &query).await;
        let outcome = outcome.unwrap();
        assert!(outcome.has_errored);
        assert!(!outcome.has_more);
        assert!(has_param(&client.transport.request(1), RESUME_PARAM, "c2"));
    }

    #[tokio::test]
    async fn test_distinct_queries_do_not_share_pages() {
        let (client, seen) = client(vec![Reply::Body(PAGE_ONE), Reply::Body(PAGE_TWO)]);

        collect(&client, &seen, &Query::new("foo")).await.0.unwrap();
        let (_, results) = collect(&client, &seen, &Query::new("foo").with_flags("i")).await;

        assert_eq!(results.len(), 1);
        assert!(!client.transport.request(1).params.iter().any(|(k, _)| k == RESUME_PARAM));
        assert_eq!(client.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_runs_of_one_query_are_serialized() {
        let (client, _) = client(vec![Reply::Body(PAGE_ONE), Reply::Body(PAGE_TWO)]);
        let query = Query::new("foo").with_context(1);
        let cancel = CancellationToken::new();

        let (a, b) = tokio::join!(
            client.execute(&query, |_| {}, &cancel),
            client.execute(&query, |_| {}, &cancel),
        );
        a.unwrap();
        b.unwrap();

        // Whichever ran second resumed from the first one's cursor
        assert!(has_param(&client.transport.request(1), RESUME_PARAM, "c1"));
    }

    #[tokio::test]
    async fn test_evicted_query_starts_over() {
        let seen = Arc::new(AtomicUsize::new(0));
        let transport = ScriptedTransport::new(
            vec![Reply::Body(PAGE_ONE), Reply::Body(PAGE_TWO), Reply::Body(PAGE_ONE)],
            Arc::clone(&seen),
        );
        let cache = SearchCache::new(CachePolicy::Lru(NonZeroUsize::new(1).unwrap()));
        let client = GrepClient::new(transport, "https://grep.src.codes", "jammy", cache);

        collect(&client, &seen, &Query::new("foo")).await.0.unwrap();
        collect(&client, &seen, &Query::new("bar")).await.0.unwrap();
        let (_, results) = collect(&client, &seen, &Query::new("foo")).await;

        assert_eq!(results.len(), 2);
        assert!(!client.transport.request(2).params.iter().any(|(k, _)| k == RESUME_PARAM));
    }
}
