//! Pipeline orchestrator: sessions → discovery → partition → workers → aggregate.
//!
//! Each worker owns one session and one local result, so nothing on the hot
//! path is shared except the progress sink. Blocking protocol I/O runs on
//! `spawn_blocking` threads.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::scan::aggregate::aggregate;
use crate::scan::discovery::discover;
use crate::scan::extract::{DEFAULT_KEYWORD, LinkExtractor};
use crate::scan::partition::stride_partition;
use crate::scan::progress::{NoProgress, ProgressSink};
use crate::scan::session::{SearchQuery, SessionFactory, SessionPool};
use crate::scan::types::GlobalResult;
use crate::scan::worker::ScanWorker;

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Init,
    SessionsEstablished,
    Discovered,
    Dispatched,
    Aggregated,
    Done,
    Failed,
}

impl PipelineState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, target),
            (Init, SessionsEstablished)
                | (SessionsEstablished, Discovered)
                | (Discovered, Dispatched)
                | (Dispatched, Aggregated)
                | (Aggregated, Done)
                | (Init, Failed)
                | (SessionsEstablished, Failed)
                | (Discovered, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::SessionsEstablished => "sessions_established",
            Self::Discovered => "discovered",
            Self::Dispatched => "dispatched",
            Self::Aggregated => "aggregated",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Tunables for a pipeline run.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Number of workers, and therefore sessions. At least 1.
    pub workers: usize,
    /// Discovery query.
    pub query: SearchQuery,
    /// Anchor-text keyword for body links.
    pub keyword: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: 10,
            query: SearchQuery::body_contains(DEFAULT_KEYWORD),
            keyword: DEFAULT_KEYWORD.to_string(),
        }
    }
}

/// Runs one scan end to end.
pub struct ScanPipeline<F> {
    factory: Arc<F>,
    options: ScanOptions,
    progress: Arc<dyn ProgressSink>,
    state: PipelineState,
}

impl<F> ScanPipeline<F>
where
    F: SessionFactory + 'static,
{
    pub fn new(factory: Arc<F>, options: ScanOptions) -> Self {
        Self {
            factory,
            options,
            progress: Arc::new(NoProgress),
            state: PipelineState::Init,
        }
    }

    /// Report per-message progress to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run the pipeline. Returns the complete result or the first fatal error.
    ///
    /// Every call is a fresh scan over new sessions, so a finished pipeline
    /// can be run again.
    pub async fn run(&mut self) -> Result<GlobalResult> {
        if self.state != PipelineState::Init {
            debug!(previous = %self.state, "Restarting pipeline");
            self.state = PipelineState::Init;
        }
        match self.execute().await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(phase = e.phase(), error = %e, "Scan pipeline failed");
                self.transition(PipelineState::Failed);
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<GlobalResult> {
        let workers = self.options.workers.max(1);

        let factory = Arc::clone(&self.factory);
        let pool =
            run_blocking(move || SessionPool::<F::Session>::establish(&*factory, workers)).await?;
        self.transition(PipelineState::SessionsEstablished);

        let query = self.options.query.clone();
        let (pool, discovered) = run_blocking(move || {
            let mut pool = pool;
            let discovered = match pool.first_mut() {
                Some(session) => discover(session, &query),
                None => Ok(Vec::new()),
            };
            (pool, discovered)
        })
        .await;
        // On failure the pool is dropped here and no worker starts.
        let ids = discovered?;
        self.transition(PipelineState::Discovered);

        self.progress.set_total(ids.len());
        let parts = stride_partition(&ids, pool.len());
        let handles: Vec<_> = pool
            .into_sessions()
            .into_iter()
            .zip(parts)
            .enumerate()
            .map(|(index, (session, part))| {
                debug!(worker = index, ids = part.len(), "Dispatching worker");
                let worker = ScanWorker::new(
                    index,
                    session,
                    LinkExtractor::new(self.options.keyword.clone()),
                    Arc::clone(&self.progress),
                );
                tokio::task::spawn_blocking(move || worker.run(&part))
            })
            .collect();
        self.transition(PipelineState::Dispatched);

        let mut sessions = Vec::with_capacity(handles.len());
        let mut locals = Vec::with_capacity(handles.len());
        let mut failures = 0;
        for joined in join_all(handles).await {
            let output = match joined {
                Ok(output) => output,
                // Blocking tasks are never aborted, so a join error is a panic.
                Err(e) => std::panic::resume_unwind(e.into_panic()),
            };
            failures += output.failures;
            sessions.push(output.session);
            locals.push(output.local);
        }

        let result = aggregate(locals);
        self.transition(PipelineState::Aggregated);
        info!(
            messages = ids.len(),
            senders = result.len(),
            targets = result.target_count(),
            failures,
            "Scan aggregated"
        );

        run_blocking(move || SessionPool::from_sessions(sessions).shutdown()).await;
        self.transition(PipelineState::Done);
        Ok(result)
    }

    fn transition(&mut self, target: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(target),
            "invalid pipeline transition {} -> {}",
            self.state,
            target
        );
        debug!(from = %self.state, to = %target, "Pipeline transition");
        self.state = target;
    }
}

async fn run_blocking<T, Func>(f: Func) -> T
where
    T: Send + 'static,
    Func: FnOnce() -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::{CommandStatus, SessionError};
    use crate::scan::progress::ProgressCounter;
    use crate::scan::session::MailSession;
    use crate::scan::types::{MessageId, RawMessage};

    #[derive(Default)]
    struct Mailbox {
        messages: Vec<(String, Vec<u8>)>,
        reject_search: bool,
        fetches: AtomicUsize,
        logouts: AtomicUsize,
        fetched_by: Mutex<HashMap<String, usize>>,
    }

    struct FakeSession {
        index: usize,
        mailbox: Arc<Mailbox>,
    }

    impl MailSession for FakeSession {
        fn search(&mut self, _query: &SearchQuery) -> std::result::Result<Vec<MessageId>, SessionError> {
            if self.mailbox.reject_search {
                return Err(SessionError::Rejected {
                    command: "SEARCH".into(),
                    status: CommandStatus::No,
                    text: "nope".into(),
                });
            }
            Ok(self.mailbox.messages.iter().map(|(id, _)| MessageId::new(id.clone())).collect())
        }

        fn fetch(&mut self, id: &MessageId) -> std::result::Result<RawMessage, SessionError> {
            self.mailbox.fetches.fetch_add(1, Ordering::SeqCst);
            self.mailbox
                .fetched_by
                .lock()
                .unwrap()
                .insert(id.to_string(), self.index);
            self.mailbox
                .messages
                .iter()
                .find(|(m, _)| m == id.as_str())
                .map(|(_, raw)| RawMessage::new(raw.clone()))
                .ok_or(SessionError::Closed)
        }

        fn logout(&mut self) -> std::result::Result<(), SessionError> {
            self.mailbox.logouts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeFactory {
        mailbox: Arc<Mailbox>,
        fail_at: Option<usize>,
    }

    impl SessionFactory for FakeFactory {
        type Session = FakeSession;

        fn open(&self, index: usize) -> std::result::Result<FakeSession, SessionError> {
            if self.fail_at == Some(index) {
                return Err(SessionError::AuthFailed("throttled".into()));
            }
            Ok(FakeSession {
                index,
                mailbox: Arc::clone(&self.mailbox),
            })
        }
    }

    fn msg(from: &str, link: &str) -> Vec<u8> {
        format!("From: {from}\r\nList-Unsubscribe: <{link}>\r\n\r\nbody\r\n").into_bytes()
    }

    fn options(workers: usize) -> ScanOptions {
        ScanOptions {
            workers,
            ..ScanOptions::default()
        }
    }

    #[test]
    fn transitions_follow_lifecycle() {
        use PipelineState::*;
        assert!(Init.can_transition_to(SessionsEstablished));
        assert!(Dispatched.can_transition_to(Aggregated));
        assert!(Discovered.can_transition_to(Failed));
        assert!(!Init.can_transition_to(Discovered));
        assert!(!Dispatched.can_transition_to(Failed));
        assert!(!Done.can_transition_to(Failed));
        assert!(Done.is_terminal() && Failed.is_terminal());
    }

    #[tokio::test]
    async fn merges_sender_across_workers() {
        let mailbox = Arc::new(Mailbox {
            messages: vec![
                ("1".into(), msg("a@x.com", "http://x.com/u1")),
                ("2".into(), msg("a@x.com", "http://x.com/u2")),
            ],
            ..Mailbox::default()
        });
        let factory = Arc::new(FakeFactory {
            mailbox: Arc::clone(&mailbox),
            fail_at: None,
        });
        let progress = Arc::new(ProgressCounter::new());
        let mut pipeline = ScanPipeline::new(factory, options(2)).with_progress(progress.clone());

        let result = pipeline.run().await.unwrap();

        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(result.len(), 1);
        assert_eq!(result.get("a@x.com").map(|s| s.len()), Some(2));
        assert_eq!(progress.snapshot(), (2, 2));
        assert_eq!(mailbox.logouts.load(Ordering::SeqCst), 2);

        let fetched_by = mailbox.fetched_by.lock().unwrap();
        assert_ne!(fetched_by.get("1"), fetched_by.get("2"));
    }

    #[tokio::test]
    async fn pipeline_can_run_again() {
        let mailbox = Arc::new(Mailbox {
            messages: vec![
                ("1".into(), msg("a@x.com", "http://x.com/u1")),
                ("2".into(), msg("b@y.com", "http://y.com/u2")),
                ("3".into(), msg("a@x.com", "http://x.com/u3")),
            ],
            ..Mailbox::default()
        });
        let factory = Arc::new(FakeFactory {
            mailbox: Arc::clone(&mailbox),
            fail_at: None,
        });
        let progress = Arc::new(ProgressCounter::new());
        let mut pipeline = ScanPipeline::new(factory, options(2)).with_progress(progress.clone());

        let first = pipeline.run().await.unwrap();
        let second = pipeline.run().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(progress.snapshot(), (3, 3));
        assert_eq!(mailbox.fetches.load(Ordering::SeqCst), 6);
        assert_eq!(mailbox.logouts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn failed_pipeline_can_run_again() {
        let mailbox = Arc::new(Mailbox::default());
        let failing = Arc::new(FakeFactory {
            mailbox: Arc::clone(&mailbox),
            fail_at: Some(0),
        });
        let mut pipeline = ScanPipeline::new(failing, options(1));
        assert!(pipeline.run().await.is_err());
        assert_eq!(pipeline.state(), PipelineState::Failed);

        pipeline.factory = Arc::new(FakeFactory {
            mailbox,
            fail_at: None,
        });
        assert!(pipeline.run().await.unwrap().is_empty());
        assert_eq!(pipeline.state(), PipelineState::Done);
    }

    #[tokio::test]
    async fn search_failure_aborts_before_dispatch() {
        let mailbox = Arc::new(Mailbox {
            messages: vec![("1".into(), msg("a@x.com", "http://x.com/u1"))],
            reject_search: true,
            ..Mailbox::default()
        });
        let factory = Arc::new(FakeFactory {
            mailbox: Arc::clone(&mailbox),
            fail_at: None,
        });
        let mut pipeline = ScanPipeline::new(factory, options(3));

        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(err, Error::SearchFailed { .. }));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert_eq!(mailbox.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn session_failure_aborts_before_discovery() {
        let mailbox = Arc::new(Mailbox::default());
        let factory = Arc::new(FakeFactory {
            mailbox,
            fail_at: Some(1),
        });
        let mut pipeline = ScanPipeline::new(factory, options(4));

        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(err, Error::SessionEstablish { index: 1, .. }));
        assert_eq!(err.phase(), "session_establish");
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }
}
