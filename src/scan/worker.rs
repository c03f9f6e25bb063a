//! Scan worker owning one session and one local result.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::MessageError;
use crate::scan::extract::{Extraction, LinkExtractor};
use crate::scan::progress::ProgressSink;
use crate::scan::session::MailSession;
use crate::scan::types::{LocalResult, MessageId};

/// Processes its assigned ids sequentially over a dedicated session.
pub struct ScanWorker<S> {
    index: usize,
    session: S,
    extractor: LinkExtractor,
    progress: Arc<dyn ProgressSink>,
}

/// What a worker hands back when its ids are exhausted.
pub struct WorkerOutput<S> {
    pub index: usize,
    /// Returned so the orchestrator can tear it down after aggregation.
    pub session: S,
    pub local: LocalResult,
    /// Messages that failed to fetch or parse.
    pub failures: usize,
}

impl<S: MailSession> ScanWorker<S> {
    pub fn new(
        index: usize,
        session: S,
        extractor: LinkExtractor,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            index,
            session,
            extractor,
            progress,
        }
    }

    /// Fetch and extract every id in order. Per-message failures are absorbed;
    /// each id advances progress exactly once.
    pub fn run(mut self, ids: &[MessageId]) -> WorkerOutput<S> {
        let mut local = LocalResult::new();
        let mut failures = 0;

        for id in ids {
            match self.process(id) {
                Ok(Extraction {
                    links,
                    sender: Some(sender),
                }) => local.record(sender, links),
                Ok(_) => debug!(worker = self.index, id = %id, "No sender, message skipped"),
                Err(e) => {
                    failures += 1;
                    debug!(worker = self.index, error = %e, "Message skipped");
                }
            }
            self.progress.advance(1);
        }

        info!(
            worker = self.index,
            processed = ids.len(),
            senders = local.len(),
            failures,
            "Worker finished"
        );

        WorkerOutput {
            index: self.index,
            session: self.session,
            local,
            failures,
        }
    }

    fn process(&mut self, id: &MessageId) -> Result<Extraction, MessageError> {
        let raw = self
            .session
            .fetch(id)
            .map_err(|source| MessageError::FetchFailed {
                id: id.clone(),
                source,
            })?;
        self.extractor
            .try_extract(&raw)
            .map_err(|source| MessageError::ExtractionFailed {
                id: id.clone(),
                source,
            })
    }
}
