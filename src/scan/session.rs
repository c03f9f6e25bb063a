//! Mailbox session seam and the fixed-size session pool.

use tracing::{debug, info};

use crate::error::{Error, SessionError};
use crate::scan::types::{MessageId, RawMessage};

/// Search criteria understood by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// Messages whose body contains the literal term.
    BodyContains(String),
}

impl SearchQuery {
    pub fn body_contains(term: impl Into<String>) -> Self {
        Self::BodyContains(term.into())
    }
}

/// One authenticated, mailbox-selected connection.
///
/// Calls block on network I/O; the pipeline drives sessions from blocking
/// threads and never shares one between workers.
pub trait MailSession: Send {
    /// Ids of messages matching `query`, in server order.
    fn search(&mut self, query: &SearchQuery) -> Result<Vec<MessageId>, SessionError>;

    /// Full message (headers and body) for `id`.
    fn fetch(&mut self, id: &MessageId) -> Result<RawMessage, SessionError>;

    /// End the session. Best effort.
    fn logout(&mut self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Opens independently authenticated sessions against the same mailbox.
pub trait SessionFactory: Send + Sync {
    type Session: MailSession + 'static;

    /// Open session number `index` (0-based).
    fn open(&self, index: usize) -> Result<Self::Session, SessionError>;
}

/// Fixed collection of sessions, one per worker.
pub struct SessionPool<S> {
    sessions: Vec<S>,
}

impl<S: MailSession> SessionPool<S> {
    /// Open `size` sessions in order. Any failure aborts the whole pool;
    /// sessions already opened are dropped.
    pub fn establish<F>(factory: &F, size: usize) -> Result<Self, Error>
    where
        F: SessionFactory<Session = S> + ?Sized,
    {
        let mut sessions = Vec::with_capacity(size);
        for index in 0..size {
            let session = factory
                .open(index)
                .map_err(|source| Error::SessionEstablish { index, source })?;
            debug!(session = index, "Session established");
            sessions.push(session);
        }
        info!(sessions = size, "Session pool ready");
        Ok(Self { sessions })
    }

    pub fn from_sessions(sessions: Vec<S>) -> Self {
        Self { sessions }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Session used for discovery.
    pub fn first_mut(&mut self) -> Option<&mut S> {
        self.sessions.first_mut()
    }

    /// Hand every session out, one per worker.
    pub fn into_sessions(self) -> Vec<S> {
        self.sessions
    }

    /// Log out of every session, ignoring failures.
    pub fn shutdown(self) {
        for (index, mut session) in self.sessions.into_iter().enumerate() {
            if let Err(e) = session.logout() {
                debug!(session = index, error = %e, "Logout failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct NullSession;

    impl MailSession for NullSession {
        fn search(&mut self, _query: &SearchQuery) -> Result<Vec<MessageId>, SessionError> {
            Ok(Vec::new())
        }

        fn fetch(&mut self, _id: &MessageId) -> Result<RawMessage, SessionError> {
            Err(SessionError::Closed)
        }
    }

    struct CountingFactory {
        fail_at: Option<usize>,
        opened: AtomicUsize,
    }

    impl SessionFactory for CountingFactory {
        type Session = NullSession;

        fn open(&self, index: usize) -> Result<NullSession, SessionError> {
            if self.fail_at == Some(index) {
                return Err(SessionError::AuthFailed("too many connections".into()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(NullSession)
        }
    }

    #[test]
    fn establishes_requested_size() {
        let factory = CountingFactory {
            fail_at: None,
            opened: AtomicUsize::new(0),
        };
        let pool = SessionPool::establish(&factory, 4).unwrap();
        assert_eq!(pool.len(), 4);
        assert_eq!(factory.opened.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn any_failure_aborts_with_index() {
        let factory = CountingFactory {
            fail_at: Some(2),
            opened: AtomicUsize::new(0),
        };
        let err = SessionPool::establish(&factory, 4).err().unwrap();
        assert!(matches!(err, Error::SessionEstablish { index: 2, .. }));
        assert_eq!(factory.opened.load(Ordering::SeqCst), 2);
    }

    struct LogoutSession<'a> {
        logouts: &'a AtomicUsize,
        fail: bool,
    }

    impl MailSession for LogoutSession<'_> {
        fn search(&mut self, _query: &SearchQuery) -> Result<Vec<MessageId>, SessionError> {
            Ok(Vec::new())
        }

        fn fetch(&mut self, _id: &MessageId) -> Result<RawMessage, SessionError> {
            Err(SessionError::Closed)
        }

        fn logout(&mut self) -> Result<(), SessionError> {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SessionError::Closed)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn shutdown_logs_out_every_session_despite_failures() {
        let logouts = AtomicUsize::new(0);
        let sessions = [true, false, true]
            .into_iter()
            .map(|fail| LogoutSession {
                logouts: &logouts,
                fail,
            })
            .collect();

        SessionPool::from_sessions(sessions).shutdown();

        assert_eq!(logouts.load(Ordering::SeqCst), 3);
    }
}
