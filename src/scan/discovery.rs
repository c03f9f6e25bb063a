//! Discovery: find every message that might carry an unsubscribe link.

use tracing::info;

use crate::error::{Error, SessionError};
use crate::scan::session::{MailSession, SearchQuery};
use crate::scan::types::MessageId;

/// Run `query` on `session` and return the matching ids in server order.
///
/// A non-success search status is [`Error::SearchFailed`]; any other session
/// failure (not selected, I/O, malformed reply) is [`Error::Protocol`].
pub fn discover<S>(session: &mut S, query: &SearchQuery) -> Result<Vec<MessageId>, Error>
where
    S: MailSession + ?Sized,
{
    let ids = session.search(query).map_err(|e| match e {
        SessionError::Rejected { status, text, .. } => Error::SearchFailed {
            status: status.to_string(),
            reason: text,
        },
        other => Error::Protocol(other),
    })?;

    info!(matches = ids.len(), "Discovered candidate messages");
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommandStatus;
    use crate::scan::types::RawMessage;

    struct ScriptedSearch(Option<Result<Vec<MessageId>, SessionError>>);

    impl MailSession for ScriptedSearch {
        fn search(&mut self, _query: &SearchQuery) -> Result<Vec<MessageId>, SessionError> {
            self.0.take().unwrap_or(Err(SessionError::Closed))
        }

        fn fetch(&mut self, _id: &MessageId) -> Result<RawMessage, SessionError> {
            Err(SessionError::Closed)
        }
    }

    #[test]
    fn returns_ids_in_server_order() {
        let mut session = ScriptedSearch(Some(Ok(vec!["3".into(), "1".into(), "2".into()])));
        let ids = discover(&mut session, &SearchQuery::body_contains("unsubscribe")).unwrap();
        let ids: Vec<&str> = ids.iter().map(MessageId::as_str).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn rejected_status_is_search_failed() {
        let mut session = ScriptedSearch(Some(Err(SessionError::Rejected {
            command: "SEARCH".into(),
            status: CommandStatus::No,
            text: "server busy".into(),
        })));
        let err = discover(&mut session, &SearchQuery::body_contains("unsubscribe")).unwrap_err();
        match err {
            Error::SearchFailed { status, reason } => {
                assert_eq!(status, "NO");
                assert_eq!(reason, "server busy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unselected_session_is_protocol_error() {
        let mut session = ScriptedSearch(Some(Err(SessionError::NotSelected)));
        let err = discover(&mut session, &SearchQuery::body_contains("unsubscribe")).unwrap_err();
        assert!(matches!(err, Error::Protocol(SessionError::NotSelected)));
    }
}
