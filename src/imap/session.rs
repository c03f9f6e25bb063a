//! Blocking IMAP session over TLS, and the factory that opens them.

use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::{Credentials, ScanConfig};
use crate::error::{CommandStatus, SessionError};
use crate::imap::connection::{ImapConnection, TaggedResponse, parse_search, quote};
use crate::scan::session::{MailSession, SearchQuery, SessionFactory};
use crate::scan::types::{MessageId, RawMessage};

/// TLS stream used for real connections.
pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// IMAP session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImapState {
    NotAuthenticated,
    Authenticated,
    Selected,
    LoggedOut,
}

/// One IMAP connection driven through its session states.
pub struct ImapSession<S = TlsStream> {
    conn: ImapConnection<S>,
    state: ImapState,
    /// Set after an I/O failure; the stream position is no longer trustworthy.
    broken: bool,
}

impl ImapSession<TlsStream> {
    /// Open a TLS connection and read the greeting.
    ///
    /// `timeout` bounds every socket read and write, which makes it the
    /// per-fetch timeout as well.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, SessionError> {
        let tcp = TcpStream::connect((host, port))?;
        tcp.set_read_timeout(Some(timeout))?;
        tcp.set_write_timeout(Some(timeout))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
            .map_err(|e| SessionError::Tls(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| SessionError::Tls(e.to_string()))?;

        Self::from_stream(rustls::StreamOwned::new(conn, tcp))
    }
}

impl<S: std::io::Read + std::io::Write> ImapSession<S> {
    /// Wrap an established stream and consume the greeting.
    pub fn from_stream(stream: S) -> Result<Self, SessionError> {
        let mut conn = ImapConnection::new(stream);
        let greeting = conn.read_greeting()?;
        let state = if greeting.starts_with("* PREAUTH") {
            ImapState::Authenticated
        } else {
            ImapState::NotAuthenticated
        };
        Ok(Self {
            conn,
            state,
            broken: false,
        })
    }

    pub fn state(&self) -> ImapState {
        self.state
    }

    pub fn login(&mut self, credentials: &Credentials) -> Result<(), SessionError> {
        if self.state != ImapState::NotAuthenticated {
            return Ok(());
        }
        let command = format!(
            "LOGIN {} {}",
            quote(&credentials.user),
            quote(credentials.password.expose_secret())
        );
        let resp = self.run(&command)?;
        if !resp.is_ok() {
            return Err(SessionError::AuthFailed(resp.text));
        }
        self.state = ImapState::Authenticated;
        Ok(())
    }

    pub fn select(&mut self, mailbox: &str) -> Result<(), SessionError> {
        if !matches!(self.state, ImapState::Authenticated | ImapState::Selected) {
            return Err(SessionError::Rejected {
                command: "SELECT".into(),
                status: CommandStatus::Bad,
                text: "not authenticated".into(),
            });
        }
        let resp = self.run(&format!("SELECT {}", quote(mailbox)))?;
        expect_ok("SELECT", &resp)?;
        self.state = ImapState::Selected;
        Ok(())
    }

    fn run(&mut self, command: &str) -> Result<TaggedResponse, SessionError> {
        if self.broken || self.state == ImapState::LoggedOut {
            return Err(SessionError::Closed);
        }
        self.conn.command(command).inspect_err(|e| {
            if !matches!(e, SessionError::Rejected { .. }) {
                self.broken = true;
            }
        })
    }

    fn require_selected(&self) -> Result<(), SessionError> {
        if self.state == ImapState::Selected {
            Ok(())
        } else {
            Err(SessionError::NotSelected)
        }
    }
}

fn expect_ok(command: &str, resp: &TaggedResponse) -> Result<(), SessionError> {
    match resp.status {
        Some(CommandStatus::Ok) => Ok(()),
        Some(status) => Err(SessionError::Rejected {
            command: command.to_string(),
            status,
            text: resp.text.clone(),
        }),
        None => Err(SessionError::Malformed(format!("{command} returned no status"))),
    }
}

impl<S: std::io::Read + std::io::Write + Send> MailSession for ImapSession<S> {
    fn search(&mut self, query: &SearchQuery) -> Result<Vec<MessageId>, SessionError> {
        self.require_selected()?;
        let command = match query {
            SearchQuery::BodyContains(term) => format!("SEARCH BODY {}", quote(term)),
        };
        let resp = self.run(&command)?;
        expect_ok("SEARCH", &resp)?;
        Ok(parse_search(&resp.untagged))
    }

    fn fetch(&mut self, id: &MessageId) -> Result<RawMessage, SessionError> {
        self.require_selected()?;
        if id.as_str().is_empty() || !id.as_str().bytes().all(|b| b.is_ascii_digit()) {
            return Err(SessionError::Malformed(format!("invalid message number: {id}")));
        }
        let resp = self.run(&format!("FETCH {id} (RFC822)"))?;
        expect_ok("FETCH", &resp)?;
        resp.literals
            .into_iter()
            .next()
            .map(RawMessage::new)
            .ok_or_else(|| SessionError::Malformed(format!("FETCH {id} returned no body")))
    }

    fn logout(&mut self) -> Result<(), SessionError> {
        if self.state == ImapState::LoggedOut {
            return Ok(());
        }
        let result = self.run("LOGOUT").map(|_| ());
        self.state = ImapState::LoggedOut;
        result
    }
}

/// Opens authenticated, mailbox-selected IMAP sessions.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    host: String,
    port: u16,
    mailbox: String,
    credentials: Credentials,
    timeout: Duration,
}

impl ImapConnector {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        mailbox: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            mailbox: mailbox.into(),
            credentials,
            timeout,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(
            config.imap_host.clone(),
            config.imap_port,
            config.mailbox.clone(),
            config.credentials.clone(),
            config.fetch_timeout,
        )
    }
}

impl SessionFactory for ImapConnector {
    type Session = ImapSession<TlsStream>;

    fn open(&self, index: usize) -> Result<Self::Session, SessionError> {
        debug!(session = index, host = %self.host, "Connecting");
        let mut session = ImapSession::connect(&self.host, self.port, self.timeout)?;
        session.login(&self.credentials)?;
        session.select(&self.mailbox)?;
        Ok(session)
    }
}
