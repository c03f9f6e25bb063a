//! IMAP wire handling for tagged commands, responses and string literals.

use std::io::{BufRead, BufReader, Read, Write};

use crate::error::{CommandStatus, SessionError};
use crate::scan::types::MessageId;

/// Largest literal accepted from the server.
const MAX_LITERAL_BYTES: usize = 64 * 1024 * 1024;

/// Up-front allocation for a literal; larger ones grow as data arrives.
const LITERAL_CHUNK_BYTES: usize = 64 * 1024;

/// Everything the server sent in reply to one tagged command.
#[derive(Debug, Clone, Default)]
pub struct TaggedResponse {
    pub status: Option<CommandStatus>,
    /// Text after the status on the tagged line.
    pub text: String,
    /// Untagged (`* ...`) lines, without their literals.
    pub untagged: Vec<String>,
    /// String literals (`{n}`) in the order received.
    pub literals: Vec<Vec<u8>>,
}

impl TaggedResponse {
    pub fn is_ok(&self) -> bool {
        self.status == Some(CommandStatus::Ok)
    }
}

/// Line-oriented IMAP client connection over any byte stream.
pub struct ImapConnection<S> {
    reader: BufReader<S>,
    tag_counter: u32,
}

impl<S: Read + Write> ImapConnection<S> {
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::new(stream),
            tag_counter: 0,
        }
    }

    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Read the server greeting. `* BYE` is a rejection.
    pub fn read_greeting(&mut self) -> Result<String, SessionError> {
        let line = lossy(&self.read_line()?);
        if line.starts_with("* OK") || line.starts_with("* PREAUTH") {
            Ok(line)
        } else if let Some(text) = line.strip_prefix("* BYE") {
            Err(SessionError::Rejected {
                command: "GREETING".into(),
                status: CommandStatus::No,
                text: text.trim().to_string(),
            })
        } else {
            Err(SessionError::Malformed(format!("unexpected greeting: {line}")))
        }
    }

    /// Send `command` with a fresh tag and collect the full response.
    pub fn command(&mut self, command: &str) -> Result<TaggedResponse, SessionError> {
        self.tag_counter += 1;
        let tag = format!("A{:04}", self.tag_counter);

        let stream = self.reader.get_mut();
        stream.write_all(format!("{tag} {command}\r\n").as_bytes())?;
        stream.flush()?;

        let mut response = TaggedResponse::default();
        let tagged_prefix = format!("{tag} ");
        loop {
            let line = self.read_line()?;
            if let Some(len) = literal_len(&line) {
                response.literals.push(self.read_literal(len)?);
            }

            let text = lossy(&line);
            if let Some(rest) = text.strip_prefix(&tagged_prefix) {
                let (status, text) = parse_status(rest)
                    .ok_or_else(|| SessionError::Malformed(format!("bad tagged line: {text}")))?;
                response.status = Some(status);
                response.text = text;
                return Ok(response);
            }
            if text.starts_with("* ") {
                response.untagged.push(text);
            } else if text.starts_with('+') {
                return Err(SessionError::Malformed(format!(
                    "unexpected continuation request: {text}"
                )));
            }
            // Anything else is the tail of a line interrupted by a literal.
        }
    }

    /// Read a `{len}` literal. The buffer grows with the bytes actually
    /// received rather than the announced size.
    fn read_literal(&mut self, len: usize) -> Result<Vec<u8>, SessionError> {
        if len > MAX_LITERAL_BYTES {
            return Err(SessionError::Malformed(format!(
                "literal of {len} bytes exceeds the {MAX_LITERAL_BYTES} byte limit"
            )));
        }
        let mut literal = Vec::with_capacity(len.min(LITERAL_CHUNK_BYTES));
        self.reader.by_ref().take(len as u64).read_to_end(&mut literal)?;
        if literal.len() < len {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        Ok(literal)
    }

    fn read_line(&mut self) -> Result<Vec<u8>, SessionError> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(SessionError::Closed);
        }
        Ok(buf)
    }
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim_end().to_string()
}

/// Length of the literal announced at the end of `line`, e.g. `{342}\r\n`.
fn literal_len(line: &[u8]) -> Option<usize> {
    let line = std::str::from_utf8(line).ok()?.trim_end();
    let inner = line.strip_suffix('}')?;
    let start = inner.rfind('{')?;
    inner[start + 1..].trim_end_matches('+').parse().ok()
}

fn parse_status(rest: &str) -> Option<(CommandStatus, String)> {
    let (word, text) = rest.split_once(' ').unwrap_or((rest, ""));
    let status = match word.to_ascii_uppercase().as_str() {
        "OK" => CommandStatus::Ok,
        "NO" => CommandStatus::No,
        "BAD" => CommandStatus::Bad,
        _ => return None,
    };
    Some((status, text.trim().to_string()))
}

/// Quote `s` as an IMAP quoted string.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Message numbers from `* SEARCH` lines.
pub fn parse_search(untagged: &[String]) -> Vec<MessageId> {
    untagged
        .iter()
        .filter_map(|line| {
            let rest = line.strip_prefix("* ")?;
            let (keyword, ids) = rest.split_once(' ').unwrap_or((rest, ""));
            keyword.eq_ignore_ascii_case("SEARCH").then_some(ids)
        })
        .flat_map(str::split_whitespace)
        .map(MessageId::from)
        .collect()
}
