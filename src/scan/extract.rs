//! Link extraction: unsubscribe candidates and sender from one message.
//!
//! Two sources, header first:
//! 1. `List-Unsubscribe` header entries that are HTTP(S) URLs
//! 2. HTML anchors whose visible text contains the keyword
//!
//! Any parse failure yields an empty result with no sender; a single bad
//! message never affects the others.

use std::collections::HashSet;

use mail_parser::{Message, MessageParser, PartType};
use tracing::debug;

use crate::error::ExtractError;
use crate::scan::html::extract_anchors;
use crate::scan::types::{RawMessage, SenderIdentity, UnsubscribeTarget};

const LIST_UNSUBSCRIBE: &str = "List-Unsubscribe";
const FROM: &str = "From";

/// Default anchor-text keyword.
pub const DEFAULT_KEYWORD: &str = "unsubscribe";

/// Candidates found in one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Header links first, then body links. No duplicates.
    pub links: Vec<UnsubscribeTarget>,
    /// Raw `From` value, `None` if absent or the message failed to parse.
    pub sender: Option<SenderIdentity>,
}

impl Extraction {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Pulls unsubscribe candidates out of raw messages. Stateless.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    keyword: String,
}

impl Default for LinkExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORD)
    }
}

impl LinkExtractor {
    /// Match anchors whose text contains `keyword` (case-insensitive).
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into().to_lowercase(),
        }
    }

    /// Extract candidates, converting any failure into an empty result.
    pub fn extract(&self, raw: &RawMessage) -> Extraction {
        match self.try_extract(raw) {
            Ok(extraction) => extraction,
            Err(e) => {
                debug!(error = %e, "Extraction failed, message skipped");
                Extraction::empty()
            }
        }
    }

    /// Extract candidates, reporting why a message could not be parsed.
    pub fn try_extract(&self, raw: &RawMessage) -> Result<Extraction, ExtractError> {
        if raw.as_bytes().is_empty() {
            return Err(ExtractError::Empty);
        }
        let message = MessageParser::default()
            .parse(raw.as_bytes())
            .ok_or(ExtractError::Unparseable)?;

        let mut links = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |link: String| {
            if seen.insert(link.clone()) {
                links.push(link);
            }
        };

        for value in header_values(&message, LIST_UNSUBSCRIBE) {
            for link in split_list_unsubscribe(&value) {
                push(link);
            }
        }

        let mut html_parts = Vec::new();
        collect_html(&message, &mut html_parts);
        for html in html_parts {
            for anchor in extract_anchors(html) {
                if anchor.text.to_lowercase().contains(&self.keyword) {
                    push(anchor.href);
                }
            }
        }

        let sender = header_values(&message, FROM)
            .into_iter()
            .next()
            .filter(|s| !s.is_empty());

        Ok(Extraction { links, sender })
    }
}

/// Split a `List-Unsubscribe` value into its HTTP(S) entries.
pub fn split_list_unsubscribe(value: &str) -> Vec<UnsubscribeTarget> {
    value
        .split(',')
        .map(|entry| {
            entry
                .trim_matches(|c: char| c == '<' || c == '>' || c.is_whitespace())
                .to_string()
        })
        .filter(|entry| is_http_url(entry))
        .collect()
}

fn is_http_url(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Unfolded raw values of every top-level header called `name`.
fn header_values(message: &Message<'_>, name: &str) -> Vec<String> {
    let raw = message.raw_message();
    message
        .headers()
        .iter()
        .filter(|h| h.name.as_str().eq_ignore_ascii_case(name))
        .filter_map(|h| raw.get(h.offset_start as usize..h.offset_end as usize))
        .map(unfold)
        .collect()
}

fn unfold(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Every `text/html` body in `message`, descending into attached messages.
fn collect_html<'a>(message: &'a Message<'_>, out: &mut Vec<&'a str>) {
    for part in &message.parts {
        match &part.body {
            PartType::Html(html) => out.push(html.as_ref()),
            PartType::Message(inner) => collect_html(inner, out),
            _ => {}
        }
    }
}
