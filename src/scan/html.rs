//! Minimal HTML anchor extraction.
//!
//! Only what link extraction needs: every `<a href=...>` element with its
//! target and visible text. A small tokenizer splits the document into text,
//! start tags and end tags; attribute values are read with their quotes, so a
//! `>` inside a quoted value does not end the tag. Not a general HTML parser.

use std::sync::LazyLock;

use regex::Regex;

static TAG_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<(/?)([A-Za-z][A-Za-z0-9:-]*)").expect("tag regex is valid")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[\s/]*([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+)))?"#)
        .expect("attribute regex is valid")
});

static TAG_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\s/]*>").expect("tag close regex is valid"));

/// A hyperlink element found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub href: String,
    pub text: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    Start {
        name: String,
        attributes: Vec<(String, String)>,
    },
    End {
        name: String,
    },
}

/// Splits markup into tokens. Comments, doctypes and the contents of
/// `script`/`style` elements are dropped.
struct Tokens<'a> {
    rest: &'a str,
    raw_text_end: Option<&'static str>,
}

impl<'a> Tokens<'a> {
    fn new(html: &'a str) -> Self {
        Self {
            rest: html,
            raw_text_end: None,
        }
    }

    fn skip_past(&mut self, marker: &str) {
        self.rest = match self.rest.find(marker) {
            Some(i) => &self.rest[i + marker.len()..],
            None => "",
        };
    }

    fn skip_raw_text(&mut self, end_tag: &str) {
        let lower = self.rest.to_ascii_lowercase();
        self.rest = match lower.find(end_tag) {
            Some(i) => &self.rest[i..],
            None => "",
        };
    }

    fn tag(&mut self) -> Option<Token<'a>> {
        let open = TAG_OPEN.captures(self.rest)?;
        let closing = !open[1].is_empty();
        let name = open[2].to_ascii_lowercase();
        let mut pos = open.get(0).map_or(0, |m| m.end());
        let mut attributes = Vec::new();

        while pos < self.rest.len() {
            let tail = &self.rest[pos..];
            if let Some(m) = TAG_CLOSE.find(tail) {
                pos += m.end();
                break;
            }
            match ATTRIBUTE.captures(tail) {
                Some(caps) => {
                    let value = caps
                        .get(2)
                        .or_else(|| caps.get(3))
                        .or_else(|| caps.get(4))
                        .map_or("", |m| m.as_str());
                    attributes.push((caps[1].to_ascii_lowercase(), value.to_string()));
                    pos += caps.get(0).map_or(1, |m| m.end().max(1));
                }
                // Stray quote or `=`: skip one character.
                None => pos += tail.chars().next().map_or(1, char::len_utf8),
            }
        }
        self.rest = self.rest.get(pos..).unwrap_or("");

        if closing {
            return Some(Token::End { name });
        }
        self.raw_text_end = match name.as_str() {
            "script" => Some("</script"),
            "style" => Some("</style"),
            _ => None,
        };
        Some(Token::Start { name, attributes })
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        loop {
            if let Some(end_tag) = self.raw_text_end.take() {
                self.skip_raw_text(end_tag);
            }
            if self.rest.is_empty() {
                return None;
            }

            if self.rest.starts_with("<!--") {
                self.skip_past("-->");
                continue;
            }
            if self.rest.starts_with("<!") || self.rest.starts_with("<?") {
                self.skip_past(">");
                continue;
            }
            if self.rest.starts_with('<') {
                if let Some(token) = self.tag() {
                    return Some(token);
                }
                let (text, rest) = self.rest.split_at(1);
                self.rest = rest;
                return Some(Token::Text(text));
            }

            let end = self.rest.find('<').unwrap_or(self.rest.len());
            let (text, rest) = self.rest.split_at(end);
            self.rest = rest;
            return Some(Token::Text(text));
        }
    }
}

struct OpenAnchor {
    href: Option<String>,
    text: String,
}

impl OpenAnchor {
    fn finish(self) -> Option<Anchor> {
        Some(Anchor {
            href: self.href?,
            text: normalize_text(&self.text),
        })
    }
}

/// Collect every anchor that carries an `href` attribute, in document order.
///
/// A new `<a>` closes any anchor still open, and the end of input closes
/// the last one, matching how browsers recover from unclosed links.
pub fn extract_anchors(html: &str) -> Vec<Anchor> {
    let mut anchors = Vec::new();
    let mut open: Option<OpenAnchor> = None;

    for token in Tokens::new(html) {
        match token {
            Token::Start { name, attributes } if name == "a" => {
                anchors.extend(open.take().and_then(OpenAnchor::finish));
                let href = attributes
                    .into_iter()
                    .find(|(key, _)| key == "href")
                    .map(|(_, value)| decode_entities(value.trim()));
                open = Some(OpenAnchor {
                    href,
                    text: String::new(),
                });
            }
            Token::End { name } if name == "a" => {
                anchors.extend(open.take().and_then(OpenAnchor::finish));
            }
            Token::Text(text) => {
                if let Some(anchor) = open.as_mut() {
                    anchor.text.push_str(text);
                }
            }
            _ => {}
        }
    }
    anchors.extend(open.take().and_then(OpenAnchor::finish));
    anchors
}

/// Decode common entities and collapse whitespace.
fn normalize_text(text: &str) -> String {
    decode_entities(text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
