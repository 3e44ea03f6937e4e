/*!
 * Lossless token tree for a single XML part.
 *
 * A part is tokenized with quick-xml into a flat list of tokens, each one
 * carrying the exact source slice it was read from. Concatenating the raw
 * slices reproduces the input byte for byte, so a part whose text has not
 * changed re-encodes to identical bytes. Only character data of text nodes
 * is ever rewritten; element tokens are never touched.
 */

use quick_xml::escape::{partial_escape, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::PackageError;

/// Kind of a token in a part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Start tag `<a:t>`
    Open,
    /// End tag `</a:t>`
    Close,
    /// Self-closing tag `<a:br/>`
    Empty,
    /// Character data between tags
    Text,
    /// Declarations, comments, CDATA, processing instructions
    Other,
}

/// One token of a part with the exact bytes it came from
#[derive(Debug, Clone)]
pub struct Token {
    kind: TokenKind,
    /// Local element name for tags, empty otherwise
    name: String,
    /// Qualified element name for tags, empty otherwise
    qname: String,
    attributes: Vec<(String, String)>,
    /// Decoded character data for text tokens
    text: String,
    raw: String,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Local name of the element (`t` for `<a:t>`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of an attribute by local name
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Decoded character data of a text token
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Source bytes of the token
    pub fn raw(&self) -> &str {
        &self.raw
    }

    fn tag(kind: TokenKind, start: Option<&BytesStart<'_>>, qname: &[u8], raw: &str) -> Self {
        let qname = String::from_utf8_lossy(qname).into_owned();
        let name = match qname.split_once(':') {
            Some((_, local)) => local.to_string(),
            None => qname.clone(),
        };
        let attributes = start
            .map(|s| {
                s.attributes()
                    .flatten()
                    .map(|attr| {
                        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                        let value = attr
                            .unescape_value()
                            .map(|v| v.into_owned())
                            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                        (key, value)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            kind,
            name,
            qname,
            attributes,
            text: String::new(),
            raw: raw.to_string(),
        }
    }

    fn character_data(raw: &str, text: String) -> Self {
        Self {
            kind: TokenKind::Text,
            name: String::new(),
            qname: String::new(),
            attributes: Vec::new(),
            text,
            raw: raw.to_string(),
        }
    }

    fn other(raw: &str) -> Self {
        Self {
            kind: TokenKind::Other,
            name: String::new(),
            qname: String::new(),
            attributes: Vec::new(),
            text: String::new(),
            raw: raw.to_string(),
        }
    }
}

/// Parsed, mutable view of one XML part
#[derive(Debug, Clone)]
pub struct PartTree {
    path: String,
    tokens: Vec<Token>,
}

impl PartTree {
    /// Tokenize a part. The part must be well-formed.
    pub fn parse(path: &str, xml: &str) -> Result<Self, PackageError> {
        let malformed = |reason: String| PackageError::MalformedXml {
            path: path.to_string(),
            reason,
        };

        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut tokens = Vec::new();
        let mut cursor = 0usize;
        loop {
            let event = reader
                .read_event()
                .map_err(|e| malformed(format!("at byte {}: {}", reader.buffer_position(), e)))?;
            match event {
                Event::Eof => {
                    if cursor < xml.len() {
                        tokens.push(Token::other(&xml[cursor..]));
                    }
                    break;
                }
                Event::Text(_) => {
                    // Character data never contains '<', so it ends at the next markup
                    let stop = xml[cursor..].find('<').map_or(xml.len(), |i| cursor + i);
                    let raw = &xml[cursor..stop];
                    let text = unescape(raw)
                        .map_err(|e| malformed(e.to_string()))?
                        .into_owned();
                    tokens.push(Token::character_data(raw, text));
                    cursor = stop;
                }
                markup => {
                    let end = reader.buffer_position() as usize;
                    let raw = &xml[cursor..end];
                    let token = match &markup {
                        Event::Start(e) => Token::tag(TokenKind::Open, Some(e), e.name().as_ref(), raw),
                        Event::Empty(e) => Token::tag(TokenKind::Empty, Some(e), e.name().as_ref(), raw),
                        Event::End(e) => Token::tag(TokenKind::Close, None, e.name().as_ref(), raw),
                        _ => Token::other(raw),
                    };
                    tokens.push(token);
                    cursor = end;
                }
            }
        }

        Ok(Self {
            path: path.to_string(),
            tokens,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Number of element tokens (open or self-closing) with the given local name
    pub fn count_elements(&self, name: &str) -> usize {
        self.tokens
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Open | TokenKind::Empty) && t.name == name)
            .count()
    }

    /// Re-encode the part
    pub fn to_xml(&self) -> String {
        let capacity = self.tokens.iter().map(|t| t.raw.len()).sum();
        let mut out = String::with_capacity(capacity);
        for token in &self.tokens {
            out.push_str(&token.raw);
        }
        out
    }

    /// Index of the close token matching the element opened at `open`
    fn matching_close(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(open) {
            match token.kind {
                TokenKind::Open => depth += 1,
                TokenKind::Close => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Character data of the element starting at token `open`
    pub fn element_text(&self, open: usize) -> Result<String, PackageError> {
        let token = self.element_at(open)?;
        if token.kind == TokenKind::Empty {
            return Ok(String::new());
        }
        let close = self.matching_close(open).ok_or_else(|| self.malformed(open, "unclosed element"))?;
        Ok(self.tokens[open + 1..close]
            .iter()
            .filter(|t| t.kind == TokenKind::Text)
            .map(|t| t.text.as_str())
            .collect())
    }

    /// Replace the character data of the element starting at token `open`.
    ///
    /// The element's tags are left as they are; a self-closing element is
    /// expanded into a start and end tag only when the new text is not empty.
    pub fn set_element_text(&mut self, open: usize, text: &str) -> Result<(), PackageError> {
        let token = self.element_at(open)?;
        if token.kind == TokenKind::Empty {
            if text.is_empty() {
                return Ok(());
            }
            let qname = token.qname.clone();
            let raw = token.raw.clone();
            let start_raw = match raw.strip_suffix("/>") {
                Some(head) => format!("{}>", head.trim_end()),
                None => return Err(self.malformed(open, "unexpected self-closing tag")),
            };
            let mut start = token.clone();
            start.kind = TokenKind::Open;
            start.raw = start_raw;
            let mut end = Token::other(&format!("</{}>", qname));
            end.kind = TokenKind::Close;
            end.name = start.name.clone();
            end.qname = qname;
            let body = Token::character_data(&partial_escape(text), text.to_string());
            self.tokens.splice(open..=open, [start, body, end]);
            return Ok(());
        }

        let close = self.matching_close(open).ok_or_else(|| self.malformed(open, "unclosed element"))?;
        let mut written = false;
        for token in &mut self.tokens[open + 1..close] {
            if token.kind != TokenKind::Text {
                continue;
            }
            if written {
                token.raw.clear();
                token.text.clear();
            } else {
                token.raw = partial_escape(text).into_owned();
                token.text = text.to_string();
                written = true;
            }
        }
        if !written && !text.is_empty() {
            let body = Token::character_data(&partial_escape(text), text.to_string());
            self.tokens.insert(open + 1, body);
        }
        Ok(())
    }

    fn element_at(&self, index: usize) -> Result<&Token, PackageError> {
        match self.tokens.get(index) {
            Some(token) if matches!(token.kind, TokenKind::Open | TokenKind::Empty) => Ok(token),
            _ => Err(self.malformed(index, "token is not an element")),
        }
    }

    fn malformed(&self, index: usize, reason: &str) -> PackageError {
        PackageError::MalformedXml {
            path: self.path.clone(),
            reason: format!("{} (token {})", reason, index),
        }
    }
}
