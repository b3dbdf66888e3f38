//! Envelope construction.
//!
//! The envelope prologue and epilogue are fixed text per version; the body
//! is streamed through a `quick_xml::Writer` so element names and character
//! data are checked and escaped as they are written.

use std::borrow::Cow;
use std::io::Write;

use lazy_static::lazy_static;
use log::debug;
use netkit_httpc::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::types::*;

pub const SOAP_ACTION: &str = "SOAPAction";

const ENVELOPE_OPEN: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<soap:Envelope xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"\n  \
xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\"\n  \
xmlns:soap=\"";
const BODY_OPEN: &str = "\">\n  <soap:Body>\n";
const ENVELOPE_CLOSE: &str = "\n  </soap:Body>\n</soap:Envelope>";

lazy_static! {
    static ref HEADERS_1_1: HeaderMap = {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static(SOAP_1_1_CONTENT_TYPE));
        h.insert(
            HeaderName::from_static("soapaction"),
            HeaderValue::from_static(DEFAULT_SOAP_ACTION),
        );
        h
    };
    static ref HEADERS_1_2: HeaderMap = {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static(SOAP_1_2_CONTENT_TYPE));
        h
    };
}

/// Builds SOAP envelopes for one protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoapBuilder {
    version: SoapVersion,
}

impl SoapBuilder {
    pub fn new(version: SoapVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    /// HTTP headers for this version. Shared and read-only.
    pub fn headers(&self) -> &'static HeaderMap {
        match self.version {
            SoapVersion::V1_1 => &*HEADERS_1_1,
            SoapVersion::V1_2 => &*HEADERS_1_2,
        }
    }

    /// Owned copy of [`headers`](Self::headers), with the `SOAPAction`
    /// replaced by `action` for SOAP 1.1. SOAP 1.2 ignores `action`.
    pub fn request_headers(&self, action: Option<&str>) -> SoapResult<HeaderMap> {
        let mut h = self.headers().clone();
        if let (SoapVersion::V1_1, Some(action)) = (self.version, action) {
            let value = HeaderValue::from_str(&format!("\"{}\"", action))
                .map_err(|e| SoapError::encoding(format!("Invalid SOAPAction {:?}: {}", action, e)))?;
            h.insert(HeaderName::from_static("soapaction"), value);
        }
        Ok(h)
    }

    /// Build a complete envelope around `params`.
    pub fn build(&self, params: &Param) -> SoapResult<Document> {
        let mut buf = Vec::new();
        self.build_into(params, &mut buf)?;
        let text = String::from_utf8(buf)
            .map_err(|e| SoapError::encoding(format!("Envelope is not UTF-8: {}", e)))?;
        debug!("Built {} envelope ({} bytes)", self.version, text.len());
        Ok(Document::new(text))
    }

    /// Stream the envelope into `out`.
    ///
    /// On error, `out` may already hold a partial envelope.
    pub fn build_into<W: Write>(&self, params: &Param, mut out: W) -> SoapResult<()> {
        out.write_all(ENVELOPE_OPEN.as_bytes())?;
        out.write_all(self.version.namespace().as_bytes())?;
        out.write_all(BODY_OPEN.as_bytes())?;

        let mut writer = Writer::new_with_indent(&mut out, b' ', 2);
        encode(&mut writer, params)?;

        out.write_all(ENVELOPE_CLOSE.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Convert a JSON value into a [`Param`] tree and build it.
    pub fn build_json(&self, value: &serde_json::Value) -> SoapResult<Document> {
        let params = Param::try_from(value)?;
        self.build(&params)
    }
}

impl Default for SoapBuilder {
    fn default() -> Self {
        Self::new(SoapVersion::default())
    }
}

/// Write `value` as XML. Stops at the first failure, leaving any open
/// element unclosed.
pub fn encode<W: Write>(writer: &mut Writer<W>, value: &Param) -> SoapResult<()> {
    match value {
        Param::Map(entries) => {
            for (name, child) in entries {
                check_name(name)?;
                writer.write_event(Event::Start(BytesStart::new(name.as_str())))?;
                encode(writer, child)?;
                writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
            }
        }
        Param::List(items) => {
            for item in items {
                encode(writer, item)?;
            }
        }
        Param::Text(text) => {
            check_text(text)?;
            writer.write_event(Event::Text(BytesText::from_escaped(escape_text(text))))?;
        }
    }
    Ok(())
}

/// Escape markup characters and write CR as a character reference, since
/// parsers fold a literal CR into LF.
fn escape_text(text: &str) -> Cow<'_, str> {
    let escaped = escape(text);
    if escaped.contains('\r') {
        Cow::Owned(escaped.replace('\r', "&#xD;"))
    } else {
        escaped
    }
}

// ── XML 1.0 character classes ───────────────────────────────────────

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z'
        | '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}' | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

fn check_name(name: &str) -> SoapResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => is_name_start_char(first) && chars.all(is_name_char),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SoapError::encoding(format!("Invalid element name {:?}", name)))
    }
}

fn check_text(text: &str) -> SoapResult<()> {
    match text.chars().find(|c| !is_xml_char(*c)) {
        Some(c) => Err(SoapError::encoding(format!(
            "Character U+{:04X} is not allowed in XML",
            c as u32
        ))),
        None => Ok(()),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
