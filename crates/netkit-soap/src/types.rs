//! SOAP versions, the parameter tree, output documents and errors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Version ────────────────────────────────────────────────────────

pub const SOAP_1_1_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_1_2_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const SOAP_1_1_CONTENT_TYPE: &str = "text/xml; charset=UTF-8";
pub const SOAP_1_2_CONTENT_TYPE: &str = "application/soap+xml;charset=UTF-8";
/// Default `SOAPAction` sent with SOAP 1.1 requests. The quotes are part of the value.
pub const DEFAULT_SOAP_ACTION: &str = "\"http://xmlme.com/WebServices/GetSpeech\"";

/// Protocol version of an envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoapVersion {
    #[default]
    V1_1,
    V1_2,
}

impl SoapVersion {
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::V1_1 => SOAP_1_1_NAMESPACE,
            Self::V1_2 => SOAP_1_2_NAMESPACE,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::V1_1 => SOAP_1_1_CONTENT_TYPE,
            Self::V1_2 => SOAP_1_2_CONTENT_TYPE,
        }
    }
}

impl fmt::Display for SoapVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1_1 => write!(f, "SOAP 1.1"),
            Self::V1_2 => write!(f, "SOAP 1.2"),
        }
    }
}

// ─── Param ──────────────────────────────────────────────────────────

/// Body parameter tree.
///
/// A `Map` becomes one element per key (in key order), a `List` emits its
/// items back to back with no wrapping element, and `Text` becomes escaped
/// character data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Map(BTreeMap<String, Param>),
    List(Vec<Param>),
    Text(String),
}

impl Param {
    /// Empty map; builds an envelope with an empty body.
    pub fn empty() -> Self {
        Param::Map(BTreeMap::new())
    }

    /// Build a map from `(name, value)` pairs. Later duplicates win.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Param>,
        I: IntoIterator<Item = (K, V)>,
    {
        Param::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<V, I>(items: I) -> Self
    where
        V: Into<Param>,
        I: IntoIterator<Item = V>,
    {
        Param::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Param::Text(s.to_string())
    }
}

impl From<String> for Param {
    fn from(s: String) -> Self {
        Param::Text(s)
    }
}

impl From<Vec<Param>> for Param {
    fn from(v: Vec<Param>) -> Self {
        Param::List(v)
    }
}

impl From<BTreeMap<String, Param>> for Param {
    fn from(m: BTreeMap<String, Param>) -> Self {
        Param::Map(m)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl TryFrom<serde_json::Value> for Param {
    type Error = SoapError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(s) => Ok(Param::Text(s)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Param::try_from)
                .collect::<SoapResult<Vec<_>>>()
                .map(Param::List),
            serde_json::Value::Object(obj) => {
                let mut map = BTreeMap::new();
                for (k, v) in obj {
                    let child = Param::try_from(v)
                        .map_err(|e| SoapError::new(e.kind, format!("{} (at '{}')", e.message, k)))?;
                    map.insert(k, child);
                }
                Ok(Param::Map(map))
            }
            other => Err(SoapError::unsupported(format!(
                "Cannot encode a JSON {} value",
                json_kind(&other)
            ))),
        }
    }
}

impl TryFrom<&serde_json::Value> for Param {
    type Error = SoapError;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        Param::try_from(value.clone())
    }
}

// ─── Document ───────────────────────────────────────────────────────

/// A complete SOAP envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    text: String,
}

impl Document {
    pub(crate) fn new(text: String) -> Self {
        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.text.into_bytes()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<[u8]> for Document {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

// ─── Error ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SoapErrorKind {
    /// Input value of a kind the encoder has no mapping for.
    UnsupportedValueKind,
    /// Invalid element name, illegal character data, or writer failure.
    EncodingFailure,
    /// The HTTP exchange failed.
    Transport,
}

impl fmt::Display for SoapErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("[SOAP] {kind}: {message}")]
pub struct SoapError {
    pub kind: SoapErrorKind,
    pub message: String,
}

impl SoapError {
    pub fn new(kind: SoapErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::new(SoapErrorKind::UnsupportedValueKind, msg)
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::new(SoapErrorKind::EncodingFailure, msg)
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::new(SoapErrorKind::Transport, msg)
    }
}

impl From<std::io::Error> for SoapError {
    fn from(e: std::io::Error) -> Self {
        Self::encoding(format!("Write failed: {}", e))
    }
}

impl From<quick_xml::Error> for SoapError {
    fn from(e: quick_xml::Error) -> Self {
        Self::encoding(format!("XML writer error: {}", e))
    }
}

impl From<netkit_httpc::HttpError> for SoapError {
    fn from(e: netkit_httpc::HttpError) -> Self {
        Self::transport(e.to_string())
    }
}

pub type SoapResult<T> = Result<T, SoapError>;

// ─── Tests ──────────────────────────────────────────────────────────
