//! Data types, error handling and configuration for the HTTP helpers.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `Content-Type` value used by the form helpers.
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

// ─── Error ──────────────────────────────────────────────────────────

/// Kinds of HTTP helper errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HttpErrorKind {
    /// Invalid client configuration (proxy URL, TLS backend, headers).
    Config,
    /// Connection refused, DNS failure, proxy unreachable.
    Connection,
    /// A configured deadline elapsed.
    Timeout,
    /// The request could not be sent or the response was malformed.
    Request,
    /// The response body could not be decoded into the requested shape.
    Decode,
    /// I/O error while reading the body.
    Io,
}

impl fmt::Display for HttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Top-level error type for the HTTP helpers.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("[HTTP] {kind}: {message}")]
pub struct HttpError {
    pub kind: HttpErrorKind,
    pub message: String,
}

impl HttpError {
    pub fn new(kind: HttpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Config, msg)
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Connection, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Timeout, msg)
    }

    pub fn request(msg: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Request, msg)
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Decode, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Io, msg)
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        let msg = e.to_string();
        if e.is_timeout() {
            Self::timeout(msg)
        } else if e.is_connect() {
            Self::connection(msg)
        } else if e.is_decode() {
            Self::decode(msg)
        } else if e.is_builder() {
            Self::config(msg)
        } else if e.is_body() {
            Self::io(msg)
        } else {
            Self::request(msg)
        }
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(e: serde_json::Error) -> Self {
        Self::decode(format!("JSON decode error: {}", e))
    }
}

impl From<quick_xml::DeError> for HttpError {
    fn from(e: quick_xml::DeError) -> Self {
        Self::decode(format!("XML decode error: {}", e))
    }
}

pub type HttpResult<T> = Result<T, HttpError>;

// ─── Configuration ──────────────────────────────────────────────────

/// Per-phase timeouts in milliseconds. `0` leaves the phase unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeout {
    /// TCP connect timeout.
    pub connect_ms: u64,
    /// Deadline for each read from the socket.
    pub read_ms: u64,
    /// Deadline for uploading the request.
    pub write_ms: u64,
    /// Deadline for the response headers once the request is sent.
    pub header_ms: u64,
    /// How long an idle pooled connection is kept.
    pub idle_ms: u64,
}

fn non_zero(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

impl Timeout {
    pub fn connect(&self) -> Option<Duration> {
        non_zero(self.connect_ms)
    }

    pub fn read(&self) -> Option<Duration> {
        non_zero(self.read_ms)
    }

    pub fn write(&self) -> Option<Duration> {
        non_zero(self.write_ms)
    }

    pub fn header(&self) -> Option<Duration> {
        non_zero(self.header_ms)
    }

    pub fn idle(&self) -> Option<Duration> {
        non_zero(self.idle_ms)
    }

    /// Bound applied to sending a request and waiting for its headers.
    ///
    /// Upload and header wait are sequential phases of the same future,
    /// so when both are set their sum is the deadline.
    pub fn send_deadline(&self) -> Option<Duration> {
        match (self.write(), self.header()) {
            (Some(w), Some(h)) => Some(w + h),
            (w, h) => w.or(h),
        }
    }
}

/// Forward proxy settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Proxy URL (e.g. `http://proxy.local:3128`). Empty disables the proxy.
    pub host: String,
    /// User name for proxy basic auth. Empty disables proxy auth.
    pub user: String,
    /// Password for proxy basic auth.
    pub password: String,
}

impl ProxySettings {
    pub fn is_enabled(&self) -> bool {
        !self.host.is_empty()
    }

    pub fn has_auth(&self) -> bool {
        self.is_enabled() && !self.user.is_empty()
    }
}

/// Configuration for an [`HttpClient`](crate::HttpClient).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    /// Timeouts; `None` keeps the client defaults.
    pub timeout: Option<Timeout>,
    /// Proxy used for every request.
    pub proxy: ProxySettings,
    /// Reuse connections across requests.
    pub keep_alive: bool,
}

impl HttpClientConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> HttpResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| HttpError::config(format!("Invalid HTTP client config: {}", e)))
    }

    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = proxy;
        self
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
