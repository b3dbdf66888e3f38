//! Data types, error handling and configuration for the mail crate.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Error ──────────────────────────────────────────────────────────

/// Kinds of SMTP errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SmtpErrorKind {
    /// Server returned an error reply (4xx / 5xx).
    ServerReply,
    AuthFailure,
    TlsError,
    /// Connection refused or timed out.
    ConnectionError,
    /// Socket or file I/O failed.
    IoError,
    /// The message itself is malformed.
    MessageError,
    ConfigError,
}

impl fmt::Display for SmtpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Top-level error type for the mail crate.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("[SMTP{}] {kind}: {message}", .code.map(|c| format!(" {}", c)).unwrap_or_default())]
pub struct SmtpError {
    pub kind: SmtpErrorKind,
    pub message: String,
    /// Reply code when the error came from the server.
    pub code: Option<u16>,
}

impl SmtpError {
    pub fn new(kind: SmtpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::ConnectionError, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::AuthFailure, msg)
    }

    pub fn tls(msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::TlsError, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::IoError, msg)
    }

    pub fn server(code: u16, msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::ServerReply, msg).with_code(code)
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::MessageError, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(SmtpErrorKind::ConfigError, msg)
    }
}

impl From<std::io::Error> for SmtpError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

pub type SmtpResult<T> = Result<T, SmtpError>;

// ─── Enums ──────────────────────────────────────────────────────────

/// Transport security for the SMTP session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmtpSecurity {
    /// Plain TCP, no encryption.
    None,
    /// Plain TCP upgraded with STARTTLS after EHLO.
    StartTls,
    /// TLS from the first byte (SMTPS, usually port 465).
    #[default]
    ImplicitTls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmtpAuthMethod {
    Plain,
    Login,
}

impl fmt::Display for SmtpAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "PLAIN"),
            Self::Login => write!(f, "LOGIN"),
        }
    }
}

// ─── Configuration ──────────────────────────────────────────────────

/// SMTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub security: SmtpSecurity,
    pub connect_timeout_secs: u64,
    /// Deadline for each reply from the server.
    pub io_timeout_secs: u64,
    /// Domain sent with EHLO/HELO.
    pub ehlo_domain: String,
    pub verify_certificates: bool,
    /// PEM file with extra trusted CA certificates.
    pub ca_cert_path: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 465,
            security: SmtpSecurity::ImplicitTls,
            connect_timeout_secs: 30,
            io_timeout_secs: 60,
            ehlo_domain: "localhost".into(),
            verify_certificates: true,
            ca_cert_path: None,
        }
    }
}

impl SmtpConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> SmtpResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| SmtpError::config(format!("Invalid SMTP config: {}", e)))
    }

    pub fn validate(&self) -> SmtpResult<()> {
        if self.host.trim().is_empty() {
            return Err(SmtpError::config("SMTP host is empty"));
        }
        if self.port == 0 {
            return Err(SmtpError::config("SMTP port is 0"));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Credentials for SMTP authentication. An empty username skips AUTH.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpCredentials {
    pub username: String,
    pub password: String,
    /// Mechanism to use; chosen from the EHLO capabilities when `None`.
    pub method: Option<SmtpAuthMethod>,
}

impl SmtpCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            method: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty()
    }
}

// ─── Attachment ─────────────────────────────────────────────────────

pub const DEFAULT_ATTACHMENT_TYPE: &str = "application/octet-stream";

/// A file attached to an [`Email`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: DEFAULT_ATTACHMENT_TYPE.into(),
            data,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Read a file from disk. The attachment name is the final path
    /// segment, split on either `/` or `\`.
    pub async fn from_path(path: impl AsRef<Path>) -> SmtpResult<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| {
            SmtpError::io(format!("Failed to read attachment {}: {}", path.display(), e))
        })?;
        Ok(Self::new(file_name(&path.to_string_lossy()), data))
    }
}

/// Final segment of a path written with either separator.
pub fn file_name(path: &str) -> &str {
    match path.rfind(&['/', '\\'][..]) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

// ─── Email ──────────────────────────────────────────────────────────

/// A message and its envelope.
///
/// The first entry of `to` becomes the `To:` header, the rest are listed
/// as `Cc:`. Every entry is a recipient of the envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Email {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

impl Email {
    pub fn new(from: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            subject: subject.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn to(mut self, addr: impl Into<String>) -> Self {
        self.to.push(addr.into());
        self
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn validate(&self) -> SmtpResult<()> {
        if self.from.trim().is_empty() {
            return Err(SmtpError::message("Sender address is empty"));
        }
        if self.to.is_empty() {
            return Err(SmtpError::message("No recipients"));
        }
        for addr in std::iter::once(&self.from).chain(self.to.iter()) {
            if !is_valid_mailbox(addr) {
                return Err(SmtpError::message(format!("Invalid address {:?}", addr)));
            }
        }
        Ok(())
    }
}

/// Envelope address of a mailbox written as `addr` or `Name <addr>`.
pub fn mailbox_address(mailbox: &str) -> &str {
    match (mailbox.rfind('<'), mailbox.rfind('>')) {
        (Some(open), Some(close)) if open < close => mailbox[open + 1..close].trim(),
        _ => mailbox.trim(),
    }
}

/// One line, at most one `<...>` pair closing the value, and a non-empty
/// address without whitespace.
fn is_valid_mailbox(mailbox: &str) -> bool {
    if mailbox.contains(&['\r', '\n'][..]) {
        return false;
    }
    let bracketed = match (mailbox.matches('<').count(), mailbox.matches('>').count()) {
        (0, 0) => true,
        (1, 1) => mailbox.trim_end().ends_with('>') && mailbox.find('<') < mailbox.find('>'),
        _ => false,
    };
    let addr = mailbox_address(mailbox);
    bracketed && !addr.is_empty() && !addr.contains(char::is_whitespace)
}

// ─── SMTP Reply ─────────────────────────────────────────────────────

/// A complete (possibly multi-line) server reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpReply {
    pub code: u16,
    /// Enhanced status code (e.g. "2.1.0") taken from the first line.
    pub enhanced_code: Option<String>,
    /// Text of each line, without code and separator.
    pub lines: Vec<String>,
}

fn is_enhanced_code(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 3
        && matches!(parts[0], "2" | "4" | "5")
        && parts[1..]
            .iter()
            .all(|p| !p.is_empty() && p.len() <= 3 && p.bytes().all(|b| b.is_ascii_digit()))
}

impl SmtpReply {
    /// 2xx
    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 3xx
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// 4xx or 5xx
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }

    pub fn is_multiline(&self) -> bool {
        self.lines.len() > 1
    }

    pub fn text(&self) -> String {
        self.lines.join("\r\n")
    }

    /// Parse the raw lines of one reply.
    pub fn parse(raw: &str) -> SmtpResult<Self> {
        let mut code = None;
        let mut lines = Vec::new();

        for line in raw.lines().filter(|l| l.len() >= 3) {
            let c: u16 = line
                .get(..3)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| SmtpError::io(format!("Invalid reply code in: {}", line)))?;
            match code {
                None => code = Some(c),
                Some(first) if first != c => {
                    return Err(SmtpError::io(format!(
                        "Mixed reply codes {} and {} in one reply",
                        first, c
                    )))
                }
                _ => {}
            }
            lines.push(line.get(4..).unwrap_or("").to_string());
        }

        let code = code.ok_or_else(|| SmtpError::io("Empty SMTP reply"))?;
        let enhanced_code = lines
            .first()
            .and_then(|l| l.split(' ').next())
            .filter(|w| is_enhanced_code(w))
            .map(str::to_string);
        Ok(Self {
            code,
            enhanced_code,
            lines,
        })
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.text())
    }
}

// ─── EHLO Capabilities ─────────────────────────────────────────────

/// Extensions advertised in the EHLO reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EhloCapabilities {
    /// First line of the reply (the server's greeting name).
    pub server_name: String,
    pub max_size: Option<u64>,
    /// Upper-cased mechanism names from the AUTH line.
    pub auth_mechanisms: Vec<String>,
    pub starttls: bool,
    pub eight_bit_mime: bool,
    pub pipelining: bool,
    pub smtputf8: bool,
    /// Every line after the first, verbatim.
    pub extensions: Vec<String>,
}

impl EhloCapabilities {
    pub fn parse(reply: &SmtpReply) -> Self {
        let mut caps = Self {
            server_name: reply.lines.first().cloned().unwrap_or_default(),
            ..Default::default()
        };
        for line in reply.lines.iter().skip(1) {
            let mut words = line.split_whitespace();
            let keyword = words.next().unwrap_or("").to_ascii_uppercase();
            match keyword.as_str() {
                "SIZE" => caps.max_size = words.next().and_then(|s| s.parse().ok()),
                // Some servers still send the pre-standard "AUTH=" form.
                "AUTH" | "AUTH=LOGIN" => {
                    for m in words {
                        let m = m.to_ascii_uppercase();
                        if !caps.auth_mechanisms.contains(&m) {
                            caps.auth_mechanisms.push(m);
                        }
                    }
                    if keyword == "AUTH=LOGIN" && !caps.supports_auth("LOGIN") {
                        caps.auth_mechanisms.push("LOGIN".into());
                    }
                }
                "STARTTLS" => caps.starttls = true,
                "8BITMIME" => caps.eight_bit_mime = true,
                "PIPELINING" => caps.pipelining = true,
                "SMTPUTF8" => caps.smtputf8 = true,
                _ => {}
            }
            caps.extensions.push(line.clone());
        }
        caps
    }

    pub fn supports_auth(&self, method: &str) -> bool {
        self.auth_mechanisms
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
