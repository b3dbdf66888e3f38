//! SMTP protocol engine.
//!
//! Owns the socket (plain or TLS), exchanges commands and replies, and
//! implements the mail transaction: MAIL FROM, RCPT TO, DATA.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::types::*;

// ─── Stream ─────────────────────────────────────────────────────────

enum SmtpStream {
    Plain(BufReader<TcpStream>),
    Tls(Box<BufReader<TlsStream<TcpStream>>>),
}

impl SmtpStream {
    async fn read_line(&mut self, buf: &mut String) -> std::io::Result<usize> {
        match self {
            Self::Plain(r) => r.read_line(buf).await,
            Self::Tls(r) => r.read_line(buf).await,
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Plain(r) => {
                let w = r.get_mut();
                w.write_all(data).await?;
                w.flush().await
            }
            Self::Tls(r) => {
                let w = r.get_mut();
                w.write_all(data).await?;
                w.flush().await
            }
        }
    }
}

// ─── SmtpClient ─────────────────────────────────────────────────────

/// One SMTP session.
pub struct SmtpClient {
    stream: Option<SmtpStream>,
    config: SmtpConfig,
    capabilities: Option<EhloCapabilities>,
    tls_active: bool,
    authenticated: bool,
}

impl SmtpClient {
    pub fn new(config: SmtpConfig) -> Self {
        Self {
            stream: None,
            config,
            capabilities: None,
            tls_active: false,
            authenticated: false,
        }
    }

    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Option<&EhloCapabilities> {
        self.capabilities.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_tls_active(&self) -> bool {
        self.tls_active
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub(crate) fn set_authenticated(&mut self, auth: bool) {
        self.authenticated = auth;
    }

    fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.config.io_timeout_secs)
    }

    // ── Session ─────────────────────────────────────────────────

    /// Open the connection and read the greeting.
    pub async fn connect(&mut self) -> SmtpResult<SmtpReply> {
        self.config.validate()?;
        let addr = self.config.address();
        debug!("Connecting to SMTP server {}", addr);

        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let tcp = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| SmtpError::connection(format!("Connection to {} timed out", addr)))?
            .map_err(|e| SmtpError::connection(format!("Connection to {} failed: {}", addr, e)))?;

        self.stream = Some(match self.config.security {
            SmtpSecurity::ImplicitTls => {
                let tls = self.tls_handshake(tcp).await?;
                self.tls_active = true;
                SmtpStream::Tls(Box::new(BufReader::new(tls)))
            }
            SmtpSecurity::StartTls | SmtpSecurity::None => SmtpStream::Plain(BufReader::new(tcp)),
        });

        let greeting = self.read_reply().await?;
        if !greeting.is_positive() {
            self.stream = None;
            return Err(SmtpError::server(
                greeting.code,
                format!("Server rejected connection: {}", greeting.text()),
            ));
        }
        info!("SMTP connected to {}: {}", addr, greeting.text());
        Ok(greeting)
    }

    /// EHLO, falling back to HELO when the server rejects it.
    pub async fn ehlo(&mut self) -> SmtpResult<EhloCapabilities> {
        let domain = self.config.ehlo_domain.clone();
        let reply = self.command(&format!("EHLO {}", domain)).await?;
        let caps = if reply.is_positive() {
            EhloCapabilities::parse(&reply)
        } else {
            debug!("EHLO rejected ({}), trying HELO", reply.code);
            let reply = self.command(&format!("HELO {}", domain)).await?;
            if !reply.is_positive() {
                return Err(SmtpError::server(
                    reply.code,
                    format!("HELO rejected: {}", reply.text()),
                ));
            }
            EhloCapabilities {
                server_name: reply.lines.first().cloned().unwrap_or_default(),
                ..Default::default()
            }
        };
        self.capabilities = Some(caps.clone());
        Ok(caps)
    }

    /// Upgrade the plain connection with STARTTLS and repeat EHLO.
    pub async fn starttls(&mut self) -> SmtpResult<()> {
        if self.tls_active {
            return Ok(());
        }
        let reply = self.command("STARTTLS").await?;
        if !reply.is_positive() {
            return Err(SmtpError::tls(format!("STARTTLS rejected: {}", reply)).with_code(reply.code));
        }

        let tcp = match self.stream.take() {
            Some(SmtpStream::Plain(r)) => r.into_inner(),
            Some(tls @ SmtpStream::Tls(_)) => {
                self.stream = Some(tls);
                return Err(SmtpError::tls("Connection already uses TLS"));
            }
            None => return Err(SmtpError::io("Not connected")),
        };
        let tls = self.tls_handshake(tcp).await?;
        self.stream = Some(SmtpStream::Tls(Box::new(BufReader::new(tls))));
        self.tls_active = true;
        info!("STARTTLS upgrade with {} complete", self.config.host);

        // Capabilities may change once the channel is encrypted.
        self.ehlo().await?;
        Ok(())
    }

    /// Send QUIT and drop the connection. Never fails.
    pub async fn quit(&mut self) {
        if self.stream.is_some() {
            if let Err(e) = self.command("QUIT").await {
                debug!("QUIT failed: {}", e);
            }
        }
        self.stream = None;
        self.tls_active = false;
        self.authenticated = false;
        self.capabilities = None;
    }

    // ── Mail transaction ────────────────────────────────────────

    pub async fn mail_from(&mut self, sender: &str) -> SmtpResult<SmtpReply> {
        let reply = self.command(&format!("MAIL FROM:<{}>", sender)).await?;
        expect_positive(reply, "MAIL FROM rejected")
    }

    pub async fn rcpt_to(&mut self, recipient: &str) -> SmtpResult<SmtpReply> {
        let reply = self.command(&format!("RCPT TO:<{}>", recipient)).await?;
        expect_positive(reply, &format!("RCPT TO rejected for {}", recipient))
    }

    /// DATA followed by the dot-stuffed message and the terminating dot.
    pub async fn data(&mut self, message: &str) -> SmtpResult<SmtpReply> {
        let reply = self.command("DATA").await?;
        if !reply.is_intermediate() {
            return Err(SmtpError::server(
                reply.code,
                format!("DATA rejected: {}", reply.text()),
            ));
        }

        let mut payload = dot_stuff(message);
        payload.push_str(".\r\n");
        trace!("C: <{} bytes of message data>", payload.len());
        self.write_raw(payload.as_bytes()).await?;

        let reply = self.read_reply().await?;
        expect_positive(reply, "Message rejected")
    }

    pub async fn reset(&mut self) -> SmtpResult<SmtpReply> {
        self.command("RSET").await
    }

    pub async fn noop(&mut self) -> SmtpResult<SmtpReply> {
        self.command("NOOP").await
    }

    /// MAIL FROM, RCPT TO for each recipient, then DATA.
    pub async fn send_envelope(
        &mut self,
        from: &str,
        recipients: &[String],
        message: &str,
    ) -> SmtpResult<SmtpReply> {
        self.mail_from(mailbox_address(from)).await?;
        for rcpt in recipients {
            self.rcpt_to(mailbox_address(rcpt)).await?;
        }
        self.data(message).await
    }

    // ── Wire I/O ────────────────────────────────────────────────

    pub async fn command(&mut self, cmd: &str) -> SmtpResult<SmtpReply> {
        debug!("C: {}", cmd);
        self.write_raw(format!("{}\r\n", cmd).as_bytes()).await?;
        self.read_reply().await
    }

    /// Like [`command`](Self::command), logging `label` instead of the line.
    pub(crate) async fn command_redacted(&mut self, cmd: &str, label: &str) -> SmtpResult<SmtpReply> {
        debug!("C: {}", label);
        self.write_raw(format!("{}\r\n", cmd).as_bytes()).await?;
        self.read_reply().await
    }

    /// Read one reply, following `xyz-` continuation lines.
    pub async fn read_reply(&mut self) -> SmtpResult<SmtpReply> {
        let timeout = self.io_timeout();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SmtpError::io("Not connected"))?;

        let mut raw = String::new();
        loop {
            let mut line = String::new();
            let n = tokio::time::timeout(timeout, stream.read_line(&mut line))
                .await
                .map_err(|_| SmtpError::io("Timed out waiting for server reply"))??;
            if n == 0 {
                return Err(SmtpError::io("Connection closed by server"));
            }
            debug!("S: {}", line.trim_end());
            let last = line.as_bytes().get(3) != Some(&b'-');
            raw.push_str(&line);
            if last {
                break;
            }
        }
        SmtpReply::parse(&raw)
    }

    pub async fn write_raw(&mut self, data: &[u8]) -> SmtpResult<()> {
        let timeout = self.io_timeout();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SmtpError::io("Not connected"))?;
        tokio::time::timeout(timeout, stream.write_all(data))
            .await
            .map_err(|_| SmtpError::io("Timed out writing to server"))??;
        Ok(())
    }

    // ── TLS ─────────────────────────────────────────────────────

    async fn tls_handshake(&self, tcp: TcpStream) -> SmtpResult<TlsStream<TcpStream>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        if let Some(ref ca_path) = self.config.ca_cert_path {
            let pem = tokio::fs::read(ca_path)
                .await
                .map_err(|e| SmtpError::tls(format!("Failed to read CA file {}: {}", ca_path, e)))?;
            for cert in rustls_pemfile::certs(&mut Cursor::new(pem)) {
                let cert = cert
                    .map_err(|e| SmtpError::tls(format!("Invalid PEM in {}: {}", ca_path, e)))?;
                roots
                    .add(cert)
                    .map_err(|e| SmtpError::tls(format!("Rejected CA certificate: {}", e)))?;
            }
        }

        let mut tls_config = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| SmtpError::tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        if !self.config.verify_certificates {
            warn!("TLS certificate verification disabled for {}", self.config.host);
            tls_config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoCertVerifier(provider)));
        }

        let server_name = ServerName::try_from(self.config.host.clone())
            .map_err(|e| SmtpError::tls(format!("Invalid server name {}: {}", self.config.host, e)))?;
        TlsConnector::from(Arc::new(tls_config))
            .connect(server_name, tcp)
            .await
            .map_err(|e| SmtpError::tls(format!("TLS handshake with {} failed: {}", self.config.host, e)))
    }
}

fn expect_positive(reply: SmtpReply, context: &str) -> SmtpResult<SmtpReply> {
    if reply.is_positive() {
        Ok(reply)
    } else {
        Err(SmtpError::server(reply.code, format!("{}: {}", context, reply.text())))
    }
}

/// Normalize line endings to CRLF and double any leading dot.
/// The result always ends with CRLF.
pub fn dot_stuff(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 64);
    let body = message.strip_suffix('\n').unwrap_or(message);
    let body = body.strip_suffix('\r').unwrap_or(body);
    for line in body.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}

// ─── Certificate verification bypass ────────────────────────────────

/// Accepts any server certificate but still checks handshake signatures.
#[derive(Debug)]
struct NoCertVerifier(Arc<CryptoProvider>);

impl ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
