//! SMTP AUTH with the PLAIN and LOGIN mechanisms.
//!
//! Credentials are only sent over TLS, or in the clear to a loopback host.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use log::{debug, warn};

use crate::client::SmtpClient;
use crate::types::*;

/// Authenticate with `creds`. Uses `creds.method` when set, otherwise
/// PLAIN unless the server only advertises LOGIN.
pub async fn authenticate(client: &mut SmtpClient, creds: &SmtpCredentials) -> SmtpResult<()> {
    if !client.is_tls_active() && !is_loopback(&client.config().host) {
        return Err(SmtpError::auth(format!(
            "Refusing to send credentials to {} over an unencrypted connection",
            client.config().host
        )));
    }

    let method = select_auth_method(client.capabilities(), creds);
    debug!("Authenticating as {} with {}", creds.username, method);

    match method {
        SmtpAuthMethod::Plain => auth_plain(client, creds).await,
        SmtpAuthMethod::Login => auth_login(client, creds).await,
    }
}

pub fn select_auth_method(caps: Option<&EhloCapabilities>, creds: &SmtpCredentials) -> SmtpAuthMethod {
    if let Some(m) = creds.method {
        return m;
    }
    match caps {
        Some(c) if !c.supports_auth("PLAIN") && c.supports_auth("LOGIN") => SmtpAuthMethod::Login,
        Some(c) if c.auth_mechanisms.is_empty() => {
            warn!("Server advertised no AUTH mechanisms, trying PLAIN");
            SmtpAuthMethod::Plain
        }
        _ => SmtpAuthMethod::Plain,
    }
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1" | "[::1]")
}

/// `\0username\0password`, base64 encoded.
pub fn build_plain_payload(username: &str, password: &str) -> String {
    B64.encode(format!("\0{}\0{}", username, password))
}

async fn auth_plain(client: &mut SmtpClient, creds: &SmtpCredentials) -> SmtpResult<()> {
    let payload = build_plain_payload(&creds.username, &creds.password);
    let reply = client
        .command_redacted(&format!("AUTH PLAIN {}", payload), "AUTH PLAIN <credentials>")
        .await?;
    if !reply.is_positive() {
        return Err(SmtpError::auth(format!("AUTH PLAIN failed: {}", reply)).with_code(reply.code));
    }
    client.set_authenticated(true);
    Ok(())
}

async fn auth_login(client: &mut SmtpClient, creds: &SmtpCredentials) -> SmtpResult<()> {
    let steps = [
        ("AUTH LOGIN".to_string(), "AUTH LOGIN", "AUTH LOGIN rejected"),
        (B64.encode(&creds.username), "<username>", "AUTH LOGIN username rejected"),
    ];
    for (line, label, context) in steps.iter() {
        let reply = client.command_redacted(line, label).await?;
        if !reply.is_intermediate() {
            return Err(SmtpError::auth(format!("{}: {}", context, reply)).with_code(reply.code));
        }
    }

    let reply = client
        .command_redacted(&B64.encode(&creds.password), "<password>")
        .await?;
    if !reply.is_positive() {
        return Err(
            SmtpError::auth(format!("AUTH LOGIN password rejected: {}", reply)).with_code(reply.code),
        );
    }
    client.set_authenticated(true);
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────
