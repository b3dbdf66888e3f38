//! One-shot delivery: connect, authenticate, send one message, quit.

use std::path::Path;

use log::info;

use crate::auth::authenticate;
use crate::client::SmtpClient;
use crate::message::build_message;
use crate::types::*;

/// Deliver `email` through the server in `config`.
///
/// Runs the whole session and returns the server's reply to the message
/// data. The first failure aborts the session; the connection is closed on
/// every path.
pub async fn send_email(
    config: &SmtpConfig,
    creds: &SmtpCredentials,
    email: &Email,
) -> SmtpResult<SmtpReply> {
    let message = build_message(email)?;
    let mut client = SmtpClient::new(config.clone());
    let result = run_session(&mut client, creds, email, &message).await;
    client.quit().await;

    let reply = result?;
    info!(
        "Delivered \"{}\" from {} to {} recipient(s) via {}",
        email.subject,
        email.from,
        email.to.len(),
        config.host
    );
    Ok(reply)
}

async fn run_session(
    client: &mut SmtpClient,
    creds: &SmtpCredentials,
    email: &Email,
    message: &str,
) -> SmtpResult<SmtpReply> {
    client.connect().await?;
    client.ehlo().await?;
    if client.config().security == SmtpSecurity::StartTls {
        client.starttls().await?;
    }
    if !creds.is_empty() {
        authenticate(client, creds).await?;
    }
    client.send_envelope(&email.from, &email.to, message).await
}

/// Read each file in `paths` as an attachment, then [`send_email`].
pub async fn send_email_with_files<P: AsRef<Path>>(
    config: &SmtpConfig,
    creds: &SmtpCredentials,
    email: &Email,
    paths: &[P],
) -> SmtpResult<SmtpReply> {
    let mut email = email.clone();
    for path in paths {
        email.attachments.push(Attachment::from_path(path).await?);
    }
    send_email(config, creds, &email).await
}
