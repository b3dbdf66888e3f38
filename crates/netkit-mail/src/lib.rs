//! **netkit-mail**: SMTP sender with MIME attachments.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Errors, configuration, `Email`/`Attachment`, reply parsing |
//! | [`client`] | SMTP protocol engine (EHLO, STARTTLS, MAIL/RCPT/DATA) |
//! | [`auth`] | AUTH PLAIN and LOGIN |
//! | [`message`] | Plain and `multipart/mixed` message serialization |
//! | [`send`] | One-shot `send_email` / `send_email_with_files` |

pub mod types;
pub mod client;
pub mod auth;
pub mod message;
pub mod send;

pub use client::SmtpClient;
pub use message::build_message;
pub use send::{send_email, send_email_with_files};
pub use types::*;
