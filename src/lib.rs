//! Client-side network helpers.
//!
//! | Module | Crate |
//! |---|---|
//! | [`httpc`] | HTTP requests with timeouts, proxy auth and body decoding |
//! | [`mail`] | SMTP delivery with file attachments |
//! | [`soap`] | SOAP 1.1 / 1.2 envelopes |

pub use netkit_httpc as httpc;
pub use netkit_mail as mail;
pub use netkit_soap as soap;
