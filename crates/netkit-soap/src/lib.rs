//! **netkit-soap**: SOAP 1.1 / 1.2 envelope builder.
//!
//! Callers describe the body as a [`Param`] tree (or a `serde_json::Value`
//! converted into one) and get back a complete envelope plus the HTTP
//! headers the chosen version expects.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | `SoapVersion`, `Param`, `Document`, errors |
//! | [`builder`] | Envelope construction and per-version header tables |
//! | [`client`] | Posting envelopes through `netkit-httpc` |

pub mod types;
pub mod builder;
pub mod client;

pub use builder::{SoapBuilder, SOAP_ACTION};
pub use client::SoapClient;
pub use types::*;
