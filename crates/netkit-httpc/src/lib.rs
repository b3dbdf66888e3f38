//! **netkit-httpc**: HTTP request helpers.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Errors, timeout/proxy configuration, shared constants |
//! | [`client`] | Transport construction and the request/decode helpers |

pub mod types;
pub mod client;

pub use client::HttpClient;
pub use types::*;

pub use reqwest::header;
pub use reqwest::{Body, Method, Response, StatusCode};
