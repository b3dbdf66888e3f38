//! Send envelopes over HTTP.

use log::{debug, trace};
use netkit_httpc::client::decode_xml;
use netkit_httpc::HttpClient;
use serde::de::DeserializeOwned;

use crate::builder::SoapBuilder;
use crate::types::*;

/// Posts SOAP envelopes with the headers of one protocol version.
#[derive(Debug, Clone)]
pub struct SoapClient {
    builder: SoapBuilder,
    http: HttpClient,
}

impl SoapClient {
    pub fn new(version: SoapVersion, http: HttpClient) -> Self {
        Self {
            builder: SoapBuilder::new(version),
            http,
        }
    }

    pub fn version(&self) -> SoapVersion {
        self.builder.version()
    }

    pub fn builder(&self) -> &SoapBuilder {
        &self.builder
    }

    /// POST `params` to `url` and return the response body as text.
    pub async fn call(&self, url: &str, params: &Param) -> SoapResult<String> {
        self.call_with_action(url, None, params).await
    }

    /// As [`call`](Self::call), with a custom `SOAPAction` (SOAP 1.1 only).
    pub async fn call_with_action(
        &self,
        url: &str,
        action: Option<&str>,
        params: &Param,
    ) -> SoapResult<String> {
        let data = self.send(url, action, params).await?;
        String::from_utf8(data)
            .map_err(|e| SoapError::transport(format!("Response from {} is not UTF-8: {}", url, e)))
    }

    /// POST `params` and decode the XML response into `T`.
    pub async fn call_xml<T: DeserializeOwned>(
        &self,
        url: &str,
        action: Option<&str>,
        params: &Param,
    ) -> SoapResult<T> {
        let data = self.send(url, action, params).await?;
        Ok(decode_xml(&data)?)
    }

    async fn send(&self, url: &str, action: Option<&str>, params: &Param) -> SoapResult<Vec<u8>> {
        let doc = self.builder.build(params)?;
        let headers = self.builder.request_headers(action)?;
        debug!("{} call to {}", self.builder.version(), url);
        trace!("SOAP request:\n{}", doc);
        let data = self
            .http
            .post_bytes(url, Some(&headers), doc.into_bytes())
            .await?;
        trace!("SOAP response ({} bytes)", data.len());
        Ok(data)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
