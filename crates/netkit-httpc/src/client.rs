//! Transport construction and request helpers.
//!
//! [`HttpClient`] wraps a configured `reqwest::Client`. Every helper funnels
//! into [`HttpClient::request`]; the `_bytes`, `_json` and `_xml` variants read
//! the whole body and decode it. Response status is not checked: callers get
//! whatever the server sent.

use log::{debug, trace};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Body, Method, Response};
use serde::de::DeserializeOwned;

use crate::types::*;

/// Build the underlying `reqwest::Client` for a configuration.
pub fn build_transport(config: &HttpClientConfig) -> HttpResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder();

    if !config.keep_alive {
        builder = builder.pool_max_idle_per_host(0);
    }

    if let Some(ref t) = config.timeout {
        if let Some(d) = t.connect() {
            builder = builder.connect_timeout(d);
        }
        if let Some(d) = t.read() {
            builder = builder.read_timeout(d);
        }
        if let Some(d) = t.idle() {
            builder = builder.pool_idle_timeout(d);
        }
    }

    if config.proxy.is_enabled() {
        let mut proxy = reqwest::Proxy::all(config.proxy.host.as_str()).map_err(|e| {
            HttpError::config(format!("Invalid proxy URL {}: {}", config.proxy.host, e))
        })?;
        if config.proxy.has_auth() {
            proxy = proxy.basic_auth(&config.proxy.user, &config.proxy.password);
        }
        debug!("Routing HTTP traffic through proxy {}", config.proxy.host);
        builder = builder.proxy(proxy);
    } else {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|e| HttpError::config(format!("Failed to build HTTP client: {}", e)))
}

/// Url-encode form fields in the given order.
pub fn encode_form<K: AsRef<str>, V: AsRef<str>>(form: &[(K, V)]) -> String {
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in form {
        ser.append_pair(k.as_ref(), v.as_ref());
    }
    ser.finish()
}

/// Copy the caller's headers and force the form content type.
fn form_headers(headers: Option<&HeaderMap>) -> HeaderMap {
    let mut h = headers.cloned().unwrap_or_default();
    h.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_FORM));
    h
}

/// Read a response body to the end.
pub async fn read_bytes(resp: Response) -> HttpResult<Vec<u8>> {
    let data = resp.bytes().await?;
    Ok(data.to_vec())
}

pub fn decode_json<T: DeserializeOwned>(data: &[u8]) -> HttpResult<T> {
    Ok(serde_json::from_slice(data)?)
}

pub fn decode_xml<T: DeserializeOwned>(data: &[u8]) -> HttpResult<T> {
    let text = std::str::from_utf8(data)
        .map_err(|e| HttpError::decode(format!("XML body is not UTF-8: {}", e)))?;
    Ok(quick_xml::de::from_str(text)?)
}

// ─── HttpClient ─────────────────────────────────────────────────────

/// HTTP client with timeout and proxy configuration applied.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> HttpResult<Self> {
        let client = build_transport(&config)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    // ── Core ────────────────────────────────────────────────────

    /// Send a request and return the raw response.
    ///
    /// `headers` is copied into the request; the caller's map is untouched.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        headers: Option<&HeaderMap>,
        body: Option<Body>,
    ) -> HttpResult<Response> {
        let mut builder = self.client.request(method, url);
        if let Some(h) = headers {
            builder = builder.headers(h.clone());
        }
        if let Some(b) = body {
            builder = builder.body(b);
        }
        let req = builder.build()?;
        trace!(
            "HTTP request: {} {}\n{:?}",
            req.method(),
            req.url(),
            req.headers()
        );

        let pending = self.client.execute(req);
        let deadline = self.config.timeout.as_ref().and_then(Timeout::send_deadline);
        let resp = match deadline {
            Some(d) => tokio::time::timeout(d, pending).await.map_err(|_| {
                HttpError::timeout(format!("No response headers from {} within {:?}", url, d))
            })??,
            None => pending.await?,
        };

        trace!(
            "HTTP response: {} from {}\n{:?}",
            resp.status(),
            resp.url(),
            resp.headers()
        );
        if !resp.status().is_success() {
            debug!("HTTP {} returned status {}", url, resp.status());
        }
        Ok(resp)
    }

    pub async fn request_bytes(
        &self,
        method: Method,
        url: &str,
        headers: Option<&HeaderMap>,
        body: Option<Body>,
    ) -> HttpResult<Vec<u8>> {
        let resp = self.request(method, url, headers, body).await?;
        read_bytes(resp).await
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        headers: Option<&HeaderMap>,
        body: Option<Body>,
    ) -> HttpResult<T> {
        let data = self.request_bytes(method, url, headers, body).await?;
        decode_json(&data)
    }

    pub async fn request_xml<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        headers: Option<&HeaderMap>,
        body: Option<Body>,
    ) -> HttpResult<T> {
        let data = self.request_bytes(method, url, headers, body).await?;
        decode_xml(&data)
    }

    // ── GET ─────────────────────────────────────────────────────

    pub async fn get(&self, url: &str, headers: Option<&HeaderMap>) -> HttpResult<Response> {
        self.request(Method::GET, url, headers, None).await
    }

    pub async fn get_bytes(&self, url: &str, headers: Option<&HeaderMap>) -> HttpResult<Vec<u8>> {
        self.request_bytes(Method::GET, url, headers, None).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
    ) -> HttpResult<T> {
        self.request_json(Method::GET, url, headers, None).await
    }

    pub async fn get_xml<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
    ) -> HttpResult<T> {
        self.request_xml(Method::GET, url, headers, None).await
    }

    // ── PUT ─────────────────────────────────────────────────────

    pub async fn put(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        body: impl Into<Body>,
    ) -> HttpResult<Response> {
        self.request(Method::PUT, url, headers, Some(body.into())).await
    }

    pub async fn put_bytes(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        body: impl Into<Body>,
    ) -> HttpResult<Vec<u8>> {
        self.request_bytes(Method::PUT, url, headers, Some(body.into())).await
    }

    pub async fn put_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        body: impl Into<Body>,
    ) -> HttpResult<T> {
        self.request_json(Method::PUT, url, headers, Some(body.into())).await
    }

    pub async fn put_xml<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        body: impl Into<Body>,
    ) -> HttpResult<T> {
        self.request_xml(Method::PUT, url, headers, Some(body.into())).await
    }

    // ── POST ────────────────────────────────────────────────────

    pub async fn post(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        body: impl Into<Body>,
    ) -> HttpResult<Response> {
        self.request(Method::POST, url, headers, Some(body.into())).await
    }

    pub async fn post_bytes(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        body: impl Into<Body>,
    ) -> HttpResult<Vec<u8>> {
        self.request_bytes(Method::POST, url, headers, Some(body.into())).await
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        body: impl Into<Body>,
    ) -> HttpResult<T> {
        self.request_json(Method::POST, url, headers, Some(body.into())).await
    }

    pub async fn post_xml<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        body: impl Into<Body>,
    ) -> HttpResult<T> {
        self.request_xml(Method::POST, url, headers, Some(body.into())).await
    }

    // ── DELETE ──────────────────────────────────────────────────

    pub async fn delete(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        body: Option<Body>,
    ) -> HttpResult<Response> {
        self.request(Method::DELETE, url, headers, body).await
    }

    pub async fn delete_bytes(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        body: Option<Body>,
    ) -> HttpResult<Vec<u8>> {
        self.request_bytes(Method::DELETE, url, headers, body).await
    }

    pub async fn delete_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        body: Option<Body>,
    ) -> HttpResult<T> {
        self.request_json(Method::DELETE, url, headers, body).await
    }

    pub async fn delete_xml<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        body: Option<Body>,
    ) -> HttpResult<T> {
        self.request_xml(Method::DELETE, url, headers, body).await
    }

    // ── Forms ───────────────────────────────────────────────────
    //
    // The form content type is always set, overriding any value the
    // caller put in `headers`.

    pub async fn request_form<K: AsRef<str>, V: AsRef<str>>(
        &self,
        method: Method,
        url: &str,
        headers: Option<&HeaderMap>,
        form: &[(K, V)],
    ) -> HttpResult<Response> {
        let h = form_headers(headers);
        self.request(method, url, Some(&h), Some(Body::from(encode_form(form))))
            .await
    }

    pub async fn put_form<K: AsRef<str>, V: AsRef<str>>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        form: &[(K, V)],
    ) -> HttpResult<Response> {
        self.request_form(Method::PUT, url, headers, form).await
    }

    pub async fn put_form_bytes<K: AsRef<str>, V: AsRef<str>>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        form: &[(K, V)],
    ) -> HttpResult<Vec<u8>> {
        let resp = self.request_form(Method::PUT, url, headers, form).await?;
        read_bytes(resp).await
    }

    pub async fn put_form_json<T: DeserializeOwned, K: AsRef<str>, V: AsRef<str>>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        form: &[(K, V)],
    ) -> HttpResult<T> {
        let data = self.put_form_bytes(url, headers, form).await?;
        decode_json(&data)
    }

    pub async fn put_form_xml<T: DeserializeOwned, K: AsRef<str>, V: AsRef<str>>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        form: &[(K, V)],
    ) -> HttpResult<T> {
        let data = self.put_form_bytes(url, headers, form).await?;
        decode_xml(&data)
    }

    pub async fn post_form<K: AsRef<str>, V: AsRef<str>>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        form: &[(K, V)],
    ) -> HttpResult<Response> {
        self.request_form(Method::POST, url, headers, form).await
    }

    pub async fn post_form_bytes<K: AsRef<str>, V: AsRef<str>>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        form: &[(K, V)],
    ) -> HttpResult<Vec<u8>> {
        let resp = self.request_form(Method::POST, url, headers, form).await?;
        read_bytes(resp).await
    }

    pub async fn post_form_json<T: DeserializeOwned, K: AsRef<str>, V: AsRef<str>>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        form: &[(K, V)],
    ) -> HttpResult<T> {
        let data = self.post_form_bytes(url, headers, form).await?;
        decode_json(&data)
    }

    pub async fn post_form_xml<T: DeserializeOwned, K: AsRef<str>, V: AsRef<str>>(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        form: &[(K, V)],
    ) -> HttpResult<T> {
        let data = self.post_form_bytes(url, headers, form).await?;
        decode_xml(&data)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::time::Duration;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new(HttpClientConfig::default()).unwrap()
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Status {
        ok: bool,
        count: u32,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Speech {
        #[serde(rename = "Title")]
        title: String,
        #[serde(rename = "Line")]
        lines: Vec<String>,
    }

    #[test]
    fn encode_form_keeps_order_and_escapes() {
        let body = encode_form(&[("name", "a b"), ("q", "x&y")]);
        assert_eq!(body, "name=a+b&q=x%26y");
    }

    #[test]
    fn form_headers_override_content_type_on_a_copy() {
        let mut caller = HeaderMap::new();
        caller.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let h = form_headers(Some(&caller));
        assert_eq!(h.get(CONTENT_TYPE).unwrap(), CONTENT_TYPE_FORM);
        assert_eq!(caller.get(CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[test]
    fn invalid_proxy_url_is_config_error() {
        let cfg = HttpClientConfig::default().with_proxy(ProxySettings {
            host: "http://[::1".into(),
            ..Default::default()
        });
        let err = HttpClient::new(cfg).unwrap_err();
        assert_eq!(err.kind, HttpErrorKind::Config);
    }

    #[tokio::test]
    async fn get_bytes_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/raw"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let data = client()
            .get_bytes(&format!("{}/raw", server.uri()), None)
            .await
            .unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn non_success_status_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&server)
            .await;

        let resp = client().get(&server.uri(), None).await.unwrap();
        assert_eq!(resp.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn get_json_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true,"count":3}"#))
            .mount(&server)
            .await;

        let status: Status = client()
            .get_json(&format!("{}/status", server.uri()), None)
            .await
            .unwrap();
        assert_eq!(status, Status { ok: true, count: 3 });
    }

    #[tokio::test]
    async fn get_json_bad_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html/>"))
            .mount(&server)
            .await;

        let err = client()
            .get_json::<Status>(&server.uri(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, HttpErrorKind::Decode);
    }

    #[tokio::test]
    async fn post_xml_decodes_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/speech"))
            .and(body_string("<GetSpeech/>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<Speech><Title>Hamlet</Title><Line>To be</Line><Line>or not</Line></Speech>",
            ))
            .mount(&server)
            .await;

        let speech: Speech = client()
            .post_xml(&format!("{}/speech", server.uri()), None, "<GetSpeech/>")
            .await
            .unwrap();
        assert_eq!(speech.title, "Hamlet");
        assert_eq!(speech.lines, vec!["To be", "or not"]);
    }

    #[tokio::test]
    async fn post_form_sets_content_type_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/form"))
            .and(header("content-type", CONTENT_TYPE_FORM))
            .and(header("x-trace", "1"))
            .and(body_string("name=a+b&lang=rust"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true,"count":2}"#))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-trace", HeaderValue::from_static("1"));
        let status: Status = client()
            .post_form_json(
                &format!("{}/form", server.uri()),
                Some(&headers),
                &[("name", "a b"), ("lang", "rust")],
            )
            .await
            .unwrap();
        assert_eq!(status.count, 2);
        assert!(headers.get(CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn put_and_delete_use_their_verbs() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/item"))
            .respond_with(ResponseTemplate::new(200).set_body_string("put"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/item"))
            .respond_with(ResponseTemplate::new(200).set_body_string("deleted"))
            .mount(&server)
            .await;

        let c = client();
        let url = format!("{}/item", server.uri());
        assert_eq!(c.put_bytes(&url, None, "x").await.unwrap(), b"put");
        assert_eq!(c.delete_bytes(&url, None, None).await.unwrap(), b"deleted");
    }

    #[tokio::test]
    async fn slow_headers_hit_header_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_millis(800)),
            )
            .mount(&server)
            .await;

        let cfg = HttpClientConfig::default().with_timeout(Timeout {
            header_ms: 50,
            ..Default::default()
        });
        let err = HttpClient::new(cfg)
            .unwrap()
            .get(&server.uri(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, HttpErrorKind::Timeout);
    }

    #[tokio::test]
    async fn requests_go_through_authenticated_proxy() {
        let proxy = MockServer::start().await;
        // "user:pass" in base64
        Mock::given(method("GET"))
            .and(path("/via-proxy"))
            .and(header("proxy-authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("proxied"))
            .expect(1)
            .mount(&proxy)
            .await;

        let cfg = HttpClientConfig::default().with_proxy(ProxySettings {
            host: proxy.uri(),
            user: "user".into(),
            password: "pass".into(),
        });
        let data = HttpClient::new(cfg)
            .unwrap()
            .get_bytes("http://upstream.invalid/via-proxy", None)
            .await
            .unwrap();
        assert_eq!(data, b"proxied");
    }

    #[tokio::test]
    async fn refused_connection_is_connection_error() {
        let err = client()
            .get("http://127.0.0.1:1/", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, HttpErrorKind::Connection);
    }
}
