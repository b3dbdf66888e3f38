use netkit::httpc::header::{HeaderMap, HeaderValue};
use netkit::httpc::*;
use serde::Deserialize;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize)]
struct Ack {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "State")]
    state: String,
}

#[tokio::test]
async fn client_from_json_config_puts_form_and_decodes_xml() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/jobs/7"))
        .and(header("content-type", CONTENT_TYPE_FORM))
        .and(header("authorization", "Bearer t0k"))
        .and(body_string("state=queued&note=r%26d"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<Ack><Id>7</Id><State>queued</State></Ack>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cfg = HttpClientConfig::from_json(
        r#"{"timeout":{"connect_ms":1000,"header_ms":3000,"idle_ms":500},"keep_alive":true}"#,
    )
    .unwrap();
    let client = HttpClient::new(cfg).unwrap();
    assert!(client.config().keep_alive);

    let mut headers = HeaderMap::new();
    headers.insert("authorization", HeaderValue::from_static("Bearer t0k"));
    let ack: Ack = client
        .put_form_xml(
            &format!("{}/jobs/7", server.uri()),
            Some(&headers),
            &[("state", "queued"), ("note", "r&d")],
        )
        .await
        .unwrap();
    assert_eq!(ack.id, "7");
    assert_eq!(ack.state, "queued");
    assert_eq!(headers.len(), 1);
}

#[tokio::test]
async fn delete_json_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/items"))
        .and(body_string(r#"["a","b"]"#))
        .respond_with(ResponseTemplate::new(200).set_body_string("[true,false]"))
        .mount(&server)
        .await;

    let client = HttpClient::new(HttpClientConfig::default()).unwrap();
    let flags: Vec<bool> = client
        .delete_json(
            &format!("{}/items", server.uri()),
            None,
            Some(Body::from(r#"["a","b"]"#)),
        )
        .await
        .unwrap();
    assert_eq!(flags, vec![true, false]);
}
