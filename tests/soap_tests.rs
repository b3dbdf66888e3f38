use netkit::httpc::{HttpClient, HttpClientConfig, Timeout};
use netkit::soap::*;
use serde::Deserialize;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    #[serde(rename = "Body")]
    body: SpeechBody,
}

#[derive(Debug, Deserialize)]
struct SpeechBody {
    #[serde(rename = "GetSpeechResponse")]
    response: GetSpeechResult,
}

#[derive(Debug, Deserialize)]
struct GetSpeechResult {
    #[serde(rename = "GetSpeechResult")]
    result: String,
}

const SPEECH_REPLY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Envelope xmlns="http://www.w3.org/2003/05/soap-envelope">
  <Body>
    <GetSpeechResponse>
      <GetSpeechResult>To be, or not to be</GetSpeechResult>
    </GetSpeechResponse>
  </Body>
</Envelope>"#;

fn http() -> HttpClient {
    HttpClient::new(HttpClientConfig::default().with_timeout(Timeout {
        connect_ms: 2_000,
        header_ms: 5_000,
        ..Default::default()
    }))
    .unwrap()
}

#[tokio::test]
async fn soap12_call_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/speech"))
        .and(header("content-type", "application/soap+xml;charset=UTF-8"))
        .and(body_string_contains(
            "xmlns:soap=\"http://www.w3.org/2003/05/soap-envelope\"",
        ))
        .and(body_string_contains("<Request>Hamlet &amp; Ophelia</Request>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SPEECH_REPLY))
        .expect(1)
        .mount(&server)
        .await;

    let client = SoapClient::new(SoapVersion::V1_2, http());
    let params = Param::try_from(json!({"GetSpeech": {"Request": "Hamlet & Ophelia"}})).unwrap();
    let reply: SpeechResponse = client
        .call_xml(&format!("{}/speech", server.uri()), None, &params)
        .await
        .unwrap();
    assert_eq!(reply.body.response.result, "To be, or not to be");
}

#[tokio::test]
async fn soap11_call_sends_default_action() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("soapaction", DEFAULT_SOAP_ACTION))
        .and(header("content-type", "text/xml; charset=UTF-8"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ok/>"))
        .expect(1)
        .mount(&server)
        .await;

    let client = SoapClient::new(SoapVersion::V1_1, http());
    assert_eq!(client.version(), SoapVersion::V1_1);
    let text = client.call(&server.uri(), &Param::empty()).await.unwrap();
    assert_eq!(text, "<ok/>");
}

#[test]
fn builder_headers_are_shared_and_static() {
    let a = SoapBuilder::new(SoapVersion::V1_1).headers();
    let b = SoapBuilder::new(SoapVersion::V1_1).headers();
    assert!(std::ptr::eq(a, b));
    assert_eq!(a.get(SOAP_ACTION).unwrap(), DEFAULT_SOAP_ACTION);
}

#[test]
fn unsupported_values_never_produce_a_document() {
    let builder = SoapBuilder::new(SoapVersion::V1_2);
    for bad in [json!({"a": 1}), json!({"a": [true]}), json!({"a": {"b": null}})] {
        let err = builder.build_json(&bad).unwrap_err();
        assert_eq!(err.kind, SoapErrorKind::UnsupportedValueKind);
    }
}
