// Integration tests for `RpcClient` and `XmlApiClient` using wiremock.

use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use url::Url;
use wiremock::matchers::{basic_auth, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hmccu_api::{Error, RpcClient, TransportConfig, Value, XmlApiClient};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RpcClient) {
    let server = MockServer::start().await;
    let client = RpcClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();
    (server, client)
}

fn response(value_xml: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!(
        "<?xml version=\"1.0\"?><methodResponse><params><param><value>{value_xml}</value></param></params></methodResponse>"
    ))
}

fn fault(code: i32, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!(
        "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
         <member><name>faultCode</name><value><i4>{code}</i4></value></member>\
         <member><name>faultString</name><value><string>{message}</string></value></member>\
         </struct></value></fault></methodResponse>"
    ))
}

// ── Outbound calls ──────────────────────────────────────────────────

#[tokio::test]
async fn test_get_value_decodes_double() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("content-type", "text/xml"))
        .and(body_string_contains("<methodName>getValue</methodName>"))
        .and(body_string_contains("<string>ABC123:3</string>"))
        .respond_with(response("<double>0.350000</double>"))
        .expect(1)
        .mount(&server)
        .await;

    let value = client.get_value("ABC123:3", "LEVEL").await.unwrap();
    assert_eq!(value, Value::Double(0.35));
}

#[tokio::test]
async fn test_set_value_sends_params_in_order() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(body_string_contains(
            "<methodName>setValue</methodName><params>\
             <param><value><string>ABC123:3</string></value></param>\
             <param><value><string>LEVEL</string></value></param>\
             <param><value><double>0.8</double></value></param>",
        ))
        .respond_with(response(""))
        .expect(1)
        .mount(&server)
        .await;

    client
        .set_value("ABC123:3", "LEVEL", Value::Double(0.8))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_set_value_rejects_non_finite_double_before_sending() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .respond_with(response(""))
        .expect(0)
        .mount(&server)
        .await;

    let err = client
        .set_value("ABC123:3", "LEVEL", Value::Double(f64::NAN))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Codec(_)));
}

#[tokio::test]
async fn test_init_registers_and_deregisters() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(body_string_contains("<methodName>init</methodName>"))
        .and(body_string_contains("<string>HomeMaticDriver</string>"))
        .respond_with(response(""))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("<methodName>init</methodName>"))
        .and(body_string_contains("<string></string>"))
        .respond_with(response(""))
        .expect(1)
        .mount(&server)
        .await;

    client
        .init("http://10.0.0.2:20001", "HomeMaticDriver")
        .await
        .unwrap();
    client.init("http://10.0.0.2:20001", "").await.unwrap();
}

#[tokio::test]
async fn test_get_paramset_returns_mapping() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(body_string_contains("<methodName>getParamset</methodName>"))
        .respond_with(response(
            "<struct>\
             <member><name>LEVEL</name><value><double>1.0</double></value></member>\
             <member><name>WORKING</name><value><boolean>0</boolean></value></member>\
             </struct>",
        ))
        .mount(&server)
        .await;

    let paramset = client.get_paramset("ABC123:3", "VALUES").await.unwrap();
    assert_eq!(paramset.len(), 2);
    assert_eq!(paramset["LEVEL"], Value::Double(1.0));
    assert_eq!(paramset["WORKING"], Value::Bool(false));
}

// ── Failure modes ───────────────────────────────────────────────────

#[tokio::test]
async fn test_fault_is_surfaced() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .respond_with(fault(-2, "Unknown instance"))
        .mount(&server)
        .await;

    let err = client.get_value("NOPE:1", "LEVEL").await.unwrap_err();
    assert!(err.is_fault());
    match err {
        Error::Fault { code, message } => {
            assert_eq!(code, -2);
            assert_eq!(message, "Unknown instance");
        }
        other => panic!("expected Fault, got {other:?}"),
    }
}

#[tokio::test]
async fn test_http_error_status() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client.get_value("ABC:1", "LEVEL").await.unwrap_err();
    assert!(matches!(err, Error::Http { status: 500, .. }));
}

#[tokio::test]
async fn test_undecodable_body_is_codec_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not rpc</html>"))
        .mount(&server)
        .await;

    let err = client.get_value("ABC:1", "LEVEL").await.unwrap_err();
    assert!(matches!(err, Error::Codec(_)));
}

#[tokio::test]
async fn test_timeout_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(response("").set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let transport = TransportConfig::default().with_timeout(Duration::from_millis(200));
    let client = RpcClient::new(Url::parse(&server.uri()).unwrap(), &transport).unwrap();

    let err = client.get_value("ABC:1", "LEVEL").await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Port 9 on loopback is never served in the test environment.
    let client = RpcClient::from_reqwest("http://127.0.0.1:9/", reqwest::Client::new()).unwrap();
    let err = client.get_value("ABC:1", "LEVEL").await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}

#[tokio::test]
async fn test_basic_auth_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(basic_auth("Admin", "secret"))
        .respond_with(response("<i4>1</i4>"))
        .expect(1)
        .mount(&server)
        .await;

    let transport = TransportConfig::default()
        .with_basic_auth("Admin", SecretString::from("secret".to_owned()));
    let client = RpcClient::new(Url::parse(&server.uri()).unwrap(), &transport).unwrap();

    assert_eq!(client.get_value("ABC:1", "STATE").await.unwrap(), Value::Int(1));
}

// ── Device list ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_device_list_with_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/addons/xmlapi/devicelist.cgi"))
        .and(query_param("sid", "tok"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<deviceList>
                 <device name="Hall" address="LEQ1" ise_id="10" device_type="HM-LC-Sw1-Pl">
                   <channel name="Hall light" address="LEQ1:1" ise_id="11" index="1"/>
                 </device>
               </deviceList>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let base = Url::parse(&format!("{}/addons/xmlapi/", server.uri())).unwrap();
    let client = XmlApiClient::new(
        base,
        Some(SecretString::from("tok".to_owned())),
        &TransportConfig::default(),
    )
    .unwrap();

    let devices = client.device_list().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].channels[0].address, "LEQ1:1");
    assert_eq!(devices[0].channels[0].ise_id, 11);
}
