// Shared helpers: wiremock plays the hub's XML-RPC port, reqwest plays the
// hub pushing calls to the callback listener.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hmccu_api::{MethodCall, MethodResponse, Value};
use hmccu_core::HubConfig;

pub const REGISTER: &str = "<string>HomeMaticDriver</string>";
pub const DEREGISTER: &str = "<string></string>";

pub fn hub_config(server: &MockServer) -> HubConfig {
    let addr = server.address();
    let mut config = HubConfig::new(addr.ip().to_string());
    config.address.request_port = addr.port();
    config.address.callback_port = 0;
    config.callback_bind = IpAddr::V4(Ipv4Addr::LOCALHOST);
    config.callback_host = Some("127.0.0.1".into());
    config.xml_api_port = addr.port();
    config
}

pub fn rpc_ok(value: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(MethodResponse::Success(value).encode().unwrap())
}

pub fn rpc_fault(code: i32, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(
        MethodResponse::Fault {
            code,
            message: message.into(),
        }
        .encode()
        .unwrap(),
    )
}

/// Mount `init` handlers expecting `registrations` registrations and
/// `deregistrations` de-registrations.
pub async fn mount_init(server: &MockServer, registrations: u64, deregistrations: u64) {
    Mock::given(method("POST"))
        .and(body_string_contains("<methodName>init</methodName>"))
        .and(body_string_contains(REGISTER))
        .respond_with(rpc_ok(Value::void()))
        .expect(registrations)
        .named("init register")
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("<methodName>init</methodName>"))
        .and(body_string_contains(DEREGISTER))
        .respond_with(rpc_ok(Value::void()))
        .expect(deregistrations)
        .named("init deregister")
        .mount(server)
        .await;
}

/// Answer `getValue(address, datapoint)` with `value`.
pub async fn mount_get_value(server: &MockServer, address: &str, datapoint: &str, value: Value) {
    Mock::given(method("POST"))
        .and(body_string_contains("<methodName>getValue</methodName>"))
        .and(body_string_contains(format!("<string>{address}</string>")))
        .and(body_string_contains(format!("<string>{datapoint}</string>")))
        .respond_with(rpc_ok(value))
        .mount(server)
        .await;
}

pub fn event(address: &str, attribute: &str, value: Value) -> MethodCall {
    MethodCall::new(
        "event",
        vec![
            Value::Int(1),
            Value::from(address),
            Value::from(attribute),
            value,
        ],
    )
}

pub fn multicall(calls: &[MethodCall]) -> MethodCall {
    let entries = calls
        .iter()
        .map(|call| {
            let mut members = BTreeMap::new();
            members.insert("methodName".to_owned(), Value::from(call.method.as_str()));
            members.insert("params".to_owned(), Value::Array(call.params.clone()));
            Value::Struct(members)
        })
        .collect();
    MethodCall::new("system.multicall", vec![Value::Array(entries)])
}

/// POST a call to the callback listener the way the hub does.
pub async fn push(addr: SocketAddr, call: &MethodCall) -> Result<MethodResponse, reqwest::Error> {
    let body = reqwest::Client::new()
        .post(format!("http://{addr}/"))
        .header("content-type", "text/xml")
        .body(call.encode().unwrap())
        .send()
        .await?
        .text()
        .await?;
    Ok(MethodResponse::decode(&body).expect("listener answered with XML-RPC"))
}
