// Outbound XML-RPC caller
//
// One POST per call against the hub's request port. The request body is a
// `<methodCall>` document; the response is decoded into a `Value` or an
// `Error::Fault`. Typed helpers wrap the handful of methods the driver uses.

use std::collections::BTreeMap;
use std::time::Duration;

use secrecy::ExposeSecret;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::{BasicAuth, TransportConfig};
use crate::xmlrpc::{MethodCall, MethodResponse, Value};

/// XML-RPC client for one hub interface (e.g. BidCos-RF on port 2001).
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
    credentials: Option<BasicAuth>,
}

impl RpcClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(endpoint: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            endpoint,
            timeout: transport.timeout,
            credentials: transport.credentials.clone(),
        })
    }

    /// Create a client with a pre-built `reqwest::Client`. Used by tests.
    pub fn from_reqwest(endpoint: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            http,
            endpoint: Url::parse(endpoint)?,
            timeout: TransportConfig::default().timeout,
            credentials: None,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    // ── Generic call ─────────────────────────────────────────────────

    /// Invoke `method` with positional `params` and return the result value.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, Error> {
        let body = MethodCall::new(method, params).encode()?;
        debug!(method, endpoint = %self.endpoint, "xml-rpc call");
        trace!(method, body = %body, "request body");

        let mut request = self
            .http
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body);
        if let Some(auth) = &self.credentials {
            request = request.basic_auth(&auth.username, Some(auth.password.expose_secret()));
        }

        let resp = request.send().await.map_err(|e| self.map_send_error(e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.map_send_error(e))?;
        trace!(method, status = status.as_u16(), body = %text, "response body");

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let result = MethodResponse::decode(&text)?.into_result();
        if let Err(Error::Fault { code, message }) = &result {
            debug!(method, code, message = %message, "hub answered with fault");
        }
        result
    }

    fn map_send_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::Transport(err)
        }
    }

    // ── Typed helpers ────────────────────────────────────────────────

    /// Register (`interface_id` non-empty) or de-register (empty) a callback URL.
    pub async fn init(&self, callback_url: &str, interface_id: &str) -> Result<(), Error> {
        self.call(
            "init",
            vec![Value::from(callback_url), Value::from(interface_id)],
        )
        .await
        .map(drop)
    }

    /// Read a single datapoint, e.g. `get_value("ABC123:3", "LEVEL")`.
    pub async fn get_value(&self, address: &str, key: &str) -> Result<Value, Error> {
        self.call("getValue", vec![Value::from(address), Value::from(key)])
            .await
    }

    /// Write a single datapoint. Parameters go out as (address, key, value).
    pub async fn set_value(&self, address: &str, key: &str, value: Value) -> Result<(), Error> {
        self.call(
            "setValue",
            vec![Value::from(address), Value::from(key), value],
        )
        .await
        .map(drop)
    }

    /// Read a whole paramset (`"VALUES"`, `"MASTER"`, ...) as a name → value map.
    pub async fn get_paramset(
        &self,
        address: &str,
        paramset_key: &str,
    ) -> Result<BTreeMap<String, Value>, Error> {
        match self
            .call(
                "getParamset",
                vec![Value::from(address), Value::from(paramset_key)],
            )
            .await?
        {
            Value::Struct(members) => Ok(members),
            other => Err(Error::Codec(crate::xmlrpc::CodecError::UnexpectedElement {
                expected: "struct",
                found: other.type_name().to_owned(),
            })),
        }
    }
}
