// ── Runtime hub configuration ──
//
// These types describe *how* to reach a CCU and where it should push events.
// They carry credential data and connection tuning, but never touch disk.
// The host application (or `hmccu-config`) constructs a `HubConfig`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::error::CoreError;

/// Default XML-RPC port of the BidCos-RF interface.
pub const DEFAULT_REQUEST_PORT: u16 = 2001;
/// Default port of the callback listener.
pub const DEFAULT_CALLBACK_PORT: u16 = 20001;
/// Interface id registered with the hub unless configured otherwise.
pub const DEFAULT_INTERFACE_ID: &str = "HomeMaticDriver";
/// Consecutive protocol violations before an alarm is raised.
pub const DEFAULT_VIOLATION_THRESHOLD: u32 = 25;

/// Where the hub lives and which ports are used for each direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubAddress {
    pub host: String,
    /// The hub's XML-RPC port (outbound calls).
    pub request_port: u16,
    /// Local port the hub pushes events to. 0 picks an ephemeral port.
    pub callback_port: u16,
}

impl HubAddress {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            request_port: DEFAULT_REQUEST_PORT,
            callback_port: DEFAULT_CALLBACK_PORT,
        }
    }
}

/// HTTP basic-auth credentials for hubs with authentication enabled.
#[derive(Debug, Clone)]
pub struct HubCredentials {
    pub username: String,
    pub password: SecretString,
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification. Default, since CCUs ship self-signed certificates.
    #[default]
    DangerAcceptInvalid,
}

/// Configuration for one hub connection.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub address: HubAddress,
    /// Local address the callback listener binds to.
    pub callback_bind: IpAddr,
    /// Host advertised to the hub in the callback URL. `None` = discover
    /// the local interface that routes to the hub.
    pub callback_host: Option<String>,
    /// Name the driver registers under.
    pub interface_id: String,
    /// Port of the XML-API add-on (device list).
    pub xml_api_port: u16,
    /// Session token for newer XML-API add-on versions.
    pub xml_api_token: Option<SecretString>,
    pub credentials: Option<HubCredentials>,
    /// Use `https` for outbound XML-RPC calls.
    pub use_tls: bool,
    pub tls: TlsVerification,
    /// Request timeout for every outbound call.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub violation_alarm_threshold: u32,
}

impl HubConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            address: HubAddress::new(host),
            callback_bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            callback_host: None,
            interface_id: DEFAULT_INTERFACE_ID.into(),
            xml_api_port: 80,
            xml_api_token: None,
            credentials: None,
            use_tls: false,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            violation_alarm_threshold: DEFAULT_VIOLATION_THRESHOLD,
        }
    }

    /// URL of the hub's XML-RPC endpoint.
    pub fn rpc_url(&self) -> Result<Url, CoreError> {
        let scheme = if self.use_tls { "https" } else { "http" };
        parse_url(&format!(
            "{scheme}://{}:{}/",
            bracket_host(&self.address.host),
            self.address.request_port
        ))
    }

    /// Root of the XML-API add-on.
    pub fn xml_api_url(&self) -> Result<Url, CoreError> {
        parse_url(&format!(
            "http://{}:{}/addons/xmlapi/",
            bracket_host(&self.address.host),
            self.xml_api_port
        ))
    }

    /// Socket address the callback listener binds to.
    pub fn callback_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.callback_bind, self.address.callback_port)
    }
}

/// Wrap IPv6 literals in brackets for use in URLs.
pub(crate) fn bracket_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_owned()
    }
}

fn parse_url(raw: &str) -> Result<Url, CoreError> {
    Url::parse(raw).map_err(|e| CoreError::Config {
        message: format!("invalid hub URL {raw}: {e}"),
    })
}
