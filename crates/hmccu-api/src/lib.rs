// hmccu-api: XML-RPC transport for HomeMatic CCU hubs (outbound calls + callback listener)

pub mod client;
pub mod error;
pub mod server;
pub mod transport;
pub mod xml;
pub mod xmlapi;
pub mod xmlrpc;

pub use client::RpcClient;
pub use error::Error;
pub use server::{CallbackServer, EventSink, discover_local_ip};
pub use transport::{BasicAuth, TlsMode, TransportConfig};
pub use xmlapi::{ChannelEntry, DeviceListEntry, XmlApiClient};
pub use xmlrpc::{
    EventNotification, InboundCall, MethodCall, MethodResponse, ProtocolViolation, Value,
};
