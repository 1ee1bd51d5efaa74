// XML-RPC dialect spoken by the hub: values, call/response documents,
// and the closed set of calls the hub pushes back to us.

mod codec;
mod inbound;
mod value;

pub use codec::{CodecError, MethodCall, MethodResponse};
pub use inbound::{
    EventNotification, InboundCall, METHOD_EVENT, METHOD_MULTICALL, ProtocolViolation,
};
pub use value::Value;
