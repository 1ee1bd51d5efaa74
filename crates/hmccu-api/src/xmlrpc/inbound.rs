// Calls the hub pushes to the callback listener.
//
// Decoded exactly once, at the transport boundary, into `InboundCall`.
// Routing code matches on the enum and never compares method names.

use thiserror::Error;

use crate::xml;

use super::codec::{self, CodecError, MethodCall, RawCall};
use super::value::Value;

pub const METHOD_EVENT: &str = "event";
pub const METHOD_MULTICALL: &str = "system.multicall";

const EVENT_PARAM_COUNT: usize = 4;

/// A single `event(interface_id, address, attribute, value)` push.
#[derive(Debug, Clone, PartialEq)]
pub struct EventNotification {
    /// The interface id the driver registered with. Informational only.
    pub interface_id: String,
    /// Hub-channel address, e.g. `"ABC123:3"`.
    pub address: String,
    /// Datapoint name, e.g. `"LEVEL"`.
    pub attribute: String,
    pub value: Value,
}

/// A call received from the hub, decoded into the shapes the driver handles.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundCall {
    Event(EventNotification),
    /// Each nested call decoded independently; a malformed entry does not
    /// affect its siblings.
    Multicall(Vec<Result<InboundCall, ProtocolViolation>>),
    /// Anything else (`listDevices`, `newDevices`, ...). Acknowledged and ignored.
    Other { method: String },
}

/// An inbound call that does not have the shape its method requires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("{method} expects {expected} parameters, got {actual}")]
    ParameterCount {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("{method} parameter {index} must be {expected}, got {actual}")]
    ParameterType {
        method: String,
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("multicall entry {index} is malformed: {reason}")]
    MulticallEntry { index: usize, reason: String },

    #[error("undecodable call: {0}")]
    Undecodable(String),
}

impl InboundCall {
    /// Decode a request body.
    ///
    /// The outer error is a body that is not a `methodCall` at all. Multicall
    /// entries are decoded one by one, so a bad literal inside one entry only
    /// turns that entry into a violation.
    pub fn parse(body: &str) -> Result<Result<Self, ProtocolViolation>, CodecError> {
        let raw = RawCall::decode(body)?;
        if raw.method == METHOD_MULTICALL {
            return Ok(decode_raw_multicall(&raw.params).map(Self::Multicall));
        }

        let params = raw
            .params
            .iter()
            .map(codec::decode_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::decode(MethodCall {
            method: raw.method,
            params,
        }))
    }

    pub fn decode(call: MethodCall) -> Result<Self, ProtocolViolation> {
        match call.method.as_str() {
            METHOD_EVENT => decode_event(call.params).map(Self::Event),
            METHOD_MULTICALL => decode_multicall(call.params).map(Self::Multicall),
            _ => Ok(Self::Other {
                method: call.method,
            }),
        }
    }
}

fn decode_event(params: Vec<Value>) -> Result<EventNotification, ProtocolViolation> {
    let actual = params.len();
    let Ok([interface_id, address, attribute, value]) =
        <[Value; EVENT_PARAM_COUNT]>::try_from(params)
    else {
        return Err(ProtocolViolation::ParameterCount {
            method: METHOD_EVENT.to_owned(),
            expected: EVENT_PARAM_COUNT,
            actual,
        });
    };

    Ok(EventNotification {
        interface_id: interface_id.to_string(),
        address: expect_string(address, 1)?,
        attribute: expect_string(attribute, 2)?,
        value,
    })
}

fn expect_string(value: Value, index: usize) -> Result<String, ProtocolViolation> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(ProtocolViolation::ParameterType {
            method: METHOD_EVENT.to_owned(),
            index,
            expected: "string",
            actual: other.type_name(),
        }),
    }
}

fn decode_multicall(
    params: Vec<Value>,
) -> Result<Vec<Result<InboundCall, ProtocolViolation>>, ProtocolViolation> {
    let mut calls = Vec::new();
    let mut index = 0;

    for (position, param) in params.into_iter().enumerate() {
        let Value::Array(entries) = param else {
            return Err(ProtocolViolation::ParameterType {
                method: METHOD_MULTICALL.to_owned(),
                index: position,
                expected: "array",
                actual: param.type_name(),
            });
        };
        for entry in entries {
            calls.push(decode_entry(entry, index));
            index += 1;
        }
    }

    Ok(calls)
}

fn decode_raw_multicall(
    params: &[xml::Element],
) -> Result<Vec<Result<InboundCall, ProtocolViolation>>, ProtocolViolation> {
    let mut calls = Vec::new();
    let mut index = 0;

    for (position, param) in params.iter().enumerate() {
        let Some(entries) = codec::array_items(param) else {
            return Err(ProtocolViolation::ParameterType {
                method: METHOD_MULTICALL.to_owned(),
                index: position,
                expected: "array",
                actual: codec::decode_value(param).map_or("malformed value", |v| v.type_name()),
            });
        };
        for entry in entries {
            let decoded = codec::decode_value(entry)
                .map_err(|e| ProtocolViolation::MulticallEntry {
                    index,
                    reason: e.to_string(),
                })
                .and_then(|value| decode_entry(value, index));
            calls.push(decoded);
            index += 1;
        }
    }

    Ok(calls)
}

fn decode_entry(entry: Value, index: usize) -> Result<InboundCall, ProtocolViolation> {
    let malformed = |reason: &str| ProtocolViolation::MulticallEntry {
        index,
        reason: reason.to_owned(),
    };

    let Value::Struct(mut members) = entry else {
        return Err(malformed("entry is not a struct"));
    };
    let method = match members.remove("methodName") {
        Some(Value::String(method)) => method,
        Some(_) => return Err(malformed("methodName is not a string")),
        None => return Err(malformed("missing methodName")),
    };
    let params = match members.remove("params") {
        Some(Value::Array(params)) => params,
        Some(_) => return Err(malformed("params is not an array")),
        None => Vec::new(),
    };

    InboundCall::decode(MethodCall { method, params })
}
