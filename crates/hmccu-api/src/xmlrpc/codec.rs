// XML-RPC wire encoding.
//
// Requests are `<methodCall>` documents, responses `<methodResponse>` with
// either one `<param>` or a `<fault>`. Encoding writes straight into a
// String; decoding goes through the owned element tree in `crate::xml`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use quick_xml::escape::escape;
use thiserror::Error;

use super::value::Value;
use crate::error::Error;
use crate::xml::{self, Element, XmlError};

/// Arrays and structs nested deeper than this are rejected.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("expected <{expected}>, found <{found}>")]
    UnexpectedElement {
        expected: &'static str,
        found: String,
    },

    #[error("missing <{0}> element")]
    Missing(&'static str),

    #[error("invalid {kind} literal {literal:?}")]
    InvalidLiteral { kind: &'static str, literal: String },

    #[error("unsupported value type <{0}>")]
    UnsupportedType(String),

    #[error("value nesting exceeds 64 levels")]
    TooDeep,

    #[error("non-finite double {0} has no XML-RPC representation")]
    NonFinite(f64),
}

// ── MethodCall ───────────────────────────────────────────────────────

/// A remote call: method name plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub params: Vec<Value>,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Serialize to a `<methodCall>` document. Parameter order is preserved.
    ///
    /// Fails only for doubles that are NaN or infinite.
    pub fn encode(&self) -> Result<String, CodecError> {
        let mut out = String::from(r#"<?xml version="1.0"?><methodCall><methodName>"#);
        out.push_str(&escape(self.method.as_str()));
        out.push_str("</methodName><params>");
        for param in &self.params {
            out.push_str("<param>");
            write_value(&mut out, param)?;
            out.push_str("</param>");
        }
        out.push_str("</params></methodCall>");
        Ok(out)
    }

    pub fn decode(input: &str) -> Result<Self, CodecError> {
        let raw = RawCall::decode(input)?;
        let params = raw
            .params
            .iter()
            .map(decode_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            method: raw.method,
            params,
        })
    }
}

// ── RawCall ──────────────────────────────────────────────────────────

/// A `<methodCall>` whose parameters are still undecoded `<value>` elements.
///
/// Lets inbound routing decode multicall entries one at a time.
pub(crate) struct RawCall {
    pub method: String,
    pub params: Vec<Element>,
}

impl RawCall {
    pub fn decode(input: &str) -> Result<Self, CodecError> {
        let root = xml::parse(input)?;
        expect_name(&root, "methodCall")?;

        let method = root
            .child("methodName")
            .ok_or(CodecError::Missing("methodName"))?
            .text
            .trim()
            .to_owned();

        let params = match root.child("params") {
            Some(params) => params
                .children_named("param")
                .map(|param| param.child("value").cloned().ok_or(CodecError::Missing("value")))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self { method, params })
    }
}

/// Decode one `<value>` element.
pub(crate) fn decode_value(node: &Element) -> Result<Value, CodecError> {
    read_value(node, 0)
}

/// The item `<value>` elements of an `<array>` value, without decoding them.
pub(crate) fn array_items(node: &Element) -> Option<impl Iterator<Item = &Element>> {
    let typed = node.children.first().filter(|typed| typed.name == "array")?;
    Some(typed.child("data")?.children_named("value"))
}

// ── MethodResponse ───────────────────────────────────────────────────

/// The outcome of a remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Fault { code: i32, message: String },
}

impl MethodResponse {
    pub fn encode(&self) -> Result<String, CodecError> {
        let mut out = String::from(r#"<?xml version="1.0"?><methodResponse>"#);
        match self {
            Self::Success(value) => {
                out.push_str("<params><param>");
                write_value(&mut out, value)?;
                out.push_str("</param></params>");
            }
            Self::Fault { code, message } => {
                let mut members = BTreeMap::new();
                members.insert("faultCode".to_owned(), Value::from(*code));
                members.insert("faultString".to_owned(), Value::from(message.as_str()));
                out.push_str("<fault>");
                write_value(&mut out, &Value::Struct(members))?;
                out.push_str("</fault>");
            }
        }
        out.push_str("</methodResponse>");
        Ok(out)
    }

    pub fn decode(input: &str) -> Result<Self, CodecError> {
        let root = xml::parse(input)?;
        expect_name(&root, "methodResponse")?;

        if let Some(fault) = root.child("fault") {
            let value = read_value(fault.child("value").ok_or(CodecError::Missing("value"))?, 0)?;
            let members = value.as_struct();
            let code = members
                .and_then(|m| m.get("faultCode"))
                .and_then(Value::as_i64)
                .and_then(|c| i32::try_from(c).ok())
                .unwrap_or(-1);
            let message = members
                .and_then(|m| m.get("faultString"))
                .map(ToString::to_string)
                .unwrap_or_default();
            return Ok(Self::Fault { code, message });
        }

        // A response without params is how some hubs spell "void".
        let value = match root.child("params") {
            Some(params) => read_params(params)?.into_iter().next().unwrap_or_else(Value::void),
            None => Value::void(),
        };
        Ok(Self::Success(value))
    }

    /// Turn a fault into [`Error::Fault`].
    pub fn into_result(self) -> Result<Value, Error> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Fault { code, message } => Err(Error::Fault { code, message }),
        }
    }
}

// ── Encoding ─────────────────────────────────────────────────────────

fn write_value(out: &mut String, value: &Value) -> Result<(), CodecError> {
    out.push_str("<value>");
    match value {
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Int(n) => {
            let _ = match i32::try_from(*n) {
                Ok(small) => write!(out, "<i4>{small}</i4>"),
                Err(_) => write!(out, "<i8>{n}</i8>"),
            };
        }
        Value::Double(d) if !d.is_finite() => return Err(CodecError::NonFinite(*d)),
        Value::Double(d) => {
            let _ = write!(out, "<double>{d}</double>");
        }
        Value::Bool(b) => {
            let _ = write!(out, "<boolean>{}</boolean>", u8::from(*b));
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item)?;
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                write_value(out, member)?;
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
    Ok(())
}

// ── Decoding ─────────────────────────────────────────────────────────

fn expect_name(element: &Element, expected: &'static str) -> Result<(), CodecError> {
    if element.name == expected {
        Ok(())
    } else {
        Err(CodecError::UnexpectedElement {
            expected,
            found: element.name.clone(),
        })
    }
}

fn read_params(params: &Element) -> Result<Vec<Value>, CodecError> {
    params
        .children_named("param")
        .map(|param| {
            let value = param.child("value").ok_or(CodecError::Missing("value"))?;
            read_value(value, 0)
        })
        .collect()
}

fn read_value(node: &Element, depth: usize) -> Result<Value, CodecError> {
    if depth > MAX_DEPTH {
        return Err(CodecError::TooDeep);
    }

    // Untyped `<value>text</value>` is a string.
    let Some(typed) = node.children.first() else {
        return Ok(Value::String(node.text.clone()));
    };

    match typed.name.as_str() {
        "string" => Ok(Value::String(typed.text.clone())),
        "i4" | "int" | "i8" => parse_literal(&typed.text, "integer").map(Value::Int),
        "double" => parse_literal(&typed.text, "double").map(Value::Double),
        "boolean" => match typed.text.trim() {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            other => Err(CodecError::InvalidLiteral {
                kind: "boolean",
                literal: other.to_owned(),
            }),
        },
        "dateTime.iso8601" | "base64" => Ok(Value::String(typed.text.trim().to_owned())),
        "nil" => Ok(Value::void()),
        "array" => {
            let data = typed.child("data").ok_or(CodecError::Missing("data"))?;
            data.children_named("value")
                .map(|item| read_value(item, depth + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children_named("member") {
                let name = member
                    .child("name")
                    .ok_or(CodecError::Missing("name"))?
                    .text
                    .trim()
                    .to_owned();
                let value = member.child("value").ok_or(CodecError::Missing("value"))?;
                members.insert(name, read_value(value, depth + 1)?);
            }
            Ok(Value::Struct(members))
        }
        other => Err(CodecError::UnsupportedType(other.to_owned())),
    }
}

fn parse_literal<T: std::str::FromStr>(text: &str, kind: &'static str) -> Result<T, CodecError> {
    let trimmed = text.trim();
    trimmed.parse().map_err(|_| CodecError::InvalidLiteral {
        kind,
        literal: trimmed.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn encodes_parameters_in_order() {
        let call = MethodCall::new(
            "setValue",
            vec![Value::from("ABC123:3"), Value::from("LEVEL"), Value::Double(0.8)],
        );

        assert_eq!(
            call.encode().unwrap(),
            concat!(
                r#"<?xml version="1.0"?><methodCall><methodName>setValue</methodName><params>"#,
                "<param><value><string>ABC123:3</string></value></param>",
                "<param><value><string>LEVEL</string></value></param>",
                "<param><value><double>0.8</double></value></param>",
                "</params></methodCall>"
            )
        );
    }

    #[test]
    fn escapes_markup_in_strings() {
        let call = MethodCall::new("init", vec![Value::from("a<b&c")]);
        assert!(call.encode().unwrap().contains("<string>a&lt;b&amp;c</string>"));
    }

    #[test]
    fn decodes_hub_event_call() {
        let body = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
            <methodCall>
              <methodName>event</methodName>
              <params>
                <param><value>HomeMaticDriver</value></param>
                <param><value>ABC123:3</value></param>
                <param><value>LEVEL</value></param>
                <param><value><double>0.500000</double></value></param>
              </params>
            </methodCall>"#;

        let call = MethodCall::decode(body).unwrap();
        assert_eq!(call.method, "event");
        assert_eq!(
            call.params,
            vec![
                Value::from("HomeMaticDriver"),
                Value::from("ABC123:3"),
                Value::from("LEVEL"),
                Value::Double(0.5),
            ]
        );
    }

    #[test]
    fn decodes_nested_multicall_structure() {
        let body = r#"<methodCall><methodName>system.multicall</methodName><params><param>
            <value><array><data>
              <value><struct>
                <member><name>methodName</name><value>event</value></member>
                <member><name>params</name><value><array><data>
                  <value>id</value><value>XYZ:1</value><value>STATE</value>
                  <value><boolean>1</boolean></value>
                </data></array></value></member>
              </struct></value>
            </data></array></value>
        </param></params></methodCall>"#;

        let call = MethodCall::decode(body).unwrap();
        let entries = call.params[0].as_array().unwrap();
        let entry = entries[0].as_struct().unwrap();
        assert_eq!(entry["methodName"], Value::from("event"));
        assert_eq!(entry["params"].as_array().unwrap()[3], Value::Bool(true));
    }

    #[test]
    fn decodes_success_and_fault_responses() {
        let ok = r"<methodResponse><params><param><value><i4>42</i4></value></param></params></methodResponse>";
        assert_eq!(
            MethodResponse::decode(ok).unwrap(),
            MethodResponse::Success(Value::Int(42))
        );

        let fault = r"<methodResponse><fault><value><struct>
            <member><name>faultCode</name><value><int>-2</int></value></member>
            <member><name>faultString</name><value>Unknown instance</value></member>
            </struct></value></fault></methodResponse>";
        assert_eq!(
            MethodResponse::decode(fault).unwrap(),
            MethodResponse::Fault {
                code: -2,
                message: "Unknown instance".into()
            }
        );
    }

    #[test]
    fn fault_encoding_is_readable_by_decoder() {
        let fault = MethodResponse::Fault {
            code: -32700,
            message: "parse error".into(),
        };
        assert_eq!(MethodResponse::decode(&fault.encode().unwrap()).unwrap(), fault);
    }

    #[test]
    fn empty_response_is_void() {
        let body = "<methodResponse><params/></methodResponse>";
        assert_eq!(
            MethodResponse::decode(body).unwrap(),
            MethodResponse::Success(Value::void())
        );
    }

    #[test]
    fn rejects_bad_literals_and_unknown_types() {
        let bad_int = "<methodResponse><params><param><value><int>x</int></value></param></params></methodResponse>";
        assert!(matches!(
            MethodResponse::decode(bad_int),
            Err(CodecError::InvalidLiteral { kind: "integer", .. })
        ));

        let unknown = "<methodResponse><params><param><value><blob/></value></param></params></methodResponse>";
        assert_eq!(
            MethodResponse::decode(unknown),
            Err(CodecError::UnsupportedType("blob".into()))
        );
    }

    #[test]
    fn non_finite_doubles_are_not_encoded() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let call = MethodCall::new("setValue", vec![Value::from("A:1"), Value::Double(bad)]);
            assert!(matches!(call.encode(), Err(CodecError::NonFinite(_))));
        }

        let nested = MethodResponse::Success(Value::Array(vec![Value::Double(f64::NAN)]));
        assert!(matches!(nested.encode(), Err(CodecError::NonFinite(_))));
    }

    #[test]
    fn raw_call_keeps_params_undecoded() {
        let body = "<methodCall><methodName>event</methodName><params>\
            <param><value><i4>abc</i4></value></param>\
            <param><value><array><data><value>a</value><value><i4>2</i4></value></data></array></value></param>\
            </params></methodCall>";

        let raw = RawCall::decode(body).unwrap();
        assert_eq!(raw.method, "event");
        assert_eq!(raw.params.len(), 2);
        assert!(matches!(
            decode_value(&raw.params[0]),
            Err(CodecError::InvalidLiteral { kind: "integer", .. })
        ));
        let items: Vec<_> = array_items(&raw.params[1]).unwrap().map(|item| decode_value(item).unwrap()).collect();
        assert_eq!(items, vec![Value::from("a"), Value::Int(2)]);
        assert!(array_items(&raw.params[0]).is_none());
    }

    #[test]
    fn wrong_root_element_is_rejected() {
        assert!(matches!(
            MethodCall::decode("<methodResponse/>"),
            Err(CodecError::UnexpectedElement { expected: "methodCall", .. })
        ));
    }
}
