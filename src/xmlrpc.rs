// 📡 XML-RPC Codec - methodCall encoding, methodResponse decoding
//
// Values travel as serde_json::Value:
//   <int>/<i4>/<i8>  <-> Number (integer)
//   <double>         <-> Number (float)
//   <boolean>        <-> Bool
//   <string>, bare   <-> String
//   <dateTime.iso8601>, <base64> -> String (decode only)
//   <nil/>           <-> Null
//   <array>          <-> Array
//   <struct>         <-> Object

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Cannot encode value: {0}")]
    Unencodable(String),
}

/// Decoded methodResponse: either a value or a server fault
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Fault { code: i64, message: String },
}

// ============================================================================
// ENCODING
// ============================================================================

/// Encode a `<methodCall>` document
pub fn encode_call(method: &str, params: &[Value]) -> Result<String, CodecError> {
    let mut out = String::with_capacity(256);
    out.push_str("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(param, &mut out)?;
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    Ok(out)
}

fn encode_value(value: &Value, out: &mut String) -> Result<(), CodecError> {
    out.push_str("<value>");
    match value {
        Value::Null => out.push_str("<nil/>"),
        Value::Bool(b) => {
            out.push_str("<boolean>");
            out.push_str(if *b { "1" } else { "0" });
            out.push_str("</boolean>");
        }
        Value::Number(n) => encode_number(n, out)?,
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(item, out)?;
            }
            out.push_str("</data></array>");
        }
        Value::Object(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                encode_value(member, out)?;
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
    Ok(())
}

fn encode_number(n: &Number, out: &mut String) -> Result<(), CodecError> {
    if let Some(i) = n.as_i64() {
        if i32::try_from(i).is_ok() {
            out.push_str(&format!("<int>{}</int>", i));
        } else {
            out.push_str(&format!("<i8>{}</i8>", i));
        }
        return Ok(());
    }

    match n.as_f64() {
        Some(f) if f.is_finite() => {
            out.push_str(&format!("<double>{}</double>", f));
            Ok(())
        }
        _ => Err(CodecError::Unencodable(n.to_string())),
    }
}

// ============================================================================
// DECODING
// ============================================================================

/// One open container while walking the document
enum Frame {
    Value {
        typed: Option<String>,
        text: String,
        sealed: bool,
        child: Option<Value>,
    },
    Array(Vec<Value>),
    Data,
    Struct(Map<String, Value>),
    Member { name: Option<String>, value: Option<Value> },
    Name(String),
    Other,
}

/// Decode a `<methodResponse>` document
pub fn decode_response(xml: &str) -> Result<MethodResponse, CodecError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Frame> = Vec::new();
    let mut params: Vec<Value> = Vec::new();
    let mut fault: Option<Value> = None;
    let mut in_fault = false;
    let mut saw_response = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| CodecError::Xml(e.to_string()))?;

        match event {
            Event::Start(ref e) => {
                let tag = String::from_utf8_lossy(e.local_name().into_inner()).to_string();
                open_tag(&tag, &mut stack, &mut in_fault, &mut saw_response);
            }
            Event::Empty(ref e) => {
                let tag = String::from_utf8_lossy(e.local_name().into_inner()).to_string();
                open_tag(&tag, &mut stack, &mut in_fault, &mut saw_response);
                close_tag(&tag, &mut stack, &mut params, &mut fault, in_fault)?;
            }
            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map_err(|err| CodecError::Xml(err.to_string()))?;
                append_text(&mut stack, &text);
            }
            Event::CData(ref e) => {
                let text = String::from_utf8_lossy(e).to_string();
                append_text(&mut stack, &text);
            }
            Event::End(ref e) => {
                let tag = String::from_utf8_lossy(e.local_name().into_inner()).to_string();
                close_tag(&tag, &mut stack, &mut params, &mut fault, in_fault)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_response {
        return Err(CodecError::Malformed("missing <methodResponse>".to_string()));
    }

    if let Some(fault) = fault {
        let code = fault
            .get("faultCode")
            .and_then(|c| c.as_i64().or_else(|| c.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(0);
        let message = fault
            .get("faultString")
            .and_then(Value::as_str)
            .unwrap_or("unknown fault")
            .to_string();
        return Ok(MethodResponse::Fault { code, message });
    }

    params
        .into_iter()
        .next()
        .map(MethodResponse::Success)
        .ok_or_else(|| CodecError::Malformed("response carries no value".to_string()))
}

fn open_tag(tag: &str, stack: &mut Vec<Frame>, in_fault: &mut bool, saw_response: &mut bool) {
    match tag {
        "methodResponse" => *saw_response = true,
        "fault" => *in_fault = true,
        "value" => stack.push(Frame::Value {
            typed: None,
            text: String::new(),
            sealed: false,
            child: None,
        }),
        "array" => stack.push(Frame::Array(Vec::new())),
        "data" => stack.push(Frame::Data),
        "struct" => stack.push(Frame::Struct(Map::new())),
        "member" => stack.push(Frame::Member { name: None, value: None }),
        "name" => stack.push(Frame::Name(String::new())),
        "int" | "i4" | "i8" | "double" | "boolean" | "string" | "dateTime.iso8601" | "base64"
        | "nil" => {
            // Whitespace before the type element is not part of the scalar
            if let Some(Frame::Value { typed, text, .. }) = stack.last_mut() {
                *typed = Some(tag.to_string());
                text.clear();
            }
        }
        _ => stack.push(Frame::Other),
    }
}

fn append_text(stack: &mut [Frame], chunk: &str) {
    match stack.last_mut() {
        Some(Frame::Value {
            text,
            sealed: false,
            ..
        }) => text.push_str(chunk),
        Some(Frame::Name(name)) => name.push_str(chunk),
        _ => {}
    }
}

fn close_tag(
    tag: &str,
    stack: &mut Vec<Frame>,
    params: &mut Vec<Value>,
    fault: &mut Option<Value>,
    in_fault: bool,
) -> Result<(), CodecError> {
    match tag {
        "value" => {
            let value = match stack.pop() {
                Some(Frame::Value {
                    typed, text, child, ..
                }) => match child {
                    Some(child) => child,
                    None => scalar(typed.as_deref(), &text)?,
                },
                _ => return Err(CodecError::Malformed("unbalanced <value>".to_string())),
            };
            attach(stack, value, params, fault, in_fault);
        }
        "array" => match stack.pop() {
            Some(Frame::Array(items)) => set_child(stack, Value::Array(items))?,
            _ => return Err(CodecError::Malformed("unbalanced <array>".to_string())),
        },
        "struct" => match stack.pop() {
            Some(Frame::Struct(members)) => set_child(stack, Value::Object(members))?,
            _ => return Err(CodecError::Malformed("unbalanced <struct>".to_string())),
        },
        "member" => match stack.pop() {
            Some(Frame::Member { name: Some(name), value }) => {
                if let Some(Frame::Struct(members)) = stack.last_mut() {
                    members.insert(name, value.unwrap_or(Value::Null));
                }
            }
            _ => return Err(CodecError::Malformed("<member> without <name>".to_string())),
        },
        "name" => match stack.pop() {
            Some(Frame::Name(name)) => {
                if let Some(Frame::Member { name: slot, .. }) = stack.last_mut() {
                    *slot = Some(name);
                }
            }
            _ => return Err(CodecError::Malformed("unbalanced <name>".to_string())),
        },
        "int" | "i4" | "i8" | "double" | "boolean" | "string" | "dateTime.iso8601" | "base64"
        | "nil" => {
            if let Some(Frame::Value { sealed, .. }) = stack.last_mut() {
                *sealed = true;
            }
        }
        "methodResponse" | "fault" => {}
        _ => {
            stack.pop();
        }
    }
    Ok(())
}

/// Route a finished <value> to whatever contains it
fn attach(
    stack: &mut [Frame],
    value: Value,
    params: &mut Vec<Value>,
    fault: &mut Option<Value>,
    in_fault: bool,
) {
    // <array><data><value/>...</data></array>
    if matches!(stack.last(), Some(Frame::Data)) {
        let len = stack.len();
        if len >= 2 {
            if let Frame::Array(items) = &mut stack[len - 2] {
                items.push(value);
            }
        }
        return;
    }

    match stack.last_mut() {
        Some(Frame::Array(items)) => items.push(value),
        Some(Frame::Member { value: slot, .. }) => *slot = Some(value),
        _ if in_fault => *fault = Some(value),
        _ => params.push(value),
    }
}

fn set_child(stack: &mut [Frame], value: Value) -> Result<(), CodecError> {
    match stack.last_mut() {
        Some(Frame::Value { child, .. }) => {
            *child = Some(value);
            Ok(())
        }
        _ => Err(CodecError::Malformed("container outside <value>".to_string())),
    }
}

fn scalar(typed: Option<&str>, text: &str) -> Result<Value, CodecError> {
    let malformed = |kind: &str| CodecError::Malformed(format!("bad {} '{}'", kind, text));

    match typed {
        // Untyped <value> text is a string
        None | Some("string") | Some("dateTime.iso8601") | Some("base64") => {
            Ok(Value::String(text.to_string()))
        }
        Some("int") | Some("i4") | Some("i8") => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| malformed("integer")),
        Some("double") => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| malformed("double")),
        Some("boolean") => match text.trim() {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            _ => Err(malformed("boolean")),
        },
        Some("nil") => Ok(Value::Null),
        Some(other) => Err(CodecError::Malformed(format!("unknown type <{}>", other))),
    }
}

// ============================================================================
// TESTS
// ============================================================================
