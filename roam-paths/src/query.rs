//! Query-string codec.
//!
//! Percent-encoding goes through `form_urlencoded`; array handling follows
//! the configured [`ArrayFormat`]. A key with no `=` parses to JSON null
//! and a null value serializes back to a bare key, so flag params survive a
//! round trip.

use serde_json::Value;

use crate::options::{ArrayFormat, QueryParamsOptions};
use crate::Params;

fn decode_component(raw: &str) -> String {
    form_urlencoded::parse(raw.as_bytes())
        .map(|(k, v)| if v.is_empty() { k.into_owned() } else { format!("{}={}", k, v) })
        .collect::<Vec<_>>()
        .join("")
}

fn encode_component(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

/// Strip an array suffix (`[]` or `[n]`) according to the format in use.
fn strip_array_suffix(key: &str, format: ArrayFormat) -> (String, bool) {
    match format {
        ArrayFormat::Repeat => (key.to_string(), false),
        ArrayFormat::Brackets => match key.strip_suffix("[]") {
            Some(base) => (base.to_string(), true),
            None => (key.to_string(), false),
        },
        ArrayFormat::Index => match key.rfind('[') {
            Some(open) if key.ends_with(']') => {
                let inner = &key[open + 1..key.len() - 1];
                if inner.chars().all(|c| c.is_ascii_digit()) && !inner.is_empty() {
                    (key[..open].to_string(), true)
                } else {
                    (key.to_string(), false)
                }
            }
            _ => (key.to_string(), false),
        },
    }
}

/// Parse a query string (without the leading `?`) into params.
///
/// Repeated keys always collapse into an array; the array formats only
/// change which key spellings are recognized as array members.
pub fn parse_query(query: &str, options: &QueryParamsOptions) -> Params {
    let mut params = Params::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, value) = match pair.split_once('=') {
            Some((k, v)) => (decode_component(k), Value::String(decode_component(v))),
            None => (decode_component(pair), Value::Null),
        };
        let (key, is_array) = strip_array_suffix(&raw_key, options.array_format);
        match params.get_mut(&key) {
            None => {
                if is_array {
                    params.insert(key, Value::Array(vec![value]));
                } else {
                    params.insert(key, value);
                }
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    params
}

fn push_pair(out: &mut Vec<String>, key: &str, value: &Value) {
    match value {
        Value::Null => out.push(encode_component(key)),
        Value::String(s) => out.push(format!("{}={}", encode_component(key), encode_component(s))),
        Value::Bool(b) => out.push(format!("{}={}", encode_component(key), b)),
        Value::Number(n) => out.push(format!("{}={}", encode_component(key), n)),
        other => out.push(format!(
            "{}={}",
            encode_component(key),
            encode_component(&other.to_string())
        )),
    }
}

/// Serialize `(key, value)` pairs into a query string without the leading
/// `?`. Returns an empty string for an empty input.
pub fn build_query<'a, I>(pairs: I, options: &QueryParamsOptions) -> String
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut out = Vec::new();
    for (key, value) in pairs {
        match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let spelled = match options.array_format {
                        ArrayFormat::Repeat => key.to_string(),
                        ArrayFormat::Brackets => format!("{}[]", key),
                        ArrayFormat::Index => format!("{}[{}]", key, i),
                    };
                    push_pair(&mut out, &spelled, item);
                }
            }
            other => push_pair(&mut out, key, other),
        }
    }
    out.join("&")
}
