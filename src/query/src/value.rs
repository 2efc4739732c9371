use std::collections::HashMap;

use common::query::ValueKind;
use lazy_static::lazy_static;
use serde_json::Number;
use serde_json::Value;

/// Fields with canonical value remaps. The condition editor lets users type
/// the display form; the event log stores the numeric form.
pub const FIELD_VISITOR_KIND: u64 = 11;
pub const FIELD_FIRST_VISIT: u64 = 12;
pub const FIELD_ACTIVE_FLAG: u64 = 62;

/// A condition value after normalization: a single bound parameter or a
/// future IN-list with one parameter per element.
#[derive(Clone, Debug, PartialEq)]
pub enum Normalized {
    Scalar(Value),
    List(Vec<Value>),
}

/// Coerces a raw condition value into a query-safe form. Returns `None` for
/// absent values (null, blank strings, empty arrays, unparseable counts);
/// the caller must drop the condition row.
pub fn normalize(raw: &Value, kind: ValueKind) -> Option<Normalized> {
    match raw {
        Value::Null => None,
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match normalize(item, kind) {
                    Some(Normalized::Scalar(v)) => out.push(v),
                    Some(Normalized::List(vs)) => out.extend(vs),
                    None => {}
                }
            }
            if out.is_empty() {
                None
            } else {
                Some(Normalized::List(out))
            }
        }
        _ if kind.is_count() => parse_count(raw).map(Normalized::Scalar),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(Normalized::Scalar(Value::String(trimmed.to_string())))
            }
        }
        other => Some(Normalized::Scalar(other.clone())),
    }
}

fn parse_count(raw: &Value) -> Option<Value> {
    match raw {
        Value::Number(n) => Some(Value::Number(n.clone())),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(n) = trimmed.parse::<i64>() {
                return Some(Value::Number(n.into()));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
        }
        _ => None,
    }
}

type RemapFn = fn(&Value) -> Value;

lazy_static! {
    /// Closed per-field remap table. Applied after normalization, per element,
    /// so IN-lists reuse the same remap.
    static ref FIELD_REMAPS: HashMap<u64, RemapFn> = {
        let mut m: HashMap<u64, RemapFn> = HashMap::new();
        m.insert(FIELD_VISITOR_KIND, remap_visitor_kind);
        m.insert(FIELD_FIRST_VISIT, remap_truthy);
        m.insert(FIELD_ACTIVE_FLAG, remap_truthy);
        m
    };
}

pub fn remap_field(field_id: Option<u64>, normalized: Normalized) -> Normalized {
    let Some(remap) = field_id.and_then(|id| FIELD_REMAPS.get(&id)) else {
        return normalized;
    };
    match normalized {
        Normalized::Scalar(v) => Normalized::Scalar(remap(&v)),
        Normalized::List(vs) => Normalized::List(vs.iter().map(|v| remap(v)).collect()),
    }
}

fn remap_visitor_kind(v: &Value) -> Value {
    match v {
        Value::String(s) if s.eq_ignore_ascii_case("new") => Value::Number(1.into()),
        Value::String(s) if s.eq_ignore_ascii_case("returning") => Value::Number(0.into()),
        other => other.clone(),
    }
}

fn remap_truthy(v: &Value) -> Value {
    let truthy = match v {
        Value::Bool(b) => *b,
        Value::String(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("yes") || s == "1"
        }
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    };
    Value::Number(i64::from(truthy).into())
}
