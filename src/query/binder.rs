//! Placeholder binding.

use super::params::{Binding, ParamBag, ParamName};
use super::templates::{marker_pattern, Template};
use crate::error::{EngineError, Result};

use serde_json::Value;

/// Substitute every `{{name}}` marker of a template with the matching
/// parameter.
///
/// A string that is exactly one marker becomes the typed JSON value (so
/// lists stay arrays); a marker embedded in a longer string is replaced
/// textually. Timestamps are passed through untouched.
pub fn bind(template: &Template, params: &ParamBag) -> Result<Value> {
    for name in &template.markers {
        if params.lookup(*name).is_none() {
            return Err(EngineError::PlaceholderUnbound(name.as_str().to_string()));
        }
    }

    let mut body = template.body.clone();
    bind_value(&mut body, params)?;
    Ok(body)
}

fn bind_value(value: &mut Value, params: &ParamBag) -> Result<()> {
    match value {
        Value::String(s) => {
            if let Some(bound) = bind_string(s, params)? {
                *value = bound;
            }
        }
        Value::Array(items) => {
            for item in items {
                bind_value(item, params)?;
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                bind_value(item, params)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn resolve(name: &str, params: &ParamBag) -> Result<Binding> {
    ParamName::parse(name)
        .and_then(|p| params.lookup(p))
        .ok_or_else(|| EngineError::PlaceholderUnbound(name.to_string()))
}

fn bind_string(s: &str, params: &ParamBag) -> Result<Option<Value>> {
    let re = marker_pattern();
    if !re.is_match(s) {
        return Ok(None);
    }

    if let Some(caps) = re.captures(s) {
        if caps.get(0).is_some_and(|m| m.start() == 0 && m.end() == s.len()) {
            return Ok(Some(resolve(&caps[1], params)?.to_json()));
        }
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in re.captures_iter(s) {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        out.push_str(&s[last..whole.start()]);
        out.push_str(&resolve(&caps[1], params)?.to_text());
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(Some(Value::String(out)))
}
