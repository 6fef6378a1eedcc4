//! Custom Tera filters: case conversion and request payload expansion.

use std::collections::HashMap;

use heck::{ToKebabCase, ToLowerCamelCase, ToPascalCase, ToSnakeCase};
use tera::{Result, Value};

const DEFAULT_INDENT: usize = 4;

pub(crate) fn snake_case(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    let s = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("snake_case filter expects a string"))?;
    Ok(Value::String(s.to_snake_case()))
}

pub(crate) fn pascal_case(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    let s = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("pascal_case filter expects a string"))?;
    Ok(Value::String(s.to_pascal_case()))
}

pub(crate) fn camel_case(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    let s = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("camel_case filter expects a string"))?;
    Ok(Value::String(s.to_lower_camel_case()))
}

pub(crate) fn kebab_case(value: &Value, _args: &HashMap<String, Value>) -> Result<Value> {
    let s = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("kebab_case filter expects a string"))?;
    Ok(Value::String(s.to_kebab_case()))
}

/// Expand a payload object into the argument syntax of a client language.
///
/// `{{ payload | payload(style="curl") }}` yields `-d "key=value"` arguments
/// joined by shell line continuations; `python`, `ruby` and `php` yield the
/// keyword arguments / hash entries / array entries one per line, ready to be
/// wrapped by the template. `json` yields the payload as pretty JSON.
/// An optional `indent` argument sets the continuation indent (default 4).
pub(crate) fn payload(value: &Value, args: &HashMap<String, Value>) -> Result<Value> {
    let style = args
        .get("style")
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg("payload filter requires a `style` argument"))?;
    let indent = match args.get("indent") {
        Some(v) => v
            .as_u64()
            .ok_or_else(|| tera::Error::msg("payload filter `indent` must be a number"))?
            as usize,
        None => DEFAULT_INDENT,
    };
    let pad = " ".repeat(indent);

    if style == "json" {
        return serde_json::to_string_pretty(value)
            .map(Value::String)
            .map_err(|e| tera::Error::msg(format!("payload filter: {e}")));
    }

    let object = match value {
        Value::Object(map) => map,
        Value::Null => return Ok(Value::String(String::new())),
        _ => return Err(tera::Error::msg("payload filter expects an object")),
    };

    let rendered = match style {
        "curl" => {
            let mut fields = Vec::new();
            for (key, v) in object {
                flatten_form(key, v, &mut fields);
            }
            fields
                .iter()
                .map(|(k, v)| format!("-d \"{}\"", shell_escape(&format!("{k}={v}"))))
                .collect::<Vec<_>>()
                .join(&format!(" \\\n{pad}"))
        }
        "python" => object
            .iter()
            .map(|(k, v)| format!("{k}={}", python_literal(v)))
            .collect::<Vec<_>>()
            .join(&format!(",\n{pad}")),
        "ruby" => object
            .iter()
            .map(|(k, v)| format!(":{k} => {}", ruby_literal(v)))
            .collect::<Vec<_>>()
            .join(&format!(",\n{pad}")),
        "php" => object
            .iter()
            .map(|(k, v)| format!("\"{k}\" => {}", php_literal(v)))
            .collect::<Vec<_>>()
            .join(&format!(",\n{pad}")),
        other => {
            return Err(tera::Error::msg(format!(
                "payload filter: unknown style '{other}'"
            )))
        }
    };
    Ok(Value::String(rendered))
}

/// Flatten nested objects into form fields: `meta[key]=value`, `tags[0]=a`.
fn flatten_form(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten_form(&format!("{prefix}[{k}]"), v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_form(&format!("{prefix}[{i}]"), v, out);
            }
        }
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        Value::Null => out.push((prefix.to_string(), String::new())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

fn shell_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn single_quoted(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn python_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => single_quoted(s),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(python_literal).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{}: {}", single_quoted(k), python_literal(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn ruby_literal(value: &Value) -> String {
    match value {
        Value::Null => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => single_quoted(s),
        Value::Array(items) => format!(
            "[{}]",
            items.iter().map(ruby_literal).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{} => {}", single_quoted(k), ruby_literal(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn php_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => single_quoted(s),
        Value::Array(items) => format!(
            "array({})",
            items.iter().map(php_literal).collect::<Vec<_>>().join(", ")
        ),
        Value::Object(map) => format!(
            "array({})",
            map.iter()
                .map(|(k, v)| format!("{} => {}", single_quoted(k), php_literal(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}
