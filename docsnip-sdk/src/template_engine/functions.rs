//! Endpoint helpers exposed to templates: `route(...)` and `url_for(...)`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tera::{Function, Result, Value};

use super::engine::RenderMode;
use crate::routes::{RouteTable, VariantSelector};

/// `route(name="debits.create", variant="shortest")` → `{ method, path }`.
pub(crate) struct RouteFn {
    routes: Arc<RouteTable>,
}

impl RouteFn {
    pub(crate) fn new(routes: Arc<RouteTable>) -> Self {
        Self { routes }
    }
}

impl Function for RouteFn {
    fn call(&self, args: &HashMap<String, Value>) -> Result<Value> {
        let name = required_str(args, "name", "route")?;
        let selector = selector(args)?;
        let variant = self
            .routes
            .select(name, selector, None)
            .map_err(|e| tera::Error::msg(e.to_string()))?;
        serde_json::to_value(variant).map_err(|e| tera::Error::msg(e.to_string()))
    }
}

/// `url_for(name="debits.create", marketplace_id=marketplace.id)`.
///
/// Every argument other than `name` and `variant` is a path parameter. In
/// request mode the result is the absolute URL with parameters substituted;
/// in definition mode it is the bare path pattern of the selected variant.
pub(crate) struct UrlFor {
    routes: Arc<RouteTable>,
    api_location: String,
    mode: RenderMode,
}

impl UrlFor {
    pub(crate) fn new(routes: Arc<RouteTable>, api_location: String, mode: RenderMode) -> Self {
        Self {
            routes,
            api_location,
            mode,
        }
    }
}

impl Function for UrlFor {
    fn call(&self, args: &HashMap<String, Value>) -> Result<Value> {
        let name = required_str(args, "name", "url_for")?;
        let selector = selector(args)?;

        let mut params = BTreeMap::new();
        for (key, value) in args {
            if key == "name" || key == "variant" {
                continue;
            }
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(tera::Error::msg(format!(
                        "url_for: parameter '{key}' must be a string or number"
                    )))
                }
            };
            params.insert(key.clone(), rendered);
        }

        // With no parameters every variant is a candidate
        let supplied = (!params.is_empty()).then_some(&params);
        let variant = self
            .routes
            .select(name, selector, supplied)
            .map_err(|e| tera::Error::msg(e.to_string()))?;

        let url = match self.mode {
            RenderMode::Definition => variant.path.clone(),
            RenderMode::Request => {
                let path = variant
                    .interpolate(&params)
                    .map_err(|e| tera::Error::msg(e.to_string()))?;
                format!("{}{path}", self.api_location.trim_end_matches('/'))
            }
        };
        Ok(Value::String(url))
    }
}

fn required_str<'a>(args: &'a HashMap<String, Value>, key: &str, func: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg(format!("{func}: missing string argument `{key}`")))
}

fn selector(args: &HashMap<String, Value>) -> Result<VariantSelector> {
    match args.get("variant") {
        None => Ok(VariantSelector::default()),
        Some(Value::String(s)) => s.parse().map_err(|e: crate::routes::RouteError| {
            tera::Error::msg(e.to_string())
        }),
        Some(_) => Err(tera::Error::msg("`variant` must be a string")),
    }
}
