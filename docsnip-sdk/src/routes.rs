//! Routing table for the payments API (`routes.toml`).
//!
//! A route name maps to one or more variants, each an HTTP method plus a path
//! pattern with `{name}` placeholders:
//!
//! ```toml
//! [[routes]]
//! name = "debits.create"
//! method = "POST"
//! path = "/v1/marketplaces/{marketplace_id}/debits"
//!
//! [[routes]]
//! name = "debits.create"
//! method = "POST"
//! path = "/v1/marketplaces/{marketplace_id}/accounts/{account_id}/debits"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One method + path pattern for a named route.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteVariant {
    pub method: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    name: String,
    method: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct RouteFile {
    #[serde(default)]
    routes: Vec<RouteEntry>,
}

/// Which variant to pick when several match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VariantSelector {
    Shortest,
    #[default]
    Longest,
}

impl FromStr for VariantSelector {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shortest" => Ok(Self::Shortest),
            "longest" => Ok(Self::Longest),
            other => Err(RouteError::UnknownSelector(other.to_string())),
        }
    }
}

/// Route name → variants, in declaration order.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: BTreeMap<String, Vec<RouteVariant>>,
}

impl RouteTable {
    /// Load a routing table from a TOML file.
    pub fn load(path: &Path) -> Result<Self, RouteError> {
        let contents = std::fs::read_to_string(path).map_err(|e| RouteError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            RouteError::Parse { source, .. } => RouteError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, RouteError> {
        let file: RouteFile = toml::from_str(contents).map_err(|e| RouteError::Parse {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;

        let mut table = Self::default();
        for entry in file.routes {
            placeholders(&entry.path)?;
            table.insert(
                entry.name,
                RouteVariant {
                    method: entry.method.to_ascii_uppercase(),
                    path: entry.path,
                },
            );
        }
        Ok(table)
    }

    pub fn insert(&mut self, name: impl Into<String>, variant: RouteVariant) {
        self.routes.entry(name.into()).or_default().push(variant);
    }

    pub fn variants(&self, name: &str) -> Result<&[RouteVariant], RouteError> {
        self.routes
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| RouteError::UnknownRoute(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Pick a variant of `name`.
    ///
    /// With `params`, only variants whose placeholders are all supplied are
    /// considered. Ties on path length go to the first declared variant.
    pub fn select(
        &self,
        name: &str,
        selector: VariantSelector,
        params: Option<&BTreeMap<String, String>>,
    ) -> Result<&RouteVariant, RouteError> {
        let mut best: Option<&RouteVariant> = None;
        for variant in self.variants(name)? {
            if let Some(params) = params {
                let needed = placeholders(&variant.path)?;
                if !needed.iter().all(|p| params.contains_key(*p)) {
                    continue;
                }
            }
            best = match best {
                None => Some(variant),
                Some(current) => {
                    let better = match selector {
                        VariantSelector::Shortest => variant.path.len() < current.path.len(),
                        VariantSelector::Longest => variant.path.len() > current.path.len(),
                    };
                    Some(if better { variant } else { current })
                }
            };
        }

        best.ok_or_else(|| RouteError::NoMatchingVariant {
            route: name.to_string(),
            supplied: params
                .map(|p| p.keys().cloned().collect::<Vec<_>>().join(", "))
                .unwrap_or_default(),
        })
    }
}

impl RouteVariant {
    /// Substitute every `{name}` placeholder with its value from `params`.
    pub fn interpolate(&self, params: &BTreeMap<String, String>) -> Result<String, RouteError> {
        let mut out = String::with_capacity(self.path.len());
        let mut rest = self.path.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| RouteError::MalformedPath(self.path.clone()))?;
            let key = &after[..close];
            let value = params.get(key).ok_or_else(|| RouteError::MissingParam {
                path: self.path.clone(),
                param: key.to_string(),
            })?;
            out.push_str(value);
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Placeholder names in a path pattern, in order of first appearance.
pub fn placeholders(path: &str) -> Result<Vec<&str>, RouteError> {
    let mut names = Vec::new();
    let mut seen = BTreeSet::new();
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| RouteError::MalformedPath(path.to_string()))?;
        let name = &after[..close];
        if name.is_empty() || name.contains('{') {
            return Err(RouteError::MalformedPath(path.to_string()));
        }
        if seen.insert(name) {
            names.push(name);
        }
        rest = &after[close + 1..];
    }
    Ok(names)
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("unknown route '{0}'")]
    UnknownRoute(String),
    #[error("unknown variant selector '{0}' (expected 'shortest' or 'longest')")]
    UnknownSelector(String),
    #[error("malformed path pattern '{0}'")]
    MalformedPath(String),
    #[error("missing value for '{param}' in '{path}'")]
    MissingParam { path: String, param: String },
    #[error("no variant of '{route}' matches supplied parameters [{supplied}]")]
    NoMatchingVariant { route: String, supplied: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTES: &str = r#"
[[routes]]
name = "debits.create"
method = "post"
path = "/v1/marketplaces/{marketplace_id}/debits"

[[routes]]
name = "debits.create"
method = "POST"
path = "/v1/marketplaces/{marketplace_id}/accounts/{account_id}/debits"

[[routes]]
name = "api_keys.create"
method = "POST"
path = "/v1/api_keys"
"#;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_table() {
        let table = RouteTable::from_toml_str(ROUTES).unwrap();
        assert_eq!(table.len(), 2);
        let variants = table.variants("debits.create").unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].method, "POST");
    }

    #[test]
    fn test_interpolation_leaves_no_placeholders() {
        let table = RouteTable::from_toml_str(ROUTES).unwrap();
        let supplied = params(&[("marketplace_id", "MP123"), ("account_id", "AC9")]);
        let variant = table
            .select("debits.create", VariantSelector::Longest, Some(&supplied))
            .unwrap();
        let url = variant.interpolate(&supplied).unwrap();
        assert_eq!(url, "/v1/marketplaces/MP123/accounts/AC9/debits");
        assert!(!url.contains('{') && !url.contains('}'));
    }

    #[test]
    fn test_select_shortest_and_longest() {
        let table = RouteTable::from_toml_str(ROUTES).unwrap();
        let shortest = table
            .select("debits.create", VariantSelector::Shortest, None)
            .unwrap();
        let longest = table
            .select("debits.create", VariantSelector::Longest, None)
            .unwrap();
        assert!(shortest.path.ends_with("{marketplace_id}/debits"));
        assert!(longest.path.contains("{account_id}"));
    }

    #[test]
    fn test_select_filters_by_supplied_params() {
        let table = RouteTable::from_toml_str(ROUTES).unwrap();
        let supplied = params(&[("marketplace_id", "MP123")]);
        let variant = table
            .select("debits.create", VariantSelector::Longest, Some(&supplied))
            .unwrap();
        assert_eq!(variant.path, "/v1/marketplaces/{marketplace_id}/debits");
    }

    #[test]
    fn test_select_no_matching_variant() {
        let table = RouteTable::from_toml_str(ROUTES).unwrap();
        let err = table
            .select("debits.create", VariantSelector::Longest, Some(&params(&[])))
            .unwrap_err();
        assert!(matches!(err, RouteError::NoMatchingVariant { .. }));
    }

    #[test]
    fn test_unknown_route() {
        let table = RouteTable::from_toml_str(ROUTES).unwrap();
        assert!(matches!(
            table.variants("refunds.create"),
            Err(RouteError::UnknownRoute(_))
        ));
    }

    #[test]
    fn test_interpolate_missing_param() {
        let variant = RouteVariant {
            method: "GET".to_string(),
            path: "/v1/cards/{card_id}".to_string(),
        };
        let err = variant.interpolate(&params(&[])).unwrap_err();
        assert!(err.to_string().contains("card_id"));
    }

    #[test]
    fn test_placeholders_rejects_unterminated() {
        assert!(placeholders("/v1/cards/{card_id").is_err());
        assert!(placeholders("/v1/cards/{}").is_err());
        assert_eq!(
            placeholders("/v1/{a}/x/{b}/{a}").unwrap(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_selector_from_str() {
        assert_eq!(
            "shortest".parse::<VariantSelector>().unwrap(),
            VariantSelector::Shortest
        );
        assert!("widest".parse::<VariantSelector>().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.toml");
        std::fs::write(&path, ROUTES).unwrap();
        let table = RouteTable::load(&path).unwrap();
        assert!(!table.is_empty());

        std::fs::write(&path, "routes = 3").unwrap();
        let err = RouteTable::load(&path).unwrap_err();
        assert!(err.to_string().contains("routes.toml"));
    }
}
