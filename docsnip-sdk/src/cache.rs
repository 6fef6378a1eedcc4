//! Persistent scenario cache.
//!
//! The cache is a single JSON object on disk. The reserved keys `api_location`,
//! `api_key` and `marketplace` hold the execution context provisioned by the
//! bootstrap; every other key is a scenario name mapping to the block of its
//! last successful execution:
//!
//! ```json
//! {
//!   "api_key": "ak-test-...",
//!   "api_location": "https://api.example.com",
//!   "card_create": {
//!     "definition": { "type": "curl", "content": "POST /v1/marketplaces/{marketplace_id}/cards" },
//!     "request": { "type": "curl", "content": "curl https://..." },
//!     "response": { "type": "json", "content": "{ ... }" }
//!   }
//! }
//! ```
//!
//! Only blocks that carry a response are ever stored.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

const RESERVED_KEYS: [&str; 3] = ["api_location", "api_key", "marketplace"];

/// One section of a block: a language (or content) tag plus text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

impl Section {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
        }
    }
}

/// Rendered definition / request / response triple for one scenario execution.
///
/// Field order is the serialized section order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub definition: Section,
    pub request: Section,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Section>,
}

impl Block {
    /// Language the block was rendered for.
    pub fn lang(&self) -> &str {
        &self.request.kind
    }

    /// The response parsed as JSON, or the raw text when it is not JSON.
    pub fn response_value(&self) -> Option<Value> {
        self.response.as_ref().map(|section| {
            serde_json::from_str(&section.content)
                .unwrap_or_else(|_| Value::String(section.content.clone()))
        })
    }
}

#[derive(Debug, Default, Serialize)]
struct CacheDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    api_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    marketplace: Option<Value>,
    #[serde(flatten)]
    blocks: BTreeMap<String, Block>,
}

impl CacheDocument {
    /// Build a document entry by entry, dropping keys that do not hold a valid
    /// value so one bad entry does not discard the rest of the cache.
    fn from_entries(entries: serde_json::Map<String, Value>, path: &Path) -> Self {
        let mut doc = Self::default();
        for (key, value) in entries {
            match key.as_str() {
                "api_location" | "api_key" => {
                    let Value::String(text) = value else {
                        tracing::warn!(?path, %key, "Ignoring non-string cache entry");
                        continue;
                    };
                    if key == "api_location" {
                        doc.api_location = Some(text);
                    } else {
                        doc.api_key = Some(text);
                    }
                }
                "marketplace" => doc.marketplace = Some(value),
                _ => match serde_json::from_value::<Block>(value) {
                    Ok(block) => {
                        doc.blocks.insert(key, block);
                    }
                    Err(e) => {
                        tracing::warn!(?path, %key, error = %e, "Ignoring malformed cache entry");
                    }
                },
            }
        }
        doc
    }
}

/// On-disk map of scenario name → block, plus the stored execution context.
#[derive(Debug)]
pub struct ScenarioCache {
    path: PathBuf,
    doc: CacheDocument,
}

impl ScenarioCache {
    /// An empty cache that will be written to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            doc: CacheDocument::default(),
        }
    }

    /// Load the cache from disk. A missing or unreadable file yields an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<serde_json::Map<String, Value>>(&contents) {
                Ok(entries) => {
                    let doc = CacheDocument::from_entries(entries, &path);
                    tracing::debug!(?path, blocks = doc.blocks.len(), "Loaded scenario cache");
                    return Self { path, doc };
                }
                Err(e) => {
                    tracing::warn!(?path, error = %e, "Failed to parse scenario cache, starting empty");
                }
            },
            Err(e) => {
                tracing::info!(?path, error = %e, "No usable scenario cache, starting empty");
            }
        }
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&Block> {
        self.doc.blocks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.doc.blocks.contains_key(name)
    }

    /// Store a block. Blocks without a response are refused.
    pub fn insert(&mut self, name: impl Into<String>, block: Block) -> Result<(), CacheError> {
        let name = name.into();
        if RESERVED_KEYS.contains(&name.as_str()) {
            return Err(CacheError::ReservedName(name));
        }
        if block.response.is_none() {
            return Err(CacheError::MissingResponse(name));
        }
        self.doc.blocks.insert(name, block);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Block> {
        self.doc.blocks.remove(name)
    }

    /// Drop every cached block, keeping the execution context.
    pub fn clear_blocks(&mut self) {
        self.doc.blocks.clear();
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.doc.blocks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.doc.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.blocks.is_empty() && self.doc.api_key.is_none()
    }

    pub fn api_location(&self) -> Option<&str> {
        self.doc.api_location.as_deref()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.doc.api_key.as_deref()
    }

    pub fn marketplace(&self) -> Option<&Value> {
        self.doc.marketplace.as_ref()
    }

    /// Replace the execution context. Blocks from a previous context are dropped.
    pub fn reset_context(&mut self, api_location: &str, api_key: &str, marketplace: Value) {
        self.doc = CacheDocument {
            api_location: Some(api_location.to_string()),
            api_key: Some(api_key.to_string()),
            marketplace: Some(marketplace),
            blocks: BTreeMap::new(),
        };
    }

    /// Refresh the stored marketplace object without touching anything else.
    pub fn set_marketplace(&mut self, marketplace: Value) {
        self.doc.marketplace = Some(marketplace);
    }

    /// Write the cache to disk via a temporary file and rename.
    pub fn save(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(&self.doc)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json + "\n").map_err(|e| CacheError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| CacheError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        tracing::debug!(path = ?self.path, blocks = self.doc.blocks.len(), "Saved scenario cache");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache IO error at {path}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize cache")]
    Serialize(#[from] serde_json::Error),
    #[error("'{0}' is reserved for the execution context")]
    ReservedName(String),
    #[error("refusing to cache '{0}': scenario produced no response")]
    MissingResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block(response: Option<&str>) -> Block {
        Block {
            definition: Section::new("curl", "POST /v1/marketplaces/{marketplace_id}/cards"),
            request: Section::new("curl", "curl https://api.example.com/v1/cards"),
            response: response.map(|r| Section::new("json", r)),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ScenarioCache::load(dir.path().join("cache.json"));
        assert!(cache.is_empty());
        assert!(cache.api_key().is_none());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(ScenarioCache::load(&path).is_empty());
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let doc = json!({
            "api_key": "ak-1",
            "api_location": 42,
            "schema_version": 2,
            "card_create": {
                "definition": {"type": "curl", "content": "POST /v1/cards"},
                "request": {"type": "curl", "content": "curl https://api.example.com/v1/cards"},
                "response": {"type": "json", "content": "{}"}
            },
            "debit_create": {"definition": "not a section"}
        });
        std::fs::write(&path, doc.to_string()).unwrap();

        let cache = ScenarioCache::load(&path);
        assert_eq!(cache.api_key(), Some("ak-1"));
        assert_eq!(cache.api_location(), None);
        assert_eq!(cache.names().collect::<Vec<_>>(), vec!["card_create"]);
    }

    #[test]
    fn test_insert_requires_response() {
        let mut cache = ScenarioCache::new("unused.json");
        let err = cache.insert("card_create", block(None)).unwrap_err();
        assert!(matches!(err, CacheError::MissingResponse(_)));
        assert!(!cache.contains("card_create"));

        cache.insert("card_create", block(Some("{}"))).unwrap();
        assert!(cache.contains("card_create"));
    }

    #[test]
    fn test_insert_rejects_reserved_names() {
        let mut cache = ScenarioCache::new("unused.json");
        assert!(matches!(
            cache.insert("api_key", block(Some("{}"))),
            Err(CacheError::ReservedName(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let mut cache = ScenarioCache::new(&path);
        cache.reset_context("https://api.example.com", "ak-1", json!({"id": "MP1"}));
        cache
            .insert("card_create", block(Some("{\n    \"id\": \"CC1\"\n}")))
            .unwrap();
        cache.save().unwrap();

        let reloaded = ScenarioCache::load(&path);
        assert_eq!(reloaded.api_location(), Some("https://api.example.com"));
        assert_eq!(reloaded.api_key(), Some("ak-1"));
        assert_eq!(reloaded.marketplace(), Some(&json!({"id": "MP1"})));
        assert_eq!(reloaded.get("card_create"), cache.get("card_create"));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_document_shape() {
        let mut cache = ScenarioCache::new("unused.json");
        cache.reset_context("http://localhost", "ak-1", json!({}));
        cache.insert("card_create", block(Some("ok"))).unwrap();

        let value = serde_json::to_value(&cache.doc).unwrap();
        assert_eq!(value["api_key"], json!("ak-1"));
        assert_eq!(value["card_create"]["definition"]["type"], json!("curl"));
        assert_eq!(value["card_create"]["response"]["content"], json!("ok"));

        let text = serde_json::to_string(&cache.get("card_create").unwrap()).unwrap();
        let def = text.find("definition").unwrap();
        let req = text.find("request").unwrap();
        let resp = text.find("response").unwrap();
        assert!(def < req && req < resp);
    }

    #[test]
    fn test_reset_context_drops_blocks() {
        let mut cache = ScenarioCache::new("unused.json");
        cache.insert("card_create", block(Some("{}"))).unwrap();
        cache.reset_context("http://localhost", "ak-2", json!({"id": "MP2"}));
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.api_key(), Some("ak-2"));
    }

    #[test]
    fn test_response_value() {
        assert_eq!(
            block(Some("{\"id\": \"CC1\"}")).response_value(),
            Some(json!({"id": "CC1"}))
        );
        assert_eq!(block(Some("plain")).response_value(), Some(json!("plain")));
        assert_eq!(block(None).response_value(), None);
    }
}
