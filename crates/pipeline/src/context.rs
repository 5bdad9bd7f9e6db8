use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Accumulated pipeline state, passed read-only to every task. Tasks never
/// mutate it directly; they return a patch and the pipeline owns the merge.
/// Values are JSON so the whole context serializes into the durable
/// `PipelineSavedState`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineContext {
    entries: Map<String, Value>,
}

impl PipelineContext {
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.entries
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Merge a patch; per-key, the patch wins.
    pub fn merge(&mut self, patch: &ContextPatch) {
        for (key, value) in &patch.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    pub fn merge_map(&mut self, map: &Map<String, Value>) {
        for (key, value) in map {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.entries
    }

    pub fn from_map(entries: Map<String, Value>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A task's declared output: the only way task results enter the context
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextPatch {
    entries: Map<String, Value>,
}

impl ContextPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        let value = serde_json::to_value(value).expect("context values are JSON-serializable");
        self.entries.insert(key.to_string(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
