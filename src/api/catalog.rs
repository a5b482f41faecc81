//! Model catalog reshaping and allow-list filtering.

use crate::api::models::{ModelEntry, ModelInfo};
use std::collections::HashSet;
use std::path::Path;

/// Owner reported when a model id carries no `vendor/` prefix.
pub const UNKNOWN_OWNER: &str = "unknown";

/// Set of permitted model ids.
///
/// An empty allow-list means "no filtering", never "filter everything".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    ids: HashSet<String>,
}

impl AllowList {
    /// Parse line-delimited content. Lines are trimmed; blank lines skipped.
    pub fn parse(content: &str) -> Self {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Read the allow-list file, if one is configured.
    ///
    /// Read failures are reported and degrade to an empty list, so the caller
    /// gets the unfiltered catalog rather than an error.
    pub async fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let list = Self::parse(&content);
                tracing::debug!(
                    path = %path.display(),
                    entries = list.len(),
                    "Loaded model allow-list"
                );
                list
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Error reading model filter file, serving unfiltered catalog"
                );
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Whether `id` survives filtering.
    pub fn permits(&self, id: &str) -> bool {
        self.is_empty() || self.contains(id)
    }
}

impl FromIterator<String> for AllowList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Vendor part of a model id: everything before the first `/`.
pub fn owned_by(id: &str) -> &str {
    id.split_once('/')
        .map(|(owner, _)| owner)
        .unwrap_or(UNKNOWN_OWNER)
}

/// Reshape an upstream entry into the OpenAI model schema.
pub fn to_model_info(entry: ModelEntry) -> ModelInfo {
    let owned_by = owned_by(&entry.id).to_string();
    ModelInfo {
        id: entry.id,
        object: "model".to_string(),
        created: entry.created,
        owned_by,
    }
}

/// Filter and reshape a catalog, preserving upstream order.
pub fn filter_catalog(entries: Vec<ModelEntry>, allow_list: &AllowList) -> Vec<ModelInfo> {
    entries
        .into_iter()
        .filter(|entry| allow_list.permits(&entry.id))
        .map(to_model_info)
        .collect()
}
