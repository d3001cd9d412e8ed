//! The id index: one reserved key holding the JSON array of live todo ids,
//! in creation order. Records live under their own `todo:<id>` keys.

use anyhow::{Context, Result};

use crate::store::KvStore;

pub const INDEX_KEY: &str = "todos:index";

const RECORD_PREFIX: &str = "todo:";

/// Store key of the record for `id`
pub fn record_key(id: &str) -> String {
    format!("{}{}", RECORD_PREFIX, id)
}

/// Read the index, treating an absent or empty value as no todos yet
pub async fn read_index(store: &dyn KvStore) -> Result<Vec<String>> {
    let bytes = match store.get(INDEX_KEY).await.context("Failed to read index")? {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return Ok(Vec::new()),
    };

    serde_json::from_slice(&bytes).context("Index is not a JSON array of ids")
}

/// Replace the whole index with `ids`
pub async fn write_index(store: &dyn KvStore, ids: &[String]) -> Result<()> {
    let bytes = serde_json::to_vec(ids).context("Failed to serialize index")?;
    store.set(INDEX_KEY, bytes).await.context("Failed to write index")
}

/// Copy of `ids` without any occurrence of `id`, order preserved
pub fn remove_id(ids: &[String], id: &str) -> Vec<String> {
    ids.iter().filter(|x| x.as_str() != id).cloned().collect()
}
