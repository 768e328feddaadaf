use serde::{Deserialize, Serialize};

pub const HISTORY_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetVersion {
    pub id: String,
    pub url: String,
    pub timestamp: u64,
}

pub fn push_version(history: &[AssetVersion], url: &str, now_millis: u64) -> Vec<AssetVersion> {
    let mut id = now_millis.to_string();
    if history.iter().any(|version| version.id == id) {
        id = format!("{now_millis}-{}", history.len() + 1);
    }
    let mut updated = Vec::with_capacity(history.len() + 1);
    updated.push(AssetVersion {
        id,
        url: url.to_string(),
        timestamp: now_millis,
    });
    updated.extend(history.iter().cloned());
    updated.truncate(HISTORY_LIMIT);
    updated
}

pub fn visible_history(history: &[AssetVersion]) -> Vec<&AssetVersion> {
    history
        .iter()
        .filter(|version| !version.url.is_empty() && !version.url.starts_with("error"))
        .collect()
}
