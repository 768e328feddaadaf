mod history;
mod patch;
mod store;

pub use history::{push_version, visible_history, AssetVersion, HISTORY_LIMIT};
pub use patch::{apply_concept_patch, apply_update, ConceptPatch};
pub use store::{JsonFileStore, KvStore, ProjectStore, PROJECTS_KEY};
