use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::{json, Map, Value};

use crate::brand::{BrandConcept, Project, ProjectStatus};
use crate::events::EventWriter;

use super::patch::{apply_update, ConceptPatch};

pub const PROJECTS_KEY: &str = "lumina_projects";

pub trait KvStore {
    fn get(&mut self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KvStore for JsonFileStore {
    fn get(&mut self, key: &str) -> Option<Value> {
        read_json_object(&self.path)?.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut on_disk = read_json_object(&self.path).unwrap_or_default();
        on_disk.insert(key.to_string(), value);
        write_json_object(&self.path, &on_disk)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let Some(mut on_disk) = read_json_object(&self.path) else {
            return Ok(());
        };
        if on_disk.remove(key).is_some() {
            write_json_object(&self.path, &on_disk)?;
        }
        Ok(())
    }
}

fn read_json_object(path: &Path) -> Option<Map<String, Value>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let parsed: Value = serde_json::from_str(&raw).ok()?;
    parsed.as_object().cloned()
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        path,
        serde_json::to_string_pretty(&Value::Object(payload.clone()))?,
    )?;
    Ok(())
}

pub struct ProjectStore {
    projects: Vec<Project>,
    kv: Box<dyn KvStore>,
    events: EventWriter,
}

impl ProjectStore {
    pub fn open(data_dir: impl AsRef<Path>, events: EventWriter) -> Self {
        let data_dir = data_dir.as_ref();
        let kv = JsonFileStore::new(data_dir.join("store.json"));
        let legacy_path = data_dir.join("lumina_projects.json");
        Self::with_store(Box::new(kv), &legacy_path, events)
    }

    pub fn with_store(
        mut kv: Box<dyn KvStore>,
        legacy_path: &Path,
        events: EventWriter,
    ) -> Self {
        migrate_legacy(legacy_path, kv.as_mut(), &events);

        let projects = kv
            .get(PROJECTS_KEY)
            .and_then(|value| serde_json::from_value::<Vec<Project>>(value).ok())
            .unwrap_or_default();

        Self {
            projects,
            kv,
            events,
        }
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn project(&self, project_id: &str) -> Option<&Project> {
        self.projects.iter().find(|item| item.id == project_id)
    }

    pub fn concept(&self, project_id: &str, concept_id: &str) -> Option<&BrandConcept> {
        self.project(project_id)?.concept(concept_id)
    }

    pub fn insert_project(&mut self, project: Project) {
        self.projects.insert(0, project);
        self.persist();
    }

    pub fn delete_project(&mut self, project_id: &str) -> bool {
        let before = self.projects.len();
        self.projects.retain(|item| item.id != project_id);
        let removed = self.projects.len() != before;
        if removed {
            self.persist();
        }
        removed
    }

    pub fn set_status(&mut self, project_id: &str, status: ProjectStatus) {
        if let Some(project) = self.projects.iter_mut().find(|item| item.id == project_id) {
            project.status = status;
            self.persist();
        }
    }

    pub fn append_concept(&mut self, project_id: &str, concept: BrandConcept) {
        if let Some(project) = self.projects.iter_mut().find(|item| item.id == project_id) {
            project.concepts.push(concept);
            self.persist();
        }
    }

    pub fn update_concept(&mut self, project_id: &str, concept_id: &str, patch: &ConceptPatch) {
        self.projects = apply_update(&self.projects, project_id, concept_id, patch);
        self.persist();
    }

    fn persist(&mut self) {
        let payload = match serde_json::to_value(&self.projects) {
            Ok(payload) => payload,
            Err(err) => {
                self.log_storage_error(&err.to_string());
                return;
            }
        };
        if let Err(err) = self.kv.set(PROJECTS_KEY, payload) {
            self.log_storage_error(&format!("{err:#}"));
        }
    }

    fn log_storage_error(&self, message: &str) {
        let _ = self.events.emit(
            "storage_error",
            json!({ "error": message })
                .as_object()
                .cloned()
                .unwrap_or_default(),
        );
    }
}

fn migrate_legacy(legacy_path: &Path, kv: &mut dyn KvStore, events: &EventWriter) {
    let Ok(raw) = std::fs::read_to_string(legacy_path) else {
        return;
    };
    let Ok(parsed) = serde_json::from_str::<Value>(&raw) else {
        return;
    };
    let count = match parsed.as_array() {
        Some(rows) if !rows.is_empty() => rows.len(),
        _ => return,
    };
    if kv.set(PROJECTS_KEY, parsed).is_err() {
        return;
    }
    let _ = std::fs::remove_file(legacy_path);
    let _ = events.emit(
        "legacy_migrated",
        json!({ "projects": count })
            .as_object()
            .cloned()
            .unwrap_or_default(),
    );
}
