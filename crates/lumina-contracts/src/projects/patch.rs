use indexmap::IndexMap;

use crate::brand::{AssetState, BrandConcept, MockupKind, Project};

use super::history::AssetVersion;

#[derive(Debug, Clone, Default)]
pub struct ConceptPatch {
    pub logo_url: Option<AssetState>,
    pub logo_history: Option<Vec<AssetVersion>>,
    pub mood_board_url: Option<AssetState>,
    pub mood_board_history: Option<Vec<AssetVersion>>,
    pub mockups: IndexMap<MockupKind, AssetState>,
    pub campaign_assets: IndexMap<u32, AssetState>,
}

impl ConceptPatch {
    pub fn logo(state: AssetState) -> Self {
        Self {
            logo_url: Some(state),
            ..Self::default()
        }
    }

    pub fn mood_board(state: AssetState) -> Self {
        Self {
            mood_board_url: Some(state),
            ..Self::default()
        }
    }

    pub fn mockup(kind: MockupKind, state: AssetState) -> Self {
        let mut patch = Self::default();
        patch.mockups.insert(kind, state);
        patch
    }

    pub fn campaign_asset(index: u32, state: AssetState) -> Self {
        let mut patch = Self::default();
        patch.campaign_assets.insert(index, state);
        patch
    }
}

pub fn apply_update(
    projects: &[Project],
    project_id: &str,
    concept_id: &str,
    patch: &ConceptPatch,
) -> Vec<Project> {
    projects
        .iter()
        .map(|project| {
            if project.id != project_id {
                return project.clone();
            }
            let mut updated = project.clone();
            for concept in &mut updated.concepts {
                if concept.id == concept_id {
                    apply_concept_patch(concept, patch);
                }
            }
            updated
        })
        .collect()
}

pub fn apply_concept_patch(concept: &mut BrandConcept, patch: &ConceptPatch) {
    if let Some(state) = &patch.logo_url {
        concept.logo_url = state.clone();
    }
    if let Some(history) = &patch.logo_history {
        concept.logo_history = history.clone();
    }
    if let Some(state) = &patch.mood_board_url {
        concept.mood_board_url = state.clone();
    }
    if let Some(history) = &patch.mood_board_history {
        concept.mood_board_history = history.clone();
    }
    for (kind, state) in &patch.mockups {
        concept.mockups.insert(*kind, state.clone());
    }
    for (index, state) in &patch.campaign_assets {
        concept.campaign_assets.insert(*index, state.clone());
    }
}
