use serde::{Deserialize, Serialize};

use super::concept::BrandConcept;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    GeneratingText,
    GeneratingImages,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandInput {
    pub company_name: String,
    pub description: String,
    pub business_type: String,
    pub brand_style: String,
    pub website_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    pub description: String,
    pub business_type: String,
    pub brand_style: String,
    pub created_at: u64,
    pub status: ProjectStatus,
    #[serde(default)]
    pub concepts: Vec<BrandConcept>,
}

impl Project {
    pub fn new(id: String, created_at: u64, input: &BrandInput) -> Self {
        Self {
            id,
            company_name: input.company_name.clone(),
            website_url: input
                .website_url
                .clone()
                .filter(|value| !value.trim().is_empty()),
            description: input.description.clone(),
            business_type: input.business_type.clone(),
            brand_style: input.brand_style.clone(),
            created_at,
            status: ProjectStatus::GeneratingText,
            concepts: Vec::new(),
        }
    }

    pub fn concept(&self, concept_id: &str) -> Option<&BrandConcept> {
        self.concepts.iter().find(|item| item.id == concept_id)
    }

    pub fn concept_mut(&mut self, concept_id: &str) -> Option<&mut BrandConcept> {
        self.concepts.iter_mut().find(|item| item.id == concept_id)
    }
}
