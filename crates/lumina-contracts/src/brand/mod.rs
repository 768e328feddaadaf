mod asset;
mod concept;
mod project;

pub use asset::{AssetState, ERROR_SENTINEL};
pub use concept::{
    AspectRatio, BrandConcept, BrandVoice, Color, ImageSize, MissionVision, MockupKind, SocialPost,
};
pub use project::{BrandInput, Project, ProjectStatus};
