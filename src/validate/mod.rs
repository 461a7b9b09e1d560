//! Structural validation.
//!
//! Deterministic schema-shape checks over typed artifacts — no model calls.
//! Each validator returns a list of violation strings (empty = valid), and
//! each type exposes static repair-instruction text that the repair chain
//! feeds back to the model alongside the violations.

pub mod flashcards;
pub mod mindmap;
pub mod quiz;

use crate::artifact::{Artifact, ArtifactType};

/// Run the structural validator for the artifact's type.
pub fn validate(artifact: &Artifact) -> Vec<String> {
    match artifact {
        Artifact::Quiz(quiz) => quiz::validate(quiz),
        Artifact::Flashcards(deck) => flashcards::validate(deck),
        Artifact::Mindmap(map) => mindmap::validate(map),
    }
}

/// Schema rules for the given type, phrased as instructions to a model
/// fixing an invalid artifact.
pub fn repair_instructions(artifact_type: ArtifactType) -> &'static str {
    match artifact_type {
        ArtifactType::Quiz => quiz::REPAIR_INSTRUCTIONS,
        ArtifactType::Flashcards => flashcards::REPAIR_INSTRUCTIONS,
        ArtifactType::Mindmap => mindmap::REPAIR_INSTRUCTIONS,
    }
}
