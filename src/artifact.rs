//! Typed artifact schemas.
//!
//! Each artifact type carries its own strongly-typed document, wrapped in a
//! closed [`Artifact`] enum. Draft parsing is deliberately lenient: every
//! field is serde-defaulted, so a model draft missing a field deserializes
//! into an empty value and surfaces as a structural violation the repair
//! chain can fix, instead of killing the job at the parse boundary.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Artifact type
// ---------------------------------------------------------------------------

/// The closed set of artifact kinds the pipeline produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Quiz,
    Flashcards,
    Mindmap,
}

impl std::fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArtifactType::Quiz => "quiz",
            ArtifactType::Flashcards => "flashcards",
            ArtifactType::Mindmap => "mindmap",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ArtifactType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "quiz" => Ok(ArtifactType::Quiz),
            "flashcards" => Ok(ArtifactType::Flashcards),
            "mindmap" => Ok(ArtifactType::Mindmap),
            _ => Err(Error::Other(format!("unknown artifact type: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Quiz
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizQuestion {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
}

// ---------------------------------------------------------------------------
// Flashcards
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Flashcard {
    #[serde(default)]
    pub front: String,
    #[serde(default)]
    pub back: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashcardDeck {
    #[serde(default)]
    pub flashcards: Vec<Flashcard>,
}

// ---------------------------------------------------------------------------
// Mind map
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MindMapNode {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub children: Vec<MindMapNode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MindMap {
    #[serde(default)]
    pub root: MindMapNode,
}

// ---------------------------------------------------------------------------
// Tagged wrapper
// ---------------------------------------------------------------------------

/// A generated artifact, tagged by type.
#[derive(Debug, Clone)]
pub enum Artifact {
    Quiz(Quiz),
    Flashcards(FlashcardDeck),
    Mindmap(MindMap),
}

impl Artifact {
    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            Artifact::Quiz(_) => ArtifactType::Quiz,
            Artifact::Flashcards(_) => ArtifactType::Flashcards,
            Artifact::Mindmap(_) => ArtifactType::Mindmap,
        }
    }

    /// Parse model output as an artifact of the given type.
    ///
    /// Strips markdown code fences first; models wrap JSON in them even
    /// when told not to. Only structurally alien JSON (not an object, or
    /// not JSON at all) is an error — missing fields become defaults and
    /// are the validators' concern.
    pub fn parse(artifact_type: ArtifactType, text: &str) -> Result<Self> {
        let json = strip_code_fences(text);
        let parse_err =
            |e: serde_json::Error| Error::BadArtifact(format!("{artifact_type} draft: {e}"));
        match artifact_type {
            ArtifactType::Quiz => Ok(Artifact::Quiz(serde_json::from_str(json).map_err(parse_err)?)),
            ArtifactType::Flashcards => Ok(Artifact::Flashcards(
                serde_json::from_str(json).map_err(parse_err)?,
            )),
            ArtifactType::Mindmap => Ok(Artifact::Mindmap(
                serde_json::from_str(json).map_err(parse_err)?,
            )),
        }
    }

    /// The artifact document as stored in `ArtifactJob::result`.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        let value = match self {
            Artifact::Quiz(quiz) => serde_json::to_value(quiz)?,
            Artifact::Flashcards(deck) => serde_json::to_value(deck)?,
            Artifact::Mindmap(map) => serde_json::to_value(map)?,
        };
        Ok(value)
    }
}

/// Strip a leading/trailing markdown code fence from model output.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", ...) on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tolerates_missing_fields() {
        let artifact =
            Artifact::parse(ArtifactType::Quiz, r#"{"questions": [{"question": "Q?"}]}"#).unwrap();
        let Artifact::Quiz(quiz) = artifact else {
            panic!("expected quiz");
        };
        assert_eq!(quiz.questions.len(), 1);
        assert!(quiz.questions[0].options.is_empty());
        assert!(quiz.questions[0].explanation.is_empty());
    }

    #[test]
    fn parse_rejects_non_json() {
        let err = Artifact::parse(ArtifactType::Flashcards, "Sorry, I can't do that.");
        assert!(err.is_err());
    }

    #[test]
    fn strips_fenced_json() {
        let fenced = "```json\n{\"flashcards\": []}\n```";
        assert_eq!(strip_code_fences(fenced), r#"{"flashcards": []}"#);

        let bare = r#"{"flashcards": []}"#;
        assert_eq!(strip_code_fences(bare), bare);
    }

    #[test]
    fn artifact_type_round_trips_through_strings() {
        for t in [ArtifactType::Quiz, ArtifactType::Flashcards, ArtifactType::Mindmap] {
            let parsed: ArtifactType = t.to_string().parse().unwrap();
            assert_eq!(parsed, t);
        }
    }
}
