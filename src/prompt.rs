//! Prompt construction for the phase pipeline.
//!
//! Each builder returns the full message list for one provider call. The
//! schemas described here must stay in lockstep with the typed artifacts
//! in [`crate::artifact`] and the rules in [`crate::validate`].

use crate::artifact::{Artifact, ArtifactType};
use crate::error::Result;
use crate::model::{ArtifactJob, GenerationPlan};
use crate::provider::ChatMessage;
use crate::validate;

fn type_schema_hint(artifact_type: ArtifactType) -> &'static str {
    match artifact_type {
        ArtifactType::Quiz => {
            r#"{"questions": [{"question": "...", "options": ["...", "...", "...", "..."], "correct_answer": "...", "explanation": "..."}]}"#
        }
        ArtifactType::Flashcards => r#"{"flashcards": [{"front": "...", "back": "..."}]}"#,
        ArtifactType::Mindmap => {
            r#"{"root": {"label": "...", "children": [{"label": "...", "children": []}]}}"#
        }
    }
}

/// Planning: outline the artifact before drafting it.
pub fn planning_messages(job: &ArtifactJob) -> Vec<ChatMessage> {
    let mut constraints = String::new();
    if let Some(count) = job.options.item_count {
        constraints.push_str(&format!("Target item count: {count}.\n"));
    }
    if let Some(ref difficulty) = job.options.difficulty {
        constraints.push_str(&format!("Difficulty: {difficulty}.\n"));
    }
    if let Some(ref focus) = job.options.focus {
        constraints.push_str(&format!("Emphasise: {focus}.\n"));
    }
    if let Some(depth) = job.options.max_depth {
        constraints.push_str(&format!("Maximum tree depth: {depth}.\n"));
    }

    vec![
        ChatMessage::system(format!(
            "You plan study materials. Given source material, produce a plan \
             for a {} as a JSON object: {{\"topics\": [string], \
             \"item_count\": number, \"difficulty\": string, \
             \"approach\": string}}. Cover the source evenly and do not \
             invent topics it does not contain.",
            job.artifact_type
        )),
        ChatMessage::user(format!(
            "Source material:\n{}\n\nStudent request:\n{}\n\n{}",
            job.retrieval_snapshot, job.content, constraints
        )),
    ]
}

/// Generation: draft the artifact from the plan.
pub fn generation_messages(job: &ArtifactJob, plan: &GenerationPlan) -> Result<Vec<ChatMessage>> {
    let plan_json = serde_json::to_string_pretty(plan)?;

    Ok(vec![
        ChatMessage::system(format!(
            "You write study materials grounded strictly in the supplied \
             source. Produce a {} as a JSON object with this exact shape:\n\
             {}\nEvery claim must come from the source material.",
            job.artifact_type,
            type_schema_hint(job.artifact_type)
        )),
        ChatMessage::user(format!(
            "Source material:\n{}\n\nPlan:\n{plan_json}",
            job.retrieval_snapshot
        )),
    ])
}

/// Repair: fix a validation-failing artifact, given the itemized violations.
pub fn repair_messages(
    plan: Option<&GenerationPlan>,
    source: &str,
    artifact: &Artifact,
    violations: &[String],
) -> Result<Vec<ChatMessage>> {
    let artifact_json = serde_json::to_string_pretty(&artifact.to_value()?)?;
    let plan_json = match plan {
        Some(p) => serde_json::to_string_pretty(p)?,
        None => "(no plan)".to_string(),
    };
    let itemized: String = violations
        .iter()
        .map(|v| format!("- {v}\n"))
        .collect();

    Ok(vec![
        ChatMessage::system(format!(
            "You fix invalid study materials. Correct the artifact so that \
             every listed violation is resolved, changing as little else as \
             possible. {}\nRespond with the corrected JSON object only.",
            validate::repair_instructions(artifact.artifact_type())
        )),
        ChatMessage::user(format!(
            "Original plan:\n{plan_json}\n\nSource material:\n{source}\n\n\
             Current artifact (invalid):\n{artifact_json}\n\nViolations:\n{itemized}"
        )),
    ])
}
