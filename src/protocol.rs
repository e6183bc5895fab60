//! Public protocol structs for the HTTP and WebSocket endpoints (serde ready).
//! Enum-valued inputs arrive as strings and are validated by the core, so a
//! bad value yields a readable validation error instead of a decode failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, Exercise, ExerciseKind, ExerciseOption, Paper};
use crate::events::MutationEvent;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
}

/// Messages the server sends over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Invalidate {
        #[serde(flatten)]
        event: MutationEvent,
    },
    Error {
        message: String,
    },
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

//
// Catalog
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollegeIn {
    pub name: String,
    #[serde(alias = "collegeSlug")]
    pub slug: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseIn {
    pub college_slug: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCourseIn {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKnowledgePointIn {
    pub course_id: String,
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateKnowledgePointIn {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// Sidebar tree node: college → courses → knowledge points.
#[derive(Debug, Serialize, PartialEq)]
pub struct NavItem {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub items: Vec<NavItem>,
}

//
// Exercises
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExerciseIn {
    #[serde(rename = "type")]
    pub kind: String,
    pub difficulty: String,
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub analysis: Option<String>,
    /// Option bodies, in display order. Kept only for choice questions.
    #[serde(default)]
    pub options: Vec<String>,
    pub knowledge_point_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExerciseIn {
    #[serde(rename = "type")]
    pub kind: String,
    pub difficulty: String,
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub analysis: Option<String>,
    /// `None` keeps the current options.
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseListQuery {
    #[serde(default)]
    pub knowledge_point_id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseOut {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ExerciseKind,
    pub difficulty: Difficulty,
    pub question: String,
    pub answer: String,
    pub analysis: Option<String>,
    pub options: Vec<ExerciseOption>,
    pub knowledge_point_id: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub bookmarked: bool,
}

impl ExerciseOut {
    pub fn from_exercise(e: &Exercise, bookmarked: bool) -> Self {
        Self {
            id: e.id.clone(),
            kind: e.kind,
            difficulty: e.difficulty,
            question: e.question.clone(),
            answer: e.answer.clone(),
            analysis: e.analysis.clone(),
            options: e.options.clone(),
            knowledge_point_id: e.knowledge_point_id.clone(),
            author_id: e.author_id.clone(),
            created_at: e.created_at,
            updated_at: e.updated_at,
            bookmarked,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseListOut {
    pub exercise_list: Vec<ExerciseOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookmarkOut {
    pub bookmarked: bool,
}

//
// Rules
//

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleIn {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub knowledge_point_id: Option<String>,
    /// Signed so that zero and negatives get a validation error, not a decode error.
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceRulesIn {
    pub rules: Vec<RuleIn>,
}

//
// Papers
//

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssemblyMode {
    /// Clear the target paper, then fill it from the rules. Must be asked for.
    Replace,
    /// Keep what the paper holds and append new selections.
    #[default]
    Extend,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembleIn {
    #[serde(default)]
    pub paper_id: Option<String>,
    #[serde(default)]
    pub mode: AssemblyMode,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleContribution {
    pub rule_id: String,
    pub requested: u32,
    pub matched: usize,
    /// Candidates taken before dedup (≤ requested).
    pub taken: usize,
    pub skipped_duplicates: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembleOut {
    pub paper_id: String,
    pub paper: PaperOut,
    pub contributions: Vec<RuleContribution>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperOut {
    pub id: String,
    pub owner_id: String,
    pub exercises: Vec<ExerciseOut>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaperOut {
    /// Resolve exercise ids in paper order.
    pub fn build(
        paper: &Paper,
        resolve: impl Fn(&str) -> Option<ExerciseOut>,
        limit: Option<usize>,
    ) -> Self {
        let exercises = paper
            .exercise_ids
            .iter()
            .filter_map(|id| resolve(id.as_str()))
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Self {
            id: paper.id.clone(),
            owner_id: paper.owner_id.clone(),
            exercises,
            created_at: paper.created_at,
            updated_at: paper.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CurrentPaperQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}
