//! Domain models: the college → course → knowledge point → exercise catalog,
//! selection rules, papers, and the per-request caller context.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BankError;

/// Wire value meaning "any exercise kind". Never stored.
pub const ALL_QUESTION: &str = "ALL_QUESTION";
/// Wire value meaning "any difficulty". Never stored.
pub const ANY_DIFFICULTY: &str = "ANY";

/// What kind of question an exercise is.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExerciseKind {
  #[serde(rename = "COMPLETION_QUESTION")]
  Completion,
  #[serde(rename = "CHOICE_QUESTION")]
  Choice,
  #[serde(rename = "BIG_QUESTION")]
  Big,
}

impl ExerciseKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ExerciseKind::Completion => "COMPLETION_QUESTION",
      ExerciseKind::Choice => "CHOICE_QUESTION",
      ExerciseKind::Big => "BIG_QUESTION",
    }
  }
}

impl FromStr for ExerciseKind {
  type Err = BankError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "COMPLETION_QUESTION" => Ok(ExerciseKind::Completion),
      "CHOICE_QUESTION" => Ok(ExerciseKind::Choice),
      "BIG_QUESTION" => Ok(ExerciseKind::Big),
      other => Err(BankError::Validation(format!(
        "exercise type must be one of COMPLETION_QUESTION, CHOICE_QUESTION, BIG_QUESTION (got '{}')",
        other
      ))),
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "EASY",
      Difficulty::Medium => "MEDIUM",
      Difficulty::Hard => "HARD",
    }
  }
}

impl FromStr for Difficulty {
  type Err = BankError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "EASY" => Ok(Difficulty::Easy),
      "MEDIUM" => Ok(Difficulty::Medium),
      "HARD" => Ok(Difficulty::Hard),
      other => Err(BankError::Validation(format!(
        "difficulty must be one of EASY, MEDIUM, HARD (got '{}')",
        other
      ))),
    }
  }
}

/// Parse an optional wire kind. Absent or `ALL_QUESTION` means no filter.
pub fn parse_kind_selector(raw: Option<&str>) -> Result<Option<ExerciseKind>, BankError> {
  match raw {
    None | Some(ALL_QUESTION) => Ok(None),
    Some(s) => s.parse().map(Some),
  }
}

/// Parse an optional wire difficulty. Absent or `ANY` means no filter.
pub fn parse_difficulty_selector(raw: Option<&str>) -> Result<Option<Difficulty>, BankError> {
  match raw {
    None | Some(ANY_DIFFICULTY) => Ok(None),
    Some(s) => s.parse().map(Some),
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
  #[default]
  User,
  Admin,
}

/// Who is calling. Threaded explicitly into every operation that needs it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
  pub user_id: String,
  pub role: Role,
}

impl RequestContext {
  pub fn user(user_id: impl Into<String>) -> Self {
    Self { user_id: user_id.into(), role: Role::User }
  }

  pub fn admin(user_id: impl Into<String>) -> Self {
    Self { user_id: user_id.into(), role: Role::Admin }
  }

  pub fn is_admin(&self) -> bool {
    self.role == Role::Admin
  }

  pub fn require_admin(&self) -> Result<(), BankError> {
    if self.is_admin() {
      Ok(())
    } else {
      Err(BankError::Forbidden("administrator role required".into()))
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct College {
  pub id: String,
  pub name: String,
  pub slug: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
  pub id: String,
  pub college_id: String,
  pub name: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgePoint {
  pub id: String,
  pub course_id: String,
  pub name: String,
  #[serde(default)]
  pub label: Option<String>,
  pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExerciseOption {
  pub id: String,
  pub content: String,
}

/// The atomic unit selected into a paper. Assembly only ever reads these.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: ExerciseKind,
  pub difficulty: Difficulty,
  pub question: String,
  pub answer: String,
  #[serde(default)]
  pub analysis: Option<String>,
  /// Only populated for choice questions.
  #[serde(default)]
  pub options: Vec<ExerciseOption>,
  pub knowledge_point_id: String,
  pub author_id: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  /// Store-wide insertion counter, tie-break for equal `created_at`.
  #[serde(default)]
  pub seq: u64,
}

/// A declarative selection criterion. `None` selectors match anything.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
  pub id: String,
  pub owner_id: String,
  #[serde(rename = "type", default)]
  pub kind: Option<ExerciseKind>,
  #[serde(default)]
  pub difficulty: Option<Difficulty>,
  #[serde(default)]
  pub knowledge_point_id: Option<String>,
  pub amount: u32,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub seq: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
  pub id: String,
  pub owner_id: String,
  /// Ordered; an id appears at most once.
  pub exercise_ids: Vec<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Paper {
  pub fn contains(&self, exercise_id: &str) -> bool {
    self.exercise_ids.iter().any(|id| id == exercise_id)
  }
}
