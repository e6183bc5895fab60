//! Exercise filter: criteria matching, stable ordering, keyset pagination.
//!
//! Order is `created_at` descending with the store sequence number as
//! tie-break; the paper assembler relies on this order for "first N".

use std::cmp::Ordering;

use tracing::{debug, instrument};

use crate::domain::{parse_difficulty_selector, parse_kind_selector, Difficulty, Exercise, ExerciseKind, RequestContext};
use crate::error::{BankError, BankResult};
use crate::protocol::{ExerciseListOut, ExerciseListQuery, ExerciseOut};
use crate::state::AppState;
use crate::store::Tables;
use crate::util::non_blank;

/// Validated selection criteria. `None` fields do not filter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExerciseCriteria {
  pub kind: Option<ExerciseKind>,
  pub difficulty: Option<Difficulty>,
  pub knowledge_point_id: Option<String>,
  pub keyword: Option<String>,
}

impl ExerciseCriteria {
  fn matches(&self, tables: &Tables, e: &Exercise) -> bool {
    if self.kind.is_some_and(|k| k != e.kind) {
      return false;
    }
    if self.difficulty.is_some_and(|d| d != e.difficulty) {
      return false;
    }
    if let Some(kp) = &self.knowledge_point_id {
      if &e.knowledge_point_id != kp {
        return false;
      }
    }
    if let Some(kw) = &self.keyword {
      let kp_name_hit = tables
        .knowledge_points
        .get(&e.knowledge_point_id)
        .is_some_and(|kp| kp.name.contains(kw.as_str()));
      if !(e.question.contains(kw.as_str()) || e.answer.contains(kw.as_str()) || kp_name_hit) {
        return false;
      }
    }
    true
  }
}

/// Most recent first.
pub fn newest_first(a: &Exercise, b: &Exercise) -> Ordering {
  b.created_at.cmp(&a.created_at).then_with(|| b.seq.cmp(&a.seq))
}

/// Every matching exercise, in filter order.
pub fn select<'t>(tables: &'t Tables, criteria: &ExerciseCriteria) -> Vec<&'t Exercise> {
  let mut out: Vec<&Exercise> = tables.exercises.values().filter(|e| criteria.matches(tables, e)).collect();
  out.sort_by(|a, b| newest_first(a, b));
  out
}

#[derive(Debug, PartialEq)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub next_cursor: Option<String>,
}

/// Keyset pagination over an already ordered list. The cursor names the first
/// item of the page; an unknown cursor yields an empty page.
pub fn paginate<'a>(ordered: &[&'a Exercise], cursor: Option<&str>, limit: usize) -> Page<&'a Exercise> {
  let start = match cursor {
    None => 0,
    Some(c) => match ordered.iter().position(|e| e.id == c) {
      Some(i) => i,
      None => return Page { items: Vec::new(), next_cursor: None },
    },
  };

  let mut items: Vec<&Exercise> = ordered[start..].iter().take(limit.saturating_add(1)).copied().collect();
  let next_cursor = if items.len() > limit { items.pop().map(|e| e.id.clone()) } else { None };
  Page { items, next_cursor }
}

/// Validate a wire query into criteria plus a page size. No store access.
pub fn parse_query(query: &ExerciseListQuery, default_limit: usize, max_limit: usize) -> BankResult<(ExerciseCriteria, usize)> {
  let criteria = ExerciseCriteria {
    kind: parse_kind_selector(query.kind.as_deref())?,
    difficulty: parse_difficulty_selector(query.difficulty.as_deref())?,
    knowledge_point_id: non_blank(query.knowledge_point_id.as_deref()),
    keyword: non_blank(query.keyword.as_deref()),
  };
  let limit = query.limit.unwrap_or(default_limit);
  if limit == 0 || limit > max_limit {
    return Err(BankError::Validation(format!("limit must be between 1 and {}", max_limit)));
  }
  Ok((criteria, limit))
}

#[instrument(level = "info", skip(state, query), fields(user = %ctx.user_id, kp = ?query.knowledge_point_id, cursor = ?query.cursor))]
pub async fn get_exercise_list(state: &AppState, ctx: &RequestContext, query: ExerciseListQuery) -> BankResult<ExerciseListOut> {
  let pagination = &state.config.pagination;
  let (criteria, limit) = parse_query(&query, pagination.default_limit, pagination.max_limit)?;

  let t = state.store.read().await;
  let ordered = select(&t, &criteria);
  let page = paginate(&ordered, query.cursor.as_deref(), limit);
  let marks = t.bookmarks.get(&ctx.user_id);
  let exercise_list: Vec<ExerciseOut> = page
    .items
    .iter()
    .map(|e| ExerciseOut::from_exercise(e, marks.is_some_and(|m| m.contains(&e.id))))
    .collect();

  debug!(target: "exercise_bank", matched = ordered.len(), returned = exercise_list.len(), has_more = page.next_cursor.is_some(), "Exercise list served");
  Ok(ExerciseListOut { exercise_list, next_cursor: page.next_cursor })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::fixtures;

  #[test]
  fn sentinels_and_bad_values_in_query() {
    let q = ExerciseListQuery {
      kind: Some("ALL_QUESTION".into()),
      difficulty: Some("ANY".into()),
      ..Default::default()
    };
    let (criteria, limit) = parse_query(&q, 10, 100).unwrap();
    assert_eq!(criteria, ExerciseCriteria::default());
    assert_eq!(limit, 10);

    let bad = ExerciseListQuery { kind: Some("INVALID".into()), ..Default::default() };
    assert!(matches!(parse_query(&bad, 10, 100), Err(BankError::Validation(_))));

    let zero = ExerciseListQuery { limit: Some(0), ..Default::default() };
    assert!(matches!(parse_query(&zero, 10, 100), Err(BankError::Validation(_))));
  }

  #[tokio::test]
  async fn filters_by_kind_difficulty_and_keyword() {
    let state = AppState::in_memory();
    let kp = fixtures::knowledge_point(&state, "Token").await;
    let other = fixtures::knowledge_point(&state, "NFA").await;
    fixtures::exercise(&state, &kp.id, ExerciseKind::Choice, Difficulty::Easy, "lexer basics").await;
    fixtures::exercise(&state, &kp.id, ExerciseKind::Big, Difficulty::Easy, "parser design").await;
    fixtures::exercise(&state, &kp.id, ExerciseKind::Choice, Difficulty::Hard, "lexer edge cases").await;
    fixtures::exercise(&state, &other.id, ExerciseKind::Choice, Difficulty::Easy, "automaton").await;

    let t = state.store.read().await;
    let choice_easy = ExerciseCriteria {
      kind: Some(ExerciseKind::Choice),
      difficulty: Some(Difficulty::Easy),
      knowledge_point_id: Some(kp.id.clone()),
      keyword: None,
    };
    let hits = select(&t, &choice_easy);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].question, "lexer basics");

    let by_keyword = ExerciseCriteria { keyword: Some("lexer".into()), ..Default::default() };
    assert_eq!(select(&t, &by_keyword).len(), 2);

    let by_kp_name = ExerciseCriteria { keyword: Some("NFA".into()), ..Default::default() };
    let hits = select(&t, &by_kp_name);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].question, "automaton");
  }

  #[tokio::test]
  async fn newest_exercises_come_first() {
    let state = AppState::in_memory();
    let kp = fixtures::knowledge_point(&state, "Token").await;
    for q in ["first", "second", "third"] {
      fixtures::exercise(&state, &kp.id, ExerciseKind::Big, Difficulty::Medium, q).await;
    }
    let t = state.store.read().await;
    let questions: Vec<&str> = select(&t, &ExerciseCriteria::default()).iter().map(|e| e.question.as_str()).collect();
    assert_eq!(questions, vec!["third", "second", "first"]);
  }

  #[tokio::test]
  async fn following_cursors_covers_everything_once() {
    let state = AppState::in_memory();
    let kp = fixtures::knowledge_point(&state, "Token").await;
    for i in 0..7 {
      fixtures::exercise(&state, &kp.id, ExerciseKind::Completion, Difficulty::Easy, &format!("q{}", i)).await;
    }
    let t = state.store.read().await;
    let all = select(&t, &ExerciseCriteria::default());
    let expected: Vec<&str> = all.iter().map(|e| e.id.as_str()).collect();

    let mut seen: Vec<&str> = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
      let page = paginate(&all, cursor.as_deref(), 3);
      assert!(page.items.len() <= 3);
      seen.extend(page.items.iter().map(|e| e.id.as_str()));
      match page.next_cursor {
        Some(c) => cursor = Some(c),
        None => break,
      }
    }
    assert_eq!(seen, expected);
  }

  #[tokio::test]
  async fn exact_fit_page_has_no_next_cursor() {
    let state = AppState::in_memory();
    let kp = fixtures::knowledge_point(&state, "Token").await;
    for i in 0..3 {
      fixtures::exercise(&state, &kp.id, ExerciseKind::Big, Difficulty::Easy, &format!("q{}", i)).await;
    }
    let t = state.store.read().await;
    let all = select(&t, &ExerciseCriteria::default());
    let page = paginate(&all, None, 3);
    assert_eq!(page.items.len(), 3);
    assert_eq!(page.next_cursor, None);

    let stale = paginate(&all, Some("deleted-id"), 3);
    assert!(stale.items.is_empty());
  }

  #[tokio::test]
  async fn list_marks_bookmarks_for_caller() {
    let state = AppState::in_memory();
    let ctx = RequestContext::user("reader");
    let kp = fixtures::knowledge_point(&state, "Token").await;
    let e = fixtures::exercise(&state, &kp.id, ExerciseKind::Big, Difficulty::Easy, "q").await;
    crate::catalog::toggle_bookmark(&state, &ctx, &e.id).await.unwrap();

    let out = get_exercise_list(
      &state,
      &ctx,
      ExerciseListQuery { knowledge_point_id: Some(kp.id.clone()), ..Default::default() },
    )
    .await
    .unwrap();
    assert_eq!(out.exercise_list.len(), 1);
    assert!(out.exercise_list[0].bookmarked);
    assert!(out.next_cursor.is_none());
  }
}
