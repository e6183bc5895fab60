//! Manual paper curation on top of assembly.
//!
//! Add and remove touch one paper/exercise relation each and never re-run
//! rules. Both are idempotent; concurrent calls on one paper resolve as
//! last-write-wins under the store lock.

use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::domain::{Paper, RequestContext};
use crate::error::{BankError, BankResult};
use crate::events::Scope;
use crate::protocol::{ExerciseOut, PaperOut};
use crate::state::AppState;
use crate::store::Tables;
use crate::util::new_id;

fn render(t: &Tables, ctx: &RequestContext, paper: &Paper, limit: Option<usize>) -> PaperOut {
    let marks = t.bookmarks.get(&ctx.user_id);
    PaperOut::build(
        paper,
        |id| t.exercises.get(id).map(|e| ExerciseOut::from_exercise(e, marks.is_some_and(|m| m.contains(id)))),
        limit,
    )
}

#[instrument(level = "info", skip(state), fields(user = %ctx.user_id))]
pub async fn create_paper(state: &AppState, ctx: &RequestContext) -> BankResult<Paper> {
    let now = Utc::now();
    let paper = Paper {
        id: new_id(),
        owner_id: ctx.user_id.clone(),
        exercise_ids: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    let mut t = state.store.write().await;
    t.papers.insert(paper.id.clone(), paper.clone());
    t.commit().await?;
    drop(t);

    state.events.publish(Scope::Paper { paper_id: paper.id.clone() });
    info!(target: "paper", paper = %paper.id, "Empty paper created");
    Ok(paper)
}

/// Add one exercise. Already present is a silent success.
#[instrument(level = "info", skip(state), fields(user = %ctx.user_id))]
pub async fn add_exercise(state: &AppState, ctx: &RequestContext, paper_id: &str, exercise_id: &str) -> BankResult<()> {
    let mut t = state.store.write().await;
    t.exercise(exercise_id)?;
    let paper = t.owned_paper_mut(&ctx.user_id, paper_id)?;
    if paper.contains(exercise_id) {
        debug!(target: "paper", %paper_id, %exercise_id, "Exercise already on paper");
        return Ok(());
    }
    paper.exercise_ids.push(exercise_id.to_string());
    paper.updated_at = Utc::now();
    t.commit().await?;
    drop(t);

    state.events.publish(Scope::Paper { paper_id: paper_id.to_string() });
    Ok(())
}

/// Remove one exercise. Not on the paper is a silent success.
#[instrument(level = "info", skip(state), fields(user = %ctx.user_id))]
pub async fn remove_exercise(state: &AppState, ctx: &RequestContext, paper_id: &str, exercise_id: &str) -> BankResult<()> {
    let mut t = state.store.write().await;
    let paper = t.owned_paper_mut(&ctx.user_id, paper_id)?;
    let before = paper.exercise_ids.len();
    paper.exercise_ids.retain(|id| id != exercise_id);
    if paper.exercise_ids.len() == before {
        debug!(target: "paper", %paper_id, %exercise_id, "Exercise not on paper");
        return Ok(());
    }
    paper.updated_at = Utc::now();
    t.commit().await?;
    drop(t);

    state.events.publish(Scope::Paper { paper_id: paper_id.to_string() });
    Ok(())
}

pub async fn get_paper(state: &AppState, ctx: &RequestContext, paper_id: &str) -> BankResult<PaperOut> {
    let t = state.store.read().await;
    match t.papers.get(paper_id) {
        Some(p) if p.owner_id == ctx.user_id => Ok(render(&t, ctx, p, None)),
        _ => Err(BankError::NotFound(format!("no paper with id '{}'", paper_id))),
    }
}

/// Caller's papers, newest first.
pub async fn list_papers(state: &AppState, ctx: &RequestContext) -> Vec<Paper> {
    let t = state.store.read().await;
    let mut out: Vec<Paper> = t.papers.values().filter(|p| p.owner_id == ctx.user_id).cloned().collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    out
}

/// The caller's most recently created paper with exercises resolved, or
/// `None` if they have none yet.
pub async fn current_paper(state: &AppState, ctx: &RequestContext, limit: Option<usize>) -> Option<PaperOut> {
    let t = state.store.read().await;
    t.papers
        .values()
        .filter(|p| p.owner_id == ctx.user_id)
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
        .map(|p| render(&t, ctx, p, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;
    use crate::domain::{Difficulty, ExerciseKind};

    #[tokio::test]
    async fn adding_twice_is_the_same_as_once() {
        let state = AppState::in_memory();
        let ctx = RequestContext::user("u1");
        let kp = fixtures::knowledge_point(&state, "K1").await;
        let e = fixtures::exercise(&state, &kp.id, ExerciseKind::Big, Difficulty::Easy, "q").await;
        let paper = create_paper(&state, &ctx).await.unwrap();

        add_exercise(&state, &ctx, &paper.id, &e.id).await.unwrap();
        let once = get_paper(&state, &ctx, &paper.id).await.unwrap();
        add_exercise(&state, &ctx, &paper.id, &e.id).await.unwrap();
        let twice = get_paper(&state, &ctx, &paper.id).await.unwrap();

        assert_eq!(once.exercises, twice.exercises);
        assert_eq!(twice.exercises.len(), 1);
    }

    #[tokio::test]
    async fn removing_an_absent_exercise_succeeds() {
        let state = AppState::in_memory();
        let ctx = RequestContext::user("u1");
        let kp = fixtures::knowledge_point(&state, "K1").await;
        let kept = fixtures::exercise(&state, &kp.id, ExerciseKind::Big, Difficulty::Easy, "kept").await;
        let paper = create_paper(&state, &ctx).await.unwrap();
        add_exercise(&state, &ctx, &paper.id, &kept.id).await.unwrap();

        remove_exercise(&state, &ctx, &paper.id, "never-added").await.unwrap();
        let out = get_paper(&state, &ctx, &paper.id).await.unwrap();
        assert_eq!(out.exercises.len(), 1);

        remove_exercise(&state, &ctx, &paper.id, &kept.id).await.unwrap();
        remove_exercise(&state, &ctx, &paper.id, &kept.id).await.unwrap();
        assert!(get_paper(&state, &ctx, &paper.id).await.unwrap().exercises.is_empty());
    }

    #[tokio::test]
    async fn unknown_paper_or_exercise_is_not_found() {
        let state = AppState::in_memory();
        let ctx = RequestContext::user("u1");
        let kp = fixtures::knowledge_point(&state, "K1").await;
        let e = fixtures::exercise(&state, &kp.id, ExerciseKind::Big, Difficulty::Easy, "q").await;
        let paper = create_paper(&state, &ctx).await.unwrap();

        assert!(matches!(add_exercise(&state, &ctx, "ghost", &e.id).await, Err(BankError::NotFound(_))));
        assert!(matches!(add_exercise(&state, &ctx, &paper.id, "ghost").await, Err(BankError::NotFound(_))));
        assert!(matches!(remove_exercise(&state, &ctx, "ghost", &e.id).await, Err(BankError::NotFound(_))));
        let other = RequestContext::user("u2");
        assert!(matches!(add_exercise(&state, &other, &paper.id, &e.id).await, Err(BankError::NotFound(_))));
    }

    #[tokio::test]
    async fn current_paper_is_the_latest_one() {
        let state = AppState::in_memory();
        let ctx = RequestContext::user("u1");
        assert!(current_paper(&state, &ctx, None).await.is_none());

        let kp = fixtures::knowledge_point(&state, "K1").await;
        let a = fixtures::exercise(&state, &kp.id, ExerciseKind::Big, Difficulty::Easy, "a").await;
        let b = fixtures::exercise(&state, &kp.id, ExerciseKind::Big, Difficulty::Easy, "b").await;
        create_paper(&state, &ctx).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let latest = create_paper(&state, &ctx).await.unwrap();
        add_exercise(&state, &ctx, &latest.id, &a.id).await.unwrap();
        add_exercise(&state, &ctx, &latest.id, &b.id).await.unwrap();

        let cur = current_paper(&state, &ctx, Some(1)).await.unwrap();
        assert_eq!(cur.id, latest.id);
        assert_eq!(cur.exercises.len(), 1);
        assert_eq!(cur.exercises[0].id, a.id);
        assert_eq!(list_papers(&state, &ctx).await.len(), 2);
    }
}
