//! HTTP endpoint handlers. These are thin wrappers that forward to the core
//! modules; errors render through `BankError`'s `IntoResponse`.

use std::sync::Arc;

use axum::{
  body::Bytes,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::domain::{College, Course, Exercise, KnowledgePoint, Paper, RequestContext, Rule};
use crate::error::{BankError, BankResult};
use crate::protocol::*;
use crate::state::AppState;
use crate::{assembler, catalog, filter, membership, rules};

type AppStateRef = State<Arc<AppState>>;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

//
// Colleges / courses / knowledge points
//

pub async fn http_list_colleges(State(state): AppStateRef) -> Json<Vec<College>> {
  Json(catalog::list_colleges(&state).await)
}

pub async fn http_get_college(State(state): AppStateRef, Path(slug): Path<String>) -> BankResult<Json<College>> {
  catalog::get_college_by_slug(&state, &slug).await.map(Json)
}

pub async fn http_get_college_by_id(State(state): AppStateRef, Path(id): Path<String>) -> BankResult<Json<College>> {
  catalog::get_college(&state, &id).await.map(Json)
}

pub async fn http_create_college(
  State(state): AppStateRef,
  ctx: RequestContext,
  Json(body): Json<CollegeIn>,
) -> BankResult<(StatusCode, Json<College>)> {
  let college = catalog::create_college(&state, &ctx, body).await?;
  Ok((StatusCode::CREATED, Json(college)))
}

pub async fn http_update_college(
  State(state): AppStateRef,
  ctx: RequestContext,
  Path(id): Path<String>,
  Json(body): Json<CollegeIn>,
) -> BankResult<Json<College>> {
  catalog::update_college(&state, &ctx, &id, body).await.map(Json)
}

pub async fn http_delete_college(State(state): AppStateRef, ctx: RequestContext, Path(id): Path<String>) -> BankResult<StatusCode> {
  catalog::delete_college(&state, &ctx, &id).await?;
  Ok(StatusCode::NO_CONTENT)
}

pub async fn http_list_courses(State(state): AppStateRef, _ctx: RequestContext, Path(slug): Path<String>) -> BankResult<Json<Vec<Course>>> {
  catalog::list_courses(&state, &slug).await.map(Json)
}

pub async fn http_sidebar_nav(State(state): AppStateRef, _ctx: RequestContext, Path(slug): Path<String>) -> Json<Vec<NavItem>> {
  Json(catalog::sidebar_nav(&state, &slug).await)
}

pub async fn http_create_course(
  State(state): AppStateRef,
  ctx: RequestContext,
  Json(body): Json<CreateCourseIn>,
) -> BankResult<(StatusCode, Json<Course>)> {
  let course = catalog::create_course(&state, &ctx, body).await?;
  Ok((StatusCode::CREATED, Json(course)))
}

pub async fn http_update_course(
  State(state): AppStateRef,
  ctx: RequestContext,
  Path(id): Path<String>,
  Json(body): Json<UpdateCourseIn>,
) -> BankResult<Json<Course>> {
  catalog::update_course(&state, &ctx, &id, body).await.map(Json)
}

pub async fn http_delete_course(State(state): AppStateRef, ctx: RequestContext, Path(id): Path<String>) -> BankResult<StatusCode> {
  catalog::delete_course(&state, &ctx, &id).await?;
  Ok(StatusCode::NO_CONTENT)
}

pub async fn http_list_knowledge_points(
  State(state): AppStateRef,
  _ctx: RequestContext,
  Path(course_id): Path<String>,
) -> BankResult<Json<Vec<KnowledgePoint>>> {
  catalog::list_knowledge_points(&state, &course_id).await.map(Json)
}

pub async fn http_create_knowledge_point(
  State(state): AppStateRef,
  ctx: RequestContext,
  Json(body): Json<CreateKnowledgePointIn>,
) -> BankResult<(StatusCode, Json<KnowledgePoint>)> {
  let kp = catalog::create_knowledge_point(&state, &ctx, body).await?;
  Ok((StatusCode::CREATED, Json(kp)))
}

pub async fn http_get_knowledge_point(
  State(state): AppStateRef,
  _ctx: RequestContext,
  Path(id): Path<String>,
) -> BankResult<Json<KnowledgePoint>> {
  catalog::get_knowledge_point(&state, &id).await.map(Json)
}

pub async fn http_update_knowledge_point(
  State(state): AppStateRef,
  ctx: RequestContext,
  Path(id): Path<String>,
  Json(body): Json<UpdateKnowledgePointIn>,
) -> BankResult<Json<KnowledgePoint>> {
  catalog::update_knowledge_point(&state, &ctx, &id, body).await.map(Json)
}

//
// Exercises
//

#[instrument(level = "info", skip(state, q), fields(user = %ctx.user_id))]
pub async fn http_get_exercise_list(
  State(state): AppStateRef,
  ctx: RequestContext,
  Query(q): Query<ExerciseListQuery>,
) -> BankResult<Json<ExerciseListOut>> {
  filter::get_exercise_list(&state, &ctx, q).await.map(Json)
}

pub async fn http_create_exercise(
  State(state): AppStateRef,
  ctx: RequestContext,
  Json(body): Json<CreateExerciseIn>,
) -> BankResult<(StatusCode, Json<Exercise>)> {
  let exercise = catalog::create_exercise(&state, &ctx, body).await?;
  Ok((StatusCode::CREATED, Json(exercise)))
}

pub async fn http_get_exercise(State(state): AppStateRef, ctx: RequestContext, Path(id): Path<String>) -> BankResult<Json<ExerciseOut>> {
  catalog::get_exercise(&state, &ctx, &id).await.map(Json)
}

pub async fn http_update_exercise(
  State(state): AppStateRef,
  ctx: RequestContext,
  Path(id): Path<String>,
  Json(body): Json<UpdateExerciseIn>,
) -> BankResult<Json<Exercise>> {
  catalog::update_exercise(&state, &ctx, &id, body).await.map(Json)
}

pub async fn http_delete_exercise(State(state): AppStateRef, ctx: RequestContext, Path(id): Path<String>) -> BankResult<StatusCode> {
  catalog::delete_exercise(&state, &ctx, &id).await?;
  Ok(StatusCode::NO_CONTENT)
}

pub async fn http_toggle_bookmark(State(state): AppStateRef, ctx: RequestContext, Path(id): Path<String>) -> BankResult<Json<BookmarkOut>> {
  let bookmarked = catalog::toggle_bookmark(&state, &ctx, &id).await?;
  Ok(Json(BookmarkOut { bookmarked }))
}

pub async fn http_list_bookmarks(State(state): AppStateRef, ctx: RequestContext) -> Json<Vec<ExerciseOut>> {
  Json(catalog::list_bookmarks(&state, &ctx).await)
}

//
// Rules
//

pub async fn http_list_rules(State(state): AppStateRef, ctx: RequestContext) -> Json<Vec<Rule>> {
  Json(rules::list_rules(&state, &ctx).await)
}

pub async fn http_create_rule(
  State(state): AppStateRef,
  ctx: RequestContext,
  Json(body): Json<RuleIn>,
) -> BankResult<(StatusCode, Json<Rule>)> {
  let rule = rules::create_rule(&state, &ctx, body).await?;
  Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn http_replace_rules(
  State(state): AppStateRef,
  ctx: RequestContext,
  Json(body): Json<ReplaceRulesIn>,
) -> BankResult<Json<Vec<Rule>>> {
  rules::replace_rules(&state, &ctx, body.rules).await.map(Json)
}

pub async fn http_clear_rules(State(state): AppStateRef, ctx: RequestContext) -> BankResult<StatusCode> {
  rules::clear_rules(&state, &ctx).await?;
  Ok(StatusCode::NO_CONTENT)
}

pub async fn http_update_rule(
  State(state): AppStateRef,
  ctx: RequestContext,
  Path(id): Path<String>,
  Json(body): Json<RuleIn>,
) -> BankResult<Json<Rule>> {
  rules::update_rule(&state, &ctx, &id, body).await.map(Json)
}

pub async fn http_delete_rule(State(state): AppStateRef, ctx: RequestContext, Path(id): Path<String>) -> BankResult<StatusCode> {
  rules::delete_rule(&state, &ctx, &id).await?;
  Ok(StatusCode::NO_CONTENT)
}

//
// Papers
//

pub async fn http_create_paper(State(state): AppStateRef, ctx: RequestContext) -> BankResult<(StatusCode, Json<Paper>)> {
  let paper = membership::create_paper(&state, &ctx).await?;
  Ok((StatusCode::CREATED, Json(paper)))
}

/// Empty body means "new paper from my rules"; anything else must parse.
#[instrument(level = "info", skip(state, body), fields(user = %ctx.user_id))]
pub async fn http_assemble(
  State(state): AppStateRef,
  ctx: RequestContext,
  body: Bytes,
) -> BankResult<Json<AssembleOut>> {
  let input = if body.iter().all(u8::is_ascii_whitespace) {
    AssembleIn::default()
  } else {
    serde_json::from_slice::<AssembleIn>(&body)
      .map_err(|e| BankError::Validation(format!("invalid assemble request: {}", e)))?
  };
  let out = assembler::assemble(&state, &ctx, input).await?;
  info!(target: "paper", paper = %out.paper_id, exercises = out.paper.exercises.len(), "HTTP assemble served");
  Ok(Json(out))
}

pub async fn http_list_papers(State(state): AppStateRef, ctx: RequestContext) -> Json<Vec<Paper>> {
  Json(membership::list_papers(&state, &ctx).await)
}

pub async fn http_current_paper(
  State(state): AppStateRef,
  ctx: RequestContext,
  Query(q): Query<CurrentPaperQuery>,
) -> BankResult<Json<PaperOut>> {
  membership::current_paper(&state, &ctx, q.limit)
    .await
    .map(Json)
    .ok_or_else(|| BankError::NotFound("no paper yet".into()))
}

pub async fn http_get_paper(State(state): AppStateRef, ctx: RequestContext, Path(id): Path<String>) -> BankResult<Json<PaperOut>> {
  membership::get_paper(&state, &ctx, &id).await.map(Json)
}

pub async fn http_add_exercise_to_paper(
  State(state): AppStateRef,
  ctx: RequestContext,
  Path((paper_id, exercise_id)): Path<(String, String)>,
) -> BankResult<StatusCode> {
  membership::add_exercise(&state, &ctx, &paper_id, &exercise_id).await?;
  Ok(StatusCode::NO_CONTENT)
}

pub async fn http_remove_exercise_from_paper(
  State(state): AppStateRef,
  ctx: RequestContext,
  Path((paper_id, exercise_id)): Path<(String, String)>,
) -> BankResult<StatusCode> {
  membership::remove_exercise(&state, &ctx, &paper_id, &exercise_id).await?;
  Ok(StatusCode::NO_CONTENT)
}
