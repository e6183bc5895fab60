//! Catalog CRUD: colleges, courses, knowledge points, exercises, bookmarks.
//!
//! Input is validated before the store is touched. Referential checks run
//! under the write lock. Deletes cascade downwards (see `store::Tables::purge_*`).

use chrono::Utc;
use tracing::{info, instrument};

use crate::domain::{
    College, Course, Difficulty, Exercise, ExerciseKind, ExerciseOption, KnowledgePoint, RequestContext,
};
use crate::error::{BankError, BankResult};
use crate::events::Scope;
use crate::protocol::{
    CollegeIn, CreateCourseIn, CreateExerciseIn, CreateKnowledgePointIn, ExerciseOut, NavItem,
    UpdateCourseIn, UpdateExerciseIn, UpdateKnowledgePointIn,
};
use crate::state::AppState;
use crate::util::{new_id, non_blank, require_non_empty, trunc_for_log};

//
// Colleges
//

pub async fn list_colleges(state: &AppState) -> Vec<College> {
    let t = state.store.read().await;
    let mut out: Vec<College> = t.colleges.values().cloned().collect();
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.slug.cmp(&b.slug)));
    out
}

pub async fn get_college_by_slug(state: &AppState, slug: &str) -> BankResult<College> {
    let t = state.store.read().await;
    t.college_by_slug(slug)
        .cloned()
        .ok_or_else(|| BankError::NotFound(format!("no college with slug '{}'", slug)))
}

pub async fn get_college(state: &AppState, college_id: &str) -> BankResult<College> {
    let t = state.store.read().await;
    t.colleges
        .get(college_id)
        .cloned()
        .ok_or_else(|| BankError::NotFound(format!("no college with id '{}'", college_id)))
}

#[instrument(level = "info", skip(state, input), fields(user = %ctx.user_id))]
pub async fn create_college(state: &AppState, ctx: &RequestContext, input: CollegeIn) -> BankResult<College> {
    ctx.require_admin()?;
    let name = require_non_empty(&input.name, "college name")?;
    let slug = require_non_empty(&input.slug, "college slug")?;

    let mut t = state.store.write().await;
    if t.college_by_slug(&slug).is_some() {
        return Err(BankError::Conflict(format!("a college with slug '{}' already exists", slug)));
    }
    let college = College { id: new_id(), name, slug, created_at: Utc::now() };
    t.colleges.insert(college.id.clone(), college.clone());
    t.commit().await?;
    drop(t);

    state.events.publish(Scope::Colleges);
    info!(target: "catalog", id = %college.id, slug = %college.slug, "College created");
    Ok(college)
}

#[instrument(level = "info", skip(state, input), fields(user = %ctx.user_id))]
pub async fn update_college(
    state: &AppState,
    ctx: &RequestContext,
    college_id: &str,
    input: CollegeIn,
) -> BankResult<College> {
    ctx.require_admin()?;
    let name = require_non_empty(&input.name, "college name")?;
    let slug = require_non_empty(&input.slug, "college slug")?;

    let mut t = state.store.write().await;
    if t.colleges.values().any(|c| c.slug == slug && c.id != college_id) {
        return Err(BankError::Conflict(format!("a college with slug '{}' already exists", slug)));
    }
    let college = t
        .colleges
        .get_mut(college_id)
        .ok_or_else(|| BankError::NotFound(format!("no college with id '{}'", college_id)))?;
    college.name = name;
    college.slug = slug;
    let college = college.clone();
    t.commit().await?;
    drop(t);

    state.events.publish(Scope::Colleges);
    Ok(college)
}

#[instrument(level = "info", skip(state), fields(user = %ctx.user_id))]
pub async fn delete_college(state: &AppState, ctx: &RequestContext, college_id: &str) -> BankResult<()> {
    ctx.require_admin()?;
    let mut t = state.store.write().await;
    if !t.colleges.contains_key(college_id) {
        return Err(BankError::NotFound(format!("no college with id '{}'", college_id)));
    }
    t.purge_college(college_id);
    t.commit().await?;
    drop(t);

    for scope in [Scope::Colleges, Scope::Courses, Scope::KnowledgePoints, Scope::Exercises] {
        state.events.publish(scope);
    }
    info!(target: "catalog", %college_id, "College deleted (cascade)");
    Ok(())
}

//
// Courses
//

pub async fn list_courses(state: &AppState, college_slug: &str) -> BankResult<Vec<Course>> {
    let t = state.store.read().await;
    let college = t
        .college_by_slug(college_slug)
        .ok_or_else(|| BankError::NotFound(format!("no college with slug '{}'", college_slug)))?;
    let mut out: Vec<Course> = t.courses.values().filter(|c| c.college_id == college.id).cloned().collect();
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
    Ok(out)
}

#[instrument(level = "info", skip(state, input), fields(user = %ctx.user_id))]
pub async fn create_course(state: &AppState, ctx: &RequestContext, input: CreateCourseIn) -> BankResult<Course> {
    let name = require_non_empty(&input.name, "course name")?;
    let slug = require_non_empty(&input.college_slug, "college slug")?;

    let mut t = state.store.write().await;
    let college_id = t
        .college_by_slug(&slug)
        .map(|c| c.id.clone())
        .ok_or_else(|| BankError::NotFound(format!("no college with slug '{}'", slug)))?;
    let course = Course { id: new_id(), college_id, name, created_at: Utc::now() };
    t.courses.insert(course.id.clone(), course.clone());
    t.commit().await?;
    drop(t);

    state.events.publish(Scope::Courses);
    info!(target: "catalog", id = %course.id, college = %slug, "Course created");
    Ok(course)
}

pub async fn update_course(
    state: &AppState,
    ctx: &RequestContext,
    course_id: &str,
    input: UpdateCourseIn,
) -> BankResult<Course> {
    let name = require_non_empty(&input.name, "course name")?;
    let mut t = state.store.write().await;
    let course = t
        .courses
        .get_mut(course_id)
        .ok_or_else(|| BankError::NotFound(format!("no course with id '{}'", course_id)))?;
    course.name = name;
    let course = course.clone();
    t.commit().await?;
    drop(t);

    state.events.publish(Scope::Courses);
    info!(target: "catalog", user = %ctx.user_id, id = %course.id, "Course renamed");
    Ok(course)
}

#[instrument(level = "info", skip(state), fields(user = %ctx.user_id))]
pub async fn delete_course(state: &AppState, ctx: &RequestContext, course_id: &str) -> BankResult<()> {
    ctx.require_admin()?;
    let mut t = state.store.write().await;
    t.course(course_id)?;
    t.purge_course(course_id);
    t.commit().await?;
    drop(t);

    for scope in [Scope::Courses, Scope::KnowledgePoints, Scope::Exercises] {
        state.events.publish(scope);
    }
    Ok(())
}

//
// Knowledge points
//

#[instrument(level = "info", skip(state, input), fields(user = %ctx.user_id))]
pub async fn create_knowledge_point(
    state: &AppState,
    ctx: &RequestContext,
    input: CreateKnowledgePointIn,
) -> BankResult<KnowledgePoint> {
    let name = require_non_empty(&input.name, "knowledge point name")?;
    let course_id = require_non_empty(&input.course_id, "course id")?;

    let mut t = state.store.write().await;
    t.course(&course_id)?;
    let kp = KnowledgePoint {
        id: new_id(),
        course_id,
        name,
        label: non_blank(input.label.as_deref()),
        created_at: Utc::now(),
    };
    t.knowledge_points.insert(kp.id.clone(), kp.clone());
    t.commit().await?;
    drop(t);

    state.events.publish(Scope::KnowledgePoints);
    info!(target: "catalog", id = %kp.id, name = %kp.name, "Knowledge point created");
    Ok(kp)
}

pub async fn update_knowledge_point(
    state: &AppState,
    ctx: &RequestContext,
    kp_id: &str,
    input: UpdateKnowledgePointIn,
) -> BankResult<KnowledgePoint> {
    let name = require_non_empty(&input.name, "knowledge point name")?;
    let mut t = state.store.write().await;
    let kp = t
        .knowledge_points
        .get_mut(kp_id)
        .ok_or_else(|| BankError::NotFound(format!("no knowledge point with id '{}'", kp_id)))?;
    kp.name = name;
    kp.label = non_blank(input.label.as_deref());
    let kp = kp.clone();
    t.commit().await?;
    drop(t);

    state.events.publish(Scope::KnowledgePoints);
    info!(target: "catalog", user = %ctx.user_id, id = %kp.id, "Knowledge point updated");
    Ok(kp)
}

pub async fn get_knowledge_point(state: &AppState, kp_id: &str) -> BankResult<KnowledgePoint> {
    let t = state.store.read().await;
    t.knowledge_point(kp_id).cloned()
}

pub async fn list_knowledge_points(state: &AppState, course_id: &str) -> BankResult<Vec<KnowledgePoint>> {
    let t = state.store.read().await;
    t.course(course_id)?;
    let mut out: Vec<KnowledgePoint> =
        t.knowledge_points.values().filter(|k| k.course_id == course_id).cloned().collect();
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
    Ok(out)
}

/// College → courses → knowledge points. Unknown slug gives an empty tree.
pub async fn sidebar_nav(state: &AppState, college_slug: &str) -> Vec<NavItem> {
    let t = state.store.read().await;
    let Some(college) = t.college_by_slug(college_slug) else {
        return Vec::new();
    };

    let mut courses: Vec<&Course> = t.courses.values().filter(|c| c.college_id == college.id).collect();
    courses.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));

    let items = courses
        .into_iter()
        .map(|course| {
            let mut kps: Vec<&KnowledgePoint> =
                t.knowledge_points.values().filter(|k| k.course_id == course.id).collect();
            kps.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
            NavItem {
                id: course.id.clone(),
                name: course.name.clone(),
                slug: None,
                label: None,
                items: kps
                    .into_iter()
                    .map(|k| NavItem {
                        id: k.id.clone(),
                        name: k.name.clone(),
                        slug: None,
                        label: k.label.clone(),
                        items: Vec::new(),
                    })
                    .collect(),
            }
        })
        .collect();

    vec![NavItem {
        id: college.id.clone(),
        name: college.name.clone(),
        slug: Some(college.slug.clone()),
        label: None,
        items,
    }]
}

//
// Exercises
//

fn build_options(kind: ExerciseKind, bodies: &[String]) -> BankResult<Vec<ExerciseOption>> {
    if kind != ExerciseKind::Choice {
        return Ok(Vec::new());
    }
    bodies
        .iter()
        .map(|b| -> BankResult<ExerciseOption> {
            Ok(ExerciseOption { id: new_id(), content: require_non_empty(b, "option content")? })
        })
        .collect()
}

#[instrument(level = "info", skip(state, input), fields(user = %ctx.user_id, question = %trunc_for_log(&input.question, 40)))]
pub async fn create_exercise(
    state: &AppState,
    ctx: &RequestContext,
    input: CreateExerciseIn,
) -> BankResult<Exercise> {
    let kind: ExerciseKind = input.kind.parse()?;
    let difficulty: Difficulty = input.difficulty.parse()?;
    let question = require_non_empty(&input.question, "question")?;
    let knowledge_point_id = require_non_empty(&input.knowledge_point_id, "knowledge point id")?;
    let options = build_options(kind, &input.options)?;

    let mut t = state.store.write().await;
    t.knowledge_point(&knowledge_point_id)?;
    let now = Utc::now();
    let exercise = Exercise {
        id: new_id(),
        kind,
        difficulty,
        question,
        answer: input.answer,
        analysis: non_blank(input.analysis.as_deref()),
        options,
        knowledge_point_id,
        author_id: ctx.user_id.clone(),
        created_at: now,
        updated_at: now,
        seq: t.next_seq(),
    };
    t.exercises.insert(exercise.id.clone(), exercise.clone());
    t.commit().await?;
    drop(t);

    state.events.publish(Scope::Exercises);
    info!(target: "catalog", id = %exercise.id, kind = exercise.kind.as_str(), difficulty = exercise.difficulty.as_str(), "Exercise created");
    Ok(exercise)
}

fn require_author_or_admin(ctx: &RequestContext, exercise: &Exercise) -> BankResult<()> {
    if ctx.is_admin() || exercise.author_id == ctx.user_id {
        Ok(())
    } else {
        Err(BankError::Forbidden("only the author or an administrator may change this exercise".into()))
    }
}

#[instrument(level = "info", skip(state, input), fields(user = %ctx.user_id))]
pub async fn update_exercise(
    state: &AppState,
    ctx: &RequestContext,
    exercise_id: &str,
    input: UpdateExerciseIn,
) -> BankResult<Exercise> {
    let kind: ExerciseKind = input.kind.parse()?;
    let difficulty: Difficulty = input.difficulty.parse()?;
    let question = require_non_empty(&input.question, "question")?;
    let new_options = match &input.options {
        Some(bodies) => Some(build_options(kind, bodies)?),
        None => None,
    };

    let mut t = state.store.write().await;
    let exercise = t
        .exercises
        .get_mut(exercise_id)
        .ok_or_else(|| BankError::NotFound(format!("no exercise with id '{}'", exercise_id)))?;
    require_author_or_admin(ctx, exercise)?;

    exercise.kind = kind;
    exercise.difficulty = difficulty;
    exercise.question = question;
    exercise.answer = input.answer;
    exercise.analysis = non_blank(input.analysis.as_deref());
    match new_options {
        Some(opts) => exercise.options = opts,
        None if kind != ExerciseKind::Choice => exercise.options.clear(),
        None => {}
    }
    exercise.updated_at = Utc::now();
    let exercise = exercise.clone();
    t.commit().await?;
    drop(t);

    state.events.publish(Scope::Exercises);
    Ok(exercise)
}

#[instrument(level = "info", skip(state), fields(user = %ctx.user_id))]
pub async fn delete_exercise(state: &AppState, ctx: &RequestContext, exercise_id: &str) -> BankResult<()> {
    let mut t = state.store.write().await;
    require_author_or_admin(ctx, t.exercise(exercise_id)?)?;
    let touched_papers: Vec<String> =
        t.papers.values().filter(|p| p.contains(exercise_id)).map(|p| p.id.clone()).collect();
    t.purge_exercise(exercise_id);
    t.commit().await?;
    drop(t);

    state.events.publish(Scope::Exercises);
    for paper_id in touched_papers {
        state.events.publish(Scope::Paper { paper_id });
    }
    info!(target: "catalog", %exercise_id, "Exercise deleted");
    Ok(())
}

pub async fn get_exercise(state: &AppState, ctx: &RequestContext, exercise_id: &str) -> BankResult<ExerciseOut> {
    let t = state.store.read().await;
    let e = t.exercise(exercise_id)?;
    let bookmarked = t.bookmarks.get(&ctx.user_id).is_some_and(|m| m.contains(exercise_id));
    Ok(ExerciseOut::from_exercise(e, bookmarked))
}

//
// Bookmarks
//

/// Flip the caller's bookmark on an exercise; returns the new state.
#[instrument(level = "info", skip(state), fields(user = %ctx.user_id))]
pub async fn toggle_bookmark(state: &AppState, ctx: &RequestContext, exercise_id: &str) -> BankResult<bool> {
    let mut t = state.store.write().await;
    t.exercise(exercise_id)?;
    let marks = t.bookmarks.entry(ctx.user_id.clone()).or_default();
    let bookmarked = if marks.remove(exercise_id) {
        false
    } else {
        marks.insert(exercise_id.to_string());
        true
    };
    t.commit().await?;
    drop(t);

    state.events.publish(Scope::Bookmarks { user_id: ctx.user_id.clone() });
    Ok(bookmarked)
}

/// Bookmarked exercises, most recently created first.
pub async fn list_bookmarks(state: &AppState, ctx: &RequestContext) -> Vec<ExerciseOut> {
    let t = state.store.read().await;
    let Some(marks) = t.bookmarks.get(&ctx.user_id) else {
        return Vec::new();
    };
    let mut list: Vec<&Exercise> = marks.iter().filter_map(|id| t.exercises.get(id)).collect();
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.seq.cmp(&a.seq)));
    list.into_iter().map(|e| ExerciseOut::from_exercise(e, true)).collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn admin() -> RequestContext {
        RequestContext::admin("admin-1")
    }

    /// One college ("sse"), one course, one knowledge point named `kp_name`.
    pub async fn knowledge_point(state: &AppState, kp_name: &str) -> KnowledgePoint {
        let ctx = admin();
        let college = match get_college_by_slug(state, "sse").await {
            Ok(c) => c,
            Err(_) => create_college(state, &ctx, CollegeIn { name: "软件学院".into(), slug: "sse".into() })
                .await
                .unwrap(),
        };
        let course = create_course(
            state,
            &ctx,
            CreateCourseIn { college_slug: college.slug.clone(), name: "编译原理".into() },
        )
        .await
        .unwrap();
        create_knowledge_point(
            state,
            &ctx,
            CreateKnowledgePointIn { course_id: course.id, name: kp_name.into(), label: None },
        )
        .await
        .unwrap()
    }

    pub async fn exercise(
        state: &AppState,
        kp_id: &str,
        kind: ExerciseKind,
        difficulty: Difficulty,
        question: &str,
    ) -> Exercise {
        create_exercise(
            state,
            &RequestContext::user("author-1"),
            CreateExerciseIn {
                kind: kind.as_str().into(),
                difficulty: difficulty.as_str().into(),
                question: question.into(),
                answer: format!("answer to {}", question),
                analysis: None,
                options: vec!["A".into(), "B".into()],
                knowledge_point_id: kp_id.into(),
            },
        )
        .await
        .unwrap()
    }
}
