//! Paper assembly: turn the caller's rule set into a concrete exercise list.
//!
//! Rules are processed in insertion order. Each rule takes the first `amount`
//! candidates in filter order; a candidate already selected (by an earlier
//! rule, or already on the paper when extending) is skipped, not replaced.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::domain::{Paper, RequestContext, Rule};
use crate::error::BankResult;
use crate::events::Scope;
use crate::filter::{select, ExerciseCriteria};
use crate::protocol::{AssembleIn, AssembleOut, AssemblyMode, ExerciseOut, PaperOut, RuleContribution};
use crate::state::AppState;
use crate::util::new_id;

impl ExerciseCriteria {
    pub fn for_rule(rule: &Rule) -> Self {
        Self {
            kind: rule.kind,
            difficulty: rule.difficulty,
            knowledge_point_id: rule.knowledge_point_id.clone(),
            keyword: None,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct Assembly {
    /// Newly selected ids, in rule order then filter order.
    pub exercise_ids: Vec<String>,
    pub contributions: Vec<RuleContribution>,
}

/// Pure selection core. `candidates_for` must return ids in filter order.
pub fn assemble_selection<F>(rules: &[Rule], mut candidates_for: F, already: &[String]) -> Assembly
where
    F: FnMut(&Rule) -> Vec<String>,
{
    let mut seen: HashSet<String> = already.iter().cloned().collect();
    let mut exercise_ids = Vec::new();
    let mut contributions = Vec::with_capacity(rules.len());

    for rule in rules {
        let candidates = candidates_for(rule);
        let matched = candidates.len();
        let mut taken = 0;
        let mut skipped_duplicates = 0;

        for id in candidates.into_iter().take(rule.amount as usize) {
            taken += 1;
            if seen.insert(id.clone()) {
                exercise_ids.push(id);
            } else {
                skipped_duplicates += 1;
            }
        }

        debug!(target: "paper", rule = %rule.id, requested = rule.amount, matched, taken, skipped_duplicates, "Rule evaluated");
        contributions.push(RuleContribution {
            rule_id: rule.id.clone(),
            requested: rule.amount,
            matched,
            taken,
            skipped_duplicates,
        });
    }

    Assembly { exercise_ids, contributions }
}

/// Assemble the caller's rules into a paper. Without `paper_id` a new paper
/// is created. An existing paper keeps its members unless `mode` is `Replace`.
#[instrument(level = "info", skip(state, input), fields(user = %ctx.user_id, paper = ?input.paper_id, mode = ?input.mode))]
pub async fn assemble(state: &AppState, ctx: &RequestContext, input: AssembleIn) -> BankResult<AssembleOut> {
    let mut t = state.store.write().await;

    let existing = match &input.paper_id {
        Some(pid) => {
            let paper = t.owned_paper_mut(&ctx.user_id, pid)?;
            match input.mode {
                AssemblyMode::Extend => paper.exercise_ids.clone(),
                AssemblyMode::Replace => Vec::new(),
            }
        }
        None => Vec::new(),
    };

    let rules = t.rules.get(&ctx.user_id).cloned().unwrap_or_default();
    let assembly = assemble_selection(
        &rules,
        |rule| select(&t, &ExerciseCriteria::for_rule(rule)).into_iter().map(|e| e.id.clone()).collect(),
        &existing,
    );

    let mut exercise_ids = existing;
    exercise_ids.extend(assembly.exercise_ids);
    let now = Utc::now();

    let paper = match &input.paper_id {
        Some(pid) => {
            let paper = t.owned_paper_mut(&ctx.user_id, pid)?;
            paper.exercise_ids = exercise_ids;
            paper.updated_at = now;
            paper.clone()
        }
        None => {
            let paper = Paper {
                id: new_id(),
                owner_id: ctx.user_id.clone(),
                exercise_ids,
                created_at: now,
                updated_at: now,
            };
            t.papers.insert(paper.id.clone(), paper.clone());
            paper
        }
    };
    t.commit().await?;

    let marks = t.bookmarks.get(&ctx.user_id);
    let out = PaperOut::build(
        &paper,
        |id| t.exercises.get(id).map(|e| ExerciseOut::from_exercise(e, marks.is_some_and(|m| m.contains(id)))),
        None,
    );
    drop(t);

    state.events.publish(Scope::Paper { paper_id: paper.id.clone() });
    info!(target: "paper", paper = %paper.id, rules = rules.len(), exercises = paper.exercise_ids.len(), "Paper assembled");
    Ok(AssembleOut { paper_id: paper.id.clone(), paper: out, contributions: assembly.contributions })
}
