//! Rule store: per-user selection rules kept in insertion order.

use chrono::Utc;
use tracing::{info, instrument};

use crate::domain::{parse_difficulty_selector, parse_kind_selector, Difficulty, ExerciseKind, RequestContext, Rule};
use crate::error::{BankError, BankResult};
use crate::events::Scope;
use crate::protocol::RuleIn;
use crate::state::AppState;
use crate::store::Tables;
use crate::util::new_id;

/// A rule input that passed validation but is not yet stored.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidRule {
  pub kind: Option<ExerciseKind>,
  pub difficulty: Option<Difficulty>,
  pub knowledge_point_id: Option<String>,
  pub amount: u32,
}

/// Shape checks only; never touches the store.
pub fn validate_rule(input: &RuleIn) -> BankResult<ValidRule> {
  let kind = parse_kind_selector(input.kind.as_deref())?;
  let difficulty = parse_difficulty_selector(input.difficulty.as_deref())?;
  let amount = u32::try_from(input.amount)
    .ok()
    .filter(|a| *a > 0)
    .ok_or_else(|| BankError::Validation(format!("amount must be a positive integer (got {})", input.amount)))?;
  let knowledge_point_id = match &input.knowledge_point_id {
    None => None,
    Some(id) if id.trim().is_empty() => {
      return Err(BankError::Validation("knowledge point id must not be empty".into()));
    }
    Some(id) => Some(id.trim().to_string()),
  };
  Ok(ValidRule { kind, difficulty, knowledge_point_id, amount })
}

fn check_reference(t: &Tables, rule: &ValidRule) -> BankResult<()> {
  if let Some(kp) = &rule.knowledge_point_id {
    t.knowledge_point(kp)?;
  }
  Ok(())
}

fn materialize(t: &mut Tables, owner_id: &str, rule: ValidRule) -> Rule {
  Rule {
    id: new_id(),
    owner_id: owner_id.to_string(),
    kind: rule.kind,
    difficulty: rule.difficulty,
    knowledge_point_id: rule.knowledge_point_id,
    amount: rule.amount,
    created_at: Utc::now(),
    seq: t.next_seq(),
  }
}

fn not_found(rule_id: &str) -> BankError {
  BankError::NotFound(format!("no rule with id '{}'", rule_id))
}

#[instrument(level = "info", skip(state, input), fields(user = %ctx.user_id))]
pub async fn create_rule(state: &AppState, ctx: &RequestContext, input: RuleIn) -> BankResult<Rule> {
  let valid = validate_rule(&input)?;

  let mut t = state.store.write().await;
  check_reference(&t, &valid)?;
  let rule = materialize(&mut t, &ctx.user_id, valid);
  t.rules.entry(ctx.user_id.clone()).or_default().push(rule.clone());
  t.commit().await?;
  drop(t);

  state.events.publish(Scope::Rules { owner_id: ctx.user_id.clone() });
  info!(target: "rules", id = %rule.id, amount = rule.amount, kp = ?rule.knowledge_point_id, "Rule created");
  Ok(rule)
}

/// Edit in place; the rule keeps its position in the set.
#[instrument(level = "info", skip(state, input), fields(user = %ctx.user_id))]
pub async fn update_rule(state: &AppState, ctx: &RequestContext, rule_id: &str, input: RuleIn) -> BankResult<Rule> {
  let valid = validate_rule(&input)?;

  let mut t = state.store.write().await;
  check_reference(&t, &valid)?;
  let rule = t
    .rules
    .get_mut(&ctx.user_id)
    .and_then(|rules| rules.iter_mut().find(|r| r.id == rule_id))
    .ok_or_else(|| not_found(rule_id))?;
  rule.kind = valid.kind;
  rule.difficulty = valid.difficulty;
  rule.knowledge_point_id = valid.knowledge_point_id;
  rule.amount = valid.amount;
  let rule = rule.clone();
  t.commit().await?;
  drop(t);

  state.events.publish(Scope::Rules { owner_id: ctx.user_id.clone() });
  Ok(rule)
}

#[instrument(level = "info", skip(state), fields(user = %ctx.user_id))]
pub async fn delete_rule(state: &AppState, ctx: &RequestContext, rule_id: &str) -> BankResult<()> {
  let mut t = state.store.write().await;
  let rules = t.rules.get_mut(&ctx.user_id).ok_or_else(|| not_found(rule_id))?;
  let before = rules.len();
  rules.retain(|r| r.id != rule_id);
  if rules.len() == before {
    return Err(not_found(rule_id));
  }
  t.commit().await?;
  drop(t);

  state.events.publish(Scope::Rules { owner_id: ctx.user_id.clone() });
  Ok(())
}

pub async fn list_rules(state: &AppState, ctx: &RequestContext) -> Vec<Rule> {
  let t = state.store.read().await;
  t.rules.get(&ctx.user_id).cloned().unwrap_or_default()
}

/// Swap the caller's whole rule set. All inputs are checked first; on any
/// failure the existing set is left untouched.
#[instrument(level = "info", skip(state, inputs), fields(user = %ctx.user_id, count = inputs.len()))]
pub async fn replace_rules(state: &AppState, ctx: &RequestContext, inputs: Vec<RuleIn>) -> BankResult<Vec<Rule>> {
  let valid: Vec<ValidRule> = inputs.iter().map(validate_rule).collect::<BankResult<_>>()?;

  let mut t = state.store.write().await;
  for v in &valid {
    check_reference(&t, v)?;
  }
  let rules: Vec<Rule> = valid.into_iter().map(|v| materialize(&mut t, &ctx.user_id, v)).collect();
  t.rules.insert(ctx.user_id.clone(), rules.clone());
  t.commit().await?;
  drop(t);

  state.events.publish(Scope::Rules { owner_id: ctx.user_id.clone() });
  info!(target: "rules", count = rules.len(), "Rule set replaced");
  Ok(rules)
}

pub async fn clear_rules(state: &AppState, ctx: &RequestContext) -> BankResult<()> {
  let mut t = state.store.write().await;
  if t.rules.remove(&ctx.user_id).is_none() {
    return Ok(());
  }
  t.commit().await?;
  drop(t);

  state.events.publish(Scope::Rules { owner_id: ctx.user_id.clone() });
  Ok(())
}
