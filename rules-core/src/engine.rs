//! The flat, priority-ordered firing engine.

use std::collections::HashSet;

use crate::condition::eval_compiled;
use crate::error::RuleError;
use crate::fact::Fact;
use crate::rule::{CompiledRule, Rule, RuleResult};

/// Evaluates a fixed rule set against facts in descending-priority order,
/// honoring status and mutex groups: once a rule in a group has matched,
/// the remaining rules sharing that group are skipped for the rest of the
/// call. Only matches are reported — a skipped, inactive, or
/// non-matching rule leaves no trace in the result list.
///
/// Rules whose condition fails to compile are dropped at construction time
/// (logged via `tracing`, never surfaced) rather than failing the whole
/// engine — one bad rule should not take down the rest of the rule set.
pub struct Engine {
    rules: Vec<CompiledRule>,
}

impl Engine {
    /// Build an engine from a rule set. Rules are stable-sorted by
    /// descending priority, preserving relative order for ties so that
    /// firing order is deterministic given identical input.
    pub fn new(rules: &[Rule]) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .iter()
            .filter_map(|rule| match CompiledRule::compile(rule) {
                Ok(c) => Some(c),
                Err(err) => {
                    tracing::warn!(rule_id = %rule.rule_id, error = %err, "dropping rule with malformed condition");
                    None
                }
            })
            .collect();
        compiled.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules: compiled }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate every compiled rule against `fact` in priority order,
    /// returning the ordered list of matches. The first error encountered
    /// (a loader failure or a var-reference miss) aborts the call and
    /// propagates; no partial result is returned.
    pub fn evaluate(&self, fact: &mut Fact) -> Result<Vec<RuleResult>, RuleError> {
        let mut results = Vec::new();
        let mut fired_groups: HashSet<&str> = HashSet::new();

        for rule in &self.rules {
            if !rule.active {
                continue;
            }
            if let Some(group) = rule.mutex_group.as_deref() {
                if fired_groups.contains(group) {
                    continue;
                }
            }

            if eval_compiled(&rule.expr, fact)? {
                tracing::debug!(rule_id = %rule.rule_id, "rule matched");
                if let Some(group) = rule.mutex_group.as_deref() {
                    fired_groups.insert(group);
                }
                results.push(RuleResult {
                    rule_id: rule.rule_id.clone(),
                    actions: rule.actions.clone(),
                });
            }
        }

        Ok(results)
    }
}
