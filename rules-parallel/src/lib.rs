//! Partition-and-merge parallel driver. Splits a rule set into
//! independently-evaluable groups (default: by `rule.type`, falling back to
//! `"default"` for an empty type) and runs one flat `Engine` per group on
//! its own thread via `rayon`.
//!
//! Firing order across groups is unspecified — callers that need a total
//! order must concatenate per-group results themselves. Mutex groups are
//! scoped per group too: a mutex group shared by rules in two different
//! partitions is not coordinated across them.

use std::collections::BTreeMap;

use rayon::prelude::*;

use rules_core::{Engine, Fact, Rule, RuleError, RuleResult};

fn default_group(rule: &Rule) -> String {
    if rule.rule_type.is_empty() {
        "default".to_string()
    } else {
        rule.rule_type.clone()
    }
}

/// One group's compiled engine, keyed by the value its rules shared.
struct Partition {
    key: String,
    engine: Engine,
}

/// A rule set split into independently-evaluable partitions, each backed
/// by its own flat `Engine`.
pub struct ParallelDriver {
    partitions: Vec<Partition>,
}

impl ParallelDriver {
    /// Group `rules` with the default grouping function (`rule.type`,
    /// `"default"` when empty).
    pub fn new(rules: &[Rule]) -> Self {
        Self::with_grouping(rules, default_group)
    }

    /// Group `rules` with a caller-supplied grouping function.
    pub fn with_grouping(rules: &[Rule], group_of: impl Fn(&Rule) -> String) -> Self {
        let mut grouped: BTreeMap<String, Vec<Rule>> = BTreeMap::new();
        for rule in rules {
            grouped.entry(group_of(rule)).or_default().push(rule.clone());
        }
        let partitions = grouped
            .into_iter()
            .map(|(key, group_rules)| Partition {
                engine: Engine::new(&group_rules),
                key,
            })
            .collect();
        Self { partitions }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn partition_keys(&self) -> Vec<&str> {
        self.partitions.iter().map(|p| p.key.as_str()).collect()
    }

    /// Evaluate every partition against its own clone of `fact` in
    /// parallel. Every partition runs to completion even if another one
    /// errors; the first error in partition-key order is what's returned.
    /// On success, results are concatenated in partition-key order —
    /// cross-group order is unspecified beyond that.
    pub fn evaluate(&self, fact: &Fact) -> Result<Vec<RuleResult>, RuleError> {
        let outcomes: Vec<Result<Vec<RuleResult>, RuleError>> = self
            .partitions
            .par_iter()
            .map(|partition| {
                let mut local = fact.clone();
                partition.engine.evaluate(&mut local)
            })
            .collect();

        let mut merged = Vec::new();
        let mut first_error = None;
        for (partition, outcome) in self.partitions.iter().zip(outcomes) {
            match outcome {
                Ok(mut results) => merged.append(&mut results),
                Err(err) => {
                    tracing::warn!(group = %partition.key, error = %err, "partition evaluation failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(merged),
        }
    }
}
