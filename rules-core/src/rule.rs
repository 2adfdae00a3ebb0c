//! Rule definitions, their JSON encoding, and parsing helpers.

use serde::{Deserialize, Serialize};

use rules_value::Value;

use crate::condition::{compile, CompiledExpr, Condition};
use crate::error::RuleError;

/// An action attached to a rule. `params` is opaque to the engine: it is
/// handed to whatever downstream executor runs the action, unevaluated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub params: Value,
}

/// A named, prioritized, optionally mutex-grouped rule. Immutable once
/// registered; the engine never mutates a `Rule`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    #[serde(default)]
    pub rule_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub rule_type: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mutex_group: String,
    /// Non-empty values other than `"active"` (case-insensitive) are
    /// inactive; an empty status is treated as active.
    #[serde(default)]
    pub status: String,
    pub condition: Condition,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn is_active(&self) -> bool {
        self.status.is_empty() || self.status.eq_ignore_ascii_case("active")
    }

    pub fn mutex_group(&self) -> Option<&str> {
        if self.mutex_group.is_empty() {
            None
        } else {
            Some(&self.mutex_group)
        }
    }
}

/// A rule that has passed condition compilation, carrying its
/// `CompiledExpr` alongside the metadata needed for firing-order,
/// activity, and mutex-group bookkeeping.
#[derive(Clone, Debug)]
pub struct CompiledRule {
    pub rule_id: String,
    pub priority: i64,
    pub active: bool,
    pub mutex_group: Option<String>,
    pub actions: Vec<Action>,
    pub expr: CompiledExpr,
}

impl CompiledRule {
    pub fn compile(rule: &Rule) -> Result<Self, RuleError> {
        Ok(CompiledRule {
            rule_id: rule.rule_id.clone(),
            priority: rule.priority,
            active: rule.is_active(),
            mutex_group: rule.mutex_group().map(str::to_string),
            actions: rule.actions.clone(),
            expr: compile(&rule.condition)?,
        })
    }
}

/// One firing: a matched rule's id paired with its actions, in firing
/// order. The engine never reports skipped, inactive, or non-matching
/// rules — only matches.
#[derive(Clone, Debug, PartialEq)]
pub struct RuleResult {
    pub rule_id: String,
    pub actions: Vec<Action>,
}

/// Parse a single rule from JSON text.
pub fn parse_rule_json(json: &str) -> Result<Rule, RuleError> {
    serde_json::from_str(json).map_err(|e| RuleError::MalformedCondition(e.to_string()))
}

/// Parse a JSON array of rules. A malformed batch raises a parse error and
/// no rule is produced; this never silently drops individual
/// rules — that happens only at compile time, once each `Rule` already
/// exists.
pub fn parse_rules_json(json: &str) -> Result<Vec<Rule>, RuleError> {
    serde_json::from_str(json).map_err(|e| RuleError::MalformedCondition(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rule_with_nested_condition_and_actions() {
        let json = r#"{
            "rule_id": "RULE_PRICE_1",
            "rule_name": "diamond pricing",
            "type": "pricing",
            "priority": 10,
            "mutex_group": "pricing",
            "condition": {
                "operator": "AND",
                "children": [
                    {"operator": "gte", "field": "cart.total_amount", "value": 100},
                    {"operator": "eq", "field": "user.tier", "value": "gold"}
                ]
            },
            "actions": [
                {"type": "apply_discount", "params": {"percent": 10}}
            ]
        }"#;
        let rule = parse_rule_json(json).unwrap();
        assert_eq!(rule.rule_id, "RULE_PRICE_1");
        assert_eq!(rule.priority, 10);
        assert_eq!(rule.mutex_group(), Some("pricing"));
        assert_eq!(rule.actions.len(), 1);
        assert_eq!(rule.actions[0].action_type, "apply_discount");
        assert!(rule.is_active());
        CompiledRule::compile(&rule).unwrap();
    }

    #[test]
    fn defaults_priority_status_and_mutex_group_when_absent() {
        let json = r#"{
            "rule_id": "RULE_SIMPLE",
            "condition": {"operator": "eq", "field": "x", "value": 1}
        }"#;
        let rule = parse_rule_json(json).unwrap();
        assert_eq!(rule.priority, 0);
        assert_eq!(rule.mutex_group(), None);
        assert!(rule.actions.is_empty());
        assert!(rule.is_active());
    }

    #[test]
    fn status_is_case_insensitive_and_anything_else_is_inactive() {
        let mut rule = parse_rule_json(
            r#"{"rule_id": "A", "status": "ACTIVE", "condition": {"operator": "eq", "field": "x", "value": 1}}"#,
        )
        .unwrap();
        assert!(rule.is_active());
        rule.status = "disabled".to_string();
        assert!(!rule.is_active());
    }

    #[test]
    fn malformed_condition_fails_compilation_but_not_parsing() {
        let json = r#"{
            "rule_id": "RULE_BAD",
            "condition": {"operator": "AND", "children": []}
        }"#;
        let rule = parse_rule_json(json).unwrap();
        assert!(CompiledRule::compile(&rule).is_err());
    }

    #[test]
    fn parses_batch_of_rules() {
        let json = r#"[
            {"rule_id": "A", "condition": {"operator": "eq", "field": "x", "value": 1}},
            {"rule_id": "B", "condition": {"operator": "eq", "field": "y", "value": 2}}
        ]"#;
        let rules = parse_rules_json(json).unwrap();
        assert_eq!(rules.len(), 2);
    }
}
