//! The condition tree model, its JSON encoding, the direct recursive
//! interpreter, and the ahead-of-time compiler.

use serde::{Deserialize, Serialize};

use rules_value::{apply, Operator, Value};

use crate::error::RuleError;
use crate::fact::Fact;

/// A node in the condition tree: either a combinator (`AND`/`OR`/`NOT`) with
/// children, or a leaf comparison (`field`, `operator`, `value`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Condition {
    pub operator: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Condition>,
}

/// If `value` is a single-key mapping `{"var": "<path>"}` with a non-empty
/// string path, it's a dynamic reference; anything else is a literal.
fn as_var_path(value: &Value) -> Option<&str> {
    let map = value.as_map()?;
    if map.len() != 1 {
        return None;
    }
    let path = map.get("var")?.as_str()?;
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

fn resolve_value(value: &Value, fact: &mut Fact) -> Result<Value, RuleError> {
    match as_var_path(value) {
        Some(path) => fact
            .get_path(path)?
            .ok_or_else(|| RuleError::VarNotFound(path.to_string())),
        None => Ok(value.clone()),
    }
}

/// Evaluate a single leaf comparison. Returns `false` (not an error) when
/// the left-hand field is absent from the fact.
fn eval_leaf(field: &str, operator: &str, value: &Value, fact: &mut Fact) -> Result<bool, RuleError> {
    let Some(left) = fact.get_path(field)? else {
        return Ok(false);
    };
    let right = resolve_value(value, fact)?;
    let op = Operator::parse(operator)
        .map_err(|e| RuleError::type_mismatch(field, e))?;
    apply(op, &left, &right).map_err(|e| RuleError::type_mismatch(field, e))
}

/// Direct recursive interpreter, used for diagnostics. Semantically
/// identical to `CompiledExpr` evaluation.
pub fn interpret(condition: &Condition, fact: &mut Fact) -> Result<bool, RuleError> {
    match condition.operator.to_ascii_uppercase().as_str() {
        "AND" => {
            if condition.children.is_empty() {
                return Err(RuleError::MalformedCondition("AND requires children".into()));
            }
            for child in &condition.children {
                if !interpret(child, fact)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "OR" => {
            if condition.children.is_empty() {
                return Err(RuleError::MalformedCondition("OR requires children".into()));
            }
            for child in &condition.children {
                if interpret(child, fact)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        "NOT" => {
            if condition.children.len() != 1 {
                return Err(RuleError::MalformedCondition(
                    "NOT requires exactly one child".into(),
                ));
            }
            Ok(!interpret(&condition.children[0], fact)?)
        }
        _ => {
            if condition.field.is_empty() {
                return Err(RuleError::MalformedCondition(
                    "leaf condition requires field".into(),
                ));
            }
            eval_leaf(&condition.field, &condition.operator, &condition.value, fact)
        }
    }
}

/// A condition tree compiled ahead of time into a value-free expression
/// tree. Chosen over a boxed-closure representation so the RETE builder
/// can walk the same shape when deciding alpha-node de-duplication.
#[derive(Clone, Debug)]
pub enum CompiledExpr {
    And(Vec<CompiledExpr>),
    Or(Vec<CompiledExpr>),
    Not(Box<CompiledExpr>),
    Leaf(LeafExpr),
}

#[derive(Clone, Debug)]
pub struct LeafExpr {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl LeafExpr {
    pub fn eval(&self, fact: &mut Fact) -> Result<bool, RuleError> {
        let Some(left) = fact.get_path(&self.field)? else {
            return Ok(false);
        };
        let right = resolve_value(&self.value, fact)?;
        apply(self.operator, &left, &right).map_err(|e| RuleError::type_mismatch(&self.field, e))
    }
}

/// Compile a condition tree. A malformed node (empty AND/OR, wrong NOT
/// arity, fieldless leaf, unknown operator) returns an error; callers that
/// build rules from this drop the offending rule silently.
pub fn compile(condition: &Condition) -> Result<CompiledExpr, RuleError> {
    match condition.operator.to_ascii_uppercase().as_str() {
        "AND" => {
            if condition.children.is_empty() {
                return Err(RuleError::MalformedCondition("AND requires children".into()));
            }
            let children = condition
                .children
                .iter()
                .map(compile)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(CompiledExpr::And(children))
        }
        "OR" => {
            if condition.children.is_empty() {
                return Err(RuleError::MalformedCondition("OR requires children".into()));
            }
            let children = condition
                .children
                .iter()
                .map(compile)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(CompiledExpr::Or(children))
        }
        "NOT" => {
            if condition.children.len() != 1 {
                return Err(RuleError::MalformedCondition(
                    "NOT requires exactly one child".into(),
                ));
            }
            Ok(CompiledExpr::Not(Box::new(compile(&condition.children[0])?)))
        }
        other => {
            if condition.field.is_empty() {
                return Err(RuleError::MalformedCondition(
                    "leaf condition requires field".into(),
                ));
            }
            let operator = Operator::parse(other)
                .map_err(|e| RuleError::MalformedCondition(e.to_string()))?;
            Ok(CompiledExpr::Leaf(LeafExpr {
                field: condition.field.clone(),
                operator,
                value: condition.value.clone(),
            }))
        }
    }
}

/// Evaluate a compiled expression tree against a fact. Short-circuits
/// AND/OR left-to-right; propagates the first error.
pub fn eval_compiled(expr: &CompiledExpr, fact: &mut Fact) -> Result<bool, RuleError> {
    match expr {
        CompiledExpr::And(children) => {
            for child in children {
                if !eval_compiled(child, fact)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        CompiledExpr::Or(children) => {
            for child in children {
                if eval_compiled(child, fact)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        CompiledExpr::Not(child) => Ok(!eval_compiled(child, fact)?),
        CompiledExpr::Leaf(leaf) => leaf.eval(fact),
    }
}
