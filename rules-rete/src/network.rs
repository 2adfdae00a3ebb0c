//! Builds a shared discrimination network from a compiled rule set. The
//! network topology is immutable once built and safe to share across
//! sessions (each session owns its own node memories).

use std::collections::HashMap;

use rules_core::condition::{CompiledExpr, LeafExpr};
use rules_core::rule::CompiledRule;
use rules_core::Rule;

/// Which input side of a beta join an edge feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// A directed edge from a producer node to a consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Beta(usize, Side),
    Not(usize),
    Terminal(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BetaOp {
    And,
    Or,
}

pub struct AlphaSpec {
    pub leaf: LeafExpr,
    pub successors: Vec<Target>,
}

pub struct BetaSpec {
    pub op: BetaOp,
    pub successors: Vec<Target>,
}

pub struct NotSpec {
    pub successors: Vec<Target>,
}

pub struct TerminalSpec {
    pub rule_id: String,
}

/// A producer node's identity, used while wiring up successor edges
/// during the build; not retained afterward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NodeRef {
    Alpha(usize),
    Beta(usize),
    Not(usize),
}

/// The built, immutable graph: alpha nodes deduplicated by
/// `(field, operator, canonical value)`, beta join nodes, not-nodes, and
/// one terminal per surviving rule.
pub struct ReteNetwork {
    pub alphas: Vec<AlphaSpec>,
    pub betas: Vec<BetaSpec>,
    pub nots: Vec<NotSpec>,
    pub terminals: Vec<TerminalSpec>,
    /// Rules sorted by descending priority, same ordering discipline as
    /// the flat engine; used by `ResultsForFact` to apply mutex-group
    /// suppression in firing order.
    pub rules: Vec<CompiledRule>,
}

struct Builder {
    alphas: Vec<AlphaSpec>,
    betas: Vec<BetaSpec>,
    nots: Vec<NotSpec>,
    alpha_index: HashMap<String, usize>,
}

impl Builder {
    fn new() -> Self {
        Self {
            alphas: Vec::new(),
            betas: Vec::new(),
            nots: Vec::new(),
            alpha_index: HashMap::new(),
        }
    }

    fn add_successor(&mut self, node: NodeRef, target: Target) {
        match node {
            NodeRef::Alpha(i) => self.alphas[i].successors.push(target),
            NodeRef::Beta(i) => self.betas[i].successors.push(target),
            NodeRef::Not(i) => self.nots[i].successors.push(target),
        }
    }

    fn alpha_key(leaf: &LeafExpr) -> String {
        let canonical = serde_json::to_string(&leaf.value).unwrap_or_default();
        format!("{}|{}|{}", leaf.field, leaf.operator.as_str(), canonical)
    }

    fn get_or_create_alpha(&mut self, leaf: &LeafExpr) -> usize {
        let key = Self::alpha_key(leaf);
        if let Some(&idx) = self.alpha_index.get(&key) {
            return idx;
        }
        let idx = self.alphas.len();
        self.alphas.push(AlphaSpec {
            leaf: leaf.clone(),
            successors: Vec::new(),
        });
        self.alpha_index.insert(key, idx);
        idx
    }

    fn build_expr(&mut self, expr: &CompiledExpr) -> NodeRef {
        match expr {
            CompiledExpr::Leaf(leaf) => NodeRef::Alpha(self.get_or_create_alpha(leaf)),
            CompiledExpr::And(children) => self.build_join(BetaOp::And, children),
            CompiledExpr::Or(children) => self.build_join(BetaOp::Or, children),
            CompiledExpr::Not(child) => {
                let child_ref = self.build_expr(child);
                let idx = self.nots.len();
                self.nots.push(NotSpec { successors: Vec::new() });
                self.add_successor(child_ref, Target::Not(idx));
                NodeRef::Not(idx)
            }
        }
    }

    /// N children reduce left-to-right into N-1 beta nodes of the same
    /// operator, chaining the previous beta's output as the next join's
    /// left input.
    fn build_join(&mut self, op: BetaOp, children: &[CompiledExpr]) -> NodeRef {
        let mut left = self.build_expr(&children[0]);
        for child in &children[1..] {
            let right = self.build_expr(child);
            let idx = self.betas.len();
            self.betas.push(BetaSpec {
                op,
                successors: Vec::new(),
            });
            self.add_successor(left, Target::Beta(idx, Side::Left));
            self.add_successor(right, Target::Beta(idx, Side::Right));
            left = NodeRef::Beta(idx);
        }
        left
    }
}

impl ReteNetwork {
    /// Build a network from a rule set. Rules that fail to compile, or
    /// are inactive, never enter the network — consistent with the flat
    /// engine's silent-drop policy.
    pub fn build(rules: &[Rule]) -> Self {
        let mut builder = Builder::new();
        let mut terminals = Vec::new();
        let mut compiled_rules = Vec::new();

        for rule in rules {
            if !rule.is_active() {
                continue;
            }
            match CompiledRule::compile(rule) {
                Ok(compiled) => {
                    let output = builder.build_expr(&compiled.expr);
                    let terminal_idx = terminals.len();
                    terminals.push(TerminalSpec {
                        rule_id: compiled.rule_id.clone(),
                    });
                    builder.add_successor(output, Target::Terminal(terminal_idx));
                    compiled_rules.push(compiled);
                }
                Err(err) => {
                    tracing::warn!(rule_id = %rule.rule_id, error = %err, "dropping rule with malformed condition");
                }
            }
        }

        compiled_rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        Self {
            alphas: builder.alphas,
            betas: builder.betas,
            nots: builder.nots,
            terminals,
            rules: compiled_rules,
        }
    }
}

