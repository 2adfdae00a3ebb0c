//! A thread-safe, hot-swappable rule registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::engine::Engine;
use crate::rule::Rule;

/// Holds the current rule set behind a `parking_lot::RwLock` so readers
/// (concurrent `evaluate` calls) never block each other, and a registry
/// update only blocks while it swaps in a freshly compiled `Engine`.
///
/// Compilation of the new rule set happens before the lock is taken, so a
/// reload never holds writers up for longer than a pointer swap.
pub struct RuleRegistry {
    rules: RwLock<HashMap<String, Rule>>,
    engine: RwLock<Arc<Engine>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            engine: RwLock::new(Arc::new(Engine::new(&[]))),
        }
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        let registry = Self::new();
        registry.replace(rules);
        registry
    }

    /// Insert or update a single rule, then recompile the engine.
    pub fn upsert(&self, rule: Rule) {
        let mut rules = self.rules.write();
        rules.insert(rule.rule_id.clone(), rule);
        self.rebuild(&rules);
    }

    /// Remove a rule by id, then recompile the engine. No-op if absent.
    pub fn remove(&self, rule_id: &str) {
        let mut rules = self.rules.write();
        rules.remove(rule_id);
        self.rebuild(&rules);
    }

    /// Replace the entire rule set atomically.
    pub fn replace(&self, rules: Vec<Rule>) {
        let mut guard = self.rules.write();
        *guard = rules.into_iter().map(|r| (r.rule_id.clone(), r)).collect();
        self.rebuild(&guard);
    }

    fn rebuild(&self, rules: &HashMap<String, Rule>) {
        let snapshot: Vec<Rule> = rules.values().cloned().collect();
        let new_engine = Arc::new(Engine::new(&snapshot));
        *self.engine.write() = new_engine;
    }

    /// Borrow a snapshot of the currently active engine. The returned
    /// `Arc` remains valid for evaluation even if a concurrent writer
    /// swaps in a newer engine immediately after this call returns.
    pub fn current(&self) -> Arc<Engine> {
        self.engine.read().clone()
    }

    pub fn rule_ids(&self) -> Vec<String> {
        self.rules.read().keys().cloned().collect()
    }

    /// An unordered snapshot of every registered rule (`GetAll`).
    /// Callers that need a stable order must sort the result themselves;
    /// the returned `Vec` is an independent copy they may reorder freely.
    pub fn get_all(&self) -> Vec<Rule> {
        self.rules.read().values().cloned().collect()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
