//! A single-threaded RETE session: owns fact storage, per-node token
//! memories, and the agenda.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use rules_core::{Fact, RuleError, RuleResult};

use crate::network::{BetaOp, ReteNetwork, Side, Target};

type FactId = u64;

/// Runtime state layered over a shared, immutable `ReteNetwork`. Not
/// `Send`/`Sync` by design — one session per thread, no locking inside a
/// session.
pub struct Session {
    network: Arc<ReteNetwork>,
    facts: HashMap<FactId, Fact>,
    next_id: FactId,
    alpha_memory: Vec<HashSet<FactId>>,
    beta_left: Vec<HashSet<FactId>>,
    beta_right: Vec<HashSet<FactId>>,
    beta_result: Vec<HashSet<FactId>>,
    not_memory: Vec<HashSet<FactId>>,
    agenda: HashMap<String, HashSet<FactId>>,
}

enum Event {
    Insert(FactId),
    Retract(FactId),
}

impl Session {
    pub fn new(network: Arc<ReteNetwork>) -> Self {
        let alpha_memory = vec![HashSet::new(); network.alphas.len()];
        let beta_count = network.betas.len();
        let not_count = network.nots.len();
        Self {
            beta_left: vec![HashSet::new(); beta_count],
            beta_right: vec![HashSet::new(); beta_count],
            beta_result: vec![HashSet::new(); beta_count],
            not_memory: vec![HashSet::new(); not_count],
            alpha_memory,
            agenda: HashMap::new(),
            facts: HashMap::new(),
            next_id: 0,
            network,
        }
    }

    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    /// Insert a new fact, assigning it the next (never-reused) fact-id.
    pub fn insert_fact(&mut self, fact: Fact) -> Result<FactId, RuleError> {
        let id = self.next_id;
        self.next_id += 1;
        self.facts.insert(id, fact);
        self.propagate_insert(id)?;
        Ok(id)
    }

    /// Retract then insert, preserving the fact-id.
    pub fn update_fact(&mut self, id: FactId, fact: Fact) -> Result<(), RuleError> {
        self.remove_fact(id);
        self.facts.insert(id, fact);
        self.propagate_insert(id)
    }

    /// Broadcast retract to all not-nodes and all alpha nodes (in that
    /// order), removing the fact entry itself before the broadcast drains
    /// so a NOT node can't mistake teardown for a fact that's merely
    /// losing one input, then clear all agenda entries referencing it. A
    /// no-op for an unknown id.
    pub fn remove_fact(&mut self, id: FactId) {
        if !self.facts.contains_key(&id) {
            return;
        }
        let mut queue: VecDeque<(Target, Event)> = VecDeque::new();

        for (i, not_spec) in self.network.nots.iter().enumerate() {
            if self.not_memory[i].remove(&id) {
                for succ in &not_spec.successors {
                    queue.push_back((succ.clone(), Event::Retract(id)));
                }
            }
        }
        for (i, alpha) in self.network.alphas.iter().enumerate() {
            if self.alpha_memory[i].remove(&id) {
                for succ in &alpha.successors {
                    queue.push_back((succ.clone(), Event::Retract(id)));
                }
            }
        }

        // Drop the fact entry before draining: the NOT retract arm treats
        // a fact still present in `self.facts` as newly re-activatable,
        // which would re-insert this id into `not_memory` mid-teardown.
        self.facts.remove(&id);
        self.drain(queue, None);

        for entries in self.agenda.values_mut() {
            entries.remove(&id);
        }
    }

    fn propagate_insert(&mut self, id: FactId) -> Result<(), RuleError> {
        let mut queue: VecDeque<(Target, Event)> = VecDeque::new();

        for (i, alpha) in self.network.alphas.iter().enumerate() {
            let matched = {
                let fact = self
                    .facts
                    .get_mut(&id)
                    .expect("fact just inserted into the session");
                alpha.leaf.eval(fact)?
            };
            if matched {
                self.alpha_memory[i].insert(id);
                for succ in &alpha.successors {
                    queue.push_back((succ.clone(), Event::Insert(id)));
                }
            }
        }

        // Not-nodes whose child asserts true for this fact during this
        // drain are recorded here so the fallback pass below does not also
        // default them to "child never asserted it".
        let mut asserted_true: HashSet<usize> = HashSet::new();
        self.drain(queue, Some(&mut asserted_true));

        // A not-node whose child never touched this fact at all (neither
        // asserted true nor was otherwise recorded) defaults to "true" —
        // the negated condition holds for a freshly seen fact.
        let mut queue: VecDeque<(Target, Event)> = VecDeque::new();
        for (i, not_spec) in self.network.nots.iter().enumerate() {
            if asserted_true.contains(&i) {
                continue;
            }
            if !self.not_memory[i].contains(&id) {
                self.not_memory[i].insert(id);
                for succ in &not_spec.successors {
                    queue.push_back((succ.clone(), Event::Insert(id)));
                }
            }
        }
        self.drain(queue, None);

        Ok(())
    }

    fn drain(&mut self, mut queue: VecDeque<(Target, Event)>, mut asserted_true: Option<&mut HashSet<usize>>) {
        while let Some((target, event)) = queue.pop_front() {
            match target {
                Target::Terminal(i) => {
                    let rule_id = self.network.terminals[i].rule_id.clone();
                    let entries = self.agenda.entry(rule_id).or_default();
                    match event {
                        Event::Insert(id) => {
                            entries.insert(id);
                        }
                        Event::Retract(id) => {
                            entries.remove(&id);
                        }
                    }
                }
                Target::Not(i) => {
                    let id = match event {
                        Event::Insert(id) | Event::Retract(id) => id,
                    };
                    let becomes_true = matches!(event, Event::Insert(_));
                    if becomes_true {
                        if let Some(touched) = asserted_true.as_deref_mut() {
                            touched.insert(i);
                        }
                        // Child just became true: the negation flips false.
                        if self.not_memory[i].remove(&id) {
                            for succ in self.network.nots[i].successors.clone() {
                                queue.push_back((succ, Event::Retract(id)));
                            }
                        }
                    } else if self.facts.contains_key(&id) && self.not_memory[i].insert(id) {
                        for succ in self.network.nots[i].successors.clone() {
                            queue.push_back((succ, Event::Insert(id)));
                        }
                    }
                }
                Target::Beta(i, side) => {
                    let id = match event {
                        Event::Insert(id) | Event::Retract(id) => id,
                    };
                    let is_insert = matches!(event, Event::Insert(_));
                    let was_in_result = self.beta_result[i].contains(&id);

                    match side {
                        Side::Left => {
                            if is_insert {
                                self.beta_left[i].insert(id);
                            } else {
                                self.beta_left[i].remove(&id);
                            }
                        }
                        Side::Right => {
                            if is_insert {
                                self.beta_right[i].insert(id);
                            } else {
                                self.beta_right[i].remove(&id);
                            }
                        }
                    }

                    let now_in_output = match self.network.betas[i].op {
                        BetaOp::And => {
                            self.beta_left[i].contains(&id) && self.beta_right[i].contains(&id)
                        }
                        BetaOp::Or => {
                            self.beta_left[i].contains(&id) || self.beta_right[i].contains(&id)
                        }
                    };

                    if now_in_output && !was_in_result {
                        self.beta_result[i].insert(id);
                        for succ in self.network.betas[i].successors.clone() {
                            queue.push_back((succ, Event::Insert(id)));
                        }
                    } else if !now_in_output && was_in_result {
                        self.beta_result[i].remove(&id);
                        for succ in self.network.betas[i].successors.clone() {
                            queue.push_back((succ, Event::Retract(id)));
                        }
                    }
                }
            }
        }
    }

    /// Walks the rule list in original priority order, skipping rules
    /// absent from the agenda for this fact-id, and applying mutex-group
    /// suppression exactly as the flat engine does.
    pub fn results_for_fact(&self, id: FactId) -> Vec<RuleResult> {
        let mut results = Vec::new();
        let mut fired_groups: HashSet<&str> = HashSet::new();

        for rule in &self.network.rules {
            if let Some(group) = rule.mutex_group.as_deref() {
                if fired_groups.contains(group) {
                    continue;
                }
            }
            let matched = self
                .agenda
                .get(&rule.rule_id)
                .is_some_and(|set| set.contains(&id));
            if matched {
                if let Some(group) = rule.mutex_group.as_deref() {
                    fired_groups.insert(group);
                }
                results.push(RuleResult {
                    rule_id: rule.rule_id.clone(),
                    actions: rule.actions.clone(),
                });
            }
        }
        results
    }

    /// Total agenda entries across all rules.
    pub fn agenda_len(&self) -> usize {
        self.agenda.values().map(HashSet::len).sum()
    }

    pub fn alpha_memory_len(&self, idx: usize) -> usize {
        self.alpha_memory[idx].len()
    }

    /// Total tokens held across every node memory (alpha, beta left/right/
    /// result, not). Used to check that a retracted fact-id leaves no
    /// trace anywhere in the network, not just the agenda.
    pub fn total_node_memory_len(&self) -> usize {
        self.alpha_memory.iter().map(HashSet::len).sum::<usize>()
            + self.beta_left.iter().map(HashSet::len).sum::<usize>()
            + self.beta_right.iter().map(HashSet::len).sum::<usize>()
            + self.beta_result.iter().map(HashSet::len).sum::<usize>()
            + self.not_memory.iter().map(HashSet::len).sum::<usize>()
    }
}
