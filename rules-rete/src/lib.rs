//! Incremental RETE-style discrimination network: a shared, immutable
//! `ReteNetwork` built once from a rule set, paired with per-session
//! mutable memories.

pub mod network;
pub mod session;

pub use network::{AlphaSpec, BetaOp, BetaSpec, NotSpec, ReteNetwork, Side, Target, TerminalSpec};
pub use session::Session;

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use rules_core::{Action, Condition, Engine, Fact, Rule};
    use rules_value::Value;

    use super::*;

    fn leaf(field: &str, operator: &str, value: Value) -> Condition {
        Condition {
            operator: operator.to_string(),
            field: field.to_string(),
            value,
            children: vec![],
        }
    }

    fn combinator(operator: &str, children: Vec<Condition>) -> Condition {
        Condition {
            operator: operator.to_string(),
            field: String::new(),
            value: Value::Null,
            children,
        }
    }

    fn rule(id: &str, priority: i64, mutex_group: &str, condition: Condition) -> Rule {
        Rule {
            rule_id: id.to_string(),
            rule_name: String::new(),
            description: String::new(),
            rule_type: String::new(),
            priority,
            mutex_group: mutex_group.to_string(),
            status: String::new(),
            condition,
            actions: vec![Action {
                action_type: "noop".to_string(),
                params: Value::Null,
            }],
        }
    }

    fn map_value(pairs: Vec<(&str, Value)>) -> Value {
        let mut m = BTreeMap::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v);
        }
        Value::Map(m)
    }

    fn ids(results: &[rules_core::RuleResult]) -> Vec<String> {
        results.iter().map(|r| r.rule_id.clone()).collect()
    }

    fn targeting_rules() -> Vec<Rule> {
        vec![
            rule(
                "RULE_1024",
                100,
                "new_user_promo",
                combinator(
                    "AND",
                    vec![
                        leaf("user.register_days", "lte", Value::Int(7)),
                        leaf("cart.total_amount", "gte", Value::Int(300)),
                    ],
                ),
            ),
            rule(
                "RULE_2048",
                90,
                "new_user_promo",
                leaf("cart.total_amount", "gte", Value::Int(120)),
            ),
            rule("RULE_VAR", 80, "", leaf("cart.total_amount", "gte", Value::Int(150))),
        ]
    }

    /// Property 1: the RETE network agrees with the flat engine on the
    /// same rule set and fact.
    #[test]
    fn rete_agrees_with_flat_engine() {
        let rules = targeting_rules();
        let engine = Engine::new(&rules);
        let network = Arc::new(ReteNetwork::build(&rules));
        let mut session = Session::new(network);

        let fact = Fact::new(Some(map_value(vec![
            ("user", map_value(vec![("register_days", Value::Int(5))])),
            ("cart", map_value(vec![("total_amount", Value::Int(320))])),
        ])));

        let mut flat_fact = fact.clone();
        let flat_results = engine.evaluate(&mut flat_fact).unwrap();

        let id = session.insert_fact(fact).unwrap();
        let rete_results = session.results_for_fact(id);

        assert_eq!(ids(&flat_results), ids(&rete_results));
        assert_eq!(
            ids(&rete_results),
            vec!["RULE_1024".to_string(), "RULE_VAR".to_string()]
        );
    }

    /// Property 6: inserting then removing a fact leaves every memory and
    /// the agenda empty of that fact-id.
    #[test]
    fn retract_is_idempotent_and_clears_all_memories() {
        let rules = targeting_rules();
        let network = Arc::new(ReteNetwork::build(&rules));
        let mut session = Session::new(network);

        let fact = Fact::new(Some(map_value(vec![(
            "cart",
            map_value(vec![("total_amount", Value::Int(320))]),
        )])));
        let id = session.insert_fact(fact).unwrap();
        assert!(session.agenda_len() > 0);
        assert!(session.total_node_memory_len() > 0);

        session.remove_fact(id);
        assert_eq!(session.agenda_len(), 0);
        assert_eq!(session.fact_count(), 0);
        assert_eq!(session.total_node_memory_len(), 0);
        // Retracting an already-absent id is a harmless no-op.
        session.remove_fact(id);
        assert_eq!(session.agenda_len(), 0);
        assert_eq!(session.total_node_memory_len(), 0);
    }

    /// Property 7: update (retract-then-insert under the same id) leaves
    /// the session in the same agenda state as a fresh insert of the same
    /// fact would.
    #[test]
    fn update_replays_to_the_same_state_as_a_fresh_insert() {
        let rules = targeting_rules();
        let network = Arc::new(ReteNetwork::build(&rules));

        let mut updated_session = Session::new(Arc::clone(&network));
        let initial = Fact::new(Some(map_value(vec![(
            "cart",
            map_value(vec![("total_amount", Value::Int(10))]),
        )])));
        let id = updated_session.insert_fact(initial).unwrap();
        let updated = Fact::new(Some(map_value(vec![(
            "cart",
            map_value(vec![("total_amount", Value::Int(320))]),
        )])));
        updated_session.update_fact(id, updated.clone()).unwrap();

        let mut fresh_session = Session::new(network);
        let fresh_id = fresh_session.insert_fact(updated).unwrap();

        assert_eq!(
            ids(&updated_session.results_for_fact(id)),
            ids(&fresh_session.results_for_fact(fresh_id))
        );
    }

    /// Property 8: rules sharing an identical leaf condition share a
    /// single alpha node.
    #[test]
    fn identical_leaves_share_one_alpha_node() {
        let rules = vec![
            rule("A", 10, "", leaf("cart.total_amount", "gte", Value::Int(100))),
            rule("B", 9, "", leaf("cart.total_amount", "gte", Value::Int(100))),
            rule("C", 8, "", leaf("cart.total_amount", "gte", Value::Int(999))),
        ];
        let network = ReteNetwork::build(&rules);
        assert_eq!(network.alphas.len(), 2);
    }

    /// A NOT node must agree with the flat engine: the negated leaf's
    /// truth in the same pass the alpha node reports it, not a stale
    /// "child never asserted" default.
    #[test]
    fn not_node_agrees_with_flat_engine_both_ways() {
        let rules = vec![rule(
            "BLACKLISTED",
            10,
            "",
            combinator(
                "NOT",
                vec![leaf("risk.user_blacklist", "eq", Value::Bool(true))],
            ),
        )];
        let engine = Engine::new(&rules);
        let network = Arc::new(ReteNetwork::build(&rules));

        let blacklisted = Fact::new(Some(map_value(vec![(
            "risk",
            map_value(vec![("user_blacklist", Value::Bool(true))]),
        )])));
        let mut flat_fact = blacklisted.clone();
        let mut session = Session::new(Arc::clone(&network));
        let id = session.insert_fact(blacklisted).unwrap();
        assert_eq!(ids(&engine.evaluate(&mut flat_fact).unwrap()), Vec::<String>::new());
        assert_eq!(ids(&session.results_for_fact(id)), Vec::<String>::new());

        let clean = Fact::new(Some(map_value(vec![(
            "risk",
            map_value(vec![("user_blacklist", Value::Bool(false))]),
        )])));
        let mut flat_fact = clean.clone();
        let mut session2 = Session::new(network);
        let id2 = session2.insert_fact(clean).unwrap();
        assert_eq!(
            ids(&engine.evaluate(&mut flat_fact).unwrap()),
            vec!["BLACKLISTED".to_string()]
        );
        assert_eq!(
            ids(&session2.results_for_fact(id2)),
            vec!["BLACKLISTED".to_string()]
        );
    }

    /// Property 7, NOT-node case: updating a fact out from under a NOT
    /// rule must leave the session in the same agenda state a fresh
    /// insert of the updated fact would — teardown during the implicit
    /// retract must not leave the NOT node's memory holding a stale id.
    #[test]
    fn update_through_a_not_node_matches_fresh_insert() {
        let rules = vec![rule(
            "BLACKLISTED",
            10,
            "",
            combinator(
                "NOT",
                vec![leaf("risk.user_blacklist", "eq", Value::Bool(true))],
            ),
        )];
        let network = Arc::new(ReteNetwork::build(&rules));

        let mut updated_session = Session::new(Arc::clone(&network));
        let blacklisted = Fact::new(Some(map_value(vec![(
            "risk",
            map_value(vec![("user_blacklist", Value::Bool(true))]),
        )])));
        let id = updated_session.insert_fact(blacklisted).unwrap();
        assert_eq!(ids(&updated_session.results_for_fact(id)), Vec::<String>::new());

        let clean = Fact::new(Some(map_value(vec![(
            "risk",
            map_value(vec![("user_blacklist", Value::Bool(false))]),
        )])));
        updated_session.update_fact(id, clean.clone()).unwrap();

        let mut fresh_session = Session::new(network);
        let fresh_id = fresh_session.insert_fact(clean).unwrap();

        assert_eq!(
            ids(&updated_session.results_for_fact(id)),
            vec!["BLACKLISTED".to_string()]
        );
        assert_eq!(
            ids(&updated_session.results_for_fact(id)),
            ids(&fresh_session.results_for_fact(fresh_id))
        );
    }
}
