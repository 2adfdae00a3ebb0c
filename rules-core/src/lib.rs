//! Fact store, condition interpreter/compiler, flat firing engine, rule
//! registry, and handler pipeline for the marketing rules engine.

pub mod condition;
pub mod engine;
pub mod error;
pub mod fact;
pub mod pipeline;
pub mod registry;
pub mod rule;

pub use condition::{compile, eval_compiled, interpret, CompiledExpr, Condition, LeafExpr};
pub use engine::Engine;
pub use error::RuleError;
pub use fact::{Fact, Loader};
pub use pipeline::{EnginePipelineHandler, Pipeline, PipelineContext, PipelineHandler};
pub use registry::RuleRegistry;
pub use rule::{parse_rule_json, parse_rules_json, Action, CompiledRule, Rule, RuleResult};

pub use rules_value::{apply, loose_eq, Operator, Value, ValueError};
