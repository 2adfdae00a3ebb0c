//! A linear handler pipeline sharing one mutable context.

use std::collections::HashMap;

use rules_value::Value;

use crate::error::RuleError;
use crate::fact::Fact;
use crate::rule::RuleResult;

/// Mutable state threaded through every handler in a `Pipeline` run.
/// `result` is the short-circuit flag: a handler that flips it to `false`
/// stops the chain without failing the pipeline; `reason` records why,
/// first write wins.
pub struct PipelineContext {
    pub result: bool,
    pub reason: String,
    pub fact: Fact,
    pub results: Vec<RuleResult>,
    pub data: HashMap<String, Value>,
}

impl PipelineContext {
    pub fn new(fact: Fact) -> Self {
        Self {
            result: true,
            reason: String::new(),
            fact,
            results: Vec::new(),
            data: HashMap::new(),
        }
    }
}

/// One named stage of a pipeline. A handler reports failure either by
/// returning `Err` (an exceptional failure, propagated to the caller) or
/// by setting `ctx.result = false` (an ordinary short-circuit, not an
/// error).
pub trait PipelineHandler: Send + Sync {
    fn handle(&self, ctx: &mut PipelineContext) -> Result<(), RuleError>;

    fn name(&self) -> &str {
        "handler"
    }
}

/// Runs a fixed, ordered sequence of handlers against one shared context.
pub struct Pipeline {
    handlers: Vec<Box<dyn PipelineHandler>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn push(mut self, handler: Box<dyn PipelineHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Run every handler in registration order against `ctx`.
    ///
    /// Aborts immediately, without running any handler, if `ctx.result` is
    /// already `false` on entry. If a handler errs, `ctx.result` is set to
    /// `false`, `ctx.reason` takes the error message if it was empty, and
    /// the error is returned. If a handler sets `ctx.result = false`
    /// itself, `ctx.reason` takes the handler's name if it was empty, and
    /// the run stops without error.
    pub fn run(&self, ctx: &mut PipelineContext) -> Result<(), RuleError> {
        if !ctx.result {
            return Ok(());
        }
        for handler in &self.handlers {
            tracing::trace!(handler = handler.name(), "running pipeline handler");
            if let Err(err) = handler.handle(ctx) {
                ctx.result = false;
                if ctx.reason.is_empty() {
                    ctx.reason = err.to_string();
                }
                return Err(err);
            }
            if !ctx.result {
                if ctx.reason.is_empty() {
                    ctx.reason = handler.name().to_string();
                }
                tracing::debug!(handler = handler.name(), "pipeline stopped early");
                return Ok(());
            }
        }
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// A handler that runs a flat `Engine` against the context's fact and
/// appends its results.
pub struct EnginePipelineHandler {
    engine: std::sync::Arc<crate::engine::Engine>,
}

impl EnginePipelineHandler {
    pub fn new(engine: std::sync::Arc<crate::engine::Engine>) -> Self {
        Self { engine }
    }
}

impl PipelineHandler for EnginePipelineHandler {
    fn handle(&self, ctx: &mut PipelineContext) -> Result<(), RuleError> {
        let mut results = self.engine.evaluate(&mut ctx.fact)?;
        ctx.results.append(&mut results);
        Ok(())
    }

    fn name(&self) -> &str {
        "engine"
    }
}
