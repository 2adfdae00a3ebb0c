use rules_value::ValueError;

/// The error taxonomy shared by the flat engine and the RETE network.
///
/// Compile-time `MalformedCondition` drops the offending rule silently
/// (logged, never surfaced); the other variants abort the in-flight
/// `evaluate`/`on_assert` call and propagate to the caller.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("malformed condition: {0}")]
    MalformedCondition(String),

    #[error("type mismatch on field `{field}`: {source}")]
    TypeMismatch { field: String, source: ValueError },

    #[error("variable not found: {0}")]
    VarNotFound(String),

    #[error("loader failed for `{path}`: {message}")]
    LoaderFailure { path: String, message: String },

    #[error("pipeline aborted: {0}")]
    PipelineAbort(String),
}

impl RuleError {
    pub fn type_mismatch(field: impl Into<String>, source: ValueError) -> Self {
        RuleError::TypeMismatch {
            field: field.into(),
            source,
        }
    }
}
