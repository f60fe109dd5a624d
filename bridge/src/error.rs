use thiserror::Error;

/// Failures surfaced at the host boundary.
///
/// Every operation that returns one of these has already restored the stack of
/// the context it worked on to the depth it had before the call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// A global or field segment does not exist or is nil.
    #[error("unresolved name '{name}'")]
    UnresolvedName { name: String },

    /// A field descent or structured read targeted a non-table value.
    #[error("'{name}' is not a table")]
    NotATable { name: String },

    #[error("'{name}' is not a function")]
    NotAFunction { name: String },

    /// Requested result bindings differ from the declared result count.
    #[error("function '{function}' declares {declared} result(s) but {requested} were requested")]
    ArityMismatch {
        function: String,
        declared: usize,
        requested: usize,
    },

    /// A numeric value does not fit the target representation.
    #[error("{from_type} cannot be represented as {target}{}", value_suffix(.value))]
    TypeRange {
        from_type: &'static str,
        target: &'static str,
        value: Option<String>,
    },

    #[error("failed to load '{file}': {message}")]
    ScriptLoad { file: String, message: String },

    #[error("error calling '{function}': {message}")]
    ScriptRuntime { function: String, message: String },

    #[error("function '{function}' is declared without return values")]
    NoReturnValues { function: String },

    #[error("expected {expected}, found {found}")]
    UnexpectedType { expected: &'static str, found: &'static str },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// A field read from a table could not be parsed into the requested type.
    #[error("invalid value '{value}' for field '{field}'")]
    InvalidField { field: String, value: String },

    #[error("cannot compare a {lhs} with a {rhs} across contexts")]
    CrossContextComparison { lhs: &'static str, rhs: &'static str },

    #[error("no script is open")]
    ScriptClosed,
}

fn value_suffix(value: &Option<String>) -> String {
    value.as_ref().map(|v| format!(" (value {})", v)).unwrap_or_default()
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

impl BridgeError {
    pub(crate) fn unresolved(name: impl Into<String>) -> Self {
        BridgeError::UnresolvedName { name: name.into() }
    }

    pub(crate) fn not_a_table(name: impl Into<String>) -> Self {
        BridgeError::NotATable { name: name.into() }
    }

    pub(crate) fn range<S: ?Sized>(from_type: &'static str, target: &'static str, value: Option<&S>) -> Self
    where
        S: std::fmt::Display,
    {
        BridgeError::TypeRange {
            from_type,
            target,
            value: value.map(|v| v.to_string()),
        }
    }
}
