use std::fmt;

/// The core's unified error taxonomy. One variant per kind named in the
/// error-handling design: configuration, gateway, parsing, tool lookup,
/// path sandboxing, tool failure, cancellation, and project/workspace
/// errors that only ever surface at the API boundary.
#[derive(Debug, Clone)]
pub enum AuraError {
    /// Missing role assignment, missing credential, or missing `LLM_SERVER_URL`.
    Config(String),
    /// Non-2xx from the LLM service, or a malformed NDJSON stream.
    Gateway(String),
    /// LLM output was not valid JSON in a context that required JSON.
    Parse(String),
    /// The referenced tool is not in the catalog.
    ToolNotFound(String),
    /// A tool argument resolved outside the active project root.
    PathEscape(String),
    /// A tool ran but its result classified as a failure.
    ToolFailure(String),
    /// The operation was cancelled via a `CancellationToken`.
    Cancelled,
    /// Surfaced only at the API boundary; never produced inside the mission loop.
    ProjectNotFound(String),
    /// Surfaced only at the API boundary; never produced inside the mission loop.
    Workspace(String),
}

impl fmt::Display for AuraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuraError::Config(msg) => write!(f, "Error: {}", msg),
            AuraError::Gateway(msg) => write!(f, "Error: {}", msg),
            AuraError::Parse(msg) => write!(f, "Error: failed to parse LLM output: {}", msg),
            AuraError::ToolNotFound(name) => write!(f, "Error: unknown tool '{}'", name),
            AuraError::PathEscape(path) => {
                write!(f, "Error: path '{}' escapes the project root", path)
            }
            AuraError::ToolFailure(msg) => write!(f, "Error: {}", msg),
            AuraError::Cancelled => write!(f, "Error: operation cancelled"),
            AuraError::ProjectNotFound(name) => write!(f, "Error: project '{}' not found", name),
            AuraError::Workspace(msg) => write!(f, "Error: workspace error: {}", msg),
        }
    }
}

impl std::error::Error for AuraError {}

impl AuraError {
    /// True for errors that should never trigger an automatic retry attempt
    /// within a single task attempt (they still count against the retry
    /// budget, they just never succeed by being re-tried verbatim).
    pub fn is_fatal_for_attempt(&self) -> bool {
        matches!(self, AuraError::PathEscape(_) | AuraError::ToolNotFound(_))
    }
}
