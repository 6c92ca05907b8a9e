//! Tool Runner (C4): resolves tool invocations against a fixed catalog,
//! injects dependencies, classifies results, and notifies side effects.
//! Grounded in `src/services/tool_runner_service.py` (the invocation
//! pipeline) and `cloudllm::tool_protocol`/`cloudllm::tools::filesystem`
//! for the Rust-idiomatic registry/path-sandboxing shape.

pub mod catalog;

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::aura::error::AuraError;
use crate::aura::gateway::LlmGateway;
use crate::aura::mission_log::{MissionLog, ToolInvocation};
use crate::aura::notification::{Event, NotificationBus};
use crate::aura::user_context::UserContext;

/// A service a tool may declare as required; the runner injects a typed
/// handle for each at invocation time rather than matching parameter
/// names by reflection (the original's approach, re-architected per
/// the design notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredService {
    ProjectManager,
    MissionLog,
    VectorContext,
    LlmGateway,
    NotificationBus,
}

/// Read contract for project/workspace state the core needs; the real
/// implementation (filesystem CRUD, workspace management) lives outside
/// the core per the purpose & scope's out-of-scope collaborators.
pub trait ProjectManager: Send + Sync {
    fn project_files(&self) -> Vec<String>;
}

/// Opaque "relevant snippets" provider; the vector-context retrieval
/// subsystem itself is out of scope.
pub trait VectorContext: Send + Sync {
    fn relevant_snippets(&self, query: &str) -> String;
}

/// The services available to a tool action for one invocation, resolved
/// from the active `UserContext` plus whatever process-wide handles the
/// caller wired up. Only present if `required_services` names them.
pub struct ServiceBundle {
    pub project_manager: Option<Arc<dyn ProjectManager>>,
    pub mission_log: Option<Arc<MissionLog>>,
    pub vector_context: Option<Arc<dyn VectorContext>>,
    pub llm_gateway: Option<Arc<LlmGateway>>,
    pub notification_bus: NotificationBus,
}

/// A tool's effectful action. Implementors return the raw result value
/// (a JSON string or object); the runner classifies it afterward. An
/// `Err` is treated exactly like a classified FAILURE, carrying the
/// error's message.
#[async_trait]
pub trait ToolAction: Send + Sync {
    async fn execute(
        &self,
        args: &serde_json::Map<String, serde_json::Value>,
        project_root: &Path,
        user_id: &str,
        services: &ServiceBundle,
    ) -> Result<serde_json::Value, AuraError>;
}

/// Static registration info for one tool. `path_param_keys` names
/// argument keys whose string values are filesystem paths to resolve
/// against the project root; `required_services` names the services to
/// inject.
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters_schema: serde_json::Value,
    pub required_services: HashSet<RequiredService>,
    pub path_param_keys: HashSet<&'static str>,
    pub mutates_workspace: bool,
    pub action: Arc<dyn ToolAction>,
}

/// The process-wide, immutable-after-init set of registered tools. The
/// only set of effects the agent can produce -- there is no dynamic eval.
#[derive(Default)]
pub struct ToolCatalog {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        ToolCatalog::default()
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) {
        self.tools.insert(descriptor.name.to_string(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn llm_tool_definitions(&self) -> Vec<serde_json::Value> {
        self.tools
            .values()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters_schema,
                })
            })
            .collect()
    }
}

/// Whether a classified tool result counts as a success or failure, per
/// the centralized classifier (§4.4) -- the Conductor never re-implements
/// this heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Success,
    Failure,
}

/// The outcome of one tool invocation, already classified.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub status: ToolStatus,
    pub message: String,
    pub raw: serde_json::Value,
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// Classifies a raw tool result per the centralized rule: this is the
/// single source of truth the original source lacked (its
/// `ConductorService._is_result_an_error` and `ToolRunnerService`'s
/// inline check disagreed -- the former also caught `None` and the
/// "failed"/"not found" substrings, the latter didn't).
pub fn classify_result(raw: &serde_json::Value) -> ToolOutcome {
    match raw {
        serde_json::Value::Null => ToolOutcome {
            status: ToolStatus::Failure,
            message: "tool returned empty result".to_string(),
            raw: raw.clone(),
        },
        serde_json::Value::String(s) => {
            let trimmed_lower = s.trim().to_lowercase();
            if trimmed_lower.starts_with("error") || trimmed_lower.contains("failed") || trimmed_lower.contains("not found")
            {
                ToolOutcome {
                    status: ToolStatus::Failure,
                    message: s.clone(),
                    raw: raw.clone(),
                }
            } else {
                ToolOutcome {
                    status: ToolStatus::Success,
                    message: s.clone(),
                    raw: raw.clone(),
                }
            }
        }
        serde_json::Value::Object(map) => {
            let status_field = map.get("status").and_then(|v| v.as_str()).map(|s| s.to_lowercase());
            if matches!(status_field.as_deref(), Some("failure") | Some("error")) {
                let message = map
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .or_else(|| map.get("full_output").and_then(|v| v.as_str()))
                    .unwrap_or("tool reported failure")
                    .to_string();
                ToolOutcome {
                    status: ToolStatus::Failure,
                    message,
                    raw: raw.clone(),
                }
            } else {
                ToolOutcome {
                    status: ToolStatus::Success,
                    message: raw.to_string(),
                    raw: raw.clone(),
                }
            }
        }
        other => ToolOutcome {
            status: ToolStatus::Success,
            message: other.to_string(),
            raw: raw.clone(),
        },
    }
}

/// Lexically normalizes `.`/`..` components without requiring the path
/// to exist -- mirrors `FileSystemTool::validate_path`'s manual
/// component walk, needed because targets of `write_file`/`create_directory`
/// frequently don't exist yet.
fn normalize_components(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolves a single path-valued argument against `project_root`,
/// rejecting any resolution that is not a descendant of the root.
fn resolve_path_arg(project_root: &Path, raw: &str) -> Result<PathBuf, AuraError> {
    let candidate = Path::new(raw);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        project_root.join(candidate)
    };
    let normalized = normalize_components(&joined);
    let normalized_root = normalize_components(project_root);
    if !normalized.starts_with(&normalized_root) {
        return Err(AuraError::PathEscape(raw.to_string()));
    }
    Ok(normalized)
}

fn to_relative_display(project_root: &Path, resolved: &Path) -> String {
    resolved
        .strip_prefix(project_root)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| resolved.to_string_lossy().into_owned())
}

/// Drives one tool invocation end to end: lookup, path resolution,
/// service injection, `tool_call_initiated`/`tool_call_completed`
/// notification, and result classification.
pub struct ToolRunner {
    catalog: Arc<ToolCatalog>,
    bus: NotificationBus,
}

impl ToolRunner {
    pub fn new(catalog: Arc<ToolCatalog>, bus: NotificationBus) -> Self {
        ToolRunner { catalog, bus }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub async fn run(
        &self,
        invocation: &ToolInvocation,
        ctx: &UserContext,
        services: &ServiceBundle,
    ) -> ToolOutcome {
        let descriptor = match self.catalog.get(&invocation.tool_name) {
            Some(d) => d,
            None => {
                let outcome = ToolOutcome {
                    status: ToolStatus::Failure,
                    message: AuraError::ToolNotFound(invocation.tool_name.clone()).to_string(),
                    raw: serde_json::Value::Null,
                };
                log::warn!("unknown tool requested: {}", invocation.tool_name);
                return outcome;
            }
        };

        let mut exec_args = invocation.arguments.clone();
        let mut display_args = invocation.arguments.clone();

        for key in &descriptor.path_param_keys {
            if let Some(serde_json::Value::String(raw)) = invocation.arguments.get(*key) {
                if raw.is_empty() {
                    continue;
                }
                match resolve_path_arg(&ctx.project_root, raw) {
                    Ok(resolved) => {
                        display_args.insert(
                            (*key).to_string(),
                            serde_json::Value::String(to_relative_display(&ctx.project_root, &resolved)),
                        );
                        exec_args.insert(
                            (*key).to_string(),
                            serde_json::Value::String(resolved.to_string_lossy().into_owned()),
                        );
                    }
                    Err(e) => {
                        log::warn!("path escape rejected for tool {}: {}", descriptor.name, e);
                        return ToolOutcome {
                            status: ToolStatus::Failure,
                            message: e.to_string(),
                            raw: serde_json::Value::String(e.to_string()),
                        };
                    }
                }
            }
        }

        let widget_id = Uuid::new_v4().to_string();
        self.bus.broadcast_to_user(
            &ctx.user_id,
            Event::ToolCallInitiated {
                widget_id: widget_id.clone(),
                tool_name: descriptor.name.to_string(),
                arguments: serde_json::Value::Object(display_args.clone()),
            },
        );

        let result = descriptor
            .action
            .execute(&exec_args, &ctx.project_root, &ctx.user_id, services)
            .await;
        let raw = match result {
            Ok(value) => value,
            Err(e) => serde_json::Value::String(e.to_string()),
        };
        let outcome = classify_result(&raw);

        self.bus.broadcast_to_user(
            &ctx.user_id,
            Event::ToolCallCompleted {
                widget_id,
                status: format!("{:?}", outcome.status),
                message: outcome.message.clone(),
            },
        );

        if outcome.is_success() && (!descriptor.path_param_keys.is_empty() || descriptor.mutates_workspace) {
            let tree = services
                .project_manager
                .as_ref()
                .map(|pm| pm.project_files())
                .unwrap_or_default();
            self.bus
                .broadcast_to_user(&ctx.user_id, Event::FileTreeUpdated { tree });
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_null_as_failure() {
        let outcome = classify_result(&serde_json::Value::Null);
        assert_eq!(outcome.status, ToolStatus::Failure);
        assert_eq!(outcome.message, "tool returned empty result");
    }

    #[test]
    fn classifies_error_prefixed_string_as_failure() {
        let outcome = classify_result(&json!("Error: permission denied"));
        assert_eq!(outcome.status, ToolStatus::Failure);
    }

    #[test]
    fn classifies_failed_substring_as_failure() {
        let outcome = classify_result(&json!("The operation failed unexpectedly"));
        assert_eq!(outcome.status, ToolStatus::Failure);
    }

    #[test]
    fn classifies_not_found_substring_as_failure() {
        let outcome = classify_result(&json!("File not found at path 'x'"));
        assert_eq!(outcome.status, ToolStatus::Failure);
    }

    #[test]
    fn classifies_plain_success_string_as_success() {
        let outcome = classify_result(&json!("Successfully wrote 12 bytes"));
        assert_eq!(outcome.status, ToolStatus::Success);
    }

    #[test]
    fn classifies_status_object_failure() {
        let outcome = classify_result(&json!({"status": "Failure", "summary": "boom"}));
        assert_eq!(outcome.status, ToolStatus::Failure);
        assert_eq!(outcome.message, "boom");
    }

    #[test]
    fn classifies_status_object_success() {
        let outcome = classify_result(&json!({"status": "ok", "detail": "fine"}));
        assert_eq!(outcome.status, ToolStatus::Success);
    }

    #[test]
    fn resolve_path_arg_rejects_traversal() {
        let root = Path::new("/tmp/project");
        let err = resolve_path_arg(root, "../../etc/passwd").unwrap_err();
        assert!(matches!(err, AuraError::PathEscape(_)));
    }

    #[test]
    fn resolve_path_arg_allows_nested_relative_path() {
        let root = Path::new("/tmp/project");
        let resolved = resolve_path_arg(root, "src/main.rs").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/project/src/main.rs"));
    }

    #[test]
    fn resolve_path_arg_allows_dotdot_that_stays_inside_root() {
        let root = Path::new("/tmp/project");
        let resolved = resolve_path_arg(root, "src/../src/main.rs").unwrap();
        assert_eq!(resolved, PathBuf::from("/tmp/project/src/main.rs"));
    }
}
