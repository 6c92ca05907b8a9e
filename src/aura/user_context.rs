use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// The closed set of LLM personas the core addresses by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Planner,
    Architect,
    Sequencer,
    Coder,
    Chat,
    Intent,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Planner => "planner",
            AgentRole::Architect => "architect",
            AgentRole::Sequencer => "sequencer",
            AgentRole::Coder => "coder",
            AgentRole::Chat => "chat",
            AgentRole::Intent => "intent",
        }
    }
}

/// The `(provider, model, temperature)` a role resolves to for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleAssignment {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
}

/// Resolves a provider's API credential for a given user. The concrete
/// storage (encrypted-at-rest credential table) lives outside the core;
/// this trait is the read contract the core depends on, per the
/// out-of-scope collaborators named in the purpose & scope section.
pub trait CredentialLookup: Send + Sync {
    fn credential_for(&self, user_id: &str, provider: &str) -> Option<String>;
}

/// An in-memory lookup, useful for tests and for embedding callers that
/// resolve credentials ahead of time.
#[derive(Default)]
pub struct StaticCredentialLookup {
    credentials: HashMap<(String, String), String>,
}

impl StaticCredentialLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(
        mut self,
        user_id: impl Into<String>,
        provider: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        self.credentials
            .insert((user_id.into(), provider.into()), credential.into());
        self
    }
}

impl CredentialLookup for StaticCredentialLookup {
    fn credential_for(&self, user_id: &str, provider: &str) -> Option<String> {
        self.credentials
            .get(&(user_id.to_string(), provider.to_string()))
            .cloned()
    }
}

/// Ephemeral, per-request/background-job context. Owned by the job that
/// created it and disposed at job end -- never shared across users.
#[derive(Clone)]
pub struct UserContext {
    pub user_id: String,
    pub project_root: PathBuf,
    pub llm_role_assignments: HashMap<AgentRole, RoleAssignment>,
    pub credential_lookup: Arc<dyn CredentialLookup>,
}

impl UserContext {
    pub fn new(
        user_id: impl Into<String>,
        project_root: impl Into<PathBuf>,
        credential_lookup: Arc<dyn CredentialLookup>,
    ) -> Self {
        UserContext {
            user_id: user_id.into(),
            project_root: project_root.into(),
            llm_role_assignments: HashMap::new(),
            credential_lookup,
        }
    }

    pub fn with_role(mut self, role: AgentRole, assignment: RoleAssignment) -> Self {
        self.llm_role_assignments.insert(role, assignment);
        self
    }

    /// Resolves `(provider, model, temperature)` for a role, falling back
    /// to the `chat` role's assignment when a more specific role has none
    /// configured -- mirroring `LLMClient.get_model_for_role`'s fallback
    /// to the `chat` key in the original.
    pub fn role_assignment(&self, role: AgentRole) -> Option<&RoleAssignment> {
        self.llm_role_assignments
            .get(&role)
            .or_else(|| self.llm_role_assignments.get(&AgentRole::Chat))
    }
}
