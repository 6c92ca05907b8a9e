use std::env;

/// Process-wide configuration, loaded once at startup from environment
/// variables. Mirrors the teacher's `CloudLLMConfig` pattern of a plain
/// struct with a manual `Default` rather than a config-file framework:
/// the core consumes exactly one required setting.
#[derive(Debug, Clone)]
pub struct AuraConfig {
    /// Base URL of the external LLM microservice. Required.
    pub llm_server_url: Option<String>,
    /// Default timeout for a single LLM call, in seconds.
    pub request_timeout_secs: u64,
    /// Bounded interval a notification-bus sink gets to accept an event
    /// before it is dropped for that client.
    pub client_send_timeout_ms: u64,
}

impl Default for AuraConfig {
    fn default() -> Self {
        AuraConfig {
            llm_server_url: None,
            request_timeout_secs: 300,
            client_send_timeout_ms: 1000,
        }
    }
}

impl AuraConfig {
    /// Loads configuration from the process environment.
    ///
    /// `LLM_SERVER_URL` is read as-is (absence is not an error here --
    /// the Gateway surfaces a `ConfigError` the first time it is
    /// actually needed, per the error-handling design). The timeouts
    /// fall back to their documented defaults on missing or unparsable
    /// values.
    pub fn from_env() -> Self {
        let mut cfg = AuraConfig::default();
        cfg.llm_server_url = env::var("LLM_SERVER_URL").ok().filter(|s| !s.is_empty());
        if let Ok(raw) = env::var("AURA_LLM_TIMEOUT_SECS") {
            if let Ok(secs) = raw.parse() {
                cfg.request_timeout_secs = secs;
            }
        }
        if let Ok(raw) = env::var("AURA_CLIENT_SEND_TIMEOUT_MS") {
            if let Ok(ms) = raw.parse() {
                cfg.client_send_timeout_ms = ms;
            }
        }
        cfg
    }

    pub fn with_llm_server_url(mut self, url: impl Into<String>) -> Self {
        self.llm_server_url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_server_url_but_sane_timeouts() {
        let cfg = AuraConfig::default();
        assert!(cfg.llm_server_url.is_none());
        assert_eq!(cfg.request_timeout_secs, 300);
        assert_eq!(cfg.client_send_timeout_ms, 1000);
    }

    #[test]
    fn builder_sets_server_url() {
        let cfg = AuraConfig::default().with_llm_server_url("http://127.0.0.1:8002");
        assert_eq!(cfg.llm_server_url.as_deref(), Some("http://127.0.0.1:8002"));
    }
}
