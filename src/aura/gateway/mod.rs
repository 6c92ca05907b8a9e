//! LLM Gateway (C3): the single streaming call pattern used by every
//! agent role. Grounded in `DevelopmentTeamService._make_llm_call`
//! (payload/header shape, `Error:`-prefixed failures) and the teacher's
//! pooled-client pattern (`http_client_pool.rs`) of reusing one
//! `reqwest::Client` rather than constructing one per call.

use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::aura::config::AuraConfig;
use crate::aura::error::AuraError;
use crate::aura::notification::{Event, NotificationBus};
use crate::aura::user_context::{AgentRole, UserContext};

/// One message in the conversation passed to the external LLM service.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayMessage {
    pub role: String,
    pub content: String,
}

impl GatewayMessage {
    pub fn user(content: impl Into<String>) -> Self {
        GatewayMessage {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Where to forward `chunk`/`phase`/`system_log` records while a call is
/// in flight. Absent for callers that only want the final reply.
#[derive(Debug, Clone)]
pub struct StreamTag {
    pub user_id: String,
    pub file_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    provider_name: &'a str,
    model_name: &'a str,
    messages: &'a [GatewayMessage],
    temperature: f32,
    is_json: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a serde_json::Value>,
}

/// Owns the pooled HTTP client used for every call to the external LLM
/// microservice.
pub struct LlmGateway {
    client: reqwest::Client,
    config: AuraConfig,
    bus: NotificationBus,
}

impl LlmGateway {
    pub fn new(config: AuraConfig, bus: NotificationBus) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("reqwest client builder should not fail with default TLS backend");
        LlmGateway { client, config, bus }
    }

    /// The single unified streaming call underlying every agent role.
    /// Never throws for stream-level errors: returns `Err(AuraError)`
    /// whose `Display` is the `Error:`-prefixed string callers branch on
    /// per the wire contract (§4.3).
    pub async fn call(
        &self,
        ctx: &UserContext,
        role: AgentRole,
        messages: &[GatewayMessage],
        is_json: bool,
        tools: Option<&serde_json::Value>,
        stream_tag: Option<StreamTag>,
        cancel: CancellationToken,
    ) -> Result<String, AuraError> {
        let server_url = self
            .config
            .llm_server_url
            .as_ref()
            .ok_or_else(|| AuraError::Config("LLM_SERVER_URL is not configured".to_string()))?;

        let assignment = ctx
            .role_assignment(role)
            .ok_or_else(|| AuraError::Config(format!("no model assigned for role '{}'", role.as_str())))?;

        let credential = ctx
            .credential_lookup
            .credential_for(&ctx.user_id, &assignment.provider)
            .ok_or_else(|| {
                AuraError::Config(format!("no API key configured for provider '{}'", assignment.provider))
            })?;

        let body = InvokeRequest {
            provider_name: &assignment.provider,
            model_name: &assignment.model,
            messages,
            temperature: assignment.temperature,
            is_json,
            tools,
        };

        let request = self
            .client
            .post(format!("{}/invoke", server_url))
            .header("X-Provider-API-Key", credential)
            .json(&body);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AuraError::Cancelled),
            result = request.send() => result.map_err(|e| {
                log::error!("could not connect to LLM service at {}: {}", server_url, e);
                AuraError::Gateway(format!(
                    "Could not connect to the AI microservice. Please ensure it is running and the URL is correct: {}",
                    e
                ))
            })?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            log::error!("LLM service returned error {}: {}", status, detail);
            return Err(AuraError::Gateway(format!(
                "The AI microservice failed to process the request. Status: {}. Details: {}",
                status, detail
            )));
        }

        self.consume_ndjson(response, stream_tag, cancel).await
    }

    async fn consume_ndjson(
        &self,
        response: reqwest::Response,
        stream_tag: Option<StreamTag>,
        cancel: CancellationToken,
    ) -> Result<String, AuraError> {
        let mut stream = response.bytes_stream();
        let mut buf = String::new();
        let mut final_reply: Option<String> = None;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(AuraError::Cancelled),
                next = stream.next() => next,
            };
            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    return Err(AuraError::Gateway(format!("stream read error: {}", e)));
                }
                None => break,
            };
            buf.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline_pos) = buf.find('\n') {
                let line = buf[..newline_pos].trim().to_string();
                buf.drain(..=newline_pos);
                if line.is_empty() {
                    continue;
                }
                self.handle_record(&line, &stream_tag, &mut final_reply)?;
            }
        }
        let remainder = buf.trim();
        if !remainder.is_empty() {
            self.handle_record(remainder, &stream_tag, &mut final_reply)?;
        }

        final_reply.ok_or_else(|| AuraError::Gateway("malformed stream: no final_response record observed".to_string()))
    }

    fn handle_record(
        &self,
        line: &str,
        stream_tag: &Option<StreamTag>,
        final_reply: &mut Option<String>,
    ) -> Result<(), AuraError> {
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| AuraError::Gateway(format!("malformed NDJSON record: {} ({})", line, e)))?;

        if let Some(final_response) = value.get("final_response") {
            if let Some(reply) = final_response.get("reply").and_then(|r| r.as_str()) {
                *final_reply = Some(reply.to_string());
            }
            return Ok(());
        }

        let record_type = value.get("type").and_then(|t| t.as_str()).unwrap_or_default();
        let content = value
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default()
            .to_string();

        match record_type {
            "chunk" => {
                if let Some(tag) = stream_tag {
                    self.bus.broadcast_to_user(
                        &tag.user_id,
                        Event::CodeStreamChunk {
                            file_path: tag.file_path.clone().unwrap_or_default(),
                            chunk: content,
                        },
                    );
                }
            }
            "phase" => {
                if let Some(tag) = stream_tag {
                    self.bus.broadcast_to_user(&tag.user_id, Event::Phase { content });
                }
            }
            "system_log" => {
                if let Some(tag) = stream_tag {
                    self.bus.broadcast_to_user(&tag.user_id, Event::system_log(content));
                }
            }
            other => {
                log::warn!("unrecognized stream record type '{}', ignoring", other);
            }
        }
        Ok(())
    }
}
