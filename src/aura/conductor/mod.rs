//! Conductor (C6): drives one mission from a user goal to completion,
//! owning the `Idle -> Planning -> Ready -> Executing -> (Retrying |
//! Replanning) -> Executing -> Done | Failed | Stopped` state machine.
//! Grounded in `ConductorService.execute_mission`,
//! `_get_tool_call_for_task`, `_is_result_an_error`, and
//! `_execute_strategic_replan`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::aura::error::AuraError;
use crate::aura::gateway::{GatewayMessage, LlmGateway, StreamTag};
use crate::aura::mission_log::{MissionLog, Task, ToolInvocation};
use crate::aura::notification::{Event, NotificationBus};
use crate::aura::planner::{extract_json_object, Planner};
use crate::aura::tools::{ServiceBundle, ToolRunner};
use crate::aura::user_context::{AgentRole, UserContext};

/// Per-task attempts before the Conductor gives up and invokes the
/// Replanner: one initial attempt plus this many retries, i.e. up to
/// `MAX_RETRIES_PER_TASK + 1` total tries per task.
const MAX_RETRIES_PER_TASK: u32 = 1;

/// Bounds total replans for one mission run. Not named by the original
/// source, which replans unconditionally on every exhausted task --
/// added here so a persistently-wrong model cannot loop the mission
/// forever (see DESIGN.md).
const MAX_REPLANS_PER_MISSION: u32 = 3;

/// Suspension point between finished tasks (§4.6 step 6 / §5): gives a
/// pending `stop()`/cancellation a chance to land before the next tool
/// call starts, and keeps one mission from starving others on the
/// runtime.
const TASK_YIELD_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome of `execute_task_with_retries`, distinguishing a user-requested
/// stop (discovered mid-retry) from ordinary success/failure so `drive`
/// can react to it without reusing the replan path.
enum TaskAttemptOutcome {
    Success,
    Stopped,
    Failed(String),
}

/// The mission's externally observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionState {
    Idle,
    Planning,
    Ready,
    Executing,
    Retrying,
    Replanning,
    Done,
    Failed,
    Stopped,
}

#[derive(Deserialize)]
struct ToolCallDocument {
    tool_name: String,
    #[serde(default)]
    arguments: serde_json::Map<String, serde_json::Value>,
}

fn parse_tool_call(raw: &str) -> Result<ToolCallDocument, AuraError> {
    if let Ok(doc) = serde_json::from_str::<ToolCallDocument>(raw) {
        return Ok(doc);
    }
    let candidate = extract_json_object(raw)
        .ok_or_else(|| AuraError::Parse(format!("no tool call JSON found in: {}", raw)))?;
    serde_json::from_str::<ToolCallDocument>(candidate).map_err(|e| AuraError::Parse(e.to_string()))
}

/// Strips a single leading/trailing Markdown code fence (```lang ... ```)
/// from generated file content, generalizing the original's
/// Python-specific ```python fence regex to any language tag.
fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let after_open = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return trimmed.to_string(),
    };
    match after_open.rfind("```") {
        Some(idx) => after_open[..idx].trim_end().to_string(),
        None => after_open.to_string(),
    }
}

/// Owns one mission's run loop: planning, dispatch, retry/replan
/// recovery, and completion notification.
pub struct Conductor {
    ctx: UserContext,
    mission_log: Arc<MissionLog>,
    tool_runner: Arc<ToolRunner>,
    planner: Arc<Planner>,
    gateway: Arc<LlmGateway>,
    bus: NotificationBus,
    services: ServiceBundle,
    state: AtomicU8,
}

impl Conductor {
    pub fn new(
        ctx: UserContext,
        mission_log: Arc<MissionLog>,
        tool_runner: Arc<ToolRunner>,
        planner: Arc<Planner>,
        gateway: Arc<LlmGateway>,
        bus: NotificationBus,
        services: ServiceBundle,
    ) -> Self {
        Conductor {
            ctx,
            mission_log,
            tool_runner,
            planner,
            gateway,
            bus,
            services,
            state: AtomicU8::new(MissionState::Idle as u8),
        }
    }

    pub fn state(&self) -> MissionState {
        match self.state.load(Ordering::Relaxed) {
            0 => MissionState::Idle,
            1 => MissionState::Planning,
            2 => MissionState::Ready,
            3 => MissionState::Executing,
            4 => MissionState::Retrying,
            5 => MissionState::Replanning,
            6 => MissionState::Done,
            7 => MissionState::Failed,
            _ => MissionState::Stopped,
        }
    }

    fn set_state(&self, state: MissionState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Signals a running mission for this user to stop at the next safe
    /// point. Has no effect if no mission is running.
    pub fn request_stop(bus: &NotificationBus, user_id: &str) {
        bus.request_stop(user_id);
    }

    /// Runs the mission to completion. Rejects a concurrent mission for
    /// the same user rather than interleaving two task loops against one
    /// mission log (§4.6 concurrent-mission rejection).
    pub async fn run_mission(&self, user_goal: &str, cancel: CancellationToken) -> Result<(), AuraError> {
        if self.bus.is_running(&self.ctx.user_id) {
            return Err(AuraError::Config(format!(
                "a mission is already running for user '{}'",
                self.ctx.user_id
            )));
        }
        self.bus.set_running(&self.ctx.user_id);
        let outcome = self.drive(user_goal, cancel).await;
        self.bus.set_finished(&self.ctx.user_id);
        outcome
    }

    async fn drive(&self, user_goal: &str, cancel: CancellationToken) -> Result<(), AuraError> {
        self.set_state(MissionState::Planning);
        self.bus.broadcast_to_user(
            &self.ctx.user_id,
            Event::AgentStatus {
                status: "planning".to_string(),
            },
        );

        let plan = match self.planner.create_plan(&self.ctx, user_goal, cancel.clone()).await {
            Ok(plan) => plan,
            Err(e) => {
                self.set_state(MissionState::Failed);
                self.bus
                    .broadcast_to_user(&self.ctx.user_id, Event::MissionFailure { reason: e.to_string() });
                return Err(e);
            }
        };
        self.mission_log.set_initial_plan(&plan.steps, user_goal);
        self.set_state(MissionState::Ready);

        let mut replans_used = 0u32;
        self.set_state(MissionState::Executing);

        loop {
            if self.bus.is_stop_requested(&self.ctx.user_id) {
                self.set_state(MissionState::Stopped);
                self.bus.broadcast_to_user(
                    &self.ctx.user_id,
                    Event::system_log("mission stopped by user request"),
                );
                return Ok(());
            }
            if cancel.is_cancelled() {
                self.set_state(MissionState::Stopped);
                return Err(AuraError::Cancelled);
            }

            let pending = self.mission_log.get_tasks(Some(false));
            let task = match pending.into_iter().next() {
                Some(task) => task,
                None => {
                    return self.complete_mission(user_goal, cancel).await;
                }
            };

            self.bus
                .broadcast_to_user(&self.ctx.user_id, Event::ActiveTaskUpdated { task_id: task.id });

            match self.execute_task_with_retries(&task, cancel.clone()).await {
                TaskAttemptOutcome::Success => {
                    tokio::time::sleep(TASK_YIELD_INTERVAL).await;
                    continue;
                }
                TaskAttemptOutcome::Stopped => {
                    self.set_state(MissionState::Stopped);
                    self.bus.broadcast_to_user(
                        &self.ctx.user_id,
                        Event::system_log("mission stopped by user request"),
                    );
                    return Ok(());
                }
                TaskAttemptOutcome::Failed(error_message) => {
                    if replans_used >= MAX_REPLANS_PER_MISSION {
                        self.set_state(MissionState::Failed);
                        let reason = format!(
                            "task #{} exhausted its retry budget and replanning was exhausted: {}",
                            task.id, error_message
                        );
                        self.bus
                            .broadcast_to_user(&self.ctx.user_id, Event::MissionFailure { reason: reason.clone() });
                        return Err(AuraError::ToolFailure(reason));
                    }

                    self.set_state(MissionState::Replanning);
                    self.bus.broadcast_to_user(
                        &self.ctx.user_id,
                        Event::system_log(format!("task #{} failed, replanning: {}", task.id, error_message)),
                    );
                    let mission_log_snapshot = self.mission_log.get_tasks(None);
                    let revised = self
                        .planner
                        .replan(&self.ctx, user_goal, &mission_log_snapshot, &task, &error_message, cancel.clone())
                        .await;
                    match revised {
                        Ok(plan) => {
                            self.mission_log.replace_tail_from(task.id, &plan.steps);
                            replans_used += 1;
                            self.set_state(MissionState::Executing);
                            tokio::time::sleep(TASK_YIELD_INTERVAL).await;
                        }
                        Err(e) => {
                            self.set_state(MissionState::Failed);
                            self.bus
                                .broadcast_to_user(&self.ctx.user_id, Event::MissionFailure { reason: e.to_string() });
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    async fn complete_mission(&self, user_goal: &str, cancel: CancellationToken) -> Result<(), AuraError> {
        let tasks = self.mission_log.get_tasks(None);
        let summary = self
            .planner
            .summarize_mission(&self.ctx, user_goal, &tasks, cancel)
            .await
            .unwrap_or_else(|_| "Mission accomplished!".to_string());
        self.set_state(MissionState::Done);
        self.bus
            .broadcast_to_user(&self.ctx.user_id, Event::AuraResponse { content: summary });
        self.bus.broadcast_to_user(&self.ctx.user_id, Event::MissionSuccess);
        Ok(())
    }

    /// Runs one task up to `MAX_RETRIES_PER_TASK + 1` times. Checked at
    /// the top of every attempt, not just once per task, so a `stop()`
    /// issued mid-retry is observed before the next attempt starts
    /// rather than only at the top of the outer task loop.
    async fn execute_task_with_retries(&self, task: &Task, cancel: CancellationToken) -> TaskAttemptOutcome {
        let mut last_error = String::new();
        for attempt in 0..=MAX_RETRIES_PER_TASK {
            if self.bus.is_stop_requested(&self.ctx.user_id) {
                return TaskAttemptOutcome::Stopped;
            }
            if attempt > 0 {
                self.set_state(MissionState::Retrying);
            }

            let invocation = match self.resolve_tool_call(task, cancel.clone()).await {
                Ok(invocation) => invocation,
                Err(e) => {
                    last_error = e.to_string();
                    self.mission_log.record_error(task.id, &last_error);
                    if e.is_fatal_for_attempt() {
                        break;
                    }
                    continue;
                }
            };

            let outcome = self.tool_runner.run(&invocation, &self.ctx, &self.services).await;
            if outcome.is_success() {
                self.mission_log.mark_done(task.id);
                return TaskAttemptOutcome::Success;
            }
            last_error = outcome.message;
            self.mission_log.record_error(task.id, &last_error);
        }
        TaskAttemptOutcome::Failed(last_error)
    }

    /// Resolves the tool invocation for a task: uses a pre-assigned
    /// `tool_call` (e.g. the seeded indexing task) verbatim, otherwise
    /// asks the Coder role to select one, grounded in
    /// `_get_tool_call_for_task`/`run_coding_task`'s tool-selection call.
    /// Intercepts `write_file` calls missing `content` but carrying a
    /// `task_description`, synthesizing the file body via a dedicated
    /// code-generation call exactly as `run_coding_task` does.
    async fn resolve_tool_call(&self, task: &Task, cancel: CancellationToken) -> Result<ToolInvocation, AuraError> {
        let mut invocation = match &task.tool_call {
            Some(invocation) => invocation.clone(),
            None => self.select_tool_call(task, cancel.clone()).await?,
        };

        if invocation.tool_name == "write_file" {
            let has_content = invocation
                .arguments
                .get("content")
                .and_then(|v| v.as_str())
                .map(|s| !s.is_empty())
                .unwrap_or(false);
            let task_description = invocation
                .arguments
                .remove("task_description")
                .and_then(|v| v.as_str().map(|s| s.to_string()));

            if !has_content {
                let description = task_description.unwrap_or_else(|| task.description.clone());
                let path = invocation
                    .arguments
                    .get("path")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let generated = self.generate_code_for_task(&description, &path, cancel).await?;
                invocation
                    .arguments
                    .insert("content".to_string(), serde_json::Value::String(generated));
            }
        }

        Ok(invocation)
    }

    async fn select_tool_call(&self, task: &Task, cancel: CancellationToken) -> Result<ToolInvocation, AuraError> {
        let tools = self.tool_runner.catalog().llm_tool_definitions();
        let prompt = format!(
            "Select exactly one tool call to accomplish this step. Respond with JSON: \
             {{\"tool_name\": \"...\", \"arguments\": {{...}}}}.\n\nStep: {}",
            task.description
        );
        let reply = self
            .gateway
            .call(
                &self.ctx,
                AgentRole::Coder,
                &[GatewayMessage::user(prompt)],
                true,
                Some(&serde_json::Value::Array(tools)),
                None,
                cancel,
            )
            .await?;
        let doc = parse_tool_call(&reply)?;
        Ok(ToolInvocation {
            tool_name: doc.tool_name,
            arguments: doc.arguments,
        })
    }

    async fn generate_code_for_task(&self, description: &str, path: &str, cancel: CancellationToken) -> Result<String, AuraError> {
        let prompt = format!(
            "Write the complete file content to accomplish the following task. Respond with only the \
             file content, optionally wrapped in a single Markdown code fence.\n\nFile: {}\nTask: {}",
            path, description
        );
        let stream_tag = Some(StreamTag {
            user_id: self.ctx.user_id.clone(),
            file_path: Some(path.to_string()),
        });
        let reply = self
            .gateway
            .call(
                &self.ctx,
                AgentRole::Coder,
                &[GatewayMessage::user(prompt)],
                false,
                None,
                stream_tag,
                cancel,
            )
            .await?;
        Ok(strip_code_fence(&reply))
    }
}
