//! Mission Orchestrator core for Aura.
//!
//! This crate implements the planning-and-execution state machine that
//! coordinates LLM calls, tool invocations, retry/replan recovery,
//! per-user cancellation, and real-time client notifications for a
//! multi-tenant agentic backend. See the `aura` module for the
//! component breakdown (Mission Log, Notification Bus, LLM Gateway,
//! Tool Runner, Planner Pipeline, Conductor).
//!
//! This crate only logs via the `log` facade; an embedding binary
//! should call `env_logger::init()` (or an equivalent subscriber) once
//! at startup to see `RUST_LOG`-filtered output.

pub mod aura;

pub use aura::config::AuraConfig;
pub use aura::conductor::{Conductor, MissionState};
pub use aura::error::AuraError;
pub use aura::gateway::LlmGateway;
pub use aura::mission_log::MissionLog;
pub use aura::notification::{Event, NotificationBus};
pub use aura::planner::Planner;
pub use aura::runtime::AuraRuntime;
pub use aura::tools::{ToolCatalog, ToolRunner};
pub use aura::user_context::{AgentRole, UserContext};
