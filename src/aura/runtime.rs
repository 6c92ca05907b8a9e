//! Composition root: wires a loaded `AuraConfig` into the shared
//! Notification Bus, LLM Gateway, Tool Runner, and Planner so an
//! embedding binary constructs one `AuraRuntime` instead of threading
//! config through each component by hand.

use std::sync::Arc;
use std::time::Duration;

use crate::aura::config::AuraConfig;
use crate::aura::gateway::LlmGateway;
use crate::aura::notification::NotificationBus;
use crate::aura::planner::Planner;
use crate::aura::tools::catalog::build_catalog;
use crate::aura::tools::{ToolCatalog, ToolRunner};

/// The process-wide handles a `Conductor` is built from for one mission.
/// Cheaply cloneable: every field is already an `Arc` or a `Clone`
/// handle over shared state.
#[derive(Clone)]
pub struct AuraRuntime {
    pub config: AuraConfig,
    pub bus: NotificationBus,
    pub gateway: Arc<LlmGateway>,
    pub tool_runner: Arc<ToolRunner>,
    pub planner: Arc<Planner>,
}

impl AuraRuntime {
    /// Builds the runtime from a loaded config, threading
    /// `client_send_timeout_ms` into the bus that every other component
    /// shares.
    pub fn new(config: AuraConfig) -> Self {
        let bus = NotificationBus::new().with_send_timeout(Duration::from_millis(config.client_send_timeout_ms));
        let gateway = Arc::new(LlmGateway::new(config.clone(), bus.clone()));
        let catalog: Arc<ToolCatalog> = Arc::new(build_catalog());
        let tool_runner = Arc::new(ToolRunner::new(catalog, bus.clone()));
        let planner = Arc::new(Planner::new(gateway.clone()));
        AuraRuntime {
            config,
            bus,
            gateway,
            tool_runner,
            planner,
        }
    }
}
