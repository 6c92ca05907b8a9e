//! Mission Log (C1): an ordered, persisted task list with per-task state
//! and the initial user goal. Grounded in
//! `src/services/mission_log_service.py` of the original implementation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::aura::notification::{Event, NotificationBus};

const MISSION_LOG_FILENAME: &str = "mission_log.json";

/// A single unit of work. `id` is monotonic per mission and never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u32,
    pub description: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub tool_call: Option<ToolInvocation>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// `{tool_name, arguments}` -- the Conductor's selected action for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MissionLogDocument {
    #[serde(default)]
    initial_goal: String,
    #[serde(default)]
    tasks: Vec<Task>,
}

struct MissionLogState {
    initial_goal: String,
    tasks: Vec<Task>,
    next_id: u32,
}

impl Default for MissionLogState {
    fn default() -> Self {
        MissionLogState {
            initial_goal: String::new(),
            tasks: Vec::new(),
            next_id: 1,
        }
    }
}

/// Owns the on-disk mission log for one (user, project). Single-writer,
/// many-reader: callers take a snapshot via [`MissionLog::get_tasks`]
/// rather than holding the lock.
pub struct MissionLog {
    project_root: PathBuf,
    bus: NotificationBus,
    user_id: String,
    state: Mutex<MissionLogState>,
}

impl MissionLog {
    /// Loads the log for `project_root` if `mission_log.json` exists
    /// there, otherwise starts empty. Never fails: a missing or
    /// unparsable file is logged and treated as an empty log.
    pub fn load(project_root: impl Into<PathBuf>, user_id: impl Into<String>, bus: NotificationBus) -> Self {
        let project_root = project_root.into();
        let user_id = user_id.into();
        let state = Self::read_from_disk(&project_root).unwrap_or_else(|| {
            log::info!(
                "no existing mission log found at {:?}, starting fresh",
                project_root.join(MISSION_LOG_FILENAME)
            );
            MissionLogState::default()
        });
        MissionLog {
            project_root,
            bus,
            user_id,
            state: Mutex::new(state),
        }
    }

    fn log_path(project_root: &Path) -> PathBuf {
        project_root.join(MISSION_LOG_FILENAME)
    }

    fn read_from_disk(project_root: &Path) -> Option<MissionLogState> {
        let path = Self::log_path(project_root);
        if !path.exists() {
            return None;
        }
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("failed to read mission log at {:?}: {}", path, e);
                return None;
            }
        };
        let doc: MissionLogDocument = match serde_json::from_str(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                log::error!("failed to parse mission log at {:?}: {}. starting fresh.", path, e);
                return None;
            }
        };
        let next_id = doc.tasks.iter().map(|t| t.id).max().map(|m| m + 1).unwrap_or(1);
        Some(MissionLogState {
            initial_goal: doc.initial_goal,
            tasks: doc.tasks,
            next_id,
        })
    }

    /// Flushes the current state to disk, then emits `mission_log_updated`
    /// -- strictly after the flush succeeds, never before, per the
    /// invariant this spec corrects relative to the original's
    /// notify-before-write ordering.
    fn flush_and_notify(&self, state: &MissionLogState) {
        let doc = MissionLogDocument {
            initial_goal: state.initial_goal.clone(),
            tasks: state.tasks.clone(),
        };
        if let Err(e) = fs::create_dir_all(&self.project_root) {
            log::error!("failed to create project root {:?}: {}", self.project_root, e);
            return;
        }
        let path = Self::log_path(&self.project_root);
        match serde_json::to_string_pretty(&doc) {
            Ok(json) => match fs::write(&path, json) {
                Ok(()) => {
                    log::debug!("mission log saved to {:?}", path);
                    self.bus
                        .broadcast_to_user(&self.user_id, Event::MissionLogUpdated { tasks: state.tasks.clone() });
                }
                Err(e) => log::error!("failed to save mission log to {:?}: {}", path, e),
            },
            Err(e) => log::error!("failed to serialize mission log: {}", e),
        }
    }

    /// Clears any existing tasks, stores `user_goal`, and appends one
    /// task per step plus a pre-canned indexing task ahead of them,
    /// grounded in `MissionLogService.set_initial_plan`.
    pub fn set_initial_plan(&self, steps: &[String], user_goal: &str) {
        let mut state = self.state.lock().unwrap();
        state.tasks.clear();
        state.next_id = 1;
        state.initial_goal = user_goal.to_string();

        Self::push_task(
            &mut state,
            "Index the project to build a contextual map.".to_string(),
            Some(ToolInvocation {
                tool_name: "index_project_context".to_string(),
                arguments: {
                    let mut m = serde_json::Map::new();
                    m.insert("path".to_string(), serde_json::Value::String(".".to_string()));
                    m
                },
            }),
        );
        for step in steps {
            Self::push_task(&mut state, step.clone(), None);
        }
        log::info!("initial plan with {} steps has been set", state.tasks.len());
        self.flush_and_notify(&state);
    }

    fn push_task(state: &mut MissionLogState, description: String, tool_call: Option<ToolInvocation>) -> u32 {
        let id = state.next_id;
        state.tasks.push(Task {
            id,
            description,
            done: false,
            tool_call,
            last_error: None,
        });
        state.next_id += 1;
        id
    }

    /// Appends a single task and flushes. Rejects an empty description.
    pub fn add_task(&self, description: &str) -> Result<Task, crate::aura::error::AuraError> {
        if description.trim().is_empty() {
            return Err(crate::aura::error::AuraError::Config(
                "task description cannot be empty".to_string(),
            ));
        }
        let mut state = self.state.lock().unwrap();
        let id = Self::push_task(&mut state, description.to_string(), None);
        log::info!("added task {}: '{}'", id, description);
        let task = state.tasks.iter().find(|t| t.id == id).cloned().unwrap();
        self.flush_and_notify(&state);
        Ok(task)
    }

    /// Returns a snapshot of tasks, optionally filtered by `done`.
    pub fn get_tasks(&self, done: Option<bool>) -> Vec<Task> {
        let state = self.state.lock().unwrap();
        match done {
            None => state.tasks.clone(),
            Some(d) => state.tasks.iter().filter(|t| t.done == d).cloned().collect(),
        }
    }

    /// Marks a task done; idempotent. Returns `true` if the task exists.
    pub fn mark_done(&self, task_id: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        let found = state.tasks.iter().any(|t| t.id == task_id);
        if !found {
            log::warn!("attempted to mark non-existent task {} as done", task_id);
            return false;
        }
        let already_done = state.tasks.iter().find(|t| t.id == task_id).map(|t| t.done).unwrap_or(false);
        if !already_done {
            if let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id) {
                task.done = true;
                task.last_error = None;
            }
            log::info!("marked task {} as done", task_id);
            self.flush_and_notify(&state);
        }
        true
    }

    /// Records `error` on a task without marking it done.
    pub fn record_error(&self, task_id: u32, error: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id) {
            task.last_error = Some(error.to_string());
        }
        self.flush_and_notify(&state);
    }

    /// Drops the task with id `start_task_id` and everything after it
    /// (by *position*, not by further id comparison -- see the original's
    /// `self.tasks[:start_index]` slice), then appends `new_steps` with
    /// fresh ids.
    pub fn replace_tail_from(&self, start_task_id: u32, new_steps: &[String]) -> bool {
        let mut state = self.state.lock().unwrap();
        let start_index = match state.tasks.iter().position(|t| t.id == start_task_id) {
            Some(idx) => idx,
            None => {
                log::error!("could not find task with id {} to start replacement", start_task_id);
                return false;
            }
        };
        state.tasks.truncate(start_index);
        for step in new_steps {
            Self::push_task(&mut state, step.clone(), None);
        }
        log::info!(
            "replaced tasks from id {} with new plan of {} steps",
            start_task_id,
            new_steps.len()
        );
        self.flush_and_notify(&state);
        true
    }

    pub fn initial_goal(&self) -> String {
        self.state.lock().unwrap().initial_goal.clone()
    }
}
