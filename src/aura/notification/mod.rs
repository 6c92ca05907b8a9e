//! Notification Bus (C2): per-user fan-out of structured events to N
//! client connections, plus the mission-control facet (`running`,
//! `stop_requested`) keyed by user id. Grounded in
//! `src/api/websockets.py` (connect/disconnect/send_to_client shape)
//! and `event.rs`'s default-no-op `EventHandler` pattern from the
//! teacher repo.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::aura::mission_log::Task;

/// The channel capacity for one client sink. Small and fixed: a slow
/// consumer must not grow memory (§4.2 backpressure).
const SINK_CAPACITY: usize = 32;

/// The tagged-union event pushed to the bus. Clients must tolerate
/// unknown `type` values for forward compatibility, so this is
/// serialized with an internally-tagged `type` discriminant.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    AgentStatus { status: String },
    AuraResponse { content: String },
    SystemLog { content: String, is_error: bool },
    Phase { content: String },
    CodeStreamChunk { file_path: String, chunk: String },
    ActiveTaskUpdated { task_id: u32 },
    MissionLogUpdated { tasks: Vec<Task> },
    MissionSuccess,
    MissionFailure { reason: String },
    FileTreeUpdated { tree: Vec<String> },
    ToolCallInitiated {
        widget_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    ToolCallCompleted {
        widget_id: String,
        status: String,
        message: String,
    },
}

impl Event {
    pub fn system_log(content: impl Into<String>) -> Self {
        Event::SystemLog {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn system_error(content: impl Into<String>) -> Self {
        Event::SystemLog {
            content: content.into(),
            is_error: true,
        }
    }
}

struct ClientSink {
    sender: mpsc::Sender<Event>,
}

#[derive(Default)]
struct MissionStatus {
    running: bool,
    stop_requested: bool,
}

struct BusState {
    clients: HashMap<String, HashMap<String, ClientSink>>,
    mission_status: HashMap<String, MissionStatus>,
}

impl Default for BusState {
    fn default() -> Self {
        BusState {
            clients: HashMap::new(),
            mission_status: HashMap::new(),
        }
    }
}

/// Cheaply cloneable handle to the shared bus state. Every background
/// mission and every request handler holds a clone; the underlying
/// registries are mutex-guarded.
#[derive(Clone)]
pub struct NotificationBus {
    state: Arc<Mutex<BusState>>,
    send_timeout: Duration,
}

impl NotificationBus {
    pub fn new() -> Self {
        NotificationBus {
            state: Arc::new(Mutex::new(BusState::default())),
            send_timeout: Duration::from_millis(1000),
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Registers a client sink and returns the receiving half of its
    /// channel; callers forward received events to the actual transport
    /// (e.g. a websocket write loop).
    pub fn connect(&self, user_id: &str, client_id: &str) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(SINK_CAPACITY);
        let mut state = self.state.lock().unwrap();
        state
            .clients
            .entry(user_id.to_string())
            .or_insert_with(HashMap::new)
            .insert(client_id.to_string(), ClientSink { sender: tx });
        rx
    }

    pub fn disconnect(&self, user_id: &str, client_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(clients) = state.clients.get_mut(user_id) {
            clients.remove(client_id);
        }
    }

    /// Delivers `event` to every client connected for `user_id`.
    /// Best-effort: a client whose sink is full or closed is dropped and
    /// logged; it never blocks delivery to other clients. Takes a
    /// snapshot of sinks under the lock, then sends outside the lock.
    pub fn broadcast_to_user(&self, user_id: &str, event: Event) {
        let snapshot: Vec<(String, mpsc::Sender<Event>)> = {
            let state = self.state.lock().unwrap();
            match state.clients.get(user_id) {
                Some(clients) => clients
                    .iter()
                    .map(|(cid, sink)| (cid.clone(), sink.sender.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };
        for (client_id, sender) in snapshot {
            self.dispatch(user_id, client_id, sender, event.clone());
        }
    }

    pub fn send_to_client(&self, user_id: &str, client_id: &str, event: Event) {
        let sender = {
            let state = self.state.lock().unwrap();
            state
                .clients
                .get(user_id)
                .and_then(|clients| clients.get(client_id))
                .map(|sink| sink.sender.clone())
        };
        if let Some(sender) = sender {
            self.dispatch(user_id, client_id.to_string(), sender, event);
        }
    }

    /// Dispatches one event to one client sink, honoring `send_timeout`
    /// as the grace period for a momentarily-full sink. When called from
    /// inside a Tokio runtime (the normal case: every real caller runs
    /// under the mission's async task), the wait happens on a spawned
    /// task so the caller -- sync or async -- never blocks. Outside a
    /// runtime (e.g. a plain `#[test]`), falls back to an immediate
    /// non-blocking attempt so callers that never touch `tokio::spawn`
    /// keep working.
    fn dispatch(&self, user_id: &str, client_id: String, sender: mpsc::Sender<Event>, event: Event) {
        let timeout = self.send_timeout;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let user_id = user_id.to_string();
                handle.spawn(async move {
                    Self::send_with_timeout(&user_id, &client_id, sender, event, timeout).await;
                });
            }
            Err(_) => Self::try_send_now(user_id, &client_id, &sender, event),
        }
    }

    /// Waits up to `timeout` for backpressure to clear before dropping.
    /// A closed sink is dropped immediately regardless of the deadline.
    async fn send_with_timeout(
        user_id: &str,
        client_id: &str,
        sender: mpsc::Sender<Event>,
        event: Event,
        timeout: Duration,
    ) {
        match tokio::time::timeout(timeout, sender.send(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                log::warn!("dropping event for user {} client {}: sink closed", user_id, client_id);
            }
            Err(_) => {
                log::warn!(
                    "dropping event for user {} client {}: send timed out after {:?} (backpressure)",
                    user_id,
                    client_id,
                    timeout
                );
            }
        }
    }

    fn try_send_now(user_id: &str, client_id: &str, sender: &mpsc::Sender<Event>, event: Event) {
        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!(
                    "dropping event for user {} client {}: sink full (backpressure)",
                    user_id,
                    client_id
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::warn!("dropping event for user {} client {}: sink closed", user_id, client_id);
            }
        }
    }

    // -- mission-control facet --

    pub fn set_running(&self, user_id: &str) {
        let mut state = self.state.lock().unwrap();
        let status = state.mission_status.entry(user_id.to_string()).or_default();
        status.running = true;
        status.stop_requested = false;
    }

    pub fn set_finished(&self, user_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.mission_status.remove(user_id);
    }

    pub fn is_running(&self, user_id: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.mission_status.get(user_id).map(|s| s.running).unwrap_or(false)
    }

    /// Sets the user's stop flag. Idempotent.
    pub fn request_stop(&self, user_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.mission_status.get_mut(user_id) {
            status.stop_requested = true;
        }
    }

    pub fn is_stop_requested(&self, user_id: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .mission_status
            .get(user_id)
            .map(|s| s.stop_requested)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_delivers_fifo_to_each_client() {
        let bus = NotificationBus::new();
        let mut rx = bus.connect("u1", "c1");
        bus.broadcast_to_user("u1", Event::system_log("first"));
        bus.broadcast_to_user("u1", Event::system_log("second"));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        match (first, second) {
            (Event::SystemLog { content: a, .. }, Event::SystemLog { content: b, .. }) => {
                assert_eq!(a, "first");
                assert_eq!(b, "second");
            }
            _ => panic!("unexpected event shapes"),
        }
    }

    #[tokio::test]
    async fn disconnect_removes_client_others_still_receive() {
        let bus = NotificationBus::new();
        let _rx1 = bus.connect("u1", "c1");
        let mut rx2 = bus.connect("u1", "c2");
        bus.disconnect("u1", "c1");
        bus.broadcast_to_user("u1", Event::MissionSuccess);
        let evt = rx2.recv().await.unwrap();
        assert!(matches!(evt, Event::MissionSuccess));
    }

    #[test]
    fn mission_control_tracks_running_and_stop() {
        let bus = NotificationBus::new();
        assert!(!bus.is_running("u1"));
        bus.set_running("u1");
        assert!(bus.is_running("u1"));
        assert!(!bus.is_stop_requested("u1"));
        bus.request_stop("u1");
        bus.request_stop("u1"); // idempotent
        assert!(bus.is_stop_requested("u1"));
        bus.set_finished("u1");
        assert!(!bus.is_running("u1"));
    }

    #[tokio::test]
    async fn full_sink_drops_event_without_blocking() {
        let bus = NotificationBus::new();
        let _rx = bus.connect("u1", "c1"); // never drained
        for _ in 0..(SINK_CAPACITY + 5) {
            bus.broadcast_to_user("u1", Event::system_log("spam"));
        }
        // No panic/hang means backpressure dropped excess events.
    }
}
