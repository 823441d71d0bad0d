//! Background task registry with lifecycle notifications
//!
//! A task is a background invocation of a tool. The registry keeps a bounded
//! table of lifecycle records, spawns a worker per submission, and pushes
//! `notifications/tasks/*` messages over the submitting session. The worker
//! installs a task-local handle so tool code can call
//! [`report_status_message`] without plumbing.

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;

use rapidmcp_protocol::{Error, McpResult, Task, TaskStatus, Tool, types::meta};

use crate::session::Session;

/// Bound on the task table; oldest terminal entries are evicted first
pub const MAX_TASKS: usize = 1024;

tokio::task_local! {
    static CURRENT_TASK: TaskContext;
}

#[derive(Clone)]
struct TaskContext {
    task_id: String,
    registry: TaskRegistry,
}

/// Update the status message of the task currently executing on this worker
///
/// Emits a `working` status notification carrying the message. Calling this
/// outside a task context is a no-op.
pub fn report_status_message(message: &str) {
    let _ = CURRENT_TASK.try_with(|ctx| {
        ctx.registry
            .update_status_message(&ctx.task_id, message.to_string());
    });
}

/// Whether cancellation was requested for the task on this worker
///
/// Cooperative tools poll this and bail early; returns `false` outside a
/// task context.
pub fn cancellation_requested() -> bool {
    CURRENT_TASK
        .try_with(|ctx| ctx.registry.is_cancel_requested(&ctx.task_id))
        .unwrap_or(false)
}

struct TaskEntry {
    task: Task,
    cancel_requested: Arc<AtomicBool>,
    session: Option<Arc<Session>>,
    request_key: Option<String>,
}

#[derive(Default)]
struct TaskTable {
    entries: HashMap<String, TaskEntry>,
    order: VecDeque<String>,
}

/// Bounded registry of background tool invocations
#[derive(Clone)]
pub struct TaskRegistry {
    table: Arc<Mutex<TaskTable>>,
    capacity: usize,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("len", &self.table.lock().entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    /// Create a registry with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(MAX_TASKS)
    }

    /// Create a registry with an explicit capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: Arc::new(Mutex::new(TaskTable::default())),
            capacity: capacity.max(1),
        }
    }

    /// Submit a tool invocation as a background task
    ///
    /// Records the task as `submitted`, emits `notifications/tasks/created`,
    /// and schedules the invocation on a worker. Returns the task id
    /// immediately.
    pub fn submit(
        &self,
        tool: Arc<Tool>,
        arguments: Value,
        ttl: u64,
        session: Option<Arc<Session>>,
        request_key: Option<String>,
    ) -> McpResult<String> {
        let task_id = Uuid::new_v4().simple().to_string();
        let task = Task {
            task_id: task_id.clone(),
            tool_name: tool.name.clone(),
            status: TaskStatus::Submitted,
            status_message: None,
            result: None,
            error: None,
            ttl,
            created_at: Utc::now().to_rfc3339(),
        };

        {
            let mut table = self.table.lock();
            if table.entries.len() >= self.capacity {
                evict_oldest_terminal(&mut table);
            }
            if table.entries.len() >= self.capacity {
                return Err(Error::internal("task table full"));
            }
            table.order.push_back(task_id.clone());
            table.entries.insert(
                task_id.clone(),
                TaskEntry {
                    task,
                    cancel_requested: Arc::new(AtomicBool::new(false)),
                    session: session.clone(),
                    request_key,
                },
            );
        }

        // Created notification carries the task id in the top-level _meta.
        if let Some(session) = &session {
            let created = json!({
                "jsonrpc": "2.0",
                "method": "notifications/tasks/created",
                "params": { "taskId": task_id },
                "_meta": { (meta::RELATED_TASK): { "taskId": task_id } },
            });
            if let Err(e) = session.send_raw(&created) {
                warn!(task = %task_id, error = %e, "created notification dropped");
            }
        }

        let registry = self.clone();
        let worker_id = task_id.clone();
        tokio::spawn(async move {
            registry.set_status(&worker_id, TaskStatus::Working, None);
            let context = TaskContext {
                task_id: worker_id.clone(),
                registry: registry.clone(),
            };
            let outcome = CURRENT_TASK
                .scope(context, tool.invoke_future(arguments))
                .await;
            match outcome {
                Ok(result) => registry.complete(&worker_id, result),
                Err(error) => registry.fail(&worker_id, error.to_string()),
            }
        });

        Ok(task_id)
    }

    /// Current lifecycle record for a task
    pub fn status(&self, task_id: &str) -> Option<Task> {
        self.table
            .lock()
            .entries
            .get(task_id)
            .map(|e| e.task.clone())
    }

    /// Result of a completed task
    pub fn result(&self, task_id: &str) -> McpResult<Value> {
        let table = self.table.lock();
        let entry = table
            .entries
            .get(task_id)
            .ok_or_else(|| Error::not_found(format!("task '{task_id}'")))?;
        match entry.task.status {
            TaskStatus::Completed => Ok(entry.task.result.clone().unwrap_or(Value::Null)),
            TaskStatus::Failed => Err(Error::internal(
                entry.task.error.clone().unwrap_or_else(|| "task failed".into()),
            )),
            status => Err(Error::validation(format!(
                "task '{task_id}' is not finished (status: {})",
                json!(status)
            ))),
        }
    }

    /// Request cooperative cancellation
    ///
    /// Terminal tasks ignore the request. The lifecycle state moves to
    /// `cancelled` immediately; since terminal states are sticky, a worker
    /// finishing afterwards has its result discarded.
    pub fn cancel(&self, task_id: &str, reason: Option<String>) -> Option<Task> {
        let notification = {
            let mut table = self.table.lock();
            let entry = table.entries.get_mut(task_id)?;
            if entry.task.status.is_terminal() {
                return Some(entry.task.clone());
            }
            entry.cancel_requested.store(true, Ordering::Relaxed);
            entry.task.status = TaskStatus::Cancelled;
            entry.task.status_message = reason;
            Some((entry.task.clone(), entry.session.clone()))
        }?;

        let (task, session) = notification;
        self.notify_status(&session, &task);
        Some(task)
    }

    /// Cancel the task spawned for a given request id, if any
    pub fn cancel_by_request(&self, request_key: &str, reason: Option<String>) {
        let task_id = {
            let table = self.table.lock();
            table
                .entries
                .values()
                .find(|e| e.request_key.as_deref() == Some(request_key))
                .map(|e| e.task.task_id.clone())
        };
        if let Some(task_id) = task_id {
            debug!(task = %task_id, request = %request_key, "cancelling task for cancelled request");
            self.cancel(&task_id, reason);
        }
    }

    /// Whether cancellation was requested for a task
    pub fn is_cancel_requested(&self, task_id: &str) -> bool {
        self.table
            .lock()
            .entries
            .get(task_id)
            .is_some_and(|e| e.cancel_requested.load(Ordering::Relaxed))
    }

    fn update_status_message(&self, task_id: &str, message: String) {
        let notification = {
            let mut table = self.table.lock();
            let Some(entry) = table.entries.get_mut(task_id) else {
                return;
            };
            if entry.task.status.is_terminal() {
                return;
            }
            entry.task.status_message = Some(message);
            (entry.task.clone(), entry.session.clone())
        };
        let (task, session) = notification;
        self.notify_status(&session, &task);
    }

    fn set_status(&self, task_id: &str, status: TaskStatus, message: Option<String>) {
        let notification = {
            let mut table = self.table.lock();
            let Some(entry) = table.entries.get_mut(task_id) else {
                return;
            };
            if entry.task.status.is_terminal() {
                return;
            }
            entry.task.status = status;
            if message.is_some() {
                entry.task.status_message = message;
            }
            (entry.task.clone(), entry.session.clone())
        };
        let (task, session) = notification;
        self.notify_status(&session, &task);
    }

    fn complete(&self, task_id: &str, result: Value) {
        let notification = {
            let mut table = self.table.lock();
            let Some(entry) = table.entries.get_mut(task_id) else {
                return;
            };
            if entry.task.status.is_terminal() {
                debug!(task = %task_id, "result for terminal task discarded");
                return;
            }
            entry.task.status = TaskStatus::Completed;
            entry.task.result = Some(result);
            (entry.task.clone(), entry.session.clone())
        };
        let (task, session) = notification;
        self.notify_status(&session, &task);
    }

    fn fail(&self, task_id: &str, error: String) {
        let notification = {
            let mut table = self.table.lock();
            let Some(entry) = table.entries.get_mut(task_id) else {
                return;
            };
            if entry.task.status.is_terminal() {
                return;
            }
            entry.task.status = TaskStatus::Failed;
            entry.task.error = Some(error);
            (entry.task.clone(), entry.session.clone())
        };
        let (task, session) = notification;
        self.notify_status(&session, &task);
    }

    fn notify_status(&self, session: &Option<Arc<Session>>, task: &Task) {
        let Some(session) = session else {
            return;
        };
        let mut params = Map::new();
        params.insert("taskId".into(), json!(task.task_id));
        params.insert("status".into(), json!(task.status));
        if let Some(message) = &task.status_message {
            params.insert("statusMessage".into(), json!(message));
        }
        if task.status == TaskStatus::Failed
            && let Some(error) = &task.error
        {
            params.insert("error".into(), json!(error));
        }
        if let Err(e) = session.send_notification("notifications/tasks/status", Value::Object(params))
        {
            warn!(task = %task.task_id, error = %e, "status notification dropped");
        }
    }

    /// Number of tracked tasks
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.table.lock().entries.is_empty()
    }
}

fn evict_oldest_terminal(table: &mut TaskTable) {
    let position = table.order.iter().position(|id| {
        table
            .entries
            .get(id)
            .is_some_and(|e| e.task.status.is_terminal())
    });
    if let Some(position) = position
        && let Some(id) = table.order.remove(position)
    {
        table.entries.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SendCallback;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn channel_session() -> (Arc<Session>, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: SendCallback = Arc::new(move |v: &Value| {
            tx.send(v.clone())
                .map_err(|_| Error::transport("receiver gone"))
        });
        (Arc::new(Session::new("task-session", callback)), rx)
    }

    async fn drain_until(
        rx: &mut mpsc::UnboundedReceiver<Value>,
        method: &str,
        predicate: impl Fn(&Value) -> bool,
    ) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("notification expected")
                .expect("channel open");
            if msg["method"] == json!(method) && predicate(&msg) {
                return msg;
            }
        }
    }

    #[tokio::test]
    async fn task_lifecycle_emits_created_working_completed() {
        let registry = TaskRegistry::new();
        let (session, mut rx) = channel_session();

        let tool = Arc::new(Tool::new_async("worker", json!({"type":"object"}), |input| async move {
            report_status_message("crunching");
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(json!({"echo": input}))
        }));

        let task_id = registry
            .submit(tool, json!({"n": 1}), 60_000, Some(Arc::clone(&session)), None)
            .unwrap();

        let created = drain_until(&mut rx, "notifications/tasks/created", |_| true).await;
        assert_eq!(
            created["_meta"][meta::RELATED_TASK]["taskId"],
            json!(task_id)
        );

        let with_message = drain_until(&mut rx, "notifications/tasks/status", |m| {
            m["params"]["statusMessage"] == json!("crunching")
        })
        .await;
        assert_eq!(with_message["params"]["taskId"], json!(task_id));

        drain_until(&mut rx, "notifications/tasks/status", |m| {
            m["params"]["status"] == json!("completed")
        })
        .await;

        let task = registry.status(&task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(registry.result(&task_id).unwrap(), json!({"echo": {"n": 1}}));
    }

    #[tokio::test]
    async fn failed_tools_set_error_and_notify() {
        let registry = TaskRegistry::new();
        let (session, mut rx) = channel_session();

        let tool = Arc::new(Tool::new("broken", json!({"type":"object"}), |_| {
            Err(Error::internal("exploded"))
        }));
        let task_id = registry
            .submit(tool, json!({}), 1000, Some(session), None)
            .unwrap();

        let failed = drain_until(&mut rx, "notifications/tasks/status", |m| {
            m["params"]["status"] == json!("failed")
        })
        .await;
        assert!(
            failed["params"]["error"]
                .as_str()
                .unwrap()
                .contains("exploded")
        );
        assert!(registry.result(&task_id).is_err());
    }

    #[tokio::test]
    async fn cancel_is_sticky_against_late_completion() {
        let registry = TaskRegistry::new();
        let tool = Arc::new(Tool::new_async("slow", json!({"type":"object"}), |_| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!("done"))
        }));
        let task_id = registry.submit(tool, json!({}), 1000, None, None).unwrap();

        let cancelled = registry.cancel(&task_id, Some("changed my mind".into())).unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);

        // Worker completes afterwards; the terminal state must not move.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(registry.status(&task_id).unwrap().status, TaskStatus::Cancelled);

        // Cancelling again is a no-op on a terminal task.
        let again = registry.cancel(&task_id, None).unwrap();
        assert_eq!(again.status, TaskStatus::Cancelled);
        assert_eq!(again.status_message, Some("changed my mind".into()));
    }

    #[tokio::test]
    async fn eviction_prefers_oldest_terminal_entries() {
        let registry = TaskRegistry::with_capacity(2);
        let quick = |name: &str| {
            Arc::new(Tool::new(name.to_string(), json!({"type":"object"}), |_| {
                Ok(json!("ok"))
            }))
        };

        let first = registry.submit(quick("a"), json!({}), 0, None, None).unwrap();
        let second = registry.submit(quick("b"), json!({}), 0, None, None).unwrap();
        // Let both workers finish so the entries are terminal.
        tokio::time::sleep(Duration::from_millis(30)).await;

        let third = registry.submit(quick("c"), json!({}), 0, None, None).unwrap();
        assert!(registry.status(&first).is_none());
        assert!(registry.status(&second).is_some());
        assert!(registry.status(&third).is_some());
    }

    #[test]
    fn report_outside_task_context_is_noop() {
        report_status_message("nobody listening");
        assert!(!cancellation_requested());
    }
}
