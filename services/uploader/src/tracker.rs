//! Upload session state shared between concurrent transfers and the UI.
//!
//! All mutations go through one mutex-guarded [`SessionState`], and every
//! mutation publishes a fresh [`SessionSnapshot`] on a watch channel, so
//! readers only ever observe whole updates. The auto-hide timer is a single
//! abortable task owned by the session; scheduling a new one aborts the old.

use crate::progress::IN_FLIGHT_CAP;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use upload_protocol::TransferDescriptor;

/// Lifecycle of one file's transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Uploading,
    Done,
    Error,
}

impl TaskStatus {
    /// Done and error are final until the task is registered again
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error)
    }
}

/// One file in the session, identified by its object key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTask {
    pub id: String,
    pub display_name: String,
    pub progress_percent: u8,
    pub status: TaskStatus,
}

/// Consistent view of the session at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub tasks: Vec<UploadTask>,
    pub visible: bool,
}

impl SessionSnapshot {
    pub fn task(&self, id: &str) -> Option<&UploadTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// At least one task, and every task done
    pub fn all_done(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.status == TaskStatus::Done)
    }

    /// Every task done or failed
    pub fn all_settled(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }
}

struct SessionState {
    tasks: Vec<UploadTask>,
    visible: bool,
    hide_timer: Option<AbortHandle>,
    // Bumped on every schedule so a timer that lost the race to an abort
    // can tell it is stale
    timer_generation: u64,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            tasks: self.tasks.clone(),
            visible: self.visible,
        }
    }

    fn task_mut(&mut self, id: &str) -> Option<&mut UploadTask> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    fn all_done(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.status == TaskStatus::Done)
    }

    fn cancel_hide_timer(&mut self) {
        if let Some(timer) = self.hide_timer.take() {
            timer.abort();
            debug!("Cancelled pending auto-hide");
        }
    }

    fn hide(&mut self) {
        self.cancel_hide_timer();
        self.visible = false;
        self.tasks.retain(|t| t.status != TaskStatus::Done);
    }
}

struct Shared {
    state: Mutex<SessionState>,
    events: watch::Sender<SessionSnapshot>,
    auto_hide_delay: Duration,
}

impl Shared {
    fn publish(&self, state: &SessionState) {
        self.events.send_replace(state.snapshot());
    }

    fn fire_auto_hide(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.timer_generation != generation || state.hide_timer.is_none() {
            return;
        }
        state.hide_timer = None;
        state.hide();
        debug!("Session auto-hidden");
        self.publish(&state);
    }
}

/// Mutable state of all transfers in one upload session
#[derive(Clone)]
pub struct SessionTracker {
    shared: Arc<Shared>,
}

impl SessionTracker {
    pub fn new(auto_hide_delay: Duration) -> Self {
        let (events, _) = watch::channel(SessionSnapshot {
            tasks: Vec::new(),
            visible: true,
        });

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState {
                    tasks: Vec::new(),
                    visible: true,
                    hide_timer: None,
                    timer_generation: 0,
                }),
                events,
                auto_hide_delay,
            }),
        }
    }

    /// Add a pending task for a descriptor, or reset the existing task with
    /// the same key. A new task reopens a hidden session.
    pub fn register(&self, descriptor: &TransferDescriptor) {
        let task = UploadTask {
            id: descriptor.key().to_string(),
            display_name: descriptor.display_name().to_string(),
            progress_percent: 0,
            status: TaskStatus::Pending,
        };

        let mut state = self.shared.state.lock();
        match state.task_mut(&task.id) {
            Some(existing) => *existing = task,
            None => state.tasks.push(task),
        }
        state.visible = true;
        self.reschedule_auto_hide(&mut state);
        self.shared.publish(&state);
    }

    /// Raise a task's progress. Values never decrease, stay below 100 until
    /// the task is done, and are ignored for unknown or finished tasks.
    pub fn update_progress(&self, id: &str, percent: u8) {
        let mut state = self.shared.state.lock();
        let Some(task) = state.task_mut(id) else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }

        let percent = percent.min(IN_FLIGHT_CAP);
        if percent <= task.progress_percent {
            return;
        }
        task.progress_percent = percent;
        self.shared.publish(&state);
    }

    /// Move a task to a new status; unknown ids and finished tasks are ignored
    pub fn update_status(&self, id: &str, status: TaskStatus) {
        let mut state = self.shared.state.lock();
        let visible = state.visible;
        let Some(task) = state.task_mut(id) else {
            return;
        };
        if task.status.is_terminal() || task.status == status {
            return;
        }

        task.status = status;
        if status == TaskStatus::Done {
            task.progress_percent = 100;
            if !visible {
                state.tasks.retain(|t| t.id != id);
            }
        }

        self.reschedule_auto_hide(&mut state);
        self.shared.publish(&state);
    }

    /// Hide the session and drop every finished task
    pub fn hide(&self) {
        let mut state = self.shared.state.lock();
        state.hide();
        self.shared.publish(&state);
    }

    pub fn show(&self) {
        let mut state = self.shared.state.lock();
        if state.visible {
            return;
        }
        state.visible = true;
        self.reschedule_auto_hide(&mut state);
        self.shared.publish(&state);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.state.lock().snapshot()
    }

    /// Receive a snapshot after every change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.events.subscribe()
    }

    fn reschedule_auto_hide(&self, state: &mut SessionState) {
        state.cancel_hide_timer();

        if !state.visible || !state.all_done() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, auto-hide not scheduled");
            return;
        };

        state.timer_generation += 1;
        let generation = state.timer_generation;
        let delay = self.shared.auto_hide_delay;
        // The delay runs from scheduling, not from when the timer task is first polled
        let deadline = Instant::now() + delay;
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);

        let timer = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(shared) = shared.upgrade() {
                shared.fire_auto_hide(generation);
            }
        });

        debug!(delay_ms = delay.as_millis() as u64, "Scheduled auto-hide");
        state.hide_timer = Some(timer.abort_handle());
    }
}
