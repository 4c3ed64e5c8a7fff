//! Registry of long-running worker threads, shown in the dashboard task table.

use std::sync::{Arc, Mutex, PoisonError};

use naphome_types::TaskInfo;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Blocked,
    Finished,
}

impl TaskState {
    fn as_str(self) -> &'static str {
        match self {
            TaskState::Running => "Running",
            TaskState::Blocked => "Blocked",
            TaskState::Finished => "Finished",
        }
    }
}

#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<Vec<TaskInfo>>>,
}

impl TaskRegistry {
    /// A registry that already lists the main system task.
    pub fn new() -> Self {
        let registry = Self::default();
        registry.register("System", 1, 0);
        registry
    }

    /// Add or replace a task entry in the `Running` state.
    pub fn register(&self, name: &str, priority: u8, core_id: i32) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let info = TaskInfo {
            name: name.to_string(),
            state: TaskState::Running.as_str().to_string(),
            priority,
            stack_high_water: 0,
            core_id,
        };
        match tasks.iter_mut().find(|t| t.name == name) {
            Some(existing) => *existing = info,
            None => tasks.push(info),
        }
    }

    pub fn set_state(&self, name: &str, state: TaskState) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = tasks.iter_mut().find(|t| t.name == name) {
            task.state = state.as_str().to_string();
        }
    }

    pub fn snapshot(&self) -> Vec<TaskInfo> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
