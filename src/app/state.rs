//! Shared application-wide state (spec §3, §5).
//!
//! Everything here is owned by the main thread. Panes, config and
//! `should_quit` are plain data the main screen mutates directly; the
//! `Arc`-wrapped fields are the process-wide resources background
//! workers also hold a handle to (spec §5's shared-resources list).

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::log::LogBuffer;
use crate::core::progress::ProgressManager;
use crate::core::task::{TaskEnv, TaskManager};
use crate::storage::Router;

/// Resources every task and background worker needs a handle to, plus the
/// bits that are exclusively the main thread's (spec §5: "the directory
/// cache [here, pane state] is main-thread only").
pub struct AppState {
    pub router: Arc<Router>,
    pub progress: Arc<ProgressManager>,
    pub log: Arc<LogBuffer>,
    pub tasks: TaskManager,
    pub config: AppConfig,
    pub should_quit: bool,
    /// Set when the user confirms a "jump" (cd-on-quit); printed to
    /// stdout after the alternate screen is torn down (spec §6).
    pub quit_to_dir: Option<String>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            router: Arc::new(Router::new()),
            progress: Arc::new(ProgressManager::new()),
            log: LogBuffer::new(config.log_capacity),
            tasks: TaskManager::new(),
            config,
            should_quit: false,
            quit_to_dir: None,
        }
    }

    pub fn task_env(&self) -> TaskEnv {
        TaskEnv {
            router: Arc::clone(&self.router),
            progress: Arc::clone(&self.progress),
            log: Arc::clone(&self.log),
        }
    }
}
