use std::sync::Mutex;

use tracing::debug;

/// Redirect surface used after login and logout.
pub trait Navigator: Send + Sync {
    /// Navigate to `path`, keeping the current location in history.
    /// Pushing the current location again is a no-op.
    fn push(&self, path: &str);
    /// Navigate to `path`, replacing the current location
    fn replace(&self, path: &str);
}

/// Tracks the current route and the history leading to it.
#[derive(Debug)]
pub struct RouteHistory {
    stack: Mutex<Vec<String>>,
}

impl RouteHistory {
    pub fn new(initial: &str) -> Self {
        Self {
            stack: Mutex::new(vec![initial.to_string()]),
        }
    }

    fn stack(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.stack.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> String {
        self.stack().last().cloned().unwrap_or_default()
    }

    pub fn history(&self) -> Vec<String> {
        self.stack().clone()
    }
}

impl Default for RouteHistory {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for RouteHistory {
    fn push(&self, path: &str) {
        let mut stack = self.stack();
        if stack.last().map(String::as_str) == Some(path) {
            return;
        }
        debug!(path, "navigate push");
        stack.push(path.to_string());
    }

    fn replace(&self, path: &str) {
        debug!(path, "navigate replace");
        let mut stack = self.stack();
        stack.pop();
        stack.push(path.to_string());
    }
}
