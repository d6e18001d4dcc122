use std::collections::HashMap;
use std::sync::RwLock;

/// Last value seen per `(repository, operation)`.
pub trait PollState: Send + Sync {
    /// Records `value` and reports whether it differs from the previous one.
    fn is_new(&self, full_name: &str, operation: &str, value: &str) -> bool;

    /// Forgets `value` so the next poll reports it again.
    fn invalidate(&self, full_name: &str, operation: &str, value: &str);
}

#[derive(Debug, Default)]
pub struct MemoryPollState {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryPollState {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(full_name: &str, operation: &str) -> String {
        format!("{full_name}/{operation}")
    }
}

impl PollState for MemoryPollState {
    fn is_new(&self, full_name: &str, operation: &str, value: &str) -> bool {
        let key = Self::key(full_name, operation);
        let mut values = self
            .values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if values.get(&key).is_some_and(|previous| previous == value) {
            return false;
        }
        values.insert(key, value.to_string());
        true
    }

    fn invalidate(&self, full_name: &str, operation: &str, value: &str) {
        let key = Self::key(full_name, operation);
        let mut values = self
            .values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if values.get(&key).is_some_and(|previous| previous == value) {
            values.remove(&key);
        }
    }
}
