//! Per-sequence scratchpad shared by every task in one [`super::Sequence`].

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

use super::Task;

/// String-keyed JSON bag threaded through a sequence of task handlers. A
/// fresh `Pipeline` is created per sequence and shared by every task it runs.
#[derive(Debug, Default)]
pub struct Pipeline {
    data: RwLock<HashMap<String, Value>>,
}

impl Pipeline {
    pub fn new() -> Pipeline {
        Pipeline {
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data
            .read()
            .expect("pipeline data lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.data
            .write()
            .expect("pipeline data lock poisoned")
            .insert(key.into(), value);
    }

    pub fn keys(&self) -> Vec<String> {
        self.data
            .read()
            .expect("pipeline data lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn data(&self) -> HashMap<String, Value> {
        self.data.read().expect("pipeline data lock poisoned").clone()
    }

    /// Logging scope for records emitted while executing `task`. The `log`
    /// crate has no per-call scoping of its own, so this returns the prefix
    /// handlers should fold into their own log lines, e.g.
    /// `log::info!("{}: done", pipeline.scope(&*task))`.
    pub fn scope(&self, task: &dyn Task) -> String {
        task.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let p = Pipeline::new();
        p.set("answer", Value::from(42));
        assert_eq!(p.get("answer"), Some(Value::from(42)));
        assert_eq!(p.get("missing"), None);
    }

    #[test]
    fn keys_reflects_inserted_entries() {
        let p = Pipeline::new();
        p.set("a", Value::from(1));
        p.set("b", Value::from(2));
        let mut keys = p.keys();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
