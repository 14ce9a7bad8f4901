use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use super::TelemetryStore;

#[derive(Default)]
struct Table {
    entries: HashMap<String, String>,
    writes: u64,
}

/// In-process key/value store.
///
/// Clones share one table. `global()` returns the process-wide default
/// instance for wiring code that has no store of its own.
#[derive(Clone, Default)]
pub struct InMemoryTelemetryStore {
    table: Arc<Mutex<Table>>,
}

static GLOBAL: OnceLock<InMemoryTelemetryStore> = OnceLock::new();

impl InMemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static InMemoryTelemetryStore {
        GLOBAL.get_or_init(InMemoryTelemetryStore::new)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        let table = self.table.lock().ok()?;
        table.entries.get(key).cloned()
    }

    /// Total writes since creation, across all keys.
    pub fn write_count(&self) -> u64 {
        self.table.lock().map(|t| t.writes).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.table.lock().map(|t| t.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all entries, sorted by key.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = match self.table.lock() {
            Ok(table) => table
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Err(_) => Vec::new(),
        };
        entries.sort();
        entries
    }
}

impl TelemetryStore for InMemoryTelemetryStore {
    fn set_string(&self, key: &str, value: &str) {
        match self.table.lock() {
            Ok(mut table) => {
                table.entries.insert(key.to_string(), value.to_string());
                table.writes += 1;
            }
            Err(_) => log::warn!("telemetry table lock poisoned; dropped write to {}", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let store = InMemoryTelemetryStore::new();
        let other = store.clone();
        store.set_string("a", "1");
        other.set_string("b", "2");
        assert_eq!(
            store.snapshot(),
            vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn global_instance_is_shared() {
        InMemoryTelemetryStore::global().set_string("global-test-key", "x");
        assert_eq!(
            InMemoryTelemetryStore::global()
                .get_string("global-test-key")
                .as_deref(),
            Some("x")
        );
    }
}
