//! Key-value settings storage

use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;

/// String-keyed settings storage holding string values
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    fn get_string(&self, key: &str) -> Result<Option<String>>;
    /// Store `value` under `key`, replacing any previous value
    fn set_string(&self, key: &str, value: &str) -> Result<()>;
    /// Remove `key`. Removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process settings that vanish with the process
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemorySettings {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        (**self).get_string(key)
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_string(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}
