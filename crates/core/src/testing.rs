//! Test doubles for unit tests
//!
//! A minimal key-value stub without TTL bookkeeping; lease expiry and
//! blocking-stream behavior are exercised against the full in-memory adapter
//! in `flashmart-infra`'s integration suites.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use flashmart_domain::Result;

use crate::store_ports::KeyValueStore;

#[derive(Default)]
pub(crate) struct StubStore {
    data: Mutex<HashMap<String, String>>,
}

impl StubStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for StubStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, _ttl: Option<Duration>) -> Result<()> {
        self.data.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, _ttl: Duration) -> Result<bool> {
        let mut data = self.data.lock().unwrap();
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.data.lock().unwrap().remove(key).is_some())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut data = self.data.lock().unwrap();
        let next = data.get(key).and_then(|v| v.parse::<i64>().ok()).unwrap_or(0) + 1;
        data.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn expire(&self, key: &str, _ttl: Duration) -> Result<bool> {
        Ok(self.data.lock().unwrap().contains_key(key))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut data = self.data.lock().unwrap();
        if data.get(key).is_some_and(|current| current == expected) {
            data.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}
