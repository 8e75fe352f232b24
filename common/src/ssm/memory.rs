use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{lock, SecretError, SecretStore};

/// In-memory [`SecretStore`] that counts how often it is asked for values.
#[derive(Default)]
pub struct MemorySecretStore {
    parameters: Mutex<HashMap<String, String>>,
    fetch_one_calls: AtomicUsize,
    fetch_many_calls: AtomicUsize,
}

impl MemorySecretStore {
    pub fn new<K, V>(parameters: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        MemorySecretStore {
            parameters: Mutex::new(
                parameters
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            ..MemorySecretStore::default()
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        lock(&self.parameters).insert(key.into(), value.into());
    }

    pub fn fetch_one_calls(&self) -> usize {
        self.fetch_one_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_many_calls(&self) -> usize {
        self.fetch_many_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn fetch_one(&self, key: &str) -> Result<String, SecretError> {
        self.fetch_one_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.parameters)
            .get(key)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(key.to_string()))
    }

    async fn fetch_many(&self, keys: &[String]) -> Result<HashMap<String, String>, SecretError> {
        self.fetch_many_calls.fetch_add(1, Ordering::SeqCst);
        let parameters = lock(&self.parameters);
        Ok(keys
            .iter()
            .filter_map(|key| parameters.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }
}
