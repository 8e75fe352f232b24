//! Cached access to secrets held in the AWS SSM parameter store.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rusoto_core::{Region, RusotoError};
use rusoto_ssm::{
    GetParameterError, GetParameterRequest, GetParametersError, GetParametersRequest, Ssm,
    SsmClient,
};

/// Environment variables ending in this suffix hold an SSM parameter path.
pub const SSM_KEY_SUFFIX: &str = "__SSM_KEY";

#[cfg(any(test, feature = "test-util"))]
mod memory;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemorySecretStore;

// GetParameters rejects requests naming more parameters than this.
const MAX_PARAMETERS_PER_REQUEST: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("failed to get SSM parameter: {0}")]
    GetParameter(#[from] RusotoError<GetParameterError>),
    #[error("failed to get SSM parameters: {0}")]
    GetParameters(#[from] RusotoError<GetParametersError>),
    #[error("secret parameter {0} not found")]
    NotFound(String),
    #[error("secret parameter {0} has no value")]
    MissingValue(String),
    #[error("secret parameter {path} referenced by {variable} not found")]
    MissingParameter { variable: String, path: String },
}

/// A key-value secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches a single secret. A missing key is an error.
    async fn fetch_one(&self, key: &str) -> Result<String, SecretError>;

    /// Fetches several secrets at once. Missing keys are left out of the
    /// result.
    async fn fetch_many(&self, keys: &[String]) -> Result<HashMap<String, String>, SecretError>;
}

/// [`SecretStore`] backed by SSM, with decryption of secure strings.
pub struct SsmSecretStore {
    client: SsmClient,
}

impl SsmSecretStore {
    pub fn new(region: Region) -> Self {
        SsmSecretStore {
            client: SsmClient::new(region),
        }
    }
}

#[async_trait]
impl SecretStore for SsmSecretStore {
    async fn fetch_one(&self, key: &str) -> Result<String, SecretError> {
        let result = self
            .client
            .get_parameter(GetParameterRequest {
                name: key.to_string(),
                with_decryption: Some(true),
                ..GetParameterRequest::default()
            })
            .await?;
        result
            .parameter
            .and_then(|parameter| parameter.value)
            .ok_or_else(|| SecretError::MissingValue(key.to_string()))
    }

    async fn fetch_many(&self, keys: &[String]) -> Result<HashMap<String, String>, SecretError> {
        let mut found = HashMap::new();
        for names in keys.chunks(MAX_PARAMETERS_PER_REQUEST) {
            let result = self
                .client
                .get_parameters(GetParametersRequest {
                    names: names.to_vec(),
                    with_decryption: Some(true),
                    ..GetParametersRequest::default()
                })
                .await?;
            if let Some(invalid) = result.invalid_parameters.filter(|names| !names.is_empty()) {
                log::debug!("SSM parameters not found: {:?}", invalid);
            }
            for parameter in result.parameters.unwrap_or_default() {
                if let (Some(name), Some(value)) = (parameter.name, parameter.value) {
                    found.insert(name, value);
                }
            }
        }
        Ok(found)
    }
}

/// Memoizes secret lookups for the lifetime of the process.
///
/// Entries never expire. The map is only locked around reads and inserts,
/// never across a fetch, so two invocations missing the same key at once
/// both go to the store and the last write wins.
pub struct SecretCache<S> {
    store: S,
    entries: Mutex<HashMap<String, String>>,
}

impl<S: SecretStore> SecretCache<S> {
    pub fn new(store: S) -> Self {
        SecretCache {
            store,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the value stored under `key`.
    ///
    /// With `use_cache` set, a previously fetched value is returned without
    /// calling the store. Otherwise the store is always called. Either way a
    /// fetched value replaces whatever was cached.
    pub async fn get(&self, key: &str, use_cache: bool) -> Result<String, SecretError> {
        let cached = if use_cache {
            lock(&self.entries).get(key).cloned()
        } else {
            None
        };
        if let Some(value) = cached {
            return Ok(value);
        }
        log::debug!("fetching secret parameter {}", key);
        let value = self.store.fetch_one(key).await?;
        lock(&self.entries).insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Fetches every key from the store, ignoring the cache, and caches what
    /// was found. Keys the store does not know are absent from the result.
    pub async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, String>, SecretError> {
        log::debug!("fetching {} secret parameters", keys.len());
        let found = self.store.fetch_many(keys).await?;
        lock(&self.entries).extend(found.clone());
        Ok(found)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Picks out the variables ending in [`SSM_KEY_SUFFIX`], keyed by the
/// variable name with the suffix removed.
pub fn ssm_variable_paths(
    vars: impl IntoIterator<Item = (String, String)>,
) -> BTreeMap<String, String> {
    vars.into_iter()
        .filter_map(|(name, path)| {
            name.strip_suffix(SSM_KEY_SUFFIX)
                .map(|stripped| (stripped.to_string(), path))
        })
        .collect()
}

/// Resolves each name → SSM path entry to name → secret value with a single
/// bulk fetch.
pub async fn resolve_ssm_variables<S: SecretStore>(
    paths: &BTreeMap<String, String>,
    cache: &SecretCache<S>,
) -> Result<BTreeMap<String, String>, SecretError> {
    if paths.is_empty() {
        return Ok(BTreeMap::new());
    }
    let keys: Vec<String> = paths.values().cloned().collect();
    let values = cache.get_many(&keys).await?;
    paths
        .iter()
        .map(|(name, path)| match values.get(path) {
            Some(value) => Ok((name.clone(), value.clone())),
            None => Err(SecretError::MissingParameter {
                variable: format!("{}{}", name, SSM_KEY_SUFFIX),
                path: path.clone(),
            }),
        })
        .collect()
}

/// Writes resolved variables into the process environment.
///
/// Must run while no other thread can be reading the environment.
pub fn apply_ssm_variables(resolved: BTreeMap<String, String>) {
    for (name, value) in resolved {
        log::debug!("loaded {} from SSM", name);
        env::set_var(name, value);
    }
}

/// For every `FOO__SSM_KEY=/some/path` variable in the process environment,
/// sets `FOO` to the secret stored at `/some/path`.
///
/// Call once at cold start, before any task or thread that reads the
/// environment is spawned. The functions run on a current-thread runtime so
/// no worker threads exist yet.
pub async fn load_ssm_environment_variables<S: SecretStore>(
    cache: &SecretCache<S>,
) -> Result<(), SecretError> {
    let paths = ssm_variable_paths(env::vars());
    let resolved = resolve_ssm_variables(&paths, cache).await?;
    apply_ssm_variables(resolved);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters() -> MemorySecretStore {
        MemorySecretStore::new([("/path/to/foo", "something"), ("/path/to/bar", "another")])
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn caches_retrieved_value_by_default() {
        let cache = SecretCache::new(parameters());
        assert_eq!(cache.get("/path/to/foo", true).await.unwrap(), "something");
        assert_eq!(cache.get("/path/to/foo", true).await.unwrap(), "something");
        assert_eq!(cache.store().fetch_one_calls(), 1);
    }

    #[tokio::test]
    async fn can_force_fetch_for_cached_parameter() {
        let cache = SecretCache::new(parameters());
        assert_eq!(cache.get("/path/to/foo", true).await.unwrap(), "something");

        cache.store().insert("/path/to/foo", "rotated");
        assert_eq!(cache.get("/path/to/foo", true).await.unwrap(), "something");
        assert_eq!(cache.get("/path/to/foo", false).await.unwrap(), "rotated");
        assert_eq!(cache.get("/path/to/foo", true).await.unwrap(), "rotated");
        assert_eq!(cache.store().fetch_one_calls(), 2);
    }

    #[tokio::test]
    async fn missing_single_parameter_is_an_error() {
        let cache = SecretCache::new(parameters());
        let err = cache.get("/path/to/nothing", true).await.unwrap_err();
        assert!(matches!(err, SecretError::NotFound(ref key) if key == "/path/to/nothing"));
    }

    #[tokio::test]
    async fn get_many_always_fetches_and_populates_cache() {
        let cache = SecretCache::new(parameters());
        let keys = vec!["/path/to/foo".to_string(), "/path/to/missing".to_string()];

        let found = cache.get_many(&keys).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["/path/to/foo"], "something");

        cache.get_many(&keys).await.unwrap();
        assert_eq!(cache.store().fetch_many_calls(), 2);

        assert_eq!(cache.get("/path/to/foo", true).await.unwrap(), "something");
        assert_eq!(cache.store().fetch_one_calls(), 0);
    }

    #[test]
    fn picks_out_suffixed_variables() {
        let paths = ssm_variable_paths(vars(&[
            ("FOO__SSM_KEY", "/path/to/foo"),
            ("BAR__SSM_KEY", "/path/to/bar"),
            ("NOT_AN_SSM_KEY", "does not change"),
        ]));
        assert_eq!(paths.len(), 2);
        assert_eq!(paths["FOO"], "/path/to/foo");
        assert_eq!(paths["BAR"], "/path/to/bar");
    }

    #[tokio::test]
    async fn resolves_ssm_derived_variables() {
        let cache = SecretCache::new(parameters());
        let paths = ssm_variable_paths(vars(&[
            ("FOO__SSM_KEY", "/path/to/foo"),
            ("BAR__SSM_KEY", "/path/to/bar"),
            ("ALSO_FOO__SSM_KEY", "/path/to/foo"),
        ]));
        let resolved = resolve_ssm_variables(&paths, &cache).await.unwrap();
        assert_eq!(resolved["FOO"], "something");
        assert_eq!(resolved["ALSO_FOO"], "something");
        assert_eq!(resolved["BAR"], "another");
        assert_eq!(cache.store().fetch_many_calls(), 1);
    }

    #[tokio::test]
    async fn nothing_to_resolve_makes_no_calls() {
        let cache = SecretCache::new(parameters());
        let paths = ssm_variable_paths(vars(&[("NOT_AN_SSM_KEY", "value")]));
        assert!(resolve_ssm_variables(&paths, &cache).await.unwrap().is_empty());
        assert_eq!(cache.store().fetch_many_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_referenced_path_is_an_error() {
        let cache = SecretCache::new(parameters());
        let paths = ssm_variable_paths(vars(&[("GONE__SSM_KEY", "/path/to/gone")]));
        let err = resolve_ssm_variables(&paths, &cache).await.unwrap_err();
        assert!(matches!(
            err,
            SecretError::MissingParameter { ref variable, ref path }
                if variable == "GONE__SSM_KEY" && path == "/path/to/gone"
        ));
    }

    #[tokio::test]
    async fn loads_ssm_derived_environment_variables() {
        env::set_var("SSM_TEST_LOADED__SSM_KEY", "/path/to/bar");
        let cache = SecretCache::new(parameters());
        load_ssm_environment_variables(&cache).await.unwrap();
        assert_eq!(env::var("SSM_TEST_LOADED").unwrap(), "another");
        assert_eq!(env::var("SSM_TEST_LOADED__SSM_KEY").unwrap(), "/path/to/bar");
    }

    #[test]
    fn applies_resolved_variables_without_a_runtime() {
        let resolved = BTreeMap::from([(
            "SSM_TEST_APPLIED".to_string(),
            "applied value".to_string(),
        )]);
        apply_ssm_variables(resolved);
        assert_eq!(env::var("SSM_TEST_APPLIED").unwrap(), "applied value");
    }
}
