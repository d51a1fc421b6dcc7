//! Lazily-built, process-wide session cache

use crate::provider::providers_key;
use crate::session::{InferenceSession, SessionFactory, SessionOptions};
use crate::{InferenceError, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Model name -> local model file
pub type ModelSources = BTreeMap<String, PathBuf>;

/// Model name -> loaded session
pub type SessionMap = HashMap<String, Arc<dyn InferenceSession>>;

/// Session cache keyed by `{context}.{model names}.{providers}`.
///
/// Sessions are created on first request and live until cleared.
pub struct InferencePool {
    factory: Arc<dyn SessionFactory>,
    pools: Mutex<HashMap<String, SessionMap>>,
}

fn pool_prefix<'a>(context: &str, model_names: impl IntoIterator<Item = &'a String>) -> String {
    let names: Vec<&str> = model_names.into_iter().map(String::as_str).collect();
    format!("{}.{}.", context, names.join("."))
}

impl InferencePool {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Sessions for every model of `sources`, building the missing ones
    pub fn get(
        &self,
        context: &str,
        sources: &ModelSources,
        options: &SessionOptions,
    ) -> Result<SessionMap> {
        let key = pool_prefix(context, sources.keys())
            + &providers_key(&options.execution_providers);

        let mut pools = self.pools.lock().map_err(|_| InferenceError::PoisonedLock)?;
        if let Some(sessions) = pools.get(&key) {
            return Ok(sessions.clone());
        }

        info!("Creating inference pool {}", key);
        let mut sessions = SessionMap::with_capacity(sources.len());
        for (model_name, model_path) in sources {
            let session = self.factory.create(model_path, options)?;
            sessions.insert(model_name.clone(), session);
        }
        pools.insert(key, sessions.clone());
        Ok(sessions)
    }

    /// Drop the sessions of `model_names` within `context` for every provider selection
    pub fn clear(&self, context: &str, model_names: &[String]) {
        let prefix = pool_prefix(context, model_names);
        if let Ok(mut pools) = self.pools.lock() {
            let before = pools.len();
            pools.retain(|key, _| !key.starts_with(&prefix));
            debug!("Cleared {} inference pool(s) for {}", before - pools.len(), context);
        }
    }

    /// Number of cached pools
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.lock().map(|pools| pools.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ExecutionProvider;
    use ndarray::ArrayD;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoSession;

    impl InferenceSession for EchoSession {
        fn run(&self, _input_name: &str, input: ArrayD<f32>) -> Result<Vec<ArrayD<f32>>> {
            Ok(vec![input])
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
    }

    impl SessionFactory for CountingFactory {
        fn create(
            &self,
            _model_path: &Path,
            _options: &SessionOptions,
        ) -> Result<Arc<dyn InferenceSession>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EchoSession))
        }
    }

    fn sources() -> ModelSources {
        ModelSources::from([
            ("nsfw_1".to_string(), PathBuf::from("nsfw_1.onnx")),
            ("nsfw_2".to_string(), PathBuf::from("nsfw_2.onnx")),
        ])
    }

    #[test]
    fn test_sessions_are_built_once() {
        let factory = Arc::new(CountingFactory::default());
        let pool = InferencePool::new(factory.clone());
        let options = SessionOptions::default();

        let first = pool.get("content_analyser", &sources(), &options).unwrap();
        let second = pool.get("content_analyser", &sources(), &options).unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert!(Arc::ptr_eq(&first["nsfw_1"], &second["nsfw_1"]));
    }

    #[test]
    fn test_provider_change_builds_new_pool_and_clear_drops_all() {
        let factory = Arc::new(CountingFactory::default());
        let pool = InferencePool::new(factory.clone());

        let cpu = SessionOptions::default();
        let cuda = SessionOptions {
            execution_providers: vec![ExecutionProvider::Cuda],
            ..SessionOptions::default()
        };
        pool.get("content_analyser", &sources(), &cpu).unwrap();
        pool.get("content_analyser", &sources(), &cuda).unwrap();
        pool.get("other", &sources(), &cpu).unwrap();
        assert_eq!(pool.len(), 3);

        let names: Vec<String> = sources().into_keys().collect();
        pool.clear("content_analyser", &names);
        assert_eq!(pool.len(), 1);

        pool.get("content_analyser", &sources(), &cpu).unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn test_factory_error_propagates() {
        let pool = InferencePool::new(Arc::new(crate::OrtSessionFactory));
        let result = pool.get("content_analyser", &sources(), &SessionOptions::default());
        assert!(matches!(result, Err(InferenceError::ModelNotFound(_))));
        assert!(pool.is_empty());
    }
}
