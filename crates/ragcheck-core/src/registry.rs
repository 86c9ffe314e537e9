//! Runner registry.
//!
//! Caches one runner per agent id. The registry is a value owned by the
//! service, not process-global state; lookups that miss build the runner
//! through the injected [`RunnerFactory`] while holding the registry lock, so
//! concurrent first requests for the same agent create it exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::runner::{Runner, RunnerError, RunnerFactory};

pub struct RunnerRegistry {
    factory: Option<Arc<dyn RunnerFactory>>,
    runners: Mutex<HashMap<String, Arc<dyn Runner>>>,
}

impl RunnerRegistry {
    /// Registry that builds missing runners with `factory`.
    pub fn new(factory: Arc<dyn RunnerFactory>) -> Self {
        Self {
            factory: Some(factory),
            runners: Mutex::new(HashMap::new()),
        }
    }

    /// Registry that only serves runners added with [`RunnerRegistry::insert`].
    pub fn fixed() -> Self {
        Self {
            factory: None,
            runners: Mutex::new(HashMap::new()),
        }
    }

    /// Register `runner` for `agent_id`, replacing any cached instance.
    pub async fn insert(&self, agent_id: impl Into<String>, runner: Arc<dyn Runner>) {
        self.runners.lock().await.insert(agent_id.into(), runner);
    }

    /// Return the cached runner for `agent_id`, creating it on first use.
    pub async fn get_or_create(&self, agent_id: &str) -> Result<Arc<dyn Runner>, RunnerError> {
        let mut runners = self.runners.lock().await;
        if let Some(runner) = runners.get(agent_id) {
            debug!(agent_id, "runner cache hit");
            return Ok(Arc::clone(runner));
        }

        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| RunnerError::Unavailable(format!("no runner registered for {agent_id}")))?;
        let runner = factory.create(agent_id).await?;
        runners.insert(agent_id.to_string(), Arc::clone(&runner));
        info!(agent_id, "runner created");
        Ok(runner)
    }

    /// Drop the cached runner for `agent_id`. Returns whether one was cached.
    pub async fn evict(&self, agent_id: &str) -> bool {
        self.runners.lock().await.remove(agent_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.runners.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runners.lock().await.is_empty()
    }
}
