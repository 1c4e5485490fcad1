#![forbid(unsafe_code)]

use super::{new_by_type, Provider};
use crate::error::ServiceError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Process-wide mapping from thread id to its bound provider strategy.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<i64, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
        }
    }

    pub fn create(
        &self,
        thread_id: i64,
        provider_type: &str,
    ) -> Result<Arc<dyn Provider>, ServiceError> {
        let provider = new_by_type(provider_type)?;
        if let Ok(mut guard) = self.providers.write() {
            guard.insert(thread_id, Arc::clone(&provider));
        }
        Ok(provider)
    }

    pub fn get(&self, thread_id: i64) -> Option<Arc<dyn Provider>> {
        self.providers
            .read()
            .ok()
            .and_then(|guard| guard.get(&thread_id).cloned())
    }

    pub fn remove(&self, thread_id: i64) {
        if let Ok(mut guard) = self.providers.write() {
            guard.remove(&thread_id);
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.providers.read().map(|guard| guard.len()).unwrap_or(0);
        f.debug_struct("ProviderRegistry")
            .field("registered", &count)
            .finish()
    }
}
