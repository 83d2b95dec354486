use std::sync::Arc;

use dashmap::DashMap;

use crate::config::BreakerConfig;
use crate::error::BreakerError;
use crate::state::CircuitBreaker;

/// Derives the registry key a request maps to (§4.4 "Keyed breakers": per
/// method, per host-authority, per host-and-method, or a caller-supplied
/// function).
pub trait BreakerKeyFn: Send + Sync {
    fn key(&self, method: &str, authority: &str) -> String;
}

impl<F> BreakerKeyFn for F
where
    F: Fn(&str, &str) -> String + Send + Sync,
{
    fn key(&self, method: &str, authority: &str) -> String {
        self(method, authority)
    }
}

/// Per-method keying: one breaker shared across all authorities for a method.
pub fn by_method(method: &str, _authority: &str) -> String {
    method.to_owned()
}

/// Per-authority keying: one breaker shared across all methods for a host.
pub fn by_authority(_method: &str, authority: &str) -> String {
    authority.to_owned()
}

/// Per-(method, authority) keying: the finest-grained built-in scheme.
pub fn by_method_and_authority(method: &str, authority: &str) -> String {
    format!("{method}@{authority}")
}

/// Lazily creates and caches one [`CircuitBreaker`] per key, using an
/// injected factory for cache misses (§4.4 "Keyed breakers").
pub struct BreakerRegistry<K, F> {
    key_fn: K,
    factory: F,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl<K, F> BreakerRegistry<K, F>
where
    K: BreakerKeyFn,
    F: Fn(&str) -> Result<BreakerConfig, String>,
{
    pub fn new(key_fn: K, factory: F) -> Self {
        Self {
            key_fn,
            factory,
            breakers: DashMap::new(),
        }
    }

    /// Returns the cached breaker for `(method, authority)`'s derived key, or
    /// runs the injected factory to create one. Propagates
    /// [`BreakerError::FactoryFailed`] if the factory rejects the key.
    pub fn get_or_create(&self, method: &str, authority: &str) -> Result<Arc<CircuitBreaker>, BreakerError> {
        let key = self.key_fn.key(method, authority);
        if let Some(existing) = self.breakers.get(&key) {
            return Ok(existing.clone());
        }
        let config = (self.factory)(method).map_err(|_| BreakerError::FactoryFailed(key.clone()))?;
        let breaker = self
            .breakers
            .entry(key.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(key, config)))
            .clone();
        Ok(breaker)
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_breaker_for_same_key() {
        let registry = BreakerRegistry::new(by_method_and_authority, |_| Ok(BreakerConfig::default()));
        let a = registry.get_or_create("GET /foo", "svc:443").unwrap();
        let b = registry.get_or_create("GET /foo", "svc:443").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        let c = registry.get_or_create("GET /bar", "svc:443").unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn factory_failure_is_reported_and_not_cached() {
        let registry = BreakerRegistry::new(by_method_and_authority, |method: &str| {
            if method == "GET /bad" {
                Err("no config for this method".to_owned())
            } else {
                Ok(BreakerConfig::default())
            }
        });

        let err = registry.get_or_create("GET /bad", "svc:443").unwrap_err();
        assert!(matches!(err, BreakerError::FactoryFailed(_)));
        assert_eq!(registry.len(), 0);

        assert!(registry.get_or_create("GET /ok", "svc:443").is_ok());
    }
}
