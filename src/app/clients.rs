use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tracing::debug;

use crate::app::Result;
use crate::fetcher::{HttpClient, ReqwestClient};

type Constructor<K, C> = Box<dyn Fn(&K) -> Result<C> + Send + Sync>;

/// Lazily built clients keyed by the arguments they were built with.
/// One cache lives for one harvest run.
pub struct ClientCache<K, C> {
    clients: HashMap<K, C>,
    build: Constructor<K, C>,
}

impl<K, C> ClientCache<K, C>
where
    K: Eq + Hash + Clone,
    C: Clone,
{
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&K) -> Result<C> + Send + Sync + 'static,
    {
        Self {
            clients: HashMap::new(),
            build: Box::new(build),
        }
    }

    /// Returns the cached client for `key`, building it on first use.
    pub fn get(&mut self, key: &K) -> Result<C> {
        if let Some(client) = self.clients.get(key) {
            return Ok(client.clone());
        }
        let client = (self.build)(key)?;
        self.clients.insert(key.clone(), client.clone());
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Normalized construction arguments for an HTTP client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub user_agent: Option<String>,
    pub bearer_token: Option<String>,
}

impl ClientKey {
    pub fn new(user_agent: Option<&str>, bearer_token: Option<&str>) -> Self {
        let normalize = |s: Option<&str>| {
            s.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        Self {
            user_agent: normalize(user_agent),
            bearer_token: normalize(bearer_token),
        }
    }
}

pub type HttpClients = ClientCache<ClientKey, Arc<dyn HttpClient>>;

impl ClientCache<ClientKey, Arc<dyn HttpClient>> {
    /// Builds `reqwest` clients on demand.
    pub fn reqwest() -> Self {
        Self::new(|key: &ClientKey| {
            debug!(
                user_agent = key.user_agent.as_deref().unwrap_or("default"),
                authenticated = key.bearer_token.is_some(),
                "Building HTTP client"
            );
            let client =
                ReqwestClient::new(key.user_agent.as_deref(), key.bearer_token.as_deref())?;
            Ok(Arc::new(client) as Arc<dyn HttpClient>)
        })
    }

    /// Hands out the same client for every key.
    pub fn fixed(client: Arc<dyn HttpClient>) -> Self {
        Self::new(move |_: &ClientKey| Ok(Arc::clone(&client)))
    }

    /// Client for anonymous requests.
    pub fn default_client(&mut self) -> Result<Arc<dyn HttpClient>> {
        self.get(&ClientKey::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builds_once_per_key() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let mut cache: ClientCache<String, Arc<String>> = ClientCache::new(move |k: &String| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(format!("client for {}", k)))
        });

        let a1 = cache.get(&"a".to_string()).unwrap();
        let a2 = cache.get(&"a".to_string()).unwrap();
        let b = cache.get(&"b".to_string()).unwrap();

        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(*b, "client for b");
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failed_build_not_cached() {
        let mut cache: ClientCache<u8, u8> = ClientCache::new(|k: &u8| {
            if *k == 0 {
                Err(crate::app::WeirError::Other("nope".into()))
            } else {
                Ok(*k)
            }
        });
        assert!(cache.get(&0).is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.get(&3).unwrap(), 3);
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(
            ClientKey::new(Some("  "), Some(" tok ")),
            ClientKey {
                user_agent: None,
                bearer_token: Some("tok".into())
            }
        );
        assert_eq!(ClientKey::new(None, None), ClientKey::default());
    }
}
