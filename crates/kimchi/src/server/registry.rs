//! Server Registry: deduplicates listeners by `(network, address)` and
//! starts them collectively.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::listener::Listener;
use crate::error::FatalError;

pub struct ServerRegistry {
    listeners: Mutex<HashMap<(String, String), Arc<Listener>>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        ServerRegistry {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the existing listener for `(network, address)`, or creates
    /// and registers a new one.
    pub fn add_listener(&self, network: &str, address: &str) -> Arc<Listener> {
        let key = (network.to_string(), address.to_string());
        let mut listeners = self.listeners.lock().unwrap();
        listeners
            .entry(key)
            .or_insert_with(|| Listener::new(network, address))
            .clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Starts every registered listener. Returns the first error
    /// encountered; listeners already started stay running.
    pub async fn start(&self) -> Result<(), FatalError> {
        let all: Vec<Arc<Listener>> = self.listeners.lock().unwrap().values().cloned().collect();
        for listener in all {
            listener.start().await?;
        }
        Ok(())
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_network_address_returns_same_listener() {
        let registry = ServerRegistry::new();
        let a = registry.add_listener("tcp", ":8080");
        let b = registry.add_listener("tcp", ":8080");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.listener_count(), 1);
    }

    #[test]
    fn distinct_addresses_get_distinct_listeners() {
        let registry = ServerRegistry::new();
        registry.add_listener("tcp", ":8080");
        registry.add_listener("tcp", ":9090");
        assert_eq!(registry.listener_count(), 2);
    }
}
