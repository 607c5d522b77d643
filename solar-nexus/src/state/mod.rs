//! Key-value application state with per-key change notification.
//!
//! Values are arbitrary JSON. Keys on [`PERSISTED_KEYS`] are mirrored to
//! durable storage under [`STORAGE_NAMESPACE`] and rehydrated when the store
//! is constructed, before anything else can read it.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::events::panic_message;
use crate::storage::Storage;

/// Prefix for every durable-storage key.
pub const STORAGE_NAMESPACE: &str = "solar_";

/// The only keys mirrored to durable storage.
pub const PERSISTED_KEYS: [&str; 3] = ["calculator", "user", "preferences"];

/// Durable-storage key for a state key.
pub fn storage_key(key: &str) -> String {
    format!("{STORAGE_NAMESPACE}{key}")
}

pub fn is_persisted(key: &str) -> bool {
    PERSISTED_KEYS.contains(&key)
}

/// Subscriber callback: `(new value, previous value, key)`. A deleted key
/// reports `None` as its new value.
type Subscriber = Arc<dyn Fn(Option<&Value>, Option<&Value>, &str) -> anyhow::Result<()> + Send + Sync>;

struct SubscriberEntry {
    id: u64,
    callback: Subscriber,
}

#[derive(Default)]
struct StoreInner {
    values: HashMap<String, Value>,
    subscribers: HashMap<String, Vec<SubscriberEntry>>,
    next_id: u64,
}

/// Shared state store. Clones share the same values and subscribers.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Mutex<StoreInner>>,
    storage: Arc<dyn Storage>,
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        let mut keys: Vec<_> = inner.values.keys().collect();
        keys.sort();
        f.debug_struct("StateStore").field("keys", &keys).finish()
    }
}

impl StateStore {
    /// Build a store over `storage`, rehydrating persisted keys. Unreadable
    /// or malformed entries are logged and skipped.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let mut values = HashMap::new();
        for key in PERSISTED_KEYS {
            let raw = match storage.get_item(&storage_key(key)) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(source) => {
                    let error = crate::Error::Persistence {
                        key: key.to_string(),
                        source,
                    };
                    tracing::warn!(%error, "skipping persisted state");
                    continue;
                }
            };
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => {
                    tracing::debug!(key, "rehydrated persisted state");
                    values.insert(key.to_string(), value);
                }
                Err(error) => tracing::warn!(key, %error, "persisted state is not valid JSON"),
            }
        }

        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                values,
                ..StoreInner::default()
            })),
            storage,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().values.get(key).cloned()
    }

    /// Value for `key`, or `default` when it is unset.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Typed read. `None` when unset or when the value does not fit `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(error) => {
                tracing::debug!(key, %error, "state value has unexpected shape");
                None
            }
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.lock().values.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.lock().values.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Store `value` under `key`, persist it if allow-listed, and notify the
    /// key's subscribers before returning.
    pub fn set(&self, key: &str, value: Value) -> Value {
        let previous = self.lock().values.insert(key.to_string(), value.clone());
        if is_persisted(key) {
            self.persist(key, &value);
        }
        self.notify(key, Some(&value), previous.as_ref());
        value
    }

    /// Shallow-merge `partial` into the object at `key`. A missing or
    /// non-object value is treated as an empty object.
    pub fn update(&self, key: &str, partial: Map<String, Value>) -> Value {
        let mut merged = match self.get(key) {
            Some(Value::Object(existing)) => existing,
            _ => Map::new(),
        };
        merged.extend(partial);
        self.set(key, Value::Object(merged))
    }

    /// Remove `key` from memory and durable storage.
    pub fn delete(&self, key: &str) -> bool {
        let previous = self.lock().values.remove(key);
        if is_persisted(key) {
            if let Err(source) = self.storage.remove_item(&storage_key(key)) {
                let error = crate::Error::Persistence {
                    key: key.to_string(),
                    source,
                };
                tracing::warn!(%error, "failed to remove persisted state");
            }
        }
        self.notify(key, None, previous.as_ref());
        true
    }

    /// Subscribe to changes of `key`.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> Subscription
    where
        F: Fn(Option<&Value>, Option<&Value>, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .subscribers
            .entry(key.to_string())
            .or_default()
            .push(SubscriberEntry {
                id,
                callback: Arc::new(callback),
            });
        Subscription {
            key: key.to_string(),
            id,
            store: self.clone(),
        }
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.lock().subscribers.get(key).map_or(0, Vec::len)
    }

    fn persist(&self, key: &str, value: &Value) {
        let result = serde_json::to_string(value)
            .map_err(|source| crate::storage::StorageError::Format { source })
            .and_then(|raw| self.storage.set_item(&storage_key(key), &raw));
        if let Err(source) = result {
            let error = crate::Error::Persistence {
                key: key.to_string(),
                source,
            };
            tracing::warn!(%error, "failed to persist state");
        }
    }

    fn notify(&self, key: &str, value: Option<&Value>, previous: Option<&Value>) {
        let callbacks: Vec<Subscriber> = self
            .lock()
            .subscribers
            .get(key)
            .map(|list| list.iter().map(|s| Arc::clone(&s.callback)).collect())
            .unwrap_or_default();

        for callback in callbacks {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(value, previous, key)));
            let reason = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{err:#}"),
                Err(payload) => panic_message(payload.as_ref()),
            };
            let error = crate::Error::Listener {
                event: format!("state:{key}"),
                reason,
            };
            tracing::warn!(%error, "state subscriber failed");
        }
    }
}

/// Handle returned by [`StateStore::subscribe`].
pub struct Subscription {
    key: String,
    id: u64,
    store: StateStore,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stop receiving notifications.
    pub fn unsubscribe(self) {
        let mut inner = self.store.lock();
        if let Some(list) = inner.subscribers.get_mut(&self.key) {
            list.retain(|entry| entry.id != self.id);
        }
    }
}
