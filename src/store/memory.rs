//! Store en memoria para tests y desarrollo local
//!
//! Implementa la misma interfaz que el servicio real sobre un
//! `Arc<RwLock<HashMap>>`. La actualización condicional se resuelve
//! bajo el lock de escritura, con lo que el "claim" tiene semántica
//! real de a-lo-sumo-uno bajo llamadas concurrentes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::client::{ChildEvent, ChildSubscription, StoreClient, StoreError, Subscription};

#[derive(Default)]
struct Inner {
    data: HashMap<String, Value>,
    key_subs: HashMap<String, Vec<mpsc::UnboundedSender<Option<Value>>>>,
    child_subs: HashMap<String, Vec<mpsc::UnboundedSender<ChildEvent>>>,
    disconnect_paths: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook de test: borra las rutas registradas para limpieza
    /// on-disconnect, como haría el store al caerse la conexión.
    pub async fn simulate_disconnect(&self) {
        let paths: Vec<String> = {
            let inner = self.inner.read().await;
            inner.disconnect_paths.iter().cloned().collect()
        };
        for path in paths {
            let mut inner = self.inner.write().await;
            inner.data.remove(&path);
            notify(&mut inner, &path, None);
        }
    }
}

/// Notifica a los listeners de la clave y a los de la colección padre.
/// Los canales cuyo receptor se cerró se descartan aquí.
fn notify(inner: &mut Inner, path: &str, value: Option<Value>) {
    if let Some(senders) = inner.key_subs.get_mut(path) {
        senders.retain(|tx| tx.send(value.clone()).is_ok());
    }
    if let Some((parent, key)) = path.rsplit_once('/') {
        if let Some(senders) = inner.child_subs.get_mut(parent) {
            let event = ChildEvent {
                key: key.to_string(),
                value: value.clone(),
            };
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }
}

fn as_object(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

/// Merge superficial; un valor `Null` elimina el campo
fn merge(target: &mut Map<String, Value>, changes: Map<String, Value>) {
    for (key, value) in changes {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.data.get(path).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.data.insert(path.to_string(), value.clone());
        notify(&mut inner, path, Some(value));
        Ok(())
    }

    async fn update(&self, path: &str, changes: Map<String, Value>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let mut current = as_object(inner.data.get(path));
        merge(&mut current, changes);
        let value = Value::Object(current);
        inner.data.insert(path.to_string(), value.clone());
        notify(&mut inner, path, Some(value));
        Ok(())
    }

    async fn conditional_update(
        &self,
        path: &str,
        expected: Map<String, Value>,
        changes: Map<String, Value>,
    ) -> Result<bool, StoreError> {
        // Chequeo y aplicación bajo el mismo lock de escritura
        let mut inner = self.inner.write().await;
        let current = as_object(inner.data.get(path));

        for (key, expected_value) in &expected {
            let actual = current.get(key).unwrap_or(&Value::Null);
            if actual != expected_value {
                debug!(path, field = %key, "conditional_update en conflicto");
                return Ok(false);
            }
        }

        let mut updated = current;
        merge(&mut updated, changes);
        let value = Value::Object(updated);
        inner.data.insert(path.to_string(), value.clone());
        notify(&mut inner, path, Some(value));
        Ok(true)
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.data.remove(path);
        notify(&mut inner, path, None);
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.write().await;
        // Snapshot inicial antes de registrar el listener
        let _ = tx.send(inner.data.get(path).cloned());
        inner
            .key_subs
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(Subscription::new(rx))
    }

    async fn subscribe_children(&self, path: &str) -> Result<ChildSubscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.write().await;
        let prefix = format!("{}/", path);
        for (key, value) in inner.data.iter() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if !rest.contains('/') {
                    let _ = tx.send(ChildEvent {
                        key: rest.to_string(),
                        value: Some(value.clone()),
                    });
                }
            }
        }
        inner
            .child_subs
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(ChildSubscription::new(rx))
    }

    async fn list_children(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let inner = self.inner.read().await;
        let prefix = format!("{}/", path);
        let mut children = Vec::new();
        for (key, value) in inner.data.iter() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if !rest.contains('/') {
                    children.push((rest.to_string(), value.clone()));
                }
            }
        }
        children.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(children)
    }

    async fn on_disconnect_delete(&self, path: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.disconnect_paths.insert(path.to_string());
        Ok(())
    }

    fn push_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
