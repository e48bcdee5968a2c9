//! Cliente tipado del store en tiempo real
//!
//! Este módulo define la interfaz sobre el servicio externo de
//! clave-valor con listeners ordenados por clave y semántica
//! last-write-wins. Sin lógica de negocio: solo lectura, escritura,
//! actualización condicional y suscripciones.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errores del store externo
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Evento de un listener de hijos: `value = None` significa hijo eliminado
#[derive(Debug, Clone)]
pub struct ChildEvent {
    pub key: String,
    pub value: Option<Value>,
}

/// Suscripción a una clave concreta
///
/// Entrega primero un snapshot inicial del valor actual y después un
/// evento por cada escritura confirmada, en el orden de commit. La
/// eliminación se entrega como `None`.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Option<Value>>,
}

impl Subscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Option<Value>>) -> Self {
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<Option<Value>> {
        self.rx.recv().await
    }

    /// Libera el listener; el lado emisor descarta el canal cerrado.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Suscripción a los hijos directos de una colección
pub struct ChildSubscription {
    rx: mpsc::UnboundedReceiver<ChildEvent>,
}

impl ChildSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<ChildEvent>) -> Self {
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<ChildEvent> {
        self.rx.recv().await
    }

    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Interfaz sobre el store en tiempo real
///
/// Garantías: entrega ordenada por clave a cada suscriptor; ninguna
/// garantía de orden entre claves distintas. `conditional_update` es la
/// primitiva de "claim" del protocolo de aceptación.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn read(&self, path: &str) -> Result<Option<Value>, StoreError>;

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Merge superficial de `changes` sobre el objeto en `path`
    async fn update(&self, path: &str, changes: Map<String, Value>) -> Result<(), StoreError>;

    /// Aplica `changes` atómicamente solo si cada campo de `expected`
    /// coincide con el valor actual (`Null` coincide con campo ausente;
    /// un registro ausente se trata como objeto vacío). Devuelve `false`
    /// en conflicto, sin mutar nada.
    async fn conditional_update(
        &self,
        path: &str,
        expected: Map<String, Value>,
        changes: Map<String, Value>,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError>;

    /// Listener de hijos directos de una colección; entrega primero un
    /// evento por cada hijo existente.
    async fn subscribe_children(&self, path: &str) -> Result<ChildSubscription, StoreError>;

    /// Hijos directos existentes de una colección
    async fn list_children(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Registra el borrado best-effort de `path` cuando este cliente se
    /// desconecte abruptamente del store.
    async fn on_disconnect_delete(&self, path: &str) -> Result<(), StoreError>;

    /// Clave única generada por el store para un hijo nuevo
    fn push_id(&self) -> String;
}
