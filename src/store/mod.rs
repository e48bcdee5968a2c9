//! Capa de acceso al store en tiempo real
//!
//! `BookingStore` envuelve el cliente crudo con accesores tipados sobre el
//! schema lógico (`bookings/`, `driver_offers/`, `loyalty_accounts/`,
//! `history/`, `ratings/`). Solo fontanería: las reglas del ciclo de vida
//! viven en los servicios.

pub mod client;
pub mod memory;
pub mod paths;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

pub use client::{ChildEvent, ChildSubscription, StoreClient, StoreError, Subscription};
pub use memory::MemoryStore;

use crate::models::{BookingRecord, DriverOffer, LoyaltyAccount, Rating};

/// Snapshot tipado de un booking observado por suscripción
#[derive(Debug)]
pub enum BookingSnapshot {
    /// El registro no existe (aún no creado, o eliminado)
    Absent,
    Record(Box<BookingRecord>),
    /// El valor existe pero no decodifica como BookingRecord
    Malformed(String),
}

/// Suscripción tipada a un booking concreto
pub struct BookingSubscription {
    inner: Subscription,
}

impl BookingSubscription {
    pub async fn next(&mut self) -> Option<BookingSnapshot> {
        let value = self.inner.next().await?;
        Some(match value {
            None => BookingSnapshot::Absent,
            Some(raw) => match serde_json::from_value::<BookingRecord>(raw) {
                Ok(record) => BookingSnapshot::Record(Box::new(record)),
                Err(e) => BookingSnapshot::Malformed(e.to_string()),
            },
        })
    }

    pub fn close(&mut self) {
        self.inner.close();
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Accesores tipados sobre el schema del store
#[derive(Clone)]
pub struct BookingStore {
    client: Arc<dyn StoreClient>,
}

impl BookingStore {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    pub fn push_id(&self) -> String {
        self.client.push_id()
    }

    // --- bookings ---

    pub async fn read_booking(&self, booking_id: &str) -> Result<Option<BookingRecord>, StoreError> {
        match self.client.read(&paths::booking(booking_id)).await? {
            Some(value) => Ok(Some(decode(value)?)),
            None => Ok(None),
        }
    }

    pub async fn require_booking(&self, booking_id: &str) -> Result<BookingRecord, StoreError> {
        self.read_booking(booking_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(paths::booking(booking_id)))
    }

    pub async fn write_booking(&self, record: &BookingRecord) -> Result<(), StoreError> {
        self.client
            .write(&paths::booking(&record.booking_id), encode(record)?)
            .await
    }

    pub async fn update_booking(
        &self,
        booking_id: &str,
        changes: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.client.update(&paths::booking(booking_id), changes).await
    }

    /// Primitiva de claim/transición condicional sobre el registro
    pub async fn conditional_update_booking(
        &self,
        booking_id: &str,
        expected: Map<String, Value>,
        changes: Map<String, Value>,
    ) -> Result<bool, StoreError> {
        self.client
            .conditional_update(&paths::booking(booking_id), expected, changes)
            .await
    }

    pub async fn subscribe_booking(
        &self,
        booking_id: &str,
    ) -> Result<BookingSubscription, StoreError> {
        let inner = self.client.subscribe(&paths::booking(booking_id)).await?;
        Ok(BookingSubscription { inner })
    }

    pub async fn subscribe_new_bookings(&self) -> Result<ChildSubscription, StoreError> {
        self.client.subscribe_children(paths::BOOKINGS).await
    }

    // --- índice "un viaje activo por rider" ---

    /// Crea la entrada del índice solo si no existe ya (carrera de doble
    /// creación resuelta en el store, no en el cliente)
    pub async fn claim_rider_active(
        &self,
        rider_id: &str,
        booking_id: &str,
    ) -> Result<bool, StoreError> {
        let mut expected = Map::new();
        expected.insert("booking_id".into(), Value::Null);
        let mut changes = Map::new();
        changes.insert("booking_id".into(), Value::String(booking_id.to_string()));
        self.client
            .conditional_update(&paths::rider_active(rider_id), expected, changes)
            .await
    }

    pub async fn read_rider_active(&self, rider_id: &str) -> Result<Option<String>, StoreError> {
        let value = self.client.read(&paths::rider_active(rider_id)).await?;
        Ok(value
            .and_then(|v| v.get("booking_id").cloned())
            .and_then(|v| v.as_str().map(|s| s.to_string())))
    }

    pub async fn clear_rider_active(&self, rider_id: &str) -> Result<(), StoreError> {
        self.client.delete(&paths::rider_active(rider_id)).await
    }

    // --- ofertas ---

    pub async fn write_offer(&self, offer: &DriverOffer) -> Result<(), StoreError> {
        self.client
            .write(
                &paths::driver_offer(&offer.driver_id, &offer.booking_id),
                encode(offer)?,
            )
            .await
    }

    pub async fn read_offer(
        &self,
        driver_id: &str,
        booking_id: &str,
    ) -> Result<Option<DriverOffer>, StoreError> {
        match self
            .client
            .read(&paths::driver_offer(driver_id, booking_id))
            .await?
        {
            Some(value) => Ok(Some(decode(value)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_offer(&self, driver_id: &str, booking_id: &str) -> Result<(), StoreError> {
        self.client
            .delete(&paths::driver_offer(driver_id, booking_id))
            .await
    }

    pub async fn subscribe_offers(&self, driver_id: &str) -> Result<ChildSubscription, StoreError> {
        self.client
            .subscribe_children(&paths::driver_offers(driver_id))
            .await
    }

    // --- fidelización ---

    pub async fn read_loyalty(&self, rider_id: &str) -> Result<Option<LoyaltyAccount>, StoreError> {
        match self.client.read(&paths::loyalty_account(rider_id)).await? {
            Some(value) => Ok(Some(decode(value)?)),
            None => Ok(None),
        }
    }

    pub async fn write_loyalty(&self, account: &LoyaltyAccount) -> Result<(), StoreError> {
        self.client
            .write(&paths::loyalty_account(&account.rider_id), encode(account)?)
            .await
    }

    pub async fn conditional_update_loyalty(
        &self,
        rider_id: &str,
        expected: Map<String, Value>,
        changes: Map<String, Value>,
    ) -> Result<bool, StoreError> {
        self.client
            .conditional_update(&paths::loyalty_account(rider_id), expected, changes)
            .await
    }

    // --- historial y valoraciones ---

    pub async fn read_history(&self, booking_id: &str) -> Result<Option<BookingRecord>, StoreError> {
        match self.client.read(&paths::history(booking_id)).await? {
            Some(value) => Ok(Some(decode(value)?)),
            None => Ok(None),
        }
    }

    pub async fn write_history(&self, record: &BookingRecord) -> Result<(), StoreError> {
        self.client
            .write(&paths::history(&record.booking_id), encode(record)?)
            .await
    }

    /// Claim condicional sobre la copia archivada (flags de valoración)
    pub async fn conditional_update_history(
        &self,
        booking_id: &str,
        expected: Map<String, Value>,
        changes: Map<String, Value>,
    ) -> Result<bool, StoreError> {
        self.client
            .conditional_update(&paths::history(booking_id), expected, changes)
            .await
    }

    pub async fn write_rating(&self, rating: &Rating) -> Result<(), StoreError> {
        self.client
            .write(&paths::rating(&rating.rating_id), encode(rating)?)
            .await
    }

    pub async fn list_ratings(&self) -> Result<Vec<Rating>, StoreError> {
        let children = self.client.list_children(paths::RATINGS).await?;
        let mut ratings = Vec::with_capacity(children.len());
        for (_, value) in children {
            ratings.push(decode(value)?);
        }
        Ok(ratings)
    }

    // --- presencia del conductor ---

    pub async fn mark_driver_online(&self, driver_id: &str) -> Result<(), StoreError> {
        let path = paths::driver_presence(driver_id);
        self.client
            .write(&path, serde_json::json!({ "online": true }))
            .await?;
        // Limpieza best-effort si el conductor se desconecta de golpe
        self.client.on_disconnect_delete(&path).await
    }
}
