//! Archivo de viajes y valoraciones post-viaje
//!
//! Al alcanzar un estado terminal el registro vivo se copia (no se mueve)
//! a la colección `history/`, de solo-añadir. Las valoraciones referencian
//! la copia archivada y son inmutables una vez escritas.

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::models::rating::{MAX_RATING_SCORE, MIN_RATING_SCORE};
use crate::models::{BookingRecord, BookingStatus, Rating};
use crate::store::BookingStore;
use crate::utils::errors::DispatchError;

#[derive(Clone)]
pub struct HistoryService {
    store: BookingStore,
}

impl HistoryService {
    pub fn new(store: BookingStore) -> Self {
        Self { store }
    }

    /// Copia el registro terminal al historial, escrito una sola vez.
    /// Reprocesar el mismo booking (p.ej. tras un reinicio) es un no-op.
    pub async fn archive(&self, record: &BookingRecord) -> Result<(), DispatchError> {
        if !record.is_terminal() {
            warn!(
                booking_id = %record.booking_id,
                status = record.status.as_str(),
                "Se intentó archivar un booking no terminal"
            );
            return Err(DispatchError::InvalidTransition {
                from: record.status.as_str().to_string(),
                to: "HISTORY".to_string(),
            });
        }

        if self.store.read_history(&record.booking_id).await?.is_some() {
            return Ok(());
        }

        self.store.write_history(record).await?;
        info!(booking_id = %record.booking_id, status = record.status.as_str(), "📦 Viaje archivado");
        Ok(())
    }

    /// Registra la valoración de una de las partes de un viaje completado.
    /// Una por `(booking, rater)`; el segundo intento falla sin mutación.
    pub async fn submit_rating(
        &self,
        booking_id: &str,
        rater_id: &str,
        score: u8,
        comment: Option<String>,
        anonymous: bool,
    ) -> Result<Rating, DispatchError> {
        if !(MIN_RATING_SCORE..=MAX_RATING_SCORE).contains(&score) {
            return Err(DispatchError::InvalidRating(format!(
                "score must be within {}..={}, got {}",
                MIN_RATING_SCORE, MAX_RATING_SCORE, score
            )));
        }

        let archived = self
            .store
            .read_history(booking_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("history/{}", booking_id)))?;

        if archived.status != BookingStatus::Completed {
            return Err(DispatchError::InvalidRating(format!(
                "booking {} ended as {}, only completed trips can be rated",
                booking_id,
                archived.status.as_str()
            )));
        }
        if !archived.involves(rater_id) {
            return Err(DispatchError::Forbidden(format!(
                "{} was not part of booking {}",
                rater_id, booking_id
            )));
        }

        let rater_is_rider = archived.rider_id == rater_id;
        let rated_id = if rater_is_rider {
            archived
                .driver_id
                .clone()
                .ok_or_else(|| DispatchError::InvalidRating(format!(
                    "booking {} has no driver to rate",
                    booking_id
                )))?
        } else {
            archived.rider_id.clone()
        };

        // Claim condicional del flag por-rater: de dos envíos concurrentes
        // del mismo rater gana exactamente uno
        let flag = if rater_is_rider { "rider_rated" } else { "driver_rated" };
        let mut expected = Map::new();
        expected.insert(flag.into(), Value::Bool(false));
        let mut changes = Map::new();
        changes.insert(flag.into(), Value::Bool(true));
        if !self
            .store
            .conditional_update_history(booking_id, expected, changes)
            .await?
        {
            return Err(DispatchError::AlreadyRated(rater_id.to_string()));
        }

        let rating = Rating {
            rating_id: self.store.push_id(),
            booking_id: booking_id.to_string(),
            rater_id: rater_id.to_string(),
            rated_id,
            score,
            comment,
            anonymous,
            created_at: Utc::now(),
        };
        self.store.write_rating(&rating).await?;

        info!(booking_id, rater_id, score, "⭐ Valoración registrada");
        Ok(rating)
    }

    /// Valoraciones recibidas por un usuario
    pub async fn ratings_for(&self, rated_id: &str) -> Result<Vec<Rating>, DispatchError> {
        let ratings = self.store.list_ratings().await?;
        Ok(ratings.into_iter().filter(|r| r.rated_id == rated_id).collect())
    }

    /// Valoraciones emitidas por un usuario
    pub async fn ratings_by(&self, rater_id: &str) -> Result<Vec<Rating>, DispatchError> {
        let ratings = self.store.list_ratings().await?;
        Ok(ratings.into_iter().filter(|r| r.rater_id == rater_id).collect())
    }
}
