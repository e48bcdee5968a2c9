//! Sistema de manejo de errores
//!
//! Este módulo define todos los tipos de errores del núcleo de despacho
//! y su política de propagación hacia la capa de presentación.

use thiserror::Error;

use crate::store::client::StoreError;

/// Errores principales del núcleo de despacho
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Invalid fare input: {0}")]
    InvalidFareInput(String),

    #[error("Rider {0} already has an active booking")]
    RiderHasActiveBooking(String),

    /// Carrera esperada y recuperable: otro conductor reclamó primero.
    /// El controlador que la recibe vuelve al flujo de búsqueda/ofertas.
    #[error("Booking {0} was already claimed by another driver")]
    AlreadyClaimed(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Insufficient loyalty points: have {have}, need {need}")]
    InsufficientPoints { have: i64, need: i64 },

    #[error("Rider {0} already has a pending discount")]
    DiscountAlreadyPending(String),

    #[error("Rater {0} already rated this trip")]
    AlreadyRated(String),

    #[error("Invalid rating: {0}")]
    InvalidRating(String),
}

impl From<StoreError> for DispatchError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(path) => DispatchError::NotFound(path),
            StoreError::Unavailable(msg) => DispatchError::StoreUnavailable(msg),
            StoreError::Serialization(msg) => DispatchError::StoreUnavailable(msg),
        }
    }
}

impl DispatchError {
    /// Conflictos de actualización condicional: esperados en operación
    /// normal, el llamador reintenta o vuelve al flujo de búsqueda.
    pub fn is_recoverable_conflict(&self) -> bool {
        matches!(
            self,
            DispatchError::AlreadyClaimed(_)
                | DispatchError::InsufficientPoints { .. }
                | DispatchError::DiscountAlreadyPending(_)
        )
    }
}
