//! Modelo central: el BookingRecord compartido entre rider y conductor
//!
//! El registro vive en `bookings/{booking_id}` del store en tiempo real y es
//! el único recurso mutado por más de un actor; toda mutación entre actores
//! pasa por actualizaciones condicionales del motor de ciclo de vida.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Par latitud/longitud
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Estados del ciclo de vida de un booking
///
/// Camino feliz: SEARCHING → ACCEPTED → EN_ROUTE_TO_PICKUP →
/// ARRIVED_AT_PICKUP → EN_ROUTE_TO_DROPOFF → COMPLETED.
/// Salidas universales desde cualquier estado no terminal: CANCELED,
/// NO_DRIVERS, ERROR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Searching,
    Accepted,
    EnRouteToPickup,
    ArrivedAtPickup,
    EnRouteToDropoff,
    Completed,
    Canceled,
    NoDrivers,
    Error,
}

impl BookingStatus {
    /// Sucesor único en el camino feliz; `None` para estados terminales.
    pub fn successor(&self) -> Option<BookingStatus> {
        match self {
            BookingStatus::Searching => Some(BookingStatus::Accepted),
            BookingStatus::Accepted => Some(BookingStatus::EnRouteToPickup),
            BookingStatus::EnRouteToPickup => Some(BookingStatus::ArrivedAtPickup),
            BookingStatus::ArrivedAtPickup => Some(BookingStatus::EnRouteToDropoff),
            BookingStatus::EnRouteToDropoff => Some(BookingStatus::Completed),
            BookingStatus::Completed
            | BookingStatus::Canceled
            | BookingStatus::NoDrivers
            | BookingStatus::Error => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed
                | BookingStatus::Canceled
                | BookingStatus::NoDrivers
                | BookingStatus::Error
        )
    }

    /// Valida una arista del grafo: el sucesor único, o una salida
    /// universal a CANCELED/NO_DRIVERS/ERROR desde un estado no terminal.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(
            next,
            BookingStatus::Canceled | BookingStatus::NoDrivers | BookingStatus::Error
        ) {
            return true;
        }
        self.successor() == Some(next)
    }

    /// Representación en el wire del store (la misma que produce serde)
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Searching => "SEARCHING",
            BookingStatus::Accepted => "ACCEPTED",
            BookingStatus::EnRouteToPickup => "EN_ROUTE_TO_PICKUP",
            BookingStatus::ArrivedAtPickup => "ARRIVED_AT_PICKUP",
            BookingStatus::EnRouteToDropoff => "EN_ROUTE_TO_DROPOFF",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Canceled => "CANCELED",
            BookingStatus::NoDrivers => "NO_DRIVERS",
            BookingStatus::Error => "ERROR",
        }
    }
}

/// Registro canónico de una solicitud de viaje
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRecord {
    // Identidad
    pub booking_id: String,
    pub rider_id: String,
    pub driver_id: Option<String>,
    pub driver_name: Option<String>,

    // Geografía
    pub pickup_location: GeoPoint,
    pub destination_location: GeoPoint,
    pub pickup_address: String,
    pub destination_address: String,

    // Ciclo de vida
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    pub trip_started_at: Option<DateTime<Utc>>,
    pub trip_ended_at: Option<DateTime<Utc>>,

    // Seguimiento en vivo (actualizado in-place durante el viaje)
    pub driver_location: Option<GeoPoint>,

    // Comercial
    pub distance_km: Option<f64>,
    pub duration_minutes: Option<f64>,
    pub fare_base: f64,
    pub per_km_rate: f64,
    pub per_minute_rate: f64,
    pub estimated_fare: Option<f64>,
    pub final_fare: Option<f64>,
    pub applied_discount_percent: Option<f64>,

    // Post-viaje
    pub rider_rated: bool,
    pub driver_rated: bool,

    // Metadatos de fallo
    pub cancellation_reason: Option<String>,
}

impl BookingRecord {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// El booking está asignado a (y en curso con) un conductor concreto
    pub fn is_assigned_to(&self, driver_id: &str) -> bool {
        self.driver_id.as_deref() == Some(driver_id)
    }

    /// `actor_id` es el rider o el conductor asignado del registro
    pub fn involves(&self, actor_id: &str) -> bool {
        self.rider_id == actor_id || self.is_assigned_to(actor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_successors() {
        assert_eq!(
            BookingStatus::Searching.successor(),
            Some(BookingStatus::Accepted)
        );
        assert_eq!(
            BookingStatus::Accepted.successor(),
            Some(BookingStatus::EnRouteToPickup)
        );
        assert_eq!(
            BookingStatus::EnRouteToDropoff.successor(),
            Some(BookingStatus::Completed)
        );
        assert_eq!(BookingStatus::Completed.successor(), None);
        assert_eq!(BookingStatus::Canceled.successor(), None);
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        assert!(!BookingStatus::Accepted.can_transition_to(BookingStatus::EnRouteToDropoff));
        assert!(!BookingStatus::Searching.can_transition_to(BookingStatus::Completed));
        assert!(BookingStatus::Accepted.can_transition_to(BookingStatus::EnRouteToPickup));
    }

    #[test]
    fn test_universal_exits_from_non_terminal_only() {
        assert!(BookingStatus::Searching.can_transition_to(BookingStatus::Canceled));
        assert!(BookingStatus::EnRouteToDropoff.can_transition_to(BookingStatus::Error));
        assert!(BookingStatus::Searching.can_transition_to(BookingStatus::NoDrivers));
        assert!(!BookingStatus::Completed.can_transition_to(BookingStatus::Canceled));
        assert!(!BookingStatus::Canceled.can_transition_to(BookingStatus::Error));
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_string(&BookingStatus::EnRouteToPickup).unwrap();
        assert_eq!(json, "\"EN_ROUTE_TO_PICKUP\"");
        let parsed: BookingStatus = serde_json::from_str("\"NO_DRIVERS\"").unwrap();
        assert_eq!(parsed, BookingStatus::NoDrivers);
        assert_eq!(BookingStatus::ArrivedAtPickup.as_str(), "ARRIVED_AT_PICKUP");
    }
}
