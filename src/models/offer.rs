//! Proyección efímera de un booking enviada a los conductores solicitados
//!
//! Vive en `driver_offers/{driver_id}/{booking_id}` y se elimina al
//! aceptar, rechazar o expirar la búsqueda.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::booking::{BookingRecord, GeoPoint};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverOffer {
    pub booking_id: String,
    pub driver_id: String,
    pub rider_id: String,
    pub pickup_location: GeoPoint,
    pub destination_location: GeoPoint,
    pub pickup_address: String,
    pub destination_address: String,
    pub estimated_fare: Option<f64>,
    pub offered_at: DateTime<Utc>,
}

impl DriverOffer {
    /// Construye la oferta para un conductor a partir del registro vivo
    pub fn for_driver(booking: &BookingRecord, driver_id: &str) -> Self {
        Self {
            booking_id: booking.booking_id.clone(),
            driver_id: driver_id.to_string(),
            rider_id: booking.rider_id.clone(),
            pickup_location: booking.pickup_location,
            destination_location: booking.destination_location,
            pickup_address: booking.pickup_address.clone(),
            destination_address: booking.destination_address.clone(),
            estimated_fare: booking.estimated_fare,
            offered_at: Utc::now(),
        }
    }
}
