//! Proyección de snapshots del store a estados de presentación
//!
//! Función pura y total: cada forma observable del registro mapea a
//! exactamente una variante, con `Error` explícito para formas
//! inesperadas en lugar de lanzar. La capa de presentación solo renderiza
//! estas variantes; nunca lee el store directamente.

use crate::models::{BookingRecord, BookingStatus, GeoPoint};
use crate::store::BookingSnapshot;

/// Estado de presentación de una sesión de viaje
#[derive(Debug, Clone, PartialEq)]
pub enum RideView {
    Searching,
    DriverAssigned {
        driver_id: String,
        driver_name: String,
    },
    DriverEnRoute {
        driver_location: Option<GeoPoint>,
    },
    DriverArrived,
    TripInProgress {
        driver_location: Option<GeoPoint>,
    },
    Completed {
        final_fare: f64,
    },
    /// La búsqueda terminó sin conductores: mensaje distinto de Canceled
    /// y de Error
    NoDrivers,
    Canceled {
        reason: String,
    },
    Error {
        detail: String,
    },
}

impl RideView {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RideView::Completed { .. }
                | RideView::NoDrivers
                | RideView::Canceled { .. }
                | RideView::Error { .. }
        )
    }
}

/// Mapea el último snapshot del registro a su vista. Un registro ausente
/// significa, en la práctica, que la otra parte lo canceló: se proyecta
/// como cancelación terminal, no como fallo.
pub fn project(snapshot: &BookingSnapshot) -> RideView {
    match snapshot {
        BookingSnapshot::Absent => RideView::Canceled {
            reason: "booking_removed".to_string(),
        },
        BookingSnapshot::Malformed(detail) => RideView::Error {
            detail: detail.clone(),
        },
        BookingSnapshot::Record(record) => project_record(record),
    }
}

fn project_record(record: &BookingRecord) -> RideView {
    match record.status {
        BookingStatus::Searching => {
            if record.driver_id.is_some() {
                return invariant_error(record, "SEARCHING with driver assigned");
            }
            RideView::Searching
        }
        BookingStatus::Accepted => match (&record.driver_id, &record.driver_name) {
            (Some(driver_id), Some(driver_name)) => RideView::DriverAssigned {
                driver_id: driver_id.clone(),
                driver_name: driver_name.clone(),
            },
            _ => invariant_error(record, "ACCEPTED without driver identity"),
        },
        BookingStatus::EnRouteToPickup => {
            if record.driver_id.is_none() {
                return invariant_error(record, "EN_ROUTE_TO_PICKUP without driver");
            }
            RideView::DriverEnRoute {
                driver_location: record.driver_location,
            }
        }
        BookingStatus::ArrivedAtPickup => {
            if record.driver_id.is_none() {
                return invariant_error(record, "ARRIVED_AT_PICKUP without driver");
            }
            RideView::DriverArrived
        }
        BookingStatus::EnRouteToDropoff => {
            if record.driver_id.is_none() {
                return invariant_error(record, "EN_ROUTE_TO_DROPOFF without driver");
            }
            RideView::TripInProgress {
                driver_location: record.driver_location,
            }
        }
        BookingStatus::Completed => match record.final_fare {
            Some(final_fare) => RideView::Completed { final_fare },
            None => invariant_error(record, "COMPLETED without final fare"),
        },
        BookingStatus::Canceled => RideView::Canceled {
            reason: record
                .cancellation_reason
                .clone()
                .unwrap_or_else(|| "canceled".to_string()),
        },
        BookingStatus::NoDrivers => RideView::NoDrivers,
        BookingStatus::Error => RideView::Error {
            detail: "booking marked as ERROR".to_string(),
        },
    }
}

fn invariant_error(record: &BookingRecord, detail: &str) -> RideView {
    RideView::Error {
        detail: format!("booking {}: {}", record.booking_id, detail),
    }
}
