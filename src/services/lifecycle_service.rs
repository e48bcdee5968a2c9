//! Motor del ciclo de vida del booking
//!
//! Posee la máquina de estados, la validación de transiciones y el
//! protocolo de aceptación sin carreras ("claim"). Toda mutación entre
//! actores se expresa como actualización condicional: nunca una escritura
//! ciega que pueda pisar a otro actor.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::clients::mapping_client::RouteEstimate;
use crate::config::DispatchConfig;
use crate::models::{BookingRecord, BookingStatus, GeoPoint};
use crate::services::fare_service;
use crate::services::history_service::HistoryService;
use crate::services::loyalty_service::LoyaltyService;
use crate::store::BookingStore;
use crate::utils::errors::DispatchError;

pub const CANCEL_REASON_USER: &str = "user_canceled";
pub const CANCEL_REASON_DRIVER: &str = "driver_canceled";

#[derive(Clone)]
pub struct LifecycleService {
    store: BookingStore,
    config: DispatchConfig,
    loyalty: LoyaltyService,
    history: HistoryService,
}

impl LifecycleService {
    pub fn new(store: BookingStore, config: DispatchConfig) -> Self {
        let loyalty = LoyaltyService::new(store.clone(), config.clone());
        let history = HistoryService::new(store.clone());
        Self {
            store,
            config,
            loyalty,
            history,
        }
    }

    pub fn loyalty(&self) -> &LoyaltyService {
        &self.loyalty
    }

    pub fn history(&self) -> &HistoryService {
        &self.history
    }

    /// Cadencia recomendada para el stream de ubicación del conductor
    pub fn location_update_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.location_update_interval_secs)
    }

    /// Crea un booking en SEARCHING para el rider, consumiendo cualquier
    /// descuento de fidelización pendiente de forma atómica con la
    /// creación. Un rider solo puede tener un booking activo.
    pub async fn create_booking(
        &self,
        rider_id: &str,
        pickup: GeoPoint,
        destination: GeoPoint,
        pickup_address: &str,
        destination_address: &str,
        estimate: Option<&RouteEstimate>,
    ) -> Result<BookingRecord, DispatchError> {
        let booking_id = self.store.push_id();

        if !self.claim_rider_slot(rider_id, &booking_id).await? {
            return Err(DispatchError::RiderHasActiveBooking(rider_id.to_string()));
        }

        let applied_discount = match self.loyalty.take_pending_discount(rider_id).await {
            Ok(discount) => discount,
            Err(e) => {
                self.release_failed_creation(rider_id, None).await;
                return Err(e);
            }
        };

        match self
            .write_new_booking(
                &booking_id,
                rider_id,
                pickup,
                destination,
                pickup_address,
                destination_address,
                estimate,
                applied_discount,
            )
            .await
        {
            Ok(record) => {
                info!(booking_id = %booking_id, rider_id, "🚕 Booking creado en SEARCHING");
                Ok(record)
            }
            Err(e) => {
                // El registro no llegó a existir: devolver el descuento
                // consumido y liberar el slot del rider
                self.release_failed_creation(rider_id, applied_discount).await;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_new_booking(
        &self,
        booking_id: &str,
        rider_id: &str,
        pickup: GeoPoint,
        destination: GeoPoint,
        pickup_address: &str,
        destination_address: &str,
        estimate: Option<&RouteEstimate>,
        applied_discount: Option<f64>,
    ) -> Result<BookingRecord, DispatchError> {
        let estimated_fare = match estimate {
            Some(route) => Some(fare_service::compute_fare(
                self.config.fare_base,
                self.config.per_km_rate,
                route.distance_km,
                self.config.per_minute_rate,
                route.duration_minutes,
                applied_discount,
            )?),
            None => None,
        };

        let now = Utc::now();
        let record = BookingRecord {
            booking_id: booking_id.to_string(),
            rider_id: rider_id.to_string(),
            driver_id: None,
            driver_name: None,
            pickup_location: pickup,
            destination_location: destination,
            pickup_address: pickup_address.to_string(),
            destination_address: destination_address.to_string(),
            status: BookingStatus::Searching,
            created_at: now,
            last_update_time: now,
            trip_started_at: None,
            trip_ended_at: None,
            driver_location: None,
            distance_km: estimate.map(|r| r.distance_km),
            duration_minutes: estimate.map(|r| r.duration_minutes),
            fare_base: self.config.fare_base,
            per_km_rate: self.config.per_km_rate,
            per_minute_rate: self.config.per_minute_rate,
            estimated_fare,
            final_fare: None,
            applied_discount_percent: applied_discount,
            rider_rated: false,
            driver_rated: false,
            cancellation_reason: None,
        };

        self.store.write_booking(&record).await?;
        Ok(record)
    }

    /// Deshace los efectos laterales de una creación fallida: el slot del
    /// rider y el descuento ya consumido. Best-effort; el índice además se
    /// autorrepara en el siguiente intento de creación.
    async fn release_failed_creation(&self, rider_id: &str, discount: Option<f64>) {
        if let Some(discount) = discount {
            if let Err(e) = self.loyalty.restore_pending_discount(rider_id, discount).await {
                warn!(rider_id, discount, error = %e, "No se pudo devolver el descuento consumido");
            }
        }
        if let Err(e) = self.store.clear_rider_active(rider_id).await {
            warn!(rider_id, error = %e, "No se pudo liberar el slot del rider");
        }
    }

    /// Reserva el índice "un viaje activo por rider". Si el índice apunta
    /// a un booking que ya terminó (p.ej. caída antes de limpiarlo), se
    /// revalida contra el registro en vez de confiar en el índice.
    async fn claim_rider_slot(
        &self,
        rider_id: &str,
        booking_id: &str,
    ) -> Result<bool, DispatchError> {
        if self.store.claim_rider_active(rider_id, booking_id).await? {
            return Ok(true);
        }

        let Some(active_id) = self.store.read_rider_active(rider_id).await? else {
            // El índice se liberó entre los dos pasos; un solo reintento
            return Ok(self.store.claim_rider_active(rider_id, booking_id).await?);
        };

        let still_active = match self.store.read_booking(&active_id).await? {
            Some(active) => !active.is_terminal(),
            None => false,
        };
        if still_active {
            return Ok(false);
        }

        // Entrada colgada de un booking terminal: liberar y reintentar
        warn!(rider_id, stale_booking = %active_id, "Índice rider_active colgado, liberando");
        self.store.clear_rider_active(rider_id).await?;
        Ok(self.store.claim_rider_active(rider_id, booking_id).await?)
    }

    /// Claim condicional: se aplica solo si el registro sigue en SEARCHING
    /// sin conductor. De N conductores concurrentes gana exactamente uno;
    /// el resto recibe `AlreadyClaimed` y vuelve al flujo de ofertas.
    pub async fn accept_booking(
        &self,
        booking_id: &str,
        driver_id: &str,
        driver_name: &str,
    ) -> Result<BookingRecord, DispatchError> {
        // La existencia se comprueba primero para distinguir NotFound del
        // conflicto de claim
        self.store.require_booking(booking_id).await?;

        let now = Utc::now();
        let mut expected = Map::new();
        expected.insert("status".into(), status_value(BookingStatus::Searching));
        expected.insert("driver_id".into(), Value::Null);
        let mut changes = Map::new();
        changes.insert("status".into(), status_value(BookingStatus::Accepted));
        changes.insert("driver_id".into(), Value::String(driver_id.to_string()));
        changes.insert("driver_name".into(), Value::String(driver_name.to_string()));
        changes.insert("last_update_time".into(), timestamp(now));

        let claimed = self
            .store
            .conditional_update_booking(booking_id, expected, changes)
            .await?;
        if !claimed {
            info!(booking_id, driver_id, "Claim perdido: booking ya reclamado");
            return Err(DispatchError::AlreadyClaimed(booking_id.to_string()));
        }

        info!(booking_id, driver_id, "✅ Booking reclamado");

        // La oferta propia ya no es necesaria; el resto las limpia el
        // notificador de despacho. Un fallo aquí solo deja basura efímera.
        if let Err(e) = self.store.delete_offer(driver_id, booking_id).await {
            warn!(booking_id, driver_id, error = %e, "No se pudo borrar la oferta aceptada");
        }

        self.store.require_booking(booking_id).await.map_err(Into::into)
    }

    /// Avanza el estado al sucesor único del grafo. Solo el conductor
    /// asignado puede avanzar, y nunca directamente a COMPLETED: esa
    /// arista pertenece a `complete_trip` para que la tarifa final no
    /// pueda omitirse.
    pub async fn advance_trip_status(
        &self,
        booking_id: &str,
        requested: BookingStatus,
        actor_id: &str,
    ) -> Result<BookingRecord, DispatchError> {
        let record = self.store.require_booking(booking_id).await?;

        if !record.is_assigned_to(actor_id) {
            return Err(DispatchError::Forbidden(format!(
                "{} is not the driver of booking {}",
                actor_id, booking_id
            )));
        }
        if requested == BookingStatus::Completed
            || record.status.successor() != Some(requested)
        {
            return Err(DispatchError::InvalidTransition {
                from: record.status.as_str().to_string(),
                to: requested.as_str().to_string(),
            });
        }

        let now = Utc::now();
        let mut expected = Map::new();
        expected.insert("status".into(), status_value(record.status));
        let mut changes = Map::new();
        changes.insert("status".into(), status_value(requested));
        changes.insert("last_update_time".into(), timestamp(now));
        if requested == BookingStatus::EnRouteToDropoff {
            changes.insert("trip_started_at".into(), timestamp(now));
        }

        let applied = self
            .store
            .conditional_update_booking(booking_id, expected, changes)
            .await?;
        if !applied {
            // El estado cambió entre la lectura y la escritura
            return Err(DispatchError::InvalidTransition {
                from: record.status.as_str().to_string(),
                to: requested.as_str().to_string(),
            });
        }

        info!(booking_id, status = requested.as_str(), "➡️ Estado avanzado");
        self.store.require_booking(booking_id).await.map_err(Into::into)
    }

    /// Escritura in-place de la ubicación del conductor durante el viaje.
    /// Fire-and-forget: una actualización tardía degrada el seguimiento
    /// en vivo pero nunca corrompe el ciclo de vida.
    pub async fn update_driver_location(
        &self,
        booking_id: &str,
        actor_id: &str,
        location: GeoPoint,
    ) -> Result<(), DispatchError> {
        let record = self.store.require_booking(booking_id).await?;
        if !record.is_assigned_to(actor_id) || record.is_terminal() {
            return Err(DispatchError::Forbidden(format!(
                "{} cannot publish location for booking {}",
                actor_id, booking_id
            )));
        }

        let mut changes = Map::new();
        changes.insert(
            "driver_location".into(),
            serde_json::to_value(location)
                .map_err(|e| DispatchError::StoreUnavailable(e.to_string()))?,
        );
        self.store.update_booking(booking_id, changes).await?;
        Ok(())
    }

    /// Cierra el viaje desde EN_ROUTE_TO_DROPOFF: calcula la tarifa final
    /// con las tarifas congeladas en el registro, archiva y suma puntos.
    /// `final_fare` se escribe exactamente una vez.
    pub async fn complete_trip(
        &self,
        booking_id: &str,
        actor_id: &str,
        distance_km: f64,
        duration_minutes: f64,
    ) -> Result<BookingRecord, DispatchError> {
        let record = self.store.require_booking(booking_id).await?;

        if !record.is_assigned_to(actor_id) {
            return Err(DispatchError::Forbidden(format!(
                "{} is not the driver of booking {}",
                actor_id, booking_id
            )));
        }
        if record.status != BookingStatus::EnRouteToDropoff {
            return Err(DispatchError::InvalidTransition {
                from: record.status.as_str().to_string(),
                to: BookingStatus::Completed.as_str().to_string(),
            });
        }

        let final_fare = fare_service::compute_fare(
            record.fare_base,
            record.per_km_rate,
            distance_km,
            record.per_minute_rate,
            duration_minutes,
            record.applied_discount_percent,
        )?;

        let now = Utc::now();
        let mut expected = Map::new();
        expected.insert("status".into(), status_value(BookingStatus::EnRouteToDropoff));
        expected.insert("final_fare".into(), Value::Null);
        let mut changes = Map::new();
        changes.insert("status".into(), status_value(BookingStatus::Completed));
        changes.insert("final_fare".into(), Value::from(final_fare));
        changes.insert("distance_km".into(), Value::from(distance_km));
        changes.insert("duration_minutes".into(), Value::from(duration_minutes));
        changes.insert("trip_ended_at".into(), timestamp(now));
        changes.insert("last_update_time".into(), timestamp(now));

        let applied = self
            .store
            .conditional_update_booking(booking_id, expected, changes)
            .await?;
        if !applied {
            return Err(DispatchError::InvalidTransition {
                from: record.status.as_str().to_string(),
                to: BookingStatus::Completed.as_str().to_string(),
            });
        }

        let completed = self.store.require_booking(booking_id).await?;
        info!(
            booking_id,
            final_fare,
            "🏁 Viaje completado"
        );

        self.store.clear_rider_active(&completed.rider_id).await?;
        self.history.archive(&completed).await?;
        self.loyalty
            .award_points(&completed.rider_id, self.config.loyalty_points_per_trip)
            .await?;

        Ok(completed)
    }

    /// Cancela desde cualquier estado no terminal. Un booking en SEARCHING
    /// puede cancelarlo cualquiera de las partes; una vez reclamado, solo
    /// el rider o el conductor del registro.
    pub async fn cancel_booking(
        &self,
        booking_id: &str,
        actor_id: &str,
        reason: &str,
    ) -> Result<BookingRecord, DispatchError> {
        // La cancelación compite con accept/advance concurrentes: se
        // revalida y reintenta una vez antes de rendirse.
        for attempt in 0..2 {
            let record = self.store.require_booking(booking_id).await?;

            if record.is_terminal() {
                return Err(DispatchError::InvalidTransition {
                    from: record.status.as_str().to_string(),
                    to: BookingStatus::Canceled.as_str().to_string(),
                });
            }
            if record.driver_id.is_some() && !record.involves(actor_id) {
                return Err(DispatchError::Forbidden(format!(
                    "{} is not a party of booking {}",
                    actor_id, booking_id
                )));
            }

            let now = Utc::now();
            let mut expected = Map::new();
            expected.insert("status".into(), status_value(record.status));
            let mut changes = Map::new();
            changes.insert("status".into(), status_value(BookingStatus::Canceled));
            changes.insert("cancellation_reason".into(), Value::String(reason.to_string()));
            changes.insert("last_update_time".into(), timestamp(now));

            let applied = self
                .store
                .conditional_update_booking(booking_id, expected, changes)
                .await?;
            if !applied {
                info!(booking_id, attempt, "Cancelación en conflicto, revalidando");
                continue;
            }

            let canceled = self.store.require_booking(booking_id).await?;
            info!(booking_id, actor_id, reason, "🛑 Booking cancelado");

            self.store.clear_rider_active(&canceled.rider_id).await?;
            self.history.archive(&canceled).await?;
            return Ok(canceled);
        }

        Err(DispatchError::StoreUnavailable(format!(
            "booking {} kept changing during cancellation",
            booking_id
        )))
    }

    /// Rechaza la oferta de un conductor concreto. Solo elimina la
    /// oferta; el registro no se toca. El notificador de despacho decide
    /// si quedan candidatos o si procede NO_DRIVERS.
    pub async fn decline_offer(
        &self,
        booking_id: &str,
        driver_id: &str,
    ) -> Result<(), DispatchError> {
        self.store.delete_offer(driver_id, booking_id).await?;
        info!(booking_id, driver_id, "Oferta rechazada");
        Ok(())
    }

    /// Transición SEARCHING → NO_DRIVERS usada por el notificador al
    /// agotar la ventana de búsqueda. Condicional por la misma razón que
    /// el claim: un evento duplicado tardío debe ser un no-op.
    pub async fn mark_no_drivers(&self, booking_id: &str) -> Result<bool, DispatchError> {
        let mut expected = Map::new();
        expected.insert("status".into(), status_value(BookingStatus::Searching));
        expected.insert("driver_id".into(), Value::Null);
        let mut changes = Map::new();
        changes.insert("status".into(), status_value(BookingStatus::NoDrivers));
        changes.insert("last_update_time".into(), timestamp(Utc::now()));

        let applied = self
            .store
            .conditional_update_booking(booking_id, expected, changes)
            .await?;
        if !applied {
            return Ok(false);
        }

        let record = self.store.require_booking(booking_id).await?;
        info!(booking_id, "🚫 Búsqueda agotada sin conductores");
        self.store.clear_rider_active(&record.rider_id).await?;
        self.history.archive(&record).await?;
        Ok(true)
    }
}

fn status_value(status: BookingStatus) -> Value {
    Value::String(status.as_str().to_string())
}

fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339())
}
