//! Notificador de despacho
//!
//! Proceso de fondo que observa bookings recién creados y reparte ofertas
//! a los conductores candidatos. Es la única pieza que corre sin ningún
//! humano delante: ante cualquier error registra y sigue, porque debe
//! quedar disponible para el siguiente booking.
//!
//! Idempotencia: reprocesar un booking (tras caída/reinicio o evento
//! duplicado) revalida `status`/`driver_id` antes de actuar, la misma
//! disciplina condicional que usa el claim de `accept_booking`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::DispatchConfig;
use crate::models::{BookingRecord, BookingStatus, DriverOffer};
use crate::services::lifecycle_service::LifecycleService;
use crate::store::{BookingSnapshot, BookingStore};
use crate::utils::errors::DispatchError;

/// Política de selección de candidatos (proximidad, disponibilidad...).
/// Externa y enchufable: aquí solo se requiere que devuelva cero o más
/// ids de conductor.
#[async_trait]
pub trait DriverSelection: Send + Sync {
    async fn select_candidates(&self, booking: &BookingRecord) -> anyhow::Result<Vec<String>>;
}

/// Política fija para tests y entornos locales
pub struct FixedCandidates(pub Vec<String>);

#[async_trait]
impl DriverSelection for FixedCandidates {
    async fn select_candidates(&self, _booking: &BookingRecord) -> anyhow::Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

#[derive(Clone)]
pub struct DispatchService {
    store: BookingStore,
    lifecycle: LifecycleService,
    selection: Arc<dyn DriverSelection>,
    config: DispatchConfig,
}

impl DispatchService {
    pub fn new(
        store: BookingStore,
        selection: Arc<dyn DriverSelection>,
        config: DispatchConfig,
    ) -> Self {
        let lifecycle = LifecycleService::new(store.clone(), config.clone());
        Self {
            store,
            lifecycle,
            selection,
            config,
        }
    }

    /// Bucle principal: un `process_booking` por cada booking nuevo en
    /// SEARCHING. Instancias para bookings distintos corren concurrentes
    /// y no se interfieren.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), DispatchError> {
        let mut bookings = self.store.subscribe_new_bookings().await?;
        info!("📡 Notificador de despacho escuchando bookings nuevos");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Notificador de despacho detenido");
                    bookings.close();
                    return Ok(());
                }
                event = bookings.next() => {
                    let Some(event) = event else {
                        warn!("Stream de bookings cerrado por el store");
                        return Ok(());
                    };
                    let Some(value) = event.value else { continue };
                    let record: BookingRecord = match serde_json::from_value(value) {
                        Ok(record) => record,
                        Err(e) => {
                            warn!(key = %event.key, error = %e, "Booking indecodificable, se omite");
                            continue;
                        }
                    };
                    if record.status != BookingStatus::Searching || record.driver_id.is_some() {
                        continue;
                    }

                    let notifier = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = notifier.process_booking(&record.booking_id).await {
                            error!(booking_id = %record.booking_id, error = %e, "Fallo procesando booking");
                        }
                    });
                }
            }
        }
    }

    /// Reparte ofertas para un booking y vigila la ventana de búsqueda.
    /// Seguro de reprocesar: las ofertas existentes no se duplican y un
    /// booking ya asignado o terminal es un no-op.
    pub async fn process_booking(&self, booking_id: &str) -> Result<(), DispatchError> {
        let Some(record) = self.store.read_booking(booking_id).await? else {
            debug!(booking_id, "Booking desapareció antes de despachar");
            return Ok(());
        };
        if record.status != BookingStatus::Searching || record.driver_id.is_some() {
            debug!(booking_id, status = record.status.as_str(), "Booking ya no es despachable");
            return Ok(());
        }

        let candidates = match self.selection.select_candidates(&record).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(booking_id, error = %e, "La política de selección falló, se omite el booking");
                return Ok(());
            }
        };
        let candidates: Vec<String> = candidates
            .into_iter()
            .take(self.config.max_offer_candidates)
            .collect();

        if candidates.is_empty() {
            info!(booking_id, "Sin candidatos elegibles");
            self.lifecycle.mark_no_drivers(booking_id).await?;
            return Ok(());
        }

        self.fan_out_offers(&record, &candidates).await?;
        self.watch_offer_window(booking_id, &candidates).await
    }

    async fn fan_out_offers(
        &self,
        record: &BookingRecord,
        candidates: &[String],
    ) -> Result<(), DispatchError> {
        for driver_id in candidates {
            // Reprocesado tras reinicio: la oferta puede existir ya
            if self
                .store
                .read_offer(driver_id, &record.booking_id)
                .await?
                .is_some()
            {
                debug!(booking_id = %record.booking_id, %driver_id, "Oferta ya enviada");
                continue;
            }

            let offer = DriverOffer::for_driver(record, driver_id);
            self.store.write_offer(&offer).await?;
            info!(booking_id = %record.booking_id, %driver_id, "📨 Oferta enviada");

            // Pequeño jitter entre envíos para no martillear el store
            let jitter: u64 = rand::thread_rng().gen_range(0..150);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }
        Ok(())
    }

    /// Espera el desenlace de la ventana de ofertas: claim de un
    /// conductor, cancelación del rider, rechazo de todos los candidatos
    /// o expiración del plazo hacia NO_DRIVERS.
    async fn watch_offer_window(
        &self,
        booking_id: &str,
        candidates: &[String],
    ) -> Result<(), DispatchError> {
        let deadline = Instant::now() + Duration::from_secs(self.config.offer_timeout_secs);
        let poll_interval = Duration::from_millis(250);
        let mut watch = self.store.subscribe_booking(booking_id).await?;

        let outcome = loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    break WindowOutcome::Expired;
                }
                snapshot = watch.next() => {
                    match snapshot {
                        None => break WindowOutcome::Resolved,
                        Some(BookingSnapshot::Absent) => break WindowOutcome::Resolved,
                        Some(BookingSnapshot::Malformed(e)) => {
                            warn!(booking_id, error = %e, "Snapshot malformado durante la ventana");
                        }
                        Some(BookingSnapshot::Record(record)) => {
                            if record.status != BookingStatus::Searching || record.driver_id.is_some() {
                                break WindowOutcome::Resolved;
                            }
                        }
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {
                    // El rechazo borra ofertas sin tocar el registro, así
                    // que hay que mirar las ofertas, no el booking
                    if !self.any_offer_remaining(booking_id, candidates).await? {
                        break WindowOutcome::AllDeclined;
                    }
                }
            }
        };
        watch.close();

        match outcome {
            WindowOutcome::Resolved => {
                debug!(booking_id, "Ventana resuelta por claim o cancelación");
            }
            WindowOutcome::Expired | WindowOutcome::AllDeclined => {
                // La condición hace inocuo el caso de un claim que llegó
                // justo al expirar la ventana
                let transitioned = self.lifecycle.mark_no_drivers(booking_id).await?;
                if transitioned {
                    info!(booking_id, "⌛ Ventana agotada: NO_DRIVERS");
                }
            }
        }

        self.cleanup_offers(booking_id, candidates).await;
        Ok(())
    }

    async fn any_offer_remaining(
        &self,
        booking_id: &str,
        candidates: &[String],
    ) -> Result<bool, DispatchError> {
        for driver_id in candidates {
            if self.store.read_offer(driver_id, booking_id).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Borrado best-effort de las ofertas pendientes del booking
    async fn cleanup_offers(&self, booking_id: &str, candidates: &[String]) {
        for driver_id in candidates {
            if let Err(e) = self.store.delete_offer(driver_id, booking_id).await {
                warn!(booking_id, %driver_id, error = %e, "No se pudo limpiar la oferta");
            }
        }
    }
}

enum WindowOutcome {
    /// El booking salió de SEARCHING (claim o cancelación)
    Resolved,
    /// Todos los candidatos rechazaron antes del plazo
    AllDeclined,
    /// Se agotó la ventana de búsqueda
    Expired,
}
